//! leaderboard ranking
//!
//! ranking uses the public per-user submission count, never the confidential
//! total: only the requesting user may see their own decrypted value, and
//! only the engine holds that. pure transform over bulk ledger reads.

use serde::Serialize;

use crate::signer::same_address;

/// entries kept after ranking
pub const LEADERBOARD_LIMIT: usize = 100;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardEntry {
    pub address: String,
    pub log_count: u64,
    pub rank: u32,
    pub is_current_user: bool,
}

/// rank (address, submission count) pairs: count descending, address
/// ascending on ties, truncated to the top [`LEADERBOARD_LIMIT`]
pub fn rank_entries(
    mut counts: Vec<(String, u64)>,
    current_user: Option<&str>,
) -> Vec<LeaderboardEntry> {
    counts.sort_by(|a, b| {
        b.1.cmp(&a.1)
            .then_with(|| a.0.to_lowercase().cmp(&b.0.to_lowercase()))
    });

    counts
        .into_iter()
        .take(LEADERBOARD_LIMIT)
        .enumerate()
        .map(|(i, (address, log_count))| LeaderboardEntry {
            is_current_user: current_user
                .map(|u| same_address(u, &address))
                .unwrap_or(false),
            address,
            log_count,
            rank: i as u32 + 1,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sorts_by_count_then_address() {
        let entries = rank_entries(
            vec![
                ("0xbbb".into(), 5),
                ("0xaaa".into(), 5),
                ("0xccc".into(), 9),
            ],
            None,
        );

        assert_eq!(entries[0].address, "0xccc");
        assert_eq!(entries[0].rank, 1);
        assert_eq!(entries[1].address, "0xaaa");
        assert_eq!(entries[2].address, "0xbbb");

        // higher count always means better (smaller) rank
        for pair in entries.windows(2) {
            assert!(pair[0].log_count >= pair[1].log_count);
            assert!(pair[0].rank < pair[1].rank);
        }
    }

    #[test]
    fn test_truncates_to_limit() {
        let counts: Vec<(String, u64)> = (0..250)
            .map(|i| (format!("0x{i:040x}"), i as u64))
            .collect();
        let entries = rank_entries(counts, None);

        assert_eq!(entries.len(), LEADERBOARD_LIMIT);
        assert_eq!(entries[0].log_count, 249);
    }

    #[test]
    fn test_marks_current_user_case_insensitive() {
        let entries = rank_entries(
            vec![("0xABC".into(), 1), ("0xdef".into(), 2)],
            Some("0xabc"),
        );

        let me = entries.iter().find(|e| e.is_current_user).unwrap();
        assert_eq!(me.address, "0xABC");
        assert_eq!(entries.iter().filter(|e| e.is_current_user).count(), 1);
    }

    #[test]
    fn test_empty_input() {
        assert!(rank_entries(vec![], Some("0xabc")).is_empty());
    }
}
