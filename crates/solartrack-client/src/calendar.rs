//! activity calendar and streaks
//!
//! a trailing window of day-keys with per-day record existence. individual
//! day fetch failures are swallowed as "no record" so the calendar stays
//! renderable under partial read failure.

use serde::Serialize;

/// trailing window length in days
pub const CALENDAR_WINDOW_DAYS: u64 = 35;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarDay {
    pub day_key: u64,
    pub has_record: bool,
    pub is_today: bool,
}

/// day-keys of the trailing window ending at `today`, oldest first
pub fn window_day_keys(today: u64, window: u64) -> Vec<u64> {
    let window = window.min(today + 1);
    (0..window).rev().map(|offset| today - offset).collect()
}

/// longest run of consecutive recorded days, scanning oldest to newest
pub fn longest_streak(days: &[CalendarDay]) -> u32 {
    let mut ordered: Vec<&CalendarDay> = days.iter().collect();
    ordered.sort_by_key(|d| d.day_key);

    let mut best = 0u32;
    let mut current = 0u32;
    for day in ordered {
        if day.has_record {
            current += 1;
            best = best.max(current);
        } else {
            current = 0;
        }
    }
    best
}
