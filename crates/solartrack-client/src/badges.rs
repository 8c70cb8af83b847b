//! achievement badges
//!
//! eligibility is decided client-side over derived state; the claim itself
//! is a ledger write keyed by the badge's stable id

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Badge {
    /// first successful usage submission
    FirstStep,
    /// three consecutive days
    Streak3,
    /// 100 kWh decrypted total
    Kwh100,
    /// thirty consecutive days
    Streak30,
}

impl Badge {
    pub const ALL: [Badge; 4] = [Badge::FirstStep, Badge::Streak3, Badge::Kwh100, Badge::Streak30];

    /// stable id used by the ledger contract
    pub fn id(self) -> u8 {
        match self {
            Badge::FirstStep => 0,
            Badge::Streak3 => 1,
            Badge::Kwh100 => 2,
            Badge::Streak30 => 3,
        }
    }

    pub fn from_id(id: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|b| b.id() == id)
    }

    pub fn name(self) -> &'static str {
        match self {
            Badge::FirstStep => "first step",
            Badge::Streak3 => "3-day streak",
            Badge::Kwh100 => "100 kWh",
            Badge::Streak30 => "30-day streak",
        }
    }
}

/// achievement facts derived from engine reads
#[derive(Clone, Copy, Debug, Default)]
pub struct AchievementFacts {
    pub has_any_record: bool,
    pub longest_streak: u32,
    /// decrypted user total, when a current ClearValue is held
    pub clear_total: Option<u64>,
}

/// has the user earned this badge?
pub fn eligible(badge: Badge, facts: &AchievementFacts) -> bool {
    match badge {
        Badge::FirstStep => facts.has_any_record,
        Badge::Streak3 => facts.longest_streak >= 3,
        Badge::Kwh100 => facts.clear_total.map(|t| t >= 100).unwrap_or(false),
        Badge::Streak30 => facts.longest_streak >= 30,
    }
}
