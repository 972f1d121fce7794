use serde::{Deserialize, Serialize};

use super::VisitPeriod;

/// Parameters for the `badge_leaderboard` procedure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LeaderboardRequest {
    pub period: VisitPeriod,
    pub limit: usize,
}

impl Default for LeaderboardRequest {
    fn default() -> Self {
        Self {
            period: VisitPeriod::Month,
            limit: 25,
        }
    }
}

/// One ranked row; ranking itself is computed by the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct LeaderboardEntry {
    #[serde(default)]
    pub rank: Option<u32>,
    pub member_id: String,
    pub display_name: String,
    #[serde(default)]
    pub badge_count: u32,
    #[serde(default)]
    pub points: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct MemberBadge {
    pub badge_id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub awarded_at: String,
}
