//! Computations owned by the backend: badge ranking and dynamic groups.
//!
//! The stored procedures are the source of truth. This module only defines
//! the seam through which callers reach them, so commands can be tested
//! against an in-memory implementation.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use crate::api::ApiClient;
use crate::models::{LeaderboardEntry, LeaderboardRequest, MemberBadge};

#[async_trait]
pub trait RankingService: Send + Sync {
    /// Ranked members for a period, in the order the backend returns them.
    async fn leaderboard(&self, request: &LeaderboardRequest) -> Result<Vec<LeaderboardEntry>>;

    /// Badges awarded to one member.
    async fn member_badges(&self, member_id: &str) -> Result<Vec<MemberBadge>>;

    /// Member ids currently matching a dynamic SMS group's rule.
    async fn resolve_dynamic_group(&self, group_id: &str) -> Result<Vec<String>>;
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ResolvedMember {
    Id(String),
    Row { member_id: String },
}

impl ResolvedMember {
    fn into_id(self) -> String {
        match self {
            ResolvedMember::Id(id) => id,
            ResolvedMember::Row { member_id } => member_id,
        }
    }
}

#[async_trait]
impl RankingService for ApiClient {
    async fn leaderboard(&self, request: &LeaderboardRequest) -> Result<Vec<LeaderboardEntry>> {
        let entries: Vec<LeaderboardEntry> = self
            .rpc("badge_leaderboard", request)
            .await
            .context("Failed to load leaderboard")?;
        Ok(fill_missing_ranks(entries))
    }

    async fn member_badges(&self, member_id: &str) -> Result<Vec<MemberBadge>> {
        self.rpc("member_badges", &json!({ "member_id": member_id }))
            .await
            .with_context(|| format!("Failed to load badges for member {}", member_id))
    }

    async fn resolve_dynamic_group(&self, group_id: &str) -> Result<Vec<String>> {
        let rows: Vec<ResolvedMember> = self
            .rpc("resolve_dynamic_group", &json!({ "group_id": group_id }))
            .await
            .with_context(|| format!("Failed to resolve group {}", group_id))?;
        Ok(rows.into_iter().map(ResolvedMember::into_id).collect())
    }
}

/// Number entries densely when the backend leaves ranks out.
///
/// Server order is kept. Entries tied on points share a rank, and the next
/// distinct score takes the following integer. Rows that already carry a
/// rank are returned untouched.
pub fn fill_missing_ranks(mut entries: Vec<LeaderboardEntry>) -> Vec<LeaderboardEntry> {
    if entries.iter().all(|e| e.rank.is_some()) {
        return entries;
    }

    let mut rank = 0;
    let mut previous_points = None;
    for entry in &mut entries {
        if previous_points != Some(entry.points) {
            rank += 1;
            previous_points = Some(entry.points);
        }
        entry.rank = Some(rank);
    }
    entries
}
