//! REST client for the club's hosted backend.
//!
//! `ApiClient` talks to the table, procedure, auth and edge-function
//! endpoints. Requests carry the project's anon key and, once logged in,
//! the admin session's access token.

pub mod client;
pub mod error;

use std::collections::HashMap;

pub use client::{ApiClient, Params};
pub use error::ApiError;

use crate::models::{Member, MemberRelation, VisitStats};

/// Merge visit aggregates and medbadare links into member rows.
///
/// A stat value replaces the row's own `last_visit_at` only when present.
/// Links are collected per owning member in the order they were returned.
pub fn enrich_members(
    mut members: Vec<Member>,
    stats: &[VisitStats],
    relations: &[MemberRelation],
) -> Vec<Member> {
    let stats_by_member: HashMap<&str, &VisitStats> =
        stats.iter().map(|s| (s.member_id.as_str(), s)).collect();

    let mut related: HashMap<&str, Vec<String>> = HashMap::new();
    for relation in relations {
        related
            .entry(relation.member_id.as_str())
            .or_default()
            .push(relation.related_member_id.clone());
    }

    for member in &mut members {
        if let Some(stat) = stats_by_member.get(member.id.as_str()) {
            member.visits_week = stat.visits_week;
            member.visits_month = stat.visits_month;
            member.visits_quarter = stat.visits_3months;
            if stat.last_visit_at.is_some() {
                member.last_visit_at = stat.last_visit_at.clone();
            }
        }
        if let Some(ids) = related.remove(member.id.as_str()) {
            for id in ids {
                if !member.related_member_ids.contains(&id) {
                    member.related_member_ids.push(id);
                }
            }
        }
    }

    members
}
