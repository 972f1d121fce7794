//! Door access review.

use std::cmp::Reverse;
use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::api::Params;
use crate::models::{AccessEvent, AccessSource, Member};

/// Shown for events that cannot be tied to a member.
pub const UNKNOWN_MEMBER: &str = "Okänd";

const DEFAULT_LIMIT: usize = 200;

#[derive(Debug, Clone, PartialEq)]
pub struct AccessEventQuery {
    pub since: DateTime<Utc>,
    pub source: Option<AccessSource>,
    pub denied_only: bool,
    pub member_id: Option<String>,
    pub limit: usize,
}

impl AccessEventQuery {
    /// Events from the last `days` days.
    pub fn last_days(days: i64, now: DateTime<Utc>) -> Self {
        Self {
            since: now - Duration::days(days),
            source: None,
            denied_only: false,
            member_id: None,
            limit: DEFAULT_LIMIT,
        }
    }

    pub fn to_params(&self) -> Params {
        let mut params: Params = vec![
            ("select", "*".to_string()),
            ("occurred_at", format!("gte.{}", self.since.to_rfc3339())),
        ];
        if let Some(source) = self.source {
            params.push(("source", format!("eq.{}", source)));
        }
        if self.denied_only {
            params.push(("granted", "eq.false".to_string()));
        }
        if let Some(member_id) = &self.member_id {
            params.push(("member_id", format!("eq.{}", member_id)));
        }
        params.push(("order", "occurred_at.desc".to_string()));
        params.push(("limit", self.limit.to_string()));
        params
    }
}

/// An event with the member it belongs to resolved for display.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AccessEventRow {
    #[serde(flatten)]
    pub event: AccessEvent,
    pub member_name: String,
    #[serde(skip)]
    pub occurred: Option<DateTime<Utc>>,
}

/// Attach member names and order newest first.
///
/// Events carry a member id when the backend could match them; otherwise
/// the credential id is looked up against the member's Aptus or Parakey id.
pub fn review_events(events: Vec<AccessEvent>, members: &[Member]) -> Vec<AccessEventRow> {
    let by_id: HashMap<&str, &Member> = members.iter().map(|m| (m.id.as_str(), m)).collect();
    let mut by_credential: HashMap<(AccessSource, &str), &Member> = HashMap::new();
    for m in members {
        if let Some(id) = m.aptus_user_id.as_deref() {
            by_credential.insert((AccessSource::Aptus, id), m);
        }
        if let Some(id) = m.parakey_user_id.as_deref() {
            by_credential.insert((AccessSource::Parakey, id), m);
        }
    }

    let mut rows: Vec<AccessEventRow> = events
        .into_iter()
        .map(|event| {
            let member = event
                .member_id
                .as_deref()
                .and_then(|id| by_id.get(id))
                .or_else(|| {
                    event
                        .credential_id
                        .as_deref()
                        .and_then(|c| by_credential.get(&(event.source, c)))
                });
            let member_name = member
                .map(|m| m.display_name())
                .unwrap_or_else(|| UNKNOWN_MEMBER.to_string());
            let occurred = event.occurred();
            AccessEventRow {
                event,
                member_name,
                occurred,
            }
        })
        .collect();

    // None sorts before Some, so Reverse puts undated rows last
    rows.sort_by_key(|row| Reverse(row.occurred));
    rows
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AccessSummary {
    pub total: usize,
    pub denied: usize,
    pub by_source: BTreeMap<AccessSource, usize>,
}

impl AccessSummary {
    pub fn from_events<'a>(events: impl IntoIterator<Item = &'a AccessEvent>) -> Self {
        let mut summary = Self::default();
        for event in events {
            summary.total += 1;
            if !event.granted {
                summary.denied += 1;
            }
            *summary.by_source.entry(event.source).or_insert(0) += 1;
        }
        summary
    }
}
