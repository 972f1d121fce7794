//! SMS recipients, inbox grouping and segment counting.

use std::collections::{HashMap, HashSet};

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::debug;

use crate::models::{Direction, GroupKind, Member, SmsGroup, SmsMessage};
use crate::ranking::RankingService;

/// Outbound messages with the same body sent this close together are shown
/// as one broadcast.
pub const BROADCAST_WINDOW_SECS: i64 = 120;

const SINGLE_SEGMENT_CHARS: usize = 160;
const CONCATENATED_SEGMENT_CHARS: usize = 153;
const MIN_PHONE_DIGITS: usize = 8;
const COUNTRY_CODE: &str = "46";

/// Normalize a phone number to E.164, assuming Swedish numbers.
///
/// `070-123 45 67`, `0046701234567`, `46701234567` and `+46 70 123 45 67`
/// all become `+46701234567`. Returns `None` when fewer than eight digits
/// remain.
pub fn normalize_phone(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    let digits: String = trimmed.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.len() < MIN_PHONE_DIGITS {
        return None;
    }

    let normalized = if trimmed.starts_with('+') {
        format!("+{}", digits)
    } else if let Some(international) = digits.strip_prefix("00") {
        format!("+{}", international)
    } else if digits.starts_with(COUNTRY_CODE) {
        format!("+{}", digits)
    } else if let Some(national) = digits.strip_prefix('0') {
        format!("+{}{}", COUNTRY_CODE, national)
    } else {
        format!("+{}{}", COUNTRY_CODE, digits)
    };
    Some(normalized)
}

/// Number of SMS segments needed for a body.
pub fn segment_count(body: &str) -> usize {
    let chars = body.chars().count();
    if chars <= SINGLE_SEGMENT_CHARS {
        1
    } else {
        chars.div_ceil(CONCATENATED_SEGMENT_CHARS)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// The group lists an id missing from the directory
    UnknownMember,
    /// No phone number, or one that cannot be normalized
    NoPhone,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedRecipient {
    pub member_id: String,
    pub name: Option<String>,
    pub reason: SkipReason,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RecipientResolution {
    /// Unique E.164 numbers in group order
    pub phones: Vec<String>,
    pub skipped: Vec<SkippedRecipient>,
}

/// Turn a group into the phone numbers to send to.
///
/// Dynamic groups are resolved by the backend through `ranking`.
pub async fn resolve_recipients(
    group: &SmsGroup,
    members: &[Member],
    ranking: &dyn RankingService,
) -> Result<RecipientResolution> {
    let member_ids = match group.kind {
        GroupKind::Static => group.member_ids.clone(),
        GroupKind::Dynamic => ranking.resolve_dynamic_group(&group.id).await?,
    };
    let resolution = recipients_for(&member_ids, members);
    debug!(
        group = %group.name,
        recipients = resolution.phones.len(),
        skipped = resolution.skipped.len(),
        "Resolved SMS recipients"
    );
    Ok(resolution)
}

fn recipients_for(member_ids: &[String], members: &[Member]) -> RecipientResolution {
    let by_id: HashMap<&str, &Member> = members.iter().map(|m| (m.id.as_str(), m)).collect();
    let mut seen = HashSet::new();
    let mut resolution = RecipientResolution::default();

    for id in member_ids {
        let Some(member) = by_id.get(id.as_str()) else {
            resolution.skipped.push(SkippedRecipient {
                member_id: id.clone(),
                name: None,
                reason: SkipReason::UnknownMember,
            });
            continue;
        };
        match member.phone.as_deref().and_then(normalize_phone) {
            Some(phone) => {
                if seen.insert(phone.clone()) {
                    resolution.phones.push(phone);
                }
            }
            None => resolution.skipped.push(SkippedRecipient {
                member_id: id.clone(),
                name: Some(member.display_name()),
                reason: SkipReason::NoPhone,
            }),
        }
    }
    resolution
}

/// One line of the message log as shown to an admin.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboxEntry {
    Single(SmsMessage),
    Broadcast {
        body: String,
        sent_at: String,
        recipients: Vec<String>,
    },
}

impl InboxEntry {
    pub fn body(&self) -> &str {
        match self {
            InboxEntry::Single(message) => &message.body,
            InboxEntry::Broadcast { body, .. } => body,
        }
    }

    pub fn timestamp(&self) -> &str {
        match self {
            InboxEntry::Single(message) => &message.created_at,
            InboxEntry::Broadcast { sent_at, .. } => sent_at,
        }
    }
}

struct PendingBroadcast {
    first: SmsMessage,
    recipients: Vec<String>,
    last_at: DateTime<Utc>,
}

impl PendingBroadcast {
    fn accepts(&self, message: &SmsMessage) -> bool {
        let Some(at) = message.created() else {
            return false;
        };
        message.direction == Direction::Outbound
            && message.body.trim() == self.first.body.trim()
            && at >= self.last_at
            && at - self.last_at <= Duration::seconds(BROADCAST_WINDOW_SECS)
    }

    fn finish(self) -> InboxEntry {
        if self.recipients.len() == 1 {
            InboxEntry::Single(self.first)
        } else {
            InboxEntry::Broadcast {
                body: self.first.body.trim().to_string(),
                sent_at: self.first.created_at,
                recipients: self.recipients,
            }
        }
    }
}

/// Collapse runs of identical outbound messages into broadcasts.
///
/// Messages are taken in chronological order. An outbound message joins the
/// current run when its trimmed body matches and it was sent within
/// [`BROADCAST_WINDOW_SECS`] of the previous message in the run. Inbound
/// messages always stand alone and end any run.
pub fn group_broadcasts(messages: &[SmsMessage]) -> Vec<InboxEntry> {
    let mut ordered: Vec<&SmsMessage> = messages.iter().collect();
    // Stable, undated messages keep their relative place at the start
    ordered.sort_by_key(|m| m.created());

    let mut entries = Vec::new();
    let mut pending: Option<PendingBroadcast> = None;

    for message in ordered {
        if let Some(run) = pending.as_mut() {
            if run.accepts(message) {
                run.recipients.push(message.phone.clone());
                if let Some(at) = message.created() {
                    run.last_at = at;
                }
                continue;
            }
        }
        if let Some(run) = pending.take() {
            entries.push(run.finish());
        }

        match (message.direction, message.created()) {
            (Direction::Outbound, Some(at)) => {
                pending = Some(PendingBroadcast {
                    first: message.clone(),
                    recipients: vec![message.phone.clone()],
                    last_at: at,
                });
            }
            _ => entries.push(InboxEntry::Single(message.clone())),
        }
    }
    if let Some(run) = pending.take() {
        entries.push(run.finish());
    }
    entries
}

/// All messages exchanged with one phone number.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Conversation {
    pub phone: String,
    pub member_id: Option<String>,
    /// Oldest first
    pub messages: Vec<SmsMessage>,
}

impl Conversation {
    pub fn last_activity(&self) -> Option<DateTime<Utc>> {
        self.messages.iter().filter_map(SmsMessage::created).max()
    }

    pub fn unanswered(&self) -> bool {
        self.messages
            .last()
            .map(|m| m.direction == Direction::Inbound)
            .unwrap_or(false)
    }
}

/// Split the log into per-phone threads, most recently active first.
pub fn conversations(messages: &[SmsMessage]) -> Vec<Conversation> {
    let mut threads: Vec<Conversation> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    let mut ordered: Vec<&SmsMessage> = messages.iter().collect();
    ordered.sort_by_key(|m| m.created());

    for message in ordered {
        let phone = normalize_phone(&message.phone).unwrap_or_else(|| message.phone.clone());
        let slot = *index.entry(phone.clone()).or_insert_with(|| {
            threads.push(Conversation {
                phone,
                member_id: None,
                messages: Vec::new(),
            });
            threads.len() - 1
        });
        let thread = &mut threads[slot];
        if thread.member_id.is_none() {
            thread.member_id = message.member_id.clone();
        }
        thread.messages.push(message.clone());
    }

    threads.sort_by_key(|t| std::cmp::Reverse(t.last_activity()));
    threads
}
