//! Plain-text rendering for terminal output.

use chrono::{DateTime, Utc};

use bastu_core::access::{AccessEventRow, AccessSummary};
use bastu_core::cache::CacheAges;
use bastu_core::display::{member_age, tenure_years, DisplayOptions};
use bastu_core::models::{
    CategorizedMember, CategoryCounts, Direction, LeaderboardEntry, MemberBadge, SmsGroup,
    SmsMessage,
};
use bastu_core::sms::{Conversation, InboxEntry, RecipientResolution, SkipReason};
use bastu_core::utils::{format_date, format_phone, truncate};

const NAME_WIDTH: usize = 28;
const BODY_WIDTH: usize = 60;

fn or_dash(value: Option<String>) -> String {
    value.unwrap_or_else(|| "-".to_string())
}

// ============================================================================
// Members
// ============================================================================

/// Heading above the member table, e.g. `Bastuklubben · kö`.
pub fn title_line(organization: &str, options: &DisplayOptions) -> String {
    if options.queue_view {
        format!("{} · kö", organization)
    } else {
        format!("{} · medlemmar", organization)
    }
}

pub fn member_header(options: &DisplayOptions) -> String {
    if options.queue_view {
        format!("{:>4}  {:>7}  {:<NAME_WIDTH$}  {:<10}  {:<14}", "#", "Kundnr", "Namn", "I kö sedan", "Telefon")
    } else {
        format!(
            "{:>7}  {:<NAME_WIDTH$}  {:<10}  {:>5}  {:>5}  {:>9}  {:<14}  {:<10}",
            "Kundnr",
            "Namn",
            "Kategori",
            options.period.label(),
            "Ålder",
            "Medl.år",
            "Telefon",
            "Senast"
        )
    }
}

/// One table line. `position` is the 1-based row number, used as queue place.
pub fn member_line(
    entry: &CategorizedMember,
    position: usize,
    options: &DisplayOptions,
    now: DateTime<Utc>,
) -> String {
    let m = &entry.member;
    let number = m.customer_number.clone().unwrap_or_default();
    let name = truncate(&m.display_name(), NAME_WIDTH);
    let phone = m.phone.as_deref().map(format_phone).unwrap_or_default();

    if options.queue_view {
        let since = m
            .queue_entry_date()
            .map(|d| d.format("%Y-%m-%d").to_string());
        return format!(
            "{:>4}  {:>7}  {:<NAME_WIDTH$}  {:<10}  {:<14}",
            position,
            number,
            name,
            or_dash(since),
            phone
        );
    }

    let age = member_age(m, now.date_naive()).map(|a| a.to_string());
    let tenure = tenure_years(m, now).map(|y| format!("{:.1}", y));
    format!(
        "{:>7}  {:<NAME_WIDTH$}  {:<10}  {:>5}  {:>5}  {:>9}  {:<14}  {:<10}",
        number,
        name,
        entry.category.label(),
        m.visits_for(options.period),
        or_dash(age),
        or_dash(tenure),
        phone,
        format_date(m.last_visit_at.as_deref())
    )
}

pub fn counts_line(counts: &CategoryCounts) -> String {
    format!("{} · totalt {}", counts.summary(), counts.total())
}

// ============================================================================
// Access events
// ============================================================================

pub fn event_line(row: &AccessEventRow) -> String {
    let when = row
        .occurred
        .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| row.event.occurred_at.clone());
    let outcome = if row.event.granted { "ok" } else { "NEKAD" };
    format!(
        "{:<16}  {:<7}  {:<5}  {:<NAME_WIDTH$}  {}",
        when,
        row.event.source,
        outcome,
        truncate(&row.member_name, NAME_WIDTH),
        row.event.door.as_deref().unwrap_or("")
    )
}

pub fn summary_line(summary: &AccessSummary) -> String {
    let sources: Vec<String> = summary
        .by_source
        .iter()
        .map(|(source, count)| format!("{} {}", source, count))
        .collect();
    format!(
        "{} händelser, {} nekade ({})",
        summary.total,
        summary.denied,
        sources.join(", ")
    )
}

// ============================================================================
// SMS
// ============================================================================

pub fn group_line(group: &SmsGroup) -> String {
    let size = match group.kind {
        bastu_core::models::GroupKind::Static => format!("{} medlemmar", group.member_ids.len()),
        bastu_core::models::GroupKind::Dynamic => "dynamisk".to_string(),
    };
    format!("{:<36}  {:<24}  {}", group.id, truncate(&group.name, 24), size)
}

pub fn recipients_report(resolution: &RecipientResolution) -> Vec<String> {
    let mut lines = vec![format!("{} mottagare", resolution.phones.len())];
    for skipped in &resolution.skipped {
        let reason = match skipped.reason {
            SkipReason::UnknownMember => "okänd medlem",
            SkipReason::NoPhone => "saknar giltigt telefonnummer",
        };
        let who = skipped.name.as_deref().unwrap_or(&skipped.member_id);
        lines.push(format!("  hoppar över {}: {}", who, reason));
    }
    lines
}

fn message_time(created_at: &str) -> String {
    bastu_core::utils::parse_timestamp(created_at)
        .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| created_at.to_string())
}

pub fn inbox_line(entry: &InboxEntry) -> String {
    match entry {
        InboxEntry::Single(message) => message_line(message),
        InboxEntry::Broadcast {
            body,
            sent_at,
            recipients,
        } => format!(
            "{}  ut  {:<14}  {}",
            message_time(sent_at),
            format!("{} mottagare", recipients.len()),
            truncate(body, BODY_WIDTH)
        ),
    }
}

pub fn message_line(message: &SmsMessage) -> String {
    let arrow = match message.direction {
        Direction::Inbound => "in",
        Direction::Outbound => "ut",
    };
    format!(
        "{}  {}  {:<14}  {}",
        message_time(&message.created_at),
        arrow,
        format_phone(&message.phone),
        truncate(message.body.trim(), BODY_WIDTH)
    )
}

pub fn conversation_line(conversation: &Conversation) -> String {
    let last = conversation
        .last_activity()
        .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "-".to_string());
    let flag = if conversation.unanswered() { "  obesvarad" } else { "" };
    format!(
        "{:<14}  {:>3} meddelanden  senast {}{}",
        format_phone(&conversation.phone),
        conversation.messages.len(),
        last,
        flag
    )
}

// ============================================================================
// Badges
// ============================================================================

pub fn leaderboard_line(entry: &LeaderboardEntry) -> String {
    let rank = entry
        .rank
        .map(|r| r.to_string())
        .unwrap_or_else(|| "-".to_string());
    format!(
        "{:>3}. {:<NAME_WIDTH$}  {:>3} märken  {:>5} p",
        rank,
        truncate(&entry.display_name, NAME_WIDTH),
        entry.badge_count,
        entry.points
    )
}

pub fn badge_line(badge: &MemberBadge) -> String {
    format!("       {} ({})", badge.name, format_date(Some(&badge.awarded_at)))
}

// ============================================================================
// Cache
// ============================================================================

pub fn cache_lines(ages: &CacheAges) -> Vec<String> {
    ages.entries()
        .iter()
        .map(|(name, age)| format!("{:<14} {}", name, age))
        .collect()
}
