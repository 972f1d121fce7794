//! Membership category rules.
//!
//! The windows are counted in 30-day blocks rather than calendar months;
//! existing categorizations depend on that exact arithmetic.

use std::collections::HashSet;

use chrono::{DateTime, Duration, Utc};

use crate::models::{CategorizedMember, Category, Member};

/// A fee paid within this many 30-day blocks counts as current.
const FEE_WINDOW_BLOCKS: i64 = 13;

/// A visit within this many 30-day blocks counts as recent.
const VISIT_WINDOW_BLOCKS: i64 = 3;

const BLOCK_DAYS: i64 = 30;

fn within(value: Option<DateTime<Utc>>, blocks: i64, now: DateTime<Utc>) -> bool {
    let cutoff = now - Duration::days(blocks * BLOCK_DAYS);
    value.map(|v| v > cutoff).unwrap_or(false)
}

/// Assign a member to exactly one category.
///
/// Rules are evaluated in order and the first match wins:
/// paid and visiting is MEDLEM, paid only is SPONSOR, a server-side queue
/// status is KÖANDE, a medbadare link or access without any fee history is
/// MEDBADARE, and everything else is INAKTIV.
pub fn classify(member: &Member, is_linked_as_medbadare: bool, now: DateTime<Utc>) -> Category {
    let has_paid_membership_fee = within(member.last_annual_fee(), FEE_WINDOW_BLOCKS, now)
        || within(member.last_entrance_fee(), FEE_WINDOW_BLOCKS, now);
    let has_recent_visits = within(member.last_visit(), VISIT_WINDOW_BLOCKS, now);

    if has_paid_membership_fee && has_recent_visits {
        Category::Medlem
    } else if has_paid_membership_fee {
        Category::Sponsor
    } else if member.is_queued() {
        Category::Koande
    } else if is_linked_as_medbadare
        || (member.has_access() && !member.has_ever_paid_membership_fee())
    {
        Category::Medbadare
    } else {
        Category::Inaktiv
    }
}

/// Ids of every member that appears in some member's relation list.
pub fn linked_medbadare_ids(members: &[Member]) -> HashSet<&str> {
    members
        .iter()
        .flat_map(|m| m.related_member_ids.iter())
        .map(String::as_str)
        .collect()
}

/// Classify a whole directory, resolving medbadare links within it.
pub fn categorize(members: Vec<Member>, now: DateTime<Utc>) -> Vec<CategorizedMember> {
    let linked: HashSet<String> = linked_medbadare_ids(&members)
        .into_iter()
        .map(str::to_string)
        .collect();

    members
        .into_iter()
        .map(|member| {
            let category = classify(&member, linked.contains(&member.id), now);
            CategorizedMember { member, category }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    fn days_ago(days: i64) -> Option<String> {
        Some((now() - Duration::days(days)).to_rfc3339())
    }

    fn member() -> Member {
        Member {
            id: "m1".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_paid_and_visiting_is_medlem_regardless_of_access() {
        let mut m = member();
        m.last_annual_fee_date = days_ago(100);
        m.last_visit_at = days_ago(10);
        assert_eq!(classify(&m, false, now()), Category::Medlem);

        m.aptus_user_id = Some("rfid-9".to_string());
        assert_eq!(classify(&m, true, now()), Category::Medlem);
    }

    #[test]
    fn test_entrance_fee_alone_counts_as_paid() {
        let mut m = member();
        m.last_entrance_fee_date = days_ago(389);
        m.last_visit_at = days_ago(89);
        assert_eq!(classify(&m, false, now()), Category::Medlem);
    }

    #[test]
    fn test_paid_without_visits_is_sponsor() {
        let mut m = member();
        m.last_annual_fee_date = days_ago(30);
        m.last_visit_at = days_ago(91);
        m.status = Some("KÖANDE".to_string());
        assert_eq!(classify(&m, false, now()), Category::Sponsor);
    }

    #[test]
    fn test_window_boundaries_use_thirty_day_blocks() {
        let mut m = member();
        m.last_annual_fee_date = days_ago(390);
        m.last_visit_at = days_ago(5);
        // Exactly 13 x 30 days old is outside the window
        assert_eq!(classify(&m, false, now()), Category::Inaktiv);

        m.last_annual_fee_date = days_ago(389);
        m.last_visit_at = days_ago(90);
        assert_eq!(classify(&m, false, now()), Category::Sponsor);
    }

    #[test]
    fn test_queue_status_beats_access_based_medbadare() {
        let mut m = member();
        m.status = Some("KÖANDE".to_string());
        m.aptus_user_id = Some("rfid-1".to_string());
        assert_eq!(classify(&m, false, now()), Category::Koande);
        assert_eq!(classify(&m, true, now()), Category::Koande);
    }

    #[test]
    fn test_queue_fee_history_is_ignored() {
        let mut m = member();
        m.last_queue_fee_date = days_ago(10);
        m.first_queue_fee_date = days_ago(700);
        assert_eq!(classify(&m, false, now()), Category::Inaktiv);
    }

    #[test]
    fn test_linked_member_is_medbadare() {
        let m = member();
        assert_eq!(classify(&m, true, now()), Category::Medbadare);
    }

    #[test]
    fn test_access_without_fee_history_is_medbadare() {
        let mut m = member();
        m.parakey_user_id = Some("pk-1".to_string());
        assert_eq!(classify(&m, false, now()), Category::Medbadare);

        // Any old fee disqualifies the inferred co-bather branch
        m.last_annual_fee_date = days_ago(2000);
        assert_eq!(classify(&m, false, now()), Category::Inaktiv);
    }

    #[test]
    fn test_lapsed_member_without_access_is_inaktiv() {
        let mut m = member();
        m.last_annual_fee_date = days_ago(800);
        m.last_entrance_fee_date = days_ago(3000);
        m.last_visit_at = days_ago(1);
        assert_eq!(classify(&m, false, now()), Category::Inaktiv);
    }

    #[test]
    fn test_future_dates_count_as_within_window() {
        let mut m = member();
        m.last_annual_fee_date = days_ago(-10);
        m.last_visit_at = days_ago(-1);
        assert_eq!(classify(&m, false, now()), Category::Medlem);

        m.last_visit_at = None;
        assert_eq!(classify(&m, false, now()), Category::Sponsor);
    }

    #[test]
    fn test_nothing_is_inaktiv() {
        assert_eq!(classify(&member(), false, now()), Category::Inaktiv);
    }

    #[test]
    fn test_malformed_dates_do_not_count() {
        let mut m = member();
        m.last_annual_fee_date = Some("yesterday".to_string());
        m.last_visit_at = Some("".to_string());
        assert_eq!(classify(&m, false, now()), Category::Inaktiv);
    }

    #[test]
    fn test_categorize_resolves_links() {
        let owner = Member {
            id: "owner".to_string(),
            related_member_ids: vec!["guest".to_string()],
            ..Default::default()
        };
        let guest = Member {
            id: "guest".to_string(),
            ..Default::default()
        };
        let categorized = categorize(vec![owner, guest], now());
        assert_eq!(categorized[0].category, Category::Inaktiv);
        assert_eq!(categorized[1].category, Category::Medbadare);
    }

    #[test]
    fn test_classify_is_total_over_field_combinations() {
        let fee = [None, days_ago(10), days_ago(1000), Some("x".to_string())];
        let visit = [None, days_ago(10), days_ago(200)];
        let status = [None, Some("KÖANDE".to_string()), Some("AKTIV".to_string())];
        let access = [None, Some("id".to_string())];

        for annual in &fee {
            for last_visit in &visit {
                for s in &status {
                    for aptus in &access {
                        for linked in [false, true] {
                            let m = Member {
                                last_annual_fee_date: annual.clone(),
                                last_visit_at: last_visit.clone(),
                                status: s.clone(),
                                aptus_user_id: aptus.clone(),
                                ..member()
                            };
                            let category = classify(&m, linked, now());
                            assert!(Category::ALL.contains(&category));
                        }
                    }
                }
            }
        }
    }
}
