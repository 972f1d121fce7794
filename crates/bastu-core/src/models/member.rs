use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use super::Category;
use crate::utils::{is_blank, parse_leading_int, parse_timestamp};

/// Accept either a JSON string or a JSON number for numeric-as-string columns.
fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Int(i64),
        Float(f64),
    }

    Ok(match Option::<Raw>::deserialize(deserializer)? {
        Some(Raw::Text(s)) => Some(s),
        Some(Raw::Int(n)) => Some(n.to_string()),
        Some(Raw::Float(n)) => Some(n.to_string()),
        None => None,
    })
}

/// A row of the `members` table, enriched with visit aggregates and
/// medbadare relations.
///
/// Dates are kept exactly as the backend sent them and parsed on demand; a
/// malformed date reads as absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct Member {
    pub id: String,
    #[serde(default, deserialize_with = "string_or_number")]
    pub customer_number: Option<String>,
    #[serde(default, alias = "personnummer")]
    pub personal_identity_number: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub status: Option<String>,

    // Fee history
    #[serde(default)]
    pub last_annual_fee_date: Option<String>,
    #[serde(default)]
    pub last_entrance_fee_date: Option<String>,
    #[serde(default)]
    pub last_queue_fee_date: Option<String>,
    #[serde(default)]
    pub first_queue_fee_date: Option<String>,
    #[serde(default)]
    pub fortnox_customer_since: Option<String>,

    // Access identifiers
    #[serde(default)]
    pub aptus_user_id: Option<String>,
    #[serde(default)]
    pub parakey_user_id: Option<String>,

    // Enrichment
    #[serde(default)]
    pub last_visit_at: Option<String>,
    #[serde(default)]
    pub visits_week: u32,
    #[serde(default)]
    pub visits_month: u32,
    #[serde(default, rename = "visits_3months")]
    pub visits_quarter: u32,
    #[serde(default)]
    pub related_member_ids: Vec<String>,
}

impl Member {
    pub fn full_name(&self) -> String {
        let first = self.first_name.as_deref().unwrap_or("").trim();
        let last = self.last_name.as_deref().unwrap_or("").trim();
        format!("{} {}", first, last).trim().to_string()
    }

    /// "Last, First" for list views, falling back to whichever part exists.
    pub fn display_name(&self) -> String {
        let first = self.first_name.as_deref().unwrap_or("").trim();
        let last = self.last_name.as_deref().unwrap_or("").trim();
        match (first.is_empty(), last.is_empty()) {
            (false, false) => format!("{}, {}", last, first),
            (true, false) => last.to_string(),
            (false, true) => first.to_string(),
            (true, true) => "(namnlös)".to_string(),
        }
    }

    /// Customer number as an integer, if it has a parseable leading integer.
    pub fn customer_number_value(&self) -> Option<i64> {
        self.customer_number.as_deref().and_then(parse_leading_int)
    }

    /// Trimmed personal identity number, `None` when blank.
    pub fn identity_key(&self) -> Option<&str> {
        self.personal_identity_number
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
    }

    pub fn is_queued(&self) -> bool {
        self.status.as_deref() == Some(Category::Koande.label())
    }

    pub fn has_access(&self) -> bool {
        !is_blank(self.aptus_user_id.as_deref()) || !is_blank(self.parakey_user_id.as_deref())
    }

    /// True if any annual or entrance fee date is recorded, however old.
    pub fn has_ever_paid_membership_fee(&self) -> bool {
        !is_blank(self.last_annual_fee_date.as_deref())
            || !is_blank(self.last_entrance_fee_date.as_deref())
    }

    pub fn last_annual_fee(&self) -> Option<DateTime<Utc>> {
        self.last_annual_fee_date.as_deref().and_then(parse_timestamp)
    }

    pub fn last_entrance_fee(&self) -> Option<DateTime<Utc>> {
        self.last_entrance_fee_date.as_deref().and_then(parse_timestamp)
    }

    pub fn last_visit(&self) -> Option<DateTime<Utc>> {
        self.last_visit_at.as_deref().and_then(parse_timestamp)
    }

    /// When the applicant entered the queue: the invoicing customer date if
    /// known, else the first queue fee payment.
    pub fn queue_entry_date(&self) -> Option<DateTime<Utc>> {
        self.fortnox_customer_since
            .as_deref()
            .and_then(parse_timestamp)
            .or_else(|| self.first_queue_fee_date.as_deref().and_then(parse_timestamp))
    }

    pub fn visits_for(&self, period: VisitPeriod) -> u32 {
        match period {
            VisitPeriod::Week => self.visits_week,
            VisitPeriod::Month => self.visits_month,
            VisitPeriod::Quarter => self.visits_quarter,
        }
    }
}

/// A member together with its computed category, for one render pass.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct CategorizedMember {
    #[serde(flatten)]
    pub member: Member,
    pub category: Category,
}

/// Reporting period for visit counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub enum VisitPeriod {
    Week,
    #[default]
    Month,
    Quarter,
}

impl VisitPeriod {
    pub fn label(&self) -> &'static str {
        match self {
            VisitPeriod::Week => "vecka",
            VisitPeriod::Month => "månad",
            VisitPeriod::Quarter => "3 mån",
        }
    }
}

/// Per-member visit aggregates as returned by the `member_visit_stats` procedure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VisitStats {
    pub member_id: String,
    #[serde(default)]
    pub visits_week: u32,
    #[serde(default)]
    pub visits_month: u32,
    #[serde(default)]
    pub visits_3months: u32,
    #[serde(default)]
    pub last_visit_at: Option<String>,
}

/// A row of `member_relations`: `related_member_id` bathes on `member_id`'s membership.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberRelation {
    pub member_id: String,
    pub related_member_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_member_deserialize_numeric_customer_number() {
        let member: Member = serde_json::from_str(
            r#"{"id": "m1", "customer_number": 1042, "personnummer": "19800115-1234"}"#,
        )
        .unwrap();
        assert_eq!(member.customer_number.as_deref(), Some("1042"));
        assert_eq!(member.customer_number_value(), Some(1042));
        assert_eq!(member.identity_key(), Some("19800115-1234"));
        assert_eq!(member.visits_week, 0);
        assert!(member.related_member_ids.is_empty());
    }

    #[test]
    fn test_member_deserialize_string_customer_number() {
        let member: Member =
            serde_json::from_str(r#"{"id": "m1", "customer_number": "K-17", "visits_3months": 9}"#)
                .unwrap();
        assert_eq!(member.customer_number_value(), None);
        assert_eq!(member.visits_for(VisitPeriod::Quarter), 9);
    }

    #[test]
    fn test_member_names() {
        let member = Member {
            first_name: Some("Åsa".to_string()),
            last_name: Some("Öberg".to_string()),
            ..Default::default()
        };
        assert_eq!(member.full_name(), "Åsa Öberg");
        assert_eq!(member.display_name(), "Öberg, Åsa");

        let nameless = Member::default();
        assert_eq!(nameless.full_name(), "");
        assert_eq!(nameless.display_name(), "(namnlös)");
    }

    #[test]
    fn test_member_access_and_fee_presence() {
        let mut member = Member::default();
        assert!(!member.has_access());
        assert!(!member.has_ever_paid_membership_fee());

        member.parakey_user_id = Some("pk-1".to_string());
        member.last_entrance_fee_date = Some("garbage".to_string());
        assert!(member.has_access());
        // Presence counts even when the value does not parse
        assert!(member.has_ever_paid_membership_fee());
        assert!(member.last_entrance_fee().is_none());

        member.aptus_user_id = Some("   ".to_string());
        member.parakey_user_id = None;
        assert!(!member.has_access());
    }

    #[test]
    fn test_queue_entry_date_prefers_customer_since() {
        let member = Member {
            fortnox_customer_since: Some("2021-04-01".to_string()),
            first_queue_fee_date: Some("2020-01-01".to_string()),
            ..Default::default()
        };
        assert_eq!(
            member.queue_entry_date().unwrap().format("%Y-%m-%d").to_string(),
            "2021-04-01"
        );

        let fallback = Member {
            fortnox_customer_since: Some("bogus".to_string()),
            first_queue_fee_date: Some("2020-01-01".to_string()),
            ..Default::default()
        };
        assert_eq!(
            fallback.queue_entry_date().unwrap().format("%Y-%m-%d").to_string(),
            "2020-01-01"
        );
    }

    #[test]
    fn test_is_queued_requires_exact_status() {
        let mut member = Member {
            status: Some("KÖANDE".to_string()),
            ..Default::default()
        };
        assert!(member.is_queued());
        member.status = Some("köande".to_string());
        assert!(!member.is_queued());
    }
}
