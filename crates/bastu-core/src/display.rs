//! Member list resolution: filtering, duplicate collapsing and sorting.
//!
//! The same person can have several member rows (for instance a queue
//! application and a later membership). Within one category those rows are
//! collapsed to the one with the highest customer number; rows in different
//! categories are always kept apart.

use std::cmp::Ordering;
use std::collections::BTreeSet;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::identity;
use crate::models::{CategorizedMember, Category, Member, VisitPeriod};
use crate::utils::{cmp_swedish, contains_ignore_case};

// ============================================================================
// Sort settings
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
    #[default]
    CustomerNumber,
    Name,
    Visits,
    Age,
    Tenure,
}

impl SortKey {
    /// Direction a column starts in when first selected.
    pub fn default_direction(&self) -> SortDirection {
        match self {
            SortKey::Visits => SortDirection::Descending,
            _ => SortDirection::Ascending,
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            SortKey::CustomerNumber => "Kundnr",
            SortKey::Name => "Namn",
            SortKey::Visits => "Besök",
            SortKey::Age => "Ålder",
            SortKey::Tenure => "Medlemsår",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    #[default]
    Ascending,
    Descending,
}

impl SortDirection {
    pub fn toggled(&self) -> Self {
        match self {
            SortDirection::Ascending => SortDirection::Descending,
            SortDirection::Descending => SortDirection::Ascending,
        }
    }

    fn apply(&self, ordering: Ordering) -> Ordering {
        match self {
            SortDirection::Ascending => ordering,
            SortDirection::Descending => ordering.reverse(),
        }
    }
}

/// Everything that decides the order of the member list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DisplayOptions {
    pub sort_key: SortKey,
    pub direction: SortDirection,
    pub period: VisitPeriod,
    /// Only applicants are shown; order by queue position instead of `sort_key`.
    pub queue_view: bool,
}

impl DisplayOptions {
    pub fn for_filter(
        filter: &MemberFilter,
        sort_key: SortKey,
        direction: SortDirection,
        period: VisitPeriod,
    ) -> Self {
        Self {
            sort_key,
            direction,
            period,
            queue_view: filter.is_queue_view(),
        }
    }

    /// Select a sort column: re-selecting flips the direction, a new column
    /// starts in its default direction.
    pub fn toggle_sort(&mut self, key: SortKey) {
        if self.sort_key == key {
            self.direction = self.direction.toggled();
        } else {
            self.sort_key = key;
            self.direction = key.default_direction();
        }
    }
}

// ============================================================================
// Filtering
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemberFilter {
    /// Categories to show. Empty shows all of them.
    pub categories: BTreeSet<Category>,
    pub search: Option<String>,
}

impl MemberFilter {
    pub fn only(category: Category) -> Self {
        Self {
            categories: BTreeSet::from([category]),
            search: None,
        }
    }

    /// True when the filter selects applicants and nothing else.
    pub fn is_queue_view(&self) -> bool {
        self.categories.len() == 1 && self.categories.contains(&Category::Koande)
    }

    pub fn matches(&self, entry: &CategorizedMember) -> bool {
        if !self.categories.is_empty() && !self.categories.contains(&entry.category) {
            return false;
        }
        match self.search.as_deref().map(str::trim).filter(|q| !q.is_empty()) {
            Some(query) => Self::member_matches_search(&entry.member, &query.to_lowercase()),
            None => true,
        }
    }

    /// Query must already be lowercased.
    fn member_matches_search(member: &Member, query: &str) -> bool {
        contains_ignore_case(&member.full_name(), query)
            || [
                &member.email,
                &member.phone,
                &member.customer_number,
                &member.personal_identity_number,
            ]
            .iter()
            .any(|field| {
                field
                    .as_deref()
                    .map(|s| contains_ignore_case(s, query))
                    .unwrap_or(false)
            })
    }

    pub fn apply(&self, members: Vec<CategorizedMember>) -> Vec<CategorizedMember> {
        members.into_iter().filter(|m| self.matches(m)).collect()
    }
}

// ============================================================================
// Deduplication
// ============================================================================

/// Collapse rows for the same person within the same category.
///
/// Rows sharing a non-empty identity number and a category form a group; the
/// row with the highest parseable customer number survives (the first one on
/// ties). Rows without a parseable customer number never survive, so a group
/// where none parses disappears entirely. Rows without an identity number are
/// always kept. Survivors take the position of their group's first row.
pub fn deduplicate(members: Vec<CategorizedMember>) -> Vec<CategorizedMember> {
    let count = members.len();
    let mut consumed = vec![false; count];
    let mut survivors: Vec<usize> = Vec::with_capacity(count);

    for i in 0..count {
        if consumed[i] {
            continue;
        }
        consumed[i] = true;

        let Some(key) = members[i].member.identity_key() else {
            survivors.push(i);
            continue;
        };
        let category = members[i].category;

        let mut group = vec![i];
        for j in (i + 1)..count {
            if !consumed[j]
                && members[j].category == category
                && members[j].member.identity_key() == Some(key)
            {
                consumed[j] = true;
                group.push(j);
            }
        }

        if group.len() == 1 {
            survivors.push(i);
            continue;
        }

        let mut best: Option<(usize, i64)> = None;
        for &j in &group {
            if let Some(number) = members[j].member.customer_number_value() {
                if best.map(|(_, top)| number > top).unwrap_or(true) {
                    best = Some((j, number));
                }
            }
        }
        if let Some((j, _)) = best {
            survivors.push(j);
        }
    }

    let mut slots: Vec<Option<CategorizedMember>> = members.into_iter().map(Some).collect();
    survivors
        .into_iter()
        .filter_map(|i| slots[i].take())
        .collect()
}

// ============================================================================
// Sorting
// ============================================================================

/// Order present values by `direction` and put missing values last either way.
fn cmp_missing_last<T: Ord>(a: Option<T>, b: Option<T>, direction: SortDirection) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => direction.apply(a.cmp(&b)),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Age in whole years, from the identity number.
pub fn member_age(member: &Member, today: NaiveDate) -> Option<i32> {
    member
        .identity_key()
        .and_then(|pnr| identity::age_on(pnr, today))
}

/// Days since the entrance fee was paid.
pub fn tenure_days(member: &Member, now: DateTime<Utc>) -> Option<i64> {
    member.last_entrance_fee().map(|paid| (now - paid).num_days())
}

/// Years since the entrance fee was paid, for display.
pub fn tenure_years(member: &Member, now: DateTime<Utc>) -> Option<f64> {
    tenure_days(member, now).map(|days| days as f64 / 365.25)
}

/// Sort in place. Stable, so equal rows keep their relative order.
pub fn sort_members(members: &mut [CategorizedMember], options: &DisplayOptions, now: DateTime<Utc>) {
    if options.queue_view {
        // First in queue first, whatever the direction toggle says
        members.sort_by(|a, b| {
            cmp_missing_last(
                a.member.queue_entry_date(),
                b.member.queue_entry_date(),
                SortDirection::Ascending,
            )
        });
        return;
    }

    let today = now.date_naive();
    let direction = options.direction;

    members.sort_by(|a, b| {
        let (a, b) = (&a.member, &b.member);
        match options.sort_key {
            SortKey::CustomerNumber => direction.apply(
                a.customer_number_value()
                    .unwrap_or(0)
                    .cmp(&b.customer_number_value().unwrap_or(0)),
            ),
            SortKey::Name => direction.apply(cmp_swedish(&a.full_name(), &b.full_name())),
            SortKey::Visits => direction.apply(
                a.visits_for(options.period)
                    .cmp(&b.visits_for(options.period)),
            ),
            SortKey::Age => cmp_missing_last(member_age(a, today), member_age(b, today), direction),
            SortKey::Tenure => {
                cmp_missing_last(tenure_days(a, now), tenure_days(b, now), direction)
            }
        }
    });
}

/// Deduplicate then sort an already filtered, categorized list.
pub fn resolve_display_list(
    members: Vec<CategorizedMember>,
    options: &DisplayOptions,
    now: DateTime<Utc>,
) -> Vec<CategorizedMember> {
    let mut resolved = deduplicate(members);
    sort_members(&mut resolved, options, now);
    resolved
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    fn entry(id: &str, category: Category) -> CategorizedMember {
        CategorizedMember {
            member: Member {
                id: id.to_string(),
                ..Default::default()
            },
            category,
        }
    }

    fn with_pnr(mut e: CategorizedMember, pnr: &str, customer_number: Option<&str>) -> CategorizedMember {
        e.member.personal_identity_number = Some(pnr.to_string());
        e.member.customer_number = customer_number.map(str::to_string);
        e
    }

    fn ids(members: &[CategorizedMember]) -> Vec<&str> {
        members.iter().map(|m| m.member.id.as_str()).collect()
    }

    // -------------------------------------------------------------------------
    // Deduplication
    // -------------------------------------------------------------------------

    #[test]
    fn test_dedup_keeps_highest_customer_number() {
        let members = vec![
            with_pnr(entry("a", Category::Medlem), "19800115-1234", Some("100")),
            with_pnr(entry("b", Category::Medlem), "19800115-1234", Some("250")),
            with_pnr(entry("c", Category::Medlem), "19800115-1234", Some("n/a")),
        ];
        assert_eq!(ids(&deduplicate(members)), vec!["b"]);
    }

    #[test]
    fn test_dedup_never_merges_across_categories() {
        let members = vec![
            with_pnr(entry("queued", Category::Koande), "19800115-1234", Some("900")),
            with_pnr(entry("member", Category::Medlem), "19800115-1234", Some("100")),
        ];
        assert_eq!(ids(&deduplicate(members)), vec!["queued", "member"]);
    }

    #[test]
    fn test_dedup_matches_trimmed_identity_numbers() {
        let members = vec![
            with_pnr(entry("a", Category::Sponsor), " 800115-1234", Some("5")),
            with_pnr(entry("b", Category::Sponsor), "800115-1234 ", Some("6")),
        ];
        assert_eq!(ids(&deduplicate(members)), vec!["b"]);
    }

    #[test]
    fn test_dedup_group_without_parseable_numbers_vanishes() {
        let members = vec![
            entry("x", Category::Inaktiv),
            with_pnr(entry("a", Category::Inaktiv), "19800115-1234", None),
            with_pnr(entry("b", Category::Inaktiv), "19800115-1234", Some("")),
            entry("y", Category::Inaktiv),
        ];
        assert_eq!(ids(&deduplicate(members)), vec!["x", "y"]);
    }

    #[test]
    fn test_dedup_keeps_members_without_identity_number() {
        let members = vec![
            with_pnr(entry("a", Category::Medlem), "  ", Some("1")),
            with_pnr(entry("b", Category::Medlem), "", Some("2")),
            entry("c", Category::Medlem),
        ];
        assert_eq!(ids(&deduplicate(members)), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_dedup_single_member_kept_even_without_customer_number() {
        let members = vec![with_pnr(entry("a", Category::Medlem), "19800115-1234", None)];
        assert_eq!(ids(&deduplicate(members)), vec!["a"]);
    }

    #[test]
    fn test_dedup_survivor_takes_first_position_and_first_on_ties() {
        let members = vec![
            with_pnr(entry("a", Category::Medlem), "111", Some("10")),
            entry("other", Category::Medlem),
            with_pnr(entry("b", Category::Medlem), "111", Some("30")),
            with_pnr(entry("c", Category::Medlem), "111", Some("30")),
        ];
        assert_eq!(ids(&deduplicate(members)), vec!["b", "other"]);
    }

    #[test]
    fn test_dedup_is_idempotent() {
        let members = vec![
            with_pnr(entry("a", Category::Medlem), "1", Some("1")),
            with_pnr(entry("b", Category::Medlem), "1", Some("2")),
            with_pnr(entry("c", Category::Koande), "1", Some("3")),
            with_pnr(entry("d", Category::Koande), "2", None),
            entry("e", Category::Inaktiv),
        ];
        let once = deduplicate(members);
        let twice = deduplicate(once.clone());
        assert_eq!(once, twice);
    }

    // -------------------------------------------------------------------------
    // Sorting
    // -------------------------------------------------------------------------

    fn numbered(numbers: &[&str]) -> Vec<CategorizedMember> {
        numbers
            .iter()
            .map(|n| {
                let mut e = entry(n, Category::Medlem);
                e.member.customer_number = Some(n.to_string());
                e
            })
            .collect()
    }

    #[test]
    fn test_customer_number_sort_treats_unparseable_as_zero() {
        let mut members = numbered(&["", "50", "7"]);
        let options = DisplayOptions::default();
        sort_members(&mut members, &options, now());
        assert_eq!(ids(&members), vec!["", "7", "50"]);

        let options = DisplayOptions {
            direction: SortDirection::Descending,
            ..Default::default()
        };
        sort_members(&mut members, &options, now());
        assert_eq!(ids(&members), vec!["50", "7", ""]);
    }

    #[test]
    fn test_name_sort_uses_swedish_order() {
        let mut members: Vec<CategorizedMember> = ["Örjan", "anna", "Åke", "Zelda"]
            .iter()
            .map(|name| {
                let mut e = entry(name, Category::Medlem);
                e.member.first_name = Some(name.to_string());
                e
            })
            .collect();
        let options = DisplayOptions {
            sort_key: SortKey::Name,
            ..Default::default()
        };
        sort_members(&mut members, &options, now());
        assert_eq!(ids(&members), vec!["anna", "Zelda", "Åke", "Örjan"]);
    }

    #[test]
    fn test_visits_sort_uses_selected_period() {
        let mut a = entry("a", Category::Medlem);
        a.member.visits_week = 5;
        a.member.visits_month = 6;
        let mut b = entry("b", Category::Medlem);
        b.member.visits_week = 1;
        b.member.visits_month = 12;
        let mut members = vec![a, b];

        let mut options = DisplayOptions::default();
        options.toggle_sort(SortKey::Visits);
        assert_eq!(options.direction, SortDirection::Descending);

        options.period = VisitPeriod::Week;
        sort_members(&mut members, &options, now());
        assert_eq!(ids(&members), vec!["a", "b"]);

        options.period = VisitPeriod::Month;
        sort_members(&mut members, &options, now());
        assert_eq!(ids(&members), vec!["b", "a"]);
    }

    #[test]
    fn test_age_sort_puts_unknown_last_in_both_directions() {
        let mut old = entry("old", Category::Medlem);
        old.member.personal_identity_number = Some("19500101-0000".to_string());
        let mut young = entry("young", Category::Medlem);
        young.member.personal_identity_number = Some("050101-0000".to_string());
        let unknown = entry("unknown", Category::Medlem);
        let mut members = vec![unknown, old, young];

        let mut options = DisplayOptions {
            sort_key: SortKey::Age,
            ..Default::default()
        };
        sort_members(&mut members, &options, now());
        assert_eq!(ids(&members), vec!["young", "old", "unknown"]);

        options.direction = SortDirection::Descending;
        sort_members(&mut members, &options, now());
        assert_eq!(ids(&members), vec!["old", "young", "unknown"]);
    }

    #[test]
    fn test_tenure_sort_uses_entrance_fee_date() {
        let mut veteran = entry("veteran", Category::Medlem);
        veteran.member.last_entrance_fee_date = Some("2010-05-01".to_string());
        veteran.member.fortnox_customer_since = Some("2024-01-01".to_string());
        let mut rookie = entry("rookie", Category::Medlem);
        rookie.member.last_entrance_fee_date = Some("2023-05-01".to_string());
        let mut sponsor_only = entry("sponsor", Category::Medlem);
        sponsor_only.member.last_annual_fee_date = Some("2000-01-01".to_string());
        let mut members = vec![sponsor_only, rookie, veteran];

        let options = DisplayOptions {
            sort_key: SortKey::Tenure,
            direction: SortDirection::Descending,
            ..Default::default()
        };
        sort_members(&mut members, &options, now());
        assert_eq!(ids(&members), vec!["veteran", "rookie", "sponsor"]);

        let years = tenure_years(&members[0].member, now()).unwrap();
        assert!(years > 14.0 && years < 14.2);
    }

    #[test]
    fn test_queue_view_ignores_direction() {
        let mut first = entry("first", Category::Koande);
        first.member.first_queue_fee_date = Some("2015-03-01".to_string());
        let mut second = entry("second", Category::Koande);
        second.member.fortnox_customer_since = Some("2018-03-01".to_string());
        second.member.first_queue_fee_date = Some("2012-01-01".to_string());
        let mut third = entry("third", Category::Koande);
        third.member.fortnox_customer_since = Some("2020-03-01".to_string());
        let nowhere = entry("nowhere", Category::Koande);

        let filter = MemberFilter::only(Category::Koande);
        for direction in [SortDirection::Ascending, SortDirection::Descending] {
            let mut members = vec![nowhere.clone(), third.clone(), first.clone(), second.clone()];
            let options =
                DisplayOptions::for_filter(&filter, SortKey::Name, direction, VisitPeriod::Month);
            assert!(options.queue_view);
            sort_members(&mut members, &options, now());
            assert_eq!(ids(&members), vec!["first", "second", "third", "nowhere"]);
        }
    }

    #[test]
    fn test_toggle_sort() {
        let mut options = DisplayOptions::default();
        options.toggle_sort(SortKey::CustomerNumber);
        assert_eq!(options.direction, SortDirection::Descending);
        options.toggle_sort(SortKey::Name);
        assert_eq!(options.sort_key, SortKey::Name);
        assert_eq!(options.direction, SortDirection::Ascending);
    }

    // -------------------------------------------------------------------------
    // Filtering and resolution
    // -------------------------------------------------------------------------

    #[test]
    fn test_queue_view_requires_exactly_koande() {
        assert!(MemberFilter::only(Category::Koande).is_queue_view());
        assert!(!MemberFilter::default().is_queue_view());

        let mut filter = MemberFilter::only(Category::Koande);
        filter.categories.insert(Category::Medlem);
        assert!(!filter.is_queue_view());
    }

    #[test]
    fn test_filter_by_category_and_search() {
        let mut anna = entry("a", Category::Medlem);
        anna.member.first_name = Some("Anna".to_string());
        anna.member.last_name = Some("Ek".to_string());
        let mut bo = entry("b", Category::Sponsor);
        bo.member.first_name = Some("Bo".to_string());
        bo.member.email = Some("BO@example.se".to_string());
        let members = vec![anna, bo];

        let all = MemberFilter::default();
        assert_eq!(all.apply(members.clone()).len(), 2);

        let sponsors = MemberFilter::only(Category::Sponsor);
        assert_eq!(ids(&sponsors.apply(members.clone())), vec!["b"]);

        let search = MemberFilter {
            search: Some("anna ek".to_string()),
            ..Default::default()
        };
        assert_eq!(ids(&search.apply(members.clone())), vec!["a"]);

        let by_email = MemberFilter {
            search: Some("bo@EXAMPLE".to_string()),
            ..Default::default()
        };
        assert_eq!(ids(&by_email.apply(members)), vec!["b"]);
    }

    #[test]
    fn test_resolve_display_list_dedups_then_sorts() {
        let members = vec![
            with_pnr(entry("low", Category::Medlem), "1", Some("10")),
            with_pnr(entry("solo", Category::Medlem), "2", Some("5")),
            with_pnr(entry("high", Category::Medlem), "1", Some("20")),
        ];
        let resolved = resolve_display_list(members, &DisplayOptions::default(), now());
        assert_eq!(ids(&resolved), vec!["solo", "high"]);
    }
}
