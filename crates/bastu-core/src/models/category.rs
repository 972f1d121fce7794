use std::collections::BTreeMap;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Membership category of a member. Every member maps to exactly one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub enum Category {
    /// Active paying member
    #[serde(rename = "MEDLEM")]
    Medlem,
    /// Paying but not visiting
    #[serde(rename = "SPONSOR")]
    Sponsor,
    /// Applicant in the membership queue
    #[serde(rename = "KÖANDE")]
    Koande,
    /// Co-bather linked to a member, or with access but no fee history
    #[serde(rename = "MEDBADARE")]
    Medbadare,
    #[serde(rename = "INAKTIV")]
    Inaktiv,
}

impl Category {
    pub const ALL: [Category; 5] = [
        Category::Medlem,
        Category::Sponsor,
        Category::Koande,
        Category::Medbadare,
        Category::Inaktiv,
    ];

    /// The label used by the backend and shown to admins.
    pub fn label(&self) -> &'static str {
        match self {
            Category::Medlem => "MEDLEM",
            Category::Sponsor => "SPONSOR",
            Category::Koande => "KÖANDE",
            Category::Medbadare => "MEDBADARE",
            Category::Inaktiv => "INAKTIV",
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

impl FromStr for Category {
    type Err = String;

    /// Accepts the backend label in any case, with or without the umlaut.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "MEDLEM" => Ok(Category::Medlem),
            "SPONSOR" => Ok(Category::Sponsor),
            "KÖANDE" | "KOANDE" => Ok(Category::Koande),
            "MEDBADARE" => Ok(Category::Medbadare),
            "INAKTIV" => Ok(Category::Inaktiv),
            other => Err(format!("Unknown category: {}", other)),
        }
    }
}

/// Number of members per category, in category order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CategoryCounts(BTreeMap<Category, usize>);

impl CategoryCounts {
    pub fn from_categories(categories: impl IntoIterator<Item = Category>) -> Self {
        let mut counts = BTreeMap::new();
        for category in categories {
            *counts.entry(category).or_insert(0) += 1;
        }
        Self(counts)
    }

    pub fn get(&self, category: Category) -> usize {
        self.0.get(&category).copied().unwrap_or(0)
    }

    pub fn total(&self) -> usize {
        self.0.values().sum()
    }

    /// One-line summary such as `MEDLEM 12 · SPONSOR 3 · KÖANDE 40 · MEDBADARE 5 · INAKTIV 9`.
    pub fn summary(&self) -> String {
        Category::ALL
            .iter()
            .map(|c| format!("{} {}", c.label(), self.get(*c)))
            .collect::<Vec<_>>()
            .join(" · ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_from_str() {
        assert_eq!("MEDLEM".parse::<Category>(), Ok(Category::Medlem));
        assert_eq!("köande".parse::<Category>(), Ok(Category::Koande));
        assert_eq!("KOANDE".parse::<Category>(), Ok(Category::Koande));
        assert!("MEMBER".parse::<Category>().is_err());
    }

    #[test]
    fn test_category_serde_uses_labels() {
        let json = serde_json::to_string(&Category::Koande).unwrap();
        assert_eq!(json, "\"KÖANDE\"");
        let parsed: Category = serde_json::from_str("\"MEDBADARE\"").unwrap();
        assert_eq!(parsed, Category::Medbadare);
    }

    #[test]
    fn test_category_counts() {
        let counts = CategoryCounts::from_categories([
            Category::Medlem,
            Category::Medlem,
            Category::Inaktiv,
        ]);
        assert_eq!(counts.get(Category::Medlem), 2);
        assert_eq!(counts.get(Category::Sponsor), 0);
        assert_eq!(counts.total(), 3);
        assert!(counts.summary().starts_with("MEDLEM 2 · SPONSOR 0"));
    }
}
