use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::utils::parse_timestamp;

/// Which access system produced an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub enum AccessSource {
    /// RFID tag reader
    Aptus,
    /// Mobile key
    Parakey,
}

impl std::fmt::Display for AccessSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AccessSource::Aptus => f.pad("aptus"),
            AccessSource::Parakey => f.pad("parakey"),
        }
    }
}

/// A row of `access_events`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct AccessEvent {
    pub id: String,
    #[serde(default)]
    pub member_id: Option<String>,
    pub source: AccessSource,
    #[serde(default)]
    pub credential_id: Option<String>,
    #[serde(default)]
    pub door: Option<String>,
    #[serde(default = "default_granted")]
    pub granted: bool,
    pub occurred_at: String,
}

fn default_granted() -> bool {
    true
}

impl AccessEvent {
    pub fn occurred(&self) -> Option<DateTime<Utc>> {
        parse_timestamp(&self.occurred_at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_display_honours_width() {
        assert_eq!(format!("{:<7}|", AccessSource::Aptus), "aptus  |");
        assert_eq!(format!("{:<7}|", AccessSource::Parakey), "parakey|");
        assert_eq!(AccessSource::Aptus.to_string(), "aptus");
    }
}
