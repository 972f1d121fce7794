use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::utils::parse_timestamp;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub enum GroupKind {
    /// Members listed explicitly in `sms_group_members`
    Static,
    /// Members resolved by the backend from the group's rule
    Dynamic,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct GroupMemberRow {
    member_id: String,
}

/// A recipient group, with embedded `sms_group_members` rows for static groups.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct SmsGroup {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub kind: GroupKind,
    #[serde(default, rename = "sms_group_members", with = "member_rows")]
    #[cfg_attr(feature = "ts", ts(type = "Array<{ member_id: string }>"))]
    pub member_ids: Vec<String>,
}

mod member_rows {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    use super::GroupMemberRow;

    pub fn serialize<S: Serializer>(ids: &[String], serializer: S) -> Result<S::Ok, S::Error> {
        ids.iter()
            .map(|id| GroupMemberRow {
                member_id: id.clone(),
            })
            .collect::<Vec<_>>()
            .serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
        let rows = Option::<Vec<GroupMemberRow>>::deserialize(deserializer)?;
        Ok(rows
            .unwrap_or_default()
            .into_iter()
            .map(|r| r.member_id)
            .collect())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub enum Direction {
    Inbound,
    Outbound,
}

/// A row of `sms_messages`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct SmsMessage {
    pub id: String,
    pub direction: Direction,
    pub phone: String,
    #[serde(default)]
    pub member_id: Option<String>,
    pub body: String,
    pub created_at: String,
}

impl SmsMessage {
    pub fn created(&self) -> Option<DateTime<Utc>> {
        parse_timestamp(&self.created_at)
    }
}

/// Outcome reported by the `send-sms` function.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendReport {
    #[serde(default)]
    pub sent: usize,
    #[serde(default)]
    pub failed: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_group_embeds_member_rows() {
        let group: SmsGroup = serde_json::from_str(
            r#"{"id": "g1", "name": "Styrelsen", "kind": "static",
                "sms_group_members": [{"member_id": "a"}, {"member_id": "b"}]}"#,
        )
        .unwrap();
        assert_eq!(group.kind, GroupKind::Static);
        assert_eq!(group.member_ids, vec!["a", "b"]);

        let dynamic: SmsGroup = serde_json::from_str(
            r#"{"id": "g2", "name": "Alla aktiva", "kind": "dynamic", "sms_group_members": null}"#,
        )
        .unwrap();
        assert!(dynamic.member_ids.is_empty());
    }
}
