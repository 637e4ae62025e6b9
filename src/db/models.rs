//! Record store models for daily usage data

use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Identifier assigned by the record store.
///
/// PostgREST hands back whatever the column type is, so both numeric and
/// textual (uuid) keys are accepted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RecordId {
    Int(i64),
    Text(String),
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordId::Int(id) => write!(f, "{}", id),
            RecordId::Text(id) => f.write_str(id),
        }
    }
}

/// Usage record from the `image_usage` table, one per (user, day)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageRecord {
    pub id: RecordId,
    pub user_id: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub ip_address: String,
    pub date: NaiveDate,
    pub count: u32,
}

/// `null` columns decode as an empty string
fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

/// Body of the insert issued on a user's first attempt of the day
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewUsageRecord {
    pub user_id: String,
    pub ip_address: String,
    pub date: NaiveDate,
    pub count: u32,
}

impl NewUsageRecord {
    pub fn first_of_day(user_id: &str, ip_address: &str, date: NaiveDate) -> Self {
        NewUsageRecord {
            user_id: user_id.to_string(),
            ip_address: ip_address.to_string(),
            date,
            count: 1,
        }
    }
}

/// Body of the count update
#[derive(Debug, Clone, Copy, Serialize)]
pub struct CountUpdate {
    pub count: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_accepts_numeric_and_text_ids() {
        let numeric: UsageRecord = serde_json::from_str(
            r#"{"id": 42, "user_id": "u1", "ip_address": "1.2.3.4", "date": "2024-05-01", "count": 3}"#,
        ).unwrap();
        assert_eq!(numeric.id, RecordId::Int(42));
        assert_eq!(numeric.id.to_string(), "42");

        let text: UsageRecord = serde_json::from_str(
            r#"{"id": "9f1c", "user_id": "u1", "date": "2024-05-01", "count": 0}"#,
        ).unwrap();
        assert_eq!(text.id, RecordId::Text("9f1c".to_string()));
        assert_eq!(text.ip_address, "");
    }

    #[test]
    fn test_null_ip_address_decodes_as_empty() {
        let record: UsageRecord = serde_json::from_str(
            r#"{"id": 1, "user_id": "u1", "ip_address": null, "date": "2024-05-01", "count": 2}"#,
        ).unwrap();
        assert_eq!(record.ip_address, "");
        assert_eq!(record.count, 2);
    }

    #[test]
    fn test_new_record_serializes_without_id() {
        let date = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        let body = serde_json::to_value(NewUsageRecord::first_of_day("u1", "10.0.0.1", date)).unwrap();
        assert_eq!(
            body,
            serde_json::json!({
                "user_id": "u1",
                "ip_address": "10.0.0.1",
                "date": "2024-05-01",
                "count": 1
            })
        );
    }
}
