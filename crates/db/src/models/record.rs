use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::store::{Row, StoreError};

/// A hotel, place or festival row. `id` and `created_at` are assigned by the
/// store; every other column travels in `attributes` untouched.
///
/// Only `id` is required. `name` may be null in a remote table and
/// `created_at` is kept as the store rendered it, since a remote column may
/// be a timestamp with or without a time zone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: i64,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(flatten)]
    pub attributes: Map<String, Value>,
}

impl TryFrom<Row> for Record {
    type Error = StoreError;

    fn try_from(row: Row) -> Result<Self, Self::Error> {
        Ok(serde_json::from_value(Value::Object(row))?)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_row_with_extra_columns_round_trips() {
        let row = json!({
            "id": 3,
            "name": "Hotel Himalaya",
            "created_at": "2026-10-01T08:30:00.000Z",
            "address": "Kupondole, Lalitpur",
            "images": ["a.jpg", "b.jpg"]
        });
        let Value::Object(map) = row.clone() else {
            unreachable!()
        };

        let record = Record::try_from(map).unwrap();
        assert_eq!(record.id, 3);
        assert_eq!(record.name.as_deref(), Some("Hotel Himalaya"));
        assert_eq!(record.created_at.as_deref(), Some("2026-10-01T08:30:00.000Z"));
        assert_eq!(record.attributes.get("address"), Some(&json!("Kupondole, Lalitpur")));
        assert!(!record.attributes.contains_key("id"));

        let back = serde_json::to_value(&record).unwrap();
        assert_eq!(back["images"], row["images"]);
        assert_eq!(back["id"], 3);
    }

    #[test]
    fn test_naive_timestamp_and_null_name_are_kept() {
        let Value::Object(map) = json!({
            "id": 4,
            "name": null,
            "created_at": "2026-10-18T07:00:00.123456",
            "stars": 3
        }) else {
            unreachable!()
        };

        let record = Record::try_from(map).unwrap();
        assert_eq!(record.name, None);
        assert_eq!(record.created_at.as_deref(), Some("2026-10-18T07:00:00.123456"));

        let back = serde_json::to_value(&record).unwrap();
        assert_eq!(back["created_at"], "2026-10-18T07:00:00.123456");
        assert_eq!(back["name"], Value::Null);
        assert_eq!(back["stars"], 3);
    }

    #[test]
    fn test_row_without_id_is_rejected() {
        let Value::Object(map) = json!({"name": "Orphan"}) else {
            unreachable!()
        };
        assert!(Record::try_from(map).is_err());
    }
}
