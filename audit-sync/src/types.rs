use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use serde_json::value::RawValue;

use crate::bail;
use crate::error::{ErrorKind, SyncError};

/// Kind of mutation captured by an audit record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Operation {
    Insert,
    Update,
    Delete,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Insert => "INSERT",
            Operation::Update => "UPDATE",
            Operation::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parses the stored text representation, ignoring case.
impl FromStr for Operation {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("insert") {
            Ok(Operation::Insert)
        } else if s.eq_ignore_ascii_case("update") {
            Ok(Operation::Update)
        } else if s.eq_ignore_ascii_case("delete") {
            Ok(Operation::Delete)
        } else {
            bail!(
                ErrorKind::InvalidData,
                "Unknown audit operation",
                format!("'{s}' is not one of INSERT, UPDATE or DELETE")
            )
        }
    }
}

/// An audit record as stored in the source table.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeRecord {
    pub id: i64,
    pub table_name: String,
    pub operation: Operation,
    /// Row image before the change as JSON text, absent for inserts.
    pub before: Option<String>,
    /// Row image after the change as JSON text, absent for deletes.
    pub after: Option<String>,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
    pub claimed: bool,
    pub claimed_at: Option<DateTime<Utc>>,
}

/// An ordered group of records claimed together.
pub type Batch = Vec<ChangeRecord>;

/// The document written to the sink for one [`ChangeRecord`].
///
/// Payloads are embedded verbatim. A payload that is not valid JSON fails serialization.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndexedRecord {
    /// Bulk action `_id`. Not part of the document body.
    #[serde(skip)]
    pub document_id: Option<String>,
    pub table_name: String,
    pub operation: Operation,
    #[serde(
        skip_serializing_if = "Option::is_none",
        serialize_with = "serialize_raw_json"
    )]
    pub old_data: Option<String>,
    #[serde(
        skip_serializing_if = "Option::is_none",
        serialize_with = "serialize_raw_json"
    )]
    pub new_data: Option<String>,
    pub user_id: String,
    #[serde(rename = "@timestamp")]
    pub timestamp: DateTime<Utc>,
}

fn serialize_raw_json<S>(value: &Option<String>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    match value {
        Some(json) => {
            let raw: &RawValue = serde_json::from_str(json).map_err(serde::ser::Error::custom)?;
            raw.serialize(serializer)
        }
        None => serializer.serialize_none(),
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn operation_parses_ignoring_case() {
        assert_eq!("insert".parse::<Operation>().unwrap(), Operation::Insert);
        assert_eq!("Update".parse::<Operation>().unwrap(), Operation::Update);
        assert_eq!("DELETE".parse::<Operation>().unwrap(), Operation::Delete);

        let err = "TRUNCATE".parse::<Operation>().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidData);
    }

    #[test]
    fn indexed_record_embeds_payloads_and_omits_absent_ones() {
        let record = IndexedRecord {
            document_id: Some("42".to_string()),
            table_name: "users".to_string(),
            operation: Operation::Insert,
            old_data: None,
            new_data: Some(r#"{"id":1,"name":"a"}"#.to_string()),
            user_id: "u1".to_string(),
            timestamp: Utc.with_ymd_and_hms(2024, 3, 9, 12, 0, 0).unwrap(),
        };

        let json = serde_json::to_string(&record).unwrap();

        assert_eq!(
            json,
            r#"{"table_name":"users","operation":"INSERT","new_data":{"id":1,"name":"a"},"user_id":"u1","@timestamp":"2024-03-09T12:00:00Z"}"#
        );
    }

    #[test]
    fn invalid_payload_fails_serialization() {
        let record = IndexedRecord {
            document_id: None,
            table_name: "users".to_string(),
            operation: Operation::Delete,
            old_data: Some("{not json".to_string()),
            new_data: None,
            user_id: "u1".to_string(),
            timestamp: Utc::now(),
        };

        assert!(serde_json::to_string(&record).is_err());
    }
}
