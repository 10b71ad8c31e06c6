//! Schemaless record used by the service for every record type.
//!
//! The service caches payloads it does not interpret. A
//! [`DocumentRecord`] keeps the original JSON object intact and only
//! reads the id (`id`, falling back to `name`) and `lastModified`.

use chrono::{TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tessera_core::{Record, Timestamp};

use crate::constants::{ID_FIELDS, LAST_MODIFIED_FIELD};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Map<String, Value>", into = "Map<String, Value>")]
pub struct DocumentRecord {
    id: String,
    last_modified: Option<Timestamp>,
    fields: Map<String, Value>,
}

impl DocumentRecord {
    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }
}

impl TryFrom<Map<String, Value>> for DocumentRecord {
    type Error = String;

    fn try_from(fields: Map<String, Value>) -> Result<Self, Self::Error> {
        let id = ID_FIELDS
            .iter()
            .find_map(|field| fields.get(*field).and_then(Value::as_str))
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .ok_or_else(|| format!("record has none of the id fields {ID_FIELDS:?}"))?;
        let last_modified = fields.get(LAST_MODIFIED_FIELD).and_then(parse_timestamp);
        Ok(Self {
            id,
            last_modified,
            fields,
        })
    }
}

impl From<DocumentRecord> for Map<String, Value> {
    fn from(record: DocumentRecord) -> Self {
        let mut fields = record.fields;
        if let Some(at) = record.last_modified {
            fields.insert(
                LAST_MODIFIED_FIELD.to_string(),
                Value::from(at.timestamp_millis()),
            );
        }
        fields
    }
}

/// Epoch milliseconds or an RFC 3339 string.
fn parse_timestamp(value: &Value) -> Option<Timestamp> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single()),
        Value::String(s) => chrono::DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|at| at.with_timezone(&Utc))
            .or_else(|| s.parse::<i64>().ok().and_then(|ms| Utc.timestamp_millis_opt(ms).single())),
        _ => None,
    }
}

impl Record for DocumentRecord {
    fn id(&self) -> &str {
        &self.id
    }

    fn last_modified(&self) -> Option<Timestamp> {
        self.last_modified
    }

    fn set_last_modified(&mut self, at: Timestamp) {
        self.last_modified = Some(at);
    }
}
