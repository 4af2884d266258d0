//! Entities as the identity framework sees them.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::keys::ID_FIELD;
use crate::storage::AdapterError;

pub const CREATED_AT_FIELD: &str = "createdAt";
pub const UPDATED_AT_FIELD: &str = "updatedAt";

/// Field name to value mapping supplied by callers.
pub type Record = Map<String, Value>;

/// Current time in the format written to `createdAt`/`updatedAt`.
///
/// Format: `YYYY-MM-DDTHH:MM:SS.mmmZ`
pub fn now_timestamp() -> String {
    format_timestamp(Utc::now())
}

pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// A stored record of some model, stripped of adapter bookkeeping.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Entity(Record);

impl Entity {
    pub fn new(fields: Record) -> Self {
        Self(fields)
    }

    pub fn id(&self) -> Option<&str> {
        self.0.get(ID_FIELD).and_then(Value::as_str)
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    pub fn fields(&self) -> &Record {
        &self.0
    }

    pub fn into_record(self) -> Record {
        self.0
    }

    /// Parses an RFC 3339 string field.
    pub fn timestamp(&self, field: &str) -> Option<DateTime<Utc>> {
        let raw = self.0.get(field)?.as_str()?;
        DateTime::parse_from_rfc3339(raw)
            .ok()
            .map(|dt| dt.with_timezone(&Utc))
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.timestamp(CREATED_AT_FIELD)
    }

    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.timestamp(UPDATED_AT_FIELD)
    }

    /// Deserializes the entity into a caller-defined type.
    pub fn deserialize_into<T: DeserializeOwned>(&self) -> Result<T, AdapterError> {
        serde_json::from_value(Value::Object(self.0.clone()))
            .map_err(|e| AdapterError::InvalidData(e.to_string()))
    }
}

impl From<Record> for Entity {
    fn from(fields: Record) -> Self {
        Self(fields)
    }
}
