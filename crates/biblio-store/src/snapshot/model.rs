use biblio_core::errors::{ExError, ExErrorKind};
use biblio_core::Record;
use chrono::{DateTime, TimeZone, Utc};
use std::fmt;

use crate::errors::Result;

/// One immutable version of a record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub id: String,
    pub version_id: String,
    /// JSON document; always valid UTF-8
    pub payload: Vec<u8>,
    pub valid_from: DateTime<Utc>,
    /// `None` while this is the current snapshot
    pub valid_until: Option<DateTime<Utc>>,
    pub date_created: DateTime<Utc>,
}

impl Snapshot {
    /// A snapshot to pass to `import`, with caller-supplied timestamps
    pub fn for_import(
        id: impl Into<String>,
        version_id: impl Into<String>,
        payload: Vec<u8>,
        valid_from: DateTime<Utc>,
        date_created: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            version_id: version_id.into(),
            payload,
            valid_from,
            valid_until: None,
            date_created,
        }
    }

    pub fn is_current(&self) -> bool {
        self.valid_until.is_none()
    }

    /// True when `t` falls in `[valid_from, valid_until)`
    pub fn contains(&self, t: DateTime<Utc>) -> bool {
        self.valid_from <= t && self.valid_until.map_or(true, |until| t < until)
    }

    /// Decode the payload into a record and mirror the snapshot fields onto it
    ///
    /// # Errors
    ///
    /// `Serialization` when the payload is not a valid `R` document.
    pub fn into_record<R: Record>(self) -> Result<R> {
        let mut record = R::decode(&self.payload).map_err(|e| e.wrap("hydrate", self.id.clone()))?;
        let meta = record.snapshot_mut();
        meta.version_id = Some(self.version_id);
        meta.valid_from = Some(self.valid_from);
        meta.valid_until = self.valid_until;
        Ok(record)
    }
}

/// Name of a change notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventName {
    Create,
    Update,
    Import,
    Correct,
    Purge,
}

impl EventName {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventName::Create => "create",
            EventName::Update => "update",
            EventName::Import => "import",
            EventName::Correct => "correct",
            EventName::Purge => "purge",
        }
    }
}

impl fmt::Display for EventName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EventName {
    type Err = ExError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "create" => Ok(EventName::Create),
            "update" => Ok(EventName::Update),
            "import" => Ok(EventName::Import),
            "correct" => Ok(EventName::Correct),
            "purge" => Ok(EventName::Purge),
            other => Err(ExError::new(ExErrorKind::Serialization)
                .with_op("parse_event_name")
                .with_message(format!("unknown event name \"{}\"", other))),
        }
    }
}

pub(crate) fn to_micros(t: DateTime<Utc>) -> i64 {
    t.timestamp_micros()
}

pub(crate) fn from_micros(micros: i64) -> Result<DateTime<Utc>> {
    Utc.timestamp_micros(micros).single().ok_or_else(|| {
        ExError::new(ExErrorKind::Serialization)
            .with_op("from_micros")
            .with_message(format!("timestamp out of range: {}", micros))
    })
}
