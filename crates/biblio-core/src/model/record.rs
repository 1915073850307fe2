//! The capability contract shared by every stored record type
//!
//! The snapshot store is written once against `Record`: JSON encode/decode,
//! validation, identity and the audit/status fields the repository stamps.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::errors::{ExError, ExErrorKind, Result};
use crate::model::Contributor;
use crate::rules::validation::ValidationErrors;

/// The closed set of record types held by the repository
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordType {
    Publication,
    Dataset,
}

impl RecordType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordType::Publication => "publication",
            RecordType::Dataset => "dataset",
        }
    }

    /// Name of the snapshot store (and table) holding this record type
    pub fn store_name(&self) -> &'static str {
        match self {
            RecordType::Publication => "publications",
            RecordType::Dataset => "datasets",
        }
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RecordType {
    type Err = ExError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "publication" | "publications" => Ok(RecordType::Publication),
            "dataset" | "datasets" => Ok(RecordType::Dataset),
            other => Err(ExError::new(ExErrorKind::Argument)
                .with_message(format!("unknown record type \"{}\"", other))),
        }
    }
}

/// Publication status.
///
/// `private → public → {deleted, returned}`; transitions are not enforced
/// by the store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    #[default]
    Private,
    Public,
    Deleted,
    Returned,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Private => "private",
            Status::Public => "public",
            Status::Deleted => "deleted",
            Status::Returned => "returned",
        }
    }
}

impl std::str::FromStr for Status {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, String> {
        match s {
            "private" => Ok(Status::Private),
            "public" => Ok(Status::Public),
            "deleted" => Ok(Status::Deleted),
            "returned" => Ok(Status::Returned),
            other => Err(format!("unknown status \"{}\"", other)),
        }
    }
}

/// The acting user stamped onto a record on save
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    #[serde(default)]
    pub full_name: String,
}

impl User {
    pub fn new(id: impl Into<String>, full_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            full_name: full_name.into(),
        }
    }
}

/// Audit fields maintained by the repository save pipeline
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Audit {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_created: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_updated: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creator_id: Option<String>,
    /// Editor of this version
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// Editor of the previous version
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_user_id: Option<String>,
}

/// Fields mirrored from the snapshot a record was read from.
///
/// Never serialized into the payload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SnapshotMeta {
    pub version_id: Option<String>,
    pub valid_from: Option<DateTime<Utc>>,
    pub valid_until: Option<DateTime<Utc>>,
}

/// Capability contract for a record stored as a chain of snapshots
pub trait Record:
    Clone + PartialEq + fmt::Debug + Serialize + DeserializeOwned + Send + Sync + 'static
{
    const RECORD_TYPE: RecordType;

    fn id(&self) -> &str;

    fn snapshot(&self) -> &SnapshotMeta;

    fn snapshot_mut(&mut self) -> &mut SnapshotMeta;

    fn audit(&self) -> &Audit;

    fn audit_mut(&mut self) -> &mut Audit;

    fn status(&self) -> Status;

    fn has_been_public(&self) -> bool;

    fn mark_has_been_public(&mut self);

    /// All contributor slots (authors, editors, supervisors, ...)
    fn contributors_mut(&mut self) -> Vec<&mut Contributor>;

    /// Check every field rule, collecting all violations
    ///
    /// # Errors
    ///
    /// Returns the collected violations when at least one rule fails.
    fn validate(&self) -> std::result::Result<(), ValidationErrors>;

    fn version_id(&self) -> Option<&str> {
        self.snapshot().version_id.as_deref()
    }

    /// Serialize into a snapshot payload
    ///
    /// # Errors
    ///
    /// `Serialization` when the record cannot be encoded.
    fn encode(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| {
            ExError::from(e)
                .with_op("encode")
                .with_entity_id(self.id().to_string())
        })
    }

    /// Deserialize from a snapshot payload; snapshot fields stay empty
    ///
    /// # Errors
    ///
    /// `Serialization` when the payload is not a valid record document.
    fn decode(payload: &[u8]) -> Result<Self> {
        serde_json::from_slice(payload).map_err(|e| ExError::from(e).with_op("decode"))
    }

    /// Deep equality ignoring the store-populated snapshot fields
    fn same_content(&self, other: &Self) -> bool {
        let mut a = self.clone();
        let mut b = other.clone();
        *a.snapshot_mut() = SnapshotMeta::default();
        *b.snapshot_mut() = SnapshotMeta::default();
        a == b
    }
}
