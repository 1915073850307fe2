use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::model::record::{Audit, Record, RecordType, SnapshotMeta, Status};
use crate::model::{add_unique, remove_all, Contributor};
use crate::rules::validation::{validate_dataset, ValidationErrors};

pub const ACCESS_LEVEL_OPEN: &str = "info:eu-repo/semantics/openAccess";
pub const ACCESS_LEVEL_EMBARGO: &str = "info:eu-repo/semantics/embargoedAccess";
pub const ACCESS_LEVEL_RESTRICTED: &str = "info:eu-repo/semantics/restrictedAccess";
pub const ACCESS_LEVEL_CLOSED: &str = "info:eu-repo/semantics/closedAccess";

pub const ACCESS_LEVELS: &[&str] = &[
    ACCESS_LEVEL_OPEN,
    ACCESS_LEVEL_EMBARGO,
    ACCESS_LEVEL_RESTRICTED,
    ACCESS_LEVEL_CLOSED,
];

/// Date format of `embargo_date`
pub const EMBARGO_DATE_FORMAT: &str = "%Y-%m-%d";

/// A research dataset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    pub id: String,
    #[serde(default)]
    pub status: Status,
    #[serde(default)]
    pub has_been_public: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doi: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publisher: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub format: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub keyword: Vec<String>,
    #[serde(rename = "abstract", default, skip_serializing_if = "Vec::is_empty")]
    pub abstracts: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub author: Vec<Contributor>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub contributor: Vec<Contributor>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub department: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub project: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub related_publication: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub other_license: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_level: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embargo_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_level_after_embargo: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reviewer_note: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub reviewer_tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default)]
    pub locked: bool,
    #[serde(flatten)]
    pub audit: Audit,
    #[serde(skip)]
    pub snapshot: SnapshotMeta,
}

impl Dataset {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            status: Status::Private,
            has_been_public: false,
            title: None,
            doi: None,
            url: None,
            publisher: None,
            year: None,
            format: Vec::new(),
            keyword: Vec::new(),
            abstracts: Vec::new(),
            author: Vec::new(),
            contributor: Vec::new(),
            department: Vec::new(),
            project: Vec::new(),
            related_publication: Vec::new(),
            license: None,
            other_license: None,
            access_level: None,
            embargo_date: None,
            access_level_after_embargo: None,
            reviewer_note: None,
            reviewer_tags: Vec::new(),
            message: None,
            locked: false,
            audit: Audit::default(),
            snapshot: SnapshotMeta::default(),
        }
    }

    pub fn has_related_publication(&self, publication_id: &str) -> bool {
        self.related_publication.iter().any(|id| id == publication_id)
    }

    pub fn add_related_publication(&mut self, publication_id: &str) -> bool {
        add_unique(&mut self.related_publication, publication_id)
    }

    pub fn remove_related_publication(&mut self, publication_id: &str) -> bool {
        remove_all(&mut self.related_publication, publication_id)
    }

    pub fn is_embargoed(&self) -> bool {
        self.access_level.as_deref() == Some(ACCESS_LEVEL_EMBARGO)
    }

    /// Embargo end date, when set and well formed
    pub fn embargo_end(&self) -> Option<NaiveDate> {
        self.embargo_date
            .as_deref()
            .and_then(|d| NaiveDate::parse_from_str(d, EMBARGO_DATE_FORMAT).ok())
    }

    /// True when the dataset is embargoed and the embargo ended before `today`
    pub fn embargo_expired(&self, today: NaiveDate) -> bool {
        self.is_embargoed() && self.embargo_end().is_some_and(|end| end < today)
    }

    /// Switch to the post-embargo access level and clear the embargo fields.
    ///
    /// Returns false when the dataset is not embargoed.
    pub fn lift_embargo(&mut self) -> bool {
        if !self.is_embargoed() {
            return false;
        }
        self.access_level = self.access_level_after_embargo.take();
        self.embargo_date = None;
        true
    }
}

impl Record for Dataset {
    const RECORD_TYPE: RecordType = RecordType::Dataset;

    fn id(&self) -> &str {
        &self.id
    }

    fn snapshot(&self) -> &SnapshotMeta {
        &self.snapshot
    }

    fn snapshot_mut(&mut self) -> &mut SnapshotMeta {
        &mut self.snapshot
    }

    fn audit(&self) -> &Audit {
        &self.audit
    }

    fn audit_mut(&mut self) -> &mut Audit {
        &mut self.audit
    }

    fn status(&self) -> Status {
        self.status
    }

    fn has_been_public(&self) -> bool {
        self.has_been_public
    }

    fn mark_has_been_public(&mut self) {
        self.has_been_public = true;
    }

    fn contributors_mut(&mut self) -> Vec<&mut Contributor> {
        self.author
            .iter_mut()
            .chain(self.contributor.iter_mut())
            .collect()
    }

    fn validate(&self) -> Result<(), ValidationErrors> {
        validate_dataset(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn embargoed(until: &str) -> Dataset {
        let mut d = Dataset::new("d1");
        d.access_level = Some(ACCESS_LEVEL_EMBARGO.to_string());
        d.embargo_date = Some(until.to_string());
        d.access_level_after_embargo = Some(ACCESS_LEVEL_OPEN.to_string());
        d
    }

    #[test]
    fn test_embargo_expired_is_strictly_before_today() {
        let today = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        assert!(embargoed("2024-04-30").embargo_expired(today));
        assert!(!embargoed("2024-05-01").embargo_expired(today));
        assert!(!embargoed("not a date").embargo_expired(today));
        assert!(!Dataset::new("d2").embargo_expired(today));
    }

    #[test]
    fn test_lift_embargo() {
        let mut d = embargoed("2020-01-01");
        assert!(d.lift_embargo());
        assert_eq!(d.access_level.as_deref(), Some(ACCESS_LEVEL_OPEN));
        assert!(d.embargo_date.is_none());
        assert!(d.access_level_after_embargo.is_none());
        assert!(!d.lift_embargo());
    }

    #[test]
    fn test_audit_fields_flatten_into_payload() {
        let mut d = Dataset::new("d1");
        d.audit.user_id = Some("u1".to_string());
        let json: serde_json::Value = serde_json::from_slice(&d.encode().unwrap()).unwrap();
        assert_eq!(json["user_id"], "u1");
        assert_eq!(json["status"], "private");
    }
}
