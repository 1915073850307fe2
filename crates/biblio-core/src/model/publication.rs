use serde::{Deserialize, Serialize};

use crate::model::record::{Audit, Record, RecordType, SnapshotMeta, Status};
use crate::model::{add_unique, remove_all, Contributor};
use crate::rules::validation::{validate_publication, ValidationErrors};

pub const PUBLICATION_TYPES: &[&str] = &[
    "journal_article",
    "book",
    "book_chapter",
    "book_editor",
    "conference",
    "dissertation",
    "miscellaneous",
    "issue_editor",
];

pub const CLASSIFICATIONS: &[&str] = &[
    "U", "A1", "A2", "A3", "A4", "B1", "B2", "B3", "C1", "C3", "D1", "D2", "P1", "V",
];

fn default_type() -> String {
    "journal_article".to_string()
}

fn default_classification() -> String {
    "U".to_string()
}

/// A bibliographic publication
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Publication {
    pub id: String,
    #[serde(rename = "type", default = "default_type")]
    pub publication_type: String,
    #[serde(default = "default_classification")]
    pub classification: String,
    #[serde(default)]
    pub status: Status,
    #[serde(default)]
    pub has_been_public: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub alternative_title: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publisher: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doi: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub isbn: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub issn: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub journal_title: Option<String>,
    #[serde(rename = "abstract", default, skip_serializing_if = "Vec::is_empty")]
    pub abstracts: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub keyword: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub lang: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub author: Vec<Contributor>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub editor: Vec<Contributor>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub supervisor: Vec<Contributor>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub department: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub project: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub related_dataset: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub link: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reviewer_note: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub reviewer_tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default)]
    pub locked: bool,
    #[serde(default)]
    pub legacy: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vabb_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vabb_id: Option<String>,
    #[serde(flatten)]
    pub audit: Audit,
    #[serde(skip)]
    pub snapshot: SnapshotMeta,
}

impl Publication {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            publication_type: default_type(),
            classification: default_classification(),
            status: Status::Private,
            has_been_public: false,
            title: None,
            alternative_title: Vec::new(),
            year: None,
            publisher: None,
            doi: None,
            isbn: Vec::new(),
            issn: Vec::new(),
            journal_title: None,
            abstracts: Vec::new(),
            keyword: Vec::new(),
            lang: Vec::new(),
            author: Vec::new(),
            editor: Vec::new(),
            supervisor: Vec::new(),
            department: Vec::new(),
            project: Vec::new(),
            related_dataset: Vec::new(),
            link: Vec::new(),
            reviewer_note: None,
            reviewer_tags: Vec::new(),
            message: None,
            locked: false,
            legacy: false,
            vabb_type: None,
            vabb_id: None,
            audit: Audit::default(),
            snapshot: SnapshotMeta::default(),
        }
    }

    pub fn has_related_dataset(&self, dataset_id: &str) -> bool {
        self.related_dataset.iter().any(|id| id == dataset_id)
    }

    pub fn add_related_dataset(&mut self, dataset_id: &str) -> bool {
        add_unique(&mut self.related_dataset, dataset_id)
    }

    pub fn remove_related_dataset(&mut self, dataset_id: &str) -> bool {
        remove_all(&mut self.related_dataset, dataset_id)
    }

    /// Types whose primary contributors are editors rather than authors
    pub fn uses_editors(&self) -> bool {
        matches!(
            self.publication_type.as_str(),
            "book_editor" | "issue_editor"
        )
    }
}

impl Record for Publication {
    const RECORD_TYPE: RecordType = RecordType::Publication;

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
            .chain(self.editor.iter_mut())
            .chain(self.supervisor.iter_mut())
            .collect()
    }

    fn validate(&self) -> Result<(), ValidationErrors> {
        validate_publication(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_skips_snapshot_fields() {
        let mut p = Publication::new("p1");
        p.title = Some("On Snapshots".to_string());
        p.snapshot.version_id = Some("v1".to_string());

        let json = String::from_utf8(p.encode().unwrap()).unwrap();
        assert!(json.contains("\"type\":\"journal_article\""));
        assert!(!json.contains("v1"));

        let decoded = Publication::decode(json.as_bytes()).unwrap();
        assert!(decoded.snapshot.version_id.is_none());
        assert!(decoded.same_content(&p));
        assert_ne!(decoded, p);
    }

    #[test]
    fn test_related_dataset_is_a_set() {
        let mut p = Publication::new("p1");
        assert!(p.add_related_dataset("d1"));
        assert!(!p.add_related_dataset("d1"));
        assert!(p.has_related_dataset("d1"));
        assert!(p.remove_related_dataset("d1"));
        assert!(!p.remove_related_dataset("d1"));
        assert!(p.related_dataset.is_empty());
    }

    #[test]
    fn test_decode_minimal_document_uses_defaults() {
        let p = Publication::decode(br#"{"id":"p9"}"#).unwrap();
        assert_eq!(p.publication_type, "journal_article");
        assert_eq!(p.classification, "U");
        assert_eq!(p.status, Status::Private);
    }
}
