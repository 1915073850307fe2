use chrono::NaiveDate;

use crate::model::dataset::{ACCESS_LEVELS, ACCESS_LEVEL_EMBARGO, EMBARGO_DATE_FORMAT};
use crate::model::publication::{CLASSIFICATIONS, PUBLICATION_TYPES};
use crate::model::{Contributor, Dataset, Publication, Status};

pub const RULE_REQUIRED: &str = "required";
pub const RULE_INVALID: &str = "invalid";
pub const RULE_MIN_ONE: &str = "min_one";

/// One violated rule on one field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub field: String,
    pub rule: String,
}

/// Every rule violation found on a record
///
/// Validation never stops at the first failure; callers get the full list.
#[derive(Debug, Clone, Default, PartialEq, Eq, thiserror::Error)]
#[error("validation failed: {}", summarize(.errors))]
pub struct ValidationErrors {
    errors: Vec<FieldError>,
}

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, field: impl Into<String>, rule: impl Into<String>) {
        self.errors.push(FieldError {
            field: field.into(),
            rule: rule.into(),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FieldError> {
        self.errors.iter()
    }

    pub fn contains(&self, field: &str, rule: &str) -> bool {
        self.errors.iter().any(|e| e.field == field && e.rule == rule)
    }

    /// `Ok` when no rule was violated
    ///
    /// # Errors
    ///
    /// Returns `self` when it holds at least one violation.
    pub fn into_result(self) -> Result<(), ValidationErrors> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

fn summarize(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(|e| format!("{} {}", e.field, e.rule))
        .collect::<Vec<_>>()
        .join(", ")
}

fn is_blank(value: Option<&str>) -> bool {
    value.map_or(true, |v| v.trim().is_empty())
}

fn is_year(value: &str) -> bool {
    value.len() == 4 && value.chars().all(|c| c.is_ascii_digit())
}

fn check_year(errors: &mut ValidationErrors, year: Option<&str>, required: bool) {
    match year {
        Some(y) if !y.trim().is_empty() => {
            if !is_year(y) {
                errors.push("year", RULE_INVALID);
            }
        }
        _ if required => errors.push("year", RULE_REQUIRED),
        _ => {}
    }
}

fn check_contributors(errors: &mut ValidationErrors, role: &str, contributors: &[Contributor]) {
    for (i, c) in contributors.iter().enumerate() {
        if !c.has_name() {
            errors.push(format!("{}[{}].last_name", role, i), RULE_REQUIRED);
        }
    }
}

fn requires_complete(status: Status) -> bool {
    matches!(status, Status::Public | Status::Returned)
}

/// Check a publication, collecting all violations
///
/// # Errors
///
/// Returns every violated rule.
pub fn validate_publication(p: &Publication) -> Result<(), ValidationErrors> {
    let mut errors = ValidationErrors::new();

    if p.id.trim().is_empty() {
        errors.push("id", RULE_REQUIRED);
    }
    if !PUBLICATION_TYPES.contains(&p.publication_type.as_str()) {
        errors.push("type", RULE_INVALID);
    }
    if !CLASSIFICATIONS.contains(&p.classification.as_str()) {
        errors.push("classification", RULE_INVALID);
    }

    let complete = requires_complete(p.status);
    if complete && is_blank(p.title.as_deref()) {
        errors.push("title", RULE_REQUIRED);
    }
    check_year(&mut errors, p.year.as_deref(), complete);

    if complete {
        if p.uses_editors() {
            if p.editor.is_empty() {
                errors.push("editor", RULE_MIN_ONE);
            }
        } else if p.author.is_empty() {
            errors.push("author", RULE_MIN_ONE);
        }
        if p.publication_type == "dissertation" && p.supervisor.is_empty() {
            errors.push("supervisor", RULE_MIN_ONE);
        }
    }

    check_contributors(&mut errors, "author", &p.author);
    check_contributors(&mut errors, "editor", &p.editor);
    check_contributors(&mut errors, "supervisor", &p.supervisor);

    errors.into_result()
}

/// Check a dataset, collecting all violations
///
/// # Errors
///
/// Returns every violated rule.
pub fn validate_dataset(d: &Dataset) -> Result<(), ValidationErrors> {
    let mut errors = ValidationErrors::new();

    if d.id.trim().is_empty() {
        errors.push("id", RULE_REQUIRED);
    }

    let complete = requires_complete(d.status);
    if complete {
        if is_blank(d.title.as_deref()) {
            errors.push("title", RULE_REQUIRED);
        }
        if is_blank(d.doi.as_deref()) {
            errors.push("doi", RULE_REQUIRED);
        }
        if is_blank(d.publisher.as_deref()) {
            errors.push("publisher", RULE_REQUIRED);
        }
        if d.format.is_empty() {
            errors.push("format", RULE_MIN_ONE);
        }
        if d.author.is_empty() {
            errors.push("author", RULE_MIN_ONE);
        }
        if is_blank(d.license.as_deref()) && is_blank(d.other_license.as_deref()) {
            errors.push("license", RULE_REQUIRED);
        }
        if is_blank(d.access_level.as_deref()) {
            errors.push("access_level", RULE_REQUIRED);
        }
    }
    check_year(&mut errors, d.year.as_deref(), complete);

    if let Some(level) = d.access_level.as_deref().filter(|l| !l.is_empty()) {
        if !ACCESS_LEVELS.contains(&level) {
            errors.push("access_level", RULE_INVALID);
        }
    }

    if d.is_embargoed() {
        match d.embargo_date.as_deref() {
            Some(date) if !date.trim().is_empty() => {
                if NaiveDate::parse_from_str(date, EMBARGO_DATE_FORMAT).is_err() {
                    errors.push("embargo_date", RULE_INVALID);
                }
            }
            _ => errors.push("embargo_date", RULE_REQUIRED),
        }
        match d.access_level_after_embargo.as_deref() {
            None | Some("") => errors.push("access_level_after_embargo", RULE_REQUIRED),
            Some(ACCESS_LEVEL_EMBARGO) => {
                errors.push("access_level_after_embargo", RULE_INVALID)
            }
            Some(level) if !ACCESS_LEVELS.contains(&level) => {
                errors.push("access_level_after_embargo", RULE_INVALID)
            }
            Some(_) => {}
        }
    }

    check_contributors(&mut errors, "author", &d.author);
    check_contributors(&mut errors, "contributor", &d.contributor);

    errors.into_result()
}
