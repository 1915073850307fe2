use serde::{Deserialize, Serialize};

/// A person credited on a record (author, editor, supervisor, ...)
///
/// `person_id` links to the people service when the contributor has been
/// matched; unmatched contributors carry only their name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contributor {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub person_id: Option<String>,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub full_name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub credit_role: Vec<String>,
}

impl Contributor {
    /// Create an unmatched contributor from a first and last name
    pub fn new(first_name: impl Into<String>, last_name: impl Into<String>) -> Self {
        let first_name = first_name.into();
        let last_name = last_name.into();
        let full_name = format!("{} {}", first_name, last_name).trim().to_string();
        Self {
            person_id: None,
            first_name,
            last_name,
            full_name,
            credit_role: Vec::new(),
        }
    }

    pub fn with_person_id(mut self, person_id: impl Into<String>) -> Self {
        self.person_id = Some(person_id.into());
        self
    }

    pub fn has_name(&self) -> bool {
        !self.full_name.trim().is_empty() || !self.last_name.trim().is_empty()
    }

    /// Point this contributor at another person, keeping credit roles.
    ///
    /// Returns false when the contributor was not linked to `from`.
    pub fn transfer(&mut self, from: &str, to: &Contributor) -> bool {
        if self.person_id.as_deref() != Some(from) {
            return false;
        }
        self.person_id = to.person_id.clone();
        self.first_name = to.first_name.clone();
        self.last_name = to.last_name.clone();
        self.full_name = to.full_name.clone();
        true
    }
}
