pub mod contributor;
pub mod dataset;
pub mod publication;
pub mod record;

pub use contributor::Contributor;
pub use dataset::Dataset;
pub use publication::Publication;
pub use record::{Audit, Record, RecordType, SnapshotMeta, Status, User};

/// Push `value` unless already present; returns true when added
pub(crate) fn add_unique(list: &mut Vec<String>, value: &str) -> bool {
    if list.iter().any(|v| v == value) {
        return false;
    }
    list.push(value.to_string());
    true
}

/// Remove every occurrence of `value`; returns true when something was removed
pub(crate) fn remove_all(list: &mut Vec<String>, value: &str) -> bool {
    let before = list.len();
    list.retain(|v| v != value);
    list.len() != before
}
