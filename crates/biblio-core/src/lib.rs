//! Biblio Core - domain model, error facility and mutation engine
//!
//! This crate provides the pieces of the records store that do not touch
//! the database:
//! - Publication and Dataset records behind the `Record` contract
//! - Field-level validation rules
//! - The closed mutation table used by scripted and bulk updates
//! - The canonical `ExError` error facility
//! - The structured logging facility

pub mod errors;
pub mod logging_facility;
pub mod model;
pub mod mutation;
pub mod rules;

pub use biblio_core_types::{schema, Context, RequestId};
pub use errors::{ConflictInfo, ExError, ExErrorKind, Result};
pub use model::{Contributor, Dataset, Publication, Record, RecordType, Status, User};
pub use mutation::{ArgumentError, Mutation, MutationEngine};
pub use rules::validation::{FieldError, ValidationErrors};
