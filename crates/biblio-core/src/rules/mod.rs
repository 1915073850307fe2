pub mod validation;

pub use validation::{validate_dataset, validate_publication, FieldError, ValidationErrors};
