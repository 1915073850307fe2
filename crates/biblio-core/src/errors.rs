use biblio_core_types::{Interrupt, RequestId};

use crate::mutation::ArgumentError;
use crate::rules::validation::ValidationErrors;

/// Result type alias using ExError
pub type Result<T> = std::result::Result<T, ExError>;

// ========== Error Facility ==========

/// Canonical error kind taxonomy
///
/// Callers branch on the kind, never on message text. `NotFound`,
/// `Conflict`, `Validation` and `Argument` are expected outcomes of normal
/// operation; everything else is an internal failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExErrorKind {
    // Expected outcomes
    NotFound,
    Validation,
    Conflict,
    Argument,

    // Policy
    /// An operation that is switched off in this configuration
    Forbidden,

    // Context
    Cancelled,
    DeadlineExceeded,
    /// Connection pool exhausted before the caller's deadline
    Timeout,

    // Integration/IO
    Serialization,
    Persistence,
    Io,
    Config,

    // Internal
    Internal,
}

impl ExErrorKind {
    /// Get the stable error code for this kind
    pub fn code(&self) -> &'static str {
        match self {
            ExErrorKind::NotFound => "ERR_NOT_FOUND",
            ExErrorKind::Validation => "ERR_VALIDATION",
            ExErrorKind::Conflict => "ERR_CONFLICT",
            ExErrorKind::Argument => "ERR_ARGUMENT",
            ExErrorKind::Forbidden => "ERR_FORBIDDEN",
            ExErrorKind::Cancelled => "ERR_CANCELLED",
            ExErrorKind::DeadlineExceeded => "ERR_DEADLINE_EXCEEDED",
            ExErrorKind::Timeout => "ERR_TIMEOUT",
            ExErrorKind::Serialization => "ERR_SERIALIZATION",
            ExErrorKind::Persistence => "ERR_PERSISTENCE",
            ExErrorKind::Io => "ERR_IO",
            ExErrorKind::Config => "ERR_CONFIG",
            ExErrorKind::Internal => "ERR_INTERNAL",
        }
    }

    /// Whether this kind is a normal outcome that must not be logged as an error
    pub fn is_expected(&self) -> bool {
        matches!(
            self,
            ExErrorKind::NotFound
                | ExErrorKind::Conflict
                | ExErrorKind::Validation
                | ExErrorKind::Argument
        )
    }

    fn describe(&self) -> &'static str {
        match self {
            ExErrorKind::NotFound => "not found",
            ExErrorKind::Validation => "validation failed",
            ExErrorKind::Conflict => "version conflict",
            ExErrorKind::Argument => "invalid argument",
            ExErrorKind::Forbidden => "forbidden",
            ExErrorKind::Cancelled => "context cancelled",
            ExErrorKind::DeadlineExceeded => "context deadline exceeded",
            ExErrorKind::Timeout => "timed out",
            ExErrorKind::Serialization => "serialization failed",
            ExErrorKind::Persistence => "persistence failed",
            ExErrorKind::Io => "i/o failed",
            ExErrorKind::Config => "invalid configuration",
            ExErrorKind::Internal => "internal error",
        }
    }
}

/// Version tokens involved in a failed optimistic-concurrency write
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConflictInfo {
    pub record_id: String,
    /// The token the writer read and expected to still be current
    pub expected_version_id: String,
    /// The token that is actually current, if the record still exists
    pub current_version_id: Option<String>,
}

/// Canonical structured error type
///
/// Errors are wrapped on the way out of every layer with `wrap(op, id)`, so
/// the rendered message reads `"<op> <id>: <cause>"` all the way down while
/// `kind()`, `conflict()` and `validation_errors()` keep answering for the
/// innermost error.
#[derive(Debug, Clone)]
pub struct ExError {
    kind: ExErrorKind,
    op: Option<String>,
    entity_id: Option<String>,
    message: String,
    line: Option<usize>,
    conflict: Option<ConflictInfo>,
    validation: Option<ValidationErrors>,
    source: Option<Box<ExError>>,
}

impl ExError {
    /// Create a new error with the specified kind
    pub fn new(kind: ExErrorKind) -> Self {
        Self {
            kind,
            op: None,
            entity_id: None,
            message: String::new(),
            line: None,
            conflict: None,
            validation: None,
            source: None,
        }
    }

    pub fn not_found(op: impl Into<String>, id: impl Into<String>) -> Self {
        Self::new(ExErrorKind::NotFound)
            .with_op(op)
            .with_entity_id(id)
    }

    pub fn conflict(op: impl Into<String>, info: ConflictInfo) -> Self {
        let message = format!(
            "expected version {} but current is {}",
            info.expected_version_id,
            info.current_version_id.as_deref().unwrap_or("<none>")
        );
        Self::new(ExErrorKind::Conflict)
            .with_op(op)
            .with_entity_id(info.record_id.clone())
            .with_message(message)
            .with_conflict(info)
    }

    pub fn validation(
        op: impl Into<String>,
        id: impl Into<String>,
        errors: ValidationErrors,
    ) -> Self {
        Self::new(ExErrorKind::Validation)
            .with_op(op)
            .with_entity_id(id)
            .with_message(errors.to_string())
            .with_validation(errors)
    }

    /// Error for a context that was cancelled or ran past its deadline
    pub fn interrupted(op: impl Into<String>, interrupt: Interrupt) -> Self {
        let kind = match interrupt {
            Interrupt::Cancelled => ExErrorKind::Cancelled,
            Interrupt::DeadlineExceeded => ExErrorKind::DeadlineExceeded,
        };
        Self::new(kind).with_op(op)
    }

    /// Add operation context
    pub fn with_op(mut self, op: impl Into<String>) -> Self {
        self.op = Some(op.into());
        self
    }

    /// Add entity ID context
    pub fn with_entity_id(mut self, id: impl Into<String>) -> Self {
        self.entity_id = Some(id.into());
        self
    }

    /// Add custom message
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    /// Add the source line of a batch record
    pub fn with_line(mut self, line: usize) -> Self {
        self.line = Some(line);
        self
    }

    pub fn with_conflict(mut self, info: ConflictInfo) -> Self {
        self.conflict = Some(info);
        self
    }

    pub fn with_validation(mut self, errors: ValidationErrors) -> Self {
        self.validation = Some(errors);
        self
    }

    /// Add source error
    pub fn with_source(mut self, source: ExError) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Nest this error under an outer operation on `id`, keeping its kind
    pub fn wrap(self, op: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            kind: self.kind,
            op: Some(op.into()),
            entity_id: Some(id.into()),
            message: String::new(),
            line: None,
            conflict: None,
            validation: None,
            source: Some(Box::new(self)),
        }
    }

    /// Get the error kind
    pub fn kind(&self) -> ExErrorKind {
        self.kind
    }

    /// Get the stable error code
    pub fn code(&self) -> &'static str {
        self.kind.code()
    }

    pub fn is_not_found(&self) -> bool {
        self.kind == ExErrorKind::NotFound
    }

    pub fn is_conflict(&self) -> bool {
        self.kind == ExErrorKind::Conflict
    }

    /// Get the operation context, if any
    pub fn op(&self) -> Option<&str> {
        self.op.as_deref()
    }

    /// Get the entity ID context, if any
    pub fn entity_id(&self) -> Option<&str> {
        self.entity_id.as_deref()
    }

    /// Get the error message of this layer (may be empty for wrappers)
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Get the source error, if any
    pub fn source_error(&self) -> Option<&ExError> {
        self.source.as_deref()
    }

    /// Batch line number, searched through the wrap chain
    pub fn line(&self) -> Option<usize> {
        self.chain().find_map(|e| e.line)
    }

    /// Conflict details, searched through the wrap chain
    pub fn conflict_info(&self) -> Option<&ConflictInfo> {
        self.chain().find_map(|e| e.conflict.as_ref())
    }

    /// Validation details, searched through the wrap chain
    pub fn validation_errors(&self) -> Option<&ValidationErrors> {
        self.chain().find_map(|e| e.validation.as_ref())
    }

    fn chain(&self) -> impl Iterator<Item = &ExError> {
        std::iter::successors(Some(self), |e| e.source.as_deref())
    }

    /// Render the text shown to an end user.
    ///
    /// Expected outcomes get an actionable message; anything else only
    /// carries the correlation id, the detail stays in the logs.
    pub fn user_message(&self, correlation: &RequestId) -> String {
        match self.kind {
            ExErrorKind::Conflict => {
                "This record was changed by someone else since you opened it. Reload and retry."
                    .to_string()
            }
            ExErrorKind::NotFound => "No such record.".to_string(),
            ExErrorKind::Validation => {
                let mut out = String::from("The record could not be saved:");
                if let Some(errors) = self.validation_errors() {
                    for item in errors.iter() {
                        out.push_str(&format!("\n- {}: {}", item.field, item.rule));
                    }
                }
                out
            }
            ExErrorKind::Argument => match self.line() {
                Some(line) => format!("Line {}: {}", line, self.root_message()),
                None => self.root_message().to_string(),
            },
            _ => format!(
                "Something went wrong. Please quote reference {} when reporting this.",
                correlation
            ),
        }
    }

    fn root_message(&self) -> &str {
        self.chain()
            .last()
            .map(|e| e.message.as_str())
            .unwrap_or_default()
    }
}

impl std::fmt::Display for ExError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (&self.op, &self.entity_id) {
            (Some(op), Some(id)) => write!(f, "{} {}: ", op, id)?,
            (Some(op), None) => write!(f, "{}: ", op)?,
            (None, Some(id)) => write!(f, "{}: ", id)?,
            (None, None) => {}
        }
        if let Some(source) = &self.source {
            return write!(f, "{}", source);
        }
        if let Some(line) = self.line {
            write!(f, "line {}: ", line)?;
        }
        if self.message.is_empty() {
            write!(f, "{}", self.kind.describe())
        } else {
            write!(f, "{}", self.message)
        }
    }
}

impl std::error::Error for ExError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_deref()
            .map(|e| e as &(dyn std::error::Error + 'static))
    }
}

// ========== End Error Facility ==========

impl From<ArgumentError> for ExError {
    fn from(err: ArgumentError) -> Self {
        let mut ex = ExError::new(ExErrorKind::Argument).with_message(err.message.clone());
        if let Some(line) = err.line {
            ex = ex.with_line(line);
        }
        ex
    }
}

impl From<serde_json::Error> for ExError {
    fn from(err: serde_json::Error) -> Self {
        ExError::new(ExErrorKind::Serialization).with_message(err.to_string())
    }
}
