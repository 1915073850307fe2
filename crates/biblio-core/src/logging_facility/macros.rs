//! Canonical logging macros
//!
//! These macros provide a structured, consistent way to log operations.

/// Log the start of an operation
///
/// # Example
///
/// ```
/// # use biblio_core::log_op_start;
/// log_op_start!("save_dataset");
/// log_op_start!("save_dataset", record_id = "d1");
/// ```
#[macro_export]
macro_rules! log_op_start {
    ($op:expr) => {
        tracing::debug!(
            component = module_path!(),
            op = $op,
            event = $crate::schema::EVENT_START,
        );
    };
    ($op:expr, $($field:tt)*) => {
        tracing::debug!(
            component = module_path!(),
            op = $op,
            event = $crate::schema::EVENT_START,
            $($field)*
        );
    };
}

/// Log the successful end of an operation
///
/// # Example
///
/// ```
/// # use biblio_core::log_op_end;
/// log_op_end!("save_dataset", duration_ms = 42);
/// ```
#[macro_export]
macro_rules! log_op_end {
    ($op:expr, duration_ms = $duration:expr) => {
        tracing::info!(
            component = module_path!(),
            op = $op,
            event = $crate::schema::EVENT_END,
            duration_ms = $duration,
        );
    };
    ($op:expr, duration_ms = $duration:expr, $($field:tt)*) => {
        tracing::info!(
            component = module_path!(),
            op = $op,
            event = $crate::schema::EVENT_END,
            duration_ms = $duration,
            $($field)*
        );
    };
}

/// Log an operation error
///
/// # Example
///
/// ```
/// # use biblio_core::{log_op_error, errors::{ExError, ExErrorKind}};
/// let err = ExError::new(ExErrorKind::Persistence).with_message("disk full");
/// log_op_error!("save_dataset", &err, duration_ms = 10);
/// ```
#[macro_export]
macro_rules! log_op_error {
    ($op:expr, $err:expr, duration_ms = $duration:expr) => {{
        let ex_err: &$crate::errors::ExError = $err;
        tracing::error!(
            component = module_path!(),
            op = $op,
            event = $crate::schema::EVENT_END_ERROR,
            duration_ms = $duration,
            err_kind = ?ex_err.kind(),
            err_code = ex_err.code(),
            error = %ex_err,
        );
    }};
    ($op:expr, $err:expr, duration_ms = $duration:expr, $($field:tt)*) => {{
        let ex_err: &$crate::errors::ExError = $err;
        tracing::error!(
            component = module_path!(),
            op = $op,
            event = $crate::schema::EVENT_END_ERROR,
            duration_ms = $duration,
            err_kind = ?ex_err.kind(),
            err_code = ex_err.code(),
            error = %ex_err,
            $($field)*
        );
    }};
}

/// Log the end of an operation that returned `Result`.
///
/// Expected outcomes (`ExErrorKind::is_expected`) are logged as a normal end
/// with an `outcome` field; anything else goes through `log_op_error!`.
#[macro_export]
macro_rules! log_op_result {
    ($op:expr, $result:expr, $started:expr, $($field:tt)*) => {{
        let duration_ms = $started.elapsed().as_millis() as u64;
        match $result {
            Ok(_) => {
                $crate::log_op_end!($op, duration_ms = duration_ms, outcome = "ok", $($field)*);
            }
            Err(err) if err.kind().is_expected() => {
                $crate::log_op_end!(
                    $op,
                    duration_ms = duration_ms,
                    outcome = err.code(),
                    $($field)*
                );
            }
            Err(err) => {
                $crate::log_op_error!($op, err, duration_ms = duration_ms, $($field)*);
            }
        }
    }};
}
