//! Core types shared across Biblio facilities
//!
//! This crate provides foundational types used by the error handling,
//! logging and storage layers:
//!
//! - **Correlation types**: RequestId, TraceId
//! - **Context**: cancellation flag and deadline threaded through every call
//! - **Schema constants**: Canonical field keys and event names

pub mod context;
pub mod correlation;
pub mod schema;

pub use context::{Context, Interrupt};
pub use correlation::{RequestId, TraceId};
