//! Versioned snapshot storage
//!
//! A `SnapshotStore` owns one table of snapshot chains. It is stateless:
//! every operation runs on the connection of a transaction opened by the
//! `Client`, which is what lets several stores share one transaction.

pub mod iter;
pub mod model;
pub mod store;

pub use iter::{PageKey, SnapshotIter};
pub use model::{EventName, Snapshot};
pub use rusqlite::types::Value as SqlValue;
pub use store::{is_valid_store_name, Filter, RewriteGrant, SnapshotStore};
