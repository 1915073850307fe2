//! Biblio Store - versioned snapshot persistence on SQLite
//!
//! Provides:
//! - SQLite schema with migrations framework
//! - `SnapshotStore`: append-only version chains per record id
//! - `Client` with pooled connections and explicit transactions
//! - `Repo`: the record-level save / update / mutate pipeline
//! - `Listener`: change notifications for downstream consumers

pub mod client;
pub mod config;
pub mod db;
pub mod errors;
pub mod listener;
pub mod migrations;
pub mod repo;
pub mod snapshot;

// Re-export key types
pub use client::{Client, ClientBuilder, StoreRef, Tx, TxStore};
pub use config::StoreConfig;
pub use errors::Result;
pub use listener::{Event, Listener, NotificationHub};
pub use repo::{Repo, RepoConfig, TxRepo};
pub use snapshot::{EventName, Filter, RewriteGrant, Snapshot, SnapshotIter, SnapshotStore, SqlValue};
