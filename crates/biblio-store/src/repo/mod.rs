//! Record repository over the snapshot stores
//!
//! `Repo` owns a `Client` and an explicit `RepoConfig`. Every operation
//! exists twice: on `Repo`, taking a `&Context` and opening its own
//! transaction, and on `TxRepo`, which is bound to a transaction opened by
//! `Repo::transaction` so several operations commit together.

pub mod bulk;
pub mod config;
mod datasets;
mod maintenance;
mod publications;
mod records;
mod relations;

pub use bulk::BulkSummary;
pub use config::{Loader, RecordConfig, RepoConfig, RepoConfigBuilder, SaveListener};
pub use records::RepoRecord;

use biblio_core::Context;
use std::sync::Arc;

use crate::client::{Client, Tx};
use crate::errors::Result;

/// Record-level façade; cheap to clone
#[derive(Clone)]
pub struct Repo {
    client: Client,
    config: Arc<RepoConfig>,
}

impl std::fmt::Debug for Repo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repo")
            .field("client", &self.client)
            .field("config", &self.config)
            .finish()
    }
}

impl Repo {
    pub fn new(client: Client, config: RepoConfig) -> Self {
        Self {
            client,
            config: Arc::new(config),
        }
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn config(&self) -> &RepoConfig {
        &self.config
    }

    /// Run `f` with a repository bound to one write transaction
    ///
    /// # Errors
    ///
    /// Whatever `f` returns (nothing is committed then), or the
    /// transaction's own failures.
    pub fn transaction<T, F>(&self, ctx: &Context, f: F) -> Result<T>
    where
        F: FnOnce(&TxRepo<'_>) -> Result<T>,
    {
        self.client.with_transaction(ctx, |tx| {
            f(&TxRepo {
                tx,
                config: self.config.as_ref(),
            })
        })
    }

    /// Run `f` with a repository bound to one read transaction
    ///
    /// # Errors
    ///
    /// As for [`Repo::transaction`].
    pub fn read<T, F>(&self, ctx: &Context, f: F) -> Result<T>
    where
        F: FnOnce(&TxRepo<'_>) -> Result<T>,
    {
        self.client.read(ctx, |tx| {
            f(&TxRepo {
                tx,
                config: self.config.as_ref(),
            })
        })
    }
}

/// A repository bound to an open transaction
pub struct TxRepo<'t> {
    tx: &'t Tx<'t>,
    config: &'t RepoConfig,
}

impl<'t> TxRepo<'t> {
    pub fn tx(&self) -> &'t Tx<'t> {
        self.tx
    }

    pub fn context(&self) -> &'t Context {
        self.tx.context()
    }

    pub fn config(&self) -> &'t RepoConfig {
        self.config
    }
}
