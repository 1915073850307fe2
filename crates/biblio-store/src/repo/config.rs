//! Repository configuration
//!
//! Hooks and mutation tables are registered once, up front, on an explicit
//! `RepoConfig` value; there is no global registry.

use biblio_core::errors::{ExError, ExErrorKind};
use biblio_core::mutation::{dataset, publication};
use biblio_core::{Dataset, MutationEngine, Publication};
use std::sync::Arc;

use crate::errors::Result;
use crate::snapshot::RewriteGrant;

/// Runs on every record read or saved through the repository
pub type Loader<R> = Arc<dyn Fn(&mut R) -> Result<()> + Send + Sync>;

/// Runs after a save of a record has committed
pub type SaveListener<R> = Arc<dyn Fn(&R) + Send + Sync>;

/// Per-record-type hooks and mutators
pub struct RecordConfig<R> {
    pub loaders: Vec<Loader<R>>,
    pub listeners: Vec<SaveListener<R>>,
    pub mutations: MutationEngine<R>,
}

impl<R> RecordConfig<R> {
    pub fn new(mutations: MutationEngine<R>) -> Self {
        Self {
            loaders: Vec::new(),
            listeners: Vec::new(),
            mutations,
        }
    }

    /// Apply every loader in registration order
    ///
    /// # Errors
    ///
    /// The first loader error.
    pub fn load(&self, record: &mut R) -> Result<()> {
        for loader in &self.loaders {
            loader(record)?;
        }
        Ok(())
    }
}

impl<R> Clone for RecordConfig<R> {
    fn clone(&self) -> Self {
        Self {
            loaders: self.loaders.clone(),
            listeners: self.listeners.clone(),
            mutations: self.mutations.clone(),
        }
    }
}

#[derive(Clone)]
pub struct RepoConfig {
    pub publications: RecordConfig<Publication>,
    pub datasets: RecordConfig<Dataset>,
    pub allow_history_rewrite: bool,
}

impl Default for RepoConfig {
    fn default() -> Self {
        Self {
            publications: RecordConfig::new(publication::default_engine()),
            datasets: RecordConfig::new(dataset::default_engine()),
            allow_history_rewrite: false,
        }
    }
}

impl std::fmt::Debug for RepoConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RepoConfig")
            .field("publication_mutations", &self.publications.mutations)
            .field("dataset_mutations", &self.datasets.mutations)
            .field("allow_history_rewrite", &self.allow_history_rewrite)
            .finish_non_exhaustive()
    }
}

impl RepoConfig {
    pub fn builder() -> RepoConfigBuilder {
        RepoConfigBuilder {
            config: RepoConfig::default(),
        }
    }

    /// Permission to rewrite stored history in place
    ///
    /// # Errors
    ///
    /// `Forbidden` unless `allow_history_rewrite` is set.
    pub fn rewrite_grant(&self, op: &str) -> Result<RewriteGrant> {
        if !self.allow_history_rewrite {
            return Err(ExError::new(ExErrorKind::Forbidden)
                .with_op(op.to_string())
                .with_message("history rewrite is disabled"));
        }
        Ok(RewriteGrant::new())
    }
}

pub struct RepoConfigBuilder {
    config: RepoConfig,
}

impl RepoConfigBuilder {
    pub fn publication_loader<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut Publication) -> Result<()> + Send + Sync + 'static,
    {
        self.config.publications.loaders.push(Arc::new(f));
        self
    }

    pub fn publication_listener<F>(mut self, f: F) -> Self
    where
        F: Fn(&Publication) + Send + Sync + 'static,
    {
        self.config.publications.listeners.push(Arc::new(f));
        self
    }

    pub fn publication_mutations(mut self, engine: MutationEngine<Publication>) -> Self {
        self.config.publications.mutations = engine;
        self
    }

    pub fn dataset_loader<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut Dataset) -> Result<()> + Send + Sync + 'static,
    {
        self.config.datasets.loaders.push(Arc::new(f));
        self
    }

    pub fn dataset_listener<F>(mut self, f: F) -> Self
    where
        F: Fn(&Dataset) + Send + Sync + 'static,
    {
        self.config.datasets.listeners.push(Arc::new(f));
        self
    }

    pub fn dataset_mutations(mut self, engine: MutationEngine<Dataset>) -> Self {
        self.config.datasets.mutations = engine;
        self
    }

    pub fn allow_history_rewrite(mut self, allow: bool) -> Self {
        self.config.allow_history_rewrite = allow;
        self
    }

    pub fn build(self) -> RepoConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rewrite_grant_is_gated() {
        let err = RepoConfig::default().rewrite_grant("transfer").unwrap_err();
        assert_eq!(err.kind(), ExErrorKind::Forbidden);

        let config = RepoConfig::builder().allow_history_rewrite(true).build();
        assert!(config.rewrite_grant("transfer").is_ok());
    }

    #[test]
    fn test_loaders_run_in_order() {
        let config = RepoConfig::builder()
            .dataset_loader(|d| {
                d.message = Some("first".to_string());
                Ok(())
            })
            .dataset_loader(|d| {
                let prev = d.message.clone().unwrap_or_default();
                d.message = Some(format!("{} second", prev));
                Ok(())
            })
            .build();
        let mut d = Dataset::new("d1");
        config.datasets.load(&mut d).unwrap();
        assert_eq!(d.message.as_deref(), Some("first second"));
    }
}
