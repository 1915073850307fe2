//! Subcommands and the options every one of them shares

use anyhow::{Context as _, Result};
use biblio_core::{Record, RecordType, User};
use biblio_store::{Client, Repo, RepoConfig, StoreConfig};
use clap::Args;
use std::path::PathBuf;

pub mod listen;
pub mod maintenance;
pub mod migrate;
pub mod mutate;
pub mod records;

#[derive(Debug, Args)]
pub struct GlobalArgs {
    /// TOML store configuration
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Database file; overrides the configuration and BIBLIO_DATABASE
    #[arg(long, global = true)]
    pub db: Option<String>,

    /// User id stamped on every write
    #[arg(long, global = true, default_value = "biblio-cli")]
    pub user: String,

    /// Log as JSON instead of human-readable lines
    #[arg(long, global = true)]
    pub json_logs: bool,
}

impl GlobalArgs {
    /// Defaults, then the config file, then the environment, then `--db`
    pub fn store_config(&self) -> Result<StoreConfig> {
        let base = match &self.config {
            Some(path) => StoreConfig::from_file(path)
                .with_context(|| format!("loading {}", path.display()))?,
            None => StoreConfig::default(),
        };
        let mut config = base.overlay(|key| std::env::var(key).ok())?;
        if let Some(db) = &self.db {
            config = config.with_database(db.clone());
        }
        Ok(config)
    }

    pub fn client(&self) -> Result<Client> {
        let config = self.store_config()?;
        Client::open(&config).with_context(|| format!("opening {}", config.database))
    }

    pub fn repo(&self, repo_config: RepoConfig) -> Result<Repo> {
        Ok(Repo::new(self.client()?, repo_config))
    }

    pub fn acting_user(&self) -> User {
        User::new(self.user.clone(), self.user.clone())
    }
}

pub fn parse_record_type(s: &str) -> std::result::Result<RecordType, String> {
    s.parse().map_err(|e: biblio_core::ExError| e.to_string())
}

/// One version of a record as printed on stdout
pub fn version_json<R: Record>(record: &R) -> Result<serde_json::Value> {
    let meta = record.snapshot();
    Ok(serde_json::json!({
        "id": record.id(),
        "version_id": meta.version_id,
        "valid_from": meta.valid_from,
        "valid_until": meta.valid_until,
        "record": serde_json::to_value(record)?,
    }))
}

pub fn print_json(value: &serde_json::Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
