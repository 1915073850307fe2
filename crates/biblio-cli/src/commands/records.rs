//! Read and purge commands on single records

use anyhow::{bail, Result};
use biblio_core::{Context, Dataset, Publication, RecordType};
use biblio_store::repo::RepoRecord;
use biblio_store::{Repo, RepoConfig};
use chrono::{DateTime, Utc};
use clap::Args;

use super::{parse_record_type, print_json, version_json, GlobalArgs};

#[derive(Debug, Args)]
pub struct RecordArgs {
    /// `publication` or `dataset`
    #[arg(value_parser = parse_record_type)]
    pub record_type: RecordType,

    pub id: String,
}

#[derive(Debug, Args)]
pub struct AsOfArgs {
    #[arg(value_parser = parse_record_type)]
    pub record_type: RecordType,

    pub id: String,

    /// RFC 3339 timestamp, e.g. 2024-01-31T12:00:00Z
    pub at: DateTime<Utc>,
}

#[derive(Debug, Args)]
pub struct PurgeAllArgs {
    #[arg(value_parser = parse_record_type)]
    pub record_type: RecordType,

    /// Confirm the irreversible deletion
    #[arg(long)]
    pub yes: bool,
}

fn current<R: RepoRecord>(repo: &Repo, ctx: &Context, id: &str) -> Result<serde_json::Value> {
    version_json(&repo.get::<R>(ctx, id)?)
}

fn versions<R: RepoRecord>(repo: &Repo, ctx: &Context, id: &str) -> Result<serde_json::Value> {
    let history = repo
        .history::<R>(ctx, id)?
        .iter()
        .map(version_json)
        .collect::<Result<Vec<_>>>()?;
    Ok(serde_json::Value::Array(history))
}

fn at<R: RepoRecord>(
    repo: &Repo,
    ctx: &Context,
    id: &str,
    t: DateTime<Utc>,
) -> Result<serde_json::Value> {
    version_json(&repo.as_of::<R>(ctx, id, t)?)
}

pub fn get(global: &GlobalArgs, args: RecordArgs) -> Result<()> {
    let repo = global.repo(RepoConfig::default())?;
    let ctx = Context::new();
    let value = match args.record_type {
        RecordType::Publication => current::<Publication>(&repo, &ctx, &args.id)?,
        RecordType::Dataset => current::<Dataset>(&repo, &ctx, &args.id)?,
    };
    print_json(&value)
}

pub fn history(global: &GlobalArgs, args: RecordArgs) -> Result<()> {
    let repo = global.repo(RepoConfig::default())?;
    let ctx = Context::new();
    let value = match args.record_type {
        RecordType::Publication => versions::<Publication>(&repo, &ctx, &args.id)?,
        RecordType::Dataset => versions::<Dataset>(&repo, &ctx, &args.id)?,
    };
    print_json(&value)
}

pub fn as_of(global: &GlobalArgs, args: AsOfArgs) -> Result<()> {
    let repo = global.repo(RepoConfig::default())?;
    let ctx = Context::new();
    let value = match args.record_type {
        RecordType::Publication => at::<Publication>(&repo, &ctx, &args.id, args.at)?,
        RecordType::Dataset => at::<Dataset>(&repo, &ctx, &args.id, args.at)?,
    };
    print_json(&value)
}

pub fn purge(global: &GlobalArgs, args: RecordArgs) -> Result<()> {
    let repo = global.repo(RepoConfig::default())?;
    let ctx = Context::new();
    let removed = match args.record_type {
        RecordType::Publication => repo.purge::<Publication>(&ctx, &args.id)?,
        RecordType::Dataset => repo.purge::<Dataset>(&ctx, &args.id)?,
    };
    println!("Purged {} version(s) of {} {}", removed, args.record_type, args.id);
    Ok(())
}

pub fn purge_all(global: &GlobalArgs, args: PurgeAllArgs) -> Result<()> {
    if !args.yes {
        bail!(
            "purge-all deletes every {} and its history; pass --yes to confirm",
            args.record_type
        );
    }
    let repo = global.repo(RepoConfig::default())?;
    let ctx = Context::new();
    let removed = match args.record_type {
        RecordType::Publication => repo.purge_all::<Publication>(&ctx)?,
        RecordType::Dataset => repo.purge_all::<Dataset>(&ctx)?,
    };
    tracing::warn!(record_type = args.record_type.as_str(), removed, "Purged all records");
    println!("Purged {} {} record(s)", removed, args.record_type);
    Ok(())
}
