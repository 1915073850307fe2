//! Store-wide maintenance jobs

use anyhow::{Context as _, Result};
use biblio_core::{Context, Contributor};
use biblio_store::RepoConfig;
use chrono::{NaiveDate, Utc};
use clap::Args;

use super::GlobalArgs;

#[derive(Debug, Args)]
pub struct TransferArgs {
    /// Person id to move contributions away from
    #[arg(long)]
    pub from: String,

    /// Person id to move contributions to
    #[arg(long)]
    pub to: String,

    #[arg(long, default_value = "")]
    pub first_name: String,

    #[arg(long, default_value = "")]
    pub last_name: String,

    /// Required: the transfer rewrites stored history in place
    #[arg(long)]
    pub allow_history_rewrite: bool,
}

#[derive(Debug, Args)]
pub struct LiftEmbargoesArgs {
    /// Reference date (YYYY-MM-DD); defaults to today
    #[arg(long)]
    pub today: Option<NaiveDate>,
}

pub fn transfer(global: &GlobalArgs, args: TransferArgs) -> Result<()> {
    let config = RepoConfig::builder()
        .allow_history_rewrite(args.allow_history_rewrite)
        .build();
    let repo = global.repo(config)?;
    let to = Contributor::new(args.first_name, args.last_name).with_person_id(args.to.clone());

    let rewritten = repo
        .transfer_contributor(&Context::new(), &args.from, &to)
        .with_context(|| format!("transferring {} to {}", args.from, args.to))?;
    println!("Rewrote {} snapshot(s)", rewritten);
    Ok(())
}

pub fn lift_embargoes(global: &GlobalArgs, args: LiftEmbargoesArgs) -> Result<()> {
    let repo = global.repo(RepoConfig::default())?;
    let today = args.today.unwrap_or_else(|| Utc::now().date_naive());

    let lifted = repo.lift_expired_embargoes(&Context::new(), today, &global.acting_user())?;
    println!("Lifted {} embargo(es) as of {}", lifted, today);
    Ok(())
}
