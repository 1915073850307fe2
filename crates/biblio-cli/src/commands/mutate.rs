//! Bulk mutation from a JSON-lines stream

use anyhow::Result;
use biblio_core::{Context, RecordType};
use biblio_store::RepoConfig;
use clap::Args;
use std::io::{self, BufWriter};

use super::{parse_record_type, GlobalArgs};

#[derive(Debug, Args)]
pub struct MutateArgs {
    /// `publication` or `dataset`
    #[arg(value_parser = parse_record_type)]
    pub record_type: RecordType,
}

pub fn execute(global: &GlobalArgs, args: MutateArgs) -> Result<()> {
    let repo = global.repo(RepoConfig::default())?;
    let ctx = Context::new();
    let user = global.acting_user();

    let stdin = io::stdin();
    let mut stdout = BufWriter::new(io::stdout().lock());
    let summary = repo.mutate_stream(&ctx, args.record_type, stdin.lock(), &mut stdout, &user)?;

    eprintln!(
        "Processed {} line(s): {} saved, {} failed",
        summary.processed, summary.saved, summary.failed
    );
    Ok(())
}
