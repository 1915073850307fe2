//! Follow the change notification channel

use anyhow::Result;
use biblio_core::{Context, ExErrorKind};
use clap::Args;
use std::time::Duration;

use super::GlobalArgs;

#[derive(Debug, Args)]
pub struct ListenArgs {
    /// Stop after this many events
    #[arg(long)]
    pub max_events: Option<usize>,

    /// Stop after this many seconds
    #[arg(long)]
    pub timeout_secs: Option<u64>,

    /// Replay events after this sequence number instead of starting at the end
    #[arg(long)]
    pub from_seq: Option<i64>,
}

pub fn execute(global: &GlobalArgs, args: ListenArgs) -> Result<()> {
    let client = global.client()?;
    let ctx = match args.timeout_secs {
        Some(secs) => Context::new().with_timeout(Duration::from_secs(secs)),
        None => Context::new(),
    };
    let mut listener = match args.from_seq {
        Some(seq) => client.listener_from(seq),
        None => client.listener(&ctx)?,
    };

    let mut seen = 0;
    while args.max_events.map_or(true, |max| seen < max) {
        let event = match listener.listen(&ctx) {
            Ok(event) => event,
            Err(e) if e.kind() == ExErrorKind::DeadlineExceeded => break,
            Err(e) => return Err(e.into()),
        };
        println!(
            "{}",
            serde_json::json!({
                "seq": event.seq,
                "name": event.name.as_str(),
                "record_type": event.record_type,
                "record_id": event.record_id,
                "version_id": event.version_id,
                "created_at": event.created_at,
            })
        );
        seen += 1;
    }
    Ok(())
}
