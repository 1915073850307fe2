//! Streaming bulk mutation
//!
//! Reads `{"id", "op", "args"}` JSON lines, applies each one in its own
//! transaction and writes one outcome line per input line. A bad line is
//! reported and the stream carries on.

use biblio_core::errors::{ExError, ExErrorKind};
use biblio_core::mutation::batch::{BatchItem, BatchOutcome, BatchReader};
use biblio_core::{Context, Record, RecordType, User};
use serde::Serialize;
use std::io::{BufRead, Write};

use crate::errors::{io_error, Result};
use crate::repo::Repo;

/// Totals of one bulk run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BulkSummary {
    pub processed: usize,
    pub saved: usize,
    pub failed: usize,
}

fn write_outcome<W: Write>(output: &mut W, outcome: &BatchOutcome) -> Result<()> {
    serde_json::to_writer(&mut *output, outcome)
        .map_err(|e| ExError::from(e).with_op("write_outcome"))?;
    writeln!(output).map_err(|e| io_error("write_outcome", e))
}

impl Repo {
    fn mutate_one(
        &self,
        ctx: &Context,
        record_type: RecordType,
        item: &BatchItem,
        user: &User,
    ) -> Result<String> {
        let mutations = std::slice::from_ref(&item.mutation);
        let version_id = match record_type {
            RecordType::Publication => self
                .mutate_publication(ctx, &item.id, user, mutations)?
                .version_id()
                .map(str::to_string),
            RecordType::Dataset => self
                .mutate_dataset(ctx, &item.id, user, mutations)?
                .version_id()
                .map(str::to_string),
        };
        Ok(version_id.unwrap_or_default())
    }

    /// Apply a JSON-lines mutation stream to records of `record_type`
    ///
    /// # Errors
    ///
    /// Only failures of the stream itself (`Io`) or the context's
    /// interruption; per-line failures are written to `output`.
    pub fn mutate_stream<B: BufRead, W: Write>(
        &self,
        ctx: &Context,
        record_type: RecordType,
        input: B,
        output: &mut W,
        user: &User,
    ) -> Result<BulkSummary> {
        let mut summary = BulkSummary::default();

        for item in BatchReader::new(input) {
            if let Some(interrupt) = ctx.interrupted() {
                return Err(ExError::interrupted("mutate_stream", interrupt));
            }

            let outcome = match item {
                Err(e) if e.kind() == ExErrorKind::Io => {
                    return Err(e.wrap("mutate_stream", "input"));
                }
                Err(e) => BatchOutcome::failed(e.line().unwrap_or_default(), "", e.to_string()),
                Ok(item) => match self.mutate_one(ctx, record_type, &item, user) {
                    Ok(version_id) => BatchOutcome::saved(item.line, &item.id, version_id),
                    Err(e) if !e.kind().is_expected() && ctx.is_done() => {
                        return Err(e.wrap("mutate_stream", item.id));
                    }
                    Err(e) => BatchOutcome::failed(item.line, &item.id, e.to_string()),
                },
            };

            summary.processed += 1;
            if outcome.error.is_some() {
                summary.failed += 1;
            } else {
                summary.saved += 1;
            }
            write_outcome(output, &outcome)?;
        }

        output.flush().map_err(|e| io_error("mutate_stream", e))?;

        tracing::info!(
            record_type = record_type.as_str(),
            processed = summary.processed,
            saved = summary.saved,
            failed = summary.failed,
            "Bulk mutation finished"
        );
        Ok(summary)
    }
}
