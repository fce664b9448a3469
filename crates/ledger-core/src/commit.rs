use crate::chain::{AppendOutcome, BlockSink, Chain};
use crate::error::{LedgerError, Result};
use crate::record::{Record, RecordSource};
use anyhow::Context;
use serde::Serialize;
use tracing::{info, warn};

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct CommitReport {
    /// Record id and the index of the block that committed it.
    pub committed: Vec<(u64, u64)>,
    /// Record id and why it was left pending.
    pub skipped: Vec<(u64, String)>,
}

/// Commit every pending record as its own block.
///
/// Records whose block cannot be mined in time, or is rejected, stay pending
/// and are reported as skipped. Persistence failures stop the run.
pub fn commit_pending<S, R>(chain: &mut Chain<S>, source: &R) -> Result<CommitReport>
where
    S: BlockSink,
    R: RecordSource + ?Sized,
{
    let records = source
        .fetch_pending()
        .context("fetching pending records")
        .map_err(LedgerError::Persistence)?;
    let mut report = CommitReport::default();
    if records.is_empty() {
        info!("No new data to process.");
        return Ok(report);
    }

    for record in &records {
        match commit_record(chain, record) {
            Ok(index) => {
                source
                    .mark_processed(record.id)
                    .with_context(|| format!("marking record {} processed", record.id))
                    .map_err(LedgerError::Persistence)?;
                report.committed.push((record.id, index));
            }
            Err(err) if err.is_recoverable() => {
                warn!(record = record.id, error = %err, "record left pending");
                report.skipped.push((record.id, err.to_string()));
            }
            Err(err) => return Err(err),
        }
    }

    info!(
        committed = report.committed.len(),
        skipped = report.skipped.len(),
        "commit run finished"
    );
    Ok(report)
}

fn commit_record<S: BlockSink>(chain: &mut Chain<S>, record: &Record) -> Result<u64> {
    let hashes = record.category_hashes()?;
    let mut block = chain.next_block(hashes)?;
    chain.mine(&mut block)?;
    match chain.append(block)? {
        AppendOutcome::Appended { index, .. } => Ok(index),
        AppendOutcome::Rejected { index, reason } => {
            Err(LedgerError::ValidationRejected { index, reason })
        }
    }
}
