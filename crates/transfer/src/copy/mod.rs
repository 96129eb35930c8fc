//! Resumable batch transfers between two backends.
//!
//! The primary entry point is [`transfer`], which streams [`TransferEvent`]s
//! while it copies every candidate of a [`Batch`](mediashift_catalog::Batch)
//! from the source to the target, one object at a time. Completed objects
//! are checkpointed to the catalog through a
//! [`CommitBuffer`](crate::CommitBuffer), so an interrupted run picks up
//! where it left off. [`run_transfer`] drains the stream, logging progress,
//! and returns the [`TransferSummary`].

mod stream;

pub use self::stream::transfer;
use crate::commit::{DEFAULT_COMMIT_INTERVAL, DEFAULT_COMMIT_THRESHOLD};
use crate::error::{ErrorKind, Result};
use crate::registry::{Endpoint, Registry};
use exn::ResultExt;
use futures::StreamExt;
use mediashift_catalog::{Batch, Candidate, Database};
use mediashift_storage::backend::PathPrompt;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone)]
pub struct TransferOptions {
    /// Don't copy objects the target already has; record them as placed.
    pub skip_existing: bool,
    pub commit_threshold: usize,
    pub commit_interval: Duration,
    /// Only report what would be copied.
    pub dry_run: bool,
    pub cancel: CancellationToken,
}
impl Default for TransferOptions {
    fn default() -> Self {
        Self {
            skip_existing: false,
            commit_threshold: DEFAULT_COMMIT_THRESHOLD,
            commit_interval: DEFAULT_COMMIT_INTERVAL,
            dry_run: false,
            cancel: CancellationToken::new(),
        }
    }
}

/// Progress events emitted by [`transfer`].
///
/// Events follow a strict ordering:
/// 1. [`Started`](Self::Started), exactly once.
/// 2. [`DiscoveryComplete`](Self::DiscoveryComplete), exactly once.
/// 3. One of [`Planned`](Self::Planned) (dry runs),
///    [`Transferred`](Self::Transferred), [`Skipped`](Self::Skipped) or
///    [`Failed`](Self::Failed) per candidate, interleaved with
///    [`Committed`](Self::Committed) whenever the commit buffer is flushed.
/// 4. [`Interrupted`](Self::Interrupted), only if the run was cancelled.
/// 5. A final [`Committed`](Self::Committed) if anything was still pending.
/// 6. [`Complete`](Self::Complete), exactly once.
///
/// A fatal error ends the stream early with an `Err` item, in which case
/// [`Complete`](Self::Complete) is never emitted.
#[derive(Debug)]
pub enum TransferEvent {
    Started,
    DiscoveryComplete { objects: u64, bytes: u64 },
    Planned(Candidate),
    Transferred { file_id: i64, object_name: String, bytes: u64 },
    /// Already on the target; only the catalog is updated.
    Skipped { file_id: i64, object_name: String },
    /// Copying this object failed; it stays eligible for the next run.
    Failed { file_id: i64, object_name: String, error: crate::error::Error },
    /// This many placements were written to the catalog.
    Committed(u64),
    Interrupted,
    Complete(TransferSummary),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransferSummary {
    pub discovered: u64,
    pub transferred: u64,
    pub skipped: u64,
    pub failed: u64,
    /// Bytes written to the target.
    pub bytes: u64,
    /// Placements written to the catalog.
    pub committed: u64,
    pub interrupted: bool,
}

/// Resolve and validate both ends of a transfer.
///
/// Any failure is wrapped in [`TransferAborted`](ErrorKind::TransferAborted):
/// no object has been touched.
pub async fn prepare(
    registry: &Registry,
    source_id: i64,
    target_id: i64,
    prompt: Arc<dyn PathPrompt>,
) -> Result<(Endpoint, Endpoint)> {
    if source_id == target_id {
        exn::bail!(ErrorKind::InvalidRequest("source and target must be different backends"));
    }
    let source = registry.resolve(source_id, prompt.clone()).await.or_raise(|| ErrorKind::TransferAborted)?;
    let target = registry.resolve(target_id, prompt).await.or_raise(|| ErrorKind::TransferAborted)?;
    Ok((source, target))
}

/// Run a transfer to completion, logging progress.
pub async fn run_transfer(
    catalog: &Database,
    source: &Endpoint,
    target: &Endpoint,
    batch: &Batch,
    options: &TransferOptions,
) -> Result<TransferSummary> {
    let events = transfer(catalog, source, target, batch, options);
    futures::pin_mut!(events);
    let mut total = 0;
    let mut done = 0;
    while let Some(event) = events.next().await {
        match event? {
            TransferEvent::Started => {
                tracing::info!(batch = batch.id, source = source.storage_id, target = target.storage_id, "transfer started");
            },
            TransferEvent::DiscoveryComplete { objects, bytes } => {
                total = objects;
                tracing::info!(objects, bytes, "candidates discovered");
            },
            TransferEvent::Planned(candidate) => {
                tracing::info!(file_id = candidate.file_id, object = %candidate.object_name, bytes = candidate.byte_size, "would transfer");
            },
            TransferEvent::Transferred { file_id, object_name, bytes } => {
                done += 1;
                tracing::debug!(file_id, object = %object_name, bytes, progress = %format!("{done}/{total}"), "transferred");
            },
            TransferEvent::Skipped { file_id, object_name } => {
                done += 1;
                tracing::debug!(file_id, object = %object_name, "already on target");
            },
            TransferEvent::Failed { file_id, error, .. } => {
                done += 1;
                tracing::debug!(file_id, retryable = error.is_retryable(), "left for the next run");
            },
            TransferEvent::Committed(count) => tracing::info!(count, progress = %format!("{done}/{total}"), "placements committed"),
            TransferEvent::Interrupted => tracing::warn!("transfer interrupted, committing completed objects"),
            TransferEvent::Complete(summary) => return Ok(summary),
        }
    }
    // The stream always ends with either an error or `Complete`.
    exn::bail!(ErrorKind::TransferAborted)
}
