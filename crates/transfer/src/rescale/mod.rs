//! Image rescaling pipeline.
//!
//! Produces the scaled representation of every original image of one
//! deployment: each image is read from the source, downscaled and re-encoded
//! as JPEG on the blocking pool, and written to the target under its derived
//! object name. Up to [`RescaleOptions::workers`] images are in flight at
//! once.
//!
//! Catalog changes depend on where the scaled image goes:
//! - source and target are the same backend: the original placement becomes
//!   the scaled one,
//! - different backends: a scaled placement is added on the target,
//! - different backends with `remove_original`: the original placement is
//!   moved to the target as the scaled one.
//!
//! Nothing is ever deleted. With `remove_original` the summary lists the
//! originals that can be removed by hand.

mod profile;
mod stream;

pub use self::profile::RescaleProfile;
pub use self::stream::rescale;
use crate::commit::{DEFAULT_COMMIT_INTERVAL, DEFAULT_COMMIT_THRESHOLD};
use crate::error::{ErrorKind, Result};
use crate::registry::Endpoint;
use futures::StreamExt;
use mediashift_catalog::Database;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub const DEFAULT_WORKERS: usize = 10;

#[derive(Debug, Clone)]
pub struct RescaleOptions {
    pub profile: RescaleProfile,
    /// Images processed concurrently.
    pub workers: usize,
    /// Move the catalog placement off the source and list the originals for
    /// deletion.
    pub remove_original: bool,
    pub commit_threshold: usize,
    pub commit_interval: Duration,
    pub cancel: CancellationToken,
}
impl Default for RescaleOptions {
    fn default() -> Self {
        Self {
            profile: RescaleProfile::default(),
            workers: DEFAULT_WORKERS,
            remove_original: false,
            commit_threshold: DEFAULT_COMMIT_THRESHOLD,
            commit_interval: DEFAULT_COMMIT_INTERVAL,
            cancel: CancellationToken::new(),
        }
    }
}

/// Progress events emitted by [`rescale`].
///
/// Ordering mirrors [`TransferEvent`](crate::copy::TransferEvent):
/// `Started`, `DiscoveryComplete`, then `Rescaled`/`Failed` in completion
/// order interleaved with `Committed`, optionally `Interrupted`, and finally
/// `Complete`. A fatal error ends the stream early.
#[derive(Debug)]
pub enum RescaleEvent {
    Started,
    DiscoveryComplete { objects: u64, bytes: u64 },
    Rescaled { file_id: i64, object_name: String, derived_name: String, bytes_in: u64, bytes_out: u64 },
    Failed { file_id: i64, object_name: String, error: crate::error::Error },
    Committed(u64),
    Interrupted,
    Complete(RescaleSummary),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RescaleSummary {
    pub discovered: u64,
    pub rescaled: u64,
    pub failed: u64,
    pub bytes_in: u64,
    pub bytes_out: u64,
    pub committed: u64,
    pub interrupted: bool,
    /// Fully-qualified locations of originals that may now be deleted. Only
    /// filled with `remove_original`.
    pub deletions: Vec<String>,
}

/// Run a rescale to completion, logging progress.
pub async fn run_rescale(
    catalog: &Database,
    source: &Endpoint,
    target: &Endpoint,
    deployment_id: i64,
    options: &RescaleOptions,
) -> Result<RescaleSummary> {
    let events = rescale(catalog, source, target, deployment_id, options);
    futures::pin_mut!(events);
    let mut total = 0;
    let mut done = 0;
    while let Some(event) = events.next().await {
        match event? {
            RescaleEvent::Started => {
                tracing::info!(deployment_id, source = source.storage_id, target = target.storage_id, "rescale started");
            },
            RescaleEvent::DiscoveryComplete { objects, bytes } => {
                total = objects;
                tracing::info!(objects, bytes, "images discovered");
            },
            RescaleEvent::Rescaled { file_id, derived_name, bytes_in, bytes_out, .. } => {
                done += 1;
                tracing::debug!(file_id, object = %derived_name, bytes_in, bytes_out, progress = %format!("{done}/{total}"), "rescaled");
            },
            RescaleEvent::Failed { file_id, error, .. } => {
                done += 1;
                tracing::debug!(file_id, retryable = error.is_retryable(), "left for the next run");
            },
            RescaleEvent::Committed(count) => tracing::info!(count, progress = %format!("{done}/{total}"), "placements committed"),
            RescaleEvent::Interrupted => tracing::warn!("rescale interrupted, committing completed images"),
            RescaleEvent::Complete(summary) => return Ok(summary),
        }
    }
    exn::bail!(ErrorKind::TransferAborted)
}
