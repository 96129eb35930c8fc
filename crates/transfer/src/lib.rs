//! Moving media objects between storage backends.
//!
//! - [`registry`]: provisions backend records and resolves them into
//!   validated [`Endpoint`]s.
//! - [`copy`]: resumable batch transfers from one backend to another.
//! - [`rescale`]: the image rescaling pipeline.
//!
//! Both engines report progress as a stream of events and checkpoint
//! completed work to the catalog through a [`CommitBuffer`]. They stop
//! cooperatively when their [`CancellationToken`] is cancelled.

mod commit;
pub mod copy;
pub mod error;
pub mod registry;
pub mod rescale;

pub use crate::commit::{CommitBuffer, DEFAULT_COMMIT_INTERVAL, DEFAULT_COMMIT_THRESHOLD};
pub use crate::registry::{Endpoint, Registry};
pub use mediashift_storage::backend::{NoPrompt, PathPrompt};
pub use tokio_util::sync::CancellationToken;
