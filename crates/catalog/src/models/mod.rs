mod backend;
mod media;
mod placement;

pub(crate) use self::backend::BackendRow;
pub use self::backend::{BackendRecord, NewBackend};
pub use self::media::{MediaType, Representation};
pub(crate) use self::placement::{CandidateRow, PlacementRow};
pub use self::placement::{Candidate, Placement};
