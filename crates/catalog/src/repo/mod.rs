mod backend;
mod placement;

pub use self::backend::{BackendRepository, PendingBackend};
pub use self::placement::{PlacementRepository, RescaleUpdate};
