use crate::error::{Error, ErrorKind};
use exn::ResultExt;
use mediashift_storage::BackendKind;
use mediashift_storage::marker::MarkerIdentity;
use time::UtcDateTime;

/// A storage backend as recorded in the catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendRecord {
    pub storage_id: i64,
    pub kind: BackendKind,
    /// Bucket URL for object stores, mount path for local disks.
    pub location: String,
    /// Lower is more authoritative.
    pub priority: i64,
    pub notes: String,
    pub device_label: Option<String>,
    pub created_at: UtcDateTime,
}
impl BackendRecord {
    /// Identity the marker file on a local disk must agree with.
    pub fn marker_identity(&self) -> MarkerIdentity {
        MarkerIdentity {
            storage_id: self.storage_id,
            created_at: self.created_at.unix_timestamp(),
            device_label: self.device_label.clone().unwrap_or_default(),
        }
    }
}

/// Values for a backend record about to be inserted; the catalog assigns
/// `storage_id` and `created_at`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewBackend {
    pub kind: BackendKind,
    pub location: String,
    pub priority: i64,
    pub notes: String,
    pub device_label: Option<String>,
}

#[derive(sqlx::FromRow)]
pub(crate) struct BackendRow {
    storage_id: i64,
    kind: String,
    location: String,
    priority: i64,
    notes: String,
    device_label: Option<String>,
    created_at: i64,
}
impl TryFrom<BackendRow> for BackendRecord {
    type Error = Error;
    fn try_from(row: BackendRow) -> Result<Self, Self::Error> {
        Ok(Self {
            storage_id: row.storage_id,
            kind: row.kind.parse::<BackendKind>().or_raise(|| ErrorKind::InvalidData("backend kind"))?,
            location: row.location,
            priority: row.priority,
            notes: row.notes,
            device_label: row.device_label,
            created_at: UtcDateTime::from_unix_timestamp(row.created_at)
                .or_raise(|| ErrorKind::InvalidData("backend creation date"))?,
        })
    }
}
