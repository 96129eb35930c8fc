use crate::error::{Error, ErrorKind};
use crate::models::Representation;
use exn::ResultExt;
use time::UtcDateTime;

/// An object selected for transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub file_id: i64,
    /// Object name of the original representation (same on every backend).
    pub object_name: String,
    pub byte_size: u64,
}

#[derive(sqlx::FromRow)]
pub(crate) struct CandidateRow {
    file_id: i64,
    object_name: String,
    byte_size: i64,
}
impl TryFrom<CandidateRow> for Candidate {
    type Error = Error;
    fn try_from(row: CandidateRow) -> Result<Self, Self::Error> {
        Ok(Self {
            file_id: row.file_id,
            object_name: row.object_name,
            byte_size: u64::try_from(row.byte_size).or_raise(|| ErrorKind::InvalidData("byte size"))?,
        })
    }
}

/// One placement row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placement {
    pub file_id: i64,
    pub storage_id: i64,
    pub representation: Representation,
    pub updated_at: UtcDateTime,
}

#[derive(sqlx::FromRow)]
pub(crate) struct PlacementRow {
    file_id: i64,
    storage_id: i64,
    representation_type: i64,
    updated_at: i64,
}
impl TryFrom<PlacementRow> for Placement {
    type Error = Error;
    fn try_from(row: PlacementRow) -> Result<Self, Self::Error> {
        Ok(Self {
            file_id: row.file_id,
            storage_id: row.storage_id,
            representation: Representation::try_from(row.representation_type)?,
            updated_at: UtcDateTime::from_unix_timestamp(row.updated_at)
                .or_raise(|| ErrorKind::InvalidData("placement update date"))?,
        })
    }
}
