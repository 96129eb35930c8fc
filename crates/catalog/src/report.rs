//! Read-only inventories over the placement catalog.

use crate::error::{ErrorKind, Result};
use crate::models::MediaType;
use crate::{BackendRecord, Database};
use exn::ResultExt;
use std::fmt;
use tracing::instrument;

/// Placements of one deployment on a backend.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct DeploymentSummary {
    pub deployment_id: i64,
    pub deployment_name: String,
    pub node_name: String,
    pub originals: i64,
    /// Scaled or repacked placements.
    pub derived: i64,
    /// Catalog byte size of the originals.
    pub bytes: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaSection {
    pub media_type: MediaType,
    pub deployments: Vec<DeploymentSummary>,
}
impl MediaSection {
    pub fn total_originals(&self) -> i64 {
        self.deployments.iter().map(|d| d.originals).sum()
    }

    pub fn total_derived(&self) -> i64 {
        self.deployments.iter().map(|d| d.derived).sum()
    }

    pub fn total_bytes(&self) -> i64 {
        self.deployments.iter().map(|d| d.bytes).sum()
    }
}

/// Inventory of one backend, grouped by media type and deployment.
///
/// Renders as a fixed-width text table via [`Display`](fmt::Display).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveReport {
    pub backend: BackendRecord,
    pub sections: Vec<MediaSection>,
}

#[instrument(skip(db, backend), fields(storage_id = backend.storage_id))]
pub async fn archive_report(db: &Database, backend: BackendRecord) -> Result<ArchiveReport> {
    let mut sections = Vec::with_capacity(MediaType::ALL.len());
    for media_type in MediaType::ALL {
        let query = match media_type {
            MediaType::Image => include_str!("../queries/report_image.sql"),
            MediaType::Audio => include_str!("../queries/report_audio.sql"),
        };
        let deployments: Vec<DeploymentSummary> = sqlx::query_as(query)
            .bind(backend.storage_id)
            .fetch_all(db.pool())
            .await
            .or_raise(|| ErrorKind::Database)?;
        sections.push(MediaSection { media_type, deployments });
    }
    Ok(ArchiveReport { backend, sections })
}

/// Human-readable byte size (binary units).
pub fn format_bytes(bytes: i64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value.abs() >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    match unit {
        0 => format!("{bytes} B"),
        _ => format!("{value:.1} {}", UNITS[unit]),
    }
}

impl fmt::Display for ArchiveReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Backend #{} ({}) {}",
            self.backend.storage_id, self.backend.kind, self.backend.location
        )?;
        if !self.backend.notes.is_empty() {
            writeln!(f, "Notes: {}", self.backend.notes)?;
        }
        for section in &self.sections {
            writeln!(f)?;
            writeln!(f, "[{}]", section.media_type)?;
            writeln!(f, "{:<24} {:<32} {:>10} {:>8} {:>12}", "NODE", "DEPLOYMENT", "ORIGINALS", "DERIVED", "SIZE")?;
            for d in &section.deployments {
                writeln!(
                    f,
                    "{:<24} {:<32} {:>10} {:>8} {:>12}",
                    truncate(&d.node_name, 24),
                    truncate(&format!("{} (#{})", d.deployment_name, d.deployment_id), 32),
                    d.originals,
                    d.derived,
                    format_bytes(d.bytes)
                )?;
            }
            writeln!(
                f,
                "{:<24} {:<32} {:>10} {:>8} {:>12}",
                "TOTAL",
                "",
                section.total_originals(),
                section.total_derived(),
                format_bytes(section.total_bytes())
            )?;
        }
        Ok(())
    }
}

/// Shorten `value` to `width` characters, marking the cut with an ellipsis.
pub fn truncate(value: &str, width: usize) -> String {
    match value.chars().count() > width {
        true => value.chars().take(width.saturating_sub(1)).chain(['…']).collect(),
        false => value.to_string(),
    }
}
