//! Marker files binding a local archive disk to its catalog record.
//!
//! A provisioned mount carries three artefacts:
//! - [`MARKER_FILE_NAME`]: JSON [`Marker`], the source of truth for which
//!   backend this disk is.
//! - [`README_FILE_NAME`]: a note for whoever finds the disk in a drawer.
//! - the archive subdirectory ([`DEFAULT_ARCHIVE_DIR`]) holding the objects.

use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

pub const MARKER_FILE_NAME: &str = ".mediashift-storage.json";
pub const README_FILE_NAME: &str = "README.txt";
pub const DEFAULT_ARCHIVE_DIR: &str = "archive";

/// Fields that must agree between the marker file and the catalog record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkerIdentity {
    pub storage_id: i64,
    /// Unix timestamp assigned by the catalog when the record was created.
    pub created_at: i64,
    pub device_label: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Marker {
    #[serde(flatten)]
    pub identity: MarkerIdentity,
    /// Name of the archive subdirectory below the mount.
    pub archive_dir: String,
}
impl Marker {
    pub fn new(identity: MarkerIdentity) -> Self {
        Self { identity, archive_dir: DEFAULT_ARCHIVE_DIR.to_string() }
    }

    pub fn path(mount: &Path) -> PathBuf {
        mount.join(MARKER_FILE_NAME)
    }

    /// Read and parse the marker file at the root of `mount`.
    pub fn read(mount: &Path) -> Result<Self> {
        let path = Self::path(mount);
        let contents = fs::read(&path).or_raise(|| ErrorKind::InvalidMarker(path.clone()))?;
        let marker: Self = serde_json::from_slice(&contents).or_raise(|| ErrorKind::InvalidMarker(path.clone()))?;
        // The archive directory name is joined onto the mount; it must be a
        // single plain component.
        if crate::path::validate(&marker.archive_dir).ok().as_deref() != Some(marker.archive_dir.as_str())
            || marker.archive_dir.contains('/')
        {
            exn::bail!(ErrorKind::InvalidMarker(path));
        }
        Ok(marker)
    }

    /// Compare against the identity recorded in the catalog.
    ///
    /// Returns [`MarkerMismatch`](ErrorKind::MarkerMismatch) naming every
    /// field that disagrees.
    pub fn check(&self, expected: &MarkerIdentity) -> Result<()> {
        let mut mismatched = Vec::new();
        if self.identity.storage_id != expected.storage_id {
            mismatched.push(format!("storage_id ({} != {})", self.identity.storage_id, expected.storage_id));
        }
        if self.identity.created_at != expected.created_at {
            mismatched.push(format!("created_at ({} != {})", self.identity.created_at, expected.created_at));
        }
        if self.identity.device_label != expected.device_label {
            mismatched.push(format!("device_label ({:?} != {:?})", self.identity.device_label, expected.device_label));
        }
        match mismatched.is_empty() {
            true => Ok(()),
            false => exn::bail!(ErrorKind::MarkerMismatch(mismatched.join(", "))),
        }
    }

    fn readme(&self) -> String {
        format!(
            "This disk is mediashift storage backend #{id} ({label}).\n\
             \n\
             Media objects live in the `{dir}/` directory. Their placement is tracked\n\
             in the mediashift catalog; do not rename, move or delete files by hand.\n\
             The file `{marker}` binds this disk to its catalog record.\n",
            id = self.identity.storage_id,
            label = self.identity.device_label,
            dir = self.archive_dir,
            marker = MARKER_FILE_NAME,
        )
    }
}

/// Fails with [`AlreadyProvisioned`](ErrorKind::AlreadyProvisioned) if any
/// backend artefact already exists below `mount`.
pub fn ensure_unprovisioned(mount: &Path) -> Result<()> {
    if !mount.is_dir() {
        exn::bail!(ErrorKind::NoLocalPath(mount.to_path_buf()));
    }
    for artefact in [MARKER_FILE_NAME, README_FILE_NAME, DEFAULT_ARCHIVE_DIR] {
        let path = mount.join(artefact);
        // symlink_metadata so that a dangling link still counts as present.
        if fs::symlink_metadata(&path).is_ok() {
            exn::bail!(ErrorKind::AlreadyProvisioned(path));
        }
    }
    Ok(())
}

/// Write the marker, README and archive directory below `mount`.
///
/// Either every artefact is created or, on failure, the ones this call
/// created are removed again before the error is returned.
pub fn provision(mount: &Path, marker: &Marker) -> Result<()> {
    ensure_unprovisioned(mount)?;
    let result = write_artefacts(mount, marker);
    if result.is_err() {
        remove_artefacts(mount, marker);
    }
    result
}

/// Best-effort removal of provisioning artefacts. Only empty archive
/// directories are removed.
pub fn remove_artefacts(mount: &Path, marker: &Marker) {
    _ = fs::remove_file(mount.join(MARKER_FILE_NAME));
    _ = fs::remove_file(mount.join(README_FILE_NAME));
    _ = fs::remove_dir(mount.join(&marker.archive_dir));
}

fn write_artefacts(mount: &Path, marker: &Marker) -> Result<()> {
    let map_io = |path: PathBuf| {
        move |e: std::io::Error| match e.kind() {
            std::io::ErrorKind::AlreadyExists => ErrorKind::AlreadyProvisioned(path),
            std::io::ErrorKind::PermissionDenied => ErrorKind::BackendNotWritable(path),
            _ => ErrorKind::Io(e),
        }
    };
    let json = serde_json::to_vec_pretty(marker).or_raise(|| ErrorKind::InvalidMarker(Marker::path(mount)))?;
    write_new(&Marker::path(mount), &json).map_err(map_io(Marker::path(mount)))?;
    let readme = mount.join(README_FILE_NAME);
    write_new(&readme, marker.readme().as_bytes()).map_err(map_io(readme.clone()))?;
    let archive = mount.join(&marker.archive_dir);
    fs::create_dir(&archive).map_err(map_io(archive.clone()))?;
    Ok(())
}

fn write_new(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let mut file = fs::OpenOptions::new().write(true).create_new(true).open(path)?;
    file.write_all(contents)?;
    file.sync_all()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity() -> MarkerIdentity {
        MarkerIdentity { storage_id: 7, created_at: 1_700_000_000, device_label: "ARCHIVE-07".to_string() }
    }

    #[test]
    fn test_provision_then_read() {
        let temp_dir = tempfile::tempdir().unwrap();
        let marker = Marker::new(identity());
        provision(temp_dir.path(), &marker).unwrap();
        assert!(temp_dir.path().join(README_FILE_NAME).is_file());
        assert!(temp_dir.path().join(DEFAULT_ARCHIVE_DIR).is_dir());
        assert_eq!(Marker::read(temp_dir.path()).unwrap(), marker);
    }

    #[test]
    fn test_marker_file_format() {
        let temp_dir = tempfile::tempdir().unwrap();
        provision(temp_dir.path(), &Marker::new(identity())).unwrap();
        let json: serde_json::Value =
            serde_json::from_slice(&fs::read(Marker::path(temp_dir.path())).unwrap()).unwrap();
        assert_eq!(json["storage_id"], 7);
        assert_eq!(json["created_at"], 1_700_000_000);
        assert_eq!(json["device_label"], "ARCHIVE-07");
        assert_eq!(json["archive_dir"], "archive");
    }

    #[test]
    fn test_provision_refuses_existing_artefacts() {
        for artefact in [MARKER_FILE_NAME, README_FILE_NAME] {
            let temp_dir = tempfile::tempdir().unwrap();
            fs::write(temp_dir.path().join(artefact), b"already here").unwrap();
            let err = provision(temp_dir.path(), &Marker::new(identity())).unwrap_err();
            assert!(matches!(&*err, ErrorKind::AlreadyProvisioned(_)));
            // Nothing else was created.
            assert!(!temp_dir.path().join(DEFAULT_ARCHIVE_DIR).exists());
        }
        let temp_dir = tempfile::tempdir().unwrap();
        fs::create_dir(temp_dir.path().join(DEFAULT_ARCHIVE_DIR)).unwrap();
        let err = provision(temp_dir.path(), &Marker::new(identity())).unwrap_err();
        assert!(matches!(&*err, ErrorKind::AlreadyProvisioned(_)));
        assert!(!Marker::path(temp_dir.path()).exists());
    }

    #[test]
    fn test_provision_missing_mount() {
        let temp_dir = tempfile::tempdir().unwrap();
        let err = provision(&temp_dir.path().join("not-mounted"), &Marker::new(identity())).unwrap_err();
        assert!(matches!(&*err, ErrorKind::NoLocalPath(_)));
    }

    #[test]
    fn test_check_reports_every_mismatch() {
        let marker = Marker::new(identity());
        assert!(marker.check(&identity()).is_ok());
        let expected = MarkerIdentity { storage_id: 8, created_at: 1, device_label: "ARCHIVE-07".to_string() };
        let err = marker.check(&expected).unwrap_err();
        match &*err {
            ErrorKind::MarkerMismatch(fields) => {
                assert!(fields.contains("storage_id"));
                assert!(fields.contains("created_at"));
                assert!(!fields.contains("device_label"));
            },
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_read_rejects_escaping_archive_dir() {
        let temp_dir = tempfile::tempdir().unwrap();
        let mut marker = Marker::new(identity());
        marker.archive_dir = "../elsewhere".to_string();
        fs::write(Marker::path(temp_dir.path()), serde_json::to_vec(&marker).unwrap()).unwrap();
        let err = Marker::read(temp_dir.path()).unwrap_err();
        assert!(matches!(&*err, ErrorKind::InvalidMarker(_)));
    }

    #[test]
    fn test_read_garbage() {
        let temp_dir = tempfile::tempdir().unwrap();
        fs::write(Marker::path(temp_dir.path()), b"not json").unwrap();
        let err = Marker::read(temp_dir.path()).unwrap_err();
        assert!(matches!(&*err, ErrorKind::InvalidMarker(_)));
    }
}
