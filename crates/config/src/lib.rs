//! Layered configuration.
//!
//! Values are merged in order, later layers winning:
//! 1. built-in defaults,
//! 2. the configuration file (TOML, YAML or JSON by extension): either the
//!    path given on the command line, or `config.toml` in the platform
//!    config directory if it exists,
//! 3. `MEDIASHIFT_*` environment variables, nested with `__`
//!    (`MEDIASHIFT_TRANSFER__COMMIT_THRESHOLD=500`).
//!
//! Object store credentials are keyed by host, as it appears in a backend's
//! location URL:
//!
//! ```toml
//! [object_store."s3.example.org"]
//! region = "eu-central-1"
//! key_id = "AKIA..."
//! key_secret = "..."
//! ```

pub mod error;

use crate::error::{ErrorKind, Result};
use directories::ProjectDirs;
use exn::ResultExt;
use figment::Figment;
use figment::providers::{Env, Format, Json, Serialized, Toml, Yaml};
use mediashift_storage::ObjectStoreCredentials;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

const ENV_PREFIX: &str = "MEDIASHIFT_";
const CONFIG_FILE_NAME: &str = "config.toml";
const DATABASE_FILE_NAME: &str = "catalog.sqlite";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Path to the SQLite catalog.
    pub database: PathBuf,
    pub transfer: TransferConfig,
    pub rescale: RescaleConfig,
    /// Credentials per object store host.
    pub object_store: BTreeMap<String, ObjectStoreConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferConfig {
    /// Flush placements to the catalog after this many objects...
    pub commit_threshold: usize,
    /// ...or after this many seconds, whichever comes first.
    pub commit_interval_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RescaleConfig {
    pub workers: usize,
    pub max_width: u32,
    pub max_height: u32,
    /// JPEG quality, 1-100.
    pub quality: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectStoreConfig {
    pub region: String,
    /// Overrides the endpoint derived from the backend location.
    #[serde(default)]
    pub endpoint: Option<String>,
    pub key_id: String,
    pub key_secret: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: project_dirs()
                .map(|dirs| dirs.data_dir().join(DATABASE_FILE_NAME))
                .unwrap_or_else(|| PathBuf::from(DATABASE_FILE_NAME)),
            transfer: TransferConfig::default(),
            rescale: RescaleConfig::default(),
            object_store: BTreeMap::new(),
        }
    }
}
impl Default for TransferConfig {
    fn default() -> Self {
        Self { commit_threshold: 1000, commit_interval_secs: 900 }
    }
}
impl Default for RescaleConfig {
    fn default() -> Self {
        Self { workers: 10, max_width: 1920, max_height: 1920, quality: 85 }
    }
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("org", "mediashift", "mediashift")
}

/// `config.toml` in the platform config directory.
pub fn default_config_path() -> Option<PathBuf> {
    project_dirs().map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
}

impl Config {
    /// Build the layered [`Figment`] without extracting it.
    ///
    /// An explicit `path` must exist; the default path is used only if it
    /// does.
    pub fn figment(path: Option<&Path>) -> Result<Figment> {
        let mut figment = Figment::from(Serialized::defaults(Config::default()));
        let file = match path {
            Some(path) if !path.is_file() => exn::bail!(ErrorKind::NotFound(path.to_path_buf())),
            Some(path) => Some(path.to_path_buf()),
            None => default_config_path().filter(|path| path.is_file()),
        };
        if let Some(file) = file {
            tracing::debug!(path = %file.display(), "loading configuration file");
            let extension = file.extension().and_then(|e| e.to_str()).map(str::to_ascii_lowercase);
            figment = match extension.as_deref() {
                Some("toml") => figment.merge(Toml::file_exact(&file)),
                Some("yaml" | "yml") => figment.merge(Yaml::file_exact(&file)),
                Some("json") => figment.merge(Json::file_exact(&file)),
                _ => exn::bail!(ErrorKind::UnsupportedFormat(file)),
            };
        }
        Ok(figment.merge(Env::prefixed(ENV_PREFIX).split("__")))
    }

    /// Load and validate the configuration.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::from_figment(Self::figment(path)?)
    }

    pub fn from_figment(figment: Figment) -> Result<Self> {
        let config: Self = figment.extract().or_raise(|| ErrorKind::Load)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.transfer.commit_threshold == 0 {
            exn::bail!(ErrorKind::Invalid("transfer.commit_threshold", "must be at least 1".to_string()));
        }
        if self.rescale.workers == 0 {
            exn::bail!(ErrorKind::Invalid("rescale.workers", "must be at least 1".to_string()));
        }
        if self.rescale.max_width == 0 || self.rescale.max_height == 0 {
            exn::bail!(ErrorKind::Invalid("rescale.max_width/max_height", "must be at least 1".to_string()));
        }
        if !(1..=100).contains(&self.rescale.quality) {
            exn::bail!(ErrorKind::Invalid("rescale.quality", format!("{} is not within 1-100", self.rescale.quality)));
        }
        Ok(())
    }

    /// Credentials for an object store host, if configured.
    pub fn credentials(&self, host: &str) -> Option<ObjectStoreCredentials> {
        self.object_store.get(host).map(|store| ObjectStoreCredentials {
            region: store.region.clone(),
            endpoint: store.endpoint.clone(),
            key_id: store.key_id.clone(),
            key_secret: store.key_secret.clone(),
        })
    }
}
