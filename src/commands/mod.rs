pub mod backend;
pub mod copy;
pub mod report;
pub mod rescale;

use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use mediashift_catalog::Database;
use mediashift_config::Config;
use mediashift_transfer::Registry;
use std::path::Path;

/// Everything a command needs: configuration, catalog and registry.
pub struct Context {
    pub config: Config,
    pub db: Database,
    pub registry: Registry,
}

impl Context {
    pub async fn open(config_path: Option<&Path>, database: Option<&Path>) -> Result<Self> {
        let mut config = Config::load(config_path).or_raise(|| ErrorKind::Configuration)?;
        if let Some(database) = database {
            config.database = database.to_path_buf();
        }
        tracing::debug!(database = %config.database.display(), "opening catalog");
        let db = Database::connect(&config.database).await.or_raise(|| ErrorKind::Catalog)?;
        let credentials: Vec<_> = config
            .object_store
            .keys()
            .filter_map(|host| config.credentials(host).map(|credentials| (host.clone(), credentials)))
            .collect();
        let registry = Registry::new(&db).with_credentials(credentials);
        Ok(Self { config, db, registry })
    }

    pub async fn close(&self) {
        self.db.close().await;
    }
}
