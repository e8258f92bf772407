pub mod check;
pub mod reset;
pub mod run;

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;

use epigraph_core::config::Config;
use epigraph_state::{SqliteStorage, Storage};

/// Load config, then initialize logging from the CLI override or the
/// configured level.
pub(crate) fn load_config(path: &Path, log_level: Option<&str>) -> Result<Config> {
    let config = Config::load(path)?;
    crate::logging::init(log_level.unwrap_or(&config.app.log_level));
    Ok(config)
}

/// Open the embedded database configured under `storage.db_dir`.
pub(crate) fn open_storage(config: &Config) -> Result<Arc<dyn Storage>> {
    let path = Path::new(&config.storage.db_dir).join("epigraph.db");
    Ok(Arc::new(SqliteStorage::open(&path)?))
}
