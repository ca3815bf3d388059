//! Configuration paths for itemstore
//!
//! All default paths are under ~/.itemstore/ (or `$ITEMSTORE_HOME`).

use std::path::PathBuf;

use itemstore_logging::itemstore_home;

/// Config file used when neither `--config` nor `ITEMSTORE_CONFIG` is set.
pub const DEFAULT_CONFIG_FILE: &str = "config.yaml";

/// Default database location: ~/.itemstore/items.sqlite
pub fn default_db_path() -> PathBuf {
    itemstore_home().join("items.sqlite")
}

/// An explicit path wins over the default.
pub fn resolve_db_path(explicit: Option<PathBuf>) -> PathBuf {
    explicit.unwrap_or_else(default_db_path)
}
