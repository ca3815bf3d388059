//! CLI module for itemstore
//!
//! Admin commands (`validate`, `fingerprint`, `migrate`, `check`) work on the
//! table configuration and the database structure. Item commands go through
//! [`itemstore::ItemService`] after the startup drift check. Results are
//! printed to stdout as JSON; logs go to stderr.

pub mod admin;
pub mod config;
pub mod error;
pub mod items;

use anyhow::Context;
use error::HelpfulError;
use itemstore::{ItemDb, TablesConfig};
use serde::Serialize;
use std::path::PathBuf;

/// Options shared by every command.
#[derive(Debug, Clone)]
pub struct GlobalArgs {
    pub config_path: PathBuf,
    pub db_path: PathBuf,
    pub cursor_secret: Option<String>,
    pub skip_config_validation: bool,
}

impl GlobalArgs {
    /// Load and validate the table configuration.
    pub fn load_tables(&self) -> anyhow::Result<TablesConfig> {
        TablesConfig::load(&self.config_path)
            .map_err(|e| HelpfulError::config_unreadable(&self.config_path, e).into())
    }

    /// Open (creating if needed) the item database.
    pub async fn open_db(&self) -> anyhow::Result<ItemDb> {
        let db = ItemDb::open(&self.db_path)
            .await
            .map_err(|e| HelpfulError::database_unavailable(&self.db_path, e))?;
        Ok(match &self.cursor_secret {
            Some(secret) => db.with_cursor_secret(secret.as_bytes()),
            None => db,
        })
    }
}

/// Print a value as pretty JSON on stdout.
pub fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    let out = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
    println!("{}", out);
    Ok(())
}
