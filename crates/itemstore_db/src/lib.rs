//! Physical storage for itemstore.
//!
//! Each configured table becomes one SQLite table whose document payload lives
//! in a JSON `data` column. This crate owns every SQL statement: structural
//! reconciliation, fingerprint persistence, item reads/writes and the cursor
//! pagination shared by all multi-item reads.
//!
//! # Usage
//!
//! ```rust,ignore
//! use itemstore_db::{ItemDb, ListOptions, ReconcileOptions};
//!
//! let db = ItemDb::open("~/.itemstore/items.sqlite").await?;
//! db.reconcile(&tables, ReconcileOptions::default()).await?;
//!
//! let page = db.list_partition(&tables[0], "order1", &ListOptions::default()).await?;
//! ```

mod cursor;
mod error;
mod items;
mod meta;
mod query;
mod reconcile;
mod sql;
mod types;

pub use cursor::{CursorCodec, CursorPosition};
pub use error::{DbError, KeyKind, Result};
pub use meta::{TableMeta, FINGERPRINT_ROW, META_TABLE};
pub use types::*;

pub use itemstore_protocol::physical_index_name;

use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

/// Handle to the item database.
///
/// Cheap to clone; all clones share one connection pool.
#[derive(Clone)]
pub struct ItemDb {
    pool: SqlitePool,
    cursors: CursorCodec,
}

impl ItemDb {
    /// Open or create a database at the given path.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        info!(path = %path.display(), "Item database opened");

        Ok(Self::from_pool(pool))
    }

    /// Open a private in-memory database.
    ///
    /// Pinned to a single connection: every pooled connection to `:memory:`
    /// would otherwise see its own empty database.
    pub async fn open_in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None::<Duration>)
            .max_lifetime(None::<Duration>)
            .connect_with(options)
            .await?;
        Ok(Self::from_pool(pool))
    }

    /// Wrap an existing pool.
    pub fn from_pool(pool: SqlitePool) -> Self {
        Self {
            pool,
            cursors: CursorCodec::default(),
        }
    }

    /// Use `secret` to key pagination cursor tags.
    pub fn with_cursor_secret(mut self, secret: &[u8]) -> Self {
        self.cursors = CursorCodec::new(secret);
        self
    }

    /// Get the underlying connection pool (escape hatch for complex queries).
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub(crate) fn cursors(&self) -> &CursorCodec {
        &self.cursors
    }

    /// Close the database connection.
    pub async fn close(self) {
        self.pool.close().await;
    }

    /// Current time as milliseconds since Unix epoch.
    pub fn now_millis() -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}
