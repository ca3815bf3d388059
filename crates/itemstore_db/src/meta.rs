//! The `_meta` store: recorded key fields per table and the structural
//! fingerprint of the last reconciled configuration.

use crate::error::{DbError, Result};
use crate::ItemDb;
use itemstore_protocol::{tables_fingerprint, TableDefinition};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteConnection;
use sqlx::Row;
use tracing::debug;

/// Name of the metadata table.
pub const META_TABLE: &str = "_meta";

/// Reserved `_meta` row holding the fingerprint. Table names cannot start
/// with an underscore, so it never collides with a configured table.
pub const FINGERPRINT_ROW: &str = "_meta";

/// Key fields recorded when a table was first created.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableMeta {
    pub primary_key_field: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range_key_field: Option<String>,
}

impl TableMeta {
    pub fn for_table(table: &TableDefinition) -> Self {
        Self {
            primary_key_field: table.primary_key_field().to_string(),
            range_key_field: table.range_key_field().map(str::to_string),
        }
    }

    /// An empty recorded range key means the table has none.
    fn normalized(mut self) -> Self {
        if self.range_key_field.as_deref() == Some("") {
            self.range_key_field = None;
        }
        self
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FingerprintRecord {
    #[serde(default)]
    config_hash: String,
}

pub(crate) async fn ensure_meta_table(conn: &mut SqliteConnection) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS _meta (
            table_name TEXT NOT NULL PRIMARY KEY,
            config TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(&mut *conn)
    .await?;
    Ok(())
}

pub(crate) async fn meta_table_exists(conn: &mut SqliteConnection) -> Result<bool> {
    let count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?")
            .bind(META_TABLE)
            .fetch_one(&mut *conn)
            .await?;
    Ok(count > 0)
}

pub(crate) async fn read_table_meta(
    conn: &mut SqliteConnection,
    table: &str,
) -> Result<Option<TableMeta>> {
    let config: Option<String> =
        sqlx::query_scalar("SELECT config FROM _meta WHERE table_name = ?")
            .bind(table)
            .fetch_optional(&mut *conn)
            .await?;
    match config {
        Some(json) => {
            let meta: TableMeta = serde_json::from_str(&json).map_err(|e| {
                DbError::corrupt(format!("_meta entry for table {table:?}: {e}"))
            })?;
            Ok(Some(meta.normalized()))
        }
        None => Ok(None),
    }
}

pub(crate) async fn insert_table_meta(
    conn: &mut SqliteConnection,
    table: &str,
    meta: &TableMeta,
) -> Result<()> {
    let now = ItemDb::now_millis();
    sqlx::query(
        "INSERT INTO _meta (table_name, config, created_at, updated_at) VALUES (?, ?, ?, ?)",
    )
    .bind(table)
    .bind(serde_json::to_string(meta)?)
    .bind(now)
    .bind(now)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

pub(crate) async fn delete_table_meta(conn: &mut SqliteConnection, table: &str) -> Result<()> {
    sqlx::query("DELETE FROM _meta WHERE table_name = ?")
        .bind(table)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// Names of every table with a `_meta` entry, sorted.
pub(crate) async fn recorded_table_names(conn: &mut SqliteConnection) -> Result<Vec<String>> {
    let names: Vec<String> =
        sqlx::query_scalar("SELECT table_name FROM _meta WHERE table_name != ? ORDER BY table_name")
            .bind(FINGERPRINT_ROW)
            .fetch_all(&mut *conn)
            .await?;
    Ok(names)
}

pub(crate) async fn upsert_fingerprint(conn: &mut SqliteConnection, hash: &str) -> Result<()> {
    let record = FingerprintRecord {
        config_hash: hash.to_string(),
    };
    let now = ItemDb::now_millis();
    sqlx::query(
        r#"
        INSERT INTO _meta (table_name, config, created_at, updated_at)
        VALUES (?, ?, ?, ?)
        ON CONFLICT(table_name) DO UPDATE SET
            config = excluded.config,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(FINGERPRINT_ROW)
    .bind(serde_json::to_string(&record)?)
    .bind(now)
    .bind(now)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

impl ItemDb {
    // ========================================================================
    // Metadata Operations
    // ========================================================================

    /// Recorded key fields for `table`, if it has been reconciled.
    pub async fn table_meta(&self, table: &str) -> Result<Option<TableMeta>> {
        let mut conn = self.pool.acquire().await?;
        if !meta_table_exists(&mut conn).await? {
            return Ok(None);
        }
        read_table_meta(&mut conn, table).await
    }

    /// Every reconciled table with its recorded key fields.
    pub async fn recorded_tables(&self) -> Result<Vec<(String, TableMeta)>> {
        let mut conn = self.pool.acquire().await?;
        if !meta_table_exists(&mut conn).await? {
            return Ok(Vec::new());
        }
        let mut out = Vec::new();
        for name in recorded_table_names(&mut conn).await? {
            if let Some(meta) = read_table_meta(&mut conn, &name).await? {
                out.push((name, meta));
            }
        }
        Ok(out)
    }

    /// Fingerprint persisted by the last reconciliation.
    ///
    /// Fails with [`DbError::MetaMissing`] when nothing was ever reconciled;
    /// `Ok(None)` when the row is absent or empty.
    pub async fn stored_fingerprint(&self) -> Result<Option<String>> {
        let mut conn = self.pool.acquire().await?;
        if !meta_table_exists(&mut conn).await? {
            return Err(DbError::MetaMissing);
        }
        let row = sqlx::query("SELECT config FROM _meta WHERE table_name = ?")
            .bind(FINGERPRINT_ROW)
            .fetch_optional(&mut *conn)
            .await?;
        let Some(row) = row else {
            return Ok(None);
        };
        let config: String = row.get("config");
        let record: FingerprintRecord = serde_json::from_str(&config)
            .map_err(|e| DbError::corrupt(format!("config hash row: {e}")))?;
        if record.config_hash.is_empty() {
            Ok(None)
        } else {
            Ok(Some(record.config_hash))
        }
    }

    /// Compare the persisted fingerprint against `expected`.
    pub async fn check_fingerprint(&self, expected: &str) -> Result<()> {
        let stored = self
            .stored_fingerprint()
            .await?
            .ok_or(DbError::ConfigHashMissing)?;
        if stored != expected {
            return Err(DbError::ConfigHashMismatch {
                stored,
                expected: expected.to_string(),
            });
        }
        debug!(hash = %stored, "Config hash matches database");
        Ok(())
    }

    /// Fingerprint `tables` and compare against the persisted value.
    /// Returns the computed fingerprint.
    pub async fn check_tables_fingerprint(&self, tables: &[TableDefinition]) -> Result<String> {
        let expected = tables_fingerprint(tables)?;
        self.check_fingerprint(&expected).await?;
        Ok(expected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_meta_json_shape() {
        let table = TableDefinition::new("orders", "orderId", ".*").with_range_key("lineId", ".*");
        let meta = TableMeta::for_table(&table);
        assert_eq!(
            serde_json::to_string(&meta).unwrap(),
            r#"{"primaryKeyField":"orderId","rangeKeyField":"lineId"}"#
        );
    }

    #[test]
    fn test_empty_range_key_normalizes_to_none() {
        let meta: TableMeta =
            serde_json::from_str(r#"{"primaryKeyField":"id","rangeKeyField":""}"#).unwrap();
        assert_eq!(meta.normalized().range_key_field, None);
    }

    #[tokio::test]
    async fn test_fingerprint_errors_are_distinct() {
        let db = ItemDb::open_in_memory().await.unwrap();
        assert!(matches!(
            db.check_fingerprint("abc").await,
            Err(DbError::MetaMissing)
        ));

        let mut conn = db.pool().acquire().await.unwrap();
        ensure_meta_table(&mut conn).await.unwrap();
        drop(conn);
        assert!(matches!(
            db.check_fingerprint("abc").await,
            Err(DbError::ConfigHashMissing)
        ));

        let mut conn = db.pool().acquire().await.unwrap();
        upsert_fingerprint(&mut conn, "").await.unwrap();
        drop(conn);
        assert!(matches!(
            db.check_fingerprint("abc").await,
            Err(DbError::ConfigHashMissing)
        ));

        let mut conn = db.pool().acquire().await.unwrap();
        upsert_fingerprint(&mut conn, "def").await.unwrap();
        drop(conn);
        match db.check_fingerprint("abc").await {
            Err(DbError::ConfigHashMismatch { stored, expected }) => {
                assert_eq!(stored, "def");
                assert_eq!(expected, "abc");
            }
            other => panic!("expected mismatch, got {other:?}"),
        }
        db.check_fingerprint("def").await.unwrap();
    }
}
