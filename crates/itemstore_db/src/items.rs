//! Single-item reads and writes.

use crate::error::{DbError, Result};
use crate::sql::quote_ident;
use crate::types::StoredItem;
use crate::ItemDb;
use itemstore_protocol::{strip_keys, Document, TableDefinition};
use serde_json::Value;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use tracing::debug;

/// The addressed key must match the table's key shape.
pub(crate) fn check_key_shape(table: &TableDefinition, rk: Option<&str>) -> Result<()> {
    match (table.has_range_key(), rk) {
        (true, None) => Err(DbError::invalid_key(format!(
            "table {:?} requires a range key",
            table.name
        ))),
        (false, Some(_)) => Err(DbError::invalid_key(format!(
            "table {:?} has no range key",
            table.name
        ))),
        _ => Ok(()),
    }
}

pub(crate) fn parse_payload(raw: &str) -> Result<Document> {
    match serde_json::from_str::<Value>(raw)? {
        Value::Object(map) => Ok(map),
        other => Err(DbError::corrupt(format!(
            "stored payload is not an object: {other}"
        ))),
    }
}

pub(crate) fn row_to_item(row: &SqliteRow) -> Result<StoredItem> {
    let data: String = row.try_get("data")?;
    Ok(StoredItem {
        pk: row.try_get("pk")?,
        rk: row.try_get("rk")?,
        data: parse_payload(&data)?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

impl ItemDb {
    // ========================================================================
    // Item Operations
    // ========================================================================

    /// Fetch one item by its table key.
    pub async fn get_item(
        &self,
        table: &TableDefinition,
        pk: &str,
        rk: Option<&str>,
    ) -> Result<Option<StoredItem>> {
        check_key_shape(table, rk)?;
        let name = quote_ident(&table.name);

        let row = match rk {
            Some(rk) => {
                sqlx::query(&format!(
                    "SELECT pk, rk, data, created_at, updated_at FROM {name} WHERE pk = ? AND rk = ?"
                ))
                .bind(pk)
                .bind(rk)
                .fetch_optional(&self.pool)
                .await?
            }
            None => {
                sqlx::query(&format!(
                    "SELECT pk, rk, data, created_at, updated_at FROM {name} WHERE pk = ?"
                ))
                .bind(pk)
                .fetch_optional(&self.pool)
                .await?
            }
        };

        row.as_ref().map(row_to_item).transpose()
    }

    /// Insert or fully replace an item. Key fields are never persisted in
    /// the payload.
    pub async fn put_item(
        &self,
        table: &TableDefinition,
        pk: &str,
        rk: Option<&str>,
        data: &Document,
    ) -> Result<StoredItem> {
        check_key_shape(table, rk)?;
        let payload = strip_keys(data, table.primary_key_field(), table.range_key_field());
        let json = serde_json::to_string(&payload)?;
        let now = Self::now_millis();
        let name = quote_ident(&table.name);
        let conflict = if table.has_range_key() { "pk, rk" } else { "pk" };

        let row = sqlx::query(&format!(
            r#"
            INSERT INTO {name} (pk, rk, data, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT({conflict}) DO UPDATE SET
                data = excluded.data,
                updated_at = excluded.updated_at
            RETURNING created_at, updated_at
            "#
        ))
        .bind(pk)
        .bind(rk)
        .bind(&json)
        .bind(now)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        debug!(table = %table.name, pk, rk, "Item stored");

        Ok(StoredItem {
            pk: pk.to_string(),
            rk: rk.map(str::to_string),
            data: payload,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    /// Delete an item. Returns whether a row was removed.
    pub async fn delete_item(
        &self,
        table: &TableDefinition,
        pk: &str,
        rk: Option<&str>,
    ) -> Result<bool> {
        check_key_shape(table, rk)?;
        let name = quote_ident(&table.name);

        let result = match rk {
            Some(rk) => {
                sqlx::query(&format!("DELETE FROM {name} WHERE pk = ? AND rk = ?"))
                    .bind(pk)
                    .bind(rk)
                    .execute(&self.pool)
                    .await?
            }
            None => {
                sqlx::query(&format!("DELETE FROM {name} WHERE pk = ?"))
                    .bind(pk)
                    .execute(&self.pool)
                    .await?
            }
        };

        let removed = result.rows_affected() > 0;
        debug!(table = %table.name, pk, rk, removed, "Item delete");
        Ok(removed)
    }
}
