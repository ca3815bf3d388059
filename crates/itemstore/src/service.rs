//! Request-facing item operations.
//!
//! [`ItemService`] validates addressed keys and bodies against the
//! [`TableRegistry`], runs the write path (key separation, merge patch,
//! document validation) and shapes every read (key injection, index
//! projection, field selection). Storage is delegated to [`ItemDb`].

use crate::registry::{TableHandle, TableRegistry};
use itemstore_db::{DbError, ItemDb, ListOptions, Page, StoredItem};
use itemstore_protocol::{
    apply_index_projection, index_key_fields, inject_keys, merge_patch, project_fields,
    strip_keys, validate_json_keys, validate_key_pattern, validate_key_value, Document,
    IndexDefinition, KeyError, TableDefinition, ValidationError,
};
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

pub type Result<T> = std::result::Result<T, ServiceError>;

/// Per-request failures.
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("unknown table {0:?}")]
    UnknownTable(String),

    #[error("unknown index {index:?} on table {table:?}")]
    UnknownIndex { table: String, index: String },

    #[error("item not found")]
    NotFound,

    #[error("invalid key: {0}")]
    InvalidKey(#[from] KeyError),

    /// The address does not fit the table's key shape (missing or extra
    /// range key).
    #[error("invalid key: {0}")]
    KeyShape(String),

    /// A body key field disagrees with the addressed key.
    #[error("{field} in body does not match the addressed key {expected:?}")]
    KeyMismatch { field: String, expected: String },

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("operation not permitted: {0}")]
    NotPermitted(String),

    #[error(transparent)]
    Db(DbError),
}

impl From<DbError> for ServiceError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotPermitted(msg) => ServiceError::NotPermitted(msg),
            DbError::InvalidKey(msg) => ServiceError::KeyShape(msg),
            other => ServiceError::Db(other),
        }
    }
}

impl ServiceError {
    /// Whether the caller sent something that can never succeed as-is.
    pub fn is_client_error(&self) -> bool {
        !matches!(self, ServiceError::Db(_))
    }
}

/// The item API over a reconciled database.
#[derive(Clone)]
pub struct ItemService {
    db: ItemDb,
    registry: Arc<TableRegistry>,
}

impl ItemService {
    pub fn new(db: ItemDb, registry: Arc<TableRegistry>) -> Self {
        Self { db, registry }
    }

    pub fn registry(&self) -> &TableRegistry {
        &self.registry
    }

    pub fn db(&self) -> &ItemDb {
        &self.db
    }

    /// Refuse to serve unless storage was reconciled for this configuration.
    pub async fn check_startup(&self, skip_validation: bool) -> std::result::Result<(), DbError> {
        if skip_validation {
            warn!("Skipping config hash validation");
            return Ok(());
        }
        let hash = self
            .db
            .check_tables_fingerprint(&self.registry.definitions())
            .await?;
        info!(hash = %hash, "Config hash validated");
        Ok(())
    }

    fn table(&self, name: &str) -> Result<&TableHandle> {
        self.registry
            .table(name)
            .ok_or_else(|| ServiceError::UnknownTable(name.to_string()))
    }

    fn index<'a>(&self, table: &'a TableHandle, name: &str) -> Result<&'a IndexDefinition> {
        table.index(name).ok_or_else(|| ServiceError::UnknownIndex {
            table: table.name().to_string(),
            index: name.to_string(),
        })
    }

    // ========================================================================
    // Single Items
    // ========================================================================

    pub async fn get(
        &self,
        table: &str,
        pk: &str,
        rk: Option<&str>,
        fields: &[String],
    ) -> Result<Document> {
        let handle = self.table(table)?;
        check_table_keys(handle, pk, rk)?;

        let item = self
            .db
            .get_item(handle.definition(), pk, rk)
            .await?
            .ok_or(ServiceError::NotFound)?;
        let doc = with_keys(handle.definition(), item);
        Ok(project_fields(doc, fields, &handle.definition().key_fields()))
    }

    /// Replace the item at the addressed key with `body`.
    pub async fn put(
        &self,
        table: &str,
        pk: &str,
        rk: Option<&str>,
        body: Document,
    ) -> Result<Document> {
        let handle = self.table(table)?;
        check_table_keys(handle, pk, rk)?;
        validate_json_keys(&Value::Object(body.clone()))?;
        check_body_keys(handle.definition(), &body, pk, rk)?;

        let doc = inject_table_keys(handle.definition(), body, pk, rk);
        handle.validator().validate(&doc)?;

        let stored = self.db.put_item(handle.definition(), pk, rk, &doc).await?;
        debug!(table, pk, "Item put");
        Ok(with_keys(handle.definition(), stored))
    }

    /// Apply an RFC 7396 merge patch to an existing item.
    pub async fn patch(
        &self,
        table: &str,
        pk: &str,
        rk: Option<&str>,
        patch: Document,
    ) -> Result<Document> {
        let handle = self.table(table)?;
        check_table_keys(handle, pk, rk)?;
        validate_json_keys(&Value::Object(patch.clone()))?;
        check_body_keys(handle.definition(), &patch, pk, rk)?;

        let existing = self
            .db
            .get_item(handle.definition(), pk, rk)
            .await?
            .ok_or(ServiceError::NotFound)?;

        let mut merged = existing.data;
        merge_patch(&mut merged, &patch);
        let doc = inject_table_keys(handle.definition(), merged, pk, rk);
        handle.validator().validate(&doc)?;

        let stored = self.db.put_item(handle.definition(), pk, rk, &doc).await?;
        debug!(table, pk, "Item patched");
        Ok(with_keys(handle.definition(), stored))
    }

    /// Delete the addressed item. Deleting a missing item is not an error;
    /// the return value says whether anything was removed.
    pub async fn delete(&self, table: &str, pk: &str, rk: Option<&str>) -> Result<bool> {
        let handle = self.table(table)?;
        check_table_keys(handle, pk, rk)?;
        Ok(self.db.delete_item(handle.definition(), pk, rk).await?)
    }

    // ========================================================================
    // Multi-item Reads
    // ========================================================================

    pub async fn list_by_partition(
        &self,
        table: &str,
        pk: &str,
        opts: &ListOptions,
        fields: &[String],
    ) -> Result<Page<Document>> {
        let handle = self.table(table)?;
        validate_key_value(pk)?;
        validate_key_pattern(pk, handle.pk_pattern())?;

        let page = self.db.list_partition(handle.definition(), pk, opts).await?;
        Ok(shape_table_page(handle.definition(), page, fields))
    }

    pub async fn scan_table(
        &self,
        table: &str,
        opts: &ListOptions,
        fields: &[String],
    ) -> Result<Page<Document>> {
        let handle = self.table(table)?;
        let page = self.db.scan_table(handle.definition(), opts).await?;
        Ok(shape_table_page(handle.definition(), page, fields))
    }

    pub async fn query_index(
        &self,
        table: &str,
        index: &str,
        index_pk: &str,
        opts: &ListOptions,
        fields: &[String],
    ) -> Result<Page<Document>> {
        let handle = self.table(table)?;
        let index = self.index(handle, index)?;
        validate_key_value(index_pk)?;

        let page = self
            .db
            .query_index(handle.definition(), index, index_pk, opts)
            .await?;
        Ok(shape_index_page(handle.definition(), index, page, fields))
    }

    pub async fn scan_index(
        &self,
        table: &str,
        index: &str,
        opts: &ListOptions,
        fields: &[String],
    ) -> Result<Page<Document>> {
        let handle = self.table(table)?;
        let index = self.index(handle, index)?;

        let page = self.db.scan_index(handle.definition(), index, opts).await?;
        Ok(shape_index_page(handle.definition(), index, page, fields))
    }

    pub async fn get_by_index(
        &self,
        table: &str,
        index: &str,
        index_pk: &str,
        index_rk: &str,
        fields: &[String],
    ) -> Result<Document> {
        let handle = self.table(table)?;
        let index = self.index(handle, index)?;
        validate_key_value(index_pk)?;
        validate_key_value(index_rk)?;

        let item = self
            .db
            .get_item_by_index(handle.definition(), index, index_pk, index_rk)
            .await?
            .ok_or(ServiceError::NotFound)?;
        Ok(shape_index_item(handle.definition(), index, item, fields))
    }
}

/// Key value rules plus the table's configured patterns.
fn check_table_keys(handle: &TableHandle, pk: &str, rk: Option<&str>) -> Result<()> {
    validate_key_value(pk)?;
    validate_key_pattern(pk, handle.pk_pattern())?;
    match (handle.rk_pattern(), rk) {
        (Some(pattern), Some(rk)) => {
            validate_key_value(rk)?;
            validate_key_pattern(rk, pattern)?;
        }
        (Some(_), None) => {
            return Err(ServiceError::KeyShape(format!(
                "table {:?} requires a range key",
                handle.name()
            )))
        }
        (None, Some(_)) => {
            return Err(ServiceError::KeyShape(format!(
                "table {:?} has no range key",
                handle.name()
            )))
        }
        (None, None) => {}
    }
    Ok(())
}

/// Key fields present in a body must be strings equal to the address.
fn check_body_keys(
    table: &TableDefinition,
    body: &Document,
    pk: &str,
    rk: Option<&str>,
) -> Result<()> {
    let mut expected = vec![(table.primary_key_field(), pk)];
    if let (Some(field), Some(rk)) = (table.range_key_field(), rk) {
        expected.push((field, rk));
    }
    for (field, value) in expected {
        match body.get(field) {
            None => {}
            Some(Value::String(s)) if s == value => {}
            Some(_) => {
                return Err(ServiceError::KeyMismatch {
                    field: field.to_string(),
                    expected: value.to_string(),
                })
            }
        }
    }
    Ok(())
}

fn inject_table_keys(table: &TableDefinition, doc: Document, pk: &str, rk: Option<&str>) -> Document {
    let range = table.range_key_field().zip(rk);
    inject_keys(doc, table.primary_key_field(), pk, range)
}

fn with_keys(table: &TableDefinition, item: StoredItem) -> Document {
    let StoredItem { pk, rk, data, .. } = item;
    let data = strip_keys(&data, table.primary_key_field(), table.range_key_field());
    inject_table_keys(table, data, &pk, rk.as_deref())
}

fn shape_table_page(
    table: &TableDefinition,
    page: Page<StoredItem>,
    fields: &[String],
) -> Page<Document> {
    let keys = table.key_fields();
    page.map(|item| project_fields(with_keys(table, item), fields, &keys))
}

fn shape_index_item(
    table: &TableDefinition,
    index: &IndexDefinition,
    item: StoredItem,
    fields: &[String],
) -> Document {
    let doc = apply_index_projection(with_keys(table, item), table, index);
    project_fields(doc, fields, &index_key_fields(table, index))
}

fn shape_index_page(
    table: &TableDefinition,
    index: &IndexDefinition,
    page: Page<StoredItem>,
    fields: &[String],
) -> Page<Document> {
    page.map(|item| shape_index_item(table, index, item, fields))
}
