//! Paginated reads: partition list, table scan, index query, index scan and
//! the single-item index lookup.
//!
//! Every multi-item read goes through [`PageQuery`], which fetches `limit + 1`
//! rows strictly after the cursor position and orders by a total sort tuple:
//! `(pk[, rk])` for table reads, `(ipk[, irk], pk[, rk])` for index reads.
//!
//! Cursors are scoped to the read that issued them: the table or index, plus
//! the partition value for partition lists and index queries. A cursor from
//! another scope is ignored and the read starts from the beginning.

use crate::cursor::CursorPosition;
use crate::error::{DbError, Result};
use crate::items::row_to_item;
use crate::sql::{field_expr, quote_ident};
use crate::types::{ListOptions, Page, RangeFilter, StoredItem};
use crate::ItemDb;
use itemstore_protocol::{IndexDefinition, TableDefinition};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use tracing::debug;

/// Which sort column a cursor coordinate feeds.
#[derive(Debug, Clone, Copy)]
enum SortKey {
    Pk,
    Rk,
    Ipk,
    Irk,
}

struct PageQuery<'a> {
    table: &'a TableDefinition,
    index: Option<&'a IndexDefinition>,
    partition: Option<String>,
    conditions: Vec<String>,
    binds: Vec<String>,
}

impl<'a> PageQuery<'a> {
    fn table(table: &'a TableDefinition) -> Self {
        Self {
            table,
            index: None,
            partition: None,
            conditions: Vec::new(),
            binds: Vec::new(),
        }
    }

    /// Index read. Rows lacking any index key field are never visible.
    fn index(table: &'a TableDefinition, index: &'a IndexDefinition) -> Self {
        let conditions = index
            .key_fields()
            .into_iter()
            .map(|f| format!("{} IS NOT NULL", field_expr(f)))
            .collect();
        Self {
            table,
            index: Some(index),
            partition: None,
            conditions,
            binds: Vec::new(),
        }
    }

    fn scope(&self) -> String {
        let table = &self.table.name;
        match (self.index, &self.partition) {
            (Some(index), Some(ipk)) => format!("index:{table}/{}/{ipk}", index.name),
            (Some(index), None) => format!("index:{table}/{}", index.name),
            (None, Some(pk)) => format!("partition:{table}/{pk}"),
            (None, None) => format!("table:{table}"),
        }
    }

    fn sort_columns(&self) -> Vec<(String, SortKey)> {
        let mut cols = Vec::with_capacity(4);
        if let Some(index) = self.index {
            cols.push((field_expr(index.primary_key_field()), SortKey::Ipk));
            if let Some(irk) = index.range_key_field() {
                cols.push((field_expr(irk), SortKey::Irk));
            }
        }
        cols.push(("pk".to_string(), SortKey::Pk));
        if self.table.has_range_key() {
            cols.push(("rk".to_string(), SortKey::Rk));
        }
        cols
    }

    fn equals(&mut self, column: String, value: &str) -> &mut Self {
        self.conditions.push(format!("{column} = ?"));
        self.binds.push(value.to_string());
        self
    }

    /// Restrict to one partition. The value becomes part of the cursor scope.
    fn partition(&mut self, column: String, value: &str) -> &mut Self {
        self.partition = Some(value.to_string());
        self.equals(column, value)
    }

    fn range(&mut self, column: &str, filter: &RangeFilter) -> &mut Self {
        if let Some(prefix) = &filter.begins_with {
            self.conditions
                .push(format!("substr({column}, 1, length(?)) = ?"));
            self.binds.push(prefix.clone());
            self.binds.push(prefix.clone());
        }
        for (op, value) in [
            (">", &filter.gt),
            (">=", &filter.gte),
            ("<", &filter.lt),
            ("<=", &filter.lte),
        ] {
            if let Some(value) = value {
                self.conditions.push(format!("{column} {op} ?"));
                self.binds.push(value.clone());
            }
        }
        self
    }

    /// Restrict to rows strictly after `position` in sort order. A position
    /// missing a coordinate this read sorts on is ignored.
    fn after(&mut self, position: &CursorPosition) -> &mut Self {
        let cols = self.sort_columns();
        let mut values = Vec::with_capacity(cols.len());
        for (_, key) in &cols {
            let value = match key {
                SortKey::Pk => Some(&position.pk),
                SortKey::Rk => position.rk.as_ref(),
                SortKey::Ipk => position.ipk.as_ref(),
                SortKey::Irk => position.irk.as_ref(),
            };
            match value {
                Some(v) => values.push(v.clone()),
                None => return self,
            }
        }

        let names: Vec<&str> = cols.iter().map(|(c, _)| c.as_str()).collect();
        let placeholders = vec!["?"; names.len()].join(", ");
        if names.len() == 1 {
            self.conditions.push(format!("{} > ?", names[0]));
        } else {
            self.conditions
                .push(format!("({}) > ({})", names.join(", "), placeholders));
        }
        self.binds.extend(values);
        self
    }

    fn sql(&self, limit: usize) -> String {
        let mut select = String::from("SELECT pk, rk, data, created_at, updated_at");
        if let Some(index) = self.index {
            select.push_str(&format!(", {} AS ipk", field_expr(index.primary_key_field())));
            if let Some(irk) = index.range_key_field() {
                select.push_str(&format!(", {} AS irk", field_expr(irk)));
            }
        }

        let mut sql = format!("{select} FROM {}", quote_ident(&self.table.name));
        if !self.conditions.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&self.conditions.join(" AND "));
        }
        let order: Vec<String> = self
            .sort_columns()
            .into_iter()
            .map(|(c, _)| format!("{c} ASC"))
            .collect();
        sql.push_str(&format!(" ORDER BY {} LIMIT {}", order.join(", "), limit));
        sql
    }

    fn position_of(&self, row: &SqliteRow) -> Result<CursorPosition> {
        let position = CursorPosition::new(row.try_get::<String, _>("pk")?, row.try_get("rk")?);
        let Some(index) = self.index else {
            return Ok(position);
        };
        let irk = match index.range_key_field() {
            Some(_) => row.try_get("irk")?,
            None => None,
        };
        Ok(position.with_index_keys(row.try_get("ipk")?, irk))
    }

    async fn fetch(mut self, db: &ItemDb, opts: &ListOptions) -> Result<Page<StoredItem>> {
        let scope = self.scope();
        if let Some(token) = opts.cursor.as_deref().filter(|t| !t.is_empty()) {
            match db.cursors().decode(&scope, token) {
                Some(position) => {
                    self.after(&position);
                }
                None => debug!(scope = %scope, "Ignoring undecodable cursor"),
            }
        }

        let limit = opts.effective_limit();
        let sql = self.sql(limit.saturating_add(1));
        let mut query = sqlx::query(&sql);
        for value in &self.binds {
            query = query.bind(value.as_str());
        }
        let rows = query.fetch_all(db.pool()).await?;

        let has_more = rows.len() > limit;
        let rows = &rows[..rows.len().min(limit)];
        let items = rows.iter().map(row_to_item).collect::<Result<Vec<_>>>()?;

        let next_cursor = match rows.last() {
            Some(row) if has_more => Some(db.cursors().encode(&scope, &self.position_of(row)?)?),
            _ => None,
        };

        Ok(Page { items, next_cursor })
    }
}

impl ItemDb {
    // ========================================================================
    // Query Operations
    // ========================================================================

    /// Items sharing one primary key, ordered by range key. Range filters
    /// apply only when the table has a range key.
    pub async fn list_partition(
        &self,
        table: &TableDefinition,
        pk: &str,
        opts: &ListOptions,
    ) -> Result<Page<StoredItem>> {
        let mut query = PageQuery::table(table);
        query.partition("pk".to_string(), pk);
        if table.has_range_key() {
            query.range("rk", &opts.range);
        }
        query.fetch(self, opts).await
    }

    /// Every item of the table. Requires `allowTableScan`.
    pub async fn scan_table(
        &self,
        table: &TableDefinition,
        opts: &ListOptions,
    ) -> Result<Page<StoredItem>> {
        if !table.allow_table_scan {
            return Err(DbError::not_permitted(format!(
                "table scan is not enabled for table {:?}",
                table.name
            )));
        }
        PageQuery::table(table).fetch(self, opts).await
    }

    /// Items whose index primary key equals `index_pk`. Range filters apply
    /// to the index range key when the index declares one.
    pub async fn query_index(
        &self,
        table: &TableDefinition,
        index: &IndexDefinition,
        index_pk: &str,
        opts: &ListOptions,
    ) -> Result<Page<StoredItem>> {
        let mut query = PageQuery::index(table, index);
        query.partition(field_expr(index.primary_key_field()), index_pk);
        if let Some(irk) = index.range_key_field() {
            query.range(&field_expr(irk), &opts.range);
        }
        query.fetch(self, opts).await
    }

    /// Every item visible through the index. Requires `allowIndexScan`.
    pub async fn scan_index(
        &self,
        table: &TableDefinition,
        index: &IndexDefinition,
        opts: &ListOptions,
    ) -> Result<Page<StoredItem>> {
        if !index.allow_index_scan {
            return Err(DbError::not_permitted(format!(
                "index scan is not enabled for index {:?} on table {:?}",
                index.name, table.name
            )));
        }
        PageQuery::index(table, index).fetch(self, opts).await
    }

    /// First item (in table key order) matching both index keys. Only
    /// defined for indexes with a range key.
    pub async fn get_item_by_index(
        &self,
        table: &TableDefinition,
        index: &IndexDefinition,
        index_pk: &str,
        index_rk: &str,
    ) -> Result<Option<StoredItem>> {
        let Some(irk_field) = index.range_key_field() else {
            return Err(DbError::not_permitted(format!(
                "index {:?} on table {:?} has no range key",
                index.name, table.name
            )));
        };

        let mut query = PageQuery::index(table, index);
        query
            .equals(field_expr(index.primary_key_field()), index_pk)
            .equals(field_expr(irk_field), index_rk);
        let sql = query.sql(1);

        let mut q = sqlx::query(&sql);
        for value in &query.binds {
            q = q.bind(value.as_str());
        }
        let row = q.fetch_optional(&self.pool).await?;
        row.as_ref().map(row_to_item).transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn orders() -> TableDefinition {
        TableDefinition::new("orders", "orderId", ".*").with_range_key("lineId", ".*")
    }

    #[test]
    fn test_table_sort_tuple() {
        let table = orders();
        let mut q = PageQuery::table(&table);
        q.partition("pk".into(), "order1")
            .after(&CursorPosition::new("order1", Some("line1".into())));
        let sql = q.sql(3);
        assert!(sql.contains("WHERE pk = ? AND (pk, rk) > (?, ?)"), "{sql}");
        assert!(sql.ends_with("ORDER BY pk ASC, rk ASC LIMIT 3"), "{sql}");
        assert_eq!(q.binds, vec!["order1", "order1", "line1"]);
    }

    #[test]
    fn test_cursor_missing_coordinate_is_ignored() {
        let table = orders();
        let mut q = PageQuery::table(&table);
        q.after(&CursorPosition::new("order1", None));
        assert!(q.conditions.is_empty());
        assert!(q.binds.is_empty());
    }

    #[test]
    fn test_index_query_is_sparse_and_totally_ordered() {
        let table = TableDefinition::new("items", "itemId", ".*");
        let index = IndexDefinition::new("by_status", "status");
        let q = PageQuery::index(&table, &index);
        let sql = q.sql(11);
        let status = field_expr("status");
        assert!(sql.contains(&format!("WHERE {status} IS NOT NULL")), "{sql}");
        assert!(
            sql.ends_with(&format!("ORDER BY {status} ASC, pk ASC LIMIT 11")),
            "{sql}"
        );
        assert!(sql.contains(&format!("{status} AS ipk")));
    }

    #[test]
    fn test_begins_with_uses_prefix_compare() {
        let table = orders();
        let mut q = PageQuery::table(&table);
        q.range(
            "rk",
            &RangeFilter {
                begins_with: Some("line_".into()),
                lte: Some("z".into()),
                ..Default::default()
            },
        );
        assert_eq!(
            q.conditions,
            vec!["substr(rk, 1, length(?)) = ?", "rk <= ?"]
        );
        assert_eq!(q.binds, vec!["line_", "line_", "z"]);
    }

    #[test]
    fn test_scopes_differ_per_read_shape() {
        let table = orders()
            .with_index(IndexDefinition::new("by_customer", "customerId"));
        assert_eq!(PageQuery::table(&table).scope(), "table:orders");
        assert_eq!(
            PageQuery::index(&table, &table.indexes[0]).scope(),
            "index:orders/by_customer"
        );

        let mut list = PageQuery::table(&table);
        list.partition("pk".into(), "order1");
        assert_eq!(list.scope(), "partition:orders/order1");

        let mut query = PageQuery::index(&table, &table.indexes[0]);
        query.partition(field_expr("customerId"), "cust1");
        assert_eq!(query.scope(), "index:orders/by_customer/cust1");
    }
}
