//! Structural reconciliation ("migrate").
//!
//! One transaction per run: ensure `_meta`, create or verify each configured
//! table, bring its indexes in line, optionally drop what is no longer
//! configured, then upsert the structural fingerprint. Dry-run computes the
//! same plan and rolls back.

use crate::error::{DbError, KeyKind, Result};
use crate::meta::{self, TableMeta};
use crate::sql::{field_expr, quote_ident};
use crate::types::{ReconcileAction, ReconcileOptions, ReconcilePlan};
use crate::ItemDb;
use itemstore_protocol::{
    physical_index_name, tables_fingerprint, validate_tables, IndexDefinition, TableDefinition,
};
use sqlx::sqlite::SqliteConnection;
use sqlx::Row;
use std::collections::HashSet;
use tracing::{info, warn};

/// Accumulates the plan and performs each step unless in dry-run.
struct Run<'a> {
    conn: &'a mut SqliteConnection,
    opts: ReconcileOptions,
    actions: Vec<ReconcileAction>,
}

impl Run<'_> {
    fn record(&mut self, action: ReconcileAction) {
        if self.opts.dry_run {
            info!("[dry-run] would {}", action);
        } else {
            info!("{}", action);
        }
        self.actions.push(action);
    }

    async fn execute(&mut self, statement: &str) -> Result<()> {
        if !self.opts.dry_run {
            sqlx::query(statement).execute(&mut *self.conn).await?;
        }
        Ok(())
    }

    async fn reconcile_table(&mut self, table: &TableDefinition) -> Result<()> {
        let wanted = TableMeta::for_table(table);

        match meta::read_table_meta(self.conn, &table.name).await? {
            None => {
                self.record(ReconcileAction::CreateTable {
                    table: table.name.clone(),
                });
                self.execute(&create_table_sql(table)).await?;

                self.record(ReconcileAction::RecordTableMeta {
                    table: table.name.clone(),
                });
                if !self.opts.dry_run {
                    meta::insert_table_meta(self.conn, &table.name, &wanted).await?;
                }
            }
            Some(recorded) => verify_key_fields(&table.name, &recorded, &wanted)?,
        }

        self.reconcile_indexes(table).await
    }

    async fn reconcile_indexes(&mut self, table: &TableDefinition) -> Result<()> {
        let existing = existing_indexes(self.conn, &table.name).await?;
        let mut desired = HashSet::new();

        for index in &table.indexes {
            let name = physical_index_name(&table.name, &index.name);
            let sql = create_index_sql(table, index);
            desired.insert(name.clone());

            match existing.iter().find(|(n, _)| *n == name) {
                None => {
                    self.record(ReconcileAction::CreateIndex {
                        table: table.name.clone(),
                        index: name,
                    });
                    self.execute(&sql).await?;
                }
                Some((_, current)) if current.as_deref() != Some(sql.as_str()) => {
                    self.record(ReconcileAction::RebuildIndex {
                        table: table.name.clone(),
                        index: name.clone(),
                    });
                    self.execute(&format!("DROP INDEX IF EXISTS {}", quote_ident(&name)))
                        .await?;
                    self.execute(&sql).await?;
                }
                Some(_) => {}
            }
        }

        if self.opts.cleanup {
            for (name, _) in existing {
                if !desired.contains(&name) {
                    self.record(ReconcileAction::DropIndex {
                        table: table.name.clone(),
                        index: name.clone(),
                    });
                    self.execute(&format!("DROP INDEX IF EXISTS {}", quote_ident(&name)))
                        .await?;
                }
            }
        }
        Ok(())
    }

    async fn cleanup_tables(&mut self, configured: &HashSet<&str>) -> Result<()> {
        for name in meta::recorded_table_names(self.conn).await? {
            if configured.contains(name.as_str()) {
                continue;
            }
            self.record(ReconcileAction::DropTable {
                table: name.clone(),
            });
            if !self.opts.dry_run {
                self.execute(&format!("DROP TABLE IF EXISTS {}", quote_ident(&name)))
                    .await?;
                meta::delete_table_meta(self.conn, &name).await?;
            }
        }
        Ok(())
    }
}

fn verify_key_fields(table: &str, recorded: &TableMeta, wanted: &TableMeta) -> Result<()> {
    if recorded.primary_key_field != wanted.primary_key_field {
        return Err(DbError::KeyFieldChanged {
            table: table.to_string(),
            key: KeyKind::Primary,
            recorded: recorded.primary_key_field.clone(),
            configured: wanted.primary_key_field.clone(),
        });
    }
    if recorded.range_key_field != wanted.range_key_field {
        return Err(DbError::KeyFieldChanged {
            table: table.to_string(),
            key: KeyKind::Range,
            recorded: recorded.range_key_field.clone().unwrap_or_default(),
            configured: wanted.range_key_field.clone().unwrap_or_default(),
        });
    }
    Ok(())
}

fn create_table_sql(table: &TableDefinition) -> String {
    let name = quote_ident(&table.name);
    if table.has_range_key() {
        format!(
            "CREATE TABLE {name} (\
             pk TEXT NOT NULL, \
             rk TEXT NOT NULL, \
             data TEXT NOT NULL, \
             created_at INTEGER NOT NULL, \
             updated_at INTEGER NOT NULL, \
             PRIMARY KEY (pk, rk))"
        )
    } else {
        format!(
            "CREATE TABLE {name} (\
             pk TEXT NOT NULL PRIMARY KEY, \
             rk TEXT, \
             data TEXT NOT NULL, \
             created_at INTEGER NOT NULL, \
             updated_at INTEGER NOT NULL)"
        )
    }
}

/// Partial expression index over the index key fields; rows lacking any key
/// field are left out, which is what makes the index sparse.
pub(crate) fn create_index_sql(table: &TableDefinition, index: &IndexDefinition) -> String {
    let exprs: Vec<String> = index.key_fields().into_iter().map(field_expr).collect();
    let present: Vec<String> = exprs.iter().map(|e| format!("{e} IS NOT NULL")).collect();
    format!(
        "CREATE INDEX {} ON {} ({}) WHERE {}",
        quote_ident(&physical_index_name(&table.name, &index.name)),
        quote_ident(&table.name),
        exprs.join(", "),
        present.join(" AND ")
    )
}

/// `idx_*` indexes on `table` with their stored definitions.
async fn existing_indexes(
    conn: &mut SqliteConnection,
    table: &str,
) -> Result<Vec<(String, Option<String>)>> {
    let rows = sqlx::query(
        r#"
        SELECT name, sql FROM sqlite_master
        WHERE type = 'index' AND tbl_name = ? AND name LIKE 'idx\_%' ESCAPE '\'
        ORDER BY name
        "#,
    )
    .bind(table)
    .fetch_all(&mut *conn)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| (row.get::<String, _>("name"), row.get::<Option<String>, _>("sql")))
        .collect())
}

impl ItemDb {
    // ========================================================================
    // Reconciliation
    // ========================================================================

    /// Bring physical storage in line with `tables`.
    ///
    /// Either every change commits or none does. A changed key field on an
    /// already-recorded table fails with [`DbError::KeyFieldChanged`].
    pub async fn reconcile(
        &self,
        tables: &[TableDefinition],
        opts: ReconcileOptions,
    ) -> Result<ReconcilePlan> {
        validate_tables(tables)?;
        let fingerprint = tables_fingerprint(tables)?;

        let mut tx = self.pool.begin().await?;
        meta::ensure_meta_table(&mut tx).await?;

        let mut run = Run {
            conn: &mut tx,
            opts,
            actions: Vec::new(),
        };

        let mut configured = HashSet::new();
        for table in tables {
            configured.insert(table.name.as_str());
            if let Err(err) = run.reconcile_table(table).await {
                warn!(table = %table.name, error = %err, "Reconciliation aborted");
                return Err(err);
            }
        }

        if opts.cleanup {
            run.cleanup_tables(&configured).await?;
        }

        run.record(ReconcileAction::StoreFingerprint {
            fingerprint: fingerprint.clone(),
        });
        if !opts.dry_run {
            meta::upsert_fingerprint(run.conn, &fingerprint).await?;
        }

        let actions = run.actions;
        if opts.dry_run {
            tx.rollback().await?;
        } else {
            tx.commit().await?;
        }

        info!(
            tables = tables.len(),
            changes = actions.len() - 1,
            dry_run = opts.dry_run,
            "Reconciliation complete"
        );

        Ok(ReconcilePlan {
            actions,
            fingerprint,
            dry_run: opts.dry_run,
        })
    }
}
