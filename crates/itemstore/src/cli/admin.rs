//! Admin commands: config validation, fingerprint, migrate, drift check.

use super::error::HelpfulError;
use super::{print_json, GlobalArgs};
use clap::Subcommand;
use itemstore::{ReconcileOptions, TableDefinition};
use itemstore_protocol::tables_fingerprint;
use serde::Serialize;
use tracing::info;

#[derive(Subcommand, Debug, Clone)]
pub enum AdminCommand {
    /// Validate the table configuration without touching the database
    Validate,

    /// Print the structural fingerprint of the configuration
    Fingerprint,

    /// Create or update tables and indexes to match the configuration
    Migrate {
        /// Also drop tables and indexes no longer in the configuration
        #[arg(long)]
        cleanup: bool,

        /// Report what would change without applying anything
        #[arg(long)]
        dry_run: bool,
    },

    /// Verify the database was migrated for this configuration
    Check,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TableSummary {
    name: String,
    primary_key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    range_key: Option<String>,
    allow_table_scan: bool,
    indexes: Vec<String>,
}

impl From<&TableDefinition> for TableSummary {
    fn from(table: &TableDefinition) -> Self {
        Self {
            name: table.name.clone(),
            primary_key: table.primary_key_field().to_string(),
            range_key: table.range_key_field().map(str::to_string),
            allow_table_scan: table.allow_table_scan,
            indexes: table.indexes.iter().map(|i| i.name.clone()).collect(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ValidateOutput {
    valid: bool,
    fingerprint: String,
    tables: Vec<TableSummary>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CheckOutput {
    ok: bool,
    fingerprint: String,
    recorded_tables: Vec<String>,
}

/// Execute an admin command
pub async fn run(global: &GlobalArgs, command: AdminCommand) -> anyhow::Result<()> {
    let config = global.load_tables()?;

    match command {
        AdminCommand::Validate => print_json(&ValidateOutput {
            valid: true,
            fingerprint: tables_fingerprint(&config.tables)?,
            tables: config.tables.iter().map(TableSummary::from).collect(),
        }),

        AdminCommand::Fingerprint => print_json(&serde_json::json!({
            "fingerprint": tables_fingerprint(&config.tables)?,
        })),

        AdminCommand::Migrate { cleanup, dry_run } => {
            let db = global.open_db().await?;
            let plan = db
                .reconcile(&config.tables, ReconcileOptions { cleanup, dry_run })
                .await
                .map_err(|e| HelpfulError::from_reconcile(&e))?;
            info!(
                changes = plan.structural_changes().count(),
                dry_run, "Migration finished"
            );
            print_json(&plan)
        }

        AdminCommand::Check => {
            let db = global.open_db().await?;
            let fingerprint = db
                .check_tables_fingerprint(&config.tables)
                .await
                .map_err(|e| {
                    if e.is_drift() {
                        anyhow::Error::new(HelpfulError::from_drift(&e))
                    } else {
                        anyhow::Error::new(e)
                    }
                })?;
            let recorded_tables = db
                .recorded_tables()
                .await?
                .into_iter()
                .map(|(name, _)| name)
                .collect();
            print_json(&CheckOutput {
                ok: true,
                fingerprint,
                recorded_tables,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use itemstore_protocol::IndexDefinition;

    #[test]
    fn test_table_summary() {
        let table = TableDefinition::new("orders", "orderId", "^.*$")
            .with_range_key("lineId", "^.*$")
            .with_index(IndexDefinition::new("by_customer", "customerId"));
        let summary = serde_json::to_value(TableSummary::from(&table)).unwrap();
        assert_eq!(
            summary,
            serde_json::json!({
                "name": "orders",
                "primaryKey": "orderId",
                "rangeKey": "lineId",
                "allowTableScan": false,
                "indexes": ["by_customer"]
            })
        );
    }
}
