//! Item commands: single-item CRUD and the paginated reads.

use super::error::HelpfulError;
use super::{print_json, GlobalArgs};
use anyhow::Context;
use clap::{Args, Subcommand};
use itemstore::{Document, ItemService, ListOptions, RangeFilter, ServiceError, TableRegistry};
use itemstore_protocol::parse_fields_param;
use serde_json::Value;
use std::io::Read;
use std::sync::Arc;

#[derive(Args, Debug, Clone)]
pub struct KeyArgs {
    /// Table name
    pub table: String,
    /// Primary key value
    pub pk: String,
    /// Range key value (tables with a range key)
    #[arg(long)]
    pub rk: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct WriteArgs {
    #[command(flatten)]
    pub key: KeyArgs,
    /// JSON object body, `@file` to read a file, or `-` for stdin
    #[arg(long, short = 'd')]
    pub data: String,
}

#[derive(Args, Debug, Clone, Default)]
pub struct PageArgs {
    /// Maximum items per page (default 50, at most 1000)
    #[arg(long)]
    pub limit: Option<usize>,
    /// Cursor from a previous page's nextCursor
    #[arg(long)]
    pub cursor: Option<String>,
    /// Range key prefix
    #[arg(long)]
    pub begins_with: Option<String>,
    #[arg(long)]
    pub gt: Option<String>,
    #[arg(long)]
    pub gte: Option<String>,
    #[arg(long)]
    pub lt: Option<String>,
    #[arg(long)]
    pub lte: Option<String>,
    /// Comma-separated fields to return (key fields are always returned)
    #[arg(long)]
    pub fields: Option<String>,
}

impl PageArgs {
    fn list_options(&self) -> ListOptions {
        ListOptions {
            limit: self.limit,
            cursor: self.cursor.clone(),
            range: RangeFilter {
                begins_with: self.begins_with.clone(),
                gt: self.gt.clone(),
                gte: self.gte.clone(),
                lt: self.lt.clone(),
                lte: self.lte.clone(),
            },
        }
    }

    fn fields(&self) -> Vec<String> {
        fields_of(self.fields.as_deref())
    }
}

fn fields_of(param: Option<&str>) -> Vec<String> {
    param.map(parse_fields_param).unwrap_or_default()
}

#[derive(Subcommand, Debug, Clone)]
pub enum ItemCommand {
    /// Get one item
    Get {
        #[command(flatten)]
        key: KeyArgs,
        /// Comma-separated fields to return
        #[arg(long)]
        fields: Option<String>,
    },
    /// Create or fully replace an item
    Put(WriteArgs),
    /// Merge-patch an existing item (RFC 7396)
    Patch(WriteArgs),
    /// Delete an item
    Delete(KeyArgs),
    /// List items sharing a primary key
    List {
        table: String,
        pk: String,
        #[command(flatten)]
        page: PageArgs,
    },
    /// Scan a whole table (requires allowTableScan)
    Scan {
        table: String,
        #[command(flatten)]
        page: PageArgs,
    },
    /// Query a secondary index by its primary key
    QueryIndex {
        table: String,
        index: String,
        index_pk: String,
        #[command(flatten)]
        page: PageArgs,
    },
    /// Scan a secondary index (requires allowIndexScan)
    ScanIndex {
        table: String,
        index: String,
        #[command(flatten)]
        page: PageArgs,
    },
    /// Get one item by both index keys
    GetByIndex {
        table: String,
        index: String,
        index_pk: String,
        index_rk: String,
        #[arg(long)]
        fields: Option<String>,
    },
}

/// Execute an item command
pub async fn run(global: &GlobalArgs, command: ItemCommand) -> anyhow::Result<()> {
    let config = global.load_tables()?;
    let registry = TableRegistry::with_schemas(config.tables)?;
    let db = global.open_db().await?;
    let service = ItemService::new(db, Arc::new(registry));

    service
        .check_startup(global.skip_config_validation)
        .await
        .map_err(|e| {
            if e.is_drift() {
                anyhow::Error::new(HelpfulError::from_drift(&e))
            } else {
                anyhow::Error::new(e)
            }
        })?;

    execute(&service, command).await.map_err(|e| match e.downcast::<ServiceError>() {
        Ok(service_err) => HelpfulError::from_service(&service_err).into(),
        Err(other) => other,
    })
}

async fn execute(service: &ItemService, command: ItemCommand) -> anyhow::Result<()> {
    match command {
        ItemCommand::Get { key, fields } => {
            let doc = service
                .get(&key.table, &key.pk, key.rk.as_deref(), &fields_of(fields.as_deref()))
                .await?;
            print_json(&doc)
        }
        ItemCommand::Put(args) => {
            let body = read_body(&args.data)?;
            let key = args.key;
            let doc = service
                .put(&key.table, &key.pk, key.rk.as_deref(), body)
                .await?;
            print_json(&doc)
        }
        ItemCommand::Patch(args) => {
            let patch = read_body(&args.data)?;
            let key = args.key;
            let doc = service
                .patch(&key.table, &key.pk, key.rk.as_deref(), patch)
                .await?;
            print_json(&doc)
        }
        ItemCommand::Delete(key) => {
            let deleted = service
                .delete(&key.table, &key.pk, key.rk.as_deref())
                .await?;
            print_json(&serde_json::json!({ "deleted": deleted }))
        }
        ItemCommand::List { table, pk, page } => {
            let result = service
                .list_by_partition(&table, &pk, &page.list_options(), &page.fields())
                .await?;
            print_json(&result)
        }
        ItemCommand::Scan { table, page } => {
            let result = service
                .scan_table(&table, &page.list_options(), &page.fields())
                .await?;
            print_json(&result)
        }
        ItemCommand::QueryIndex {
            table,
            index,
            index_pk,
            page,
        } => {
            let result = service
                .query_index(&table, &index, &index_pk, &page.list_options(), &page.fields())
                .await?;
            print_json(&result)
        }
        ItemCommand::ScanIndex { table, index, page } => {
            let result = service
                .scan_index(&table, &index, &page.list_options(), &page.fields())
                .await?;
            print_json(&result)
        }
        ItemCommand::GetByIndex {
            table,
            index,
            index_pk,
            index_rk,
            fields,
        } => {
            let doc = service
                .get_by_index(
                    &table,
                    &index,
                    &index_pk,
                    &index_rk,
                    &fields_of(fields.as_deref()),
                )
                .await?;
            print_json(&doc)
        }
    }
}

/// Read a `--data` argument: literal JSON, `@path`, or `-` for stdin.
fn read_body(data: &str) -> anyhow::Result<Document> {
    let text = if data == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("Failed to read body from stdin")?;
        buf
    } else if let Some(path) = data.strip_prefix('@') {
        std::fs::read_to_string(path).with_context(|| format!("Failed to read body file {path}"))?
    } else {
        data.to_string()
    };
    parse_body(&text)
}

fn parse_body(text: &str) -> anyhow::Result<Document> {
    match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(HelpfulError::invalid_body(format!("got {}", json_kind(&other))).into()),
        Err(e) => Err(HelpfulError::invalid_body(e).into()),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
