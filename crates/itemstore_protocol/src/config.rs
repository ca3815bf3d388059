//! Table and index definitions.
//!
//! Loaded once from YAML at startup and treated as read-only afterwards.
//! [`validate_tables`] enforces every structural rule before any storage
//! action is attempted; it fails on the first violation with a message that
//! names the offending table/index.

use crate::error::ConfigError;
use crate::schema::compile_schema;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::LazyLock;

/// Grammar for table and index names.
pub const NAME_RULE: &str = r"^[a-z][a-z0-9_]*$";
/// Grammar for key field names.
pub const KEY_FIELD_RULE: &str = r"^[A-Za-z][A-Za-z0-9_-]*$";

static NAME_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(NAME_RULE).expect("name grammar compiles"));
static KEY_FIELD_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(KEY_FIELD_RULE).expect("key field grammar compiles"));

/// Top-level configuration file. Only `tables` is read; other sections
/// (server, auth) belong to the outer service and are ignored here.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TablesConfig {
    #[serde(default)]
    pub tables: Vec<TableDefinition>,
}

impl TablesConfig {
    /// Load and validate a YAML configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml_str(&content)
    }

    /// Parse and validate YAML configuration text.
    pub fn from_yaml_str(content: &str) -> Result<Self, ConfigError> {
        let config: TablesConfig = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tables.is_empty() {
            return Err(ConfigError::invalid("at least one table must be defined"));
        }
        validate_tables(&self.tables)
    }
}

/// A key field, with the value pattern for table keys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyDefinition {
    pub field: String,
    /// Regular expression every addressed key value must match. Required on
    /// table keys, unused on index keys.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
}

impl KeyDefinition {
    pub fn new(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            pattern: None,
        }
    }

    pub fn with_pattern(field: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            pattern: Some(pattern.into()),
        }
    }
}

/// Which attributes an index read may return.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProjectionType {
    #[default]
    All,
    KeysOnly,
    Include,
}

impl ProjectionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProjectionType::All => "ALL",
            ProjectionType::KeysOnly => "KEYS_ONLY",
            ProjectionType::Include => "INCLUDE",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Projection {
    #[serde(rename = "type")]
    pub kind: ProjectionType,
    #[serde(default)]
    pub non_key_attributes: Vec<String>,
}

impl Projection {
    pub fn all() -> Self {
        Self {
            kind: ProjectionType::All,
            non_key_attributes: Vec::new(),
        }
    }

    pub fn keys_only() -> Self {
        Self {
            kind: ProjectionType::KeysOnly,
            non_key_attributes: Vec::new(),
        }
    }

    pub fn include<I, S>(attributes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            kind: ProjectionType::Include,
            non_key_attributes: attributes.into_iter().map(Into::into).collect(),
        }
    }
}

/// A secondary index over fields of the document payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexDefinition {
    pub name: String,
    pub primary_key: KeyDefinition,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range_key: Option<KeyDefinition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub projection: Option<Projection>,
    #[serde(default)]
    pub allow_index_scan: bool,
}

impl IndexDefinition {
    pub fn new(name: impl Into<String>, primary_key_field: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            primary_key: KeyDefinition::new(primary_key_field),
            range_key: None,
            projection: None,
            allow_index_scan: false,
        }
    }

    pub fn with_range_key(mut self, field: impl Into<String>) -> Self {
        self.range_key = Some(KeyDefinition::new(field));
        self
    }

    pub fn with_projection(mut self, projection: Projection) -> Self {
        self.projection = Some(projection);
        self
    }

    pub fn with_index_scan(mut self, allow: bool) -> Self {
        self.allow_index_scan = allow;
        self
    }

    pub fn primary_key_field(&self) -> &str {
        &self.primary_key.field
    }

    pub fn range_key_field(&self) -> Option<&str> {
        self.range_key.as_ref().map(|k| k.field.as_str())
    }

    /// Index key fields, primary first.
    pub fn key_fields(&self) -> Vec<&str> {
        let mut fields = vec![self.primary_key.field.as_str()];
        fields.extend(self.range_key_field());
        fields
    }

    /// Declared projection; an index without one projects everything.
    pub fn projection_type(&self) -> ProjectionType {
        self.projection
            .as_ref()
            .map(|p| p.kind)
            .unwrap_or_default()
    }
}

/// A configured table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableDefinition {
    pub name: String,
    pub primary_key: KeyDefinition,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range_key: Option<KeyDefinition>,
    #[serde(default)]
    pub allow_table_scan: bool,
    /// JSON Schema every stored document must satisfy.
    #[serde(default)]
    pub schema: Value,
    #[serde(default)]
    pub indexes: Vec<IndexDefinition>,
}

impl TableDefinition {
    pub fn new(
        name: impl Into<String>,
        primary_key_field: impl Into<String>,
        pattern: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            primary_key: KeyDefinition::with_pattern(primary_key_field, pattern),
            range_key: None,
            allow_table_scan: false,
            schema: serde_json::json!({ "type": "object" }),
            indexes: Vec::new(),
        }
    }

    pub fn with_range_key(mut self, field: impl Into<String>, pattern: impl Into<String>) -> Self {
        self.range_key = Some(KeyDefinition::with_pattern(field, pattern));
        self
    }

    pub fn with_schema(mut self, schema: Value) -> Self {
        self.schema = schema;
        self
    }

    pub fn with_index(mut self, index: IndexDefinition) -> Self {
        self.indexes.push(index);
        self
    }

    pub fn with_table_scan(mut self, allow: bool) -> Self {
        self.allow_table_scan = allow;
        self
    }

    pub fn primary_key_field(&self) -> &str {
        &self.primary_key.field
    }

    pub fn range_key_field(&self) -> Option<&str> {
        self.range_key.as_ref().map(|k| k.field.as_str())
    }

    pub fn has_range_key(&self) -> bool {
        self.range_key.is_some()
    }

    /// Table key fields, primary first.
    pub fn key_fields(&self) -> Vec<&str> {
        let mut fields = vec![self.primary_key.field.as_str()];
        fields.extend(self.range_key_field());
        fields
    }

    pub fn index(&self, name: &str) -> Option<&IndexDefinition> {
        self.indexes.iter().find(|idx| idx.name == name)
    }
}

/// Physical name of a secondary index. SQLite index names share one
/// namespace with table names across the whole database.
pub fn physical_index_name(table: &str, index: &str) -> String {
    format!("idx_{table}_{index}")
}

/// Check every structural rule over a list of table definitions.
///
/// Does not require the list to be non-empty; [`TablesConfig::validate`]
/// adds that rule for configuration files.
pub fn validate_tables(tables: &[TableDefinition]) -> Result<(), ConfigError> {
    let mut table_names = HashSet::new();
    for (i, table) in tables.iter().enumerate() {
        if table.name.is_empty() {
            return Err(ConfigError::invalid(format!("table[{i}]: name is required")));
        }
        if !NAME_PATTERN.is_match(&table.name) {
            return Err(ConfigError::invalid(format!(
                "table[{i}]: name {:?} must match {NAME_RULE}",
                table.name
            )));
        }
        if !table_names.insert(table.name.as_str()) {
            return Err(ConfigError::invalid(format!(
                "table[{i}]: duplicate table name {:?}",
                table.name
            )));
        }

        validate_table_key(table, &table.primary_key, "primaryKey")?;
        if let Some(range_key) = &table.range_key {
            validate_table_key(table, range_key, "rangeKey")?;
            if range_key.field == table.primary_key.field {
                return Err(ConfigError::invalid(format!(
                    "table {:?}: primaryKey field and rangeKey field must be different",
                    table.name
                )));
            }
        }

        validate_schema(table)?;

        let mut index_names = HashSet::new();
        for (j, index) in table.indexes.iter().enumerate() {
            if index.name.is_empty() {
                return Err(ConfigError::invalid(format!(
                    "table {:?}: index[{j}]: name is required",
                    table.name
                )));
            }
            if !NAME_PATTERN.is_match(&index.name) {
                return Err(ConfigError::invalid(format!(
                    "table {:?}: index[{j}]: name {:?} must match {NAME_RULE}",
                    table.name, index.name
                )));
            }
            if !index_names.insert(index.name.as_str()) {
                return Err(ConfigError::invalid(format!(
                    "table {:?}: duplicate index name {:?}",
                    table.name, index.name
                )));
            }
            validate_index(table, index)?;
        }
    }
    validate_physical_names(tables)
}

/// Distinct (table, index) pairs can map to one physical index name, and an
/// index name can shadow a table name.
fn validate_physical_names(tables: &[TableDefinition]) -> Result<(), ConfigError> {
    let mut owners: HashMap<String, String> = tables
        .iter()
        .map(|t| (t.name.clone(), format!("table {:?}", t.name)))
        .collect();
    for table in tables {
        for index in &table.indexes {
            let physical = physical_index_name(&table.name, &index.name);
            let owner = format!("index {:?} on table {:?}", index.name, table.name);
            if let Some(existing) = owners.insert(physical.clone(), owner.clone()) {
                return Err(ConfigError::invalid(format!(
                    "{owner}: physical name {physical:?} is already used by {existing}"
                )));
            }
        }
    }
    Ok(())
}

fn validate_table_key(
    table: &TableDefinition,
    key: &KeyDefinition,
    label: &str,
) -> Result<(), ConfigError> {
    if key.field.is_empty() {
        return Err(ConfigError::invalid(format!(
            "table {:?}: {label} field is required",
            table.name
        )));
    }
    if !KEY_FIELD_PATTERN.is_match(&key.field) {
        return Err(ConfigError::invalid(format!(
            "table {:?}: {label} field {:?} must match {KEY_FIELD_RULE}",
            table.name, key.field
        )));
    }
    let pattern = key.pattern.as_deref().unwrap_or_default();
    if pattern.is_empty() {
        return Err(ConfigError::invalid(format!(
            "table {:?}: {label} pattern is required",
            table.name
        )));
    }
    if let Err(err) = Regex::new(pattern) {
        return Err(ConfigError::invalid(format!(
            "table {:?}: {label} pattern {pattern:?} is not a valid regular expression: {err}",
            table.name
        )));
    }
    Ok(())
}

fn validate_index(table: &TableDefinition, index: &IndexDefinition) -> Result<(), ConfigError> {
    let fail = |msg: String| {
        Err(ConfigError::invalid(format!(
            "table {:?}: index {:?}: {msg}",
            table.name, index.name
        )))
    };

    let base_pk = table.primary_key_field();
    let base_rk = table.range_key_field();

    let index_pk = index.primary_key_field();
    if index_pk.is_empty() {
        return fail("primaryKey field is required".to_string());
    }
    if !KEY_FIELD_PATTERN.is_match(index_pk) {
        return fail(format!("primaryKey field {index_pk:?} must match {KEY_FIELD_RULE}"));
    }
    if index_pk == base_pk {
        return fail("primaryKey field must be different from base primaryKey field".to_string());
    }
    if base_rk == Some(index_pk) {
        return fail("primaryKey field must be different from base rangeKey field".to_string());
    }

    if let Some(index_rk) = index.range_key_field() {
        if index_rk.is_empty() {
            return fail("rangeKey field is required when rangeKey is set".to_string());
        }
        if !KEY_FIELD_PATTERN.is_match(index_rk) {
            return fail(format!("rangeKey field {index_rk:?} must match {KEY_FIELD_RULE}"));
        }
        if index_rk == base_pk {
            return fail("rangeKey field must be different from base primaryKey field".to_string());
        }
        if base_rk == Some(index_rk) {
            return fail("rangeKey field must be different from base rangeKey field".to_string());
        }
        if index_rk == index_pk {
            return fail(
                "rangeKey field must be different from index primaryKey field".to_string(),
            );
        }
    }

    if let Some(projection) = &index.projection {
        match projection.kind {
            ProjectionType::All | ProjectionType::KeysOnly => {
                if !projection.non_key_attributes.is_empty() {
                    return fail(format!(
                        "projection nonKeyAttributes must be empty when type is {}",
                        projection.kind.as_str()
                    ));
                }
            }
            ProjectionType::Include => {
                if projection.non_key_attributes.is_empty() {
                    return fail(
                        "projection nonKeyAttributes must not be empty when type is INCLUDE"
                            .to_string(),
                    );
                }
            }
        }
    }
    Ok(())
}

/// The schema must compile as JSON Schema. When it declares `properties`,
/// each table key field must be declared there as a string with a compilable
/// pattern.
fn validate_schema(table: &TableDefinition) -> Result<(), ConfigError> {
    let Some(schema) = table.schema.as_object() else {
        return Err(ConfigError::invalid(format!(
            "table {:?}: schema is required and must be an object",
            table.name
        )));
    };
    compile_schema(&table.name, &table.schema)?;
    let Some(properties) = schema.get("properties").and_then(Value::as_object) else {
        return Ok(());
    };

    let mut keys = vec![("primaryKey", table.primary_key_field())];
    if let Some(rk) = table.range_key_field() {
        keys.push(("rangeKey", rk));
    }

    for (label, field) in keys {
        let Some(prop) = properties.get(field).and_then(Value::as_object) else {
            return Err(ConfigError::invalid(format!(
                "table {:?}: schema must define property {field:?} for {label} field",
                table.name
            )));
        };
        if prop.get("type").and_then(Value::as_str) != Some("string") {
            return Err(ConfigError::invalid(format!(
                "table {:?}: schema property {field:?} for {label} must have type \"string\"",
                table.name
            )));
        }
        let pattern = prop
            .get("pattern")
            .and_then(Value::as_str)
            .filter(|p| !p.is_empty());
        let Some(pattern) = pattern else {
            return Err(ConfigError::invalid(format!(
                "table {:?}: schema property {field:?} for {label} must have a \"pattern\" constraint",
                table.name
            )));
        };
        if let Err(err) = Regex::new(pattern) {
            return Err(ConfigError::invalid(format!(
                "table {:?}: schema property {field:?} for {label} has invalid pattern: {err}",
                table.name
            )));
        }
    }
    Ok(())
}
