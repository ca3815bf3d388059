//! Immutable table registry built once at startup.
//!
//! Maps each table name to its definition, compiled key patterns, document
//! validator and index lookup. Nothing here changes after construction.

use itemstore_protocol::{
    tables_fingerprint, validate_tables, AcceptAll, ConfigError, DocumentValidator,
    IndexDefinition, KeyDefinition, SchemaValidator, TableDefinition,
};
use regex::Regex;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Everything request handling needs to know about one table.
pub struct TableHandle {
    definition: TableDefinition,
    pk_pattern: Regex,
    rk_pattern: Option<Regex>,
    validator: Arc<dyn DocumentValidator>,
    indexes: HashMap<String, usize>,
}

impl fmt::Debug for TableHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TableHandle")
            .field("name", &self.definition.name)
            .field("pk_pattern", &self.pk_pattern.as_str())
            .field("rk_pattern", &self.rk_pattern.as_ref().map(Regex::as_str))
            .finish_non_exhaustive()
    }
}

impl TableHandle {
    fn new(
        definition: TableDefinition,
        validator: Arc<dyn DocumentValidator>,
    ) -> Result<Self, ConfigError> {
        let pk_pattern = compile_key_pattern(&definition.name, &definition.primary_key)?;
        let rk_pattern = definition
            .range_key
            .as_ref()
            .map(|rk| compile_key_pattern(&definition.name, rk))
            .transpose()?;
        let indexes = definition
            .indexes
            .iter()
            .enumerate()
            .map(|(i, index)| (index.name.clone(), i))
            .collect();

        Ok(Self {
            definition,
            pk_pattern,
            rk_pattern,
            validator,
            indexes,
        })
    }

    pub fn name(&self) -> &str {
        &self.definition.name
    }

    pub fn definition(&self) -> &TableDefinition {
        &self.definition
    }

    pub fn pk_pattern(&self) -> &Regex {
        &self.pk_pattern
    }

    pub fn rk_pattern(&self) -> Option<&Regex> {
        self.rk_pattern.as_ref()
    }

    pub fn validator(&self) -> &dyn DocumentValidator {
        self.validator.as_ref()
    }

    pub fn index(&self, name: &str) -> Option<&IndexDefinition> {
        self.indexes
            .get(name)
            .and_then(|&i| self.definition.indexes.get(i))
    }
}

fn compile_key_pattern(table: &str, key: &KeyDefinition) -> Result<Regex, ConfigError> {
    let pattern = key.pattern.as_deref().ok_or_else(|| {
        ConfigError::invalid(format!(
            "table {table:?}: key field {:?} has no pattern",
            key.field
        ))
    })?;
    Regex::new(pattern).map_err(|e| {
        ConfigError::invalid(format!(
            "table {table:?}: key field {:?} has an invalid pattern: {e}",
            key.field
        ))
    })
}

/// Name-indexed set of [`TableHandle`]s, in configuration order.
#[derive(Debug)]
pub struct TableRegistry {
    tables: Vec<TableHandle>,
    by_name: HashMap<String, usize>,
}

impl TableRegistry {
    /// Build a registry where every table accepts any document body.
    pub fn new(tables: Vec<TableDefinition>) -> Result<Self, ConfigError> {
        Self::with_validators(tables, |_| Ok(Arc::new(AcceptAll)))
    }

    /// Build a registry enforcing each table's JSON Schema on writes.
    pub fn with_schemas(tables: Vec<TableDefinition>) -> Result<Self, ConfigError> {
        Self::with_validators(tables, |table| {
            Ok(Arc::new(SchemaValidator::compile(table)?) as Arc<dyn DocumentValidator>)
        })
    }

    /// Build a registry, asking `factory` for each table's document validator.
    pub fn with_validators<F>(tables: Vec<TableDefinition>, mut factory: F) -> Result<Self, ConfigError>
    where
        F: FnMut(&TableDefinition) -> Result<Arc<dyn DocumentValidator>, ConfigError>,
    {
        validate_tables(&tables)?;

        let mut handles = Vec::with_capacity(tables.len());
        let mut by_name = HashMap::with_capacity(tables.len());
        for definition in tables {
            let validator = factory(&definition)?;
            by_name.insert(definition.name.clone(), handles.len());
            handles.push(TableHandle::new(definition, validator)?);
        }

        Ok(Self {
            tables: handles,
            by_name,
        })
    }

    pub fn table(&self, name: &str) -> Option<&TableHandle> {
        self.by_name.get(name).map(|&i| &self.tables[i])
    }

    pub fn tables(&self) -> impl Iterator<Item = &TableHandle> {
        self.tables.iter()
    }

    /// Definitions in configuration order.
    pub fn definitions(&self) -> Vec<TableDefinition> {
        self.tables.iter().map(|t| t.definition.clone()).collect()
    }

    /// Structural fingerprint of the registered tables.
    pub fn fingerprint(&self) -> Result<String, ConfigError> {
        tables_fingerprint(&self.definitions())
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use itemstore_protocol::{Document, ValidationError};
    use serde_json::json;

    fn tables() -> Vec<TableDefinition> {
        vec![
            TableDefinition::new("orders", "orderId", "^[a-z0-9]+$")
                .with_range_key("lineId", "^line[0-9]+$")
                .with_index(IndexDefinition::new("by_customer", "customerId")),
            TableDefinition::new("items", "itemId", "^.*$"),
        ]
    }

    #[test]
    fn test_registry_lookup() {
        let registry = TableRegistry::new(tables()).unwrap();
        assert_eq!(registry.len(), 2);

        let orders = registry.table("orders").unwrap();
        assert!(orders.pk_pattern().is_match("order1"));
        assert!(orders.rk_pattern().unwrap().is_match("line7"));
        assert!(orders.index("by_customer").is_some());
        assert!(orders.index("missing").is_none());

        assert!(registry.table("items").unwrap().rk_pattern().is_none());
        assert!(registry.table("nope").is_none());

        let names: Vec<&str> = registry.tables().map(TableHandle::name).collect();
        assert_eq!(names, vec!["orders", "items"]);
    }

    #[test]
    fn test_registry_rejects_invalid_tables() {
        let dup = vec![
            TableDefinition::new("items", "itemId", "^.*$"),
            TableDefinition::new("items", "itemId", "^.*$"),
        ];
        assert!(TableRegistry::new(dup).is_err());
    }

    #[test]
    fn test_validator_factory_per_table() {
        let registry = TableRegistry::with_validators(tables(), |table| {
            if table.name == "items" {
                let check = |doc: &Document| {
                    if doc.contains_key("name") {
                        Ok(())
                    } else {
                        Err(ValidationError::new("name is required"))
                    }
                };
                Ok(Arc::new(check) as Arc<dyn DocumentValidator>)
            } else {
                Ok(Arc::new(AcceptAll) as Arc<dyn DocumentValidator>)
            }
        })
        .unwrap();

        let empty = Document::new();
        let items = registry.table("items").unwrap();
        assert!(items.validator().validate(&empty).is_err());

        let named = match json!({"name": "x"}) {
            serde_json::Value::Object(map) => map,
            _ => unreachable!(),
        };
        assert!(items.validator().validate(&named).is_ok());
        assert!(registry
            .table("orders")
            .unwrap()
            .validator()
            .validate(&empty)
            .is_ok());
    }

    #[test]
    fn test_schema_registry_enforces_table_schema() {
        let tables = vec![TableDefinition::new("items", "itemId", "^[a-z]+$").with_schema(json!({
            "type": "object",
            "properties": {
                "itemId": { "type": "string", "pattern": "^[a-z]+$" },
                "price": { "type": "number" }
            },
            "required": ["price"]
        }))];
        let registry = TableRegistry::with_schemas(tables).unwrap();
        let items = registry.table("items").unwrap();

        let priced = match json!({"itemId": "lamp", "price": 12.5}) {
            serde_json::Value::Object(map) => map,
            _ => unreachable!(),
        };
        assert!(items.validator().validate(&priced).is_ok());
        assert!(items.validator().validate(&Document::new()).is_err());
    }

    #[test]
    fn test_fingerprint_matches_protocol() {
        let registry = TableRegistry::new(tables()).unwrap();
        assert_eq!(
            registry.fingerprint().unwrap(),
            tables_fingerprint(&tables()).unwrap()
        );
    }
}
