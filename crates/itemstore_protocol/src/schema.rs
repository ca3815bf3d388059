//! JSON Schema enforcement of a table's `schema`.

use crate::config::TableDefinition;
use crate::document::Document;
use crate::error::{ConfigError, ValidationError};
use crate::validator::DocumentValidator;
use serde_json::Value;
use std::fmt;

/// A table's compiled document schema.
pub struct SchemaValidator {
    table: String,
    validator: jsonschema::Validator,
}

impl fmt::Debug for SchemaValidator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchemaValidator")
            .field("table", &self.table)
            .finish_non_exhaustive()
    }
}

impl SchemaValidator {
    /// Compile `table.schema`. A schema that does not compile is a
    /// configuration error.
    pub fn compile(table: &TableDefinition) -> Result<Self, ConfigError> {
        let validator = compile_schema(&table.name, &table.schema)?;
        Ok(Self {
            table: table.name.clone(),
            validator,
        })
    }
}

pub(crate) fn compile_schema(
    table: &str,
    schema: &Value,
) -> Result<jsonschema::Validator, ConfigError> {
    jsonschema::validator_for(schema).map_err(|e| {
        ConfigError::invalid(format!("table {table:?}: schema does not compile: {e}"))
    })
}

impl DocumentValidator for SchemaValidator {
    fn validate(&self, document: &Document) -> Result<(), ValidationError> {
        let instance = Value::Object(document.clone());
        let violations: Vec<String> = self
            .validator
            .iter_errors(&instance)
            .map(|e| e.to_string())
            .collect();
        if violations.is_empty() {
            Ok(())
        } else {
            Err(ValidationError::new(violations.join("; ")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: Value) -> Document {
        match value {
            Value::Object(map) => map,
            other => panic!("expected object, got {other}"),
        }
    }

    fn items() -> TableDefinition {
        TableDefinition::new("items", "itemId", "^[a-z]+$").with_schema(json!({
            "type": "object",
            "properties": {
                "itemId": { "type": "string", "pattern": "^[a-z]+$" },
                "price": { "type": "number" }
            },
            "required": ["itemId", "price"]
        }))
    }

    #[test]
    fn test_conforming_document_passes() {
        let validator = SchemaValidator::compile(&items()).unwrap();
        validator
            .validate(&doc(json!({"itemId": "lamp", "price": 10})))
            .unwrap();
    }

    #[test]
    fn test_violations_are_reported() {
        let validator = SchemaValidator::compile(&items()).unwrap();
        let err = validator
            .validate(&doc(json!({"itemId": "lamp", "price": "cheap"})))
            .unwrap_err();
        assert!(err.message.contains("cheap"), "{}", err.message);

        assert!(validator.validate(&doc(json!({"itemId": "lamp"}))).is_err());
    }

    #[test]
    fn test_uncompilable_schema_is_a_config_error() {
        let table = TableDefinition::new("items", "itemId", ".*").with_schema(json!({
            "type": "object",
            "properties": { "name": { "type": "string", "pattern": "([" } }
        }));
        let err = SchemaValidator::compile(&table).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(ref msg) if msg.contains("does not compile")));
    }
}
