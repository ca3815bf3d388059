//! Structural fingerprint of a table configuration.
//!
//! Only the parts of configuration that shape physical storage participate:
//! table names, index names and key field names. Patterns, schemas, scan
//! flags and projections are excluded, and tables/indexes are sorted by name
//! so that reordering the configuration file does not change the digest.

use crate::config::TableDefinition;
use crate::error::ConfigError;
use serde::Serialize;
use sha2::{Digest, Sha256};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MinimalKey {
    pub field: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MinimalIndex {
    pub name: String,
    pub primary_key: MinimalKey,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub range_key: Option<MinimalKey>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MinimalTable {
    pub name: String,
    pub primary_key: MinimalKey,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub range_key: Option<MinimalKey>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub indexes: Vec<MinimalIndex>,
}

/// Canonical storage-shaping subset of a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MinimalTableStructure {
    pub tables: Vec<MinimalTable>,
}

fn minimal_key(field: &str) -> MinimalKey {
    MinimalKey {
        field: field.to_string(),
    }
}

/// Extract and canonicalize the storage-shaping subset of `tables`.
pub fn minimal_structure(tables: &[TableDefinition]) -> MinimalTableStructure {
    let mut out: Vec<MinimalTable> = tables
        .iter()
        .map(|table| {
            let mut indexes: Vec<MinimalIndex> = table
                .indexes
                .iter()
                .map(|idx| MinimalIndex {
                    name: idx.name.clone(),
                    primary_key: minimal_key(idx.primary_key_field()),
                    range_key: idx.range_key_field().map(minimal_key),
                })
                .collect();
            indexes.sort_by(|a, b| a.name.cmp(&b.name));

            MinimalTable {
                name: table.name.clone(),
                primary_key: minimal_key(table.primary_key_field()),
                range_key: table.range_key_field().map(minimal_key),
                indexes,
            }
        })
        .collect();
    out.sort_by(|a, b| a.name.cmp(&b.name));

    MinimalTableStructure { tables: out }
}

/// SHA-256 (hex) over the canonical JSON of [`minimal_structure`].
pub fn tables_fingerprint(tables: &[TableDefinition]) -> Result<String, ConfigError> {
    let payload = serde_json::to_vec(&minimal_structure(tables))?;
    let mut hasher = Sha256::new();
    hasher.update(&payload);
    Ok(hex::encode(hasher.finalize()))
}
