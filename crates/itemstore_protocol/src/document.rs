//! Document semantics shared by the storage and service layers.
//!
//! A document is a JSON object. Stored payloads never carry the table key
//! fields: they are stripped before a write and injected back on every read.

use crate::config::{IndexDefinition, ProjectionType, TableDefinition};
use serde_json::{Map, Value};
use std::collections::HashSet;

/// A JSON object document.
pub type Document = Map<String, Value>;

/// Copy of `doc` without the table key fields.
pub fn strip_keys(doc: &Document, pk_field: &str, rk_field: Option<&str>) -> Document {
    doc.iter()
        .filter(|(k, _)| k.as_str() != pk_field && Some(k.as_str()) != rk_field)
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

/// Write the physical key values back under the configured field names.
pub fn inject_keys(
    mut doc: Document,
    pk_field: &str,
    pk: &str,
    range: Option<(&str, &str)>,
) -> Document {
    doc.insert(pk_field.to_string(), Value::String(pk.to_string()));
    if let Some((rk_field, rk)) = range {
        doc.insert(rk_field.to_string(), Value::String(rk.to_string()));
    }
    doc
}

/// Apply an RFC 7396 merge patch to `target` in place.
///
/// `null` removes the key, an object merges into an existing object at the
/// same key (or into an empty one), anything else replaces wholesale.
pub fn merge_patch(target: &mut Document, patch: &Document) {
    for (key, patch_value) in patch {
        match patch_value {
            Value::Null => {
                target.remove(key);
            }
            Value::Object(patch_obj) => {
                let entry = target
                    .entry(key.clone())
                    .or_insert_with(|| Value::Object(Map::new()));
                if !entry.is_object() {
                    *entry = Value::Object(Map::new());
                }
                if let Value::Object(target_obj) = entry {
                    merge_patch(target_obj, patch_obj);
                }
            }
            other => {
                target.insert(key.clone(), other.clone());
            }
        }
    }
}

/// Keep only `fields` plus the always-retained fields. An empty selection
/// returns the document unchanged.
pub fn project_fields(doc: Document, fields: &[String], always: &[&str]) -> Document {
    if fields.is_empty() {
        return doc;
    }
    let allowed: HashSet<&str> = fields
        .iter()
        .map(String::as_str)
        .chain(always.iter().copied())
        .collect();
    doc.into_iter()
        .filter(|(k, _)| allowed.contains(k.as_str()))
        .collect()
}

/// Split a comma-separated field selection, trimming blanks.
pub fn parse_fields_param(param: &str) -> Vec<String> {
    param
        .split(',')
        .map(str::trim)
        .filter(|f| !f.is_empty())
        .map(str::to_string)
        .collect()
}

/// Key fields an index read always returns: table keys then index keys.
pub fn index_key_fields<'a>(table: &'a TableDefinition, index: &'a IndexDefinition) -> Vec<&'a str> {
    let mut fields = table.key_fields();
    fields.extend(index.key_fields());
    fields
}

/// Apply an index's declared projection to a document that already has its
/// table keys injected.
pub fn apply_index_projection(
    doc: Document,
    table: &TableDefinition,
    index: &IndexDefinition,
) -> Document {
    let keys = index_key_fields(table, index);
    match index.projection_type() {
        ProjectionType::All => doc,
        ProjectionType::KeysOnly => doc
            .into_iter()
            .filter(|(k, _)| keys.contains(&k.as_str()))
            .collect(),
        ProjectionType::Include => {
            let attributes = index
                .projection
                .as_ref()
                .map(|p| p.non_key_attributes.as_slice())
                .unwrap_or_default();
            doc.into_iter()
                .filter(|(k, _)| {
                    keys.contains(&k.as_str()) || attributes.iter().any(|a| a == k)
                })
                .collect()
        }
    }
}
