//! SQL text helpers.
//!
//! Table, index and field names reaching this module have already passed the
//! configuration grammars, so quoting here guards only against the quote
//! characters themselves.

/// Quote an identifier for SQLite (`"name"`).
pub(crate) fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Quote a string literal for SQLite (`'text'`).
pub(crate) fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Text value of a top-level document field, or NULL when absent or null.
///
/// Index definitions and index queries must use the identical expression so
/// the planner can match them.
pub(crate) fn field_expr(field: &str) -> String {
    let path = format!("$.\"{}\"", field.replace('"', "\\\""));
    format!("CAST(json_extract(data, {}) AS TEXT)", quote_literal(&path))
}
