//! Shared model for itemstore.
//!
//! Everything here is pure data and pure functions: the table/index model and
//! its structural validation, the structural fingerprint used for drift
//! detection, and the document semantics (key separation, merge patch,
//! projection) that the storage and service layers build on.
//!
//! # Usage
//!
//! ```rust,ignore
//! use itemstore_protocol::{tables_fingerprint, TablesConfig};
//!
//! let config = TablesConfig::load("config.yaml")?;
//! let hash = tables_fingerprint(&config.tables)?;
//! ```

pub mod config;
pub mod document;
pub mod error;
pub mod fingerprint;
pub mod keys;
pub mod schema;
pub mod validator;

pub use config::{
    physical_index_name, validate_tables, IndexDefinition, KeyDefinition, Projection,
    ProjectionType, TableDefinition, TablesConfig,
};
pub use document::{
    apply_index_projection, index_key_fields, inject_keys, merge_patch, parse_fields_param,
    project_fields, strip_keys, Document,
};
pub use error::{ConfigError, KeyError, ValidationError};
pub use fingerprint::{minimal_structure, tables_fingerprint, MinimalTableStructure};
pub use keys::{validate_json_keys, validate_key_pattern, validate_key_value, MAX_KEY_VALUE_LENGTH};
pub use schema::SchemaValidator;
pub use validator::{AcceptAll, DocumentValidator};
