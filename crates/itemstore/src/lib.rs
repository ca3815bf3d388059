//! itemstore: DynamoDB-style document tables on SQLite.
//!
//! The library half wires the pieces together for request handling:
//!
//! - [`TableRegistry`]: immutable per-table lookup (definition, compiled key
//!   patterns, document validator, indexes) built once at startup
//! - [`ItemService`]: get / put / patch / delete and the four paginated read
//!   shapes, with key validation, key injection and projection
//!
//! Structural reconciliation and the drift check live on
//! [`itemstore_db::ItemDb`]; the table model lives in [`itemstore_protocol`].

pub mod registry;
pub mod service;

pub use registry::{TableHandle, TableRegistry};
pub use service::{ItemService, ServiceError};

pub use itemstore_db::{ItemDb, ListOptions, Page, RangeFilter, ReconcileOptions, ReconcilePlan};
pub use itemstore_protocol::{Document, TableDefinition, TablesConfig};
