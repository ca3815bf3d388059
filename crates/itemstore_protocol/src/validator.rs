//! Seam for the document-schema validator.
//!
//! Callers register one validator per table, usually a
//! [`crate::SchemaValidator`] compiled from the table's `schema`. The write
//! path runs it on the complete document (keys included) before every put or
//! patch.

use crate::document::Document;
use crate::error::ValidationError;

pub trait DocumentValidator: Send + Sync {
    fn validate(&self, document: &Document) -> Result<(), ValidationError>;
}

/// Accepts every document. Used when no schema validator is wired in.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAll;

impl DocumentValidator for AcceptAll {
    fn validate(&self, _document: &Document) -> Result<(), ValidationError> {
        Ok(())
    }
}

impl<F> DocumentValidator for F
where
    F: Fn(&Document) -> Result<(), ValidationError> + Send + Sync,
{
    fn validate(&self, document: &Document) -> Result<(), ValidationError> {
        self(document)
    }
}
