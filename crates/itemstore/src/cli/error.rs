//! Helpful error types for CLI commands
//!
//! Every error includes:
//! - What went wrong
//! - Context about the situation
//! - Suggestions for how to fix it

use itemstore::ServiceError;
use itemstore_db::DbError;
use std::fmt;
use std::path::Path;

/// An error with helpful context and suggestions
#[derive(Debug)]
pub struct HelpfulError {
    /// The main error message
    pub message: String,
    /// Additional context about what was happening
    pub context: Option<String>,
    /// Suggestions for how to fix the error
    pub suggestions: Vec<String>,
}

impl HelpfulError {
    /// Create a new helpful error
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            context: None,
            suggestions: Vec::new(),
        }
    }

    /// Add context to the error
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// Add a suggestion for fixing the error
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestions.push(suggestion.into());
        self
    }

    // === Common error constructors ===

    /// Config file missing or unreadable
    pub fn config_unreadable(path: &Path, reason: impl fmt::Display) -> Self {
        Self::new(format!("Cannot load config: {}", path.display()))
            .with_context(reason.to_string())
            .with_suggestion(format!("TRY: Check that the file exists: ls -la {}", path.display()))
            .with_suggestion("TRY: Point at another file with --config or ITEMSTORE_CONFIG")
    }

    /// Database could not be opened
    pub fn database_unavailable(path: &Path, reason: impl fmt::Display) -> Self {
        Self::new(format!("Cannot open database: {}", path.display()))
            .with_context(reason.to_string())
            .with_suggestion("TRY: Check directory permissions")
            .with_suggestion("TRY: Choose another location with --db or ITEMSTORE_DB")
    }

    /// Body argument is not a JSON object
    pub fn invalid_body(reason: impl fmt::Display) -> Self {
        Self::new("Request body must be a JSON object")
            .with_context(reason.to_string())
            .with_suggestion(r#"TRY: --data '{"name": "value"}'"#)
            .with_suggestion("TRY: --data @item.json   # read from a file")
            .with_suggestion("TRY: --data -            # read from stdin")
    }

    /// Startup drift check failed
    pub fn from_drift(err: &DbError) -> Self {
        let base = Self::new(err.to_string())
            .with_context("The database has not been reconciled against this configuration");
        let base = match err {
            DbError::ConfigHashMismatch { .. } => base
                .with_suggestion("TRY: itemstore migrate --dry-run   # preview the changes")
                .with_suggestion("TRY: itemstore migrate"),
            _ => base.with_suggestion("TRY: itemstore migrate"),
        };
        base.with_suggestion("TRY: --skip-config-validation   # serve anyway")
    }

    /// Reconciliation failed
    pub fn from_reconcile(err: &DbError) -> Self {
        match err {
            DbError::KeyFieldChanged { table, .. } => Self::new(err.to_string())
                .with_context("Key fields are fixed once a table exists; no changes were applied")
                .with_suggestion(format!(
                    "TRY: Restore the original key field for table {table:?}"
                ))
                .with_suggestion("TRY: Define a new table with the new key and copy items over"),
            DbError::Config(_) => Self::new(err.to_string())
                .with_context("No storage changes were attempted")
                .with_suggestion("TRY: itemstore validate"),
            _ => Self::new(format!("Migration failed: {err}"))
                .with_context("The migration was rolled back"),
        }
    }

    /// Item command failed
    pub fn from_service(err: &ServiceError) -> Self {
        let base = Self::new(err.to_string());
        match err {
            ServiceError::UnknownTable(_) | ServiceError::UnknownIndex { .. } => {
                base.with_suggestion("TRY: itemstore validate   # list configured tables")
            }
            ServiceError::NotPermitted(_) => base
                .with_context("The operation is disabled for this table or index")
                .with_suggestion("TRY: Set allowTableScan / allowIndexScan in the config"),
            ServiceError::KeyShape(_) => base.with_suggestion("TRY: Pass or drop --rk"),
            _ => base,
        }
    }
}

impl fmt::Display for HelpfulError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "ERROR: {}", self.message)?;

        if let Some(ctx) = &self.context {
            writeln!(f, "CONTEXT: {}", ctx)?;
        }

        if !self.suggestions.is_empty() {
            writeln!(f)?;
            for suggestion in &self.suggestions {
                writeln!(f, "  {}", suggestion)?;
            }
        }

        Ok(())
    }
}

impl std::error::Error for HelpfulError {}
