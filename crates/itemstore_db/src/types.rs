//! Value types crossing the storage boundary.

use itemstore_protocol::Document;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Page size used when the caller gives none (or zero).
pub const DEFAULT_PAGE_LIMIT: usize = 50;
/// Larger requested limits are clamped to this.
pub const MAX_PAGE_LIMIT: usize = 1000;

// ============================================================================
// Item Types
// ============================================================================

/// A physical item row. `data` never contains the table key fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredItem {
    pub pk: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rk: Option<String>,
    pub data: Document,
    /// Unix millis
    pub created_at: i64,
    /// Unix millis
    pub updated_at: i64,
}

/// Range-key conditions. All set conditions must hold.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RangeFilter {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub begins_with: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gte: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lte: Option<String>,
}

impl RangeFilter {
    pub fn is_empty(&self) -> bool {
        self.begins_with.is_none()
            && self.gt.is_none()
            && self.gte.is_none()
            && self.lt.is_none()
            && self.lte.is_none()
    }

    /// Every set value, for key-rule validation by callers.
    pub fn values(&self) -> impl Iterator<Item = &str> {
        [&self.begins_with, &self.gt, &self.gte, &self.lt, &self.lte]
            .into_iter()
            .filter_map(|v| v.as_deref())
    }
}

/// Options shared by every paginated read.
#[derive(Debug, Clone, Default)]
pub struct ListOptions {
    /// `None` or `Some(0)` means [`DEFAULT_PAGE_LIMIT`]; values above
    /// [`MAX_PAGE_LIMIT`] are clamped.
    pub limit: Option<usize>,
    pub cursor: Option<String>,
    pub range: RangeFilter,
}

impl ListOptions {
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_cursor(mut self, cursor: impl Into<String>) -> Self {
        self.cursor = Some(cursor.into());
        self
    }

    pub fn with_range(mut self, range: RangeFilter) -> Self {
        self.range = range;
        self
    }

    pub fn effective_limit(&self) -> usize {
        match self.limit {
            None | Some(0) => DEFAULT_PAGE_LIMIT,
            Some(n) => n.min(MAX_PAGE_LIMIT),
        }
    }
}

/// One page of a read. No `next_cursor` means the sequence is complete.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub items: Vec<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
}

impl<T> Page<T> {
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            next_cursor: self.next_cursor,
        }
    }
}

// ============================================================================
// Reconciliation Types
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileOptions {
    /// Drop tables and indexes that are no longer configured.
    pub cleanup: bool,
    /// Compute the plan, apply nothing.
    pub dry_run: bool,
}

/// One structural change made (or, in dry-run, that would be made).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ReconcileAction {
    CreateTable { table: String },
    RecordTableMeta { table: String },
    CreateIndex { table: String, index: String },
    /// Existing index whose key expressions no longer match its definition.
    RebuildIndex { table: String, index: String },
    DropIndex { table: String, index: String },
    DropTable { table: String },
    StoreFingerprint { fingerprint: String },
}

impl fmt::Display for ReconcileAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReconcileAction::CreateTable { table } => write!(f, "create table {table:?}"),
            ReconcileAction::RecordTableMeta { table } => {
                write!(f, "insert _meta entry for table {table:?}")
            }
            ReconcileAction::CreateIndex { table, index } => {
                write!(f, "create index {index:?} on table {table:?}")
            }
            ReconcileAction::RebuildIndex { table, index } => {
                write!(f, "rebuild index {index:?} on table {table:?}")
            }
            ReconcileAction::DropIndex { table, index } => {
                write!(f, "drop index {index:?} from table {table:?}")
            }
            ReconcileAction::DropTable { table } => {
                write!(f, "drop table {table:?} and remove _meta entry")
            }
            ReconcileAction::StoreFingerprint { fingerprint } => {
                write!(f, "store config hash {fingerprint}")
            }
        }
    }
}

/// Result of a reconciliation run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcilePlan {
    pub actions: Vec<ReconcileAction>,
    pub fingerprint: String,
    /// True when nothing was committed.
    pub dry_run: bool,
}

impl ReconcilePlan {
    /// Actions other than the fingerprint upsert.
    pub fn structural_changes(&self) -> impl Iterator<Item = &ReconcileAction> {
        self.actions
            .iter()
            .filter(|a| !matches!(a, ReconcileAction::StoreFingerprint { .. }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_effective_limit() {
        assert_eq!(ListOptions::default().effective_limit(), DEFAULT_PAGE_LIMIT);
        assert_eq!(ListOptions::default().with_limit(0).effective_limit(), DEFAULT_PAGE_LIMIT);
        assert_eq!(ListOptions::default().with_limit(3).effective_limit(), 3);
        assert_eq!(
            ListOptions::default().with_limit(MAX_PAGE_LIMIT).effective_limit(),
            MAX_PAGE_LIMIT
        );
        assert_eq!(
            ListOptions::default().with_limit(usize::MAX).effective_limit(),
            MAX_PAGE_LIMIT
        );
    }

    #[test]
    fn test_page_serialization_omits_final_cursor() {
        let page: Page<i32> = Page {
            items: vec![1, 2],
            next_cursor: None,
        };
        assert_eq!(serde_json::to_value(&page).unwrap(), json!({"items": [1, 2]}));

        let page = Page {
            items: vec![1],
            next_cursor: Some("abc".to_string()),
        };
        assert_eq!(
            serde_json::to_value(&page).unwrap(),
            json!({"items": [1], "nextCursor": "abc"})
        );
    }

    #[test]
    fn test_range_filter_values() {
        let filter = RangeFilter {
            begins_with: Some("line".into()),
            lt: Some("z".into()),
            ..Default::default()
        };
        assert!(!filter.is_empty());
        assert_eq!(filter.values().collect::<Vec<_>>(), vec!["line", "z"]);
        assert!(RangeFilter::default().is_empty());
    }

    #[test]
    fn test_action_serialization() {
        let action = ReconcileAction::CreateIndex {
            table: "items".into(),
            index: "idx_items_by_status".into(),
        };
        assert_eq!(
            serde_json::to_value(&action).unwrap(),
            json!({"action": "create_index", "table": "items", "index": "idx_items_by_status"})
        );
        assert_eq!(
            action.to_string(),
            "create index \"idx_items_by_status\" on table \"items\""
        );
    }
}
