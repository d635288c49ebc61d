//! Session state and result types.

use db_driver::{Column, RelationInfo, Row};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Client-visible session key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransactionId(String);

impl TransactionId {
    /// Generate a fresh random id.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for TransactionId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for TransactionId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Execution state of a session.
///
/// The result summary lives inside the terminal variants, so a summary exists
/// exactly when the session has finished.
#[derive(Debug, Clone)]
pub enum QueryState {
    Initialized,
    Running,
    Completed(Arc<ResultSummary>),
    Failed(Arc<ResultSummary>),
}

impl QueryState {
    pub fn name(&self) -> &'static str {
        match self {
            QueryState::Initialized => "Initialized",
            QueryState::Running => "Running",
            QueryState::Completed(_) => "Completed",
            QueryState::Failed(_) => "Failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, QueryState::Completed(_) | QueryState::Failed(_))
    }

    pub fn summary(&self) -> Option<&Arc<ResultSummary>> {
        match self {
            QueryState::Completed(summary) | QueryState::Failed(summary) => Some(summary),
            QueryState::Initialized | QueryState::Running => None,
        }
    }
}

/// Column metadata sent with results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub name: String,
    pub type_name: String,
    pub not_null: bool,
    pub is_primary_key: bool,
}

impl ColumnInfo {
    pub fn describe(relation: &RelationInfo) -> Vec<ColumnInfo> {
        relation
            .columns
            .iter()
            .map(|c: &Column| ColumnInfo {
                name: c.name.clone(),
                type_name: c.type_name.clone(),
                not_null: c.not_null,
                is_primary_key: relation.primary_key.contains(&c.name),
            })
            .collect()
    }
}

/// Outcome of a finished execution.
#[derive(Debug)]
pub struct ResultSummary {
    /// `SELECT <n>` on success, the error message on failure
    pub status: String,
    pub columns: Vec<ColumnInfo>,
    pub primary_keys: Vec<String>,
    pub rows: Vec<Row>,
    pub elapsed: Duration,
}

impl ResultSummary {
    pub fn success(
        rows: Vec<Row>,
        columns: Vec<ColumnInfo>,
        primary_keys: Vec<String>,
        elapsed: Duration,
    ) -> Self {
        Self {
            status: format!("SELECT {}", rows.len()),
            columns,
            primary_keys,
            rows,
            elapsed,
        }
    }

    pub fn failure(message: String, elapsed: Duration) -> Self {
        Self {
            status: message,
            columns: Vec::new(),
            primary_keys: Vec::new(),
            rows: Vec::new(),
            elapsed,
        }
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Rows `[from, from + len)` clipped to the result.
    pub fn page(&self, from: usize, len: usize) -> RowPage {
        let start = from.min(self.rows.len());
        let end = from.saturating_add(len).min(self.rows.len());
        RowPage {
            rows: self.rows[start..end].to_vec(),
            fetched_from: start,
            fetched_to: end,
            has_more_rows: end < self.rows.len(),
        }
    }
}

/// A slice of a completed result. `fetched_from` is the zero-based index
/// of the first row, `fetched_to` the exclusive end.
#[derive(Debug, Clone, PartialEq)]
pub struct RowPage {
    pub rows: Vec<Row>,
    pub fetched_from: usize,
    pub fetched_to: usize,
    pub has_more_rows: bool,
}

/// What `poll` reports.
#[derive(Debug, Clone)]
pub struct PollStatus {
    pub state: QueryState,
    /// First page of a completed result
    pub page: Option<RowPage>,
}

impl PollStatus {
    /// Rows delivered to the client so far.
    pub fn rows_fetched_to(&self) -> usize {
        self.page.as_ref().map_or(0, |p| p.fetched_to)
    }
}
