//! What a data-view session looks at and how.

use db_driver::{
    DatabaseRef, Oid, OrderBy, Predicate, RelationInfo, RelationKind, SelectQuery,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::error::SessionError;

/// Rows returned by the first/last-rows view modes.
pub const VIEW_ROWS_LIMIT: usize = 100;

/// Which rows of the target are shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewMode {
    /// First 100 rows by primary key
    FirstRows,
    /// Last 100 rows by primary key
    LastRows,
    AllRows,
    /// Rows matching a client supplied filter
    FilteredRows,
}

impl ViewMode {
    /// Decode the numeric mode used in URLs.
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(ViewMode::FirstRows),
            2 => Some(ViewMode::LastRows),
            3 => Some(ViewMode::AllRows),
            4 => Some(ViewMode::FilteredRows),
            _ => None,
        }
    }

    pub fn limit(&self) -> Option<usize> {
        match self {
            ViewMode::FirstRows | ViewMode::LastRows => Some(VIEW_ROWS_LIMIT),
            ViewMode::AllRows | ViewMode::FilteredRows => None,
        }
    }
}

/// Object kinds that can be opened in the data grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectKind {
    Table,
    View,
    #[serde(rename = "mview")]
    MaterializedView,
    ForeignTable,
}

impl ObjectKind {
    pub fn relation_kind(&self) -> RelationKind {
        match self {
            ObjectKind::Table => RelationKind::Table,
            ObjectKind::View => RelationKind::View,
            ObjectKind::MaterializedView => RelationKind::MaterializedView,
            ObjectKind::ForeignTable => RelationKind::ForeignTable,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectKind::Table => "table",
            ObjectKind::View => "view",
            ObjectKind::MaterializedView => "mview",
            ObjectKind::ForeignTable => "foreign_table",
        }
    }
}

impl FromStr for ObjectKind {
    type Err = SessionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "table" => Ok(ObjectKind::Table),
            "view" => Ok(ObjectKind::View),
            "mview" => Ok(ObjectKind::MaterializedView),
            "foreign_table" => Ok(ObjectKind::ForeignTable),
            other => Err(SessionError::InvalidTarget(format!(
                "unsupported object type \"{}\"",
                other
            ))),
        }
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Path to the object a session is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Target {
    pub database: DatabaseRef,
    pub object_id: Oid,
    pub kind: ObjectKind,
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}/{}", self.kind, self.database, self.object_id)
    }
}

/// Everything needed to initialize a session.
#[derive(Debug, Clone)]
pub struct ViewRequest {
    pub target: Target,
    pub mode: ViewMode,
    pub filter: Vec<Predicate>,
}

impl ViewRequest {
    pub fn new(target: Target, mode: ViewMode) -> Self {
        Self {
            target,
            mode,
            filter: Vec::new(),
        }
    }

    pub fn with_filter(mut self, filter: Vec<Predicate>) -> Self {
        self.filter = filter;
        self
    }

    /// Build the query for `relation`, validating the filter against its
    /// columns.
    pub fn build_query(&self, relation: &RelationInfo) -> Result<SelectQuery, SessionError> {
        match self.mode {
            ViewMode::FilteredRows if self.filter.is_empty() => {
                return Err(SessionError::InvalidFilter(
                    "filtered view requires at least one condition".to_string(),
                ));
            }
            ViewMode::FirstRows | ViewMode::LastRows | ViewMode::AllRows
                if !self.filter.is_empty() =>
            {
                return Err(SessionError::InvalidFilter(
                    "filter is only accepted for filtered view".to_string(),
                ));
            }
            _ => {}
        }

        if let Some(unknown) = self.filter.iter().find(|p| relation.column(&p.column).is_none()) {
            return Err(SessionError::InvalidFilter(format!(
                "column \"{}\" does not exist",
                unknown.column
            )));
        }

        // First/last rows sort by every column when there is no primary key.
        let keys: Vec<&str> = if relation.primary_key.is_empty() {
            relation.columns.iter().map(|c| c.name.as_str()).collect()
        } else {
            relation.primary_key.iter().map(String::as_str).collect()
        };
        let order = match self.mode {
            ViewMode::FirstRows => keys.into_iter().map(OrderBy::asc).collect(),
            ViewMode::LastRows => keys.into_iter().map(OrderBy::desc).collect(),
            ViewMode::AllRows | ViewMode::FilteredRows => relation
                .primary_key
                .iter()
                .map(|k| OrderBy::asc(k.as_str()))
                .collect(),
        };

        Ok(SelectQuery::new(relation.oid, relation.name.clone())
            .with_filter(self.filter.clone())
            .with_order(order)
            .with_limit(self.mode.limit()))
    }
}
