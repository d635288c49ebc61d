//! Catalog descriptions returned by a connection.

use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;

use super::ids::Oid;

/// A result row. Cells are JSON values so rows serialize straight to clients.
pub type Row = Vec<serde_json::Value>;

/// Storage parameters of a relation, keyed by option name.
///
/// Toast options carry the `toast.` prefix, as in `pg_class.reloptions`.
pub type RelOptions = BTreeMap<String, String>;

/// Kind of a relation in the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationKind {
    Table,
    View,
    MaterializedView,
    ForeignTable,
}

impl RelationKind {
    /// Keyword used in DDL, e.g. `ALTER MATERIALIZED VIEW`.
    pub fn sql_keyword(&self) -> &'static str {
        match self {
            RelationKind::Table => "TABLE",
            RelationKind::View => "VIEW",
            RelationKind::MaterializedView => "MATERIALIZED VIEW",
            RelationKind::ForeignTable => "FOREIGN TABLE",
        }
    }

    /// Whether the relation kind accepts storage parameters.
    pub fn has_storage(&self) -> bool {
        matches!(self, RelationKind::Table | RelationKind::MaterializedView)
    }
}

impl fmt::Display for RelationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.sql_keyword().to_lowercase())
    }
}

/// Schema-qualified object name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QualifiedName {
    pub schema: String,
    pub name: String,
}

impl QualifiedName {
    pub fn new(schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for QualifiedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", quote_ident(&self.schema), quote_ident(&self.name))
    }
}

/// Quote an identifier unless it is a plain lower-case name.
pub fn quote_ident(ident: &str) -> Cow<'_, str> {
    let plain = !ident.is_empty()
        && ident
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_lowercase() || c == '_')
        && ident
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');

    if plain {
        Cow::Borrowed(ident)
    } else {
        Cow::Owned(format!("\"{}\"", ident.replace('"', "\"\"")))
    }
}

/// Quote a string literal.
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Column description.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub type_name: String,
    #[serde(default)]
    pub not_null: bool,
}

impl Column {
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
            not_null: false,
        }
    }

    /// Mark the column `NOT NULL`.
    pub fn not_null(mut self) -> Self {
        self.not_null = true;
        self
    }
}

/// Everything a session needs to know about a relation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationInfo {
    pub oid: Oid,
    pub schema_oid: Oid,
    pub name: QualifiedName,
    pub kind: RelationKind,
    pub columns: Vec<Column>,
    pub primary_key: Vec<String>,
    pub description: Option<String>,
    pub options: RelOptions,
}

impl RelationInfo {
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }
}

/// Trigger firing mode, stored as `pg_trigger.tgenabled`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TriggerMode {
    /// Fires in origin and local replication roles.
    #[serde(rename = "O")]
    Origin,
    #[serde(rename = "A")]
    Always,
    #[serde(rename = "R")]
    Replica,
    #[serde(rename = "D")]
    Disabled,
}

impl TriggerMode {
    /// The `ALTER TABLE ... <clause> TRIGGER` clause for this mode.
    pub fn sql_clause(&self) -> &'static str {
        match self {
            TriggerMode::Origin => "ENABLE",
            TriggerMode::Always => "ENABLE ALWAYS",
            TriggerMode::Replica => "ENABLE REPLICA",
            TriggerMode::Disabled => "DISABLE",
        }
    }
}

/// Trigger description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerInfo {
    pub oid: Oid,
    pub table_oid: Oid,
    pub name: String,
    pub table: QualifiedName,
    pub function: String,
    pub mode: TriggerMode,
    pub description: Option<String>,
}
