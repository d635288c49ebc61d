//! Structured DDL statements.
//!
//! Statements carry object oids so a backend can apply them without parsing,
//! and names so they can be rendered as SQL.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::catalog::{QualifiedName, RelationKind, TriggerMode, quote_ident, quote_literal};
use super::ids::Oid;

/// Object a `COMMENT ON` statement targets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CommentTarget {
    Relation {
        oid: Oid,
        kind: RelationKind,
        name: QualifiedName,
    },
    Trigger {
        oid: Oid,
        name: String,
        table: QualifiedName,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Ddl {
    /// `COMMENT ON ... IS ...`; `None` removes the comment.
    Comment {
        target: CommentTarget,
        comment: Option<String>,
    },
    SetTriggerMode {
        trigger_oid: Oid,
        trigger: String,
        table: QualifiedName,
        mode: TriggerMode,
    },
    RenameTrigger {
        trigger_oid: Oid,
        table: QualifiedName,
        from: String,
        to: String,
    },
    /// `ALTER ... SET (name = value, ...)`
    SetOptions {
        relation_oid: Oid,
        kind: RelationKind,
        relation: QualifiedName,
        options: Vec<(String, String)>,
    },
    /// `ALTER ... RESET (name, ...)`
    ResetOptions {
        relation_oid: Oid,
        kind: RelationKind,
        relation: QualifiedName,
        options: Vec<String>,
    },
}

impl fmt::Display for Ddl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Ddl::Comment { target, comment } => {
                let value = comment
                    .as_deref()
                    .map(quote_literal)
                    .unwrap_or_else(|| "NULL".to_string());
                match target {
                    CommentTarget::Relation { kind, name, .. } => {
                        write!(f, "COMMENT ON {} {} IS {};", kind.sql_keyword(), name, value)
                    }
                    CommentTarget::Trigger { name, table, .. } => write!(
                        f,
                        "COMMENT ON TRIGGER {} ON {} IS {};",
                        quote_ident(name),
                        table,
                        value
                    ),
                }
            }
            Ddl::SetTriggerMode {
                trigger,
                table,
                mode,
                ..
            } => write!(
                f,
                "ALTER TABLE {} {} TRIGGER {};",
                table,
                mode.sql_clause(),
                quote_ident(trigger)
            ),
            Ddl::RenameTrigger { table, from, to, .. } => write!(
                f,
                "ALTER TRIGGER {} ON {} RENAME TO {};",
                quote_ident(from),
                table,
                quote_ident(to)
            ),
            Ddl::SetOptions {
                kind,
                relation,
                options,
                ..
            } => {
                let pairs: Vec<String> = options
                    .iter()
                    .map(|(name, value)| format!("{} = {}", name, value))
                    .collect();
                write!(
                    f,
                    "ALTER {} {} SET ({});",
                    kind.sql_keyword(),
                    relation,
                    pairs.join(", ")
                )
            }
            Ddl::ResetOptions {
                kind,
                relation,
                options,
                ..
            } => write!(
                f,
                "ALTER {} {} RESET ({});",
                kind.sql_keyword(),
                relation,
                options.join(", ")
            ),
        }
    }
}
