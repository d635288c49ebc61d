//! Structured SELECT statements.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::catalog::{QualifiedName, quote_ident, quote_literal};
use super::ids::Oid;

/// Comparison operator in a row filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    IsNull,
    IsNotNull,
}

impl Operator {
    /// Whether the operator compares against a value.
    pub fn takes_value(&self) -> bool {
        !matches!(self, Operator::IsNull | Operator::IsNotNull)
    }

    fn sql(&self) -> &'static str {
        match self {
            Operator::Eq => "=",
            Operator::Ne => "<>",
            Operator::Lt => "<",
            Operator::Le => "<=",
            Operator::Gt => ">",
            Operator::Ge => ">=",
            Operator::IsNull => "IS NULL",
            Operator::IsNotNull => "IS NOT NULL",
        }
    }
}

/// A single `column <op> value` condition. Conditions are AND-ed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Predicate {
    pub column: String,
    pub operator: Operator,
    #[serde(default)]
    pub value: serde_json::Value,
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let column = quote_ident(&self.column);
        if self.operator.takes_value() {
            write!(f, "{} {} {}", column, self.operator.sql(), sql_value(&self.value))
        } else {
            write!(f, "{} {}", column, self.operator.sql())
        }
    }
}

/// Sort key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderBy {
    pub column: String,
    #[serde(default)]
    pub descending: bool,
}

impl OrderBy {
    pub fn asc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            descending: false,
        }
    }

    pub fn desc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            descending: true,
        }
    }
}

/// `SELECT * FROM relation [WHERE ...] [ORDER BY ...] [LIMIT n]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectQuery {
    pub relation_oid: Oid,
    pub relation: QualifiedName,
    #[serde(default)]
    pub filter: Vec<Predicate>,
    #[serde(default)]
    pub order_by: Vec<OrderBy>,
    #[serde(default)]
    pub limit: Option<usize>,
}

impl SelectQuery {
    pub fn new(relation_oid: Oid, relation: QualifiedName) -> Self {
        Self {
            relation_oid,
            relation,
            filter: Vec::new(),
            order_by: Vec::new(),
            limit: None,
        }
    }

    pub fn with_filter(mut self, filter: Vec<Predicate>) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_order(mut self, order_by: Vec<OrderBy>) -> Self {
        self.order_by = order_by;
        self
    }

    pub fn with_limit(mut self, limit: Option<usize>) -> Self {
        self.limit = limit;
        self
    }
}

impl fmt::Display for SelectQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SELECT * FROM {}", self.relation)?;

        for (i, predicate) in self.filter.iter().enumerate() {
            let keyword = if i == 0 { "WHERE" } else { "AND" };
            write!(f, " {} {}", keyword, predicate)?;
        }

        if !self.order_by.is_empty() {
            let keys: Vec<String> = self
                .order_by
                .iter()
                .map(|o| {
                    let dir = if o.descending { "DESC" } else { "ASC" };
                    format!("{} {}", quote_ident(&o.column), dir)
                })
                .collect();
            write!(f, " ORDER BY {}", keys.join(", "))?;
        }

        if let Some(limit) = self.limit {
            write!(f, " LIMIT {}", limit)?;
        }

        Ok(())
    }
}

/// Render a JSON value as an SQL literal.
pub(crate) fn sql_value(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Null => "NULL".to_string(),
        serde_json::Value::Bool(b) => b.to_string(),
        serde_json::Value::Number(n) => n.to_string(),
        serde_json::Value::String(s) => quote_literal(s),
        other => quote_literal(&other.to_string()),
    }
}
