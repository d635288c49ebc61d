//! Row filtering and ordering for the in-memory backend.

use serde_json::Value;
use std::cmp::Ordering;

use crate::types::{Column, Error, Operator, Predicate, Result, Row, SelectQuery};

/// A query resolved against a column list.
#[derive(Debug)]
pub(crate) struct Plan {
    filter: Vec<(usize, Predicate)>,
    order: Vec<(usize, bool)>,
    limit: Option<usize>,
}

impl Plan {
    /// Resolve column names. Fails on the first unknown column.
    pub(crate) fn new(columns: &[Column], query: &SelectQuery) -> Result<Self> {
        let position = |name: &str| {
            columns
                .iter()
                .position(|c| c.name == name)
                .ok_or_else(|| Error::UndefinedColumn(name.to_string()))
        };

        let filter = query
            .filter
            .iter()
            .map(|p| Ok((position(&p.column)?, p.clone())))
            .collect::<Result<Vec<_>>>()?;

        let order = query
            .order_by
            .iter()
            .map(|o| Ok((position(&o.column)?, o.descending)))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            filter,
            order,
            limit: query.limit,
        })
    }

    /// Filter, sort and truncate `rows`.
    pub(crate) fn apply(&self, rows: Vec<Row>) -> Vec<Row> {
        let mut rows: Vec<Row> = rows.into_iter().filter(|row| self.matches(row)).collect();

        if !self.order.is_empty() {
            rows.sort_by(|a, b| {
                for &(idx, descending) in &self.order {
                    let ord = sort_key_cmp(cell(a, idx), cell(b, idx));
                    let ord = if descending { ord.reverse() } else { ord };
                    if ord != Ordering::Equal {
                        return ord;
                    }
                }
                Ordering::Equal
            });
        }

        if let Some(limit) = self.limit {
            rows.truncate(limit);
        }
        rows
    }

    fn matches(&self, row: &Row) -> bool {
        self.filter.iter().all(|(idx, predicate)| {
            let value = cell(row, *idx);
            match predicate.operator {
                Operator::IsNull => value.is_null(),
                Operator::IsNotNull => !value.is_null(),
                op => match compare(value, &predicate.value) {
                    Some(ord) => match op {
                        Operator::Eq => ord == Ordering::Equal,
                        Operator::Ne => ord != Ordering::Equal,
                        Operator::Lt => ord == Ordering::Less,
                        Operator::Le => ord != Ordering::Greater,
                        Operator::Gt => ord == Ordering::Greater,
                        Operator::Ge => ord != Ordering::Less,
                        Operator::IsNull | Operator::IsNotNull => false,
                    },
                    // NULL or incomparable operands never match
                    None => false,
                },
            }
        })
    }
}

fn cell(row: &Row, idx: usize) -> &Value {
    row.get(idx).unwrap_or(&Value::Null)
}

/// SQL-style comparison used by filters: NULL compares to nothing, and a
/// numeric string is compared as a number.
fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Null, _) | (_, Value::Null) => None,
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::Number(x), Value::String(s)) => x.as_f64()?.partial_cmp(&s.trim().parse::<f64>().ok()?),
        (Value::String(s), Value::Number(y)) => s.trim().parse::<f64>().ok()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        (x, y) => Some(x.to_string().cmp(&y.to_string())),
    }
}

/// Sort rank of a JSON type: bool < number < string < array/object < null.
fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Bool(_) => 0,
        Value::Number(_) => 1,
        Value::String(_) => 2,
        Value::Array(_) | Value::Object(_) => 3,
        Value::Null => 4,
    }
}

/// Total order used for sorting; NULLs sort last and mixed types sort by
/// [`type_rank`].
fn sort_key_cmp(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => match (x.as_f64(), y.as_f64()) {
            (Some(x), Some(y)) => x.total_cmp(&y),
            _ => x.to_string().cmp(&y.to_string()),
        },
        (Value::String(x), Value::String(y)) => x.cmp(y),
        _ => type_rank(a)
            .cmp(&type_rank(b))
            .then_with(|| a.to_string().cmp(&b.to_string())),
    }
}
