//! Subscription filters.
//!
//! Row filters use the backend's `column=op.value` syntax so the same string
//! can be sent upstream and evaluated locally.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde_json::Value;

use super::{ChangeEvent, ChangeKind};
use crate::errors::FilterError;

/// Comparison operators supported by the realtime backend.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FilterOp {
    Eq,
    Neq,
    Lt,
    Lte,
    Gt,
    Gte,
    In,
}

impl FilterOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            FilterOp::Eq => "eq",
            FilterOp::Neq => "neq",
            FilterOp::Lt => "lt",
            FilterOp::Lte => "lte",
            FilterOp::Gt => "gt",
            FilterOp::Gte => "gte",
            FilterOp::In => "in",
        }
    }
}

impl FromStr for FilterOp {
    type Err = FilterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "eq" => Ok(FilterOp::Eq),
            "neq" => Ok(FilterOp::Neq),
            "lt" => Ok(FilterOp::Lt),
            "lte" => Ok(FilterOp::Lte),
            "gt" => Ok(FilterOp::Gt),
            "gte" => Ok(FilterOp::Gte),
            "in" => Ok(FilterOp::In),
            other => Err(FilterError::UnsupportedOperator(other.to_string())),
        }
    }
}

/// Column predicate, e.g. `event_type=eq.sale_closed` or `id=in.(1,2)`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RowFilter {
    column: String,
    op: FilterOp,
    values: Vec<String>,
}

impl RowFilter {
    pub fn eq(column: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            op: FilterOp::Eq,
            values: vec![value.into()],
        }
    }

    pub fn column(&self) -> &str {
        &self.column
    }

    pub fn op(&self) -> FilterOp {
        self.op
    }

    /// True if `event` satisfies this predicate.
    ///
    /// Deletes whose old row does not carry the column (the backend only
    /// ships primary keys unless replica identity is FULL) are let through:
    /// dropping them would leave caches stale.
    pub fn matches(&self, event: &ChangeEvent) -> bool {
        let Some(actual) = event.column(&self.column) else {
            return event.kind == ChangeKind::Delete;
        };
        let actual = value_to_text(actual);

        match self.op {
            FilterOp::Eq => actual == self.values[0],
            FilterOp::Neq => actual != self.values[0],
            FilterOp::In => self.values.iter().any(|v| *v == actual),
            FilterOp::Lt => compare(&actual, &self.values[0]) == Ordering::Less,
            FilterOp::Lte => compare(&actual, &self.values[0]) != Ordering::Greater,
            FilterOp::Gt => compare(&actual, &self.values[0]) == Ordering::Greater,
            FilterOp::Gte => compare(&actual, &self.values[0]) != Ordering::Less,
        }
    }
}

impl FromStr for RowFilter {
    type Err = FilterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (column, rest) = s
            .split_once('=')
            .ok_or_else(|| FilterError::Malformed(s.to_string()))?;
        let (op, raw_value) = rest
            .split_once('.')
            .ok_or_else(|| FilterError::Malformed(s.to_string()))?;

        let column = column.trim();
        if column.is_empty() {
            return Err(FilterError::EmptyColumn(s.to_string()));
        }
        let op: FilterOp = op.trim().parse()?;

        let values = if op == FilterOp::In {
            let inner = raw_value
                .strip_prefix('(')
                .and_then(|v| v.strip_suffix(')'))
                .ok_or_else(|| FilterError::InvalidList(raw_value.to_string()))?;
            inner
                .split(',')
                .map(|v| v.trim().trim_matches('"').to_string())
                .collect()
        } else {
            vec![raw_value.to_string()]
        };

        Ok(Self {
            column: column.to_string(),
            op,
            values,
        })
    }
}

impl fmt::Display for RowFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.op == FilterOp::In {
            write!(f, "{}=in.({})", self.column, self.values.join(","))
        } else {
            write!(f, "{}={}.{}", self.column, self.op.as_str(), self.values[0])
        }
    }
}

/// Which events a subscription receives: an optional kind and an optional
/// row predicate. The default accepts everything (`*`).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EventFilter {
    pub kind: Option<ChangeKind>,
    pub row: Option<RowFilter>,
}

impl EventFilter {
    /// Accepts every event on the table.
    pub fn all() -> Self {
        Self::default()
    }

    /// Accepts only events of `kind`.
    pub fn kind(kind: ChangeKind) -> Self {
        Self {
            kind: Some(kind),
            row: None,
        }
    }

    pub fn with_row(mut self, row: RowFilter) -> Self {
        self.row = Some(row);
        self
    }

    /// Wire name of the kind restriction: `*`, `INSERT`, `UPDATE` or `DELETE`.
    pub fn event_name(&self) -> &'static str {
        self.kind.map(|k| k.as_str()).unwrap_or("*")
    }

    pub fn matches(&self, event: &ChangeEvent) -> bool {
        if let Some(kind) = self.kind {
            if kind != event.kind {
                return false;
            }
        }
        self.row.as_ref().map_or(true, |row| row.matches(event))
    }
}

fn value_to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "null".to_string(),
        other => other.to_string(),
    }
}

/// Numeric comparison when both sides parse as numbers, lexical otherwise
/// (which orders ISO-8601 timestamps correctly).
fn compare(actual: &str, expected: &str) -> Ordering {
    match (actual.parse::<f64>(), expected.parse::<f64>()) {
        (Ok(a), Ok(b)) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
        _ => actual.cmp(expected),
    }
}
