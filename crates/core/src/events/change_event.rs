//! Row change event types.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::constants::DEFAULT_SCHEMA;

/// Kind of row mutation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

impl ChangeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeKind::Insert => "INSERT",
            ChangeKind::Update => "UPDATE",
            ChangeKind::Delete => "DELETE",
        }
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One row mutation reported by the backend.
///
/// Row payloads are opaque to the realtime layer; only filters look into
/// them, and only by column name.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub kind: ChangeKind,
    pub schema: String,
    pub table: String,
    /// Row after the change (inserts and updates).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new: Option<Value>,
    /// Row before the change (updates and deletes). Without replica identity
    /// FULL this carries only the primary key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit_timestamp: Option<DateTime<Utc>>,
}

impl ChangeEvent {
    /// Creates an event for a table in the default schema.
    pub fn new(kind: ChangeKind, table: impl Into<String>) -> Self {
        Self {
            kind,
            schema: DEFAULT_SCHEMA.to_string(),
            table: table.into(),
            new: None,
            old: None,
            commit_timestamp: None,
        }
    }

    /// Creates an INSERT event carrying the new row.
    pub fn insert(table: impl Into<String>, row: Value) -> Self {
        Self::new(ChangeKind::Insert, table).with_new(row)
    }

    /// Creates an UPDATE event carrying the new and old rows.
    pub fn update(table: impl Into<String>, new: Value, old: Value) -> Self {
        Self::new(ChangeKind::Update, table)
            .with_new(new)
            .with_old(old)
    }

    /// Creates a DELETE event carrying the old row.
    pub fn delete(table: impl Into<String>, old: Value) -> Self {
        Self::new(ChangeKind::Delete, table).with_old(old)
    }

    pub fn with_new(mut self, row: Value) -> Self {
        self.new = Some(row);
        self
    }

    pub fn with_old(mut self, row: Value) -> Self {
        self.old = Some(row);
        self
    }

    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = schema.into();
        self
    }

    pub fn with_commit_timestamp(mut self, ts: DateTime<Utc>) -> Self {
        self.commit_timestamp = Some(ts);
        self
    }

    /// The row a filter should look at: the old row for deletes, the new row
    /// otherwise.
    pub fn row(&self) -> Option<&Value> {
        match self.kind {
            ChangeKind::Delete => self.old.as_ref(),
            ChangeKind::Insert | ChangeKind::Update => self.new.as_ref(),
        }
    }

    /// Looks up a column on [`row`](Self::row). Empty objects (as sent for
    /// records the backend could not read) yield `None`.
    pub fn column(&self, name: &str) -> Option<&Value> {
        self.row()?.as_object()?.get(name)
    }
}
