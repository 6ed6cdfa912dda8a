//! Execution seam for analytical queries against the GitHub event archive.

pub mod bigquery;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::stream::BoxStream;
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("query API error ({status}): {body}")]
    Api { status: u16, body: String },

    #[error("malformed query response: {0}")]
    Decode(String),

    #[error("query job {0} did not complete in time")]
    Incomplete(String),
}

/// One result row: column label -> scalar value (NULL as `None`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Row {
    columns: HashMap<String, Option<String>>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, column: &str, value: &str) -> Self {
        self.insert(column, Some(value.to_string()));
        self
    }

    pub fn insert(&mut self, column: &str, value: Option<String>) {
        self.columns.insert(column.to_string(), value);
    }

    pub fn get(&self, column: &str) -> Option<&str> {
        self.columns.get(column).and_then(|v| v.as_deref())
    }

    /// String column; NULL or absent decodes to "".
    pub fn text(&self, column: &str) -> String {
        self.get(column).unwrap_or_default().to_string()
    }

    /// Integer column; anything unparseable decodes to -1.
    pub fn int(&self, column: &str) -> i64 {
        self.get(column)
            .and_then(|v| v.trim().parse::<i64>().ok())
            .unwrap_or(-1)
    }

    /// RFC3339 timestamp column; unparseable values fall back to the Unix epoch.
    pub fn timestamp(&self, column: &str) -> DateTime<Utc> {
        let raw = self.get(column).unwrap_or_default();
        match DateTime::parse_from_rfc3339(raw) {
            Ok(ts) => ts.with_timezone(&Utc),
            Err(e) => {
                tracing::warn!(column, value = raw, error = %e, "unparseable timestamp");
                DateTime::<Utc>::UNIX_EPOCH
            }
        }
    }
}

/// Lazy, single-pass sequence of rows. Ends when the executor runs out of results.
pub type RowStream = BoxStream<'static, Result<Row, ExecutionError>>;

#[async_trait]
pub trait QueryExecutor: Send + Sync {
    async fn execute(&self, query: &str) -> Result<RowStream, ExecutionError>;
}
