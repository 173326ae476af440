//! Table store abstraction shared by the local SQLite store and the remote
//! PostgREST store.

use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;

/// One row as the store sees it: column name to JSON value.
pub type Row = Map<String, Value>;

/// Message PostgREST returns when a unique-result fetch does not match exactly one row.
pub const NOT_SINGLE_MESSAGE: &str = "JSON object requested, multiple (or no) rows returned";

#[derive(Debug, Clone, Error, PartialEq)]
pub enum StoreError {
    #[error("{message}")]
    Remote {
        message: String,
        code: Option<String>,
    },
    #[error("JSON object requested, multiple (or no) rows returned")]
    NotSingle { rows: u64 },
}

impl StoreError {
    pub fn remote(message: impl Into<String>) -> Self {
        Self::Remote {
            message: message.into(),
            code: None,
        }
    }

    /// True when a unique-result fetch matched no rows at all.
    pub fn is_no_rows(&self) -> bool {
        matches!(self, Self::NotSingle { rows: 0 })
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        let code = e
            .as_database_error()
            .and_then(|db| db.code())
            .map(|c| c.into_owned());
        Self::Remote {
            message: e.to_string(),
            code,
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        Self::remote(e.to_string())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Eq(String, Value),
    /// Case-insensitive LIKE; `%` and `_` keep their SQL meaning.
    ILike(String, String),
}

impl Filter {
    pub fn eq(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Eq(column.into(), value.into())
    }

    pub fn ilike(column: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self::ILike(column.into(), pattern.into())
    }

    pub fn column(&self) -> &str {
        match self {
            Self::Eq(column, _) | Self::ILike(column, _) => column,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Order {
    pub column: String,
    pub ascending: bool,
}

/// A read against one table, built up the way a PostgREST query is chained:
/// `Select::all().order("created_at", false).range(0, 9).count_exact()`.
#[derive(Debug, Clone, PartialEq)]
pub struct Select {
    pub columns: String,
    pub filters: Vec<Filter>,
    pub order: Option<Order>,
    /// Zero-based, inclusive on both ends.
    pub range: Option<(u64, u64)>,
    pub count: bool,
    pub single: bool,
}

impl Default for Select {
    fn default() -> Self {
        Self::all()
    }
}

impl Select {
    pub fn all() -> Self {
        Self {
            columns: "*".to_string(),
            filters: Vec::new(),
            order: None,
            range: None,
            count: false,
            single: false,
        }
    }

    pub fn count_exact(mut self) -> Self {
        self.count = true;
        self
    }

    pub fn range(mut self, from: u64, to: u64) -> Self {
        self.range = Some((from, to));
        self
    }

    pub fn order(mut self, column: impl Into<String>, ascending: bool) -> Self {
        self.order = Some(Order {
            column: column.into(),
            ascending,
        });
        self
    }

    pub fn ilike(mut self, column: impl Into<String>, pattern: impl Into<String>) -> Self {
        self.filters.push(Filter::ilike(column, pattern));
        self
    }

    pub fn eq(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filters.push(Filter::eq(column, value));
        self
    }

    /// Require exactly one matching row; anything else fails with [`StoreError::NotSingle`].
    pub fn single(mut self) -> Self {
        self.single = true;
        self
    }
}

/// Rows returned by a select, plus the exact count when one was requested.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Selected {
    pub rows: Vec<Row>,
    pub count: Option<u64>,
}

#[async_trait]
pub trait TableStore: Send + Sync {
    async fn select(&self, table: &str, query: &Select) -> Result<Selected, StoreError>;

    /// Insert one row and return it as stored, including server-assigned fields.
    async fn insert(&self, table: &str, row: Row) -> Result<Row, StoreError>;

    /// Apply `patch` to every row matching `filters` and return the updated rows.
    async fn update(&self, table: &str, filters: &[Filter], patch: Row) -> Result<Vec<Row>, StoreError>;

    /// Remove every row matching `filters`; returns how many were removed.
    async fn delete(&self, table: &str, filters: &[Filter]) -> Result<u64, StoreError>;

    async fn count(&self, table: &str, filters: &[Filter]) -> Result<u64, StoreError> {
        let selected = self
            .select(table, &Select {
                filters: filters.to_vec(),
                count: true,
                range: Some((0, 0)),
                ..Select::all()
            })
            .await?;
        Ok(selected.count.unwrap_or(0))
    }
}

/// Table and column names end up in SQL text and URLs, so only plain identifiers are accepted.
pub fn validate_identifier(name: &str) -> Result<&str, StoreError> {
    let valid = !name.is_empty()
        && name.len() <= 63
        && name
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(name)
    } else {
        Err(StoreError::remote(format!("invalid identifier: {name:?}")))
    }
}
