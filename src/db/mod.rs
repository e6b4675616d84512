//! Database access layer for sqlrun.
//!
//! Wraps sqlx's PostgreSQL and SQLite drivers: a pooled handle that opens raw
//! row cursors, the value and row types rows are decoded into, and the generic
//! decode policy.

mod cursor;
mod decode;
mod handle;
mod types;

pub use cursor::{DbRow, RowCursor};
pub use decode::{decode_row, interpret_bytes, DecodeContext};
pub use handle::Database;
pub use types::{Row, Value};

use sqlx::postgres::PgRow;
use sqlx::sqlite::SqliteRow;
use sqlx::FromRow;

/// A struct that `FromRow` can build from a row of either backend.
///
/// `#[derive(sqlx::FromRow)]` satisfies this whenever every field type decodes
/// on both PostgreSQL and SQLite.
pub trait FromDbRow:
    for<'r> FromRow<'r, PgRow> + for<'r> FromRow<'r, SqliteRow> + Send + Unpin
{
}

impl<T> FromDbRow for T where
    T: for<'r> FromRow<'r, PgRow> + for<'r> FromRow<'r, SqliteRow> + Send + Unpin
{
}

/// Supported database backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseBackend {
    #[default]
    Postgres,
    Sqlite,
}

impl DatabaseBackend {
    /// Returns the backend as a string for display.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Postgres => "postgres",
            Self::Sqlite => "sqlite",
        }
    }

    /// Parses a backend from a string or URL scheme.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "postgres" | "postgresql" => Some(Self::Postgres),
            "sqlite" => Some(Self::Sqlite),
            _ => None,
        }
    }

    /// Detects the backend from a connection string's scheme.
    pub fn from_url(conn_str: &str) -> Option<Self> {
        let (scheme, _) = conn_str.split_once(':')?;
        Self::parse(scheme)
    }

    /// Returns the default port for this backend.
    pub fn default_port(&self) -> Option<u16> {
        match self {
            Self::Postgres => Some(5432),
            Self::Sqlite => None,
        }
    }

    /// Returns the URL scheme for this backend.
    pub fn url_scheme(&self) -> &'static str {
        match self {
            Self::Postgres => "postgres",
            Self::Sqlite => "sqlite",
        }
    }
}
