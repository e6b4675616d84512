//! Forward-only row cursor over a running query.

use super::handle::{map_query_error, Pool};
use super::Value;
use crate::error::{QueryError, Result};
use async_stream::try_stream;
use futures::stream::{BoxStream, Stream};
use futures::TryStreamExt;
use sqlx::encode::Encode;
use sqlx::postgres::{PgPool, PgRow, Postgres};
use sqlx::sqlite::{Sqlite, SqlitePool, SqliteRow};
use sqlx::{Arguments, Row as SqlxRow, Type};
use std::fmt;
use std::sync::Arc;

/// A raw result row from one of the supported backends.
pub enum DbRow {
    Postgres(PgRow),
    Sqlite(SqliteRow),
}

impl fmt::Debug for DbRow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (backend, columns) = match self {
            Self::Postgres(row) => ("postgres", row.len()),
            Self::Sqlite(row) => ("sqlite", row.len()),
        };
        f.debug_struct("DbRow")
            .field("backend", &backend)
            .field("columns", &columns)
            .finish()
    }
}

/// An open result set: its column names and the stream of remaining rows.
///
/// Dropping the cursor ends the query and returns its connection to the pool.
pub struct RowCursor {
    columns: Arc<[String]>,
    rows: BoxStream<'static, Result<DbRow>>,
    peeked: Option<DbRow>,
}

impl RowCursor {
    /// Starts `rows` and waits for its first row, so a query that fails while
    /// executing fails here rather than on the first fetch.
    pub(crate) async fn start(
        columns: Arc<[String]>,
        mut rows: BoxStream<'static, Result<DbRow>>,
    ) -> Result<Self> {
        let peeked = rows.try_next().await?;
        Ok(Self {
            columns,
            rows,
            peeked,
        })
    }

    /// Column names in result order.
    pub fn columns(&self) -> Arc<[String]> {
        Arc::clone(&self.columns)
    }

    /// Advances to the next row, or `None` once the result set is drained.
    pub async fn next_row(&mut self) -> Result<Option<DbRow>> {
        if let Some(row) = self.peeked.take() {
            return Ok(Some(row));
        }
        self.rows.try_next().await
    }
}

impl fmt::Debug for RowCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RowCursor")
            .field("columns", &self.columns)
            .field("peeked", &self.peeked.is_some())
            .finish_non_exhaustive()
    }
}

/// Streams the rows of `sql`, owning everything the driver stream borrows.
pub(crate) fn row_stream(
    pool: Pool,
    sql: String,
    params: Vec<Value>,
) -> BoxStream<'static, Result<DbRow>> {
    match pool {
        Pool::Postgres(pool) => Box::pin(postgres_rows(pool, sql, params)),
        Pool::Sqlite(pool) => Box::pin(sqlite_rows(pool, sql, params)),
    }
}

fn postgres_rows(
    pool: PgPool,
    sql: String,
    params: Vec<Value>,
) -> impl Stream<Item = Result<DbRow>> + Send + 'static {
    try_stream! {
        let args = bind_params::<Postgres>(&params)?;
        let mut rows = sqlx::query_with(sql.as_str(), args).fetch(&pool);
        while let Some(row) = rows.try_next().await.map_err(map_query_error)? {
            yield DbRow::Postgres(row);
        }
    }
}

fn sqlite_rows(
    pool: SqlitePool,
    sql: String,
    params: Vec<Value>,
) -> impl Stream<Item = Result<DbRow>> + Send + 'static {
    try_stream! {
        let args = bind_params::<Sqlite>(&params)?;
        let mut rows = sqlx::query_with(sql.as_str(), args).fetch(&pool);
        while let Some(row) = rows.try_next().await.map_err(map_query_error)? {
            yield DbRow::Sqlite(row);
        }
    }
}

/// Encodes positional parameters for `DB`.
///
/// UUID and JSON values are bound as text.
pub(crate) fn bind_params<'q, DB>(params: &[Value]) -> Result<DB::Arguments<'q>>
where
    DB: sqlx::Database,
    Option<String>: Encode<'q, DB> + Type<DB>,
    bool: Encode<'q, DB> + Type<DB>,
    i64: Encode<'q, DB> + Type<DB>,
    f64: Encode<'q, DB> + Type<DB>,
    String: Encode<'q, DB> + Type<DB>,
    Vec<u8>: Encode<'q, DB> + Type<DB>,
{
    let mut args: DB::Arguments<'q> = Default::default();

    for (position, value) in params.iter().enumerate() {
        let bound = match value {
            Value::Null => args.add(None::<String>),
            Value::Bool(b) => args.add(*b),
            Value::Int(i) => args.add(*i),
            Value::Float(f) => args.add(*f),
            Value::String(s) => args.add(s.clone()),
            Value::Bytes(b) => args.add(b.clone()),
            Value::Uuid(id) => args.add(id.to_string()),
            Value::Json(json) => args.add(json.to_string()),
        };
        bound.map_err(|e| {
            QueryError::execution(format!("Failed to bind parameter {}: {e}", position + 1))
        })?;
    }

    Ok(args)
}
