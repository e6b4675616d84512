//! Relational database handle.
//!
//! Provides the `Database` struct, a thin wrapper around a PostgreSQL or SQLite
//! connection pool that opens raw row cursors and runs eager execute-and-scan
//! queries.

use super::cursor::{bind_params, row_stream, RowCursor};
use super::{DatabaseBackend, FromDbRow, Value};
use crate::config::ConnectionConfig;
use crate::error::{QueryError, Result};
use sqlx::postgres::{PgPool, PgPoolOptions, Postgres};
use sqlx::sqlite::{Sqlite, SqlitePool, SqlitePoolOptions};
use sqlx::{Column, Executor, Statement};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Maximum number of connection retry attempts.
const MAX_RETRY_ATTEMPTS: u32 = 3;

/// Base delay between retry attempts (doubles each retry).
const RETRY_BASE_DELAY_MS: u64 = 500;

/// Backend-specific connection pool.
#[derive(Debug, Clone)]
pub(crate) enum Pool {
    Postgres(PgPool),
    Sqlite(SqlitePool),
}

/// Database handle shared by query runners.
///
/// Cloning is cheap; clones share the same pool.
#[derive(Debug, Clone)]
pub struct Database {
    pool: Pool,
}

impl Database {
    /// Connects a pool using the given configuration, retrying transient failures.
    ///
    /// The backend is taken from the connection string's scheme.
    pub async fn connect(config: &ConnectionConfig) -> Result<Self> {
        let conn_str = config.to_connection_string()?;
        let backend = DatabaseBackend::from_url(&conn_str).ok_or_else(|| {
            QueryError::config(format!("Unsupported connection string '{conn_str}'"))
        })?;

        let mut last_error = None;
        let mut delay = Duration::from_millis(RETRY_BASE_DELAY_MS);

        for attempt in 1..=MAX_RETRY_ATTEMPTS {
            debug!(
                "Connection attempt {} of {} ({})",
                attempt,
                MAX_RETRY_ATTEMPTS,
                backend.as_str()
            );

            match connect_pool(backend, &conn_str, config).await {
                Ok(pool) => {
                    debug!("Successfully connected to database");
                    return Ok(Self { pool });
                }
                Err(e) => {
                    let retry = attempt < MAX_RETRY_ATTEMPTS && is_transient_error(&e);
                    last_error = Some(e);

                    if !retry {
                        break;
                    }
                    warn!(
                        "Connection attempt {} failed (transient error), retrying in {:?}",
                        attempt, delay
                    );
                    tokio::time::sleep(delay).await;
                    delay *= 2; // Exponential backoff
                }
            }
        }

        Err(match last_error {
            Some(e) => map_connection_error(e, config),
            None => QueryError::connection("No connection attempt was made"),
        })
    }

    /// The backend this handle talks to.
    pub fn backend(&self) -> DatabaseBackend {
        match self.pool {
            Pool::Postgres(_) => DatabaseBackend::Postgres,
            Pool::Sqlite(_) => DatabaseBackend::Sqlite,
        }
    }

    /// Executes `sql` and returns a cursor over its rows.
    ///
    /// The statement is prepared first so the column list is known even when the
    /// result set turns out to be empty. The query has started executing by the
    /// time this returns.
    pub async fn open_cursor(&self, sql: &str, params: &[Value]) -> Result<RowCursor> {
        let columns = match &self.pool {
            Pool::Postgres(pool) => {
                let statement = pool.prepare(sql).await.map_err(map_query_error)?;
                column_names(statement.columns())
            }
            Pool::Sqlite(pool) => {
                let statement = pool.prepare(sql).await.map_err(map_query_error)?;
                column_names(statement.columns())
            }
        };

        debug!(columns = columns.len(), "Opening row cursor");

        let rows = row_stream(self.pool.clone(), sql.to_string(), params.to_vec());
        RowCursor::start(columns, rows).await
    }

    /// Executes `sql` and decodes the whole result set with `FromRow`.
    pub async fn fetch_all_as<T: FromDbRow>(&self, sql: &str, params: &[Value]) -> Result<Vec<T>> {
        let rows = match &self.pool {
            Pool::Postgres(pool) => {
                sqlx::query_as_with::<_, T, _>(sql, bind_params::<Postgres>(params)?)
                    .fetch_all(pool)
                    .await
            }
            Pool::Sqlite(pool) => {
                sqlx::query_as_with::<_, T, _>(sql, bind_params::<Sqlite>(params)?)
                    .fetch_all(pool)
                    .await
            }
        };
        rows.map_err(map_query_error)
    }

    /// Executes a statement that returns no rows and reports how many rows it changed.
    pub async fn execute(&self, sql: &str, params: &[Value]) -> Result<u64> {
        let affected = match &self.pool {
            Pool::Postgres(pool) => sqlx::query_with(sql, bind_params::<Postgres>(params)?)
                .execute(pool)
                .await
                .map(|done| done.rows_affected()),
            Pool::Sqlite(pool) => sqlx::query_with(sql, bind_params::<Sqlite>(params)?)
                .execute(pool)
                .await
                .map(|done| done.rows_affected()),
        };
        affected.map_err(map_query_error)
    }

    /// Closes the pool, waiting for checked-out connections to be returned.
    pub async fn close(&self) {
        match &self.pool {
            Pool::Postgres(pool) => pool.close().await,
            Pool::Sqlite(pool) => pool.close().await,
        }
    }
}

impl From<PgPool> for Database {
    fn from(pool: PgPool) -> Self {
        Self {
            pool: Pool::Postgres(pool),
        }
    }
}

impl From<SqlitePool> for Database {
    fn from(pool: SqlitePool) -> Self {
        Self {
            pool: Pool::Sqlite(pool),
        }
    }
}

async fn connect_pool(
    backend: DatabaseBackend,
    conn_str: &str,
    config: &ConnectionConfig,
) -> std::result::Result<Pool, sqlx::Error> {
    let acquire_timeout = Duration::from_secs(config.acquire_timeout_secs);
    match backend {
        DatabaseBackend::Postgres => PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(acquire_timeout)
            .connect(conn_str)
            .await
            .map(Pool::Postgres),
        DatabaseBackend::Sqlite => SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(acquire_timeout)
            .connect(conn_str)
            .await
            .map(Pool::Sqlite),
    }
}

fn column_names<C: Column>(columns: &[C]) -> Arc<[String]> {
    columns.iter().map(|col| col.name().to_string()).collect()
}

/// Classifies a query-time driver error.
pub(crate) fn map_query_error(error: sqlx::Error) -> QueryError {
    match error {
        e @ (sqlx::Error::ColumnDecode { .. }
        | sqlx::Error::ColumnNotFound(_)
        | sqlx::Error::Decode(_)) => QueryError::decode(e.to_string()),
        e => QueryError::execution(format_query_error(e)),
    }
}

/// Determines if an error is transient and worth retrying.
fn is_transient_error(error: &sqlx::Error) -> bool {
    let error_str = error.to_string().to_lowercase();

    // Connection refused or timeout are often transient
    if error_str.contains("connection refused")
        || error_str.contains("timed out")
        || error_str.contains("timeout")
        || error_str.contains("temporarily unavailable")
        || error_str.contains("connection reset")
        || error_str.contains("broken pipe")
    {
        return true;
    }

    // Authentication, missing databases and bad URLs are not transient
    false
}

/// Maps sqlx connection errors to user-friendly messages.
fn map_connection_error(error: sqlx::Error, config: &ConnectionConfig) -> QueryError {
    let target = config.display_string();
    let user = config.user.as_deref().unwrap_or("unknown");
    let database = config.database.as_deref().unwrap_or("unknown");

    let error_str = error.to_string().to_lowercase();

    if error_str.contains("connection refused") || error_str.contains("could not connect") {
        QueryError::connection(format!(
            "Cannot connect to {target}. Check that the server is running."
        ))
    } else if error_str.contains("password authentication failed")
        || error_str.contains("authentication failed")
    {
        QueryError::connection(format!(
            "Authentication failed for user '{user}'. Check your credentials."
        ))
    } else if error_str.contains("does not exist") && error_str.contains("database") {
        QueryError::connection(format!("Database '{database}' does not exist."))
    } else if error_str.contains("ssl") || error_str.contains("tls") {
        QueryError::connection(
            "Server requires SSL. Add '?sslmode=require' to connection string.".to_string(),
        )
    } else if error_str.contains("timed out") || error_str.contains("timeout") {
        QueryError::connection(format!(
            "Connection to {target} timed out. The server may be overloaded or unreachable."
        ))
    } else {
        QueryError::connection(error.to_string())
    }
}

/// Formats a query error with PostgreSQL detail fields when available.
fn format_query_error(error: sqlx::Error) -> String {
    let Some(db_error) = error.as_database_error() else {
        return error.to_string();
    };

    let mut result = String::from("ERROR: ");
    result.push_str(db_error.message());

    if let Some(pg_error) = db_error.try_downcast_ref::<sqlx::postgres::PgDatabaseError>() {
        let fields = [
            ("DETAIL", pg_error.detail()),
            ("HINT", pg_error.hint()),
            ("TABLE", pg_error.table()),
            ("COLUMN", pg_error.column()),
            ("CONSTRAINT", pg_error.constraint()),
        ];
        for (label, value) in fields {
            if let Some(value) = value {
                result.push_str(&format!("\n  {label}: {value}"));
            }
        }
    }

    result
}
