//! The query runner.
//!
//! A `QueryRunner` owns one query (inline SQL or a file reference plus its bound
//! parameters) and at most one open cursor over its result. Resolving the query
//! text and opening the cursor each happen once; a failure in either is
//! latched and handed back unchanged on every later call.

use super::source::{FileSource, QueryOrigin, QuerySource};
use super::target::RowTarget;
use crate::db::{Database, DbRow, DecodeContext, FromDbRow, Row, RowCursor, Value};
use crate::error::{QueryError, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, warn};

/// State of the query text.
#[derive(Debug)]
enum Resolution {
    /// File not read yet.
    Pending(PathBuf),
    Ready(String),
    Failed(QueryError),
}

/// State of the result cursor.
#[derive(Debug)]
enum CursorState {
    /// Not opened yet.
    Pending,
    Open(RowCursor),
    /// Drained, or closed after `first` or an explicit `close`.
    Closed,
    Failed(QueryError),
}

/// Rows collected by [`QueryRunner::fetch_all`], with the error that stopped
/// collection, if any.
#[derive(Debug, Clone, PartialEq)]
pub struct Collected<T> {
    pub rows: Vec<T>,
    pub error: Option<QueryError>,
}

impl<T> Collected<T> {
    /// Returns the rows, or the terminal error if collection stopped early.
    pub fn into_result(self) -> Result<Vec<T>> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(self.rows),
        }
    }
}

/// Executes one query and exposes its result row by row, as a list, or as a
/// JSON stream.
///
/// Every stateful operation takes `&mut self`; a runner is used by one task at
/// a time.
pub struct QueryRunner {
    db: Database,
    origin: QueryOrigin,
    params: Vec<Value>,
    parse_bytes: bool,
    source: Arc<dyn QuerySource>,
    resolution: Resolution,
    cursor: CursorState,
    columns: Arc<[String]>,
    total: usize,
    last_error: Option<QueryError>,
}

impl QueryRunner {
    /// Creates a runner for literal SQL.
    pub fn new(db: Database, sql: impl Into<String>, params: Vec<Value>) -> Self {
        Self::with_state(db, QueryOrigin::Inline, Resolution::Ready(sql.into()), params)
    }

    /// Creates a runner whose SQL is read from `path` when first needed.
    pub fn from_file(db: Database, path: impl Into<PathBuf>, params: Vec<Value>) -> Self {
        let path = path.into();
        Self::with_state(
            db,
            QueryOrigin::File(path.clone()),
            Resolution::Pending(path),
            params,
        )
    }

    fn with_state(
        db: Database,
        origin: QueryOrigin,
        resolution: Resolution,
        params: Vec<Value>,
    ) -> Self {
        Self {
            db,
            origin,
            params,
            parse_bytes: false,
            source: Arc::new(FileSource::new()),
            resolution,
            cursor: CursorState::Pending,
            columns: Arc::from(Vec::new()),
            total: 0,
            last_error: None,
        }
    }

    /// Enables best-effort decoding of blob columns into UUID, number or JSON values.
    pub fn parse_bytes(mut self, enabled: bool) -> Self {
        self.parse_bytes = enabled;
        self
    }

    /// Replaces the source used to read query files.
    pub fn with_source(mut self, source: Arc<dyn QuerySource>) -> Self {
        self.source = source;
        self
    }

    /// Where this runner's SQL comes from.
    pub fn origin(&self) -> &QueryOrigin {
        &self.origin
    }

    /// Column names of the result, empty until the cursor has been opened.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Number of rows fetched so far through the cursor.
    pub fn total(&self) -> usize {
        self.total
    }

    /// The most recent error recorded by this runner.
    pub fn error(&self) -> Option<&QueryError> {
        self.last_error.as_ref()
    }

    /// Returns the query text, reading the query file on first call.
    ///
    /// The file is read at most once; a read failure is returned again on every
    /// later call without retrying.
    pub async fn resolve(&mut self) -> Result<&str> {
        if let Resolution::Pending(path) = &self.resolution {
            let resolved = match self.source.read_query(path).await {
                Ok(sql) => Resolution::Ready(sql),
                Err(err) => {
                    warn!(origin = %self.origin, error = %err, "Query resolution failed");
                    self.last_error = Some(err.clone());
                    Resolution::Failed(err)
                }
            };
            self.resolution = resolved;
        }

        match &self.resolution {
            Resolution::Ready(sql) => Ok(sql.as_str()),
            Resolution::Failed(err) => Err(err.clone()),
            Resolution::Pending(path) => Err(QueryError::resolution(format!(
                "Query file {} was not read",
                path.display()
            ))),
        }
    }

    /// Resolves the query and opens the cursor, once.
    async fn open(&mut self) -> Result<()> {
        match &self.cursor {
            CursorState::Pending => {}
            CursorState::Open(_) | CursorState::Closed => return Ok(()),
            CursorState::Failed(err) => return Err(err.clone()),
        }

        let sql = self.resolve().await?.to_string();
        match self.db.open_cursor(&sql, &self.params).await {
            Ok(cursor) => {
                debug!(origin = %self.origin, "Cursor opened");
                self.columns = cursor.columns();
                self.cursor = CursorState::Open(cursor);
                Ok(())
            }
            Err(err) => Err(self.fail(err)),
        }
    }

    /// Drops the cursor and latches `err`.
    fn fail(&mut self, err: QueryError) -> QueryError {
        warn!(origin = %self.origin, error = %err, "Cursor failed");
        self.cursor = CursorState::Failed(err.clone());
        self.last_error = Some(err.clone());
        err
    }

    /// Closes the cursor, releasing its connection. Safe to call repeatedly.
    ///
    /// A failed cursor stays failed.
    pub fn close(&mut self) {
        if let CursorState::Open(_) = self.cursor {
            debug!(origin = %self.origin, rows = self.total, "Cursor closed");
            self.cursor = CursorState::Closed;
        }
    }

    /// Advances the cursor and decodes the next row as `D::Item`.
    async fn next_item<D: RowTarget>(&mut self) -> Result<Option<D::Item>> {
        self.open().await?;

        let next = match &mut self.cursor {
            CursorState::Open(cursor) => cursor.next_row().await,
            CursorState::Failed(err) => return Err(err.clone()),
            CursorState::Pending | CursorState::Closed => return Ok(None),
        };

        let row: DbRow = match next {
            Ok(Some(row)) => row,
            Ok(None) => {
                self.close();
                return Ok(None);
            }
            Err(err) => return Err(self.fail(err)),
        };

        let ctx = DecodeContext::new(Arc::clone(&self.columns), self.parse_bytes);
        match D::decode(&row, &ctx) {
            Ok(item) => {
                self.total += 1;
                Ok(Some(item))
            }
            Err(err) => Err(self.fail(err)),
        }
    }

    /// Fetches the next row into `dest`.
    ///
    /// Returns `Ok(false)` once the result is exhausted or the cursor has been
    /// closed; `dest` is left untouched in that case.
    pub async fn fetch<D: RowTarget>(&mut self, dest: &mut D) -> Result<bool> {
        match self.next_item::<D>().await? {
            Some(item) => {
                dest.assign(item);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Fetches every remaining row as `D::Item`.
    ///
    /// Rows decoded before a failure are returned alongside the error.
    pub async fn fetch_all<D: RowTarget>(&mut self) -> Collected<D::Item> {
        let mut rows = Vec::new();
        loop {
            match self.next_item::<D>().await {
                Ok(Some(item)) => rows.push(item),
                Ok(None) => return Collected { rows, error: None },
                Err(err) => {
                    return Collected {
                        rows,
                        error: Some(err),
                    }
                }
            }
        }
    }

    /// Fetches every remaining row as a generic [`Row`].
    pub async fn to_list(&mut self) -> Result<Vec<Row>> {
        self.fetch_all::<Row>().await.into_result()
    }

    /// Fetches the first row into `dest` and closes the cursor.
    ///
    /// Returns [`QueryError::NotFound`] when the result is empty, leaving `dest`
    /// untouched. Rows after the first are discarded.
    pub async fn first<D: RowTarget>(&mut self, dest: &mut D) -> Result<()> {
        if !self.fetch(dest).await? {
            return Err(QueryError::NotFound);
        }
        self.close();
        Ok(())
    }

    /// Runs the query and decodes the whole result with `FromRow`.
    ///
    /// Bypasses the cursor: `total` and `columns` are not affected.
    pub async fn scan<T: FromDbRow>(&mut self) -> Result<Vec<T>> {
        let sql = self.resolve().await?.to_string();
        let result = self.db.fetch_all_as::<T>(&sql, &self.params).await;
        if let Err(err) = &result {
            self.last_error = Some(err.clone());
        }
        result
    }

    /// Latches an error raised outside the cursor, failing the cursor with it.
    pub(super) fn abort(&mut self, err: QueryError) -> QueryError {
        self.fail(err)
    }

    /// Makes sure the query is resolved and the cursor open.
    pub(super) async fn ensure_open(&mut self) -> Result<()> {
        self.open().await
    }
}

impl std::fmt::Debug for QueryRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryRunner")
            .field("origin", &self.origin)
            .field("params", &self.params)
            .field("parse_bytes", &self.parse_bytes)
            .field("resolution", &self.resolution)
            .field("cursor", &self.cursor)
            .field("total", &self.total)
            .finish_non_exhaustive()
    }
}
