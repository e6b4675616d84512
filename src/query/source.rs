//! Query text sources.
//!
//! A runner built from a file reference asks its `QuerySource` for the text the
//! first time the query is needed.

use crate::error::{QueryError, Result};
use async_trait::async_trait;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Resolves a file reference to query text.
#[async_trait]
pub trait QuerySource: Send + Sync {
    /// Returns the full text stored at `path`.
    async fn read_query(&self, path: &Path) -> Result<String>;
}

/// Reads query files from disk.
#[derive(Debug, Clone, Default)]
pub struct FileSource {
    base_dir: Option<PathBuf>,
}

impl FileSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolves relative paths against `dir` instead of the working directory.
    pub fn with_base_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: Some(dir.into()),
        }
    }

    fn full_path(&self, path: &Path) -> PathBuf {
        match &self.base_dir {
            Some(base) if path.is_relative() => base.join(path),
            _ => path.to_path_buf(),
        }
    }
}

#[async_trait]
impl QuerySource for FileSource {
    async fn read_query(&self, path: &Path) -> Result<String> {
        let full_path = self.full_path(path);
        debug!(path = %full_path.display(), "Reading query file");

        tokio::fs::read_to_string(&full_path).await.map_err(|e| {
            QueryError::resolution(format!(
                "Failed to read query file {}: {e}",
                full_path.display()
            ))
        })
    }
}

/// Where a runner's SQL comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryOrigin {
    /// SQL passed in directly.
    Inline,
    /// SQL read from a file on first use.
    File(PathBuf),
}

impl fmt::Display for QueryOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Inline => write!(f, "inline query"),
            Self::File(path) => write!(f, "query file {}", path.display()),
        }
    }
}
