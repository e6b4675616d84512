//! Streaming a result as a JSON array.

use super::runner::QueryRunner;
use super::target::RowTarget;
use crate::error::{QueryError, Result};
use serde::Serialize;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::debug;

const DEFAULT_START: &str = "[";
const DEFAULT_END: &str = "]";

/// Text written before the first row and after the last one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Delimiters<'a> {
    start: &'a str,
    end: &'a str,
}

impl<'a> Delimiters<'a> {
    /// Custom delimiters; an empty string falls back to `[` or `]`.
    pub fn new(start: &'a str, end: &'a str) -> Self {
        Self {
            start: if start.is_empty() { DEFAULT_START } else { start },
            end: if end.is_empty() { DEFAULT_END } else { end },
        }
    }

    pub fn start(&self) -> &'a str {
        self.start
    }

    pub fn end(&self) -> &'a str {
        self.end
    }
}

impl Default for Delimiters<'_> {
    fn default() -> Self {
        Self {
            start: DEFAULT_START,
            end: DEFAULT_END,
        }
    }
}

async fn write_chunk<W>(sink: &mut W, bytes: &[u8]) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    sink.write_all(bytes)
        .await
        .map_err(|e| QueryError::sink(format!("Failed to write response body: {e}")))
}

impl QueryRunner {
    /// Streams the remaining rows to `sink` as JSON, one row at a time.
    ///
    /// Each row is fetched into `dest` and written as its JSON encoding, with
    /// commas between rows and `delimiters` around them. Nothing is written if
    /// the query cannot be resolved or executed. After a fetch or encoding
    /// failure the end delimiter is still written and the error returned, so
    /// the output may be incomplete; a failed sink write stops immediately.
    pub async fn write<W, D>(
        &mut self,
        sink: &mut W,
        delimiters: Delimiters<'_>,
        dest: &mut D,
    ) -> Result<()>
    where
        W: AsyncWrite + Unpin,
        D: RowTarget + Serialize,
    {
        self.ensure_open().await?;

        if let Err(err) = write_chunk(sink, delimiters.start().as_bytes()).await {
            return Err(self.abort(err));
        }

        let mut written = 0usize;
        let outcome = loop {
            match self.fetch(dest).await {
                Ok(true) => {}
                Ok(false) => break Ok(()),
                Err(err) => break Err(err),
            }

            let encoded = match serde_json::to_vec(&*dest) {
                Ok(encoded) => encoded,
                Err(e) => break Err(self.abort(QueryError::serialization(e.to_string()))),
            };

            let mut chunk = Vec::with_capacity(encoded.len() + 1);
            if written > 0 {
                chunk.push(b',');
            }
            chunk.extend_from_slice(&encoded);

            if let Err(err) = write_chunk(sink, &chunk).await {
                return Err(self.abort(err));
            }
            written += 1;
        };

        let finished = async {
            write_chunk(sink, delimiters.end().as_bytes()).await?;
            sink.flush()
                .await
                .map_err(|e| QueryError::sink(format!("Failed to flush response body: {e}")))
        }
        .await;
        debug!(origin = %self.origin(), rows = written, "Streamed rows");

        match (outcome, finished) {
            (Err(err), _) => Err(err),
            (Ok(()), Err(err)) => Err(self.abort(err)),
            (Ok(()), Ok(())) => Ok(()),
        }
    }
}
