//! Error types for sqlrun.
//!
//! Errors carry rendered messages rather than driver error values so that a
//! runner can latch the first failure and hand out identical copies of it on
//! every later call.

use thiserror::Error;

/// Main error type for query operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueryError {
    /// The query text could not be loaded from its file.
    #[error("Resolution error: {0}")]
    Resolution(String),

    /// Database connection errors (host unreachable, auth failed, etc.)
    #[error("Connection error: {0}")]
    Connection(String),

    /// Query execution errors (syntax errors, constraint violations, bad parameters, etc.)
    #[error("Execution error: {0}")]
    Execution(String),

    /// A row could not be decoded into its destination.
    #[error("Decode error: {0}")]
    Decode(String),

    /// `first` found no rows.
    #[error("record not found")]
    NotFound,

    /// A fetched row could not be encoded as JSON.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Writing to the output sink failed.
    #[error("Sink error: {0}")]
    Sink(String),

    /// Configuration errors (invalid config file, missing required fields, etc.)
    #[error("Configuration error: {0}")]
    Config(String),
}

impl QueryError {
    /// Creates a resolution error with the given message.
    pub fn resolution(msg: impl Into<String>) -> Self {
        Self::Resolution(msg.into())
    }

    /// Creates a connection error with the given message.
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    /// Creates an execution error with the given message.
    pub fn execution(msg: impl Into<String>) -> Self {
        Self::Execution(msg.into())
    }

    /// Creates a decode error with the given message.
    pub fn decode(msg: impl Into<String>) -> Self {
        Self::Decode(msg.into())
    }

    /// Creates a serialization error with the given message.
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization(msg.into())
    }

    /// Creates a sink error with the given message.
    pub fn sink(msg: impl Into<String>) -> Self {
        Self::Sink(msg.into())
    }

    /// Creates a configuration error with the given message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Returns true for the empty-result outcome of `first`.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound)
    }

    /// Returns the error category as a string for display purposes.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Resolution(_) => "Resolution Error",
            Self::Connection(_) => "Connection Error",
            Self::Execution(_) => "Execution Error",
            Self::Decode(_) => "Decode Error",
            Self::NotFound => "Not Found",
            Self::Serialization(_) => "Serialization Error",
            Self::Sink(_) => "Sink Error",
            Self::Config(_) => "Configuration Error",
        }
    }
}

/// Result type alias using QueryError.
pub type Result<T> = std::result::Result<T, QueryError>;
