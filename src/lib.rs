//! sqlrun - run SQL from text or files and stream the results.
//!
//! This library exposes the core modules for the binary and for integration tests.

pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod query;

pub use db::{Database, Row, Value};
pub use error::{QueryError, Result};
pub use query::{Delimiters, QueryRunner, Typed};
