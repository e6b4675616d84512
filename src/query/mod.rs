//! Query execution for sqlrun.
//!
//! `QueryRunner` resolves a query (inline or from a file), executes it through
//! a [`Database`](crate::db::Database) handle and exposes the result as single
//! rows, lists, eagerly scanned structs, or a JSON stream.

mod runner;
mod source;
mod stream;
mod target;

pub use runner::{Collected, QueryRunner};
pub use source::{FileSource, QueryOrigin, QuerySource};
pub use stream::Delimiters;
pub use target::{RowTarget, Typed};
