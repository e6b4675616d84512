//! Row destinations.
//!
//! A fetched row lands in one of two destinations: the generic [`Row`] mapping,
//! decoded by sqlrun's own policy, or [`Typed<T>`], decoded by sqlx `FromRow`.
//! The set is closed; callers pick one at the call site.

use crate::db::{decode_row, DbRow, DecodeContext, FromDbRow, Row};
use crate::error::{QueryError, Result};
use serde::{Serialize, Serializer};
use sqlx::postgres::PgRow;
use sqlx::sqlite::SqliteRow;
use sqlx::FromRow;

mod sealed {
    pub trait Sealed {}
}

/// A destination a runner can decode rows into.
pub trait RowTarget: sealed::Sealed {
    /// The decoded form of one row.
    type Item;

    /// Decodes `row` without touching any destination.
    fn decode(row: &DbRow, ctx: &DecodeContext) -> Result<Self::Item>;

    /// Stores a decoded row in this destination.
    fn assign(&mut self, item: Self::Item);
}

impl sealed::Sealed for Row {}

impl RowTarget for Row {
    type Item = Row;

    fn decode(row: &DbRow, ctx: &DecodeContext) -> Result<Row> {
        decode_row(row, ctx)
    }

    fn assign(&mut self, item: Row) {
        *self = item;
    }
}

/// Destination for a caller-defined struct decoded with `FromRow`.
///
/// Holds the most recently fetched row, if any. Serializes as the inner value,
/// or `null` before the first row.
#[derive(Debug, Clone, PartialEq)]
pub struct Typed<T>(Option<T>);

impl<T> Typed<T> {
    /// Creates an empty destination.
    pub fn new() -> Self {
        Self(None)
    }

    /// Returns the last fetched row.
    pub fn get(&self) -> Option<&T> {
        self.0.as_ref()
    }

    /// Takes the last fetched row out of the destination.
    pub fn take(&mut self) -> Option<T> {
        self.0.take()
    }

    pub fn into_inner(self) -> Option<T> {
        self.0
    }
}

impl<T> Default for Typed<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> sealed::Sealed for Typed<T> {}

impl<T: FromDbRow> RowTarget for Typed<T> {
    type Item = T;

    fn decode(row: &DbRow, _ctx: &DecodeContext) -> Result<T> {
        let decoded = match row {
            DbRow::Postgres(row) => <T as FromRow<'_, PgRow>>::from_row(row),
            DbRow::Sqlite(row) => <T as FromRow<'_, SqliteRow>>::from_row(row),
        };
        decoded.map_err(|e| QueryError::decode(e.to_string()))
    }

    fn assign(&mut self, item: T) {
        self.0 = Some(item);
    }
}

impl<T: Serialize> Serialize for Typed<T> {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.0.serialize(serializer)
    }
}
