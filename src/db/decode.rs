//! Generic row decoding.
//!
//! Reads each column's native value from a backend row and, when byte parsing
//! is enabled, reinterprets blob values that hold UUID or JSON text.

use super::{DbRow, Row, Value};
use crate::error::{QueryError, Result};
use sqlx::postgres::PgRow;
use sqlx::sqlite::SqliteRow;
use sqlx::types::chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use sqlx::types::Json;
use sqlx::{Column, Row as SqlxRow, TypeInfo, ValueRef};
use std::sync::Arc;
use uuid::Uuid;

/// Per-cursor settings used while decoding rows into the generic mapping.
#[derive(Debug, Clone)]
pub struct DecodeContext {
    columns: Arc<[String]>,
    parse_bytes: bool,
}

impl DecodeContext {
    pub fn new(columns: Arc<[String]>, parse_bytes: bool) -> Self {
        Self {
            columns,
            parse_bytes,
        }
    }
}

/// Decodes every column of `row` into a fresh [`Row`].
pub fn decode_row(row: &DbRow, ctx: &DecodeContext) -> Result<Row> {
    let mut values = Vec::with_capacity(ctx.columns.len());

    for (index, name) in ctx.columns.iter().enumerate() {
        let value = match row {
            DbRow::Postgres(row) => postgres_value(row, index),
            DbRow::Sqlite(row) => sqlite_value(row, index),
        }
        .map_err(|e| QueryError::decode(format!("column '{name}': {e}")))?;

        let value = match value {
            Value::Bytes(bytes) if ctx.parse_bytes => interpret_bytes(bytes),
            other => other,
        };
        values.push(value);
    }

    Ok(Row::from_parts(Arc::clone(&ctx.columns), values))
}

/// Reads the native value of one PostgreSQL column, dispatching on its type name.
fn postgres_value(row: &PgRow, index: usize) -> std::result::Result<Value, sqlx::Error> {
    if row.try_get_raw(index)?.is_null() {
        return Ok(Value::Null);
    }
    let type_name = row
        .columns()
        .get(index)
        .map(|col| col.type_info().name().to_uppercase())
        .unwrap_or_default();

    let value = match type_name.as_str() {
        "BOOL" | "BOOLEAN" => Value::Bool(row.try_get_unchecked::<bool, _>(index)?),
        "INT2" | "SMALLINT" => Value::Int(row.try_get_unchecked::<i16, _>(index)?.into()),
        "INT4" | "INT" | "INTEGER" => Value::Int(row.try_get_unchecked::<i32, _>(index)?.into()),
        "INT8" | "BIGINT" => Value::Int(row.try_get_unchecked::<i64, _>(index)?),
        "FLOAT4" | "REAL" => Value::Float(row.try_get_unchecked::<f32, _>(index)?.into()),
        "FLOAT8" | "DOUBLE PRECISION" => Value::Float(row.try_get_unchecked::<f64, _>(index)?),
        "BYTEA" => Value::Bytes(row.try_get_unchecked::<Vec<u8>, _>(index)?),
        "UUID" => Value::Uuid(row.try_get_unchecked::<Uuid, _>(index)?),
        "JSON" | "JSONB" => {
            Value::Json(row.try_get_unchecked::<Json<serde_json::Value>, _>(index)?.0)
        }
        "TIMESTAMPTZ" => Value::String(
            row.try_get_unchecked::<DateTime<Utc>, _>(index)?
                .to_rfc3339(),
        ),
        "TIMESTAMP" => Value::String(row.try_get_unchecked::<NaiveDateTime, _>(index)?.to_string()),
        "DATE" => Value::String(row.try_get_unchecked::<NaiveDate, _>(index)?.to_string()),
        "TIME" => Value::String(row.try_get_unchecked::<NaiveTime, _>(index)?.to_string()),
        "NUMERIC" => {
            let bytes = row.try_get_unchecked::<Vec<u8>, _>(index)?;
            match numeric_text(&bytes) {
                Some(text) => Value::String(text),
                None => Value::Bytes(bytes),
            }
        }

        // For all other types, try text and keep the raw bytes otherwise
        _ => match row.try_get_unchecked::<String, _>(index) {
            Ok(text) => Value::String(text),
            Err(_) => Value::Bytes(row.try_get_unchecked::<Vec<u8>, _>(index)?),
        },
    };

    Ok(value)
}

/// Reads the native value of one SQLite cell.
///
/// Dispatches on the cell's storage class, since SQLite expressions carry no
/// declared type. Integers in a column declared `BOOLEAN` decode as booleans.
fn sqlite_value(row: &SqliteRow, index: usize) -> std::result::Result<Value, sqlx::Error> {
    let raw = row.try_get_raw(index)?;
    if raw.is_null() {
        return Ok(Value::Null);
    }
    let storage = raw.type_info().name().to_uppercase();
    let declared = row
        .columns()
        .get(index)
        .map(|col| col.type_info().name().to_uppercase())
        .unwrap_or_default();

    let value = match storage.as_str() {
        "INTEGER" if matches!(declared.as_str(), "BOOLEAN" | "BOOL") => {
            Value::Bool(row.try_get_unchecked::<bool, _>(index)?)
        }
        "INTEGER" => Value::Int(row.try_get_unchecked::<i64, _>(index)?),
        "REAL" => Value::Float(row.try_get_unchecked::<f64, _>(index)?),
        "BLOB" => Value::Bytes(row.try_get_unchecked::<Vec<u8>, _>(index)?),
        _ => Value::String(row.try_get_unchecked::<String, _>(index)?),
    };

    Ok(value)
}

/// Renders a PostgreSQL `NUMERIC` in its binary wire format as decimal text.
///
/// The format is four big-endian 16-bit header fields (digit count, weight,
/// sign, display scale) followed by base-10000 digits.
fn numeric_text(bytes: &[u8]) -> Option<String> {
    let word = |at: usize| {
        bytes
            .get(at..at + 2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
    };

    let ndigits = usize::from(word(0)?);
    let weight = i32::from(word(2)? as i16);
    let sign = word(4)?;
    let scale = usize::from(word(6)?);

    match sign {
        0xC000 => return Some("NaN".to_string()),
        0xD000 => return Some("Infinity".to_string()),
        0xF000 => return Some("-Infinity".to_string()),
        _ => {}
    }

    let digits = (0..ndigits)
        .map(|i| word(8 + 2 * i))
        .collect::<Option<Vec<u16>>>()?;
    let digit = |group: i32| -> u16 {
        usize::try_from(group)
            .ok()
            .and_then(|i| digits.get(i).copied())
            .unwrap_or(0)
    };

    let mut text = String::new();
    if sign == 0x4000 {
        text.push('-');
    }

    if weight < 0 {
        text.push('0');
    } else {
        text.push_str(&digit(0).to_string());
        for group in 1..=weight {
            text.push_str(&format!("{:04}", digit(group)));
        }
    }

    if scale > 0 {
        let mut fraction = String::with_capacity(scale + 4);
        let mut group = weight + 1;
        while fraction.len() < scale {
            fraction.push_str(&format!("{:04}", digit(group)));
            group += 1;
        }
        fraction.truncate(scale);
        text.push('.');
        text.push_str(&fraction);
    }

    Some(text)
}

/// Best-effort interpretation of a blob value.
///
/// Tried in order: UUID text, JSON number, any other JSON document. Empty or
/// non-UTF-8 blobs, and text matching none of these, stay raw bytes.
pub fn interpret_bytes(bytes: Vec<u8>) -> Value {
    if bytes.is_empty() {
        return Value::Bytes(bytes);
    }
    let Ok(text) = std::str::from_utf8(&bytes) else {
        return Value::Bytes(bytes);
    };
    let text = text.trim();

    if let Ok(id) = Uuid::parse_str(text) {
        return Value::Uuid(id);
    }
    if let Ok(number) = serde_json::from_str::<f64>(text) {
        return Value::Float(number);
    }
    match serde_json::from_str::<serde_json::Value>(text) {
        Ok(json) => Value::Json(json),
        Err(_) => Value::Bytes(bytes),
    }
}
