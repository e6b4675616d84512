//! Declared column type integration tests.
//!
//! SQLite stores BOOLEAN, DATE, DATETIME and TIMESTAMP columns as integers or
//! text; every access path must read them.

use super::common::events_db;
use pretty_assertions::assert_eq;
use serde::Serialize;
use sqlrun::{Delimiters, QueryRunner, Row, Typed, Value};

#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
struct Event {
    id: i64,
    active: bool,
    day: Option<String>,
    happened_at: Option<String>,
    logged_at: Option<String>,
}

const EVENTS: &str = "SELECT id, active, day, happened_at, logged_at FROM events ORDER BY id";

#[tokio::test]
async fn test_to_list_reads_declared_types() {
    let test_db = events_db().await;
    let mut runner = QueryRunner::new(test_db.db.clone(), EVENTS, vec![]);

    let rows = runner.to_list().await.unwrap();
    assert_eq!(rows.len(), 2);

    assert_eq!(rows[0].get("active"), Some(&Value::Bool(true)));
    assert_eq!(rows[0].get("day"), Some(&Value::from("2024-03-01")));
    assert_eq!(
        rows[0].get("happened_at"),
        Some(&Value::from("2024-03-01 09:30:00"))
    );
    assert_eq!(
        rows[0].get("logged_at"),
        Some(&Value::from("2024-03-01T09:30:00Z"))
    );

    assert_eq!(rows[1].get("active"), Some(&Value::Bool(false)));
    assert_eq!(rows[1].get("day"), Some(&Value::Null));
}

#[tokio::test]
async fn test_first_typed_reads_declared_types() {
    let test_db = events_db().await;
    let mut runner = QueryRunner::new(test_db.db.clone(), EVENTS, vec![]);

    let mut dest: Typed<Event> = Typed::new();
    runner.first(&mut dest).await.unwrap();
    assert_eq!(
        dest.get(),
        Some(&Event {
            id: 1,
            active: true,
            day: Some("2024-03-01".to_string()),
            happened_at: Some("2024-03-01 09:30:00".to_string()),
            logged_at: Some("2024-03-01T09:30:00Z".to_string()),
        })
    );
}

#[tokio::test]
async fn test_scan_reads_declared_types() {
    let test_db = events_db().await;
    let mut runner = QueryRunner::new(test_db.db.clone(), EVENTS, vec![]);

    let events: Vec<Event> = runner.scan().await.unwrap();
    assert_eq!(events.len(), 2);
    assert!(events[0].active);
    assert!(!events[1].active);
    assert_eq!(events[1].happened_at, None);
}

#[tokio::test]
async fn test_write_streams_declared_types() {
    let test_db = events_db().await;
    let mut runner = QueryRunner::new(
        test_db.db.clone(),
        "SELECT id, active, day FROM events ORDER BY id",
        vec![],
    );

    let mut out: Vec<u8> = Vec::new();
    let mut row = Row::new();
    runner
        .write(&mut out, Delimiters::default(), &mut row)
        .await
        .unwrap();

    assert_eq!(
        String::from_utf8(out).unwrap(),
        r#"[{"id":1,"active":true,"day":"2024-03-01"},{"id":2,"active":false,"day":null}]"#
    );
}

#[tokio::test]
async fn test_boolean_params_filter_rows() {
    let test_db = events_db().await;
    let mut runner = QueryRunner::new(
        test_db.db.clone(),
        "SELECT id FROM events WHERE active = ?",
        vec![Value::Bool(false)],
    );

    let rows = runner.to_list().await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("id"), Some(&Value::Int(2)));
}
