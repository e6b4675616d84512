//! Runner integration tests.
//!
//! Tests fetching, listing, first-row lookup, and eager scanning over SQLite.

use super::common::{empty_db, seeded_db, ALICE_ID};
use pretty_assertions::assert_eq;
use serde::Serialize;
use sqlrun::query::Collected;
use sqlrun::{QueryError, QueryRunner, Row, Typed, Value};

#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
struct User {
    id: i64,
    name: String,
    email: Option<String>,
}

const USERS: &str = "SELECT id, name, email FROM users ORDER BY id";

#[tokio::test]
async fn test_fetch_iterates_all_rows() {
    let test_db = seeded_db().await;
    let mut runner = QueryRunner::new(test_db.db.clone(), USERS, vec![]);

    let mut row = Row::new();
    let mut names = Vec::new();
    while runner.fetch(&mut row).await.unwrap() {
        names.push(row.get("name").cloned());
    }

    assert_eq!(
        names,
        vec![
            Some(Value::from("alice")),
            Some(Value::from("bob")),
            Some(Value::from("carol")),
        ]
    );
    assert_eq!(runner.total(), 3);
    assert_eq!(runner.columns(), ["id", "name", "email"]);
    assert!(runner.error().is_none());

    // Exhausted cursors keep reporting the end of the result.
    assert!(!runner.fetch(&mut row).await.unwrap());
    assert_eq!(row.get("name"), Some(&Value::from("carol")));
}

#[tokio::test]
async fn test_fetch_decodes_native_values() {
    let test_db = seeded_db().await;
    let mut runner = QueryRunner::new(test_db.db.clone(), USERS, vec![]);

    let rows = runner.to_list().await.unwrap();
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[0].get("id"), Some(&Value::Int(1)));
    assert_eq!(
        rows[0].get("email"),
        Some(&Value::from("alice@example.com"))
    );
    assert_eq!(rows[2].get("email"), Some(&Value::Null));
}

#[tokio::test]
async fn test_params_are_bound_in_order() {
    let test_db = seeded_db().await;
    let mut runner = QueryRunner::new(
        test_db.db.clone(),
        "SELECT name FROM users WHERE id >= ? AND name <> ? ORDER BY id",
        vec![Value::Int(2), Value::from("carol")],
    );

    let rows = runner.to_list().await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("name"), Some(&Value::from("bob")));
}

#[tokio::test]
async fn test_to_list_empty_result_keeps_columns() {
    let test_db = seeded_db().await;
    let mut runner = QueryRunner::new(
        test_db.db.clone(),
        "SELECT id, name FROM users WHERE id > 100",
        vec![],
    );

    let rows = runner.to_list().await.unwrap();
    assert!(rows.is_empty());
    assert_eq!(runner.columns(), ["id", "name"]);
    assert_eq!(runner.total(), 0);
}

#[tokio::test]
async fn test_first_returns_first_row_and_closes() {
    let test_db = seeded_db().await;
    let mut runner = QueryRunner::new(test_db.db.clone(), USERS, vec![]);

    let mut row = Row::new();
    runner.first(&mut row).await.unwrap();
    assert_eq!(row.get("name"), Some(&Value::from("alice")));
    assert_eq!(runner.total(), 1);

    // Remaining rows are discarded once the first one is taken.
    assert!(!runner.fetch(&mut row).await.unwrap());
    assert!(runner.to_list().await.unwrap().is_empty());
    assert_eq!(runner.total(), 1);
}

#[tokio::test]
async fn test_first_on_empty_result_is_not_found() {
    let test_db = seeded_db().await;
    let mut runner = QueryRunner::new(
        test_db.db.clone(),
        "SELECT id, name FROM users WHERE name = ?",
        vec![Value::from("nobody")],
    );

    let mut dest: Typed<User> = Typed::new();
    let err = runner.first(&mut dest).await.unwrap_err();
    assert!(err.is_not_found());
    assert!(dest.get().is_none());
}

#[tokio::test]
async fn test_fetch_into_typed_destination() {
    let test_db = seeded_db().await;
    let mut runner = QueryRunner::new(test_db.db.clone(), USERS, vec![]);

    let mut dest = Typed::new();
    assert!(runner.fetch(&mut dest).await.unwrap());
    assert_eq!(
        dest.get(),
        Some(&User {
            id: 1,
            name: "alice".to_string(),
            email: Some("alice@example.com".to_string()),
        })
    );

    let rest: Collected<User> = runner.fetch_all::<Typed<User>>().await;
    assert!(rest.error.is_none());
    assert_eq!(
        rest.rows.iter().map(|u| u.name.as_str()).collect::<Vec<_>>(),
        vec!["bob", "carol"]
    );
    assert_eq!(runner.total(), 3);
}

#[tokio::test]
async fn test_typed_decode_failure_is_latched() {
    let test_db = seeded_db().await;
    let mut runner = QueryRunner::new(
        test_db.db.clone(),
        "SELECT id, name AS username FROM users ORDER BY id",
        vec![],
    );

    let mut dest: Typed<User> = Typed::new();
    let err = runner.fetch(&mut dest).await.unwrap_err();
    assert!(matches!(err, QueryError::Decode(_)));
    assert!(dest.get().is_none());

    // The cursor stays failed; generic rows don't get a second chance.
    let mut row = Row::new();
    assert_eq!(runner.fetch(&mut row).await.unwrap_err(), err);
    assert_eq!(runner.error(), Some(&err));
}

#[tokio::test]
async fn test_scan_decodes_all_rows_without_cursor() {
    let test_db = seeded_db().await;
    let mut runner = QueryRunner::new(test_db.db.clone(), USERS, vec![]);

    let users: Vec<User> = runner.scan().await.unwrap();
    assert_eq!(users.len(), 3);
    assert_eq!(users[2].email, None);

    assert_eq!(runner.total(), 0);
    assert!(runner.columns().is_empty());
}

#[tokio::test]
async fn test_execution_error_is_latched() {
    let test_db = empty_db().await;
    let mut runner = QueryRunner::new(test_db.db.clone(), "SELECT * FROM missing_table", vec![]);

    let err = runner.to_list().await.unwrap_err();
    assert!(matches!(err, QueryError::Execution(_)));
    assert!(err.to_string().contains("missing_table"));

    let mut row = Row::new();
    assert_eq!(runner.fetch(&mut row).await.unwrap_err(), err);
    assert_eq!(runner.first(&mut row).await.unwrap_err(), err);
    assert!(row.is_empty());
}

#[tokio::test]
async fn test_runtime_execution_error_is_latched_at_open() {
    let test_db = empty_db().await;
    let mut runner = QueryRunner::new(
        test_db.db.clone(),
        "SELECT json(?) AS doc",
        vec![Value::from("not json")],
    );

    let mut row = Row::new();
    let err = runner.fetch(&mut row).await.unwrap_err();
    assert!(matches!(err, QueryError::Execution(_)));
    assert!(err.to_string().contains("malformed JSON"));
    assert!(runner.columns().is_empty());

    assert_eq!(runner.to_list().await.unwrap_err(), err);
    assert_eq!(runner.total(), 0);
    assert!(row.is_empty());
}

#[tokio::test]
async fn test_fetch_all_reports_rows_and_error() {
    let test_db = empty_db().await;
    let mut runner = QueryRunner::new(test_db.db.clone(), "SELECT nope", vec![]);

    let collected = runner.fetch_all::<Row>().await;
    assert!(collected.rows.is_empty());
    assert!(collected.error.is_some());
    assert!(collected.into_result().is_err());
}

#[tokio::test]
async fn test_blobs_stay_raw_without_parse_bytes() {
    let test_db = seeded_db().await;
    let mut runner = QueryRunner::new(
        test_db.db.clone(),
        "SELECT payload FROM users WHERE id = 1",
        vec![],
    );

    let mut row = Row::new();
    runner.first(&mut row).await.unwrap();
    assert_eq!(
        row.get("payload"),
        Some(&Value::Bytes(ALICE_ID.as_bytes().to_vec()))
    );
}

#[tokio::test]
async fn test_parse_bytes_interprets_blobs() {
    let test_db = seeded_db().await;
    let mut runner = QueryRunner::new(
        test_db.db.clone(),
        "SELECT payload FROM users ORDER BY id",
        vec![],
    )
    .parse_bytes(true);

    let rows = runner.to_list().await.unwrap();
    let payloads: Vec<Value> = rows
        .iter()
        .map(|row| row.get("payload").cloned().unwrap_or(Value::Null))
        .collect();

    assert_eq!(
        payloads,
        vec![
            Value::Uuid(uuid::Uuid::parse_str(ALICE_ID).unwrap()),
            Value::Json(serde_json::json!({"admin": true})),
            Value::Null,
        ]
    );
}

#[tokio::test]
async fn test_close_releases_open_cursor() {
    let test_db = seeded_db().await;
    let mut runner = QueryRunner::new(test_db.db.clone(), USERS, vec![]);

    let mut row = Row::new();
    assert!(runner.fetch(&mut row).await.unwrap());
    runner.close();
    runner.close();

    assert!(!runner.fetch(&mut row).await.unwrap());
    assert_eq!(runner.total(), 1);
}
