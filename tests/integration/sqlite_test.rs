//! Statement execution against SQLite.
//!
//! Each test opens its own in-memory database.

use pretty_assertions::assert_eq;
use sqlbridge::config::ConnectionConfig;
use sqlbridge::db::{self, DatabaseBackend, DatabaseConnection};
use sqlbridge::error::BridgeError;
use sqlbridge::executor::{ExecutionOutcome, StatementExecutor};

async fn memory_db() -> Box<dyn DatabaseConnection> {
    db::connect(&ConnectionConfig::sqlite(":memory:"))
        .await
        .unwrap()
}

/// Creates `people(id, name)` with three rows.
async fn seed_people(conn: &mut dyn DatabaseConnection) {
    let mut executor = StatementExecutor::new(conn);
    executor
        .execute_update("CREATE TABLE people (id INTEGER PRIMARY KEY, name TEXT NOT NULL)")
        .await
        .unwrap();
    let inserted = executor
        .execute_update("INSERT INTO people (id, name) VALUES (1, 'ada'), (2, 'brian'), (3, 'cleo')")
        .await
        .unwrap();
    assert_eq!(inserted, 3);
}

#[tokio::test]
async fn test_backend_is_sqlite() {
    let conn = memory_db().await;
    assert_eq!(conn.backend(), DatabaseBackend::Sqlite);
    conn.close().await.unwrap();
}

#[tokio::test]
async fn test_select_one() {
    let mut conn = memory_db().await;
    let json = StatementExecutor::new(conn.as_mut())
        .execute_query("SELECT 1 AS X")
        .await
        .unwrap();
    assert_eq!(json, r#"[{"X":1}]"#);
    conn.close().await.unwrap();
}

#[tokio::test]
async fn test_empty_table_is_empty_array() {
    let mut conn = memory_db().await;
    let mut executor = StatementExecutor::new(conn.as_mut());
    executor
        .execute_update("CREATE TABLE empty_table (id INTEGER)")
        .await
        .unwrap();

    let json = executor.execute_query("SELECT * FROM empty_table").await.unwrap();
    assert_eq!(json, "[]");
}

#[tokio::test]
async fn test_statement_without_result_set_is_empty_string() {
    let mut conn = memory_db().await;
    seed_people(conn.as_mut()).await;
    let mut executor = StatementExecutor::new(conn.as_mut());

    let json = executor
        .execute_query("INSERT INTO people (id, name) VALUES (4, 'dora')")
        .await
        .unwrap();
    assert_eq!(json, "");

    // The insert still ran.
    let json = executor
        .execute_query("SELECT COUNT(*) AS n FROM people")
        .await
        .unwrap();
    assert_eq!(json, r#"[{"n":4}]"#);
}

#[tokio::test]
async fn test_scalar_types() {
    let mut conn = memory_db().await;
    let json = StatementExecutor::new(conn.as_mut())
        .execute_query("SELECT 1.5 AS f, 'x' AS s, NULL AS n, x'0102' AS b")
        .await
        .unwrap();
    assert_eq!(json, r#"[{"f":1.5,"s":"x","n":null,"b":[1,2]}]"#);
}

#[tokio::test]
async fn test_rows_keep_query_order() {
    let mut conn = memory_db().await;
    seed_people(conn.as_mut()).await;

    let json = StatementExecutor::new(conn.as_mut())
        .execute_query("SELECT id, name FROM people ORDER BY id DESC")
        .await
        .unwrap();
    assert_eq!(
        json,
        r#"[{"id":3,"name":"cleo"},{"id":2,"name":"brian"},{"id":1,"name":"ada"}]"#
    );
}

#[tokio::test]
async fn test_duplicate_column_names_last_wins() {
    let mut conn = memory_db().await;
    let json = StatementExecutor::new(conn.as_mut())
        .execute_query("SELECT 1 AS a, 2 AS a")
        .await
        .unwrap();
    assert_eq!(json, r#"[{"a":2}]"#);
}

#[tokio::test]
async fn test_prepared_query_with_int_parameter() {
    let mut conn = memory_db().await;
    seed_people(conn.as_mut()).await;

    let json = StatementExecutor::new(conn.as_mut())
        .execute_prepared_query(
            "SELECT name FROM people WHERE id = ?",
            r#"[{"type":"int","value":"2"}]"#,
        )
        .await
        .unwrap();
    assert_eq!(json, r#"[{"name":"brian"}]"#);
}

#[tokio::test]
async fn test_prepared_query_with_string_parameter() {
    let mut conn = memory_db().await;
    seed_people(conn.as_mut()).await;

    let json = StatementExecutor::new(conn.as_mut())
        .execute_prepared_query(
            "SELECT id FROM people WHERE name = ? OR name = ? ORDER BY id",
            r#"[{"value":"cleo"},{"type":"string","value":"ada"}]"#,
        )
        .await
        .unwrap();
    assert_eq!(json, r#"[{"id":1},{"id":3}]"#);
}

#[tokio::test]
async fn test_update_reports_affected_rows() {
    let mut conn = memory_db().await;
    seed_people(conn.as_mut()).await;
    let mut executor = StatementExecutor::new(conn.as_mut());

    let changed = executor
        .execute_update("UPDATE people SET name = upper(name)")
        .await
        .unwrap();
    assert_eq!(changed, 3);

    let changed = executor
        .execute_update("DELETE FROM people WHERE id > 100")
        .await
        .unwrap();
    assert_eq!(changed, 0);
}

#[tokio::test]
async fn test_prepared_update() {
    let mut conn = memory_db().await;
    seed_people(conn.as_mut()).await;
    let mut executor = StatementExecutor::new(conn.as_mut());

    let changed = executor
        .execute_prepared_update(
            "UPDATE people SET name = ? WHERE id >= ?",
            r#"[{"type":"string","value":"zed"},{"type":"int","value":"2"}]"#,
        )
        .await
        .unwrap();
    assert_eq!(changed, 2);

    let json = executor
        .execute_query("SELECT name FROM people WHERE name = 'zed'")
        .await
        .unwrap();
    assert_eq!(json, r#"[{"name":"zed"},{"name":"zed"}]"#);
}

#[tokio::test]
async fn test_date_round_trip() {
    let mut conn = memory_db().await;
    let mut executor = StatementExecutor::new(conn.as_mut());
    executor
        .execute_update("CREATE TABLE events (id INTEGER, at DATETIME)")
        .await
        .unwrap();

    let inserted = executor
        .execute_prepared_update(
            "INSERT INTO events (id, at) VALUES (?, ?)",
            r#"[{"type":"int","value":"1"},{"type":"date","value":"2014-03-04T05:06:07.089Z"}]"#,
        )
        .await
        .unwrap();
    assert_eq!(inserted, 1);

    let json = executor
        .execute_prepared_query(
            "SELECT at FROM events WHERE at = ?",
            r#"[{"type":"date","value":"2014-03-04T05:06:07.089Z"}]"#,
        )
        .await
        .unwrap();
    assert_eq!(json, r#"[{"at":"2014-03-04T05:06:07.089Z"}]"#);
}

#[tokio::test]
async fn test_boolean_and_float_parameters() {
    let mut conn = memory_db().await;
    let mut executor = StatementExecutor::new(conn.as_mut());
    executor
        .execute_update("CREATE TABLE flags (name TEXT, enabled BOOLEAN, weight REAL)")
        .await
        .unwrap();

    executor
        .execute_prepared_update(
            "INSERT INTO flags VALUES (?, ?, ?)",
            r#"[{"value":"beta"},{"type":"boolean","value":"TRUE"},{"type":"float","value":"0.25"}]"#,
        )
        .await
        .unwrap();

    let json = executor.execute_query("SELECT * FROM flags").await.unwrap();
    assert_eq!(json, r#"[{"name":"beta","enabled":true,"weight":0.25}]"#);
}

#[tokio::test]
async fn test_syntax_error_is_execution_error() {
    let mut conn = memory_db().await;
    let mut executor = StatementExecutor::new(conn.as_mut());

    let err = executor.execute_query("SELEC 1").await.unwrap_err();
    assert!(matches!(err, BridgeError::Execution(_)));

    let err = executor
        .execute_prepared_update("UPDATE missing_table SET x = ?", r#"[{"value":"1"}]"#)
        .await
        .unwrap_err();
    assert!(matches!(err, BridgeError::Execution(_)));

    // The connection is still usable.
    assert_eq!(executor.execute_query("SELECT 1 AS X").await.unwrap(), r#"[{"X":1}]"#);
}

#[tokio::test]
async fn test_malformed_parameters_are_decode_errors() {
    let mut conn = memory_db().await;
    let mut executor = StatementExecutor::new(conn.as_mut());

    let err = executor
        .execute_prepared_query("SELECT ? AS v", "not json")
        .await
        .unwrap_err();
    assert!(matches!(err, BridgeError::ParameterDecode(_)));

    let err = executor
        .execute_prepared_update("SELECT ?", r#"{"type":"int","value":"1"}"#)
        .await
        .unwrap_err();
    assert!(matches!(err, BridgeError::ParameterDecode(_)));
}

#[tokio::test]
async fn test_unconvertible_parameter_is_conversion_error() {
    let mut conn = memory_db().await;
    let mut executor = StatementExecutor::new(conn.as_mut());

    let err = executor
        .execute_prepared_query(
            "SELECT ? AS a, ? AS b",
            r#"[{"type":"int","value":"1"},{"type":"int","value":"abc"}]"#,
        )
        .await
        .unwrap_err();
    match err {
        BridgeError::ParameterConversion {
            position, value, ..
        } => {
            assert_eq!(position, 2);
            assert_eq!(value, "abc");
        }
        other => panic!("Expected ParameterConversion, got {other:?}"),
    }

    assert_eq!(executor.execute_query("SELECT 2 AS Y").await.unwrap(), r#"[{"Y":2}]"#);
}

#[tokio::test]
async fn test_placeholder_count_mismatch_is_execution_error() {
    let mut conn = memory_db().await;
    let mut executor = StatementExecutor::new(conn.as_mut());

    let err = executor
        .execute_prepared_query("SELECT ? AS a, ? AS b", r#"[{"value":"only one"}]"#)
        .await
        .unwrap_err();
    assert!(matches!(err, BridgeError::Execution(_)));

    let err = executor
        .execute_prepared_query("SELECT 1 AS a", r#"[{"value":"extra"}]"#)
        .await
        .unwrap_err();
    assert!(matches!(err, BridgeError::Execution(_)));
}

#[tokio::test]
async fn test_empty_parameter_list() {
    let mut conn = memory_db().await;
    let json = StatementExecutor::new(conn.as_mut())
        .execute_prepared_query("SELECT 'plain' AS p", "[]")
        .await
        .unwrap();
    assert_eq!(json, r#"[{"p":"plain"}]"#);
}

#[tokio::test]
async fn test_execute_routes_by_keyword() {
    let mut conn = memory_db().await;
    seed_people(conn.as_mut()).await;
    let mut executor = StatementExecutor::new(conn.as_mut());

    let outcome = executor
        .execute("  delete FROM people WHERE id = ?", Some(r#"[{"type":"int","value":"1"}]"#))
        .await
        .unwrap();
    assert_eq!(outcome, ExecutionOutcome::Updated(1));

    let outcome = executor
        .execute("SELECT COUNT(*) AS n FROM people", None)
        .await
        .unwrap();
    assert_eq!(outcome, ExecutionOutcome::Rows(r#"[{"n":2}]"#.to_string()));
}

#[tokio::test]
async fn test_file_database_persists_between_connections() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bridge.db");
    let config = ConnectionConfig::sqlite(path.to_string_lossy());

    let mut conn = db::connect(&config).await.unwrap();
    seed_people(conn.as_mut()).await;
    conn.close().await.unwrap();

    let mut conn = db::connect(&config).await.unwrap();
    let json = StatementExecutor::new(conn.as_mut())
        .execute_query("SELECT name FROM people WHERE id = 1")
        .await
        .unwrap();
    assert_eq!(json, r#"[{"name":"ada"}]"#);
    conn.close().await.unwrap();
}
