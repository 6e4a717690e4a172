//! Statement execution against PostgreSQL.
//!
//! These tests require a running PostgreSQL database.
//! Set DATABASE_URL to a postgres:// URL to run them.

use pretty_assertions::assert_eq;
use sqlbridge::config::ConnectionConfig;
use sqlbridge::db::{self, DatabaseBackend, DatabaseConnection};
use sqlbridge::error::BridgeError;
use sqlbridge::executor::StatementExecutor;

/// Helper to create a test connection.
async fn get_test_connection() -> Option<Box<dyn DatabaseConnection>> {
    let url = std::env::var("DATABASE_URL").ok()?;
    let config = ConnectionConfig::from_connection_string(&url).ok()?;
    if config.backend != DatabaseBackend::Postgres {
        return None;
    }
    db::connect(&config).await.ok()
}

#[tokio::test]
async fn test_select_one() {
    let Some(mut conn) = get_test_connection().await else {
        eprintln!("Skipping test: DATABASE_URL not set");
        return;
    };

    let json = StatementExecutor::new(conn.as_mut())
        .execute_query("SELECT 1 AS \"X\"")
        .await
        .unwrap();
    assert_eq!(json, r#"[{"X":1}]"#);

    conn.close().await.unwrap();
}

#[tokio::test]
async fn test_empty_result_is_empty_array() {
    let Some(mut conn) = get_test_connection().await else {
        eprintln!("Skipping test: DATABASE_URL not set");
        return;
    };

    let json = StatementExecutor::new(conn.as_mut())
        .execute_query("SELECT 1 AS x WHERE false")
        .await
        .unwrap();
    assert_eq!(json, "[]");

    conn.close().await.unwrap();
}

#[tokio::test]
async fn test_prepared_round_trip_in_temp_table() {
    let Some(mut conn) = get_test_connection().await else {
        eprintln!("Skipping test: DATABASE_URL not set");
        return;
    };

    {
        let mut executor = StatementExecutor::new(conn.as_mut());
        executor
            .execute_update(
                "CREATE TEMP TABLE bridge_items (id int8, label text, seen_at timestamptz, active bool)",
            )
            .await
            .unwrap();

        let inserted = executor
            .execute_prepared_update(
                "INSERT INTO bridge_items VALUES ($1, $2, $3, $4), ($5, $6, $7, $8)",
                r#"[
                    {"type":"int","value":"1"},{"value":"one"},
                    {"type":"date","value":"2014-03-04T05:06:07.089Z"},{"type":"boolean","value":"true"},
                    {"type":"int","value":"2"},{"value":"two"},
                    {"type":"date","value":"2015-01-01T00:00:00.000Z"},{"type":"boolean","value":"false"}
                ]"#,
            )
            .await
            .unwrap();
        assert_eq!(inserted, 2);

        let json = executor
            .execute_prepared_query(
                "SELECT id, label, seen_at, active FROM bridge_items WHERE id = $1",
                r#"[{"type":"int","value":"1"}]"#,
            )
            .await
            .unwrap();
        assert_eq!(
            json,
            r#"[{"id":1,"label":"one","seen_at":"2014-03-04T05:06:07.089Z","active":true}]"#
        );

        let changed = executor
            .execute_update("UPDATE bridge_items SET active = NOT active")
            .await
            .unwrap();
        assert_eq!(changed, 2);
    }

    conn.close().await.unwrap();
}

#[tokio::test]
async fn test_errors_keep_connection_usable() {
    let Some(mut conn) = get_test_connection().await else {
        eprintln!("Skipping test: DATABASE_URL not set");
        return;
    };

    {
        let mut executor = StatementExecutor::new(conn.as_mut());

        let err = executor
            .execute_query("SELECT * FROM nonexistent_table_xyz")
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::Execution(_)));
        assert!(err.to_string().contains("ERROR:"));

        let err = executor
            .execute_prepared_query("SELECT $1::int8", r#"[{"type":"int","value":"1.5"}]"#)
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::ParameterConversion { .. }));

        let json = executor.execute_query("SELECT 2 AS y").await.unwrap();
        assert_eq!(json, r#"[{"y":2}]"#);
    }

    conn.close().await.unwrap();
}

#[tokio::test]
async fn test_numeric_uuid_and_json_columns_keep_their_values() {
    let Some(mut conn) = get_test_connection().await else {
        eprintln!("Skipping test: DATABASE_URL not set");
        return;
    };

    let json = StatementExecutor::new(conn.as_mut())
        .execute_query(
            "SELECT 1.5::numeric AS x, SUM(n)::numeric AS total, AVG(n) AS mean, \
             'a0eebc99-9c0b-4ef8-bb6d-6bb9bd380a11'::uuid AS id, '{\"k\":1}'::jsonb AS doc \
             FROM (VALUES (1::int8), (2::int8)) AS t(n)",
        )
        .await
        .unwrap();
    assert_eq!(
        json,
        r#"[{"x":1.5,"total":3,"mean":1.5,"id":"a0eebc99-9c0b-4ef8-bb6d-6bb9bd380a11","doc":"{\"k\":1}"}]"#
    );

    conn.close().await.unwrap();
}

#[tokio::test]
async fn test_undecodable_column_is_execution_error() {
    let Some(mut conn) = get_test_connection().await else {
        eprintln!("Skipping test: DATABASE_URL not set");
        return;
    };

    let err = StatementExecutor::new(conn.as_mut())
        .execute_query("SELECT interval '1 day' AS span")
        .await
        .unwrap_err();
    assert!(matches!(err, BridgeError::Execution(_)));
    assert!(err.to_string().contains("span"));

    conn.close().await.unwrap();
}
