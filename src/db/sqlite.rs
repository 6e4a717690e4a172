//! SQLite driver built on sqlx.
//!
//! Implements [`DatabaseConnection`] directly for `sqlx::SqliteConnection`, so
//! callers can hand the executor a connection they already own (or a pooled
//! one via `&mut *pool_conn`).

use super::{
    BufferedCursor, ColumnInfo, Cursor, DatabaseBackend, DatabaseConnection, PreparedStatement,
    Row, Statement, Value,
};
use crate::config::ConnectionConfig;
use crate::error::{BridgeError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::query::Query;
use sqlx::sqlite::{
    Sqlite, SqliteArguments, SqliteConnectOptions, SqliteConnection, SqliteRow, SqliteStatement,
};
use sqlx::{
    Column as _, ConnectOptions, Either, Executor, Row as _, Statement as _, TypeInfo, ValueRef,
};
use std::str::FromStr;
use tracing::debug;

/// Opens a SQLite database, creating the file if needed.
pub(super) async fn connect(config: &ConnectionConfig) -> Result<SqliteConnection> {
    let url = config.to_connection_string()?;
    let options = SqliteConnectOptions::from_str(&url)
        .map_err(|e| BridgeError::config(format!("Invalid SQLite location '{url}': {e}")))?
        .create_if_missing(true);

    let conn = options
        .connect()
        .await
        .map_err(|e| BridgeError::connection(format!("Cannot open {}: {e}", config.display_string())))?;
    debug!("Opened SQLite database {}", config.display_string());
    Ok(conn)
}

#[async_trait]
impl DatabaseConnection for SqliteConnection {
    fn backend(&self) -> DatabaseBackend {
        DatabaseBackend::Sqlite
    }

    async fn create_statement<'c>(&'c mut self) -> Result<Box<dyn Statement + 'c>> {
        Ok(Box::new(SqliteLiteralStatement { conn: self }))
    }

    async fn prepare_statement<'c>(
        &'c mut self,
        sql: &str,
    ) -> Result<Box<dyn PreparedStatement + 'c>> {
        let prepared = (&mut *self).prepare(sql).await?;
        let statement = sqlx::Statement::to_owned(&prepared);
        Ok(Box::new(SqlitePreparedStatement {
            conn: self,
            statement,
            params: Vec::new(),
        }))
    }

    async fn close(self: Box<Self>) -> Result<()> {
        sqlx::Connection::close(*self)
            .await
            .map_err(|e| BridgeError::connection(format!("Failed to close SQLite connection: {e}")))
    }
}

/// Statement for literal SQL.
struct SqliteLiteralStatement<'c> {
    conn: &'c mut SqliteConnection,
}

#[async_trait]
impl<'c> Statement for SqliteLiteralStatement<'c> {
    async fn execute_query<'s>(&'s mut self, sql: &str) -> Result<Option<Box<dyn Cursor + 's>>> {
        let statement = (&mut *self.conn).prepare(sql).await?;
        let cursor = run_query(self.conn, &statement, Vec::new()).await?;
        Ok(cursor.map(|c| Box::new(c) as Box<dyn Cursor + 's>))
    }

    async fn execute_update(&mut self, sql: &str) -> Result<u64> {
        let result = sqlx::query(sql).execute(&mut *self.conn).await?;
        Ok(result.rows_affected())
    }
}

/// Statement prepared on the connection, with positional binds.
struct SqlitePreparedStatement<'c> {
    conn: &'c mut SqliteConnection,
    statement: SqliteStatement<'static>,
    params: Vec<Option<Value>>,
}

impl SqlitePreparedStatement<'_> {
    /// Checks that exactly the statement's placeholders were bound and
    /// returns the values in position order.
    fn bound_values(&self) -> Result<Vec<Value>> {
        let expected = match sqlx::Statement::parameters(&self.statement) {
            Some(Either::Right(count)) => count,
            Some(Either::Left(types)) => types.len(),
            None => self.params.len(),
        };

        if self.params.len() > expected {
            return Err(BridgeError::execution(format!(
                "statement has {expected} placeholders but position {} was bound",
                self.params.len()
            )));
        }

        (0..expected)
            .map(|index| {
                self.params
                    .get(index)
                    .cloned()
                    .flatten()
                    .ok_or_else(|| {
                        BridgeError::execution(format!(
                            "statement has {expected} placeholders but parameter {} is not bound",
                            index + 1
                        ))
                    })
            })
            .collect()
    }
}

#[async_trait]
impl<'c> PreparedStatement for SqlitePreparedStatement<'c> {
    fn bind(&mut self, position: usize, value: Value) -> Result<()> {
        let index = position
            .checked_sub(1)
            .ok_or_else(|| BridgeError::execution("parameter positions start at 1"))?;
        if self.params.len() <= index {
            self.params.resize(index + 1, None);
        }
        self.params[index] = Some(value);
        Ok(())
    }

    async fn execute_query<'s>(&'s mut self) -> Result<Option<Box<dyn Cursor + 's>>> {
        let values = self.bound_values()?;
        let cursor = run_query(self.conn, &self.statement, values).await?;
        Ok(cursor.map(|c| Box::new(c) as Box<dyn Cursor + 's>))
    }

    async fn execute_update(&mut self) -> Result<u64> {
        let values = self.bound_values()?;
        let query = bind_all(self.statement.query(), values);
        let result = query.execute(&mut *self.conn).await?;
        Ok(result.rows_affected())
    }
}

/// Executes `statement` and buffers its rows. Statements that define no
/// result columns still run, but report no result set.
async fn run_query(
    conn: &mut SqliteConnection,
    statement: &SqliteStatement<'_>,
    values: Vec<Value>,
) -> Result<Option<BufferedCursor>> {
    let query = bind_all(statement.query(), values);
    let rows = query.fetch_all(&mut *conn).await?;

    let columns = sqlx::Statement::columns(statement);
    if columns.is_empty() {
        return Ok(None);
    }

    let columns: Vec<ColumnInfo> = columns
        .iter()
        .map(|col| ColumnInfo::new(col.name(), col.type_info().name()))
        .collect();
    let rows: Vec<Row> = rows.iter().map(convert_row).collect();
    Ok(Some(BufferedCursor::new(columns, rows)))
}

fn bind_all<'q>(
    mut query: Query<'q, Sqlite, SqliteArguments<'q>>,
    values: Vec<Value>,
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    for value in values {
        query = match value {
            Value::Null => query.bind(None::<String>),
            Value::Bool(v) => query.bind(v),
            Value::Int(v) => query.bind(v),
            Value::Float(v) => query.bind(v),
            Value::String(v) => query.bind(v),
            Value::Date(v) => query.bind(v),
            Value::Bytes(v) => query.bind(v),
        };
    }
    query
}

/// Converts a sqlx SqliteRow to our Row type.
fn convert_row(row: &SqliteRow) -> Row {
    (0..row.len()).map(|i| convert_value(row, i)).collect()
}

/// Converts a single column value.
///
/// Declared BOOLEAN and date/time columns are decoded as such; everything
/// else follows the value's storage class.
fn convert_value(row: &SqliteRow, index: usize) -> Value {
    let raw = match row.try_get_raw(index) {
        Ok(raw) => raw,
        Err(_) => return Value::Null,
    };
    if raw.is_null() {
        return Value::Null;
    }
    let storage = raw.type_info().name().to_uppercase();
    let declared = row.column(index).type_info().name().to_uppercase();

    match declared.as_str() {
        "BOOLEAN" | "BOOL" => {
            if let Ok(v) = row.try_get_unchecked::<bool, _>(index) {
                return Value::Bool(v);
            }
        }
        "DATE" | "DATETIME" | "TIMESTAMP" => {
            if let Ok(v) = row.try_get_unchecked::<DateTime<Utc>, _>(index) {
                return Value::Date(v);
            }
        }
        _ => {}
    }

    match storage.as_str() {
        "INTEGER" | "BOOLEAN" => row
            .try_get_unchecked::<i64, _>(index)
            .map(Value::Int)
            .unwrap_or(Value::Null),
        "REAL" | "NUMERIC" => row
            .try_get_unchecked::<f64, _>(index)
            .map(Value::Float)
            .unwrap_or(Value::Null),
        "BLOB" => row
            .try_get_unchecked::<Vec<u8>, _>(index)
            .map(Value::Bytes)
            .unwrap_or(Value::Null),
        "NULL" => Value::Null,
        // TEXT and anything unexpected
        _ => row
            .try_get_unchecked::<String, _>(index)
            .map(Value::String)
            .unwrap_or(Value::Null),
    }
}
