//! PostgreSQL driver built on sqlx.
//!
//! Implements [`DatabaseConnection`] for `sqlx::PgConnection`. Statements run
//! as unnamed prepared statements so parameter types always follow the bound
//! values; the server rejects placeholder count mismatches.

use super::{
    BufferedCursor, ColumnInfo, Cursor, DatabaseBackend, DatabaseConnection, PreparedStatement,
    Row, Statement, Value,
};
use crate::config::ConnectionConfig;
use crate::error::{BridgeError, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use sqlx::error::BoxDynError;
use sqlx::postgres::{
    PgArguments, PgConnection, PgRow, PgTypeInfo, PgTypeKind, PgValueFormat, PgValueRef, Postgres,
};
use sqlx::query::Query;
use sqlx::types::Uuid;
use sqlx::{Column as _, Connection as _, Row as _, TypeInfo};
use tracing::debug;

/// Connects to PostgreSQL. No retry: a failed attempt is reported at once.
pub(super) async fn connect(config: &ConnectionConfig) -> Result<PgConnection> {
    let conn_str = config.to_connection_string()?;

    match PgConnection::connect(&conn_str).await {
        Ok(conn) => {
            debug!("Connected to {}", config.display_string());
            Ok(conn)
        }
        Err(e) => Err(map_connection_error(e, config)),
    }
}

#[async_trait]
impl DatabaseConnection for PgConnection {
    fn backend(&self) -> DatabaseBackend {
        DatabaseBackend::Postgres
    }

    async fn create_statement<'c>(&'c mut self) -> Result<Box<dyn Statement + 'c>> {
        Ok(Box::new(PgLiteralStatement { conn: self }))
    }

    async fn prepare_statement<'c>(
        &'c mut self,
        sql: &str,
    ) -> Result<Box<dyn PreparedStatement + 'c>> {
        Ok(Box::new(PgPreparedStatement {
            conn: self,
            sql: sql.to_string(),
            params: Vec::new(),
        }))
    }

    async fn close(self: Box<Self>) -> Result<()> {
        sqlx::Connection::close(*self)
            .await
            .map_err(|e| BridgeError::connection(format!("Failed to close connection: {e}")))
    }
}

struct PgLiteralStatement<'c> {
    conn: &'c mut PgConnection,
}

#[async_trait]
impl<'c> Statement for PgLiteralStatement<'c> {
    async fn execute_query<'s>(&'s mut self, sql: &str) -> Result<Option<Box<dyn Cursor + 's>>> {
        let cursor = run_query(self.conn, sql, Vec::new()).await?;
        Ok(Some(Box::new(cursor)))
    }

    async fn execute_update(&mut self, sql: &str) -> Result<u64> {
        run_update(self.conn, sql, Vec::new()).await
    }
}

struct PgPreparedStatement<'c> {
    conn: &'c mut PgConnection,
    sql: String,
    params: Vec<Option<Value>>,
}

impl PgPreparedStatement<'_> {
    /// Values in position order; a gap in the bound positions is an error.
    fn bound_values(&self) -> Result<Vec<Value>> {
        self.params
            .iter()
            .enumerate()
            .map(|(index, value)| {
                value.clone().ok_or_else(|| {
                    BridgeError::execution(format!("parameter {} is not bound", index + 1))
                })
            })
            .collect()
    }
}

#[async_trait]
impl<'c> PreparedStatement for PgPreparedStatement<'c> {
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
        let cursor = run_query(self.conn, &self.sql, values).await?;
        Ok(Some(Box::new(cursor)))
    }

    async fn execute_update(&mut self) -> Result<u64> {
        let values = self.bound_values()?;
        run_update(self.conn, &self.sql, values).await
    }
}

async fn run_query(conn: &mut PgConnection, sql: &str, values: Vec<Value>) -> Result<BufferedCursor> {
    let query = bind_all(sqlx::query(sql).persistent(false), values);
    let result = query
        .fetch_all(&mut *conn)
        .await
        .map_err(|e| BridgeError::execution(format_query_error(e)))?;

    // Column metadata comes from the first row; an empty result has none.
    let columns: Vec<ColumnInfo> = result
        .first()
        .map(|row| {
            row.columns()
                .iter()
                .map(|col| ColumnInfo::new(col.name(), col.type_info().name()))
                .collect()
        })
        .unwrap_or_default();
    let rows = result.iter().map(convert_row).collect::<Result<Vec<Row>>>()?;

    Ok(BufferedCursor::new(columns, rows))
}

async fn run_update(conn: &mut PgConnection, sql: &str, values: Vec<Value>) -> Result<u64> {
    let query = bind_all(sqlx::query(sql).persistent(false), values);
    let result = query
        .execute(&mut *conn)
        .await
        .map_err(|e| BridgeError::execution(format_query_error(e)))?;
    Ok(result.rows_affected())
}

fn bind_all<'q>(
    mut query: Query<'q, Postgres, PgArguments>,
    values: Vec<Value>,
) -> Query<'q, Postgres, PgArguments> {
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

/// Converts a sqlx PgRow to our Row type.
fn convert_row(row: &PgRow) -> Result<Row> {
    row.columns()
        .iter()
        .enumerate()
        .map(|(i, col)| convert_value(row, i, col.name(), col.type_info()))
        .collect()
}

/// Converts a single column value from a PgRow to our Value type.
///
/// A non-null value that cannot be decoded is an error, never a null.
fn convert_value(row: &PgRow, index: usize, column: &str, type_info: &PgTypeInfo) -> Result<Value> {
    let type_name = type_info.name();
    let value: Value = match type_name.to_uppercase().as_str() {
        "BOOL" | "BOOLEAN" => row.try_get::<Option<bool>, _>(index)?.into(),
        "INT2" | "SMALLINT" => row.try_get::<Option<i16>, _>(index)?.into(),
        "INT4" | "INT" | "INTEGER" => row.try_get::<Option<i32>, _>(index)?.into(),
        "INT8" | "BIGINT" => row.try_get::<Option<i64>, _>(index)?.into(),
        "FLOAT4" | "REAL" => row.try_get::<Option<f32>, _>(index)?.into(),
        "FLOAT8" | "DOUBLE PRECISION" => row.try_get::<Option<f64>, _>(index)?.into(),
        "NUMERIC" | "DECIMAL" => row
            .try_get_unchecked::<Option<NumericText>, _>(index)?
            .map(NumericText::into_value)
            .unwrap_or_default(),

        "TIMESTAMPTZ" => row.try_get::<Option<DateTime<Utc>>, _>(index)?.into(),
        // Zone-less timestamps are taken as UTC.
        "TIMESTAMP" => row
            .try_get::<Option<NaiveDateTime>, _>(index)?
            .map(|v| v.and_utc())
            .into(),
        "DATE" => row
            .try_get::<Option<NaiveDate>, _>(index)?
            .and_then(|v| v.and_hms_opt(0, 0, 0))
            .map(|v| v.and_utc())
            .into(),
        "TIME" => row
            .try_get::<Option<NaiveTime>, _>(index)?
            .map(|v| v.to_string())
            .into(),

        "UUID" => row
            .try_get::<Option<Uuid>, _>(index)?
            .map(|v| v.to_string())
            .into(),
        "JSON" | "JSONB" => row
            .try_get::<Option<serde_json::Value>, _>(index)?
            .map(|v| v.to_string())
            .into(),
        "BYTEA" => row.try_get::<Option<Vec<u8>>, _>(index)?.into(),

        // Enum labels travel as plain UTF-8 in both wire formats.
        _ if matches!(type_info.kind(), PgTypeKind::Enum(_)) => {
            row.try_get_unchecked::<Option<String>, _>(index)?.into()
        }

        _ => row
            .try_get::<Option<String>, _>(index)
            .map_err(|e| {
                BridgeError::execution(format!(
                    "Cannot read column \"{column}\" of type {type_name}: {e}"
                ))
            })?
            .into(),
    };
    Ok(value)
}

const NUMERIC_NEG: u16 = 0x4000;
const NUMERIC_NAN: u16 = 0xC000;
const NUMERIC_PINF: u16 = 0xD000;
const NUMERIC_NINF: u16 = 0xF000;

/// NUMERIC rendered as decimal text, from either wire format.
struct NumericText(String);

impl NumericText {
    /// Whole numbers that fit in i64 stay integers and other finite values
    /// become floats. NaN and the infinities keep their text.
    fn into_value(self) -> Value {
        if let Ok(int) = self.0.parse::<i64>() {
            return Value::Int(int);
        }
        match self.0.parse::<f64>() {
            Ok(float) if float.is_finite() => Value::Float(float),
            _ => Value::String(self.0),
        }
    }
}

impl sqlx::Type<Postgres> for NumericText {
    fn type_info() -> PgTypeInfo {
        PgTypeInfo::with_name("numeric")
    }
}

impl<'r> sqlx::Decode<'r, Postgres> for NumericText {
    fn decode(value: PgValueRef<'r>) -> std::result::Result<Self, BoxDynError> {
        match value.format() {
            PgValueFormat::Text => Ok(Self(value.as_str()?.to_string())),
            PgValueFormat::Binary => numeric_to_string(value.as_bytes()?).map(Self),
        }
    }
}

/// Renders the binary NUMERIC layout: four big-endian u16 headers (digit
/// count, weight, sign, display scale) followed by base-10000 digit groups.
/// Group `i` is worth `digits[i] * 10000^(weight - i)`.
fn numeric_to_string(raw: &[u8]) -> std::result::Result<String, BoxDynError> {
    let word = |at: usize| -> std::result::Result<u16, BoxDynError> {
        raw.get(at..at + 2)
            .map(|b| u16::from_be_bytes([b[0], b[1]]))
            .ok_or_else(|| "truncated NUMERIC value".into())
    };

    let ndigits = usize::from(word(0)?);
    let weight = i32::from(word(2)? as i16);
    let sign = word(4)?;
    let dscale = usize::from(word(6)?);

    match sign {
        NUMERIC_NAN => return Ok("NaN".to_string()),
        NUMERIC_PINF => return Ok("Infinity".to_string()),
        NUMERIC_NINF => return Ok("-Infinity".to_string()),
        _ => {}
    }

    let digits = (0..ndigits)
        .map(|i| word(8 + i * 2))
        .collect::<std::result::Result<Vec<u16>, _>>()?;
    let group = |i: i32| -> u16 {
        usize::try_from(i)
            .ok()
            .and_then(|i| digits.get(i).copied())
            .unwrap_or(0)
    };

    let mut text = String::new();
    if sign == NUMERIC_NEG && digits.iter().any(|d| *d != 0) {
        text.push('-');
    }

    if weight < 0 {
        text.push('0');
    } else {
        text.push_str(&group(0).to_string());
        for i in 1..=weight {
            text.push_str(&format!("{:04}", group(i)));
        }
    }

    if dscale > 0 {
        let mut fraction = String::new();
        let groups = dscale.div_ceil(4) as i32;
        for k in 0..groups {
            fraction.push_str(&format!("{:04}", group(weight + 1 + k)));
        }
        fraction.truncate(dscale);
        text.push('.');
        text.push_str(&fraction);
    }

    Ok(text)
}

/// Maps sqlx connection errors to user-friendly messages.
fn map_connection_error(error: sqlx::Error, config: &ConnectionConfig) -> BridgeError {
    let host = config.host.as_deref().unwrap_or("localhost");
    let port = config.port;
    let user = config.user.as_deref().unwrap_or("unknown");
    let database = config.database.as_deref().unwrap_or("unknown");

    let error_str = error.to_string().to_lowercase();

    if error_str.contains("connection refused") || error_str.contains("could not connect") {
        BridgeError::connection(format!(
            "Cannot connect to {host}:{port}. Check that the server is running."
        ))
    } else if error_str.contains("password authentication failed")
        || error_str.contains("authentication failed")
    {
        BridgeError::connection(format!(
            "Authentication failed for user '{user}'. Check your credentials."
        ))
    } else if error_str.contains("does not exist") && error_str.contains("database") {
        BridgeError::connection(format!("Database '{database}' does not exist."))
    } else if error_str.contains("ssl") || error_str.contains("tls") {
        BridgeError::connection(
            "Server requires SSL. Add '?sslmode=require' to connection string.".to_string(),
        )
    } else if error_str.contains("timed out") || error_str.contains("timeout") {
        BridgeError::connection(format!(
            "Connection to {host}:{port} timed out. The server may be overloaded or unreachable."
        ))
    } else {
        BridgeError::connection(error.to_string())
    }
}

/// Formats a query error with the server's detail and hint, if any.
fn format_query_error(error: sqlx::Error) -> String {
    let Some(db_error) = error.as_database_error() else {
        return error.to_string();
    };

    let mut result = String::from("ERROR: ");
    result.push_str(db_error.message());

    if let Some(pg_error) = db_error.try_downcast_ref::<sqlx::postgres::PgDatabaseError>() {
        if let Some(detail) = pg_error.detail() {
            result.push_str("\n  DETAIL: ");
            result.push_str(detail);
        }

        if let Some(hint) = pg_error.hint() {
            result.push_str("\n  HINT: ");
            result.push_str(hint);
        }

        if let Some(constraint) = pg_error.constraint() {
            result.push_str("\n  CONSTRAINT: ");
            result.push_str(constraint);
        }
    }

    result
}
