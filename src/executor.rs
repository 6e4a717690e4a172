//! Statement execution with JSON parameters and JSON results.
//!
//! Each operation is a single linear pass: acquire a statement, bind,
//! execute, materialize rows, release, serialize. Statements and cursors are
//! dropped before the operation returns, on success and on error alike.

use std::fmt;

use tracing::{debug, trace};

use crate::db::{Cursor, DatabaseConnection, PreparedStatement, Record};
use crate::error::{BridgeError, Result};
use crate::params::{decode_parameters, ParameterDescriptor};

/// SQL prefixes that are routed to the update path by [`StatementExecutor::execute`].
const UPDATE_PREFIXES: [&str; 4] = ["insert", "update", "delete", "create"];

/// Runs statements on a borrowed connection.
///
/// The executor never opens or closes the connection; callers sharing one
/// connection serialize access through the `&mut` borrow.
pub struct StatementExecutor<'c> {
    conn: &'c mut dyn DatabaseConnection,
}

impl<'c> StatementExecutor<'c> {
    /// Creates an executor borrowing `conn`.
    pub fn new(conn: &'c mut dyn DatabaseConnection) -> Self {
        Self { conn }
    }

    /// Runs a literal query and returns its rows as a JSON array of objects.
    ///
    /// Returns an empty string (not `[]`) when the driver reports no result set.
    pub async fn execute_query(&mut self, sql: &str) -> Result<String> {
        debug!("Executing query: {}", sql);

        let mut statement = self.conn.create_statement().await?;
        let records = match statement.execute_query(sql).await? {
            Some(mut cursor) => materialize(cursor.as_mut()).await?,
            None => {
                debug!("Query produced no result set");
                return Ok(String::new());
            }
        };
        drop(statement);

        debug!("Query returned {} rows", records.len());
        serialize_records(&records)
    }

    /// Runs a query with positional parameters described by `json_params`.
    ///
    /// The parameter list is decoded before any statement is created.
    pub async fn execute_prepared_query(&mut self, sql: &str, json_params: &str) -> Result<String> {
        let params = decode_parameters(json_params)?;
        debug!("Executing prepared query with {} parameters: {}", params.len(), sql);

        let mut statement = self.conn.prepare_statement(sql).await?;
        bind_parameters(statement.as_mut(), &params)?;
        let records = match statement.execute_query().await? {
            Some(mut cursor) => materialize(cursor.as_mut()).await?,
            None => {
                debug!("Query produced no result set");
                return Ok(String::new());
            }
        };
        drop(statement);

        debug!("Query returned {} rows", records.len());
        serialize_records(&records)
    }

    /// Runs a literal data-manipulation statement and returns the affected row count.
    pub async fn execute_update(&mut self, sql: &str) -> Result<u64> {
        debug!("Executing update: {}", sql);

        let mut statement = self.conn.create_statement().await?;
        let count = statement.execute_update(sql).await?;
        drop(statement);

        debug!("Update affected {} rows", count);
        Ok(count)
    }

    /// Runs a data-manipulation statement with positional parameters.
    pub async fn execute_prepared_update(&mut self, sql: &str, json_params: &str) -> Result<u64> {
        let params = decode_parameters(json_params)?;
        debug!("Executing prepared update with {} parameters: {}", params.len(), sql);

        let mut statement = self.conn.prepare_statement(sql).await?;
        bind_parameters(statement.as_mut(), &params)?;
        let count = statement.execute_update().await?;
        drop(statement);

        debug!("Update affected {} rows", count);
        Ok(count)
    }

    /// Routes `sql` to the query or update path by its leading keyword, using
    /// the prepared variant when parameters are given.
    pub async fn execute(&mut self, sql: &str, json_params: Option<&str>) -> Result<ExecutionOutcome> {
        self.execute_as(StatementKind::classify(sql), sql, json_params)
            .await
    }

    /// Like [`execute`](Self::execute), with the statement kind chosen by the caller.
    pub async fn execute_as(
        &mut self,
        kind: StatementKind,
        sql: &str,
        json_params: Option<&str>,
    ) -> Result<ExecutionOutcome> {
        match (kind, json_params) {
            (StatementKind::Update, Some(params)) => self
                .execute_prepared_update(sql, params)
                .await
                .map(ExecutionOutcome::Updated),
            (StatementKind::Update, None) => {
                self.execute_update(sql).await.map(ExecutionOutcome::Updated)
            }
            (StatementKind::Query, Some(params)) => self
                .execute_prepared_query(sql, params)
                .await
                .map(ExecutionOutcome::Rows),
            (StatementKind::Query, None) => {
                self.execute_query(sql).await.map(ExecutionOutcome::Rows)
            }
        }
    }
}

/// How [`StatementExecutor::execute`] runs a statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    /// Returns rows.
    Query,
    /// Returns an affected row count.
    Update,
}

impl StatementKind {
    /// Statements starting with INSERT, UPDATE, DELETE or CREATE are updates;
    /// everything else is a query.
    pub fn classify(sql: &str) -> Self {
        let head = sql.trim_start();
        let is_update = UPDATE_PREFIXES.iter().any(|prefix| {
            head.get(..prefix.len())
                .is_some_and(|start| start.eq_ignore_ascii_case(prefix))
        });
        if is_update {
            Self::Update
        } else {
            Self::Query
        }
    }
}

/// Result of [`StatementExecutor::execute`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionOutcome {
    /// Serialized rows (or an empty string for a missing result set).
    Rows(String),
    /// Affected row count.
    Updated(u64),
}

impl fmt::Display for ExecutionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rows(json) => write!(f, "{json}"),
            Self::Updated(count) => write!(f, "{count}"),
        }
    }
}

/// Binds each descriptor at its 1-based position.
fn bind_parameters(
    statement: &mut (dyn PreparedStatement + '_),
    params: &[ParameterDescriptor],
) -> Result<()> {
    for (index, param) in params.iter().enumerate() {
        let position = index + 1;
        let value = param.to_value(position)?;
        trace!("Binding {} parameter at position {}", value.kind(), position);
        statement.bind(position, value)?;
    }
    Ok(())
}

/// Reads every remaining row of `cursor` into name-keyed records.
async fn materialize(cursor: &mut (dyn Cursor + '_)) -> Result<Vec<Record>> {
    let names: Vec<String> = cursor.columns().iter().map(|c| c.name.clone()).collect();

    let mut records = Vec::new();
    while let Some(row) = cursor.next_row().await? {
        let mut record = Record::with_capacity(names.len());
        for (name, value) in names.iter().zip(row) {
            record.insert(name.as_str(), value);
        }
        records.push(record);
    }
    Ok(records)
}

fn serialize_records(records: &[Record]) -> Result<String> {
    serde_json::to_string(records)
        .map_err(|e| BridgeError::internal(format!("Failed to serialize rows: {e}")))
}
