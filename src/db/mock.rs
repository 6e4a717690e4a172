//! Spy database connection for testing.
//!
//! Returns scripted results, records every execution with its bound values,
//! and counts statements and cursors opened versus released.

use super::{
    BufferedCursor, ColumnInfo, Cursor, DatabaseBackend, DatabaseConnection, PreparedStatement,
    Row, Statement, Value,
};
use crate::error::{BridgeError, Result};
use async_trait::async_trait;

/// Resource counters kept by a [`SpyConnection`].
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SpyStats {
    /// Calls to `create_statement`.
    pub statements_created: usize,
    /// Calls to `prepare_statement`.
    pub statements_prepared: usize,
    /// Statements dropped.
    pub statements_released: usize,
    /// Cursors handed out.
    pub cursors_opened: usize,
    /// Cursors dropped.
    pub cursors_released: usize,
}

impl SpyStats {
    /// Statements created or prepared.
    pub fn statements_opened(&self) -> usize {
        self.statements_created + self.statements_prepared
    }

    /// True when every statement and cursor handed out has been released.
    pub fn all_released(&self) -> bool {
        self.statements_opened() == self.statements_released
            && self.cursors_opened == self.cursors_released
    }
}

/// One statement execution observed by the spy.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundCall {
    /// SQL text that was executed.
    pub sql: String,
    /// `(position, value)` pairs in bind order; empty for literal statements.
    pub params: Vec<(usize, Value)>,
}

#[derive(Debug, Clone)]
enum QueryScript {
    Rows(Vec<ColumnInfo>, Vec<Row>),
    Null,
}

/// A connection that never touches a database.
#[derive(Debug)]
pub struct SpyConnection {
    query_script: QueryScript,
    update_count: u64,
    failure: Option<String>,
    stats: SpyStats,
    executed: Vec<BoundCall>,
}

impl SpyConnection {
    /// Creates a spy whose queries return an empty result set and whose
    /// updates affect no rows.
    pub fn new() -> Self {
        Self {
            query_script: QueryScript::Rows(Vec::new(), Vec::new()),
            update_count: 0,
            failure: None,
            stats: SpyStats::default(),
            executed: Vec::new(),
        }
    }

    /// Makes queries return the given result set.
    pub fn with_result_set(mut self, columns: Vec<ColumnInfo>, rows: Vec<Row>) -> Self {
        self.query_script = QueryScript::Rows(columns, rows);
        self
    }

    /// Makes queries report no result set at all.
    pub fn with_null_result(mut self) -> Self {
        self.query_script = QueryScript::Null;
        self
    }

    /// Makes updates report `count` affected rows.
    pub fn with_update_count(mut self, count: u64) -> Self {
        self.update_count = count;
        self
    }

    /// Makes every execution fail with `message`.
    pub fn failing(mut self, message: impl Into<String>) -> Self {
        self.failure = Some(message.into());
        self
    }

    /// Resource counters so far.
    pub fn stats(&self) -> &SpyStats {
        &self.stats
    }

    /// Executions observed so far, in order.
    pub fn executed(&self) -> &[BoundCall] {
        &self.executed
    }

    fn record(&mut self, sql: &str, params: Vec<(usize, Value)>) -> Result<()> {
        self.executed.push(BoundCall {
            sql: sql.to_string(),
            params,
        });
        match &self.failure {
            Some(message) => Err(BridgeError::execution(message.clone())),
            None => Ok(()),
        }
    }

    fn open_cursor(&mut self) -> Option<Box<dyn Cursor + '_>> {
        match self.query_script.clone() {
            QueryScript::Null => None,
            QueryScript::Rows(columns, rows) => {
                self.stats.cursors_opened += 1;
                Some(Box::new(SpyCursor {
                    inner: BufferedCursor::new(columns, rows),
                    stats: &mut self.stats,
                }))
            }
        }
    }
}

impl Default for SpyConnection {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DatabaseConnection for SpyConnection {
    fn backend(&self) -> DatabaseBackend {
        DatabaseBackend::Sqlite
    }

    async fn create_statement<'c>(&'c mut self) -> Result<Box<dyn Statement + 'c>> {
        self.stats.statements_created += 1;
        Ok(Box::new(SpyStatement { conn: self }))
    }

    async fn prepare_statement<'c>(
        &'c mut self,
        sql: &str,
    ) -> Result<Box<dyn PreparedStatement + 'c>> {
        self.stats.statements_prepared += 1;
        Ok(Box::new(SpyPreparedStatement {
            conn: self,
            sql: sql.to_string(),
            params: Vec::new(),
        }))
    }

    async fn close(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}

struct SpyStatement<'c> {
    conn: &'c mut SpyConnection,
}

#[async_trait]
impl<'c> Statement for SpyStatement<'c> {
    async fn execute_query<'s>(&'s mut self, sql: &str) -> Result<Option<Box<dyn Cursor + 's>>> {
        self.conn.record(sql, Vec::new())?;
        Ok(self.conn.open_cursor())
    }

    async fn execute_update(&mut self, sql: &str) -> Result<u64> {
        self.conn.record(sql, Vec::new())?;
        Ok(self.conn.update_count)
    }
}

impl Drop for SpyStatement<'_> {
    fn drop(&mut self) {
        self.conn.stats.statements_released += 1;
    }
}

struct SpyPreparedStatement<'c> {
    conn: &'c mut SpyConnection,
    sql: String,
    params: Vec<(usize, Value)>,
}

impl SpyPreparedStatement<'_> {
    /// Placeholders are counted as `?` characters in the SQL text.
    fn check_parameter_count(&self) -> Result<()> {
        let expected = self.sql.matches('?').count();
        if self.params.len() != expected {
            return Err(BridgeError::execution(format!(
                "statement expects {expected} parameters but {} were bound",
                self.params.len()
            )));
        }
        Ok(())
    }

    fn execute(&mut self) -> Result<()> {
        let params = self.params.clone();
        let outcome = self.check_parameter_count();
        self.conn.record(&self.sql, params)?;
        outcome
    }
}

#[async_trait]
impl<'c> PreparedStatement for SpyPreparedStatement<'c> {
    fn bind(&mut self, position: usize, value: Value) -> Result<()> {
        if position == 0 {
            return Err(BridgeError::execution("parameter positions start at 1"));
        }
        self.params.push((position, value));
        Ok(())
    }

    async fn execute_query<'s>(&'s mut self) -> Result<Option<Box<dyn Cursor + 's>>> {
        self.execute()?;
        Ok(self.conn.open_cursor())
    }

    async fn execute_update(&mut self) -> Result<u64> {
        self.execute()?;
        Ok(self.conn.update_count)
    }
}

impl Drop for SpyPreparedStatement<'_> {
    fn drop(&mut self) {
        self.conn.stats.statements_released += 1;
    }
}

struct SpyCursor<'s> {
    inner: BufferedCursor,
    stats: &'s mut SpyStats,
}

#[async_trait]
impl<'s> Cursor for SpyCursor<'s> {
    fn columns(&self) -> &[ColumnInfo] {
        self.inner.columns()
    }

    async fn next_row(&mut self) -> Result<Option<Row>> {
        self.inner.next_row().await
    }
}

impl Drop for SpyCursor<'_> {
    fn drop(&mut self) {
        self.stats.cursors_released += 1;
    }
}
