//! Database abstraction layer for sqlbridge.
//!
//! Provides the minimal statement/cursor interface the executor drives, so
//! different database backends can be used interchangeably. Statements and
//! cursors are released when dropped.

mod cursor;
pub mod mock;
mod postgres;
mod sqlite;
mod types;

pub use cursor::BufferedCursor;
pub use mock::{BoundCall, SpyConnection, SpyStats};
pub use types::{format_timestamp, parse_timestamp, ColumnInfo, Record, Row, Value, DATE_FORMAT};

use crate::config::ConnectionConfig;
use crate::error::Result;
use async_trait::async_trait;

/// Supported database backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseBackend {
    #[default]
    Postgres,
    Sqlite,
}

impl DatabaseBackend {
    /// Returns the backend as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Postgres => "postgres",
            Self::Sqlite => "sqlite",
        }
    }

    /// Parses a backend from a string.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "postgres" | "postgresql" => Some(Self::Postgres),
            "sqlite" | "sqlite3" => Some(Self::Sqlite),
            _ => None,
        }
    }

    /// Returns the default port for this backend, if it is networked.
    pub fn default_port(&self) -> Option<u16> {
        match self {
            Self::Postgres => Some(5432),
            Self::Sqlite => None,
        }
    }

    /// Returns the URL scheme for this backend.
    pub fn url_scheme(&self) -> &'static str {
        match self {
            Self::Postgres => "postgres",
            Self::Sqlite => "sqlite",
        }
    }
}

/// Opens a connection for the given configuration.
///
/// The caller owns the returned connection and is responsible for closing it.
pub async fn connect(config: &ConnectionConfig) -> Result<Box<dyn DatabaseConnection>> {
    match config.backend {
        DatabaseBackend::Postgres => Ok(Box::new(postgres::connect(config).await?)),
        DatabaseBackend::Sqlite => Ok(Box::new(sqlite::connect(config).await?)),
    }
}

/// An open database session.
#[async_trait]
pub trait DatabaseConnection: Send {
    /// The backend this connection talks to.
    fn backend(&self) -> DatabaseBackend;

    /// Creates a statement for running literal SQL.
    async fn create_statement<'c>(&'c mut self) -> Result<Box<dyn Statement + 'c>>;

    /// Prepares `sql` for execution with positional parameters.
    async fn prepare_statement<'c>(
        &'c mut self,
        sql: &str,
    ) -> Result<Box<dyn PreparedStatement + 'c>>;

    /// Closes the connection. Only the owner of a connection calls this.
    async fn close(self: Box<Self>) -> Result<()>;
}

/// A statement that runs caller-supplied SQL text.
#[async_trait]
pub trait Statement: Send {
    /// Runs a query. `None` means the driver produced no result set.
    async fn execute_query<'s>(&'s mut self, sql: &str) -> Result<Option<Box<dyn Cursor + 's>>>;

    /// Runs a data-manipulation statement and returns the affected row count.
    async fn execute_update(&mut self, sql: &str) -> Result<u64>;
}

/// A statement with positional placeholders.
#[async_trait]
pub trait PreparedStatement: Send {
    /// Binds `value` to the 1-based placeholder `position`.
    fn bind(&mut self, position: usize, value: Value) -> Result<()>;

    /// Runs the statement as a query. `None` means no result set.
    async fn execute_query<'s>(&'s mut self) -> Result<Option<Box<dyn Cursor + 's>>>;

    /// Runs the statement as an update and returns the affected row count.
    async fn execute_update(&mut self) -> Result<u64>;
}

/// Forward-only iteration over a result set.
#[async_trait]
pub trait Cursor: Send {
    /// Column metadata, in result order.
    fn columns(&self) -> &[ColumnInfo];

    /// Advances to the next row, or returns `None` when exhausted.
    async fn next_row(&mut self) -> Result<Option<Row>>;
}
