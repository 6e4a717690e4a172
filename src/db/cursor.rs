//! In-memory cursor over a fully fetched result set.

use super::{ColumnInfo, Cursor, Row};
use crate::error::Result;
use async_trait::async_trait;

/// A cursor over rows that were already fetched from the driver.
#[derive(Debug)]
pub struct BufferedCursor {
    columns: Vec<ColumnInfo>,
    rows: std::vec::IntoIter<Row>,
}

impl BufferedCursor {
    /// Creates a cursor yielding `rows` in order.
    pub fn new(columns: Vec<ColumnInfo>, rows: Vec<Row>) -> Self {
        Self {
            columns,
            rows: rows.into_iter(),
        }
    }
}

#[async_trait]
impl Cursor for BufferedCursor {
    fn columns(&self) -> &[ColumnInfo] {
        &self.columns
    }

    async fn next_row(&mut self) -> Result<Option<Row>> {
        Ok(self.rows.next())
    }
}
