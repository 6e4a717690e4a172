//! sqlbridge - run SQL statements with JSON-described parameters and get the
//! rows back as a JSON array of objects.
//!
//! The core entry point is [`executor::StatementExecutor`], which borrows an
//! open [`db::DatabaseConnection`] and runs literal or prepared queries and
//! updates against it.

pub mod cli;
pub mod config;
pub mod db;
pub mod error;
pub mod executor;
pub mod logging;
pub mod params;
