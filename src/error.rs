//! Error types for sqlbridge.
//!
//! The executor surfaces three kinds of failure (execution, parameter decode,
//! parameter conversion). The remaining variants belong to the binary's
//! connection and configuration plumbing.

use thiserror::Error;

/// Main error type for sqlbridge operations.
#[derive(Error, Debug)]
pub enum BridgeError {
    /// The database rejected or failed a statement (syntax errors, constraint
    /// violations, lost connectivity, placeholder count mismatches).
    #[error("Execution error: {0}")]
    Execution(String),

    /// The JSON parameter list is malformed or an element lacks a `value`.
    #[error("Parameter decode error: {0}")]
    ParameterDecode(String),

    /// A parameter's value cannot be parsed as its declared type.
    #[error("Parameter conversion error at position {position}: cannot read {value:?} as {expected}: {reason}")]
    ParameterConversion {
        /// 1-based bind position.
        position: usize,
        /// Declared parameter type.
        expected: &'static str,
        /// The offending literal.
        value: String,
        /// Parser message.
        reason: String,
    },

    /// Database connection errors (host unreachable, auth failed, etc.)
    #[error("Connection error: {0}")]
    Connection(String),

    /// Configuration errors (invalid config file, missing required fields, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal errors (unexpected states, serialization failures).
    #[error("Internal error: {0}")]
    Internal(String),
}

impl BridgeError {
    /// Creates an execution error with the given message.
    pub fn execution(msg: impl Into<String>) -> Self {
        Self::Execution(msg.into())
    }

    /// Creates a parameter decode error with the given message.
    pub fn parameter_decode(msg: impl Into<String>) -> Self {
        Self::ParameterDecode(msg.into())
    }

    /// Creates a parameter conversion error.
    pub fn parameter_conversion(
        position: usize,
        expected: &'static str,
        value: impl Into<String>,
        reason: impl ToString,
    ) -> Self {
        Self::ParameterConversion {
            position,
            expected,
            value: value.into(),
            reason: reason.to_string(),
        }
    }

    /// Creates a connection error with the given message.
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    /// Creates a configuration error with the given message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Creates an internal error with the given message.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Returns the error category as a string for display purposes.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Execution(_) => "Execution Error",
            Self::ParameterDecode(_) => "Parameter Decode Error",
            Self::ParameterConversion { .. } => "Parameter Conversion Error",
            Self::Connection(_) => "Connection Error",
            Self::Config(_) => "Configuration Error",
            Self::Internal(_) => "Internal Error",
        }
    }
}

impl From<sqlx::Error> for BridgeError {
    fn from(error: sqlx::Error) -> Self {
        Self::Execution(error.to_string())
    }
}

/// Result type alias using BridgeError.
pub type Result<T> = std::result::Result<T, BridgeError>;
