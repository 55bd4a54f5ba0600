//! Core error types for SalesFlow realtime synchronization.
//!
//! Transport-specific errors (WebSocket, protocol framing) are owned by the
//! transport crates and only logged; the errors here cover what a caller of
//! this crate can actually get back.

use thiserror::Error;

/// Type alias for Result using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Root error type for the realtime synchronization layer.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid event filter: {0}")]
    Filter(#[from] FilterError),

    #[error("Invalid cache key: {0}")]
    InvalidCacheKey(String),

    #[error("Invalid configuration value: {0}")]
    InvalidConfigValue(String),

    #[error("No async runtime available: {0}")]
    Runtime(String),
}

/// Errors raised while parsing a `column=op.value` row filter.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FilterError {
    #[error("expected `column=op.value`, got '{0}'")]
    Malformed(String),

    #[error("column name is empty in '{0}'")]
    EmptyColumn(String),

    #[error("unsupported operator '{0}'")]
    UnsupportedOperator(String),

    #[error("`in` filter must be a parenthesised list, got '{0}'")]
    InvalidList(String),
}
