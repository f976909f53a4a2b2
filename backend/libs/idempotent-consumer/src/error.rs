//! Error types for idempotent consumer library

use thiserror::Error;

/// Result type for ledger operations
pub type LedgerResult<T> = Result<T, LedgerError>;

/// Errors that can occur while reading or writing delivery bookkeeping
#[derive(Error, Debug)]
pub enum LedgerError {
    /// Redis operation failed (connection, command execution, etc.)
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// Key validation failed (empty, too long)
    #[error("Invalid ledger key: {0}")]
    InvalidKey(String),
}

impl LedgerError {
    /// Check if error is transient (connection dropped, timed out)
    pub fn is_transient(&self) -> bool {
        match self {
            LedgerError::Redis(err) => {
                err.is_io_error() || err.is_timeout() || err.is_connection_dropped()
            }
            LedgerError::InvalidKey(_) => false,
        }
    }
}
