//! Pool error types.

use thiserror::Error;

/// Errors that can occur during pool operations.
#[derive(Debug, Error)]
pub enum PoolError {
    /// Pool is closed.
    #[error("pool is closed")]
    PoolClosed,

    /// Creating or using a connection failed.
    #[error(transparent)]
    Connection(#[from] dsc_core::Error),

    /// Pool configuration error.
    #[error("pool configuration error: {0}")]
    Configuration(String),
}

impl PoolError {
    /// Check if this error is transient and may succeed on retry.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Connection(err) => err.is_transient(),
            _ => false,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use dsc_core::DriverError;

    #[test]
    fn test_connection_error_is_transparent() {
        let err: PoolError = dsc_core::Error::NoActiveTransaction.into();
        assert_eq!(err.to_string(), "no active transaction");
    }

    #[test]
    fn test_transient_delegates() {
        let err: PoolError = dsc_core::Error::Driver(DriverError::transient("reset")).into();
        assert!(err.is_transient());
        assert!(!PoolError::PoolClosed.is_transient());
    }
}
