//! Error types.

use thiserror::Error;

/// Error reported by a native driver.
///
/// Drivers are free to describe failures however they like; the message is
/// carried verbatim into the higher-level [`Error`] variants. `transient`
/// marks failures that may succeed when attempted on a fresh connection
/// (dropped link, reset by peer, timeouts).
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct DriverError {
    message: String,
    transient: bool,
}

impl DriverError {
    /// Create a new driver error.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            transient: false,
        }
    }

    /// Create a driver error describing a lost or unusable link.
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            transient: true,
        }
    }

    /// Get the driver supplied message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Check if the failure is tied to the link rather than the request.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        self.transient
    }
}

/// Errors that can occur while opening or using a connection.
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid or incomplete configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// No driver registered under the configured name.
    #[error("unknown driver: {0}")]
    UnknownDriver(String),

    /// The driver failed to open a handle.
    #[error("failed to open connection to {driver} on {descriptor} due to {source}")]
    Open {
        /// Driver name.
        driver: String,
        /// Endpoint descriptor from the config.
        descriptor: String,
        /// Underlying driver failure.
        #[source]
        source: DriverError,
    },

    /// An initialization statement failed.
    #[error("failed to execute init SQL {statement} on {descriptor} due to {source}")]
    InitSql {
        /// The statement that failed.
        statement: String,
        /// Endpoint descriptor from the config.
        descriptor: String,
        /// Underlying driver failure.
        #[source]
        source: DriverError,
    },

    /// Commit or rollback was requested without a prior begin.
    #[error("no active transaction")]
    NoActiveTransaction,

    /// Begin was requested while a transaction is already in flight.
    #[error("transaction already active")]
    TransactionAlreadyActive,

    /// Driver failure outside of connection setup.
    #[error(transparent)]
    Driver(#[from] DriverError),
}

impl Error {
    /// Check if this error is transient and may succeed on a new connection.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Open { source, .. } | Self::Driver(source) => source.is_transient(),
            _ => false,
        }
    }

    /// Check if this error reports a transaction bookkeeping mistake by the caller.
    #[must_use]
    pub fn is_transaction_state(&self) -> bool {
        matches!(
            self,
            Self::NoActiveTransaction | Self::TransactionAlreadyActive
        )
    }
}

/// Result type alias for connection operations.
pub type Result<T> = std::result::Result<T, Error>;
