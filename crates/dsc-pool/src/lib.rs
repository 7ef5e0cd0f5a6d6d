//! # dsc-pool
//!
//! Bounded connection provider for driver-agnostic SQL datastores.
//!
//! The provider keeps up to `max_pool_size` connections checked out at once
//! and recycles returned ones. Work is done lazily at checkout:
//!
//! - Connections idle for more than 60 seconds are pinged before reuse
//! - A connection failing the ping is closed and replaced by a new one
//! - `connMaxLifetimeMs` / `maxIdleConns` parameters are pushed to the
//!   native handle
//!
//! Transactions are gated by the driver's dialect: for backends without
//! transaction support, begin/commit/rollback succeed as no-ops.
//!
//! ## Example
//!
//! ```rust,ignore
//! use dsc_core::Config;
//! use dsc_pool::ConnectionProvider;
//!
//! let config = Config::new("pg", "host=[host] dbname=app")
//!     .parameter("host", "db.internal")
//!     .init_sql("SET TIME ZONE 'UTC'")
//!     .max_pool_size(8);
//!
//! let provider = ConnectionProvider::new(config)?;
//! let mut conn = provider.get().await?;
//! conn.begin().await?;
//! conn.execute("UPDATE accounts SET active = true").await?;
//! conn.commit().await?;
//! // Connection returned to the pool on drop
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod config;
pub mod error;
pub mod pool;
pub mod provider;

pub use config::{PoolTuning, STALE_AFTER};
pub use error::PoolError;
pub use pool::{ConnectionPool, PoolStatus, PooledConnection};
pub use provider::{ConnectionProvider, ConnectionProviderBuilder};
