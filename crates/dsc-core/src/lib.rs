//! # dsc-core
//!
//! Driver-agnostic datastore connectivity primitives.
//!
//! This crate holds everything a connection provider needs that is not the
//! pool itself:
//!
//! - **Config**: endpoint descriptor, DSN placeholder expansion, init SQL,
//!   pool size and tuning parameters
//! - **Dialects**: capability lookup by driver name (transaction support)
//! - **Drivers**: the object-safe native client contract and a registry
//! - **Connection**: one native handle plus at most one transaction, with
//!   transaction calls gated by the dialect
//!
//! ## Example
//!
//! ```rust,ignore
//! use dsc_core::{Config, Connection, get_datastore_dialect, lookup_driver};
//!
//! let config = Config::new("pg", "host=[host] dbname=app").parameter("host", "db");
//! let driver = lookup_driver(&config.driver_name).expect("driver registered");
//! let db = driver.open(&config.dsn_descriptor()?).await?;
//! let mut conn = Connection::new(db, get_datastore_dialect(&config.driver_name));
//!
//! conn.begin().await?;
//! conn.execute("INSERT INTO audit (event) VALUES ('login')").await?;
//! conn.commit().await?;
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod config;
pub mod connection;
pub mod dialect;
pub mod driver;
pub mod error;

pub use config::Config;
pub use connection::{CLOSE_NOW_LIFETIME, Connection, HandleKind, NativeHandle};
pub use dialect::{
    DialectDescriptor, DialectRegistry, dialects, get_datastore_dialect, install_dialects,
};
pub use driver::{
    Driver, DriverRegistry, NativeDatabase, NativeTransaction, drivers, lookup_driver,
    register_driver,
};
pub use error::{DriverError, Error, Result};
