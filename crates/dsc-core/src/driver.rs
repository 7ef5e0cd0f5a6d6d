//! Native driver contract.
//!
//! These traits describe the generic relational client the connection layer
//! sits on. A [`Driver`] opens [`NativeDatabase`] handles from a DSN; a
//! database handle can begin a [`NativeTransaction`].
//!
//! `#[async_trait]` is used so the traits stay object safe: connections hold
//! `Box<dyn NativeDatabase>` and never know the concrete driver.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use once_cell::sync::Lazy;
use parking_lot::RwLock;

use crate::error::DriverError;

/// Opens native database handles.
#[async_trait::async_trait]
pub trait Driver: Send + Sync {
    /// Open a handle for the given DSN.
    async fn open(&self, dsn: &str) -> Result<Box<dyn NativeDatabase>, DriverError>;
}

/// A physical database handle.
#[async_trait::async_trait]
pub trait NativeDatabase: Send + Sync {
    /// Execute a statement, returning the number of affected rows.
    async fn execute(&self, sql: &str) -> Result<u64, DriverError>;

    /// Liveness probe.
    async fn ping(&self) -> Result<(), DriverError>;

    /// Begin a transaction.
    async fn begin(&self) -> Result<Box<dyn NativeTransaction>, DriverError>;

    /// Set the maximum lifetime of links held by the handle.
    fn set_conn_max_lifetime(&self, lifetime: Duration);

    /// Set the maximum number of idle links kept by the handle.
    fn set_max_idle_conns(&self, count: usize);

    /// Close the handle.
    async fn close(&self) -> Result<(), DriverError>;
}

/// An in-flight transaction.
///
/// Finishing a transaction consumes it, so a committed or rolled back
/// handle cannot be used again.
#[async_trait::async_trait]
pub trait NativeTransaction: Send + Sync {
    /// Execute a statement inside the transaction.
    async fn execute(&self, sql: &str) -> Result<u64, DriverError>;

    /// Commit the transaction.
    async fn commit(self: Box<Self>) -> Result<(), DriverError>;

    /// Roll the transaction back.
    async fn rollback(self: Box<Self>) -> Result<(), DriverError>;
}

/// Lookup table from driver name to driver.
#[derive(Clone, Default)]
pub struct DriverRegistry {
    drivers: HashMap<String, Arc<dyn Driver>>,
}

impl DriverRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) a driver.
    pub fn register(&mut self, name: impl Into<String>, driver: Arc<dyn Driver>) {
        self.drivers.insert(name.into(), driver);
    }

    /// Builder form of [`DriverRegistry::register`].
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, driver: Arc<dyn Driver>) -> Self {
        self.register(name, driver);
        self
    }

    /// Look a driver up by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<dyn Driver>> {
        self.drivers.get(name).cloned()
    }

    /// Registered driver names.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.drivers.keys().map(String::as_str)
    }
}

impl fmt::Debug for DriverRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.names().collect();
        names.sort_unstable();
        f.debug_struct("DriverRegistry")
            .field("drivers", &names)
            .finish()
    }
}

static GLOBAL_DRIVERS: Lazy<RwLock<DriverRegistry>> =
    Lazy::new(|| RwLock::new(DriverRegistry::new()));

/// Register a driver in the process-wide registry.
pub fn register_driver(name: impl Into<String>, driver: Arc<dyn Driver>) {
    let name = name.into();
    tracing::debug!(driver = %name, "registering driver");
    GLOBAL_DRIVERS.write().register(name, driver);
}

/// Look a driver up in the process-wide registry.
pub fn lookup_driver(name: &str) -> Option<Arc<dyn Driver>> {
    GLOBAL_DRIVERS.read().get(name)
}

/// Snapshot of the process-wide registry.
pub fn drivers() -> DriverRegistry {
    GLOBAL_DRIVERS.read().clone()
}
