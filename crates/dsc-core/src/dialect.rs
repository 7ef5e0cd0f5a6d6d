//! Datastore dialect capabilities.
//!
//! A dialect describes what a driver's backend can do. The connection layer
//! only consults transaction support: backends without it (flat files, most
//! document stores) accept transactional code paths as no-ops.
//!
//! Dialects are kept in a [`DialectRegistry`]. A process-wide registry is
//! created lazily with the built-in table, or installed once at startup via
//! [`install_dialects`]; after that it is read-only and lookups take no lock.

use std::collections::HashMap;
use std::sync::Arc;

use once_cell::sync::OnceCell;

/// Drivers whose backends support begin/commit/rollback.
const TRANSACTIONAL: &[&str] = &[
    "pg",
    "postgres",
    "mysql",
    "sqlite3",
    "sqlite",
    "mssql",
    "sqlserver",
    "oracle",
    "ora",
    "godror",
    "vertica",
    "snowflake",
];

/// Drivers whose backends silently accept transaction calls.
const NON_TRANSACTIONAL: &[&str] = &[
    "csv",
    "tsv",
    "json",
    "ndjson",
    "bigquery",
    "aerospike",
    "mongodb",
    "dynamodb",
    "firebase",
    "cassandra",
];

/// Capability descriptor for one driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DialectDescriptor {
    name: Arc<str>,
    supports_transactions: bool,
}

impl DialectDescriptor {
    /// Create a descriptor.
    pub fn new(name: impl Into<Arc<str>>, supports_transactions: bool) -> Self {
        Self {
            name: name.into(),
            supports_transactions,
        }
    }

    /// Descriptor used for drivers with no registered dialect.
    ///
    /// Anything reachable through a generic SQL client can begin a
    /// transaction, so unknown drivers are treated as transactional.
    pub fn generic(name: impl Into<Arc<str>>) -> Self {
        Self::new(name, true)
    }

    /// Dialect name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Check if begin/commit/rollback reach the backend.
    #[must_use]
    pub fn supports_transactions(&self) -> bool {
        self.supports_transactions
    }
}

/// Lookup table from driver name to dialect.
#[derive(Debug, Clone, Default)]
pub struct DialectRegistry {
    dialects: HashMap<String, DialectDescriptor>,
}

impl DialectRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry populated with the built-in dialects.
    #[must_use]
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        for name in TRANSACTIONAL {
            registry.register(*name, DialectDescriptor::new(*name, true));
        }
        for name in NON_TRANSACTIONAL {
            registry.register(*name, DialectDescriptor::new(*name, false));
        }
        registry
    }

    /// Register (or replace) the dialect for a driver name.
    pub fn register(&mut self, driver_name: impl Into<String>, dialect: DialectDescriptor) {
        self.dialects.insert(driver_name.into(), dialect);
    }

    /// Builder form of [`DialectRegistry::register`].
    #[must_use]
    pub fn with(mut self, driver_name: impl Into<String>, dialect: DialectDescriptor) -> Self {
        self.register(driver_name, dialect);
        self
    }

    /// Check if a driver name has a registered dialect.
    #[must_use]
    pub fn contains(&self, driver_name: &str) -> bool {
        self.dialects.contains_key(driver_name)
    }

    /// Resolve the dialect for a driver name.
    #[must_use]
    pub fn resolve(&self, driver_name: &str) -> DialectDescriptor {
        match self.dialects.get(driver_name) {
            Some(dialect) => dialect.clone(),
            None => {
                tracing::debug!(driver = driver_name, "no dialect registered, using generic");
                DialectDescriptor::generic(driver_name)
            }
        }
    }
}

static GLOBAL_DIALECTS: OnceCell<Arc<DialectRegistry>> = OnceCell::new();

/// Install the process-wide dialect registry.
///
/// Must happen before the first call to [`dialects`]; returns the rejected
/// registry when the global one is already initialized.
pub fn install_dialects(registry: DialectRegistry) -> Result<(), DialectRegistry> {
    let registry = Arc::new(registry);
    GLOBAL_DIALECTS
        .set(Arc::clone(&registry))
        .map_err(|_| Arc::unwrap_or_clone(registry))
}

/// Get the process-wide dialect registry, initializing it with the built-in
/// table if nothing was installed.
pub fn dialects() -> Arc<DialectRegistry> {
    Arc::clone(GLOBAL_DIALECTS.get_or_init(|| Arc::new(DialectRegistry::with_builtin())))
}

/// Resolve a driver name against the process-wide registry.
pub fn get_datastore_dialect(driver_name: &str) -> DialectDescriptor {
    dialects().resolve(driver_name)
}
