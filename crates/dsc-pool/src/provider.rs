//! SQL connection provider.
//!
//! The provider mediates between the bounded pool and fresh-connection
//! manufacture. Nothing happens in the background: staleness checks and
//! tuning are applied lazily, when a pooled connection is checked out.

use std::sync::Arc;

use dsc_core::{
    Config, Connection, DialectRegistry, Driver, DriverRegistry, Error, dialects, lookup_driver,
};

use crate::config::{PoolTuning, STALE_AFTER};
use crate::error::PoolError;
use crate::pool::{ConnectionPool, PendingCheckout, PoolStatus, PooledConnection, Slot};

/// Hands out connections to a single datastore target.
pub struct ConnectionProvider {
    config: Arc<Config>,
    pool: ConnectionPool,
    tuning: PoolTuning,
    drivers: Option<DriverRegistry>,
    dialects: Arc<DialectRegistry>,
}

impl ConnectionProvider {
    /// Create a provider using the process-wide driver and dialect registries.
    pub fn new(config: Config) -> Result<Self, PoolError> {
        Self::builder(config).build()
    }

    /// Create a provider builder.
    #[must_use]
    pub fn builder(config: Config) -> ConnectionProviderBuilder {
        ConnectionProviderBuilder {
            config,
            drivers: None,
            dialects: None,
        }
    }

    /// Get the provider configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Get the underlying pool container.
    #[must_use]
    pub fn pool(&self) -> &ConnectionPool {
        &self.pool
    }

    /// Get the current pool status.
    #[must_use]
    pub fn status(&self) -> PoolStatus {
        self.pool.status()
    }

    /// Open a brand-new connection.
    ///
    /// Resolves the DSN, opens a native handle, runs every init statement in
    /// order and wraps the handle with the dialect resolved for the driver.
    /// The first failing statement aborts; nothing is undone.
    pub async fn new_connection(&self) -> Result<Connection, PoolError> {
        let config = &self.config;
        let dsn = config.dsn_descriptor()?;
        let driver = self.driver()?;

        tracing::debug!(
            driver = %config.driver_name,
            descriptor = %config.descriptor,
            "opening connection"
        );
        let db = driver.open(&dsn).await.map_err(|source| Error::Open {
            driver: config.driver_name.clone(),
            descriptor: config.descriptor.clone(),
            source,
        })?;

        for statement in &config.init_sql {
            tracing::debug!(statement = %statement, "executing init SQL");
            db.execute(statement)
                .await
                .map_err(|source| Error::InitSql {
                    statement: statement.clone(),
                    descriptor: config.descriptor.clone(),
                    source,
                })?;
        }

        let dialect = self.dialects.resolve(&config.driver_name);
        let conn = Connection::new(db, dialect);
        tracing::debug!(
            id = conn.id(),
            transactions = conn.supports_transactions(),
            "connection opened"
        );
        Ok(conn)
    }

    /// Check a connection out of the pool.
    ///
    /// Waits while the pool is at capacity. A pooled connection idle for
    /// longer than [`STALE_AFTER`] is pinged first; when the ping fails it is
    /// closed and a new connection is returned in its place.
    pub async fn get(&self) -> Result<PooledConnection, PoolError> {
        let slot = self.pool.acquire().await?;
        self.checkout(slot).await
    }

    /// Check a connection out only if a slot is free right now.
    pub async fn try_get(&self) -> Result<Option<PooledConnection>, PoolError> {
        match self.pool.try_acquire()? {
            Some(slot) => self.checkout(slot).await.map(Some),
            None => Ok(None),
        }
    }

    /// Close the provider.
    ///
    /// Idle connections are closed; connections still checked out are closed
    /// when they are returned.
    pub async fn close(&self) {
        for conn in self.pool.close() {
            let id = conn.id();
            if let Err(e) = conn.close_now().await {
                tracing::warn!(id, error = %e, "failed to close idle connection");
            }
        }
        tracing::info!(
            driver = %self.config.driver_name,
            descriptor = %self.config.descriptor,
            "connection provider closed"
        );
    }

    /// Check if the provider is closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.pool.is_closed()
    }

    async fn checkout(&self, slot: Slot) -> Result<PooledConnection, PoolError> {
        let conn = match self.pool.dequeue() {
            Some(conn) => self.recycle(conn).await?,
            None => self.new_connection().await?,
        };
        tracing::trace!(id = conn.id(), "connection checked out");
        Ok(PooledConnection::new(conn, self.pool.clone(), slot))
    }

    async fn recycle(&self, conn: Connection) -> Result<Connection, PoolError> {
        let conn = PendingCheckout::new(conn);
        let probe = match conn.idle_for() {
            Some(idle) if idle > STALE_AFTER => {
                tracing::debug!(id = conn.id(), idle = ?idle, "probing stale connection");
                conn.ping().await
            }
            _ => Ok(()),
        };

        self.tuning.apply(conn.database());

        let conn = conn.into_inner();
        match probe {
            Ok(()) => Ok(conn),
            Err(e) => {
                let id = conn.id();
                tracing::warn!(
                    id,
                    error = %e,
                    "stale connection failed liveness probe, reconnecting"
                );
                if let Err(e) = conn.close_now().await {
                    tracing::warn!(id, error = %e, "failed to close stale connection");
                }
                self.new_connection().await
            }
        }
    }

    fn driver(&self) -> Result<Arc<dyn Driver>, Error> {
        let name = &self.config.driver_name;
        let driver = match &self.drivers {
            Some(registry) => registry.get(name),
            None => lookup_driver(name),
        };
        driver.ok_or_else(|| Error::UnknownDriver(name.clone()))
    }
}

impl std::fmt::Debug for ConnectionProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionProvider")
            .field("driver", &self.config.driver_name)
            .field("descriptor", &self.config.descriptor)
            .field("pool", &self.pool)
            .field("tuning", &self.tuning)
            .finish()
    }
}

/// Builder for [`ConnectionProvider`].
#[derive(Debug)]
pub struct ConnectionProviderBuilder {
    config: Config,
    drivers: Option<DriverRegistry>,
    dialects: Option<Arc<DialectRegistry>>,
}

impl ConnectionProviderBuilder {
    /// Resolve drivers from this registry instead of the process-wide one.
    #[must_use]
    pub fn drivers(mut self, drivers: DriverRegistry) -> Self {
        self.drivers = Some(drivers);
        self
    }

    /// Resolve dialects from this registry instead of the process-wide one.
    #[must_use]
    pub fn dialects(mut self, dialects: impl Into<Arc<DialectRegistry>>) -> Self {
        self.dialects = Some(dialects.into());
        self
    }

    /// Build the provider.
    ///
    /// An unset (zero) `max_pool_size` becomes 1.
    pub fn build(self) -> Result<ConnectionProvider, PoolError> {
        let mut config = self.config;
        config
            .validate()
            .map_err(|e| PoolError::Configuration(e.to_string()))?;
        if config.max_pool_size == 0 {
            config.max_pool_size = 1;
        }

        let pool = ConnectionPool::new(config.effective_pool_size());
        let tuning = PoolTuning::from_config(&config);
        tracing::debug!(
            driver = %config.driver_name,
            max_pool_size = config.max_pool_size,
            "created connection provider"
        );

        Ok(ConnectionProvider {
            config: Arc::new(config),
            pool,
            tuning,
            drivers: self.drivers,
            dialects: self.dialects.unwrap_or_else(dialects),
        })
    }
}
