//! Connection with dialect-gated transactions.
//!
//! ## Transaction States
//!
//! ```text
//! NoTransaction -> Active (via begin(), transactional dialects only)
//! Active -> NoTransaction (via commit() or rollback(), success or failure)
//! any -> Closed (via close_now(), terminal)
//! ```
//!
//! For dialects without transaction support every transaction call is a
//! successful no-op and no transaction handle is ever created.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::time::Instant;

use crate::dialect::DialectDescriptor;
use crate::driver::{NativeDatabase, NativeTransaction};
use crate::error::{Error, Result};

/// Lifetime applied to the native handle right before [`Connection::close_now`]
/// closes it, so links still held by the driver retire immediately.
pub const CLOSE_NOW_LIFETIME: Duration = Duration::from_millis(1000);

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Selects which native handle [`Connection::native`] returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleKind {
    /// The database handle.
    Database,
    /// The active transaction handle.
    Transaction,
}

/// A borrowed native handle.
pub enum NativeHandle<'a> {
    /// The database handle.
    Database(&'a dyn NativeDatabase),
    /// The active transaction, if any.
    Transaction(Option<&'a dyn NativeTransaction>),
}

impl fmt::Debug for NativeHandle<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Database(_) => f.write_str("NativeHandle::Database"),
            Self::Transaction(Some(_)) => f.write_str("NativeHandle::Transaction(active)"),
            Self::Transaction(None) => f.write_str("NativeHandle::Transaction(none)"),
        }
    }
}

/// One physical database handle plus at most one active transaction.
pub struct Connection {
    id: u64,
    db: Box<dyn NativeDatabase>,
    tx: Option<Box<dyn NativeTransaction>>,
    dialect: DialectDescriptor,
    created_at: Instant,
    last_used: Option<Instant>,
}

impl Connection {
    /// Wrap an opened native handle.
    pub fn new(db: Box<dyn NativeDatabase>, dialect: DialectDescriptor) -> Self {
        Self {
            id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
            db,
            tx: None,
            dialect,
            created_at: Instant::now(),
            last_used: None,
        }
    }

    /// Process-unique connection id.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Dialect the connection was created with.
    #[must_use]
    pub fn dialect(&self) -> &DialectDescriptor {
        &self.dialect
    }

    /// Check if transaction calls reach the backend.
    #[must_use]
    pub fn supports_transactions(&self) -> bool {
        self.dialect.supports_transactions()
    }

    /// Check if a transaction is in flight.
    #[must_use]
    pub fn in_transaction(&self) -> bool {
        self.tx.is_some()
    }

    /// When the connection was created.
    #[must_use]
    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    /// When the connection was last handed back by its holder.
    #[must_use]
    pub fn last_used(&self) -> Option<Instant> {
        self.last_used
    }

    /// Set the last-used timestamp. Owned by the pooling layer.
    pub fn set_last_used(&mut self, at: Option<Instant>) {
        self.last_used = at;
    }

    /// Time elapsed since the connection was last used.
    #[must_use]
    pub fn idle_for(&self) -> Option<Duration> {
        self.last_used.map(|at| at.elapsed())
    }

    /// Begin a transaction.
    ///
    /// A no-op for dialects without transaction support. Fails with
    /// [`Error::TransactionAlreadyActive`] when a transaction is in flight;
    /// the active transaction is left untouched.
    pub async fn begin(&mut self) -> Result<()> {
        if !self.supports_transactions() {
            return Ok(());
        }
        if self.tx.is_some() {
            return Err(Error::TransactionAlreadyActive);
        }
        let tx = self.db.begin().await?;
        self.tx = Some(tx);
        Ok(())
    }

    /// Commit the active transaction.
    ///
    /// The transaction handle is cleared whether or not the commit succeeds.
    pub async fn commit(&mut self) -> Result<()> {
        if !self.supports_transactions() {
            return Ok(());
        }
        let tx = self.tx.take().ok_or(Error::NoActiveTransaction)?;
        tx.commit().await?;
        Ok(())
    }

    /// Roll the active transaction back.
    ///
    /// The transaction handle is cleared whether or not the rollback succeeds.
    pub async fn rollback(&mut self) -> Result<()> {
        if !self.supports_transactions() {
            return Ok(());
        }
        let tx = self.tx.take().ok_or(Error::NoActiveTransaction)?;
        tx.rollback().await?;
        Ok(())
    }

    /// Execute a statement, inside the active transaction if there is one.
    pub async fn execute(&self, sql: &str) -> Result<u64> {
        let affected = match &self.tx {
            Some(tx) => tx.execute(sql).await?,
            None => self.db.execute(sql).await?,
        };
        Ok(affected)
    }

    /// Probe the native handle.
    pub async fn ping(&self) -> Result<()> {
        self.db.ping().await?;
        Ok(())
    }

    /// Retire and close the native handle.
    ///
    /// Consumes the connection; an active transaction is abandoned to the
    /// driver.
    pub async fn close_now(mut self) -> Result<()> {
        if self.tx.take().is_some() {
            tracing::warn!(id = self.id, "closing connection with an active transaction");
        }
        self.db.set_conn_max_lifetime(CLOSE_NOW_LIFETIME);
        self.db.close().await?;
        tracing::trace!(id = self.id, "connection closed");
        Ok(())
    }

    /// Borrow the native handle selected by `kind`.
    #[must_use]
    pub fn native(&self, kind: HandleKind) -> NativeHandle<'_> {
        match kind {
            HandleKind::Database => NativeHandle::Database(self.database()),
            HandleKind::Transaction => NativeHandle::Transaction(self.transaction()),
        }
    }

    /// Borrow the native database handle.
    #[must_use]
    pub fn database(&self) -> &dyn NativeDatabase {
        self.db.as_ref()
    }

    /// Borrow the native transaction handle, if one is active.
    #[must_use]
    pub fn transaction(&self) -> Option<&dyn NativeTransaction> {
        self.tx.as_deref()
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("dialect", &self.dialect.name())
            .field("in_transaction", &self.in_transaction())
            .field("last_used", &self.last_used)
            .finish()
    }
}
