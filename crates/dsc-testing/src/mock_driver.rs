//! In-memory mock driver.
//!
//! [`MockDriver`] implements the native driver contract without any I/O.
//! Every handle it opens shares one [`MockState`] with the driver, so a test
//! can count calls, inspect executed statements and tuning values, and flip
//! fault switches while connections are in use.
//!
//! ## Example
//!
//! ```rust,ignore
//! use dsc_testing::MockDriver;
//!
//! let driver = MockDriver::builder()
//!     .with_affected("DELETE FROM jobs", 3)
//!     .with_failing_statement("SET ROLE missing")
//!     .build();
//!
//! let drivers = driver.registry("pg");
//! // hand `drivers` to ConnectionProvider::builder(...).drivers(drivers)
//! driver.fail_pings(true);
//! ```

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use dsc_core::{Driver, DriverError, DriverRegistry, NativeDatabase, NativeTransaction};
use parking_lot::Mutex;

/// Counters, recordings and fault switches shared by a driver and its handles.
#[derive(Debug, Default)]
pub struct MockState {
    next_id: AtomicU64,
    opens: AtomicUsize,
    closes: AtomicUsize,
    pings: AtomicUsize,
    begins: AtomicUsize,
    commits: AtomicUsize,
    rollbacks: AtomicUsize,
    dsns: Mutex<Vec<String>>,
    executed: Mutex<Vec<String>>,
    lifetimes: Mutex<Vec<(u64, Duration)>>,
    idle_limits: Mutex<Vec<(u64, usize)>>,
    closed_ids: Mutex<Vec<u64>>,
    affected: Mutex<HashMap<String, u64>>,
    failing_statements: Mutex<HashSet<String>>,
    fail_open: AtomicBool,
    fail_ping: AtomicBool,
    stall_ping: AtomicBool,
    fail_begin: AtomicBool,
    fail_commit: AtomicBool,
    fail_rollback: AtomicBool,
}

/// Mock driver handing out [`MockDatabase`] handles.
#[derive(Debug, Clone, Default)]
pub struct MockDriver {
    state: Arc<MockState>,
}

/// Builder for [`MockDriver`].
#[derive(Debug, Default)]
pub struct MockDriverBuilder {
    affected: HashMap<String, u64>,
    failing: HashSet<String>,
    fail_open: bool,
}

impl MockDriverBuilder {
    /// Report `count` affected rows for a statement.
    #[must_use]
    pub fn with_affected(mut self, sql: impl Into<String>, count: u64) -> Self {
        self.affected.insert(sql.into(), count);
        self
    }

    /// Fail whenever this statement is executed.
    #[must_use]
    pub fn with_failing_statement(mut self, sql: impl Into<String>) -> Self {
        self.failing.insert(sql.into());
        self
    }

    /// Fail every open.
    #[must_use]
    pub fn with_failing_open(mut self) -> Self {
        self.fail_open = true;
        self
    }

    /// Build the driver.
    #[must_use]
    pub fn build(self) -> MockDriver {
        let driver = MockDriver::new();
        *driver.state.affected.lock() = self.affected;
        *driver.state.failing_statements.lock() = self.failing;
        driver.fail_opens(self.fail_open);
        driver
    }
}

impl MockDriver {
    /// Create a driver where every call succeeds.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a builder.
    #[must_use]
    pub fn builder() -> MockDriverBuilder {
        MockDriverBuilder::default()
    }

    /// Registry holding this driver under `name`.
    #[must_use]
    pub fn registry(&self, name: &str) -> DriverRegistry {
        DriverRegistry::new().with(name, Arc::new(self.clone()))
    }

    /// Shared state.
    #[must_use]
    pub fn state(&self) -> &MockState {
        &self.state
    }

    /// Toggle open failures.
    pub fn fail_opens(&self, fail: bool) {
        self.state.fail_open.store(fail, Ordering::SeqCst);
    }

    /// Toggle ping failures on every handle.
    pub fn fail_pings(&self, fail: bool) {
        self.state.fail_ping.store(fail, Ordering::SeqCst);
    }

    /// Make pings on every handle hang until the caller gives up.
    pub fn stall_pings(&self, stall: bool) {
        self.state.stall_ping.store(stall, Ordering::SeqCst);
    }

    /// Toggle begin failures.
    pub fn fail_begins(&self, fail: bool) {
        self.state.fail_begin.store(fail, Ordering::SeqCst);
    }

    /// Toggle commit failures.
    pub fn fail_commits(&self, fail: bool) {
        self.state.fail_commit.store(fail, Ordering::SeqCst);
    }

    /// Toggle rollback failures.
    pub fn fail_rollbacks(&self, fail: bool) {
        self.state.fail_rollback.store(fail, Ordering::SeqCst);
    }

    /// Fail whenever `sql` is executed from now on.
    pub fn fail_statement(&self, sql: impl Into<String>) {
        self.state.failing_statements.lock().insert(sql.into());
    }

    /// Number of handles opened.
    #[must_use]
    pub fn opens(&self) -> usize {
        self.state.opens.load(Ordering::SeqCst)
    }

    /// Number of handles closed.
    #[must_use]
    pub fn closes(&self) -> usize {
        self.state.closes.load(Ordering::SeqCst)
    }

    /// Number of pings.
    #[must_use]
    pub fn pings(&self) -> usize {
        self.state.pings.load(Ordering::SeqCst)
    }

    /// Number of transactions begun.
    #[must_use]
    pub fn begins(&self) -> usize {
        self.state.begins.load(Ordering::SeqCst)
    }

    /// Number of commits attempted.
    #[must_use]
    pub fn commits(&self) -> usize {
        self.state.commits.load(Ordering::SeqCst)
    }

    /// Number of rollbacks attempted.
    #[must_use]
    pub fn rollbacks(&self) -> usize {
        self.state.rollbacks.load(Ordering::SeqCst)
    }

    /// DSNs passed to `open`, in order.
    #[must_use]
    pub fn dsns(&self) -> Vec<String> {
        self.state.dsns.lock().clone()
    }

    /// Statements executed, in order, across all handles.
    #[must_use]
    pub fn executed(&self) -> Vec<String> {
        self.state.executed.lock().clone()
    }

    /// `(handle id, lifetime)` pairs from `set_conn_max_lifetime`.
    #[must_use]
    pub fn lifetimes(&self) -> Vec<(u64, Duration)> {
        self.state.lifetimes.lock().clone()
    }

    /// `(handle id, count)` pairs from `set_max_idle_conns`.
    #[must_use]
    pub fn idle_limits(&self) -> Vec<(u64, usize)> {
        self.state.idle_limits.lock().clone()
    }

    /// Ids of closed handles, in close order.
    #[must_use]
    pub fn closed_ids(&self) -> Vec<u64> {
        self.state.closed_ids.lock().clone()
    }
}

#[async_trait::async_trait]
impl Driver for MockDriver {
    async fn open(&self, dsn: &str) -> Result<Box<dyn NativeDatabase>, DriverError> {
        let state = &self.state;
        state.dsns.lock().push(dsn.to_string());
        if state.fail_open.load(Ordering::SeqCst) {
            return Err(DriverError::transient("connection refused"));
        }

        state.opens.fetch_add(1, Ordering::SeqCst);
        let id = state.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::trace!(id, dsn, "mock handle opened");
        Ok(Box::new(MockDatabase {
            id,
            state: Arc::clone(&self.state),
            closed: AtomicBool::new(false),
        }))
    }
}

/// Handle opened by [`MockDriver`]. Ids start at 1 in open order.
#[derive(Debug)]
pub struct MockDatabase {
    id: u64,
    state: Arc<MockState>,
    closed: AtomicBool,
}

impl MockDatabase {
    fn check_open(&self) -> Result<(), DriverError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(DriverError::transient("database is closed"));
        }
        Ok(())
    }
}

fn execute_statement(state: &MockState, sql: &str) -> Result<u64, DriverError> {
    state.executed.lock().push(sql.to_string());
    if state.failing_statements.lock().contains(sql) {
        return Err(DriverError::new(format!("statement rejected: {sql}")));
    }
    Ok(state.affected.lock().get(sql).copied().unwrap_or(0))
}

#[async_trait::async_trait]
impl NativeDatabase for MockDatabase {
    async fn execute(&self, sql: &str) -> Result<u64, DriverError> {
        self.check_open()?;
        execute_statement(&self.state, sql)
    }

    async fn ping(&self) -> Result<(), DriverError> {
        self.state.pings.fetch_add(1, Ordering::SeqCst);
        self.check_open()?;
        if self.state.stall_ping.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if self.state.fail_ping.load(Ordering::SeqCst) {
            return Err(DriverError::transient("connection reset by peer"));
        }
        Ok(())
    }

    async fn begin(&self) -> Result<Box<dyn NativeTransaction>, DriverError> {
        self.check_open()?;
        if self.state.fail_begin.load(Ordering::SeqCst) {
            return Err(DriverError::new("cannot begin transaction"));
        }
        self.state.begins.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockTransaction {
            state: Arc::clone(&self.state),
        }))
    }

    fn set_conn_max_lifetime(&self, lifetime: Duration) {
        self.state.lifetimes.lock().push((self.id, lifetime));
    }

    fn set_max_idle_conns(&self, count: usize) {
        self.state.idle_limits.lock().push((self.id, count));
    }

    async fn close(&self) -> Result<(), DriverError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Err(DriverError::new("database already closed"));
        }
        self.state.closes.fetch_add(1, Ordering::SeqCst);
        self.state.closed_ids.lock().push(self.id);
        Ok(())
    }
}

/// Transaction begun on a [`MockDatabase`].
#[derive(Debug)]
pub struct MockTransaction {
    state: Arc<MockState>,
}

#[async_trait::async_trait]
impl NativeTransaction for MockTransaction {
    async fn execute(&self, sql: &str) -> Result<u64, DriverError> {
        execute_statement(&self.state, sql)
    }

    async fn commit(self: Box<Self>) -> Result<(), DriverError> {
        self.state.commits.fetch_add(1, Ordering::SeqCst);
        if self.state.fail_commit.load(Ordering::SeqCst) {
            return Err(DriverError::new("commit failed"));
        }
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), DriverError> {
        self.state.rollbacks.fetch_add(1, Ordering::SeqCst);
        if self.state.fail_rollback.load(Ordering::SeqCst) {
            return Err(DriverError::new("rollback failed"));
        }
        Ok(())
    }
}
