//! Bounded connection pool container.
//!
//! Capacity is enforced with a semaphore: a permit is held for the whole
//! time a connection is checked out, so at most `capacity` connections are
//! outstanding and further checkouts wait. Idle connections sit in a FIFO
//! queue; returning one never blocks.

use std::collections::VecDeque;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use dsc_core::Connection;
use parking_lot::Mutex;
use tokio::sync::{OwnedSemaphorePermit, Semaphore, TryAcquireError};
use tokio::time::Instant;

use crate::error::PoolError;

/// A checkout slot. Dropping it frees the slot.
#[derive(Debug)]
pub struct Slot {
    _permit: OwnedSemaphorePermit,
}

/// Shared pool container.
#[derive(Clone)]
pub struct ConnectionPool {
    inner: Arc<PoolInner>,
}

struct PoolInner {
    capacity: usize,
    semaphore: Arc<Semaphore>,
    idle: Mutex<VecDeque<Connection>>,
    closed: AtomicBool,
}

impl ConnectionPool {
    /// Create a pool with room for `capacity` outstanding connections.
    ///
    /// A capacity of zero is treated as one.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner: Arc::new(PoolInner {
                capacity,
                semaphore: Arc::new(Semaphore::new(capacity)),
                idle: Mutex::new(VecDeque::new()),
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Maximum number of outstanding connections.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    /// Wait for a free slot.
    pub async fn acquire(&self) -> Result<Slot, PoolError> {
        if self.is_closed() {
            return Err(PoolError::PoolClosed);
        }
        tracing::trace!("acquiring pool slot");
        let permit = Arc::clone(&self.inner.semaphore)
            .acquire_owned()
            .await
            .map_err(|_| PoolError::PoolClosed)?;
        Ok(Slot { _permit: permit })
    }

    /// Take a free slot if one is available right now.
    pub fn try_acquire(&self) -> Result<Option<Slot>, PoolError> {
        match Arc::clone(&self.inner.semaphore).try_acquire_owned() {
            Ok(permit) => Ok(Some(Slot { _permit: permit })),
            Err(TryAcquireError::NoPermits) => Ok(None),
            Err(TryAcquireError::Closed) => Err(PoolError::PoolClosed),
        }
    }

    /// Take the oldest idle connection.
    pub fn dequeue(&self) -> Option<Connection> {
        self.inner.idle.lock().pop_front()
    }

    /// Return a connection to the idle queue.
    ///
    /// Hands the connection back when the pool is closed.
    pub fn enqueue(&self, conn: Connection) -> Result<(), Connection> {
        // `closed` is only written while holding this lock.
        let mut idle = self.inner.idle.lock();
        if self.is_closed() {
            return Err(conn);
        }
        idle.push_back(conn);
        Ok(())
    }

    /// Close the pool and drain the idle queue.
    ///
    /// Waiting and future checkouts fail with [`PoolError::PoolClosed`].
    pub fn close(&self) -> Vec<Connection> {
        let drained = {
            let mut idle = self.inner.idle.lock();
            self.inner.closed.store(true, Ordering::SeqCst);
            idle.drain(..).collect()
        };
        self.inner.semaphore.close();
        drained
    }

    /// Check if the pool is closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// Get the current pool status.
    #[must_use]
    pub fn status(&self) -> PoolStatus {
        let available = self.inner.idle.lock().len();
        let in_use = if self.is_closed() {
            0
        } else {
            self.inner.capacity - self.inner.semaphore.available_permits()
        };
        PoolStatus {
            available,
            in_use,
            max: self.inner.capacity,
        }
    }
}

impl std::fmt::Debug for ConnectionPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("status", &self.status())
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Status information about the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStatus {
    /// Number of idle connections available.
    pub available: usize,
    /// Number of connections currently checked out.
    pub in_use: usize,
    /// Maximum allowed outstanding connections.
    pub max: usize,
}

/// A connection checked out of the pool.
///
/// When dropped, the connection is returned to the pool with its last-used
/// time stamped. A connection still holding a transaction is closed instead,
/// so an in-flight transaction never reaches another caller.
pub struct PooledConnection {
    conn: Option<Connection>,
    pool: ConnectionPool,
    _slot: Slot,
}

impl PooledConnection {
    pub(crate) fn new(conn: Connection, pool: ConnectionPool, slot: Slot) -> Self {
        Self {
            conn: Some(conn),
            pool,
            _slot: slot,
        }
    }

    /// Return the connection to the pool.
    pub fn release(self) {
        drop(self);
    }

    /// Retire and close the connection. It never returns to the pool.
    pub async fn close_now(mut self) -> Result<(), PoolError> {
        match self.conn.take() {
            Some(conn) => conn.close_now().await.map_err(PoolError::from),
            None => Ok(()),
        }
    }

    /// Detach the connection from the pool, freeing its slot.
    #[must_use]
    pub fn detach(mut self) -> Option<Connection> {
        self.conn.take()
    }
}

impl Deref for PooledConnection {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        match &self.conn {
            Some(conn) => conn,
            None => unreachable!("pooled connection used after release"),
        }
    }
}

impl DerefMut for PooledConnection {
    fn deref_mut(&mut self) -> &mut Connection {
        match &mut self.conn {
            Some(conn) => conn,
            None => unreachable!("pooled connection used after release"),
        }
    }
}

impl std::fmt::Debug for PooledConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledConnection")
            .field("conn", &self.conn)
            .finish()
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        let Some(mut conn) = self.conn.take() else {
            return;
        };

        if conn.in_transaction() {
            tracing::warn!(
                id = conn.id(),
                "discarding connection returned with an active transaction"
            );
            discard(conn);
            return;
        }

        conn.set_last_used(Some(Instant::now()));
        tracing::trace!(id = conn.id(), "returning connection to pool");
        if let Err(conn) = self.pool.enqueue(conn) {
            tracing::debug!(id = conn.id(), "pool closed, discarding returned connection");
            discard(conn);
        }
    }
}

/// A connection taken from the idle queue whose checkout has not finished.
///
/// If the checkout is abandoned (its future dropped mid-probe), the
/// connection is discarded rather than leaked.
pub(crate) struct PendingCheckout {
    conn: Option<Connection>,
}

impl PendingCheckout {
    pub(crate) fn new(conn: Connection) -> Self {
        Self { conn: Some(conn) }
    }

    pub(crate) fn into_inner(mut self) -> Connection {
        match self.conn.take() {
            Some(conn) => conn,
            None => unreachable!("pending checkout already completed"),
        }
    }
}

impl Deref for PendingCheckout {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        match &self.conn {
            Some(conn) => conn,
            None => unreachable!("pending checkout already completed"),
        }
    }
}

impl Drop for PendingCheckout {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            tracing::debug!(id = conn.id(), "checkout abandoned, discarding connection");
            discard(conn);
        }
    }
}

/// Close a connection that cannot be pooled, in the background when a
/// runtime is available.
pub(crate) fn discard(conn: Connection) {
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => {
            handle.spawn(async move {
                let id = conn.id();
                if let Err(e) = conn.close_now().await {
                    tracing::warn!(id, error = %e, "failed to close discarded connection");
                }
            });
        }
        Err(_) => drop(conn),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_capacity_is_one() {
        let pool = ConnectionPool::new(0);
        assert_eq!(pool.capacity(), 1);
    }

    #[tokio::test]
    async fn test_slots_bounded_by_capacity() {
        let pool = ConnectionPool::new(2);

        let a = pool.acquire().await.unwrap();
        let b = pool.try_acquire().unwrap();
        assert!(b.is_some());
        assert!(pool.try_acquire().unwrap().is_none());
        assert_eq!(pool.status().in_use, 2);

        drop(a);
        assert!(pool.try_acquire().unwrap().is_some());
    }

    #[tokio::test]
    async fn test_acquire_waits_for_release() {
        let pool = ConnectionPool::new(1);
        let held = pool.acquire().await.unwrap();

        let waiter = {
            let pool = pool.clone();
            tokio::spawn(async move { pool.acquire().await.map(|_| ()) })
        };
        tokio::task::yield_now().await;
        assert!(!waiter.is_finished());

        drop(held);
        waiter.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_close_rejects_acquire() {
        let pool = ConnectionPool::new(1);
        assert!(pool.close().is_empty());
        assert!(pool.is_closed());

        assert!(matches!(pool.acquire().await, Err(PoolError::PoolClosed)));
        assert!(matches!(pool.try_acquire(), Err(PoolError::PoolClosed)));
        assert_eq!(pool.status().in_use, 0);
    }

    #[tokio::test]
    async fn test_close_wakes_waiters() {
        let pool = ConnectionPool::new(1);
        let _held = pool.acquire().await.unwrap();

        let waiter = {
            let pool = pool.clone();
            tokio::spawn(async move { pool.acquire().await.map(|_| ()) })
        };
        tokio::task::yield_now().await;
        pool.close();

        assert!(matches!(waiter.await.unwrap(), Err(PoolError::PoolClosed)));
    }

    #[test]
    fn test_large_capacity_allocates_lazily() {
        let pool = ConnectionPool::new(u32::MAX as usize);
        assert_eq!(pool.capacity(), u32::MAX as usize);
        assert_eq!(pool.status().available, 0);
    }

    #[test]
    fn test_empty_status() {
        let pool = ConnectionPool::new(3);
        assert_eq!(
            pool.status(),
            PoolStatus {
                available: 0,
                in_use: 0,
                max: 3
            }
        );
        assert!(pool.dequeue().is_none());
    }
}
