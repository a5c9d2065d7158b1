use std::collections::VecDeque;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::connection::{ClientOptions, Connection};
use crate::core::{DbError, Result};
use crate::store::MemStore;

/// Fixed-capacity pool of store connections.
///
/// Connections to the embedded store are cheap, but the pool bounds
/// concurrent client work the same way a wire-protocol pool would:
/// `acquire` hands out an RAII guard and waits when `max_connections`
/// are already checked out.
pub struct ConnectionPool {
    options: ClientOptions,
    store: Arc<MemStore>,
    available: Mutex<VecDeque<Connection>>,
    total: AtomicUsize,
    next_id: AtomicU64,
}

impl ConnectionPool {
    /// Creates a pool and pre-opens `min_connections` connections.
    pub fn new(options: ClientOptions, store: Arc<MemStore>) -> Result<Self> {
        options.validate()?;

        let pool = Self {
            available: Mutex::new(VecDeque::with_capacity(options.max_connections)),
            total: AtomicUsize::new(0),
            next_id: AtomicU64::new(1),
            store,
            options,
        };

        let mut queue = pool.queue();
        for _ in 0..pool.options.min_connections {
            pool.total.fetch_add(1, Ordering::SeqCst);
            let connection = pool.open();
            queue.push_back(connection);
        }
        drop(queue);

        Ok(pool)
    }

    /// Checks a connection out of the pool, waiting up to the
    /// configured `acquire_timeout` when the pool is exhausted.
    pub async fn acquire(&self) -> Result<PoolGuard<'_>> {
        let deadline = Instant::now() + self.options.acquire_timeout;

        loop {
            if let Some(connection) = self.queue().pop_front() {
                return Ok(PoolGuard::new(self, connection));
            }

            if let Some(connection) = self.try_open() {
                return Ok(PoolGuard::new(self, connection));
            }

            if Instant::now() >= deadline {
                return Err(DbError::Execution(format!(
                    "timed out after {:?} waiting for a pooled connection",
                    self.options.acquire_timeout
                )));
            }

            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    pub fn stats(&self) -> PoolStats {
        let available = self.queue().len();
        let total = self.total.load(Ordering::SeqCst);

        PoolStats {
            total_connections: total,
            available_connections: available,
            active_connections: total.saturating_sub(available),
            max_connections: self.options.max_connections,
        }
    }

    /// Opens a new connection if the pool is under `max_connections`.
    fn try_open(&self) -> Option<Connection> {
        let mut total = self.total.load(Ordering::SeqCst);
        loop {
            if total >= self.options.max_connections {
                return None;
            }
            match self
                .total
                .compare_exchange(total, total + 1, Ordering::SeqCst, Ordering::SeqCst)
            {
                Ok(_) => return Some(self.open()),
                Err(current) => total = current,
            }
        }
    }

    fn open(&self) -> Connection {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        Connection::new(id, Arc::clone(&self.store))
    }

    // A poisoned queue still holds valid connections; recover it.
    fn queue(&self) -> MutexGuard<'_, VecDeque<Connection>> {
        self.available.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Connection pool statistics
#[derive(Debug, Clone)]
pub struct PoolStats {
    pub total_connections: usize,
    pub available_connections: usize,
    pub active_connections: usize,
    pub max_connections: usize,
}

impl std::fmt::Display for PoolStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Pool Stats: {}/{} active, {} available, max {}",
            self.active_connections,
            self.total_connections,
            self.available_connections,
            self.max_connections
        )
    }
}

/// RAII guard for pooled connections
///
/// Returns the connection to the pool when dropped
pub struct PoolGuard<'a> {
    pool: &'a ConnectionPool,
    connection: Option<Connection>,
}

impl<'a> PoolGuard<'a> {
    fn new(pool: &'a ConnectionPool, connection: Connection) -> Self {
        Self {
            pool,
            connection: Some(connection),
        }
    }

    pub fn connection(&self) -> &Connection {
        self.connection
            .as_ref()
            .expect("connection already returned to pool")
    }
}

impl std::fmt::Debug for PoolGuard<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolGuard")
            .field("connection", &self.connection.as_ref().map(Connection::id))
            .finish_non_exhaustive()
    }
}

impl Deref for PoolGuard<'_> {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        self.connection()
    }
}

impl DerefMut for PoolGuard<'_> {
    fn deref_mut(&mut self) -> &mut Connection {
        self.connection
            .as_mut()
            .expect("connection already returned to pool")
    }
}

impl Drop for PoolGuard<'_> {
    fn drop(&mut self) {
        if let Some(connection) = self.connection.take() {
            self.pool.queue().push_back(connection);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::SchemaRegistry;

    fn pool(max: usize, min: usize) -> ConnectionPool {
        let options = ClientOptions::new()
            .max_connections(max)
            .min_connections(min)
            .acquire_timeout(Duration::from_millis(50));
        let store = Arc::new(MemStore::new(SchemaRegistry::portfolio()));
        ConnectionPool::new(options, store).unwrap()
    }

    #[tokio::test]
    async fn test_pool_preopens_min_connections() {
        let pool = pool(5, 2);
        let stats = pool.stats();

        assert_eq!(stats.total_connections, 2);
        assert_eq!(stats.available_connections, 2);
        assert_eq!(stats.active_connections, 0);
    }

    #[tokio::test]
    async fn test_acquire_and_return() {
        let pool = pool(5, 1);

        {
            let guard = pool.acquire().await.unwrap();
            assert_eq!(guard.id(), 1);
            assert_eq!(pool.stats().active_connections, 1);
        }

        assert_eq!(pool.stats().active_connections, 0);
        assert_eq!(pool.stats().available_connections, 1);
    }

    #[tokio::test]
    async fn test_pool_grows_to_max() {
        let pool = pool(2, 0);

        let first = pool.acquire().await.unwrap();
        let second = pool.acquire().await.unwrap();
        assert_ne!(first.id(), second.id());
        assert_eq!(pool.stats().total_connections, 2);
    }

    #[tokio::test]
    async fn test_acquire_times_out_when_exhausted() {
        let pool = pool(1, 0);

        let _held = pool.acquire().await.unwrap();
        let err = pool.acquire().await.unwrap_err();
        assert!(err.to_string().contains("timed out"));
    }

    #[tokio::test]
    async fn test_stats_display() {
        let pool = pool(3, 1);
        let _guard = pool.acquire().await.unwrap();

        let rendered = pool.stats().to_string();
        assert_eq!(rendered, "Pool Stats: 1/1 active, 0 available, max 3");
    }
}
