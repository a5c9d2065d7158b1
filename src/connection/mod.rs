pub mod config;
pub mod pool;

use std::sync::Arc;

use crate::store::MemStore;

pub use config::{ClientOptions, LogLevel};
pub use pool::{ConnectionPool, PoolGuard, PoolStats};

/// Handle to the embedded store.
///
/// The store lives in-process, so a connection carries no socket or
/// session state; it exists so the pool can bound concurrency and so
/// per-operation logging has a connection id to report.
pub struct Connection {
    id: u64,
    store: Arc<MemStore>,
}

impl Connection {
    pub(crate) fn new(id: u64, store: Arc<MemStore>) -> Self {
        Self { id, store }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn store(&self) -> &Arc<MemStore> {
        &self.store
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::SchemaRegistry;

    #[test]
    fn test_connection_creation() {
        let store = Arc::new(MemStore::new(SchemaRegistry::portfolio()));
        let conn = Connection::new(7, Arc::clone(&store));

        assert_eq!(conn.id(), 7);
        assert!(Arc::ptr_eq(conn.store(), &store));
    }
}
