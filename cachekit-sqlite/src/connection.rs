//! SQLite connection wrapper.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use tokio::sync::OwnedSemaphorePermit;
use tokio_rusqlite::Connection;
use tracing::{debug, trace};

use crate::error::{SqliteError, SqliteResult};

/// A pooled connection for returning to the pool.
pub(crate) struct PooledConnection {
    /// The underlying connection.
    pub conn: Connection,
    /// When this connection was created.
    pub created_at: Instant,
    /// When this connection was last used.
    pub last_used: Instant,
}

impl PooledConnection {
    pub fn new(conn: Connection) -> Self {
        let now = Instant::now();
        Self {
            conn,
            created_at: now,
            last_used: now,
        }
    }
}

/// A wrapper around a SQLite connection.
pub struct SqliteConnection {
    conn: Option<Connection>,
    #[allow(dead_code)]
    permit: OwnedSemaphorePermit,
    /// Channel to return the connection to the pool.
    return_to_pool: Option<Arc<Mutex<VecDeque<PooledConnection>>>>,
    /// When this connection was created (for pool tracking).
    created_at: Instant,
}

impl SqliteConnection {
    /// Create a new connection wrapper (non-pooled).
    pub fn new(conn: Connection, permit: OwnedSemaphorePermit) -> Self {
        Self {
            conn: Some(conn),
            permit,
            return_to_pool: None,
            created_at: Instant::now(),
        }
    }

    /// Create a new pooled connection wrapper.
    pub(crate) fn new_pooled(
        conn: Connection,
        permit: OwnedSemaphorePermit,
        return_to_pool: Option<Arc<Mutex<VecDeque<PooledConnection>>>>,
    ) -> Self {
        Self {
            conn: Some(conn),
            permit,
            return_to_pool,
            created_at: Instant::now(),
        }
    }

    /// Get the inner connection reference.
    fn conn(&self) -> &Connection {
        self.conn.as_ref().expect("Connection already taken")
    }

    /// Run a closure against the underlying blocking connection on the `tokio-rusqlite`
    /// worker thread. This is the primitive `ConnectionFactory` methods build on: each
    /// cache statement is a fixed, hand-written query rather than a dynamically built one,
    /// so there is no generic row-to-JSON materialization step here.
    pub async fn call<T>(
        &self,
        f: impl FnOnce(&rusqlite::Connection) -> rusqlite::Result<T> + Send + 'static,
    ) -> SqliteResult<T>
    where
        T: Send + 'static,
    {
        self.conn().call(move |conn| Ok(f(conn)?)).await.map_err(SqliteError::from)
    }

    /// Execute multiple statements in a batch.
    pub async fn execute_batch(&self, sql: &str) -> SqliteResult<()> {
        let sql = sql.to_string();
        debug!(sql = %sql, "Executing batch");

        self.conn()
            .call(move |conn| Ok(conn.execute_batch(&sql)?))
            .await
            .map_err(SqliteError::from)
    }
}

impl Drop for SqliteConnection {
    fn drop(&mut self) {
        // Return the connection to the pool if possible
        if let Some(pool) = self.return_to_pool.take() {
            if let Some(conn) = self.conn.take() {
                trace!("Returning connection to pool");
                let mut idle: parking_lot::MutexGuard<'_, VecDeque<PooledConnection>> = pool.lock();
                idle.push_back(PooledConnection {
                    conn,
                    created_at: self.created_at,
                    last_used: Instant::now(),
                });
            }
        }
        // Otherwise, the connection is just dropped
    }
}
