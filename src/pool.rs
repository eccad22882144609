use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use bb8::{ManageConnection, Pool, PooledConnection};

use crate::driver::{Driver, DriverConnection, DriverError};
use crate::error::SqlMiddlewareDbError;

/// bb8 manager that opens physical connections through a [`Driver`].
pub struct DriverManager {
    driver: Arc<dyn Driver>,
}

impl DriverManager {
    #[must_use]
    pub fn new(driver: Arc<dyn Driver>) -> Self {
        Self { driver }
    }

    /// Build a pool from this manager.
    ///
    /// # Errors
    /// Returns `SqlMiddlewareDbError` if creating the pool fails.
    pub async fn build_pool(
        self,
        max_size: u32,
        connection_timeout: Duration,
    ) -> Result<DriverPool, SqlMiddlewareDbError> {
        let name = self.driver.name().to_owned();
        Pool::builder()
            .max_size(max_size.max(1))
            .connection_timeout(connection_timeout)
            .build(self)
            .await
            .map_err(|e| SqlMiddlewareDbError::PoolError(format!("{name} pool error: {e}")))
    }
}

/// A driver connection as the pool holds it.
///
/// `broken` is set by the session worker when the connection's state could not be reset
/// (a failed rollback, a failed auto-commit restore). The pool drops broken connections
/// instead of handing them out again.
pub struct PooledDriverConnection {
    pub(crate) inner: Box<dyn DriverConnection>,
    pub(crate) broken: bool,
}

impl PooledDriverConnection {
    pub(crate) fn connection(&mut self) -> &mut dyn DriverConnection {
        self.inner.as_mut()
    }
}

impl ManageConnection for DriverManager {
    type Connection = PooledDriverConnection;
    type Error = DriverError;

    #[allow(clippy::manual_async_fn)]
    fn connect(&self) -> impl Future<Output = Result<Self::Connection, Self::Error>> + Send {
        let driver = Arc::clone(&self.driver);
        async move {
            let inner = tokio::task::spawn_blocking(move || driver.connect())
                .await
                .map_err(|e| DriverError::connection(format!("connect task failed: {e}")))??;
            tracing::debug!("opened driver connection");
            Ok(PooledDriverConnection {
                inner,
                broken: false,
            })
        }
    }

    #[allow(clippy::manual_async_fn)]
    fn is_valid(
        &self,
        conn: &mut Self::Connection,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send {
        let broken = conn.broken;
        async move {
            if broken {
                Err(DriverError::connection("connection was marked broken"))
            } else {
                Ok(())
            }
        }
    }

    fn has_broken(&self, conn: &mut Self::Connection) -> bool {
        conn.broken
    }
}

pub type DriverPool = Pool<DriverManager>;

/// A connection checked out of the pool for as long as a session lives.
pub type CheckedOut = PooledConnection<'static, DriverManager>;

/// Idle and total connection counts, for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolState {
    pub connections: u32,
    pub idle_connections: u32,
}

pub(crate) fn pool_state(pool: &DriverPool) -> PoolState {
    let state = pool.state();
    PoolState {
        connections: state.connections,
        idle_connections: state.idle_connections,
    }
}

/// Check a connection out for exclusive use.
///
/// # Errors
/// Returns [`SqlMiddlewareDbError::PoolError`] on checkout timeout, or the driver's error if a
/// new connection could not be opened.
pub(crate) async fn checkout(pool: &DriverPool) -> Result<CheckedOut, SqlMiddlewareDbError> {
    pool.get_owned().await.map_err(SqlMiddlewareDbError::from)
}
