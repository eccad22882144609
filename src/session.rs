//! Connection sessions.
//!
//! A [`Session`] exclusively owns one pooled connection. The connection lives on a dedicated
//! worker thread; every driver call is queued to that thread and answered over a oneshot, so
//! calls on one session run one at a time in submission order while the async caller never
//! blocks. The connection goes back to the pool when the last clone of the session is dropped.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::driver::{
    CatalogCursor, CatalogRequest, Execution, GeneratedKeys, PreparedInfo, StatementHandle,
    WireValue,
};
use crate::error::SqlMiddlewareDbError;
use crate::pool::{DriverPool, checkout};
use crate::types::RowValues;

mod channel;
mod dispatcher;
mod manager;

use channel::Command;
use manager::SessionWorker;

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

/// Handle to a worker-owned connection. Clones share the same session.
#[derive(Clone)]
pub struct Session {
    worker: Arc<SessionWorker>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.worker.id())
            .field("auto_commit", &self.worker.auto_commit())
            .finish()
    }
}

impl Session {
    /// Check a connection out of `pool` and start its worker.
    ///
    /// # Errors
    /// Returns [`SqlMiddlewareDbError`] if checkout fails or the worker thread cannot be spawned.
    pub async fn acquire(pool: &DriverPool) -> Result<Self, SqlMiddlewareDbError> {
        let conn = checkout(pool).await?;
        let id = NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed);
        let worker = SessionWorker::spawn(conn, id)?;
        tracing::debug!(session = id, "session acquired");
        Ok(Self {
            worker: Arc::new(worker),
        })
    }

    #[must_use]
    pub fn id(&self) -> u64 {
        self.worker.id()
    }

    #[must_use]
    pub fn auto_commit(&self) -> bool {
        self.worker.auto_commit()
    }

    /// Prepare `sql`, closing whatever statement the session had open.
    ///
    /// # Errors
    /// Returns the driver's error if the SQL is rejected.
    pub async fn prepare(
        &self,
        sql: &str,
        keys: GeneratedKeys,
    ) -> Result<PreparedInfo, SqlMiddlewareDbError> {
        let sql = sql.to_owned();
        self.worker
            .request(
                |respond_to| Command::Prepare {
                    sql,
                    keys,
                    respond_to,
                },
                "session worker dropped while preparing statement",
            )
            .await
    }

    /// Bind and run a prepared statement.
    ///
    /// # Errors
    /// Returns [`SqlMiddlewareDbError::ExecutionError`] for a superseded handle, or the driver's
    /// error if execution fails.
    pub async fn execute(
        &self,
        handle: StatementHandle,
        params: Vec<WireValue>,
    ) -> Result<Execution, SqlMiddlewareDbError> {
        self.worker
            .request(
                |respond_to| Command::Execute {
                    handle,
                    params,
                    respond_to,
                },
                "session worker dropped while executing statement",
            )
            .await
    }

    /// # Errors
    /// Returns [`SqlMiddlewareDbError::ExecutionError`] for a superseded handle, or the driver's
    /// error if the cursor cannot advance.
    pub async fn fetch_next(
        &self,
        handle: StatementHandle,
    ) -> Result<Option<Vec<WireValue>>, SqlMiddlewareDbError> {
        self.worker
            .request(
                |respond_to| Command::FetchNext { handle, respond_to },
                "session worker dropped while fetching",
            )
            .await
    }

    /// # Errors
    /// Returns [`SqlMiddlewareDbError::ExecutionError`] for a superseded handle, or the driver's
    /// error if the batch fails.
    pub async fn execute_batch(
        &self,
        handle: StatementHandle,
        batch: Vec<Vec<WireValue>>,
    ) -> Result<Vec<u64>, SqlMiddlewareDbError> {
        self.worker
            .request(
                |respond_to| Command::ExecuteBatch {
                    handle,
                    batch,
                    respond_to,
                },
                "session worker dropped while executing batch",
            )
            .await
    }

    /// Close `handle` if it is still the session's open statement.
    ///
    /// # Errors
    /// Returns the driver's error if the statement could not be released.
    pub async fn close_statement(&self, handle: StatementHandle) -> Result<(), SqlMiddlewareDbError> {
        self.worker
            .request(
                |respond_to| Command::CloseStatement {
                    handle,
                    respond_to: Some(respond_to),
                },
                "session worker dropped while closing statement",
            )
            .await
    }

    /// Queue a close without waiting for it. Used from destructors.
    pub(crate) fn close_statement_detached(&self, handle: StatementHandle) {
        let _ = self.worker.send_command(Command::CloseStatement {
            handle,
            respond_to: None,
        });
    }

    /// # Errors
    /// Returns the driver's error if the mode cannot be switched.
    pub async fn set_auto_commit(&self, enabled: bool) -> Result<(), SqlMiddlewareDbError> {
        self.worker
            .request(
                |respond_to| Command::SetAutoCommit {
                    enabled,
                    respond_to,
                },
                "session worker dropped while switching auto-commit",
            )
            .await?;
        self.worker.set_auto_commit_flag(enabled);
        Ok(())
    }

    /// # Errors
    /// Returns the driver's error if the commit fails.
    pub async fn commit(&self) -> Result<(), SqlMiddlewareDbError> {
        self.worker
            .request(
                |respond_to| Command::Commit { respond_to },
                "session worker dropped while committing",
            )
            .await
    }

    /// # Errors
    /// Returns the driver's error if the rollback fails.
    pub async fn rollback(&self) -> Result<(), SqlMiddlewareDbError> {
        self.worker
            .request(
                |respond_to| Command::Rollback { respond_to },
                "session worker dropped while rolling back",
            )
            .await
    }

    /// # Errors
    /// Returns the driver's error if the program call fails.
    pub async fn call_program(
        &self,
        name: &str,
        input: Vec<u8>,
    ) -> Result<Vec<u8>, SqlMiddlewareDbError> {
        let name = name.to_owned();
        self.worker
            .request(
                |respond_to| Command::CallProgram {
                    name,
                    input,
                    respond_to,
                },
                "session worker dropped while calling program",
            )
            .await
    }

    /// Open a catalog cursor. Like [`Session::prepare`], this supersedes any open statement.
    ///
    /// # Errors
    /// Returns the driver's error if the catalog cannot be read.
    pub async fn open_catalog(
        &self,
        request: CatalogRequest,
    ) -> Result<CatalogCursor, SqlMiddlewareDbError> {
        self.worker
            .request(
                |respond_to| Command::OpenCatalog {
                    request,
                    respond_to,
                },
                "session worker dropped while opening catalog",
            )
            .await
    }

    /// Flag the connection so the pool discards it on release.
    pub fn mark_broken(&self) {
        let _ = self.worker.send_command(Command::MarkBroken);
    }
}

/// Fail with a caller error when `params` does not match the placeholder count.
pub(crate) fn check_arity(
    info: &PreparedInfo,
    sql: &str,
    params: &[RowValues],
) -> Result<(), SqlMiddlewareDbError> {
    match info.parameter_count {
        Some(expected) if expected != params.len() => Err(SqlMiddlewareDbError::programming(
            format!(
                "statement expects {expected} parameters but {} were supplied",
                params.len()
            ),
            sql,
            &[params.to_vec()],
        )),
        _ => Ok(()),
    }
}
