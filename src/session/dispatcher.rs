use std::sync::mpsc::Receiver;

use crate::driver::{DriverConnection, StatementHandle};
use crate::error::SqlMiddlewareDbError;
use crate::pool::CheckedOut;

use super::channel::Command;

/// Connection state that never leaves the worker thread.
struct WorkerState {
    conn: CheckedOut,
    current: Option<StatementHandle>,
    auto_commit: bool,
}

impl WorkerState {
    fn driver(&mut self) -> &mut dyn DriverConnection {
        self.conn.connection()
    }

    fn require_current(&self, handle: StatementHandle) -> Result<(), SqlMiddlewareDbError> {
        if self.current == Some(handle) {
            Ok(())
        } else {
            Err(SqlMiddlewareDbError::ExecutionError(format!(
                "statement {handle} was superseded or closed"
            )))
        }
    }

    /// Close whatever statement is open so a new one can take its place.
    fn close_current(&mut self, session_id: u64) {
        if let Some(handle) = self.current.take() {
            if let Err(err) = self.driver().close(handle) {
                tracing::warn!(session = session_id, %handle, error = %err, "closing superseded statement failed");
            } else {
                tracing::debug!(session = session_id, %handle, "closed superseded statement");
            }
        }
    }
}

pub(super) fn run_session_worker(conn: CheckedOut, receiver: &Receiver<Command>, session_id: u64) {
    let mut state = WorkerState {
        conn,
        current: None,
        auto_commit: true,
    };

    while let Ok(command) = receiver.recv() {
        match command {
            Command::Shutdown => break,
            Command::Prepare {
                sql,
                keys,
                respond_to,
            } => {
                state.close_current(session_id);
                let res = state.driver().prepare(&sql, keys).map_err(Into::into);
                if let Ok(info) = &res {
                    state.current = Some(info.handle);
                }
                let _ = respond_to.send(res);
            }
            Command::Execute {
                handle,
                params,
                respond_to,
            } => {
                let res = state
                    .require_current(handle)
                    .and_then(|()| Ok(state.driver().execute(handle, &params)?));
                let _ = respond_to.send(res);
            }
            Command::FetchNext { handle, respond_to } => {
                let res = state
                    .require_current(handle)
                    .and_then(|()| Ok(state.driver().fetch_next(handle)?));
                let _ = respond_to.send(res);
            }
            Command::ExecuteBatch {
                handle,
                batch,
                respond_to,
            } => {
                let res = state
                    .require_current(handle)
                    .and_then(|()| Ok(state.driver().execute_batch(handle, &batch)?));
                let _ = respond_to.send(res);
            }
            Command::CloseStatement { handle, respond_to } => {
                // Closing a statement that was already superseded is a no-op.
                let res = if state.current == Some(handle) {
                    state.current = None;
                    tracing::debug!(session = session_id, %handle, "closing statement");
                    state.driver().close(handle).map_err(Into::into)
                } else {
                    Ok(())
                };
                if let Some(respond_to) = respond_to {
                    let _ = respond_to.send(res);
                } else if let Err(err) = res {
                    tracing::warn!(session = session_id, %handle, error = %err, "detached close failed");
                }
            }
            Command::SetAutoCommit {
                enabled,
                respond_to,
            } => {
                let res = state.driver().set_auto_commit(enabled).map_err(Into::into);
                if res.is_ok() {
                    state.auto_commit = enabled;
                }
                let _ = respond_to.send(res);
            }
            Command::Commit { respond_to } => {
                let _ = respond_to.send(state.driver().commit().map_err(Into::into));
            }
            Command::Rollback { respond_to } => {
                let _ = respond_to.send(state.driver().rollback().map_err(Into::into));
            }
            Command::CallProgram {
                name,
                input,
                respond_to,
            } => {
                let res = state.driver().call_program(&name, &input).map_err(Into::into);
                let _ = respond_to.send(res);
            }
            Command::OpenCatalog {
                request,
                respond_to,
            } => {
                state.close_current(session_id);
                let res = state.driver().catalog(&request).map_err(Into::into);
                if let Ok(cursor) = &res {
                    state.current = Some(cursor.handle);
                }
                let _ = respond_to.send(res);
            }
            Command::MarkBroken => {
                tracing::warn!(session = session_id, "connection marked broken");
                state.conn.broken = true;
            }
        }
    }

    release(state, session_id);
}

/// Put the connection back the way the pool expects it, then let it go.
fn release(mut state: WorkerState, session_id: u64) {
    state.close_current(session_id);
    if !state.auto_commit {
        let reset = state
            .driver()
            .rollback()
            .and_then(|()| state.driver().set_auto_commit(true));
        if let Err(err) = reset {
            tracing::warn!(session = session_id, error = %err, "could not reset connection; discarding it");
            state.conn.broken = true;
        }
    }
    if !state.driver().is_valid() {
        state.conn.broken = true;
    }
    tracing::debug!(session = session_id, broken = state.conn.broken, "releasing connection");
    drop(state);
}
