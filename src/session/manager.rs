use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Sender};
use std::thread;

use tokio::runtime::Handle;
use tokio::sync::oneshot;

use crate::error::SqlMiddlewareDbError;
use crate::pool::CheckedOut;

use super::channel::{Command, Reply};
use super::dispatcher::run_session_worker;

pub(super) struct SessionWorker {
    sender: Sender<Command>,
    id: u64,
    auto_commit: AtomicBool,
}

impl SessionWorker {
    pub(super) fn spawn(conn: CheckedOut, id: u64) -> Result<Self, SqlMiddlewareDbError> {
        let (sender, receiver) = mpsc::channel::<Command>();
        let handle = Handle::try_current().ok();
        thread::Builder::new()
            .name(format!("session-worker-{id}"))
            .spawn(move || {
                let runtime_guard = handle.as_ref().map(Handle::enter);
                run_session_worker(conn, &receiver, id);
                drop(runtime_guard);
            })
            .map_err(|err| {
                SqlMiddlewareDbError::ConnectionError(format!(
                    "failed to spawn session worker thread: {err}"
                ))
            })?;

        Ok(Self {
            sender,
            id,
            auto_commit: AtomicBool::new(true),
        })
    }

    pub(super) fn id(&self) -> u64 {
        self.id
    }

    pub(super) fn auto_commit(&self) -> bool {
        self.auto_commit.load(Ordering::Acquire)
    }

    pub(super) fn set_auto_commit_flag(&self, enabled: bool) {
        self.auto_commit.store(enabled, Ordering::Release);
    }

    pub(super) fn send_command(&self, command: Command) -> Result<(), SqlMiddlewareDbError> {
        self.sender
            .send(command)
            .map_err(|_| connection_error("session worker closed"))
    }

    pub(super) async fn request<T>(
        &self,
        build: impl FnOnce(Reply<T>) -> Command,
        drop_message: &'static str,
    ) -> Result<T, SqlMiddlewareDbError> {
        let (tx, rx) = oneshot::channel();
        self.send_command(build(tx))?;
        rx.await.map_err(|_| connection_error(drop_message))?
    }
}

impl Drop for SessionWorker {
    fn drop(&mut self) {
        let _ = self.sender.send(Command::Shutdown);
    }
}

fn connection_error(message: &str) -> SqlMiddlewareDbError {
    SqlMiddlewareDbError::ConnectionError(message.into())
}
