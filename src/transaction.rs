use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;

use crate::config::{ClientConfig, QueryOptions, WriteOptions};
use crate::cursor::Statement;
use crate::driver::GeneratedKeys;
use crate::error::SqlMiddlewareDbError;
use crate::executor::{
    AsyncDatabaseExecutor, Record, batch_update_on, insert_and_get_id_on, insert_rows_on, open_on,
    query_on, update_on,
};
use crate::pool::DriverPool;
use crate::results::ResultSet;
use crate::session::Session;
use crate::types::RowValues;
use crate::write::WriteSink;

struct TxShared {
    session: Mutex<Option<Session>>,
    config: ClientConfig,
    /// Tuples written to this transaction's sinks and not yet flushed.
    unflushed: AtomicUsize,
}

/// Transaction context handed to the body of [`crate::Client::transaction`].
///
/// Every statement issued through it runs on the transaction's connection. The handle is only
/// valid while the body runs; once the body returns, every call fails with
/// `ExecutionError("transaction already completed")`, including calls on clones kept past the
/// body. Operations on the unscoped client inside the body run outside the transaction.
#[derive(Clone)]
pub struct Transaction {
    inner: Arc<TxShared>,
}

impl Transaction {
    fn new(session: Session, config: ClientConfig) -> Self {
        Self {
            inner: Arc::new(TxShared {
                session: Mutex::new(Some(session)),
                config,
                unflushed: AtomicUsize::new(0),
            }),
        }
    }

    fn slot(&self) -> MutexGuard<'_, Option<Session>> {
        self.inner
            .session
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    pub(crate) fn session(&self) -> Result<Session, SqlMiddlewareDbError> {
        self.slot().clone().ok_or_else(|| {
            SqlMiddlewareDbError::ExecutionError("transaction already completed".into())
        })
    }

    fn invalidate(&self) {
        self.slot().take();
    }

    pub(crate) fn buffered_tuples(&self, count: usize) {
        self.inner.unflushed.fetch_add(count, Ordering::AcqRel);
    }

    pub(crate) fn flushed_tuples(&self, count: usize) {
        self.inner.unflushed.fetch_sub(count, Ordering::AcqRel);
    }

    fn unflushed(&self) -> usize {
        self.inner.unflushed.load(Ordering::Acquire)
    }

    /// `false` once the body has returned.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.slot().is_some()
    }

    /// A write sink whose batches run inside this transaction. The sink must be ended before the
    /// body returns; tuples left in it fail the commit.
    ///
    /// # Errors
    /// Returns `ExecutionError` if the transaction has completed.
    pub fn create_write_stream(
        &self,
        sql: &str,
        options: WriteOptions,
    ) -> Result<WriteSink, SqlMiddlewareDbError> {
        self.session()?;
        Ok(WriteSink::in_transaction(self.clone(), sql, options))
    }
}

#[async_trait]
impl AsyncDatabaseExecutor for Transaction {
    async fn query_with_options(
        &self,
        sql: &str,
        params: &[RowValues],
        options: QueryOptions,
    ) -> Result<ResultSet, SqlMiddlewareDbError> {
        query_on(&self.session()?, &self.inner.config, sql, params, options).await
    }

    async fn update(&self, sql: &str, params: &[RowValues]) -> Result<u64, SqlMiddlewareDbError> {
        update_on(&self.session()?, &self.inner.config, sql, params).await
    }

    async fn insert_and_get_id(
        &self,
        sql: &str,
        params: &[RowValues],
    ) -> Result<RowValues, SqlMiddlewareDbError> {
        insert_and_get_id_on(
            &self.session()?,
            &self.inner.config,
            sql,
            params,
            GeneratedKeys::Auto,
        )
        .await
    }

    async fn insert_list(
        &self,
        table: &str,
        key_column: &str,
        records: &[Record],
    ) -> Result<Vec<RowValues>, SqlMiddlewareDbError> {
        insert_rows_on(&self.session()?, &self.inner.config, table, key_column, records).await
    }

    async fn batch_update(
        &self,
        sql: &str,
        batch: &[Vec<RowValues>],
    ) -> Result<Vec<u64>, SqlMiddlewareDbError> {
        batch_update_on(&self.session()?, sql, batch).await
    }

    async fn execute(
        &self,
        sql: &str,
        params: &[RowValues],
    ) -> Result<Statement, SqlMiddlewareDbError> {
        open_on(
            &self.session()?,
            &self.inner.config,
            sql,
            params,
            GeneratedKeys::None,
            QueryOptions::default(),
        )
        .await
    }
}

/// Run `body` on one connection with auto-commit off.
///
/// Commits when the body succeeds. When it fails, rolls back and returns the body's error
/// unchanged. A body that succeeds while write sinks still hold unflushed tuples is rolled
/// back with an `ExecutionError`. Auto-commit is restored either way; a connection that cannot be restored is
/// flagged broken so the pool discards it. The connection is released when the session drops.
pub(crate) async fn run_transaction<F, Fut, T, E>(
    pool: &DriverPool,
    config: &ClientConfig,
    body: F,
) -> Result<T, E>
where
    F: FnOnce(Transaction) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: From<SqlMiddlewareDbError>,
{
    let session = Session::acquire(pool).await?;
    session.set_auto_commit(false).await?;
    tracing::debug!(session = session.id(), "transaction started");

    let tx = Transaction::new(session.clone(), config.clone());
    let outcome = body(tx.clone()).await;
    tx.invalidate();
    let outcome = match (outcome, tx.unflushed()) {
        (Ok(_), pending) if pending > 0 => {
            tracing::warn!(session = session.id(), pending, "write sinks not ended before commit");
            Err(E::from(SqlMiddlewareDbError::ExecutionError(format!(
                "transaction body returned with {pending} unflushed write-sink tuples; end() every sink before returning"
            ))))
        }
        (outcome, _) => outcome,
    };

    let result = match outcome {
        Ok(value) => match session.commit().await {
            Ok(()) => {
                tracing::debug!(session = session.id(), "transaction committed");
                Ok(value)
            }
            Err(err) => {
                tracing::warn!(session = session.id(), error = %err, "commit failed; rolling back");
                rollback(&session).await;
                Err(E::from(err))
            }
        },
        Err(err) => {
            rollback(&session).await;
            Err(err)
        }
    };

    if let Err(err) = session.set_auto_commit(true).await {
        tracing::warn!(session = session.id(), error = %err, "could not restore auto-commit");
        session.mark_broken();
    }
    result
}

async fn rollback(session: &Session) {
    match session.rollback().await {
        Ok(()) => tracing::debug!(session = session.id(), "transaction rolled back"),
        Err(err) => {
            tracing::warn!(session = session.id(), error = %err, "rollback failed");
            session.mark_broken();
        }
    }
}
