use std::pin::pin;

use futures_util::{Stream, StreamExt};

use crate::config::WriteOptions;
use crate::error::SqlMiddlewareDbError;
use crate::executor::batch_update_on;
use crate::session::Session;
use crate::transaction::Transaction;
use crate::types::RowValues;

/// Totals reported when a sink ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WriteSummary {
    pub rows_written: u64,
    pub batches: u64,
}

/// Where a sink's batches run.
enum SinkBinding {
    /// A session owned by the sink, released when the sink ends.
    Owned(Option<Session>),
    /// The connection of a running transaction, resolved on every flush.
    Transaction(Transaction),
}

impl SinkBinding {
    fn session(&self) -> Result<Session, SqlMiddlewareDbError> {
        match self {
            SinkBinding::Owned(Some(session)) => Ok(session.clone()),
            SinkBinding::Owned(None) => Err(SqlMiddlewareDbError::ExecutionError(
                "write sink has no session".into(),
            )),
            SinkBinding::Transaction(tx) => tx.session(),
        }
    }

    fn release(&mut self) {
        if let SinkBinding::Owned(session) = self {
            session.take();
        }
    }
}

#[derive(Debug)]
enum SinkState {
    Open,
    Ended(WriteSummary),
    Failed(String),
}

/// Buffered sink of parameter tuples for one SQL template.
///
/// Tuples accumulate until `buffer_size` is reached and are then sent as one batched
/// execution. [`WriteSink::end`] flushes the remainder and releases the session. A failed flush
/// fails the sink: the session is released and later writes are rejected.
///
/// A sink created from a [`Transaction`] runs on the transaction's connection and stops working
/// once the transaction body returns. Tuples still buffered in such a sink when the body returns
/// fail the commit.
pub struct WriteSink {
    binding: SinkBinding,
    sql: String,
    buffer: Vec<Vec<RowValues>>,
    buffer_size: usize,
    summary: WriteSummary,
    state: SinkState,
}

impl std::fmt::Debug for WriteSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WriteSink")
            .field("sql", &self.sql)
            .field("buffered", &self.buffer.len())
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl WriteSink {
    pub(crate) fn new(session: Session, sql: &str, options: WriteOptions) -> Self {
        Self::bound(SinkBinding::Owned(Some(session)), sql, options)
    }

    pub(crate) fn in_transaction(tx: Transaction, sql: &str, options: WriteOptions) -> Self {
        Self::bound(SinkBinding::Transaction(tx), sql, options)
    }

    fn bound(binding: SinkBinding, sql: &str, options: WriteOptions) -> Self {
        let buffer_size = options.buffer_size.max(1);
        Self {
            binding,
            sql: sql.to_owned(),
            buffer: Vec::with_capacity(buffer_size),
            buffer_size,
            summary: WriteSummary::default(),
            state: SinkState::Open,
        }
    }

    fn ensure_open(&self) -> Result<(), SqlMiddlewareDbError> {
        match &self.state {
            SinkState::Open => Ok(()),
            SinkState::Ended(_) => Err(SqlMiddlewareDbError::ExecutionError(
                "write sink already ended".into(),
            )),
            SinkState::Failed(reason) => Err(SqlMiddlewareDbError::ExecutionError(format!(
                "write sink failed earlier: {reason}"
            ))),
        }
    }

    /// Tuples waiting for the next flush.
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    #[must_use]
    pub fn summary(&self) -> WriteSummary {
        self.summary
    }

    /// Queue one tuple, flushing when the buffer is full.
    ///
    /// # Errors
    /// Returns `ExecutionError` once the sink has ended or failed, or once its transaction has
    /// completed, or the batch error (with the SQL and every tuple of the batch attached) if the
    /// flush fails.
    pub async fn write(&mut self, tuple: Vec<RowValues>) -> Result<(), SqlMiddlewareDbError> {
        self.ensure_open()?;
        if let SinkBinding::Transaction(tx) = &self.binding {
            tx.session()?;
            tx.buffered_tuples(1);
        }
        self.buffer.push(tuple);
        if self.buffer.len() >= self.buffer_size {
            self.flush().await?;
        }
        Ok(())
    }

    /// Drain `tuples` into the sink.
    ///
    /// # Errors
    /// Stops at the first failed write.
    pub async fn write_all<S>(&mut self, tuples: S) -> Result<(), SqlMiddlewareDbError>
    where
        S: Stream<Item = Vec<RowValues>>,
    {
        let mut tuples = pin!(tuples);
        while let Some(tuple) = tuples.next().await {
            self.write(tuple).await?;
        }
        Ok(())
    }

    /// Flush what is buffered, release the session and report totals. Calling it again returns
    /// the same totals.
    ///
    /// # Errors
    /// Returns the batch error if the final flush fails, or `ExecutionError` if the sink had
    /// already failed.
    pub async fn end(&mut self) -> Result<WriteSummary, SqlMiddlewareDbError> {
        if let SinkState::Ended(summary) = self.state {
            return Ok(summary);
        }
        self.ensure_open()?;
        if let SinkBinding::Transaction(tx) = &self.binding {
            if let Err(err) = tx.session() {
                return Err(self.fail(err));
            }
        }
        if !self.buffer.is_empty() {
            self.flush().await?;
        }
        self.binding.release();
        self.state = SinkState::Ended(self.summary);
        tracing::debug!(
            rows = self.summary.rows_written,
            batches = self.summary.batches,
            "write sink ended"
        );
        Ok(self.summary)
    }

    async fn flush(&mut self) -> Result<(), SqlMiddlewareDbError> {
        let batch = std::mem::take(&mut self.buffer);
        if let SinkBinding::Transaction(tx) = &self.binding {
            tx.flushed_tuples(batch.len());
        }
        let session = match self.binding.session() {
            Ok(session) => session,
            Err(err) => return Err(self.fail(err)),
        };
        match batch_update_on(&session, &self.sql, &batch).await {
            Ok(_) => {
                self.summary.rows_written += batch.len() as u64;
                self.summary.batches += 1;
                tracing::debug!(session = session.id(), tuples = batch.len(), "write sink flushed");
                Ok(())
            }
            Err(err) => Err(self.fail(err)),
        }
    }

    fn fail(&mut self, err: SqlMiddlewareDbError) -> SqlMiddlewareDbError {
        self.state = SinkState::Failed(err.to_string());
        self.binding.release();
        err
    }
}

impl Drop for WriteSink {
    fn drop(&mut self) {
        if matches!(self.state, SinkState::Open) && !self.buffer.is_empty() {
            tracing::warn!(
                sql = %self.sql,
                buffered = self.buffer.len(),
                "write sink dropped without end(); buffered tuples were not written"
            );
        }
    }
}
