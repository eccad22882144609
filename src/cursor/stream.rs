use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::task::{Context, Poll};

use futures_util::{Stream, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::driver::StatementHandle;
use crate::error::SqlMiddlewareDbError;
use crate::marshal::row_to_native;
use crate::session::Session;
use crate::types::{ColumnMetadata, RowValues};

type RowResult = Result<Vec<RowValues>, SqlMiddlewareDbError>;

/// Fetched-but-unconsumed row accounting shared by producer and consumer.
#[derive(Debug, Default)]
struct Occupancy {
    current: AtomicUsize,
    peak: AtomicUsize,
}

impl Occupancy {
    fn fetched(&self) {
        let now = self.current.fetch_add(1, Ordering::AcqRel) + 1;
        self.peak.fetch_max(now, Ordering::AcqRel);
    }

    fn consumed(&self) {
        self.current.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Everything the producer task needs to drain one cursor.
pub(crate) struct CursorSource {
    pub(crate) session: Session,
    pub(crate) handle: StatementHandle,
    pub(crate) columns: Arc<Vec<ColumnMetadata>>,
    pub(crate) trim: bool,
    pub(crate) sql: String,
    pub(crate) params: Vec<RowValues>,
}

/// Flow-controlled stream of rows from one open cursor.
///
/// A background task fetches rows one at a time, but only after it has reserved room in a
/// channel of `buffer_size` slots, so rows fetched ahead of the consumer never exceed the buffer.
/// A failure ends the stream with one `Err` item; the cursor is closed however the stream ends.
pub struct RowStream {
    receiver: mpsc::Receiver<RowResult>,
    cancel: CancellationToken,
    producer: Option<JoinHandle<()>>,
    columns: Arc<Vec<ColumnMetadata>>,
    occupancy: Arc<Occupancy>,
    closed: bool,
}

impl RowStream {
    pub(crate) fn spawn(source: CursorSource, buffer_size: usize) -> Self {
        let (tx, receiver) = mpsc::channel(buffer_size.max(1));
        let cancel = CancellationToken::new();
        let occupancy = Arc::new(Occupancy::default());
        let columns = Arc::clone(&source.columns);
        let producer = tokio::spawn(produce(
            source,
            tx,
            cancel.clone(),
            Arc::clone(&occupancy),
        ));
        Self {
            receiver,
            cancel,
            producer: Some(producer),
            columns,
            occupancy,
            closed: false,
        }
    }

    /// A stream over a statement that has no cursor (an update, or one already closed).
    pub(crate) fn empty(columns: Arc<Vec<ColumnMetadata>>) -> Self {
        let (_, receiver) = mpsc::channel(1);
        Self {
            receiver,
            cancel: CancellationToken::new(),
            producer: None,
            columns,
            occupancy: Arc::default(),
            closed: true,
        }
    }

    #[must_use]
    pub fn metadata(&self) -> &[ColumnMetadata] {
        &self.columns
    }

    /// Rows fetched from the driver and waiting to be consumed.
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.occupancy.current.load(Ordering::Acquire)
    }

    /// Largest value [`RowStream::buffered`] has reached.
    #[must_use]
    pub fn peak_buffered(&self) -> usize {
        self.occupancy.peak.load(Ordering::Acquire)
    }

    /// `true` once the stream has been closed or has ended; no further rows are yielded.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Stop fetching and release the cursor. Safe to call more than once. Rows fetched but not
    /// yet consumed are discarded; the stream yields nothing afterwards.
    ///
    /// # Errors
    /// Returns [`SqlMiddlewareDbError::ExecutionError`] if the producer task panicked.
    pub async fn close(&mut self) -> Result<(), SqlMiddlewareDbError> {
        self.closed = true;
        self.cancel.cancel();
        self.receiver.close();
        let joined = match self.producer.take() {
            Some(producer) => producer.await.map_err(|e| {
                SqlMiddlewareDbError::ExecutionError(format!("row producer failed: {e}"))
            }),
            None => Ok(()),
        };
        self.discard_buffered();
        joined
    }

    fn discard_buffered(&mut self) {
        while let Ok(item) = self.receiver.try_recv() {
            if item.is_ok() {
                self.occupancy.consumed();
            }
        }
    }

    /// Drain the rest of the stream.
    ///
    /// # Errors
    /// Returns the first error the stream yields.
    pub async fn collect_rows(mut self) -> Result<Vec<Vec<RowValues>>, SqlMiddlewareDbError> {
        let mut rows = Vec::new();
        while let Some(row) = self.next().await {
            rows.push(row?);
        }
        Ok(rows)
    }
}

impl Stream for RowStream {
    type Item = RowResult;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.closed {
            self.discard_buffered();
            return Poll::Ready(None);
        }
        match self.receiver.poll_recv(cx) {
            Poll::Ready(Some(item)) => {
                if item.is_ok() {
                    self.occupancy.consumed();
                }
                Poll::Ready(Some(item))
            }
            Poll::Ready(None) => {
                self.closed = true;
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl Drop for RowStream {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn produce(
    source: CursorSource,
    tx: mpsc::Sender<RowResult>,
    cancel: CancellationToken,
    occupancy: Arc<Occupancy>,
) {
    let CursorSource {
        session,
        handle,
        columns,
        trim,
        sql,
        params,
    } = source;
    let context = |err: SqlMiddlewareDbError| err.with_context(&sql, std::slice::from_ref(&params));
    let mut fetched = 0usize;

    loop {
        let permit = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            permit = tx.reserve() => match permit {
                Ok(permit) => permit,
                Err(_) => break,
            },
        };
        match session.fetch_next(handle).await {
            Ok(Some(raw)) => match row_to_native(&columns, raw, trim) {
                Ok(row) => {
                    fetched += 1;
                    occupancy.fetched();
                    permit.send(Ok(row));
                }
                Err(err) => {
                    permit.send(Err(context(err)));
                    break;
                }
            },
            Ok(None) => break,
            Err(err) => {
                permit.send(Err(context(err)));
                break;
            }
        }
    }

    tracing::debug!(session = session.id(), %handle, rows = fetched, "cursor finished");
    if let Err(err) = session.close_statement(handle).await {
        tracing::warn!(session = session.id(), %handle, error = %err, "closing cursor failed");
    }
}
