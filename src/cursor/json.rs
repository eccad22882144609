use std::pin::Pin;
use std::task::{Context, Poll};

use futures_util::Stream;
use serde_json::Value as JsonValue;

use super::stream::RowStream;
use crate::error::SqlMiddlewareDbError;
use crate::types::{ColumnMetadata, RowValues};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Framing {
    /// Nothing emitted yet
    Start,
    /// `[` emitted; `first` until a row has been written
    Rows { first: bool },
    /// Closed early; the terminator is still owed
    Closing { opened: bool },
    Done,
}

/// Rows serialized incrementally as one JSON array of row arrays.
///
/// Emits `[`, then one chunk per row (`,`-prefixed after the first), then `]`. If the consumer
/// stops early it should call [`JsonRowStream::close`]; the stream then still yields the closing
/// `]` so the concatenated output parses.
pub struct JsonRowStream {
    rows: RowStream,
    framing: Framing,
}

impl JsonRowStream {
    pub(crate) fn new(rows: RowStream) -> Self {
        Self {
            rows,
            framing: Framing::Start,
        }
    }

    #[must_use]
    pub fn metadata(&self) -> &[ColumnMetadata] {
        self.rows.metadata()
    }

    /// Stop fetching. Any chunks still to be polled finish the array framing.
    ///
    /// # Errors
    /// Propagates [`RowStream::close`] failures.
    pub async fn close(&mut self) -> Result<(), SqlMiddlewareDbError> {
        self.rows.close().await?;
        self.framing = match self.framing {
            Framing::Start => Framing::Closing { opened: false },
            Framing::Rows { .. } => Framing::Closing { opened: true },
            other => other,
        };
        Ok(())
    }

    /// Concatenate every remaining chunk.
    ///
    /// # Errors
    /// Returns the first error the stream yields.
    pub async fn collect_string(mut self) -> Result<String, SqlMiddlewareDbError> {
        use futures_util::StreamExt;

        let mut out = String::new();
        while let Some(chunk) = self.next().await {
            out.push_str(&chunk?);
        }
        Ok(out)
    }
}

fn encode_row(row: &[RowValues]) -> String {
    JsonValue::Array(row.iter().map(RowValues::to_json).collect()).to_string()
}

impl Stream for JsonRowStream {
    type Item = Result<String, SqlMiddlewareDbError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        match self.framing {
            Framing::Done => Poll::Ready(None),
            Framing::Start => {
                self.framing = Framing::Rows { first: true };
                Poll::Ready(Some(Ok("[".to_owned())))
            }
            Framing::Closing { opened } => {
                self.framing = Framing::Done;
                let tail = if opened { "]" } else { "[]" };
                Poll::Ready(Some(Ok(tail.to_owned())))
            }
            Framing::Rows { first } => match Pin::new(&mut self.rows).poll_next(cx) {
                Poll::Pending => Poll::Pending,
                Poll::Ready(Some(Ok(row))) => {
                    self.framing = Framing::Rows { first: false };
                    let encoded = encode_row(&row);
                    let chunk = if first { encoded } else { format!(",{encoded}") };
                    Poll::Ready(Some(Ok(chunk)))
                }
                Poll::Ready(Some(Err(err))) => {
                    self.framing = Framing::Done;
                    Poll::Ready(Some(Err(err)))
                }
                Poll::Ready(None) => {
                    self.framing = Framing::Done;
                    Poll::Ready(Some(Ok("]".to_owned())))
                }
            },
        }
    }
}
