//! Executed statements and the streaming materializer over their cursors.

use std::sync::Arc;

use crate::config::{QueryOptions, StreamOptions};
use crate::driver::{Execution, GeneratedKeys, StatementHandle};
use crate::error::SqlMiddlewareDbError;
use crate::marshal::{key_to_native, params_to_remote, row_to_native};
use crate::results::ResultSet;
use crate::session::{Session, check_arity};
use crate::types::{ColumnMetadata, RowValues};

mod json;
mod stream;

pub use json::JsonRowStream;
pub use stream::RowStream;
pub(crate) use stream::CursorSource;

/// A statement that has been prepared, bound and run on a session.
///
/// Queries keep their cursor open until the rows are consumed, a conversion method hands the
/// cursor to a stream, or [`Statement::close`] is called. Updates are closed as soon as they
/// have run; their count and generated keys stay readable.
pub struct Statement {
    session: Session,
    handle: Option<StatementHandle>,
    sql: String,
    params: Vec<RowValues>,
    execution: Execution,
    columns: Arc<Vec<ColumnMetadata>>,
    stream_defaults: StreamOptions,
    query_options: QueryOptions,
}

impl std::fmt::Debug for Statement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Statement")
            .field("sql", &self.sql)
            .field("is_query", &self.execution.is_query)
            .field("open", &self.handle.is_some())
            .finish_non_exhaustive()
    }
}

impl Statement {
    /// Prepare, validate, bind and run `sql` on `session`.
    ///
    /// # Errors
    /// Returns a `Programming` error if the parameter count does not match the placeholders, and
    /// the driver's error (with SQL and parameters attached) if preparing or running fails. The
    /// statement is closed on every failure path.
    pub(crate) async fn open(
        session: &Session,
        sql: &str,
        params: &[RowValues],
        keys: GeneratedKeys,
        stream_defaults: StreamOptions,
        query_options: QueryOptions,
    ) -> Result<Self, SqlMiddlewareDbError> {
        let context = |err: SqlMiddlewareDbError| err.with_context(sql, &[params.to_vec()]);

        let info = session.prepare(sql, keys).await.map_err(context)?;
        let executed = async {
            check_arity(&info, sql, params)?;
            let wire = params_to_remote(params)?;
            session.execute(info.handle, wire).await
        }
        .await;
        let execution = match executed {
            Ok(execution) => execution,
            Err(err) => {
                let _ = session.close_statement(info.handle).await;
                return Err(context(err));
            }
        };

        let handle = if execution.is_query {
            tracing::debug!(session = session.id(), handle = %info.handle, "query opened");
            Some(info.handle)
        } else {
            session.close_statement(info.handle).await.map_err(context)?;
            None
        };

        Ok(Self {
            session: session.clone(),
            handle,
            sql: sql.to_owned(),
            params: params.to_vec(),
            columns: Arc::new(execution.columns.clone()),
            execution,
            stream_defaults,
            query_options,
        })
    }

    #[must_use]
    pub fn is_query(&self) -> bool {
        self.execution.is_query
    }

    #[must_use]
    pub fn sql(&self) -> &str {
        &self.sql
    }

    #[must_use]
    pub fn params(&self) -> &[RowValues] {
        &self.params
    }

    /// Column descriptors; empty for updates.
    #[must_use]
    pub fn metadata(&self) -> &[ColumnMetadata] {
        &self.columns
    }

    /// Affected-row count of an update.
    ///
    /// # Errors
    /// Returns [`SqlMiddlewareDbError::ExecutionError`] for a query.
    pub fn updated(&self) -> Result<u64, SqlMiddlewareDbError> {
        if self.execution.is_query {
            return Err(SqlMiddlewareDbError::ExecutionError(
                "updated() is only available for non-query statements".into(),
            ));
        }
        Ok(self.execution.update_count)
    }

    /// Identity values generated by this statement, if they were requested.
    ///
    /// # Errors
    /// Returns [`SqlMiddlewareDbError::ConversionError`] if a key is not an exact number.
    pub fn generated_keys(&self) -> Result<Vec<RowValues>, SqlMiddlewareDbError> {
        self.execution
            .generated_keys
            .iter()
            .cloned()
            .map(key_to_native)
            .collect()
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.handle.is_none()
    }

    /// Read every remaining row. An update yields no rows.
    ///
    /// # Errors
    /// Returns the first fetch or conversion error, with SQL and parameters attached. The cursor
    /// is closed either way.
    pub async fn as_array(mut self) -> Result<Vec<Vec<RowValues>>, SqlMiddlewareDbError> {
        let Some(handle) = self.handle.take() else {
            return Ok(Vec::new());
        };
        let drained = self.drain(handle).await;
        let closed = self.session.close_statement(handle).await;
        let rows = drained.map_err(|e| e.with_context(&self.sql, &[self.params.clone()]))?;
        closed?;
        Ok(rows)
    }

    async fn drain(&self, handle: StatementHandle) -> Result<Vec<Vec<RowValues>>, SqlMiddlewareDbError> {
        let mut rows = Vec::new();
        while let Some(raw) = self.session.fetch_next(handle).await? {
            rows.push(row_to_native(&self.columns, raw, self.query_options.trim)?);
        }
        Ok(rows)
    }

    /// Read every remaining row into a [`ResultSet`]. For an update the set is empty and
    /// `rows_affected` carries the update count.
    ///
    /// # Errors
    /// Same as [`Statement::as_array`].
    pub async fn as_result_set(self) -> Result<ResultSet, SqlMiddlewareDbError> {
        if !self.execution.is_query {
            return Ok(ResultSet::from_update_count(self.execution.update_count));
        }
        let columns = self.columns.as_ref().clone();
        let rows = self.as_array().await?;
        let mut result_set = ResultSet::with_capacity(columns, rows.len());
        for row in rows {
            result_set.add_row_values(row);
        }
        Ok(result_set)
    }

    /// Lazy row stream with the client's default buffer size.
    #[must_use]
    pub fn as_iterable(self) -> RowStream {
        let options = self.stream_defaults;
        self.rows(options)
    }

    /// Lazy row stream fetching at most `options.buffer_size` rows ahead of the consumer.
    ///
    /// Must be called from within a Tokio runtime.
    #[must_use]
    pub fn rows(mut self, options: StreamOptions) -> RowStream {
        let Some(handle) = self.handle.take() else {
            return RowStream::empty(Arc::clone(&self.columns));
        };
        let source = CursorSource {
            session: self.session.clone(),
            handle,
            columns: Arc::clone(&self.columns),
            trim: self.query_options.trim,
            sql: std::mem::take(&mut self.sql),
            params: std::mem::take(&mut self.params),
        };
        RowStream::spawn(source, options.buffer_size)
    }

    /// Rows serialized as one incrementally emitted JSON array.
    #[must_use]
    pub fn as_stream(self, options: StreamOptions) -> JsonRowStream {
        JsonRowStream::new(self.rows(options))
    }

    /// Release the cursor. Idempotent.
    ///
    /// # Errors
    /// Returns the driver's error if the statement could not be released.
    pub async fn close(&mut self) -> Result<(), SqlMiddlewareDbError> {
        match self.handle.take() {
            Some(handle) => self.session.close_statement(handle).await,
            None => Ok(()),
        }
    }
}

impl Drop for Statement {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.session.close_statement_detached(handle);
        }
    }
}
