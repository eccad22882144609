//! Operations shared by the unscoped client and transaction contexts.
//!
//! Everything here runs against one [`Session`]; the client acquires a fresh session per call
//! while a transaction reuses its bound one.

use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;

use crate::config::{ClientConfig, QueryOptions};
use crate::cursor::Statement;
use crate::driver::GeneratedKeys;
use crate::error::SqlMiddlewareDbError;
use crate::marshal::params_to_remote;
use crate::results::ResultSet;
use crate::session::Session;
use crate::types::RowValues;

/// Column name to value, as accepted by [`AsyncDatabaseExecutor::insert_list`].
pub type Record = BTreeMap<String, RowValues>;

#[async_trait]
pub trait AsyncDatabaseExecutor: Send + Sync {
    /// Run a query and materialize every row.
    async fn query(
        &self,
        sql: &str,
        params: &[RowValues],
    ) -> Result<ResultSet, SqlMiddlewareDbError> {
        self.query_with_options(sql, params, QueryOptions::default())
            .await
    }

    async fn query_with_options(
        &self,
        sql: &str,
        params: &[RowValues],
        options: QueryOptions,
    ) -> Result<ResultSet, SqlMiddlewareDbError>;

    /// Run a mutation and return the affected-row count.
    async fn update(&self, sql: &str, params: &[RowValues]) -> Result<u64, SqlMiddlewareDbError>;

    /// Run an insert into an identity-keyed table and return the generated key.
    async fn insert_and_get_id(
        &self,
        sql: &str,
        params: &[RowValues],
    ) -> Result<RowValues, SqlMiddlewareDbError>;

    /// Insert each record into `table` and return the generated `key_column` values in order.
    async fn insert_list(
        &self,
        table: &str,
        key_column: &str,
        records: &[Record],
    ) -> Result<Vec<RowValues>, SqlMiddlewareDbError>;

    /// Run `sql` once per tuple as one batched call; returns per-tuple counts.
    async fn batch_update(
        &self,
        sql: &str,
        batch: &[Vec<RowValues>],
    ) -> Result<Vec<u64>, SqlMiddlewareDbError>;

    /// Run `sql` and hand back the statement, with its cursor still open for queries.
    async fn execute(
        &self,
        sql: &str,
        params: &[RowValues],
    ) -> Result<Statement, SqlMiddlewareDbError>;
}

pub(crate) async fn open_on(
    session: &Session,
    config: &ClientConfig,
    sql: &str,
    params: &[RowValues],
    keys: GeneratedKeys,
    options: QueryOptions,
) -> Result<Statement, SqlMiddlewareDbError> {
    Statement::open(session, sql, params, keys, config.stream_options(), options).await
}

pub(crate) async fn query_on(
    session: &Session,
    config: &ClientConfig,
    sql: &str,
    params: &[RowValues],
    options: QueryOptions,
) -> Result<ResultSet, SqlMiddlewareDbError> {
    open_on(session, config, sql, params, GeneratedKeys::None, options)
        .await?
        .as_result_set()
        .await
}

pub(crate) async fn update_on(
    session: &Session,
    config: &ClientConfig,
    sql: &str,
    params: &[RowValues],
) -> Result<u64, SqlMiddlewareDbError> {
    let statement = open_on(
        session,
        config,
        sql,
        params,
        GeneratedKeys::None,
        QueryOptions::default(),
    )
    .await?;
    statement
        .updated()
        .map_err(|e| e.with_context(sql, &[params.to_vec()]))
}

pub(crate) async fn insert_and_get_id_on(
    session: &Session,
    config: &ClientConfig,
    sql: &str,
    params: &[RowValues],
    keys: GeneratedKeys,
) -> Result<RowValues, SqlMiddlewareDbError> {
    let statement = open_on(session, config, sql, params, keys, QueryOptions::default()).await?;
    let context = |e: SqlMiddlewareDbError| e.with_context(sql, &[params.to_vec()]);
    statement
        .generated_keys()
        .map_err(context)?
        .into_iter()
        .next()
        .ok_or_else(|| {
            context(SqlMiddlewareDbError::ExecutionError(
                "statement produced no generated key".into(),
            ))
        })
}

/// Build `INSERT INTO table (a, b) VALUES (?, ?)` for one column set.
fn insert_sql(table: &str, columns: &[&str]) -> String {
    if columns.is_empty() {
        return format!("INSERT INTO {table} DEFAULT VALUES");
    }
    let placeholders = vec!["?"; columns.len()].join(", ");
    format!(
        "INSERT INTO {table} ({}) VALUES ({placeholders})",
        columns.join(", ")
    )
}

pub(crate) async fn insert_rows_on(
    session: &Session,
    config: &ClientConfig,
    table: &str,
    key_column: &str,
    records: &[Record],
) -> Result<Vec<RowValues>, SqlMiddlewareDbError> {
    let Some(first) = records.first() else {
        return Ok(Vec::new());
    };
    let columns: Vec<&str> = first.keys().map(String::as_str).collect();
    let sql = insert_sql(table, &columns);
    let expected: BTreeSet<&str> = columns.iter().copied().collect();
    let all_params = || -> Vec<Vec<RowValues>> {
        records.iter().map(|r| r.values().cloned().collect()).collect()
    };

    for (i, record) in records.iter().enumerate() {
        let found: BTreeSet<&str> = record.keys().map(String::as_str).collect();
        if found != expected {
            return Err(SqlMiddlewareDbError::programming(
                format!(
                    "record {i} has columns {found:?} but the first record has {expected:?}"
                ),
                &sql,
                &all_params(),
            ));
        }
    }

    let mut keys = Vec::with_capacity(records.len());
    for record in records {
        let params: Vec<RowValues> = record.values().cloned().collect();
        let key = insert_and_get_id_on(
            session,
            config,
            &sql,
            &params,
            GeneratedKeys::Column(key_column.to_owned()),
        )
        .await?;
        keys.push(key);
    }
    tracing::debug!(session = session.id(), table, rows = keys.len(), "inserted record list");
    Ok(keys)
}

pub(crate) async fn batch_update_on(
    session: &Session,
    sql: &str,
    batch: &[Vec<RowValues>],
) -> Result<Vec<u64>, SqlMiddlewareDbError> {
    if batch.is_empty() {
        return Ok(Vec::new());
    }
    let info = session
        .prepare(sql, GeneratedKeys::None)
        .await
        .map_err(|e| e.with_context(sql, batch))?;

    // Every tuple is checked before anything is sent.
    let expected = info.parameter_count.unwrap_or(batch[0].len());
    let checked = match batch.iter().position(|tuple| tuple.len() != expected) {
        Some(i) => Err(SqlMiddlewareDbError::programming(
            format!(
                "batch tuple {i} has {} values but the statement expects {expected}",
                batch[i].len()
            ),
            sql,
            batch,
        )),
        None => batch
            .iter()
            .map(|tuple| params_to_remote(tuple))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| e.with_context(sql, batch)),
    };
    let wire = match checked {
        Ok(wire) => wire,
        Err(err) => {
            let _ = session.close_statement(info.handle).await;
            return Err(err);
        }
    };

    let executed = session.execute_batch(info.handle, wire).await;
    let closed = session.close_statement(info.handle).await;
    let counts = executed.map_err(|e| e.with_context(sql, batch))?;
    closed.map_err(|e| e.with_context(sql, batch))?;
    tracing::debug!(session = session.id(), tuples = batch.len(), "batch executed");
    Ok(counts)
}
