//! The client entry point.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;

use crate::config::{ClientBuilder, ClientConfig, QueryOptions, WriteOptions};
use crate::cursor::Statement;
use crate::driver::{CatalogFilter, Driver, GeneratedKeys};
use crate::error::SqlMiddlewareDbError;
use crate::executor::{
    AsyncDatabaseExecutor, Record, batch_update_on, insert_and_get_id_on, open_on, query_on,
    update_on,
};
use crate::metadata::{self, ColumnInfo, PrimaryKeyInfo, TableStream};
use crate::pool::{DriverManager, DriverPool, PoolState, pool_state};
use crate::program::{MockRegistry, Program, ProgramHandler, ProgramRecord, ProgramSchema};
use crate::results::ResultSet;
use crate::session::Session;
use crate::transaction::{Transaction, run_transaction};
use crate::types::{EngineKind, RowValues};
use crate::write::WriteSink;

/// Pooled access to one engine.
///
/// Clones share the pool and the program mock registry. Each unscoped operation checks out its
/// own connection and releases it when done; use [`Client::transaction`] to run several
/// statements on one connection.
#[derive(Clone)]
pub struct Client {
    pool: DriverPool,
    config: Arc<ClientConfig>,
    in_memory: bool,
    mocks: MockRegistry,
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("config", &self.config)
            .field("in_memory", &self.in_memory)
            .field("mocks", &self.mocks)
            .finish_non_exhaustive()
    }
}

impl Client {
    /// Connect through `driver` with `config`.
    ///
    /// # Errors
    /// Returns [`SqlMiddlewareDbError::ConfigError`] for an invalid config, or a pool error if
    /// the pool cannot be created.
    pub async fn connect(
        driver: Arc<dyn Driver>,
        config: ClientConfig,
    ) -> Result<Self, SqlMiddlewareDbError> {
        Self::from_config(config, Some(driver)).await
    }

    /// A client over a private in-process database with default settings.
    ///
    /// # Errors
    /// Returns an error if the in-process engine cannot start.
    #[cfg(feature = "sqlite")]
    pub async fn in_memory() -> Result<Self, SqlMiddlewareDbError> {
        ClientBuilder::new().build_in_memory().await
    }

    #[must_use]
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// Build from `config`. Without a driver, `config.engine` must name the in-process engine.
    pub(crate) async fn from_config(
        config: ClientConfig,
        driver: Option<Arc<dyn Driver>>,
    ) -> Result<Self, SqlMiddlewareDbError> {
        config.validate()?;
        let driver = match driver {
            Some(driver) => driver,
            None => default_driver(config.engine)?,
        };
        let in_memory = driver.is_in_memory();
        let name = driver.name().to_owned();
        let pool = DriverManager::new(driver)
            .build_pool(config.pool_max_size, config.connection_timeout())
            .await?;
        tracing::debug!(
            driver = %name,
            in_memory,
            pool_max_size = config.pool_max_size,
            "client created"
        );
        Ok(Self {
            pool,
            config: Arc::new(config),
            in_memory,
            mocks: MockRegistry::default(),
        })
    }

    /// `true` when backed by the in-process engine rather than a remote one.
    #[must_use]
    pub fn is_in_memory(&self) -> bool {
        self.in_memory
    }

    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    #[must_use]
    pub fn pool_state(&self) -> PoolState {
        pool_state(&self.pool)
    }

    async fn session(&self) -> Result<Session, SqlMiddlewareDbError> {
        Session::acquire(&self.pool).await
    }

    /// Run `body` inside a transaction on one connection.
    ///
    /// Commits if `body` returns `Ok`. Rolls back if it returns `Err` and hands that error back
    /// unchanged. The [`Transaction`] stops working once `body` returns.
    ///
    /// # Errors
    /// Returns the body's error, or the error from acquiring the connection or committing.
    pub async fn transaction<F, Fut, T, E>(&self, body: F) -> Result<T, E>
    where
        F: FnOnce(Transaction) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<SqlMiddlewareDbError>,
    {
        run_transaction(&self.pool, &self.config, body).await
    }

    /// A write sink on its own connection; the connection is released by [`WriteSink::end`].
    ///
    /// # Errors
    /// Returns an error if no connection can be acquired.
    pub async fn create_write_stream(
        &self,
        sql: &str,
        options: WriteOptions,
    ) -> Result<WriteSink, SqlMiddlewareDbError> {
        Ok(WriteSink::new(self.session().await?, sql, options))
    }

    /// Bind a program layout to this client.
    ///
    /// # Errors
    /// Returns [`SqlMiddlewareDbError::ProgramError`] if the layout cannot be packed.
    pub fn define_program(&self, schema: ProgramSchema) -> Result<Program, SqlMiddlewareDbError> {
        Program::new(schema, self.pool.clone(), self.mocks.clone())
    }

    /// Answer calls to program `name` with `handler` instead of the engine, replacing any
    /// earlier mock. Applies to programs defined before and after this call.
    pub fn mock_pgm<F>(&self, name: &str, handler: F)
    where
        F: Fn(&ProgramRecord) -> ProgramRecord + Send + Sync + 'static,
    {
        let handler: ProgramHandler = Arc::new(handler);
        self.mocks.register(name, handler);
        tracing::debug!(program = name, "program mocked");
    }

    /// Remove the mock for `name`; returns whether one was registered.
    pub fn unmock_pgm(&self, name: &str) -> bool {
        self.mocks.remove(name)
    }

    pub fn clear_mocks(&self) {
        self.mocks.clear();
    }

    /// Tables matching `filter`, read lazily.
    ///
    /// # Errors
    /// Returns an error if the catalog cannot be opened.
    pub async fn get_tables_as_stream(
        &self,
        filter: CatalogFilter,
    ) -> Result<TableStream, SqlMiddlewareDbError> {
        metadata::tables_stream(&self.pool, filter, self.config.stream_options()).await
    }

    /// Columns of the tables matching `filter`, in declaration order.
    ///
    /// # Errors
    /// Returns an error if the catalog cannot be read.
    pub async fn get_columns(
        &self,
        filter: CatalogFilter,
    ) -> Result<Vec<ColumnInfo>, SqlMiddlewareDbError> {
        metadata::columns(&self.pool, filter, self.config.stream_options()).await
    }

    /// Primary-key columns of the tables matching `filter`, ordered by table then key position.
    ///
    /// # Errors
    /// Returns an error if the catalog cannot be read.
    pub async fn get_primary_keys(
        &self,
        filter: CatalogFilter,
    ) -> Result<Vec<PrimaryKeyInfo>, SqlMiddlewareDbError> {
        metadata::primary_keys(&self.pool, filter, self.config.stream_options()).await
    }
}

#[cfg(feature = "sqlite")]
fn default_driver(engine: EngineKind) -> Result<Arc<dyn Driver>, SqlMiddlewareDbError> {
    match engine {
        EngineKind::InMemory => Ok(Arc::new(crate::sqlite::SqliteDriver::in_memory()?)),
        EngineKind::Remote => Err(SqlMiddlewareDbError::ConfigError(
            "the remote engine needs a driver; use Client::connect".into(),
        )),
    }
}

#[cfg(not(feature = "sqlite"))]
fn default_driver(engine: EngineKind) -> Result<Arc<dyn Driver>, SqlMiddlewareDbError> {
    Err(SqlMiddlewareDbError::ConfigError(format!(
        "no driver given for engine {engine:?}, and the in-process engine is not compiled in"
    )))
}

#[async_trait]
impl AsyncDatabaseExecutor for Client {
    async fn query_with_options(
        &self,
        sql: &str,
        params: &[RowValues],
        options: QueryOptions,
    ) -> Result<ResultSet, SqlMiddlewareDbError> {
        query_on(&self.session().await?, &self.config, sql, params, options).await
    }

    async fn update(&self, sql: &str, params: &[RowValues]) -> Result<u64, SqlMiddlewareDbError> {
        update_on(&self.session().await?, &self.config, sql, params).await
    }

    async fn insert_and_get_id(
        &self,
        sql: &str,
        params: &[RowValues],
    ) -> Result<RowValues, SqlMiddlewareDbError> {
        insert_and_get_id_on(
            &self.session().await?,
            &self.config,
            sql,
            params,
            GeneratedKeys::Auto,
        )
        .await
    }

    /// Runs inside a transaction, so either every record is inserted or none is.
    async fn insert_list(
        &self,
        table: &str,
        key_column: &str,
        records: &[Record],
    ) -> Result<Vec<RowValues>, SqlMiddlewareDbError> {
        if records.is_empty() {
            return Ok(Vec::new());
        }
        self.transaction(|tx| async move { tx.insert_list(table, key_column, records).await })
            .await
    }

    async fn batch_update(
        &self,
        sql: &str,
        batch: &[Vec<RowValues>],
    ) -> Result<Vec<u64>, SqlMiddlewareDbError> {
        if batch.is_empty() {
            return Ok(Vec::new());
        }
        batch_update_on(&self.session().await?, sql, batch).await
    }

    async fn execute(
        &self,
        sql: &str,
        params: &[RowValues],
    ) -> Result<Statement, SqlMiddlewareDbError> {
        open_on(
            &self.session().await?,
            &self.config,
            sql,
            params,
            GeneratedKeys::None,
            QueryOptions::default(),
        )
        .await
    }
}
