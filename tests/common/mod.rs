#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use remote_sql_middleware::driver::{
    CatalogCursor, CatalogRequest, Driver, DriverConnection, DriverError, Execution,
    GeneratedKeys, PreparedInfo, StatementHandle, WireValue,
};
use remote_sql_middleware::prelude::*;

pub type ProgramFn = Arc<dyn Fn(&str, &[u8]) -> Vec<u8> + Send + Sync>;

/// Call counters shared by every connection a [`RecordingDriver`] opens.
#[derive(Default)]
pub struct Counters {
    pub fetches: AtomicUsize,
    pub program_calls: AtomicUsize,
}

impl Counters {
    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn program_calls(&self) -> usize {
        self.program_calls.load(Ordering::SeqCst)
    }
}

/// Wraps the in-process engine, counting row fetches and answering program calls.
pub struct RecordingDriver {
    inner: SqliteDriver,
    pub counters: Arc<Counters>,
    program: Option<ProgramFn>,
}

impl RecordingDriver {
    pub fn new() -> Self {
        Self {
            inner: SqliteDriver::in_memory().expect("in-memory engine"),
            counters: Arc::default(),
            program: None,
        }
    }

    pub fn with_program(mut self, program: ProgramFn) -> Self {
        self.program = Some(program);
        self
    }
}

impl Driver for RecordingDriver {
    fn connect(&self) -> Result<Box<dyn DriverConnection>, DriverError> {
        Ok(Box::new(RecordingConnection {
            inner: self.inner.connect()?,
            counters: Arc::clone(&self.counters),
            program: self.program.clone(),
        }))
    }

    fn is_in_memory(&self) -> bool {
        false
    }

    fn name(&self) -> &str {
        "recording"
    }
}

struct RecordingConnection {
    inner: Box<dyn DriverConnection>,
    counters: Arc<Counters>,
    program: Option<ProgramFn>,
}

impl DriverConnection for RecordingConnection {
    fn prepare(&mut self, sql: &str, keys: GeneratedKeys) -> Result<PreparedInfo, DriverError> {
        self.inner.prepare(sql, keys)
    }

    fn execute(
        &mut self,
        stmt: StatementHandle,
        params: &[WireValue],
    ) -> Result<Execution, DriverError> {
        self.inner.execute(stmt, params)
    }

    fn fetch_next(&mut self, stmt: StatementHandle) -> Result<Option<Vec<WireValue>>, DriverError> {
        self.counters.fetches.fetch_add(1, Ordering::SeqCst);
        self.inner.fetch_next(stmt)
    }

    fn execute_batch(
        &mut self,
        stmt: StatementHandle,
        batch: &[Vec<WireValue>],
    ) -> Result<Vec<u64>, DriverError> {
        self.inner.execute_batch(stmt, batch)
    }

    fn close(&mut self, stmt: StatementHandle) -> Result<(), DriverError> {
        self.inner.close(stmt)
    }

    fn set_auto_commit(&mut self, enabled: bool) -> Result<(), DriverError> {
        self.inner.set_auto_commit(enabled)
    }

    fn commit(&mut self) -> Result<(), DriverError> {
        self.inner.commit()
    }

    fn rollback(&mut self) -> Result<(), DriverError> {
        self.inner.rollback()
    }

    fn call_program(&mut self, name: &str, input: &[u8]) -> Result<Vec<u8>, DriverError> {
        self.counters.program_calls.fetch_add(1, Ordering::SeqCst);
        match &self.program {
            Some(program) => Ok(program(name, input)),
            None => self.inner.call_program(name, input),
        }
    }

    fn catalog(&mut self, request: &CatalogRequest) -> Result<CatalogCursor, DriverError> {
        self.inner.catalog(request)
    }

    fn is_valid(&mut self) -> bool {
        self.inner.is_valid()
    }
}

pub async fn recording_client(
    driver: RecordingDriver,
    stream_buffer_size: usize,
) -> Result<(Client, Arc<Counters>), SqlMiddlewareDbError> {
    let counters = Arc::clone(&driver.counters);
    let client = Client::builder()
        .stream_buffer_size(stream_buffer_size)
        .build(Arc::new(driver))
        .await?;
    Ok((client, counters))
}

pub async fn count_rows(client: &Client, table: &str) -> Result<i64, SqlMiddlewareDbError> {
    let rs = client
        .query(&format!("SELECT COUNT(*) AS N FROM {table}"), &[])
        .await?;
    Ok(rs.results[0].get("N").and_then(RowValues::as_int).unwrap_or(-1))
}
