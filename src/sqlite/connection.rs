use std::collections::{HashMap, VecDeque};

use rusqlite::{Connection, ErrorCode, params_from_iter};

use super::catalog;
use super::params::wire_from_ref;
use crate::driver::{
    CatalogCursor, CatalogRequest, DriverConnection, DriverError, DriverErrorKind, Execution,
    GeneratedKeys, PreparedInfo, StatementHandle, WireValue,
};
use crate::types::ColumnMetadata;

const BATCH_SAVEPOINT: &str = "remote_sql_batch";

fn driver_error(e: &rusqlite::Error) -> DriverError {
    let kind = match e.sqlite_error_code() {
        Some(ErrorCode::CannotOpen | ErrorCode::NotADatabase | ErrorCode::SystemIoFailure) => {
            DriverErrorKind::Connection
        }
        Some(_) => DriverErrorKind::Rejected,
        None => DriverErrorKind::Other,
    };
    DriverError::new(kind, e.to_string())
}

/// A statement as the connection tracks it between calls.
struct Tracked {
    sql: String,
    keys: GeneratedKeys,
    executed: bool,
    rows: VecDeque<Vec<WireValue>>,
}

/// One SQLite connection behind the [`DriverConnection`] contract.
///
/// Query results are read in full on `execute` and handed out a row per `fetch_next`. With
/// auto-commit off, a transaction is opened lazily before the next statement runs.
pub struct SqliteConnection {
    conn: Connection,
    statements: HashMap<StatementHandle, Tracked>,
    next_handle: u64,
    auto_commit: bool,
}

impl SqliteConnection {
    pub(super) fn new(conn: Connection) -> Self {
        Self {
            conn,
            statements: HashMap::new(),
            next_handle: 1,
            auto_commit: true,
        }
    }

    fn in_transaction(&self) -> bool {
        !self.conn.is_autocommit()
    }

    fn begin_if_needed(&mut self) -> Result<(), DriverError> {
        if !self.auto_commit && !self.in_transaction() {
            self.conn
                .execute_batch("BEGIN")
                .map_err(|e| driver_error(&e))?;
        }
        Ok(())
    }

    fn track(&mut self, tracked: Tracked) -> StatementHandle {
        let handle = StatementHandle(self.next_handle);
        self.next_handle += 1;
        self.statements.insert(handle, tracked);
        handle
    }

    fn tracked(&mut self, handle: StatementHandle) -> Result<&mut Tracked, DriverError> {
        self.statements
            .get_mut(&handle)
            .ok_or_else(|| DriverError::rejected(format!("unknown statement {handle}")))
    }

    fn run_batch(&self, sql: &str, batch: &[Vec<WireValue>]) -> Result<Vec<u64>, DriverError> {
        let mut stmt = self.conn.prepare_cached(sql).map_err(|e| driver_error(&e))?;
        batch
            .iter()
            .map(|tuple| {
                stmt.execute(params_from_iter(tuple.iter()))
                    .map(|n| n as u64)
                    .map_err(|e| driver_error(&e))
            })
            .collect()
    }
}

impl DriverConnection for SqliteConnection {
    fn prepare(&mut self, sql: &str, keys: GeneratedKeys) -> Result<PreparedInfo, DriverError> {
        let parameter_count = self
            .conn
            .prepare_cached(sql)
            .map_err(|e| driver_error(&e))?
            .parameter_count();
        let handle = self.track(Tracked {
            sql: sql.to_owned(),
            keys,
            executed: false,
            rows: VecDeque::new(),
        });
        Ok(PreparedInfo {
            handle,
            parameter_count: Some(parameter_count),
        })
    }

    fn execute(
        &mut self,
        handle: StatementHandle,
        params: &[WireValue],
    ) -> Result<Execution, DriverError> {
        let (sql, keys) = {
            let tracked = self.tracked(handle)?;
            (tracked.sql.clone(), tracked.keys.clone())
        };
        self.begin_if_needed()?;

        let mut stmt = self.conn.prepare_cached(&sql).map_err(|e| driver_error(&e))?;
        if stmt.column_count() > 0 {
            let columns: Vec<ColumnMetadata> = stmt
                .columns()
                .iter()
                .map(|c| ColumnMetadata::from_declared(c.name(), c.decl_type()))
                .collect();
            let width = columns.len();
            let mut rows = VecDeque::new();
            let mut cursor = stmt
                .query(params_from_iter(params.iter()))
                .map_err(|e| driver_error(&e))?;
            while let Some(row) = cursor.next().map_err(|e| driver_error(&e))? {
                let mut values = Vec::with_capacity(width);
                for i in 0..width {
                    values.push(wire_from_ref(row.get_ref(i).map_err(|e| driver_error(&e))?));
                }
                rows.push_back(values);
            }
            drop(cursor);
            drop(stmt);
            let tracked = self.tracked(handle)?;
            tracked.rows = rows;
            tracked.executed = true;
            return Ok(Execution {
                is_query: true,
                columns,
                ..Execution::default()
            });
        }

        let count = stmt
            .execute(params_from_iter(params.iter()))
            .map_err(|e| driver_error(&e))?;
        drop(stmt);
        let generated_keys = if keys.requested() && count > 0 {
            vec![WireValue::Integer(self.conn.last_insert_rowid())]
        } else {
            Vec::new()
        };
        self.tracked(handle)?.executed = true;
        Ok(Execution {
            is_query: false,
            columns: Vec::new(),
            update_count: count as u64,
            generated_keys,
        })
    }

    fn fetch_next(&mut self, handle: StatementHandle) -> Result<Option<Vec<WireValue>>, DriverError> {
        let tracked = self.tracked(handle)?;
        if !tracked.executed {
            return Err(DriverError::rejected(format!(
                "statement {handle} has not been executed"
            )));
        }
        Ok(tracked.rows.pop_front())
    }

    fn execute_batch(
        &mut self,
        handle: StatementHandle,
        batch: &[Vec<WireValue>],
    ) -> Result<Vec<u64>, DriverError> {
        let sql = self.tracked(handle)?.sql.clone();
        self.begin_if_needed()?;
        self.conn
            .execute_batch(&format!("SAVEPOINT {BATCH_SAVEPOINT}"))
            .map_err(|e| driver_error(&e))?;
        match self.run_batch(&sql, batch) {
            Ok(counts) => {
                self.conn
                    .execute_batch(&format!("RELEASE {BATCH_SAVEPOINT}"))
                    .map_err(|e| driver_error(&e))?;
                self.tracked(handle)?.executed = true;
                Ok(counts)
            }
            Err(err) => {
                if let Err(e) = self.conn.execute_batch(&format!(
                    "ROLLBACK TO {BATCH_SAVEPOINT}; RELEASE {BATCH_SAVEPOINT}"
                )) {
                    tracing::warn!(error = %e, "could not undo partial batch");
                }
                Err(err)
            }
        }
    }

    fn close(&mut self, handle: StatementHandle) -> Result<(), DriverError> {
        self.statements.remove(&handle);
        Ok(())
    }

    fn set_auto_commit(&mut self, enabled: bool) -> Result<(), DriverError> {
        if enabled && !self.auto_commit && self.in_transaction() {
            self.commit()?;
        }
        self.auto_commit = enabled;
        Ok(())
    }

    fn commit(&mut self) -> Result<(), DriverError> {
        if self.in_transaction() {
            self.conn
                .execute_batch("COMMIT")
                .map_err(|e| driver_error(&e))?;
        }
        Ok(())
    }

    fn rollback(&mut self) -> Result<(), DriverError> {
        if self.in_transaction() {
            self.conn
                .execute_batch("ROLLBACK")
                .map_err(|e| driver_error(&e))?;
        }
        Ok(())
    }

    fn call_program(&mut self, name: &str, _input: &[u8]) -> Result<Vec<u8>, DriverError> {
        Err(DriverError::unsupported(format!(
            "program {name}: the in-process engine cannot call programs"
        )))
    }

    fn catalog(&mut self, request: &CatalogRequest) -> Result<CatalogCursor, DriverError> {
        let (columns, rows) = catalog::read(&self.conn, request).map_err(|e| driver_error(&e))?;
        let handle = self.track(Tracked {
            sql: String::new(),
            keys: GeneratedKeys::None,
            executed: true,
            rows: rows.into(),
        });
        Ok(CatalogCursor { handle, columns })
    }

    fn is_valid(&mut self) -> bool {
        self.conn.query_row("SELECT 1", [], |_| Ok(())).is_ok()
    }
}
