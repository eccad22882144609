//! The driver capability consumed by the middleware.
//!
//! A driver is a black box with blocking, one-call-at-a-time semantics. Nothing in here is
//! async: the session worker is the only caller and it owns the connection on its own thread.

use std::fmt;

use thiserror::Error;

use crate::types::ColumnMetadata;

/// Values as they cross the driver boundary.
#[derive(Debug, Clone, PartialEq)]
pub enum WireValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

/// Opaque per-connection statement identifier handed out by [`DriverConnection::prepare`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StatementHandle(pub u64);

impl fmt::Display for StatementHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Whether an insert should report the identity values it generated.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum GeneratedKeys {
    #[default]
    None,
    /// Whatever identity value the engine generated
    Auto,
    /// The value of the named key column
    Column(String),
}

impl GeneratedKeys {
    #[must_use]
    pub fn requested(&self) -> bool {
        !matches!(self, GeneratedKeys::None)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedInfo {
    pub handle: StatementHandle,
    /// Placeholder count, when the engine can report it
    pub parameter_count: Option<usize>,
}

/// Result descriptor of an executed statement.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Execution {
    /// `true` when the statement produced a row set
    pub is_query: bool,
    /// Column descriptors; empty for updates
    pub columns: Vec<ColumnMetadata>,
    /// Affected-row count; zero for queries
    pub update_count: u64,
    pub generated_keys: Vec<WireValue>,
}

/// Exact-match catalog filter. `None` matches everything.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CatalogFilter {
    pub schema: Option<String>,
    pub table: Option<String>,
}

impl CatalogFilter {
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn table(table: impl Into<String>) -> Self {
        Self {
            schema: None,
            table: Some(table.into()),
        }
    }

    #[must_use]
    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    #[must_use]
    pub fn matches(&self, schema: &str, table: &str) -> bool {
        self.schema.as_deref().is_none_or(|s| s == schema)
            && self.table.as_deref().is_none_or(|t| t == table)
    }
}

/// Catalog cursors a driver must be able to open.
///
/// Row layouts are fixed so the metadata enumerator can read them positionally:
/// - `Tables`: `TABLE_SCHEM, TABLE_NAME, REMARKS`
/// - `Columns`: `COLUMN_NAME, TYPE_NAME, COLUMN_SIZE, DECIMAL_DIGITS`
/// - `PrimaryKeys`: `TABLE_NAME, COLUMN_NAME, KEY_SEQ`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogRequest {
    Tables(CatalogFilter),
    Columns(CatalogFilter),
    PrimaryKeys(CatalogFilter),
}

#[derive(Debug, Clone, PartialEq)]
pub struct CatalogCursor {
    pub handle: StatementHandle,
    pub columns: Vec<ColumnMetadata>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DriverErrorKind {
    /// The connection or transport is gone
    Connection,
    /// The engine refused the statement or the data
    Rejected,
    /// The driver does not implement the call
    Unsupported,
    Other,
}

impl fmt::Display for DriverErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            DriverErrorKind::Connection => "connection error",
            DriverErrorKind::Rejected => "statement rejected",
            DriverErrorKind::Unsupported => "unsupported",
            DriverErrorKind::Other => "driver error",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Error)]
#[error("{kind}: {message}")]
pub struct DriverError {
    pub kind: DriverErrorKind,
    pub message: String,
}

impl DriverError {
    pub fn new(kind: DriverErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn connection(message: impl Into<String>) -> Self {
        Self::new(DriverErrorKind::Connection, message)
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self::new(DriverErrorKind::Rejected, message)
    }

    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::new(DriverErrorKind::Unsupported, message)
    }
}

/// Factory for physical connections. Implementations bridge to the remote engine or stand in
/// for it (see the `sqlite` module).
pub trait Driver: Send + Sync + 'static {
    /// Open one physical connection. Blocking.
    ///
    /// # Errors
    /// Returns [`DriverError`] when the engine cannot be reached.
    fn connect(&self) -> Result<Box<dyn DriverConnection>, DriverError>;

    /// `true` for a substitute in-process engine.
    fn is_in_memory(&self) -> bool {
        false
    }

    fn name(&self) -> &str;
}

/// One physical connection. Every method blocks; none is reentrant.
pub trait DriverConnection: Send {
    /// # Errors
    /// Returns [`DriverError`] if the engine rejects the SQL.
    fn prepare(&mut self, sql: &str, keys: GeneratedKeys) -> Result<PreparedInfo, DriverError>;

    /// Bind `params` and run the statement.
    ///
    /// # Errors
    /// Returns [`DriverError`] if binding or execution fails.
    fn execute(
        &mut self,
        stmt: StatementHandle,
        params: &[WireValue],
    ) -> Result<Execution, DriverError>;

    /// Next row of an executed query, `None` once exhausted.
    ///
    /// # Errors
    /// Returns [`DriverError`] if the cursor cannot advance.
    fn fetch_next(&mut self, stmt: StatementHandle) -> Result<Option<Vec<WireValue>>, DriverError>;

    /// Run the statement once per tuple as one batched call; returns per-tuple counts.
    ///
    /// # Errors
    /// Returns [`DriverError`] if any tuple fails.
    fn execute_batch(
        &mut self,
        stmt: StatementHandle,
        batch: &[Vec<WireValue>],
    ) -> Result<Vec<u64>, DriverError>;

    /// # Errors
    /// Returns [`DriverError`] if the engine fails to release the statement.
    fn close(&mut self, stmt: StatementHandle) -> Result<(), DriverError>;

    /// # Errors
    /// Returns [`DriverError`] if the mode cannot be switched.
    fn set_auto_commit(&mut self, enabled: bool) -> Result<(), DriverError>;

    /// # Errors
    /// Returns [`DriverError`] if the commit fails.
    fn commit(&mut self) -> Result<(), DriverError>;

    /// # Errors
    /// Returns [`DriverError`] if the rollback fails.
    fn rollback(&mut self) -> Result<(), DriverError>;

    /// Invoke a remote program with a packed parameter buffer; returns the packed result buffer.
    ///
    /// # Errors
    /// Returns [`DriverError`] if the call fails or the driver cannot call programs.
    fn call_program(&mut self, name: &str, input: &[u8]) -> Result<Vec<u8>, DriverError>;

    /// Open a catalog cursor; rows are read with [`DriverConnection::fetch_next`].
    ///
    /// # Errors
    /// Returns [`DriverError`] if the catalog cannot be read.
    fn catalog(&mut self, request: &CatalogRequest) -> Result<CatalogCursor, DriverError>;

    fn is_valid(&mut self) -> bool {
        true
    }
}
