//! Common imports.
//!
//! ```
//! use remote_sql_middleware::prelude::*;
//! ```

pub use crate::client::Client;
pub use crate::config::{ClientBuilder, ClientConfig, QueryOptions, StreamOptions, WriteOptions};
pub use crate::cursor::{JsonRowStream, RowStream, Statement};
pub use crate::driver::{CatalogFilter, Driver, DriverConnection, DriverError, GeneratedKeys};
pub use crate::error::{ErrorCategory, SqlMiddlewareDbError};
pub use crate::executor::{AsyncDatabaseExecutor, Record};
pub use crate::metadata::{ColumnInfo, PrimaryKeyInfo, TableInfo, TableStream};
pub use crate::program::{Program, ProgramField, ProgramRecord, ProgramSchema};
pub use crate::results::{CustomDbRow, ResultSet};
pub use crate::transaction::Transaction;
pub use crate::types::{ColumnMetadata, Decimal, EngineKind, RowValues};
pub use crate::write::{WriteSink, WriteSummary};

#[cfg(feature = "sqlite")]
pub use crate::sqlite::SqliteDriver;
