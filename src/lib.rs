//! Async data access over blocking, call-based SQL drivers.
//!
//! A [`Client`] pools connections opened through a [`driver::Driver`], runs each connection on
//! its own worker thread, and exposes materialized queries, flow-controlled row streams,
//! batched writes, scoped transactions, fixed-layout program calls and catalog enumeration.
//! Values are marshalled to and from [`RowValues`] using the column metadata the engine reports.
//!
//! ```no_run
//! use remote_sql_middleware::prelude::*;
//!
//! # async fn demo() -> Result<(), SqlMiddlewareDbError> {
//! let client = Client::in_memory().await?;
//! client.update("CREATE TABLE T (ID INTEGER PRIMARY KEY AUTOINCREMENT, NAME VARCHAR(20))", &[]).await?;
//! let id = client
//!     .insert_and_get_id("INSERT INTO T (NAME) VALUES (?)", &[RowValues::Text("a".into())])
//!     .await?;
//! let rows = client.query("SELECT NAME FROM T WHERE ID = ?", &[id]).await?;
//! assert_eq!(rows.results[0].get("NAME").and_then(RowValues::as_text), Some("a"));
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod cursor;
pub mod driver;
pub mod error;
pub mod executor;
pub mod marshal;
pub mod metadata;
pub mod pool;
pub mod prelude;
pub mod program;
pub mod results;
pub mod session;
#[cfg(feature = "sqlite")]
pub mod sqlite;
pub mod transaction;
pub mod types;
pub mod write;

pub use client::Client;
pub use config::{ClientBuilder, ClientConfig, QueryOptions, StreamOptions, WriteOptions};
pub use cursor::{JsonRowStream, RowStream, Statement};
pub use error::{ErrorCategory, ErrorContext, SqlMiddlewareDbError, StatementError};
pub use executor::{AsyncDatabaseExecutor, Record};
pub use results::{CustomDbRow, ResultSet};
pub use transaction::Transaction;
pub use types::{ColumnMetadata, Decimal, EngineKind, RowValues, SqlType};
pub use write::{WriteSink, WriteSummary};
