//! Catalog enumeration over the streaming materializer.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures_util::Stream;
use serde::Serialize;

use crate::config::StreamOptions;
use crate::cursor::{CursorSource, RowStream};
use crate::driver::{CatalogFilter, CatalogRequest};
use crate::error::SqlMiddlewareDbError;
use crate::pool::DriverPool;
use crate::session::Session;
use crate::types::RowValues;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableInfo {
    pub schema: String,
    pub table: String,
    pub remarks: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnInfo {
    pub name: String,
    pub type_name: String,
    pub precision: u32,
    pub scale: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrimaryKeyInfo {
    /// Key column
    pub name: String,
    pub table: String,
    /// 1-based position within a composite key
    pub key_seq: u32,
}

fn text_at(row: &[RowValues], index: usize, what: &str) -> Result<String, SqlMiddlewareDbError> {
    match row.get(index) {
        Some(RowValues::Text(s)) => Ok(s.trim_end().to_owned()),
        Some(RowValues::Int(i)) => Ok(i.to_string()),
        other => Err(SqlMiddlewareDbError::ConversionError(format!(
            "catalog {what} is {other:?}, expected text"
        ))),
    }
}

fn optional_text_at(row: &[RowValues], index: usize) -> Option<String> {
    match row.get(index) {
        Some(RowValues::Text(s)) => Some(s.trim_end().to_owned()),
        _ => None,
    }
}

fn number_at(row: &[RowValues], index: usize) -> u32 {
    row.get(index)
        .and_then(|v| match v {
            RowValues::Decimal(d) => d.to_i64(),
            other => other.as_int(),
        })
        .and_then(|n| u32::try_from(n).ok())
        .unwrap_or(0)
}

impl TableInfo {
    fn from_row(row: &[RowValues]) -> Result<Self, SqlMiddlewareDbError> {
        Ok(Self {
            schema: text_at(row, 0, "TABLE_SCHEM")?,
            table: text_at(row, 1, "TABLE_NAME")?,
            remarks: optional_text_at(row, 2).filter(|r| !r.is_empty()),
        })
    }
}

impl ColumnInfo {
    fn from_row(row: &[RowValues]) -> Result<Self, SqlMiddlewareDbError> {
        Ok(Self {
            name: text_at(row, 0, "COLUMN_NAME")?,
            type_name: text_at(row, 1, "TYPE_NAME")?,
            precision: number_at(row, 2),
            scale: number_at(row, 3),
        })
    }
}

impl PrimaryKeyInfo {
    fn from_row(row: &[RowValues]) -> Result<Self, SqlMiddlewareDbError> {
        Ok(Self {
            table: text_at(row, 0, "TABLE_NAME")?,
            name: text_at(row, 1, "COLUMN_NAME")?,
            key_seq: number_at(row, 2),
        })
    }
}

/// Tables matching a catalog filter, read lazily.
pub struct TableStream {
    rows: RowStream,
}

impl TableStream {
    /// Stop reading and release the catalog cursor.
    ///
    /// # Errors
    /// Propagates [`RowStream::close`] failures.
    pub async fn close(&mut self) -> Result<(), SqlMiddlewareDbError> {
        self.rows.close().await
    }
}

impl Stream for TableStream {
    type Item = Result<TableInfo, SqlMiddlewareDbError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.rows)
            .poll_next(cx)
            .map(|item| item.map(|row| row.and_then(|r| TableInfo::from_row(&r))))
    }
}

async fn open_catalog_stream(
    pool: &DriverPool,
    request: CatalogRequest,
    options: StreamOptions,
) -> Result<RowStream, SqlMiddlewareDbError> {
    let label = match &request {
        CatalogRequest::Tables(_) => "catalog: tables",
        CatalogRequest::Columns(_) => "catalog: columns",
        CatalogRequest::PrimaryKeys(_) => "catalog: primary keys",
    };
    let session = Session::acquire(pool).await?;
    let cursor = session
        .open_catalog(request)
        .await
        .map_err(|e| e.with_context(label, &[]))?;
    tracing::debug!(session = session.id(), handle = %cursor.handle, label, "catalog cursor opened");
    let source = CursorSource {
        session,
        handle: cursor.handle,
        columns: Arc::new(cursor.columns),
        trim: false,
        sql: label.to_owned(),
        params: Vec::new(),
    };
    Ok(RowStream::spawn(source, options.buffer_size))
}

pub(crate) async fn tables_stream(
    pool: &DriverPool,
    filter: CatalogFilter,
    options: StreamOptions,
) -> Result<TableStream, SqlMiddlewareDbError> {
    let rows = open_catalog_stream(pool, CatalogRequest::Tables(filter), options).await?;
    Ok(TableStream { rows })
}

pub(crate) async fn columns(
    pool: &DriverPool,
    filter: CatalogFilter,
    options: StreamOptions,
) -> Result<Vec<ColumnInfo>, SqlMiddlewareDbError> {
    open_catalog_stream(pool, CatalogRequest::Columns(filter), options)
        .await?
        .collect_rows()
        .await?
        .iter()
        .map(|row| ColumnInfo::from_row(row))
        .collect()
}

pub(crate) async fn primary_keys(
    pool: &DriverPool,
    filter: CatalogFilter,
    options: StreamOptions,
) -> Result<Vec<PrimaryKeyInfo>, SqlMiddlewareDbError> {
    let mut keys: Vec<PrimaryKeyInfo> =
        open_catalog_stream(pool, CatalogRequest::PrimaryKeys(filter), options)
            .await?
            .collect_rows()
            .await?
            .iter()
            .map(|row| PrimaryKeyInfo::from_row(row))
            .collect::<Result<_, _>>()?;
    keys.sort_by(|a, b| a.table.cmp(&b.table).then(a.key_seq.cmp(&b.key_seq)));
    Ok(keys)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_catalog_rows_positionally() {
        let row = vec![
            RowValues::Text("MAIN".into()),
            RowValues::Text("ORDERS    ".into()),
            RowValues::Null,
        ];
        let table = TableInfo::from_row(&row).unwrap();
        assert_eq!(table.table, "ORDERS");
        assert_eq!(table.remarks, None);

        let row = vec![
            RowValues::Text("AMOUNT".into()),
            RowValues::Text("DECIMAL".into()),
            RowValues::Int(15),
            RowValues::Int(2),
        ];
        let column = ColumnInfo::from_row(&row).unwrap();
        assert_eq!((column.precision, column.scale), (15, 2));

        assert!(TableInfo::from_row(&[RowValues::Null]).is_err());
    }
}
