//! Catalog rows synthesized from `sqlite_master` and `pragma_table_info`.

use rusqlite::Connection;

use crate::driver::{CatalogFilter, CatalogRequest, WireValue};
use crate::types::{ColumnMetadata, parse_declared_type};

/// SQLite has one schema per attached database; only `main` is reported.
pub(super) const SCHEMA: &str = "MAIN";

type CatalogRows = (Vec<ColumnMetadata>, Vec<Vec<WireValue>>);

pub(super) fn read(conn: &Connection, request: &CatalogRequest) -> rusqlite::Result<CatalogRows> {
    match request {
        CatalogRequest::Tables(filter) => tables(conn, filter),
        CatalogRequest::Columns(filter) => columns(conn, filter),
        CatalogRequest::PrimaryKeys(filter) => primary_keys(conn, filter),
    }
}

fn table_names(conn: &Connection, filter: &CatalogFilter) -> rusqlite::Result<Vec<String>> {
    let mut stmt = conn.prepare_cached(
        "SELECT name FROM sqlite_master \
         WHERE type IN ('table', 'view') AND name NOT LIKE 'sqlite_%' \
         ORDER BY name",
    )?;
    let names = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(names
        .into_iter()
        .filter(|name| filter.matches(SCHEMA, name))
        .collect())
}

struct TableColumn {
    name: String,
    declared: String,
    pk: i64,
}

fn table_columns(conn: &Connection, table: &str) -> rusqlite::Result<Vec<TableColumn>> {
    let mut stmt =
        conn.prepare_cached("SELECT name, type, pk FROM pragma_table_info(?1) ORDER BY cid")?;
    let columns = stmt
        .query_map([table], |row| {
            Ok(TableColumn {
                name: row.get(0)?,
                declared: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
                pk: row.get(2)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(columns)
}

fn tables(conn: &Connection, filter: &CatalogFilter) -> rusqlite::Result<CatalogRows> {
    let columns = vec![
        ColumnMetadata::new("TABLE_SCHEM", "VARCHAR", 128, 0),
        ColumnMetadata::new("TABLE_NAME", "VARCHAR", 128, 0),
        ColumnMetadata::new("REMARKS", "VARCHAR", 2000, 0),
    ];
    let rows = table_names(conn, filter)?
        .into_iter()
        .map(|name| {
            vec![
                WireValue::Text(SCHEMA.to_owned()),
                WireValue::Text(name),
                WireValue::Null,
            ]
        })
        .collect();
    Ok((columns, rows))
}

fn columns(conn: &Connection, filter: &CatalogFilter) -> rusqlite::Result<CatalogRows> {
    let columns = vec![
        ColumnMetadata::new("COLUMN_NAME", "VARCHAR", 128, 0),
        ColumnMetadata::new("TYPE_NAME", "VARCHAR", 128, 0),
        ColumnMetadata::new("COLUMN_SIZE", "INTEGER", 10, 0),
        ColumnMetadata::new("DECIMAL_DIGITS", "INTEGER", 10, 0),
    ];
    let mut rows = Vec::new();
    for table in table_names(conn, filter)? {
        for column in table_columns(conn, &table)? {
            let (type_name, precision, scale) = parse_declared_type(&column.declared);
            rows.push(vec![
                WireValue::Text(column.name),
                WireValue::Text(type_name),
                WireValue::Integer(i64::from(precision)),
                WireValue::Integer(i64::from(scale)),
            ]);
        }
    }
    Ok((columns, rows))
}

fn primary_keys(conn: &Connection, filter: &CatalogFilter) -> rusqlite::Result<CatalogRows> {
    let columns = vec![
        ColumnMetadata::new("TABLE_NAME", "VARCHAR", 128, 0),
        ColumnMetadata::new("COLUMN_NAME", "VARCHAR", 128, 0),
        ColumnMetadata::new("KEY_SEQ", "INTEGER", 5, 0),
    ];
    let mut rows = Vec::new();
    for table in table_names(conn, filter)? {
        for column in table_columns(conn, &table)? {
            if column.pk > 0 {
                rows.push(vec![
                    WireValue::Text(table.clone()),
                    WireValue::Text(column.name),
                    WireValue::Integer(column.pk),
                ]);
            }
        }
    }
    Ok((columns, rows))
}
