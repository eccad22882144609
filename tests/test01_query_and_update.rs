#![cfg(feature = "sqlite")]

mod common;

use chrono::{NaiveDate, NaiveDateTime};
use remote_sql_middleware::prelude::*;

const CREATE: &str = "CREATE TABLE ORDERS (
    ID INTEGER PRIMARY KEY AUTOINCREMENT,
    NAME VARCHAR(40),
    CODE CHAR(6),
    AMOUNT DECIMAL(15,2),
    SHIPPED DATE,
    CREATED TIMESTAMP,
    NOTE VARCHAR(100)
)";

async fn orders_client() -> Result<Client, SqlMiddlewareDbError> {
    let client = Client::in_memory().await?;
    client.update(CREATE, &[]).await?;
    Ok(client)
}

fn ts(s: &str) -> NaiveDateTime {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f").unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn inserted_row_reads_back_with_the_same_values() -> Result<(), Box<dyn std::error::Error>> {
    let client = orders_client().await?;
    assert!(client.is_in_memory());

    let amount: Decimal = "1234.50".parse()?;
    let shipped = NaiveDate::from_ymd_opt(2024, 2, 29).unwrap();
    let created = ts("2024-03-01 08:15:30.125000");
    let count = client
        .update(
            "INSERT INTO ORDERS (NAME, CODE, AMOUNT, SHIPPED, CREATED, NOTE) VALUES (?, ?, ?, ?, ?, ?)",
            &[
                RowValues::Text("widget".into()),
                RowValues::Text("AB    ".into()),
                RowValues::Decimal(amount),
                RowValues::Date(shipped),
                RowValues::Timestamp(created),
                RowValues::Null,
            ],
        )
        .await?;
    assert_eq!(count, 1);

    let rs = client.query("SELECT * FROM ORDERS", &[]).await?;
    assert_eq!(rs.len(), 1);
    assert_eq!(
        rs.column_names(),
        vec!["ID", "NAME", "CODE", "AMOUNT", "SHIPPED", "CREATED", "NOTE"]
    );
    let row = &rs.results[0];
    assert_eq!(row.get("ID"), Some(&RowValues::Int(1)));
    assert_eq!(row.get("NAME").and_then(RowValues::as_text), Some("widget"));
    assert_eq!(row.get("CODE").and_then(RowValues::as_text), Some("AB    "));
    let read_amount = row.get("AMOUNT").and_then(RowValues::as_decimal).unwrap();
    assert_eq!(read_amount, amount);
    assert_eq!(read_amount.scale(), 2);
    assert_eq!(read_amount.to_string(), "1234.50");
    assert_eq!(row.get("SHIPPED").and_then(RowValues::as_date), Some(shipped));
    assert_eq!(row.get("CREATED").and_then(RowValues::as_timestamp), Some(created));
    assert!(row.get("NOTE").is_some_and(RowValues::is_null));
    // column lookup falls back to case-insensitive matching
    assert_eq!(row.get("name").and_then(RowValues::as_text), Some("widget"));

    let amount_meta = &rs.columns()[3];
    assert_eq!(amount_meta.type_name, "DECIMAL");
    assert_eq!((amount_meta.precision, amount_meta.scale), (15, 2));

    let trimmed = client
        .query_with_options("SELECT CODE, NAME FROM ORDERS", &[], QueryOptions::trimmed())
        .await?;
    assert_eq!(trimmed.results[0].get("CODE").and_then(RowValues::as_text), Some("AB"));

    let objects = rs.to_json_objects();
    assert_eq!(objects[0]["NAME"], "widget");
    assert_eq!(objects[0]["AMOUNT"], "1234.50");
    assert_eq!(objects[0]["SHIPPED"], "2024-02-29");
    assert!(objects[0]["NOTE"].is_null());
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn update_reports_affected_rows() -> Result<(), Box<dyn std::error::Error>> {
    let client = orders_client().await?;
    for name in ["a", "b", "c"] {
        client
            .update(
                "INSERT INTO ORDERS (NAME, AMOUNT) VALUES (?, ?)",
                &[RowValues::Text(name.into()), RowValues::Int(5)],
            )
            .await?;
    }
    let changed = client
        .update(
            "UPDATE ORDERS SET AMOUNT = ? WHERE NAME <> ?",
            &[RowValues::Decimal("7.25".parse()?), RowValues::Text("a".into())],
        )
        .await?;
    assert_eq!(changed, 2);

    let rs = client
        .query("SELECT AMOUNT FROM ORDERS WHERE NAME = ?", &[RowValues::Text("c".into())])
        .await?;
    assert_eq!(rs.results[0].get("AMOUNT").and_then(RowValues::as_decimal), Some("7.25".parse()?));
    assert_eq!(common::count_rows(&client, "ORDERS").await?, 3);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn arity_mismatch_is_a_programming_error_with_context() -> Result<(), Box<dyn std::error::Error>> {
    let client = orders_client().await?;
    let sql = "INSERT INTO ORDERS (NAME, AMOUNT) VALUES (?, ?)";
    let err = client
        .update(sql, &[RowValues::Text("only-one".into())])
        .await
        .unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Programming);
    let context = err.context().expect("context attached");
    assert_eq!(context.sql, sql);
    assert_eq!(context.params, vec![vec![RowValues::Text("only-one".into())]]);
    assert_eq!(common::count_rows(&client, "ORDERS").await?, 0);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn engine_rejections_are_environment_errors() -> Result<(), Box<dyn std::error::Error>> {
    let client = orders_client().await?;
    let err = client
        .query("SELECT * FROM MISSING_TABLE WHERE ID = ?", &[RowValues::Int(1)])
        .await
        .unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Environment);
    assert_eq!(
        err.context().map(|c| c.sql.as_str()),
        Some("SELECT * FROM MISSING_TABLE WHERE ID = ?")
    );
    assert!(std::error::Error::source(&err).is_some());

    // the client keeps working afterwards
    assert_eq!(common::count_rows(&client, "ORDERS").await?, 0);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn statements_expose_counts_and_rows() -> Result<(), Box<dyn std::error::Error>> {
    let client = orders_client().await?;
    let insert = client
        .execute("INSERT INTO ORDERS (NAME) VALUES (?)", &[RowValues::Text("x".into())])
        .await?;
    assert!(!insert.is_query());
    assert!(insert.is_closed());
    assert_eq!(insert.updated()?, 1);
    assert!(insert.metadata().is_empty());

    let mut select = client.execute("SELECT ID, NAME FROM ORDERS", &[]).await?;
    assert!(select.is_query());
    assert!(select.updated().is_err());
    assert_eq!(select.metadata()[1].name, "NAME");
    select.close().await?;
    select.close().await?;
    assert!(select.is_closed());
    assert!(select.as_array().await?.is_empty());

    let rows = client
        .execute("SELECT ID, NAME FROM ORDERS", &[])
        .await?
        .as_array()
        .await?;
    assert_eq!(rows, vec![vec![RowValues::Int(1), RowValues::Text("x".into())]]);
    Ok(())
}
