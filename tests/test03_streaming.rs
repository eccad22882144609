#![cfg(feature = "sqlite")]

mod common;

use std::time::Duration;

use futures_util::StreamExt;
use remote_sql_middleware::prelude::*;

use common::{RecordingDriver, recording_client};

async fn seed(client: &Client, rows: i64) -> Result<(), SqlMiddlewareDbError> {
    client
        .update(
            "CREATE TABLE ITEMS (ID INTEGER PRIMARY KEY AUTOINCREMENT, NAME VARCHAR(20), DUE DATE)",
            &[],
        )
        .await?;
    let batch: Vec<Vec<RowValues>> = (1..=rows)
        .map(|i| vec![RowValues::Text(format!("item-{i}")), RowValues::Text("2024-05-01".into())])
        .collect();
    client
        .batch_update("INSERT INTO ITEMS (NAME, DUE) VALUES (?, ?)", &batch)
        .await?;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn json_stream_yields_every_row_in_order() -> Result<(), Box<dyn std::error::Error>> {
    let client = Client::in_memory().await?;
    seed(&client, 110).await?;

    let json = client
        .execute("SELECT ID, NAME FROM ITEMS ORDER BY ID", &[])
        .await?
        .as_stream(StreamOptions::buffer_size(8))
        .collect_string()
        .await?;
    let parsed: serde_json::Value = serde_json::from_str(&json)?;
    let rows = parsed.as_array().expect("array");
    assert_eq!(rows.len(), 110);
    for (i, row) in rows.iter().enumerate() {
        let id = i64::try_from(i)? + 1;
        assert_eq!(row[0], id);
        assert_eq!(row[1], format!("item-{id}"));
    }
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn row_stream_matches_materialized_query() -> Result<(), Box<dyn std::error::Error>> {
    let client = Client::in_memory().await?;
    seed(&client, 25).await?;

    let sql = "SELECT ID, NAME, DUE FROM ITEMS ORDER BY ID";
    let streamed = client.execute(sql, &[]).await?.as_iterable().collect_rows().await?;
    let materialized = client.query(sql, &[]).await?.into_rows();
    assert_eq!(streamed, materialized);
    assert_eq!(streamed.len(), 25);
    assert!(streamed[0][2].as_date().is_some());
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn fetching_never_runs_ahead_of_the_buffer() -> Result<(), Box<dyn std::error::Error>> {
    let (client, counters) = recording_client(RecordingDriver::new(), 4).await?;
    seed(&client, 60).await?;
    let before = counters.fetches();

    let mut rows = client
        .execute("SELECT ID FROM ITEMS ORDER BY ID", &[])
        .await?
        .rows(StreamOptions::buffer_size(5));
    for expected in 1..=3 {
        let row = rows.next().await.expect("row")?;
        assert_eq!(row[0], RowValues::Int(expected));
    }
    // give the producer every chance to run ahead
    tokio::time::sleep(Duration::from_millis(100)).await;
    let fetched = counters.fetches() - before;
    assert!(fetched <= 3 + 5, "fetched {fetched} rows for 3 consumed");
    assert!(RowStream::buffered(&rows) <= 5);

    let mut consumed = 3;
    while let Some(row) = rows.next().await {
        row?;
        consumed += 1;
        assert!(RowStream::buffered(&rows) <= 5);
    }
    assert_eq!(consumed, 60);
    assert!(rows.peak_buffered() <= 5);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn closing_early_stops_fetching() -> Result<(), Box<dyn std::error::Error>> {
    let (client, counters) = recording_client(RecordingDriver::new(), 4).await?;
    seed(&client, 110).await?;
    let before = counters.fetches();

    let mut rows = client
        .execute("SELECT ID FROM ITEMS ORDER BY ID", &[])
        .await?
        .rows(StreamOptions::buffer_size(4));
    for _ in 0..2 {
        rows.next().await.expect("row")?;
    }
    rows.close().await?;
    let after_close = counters.fetches();
    rows.close().await?;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(counters.fetches(), after_close);
    assert!(after_close - before < 110);

    // the connection is usable again once the stream is gone
    drop(rows);
    assert_eq!(common::count_rows(&client, "ITEMS").await?, 110);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn closed_row_stream_yields_nothing_more() -> Result<(), Box<dyn std::error::Error>> {
    let client = Client::in_memory().await?;
    seed(&client, 40).await?;

    let mut rows = client
        .execute("SELECT ID FROM ITEMS ORDER BY ID", &[])
        .await?
        .rows(StreamOptions::buffer_size(8));
    assert_eq!(rows.next().await.expect("row")?, vec![RowValues::Int(1)]);
    // let the producer fill the buffer ahead of us
    tokio::time::sleep(Duration::from_millis(100)).await;

    rows.close().await?;
    assert!(rows.is_closed());
    assert_eq!(RowStream::buffered(&rows), 0);
    assert!(rows.next().await.is_none());
    assert!(rows.next().await.is_none());
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn update_statement_streams_no_rows() -> Result<(), Box<dyn std::error::Error>> {
    let client = Client::in_memory().await?;
    seed(&client, 3).await?;

    let statement = client
        .execute("UPDATE ITEMS SET NAME = ? WHERE ID = ?", &[RowValues::Text("x".into()), RowValues::Int(2)])
        .await?;
    assert_eq!(statement.updated()?, 1);
    let mut rows = statement.rows(StreamOptions::buffer_size(4));
    assert!(rows.is_closed());
    assert!(rows.metadata().is_empty());
    assert!(rows.next().await.is_none());
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn closed_json_stream_is_still_valid_json() -> Result<(), Box<dyn std::error::Error>> {
    let client = Client::in_memory().await?;
    seed(&client, 30).await?;

    let mut stream = client
        .execute("SELECT ID FROM ITEMS ORDER BY ID", &[])
        .await?
        .as_stream(StreamOptions::buffer_size(2));
    let mut out = String::new();
    for _ in 0..3 {
        out.push_str(&stream.next().await.expect("chunk")?);
    }
    stream.close().await?;
    out.push_str(&stream.collect_string().await?);

    let parsed: serde_json::Value = serde_json::from_str(&out)?;
    assert_eq!(parsed, serde_json::json!([[1], [2]]));
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn conversion_failure_ends_the_stream_with_an_error() -> Result<(), Box<dyn std::error::Error>> {
    let client = Client::in_memory().await?;
    seed(&client, 5).await?;
    client
        .update("UPDATE ITEMS SET DUE = 'not-a-date' WHERE ID = 3", &[])
        .await?;

    let sql = "SELECT ID, DUE FROM ITEMS ORDER BY ID";
    let mut rows = client.execute(sql, &[]).await?.as_iterable();
    let mut ok = 0;
    let mut failure = None;
    while let Some(row) = rows.next().await {
        match row {
            Ok(_) => ok += 1,
            Err(err) => {
                failure = Some(err);
                break;
            }
        }
    }
    assert_eq!(ok, 2);
    let err = failure.expect("stream error");
    assert_eq!(err.context().map(|c| c.sql.as_str()), Some(sql));
    assert!(rows.next().await.is_none());

    // the call that opened the cursor succeeded; the whole-result form reports the same failure
    assert!(client.query(sql, &[]).await.is_err());
    Ok(())
}
