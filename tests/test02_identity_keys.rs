#![cfg(feature = "sqlite")]

mod common;

use remote_sql_middleware::prelude::*;

/// Identity table whose next generated key is `start + 1`.
async fn identity_table(client: &Client, table: &str, start: i64) -> Result<(), SqlMiddlewareDbError> {
    client
        .update(
            &format!("CREATE TABLE {table} (ID INTEGER PRIMARY KEY AUTOINCREMENT, NAME VARCHAR(20))"),
            &[],
        )
        .await?;
    client
        .update(
            "INSERT INTO sqlite_sequence (name, seq) VALUES (?, ?)",
            &[RowValues::Text(table.into()), RowValues::Int(start)],
        )
        .await?;
    Ok(())
}

fn record(name: &str) -> Record {
    let mut record = Record::new();
    record.insert("NAME".into(), RowValues::Text(name.into()));
    record
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn single_table_scenario() -> Result<(), Box<dyn std::error::Error>> {
    let client = Client::in_memory().await?;
    client
        .update("CREATE TABLE T (ID INTEGER PRIMARY KEY AUTOINCREMENT, NAME VARCHAR(20))", &[])
        .await?;
    let id = client
        .insert_and_get_id("INSERT INTO T (NAME) VALUES (?)", &[RowValues::Text("only".into())])
        .await?;
    assert_eq!(id, RowValues::Int(1));

    let rs = client.query("select * from T", &[]).await?;
    assert_eq!(rs.len(), 1);
    assert_eq!(rs.results[0].values, vec![RowValues::Int(1), RowValues::Text("only".into())]);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn insert_and_get_id_yields_contiguous_keys() -> Result<(), Box<dyn std::error::Error>> {
    let client = Client::in_memory().await?;
    identity_table(&client, "T", 1000).await?;

    let mut keys = Vec::new();
    for name in ["a", "b", "c"] {
        keys.push(
            client
                .insert_and_get_id("INSERT INTO T (NAME) VALUES (?)", &[RowValues::Text(name.into())])
                .await?,
        );
    }
    assert_eq!(keys, vec![RowValues::Int(1001), RowValues::Int(1002), RowValues::Int(1003)]);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn insert_list_returns_keys_in_record_order() -> Result<(), Box<dyn std::error::Error>> {
    let client = Client::in_memory().await?;
    identity_table(&client, "T", 41).await?;

    let keys = client
        .insert_list("T", "ID", &[record("foo"), record("bar")])
        .await?;
    assert_eq!(keys, vec![RowValues::Int(42), RowValues::Int(43)]);
    assert_eq!(common::count_rows(&client, "T").await?, 2);

    let rs = client.query("SELECT NAME FROM T WHERE ID = ?", &[keys[1].clone()]).await?;
    assert_eq!(rs.results[0].get("NAME").and_then(RowValues::as_text), Some("bar"));

    assert!(client.insert_list("T", "ID", &[]).await?.is_empty());
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn insert_list_is_all_or_nothing() -> Result<(), Box<dyn std::error::Error>> {
    let client = Client::in_memory().await?;
    client
        .update(
            "CREATE TABLE U (ID INTEGER PRIMARY KEY AUTOINCREMENT, NAME VARCHAR(20) UNIQUE)",
            &[],
        )
        .await?;

    let err = client
        .insert_list("U", "ID", &[record("dup"), record("other"), record("dup")])
        .await
        .unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Environment);
    assert_eq!(common::count_rows(&client, "U").await?, 0);

    let mut odd = record("x");
    odd.insert("EXTRA".into(), RowValues::Int(1));
    let err = client
        .insert_list("U", "ID", &[record("y"), odd])
        .await
        .unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Programming);
    assert_eq!(err.context().map(|c| c.params.len()), Some(2));
    assert_eq!(common::count_rows(&client, "U").await?, 0);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn statement_without_a_key_is_an_error() -> Result<(), Box<dyn std::error::Error>> {
    let client = Client::in_memory().await?;
    identity_table(&client, "T", 0).await?;
    let err = client
        .insert_and_get_id("UPDATE T SET NAME = 'z' WHERE ID = -1", &[])
        .await
        .unwrap_err();
    assert!(err.to_string().contains("no generated key"));
    assert_eq!(
        err.context().map(|c| c.sql.as_str()),
        Some("UPDATE T SET NAME = 'z' WHERE ID = -1")
    );
    Ok(())
}
