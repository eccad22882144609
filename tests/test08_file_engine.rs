#![cfg(feature = "sqlite")]

use std::sync::Arc;
use std::time::Duration;

use remote_sql_middleware::prelude::*;
use tempfile::tempdir;

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn file_database_survives_reconnects() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    let path = dir.path().join("ledger.db");

    {
        let client = Client::connect(
            Arc::new(SqliteDriver::open(&path)?),
            ClientConfig::default(),
        )
        .await?;
        client
            .update("CREATE TABLE NOTES (ID INTEGER PRIMARY KEY AUTOINCREMENT, BODY VARCHAR(100))", &[])
            .await?;
        client
            .batch_update(
                "INSERT INTO NOTES (BODY) VALUES (?)",
                &[vec![RowValues::Text("one".into())], vec![RowValues::Text("two".into())]],
            )
            .await?;
    }

    let client = Client::builder()
        .pool_max_size(2)
        .connection_timeout(Duration::from_secs(5))
        .build(Arc::new(SqliteDriver::open(&path)?))
        .await?;
    let rs = client.query("SELECT BODY FROM NOTES ORDER BY ID", &[]).await?;
    let bodies: Vec<&str> = rs
        .results
        .iter()
        .filter_map(|r| r.get("BODY").and_then(RowValues::as_text))
        .collect();
    assert_eq!(bodies, vec!["one", "two"]);
    assert_eq!(client.config().pool_max_size, 2);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn client_config_selects_the_engine() -> Result<(), Box<dyn std::error::Error>> {
    let config = ClientConfig::from_json_str(r#"{"engine": "in-memory", "stream_buffer_size": 3}"#)?;
    let client = ClientBuilder::from_config(config).build_in_memory().await?;
    assert!(client.is_in_memory());
    assert_eq!(client.config().stream_buffer_size, 3);
    assert_eq!(client.config().engine, EngineKind::InMemory);

    let state = client.pool_state();
    assert!(state.idle_connections <= state.connections);

    assert!(ClientConfig::from_json_str(r#"{"engine": "mainframe"}"#).is_err());
    assert!(ClientConfig::from_json_str(r#"{"pool_max_size": 0}"#).is_err());
    Ok(())
}
