#![cfg(feature = "sqlite")]

mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use remote_sql_middleware::prelude::*;

use common::{RecordingDriver, recording_client};

fn order_program() -> ProgramSchema {
    ProgramSchema::new(
        "ORDPGM",
        vec![
            ProgramField::text("CUSTNO", 8),
            ProgramField::decimal("AMOUNT", 4, 2),
        ],
    )
}

fn order_input(custno: &str, amount: &str) -> ProgramRecord {
    let mut input = ProgramRecord::new();
    input.insert("CUSTNO".into(), RowValues::Text(custno.into()));
    input.insert("AMOUNT".into(), RowValues::Decimal(amount.parse().expect("decimal")));
    input
}

/// Remote side of ORDPGM: upper-cases the customer and doubles the amount.
fn doubling_program(name: &str, input: &[u8]) -> Vec<u8> {
    assert_eq!(name, "ORDPGM");
    assert_eq!(input.len(), 12);
    let mut out = input[..8].to_ascii_uppercase();
    let cents = i32::from_be_bytes([input[8], input[9], input[10], input[11]]);
    out.extend_from_slice(&(cents * 2).to_be_bytes());
    out
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn calls_are_packed_and_unpacked_through_the_driver() -> Result<(), Box<dyn std::error::Error>> {
    let driver = RecordingDriver::new().with_program(Arc::new(doubling_program));
    let (client, counters) = recording_client(driver, 8).await?;
    let program = client.define_program(order_program())?;
    assert_eq!(program.name(), "ORDPGM");

    let output = program.call(&order_input("c-42", "12.34")).await?;
    assert_eq!(output["CUSTNO"], RowValues::Text("C-42".into()));
    assert_eq!(output["AMOUNT"].as_decimal().map(|d| d.to_string()).as_deref(), Some("24.68"));
    assert_eq!(counters.program_calls(), 1);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn mocks_registered_after_definition_still_apply() -> Result<(), Box<dyn std::error::Error>> {
    let driver = RecordingDriver::new().with_program(Arc::new(doubling_program));
    let (client, counters) = recording_client(driver, 8).await?;
    let program = client.define_program(order_program())?;

    let mock_calls = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&mock_calls);
    client.mock_pgm("ORDPGM", move |input| {
        seen.fetch_add(1, Ordering::SeqCst);
        let mut output = input.clone();
        output.insert("CUSTNO".into(), RowValues::Text("MOCKED".into()));
        output
    });

    for _ in 0..3 {
        let output = program.call(&order_input("c-1", "1.00")).await?;
        assert_eq!(output["CUSTNO"], RowValues::Text("MOCKED".into()));
    }
    assert_eq!(mock_calls.load(Ordering::SeqCst), 3);
    assert_eq!(counters.program_calls(), 0);

    // re-registering replaces the mock; clones of the client share the registry
    client.clone().mock_pgm("ORDPGM", |_| ProgramRecord::new());
    assert!(program.call(&order_input("c-1", "1.00")).await?.is_empty());

    assert!(client.unmock_pgm("ORDPGM"));
    assert!(!client.unmock_pgm("ORDPGM"));
    let output = program.call(&order_input("c-1", "1.00")).await?;
    assert_eq!(output["CUSTNO"], RowValues::Text("C-1".into()));
    assert_eq!(counters.program_calls(), 1);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn mocks_answer_even_invalid_inputs() -> Result<(), Box<dyn std::error::Error>> {
    let client = Client::in_memory().await?;
    let program = client.define_program(order_program())?;
    client.mock_pgm("ORDPGM", |_| {
        let mut out = ProgramRecord::new();
        out.insert("OK".into(), RowValues::Bool(true));
        out
    });
    let output = program.call(&order_input("MUCH-TOO-LONG-CUSTOMER", "1.00")).await?;
    assert_eq!(output["OK"], RowValues::Bool(true));

    client.clear_mocks();
    let err = program.call(&order_input("c-1", "1.00")).await.unwrap_err();
    // the in-process engine cannot call programs
    assert_eq!(err.category(), ErrorCategory::Environment);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn oversized_values_are_programming_errors() -> Result<(), Box<dyn std::error::Error>> {
    let driver = RecordingDriver::new().with_program(Arc::new(doubling_program));
    let (client, counters) = recording_client(driver, 8).await?;
    let program = client.define_program(order_program())?;

    let err = program
        .call(&order_input("MUCH-TOO-LONG", "1.00"))
        .await
        .unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Programming);
    let context = err.context().expect("call context");
    assert_eq!(context.sql, "CALL ORDPGM");
    assert_eq!(context.params.len(), 1);
    assert!(context.params[0].contains(&RowValues::Text("MUCH-TOO-LONG".into())));

    let err = program
        .call(&order_input("c-1", "99999999.00"))
        .await
        .unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Programming);
    assert_eq!(counters.program_calls(), 0);

    let bad = ProgramSchema::new("BAD", vec![ProgramField::decimal("N", 32, 0)]);
    assert!(client.define_program(bad).is_err());
    Ok(())
}

#[test]
fn schemas_deserialize_from_json() {
    let schema: ProgramSchema = serde_json::from_str(
        r#"{"programName": "ORDPGM", "fields": [
            {"name": "CUSTNO", "byteSize": 8},
            {"name": "AMOUNT", "byteSize": 4, "decimalCount": 2}
        ]}"#,
    )
    .unwrap();
    assert_eq!(schema, order_program());
    assert_eq!(schema.buffer_len(), 12);
}
