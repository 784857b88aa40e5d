use anyhow::Result;
use colored::*;
use serde_json::{json, Value};
use std::time::{Duration, Instant};
use uuid::Uuid;

use crate::api_client::ApiClient;
use crate::output::{print_event, TestResult};
use crate::sse_client::Connection;

const EVENT_TIMEOUT: Duration = Duration::from_secs(5);

/// Channel names are unique per run so concurrent runs against one server don't interfere.
fn channel(name: &str) -> String {
    format!("{}-{}", name, Uuid::new_v4())
}

async fn connect(api_client: &ApiClient, channel: &str, label: &str) -> Result<Connection> {
    let connection = Connection::establish(
        api_client.client(),
        api_client.base_url(),
        channel,
        label.to_string(),
    )
    .await?;
    println!("{} {} connected to {}", "✓".green(), label, channel);
    Ok(connection)
}

/// Wait for `event_type` on `connection` and compare its payload with `expected`.
async fn expect_event(
    connection: &mut Connection,
    event_type: &str,
    expected: &Value,
) -> std::result::Result<(), String> {
    match connection.wait_for_event(event_type, EVENT_TIMEOUT).await {
        Ok(event) => {
            print_event(&connection.label, &event);
            if &event.data == expected {
                Ok(())
            } else {
                Err(format!(
                    "{}: expected {} data {}, got {}",
                    connection.label, event_type, expected, event.data
                ))
            }
        }
        Err(e) => Err(format!("{}: {}", connection.label, e)),
    }
}

fn conclude(
    scenario: &str,
    start: Instant,
    outcome: std::result::Result<(), String>,
) -> TestResult {
    match outcome {
        Ok(()) => {
            println!("{} {} passed", "✓".green(), scenario);
            TestResult::pass(scenario, start.elapsed())
        }
        Err(message) => {
            println!("{} {}", "✗".red(), message);
            TestResult::fail(scenario, message, start.elapsed())
        }
    }
}

/// Two streams on one channel both receive a single publish.
pub async fn test_fan_out(api_client: &ApiClient) -> Result<TestResult> {
    let start = Instant::now();
    println!("\n{}", "=== TEST: Fan Out ===".bright_cyan().bold());

    let channel = channel("fan-out");
    let mut first = connect(api_client, &channel, "Stream 1").await?;
    let mut second = connect(api_client, &channel, "Stream 2").await?;

    let data = json!({ "a": 1, "b": 2 });
    let delivery = api_client.publish(&channel, "one", data.clone()).await?;
    println!(
        "{} Published to {} subscriber(s)",
        "→".blue(),
        delivery.delivered
    );

    let mut outcome = expect_event(&mut first, "one", &data).await;
    if outcome.is_ok() {
        outcome = expect_event(&mut second, "one", &data).await;
    }

    Ok(conclude("fan_out", start, outcome))
}

/// A publish on one channel never reaches a stream on another.
pub async fn test_exclusive_channels(api_client: &ApiClient) -> Result<TestResult> {
    let start = Instant::now();
    println!("\n{}", "=== TEST: Exclusive Channels ===".bright_cyan().bold());

    let foo = channel("foo");
    let bar = channel("bar");
    let mut foo_stream = connect(api_client, &foo, "Foo stream").await?;
    let mut bar_stream = connect(api_client, &bar, "Bar stream").await?;

    api_client.publish(&foo, "one", json!(1)).await?;

    let mut outcome = expect_event(&mut foo_stream, "one", &json!(1)).await;
    if outcome.is_ok() {
        println!("{} Checking that the bar stream stays silent...", "→".blue());
        if let Some(event) = bar_stream.next_event(Duration::from_millis(500)).await {
            outcome = Err(format!(
                "Bar stream received {} published to foo",
                event.event_type
            ));
        }
    }

    Ok(conclude("exclusive_channels", start, outcome))
}

/// Line breaks inside payload strings survive the data-line framing.
pub async fn test_newlines(api_client: &ApiClient) -> Result<TestResult> {
    let start = Instant::now();
    println!("\n{}", "=== TEST: Newlines ===".bright_cyan().bold());

    let channel = channel("newlines");
    let mut stream = connect(api_client, &channel, "Stream").await?;

    let data = json!({ "text": "foo\n\n\nbar" });
    api_client.publish(&channel, "newlines", data.clone()).await?;

    let outcome = expect_event(&mut stream, "newlines", &data).await;

    Ok(conclude("newlines", start, outcome))
}

/// Sequential publishes arrive in publish order.
pub async fn test_ordering(api_client: &ApiClient) -> Result<TestResult> {
    let start = Instant::now();
    println!("\n{}", "=== TEST: Ordering ===".bright_cyan().bold());

    let channel = channel("ordering");
    let mut stream = connect(api_client, &channel, "Stream").await?;

    api_client.publish(&channel, "one", json!(1)).await?;
    api_client.publish(&channel, "two", json!(2)).await?;

    let mut received = Vec::new();
    while received.len() < 2 {
        match stream.next_event(EVENT_TIMEOUT).await {
            Some(event) => {
                print_event(&stream.label, &event);
                received.push((event.event_type, event.data));
            }
            None => break,
        }
    }

    let expected = vec![
        ("one".to_string(), json!(1)),
        ("two".to_string(), json!(2)),
    ];
    let outcome = if received == expected {
        Ok(())
    } else {
        Err(format!("Expected {:?}, got {:?}", expected, received))
    };

    Ok(conclude("ordering", start, outcome))
}

/// Closing a stream removes its subscription; later publishes still succeed.
pub async fn test_close(api_client: &ApiClient) -> Result<TestResult> {
    let start = Instant::now();
    println!("\n{}", "=== TEST: Close ===".bright_cyan().bold());

    let channel = channel("close");
    let stream = connect(api_client, &channel, "Stream").await?;

    println!("{} Closing the stream...", "→".blue());
    stream.close();

    // The server learns about the hangup on its next read or failed write.
    let deadline = Instant::now() + EVENT_TIMEOUT;
    let outcome = loop {
        let delivery = api_client.publish(&channel, "ping", Value::Null).await?;
        if delivery.delivered == 0 && delivery.failed == 0 {
            println!("{} Subscription removed", "✓".green());
            break Ok(());
        }
        if Instant::now() >= deadline {
            break Err(format!(
                "Subscription still live after close: {:?}",
                delivery
            ));
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    };

    Ok(conclude("close", start, outcome))
}
