use std::time::Duration;

use anyhow::{bail, Result};
use chrono::Utc;
use clap::Parser;
use lib_realtime::core::{ConnectionManager, ConnectionState, NotificationKind, UserRole};
use lib_realtime::retrieve::ApiClient;
use reqwest::Method;
use serde_json::{json, Value};
use tokio::time::{sleep, timeout};

#[derive(Parser, Debug)]
#[clap(author, version, about = "Pushes notifications through a running relay and checks the client buffer", long_about = None)]
struct Args {
    /// Relay HTTP base URL
    #[clap(long, default_value = "http://127.0.0.1:9010/")]
    relay: String,

    /// Number of notifications to emit
    #[clap(short, long, default_value_t = 200)]
    events: usize,

    /// Client buffer capacity
    #[clap(short, long, default_value_t = 50)]
    capacity: usize,

    /// Seconds to wait for delivery
    #[clap(long, default_value_t = 30)]
    wait_seconds: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = rustls::crypto::ring::default_provider().install_default();
    let args = Args::parse();

    let api = ApiClient::new(&args.relay, None, 0)?;
    let mut ws_url = api.url_for("ws", &[])?;
    let scheme = if ws_url.scheme() == "https" { "wss" } else { "ws" };
    if ws_url.set_scheme(scheme).is_err() {
        bail!("Cannot derive a WebSocket URL from {}", args.relay);
    }

    let user_id = format!("throughput-{}", Utc::now().timestamp_millis());
    let manager = ConnectionManager::websocket(ws_url.as_str()).with_buffer_capacity(args.capacity);
    let mut events = manager.subscribe();

    println!("Connecting to {} as {}...", ws_url, user_id);
    manager.connect(&user_id, UserRole::Expert).await?;
    timeout(Duration::from_secs(5), async {
        while manager.state() != ConnectionState::Authenticated {
            sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .map_err(|_| anyhow::anyhow!("No authenticated acknowledgment within 5s"))?;

    let started = Utc::now();
    for i in 1..=args.events {
        let body = json!({
            "event": NotificationKind::NewProjectAvailable.event_name(),
            "data": {
                "message": format!("n{}", i),
                "projectTitle": format!("Throughput project {}", i),
                "institutionName": "Load Test University"
            },
            "userId": user_id,
        });
        let response = api
            .request::<Value, Value>(Method::POST, "emit", None, Some(body))
            .await?
            .into_result()?;
        if response["delivered"] != json!(1) {
            bail!("Emit {} was not delivered: {}", i, response);
        }
    }
    let emitted = Utc::now();

    let mut received = 0usize;
    let deadline = Duration::from_secs(args.wait_seconds);
    let drained = timeout(deadline, async {
        while received < args.events {
            match events.recv().await {
                Ok(_) => received += 1,
                Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => received += n as usize,
                Err(_) => break,
            }
        }
    })
    .await;
    let finished = Utc::now();
    manager.disconnect();

    if drained.is_err() {
        bail!("Only {}/{} notifications arrived within {:?}", received, args.events, deadline);
    }

    let snapshot = manager.notifications();
    let expected_len = args.events.min(args.capacity);
    let expected: Vec<String> = (1..=args.events)
        .rev()
        .take(expected_len)
        .map(|i| format!("n{}", i))
        .collect();
    let actual: Vec<String> = snapshot.iter().map(|n| n.message.clone()).collect();

    println!("\n----- Throughput Summary -----");
    println!("Emitted:   {} in {} ms", args.events, (emitted - started).num_milliseconds());
    println!("Delivered: {} in {} ms", received, (finished - started).num_milliseconds());
    println!("Buffered:  {} (capacity {})", snapshot.len(), args.capacity);
    println!("------------------------------\n");

    if actual != expected {
        bail!(
            "Buffer order mismatch: expected newest-first {:?}.., got {:?}..",
            expected.first(),
            actual.first()
        );
    }
    println!("Buffer bound and newest-first ordering hold.");
    Ok(())
}
