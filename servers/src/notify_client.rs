//! # Notification Client
//!
//! Terminal client for the event stream: connects, authenticates, and prints
//! every notification as it arrives. With `--list-path` it also preloads the
//! first page of a REST list through an incremental loader, the way the list
//! views do on mount.

use std::sync::Arc;

use anyhow::Result;
use lib_realtime::core::{ConnectOutcome, ConnectionManager};
use lib_realtime::loaders::{IncrementalLoader, LoadOutcome};
use lib_realtime::loggers::setup_logging;
use lib_realtime::retrieve::{ApiClient, RestPageSource};
use serde_json::Value;
use tokio::sync::broadcast::error::RecvError;

mod notify_logic;
use notify_logic::config::{self, Settings};
use notify_logic::shutdown;

#[tokio::main]
async fn main() -> Result<()> {
    let _ = rustls::crypto::ring::default_provider().install_default();

    let settings = config::load_config("notify_client.conf")?;
    setup_logging(
        "notify_client",
        &settings.realtime.log_dir,
        &settings.realtime.log_level,
    )?;
    log::info!("Starting with {}", settings.realtime);

    if let Some(path) = settings.list_path.as_deref() {
        preload_list(&settings, path).await?;
    }

    let manager = Arc::new(ConnectionManager::from_config(&settings.realtime));
    let mut notifications = manager.subscribe();

    match manager.connect(&settings.user_id, settings.user_type).await {
        Ok(ConnectOutcome::Opened) => {}
        Ok(other) => log::warn!("Connect returned {:?}", other),
        Err(e) => anyhow::bail!("Could not reach {}: {}", manager.endpoint(), e),
    }

    let printer = tokio::spawn(async move {
        loop {
            match notifications.recv().await {
                Ok(n) => {
                    let title = n.project_title.as_deref().unwrap_or("-");
                    println!(
                        "[{}] {:<28} {} ({})",
                        n.received_at.format("%H:%M:%S"),
                        n.kind.event_name(),
                        n.message,
                        title
                    );
                }
                Err(RecvError::Lagged(skipped)) => {
                    log::warn!("Printer fell behind; {} notification(s) skipped", skipped);
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    shutdown::shutdown_signal().await;

    manager.disconnect();
    printer.abort();
    log::info!(
        "Disconnected with {} notification(s) buffered.",
        manager.notifications().len()
    );
    Ok(())
}

async fn preload_list(settings: &Settings, path: &str) -> Result<()> {
    let client = ApiClient::new(
        &settings.realtime.api_base_url,
        None,
        settings.realtime.http_max_retries,
    )?;
    let source: RestPageSource<Value> = RestPageSource::new(client, path, settings.realtime.page_size);
    let loader = IncrementalLoader::new(source);

    match loader.refresh().await {
        LoadOutcome::Seeded(n) => println!("Loaded {} item(s) from {}", n, path),
        LoadOutcome::Exhausted => println!("{} is empty", path),
        other => log::warn!("Preloading {} returned {:?}", path, other),
    }
    Ok(())
}
