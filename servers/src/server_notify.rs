//! # Notification Relay
//!
//! Development relay for the expert marketplace event stream. Clients
//! connect to `/ws` and authenticate; backend jobs (or a developer with
//! curl) push notifications through `POST /emit`.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use lib_realtime::loggers::setup_logging;
use lib_realtime::relay::{self, RelayHub};
use tokio::net::TcpListener;

mod notify_logic;
use notify_logic::{config, shutdown};

#[tokio::main]
async fn main() -> Result<()> {
    // Explicitly install the default crypto provider for rustls
    let _ = rustls::crypto::ring::default_provider().install_default();

    let settings = config::load_config("server_notify.conf")?;
    let log_path = setup_logging(
        "server_notify",
        &settings.realtime.log_dir,
        &settings.realtime.log_level,
    )?;
    log::info!("Logging to {}", log_path.display());

    let addr = SocketAddr::from(([0, 0, 0, 0], settings.port));
    let listener = TcpListener::bind(addr).await?;
    let hub = Arc::new(RelayHub::new());

    relay::serve(listener, hub.clone(), shutdown::shutdown_signal()).await?;

    log::info!(
        "Shutdown complete. {} session(s) were still open.",
        hub.session_count()
    );
    Ok(())
}
