//! # Transport
//!
//! The connection manager never touches sockets directly. It asks a
//! [`Connector`] for a [`Link`]: a pair of channels carrying text frames out
//! and in. [`WsConnector`] backs a link with a tokio-tungstenite WebSocket and
//! two pump tasks; tests plug in in-memory connectors.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message as WsMessage};
use url::Url;

use crate::core::error::RealtimeError;

/// An open transport.
///
/// Dropping `outbound` closes the connection; `inbound` yields an `Err` for a
/// transport failure and ends when the remote side closes.
pub struct Link {
    pub outbound: mpsc::UnboundedSender<String>,
    pub inbound: mpsc::UnboundedReceiver<Result<String, RealtimeError>>,
}

#[async_trait]
pub trait Connector: Send + Sync {
    /// Opens one transport to `endpoint`. Suspends for the handshake.
    async fn open(&self, endpoint: &str) -> Result<Link, RealtimeError>;
}

/// WebSocket connector backed by tokio-tungstenite.
#[derive(Debug, Default, Clone, Copy)]
pub struct WsConnector;

#[async_trait]
impl Connector for WsConnector {
    async fn open(&self, endpoint: &str) -> Result<Link, RealtimeError> {
        Url::parse(endpoint).map_err(|source| RealtimeError::InvalidEndpoint {
            endpoint: endpoint.to_string(),
            source,
        })?;

        let (ws_stream, _) = connect_async(endpoint)
            .await
            .map_err(|e| RealtimeError::Transport(e.to_string()))?;
        log::debug!("WebSocket handshake with {} complete", endpoint);

        let (mut write, mut read) = ws_stream.split();
        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<String>();
        let (in_tx, in_rx) = mpsc::unbounded_channel();

        // Writer: runs until the manager drops its sender, then closes the socket.
        tokio::spawn(async move {
            while let Some(text) = out_rx.recv().await {
                if let Err(e) = write.send(WsMessage::Text(text.into())).await {
                    log::warn!("WebSocket write failed: {}", e);
                    break;
                }
            }
            let _ = write.close().await;
        });

        // Reader: forwards text frames until the socket or the manager goes away.
        tokio::spawn(async move {
            while let Some(msg) = read.next().await {
                match msg {
                    Ok(WsMessage::Text(text)) => {
                        if in_tx.send(Ok(text.as_str().to_owned())).is_err() {
                            break;
                        }
                    }
                    Ok(WsMessage::Close(frame)) => {
                        log::debug!("WebSocket closed by remote: {:?}", frame);
                        break;
                    }
                    Ok(WsMessage::Binary(bin)) => {
                        log::trace!("Ignoring {} byte binary frame", bin.len());
                    }
                    Ok(_) => {}
                    Err(e) => {
                        let _ = in_tx.send(Err(RealtimeError::Transport(e.to_string())));
                        break;
                    }
                }
            }
        });

        Ok(Link {
            outbound: out_tx,
            inbound: in_rx,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn rejects_unparseable_endpoint() {
        let err = WsConnector.open("not a url").await.err().unwrap();
        assert!(matches!(err, RealtimeError::InvalidEndpoint { .. }));
    }

    #[tokio::test]
    async fn refused_connection_is_a_transport_error() {
        // Bind then drop a listener so the port is very likely closed.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let err = WsConnector
            .open(&format!("ws://127.0.0.1:{}/ws", port))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, RealtimeError::Transport(_)));
    }
}
