//! # Relay HTTP Surface
//!
//! Routes:
//! - `GET /ws` upgrades to the event stream. The first `authenticate` frame
//!   binds the socket to a user; anything else a client sends is dropped.
//! - `POST /emit` pushes a notification to matching sessions.
//! - `GET /health` answers `OK`.

use std::future::Future;
use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use futures_util::StreamExt;
use serde_json::json;
use tokio::net::TcpListener;

use crate::core::protocol::{AuthPayload, WireFrame, AUTHENTICATE_EVENT};
use crate::relay::hub::{EmitRequest, RelayError, RelayHub};

pub fn router(hub: Arc<RelayHub>) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/emit", post(emit_handler))
        .route("/health", get(health_handler))
        .with_state(hub)
}

/// Serves the relay on `listener` until `shutdown` resolves.
pub async fn serve<F>(listener: TcpListener, hub: Arc<RelayHub>, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    if let Ok(addr) = listener.local_addr() {
        log::info!("Relay listening on {}", addr);
    }
    axum::serve(listener, router(hub))
        .with_graceful_shutdown(shutdown)
        .await
}

async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

async fn emit_handler(
    State(hub): State<Arc<RelayHub>>,
    Json(request): Json<EmitRequest>,
) -> impl IntoResponse {
    match hub.emit(&request) {
        Ok(delivered) => (StatusCode::OK, Json(json!({ "delivered": delivered }))),
        Err(e @ RelayError::UnknownEvent(_)) => {
            log::warn!("Rejected emit: {}", e);
            (StatusCode::BAD_REQUEST, Json(json!({ "error": e.to_string() })))
        }
        Err(e) => {
            log::error!("Emit failed: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": e.to_string() })),
            )
        }
    }
}

async fn ws_handler(ws: WebSocketUpgrade, State(hub): State<Arc<RelayHub>>) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, hub))
}

async fn handle_socket(mut socket: WebSocket, hub: Arc<RelayHub>) {
    let (id, mut outbound) = hub.register();
    log::info!("Session {} connected", id);

    loop {
        tokio::select! {
            incoming = socket.next() => {
                let Some(Ok(msg)) = incoming else {
                    break;
                };
                match msg {
                    Message::Text(text) => {
                        if let Some(reply) = handle_client_frame(&hub, id, text.as_str()) {
                            if socket.send(Message::Text(reply.into())).await.is_err() {
                                break;
                            }
                        }
                    }
                    Message::Close(_) => break,
                    _ => {}
                }
            }
            Some(text) = outbound.recv() => {
                if socket.send(Message::Text(text.into())).await.is_err() {
                    break;
                }
            }
        }
    }

    hub.remove(id);
    log::info!("Session {} disconnected", id);
}

/// Returns the reply to send back, if any.
fn handle_client_frame(hub: &RelayHub, id: usize, text: &str) -> Option<String> {
    let frame = match WireFrame::decode(text) {
        Ok(frame) => frame,
        Err(e) => {
            log::debug!("Session {} sent an unreadable frame: {}", id, e);
            return None;
        }
    };

    if frame.event != AUTHENTICATE_EVENT {
        log::debug!("Session {} sent '{}'; dropped", id, frame.event);
        return None;
    }

    match serde_json::from_value::<AuthPayload>(frame.data) {
        Ok(auth) => match hub.authenticate(id, auth) {
            Ok(reply) => Some(reply),
            Err(e) => {
                log::error!("Failed to build authenticated reply: {}", e);
                None
            }
        },
        Err(e) => {
            log::warn!("Session {} sent a malformed authenticate payload: {}", id, e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_authenticate_frames_get_a_reply() {
        let hub = RelayHub::new();
        let (id, _rx) = hub.register();

        assert!(handle_client_frame(&hub, id, "not json").is_none());
        assert!(handle_client_frame(&hub, id, r#"{"event":"ping","data":{}}"#).is_none());
        assert!(handle_client_frame(
            &hub,
            id,
            r#"{"event":"authenticate","data":{"userId":"x","userType":"admin"}}"#
        )
        .is_none());
        assert_eq!(hub.authenticated_count(), 0);

        let reply = handle_client_frame(
            &hub,
            id,
            r#"{"event":"authenticate","data":{"userId":"x","userType":"institution"}}"#,
        )
        .unwrap();
        assert!(reply.contains(r#""event":"authenticated""#));
        assert_eq!(hub.authenticated_count(), 1);
    }
}
