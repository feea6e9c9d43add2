//! # Connection Manager
//!
//! Owns the single event-stream connection of a client session.
//!
//! ## Lifecycle
//!
//! `Disconnected -> Connecting -> Connected -> Authenticated`, and back to
//! `Disconnected` on `disconnect()`, on drop, or on any transport failure.
//!
//! - `connect` is a no-op while any connection exists (including one still
//!   handshaking) and on a server-side surface.
//! - The `authenticate` frame is sent as soon as the transport opens. The
//!   `authenticated` acknowledgment moves the state forward but nothing waits
//!   for it.
//! - There is no automatic reconnect. After a failure the caller issues a
//!   fresh `connect`.
//! - Dropping a `connect` future before the transport opens (a caller-side
//!   timeout, `select!`, task abort) rolls the session back to `Disconnected`.
//! - Every connection attempt gets a new epoch. Work belonging to an older
//!   epoch (a handshake that finished after `disconnect`, a reader task of a
//!   dropped link) never touches the current session.

use std::sync::{Arc, Mutex, MutexGuard};

use serde_json::Value;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use crate::core::buffer::NotificationBuffer;
use crate::core::dispatcher::{EventDispatcher, Inbound};
use crate::core::error::RealtimeError;
use crate::core::notification::Notification;
use crate::core::protocol::{UserRole, WireFrame};
use crate::core::transport::{Connector, Link, WsConnector};

/// Default number of notifications retained per session.
pub const DEFAULT_BUFFER_CAPACITY: usize = 50;
const EVENT_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Authenticated,
}

/// Where the manager runs. Notifications are a client-only concern.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeSurface {
    Client,
    /// No rendering surface (server-side rendering, batch jobs): `connect` does nothing.
    Server,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectOutcome {
    /// A new transport was opened and the handshake sent.
    Opened,
    /// A connection already exists; nothing was done.
    AlreadyLive,
    SkippedServerSide,
    /// `disconnect` ran while the handshake was in flight; the new link was dropped.
    Abandoned,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionUser {
    pub user_id: String,
    pub role: UserRole,
}

struct Session {
    state: ConnectionState,
    epoch: u64,
    user: Option<SessionUser>,
    outbound: Option<mpsc::UnboundedSender<String>>,
    reader: Option<JoinHandle<()>>,
    last_ack: Option<Value>,
}

impl Session {
    fn reset(&mut self) {
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
        self.outbound = None;
        self.state = ConnectionState::Disconnected;
        self.user = None;
        self.last_ack = None;
    }
}

type SharedSession = Arc<Mutex<Session>>;

/// Rolls a `Connecting` session back to `Disconnected` when the `connect`
/// future is dropped while the transport is still opening.
struct PendingConnect<'a> {
    session: &'a SharedSession,
    epoch: u64,
    armed: bool,
}

impl Drop for PendingConnect<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut session = lock(self.session);
        if session.epoch == self.epoch && session.state == ConnectionState::Connecting {
            log::warn!("Connect cancelled before the transport opened; session reset");
            session.reset();
        }
    }
}

fn lock(session: &SharedSession) -> MutexGuard<'_, Session> {
    session.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

pub struct ConnectionManager {
    endpoint: String,
    surface: RuntimeSurface,
    connector: Arc<dyn Connector>,
    session: SharedSession,
    buffer: Arc<NotificationBuffer>,
    events_tx: broadcast::Sender<Notification>,
}

impl ConnectionManager {
    pub fn new(endpoint: impl Into<String>, connector: Arc<dyn Connector>) -> Self {
        let (events_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            endpoint: endpoint.into(),
            surface: RuntimeSurface::Client,
            connector,
            session: Arc::new(Mutex::new(Session {
                state: ConnectionState::Disconnected,
                epoch: 0,
                user: None,
                outbound: None,
                reader: None,
                last_ack: None,
            })),
            buffer: Arc::new(NotificationBuffer::new(DEFAULT_BUFFER_CAPACITY)),
            events_tx,
        }
    }

    /// A client-side manager speaking WebSocket to `endpoint`.
    pub fn websocket(endpoint: impl Into<String>) -> Self {
        Self::new(endpoint, Arc::new(WsConnector))
    }

    /// WebSocket manager for `config.ws_url` with the configured buffer size.
    #[cfg(feature = "configs")]
    pub fn from_config(config: &crate::configs::RealtimeConfig) -> Self {
        Self::websocket(config.ws_url.clone()).with_buffer_capacity(config.notification_capacity)
    }

    pub fn with_surface(mut self, surface: RuntimeSurface) -> Self {
        self.surface = surface;
        self
    }

    pub fn with_buffer_capacity(mut self, capacity: usize) -> Self {
        self.buffer = Arc::new(NotificationBuffer::new(capacity));
        self
    }

    /// Opens the event stream for `user_id` and sends the handshake.
    ///
    /// Transport failures are logged, leave the session `Disconnected`, and
    /// are returned to the caller for information only.
    pub async fn connect(&self, user_id: &str, role: UserRole) -> Result<ConnectOutcome, RealtimeError> {
        if self.surface == RuntimeSurface::Server {
            log::debug!("No rendering surface; skipping event-stream connect for {}", user_id);
            return Ok(ConnectOutcome::SkippedServerSide);
        }

        let handshake = WireFrame::authenticate(user_id, role)?.encode()?;

        let epoch = {
            let mut session = lock(&self.session);
            if session.state != ConnectionState::Disconnected {
                log::debug!("Connect ignored: session already {:?}", session.state);
                return Ok(ConnectOutcome::AlreadyLive);
            }
            session.epoch += 1;
            session.state = ConnectionState::Connecting;
            session.user = Some(SessionUser {
                user_id: user_id.to_string(),
                role,
            });
            session.epoch
        };

        log::info!("Connecting to event stream {} as {} ({})", self.endpoint, user_id, role);

        let mut pending = PendingConnect {
            session: &self.session,
            epoch,
            armed: true,
        };
        let opened = self.connector.open(&self.endpoint).await;
        pending.armed = false;

        let link = match opened {
            Ok(link) => link,
            Err(e) => {
                log::error!("Event-stream connect to {} failed: {}", self.endpoint, e);
                let mut session = lock(&self.session);
                if session.epoch == epoch {
                    session.reset();
                }
                return Err(e);
            }
        };

        let Link { outbound, inbound } = link;
        let mut session = lock(&self.session);
        if session.epoch != epoch || session.state != ConnectionState::Connecting {
            log::info!("Session torn down during handshake; dropping new link");
            return Ok(ConnectOutcome::Abandoned);
        }

        if outbound.send(handshake).is_err() {
            log::error!("Event stream closed before the handshake could be sent");
            session.reset();
            return Err(RealtimeError::Closed);
        }

        session.state = ConnectionState::Connected;
        session.outbound = Some(outbound);
        session.reader = Some(tokio::spawn(read_loop(
            epoch,
            inbound,
            Arc::clone(&self.session),
            Arc::clone(&self.buffer),
            self.events_tx.clone(),
        )));

        log::info!("Event stream connected; authenticate sent for {}", user_id);
        Ok(ConnectOutcome::Opened)
    }

    /// Tears the connection down. Safe to call in any state.
    pub fn disconnect(&self) {
        let mut session = lock(&self.session);
        if session.state == ConnectionState::Disconnected {
            return;
        }
        session.epoch += 1;
        session.reset();
        log::info!("Event stream disconnected");
    }

    /// Sends `{event, data}` if connected; otherwise drops it.
    ///
    /// Best effort: no queueing, no retry. Returns whether the frame was handed
    /// to the transport.
    pub fn send_event(&self, event_name: &str, payload: Value) -> bool {
        let session = lock(&self.session);
        let sender = match (session.state, session.outbound.as_ref()) {
            (ConnectionState::Connected | ConnectionState::Authenticated, Some(sender)) => sender,
            _ => {
                log::debug!("Dropping outbound '{}': not connected", event_name);
                return false;
            }
        };

        match WireFrame::new(event_name, payload).encode() {
            Ok(text) => sender.send(text).is_ok(),
            Err(e) => {
                log::warn!("Dropping outbound '{}': {}", event_name, e);
                false
            }
        }
    }

    pub fn state(&self) -> ConnectionState {
        lock(&self.session).state
    }

    pub fn is_connected(&self) -> bool {
        matches!(
            self.state(),
            ConnectionState::Connected | ConnectionState::Authenticated
        )
    }

    pub fn user(&self) -> Option<SessionUser> {
        lock(&self.session).user.clone()
    }

    /// Payload of the last `authenticated` acknowledgment, if any arrived.
    pub fn last_ack(&self) -> Option<Value> {
        lock(&self.session).last_ack.clone()
    }

    /// Newest-first snapshot of the buffered notifications.
    pub fn notifications(&self) -> Vec<Notification> {
        self.buffer.snapshot()
    }

    pub fn clear_notifications(&self) {
        self.buffer.clear();
    }

    /// Observes every notification as it is buffered.
    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.events_tx.subscribe()
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        self.disconnect();
    }
}

/// Consumes inbound frames for one connection epoch.
async fn read_loop(
    epoch: u64,
    mut inbound: mpsc::UnboundedReceiver<Result<String, RealtimeError>>,
    session: SharedSession,
    buffer: Arc<NotificationBuffer>,
    events_tx: broadcast::Sender<Notification>,
) {
    while let Some(frame) = inbound.recv().await {
        let text = match frame {
            Ok(text) => text,
            Err(e) => {
                log::error!("Event stream error: {}", e);
                break;
            }
        };

        match EventDispatcher::decode_text(&text) {
            Inbound::Notification(notification) => {
                // Held through the push so a newer session never sees this frame.
                let current = lock(&session);
                if current.epoch != epoch {
                    return;
                }
                log::debug!("Notification {:?}: {}", notification.kind, notification.message);
                buffer.push(notification.clone());
                // No subscribers is fine.
                let _ = events_tx.send(notification);
            }
            Inbound::Authenticated(ack) => {
                let mut current = lock(&session);
                if current.epoch != epoch {
                    return;
                }
                if current.state == ConnectionState::Connected {
                    current.state = ConnectionState::Authenticated;
                }
                current.last_ack = Some(ack);
                log::info!("Event stream authenticated");
            }
            Inbound::Ignored => {}
        }
    }

    let mut current = lock(&session);
    if current.epoch == epoch && current.state != ConnectionState::Disconnected {
        log::warn!("Event stream lost; session reset to Disconnected");
        current.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::Notify;

    /// The server side of one in-memory link.
    struct Peer {
        from_client: mpsc::UnboundedReceiver<String>,
        to_client: mpsc::UnboundedSender<Result<String, RealtimeError>>,
    }

    #[derive(Default)]
    struct MemoryConnector {
        opens: AtomicUsize,
        fail: bool,
        gate: Option<Arc<Notify>>,
        peers: Mutex<Vec<Peer>>,
    }

    impl MemoryConnector {
        fn take_peer(&self) -> Peer {
            self.peers.lock().unwrap().remove(0)
        }
    }

    #[async_trait]
    impl Connector for MemoryConnector {
        async fn open(&self, _endpoint: &str) -> Result<Link, RealtimeError> {
            self.opens.fetch_add(1, Ordering::SeqCst);
            tokio::task::yield_now().await;
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            if self.fail {
                return Err(RealtimeError::Transport("connection refused".into()));
            }
            let (out_tx, out_rx) = mpsc::unbounded_channel();
            let (in_tx, in_rx) = mpsc::unbounded_channel();
            self.peers.lock().unwrap().push(Peer {
                from_client: out_rx,
                to_client: in_tx,
            });
            Ok(Link {
                outbound: out_tx,
                inbound: in_rx,
            })
        }
    }

    fn manager(connector: &Arc<MemoryConnector>) -> ConnectionManager {
        let connector: Arc<dyn Connector> = connector.clone();
        ConnectionManager::new("ws://memory/ws", connector)
    }

    async fn eventually(mut condition: impl FnMut() -> bool) {
        for _ in 0..200 {
            if condition() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("condition not reached in time");
    }

    fn push(peer: &Peer, event: &str, data: Value) {
        let text = WireFrame::new(event, data).encode().unwrap();
        peer.to_client.send(Ok(text)).unwrap();
    }

    #[tokio::test]
    async fn second_connect_does_not_open_another_transport() {
        let connector = Arc::new(MemoryConnector::default());
        let manager = manager(&connector);

        let first = manager.connect("u1", UserRole::Expert).await.unwrap();
        let second = manager.connect("u1", UserRole::Expert).await.unwrap();

        assert_eq!(first, ConnectOutcome::Opened);
        assert_eq!(second, ConnectOutcome::AlreadyLive);
        assert_eq!(connector.opens.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn concurrent_connects_share_one_transport() {
        let connector = Arc::new(MemoryConnector::default());
        let manager = manager(&connector);

        let (a, b) = tokio::join!(
            manager.connect("u1", UserRole::Expert),
            manager.connect("u1", UserRole::Expert)
        );

        let mut outcomes = vec![a.unwrap(), b.unwrap()];
        outcomes.sort_by_key(|o| *o != ConnectOutcome::Opened);
        assert_eq!(outcomes, vec![ConnectOutcome::Opened, ConnectOutcome::AlreadyLive]);
        assert_eq!(connector.opens.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn handshake_is_sent_first_and_ack_is_observed() {
        let connector = Arc::new(MemoryConnector::default());
        let manager = manager(&connector);
        manager.connect("inst-7", UserRole::Institution).await.unwrap();
        let mut peer = connector.take_peer();

        let handshake: Value = serde_json::from_str(&peer.from_client.recv().await.unwrap()).unwrap();
        assert_eq!(
            handshake,
            json!({"event": "authenticate", "data": {"userId": "inst-7", "userType": "institution"}})
        );
        assert_eq!(manager.state(), ConnectionState::Connected);
        assert!(manager.is_connected());

        push(&peer, "authenticated", json!({"session": "abc"}));
        eventually(|| manager.state() == ConnectionState::Authenticated).await;
        assert_eq!(manager.last_ack(), Some(json!({"session": "abc"})));
        assert_eq!(
            manager.user(),
            Some(SessionUser {
                user_id: "inst-7".into(),
                role: UserRole::Institution
            })
        );
    }

    #[tokio::test]
    async fn pushed_events_land_in_buffer_in_arrival_order() {
        let connector = Arc::new(MemoryConnector::default());
        let manager = manager(&connector).with_buffer_capacity(3);
        let mut events = manager.subscribe();
        manager.connect("e1", UserRole::Expert).await.unwrap();
        let peer = connector.take_peer();

        for i in 1..=4 {
            push(&peer, "new_project_available", json!({"message": format!("p{}", i), "projectTitle": "t"}));
        }
        push(&peer, "not_a_known_event", json!({"message": "skip"}));

        eventually(|| manager.notifications().first().map(|n| n.message.as_str()) == Some("p4")).await;
        let messages: Vec<String> = manager.notifications().into_iter().map(|n| n.message).collect();
        assert_eq!(messages, vec!["p4", "p3", "p2"]);
        assert_eq!(events.recv().await.unwrap().message, "p1");

        manager.clear_notifications();
        assert!(manager.notifications().is_empty());
    }

    #[tokio::test]
    async fn send_event_is_dropped_unless_connected() {
        let connector = Arc::new(MemoryConnector::default());
        let manager = manager(&connector);
        assert!(!manager.send_event("ping", json!({})));

        manager.connect("e1", UserRole::Expert).await.unwrap();
        let mut peer = connector.take_peer();
        let _handshake = peer.from_client.recv().await.unwrap();

        assert!(manager.send_event("expert_interest", json!({"projectId": 4})));
        let sent: Value = serde_json::from_str(&peer.from_client.recv().await.unwrap()).unwrap();
        assert_eq!(sent, json!({"event": "expert_interest", "data": {"projectId": 4}}));

        manager.disconnect();
        assert!(!manager.send_event("expert_interest", json!({})));
    }

    #[tokio::test]
    async fn transport_error_resets_and_allows_fresh_connect() {
        let connector = Arc::new(MemoryConnector::default());
        let manager = manager(&connector);
        manager.connect("e1", UserRole::Expert).await.unwrap();
        let peer = connector.take_peer();

        peer.to_client
            .send(Err(RealtimeError::Transport("reset by peer".into())))
            .unwrap();
        eventually(|| manager.state() == ConnectionState::Disconnected).await;
        assert_eq!(manager.user(), None);

        // No automatic reconnect happened.
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(connector.opens.load(Ordering::SeqCst), 1);

        assert_eq!(manager.connect("e1", UserRole::Expert).await.unwrap(), ConnectOutcome::Opened);
        assert_eq!(connector.opens.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn remote_close_resets_to_disconnected() {
        let connector = Arc::new(MemoryConnector::default());
        let manager = manager(&connector);
        manager.connect("e1", UserRole::Expert).await.unwrap();
        drop(connector.take_peer());
        eventually(|| manager.state() == ConnectionState::Disconnected).await;
    }

    #[tokio::test]
    async fn disconnect_is_idempotent_and_keeps_notifications() {
        let connector = Arc::new(MemoryConnector::default());
        let manager = manager(&connector);
        manager.disconnect();

        manager.connect("e1", UserRole::Expert).await.unwrap();
        let peer = connector.take_peer();
        push(&peer, "booking_updated", json!({"message": "moved", "projectTitle": "t"}));
        eventually(|| manager.notifications().len() == 1).await;

        manager.disconnect();
        manager.disconnect();
        assert_eq!(manager.state(), ConnectionState::Disconnected);
        assert_eq!(manager.notifications().len(), 1);
    }

    #[tokio::test]
    async fn failed_open_leaves_session_disconnected() {
        let connector = Arc::new(MemoryConnector {
            fail: true,
            ..Default::default()
        });
        let manager = manager(&connector);
        let err = manager.connect("e1", UserRole::Expert).await.unwrap_err();
        assert!(matches!(err, RealtimeError::Transport(_)));
        assert_eq!(manager.state(), ConnectionState::Disconnected);
        assert_eq!(manager.user(), None);
    }

    #[tokio::test]
    async fn server_surface_never_connects() {
        let connector = Arc::new(MemoryConnector::default());
        let manager = manager(&connector).with_surface(RuntimeSurface::Server);
        assert_eq!(
            manager.connect("e1", UserRole::Expert).await.unwrap(),
            ConnectOutcome::SkippedServerSide
        );
        assert_eq!(connector.opens.load(Ordering::SeqCst), 0);
        assert_eq!(manager.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn disconnect_during_handshake_abandons_the_link() {
        let gate = Arc::new(Notify::new());
        let connector = Arc::new(MemoryConnector {
            gate: Some(gate.clone()),
            ..Default::default()
        });
        let manager = Arc::new(manager(&connector));

        let pending = {
            let manager = Arc::clone(&manager);
            tokio::spawn(async move { manager.connect("e1", UserRole::Expert).await })
        };
        eventually(|| manager.state() == ConnectionState::Connecting).await;

        manager.disconnect();
        gate.notify_one();

        assert_eq!(pending.await.unwrap().unwrap(), ConnectOutcome::Abandoned);
        assert_eq!(manager.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn cancelled_connect_does_not_leave_a_phantom_session() {
        let gate = Arc::new(Notify::new());
        let connector = Arc::new(MemoryConnector {
            gate: Some(gate.clone()),
            ..Default::default()
        });
        let manager = manager(&connector);

        let attempt = tokio::time::timeout(
            Duration::from_millis(10),
            manager.connect("e1", UserRole::Expert),
        )
        .await;
        assert!(attempt.is_err());
        assert_eq!(manager.state(), ConnectionState::Disconnected);
        assert_eq!(manager.user(), None);

        gate.notify_one();
        assert_eq!(manager.connect("e1", UserRole::Expert).await.unwrap(), ConnectOutcome::Opened);
        assert_eq!(connector.opens.load(Ordering::SeqCst), 2);
        assert_eq!(manager.state(), ConnectionState::Connected);
    }
}
