use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::core::notification::NotificationKind;
use crate::core::protocol::{AuthPayload, UserRole, WireFrame, AUTHENTICATED_EVENT};

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("unknown event '{0}'")]
    UnknownEvent(String),

    #[error("failed to encode frame: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Body of `POST /emit`.
///
/// With neither `user_id` nor `role` set, every authenticated session
/// receives the frame.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmitRequest {
    pub event: String,
    #[serde(default)]
    pub data: Value,
    pub user_id: Option<String>,
    pub role: Option<UserRole>,
}

struct RelaySession {
    user: Option<AuthPayload>,
    tx: mpsc::UnboundedSender<String>,
}

/// Connected sockets and who they authenticated as.
pub struct RelayHub {
    sessions: Mutex<HashMap<usize, RelaySession>>,
    next_id: AtomicUsize,
}

impl Default for RelayHub {
    fn default() -> Self {
        Self::new()
    }
}

impl RelayHub {
    pub fn new() -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            next_id: AtomicUsize::new(1),
        }
    }

    /// Adds an unauthenticated session. Frames for it arrive on the receiver.
    pub fn register(&self) -> (usize, mpsc::UnboundedReceiver<String>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();
        self.lock().insert(id, RelaySession { user: None, tx });
        (id, rx)
    }

    /// Records who the session is and returns the `authenticated` reply.
    pub fn authenticate(&self, id: usize, auth: AuthPayload) -> Result<String, RelayError> {
        let reply = WireFrame::new(AUTHENTICATED_EVENT, serde_json::to_value(&auth)?).encode()?;
        if let Some(session) = self.lock().get_mut(&id) {
            log::info!("Session {} authenticated as {} ({})", id, auth.user_id, auth.user_type);
            session.user = Some(auth);
        }
        Ok(reply)
    }

    pub fn remove(&self, id: usize) {
        self.lock().remove(&id);
    }

    pub fn session_count(&self) -> usize {
        self.lock().len()
    }

    pub fn authenticated_count(&self) -> usize {
        self.lock().values().filter(|s| s.user.is_some()).count()
    }

    /// Fans a notification out to matching authenticated sessions and
    /// returns how many received it.
    pub fn emit(&self, request: &EmitRequest) -> Result<usize, RelayError> {
        if NotificationKind::from_event_name(&request.event).is_none() {
            return Err(RelayError::UnknownEvent(request.event.clone()));
        }
        let text = WireFrame::new(request.event.clone(), request.data.clone()).encode()?;

        let sessions = self.lock();
        let delivered = sessions
            .values()
            .filter(|session| match &session.user {
                Some(user) => {
                    request.user_id.as_deref().map_or(true, |id| id == user.user_id)
                        && request.role.map_or(true, |role| role == user.user_type)
                }
                None => false,
            })
            .filter(|session| session.tx.send(text.clone()).is_ok())
            .count();

        log::debug!("Emitted {} to {} session(s)", request.event, delivered);
        Ok(delivered)
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<usize, RelaySession>> {
        self.sessions.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
