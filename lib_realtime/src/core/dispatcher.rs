//! # Event Dispatcher
//!
//! Classifies inbound frames from the event stream and normalizes the eight
//! notification events into [`Notification`] records, stamping
//! `received_at` at dispatch time.
//!
//! Payloads are not validated beyond what is needed to read them. A frame
//! that cannot be read is logged and ignored; it never tears down the
//! connection.

use chrono::Utc;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::core::notification::{Notification, NotificationKind};
use crate::core::protocol::{WireFrame, AUTHENTICATED_EVENT};

/// What an inbound frame turned out to be.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Notification(Notification),
    /// The server acknowledged the handshake; the payload is opaque.
    Authenticated(Value),
    Ignored,
}

/// Raw notification body as pushed by the server.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawPayload {
    #[serde(default)]
    message: String,
    project_title: Option<String>,
    expert_name: Option<String>,
    institution_name: Option<String>,
    status: Option<String>,
    #[serde(default, deserialize_with = "string_or_number")]
    project_id: Option<String>,
}

/// Accepts `"projectId": "p-1"` as well as `"projectId": 17`.
fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => Err(D::Error::custom(format!("unexpected projectId value {}", other))),
    }
}

pub struct EventDispatcher;

impl EventDispatcher {
    /// Parses a text frame and classifies it.
    pub fn decode_text(text: &str) -> Inbound {
        match WireFrame::decode(text) {
            Ok(frame) => Self::classify(frame),
            Err(e) => {
                log::warn!("Ignoring unreadable frame ({}): {}", e, text);
                Inbound::Ignored
            }
        }
    }

    pub fn classify(frame: WireFrame) -> Inbound {
        if frame.event == AUTHENTICATED_EVENT {
            log::debug!("Handshake acknowledged: {}", frame.data);
            return Inbound::Authenticated(frame.data);
        }

        let Some(kind) = NotificationKind::from_event_name(&frame.event) else {
            log::debug!("Ignoring unrecognized event '{}'", frame.event);
            return Inbound::Ignored;
        };

        match RawPayload::deserialize(&frame.data) {
            Ok(raw) => Inbound::Notification(Self::normalize(kind, raw)),
            Err(e) => {
                log::warn!("Ignoring malformed '{}' payload: {}", frame.event, e);
                Inbound::Ignored
            }
        }
    }

    /// Keeps only the contextual fields each kind carries.
    fn normalize(kind: NotificationKind, raw: RawPayload) -> Notification {
        let mut notification = Notification::new(kind, raw.message);
        notification.project_title = raw.project_title;

        match kind {
            NotificationKind::NewApplication => {
                notification.expert_name = raw.expert_name;
            }
            NotificationKind::ApplicationStatusChanged => {
                notification.project_id = raw.project_id;
                notification.status = raw.status;
            }
            NotificationKind::BookingCreated => {
                notification.institution_name = raw.institution_name;
                notification.project_id = raw.project_id;
            }
            NotificationKind::BookingUpdated => {}
            NotificationKind::NewProjectAvailable => {
                notification.institution_name = raw.institution_name;
            }
            NotificationKind::ExpertSelectedWithBooking
            | NotificationKind::ExpertInterestShown
            | NotificationKind::MovedToInterview => {
                notification.project_id = raw.project_id;
            }
        }

        notification.received_at = Utc::now();
        notification
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn notification(frame: Value) -> Notification {
        match EventDispatcher::decode_text(&frame.to_string()) {
            Inbound::Notification(n) => n,
            other => panic!("expected a notification, got {:?}", other),
        }
    }

    #[test]
    fn booking_created_keeps_institution_and_project() {
        let before = Utc::now();
        let n = notification(json!({
            "event": "booking_created",
            "data": {
                "message": "You have been booked",
                "projectTitle": "Soil survey",
                "institutionName": "North Campus",
                "projectId": 17,
                "expertName": "not carried by this kind"
            }
        }));
        assert_eq!(n.kind, NotificationKind::BookingCreated);
        assert_eq!(n.message, "You have been booked");
        assert_eq!(n.project_title.as_deref(), Some("Soil survey"));
        assert_eq!(n.institution_name.as_deref(), Some("North Campus"));
        assert_eq!(n.project_id.as_deref(), Some("17"));
        assert_eq!(n.expert_name, None);
        assert!(n.received_at >= before);
    }

    #[test]
    fn status_change_carries_status_and_string_id() {
        let n = notification(json!({
            "event": "application_status_changed",
            "data": {"message": "m", "projectTitle": "t", "projectId": "p-9", "status": "accepted"}
        }));
        assert_eq!(n.status.as_deref(), Some("accepted"));
        assert_eq!(n.project_id.as_deref(), Some("p-9"));
    }

    #[test]
    fn booking_updated_carries_only_the_title() {
        let n = notification(json!({
            "event": "booking_updated",
            "data": {"message": "m", "projectTitle": "t", "projectId": 3, "status": "x"}
        }));
        assert_eq!(n.project_title.as_deref(), Some("t"));
        assert_eq!(n.project_id, None);
        assert_eq!(n.status, None);
    }

    #[test]
    fn authenticated_ack_is_surfaced_opaquely() {
        let inbound = EventDispatcher::decode_text(r#"{"event":"authenticated","data":{"ok":true}}"#);
        assert_eq!(inbound, Inbound::Authenticated(json!({"ok": true})));
    }

    #[test]
    fn malformed_input_fails_soft() {
        assert_eq!(EventDispatcher::decode_text("not json"), Inbound::Ignored);
        assert_eq!(
            EventDispatcher::decode_text(r#"{"event":"new_application","data":"just a string"}"#),
            Inbound::Ignored
        );
        assert_eq!(
            EventDispatcher::decode_text(r#"{"event":"moved_to_interview","data":{"message":"m","projectId":[1]}}"#),
            Inbound::Ignored
        );
        assert_eq!(
            EventDispatcher::decode_text(r#"{"event":"something_else","data":{}}"#),
            Inbound::Ignored
        );
    }
}
