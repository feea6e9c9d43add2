//! Wire envelope for the event stream.
//!
//! Every text frame, in either direction, is a JSON object
//! `{"event": "<name>", "data": <json>}`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Outbound handshake sent right after the transport opens.
pub const AUTHENTICATE_EVENT: &str = "authenticate";
/// Optional server acknowledgment of the handshake.
pub const AUTHENTICATED_EVENT: &str = "authenticated";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireFrame {
    pub event: String,
    #[serde(default)]
    pub data: Value,
}

impl WireFrame {
    pub fn new(event: impl Into<String>, data: Value) -> Self {
        Self {
            event: event.into(),
            data,
        }
    }

    /// The `authenticate` frame carrying `{userId, userType}`.
    pub fn authenticate(user_id: &str, role: UserRole) -> Result<Self, serde_json::Error> {
        let payload = AuthPayload {
            user_id: user_id.to_string(),
            user_type: role,
        };
        Ok(Self::new(AUTHENTICATE_EVENT, serde_json::to_value(payload)?))
    }

    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn decode(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

/// The two account kinds that receive notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Expert,
    Institution,
}

impl UserRole {
    pub fn as_str(self) -> &'static str {
        match self {
            UserRole::Expert => "expert",
            UserRole::Institution => "institution",
        }
    }
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UserRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "expert" => Ok(UserRole::Expert),
            "institution" => Ok(UserRole::Institution),
            other => Err(format!("unknown user role '{}'", other)),
        }
    }
}

/// Body of the `authenticate` frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthPayload {
    pub user_id: String,
    pub user_type: UserRole,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn authenticate_frame_uses_camel_case_fields() {
        let frame = WireFrame::authenticate("u-42", UserRole::Institution).unwrap();
        let value: Value = serde_json::from_str(&frame.encode().unwrap()).unwrap();
        assert_eq!(
            value,
            json!({"event": "authenticate", "data": {"userId": "u-42", "userType": "institution"}})
        );
    }

    #[test]
    fn missing_data_decodes_as_null() {
        let frame = WireFrame::decode(r#"{"event":"authenticated"}"#).unwrap();
        assert_eq!(frame.event, AUTHENTICATED_EVENT);
        assert!(frame.data.is_null());
    }

    #[test]
    fn roles_parse_case_insensitively() {
        assert_eq!("Expert".parse::<UserRole>(), Ok(UserRole::Expert));
        assert!("admin".parse::<UserRole>().is_err());
    }
}
