// Control channel message types
//
// The ingress endpoint speaks JSON text frames over a persistent WebSocket.
// A fresh channel greets with `auth_required`, expects one `auth` message,
// and answers `auth_ok` or `auth_invalid`. Session minting goes through the
// supervisor API with correlated request/result frames.

use serde::{Deserialize, Serialize};

pub const AUTH_REQUIRED: &str = "auth_required";
pub const AUTH_OK: &str = "auth_ok";

/// First client frame on the channel, carrying the long-lived token
#[derive(Serialize)]
pub struct AuthMessage<'a> {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub access_token: &'a str,
}

impl<'a> AuthMessage<'a> {
    pub fn new(access_token: &'a str) -> Self {
        Self {
            kind: "auth",
            access_token,
        }
    }
}

/// Supervisor API call asking for a new ingress session
#[derive(Serialize)]
pub struct SessionRequest {
    pub id: u64,
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub endpoint: &'static str,
    pub method: &'static str,
}

impl SessionRequest {
    pub fn new(id: u64) -> Self {
        Self {
            id,
            kind: "supervisor/api",
            endpoint: "/ingress/session",
            method: "post",
        }
    }
}

/// Any frame received on the control channel
///
/// The channel interleaves lifecycle messages and command results, so
/// everything beyond the kind is optional.
#[derive(Debug, Deserialize)]
pub struct ServerFrame {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub id: Option<u64>,
    #[serde(default)]
    pub success: Option<bool>,
    #[serde(default)]
    pub result: Option<SessionResult>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SessionResult {
    #[serde(default)]
    pub session: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_auth_message_shape() {
        let msg = serde_json::to_value(AuthMessage::new("llt-secret")).unwrap();
        assert_eq!(msg, json!({"type": "auth", "access_token": "llt-secret"}));
    }

    #[test]
    fn test_session_request_shape() {
        let msg = serde_json::to_value(SessionRequest::new(7)).unwrap();
        assert_eq!(
            msg,
            json!({
                "id": 7,
                "type": "supervisor/api",
                "endpoint": "/ingress/session",
                "method": "post",
            })
        );
    }

    #[test]
    fn test_parse_session_result_frame() {
        let frame: ServerFrame = serde_json::from_str(
            r#"{"id": 3, "type": "result", "success": true, "result": {"session": "abc123"}}"#,
        )
        .unwrap();
        assert_eq!(frame.kind, "result");
        assert_eq!(frame.id, Some(3));
        assert_eq!(frame.success, Some(true));
        assert_eq!(frame.result.unwrap().session.as_deref(), Some("abc123"));
    }

    #[test]
    fn test_parse_greeting_ignores_extras() {
        let frame: ServerFrame =
            serde_json::from_str(r#"{"type": "auth_required", "ha_version": "2024.6.0"}"#).unwrap();
        assert_eq!(frame.kind, AUTH_REQUIRED);
        assert!(frame.id.is_none());
        assert!(frame.success.is_none());
    }

    #[test]
    fn test_parse_auth_invalid_carries_message() {
        let frame: ServerFrame =
            serde_json::from_str(r#"{"type": "auth_invalid", "message": "Invalid access token"}"#)
                .unwrap();
        assert_eq!(frame.kind, "auth_invalid");
        assert_eq!(frame.message.as_deref(), Some("Invalid access token"));
    }
}
