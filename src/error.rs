// Error handling module
// Defines the gateway error taxonomy and HTTP response conversion

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Errors that can occur in the session and request layer
#[derive(Error, Debug)]
pub enum GatewayError {
    /// Handshake greeting was not the expected kind
    #[error("ingress protocol violation: {0}")]
    Protocol(String),

    /// Long-lived access token rejected by the ingress endpoint
    #[error("ingress authentication failed: {0}")]
    Authentication(String),

    /// Supervisor refused to mint a new ingress session
    #[error("ingress session renewal failed: {0}")]
    Renewal(String),

    /// Transport fault on the control channel
    #[error("ingress control channel fault: {0}")]
    Channel(String),

    /// Handshake or renewal exceeded its time bound
    #[error("timed out {0}")]
    Timeout(String),

    /// 5xx or network-level fault, surfaced after the retry budget
    #[error("transient upstream failure: {method} {url}: {detail}")]
    Transient {
        method: String,
        url: String,
        status: Option<u16>,
        detail: String,
    },

    /// 4xx client error, never retried
    #[error("upstream rejected the request: {method} {url} ({status}): {detail}")]
    Permanent {
        method: String,
        url: String,
        status: u16,
        detail: String,
    },

    /// Internal error
    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let (status, error_type, message) = match self {
            GatewayError::Protocol(msg) => (StatusCode::BAD_GATEWAY, "ingress_protocol", msg),
            GatewayError::Authentication(msg) => (StatusCode::BAD_GATEWAY, "ingress_auth", msg),
            GatewayError::Renewal(msg) => (StatusCode::BAD_GATEWAY, "ingress_renewal", msg),
            GatewayError::Channel(msg) => (StatusCode::BAD_GATEWAY, "ingress_channel", msg),
            GatewayError::Timeout(msg) => (StatusCode::GATEWAY_TIMEOUT, "timeout", msg),
            GatewayError::Transient {
                method,
                url,
                status,
                detail,
            } => {
                let status_code = status
                    .and_then(|s| StatusCode::from_u16(s).ok())
                    .unwrap_or(StatusCode::BAD_GATEWAY);
                (
                    status_code,
                    "upstream_transient",
                    format!("{method} {url}: {detail}"),
                )
            }
            GatewayError::Permanent {
                method,
                url,
                status,
                detail,
            } => {
                let status_code =
                    StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
                (
                    status_code,
                    "upstream_rejected",
                    format!("{method} {url}: {detail}"),
                )
            }
            GatewayError::Internal(err) => {
                // Log internal errors
                tracing::error!("Internal error: {:?}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "Internal server error".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": {
                "message": message,
                "type": error_type,
            }
        }));

        (status, body).into_response()
    }
}

/// Result type alias for gateway operations
pub type Result<T> = std::result::Result<T, GatewayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = GatewayError::Protocol("expected auth_required, got event".to_string());
        assert_eq!(
            err.to_string(),
            "ingress protocol violation: expected auth_required, got event"
        );

        let err = GatewayError::Renewal("supervisor refused (id 4)".to_string());
        assert_eq!(
            err.to_string(),
            "ingress session renewal failed: supervisor refused (id 4)"
        );

        let err = GatewayError::Permanent {
            method: "GET".to_string(),
            url: "http://grocy/api/stock".to_string(),
            status: 404,
            detail: "Not found".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "upstream rejected the request: GET http://grocy/api/stock (404): Not found"
        );
    }

    #[test]
    fn test_timeout_message() {
        let err = GatewayError::Timeout("waiting for the ingress greeting".to_string());
        assert_eq!(err.to_string(), "timed out waiting for the ingress greeting");
    }

    #[tokio::test]
    async fn test_session_error_responses() {
        let err = GatewayError::Protocol("bad greeting".to_string());
        assert_eq!(err.into_response().status(), StatusCode::BAD_GATEWAY);

        let err = GatewayError::Authentication("token rejected".to_string());
        assert_eq!(err.into_response().status(), StatusCode::BAD_GATEWAY);

        let err = GatewayError::Timeout("handshake".to_string());
        assert_eq!(err.into_response().status(), StatusCode::GATEWAY_TIMEOUT);
    }

    #[tokio::test]
    async fn test_upstream_status_passthrough() {
        let err = GatewayError::Permanent {
            method: "DELETE".to_string(),
            url: "http://grocy/api/objects/products/9".to_string(),
            status: 404,
            detail: "no such product".to_string(),
        };
        assert_eq!(err.into_response().status(), StatusCode::NOT_FOUND);

        let err = GatewayError::Transient {
            method: "GET".to_string(),
            url: "http://grocy/api/stock".to_string(),
            status: Some(503),
            detail: "unavailable".to_string(),
        };
        assert_eq!(
            err.into_response().status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[tokio::test]
    async fn test_network_fault_response() {
        // No upstream status at all: the gateway answers for the upstream
        let err = GatewayError::Transient {
            method: "GET".to_string(),
            url: "http://grocy/api/stock".to_string(),
            status: None,
            detail: "connection reset".to_string(),
        };
        assert_eq!(err.into_response().status(), StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn test_internal_error_response() {
        let err = GatewayError::Internal(anyhow::anyhow!("unexpected"));
        assert_eq!(
            err.into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
