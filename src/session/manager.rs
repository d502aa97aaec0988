use chrono::{DateTime, Utc};
use futures::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::time::timeout;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

use super::protocol::{self, AuthMessage, ServerFrame, SessionRequest};
use crate::config::Config;
use crate::error::GatewayError;

type ControlSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// A short-lived ingress session token with its issue time
#[derive(Debug, Clone)]
pub struct IngressCredential {
    token: String,
    issued_at: DateTime<Utc>,
}

impl IngressCredential {
    fn new(token: String) -> Self {
        Self {
            token,
            issued_at: Utc::now(),
        }
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn issued_at(&self) -> DateTime<Utc> {
        self.issued_at
    }

    pub fn age(&self) -> chrono::Duration {
        Utc::now() - self.issued_at
    }

    #[cfg(test)]
    fn issued_ago(token: &str, age: chrono::Duration) -> Self {
        Self {
            token: token.to_string(),
            issued_at: Utc::now() - age,
        }
    }
}

/// Mutable session state, guarded by one async mutex
///
/// Holding the lock across the whole connect/renew section is what makes
/// renewal single-flight: concurrent callers block here and then observe
/// the one renewal's outcome.
struct SessionState {
    socket: Option<ControlSocket>,
    credential: Option<IngressCredential>,
    next_id: u64,
}

/// Session manager for the ingress control channel
///
/// Owns the single logical WebSocket connection to Home Assistant, performs
/// the auth handshake, and mints short-lived ingress session tokens on
/// demand. Handshake and renewal failures propagate to the caller; retrying
/// the *use* of a credential is the dispatcher's job.
pub struct SessionManager {
    control_url: String,
    access_token: String,
    max_token_age: chrono::Duration,
    handshake_timeout: Duration,
    state: Mutex<SessionState>,
}

impl SessionManager {
    pub fn new(
        control_url: String,
        access_token: String,
        max_token_age: chrono::Duration,
        handshake_timeout: Duration,
    ) -> Self {
        Self {
            control_url,
            access_token,
            max_token_age,
            handshake_timeout,
            state: Mutex::new(SessionState {
                socket: None,
                credential: None,
                next_id: 1,
            }),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            control_url(&config.grocy_api_url),
            config.ha_token.clone(),
            chrono::Duration::seconds(config.session_max_age as i64),
            Duration::from_secs(config.handshake_timeout),
        )
    }

    /// Return a connected, authenticated session token no older than the
    /// freshness window, renewing it first if needed.
    pub async fn ensure_valid_credential(&self) -> Result<IngressCredential, GatewayError> {
        let mut state = self.state.lock().await;

        if state.socket.is_none() {
            let socket = self.connect().await?;
            state.socket = Some(socket);
        }

        if let Some(credential) = &state.credential {
            if credential.age() <= self.max_token_age {
                return Ok(credential.clone());
            }
            tracing::debug!(
                age_secs = credential.age().num_seconds(),
                "ingress session expired, renewing"
            );
        }

        let credential = self.renew(&mut state).await?;
        state.credential = Some(credential.clone());
        Ok(credential)
    }

    /// Open the control channel and run the auth handshake
    async fn connect(&self) -> Result<ControlSocket, GatewayError> {
        tracing::debug!(url = %self.control_url, "connecting to the ingress control channel");

        let (mut socket, _) = timeout(self.handshake_timeout, connect_async(self.control_url.as_str()))
            .await
            .map_err(|_| {
                GatewayError::Timeout("connecting to the ingress control channel".to_string())
            })?
            .map_err(|e| GatewayError::Channel(format!("control channel connect failed: {e}")))?;

        let greeting = self.read_frame(&mut socket).await?;
        if greeting.kind != protocol::AUTH_REQUIRED {
            return Err(GatewayError::Protocol(format!(
                "expected {} greeting, got {}",
                protocol::AUTH_REQUIRED,
                greeting.kind
            )));
        }

        let auth = serde_json::to_string(&AuthMessage::new(&self.access_token))
            .map_err(|e| GatewayError::Internal(anyhow::anyhow!("encoding auth message: {e}")))?;
        socket
            .send(Message::Text(auth))
            .await
            .map_err(|e| GatewayError::Channel(format!("sending auth message: {e}")))?;

        let reply = self.read_frame(&mut socket).await?;
        if reply.kind != protocol::AUTH_OK {
            let detail = reply.message.unwrap_or(reply.kind);
            return Err(GatewayError::Authentication(format!(
                "ingress rejected the access token: {detail}"
            )));
        }

        tracing::info!("ingress control channel authenticated");
        Ok(socket)
    }

    /// Mint a new session token over the open channel
    ///
    /// A plain supervisor refusal keeps the channel; anything transport
    /// shaped discards the socket so the next call reconnects from scratch.
    async fn renew(&self, state: &mut SessionState) -> Result<IngressCredential, GatewayError> {
        let id = state.next_id;
        state.next_id += 1;

        let Some(socket) = state.socket.as_mut() else {
            return Err(GatewayError::Internal(anyhow::anyhow!(
                "renewal without an open control channel"
            )));
        };

        match self.request_session(socket, id).await {
            Ok(token) => {
                tracing::debug!(id, "minted new ingress session");
                Ok(IngressCredential::new(token))
            }
            Err(err) => {
                if !matches!(err, GatewayError::Renewal(_)) {
                    state.socket = None;
                }
                Err(err)
            }
        }
    }

    /// One supervisor round-trip: send the request, read frames until the
    /// result with the matching correlation id arrives.
    async fn request_session(
        &self,
        socket: &mut ControlSocket,
        id: u64,
    ) -> Result<String, GatewayError> {
        let request = serde_json::to_string(&SessionRequest::new(id)).map_err(|e| {
            GatewayError::Internal(anyhow::anyhow!("encoding session request: {e}"))
        })?;
        socket
            .send(Message::Text(request))
            .await
            .map_err(|e| GatewayError::Channel(format!("sending session request: {e}")))?;

        loop {
            let frame = self.read_frame(socket).await?;
            if frame.id != Some(id) {
                tracing::trace!(kind = %frame.kind, "skipping unrelated control frame");
                continue;
            }

            if frame.success != Some(true) {
                return Err(GatewayError::Renewal(format!(
                    "supervisor refused to mint an ingress session (id {id})"
                )));
            }

            return frame
                .result
                .and_then(|r| r.session)
                .filter(|s| !s.is_empty())
                .ok_or_else(|| {
                    GatewayError::Protocol("session result missing the session field".to_string())
                });
        }
    }

    /// Read the next JSON text frame, bounded by the handshake timeout
    async fn read_frame(&self, socket: &mut ControlSocket) -> Result<ServerFrame, GatewayError> {
        loop {
            let message = timeout(self.handshake_timeout, socket.next())
                .await
                .map_err(|_| {
                    GatewayError::Timeout("waiting for a control channel message".to_string())
                })?
                .ok_or_else(|| GatewayError::Channel("control channel closed".to_string()))?
                .map_err(|e| GatewayError::Channel(format!("control channel read failed: {e}")))?;

            match message {
                Message::Text(body) => {
                    return serde_json::from_str(&body).map_err(|e| {
                        GatewayError::Protocol(format!("malformed control frame: {e}"))
                    });
                }
                Message::Close(_) => {
                    return Err(GatewayError::Channel(
                        "control channel closed by the ingress endpoint".to_string(),
                    ));
                }
                // Ping/pong and binary frames are not part of the handshake
                _ => continue,
            }
        }
    }
}

/// Derive the WebSocket control URL from the configured ingress base URL
///
/// The ingress URL points at the proxied Grocy API; the control channel
/// lives on the Home Assistant origin, before the ingress path.
pub fn control_url(ingress_url: &str) -> String {
    let base = ingress_url
        .split("/api/hassio_ingress")
        .next()
        .unwrap_or(ingress_url);

    let ws = if let Some(rest) = base.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = base.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        base.to_string()
    };

    format!("{}/api/websocket", ws.trim_end_matches('/'))
}
