// Shared test support: a scripted stand-in for the Home Assistant
// ingress control endpoint.
//
// Not every test binary exercises every script.
#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::{accept_async, tungstenite::Message, WebSocketStream};

/// How the fake ingress endpoint behaves
#[derive(Clone, Copy, PartialEq)]
pub enum Script {
    /// Greets, authenticates, and mints session tokens on request
    Normal,
    /// Greets with an unexpected message kind
    BadGreeting,
    /// Rejects the long-lived access token
    RejectAuth,
    /// Authenticates but refuses to mint sessions
    RefuseSession,
    /// Accepts the socket and never says anything
    Mute,
    /// Emits unrelated frames before each session reply
    NoisyChannel,
    /// Closes the connection after minting one session
    DropAfterFirstSession,
}

pub struct FakeIngress {
    pub url: String,
    handshakes: Arc<AtomicUsize>,
    sessions: Arc<AtomicUsize>,
}

impl FakeIngress {
    pub async fn spawn(script: Script, expected_token: &str) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind fake ingress");
        let addr = listener.local_addr().expect("fake ingress addr");

        let handshakes = Arc::new(AtomicUsize::new(0));
        let sessions = Arc::new(AtomicUsize::new(0));
        let expected = expected_token.to_string();

        {
            let handshakes = handshakes.clone();
            let sessions = sessions.clone();
            tokio::spawn(async move {
                loop {
                    let Ok((stream, _)) = listener.accept().await else {
                        break;
                    };
                    let handshakes = handshakes.clone();
                    let sessions = sessions.clone();
                    let expected = expected.clone();
                    tokio::spawn(async move {
                        let _ = serve_connection(stream, script, &expected, &handshakes, &sessions)
                            .await;
                    });
                }
            });
        }

        Self {
            url: format!("ws://{addr}/api/websocket"),
            handshakes,
            sessions,
        }
    }

    /// Number of completed auth handshakes
    pub fn handshakes(&self) -> usize {
        self.handshakes.load(Ordering::SeqCst)
    }

    /// Number of session tokens minted
    pub fn sessions_minted(&self) -> usize {
        self.sessions.load(Ordering::SeqCst)
    }
}

async fn serve_connection(
    stream: TcpStream,
    script: Script,
    expected_token: &str,
    handshakes: &AtomicUsize,
    sessions: &AtomicUsize,
) -> Result<(), tokio_tungstenite::tungstenite::Error> {
    let mut socket = accept_async(stream).await?;

    if script == Script::Mute {
        // Keep the socket open without ever greeting
        while socket.next().await.is_some() {}
        return Ok(());
    }

    if script == Script::BadGreeting {
        socket.send(text(json!({"type": "event"}))).await?;
        return Ok(());
    }

    socket.send(text(json!({"type": "auth_required"}))).await?;

    let Some(auth) = next_json(&mut socket).await else {
        return Ok(());
    };
    let token_ok = auth["type"] == "auth" && auth["access_token"] == expected_token;
    if script == Script::RejectAuth || !token_ok {
        socket
            .send(text(
                json!({"type": "auth_invalid", "message": "Invalid access token"}),
            ))
            .await?;
        return Ok(());
    }
    socket.send(text(json!({"type": "auth_ok"}))).await?;
    handshakes.fetch_add(1, Ordering::SeqCst);

    while let Some(request) = next_json(&mut socket).await {
        if request["type"] != "supervisor/api" {
            continue;
        }
        let id = request["id"].as_u64().unwrap_or(0);

        if script == Script::RefuseSession {
            socket
                .send(text(json!({"id": id, "type": "result", "success": false})))
                .await?;
            continue;
        }

        if script == Script::NoisyChannel {
            socket
                .send(text(
                    json!({"type": "event", "event": {"event_type": "state_changed"}}),
                ))
                .await?;
            socket
                .send(text(
                    json!({"id": id + 1000, "type": "result", "success": true, "result": null}),
                ))
                .await?;
        }

        let n = sessions.fetch_add(1, Ordering::SeqCst) + 1;
        socket
            .send(text(json!({
                "id": id,
                "type": "result",
                "success": true,
                "result": {"session": format!("ingress-session-{n}")},
            })))
            .await?;

        if script == Script::DropAfterFirstSession {
            return Ok(());
        }
    }

    Ok(())
}

fn text(value: Value) -> Message {
    Message::Text(value.to_string())
}

async fn next_json(socket: &mut WebSocketStream<TcpStream>) -> Option<Value> {
    while let Some(frame) = socket.next().await {
        match frame {
            Ok(Message::Text(body)) => return serde_json::from_str(&body).ok(),
            Ok(Message::Close(_)) | Err(_) => return None,
            _ => continue,
        }
    }
    None
}
