// Integration tests for the ingress session manager
//
// Each test drives a real SessionManager against a scripted in-process
// ingress endpoint (see tests/support).

mod support;

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use grocy_gateway::error::GatewayError;
use grocy_gateway::session::SessionManager;
use support::{FakeIngress, Script};

const ACCESS_TOKEN: &str = "long-lived-token";

fn manager(ingress: &FakeIngress, max_age: chrono::Duration) -> SessionManager {
    SessionManager::new(
        ingress.url.clone(),
        ACCESS_TOKEN.to_string(),
        max_age,
        Duration::from_secs(2),
    )
}

#[tokio::test]
async fn test_single_flight_renewal() {
    let ingress = FakeIngress::spawn(Script::Normal, ACCESS_TOKEN).await;
    let manager = Arc::new(manager(&ingress, chrono::Duration::seconds(60)));

    let callers: Vec<_> = (0..8)
        .map(|_| {
            let manager = manager.clone();
            tokio::spawn(async move { manager.ensure_valid_credential().await })
        })
        .collect();

    let results = join_all(callers).await;
    let tokens: Vec<String> = results
        .into_iter()
        .map(|r| r.expect("caller panicked").expect("credential").token().to_string())
        .collect();

    // One handshake, one renewal, every caller sees the same token
    assert_eq!(ingress.handshakes(), 1);
    assert_eq!(ingress.sessions_minted(), 1);
    assert!(tokens.iter().all(|t| t == &tokens[0]));
}

#[tokio::test]
async fn test_fresh_credential_reused() {
    let ingress = FakeIngress::spawn(Script::Normal, ACCESS_TOKEN).await;
    let manager = manager(&ingress, chrono::Duration::seconds(60));

    let first = manager.ensure_valid_credential().await.expect("first");
    let second = manager.ensure_valid_credential().await.expect("second");

    assert_eq!(first.token(), second.token());
    assert_eq!(ingress.sessions_minted(), 1);
}

#[tokio::test]
async fn test_expired_credential_renewed_over_open_channel() {
    let ingress = FakeIngress::spawn(Script::Normal, ACCESS_TOKEN).await;
    let manager = manager(&ingress, chrono::Duration::milliseconds(150));

    let first = manager.ensure_valid_credential().await.expect("first");
    tokio::time::sleep(Duration::from_millis(300)).await;
    let second = manager.ensure_valid_credential().await.expect("second");

    assert_ne!(first.token(), second.token());
    assert!(second.age() < chrono::Duration::milliseconds(150));
    assert_eq!(ingress.sessions_minted(), 2);
    // Renewal reuses the channel, no second handshake
    assert_eq!(ingress.handshakes(), 1);
}

#[tokio::test]
async fn test_bad_greeting_is_protocol_error() {
    let ingress = FakeIngress::spawn(Script::BadGreeting, ACCESS_TOKEN).await;
    let manager = manager(&ingress, chrono::Duration::seconds(60));

    let err = manager.ensure_valid_credential().await.unwrap_err();
    assert!(matches!(err, GatewayError::Protocol(_)), "got {err:?}");
    assert_eq!(ingress.sessions_minted(), 0);
}

#[tokio::test]
async fn test_rejected_access_token() {
    let ingress = FakeIngress::spawn(Script::RejectAuth, ACCESS_TOKEN).await;
    let manager = manager(&ingress, chrono::Duration::seconds(60));

    let err = manager.ensure_valid_credential().await.unwrap_err();
    assert!(matches!(err, GatewayError::Authentication(_)), "got {err:?}");

    // The discarded connection is re-established (and rejected again)
    let err = manager.ensure_valid_credential().await.unwrap_err();
    assert!(matches!(err, GatewayError::Authentication(_)), "got {err:?}");
    assert_eq!(ingress.handshakes(), 0);
    assert_eq!(ingress.sessions_minted(), 0);
}

#[tokio::test]
async fn test_refused_session_keeps_channel() {
    let ingress = FakeIngress::spawn(Script::RefuseSession, ACCESS_TOKEN).await;
    let manager = manager(&ingress, chrono::Duration::seconds(60));

    let err = manager.ensure_valid_credential().await.unwrap_err();
    assert!(matches!(err, GatewayError::Renewal(_)), "got {err:?}");

    let err = manager.ensure_valid_credential().await.unwrap_err();
    assert!(matches!(err, GatewayError::Renewal(_)), "got {err:?}");

    // A plain supervisor refusal does not cost the channel
    assert_eq!(ingress.handshakes(), 1);
}

#[tokio::test]
async fn test_mute_endpoint_times_out() {
    let ingress = FakeIngress::spawn(Script::Mute, ACCESS_TOKEN).await;
    let manager = SessionManager::new(
        ingress.url.clone(),
        ACCESS_TOKEN.to_string(),
        chrono::Duration::seconds(60),
        Duration::from_millis(200),
    );

    let started = std::time::Instant::now();
    let err = manager.ensure_valid_credential().await.unwrap_err();

    assert!(matches!(err, GatewayError::Timeout(_)), "got {err:?}");
    assert!(started.elapsed() < Duration::from_secs(2));
}

#[tokio::test]
async fn test_unrelated_frames_are_skipped() {
    let ingress = FakeIngress::spawn(Script::NoisyChannel, ACCESS_TOKEN).await;
    let manager = manager(&ingress, chrono::Duration::seconds(60));

    let credential = manager.ensure_valid_credential().await.expect("credential");
    assert_eq!(credential.token(), "ingress-session-1");
}

#[tokio::test]
async fn test_reconnects_after_connection_drop() {
    let ingress = FakeIngress::spawn(Script::DropAfterFirstSession, ACCESS_TOKEN).await;
    let manager = manager(&ingress, chrono::Duration::milliseconds(100));

    let first = manager.ensure_valid_credential().await.expect("first");
    tokio::time::sleep(Duration::from_millis(250)).await;

    // The endpoint hung up after the first session: the renewal attempt
    // fails and discards the socket
    let err = manager.ensure_valid_credential().await.unwrap_err();
    assert!(matches!(err, GatewayError::Channel(_)), "got {err:?}");

    // The next call re-establishes from scratch
    let third = manager.ensure_valid_credential().await.expect("third");
    assert_ne!(first.token(), third.token());
    assert_eq!(ingress.handshakes(), 2);
}
