use anyhow::{Context, Result};
use reqwest::{header, Client, Method};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

use crate::error::GatewayError;
use crate::session::SessionManager;

/// Retry policy for upstream calls
///
/// The delay grows exponentially from `base_delay` per retry. A zero base
/// keeps retries immediate.
#[derive(Clone, Debug)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    /// Delay to apply after the given (1-based) failed attempt
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay * 2u32.saturating_pow(attempt.saturating_sub(1))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::ZERO,
        }
    }
}

/// Request dispatcher for the upstream Grocy API
///
/// Every outbound call goes through here. The current ingress credential is
/// attached and transient failures (5xx, network faults) are retried within
/// the attempt budget. Client errors surface immediately.
pub struct Dispatcher {
    client: Client,
    session: Arc<SessionManager>,
    base_url: String,
    api_key: String,
    retry: RetryPolicy,
}

impl Dispatcher {
    pub fn new(
        session: Arc<SessionManager>,
        base_url: &str,
        api_key: String,
        request_timeout: Duration,
        retry: RetryPolicy,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(request_timeout)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            session,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            retry,
        })
    }

    /// Execute one logical upstream call and return the parsed JSON body
    pub async fn dispatch(
        &self,
        method: Method,
        path: &str,
        params: &[(&str, String)],
        body: Option<&Value>,
    ) -> Result<Value, GatewayError> {
        // One credential snapshot per logical call, fetched before the
        // attempts begin.
        let credential = self.session.ensure_valid_credential().await?;

        let url = format!("{}/{}", self.base_url, path.trim_start_matches('/'));

        let mut builder = self
            .client
            .request(method.clone(), &url)
            .header(
                header::COOKIE,
                format!("ingress_session={}", credential.token()),
            )
            .header("GROCY-API-KEY", self.api_key.as_str())
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::ACCEPT, "application/json");
        if !params.is_empty() {
            builder = builder.query(params);
        }
        if let Some(body) = body {
            builder = builder.json(body);
        }
        let request = builder
            .build()
            .map_err(|e| GatewayError::Internal(anyhow::anyhow!("building request: {e}")))?;

        let mut attempt = 1u32;
        loop {
            let req = request.try_clone().ok_or_else(|| {
                GatewayError::Internal(anyhow::anyhow!("request body is not cloneable"))
            })?;

            tracing::debug!(
                method = %method,
                url = %url,
                attempt,
                max_attempts = self.retry.max_attempts,
                "sending upstream request"
            );

            match self.client.execute(req).await {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        return parse_body(response).await;
                    }

                    if status.is_server_error() && attempt < self.retry.max_attempts {
                        let delay = self.retry.delay_for(attempt);
                        tracing::warn!(
                            status = status.as_u16(),
                            attempt,
                            delay_ms = delay.as_millis() as u64,
                            "upstream server error, retrying"
                        );
                        if !delay.is_zero() {
                            tokio::time::sleep(delay).await;
                        }
                        attempt += 1;
                        continue;
                    }

                    let detail = response
                        .text()
                        .await
                        .unwrap_or_else(|_| "<unreadable response body>".to_string());

                    tracing::error!(
                        method = %method,
                        url = %url,
                        status = status.as_u16(),
                        response_body = %detail,
                        attempt,
                        "upstream request failed"
                    );

                    return Err(if status.is_server_error() {
                        GatewayError::Transient {
                            method: method.to_string(),
                            url,
                            status: Some(status.as_u16()),
                            detail,
                        }
                    } else {
                        GatewayError::Permanent {
                            method: method.to_string(),
                            url,
                            status: status.as_u16(),
                            detail,
                        }
                    });
                }

                Err(err) => {
                    if attempt < self.retry.max_attempts {
                        let delay = self.retry.delay_for(attempt);
                        tracing::warn!(
                            error = %err,
                            attempt,
                            delay_ms = delay.as_millis() as u64,
                            "upstream request error, retrying"
                        );
                        if !delay.is_zero() {
                            tokio::time::sleep(delay).await;
                        }
                        attempt += 1;
                        continue;
                    }

                    tracing::error!(
                        error = %err,
                        method = %method,
                        url = %url,
                        total_attempts = attempt,
                        "upstream request failed after all attempts"
                    );

                    return Err(GatewayError::Transient {
                        method: method.to_string(),
                        url,
                        status: None,
                        detail: err.to_string(),
                    });
                }
            }
        }
    }
}

/// Parse a successful response body as JSON; empty bodies become null
async fn parse_body(response: reqwest::Response) -> Result<Value, GatewayError> {
    let bytes = response
        .bytes()
        .await
        .map_err(|e| GatewayError::Internal(anyhow::anyhow!("reading response body: {e}")))?;

    if bytes.is_empty() {
        return Ok(Value::Null);
    }

    serde_json::from_slice(&bytes)
        .map_err(|e| GatewayError::Internal(anyhow::anyhow!("upstream returned invalid JSON: {e}")))
}
