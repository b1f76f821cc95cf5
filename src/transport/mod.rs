//! Outbound HTTP to the connector under test.
//!
//! Every call is classified against an [`ExpectedOutcome`]:
//!
//! ```text
//!   POST ──> status ──┬── accepted ──────────────> TransportResponse
//!     ^               ├── transient (4xx != 404) ─┐
//!     │               └── violation ──────────────┼─> ProtocolViolation
//!     └──── sleep(backoff), attempt < max ────────┘
//! ```
//!
//! Only POSTs expecting success are retried. Connection failures surface
//! immediately as [`TckError::TransportIo`].

mod auth;
mod retry;

pub use auth::{AuthInterceptor, AuthorizationHeader, NoAuth};
pub use retry::{classify, Classification, ExpectedOutcome, RetryPolicy};

pub use crate::protocol::BodyFormat;

use std::sync::Arc;

use bytes::Bytes;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::Client;
use serde_json::Value;

use crate::config::TransportConfig;
use crate::error::{Result, TckError, Violation};
use crate::protocol::message;

/// Response that passed classification.
#[derive(Debug, Clone)]
pub struct TransportResponse {
    status: u16,
    body: Bytes,
    attempts: u32,
}

impl TransportResponse {
    /// HTTP status
    pub fn status(&self) -> u16 {
        self.status
    }

    /// Raw body
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Attempts it took, first call included
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Decode the body as JSON.
    pub fn json(&self) -> Result<Value> {
        message::decode(&self.body)
    }

    /// Decode the body if there is one.
    pub fn json_opt(&self) -> Result<Option<Value>> {
        if self.body.iter().all(u8::is_ascii_whitespace) {
            Ok(None)
        } else {
            self.json().map(Some)
        }
    }
}

/// Retrying HTTP client for DSP messages.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    auth: Arc<dyn AuthInterceptor>,
    retry: RetryPolicy,
}

impl HttpTransport {
    /// Build a client from configuration.
    pub fn new(config: &TransportConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| TckError::Config(format!("Failed to create HTTP client: {e}")))?;

        let auth: Arc<dyn AuthInterceptor> = match &config.authorization {
            Some(value) => Arc::new(AuthorizationHeader::new(value.clone())),
            None => Arc::new(NoAuth),
        };

        Ok(Self {
            client,
            auth,
            retry: config.retry_policy(),
        })
    }

    /// Replace the auth interceptor.
    pub fn with_auth(mut self, auth: impl AuthInterceptor + 'static) -> Self {
        self.auth = Arc::new(auth);
        self
    }

    /// Replace the retry policy.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Retry policy in use
    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    /// POST a message and classify the answer, retrying transient failures.
    pub async fn post_json(
        &self,
        url: &str,
        message: &Value,
        expected: ExpectedOutcome,
        format: BodyFormat,
    ) -> Result<TransportResponse> {
        let body = message::encode(message, format)?;
        let mut attempt = 1;

        loop {
            let request = self
                .client
                .post(url)
                .header(CONTENT_TYPE, "application/json")
                .header(ACCEPT, "application/json")
                .body(body.clone());

            let response = self
                .auth
                .apply(request)
                .send()
                .await
                .map_err(|e| io_error(url, &e))?;
            let status = response.status().as_u16();

            match classify(status, expected) {
                Classification::Accepted => {
                    tracing::debug!(%url, status, attempt, "POST accepted");
                    return read(url, response, attempt).await;
                },
                Classification::Transient if self.retry.should_retry(attempt) => {
                    let backoff = self.retry.backoff(attempt);
                    tracing::warn!(
                        %url,
                        status,
                        attempt,
                        backoff_ms = backoff.as_millis() as u64,
                        "Transient response, retrying"
                    );
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                },
                Classification::Transient => {
                    tracing::warn!(%url, status, attempt, "Retry budget exhausted");
                    return Err(violation(url, Violation::UnexpectedStatus(status)));
                },
                Classification::Violation(kind) => return Err(violation(url, kind)),
            }
        }
    }

    /// GET a resource. Classified like a POST, but never retried.
    pub async fn get_json(&self, url: &str, expected: ExpectedOutcome) -> Result<TransportResponse> {
        let request = self.client.get(url).header(ACCEPT, "application/json");
        let response = self
            .auth
            .apply(request)
            .send()
            .await
            .map_err(|e| io_error(url, &e))?;
        let status = response.status().as_u16();

        match classify(status, expected) {
            Classification::Accepted => read(url, response, 1).await,
            Classification::Transient => Err(violation(url, Violation::UnexpectedStatus(status))),
            Classification::Violation(kind) => Err(violation(url, kind)),
        }
    }
}

async fn read(url: &str, response: reqwest::Response, attempts: u32) -> Result<TransportResponse> {
    let status = response.status().as_u16();
    let body = response.bytes().await.map_err(|e| io_error(url, &e))?;
    Ok(TransportResponse {
        status,
        body,
        attempts,
    })
}

fn io_error(url: &str, err: &reqwest::Error) -> TckError {
    TckError::TransportIo {
        url: url.to_string(),
        message: err.to_string(),
    }
}

fn violation(url: &str, kind: Violation) -> TckError {
    tracing::debug!(%url, %kind, "Protocol violation");
    TckError::ProtocolViolation {
        url: url.to_string(),
        kind,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_from_config() {
        let config = TransportConfig {
            max_attempts: 5,
            initial_backoff_ms: 10,
            ..Default::default()
        };
        let transport = HttpTransport::new(&config).unwrap();
        assert_eq!(transport.retry_policy().max_attempts(), 5);

        let transport = transport.with_retry(RetryPolicy::none());
        assert_eq!(transport.retry_policy().max_attempts(), 1);
    }

    #[test]
    fn test_response_json_opt() {
        let empty = TransportResponse {
            status: 200,
            body: Bytes::new(),
            attempts: 1,
        };
        assert!(empty.json_opt().unwrap().is_none());
        assert!(empty.json().is_err());

        let full = TransportResponse {
            status: 201,
            body: Bytes::from_static(br#"{"dspace:state":"dspace:REQUESTED"}"#),
            attempts: 2,
        };
        assert_eq!(full.json_opt().unwrap().unwrap()["dspace:state"], "dspace:REQUESTED");
        assert_eq!(full.attempts(), 2);
    }

    #[tokio::test]
    async fn test_connection_refused_is_transport_io() {
        // Bind and drop to get a port nobody listens on
        let port = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();

        let transport = HttpTransport::new(&TransportConfig::default()).unwrap();
        let err = transport
            .post_json(
                &format!("http://127.0.0.1:{port}/negotiations/request"),
                &serde_json::json!({}),
                ExpectedOutcome::Success,
                BodyFormat::JsonLd,
            )
            .await
            .unwrap_err();
        assert!(err.is_transport_io());
    }
}
