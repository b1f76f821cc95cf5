//! Handler registry and request dispatch.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::{Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    Json, Router,
};
use futures::future::BoxFuture;
use regex::Regex;
use serde_json::{json, Value};
use tokio::sync::{broadcast, Mutex, RwLock};
use tower_http::trace::TraceLayer;

use crate::error::{Result, TckError};

/// Future returned by an inbound handler.
pub type HandlerFuture = BoxFuture<'static, Result<Option<Value>>>;

/// Single-shot handler for one inbound message.
///
/// Receives the raw body. `Ok(Some(v))` answers 200 with `v`, `Ok(None)`
/// answers an empty 200, `Err` answers 400.
pub type InboundHandler = Box<dyn FnOnce(Bytes) -> HandlerFuture + Send + Sync>;

/// Box an async closure into an [`InboundHandler`].
pub fn handler<F, Fut>(f: F) -> InboundHandler
where
    F: FnOnce(Bytes) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Option<Value>>> + Send + 'static,
{
    Box::new(move |body| -> HandlerFuture { Box::pin(f(body)) })
}

/// Inbound request nobody was waiting for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnexpectedRequest {
    /// HTTP method
    pub method: String,
    /// Request path
    pub path: String,
}

impl From<UnexpectedRequest> for TckError {
    fn from(request: UnexpectedRequest) -> Self {
        TckError::UnexpectedMessage {
            method: request.method,
            path: request.path,
        }
    }
}

struct Registration {
    matcher: Regex,
    handler: InboundHandler,
}

pub(super) struct EndpointState {
    pub(super) address: String,
    base_path: String,
    handlers: RwLock<HashMap<String, Registration>>,
    unexpected: Mutex<Vec<UnexpectedRequest>>,
    pub(super) shutdown_tx: broadcast::Sender<()>,
}

impl EndpointState {
    fn relative_path<'a>(&self, path: &'a str) -> Option<&'a str> {
        if self.base_path.is_empty() {
            return Some(path);
        }
        let rest = path.strip_prefix(&self.base_path)?;
        if rest.is_empty() || rest.starts_with('/') {
            Some(rest)
        } else {
            None
        }
    }

    /// Remove and return the handler whose pattern matches `path`.
    async fn take_handler(&self, path: &str) -> Option<(String, InboundHandler)> {
        let mut handlers = self.handlers.write().await;
        let pattern = handlers
            .iter()
            .find(|(_, registration)| registration.matcher.is_match(path))
            .map(|(pattern, _)| pattern.clone())?;
        handlers
            .remove(&pattern)
            .map(|registration| (pattern, registration.handler))
    }

    async fn record_unexpected(&self, method: &Method, path: &str) {
        tracing::warn!(%method, %path, "Unexpected inbound message");
        self.unexpected.lock().await.push(UnexpectedRequest {
            method: method.to_string(),
            path: path.to_string(),
        });
    }
}

/// Local HTTP endpoint the connector under test calls back into.
///
/// Cloning shares the registry. Handlers are single-shot: a matching request
/// removes its handler before invoking it, so two concurrent requests can
/// never reach the same handler.
#[derive(Clone)]
pub struct CallbackEndpoint {
    pub(super) state: Arc<EndpointState>,
}

impl fmt::Debug for CallbackEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackEndpoint")
            .field("address", &self.state.address)
            .field("base_path", &self.state.base_path)
            .finish_non_exhaustive()
    }
}

impl CallbackEndpoint {
    /// Create an endpoint that is not listening yet.
    ///
    /// `address` is what the connector is told to call; `base_path` is
    /// stripped from inbound paths before matching.
    pub fn new(address: &str, base_path: &str) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            state: Arc::new(EndpointState {
                address: address.trim_end_matches('/').to_string(),
                base_path: normalize_base_path(base_path),
                handlers: RwLock::new(HashMap::new()),
                unexpected: Mutex::new(Vec::new()),
                shutdown_tx,
            }),
        }
    }

    /// Public callback address, base path included
    pub fn address(&self) -> &str {
        &self.state.address
    }

    /// Register a handler for the path regex `pattern`.
    ///
    /// The pattern is anchored and tolerates a trailing slash on either side.
    pub async fn register_handler(&self, pattern: &str, handler: InboundHandler) -> Result<()> {
        let matcher = compile(pattern)?;
        let mut handlers = self.state.handlers.write().await;
        if handlers.contains_key(pattern) {
            return Err(TckError::HandlerConflict(pattern.to_string()));
        }
        tracing::debug!(%pattern, "Registered handler");
        handlers.insert(pattern.to_string(), Registration { matcher, handler });
        Ok(())
    }

    /// Drop the handler for `pattern`; returns whether one was active.
    pub async fn deregister_handler(&self, pattern: &str) -> bool {
        self.state.handlers.write().await.remove(pattern).is_some()
    }

    /// Whether a handler for `pattern` is still waiting
    pub async fn is_registered(&self, pattern: &str) -> bool {
        self.state.handlers.read().await.contains_key(pattern)
    }

    /// Drain requests that arrived with no matching handler.
    pub async fn take_unexpected(&self) -> Vec<UnexpectedRequest> {
        std::mem::take(&mut *self.state.unexpected.lock().await)
    }

    /// Router serving this endpoint.
    pub fn router(&self) -> Router {
        Router::new()
            .fallback(dispatch)
            .layer(TraceLayer::new_for_http())
            .with_state(self.state.clone())
    }

    /// Stop the listener, if one was started.
    pub fn shutdown(&self) {
        let _ = self.state.shutdown_tx.send(());
    }
}

fn normalize_base_path(base_path: &str) -> String {
    let trimmed = base_path.trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("/{trimmed}")
    }
}

fn compile(pattern: &str) -> Result<Regex> {
    Regex::new(&format!("^{}/?$", pattern.trim_end_matches('/')))
        .map_err(|e| TckError::Config(format!("Invalid handler pattern '{pattern}': {e}")))
}

async fn dispatch(
    State(state): State<Arc<EndpointState>>,
    method: Method,
    uri: Uri,
    body: Bytes,
) -> Response {
    let full_path = uri.path();

    let handler = match (method == Method::POST, state.relative_path(full_path)) {
        (true, Some(path)) => state.take_handler(path).await,
        _ => None,
    };

    let Some((pattern, handler)) = handler else {
        state.record_unexpected(&method, full_path).await;
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({
                "error": {
                    "message": format!("No handler for {method} {full_path}"),
                    "type": "unexpected_message"
                }
            })),
        )
            .into_response();
    };

    tracing::debug!(%pattern, path = %full_path, "Dispatching inbound message");

    match handler(body).await {
        Ok(Some(reply)) => (StatusCode::OK, Json(reply)).into_response(),
        Ok(None) => StatusCode::OK.into_response(),
        Err(e) => {
            tracing::warn!(%pattern, error = %e, "Inbound handler failed");
            (
                StatusCode::BAD_REQUEST,
                Json(json!({
                    "error": {
                        "message": e.to_string(),
                        "type": "handler_failed"
                    }
                })),
            )
                .into_response()
        },
    }
}
