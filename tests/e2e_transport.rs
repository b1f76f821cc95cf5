//! End-to-end transport tests.
//!
//! Each test starts an axum mock on an ephemeral port whose answers are
//! scripted per request, then drives it with `HttpTransport`.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use dsp_tck::config::TransportConfig;
use dsp_tck::protocol::BodyFormat;
use dsp_tck::transport::RetryPolicy;
use dsp_tck::{ExpectedOutcome, HttpTransport, TckError, Violation};
use serde_json::{json, Value};

/// Scripted answers plus what the mock observed.
#[derive(Default)]
struct Script {
    statuses: Mutex<VecDeque<u16>>,
    hits: Mutex<u32>,
    authorization: Mutex<Option<String>>,
    bodies: Mutex<Vec<Value>>,
}

impl Script {
    fn new(statuses: &[u16]) -> Arc<Self> {
        Arc::new(Self {
            statuses: Mutex::new(statuses.iter().copied().collect()),
            ..Self::default()
        })
    }

    fn hits(&self) -> u32 {
        *self.hits.lock().unwrap()
    }
}

async fn scripted(
    State(script): State<Arc<Script>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    *script.hits.lock().unwrap() += 1;
    *script.authorization.lock().unwrap() = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    script.bodies.lock().unwrap().push(body);

    let status = script.statuses.lock().unwrap().pop_front().unwrap_or(200);
    (
        StatusCode::from_u16(status).unwrap(),
        Json(json!({"dspace:providerPid": "p-1", "status": status})),
    )
}

async fn negotiation() -> Json<Value> {
    Json(json!({
        "@type": "dspace:ContractNegotiation",
        "dspace:providerPid": "p-1",
        "dspace:state": "dspace:FINALIZED"
    }))
}

/// Start the mock and return its base URL.
async fn start_mock(script: Arc<Script>) -> String {
    let router = Router::new()
        .route("/negotiations/request", post(scripted))
        .route("/negotiations/:id", get(negotiation))
        .with_state(script);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, router).await;
    });
    format!("http://{addr}")
}

fn transport() -> HttpTransport {
    HttpTransport::new(&TransportConfig::default()).unwrap()
}

fn request() -> Value {
    json!({"@type": "dspace:ContractRequestMessage", "dspace:consumerPid": "c-1"})
}

async fn post_request(
    transport: &HttpTransport,
    base: &str,
    expected: ExpectedOutcome,
) -> dsp_tck::Result<dsp_tck::transport::TransportResponse> {
    transport
        .post_json(
            &format!("{base}/negotiations/request"),
            &request(),
            expected,
            BodyFormat::JsonLd,
        )
        .await
}

fn violation_kind(err: TckError) -> Violation {
    match err {
        TckError::ProtocolViolation { kind, .. } => kind,
        other => panic!("expected protocol violation, got {other}"),
    }
}

#[tokio::test]
async fn test_transient_status_retried_until_success() {
    let script = Script::new(&[429, 429, 200]);
    let base = start_mock(script.clone()).await;

    let started = Instant::now();
    let response = post_request(&transport(), &base, ExpectedOutcome::Success).await;
    let elapsed = started.elapsed();

    let response = tokio_test::assert_ok!(response);
    assert_eq!(response.status(), 200);
    assert_eq!(response.attempts(), 3);
    assert_eq!(script.hits(), 3);
    // 200ms then 400ms of backoff
    assert!(elapsed >= Duration::from_millis(600), "elapsed {elapsed:?}");
}

#[tokio::test]
async fn test_retry_budget_exhausted() {
    let script = Script::new(&[429, 429, 429, 429]);
    let base = start_mock(script.clone()).await;

    let err = post_request(&transport(), &base, ExpectedOutcome::Success)
        .await
        .unwrap_err();
    assert_eq!(violation_kind(err), Violation::UnexpectedStatus(429));
    assert_eq!(script.hits(), 3);
}

#[tokio::test]
async fn test_not_found_is_violation_unless_expected() {
    let script = Script::new(&[404, 404]);
    let base = start_mock(script.clone()).await;
    let transport = transport();

    let err = post_request(&transport, &base, ExpectedOutcome::Success)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("unexpected 404"));
    assert_eq!(violation_kind(err), Violation::UnexpectedNotFound);
    assert_eq!(script.hits(), 1);

    let response = post_request(&transport, &base, ExpectedOutcome::Error).await.unwrap();
    assert_eq!(response.status(), 404);
}

#[tokio::test]
async fn test_success_when_error_expected() {
    let script = Script::new(&[200]);
    let base = start_mock(script).await;

    let err = post_request(&transport(), &base, ExpectedOutcome::Error)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("expected to throw an error"));
    assert_eq!(violation_kind(err), Violation::MissingExpectedError);
}

#[tokio::test]
async fn test_server_error_not_retried() {
    let script = Script::new(&[500, 200]);
    let base = start_mock(script.clone()).await;

    let err = post_request(&transport(), &base, ExpectedOutcome::Success)
        .await
        .unwrap_err();
    assert_eq!(violation_kind(err), Violation::UnexpectedStatus(500));
    assert_eq!(script.hits(), 1);
}

#[tokio::test]
async fn test_error_expected_accepts_conflict_without_retry() {
    let script = Script::new(&[409]);
    let base = start_mock(script.clone()).await;

    let response = post_request(&transport(), &base, ExpectedOutcome::Error).await.unwrap();
    assert_eq!(response.status(), 409);
    assert_eq!(response.attempts(), 1);
    assert_eq!(script.hits(), 1);
}

#[tokio::test]
async fn test_no_retry_policy() {
    let script = Script::new(&[429, 200]);
    let base = start_mock(script.clone()).await;
    let transport = transport().with_retry(RetryPolicy::none());

    let err = post_request(&transport, &base, ExpectedOutcome::Success)
        .await
        .unwrap_err();
    assert_eq!(violation_kind(err), Violation::UnexpectedStatus(429));
    assert_eq!(script.hits(), 1);
}

#[tokio::test]
async fn test_authorization_header_sent() {
    let script = Script::new(&[200]);
    let base = start_mock(script.clone()).await;
    let config = TransportConfig {
        authorization: Some("Bearer tck-token".to_string()),
        ..TransportConfig::default()
    };
    let transport = HttpTransport::new(&config).unwrap();

    post_request(&transport, &base, ExpectedOutcome::Success).await.unwrap();
    assert_eq!(
        script.authorization.lock().unwrap().as_deref(),
        Some("Bearer tck-token")
    );
}

#[tokio::test]
async fn test_json_ld_context_added() {
    let script = Script::new(&[200]);
    let base = start_mock(script.clone()).await;

    let response = post_request(&transport(), &base, ExpectedOutcome::Success).await.unwrap();
    assert_eq!(response.json().unwrap()["dspace:providerPid"], "p-1");

    let bodies = script.bodies.lock().unwrap();
    assert!(bodies[0].get("@context").is_some());
    assert_eq!(bodies[0]["dspace:consumerPid"], "c-1");
}

#[tokio::test]
async fn test_get_negotiation() {
    let base = start_mock(Script::new(&[])).await;

    let response = transport()
        .get_json(&format!("{base}/negotiations/p-1"), ExpectedOutcome::Success)
        .await
        .unwrap();
    let negotiation = response.json().unwrap();
    assert_eq!(
        dsp_tck::protocol::message::state_property(&negotiation).as_deref(),
        Some("https://w3id.org/dspace/v0.8/FINALIZED")
    );
}

#[tokio::test]
async fn test_get_unknown_route_not_found() {
    let base = start_mock(Script::new(&[])).await;

    let err = transport()
        .get_json(&format!("{base}/catalog"), ExpectedOutcome::Success)
        .await
        .unwrap_err();
    assert_eq!(violation_kind(err), Violation::UnexpectedNotFound);
}
