// crates/serviceweb-harness/src/mock/server.rs
// ============================================================================
// Module: Mock Interceptor Server
// Description: Loopback HTTP server replaying registry responses.
// Purpose: Stand in for every outbound dependency during a flow.
// Dependencies: axum, reqwest, tokio
// ============================================================================

//! ## Overview
//! The interceptor binds an ephemeral loopback port and answers every
//! request from the mock registry. It runs on its own thread with a
//! current-thread runtime so harness callers can stay synchronous, and
//! shuts down gracefully through a oneshot when the handle drops.

use std::net::TcpListener as StdTcpListener;
use std::sync::Arc;
use std::sync::Mutex;
use std::thread;

use axum::Router;
use axum::body::Body;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::http::Method;
use axum::http::StatusCode;
use axum::http::Uri;
use axum::http::header::CONTENT_TYPE;
use axum::response::Response;
use tokio::runtime::Builder;
use tokio::sync::oneshot;

use crate::telemetry::HarnessEvent;
use crate::telemetry::TelemetrySink;

use super::registry::CannedResponse;
use super::registry::MockError;
use super::registry::MockRegistry;
use super::registry::MockRule;
use super::registry::RecordedCall;

// ============================================================================
// SECTION: Modes
// ============================================================================

/// Behavior for requests no registry rule matches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockMode {
    /// Record the call and answer `502`; the flow fails loudly.
    Strict,
    /// Forward the call verbatim to a real base URL.
    Passthrough {
        /// Base URL unmatched requests are forwarded to.
        base_url: String,
    },
}

// ============================================================================
// SECTION: Shared State
// ============================================================================

/// State shared with the interceptor handler.
#[derive(Clone)]
struct InterceptState {
    /// Active rule set; rules may be appended mid-flow.
    registry: Arc<Mutex<MockRegistry>>,
    /// Unmatched-call behavior.
    mode: MockMode,
    /// Client used for passthrough forwarding.
    client: reqwest::Client,
    /// Requests answered by a rule.
    matched: Arc<Mutex<Vec<RecordedCall>>>,
    /// Requests no rule answered.
    unmatched: Arc<Mutex<Vec<RecordedCall>>>,
    /// Event sink.
    telemetry: Arc<dyn TelemetrySink>,
}

// ============================================================================
// SECTION: Server Handle
// ============================================================================

/// Handle for a running interceptor.
pub struct MockServer {
    /// Base URL of the loopback listener.
    base_url: String,
    /// Active rule set shared with the handler.
    registry: Arc<Mutex<MockRegistry>>,
    /// Requests answered by a rule.
    matched: Arc<Mutex<Vec<RecordedCall>>>,
    /// Requests no rule answered.
    unmatched: Arc<Mutex<Vec<RecordedCall>>>,
    /// Graceful shutdown trigger.
    shutdown: Option<oneshot::Sender<()>>,
    /// Server thread join handle.
    join: Option<thread::JoinHandle<()>>,
}

impl MockServer {
    /// Starts the interceptor on an ephemeral loopback port.
    ///
    /// # Errors
    /// Returns [`MockError`] when the listener cannot be bound or the
    /// server runtime cannot start.
    pub fn start(
        registry: MockRegistry,
        mode: MockMode,
        telemetry: Arc<dyn TelemetrySink>,
    ) -> Result<Self, MockError> {
        let listener =
            StdTcpListener::bind("127.0.0.1:0").map_err(|err| MockError::Bind(err.to_string()))?;
        listener.set_nonblocking(true).map_err(|err| MockError::Bind(err.to_string()))?;
        let addr = listener.local_addr().map_err(|err| MockError::Bind(err.to_string()))?;
        let base_url = format!("http://{addr}");

        let registry = Arc::new(Mutex::new(registry));
        let matched = Arc::new(Mutex::new(Vec::new()));
        let unmatched = Arc::new(Mutex::new(Vec::new()));
        let state = InterceptState {
            registry: Arc::clone(&registry),
            mode,
            client: reqwest::Client::new(),
            matched: Arc::clone(&matched),
            unmatched: Arc::clone(&unmatched),
            telemetry,
        };
        let app = Router::new().fallback(intercept).with_state(state);
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let (ready_tx, ready_rx) = std::sync::mpsc::channel();
        let join = thread::spawn(move || {
            let runtime = match Builder::new_current_thread().enable_all().build() {
                Ok(runtime) => runtime,
                Err(err) => {
                    let _ = ready_tx.send(Err(MockError::Runtime(err.to_string())));
                    return;
                }
            };
            runtime.block_on(async move {
                let listener = match tokio::net::TcpListener::from_std(listener) {
                    Ok(listener) => listener,
                    Err(err) => {
                        let _ = ready_tx.send(Err(MockError::Runtime(err.to_string())));
                        return;
                    }
                };
                let _ = ready_tx.send(Ok(()));
                let server = axum::serve(listener, app).with_graceful_shutdown(async move {
                    let _ = shutdown_rx.await;
                });
                let _ = server.await;
            });
        });
        match ready_rx.recv() {
            Ok(Ok(())) => {}
            Ok(Err(err)) => return Err(err),
            Err(_) => return Err(MockError::Runtime("server thread exited early".to_string())),
        }
        Ok(Self {
            base_url,
            registry,
            matched,
            unmatched,
            shutdown: Some(shutdown_tx),
            join: Some(join),
        })
    }

    /// Returns the interceptor base URL.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Appends a rule after all currently registered rules.
    pub fn append_rule(&self, rule: MockRule) {
        if let Ok(mut registry) = self.registry.lock() {
            registry.push(rule);
        }
    }

    /// Returns the calls answered by a rule so far.
    pub fn matched(&self) -> Vec<RecordedCall> {
        self.matched.lock().map_or_else(|_| Vec::new(), |calls| calls.clone())
    }

    /// Returns the calls no rule answered so far.
    pub fn unmatched(&self) -> Vec<RecordedCall> {
        self.unmatched.lock().map_or_else(|_| Vec::new(), |calls| calls.clone())
    }
}

impl Drop for MockServer {
    fn drop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

// ============================================================================
// SECTION: Handler
// ============================================================================

/// Answers one intercepted request from the registry.
async fn intercept(
    State(state): State<InterceptState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let target = uri
        .path_and_query()
        .map_or_else(|| uri.path().to_string(), |target| target.as_str().to_string());
    let call = RecordedCall {
        verb: method.to_string(),
        target: target.clone(),
    };

    let canned = state
        .registry
        .lock()
        .ok()
        .and_then(|registry| registry.find(&method, &target).cloned());
    if let Some(response) = canned {
        record(&state.matched, &call);
        state.telemetry.record(&HarnessEvent::MockMatched {
            verb: call.verb,
            target: call.target,
        });
        return render(&response);
    }

    record(&state.unmatched, &call);
    state.telemetry.record(&HarnessEvent::MockUnmatched {
        verb: call.verb.clone(),
        target: call.target.clone(),
    });
    match &state.mode {
        MockMode::Strict => error_response(
            StatusCode::BAD_GATEWAY,
            &format!("unmatched outbound call: {} {}", call.verb, call.target),
        ),
        MockMode::Passthrough {
            base_url,
        } => forward(&state.client, base_url, &method, &target, &headers, body).await,
    }
}

/// Appends one call record, ignoring a poisoned lock.
fn record(calls: &Arc<Mutex<Vec<RecordedCall>>>, call: &RecordedCall) {
    if let Ok(mut calls) = calls.lock() {
        calls.push(call.clone());
    }
}

/// Renders a canned response.
fn render(canned: &CannedResponse) -> Response {
    let status = StatusCode::from_u16(canned.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    Response::builder()
        .status(status)
        .header(CONTENT_TYPE, canned.content_type.clone())
        .body(Body::from(canned.body.clone()))
        .unwrap_or_else(|_| plain_error(StatusCode::INTERNAL_SERVER_ERROR))
}

/// Forwards an unmatched request to the passthrough base URL.
async fn forward(
    client: &reqwest::Client,
    base_url: &str,
    method: &Method,
    target: &str,
    headers: &HeaderMap,
    body: Bytes,
) -> Response {
    let Ok(verb) = reqwest::Method::from_bytes(method.as_str().as_bytes()) else {
        return error_response(StatusCode::BAD_GATEWAY, "unforwardable method");
    };
    let mut request = client.request(verb, format!("{base_url}{target}")).body(body.to_vec());
    if let Some(content_type) = headers.get(CONTENT_TYPE).and_then(|value| value.to_str().ok()) {
        request = request.header(CONTENT_TYPE.as_str(), content_type);
    }
    let upstream = match request.send().await {
        Ok(upstream) => upstream,
        Err(err) => {
            return error_response(
                StatusCode::BAD_GATEWAY,
                &format!("passthrough request failed: {err}"),
            );
        }
    };
    let status = StatusCode::from_u16(upstream.status().as_u16())
        .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let content_type = upstream
        .headers()
        .get(CONTENT_TYPE.as_str())
        .and_then(|value| value.to_str().ok())
        .unwrap_or("application/octet-stream")
        .to_string();
    let bytes = match upstream.bytes().await {
        Ok(bytes) => bytes,
        Err(err) => {
            return error_response(
                StatusCode::BAD_GATEWAY,
                &format!("passthrough body read failed: {err}"),
            );
        }
    };
    Response::builder()
        .status(status)
        .header(CONTENT_TYPE, content_type)
        .body(Body::from(bytes.to_vec()))
        .unwrap_or_else(|_| plain_error(StatusCode::BAD_GATEWAY))
}

/// Builds a plain-text error response.
fn error_response(status: StatusCode, message: &str) -> Response {
    Response::builder()
        .status(status)
        .header(CONTENT_TYPE, "text/plain")
        .body(Body::from(message.to_string()))
        .unwrap_or_else(|_| plain_error(status))
}

/// Last-resort response when even the builder fails.
fn plain_error(status: StatusCode) -> Response {
    let mut response = Response::new(Body::empty());
    *response.status_mut() = status;
    response
}
