#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/turnout-rs/turnout/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![cfg_attr(not(test), warn(unused_crate_dependencies))]

use std::{
    net::SocketAddr,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use axum::{
    Router,
    extract::{Request, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use tokio::{net::TcpListener, task::JoinHandle};

// ============================================================================
// Mock Upstream
// ============================================================================

/// How a [`MockUpstream`] answers requests.
#[derive(Debug, Clone)]
pub enum UpstreamBehavior {
    /// 200 with `{"jsonrpc":"2.0","id":1,"result":"0x…"}` for the given
    /// block number, hex-encoded.
    Block(i64),
    /// 200 with the given raw JSON as the `result` field.
    Result(String),
    /// 200 with a JSON-RPC error object.
    RpcError {
        /// JSON-RPC error code.
        code: i64,
        /// JSON-RPC error message.
        message: String,
    },
    /// The given HTTP status with an empty body.
    Status(u16),
    /// 200 with a body that is not valid JSON.
    MalformedJson,
}

/// A request as seen by the fake upstream.
#[derive(Debug, Clone)]
pub struct CapturedRequest {
    /// HTTP method.
    pub method: String,
    /// Request URI (path and query).
    pub uri: String,
    /// Header name/value pairs, lowercase names.
    pub headers: Vec<(String, String)>,
    /// Request body.
    pub body: String,
}

#[derive(Debug)]
struct UpstreamState {
    behavior: Mutex<UpstreamBehavior>,
    delay: Mutex<Duration>,
    hits: AtomicUsize,
    last_request: Mutex<Option<CapturedRequest>>,
}

/// A fake upstream JSON-RPC server on an ephemeral local port.
///
/// Every request gets the currently configured [`UpstreamBehavior`]; the
/// behavior and an artificial response delay can be changed mid-test. The
/// server records how many requests it saw and the most recent one.
///
/// # Example
///
/// ```
/// use turnout_test_utils::{MockUpstream, UpstreamBehavior};
///
/// # #[tokio::main]
/// # async fn main() {
/// let upstream = MockUpstream::start(UpstreamBehavior::Block(16)).await;
/// assert_eq!(upstream.hits(), 0);
/// upstream.set_behavior(UpstreamBehavior::Status(429));
/// # }
/// ```
#[derive(Debug)]
pub struct MockUpstream {
    addr: SocketAddr,
    state: Arc<UpstreamState>,
    handle: JoinHandle<()>,
}

impl MockUpstream {
    /// Bind an ephemeral port and start serving the given behavior.
    ///
    /// # Panics
    ///
    /// Panics if the listener cannot be bound.
    pub async fn start(behavior: UpstreamBehavior) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind mock upstream");
        let addr = listener.local_addr().expect("mock upstream address");
        let state = Arc::new(UpstreamState {
            behavior: Mutex::new(behavior),
            delay: Mutex::new(Duration::ZERO),
            hits: AtomicUsize::new(0),
            last_request: Mutex::new(None),
        });
        let app = Router::new().fallback(respond).with_state(state.clone());
        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.ok();
        });
        Self { addr, state, handle }
    }

    /// The base URL of the fake upstream.
    #[must_use]
    pub fn url(&self) -> String {
        format!("http://{}/", self.addr)
    }

    /// The socket address the fake upstream listens on.
    #[must_use]
    pub const fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Replace the response behavior for subsequent requests.
    pub fn set_behavior(&self, behavior: UpstreamBehavior) {
        *self.state.behavior.lock().unwrap() = behavior;
    }

    /// Delay every response by the given duration.
    pub fn set_delay(&self, delay: Duration) {
        *self.state.delay.lock().unwrap() = delay;
    }

    /// Number of requests served so far.
    pub fn hits(&self) -> usize {
        self.state.hits.load(Ordering::SeqCst)
    }

    /// The most recent request, if any arrived yet.
    pub fn last_request(&self) -> Option<CapturedRequest> {
        self.state.last_request.lock().unwrap().clone()
    }

    /// Stop serving; subsequent connections are refused.
    pub fn stop(&self) {
        self.handle.abort();
    }
}

impl Drop for MockUpstream {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn respond(State(state): State<Arc<UpstreamState>>, request: Request) -> Response {
    state.hits.fetch_add(1, Ordering::SeqCst);

    let (parts, body) = request.into_parts();
    let body = axum::body::to_bytes(body, usize::MAX).await.unwrap_or_default();
    *state.last_request.lock().unwrap() = Some(CapturedRequest {
        method: parts.method.to_string(),
        uri: parts.uri.to_string(),
        headers: parts
            .headers
            .iter()
            .map(|(name, value)| {
                (name.as_str().to_string(), String::from_utf8_lossy(value.as_bytes()).into_owned())
            })
            .collect(),
        body: String::from_utf8_lossy(&body).into_owned(),
    });

    let behavior = state.behavior.lock().unwrap().clone();
    let delay = *state.delay.lock().unwrap();
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }

    match behavior {
        UpstreamBehavior::Block(block_number) => {
            json_response(format!(r#"{{"jsonrpc":"2.0","id":1,"result":"0x{block_number:x}"}}"#))
        }
        UpstreamBehavior::Result(raw) => {
            json_response(format!(r#"{{"jsonrpc":"2.0","id":1,"result":{raw}}}"#))
        }
        UpstreamBehavior::RpcError { code, message } => json_response(
            serde_json::json!({
                "jsonrpc": "2.0",
                "id": 1,
                "error": { "code": code, "message": message }
            })
            .to_string(),
        ),
        UpstreamBehavior::Status(code) => {
            StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR).into_response()
        }
        UpstreamBehavior::MalformedJson => {
            json_response(r#"{"jsonrpc":"2.0","#.to_string())
        }
    }
}

fn json_response(body: String) -> Response {
    ([(axum::http::header::CONTENT_TYPE, "application/json")], body).into_response()
}

// ============================================================================
// Fixtures
// ============================================================================

/// Common JSON-RPC request bodies for tests.
pub mod fixtures {
    use serde_json::json;

    /// A client-side `eth_blockNumber` request body.
    #[must_use]
    pub fn block_number_request() -> String {
        json!({
            "jsonrpc": "2.0",
            "method": "eth_blockNumber",
            "params": [],
            "id": 1
        })
        .to_string()
    }

    /// A client-side `eth_getBalance` request body.
    #[must_use]
    pub fn get_balance_request(address: &str, block: &str) -> String {
        json!({
            "jsonrpc": "2.0",
            "method": "eth_getBalance",
            "params": [address, block],
            "id": 1
        })
        .to_string()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_block_behavior_serves_hex_result() {
        let upstream = MockUpstream::start(UpstreamBehavior::Block(16)).await;

        let response = reqwest::get(upstream.url()).await.unwrap();
        assert_eq!(response.status(), 200);
        let body: serde_json::Value = response.json().await.unwrap();
        assert_eq!(body["result"], "0x10");
        assert_eq!(upstream.hits(), 1);
    }

    #[tokio::test]
    async fn test_status_behavior() {
        let upstream = MockUpstream::start(UpstreamBehavior::Status(429)).await;

        let response = reqwest::get(upstream.url()).await.unwrap();
        assert_eq!(response.status(), 429);
    }

    #[tokio::test]
    async fn test_behavior_can_change_mid_test() {
        let upstream = MockUpstream::start(UpstreamBehavior::Block(1)).await;
        upstream.set_behavior(UpstreamBehavior::Status(503));

        let response = reqwest::get(upstream.url()).await.unwrap();
        assert_eq!(response.status(), 503);
    }

    #[tokio::test]
    async fn test_request_capture() {
        let upstream = MockUpstream::start(UpstreamBehavior::Block(1)).await;

        let client = reqwest::Client::new();
        client
            .post(format!("{}?probe=1", upstream.url()))
            .header("x-test", "yes")
            .body("hello")
            .send()
            .await
            .unwrap();

        let captured = upstream.last_request().unwrap();
        assert_eq!(captured.method, "POST");
        assert!(captured.uri.contains("probe=1"));
        assert_eq!(captured.body, "hello");
        assert!(captured.headers.iter().any(|(name, value)| name == "x-test" && value == "yes"));
    }

    #[tokio::test]
    async fn test_stop_refuses_connections() {
        let upstream = MockUpstream::start(UpstreamBehavior::Block(1)).await;
        upstream.stop();
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert!(reqwest::get(upstream.url()).await.is_err());
    }

    #[test]
    fn test_fixture_bodies_parse() {
        let request: serde_json::Value =
            serde_json::from_str(&fixtures::block_number_request()).unwrap();
        assert_eq!(request["method"], "eth_blockNumber");

        let balance: serde_json::Value =
            serde_json::from_str(&fixtures::get_balance_request("0x1234", "latest")).unwrap();
        assert_eq!(balance["params"][0], "0x1234");
    }
}
