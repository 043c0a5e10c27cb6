//! End-to-end tests for the proxy frontend against scripted fake upstreams.

use std::{net::SocketAddr, sync::Arc, time::Duration};

use tokio::sync::mpsc;
use turnout_pool::{CurrentBest, EndpointPool, Prober, Selector, SelectorTrigger, selector_trigger};
use turnout_server::{ProxyState, proxy_router};
use turnout_test_utils::{MockUpstream, UpstreamBehavior, fixtures};

const BACKOFF: Duration = Duration::from_secs(5);
const TOLERANCE: i64 = 5;

/// A gateway wired like the binary does it, minus signals and metrics.
struct Gateway {
    addr: SocketAddr,
    pool: Arc<EndpointPool>,
    best: Arc<CurrentBest>,
    selector: Arc<Selector>,
    trigger_rx: mpsc::Receiver<()>,
}

impl Gateway {
    async fn spawn(urls: Vec<String>) -> Self {
        let pool = Arc::new(EndpointPool::from_urls(&urls).unwrap());
        let client =
            reqwest::Client::builder().timeout(Duration::from_secs(2)).build().unwrap();
        let best = Arc::new(CurrentBest::new(pool.first()));
        let prober = Prober::new(client.clone(), BACKOFF);
        let selector = Arc::new(Selector::new(pool.clone(), best.clone(), prober, TOLERANCE));
        let (trigger, trigger_rx) = selector_trigger();

        let state = Arc::new(ProxyState::new(best.clone(), client, BACKOFF, trigger));
        let app = proxy_router(state);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        // Detach the server task; it lives for the duration of the test.
        let _ = tokio::spawn(async move {
            axum::serve(listener, app).await.ok();
        });

        Self { addr, pool, best, selector, trigger_rx }
    }

    fn url(&self) -> String {
        format!("http://{}/", self.addr)
    }

    async fn post(&self, body: String) -> reqwest::Response {
        reqwest::Client::new()
            .post(self.url())
            .header("content-type", "application/json")
            .body(body)
            .send()
            .await
            .unwrap()
    }
}

#[tokio::test]
async fn test_forwards_to_single_healthy_upstream() {
    let upstream = MockUpstream::start(UpstreamBehavior::Block(16)).await;
    let mut gateway = Gateway::spawn(vec![upstream.url()]).await;
    gateway.selector.run_once().await;

    let published = gateway.best.get().await;
    assert!(Arc::ptr_eq(&published, &gateway.pool.first()));
    let status = published.snapshot().await;
    assert!(status.reachable);
    assert_eq!(status.block_number, 16);

    let response = gateway.post(fixtures::block_number_request()).await;
    assert_eq!(response.status(), 200);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["result"], "0x10");

    // One probe plus one forwarded request.
    assert_eq!(upstream.hits(), 2);
    assert!(gateway.trigger_rx.try_recv().is_err(), "healthy traffic never wakes the selector");
}

#[tokio::test]
async fn test_relays_upstream_response_verbatim() {
    let upstream = MockUpstream::start(UpstreamBehavior::Block(1)).await;
    let gateway = Gateway::spawn(vec![upstream.url()]).await;
    gateway.selector.run_once().await;

    upstream.set_behavior(UpstreamBehavior::Status(418));
    let response = gateway.post(fixtures::block_number_request()).await;
    assert_eq!(response.status(), 418, "non-429 statuses pass through unchanged");
}

#[tokio::test]
async fn test_substitutes_upstream_path_and_keeps_query() {
    let upstream = MockUpstream::start(UpstreamBehavior::Block(1)).await;
    let gateway = Gateway::spawn(vec![upstream.url()]).await;
    gateway.selector.run_once().await;

    let client = reqwest::Client::new();
    client
        .post(format!("{}some/client/path?trace=1", gateway.url()))
        .header("x-api-key", "secret")
        .body("payload")
        .send()
        .await
        .unwrap();

    let captured = upstream.last_request().unwrap();
    // The upstream's own path replaces the incoming one; the query survives.
    assert_eq!(captured.uri, "/?trace=1");
    assert_eq!(captured.body, "payload");
    assert!(
        captured.headers.iter().any(|(name, value)| name == "x-api-key" && value == "secret"),
        "request headers are preserved"
    );
    let host = captured.headers.iter().find(|(name, _)| name == "host").unwrap();
    assert_eq!(host.1, upstream.addr().to_string(), "Host is rewritten to the upstream");
}

#[tokio::test]
async fn test_throttled_upstream_flagged_and_replaced() {
    let a = MockUpstream::start(UpstreamBehavior::Block(100)).await;
    let b = MockUpstream::start(UpstreamBehavior::Block(100)).await;
    // Make A the clear latency winner so the first pass publishes it.
    b.set_delay(Duration::from_millis(50));

    let mut gateway = Gateway::spawn(vec![a.url(), b.url()]).await;
    gateway.selector.run_once().await;
    assert!(Arc::ptr_eq(&gateway.best.get().await, &gateway.pool.endpoints()[0]));

    // A starts throttling; the client still sees the 429.
    a.set_behavior(UpstreamBehavior::Status(429));
    let response = gateway.post(fixtures::block_number_request()).await;
    assert_eq!(response.status(), 429);

    let status = gateway.pool.endpoints()[0].snapshot().await;
    assert!(status.rate_limited);
    assert!(!status.reachable);
    let until = status.rate_limited_until.unwrap();
    assert!(until <= std::time::Instant::now() + BACKOFF);

    assert!(gateway.trigger_rx.try_recv().is_ok(), "throttling wakes the selector");

    // The next pass promotes B while A sits out its backoff.
    gateway.selector.run_once().await;
    assert!(Arc::ptr_eq(&gateway.best.get().await, &gateway.pool.endpoints()[1]));

    let hits_before = b.hits();
    let response = gateway.post(fixtures::block_number_request()).await;
    assert_eq!(response.status(), 200);
    assert!(b.hits() > hits_before, "traffic now flows to the replacement");
}

#[tokio::test]
async fn test_collapsed_pool_keeps_stale_best_and_surfaces_502() {
    let a = MockUpstream::start(UpstreamBehavior::Block(100)).await;
    let b = MockUpstream::start(UpstreamBehavior::Block(100)).await;
    let gateway = Gateway::spawn(vec![a.url(), b.url()]).await;
    gateway.selector.run_once().await;
    let published = gateway.best.get().await;

    a.stop();
    b.stop();
    gateway.selector.run_once().await;

    assert!(
        Arc::ptr_eq(&gateway.best.get().await, &published),
        "publisher retains the last known good endpoint"
    );

    let response = gateway.post(fixtures::block_number_request()).await;
    assert_eq!(response.status(), 502, "upstream transport failure surfaces as Bad Gateway");
}

#[tokio::test]
async fn test_forwards_arbitrary_methods() {
    let upstream = MockUpstream::start(UpstreamBehavior::Block(1)).await;
    let gateway = Gateway::spawn(vec![upstream.url()]).await;
    gateway.selector.run_once().await;

    let client = reqwest::Client::new();
    let response = client.get(format!("{}health", gateway.url())).send().await.unwrap();
    assert_eq!(response.status(), 200);

    let captured = upstream.last_request().unwrap();
    assert_eq!(captured.method, "GET");
}
