//! The proxy frontend.
//!
//! Accepts any method on any path, forwards the request unchanged to the
//! currently published best upstream, and relays the upstream response
//! verbatim. A 429 from the upstream flags its record and wakes the selector;
//! a transport failure surfaces as 502. Requests are never replayed against a
//! different upstream: JSON-RPC payloads may be non-idempotent.

use std::{
    net::SocketAddr,
    sync::Arc,
    time::{Duration, Instant},
};

use axum::{
    Router,
    body::Body,
    extract::{ConnectInfo, Request, State},
    http::{HeaderMap, HeaderName, StatusCode, header},
    middleware::{self, Next},
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use tracing::{info, warn};
use turnout_pool::{CurrentBest, SelectorTrigger, record_rate_limit};
use turnout_types::RateLimitSource;

use crate::metrics::record_http_request;

/// Shared state of the proxy frontend.
#[derive(Debug)]
pub struct ProxyState {
    best: Arc<CurrentBest>,
    client: reqwest::Client,
    rate_limit_backoff: Duration,
    trigger: SelectorTrigger,
}

impl ProxyState {
    /// Create the proxy state.
    ///
    /// The client should carry the configured per-upstream timeout; the
    /// backoff is applied to an endpoint's record when a forwarded request
    /// comes back with HTTP 429.
    #[must_use]
    pub const fn new(
        best: Arc<CurrentBest>,
        client: reqwest::Client,
        rate_limit_backoff: Duration,
        trigger: SelectorTrigger,
    ) -> Self {
        Self { best, client, rate_limit_backoff, trigger }
    }
}

/// Build the client-facing proxy router.
///
/// Every method and path falls through to the forwarding handler.
#[must_use]
pub fn proxy_router(state: Arc<ProxyState>) -> Router {
    Router::new()
        .fallback(proxy_handler)
        .layer(middleware::from_fn(trace_requests))
        .with_state(state)
}

/// Forward one request to the current best upstream.
async fn proxy_handler(State(state): State<Arc<ProxyState>>, request: Request) -> Response {
    let started = Instant::now();
    let upstream = state.best.get().await;
    let endpoint = upstream.url().as_str().to_string();

    let (parts, body) = request.into_parts();
    let method = parts.method.clone();
    let body = match axum::body::to_bytes(body, usize::MAX).await {
        Ok(body) => body,
        Err(err) => {
            warn!(error = %err, "failed to read request body");
            record_http_request(
                method.as_str(),
                StatusCode::BAD_GATEWAY.as_u16(),
                &endpoint,
                started.elapsed(),
            );
            return bad_gateway();
        }
    };

    // The upstream's scheme, host and path replace the incoming ones; the
    // incoming query string is carried over.
    let mut target = upstream.url().clone();
    target.set_query(parts.uri.query());

    let result = state
        .client
        .request(method.clone(), target)
        .headers(forward_headers(&parts.headers))
        .body(body)
        .send()
        .await;

    let upstream_response = match result {
        Ok(response) => response,
        Err(err) => {
            warn!(endpoint = %endpoint, error = %err, "proxy error");
            record_http_request(
                method.as_str(),
                StatusCode::BAD_GATEWAY.as_u16(),
                &endpoint,
                started.elapsed(),
            );
            return bad_gateway();
        }
    };

    let status = upstream_response.status();
    if status == StatusCode::TOO_MANY_REQUESTS {
        warn!(endpoint = %endpoint, "rate limit detected during forward");
        upstream.mark_rate_limited(state.rate_limit_backoff).await;
        record_rate_limit(&endpoint, RateLimitSource::Proxy);
        state.trigger.fire();
        // The 429 itself still goes back to the client; no re-dispatch.
    }

    let response_headers = upstream_response.headers().clone();
    let response_body = match upstream_response.bytes().await {
        Ok(body) => body,
        Err(err) => {
            warn!(endpoint = %endpoint, error = %err, "failed to read upstream response");
            record_http_request(
                method.as_str(),
                StatusCode::BAD_GATEWAY.as_u16(),
                &endpoint,
                started.elapsed(),
            );
            return bad_gateway();
        }
    };

    record_http_request(method.as_str(), status.as_u16(), &endpoint, started.elapsed());
    relay_response(status, &response_headers, response_body)
}

/// The client-visible response for upstream transport failures.
fn bad_gateway() -> Response {
    (StatusCode::BAD_GATEWAY, "Bad Gateway").into_response()
}

/// Rebuild the upstream response for the client, verbatim except hop-by-hop
/// and length-managed headers.
fn relay_response(status: StatusCode, headers: &HeaderMap, body: Bytes) -> Response {
    let mut response = Response::new(Body::from(body));
    *response.status_mut() = status;
    for (name, value) in headers {
        if name == header::CONTENT_LENGTH || is_hop_by_hop(name) {
            continue;
        }
        response.headers_mut().append(name.clone(), value.clone());
    }
    response
}

/// Copy request headers for the outbound request, dropping `Host` (the
/// client sets it from the upstream URL), the recomputed `Content-Length`,
/// and hop-by-hop headers.
fn forward_headers(incoming: &HeaderMap) -> HeaderMap {
    let mut outbound = HeaderMap::with_capacity(incoming.len());
    for (name, value) in incoming {
        if name == header::HOST || name == header::CONTENT_LENGTH || is_hop_by_hop(name) {
            continue;
        }
        outbound.append(name.clone(), value.clone());
    }
    outbound
}

/// Hop-by-hop headers that must not cross the proxy.
fn is_hop_by_hop(name: &HeaderName) -> bool {
    name == header::CONNECTION
        || name == header::PROXY_AUTHENTICATE
        || name == header::PROXY_AUTHORIZATION
        || name == header::TE
        || name == header::TRAILER
        || name == header::TRANSFER_ENCODING
        || name == header::UPGRADE
        || name.as_str() == "keep-alive"
}

/// Log every request with its client IP, status and duration.
async fn trace_requests(request: Request, next: Next) -> Response {
    let started = Instant::now();
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let client = client_ip(
        request.headers(),
        request.extensions().get::<ConnectInfo<SocketAddr>>().map(|info| info.0),
    );
    info!(client = %client, method = %method, path = %path, "received request");

    let response = next.run(request).await;

    info!(
        client = %client,
        method = %method,
        path = %path,
        status = response.status().as_u16(),
        elapsed = ?started.elapsed(),
        "request completed"
    );
    response
}

/// Best-effort client address: `X-Forwarded-For`, then `X-Real-IP`, then the
/// peer address.
fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    if let Some(forwarded) = headers.get("x-forwarded-for").and_then(|value| value.to_str().ok()) {
        if let Some(first) = forwarded.split(',').next() {
            let first = first.trim();
            if !first.is_empty() {
                return first.to_string();
            }
        }
    }
    if let Some(real_ip) = headers.get("x-real-ip").and_then(|value| value.to_str().ok()) {
        return real_ip.to_string();
    }
    peer.map_or_else(|| "unknown".to_string(), |addr| addr.ip().to_string())
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    #[test]
    fn test_client_ip_from_forwarded_for() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("192.168.1.1, 10.0.0.1"));
        assert_eq!(client_ip(&headers, None), "192.168.1.1");
    }

    #[test]
    fn test_client_ip_from_real_ip() {
        let mut headers = HeaderMap::new();
        headers.insert("x-real-ip", HeaderValue::from_static("10.1.2.3"));
        assert_eq!(client_ip(&headers, None), "10.1.2.3");
    }

    #[test]
    fn test_client_ip_falls_back_to_peer() {
        let headers = HeaderMap::new();
        let peer: SocketAddr = "127.0.0.1:55555".parse().unwrap();
        assert_eq!(client_ip(&headers, Some(peer)), "127.0.0.1");
        assert_eq!(client_ip(&headers, None), "unknown");
    }

    #[test]
    fn test_forward_headers_drops_host_and_hop_by_hop() {
        let mut headers = HeaderMap::new();
        headers.insert(header::HOST, HeaderValue::from_static("gateway.local"));
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from_static("5"));
        headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
        headers.insert(header::TRANSFER_ENCODING, HeaderValue::from_static("chunked"));
        headers.insert("x-api-key", HeaderValue::from_static("secret"));
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let outbound = forward_headers(&headers);
        assert!(outbound.get(header::HOST).is_none());
        assert!(outbound.get(header::CONTENT_LENGTH).is_none());
        assert!(outbound.get(header::CONNECTION).is_none());
        assert!(outbound.get(header::TRANSFER_ENCODING).is_none());
        assert_eq!(outbound.get("x-api-key").unwrap(), "secret");
        assert_eq!(outbound.get(header::CONTENT_TYPE).unwrap(), "application/json");
    }

    #[test]
    fn test_relay_response_keeps_status_and_headers() {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(header::CONNECTION, HeaderValue::from_static("close"));

        let response =
            relay_response(StatusCode::IM_A_TEAPOT, &headers, Bytes::from_static(b"{}"));
        assert_eq!(response.status(), StatusCode::IM_A_TEAPOT);
        assert_eq!(response.headers().get(header::CONTENT_TYPE).unwrap(), "application/json");
        assert!(response.headers().get(header::CONNECTION).is_none());
    }
}
