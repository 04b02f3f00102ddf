//! # HTTP Forwarding Proxy
//!
//! Sends a routed request to its backend and streams the answer back.
//!
//! Only the authority of the request URI is rewritten; method, path, query,
//! headers (minus hop-by-hop ones) and body are passed through. Request and
//! response bodies are streamed, never buffered. Connection failures become
//! 502 and a backend that does not produce response headers within the
//! response timeout becomes 504. Whatever status the backend returns is
//! relayed verbatim.
//!
//! Dropping the future returned by [`ForwardingProxy::forward`] (for instance
//! when the client disconnects) aborts the backend call and releases its
//! connection.

use axum::body::Body;
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, Request};
use axum::response::Response;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, instrument, warn};

pub use crate::core::config::ProxyConfig;
use crate::core::error::{GatewayError, GatewayResult};
use crate::core::types::{RequestContext, REQUEST_ID_HEADER};
use crate::routing::router::RouteDefinition;

/// Headers that describe a single connection and must not be forwarded
const HOP_BY_HOP_HEADERS: [HeaderName; 8] = [
    header::CONNECTION,
    HeaderName::from_static("keep-alive"),
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
];

/// Verified token subject forwarded to backends
pub const AUTH_SUBJECT_HEADER: &str = "x-auth-subject";

/// Enterprise claim forwarded to backends
pub const ENTERPRISE_ID_HEADER: &str = "x-enterprise-id";

const X_FORWARDED_FOR: &str = "x-forwarded-for";
const X_FORWARDED_PROTO: &str = "x-forwarded-proto";
const X_FORWARDED_HOST: &str = "x-forwarded-host";

/// Pooled HTTP client that forwards routed requests to backends
#[derive(Clone)]
pub struct ForwardingProxy {
    client: Client<HttpConnector, Body>,
    response_timeout: Duration,
    add_forwarded_headers: bool,
    propagate_identity: bool,
}

impl std::fmt::Debug for ForwardingProxy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ForwardingProxy")
            .field("response_timeout", &self.response_timeout)
            .field("add_forwarded_headers", &self.add_forwarded_headers)
            .field("propagate_identity", &self.propagate_identity)
            .finish_non_exhaustive()
    }
}

impl ForwardingProxy {
    /// Create a proxy with its own connection pool
    pub fn new(config: &ProxyConfig) -> Self {
        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(Some(config.connect_timeout));
        connector.set_nodelay(true);

        let client = Client::builder(TokioExecutor::new())
            .pool_idle_timeout(config.pool_idle_timeout)
            .pool_max_idle_per_host(config.pool_max_idle_per_host)
            .build(connector);

        Self {
            client,
            response_timeout: config.response_timeout,
            add_forwarded_headers: config.add_forwarded_headers,
            propagate_identity: false,
        }
    }

    /// Forward verified identity as `x-auth-subject` / `x-enterprise-id`
    pub fn with_identity_propagation(mut self, enabled: bool) -> Self {
        self.propagate_identity = enabled;
        self
    }

    /// Send the request held by `ctx` to `route` and return the backend's response
    ///
    /// The request body is moved out of the context and streamed upstream.
    #[instrument(skip_all, fields(route = %route.id, request_id = %ctx.request_id))]
    pub async fn forward(
        &self,
        ctx: &mut RequestContext,
        route: &RouteDefinition,
    ) -> GatewayResult<Response> {
        let outbound = self.build_outbound_request(ctx, route)?;

        debug!(
            method = %outbound.method(),
            upstream = %outbound.uri(),
            "Forwarding request to backend"
        );

        let result = timeout(self.response_timeout, self.client.request(outbound)).await;

        let response = match result {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                let reason = if e.is_connect() {
                    format!("failed to connect to {}: {}", route.uri, e)
                } else {
                    format!("backend request failed: {}", e)
                };
                warn!(error = %e, upstream = %route.uri, "Backend unreachable");
                return Err(GatewayError::bad_gateway(&route.id, reason));
            }
            Err(_) => {
                warn!(
                    upstream = %route.uri,
                    timeout_ms = self.response_timeout.as_millis() as u64,
                    "Backend did not respond in time"
                );
                return Err(GatewayError::GatewayTimeout {
                    route: route.id.clone(),
                    timeout_ms: self.response_timeout.as_millis() as u64,
                });
            }
        };

        ctx.response_status = Some(response.status());

        let (mut parts, body) = response.into_parts();
        strip_hop_by_hop_headers(&mut parts.headers);

        Ok(Response::from_parts(parts, Body::new(body)))
    }

    fn build_outbound_request(
        &self,
        ctx: &mut RequestContext,
        route: &RouteDefinition,
    ) -> GatewayResult<Request<Body>> {
        let uri = route.target_uri(ctx.request.uri())?;

        let mut headers = ctx.request.headers().clone();
        let original_host = headers.remove(header::HOST);
        strip_hop_by_hop_headers(&mut headers);

        headers.remove(AUTH_SUBJECT_HEADER);
        headers.remove(ENTERPRISE_ID_HEADER);

        if self.propagate_identity {
            if let Some(claims) = &ctx.claims {
                if let Ok(subject) = HeaderValue::from_str(claims.subject()) {
                    headers.insert(AUTH_SUBJECT_HEADER, subject);
                }
                if let Some(enterprise) = claims
                    .enterprise_id()
                    .and_then(|id| HeaderValue::from_str(&id).ok())
                {
                    headers.insert(ENTERPRISE_ID_HEADER, enterprise);
                }
            }
        }

        if self.add_forwarded_headers {
            add_forwarded_headers(&mut headers, ctx.client_addr, original_host);
        }

        if let Ok(request_id) = HeaderValue::from_str(&ctx.request_id) {
            headers.insert(REQUEST_ID_HEADER, request_id);
        }

        let body = std::mem::take(ctx.request.body_mut());

        let mut outbound = Request::builder()
            .method(ctx.request.method().clone())
            .uri(uri)
            .version(axum::http::Version::HTTP_11)
            .body(body)
            .map_err(|e| GatewayError::internal(format!("Failed to build upstream request: {}", e)))?;
        *outbound.headers_mut() = headers;

        Ok(outbound)
    }
}

/// Remove hop-by-hop headers, including any named in `Connection`
pub fn strip_hop_by_hop_headers(headers: &mut HeaderMap) {
    let listed: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();

    for name in listed.iter().chain(HOP_BY_HOP_HEADERS.iter()) {
        headers.remove(name);
    }
}

fn add_forwarded_headers(
    headers: &mut HeaderMap,
    client_addr: Option<SocketAddr>,
    original_host: Option<HeaderValue>,
) {
    if let Some(addr) = client_addr {
        let client_ip = addr.ip().to_string();
        let value = match headers.get(X_FORWARDED_FOR).and_then(|v| v.to_str().ok()) {
            Some(existing) => format!("{}, {}", existing, client_ip),
            None => client_ip,
        };
        if let Ok(value) = HeaderValue::from_str(&value) {
            headers.insert(X_FORWARDED_FOR, value);
        }
    }

    if !headers.contains_key(X_FORWARDED_PROTO) {
        headers.insert(X_FORWARDED_PROTO, HeaderValue::from_static("http"));
    }

    if let Some(host) = original_host {
        if !headers.contains_key(X_FORWARDED_HOST) {
            headers.insert(X_FORWARDED_HOST, host);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::providers::TokenClaims;
    use axum::http::StatusCode;
    use std::collections::HashMap;
    use std::sync::Arc;

    fn context(request: Request<Body>) -> RequestContext {
        RequestContext::new(request, Some("10.1.2.3:50000".parse().unwrap()))
    }

    fn route(uri: &str) -> RouteDefinition {
        RouteDefinition::new("mission", "/api/missions/**", uri).unwrap()
    }

    #[test]
    fn test_strip_hop_by_hop_headers() {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive, x-session-hint"));
        headers.insert("keep-alive", HeaderValue::from_static("timeout=5"));
        headers.insert("x-session-hint", HeaderValue::from_static("abc"));
        headers.insert(header::TRANSFER_ENCODING, HeaderValue::from_static("chunked"));
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));

        strip_hop_by_hop_headers(&mut headers);

        assert_eq!(headers.len(), 1);
        assert!(headers.contains_key(header::CONTENT_TYPE));
    }

    #[test]
    fn test_outbound_request_rewrites_authority_only() {
        let proxy = ForwardingProxy::new(&ProxyConfig::default());
        let request = Request::builder()
            .method("PUT")
            .uri("/api/missions/7/launch?dry_run=true")
            .header(header::HOST, "gateway.local:8080")
            .header(header::AUTHORIZATION, "Bearer token")
            .body(Body::from("{}"))
            .unwrap();
        let mut ctx = context(request);

        let outbound = proxy
            .build_outbound_request(&mut ctx, &route("http://localhost:8083"))
            .unwrap();

        assert_eq!(outbound.method(), "PUT");
        assert_eq!(
            outbound.uri().to_string(),
            "http://localhost:8083/api/missions/7/launch?dry_run=true"
        );
        assert!(outbound.headers().get(header::HOST).is_none());
        assert_eq!(outbound.headers()[header::AUTHORIZATION], "Bearer token");
        assert_eq!(outbound.headers()[X_FORWARDED_HOST], "gateway.local:8080");
        assert_eq!(outbound.headers()[X_FORWARDED_FOR], "10.1.2.3");
        assert_eq!(outbound.headers()[X_FORWARDED_PROTO], "http");
        assert_eq!(outbound.headers()[REQUEST_ID_HEADER], ctx.request_id.as_str());
    }

    #[test]
    fn test_identity_headers_replace_client_copies() {
        let proxy = ForwardingProxy::new(&ProxyConfig::default()).with_identity_propagation(true);
        let request = Request::builder()
            .uri("/api/missions")
            .header(AUTH_SUBJECT_HEADER, "spoofed-admin")
            .header(ENTERPRISE_ID_HEADER, "999")
            .body(Body::empty())
            .unwrap();
        let mut ctx = context(request);
        ctx.claims = Some(TokenClaims {
            sub: "operator-7".to_string(),
            iat: None,
            exp: i64::MAX,
            extra: HashMap::from([("enterpriseId".to_string(), serde_json::json!(3))]),
        });

        let outbound = proxy
            .build_outbound_request(&mut ctx, &route("http://localhost:8083"))
            .unwrap();

        assert_eq!(outbound.headers()[AUTH_SUBJECT_HEADER], "operator-7");
        assert_eq!(outbound.headers()[ENTERPRISE_ID_HEADER], "3");
    }

    #[test]
    fn test_client_identity_headers_stripped_without_claims() {
        let proxy = ForwardingProxy::new(&ProxyConfig::default()).with_identity_propagation(true);
        let request = Request::builder()
            .uri("/api/auth/signin")
            .header(AUTH_SUBJECT_HEADER, "spoofed-admin")
            .body(Body::empty())
            .unwrap();
        let mut ctx = context(request);

        let outbound = proxy
            .build_outbound_request(&mut ctx, &route("http://localhost:8081"))
            .unwrap();

        assert!(outbound.headers().get(AUTH_SUBJECT_HEADER).is_none());
    }

    #[tokio::test]
    async fn test_refused_connection_is_bad_gateway() {
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let proxy = ForwardingProxy::new(&ProxyConfig::default());
        let request = Request::builder().uri("/api/missions").body(Body::empty()).unwrap();
        let mut ctx = context(request);
        let route = Arc::new(route(&format!("http://127.0.0.1:{}", port)));

        let err = proxy.forward(&mut ctx, &route).await.unwrap_err();

        assert!(matches!(err, GatewayError::BadGateway { .. }));
        assert_eq!(err.status_code(), StatusCode::BAD_GATEWAY);
        assert!(ctx.response_status.is_none());
    }
}
