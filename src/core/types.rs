//! # Core Types Module
//!
//! Per-request state carried through the gateway pipeline.
//!
//! A [`RequestContext`] is created when a request arrives and is owned by the
//! task handling that request alone. Shared, read-only state (route table, CORS
//! policy, token verifier) lives in the pipeline, never in the context.

use axum::body::Body;
use axum::http::{HeaderMap, Method, Request, StatusCode};
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use uuid::Uuid;

use crate::auth::providers::{AuthError, TokenClaims};
use crate::routing::router::RouteDefinition;

/// Header used to correlate a request across the gateway and its backends
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Where a request currently is in the pipeline
///
/// Transitions only ever move forward; any stage may jump to `Terminal`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    Received,
    CorsEvaluated,
    /// `OPTIONS` preflight answered by the CORS stage
    PreflightShortCircuit,
    Authenticated,
    /// Public path, token not checked
    Exempt,
    RouteMatched,
    Forwarded,
    Terminal,
}

impl PipelineStage {
    fn rank(self) -> u8 {
        match self {
            Self::Received => 0,
            Self::CorsEvaluated => 1,
            Self::PreflightShortCircuit => 2,
            Self::Authenticated | Self::Exempt => 2,
            Self::RouteMatched => 3,
            Self::Forwarded => 4,
            Self::Terminal => 5,
        }
    }

    /// Whether moving from `self` to `next` is a legal forward transition
    pub fn can_advance_to(self, next: PipelineStage) -> bool {
        match (self, next) {
            (Self::Terminal, _) => false,
            (Self::PreflightShortCircuit, next) => next == Self::Terminal,
            (_, Self::Terminal) => true,
            (current, next) => next.rank() == current.rank() + 1,
        }
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Received => "received",
            Self::CorsEvaluated => "cors_evaluated",
            Self::PreflightShortCircuit => "preflight_short_circuit",
            Self::Authenticated => "authenticated",
            Self::Exempt => "exempt",
            Self::RouteMatched => "route_matched",
            Self::Forwarded => "forwarded",
            Self::Terminal => "terminal",
        };
        f.write_str(name)
    }
}

/// Per-request state flowing through the pipeline
#[derive(Debug)]
pub struct RequestContext {
    /// Correlation id, taken from the client's `x-request-id` or generated
    pub request_id: String,

    /// Peer address of the client connection, when known
    pub client_addr: Option<SocketAddr>,

    /// The inbound request; its body is streamed straight to the backend
    pub request: Request<Body>,

    /// Route chosen by the route table
    pub route: Option<Arc<RouteDefinition>>,

    /// Verified token claims on protected paths
    pub claims: Option<TokenClaims>,

    /// Why authentication failed, when it did
    pub auth_failure: Option<AuthError>,

    /// Status relayed from the backend, once known
    pub response_status: Option<StatusCode>,

    stage: PipelineStage,
    start_time: Instant,
}

impl RequestContext {
    /// Create a context for a freshly received request
    pub fn new(request: Request<Body>, client_addr: Option<SocketAddr>) -> Self {
        let request_id = request
            .headers()
            .get(REQUEST_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.trim().is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        Self {
            request_id,
            client_addr,
            request,
            route: None,
            claims: None,
            auth_failure: None,
            response_status: None,
            stage: PipelineStage::Received,
            start_time: Instant::now(),
        }
    }

    pub fn method(&self) -> &Method {
        self.request.method()
    }

    pub fn path(&self) -> &str {
        self.request.uri().path()
    }

    pub fn headers(&self) -> &HeaderMap {
        self.request.headers()
    }

    pub fn stage(&self) -> PipelineStage {
        self.stage
    }

    /// Get elapsed time since the request arrived
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Move to the next pipeline stage
    ///
    /// Illegal transitions are logged and ignored so a bug in stage
    /// bookkeeping can never fail a request.
    pub fn advance(&mut self, next: PipelineStage) {
        if self.stage.can_advance_to(next) {
            tracing::debug!(from = %self.stage, to = %next, "Pipeline stage transition");
            self.stage = next;
        } else {
            tracing::error!(from = %self.stage, to = %next, "Illegal pipeline stage transition");
        }
    }

    /// Set matched route
    pub fn set_route(&mut self, route: Arc<RouteDefinition>) {
        self.route = Some(route);
    }

    /// Route id for logs and metrics, `"none"` before a match
    pub fn route_id(&self) -> &str {
        self.route.as_deref().map(|r| r.id.as_str()).unwrap_or("none")
    }
}
