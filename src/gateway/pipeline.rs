//! # Gateway Pipeline
//!
//! Per-request control flow: CORS evaluation, authentication, route lookup and
//! forwarding, in that order and never backwards.
//!
//! ```text
//! Received -> CorsEvaluated -> PreflightShortCircuit -> Terminal
//!                           -> Authenticated | Exempt -> RouteMatched -> Forwarded -> Terminal
//! ```
//!
//! The authentication gate and the route table see the same percent-decoded
//! path; a path with dot segments or encoded separators is a 400 before either
//! runs. Any stage may end the request early: a rejected token is a 401 before route
//! lookup, an unmatched path is a 404, and backend failures are 502 or 504.
//! Every response, error or not, gets the CORS decision and an `x-request-id`.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::{header, HeaderValue, Request};
use axum::response::{IntoResponse, Response};
use tracing::{debug, info, instrument, warn, Span};

use crate::auth::middleware::{AuthGate, AuthOutcome};
use crate::core::config::GatewayConfig;
use crate::core::error::{GatewayError, GatewayResult};
use crate::core::types::{PipelineStage, RequestContext, REQUEST_ID_HEADER};
use crate::middleware::cors::CorsPolicy;
use crate::observability::metrics;
use crate::protocols::http::ForwardingProxy;
use crate::routing::router::{normalize_path, RouteTable};

/// Shared, immutable request pipeline
///
/// Cloning is cheap; every clone shares the same route table, policy,
/// verifier and connection pool.
#[derive(Debug, Clone)]
pub struct GatewayPipeline {
    routes: Arc<RouteTable>,
    cors: Arc<CorsPolicy>,
    auth: AuthGate,
    proxy: ForwardingProxy,
}

impl GatewayPipeline {
    /// Build every stage from configuration
    ///
    /// Fails before any request is served when the configuration does not
    /// validate, the CORS policy cannot be compiled or the JWT secret is empty.
    pub fn new(config: &GatewayConfig) -> GatewayResult<Self> {
        config.validate()?;
        let routes = RouteTable::from_config(&config.routes)?;
        let cors = CorsPolicy::new(&config.cors)?;
        let auth = AuthGate::new(&config.auth)?;
        let proxy = ForwardingProxy::new(&config.proxy)
            .with_identity_propagation(auth.propagate_identity());

        info!(
            routes = routes.len(),
            public_paths = config.auth.public_paths.len(),
            "Gateway pipeline initialized"
        );

        Ok(Self {
            routes: Arc::new(routes),
            cors: Arc::new(cors),
            auth,
            proxy,
        })
    }

    /// The route table, in declaration order
    pub fn routes(&self) -> &RouteTable {
        &self.routes
    }

    /// Run one request through every stage and produce its response
    #[instrument(
        name = "gateway_request",
        skip_all,
        fields(request_id = tracing::field::Empty, method = %request.method(), path = %request.uri().path())
    )]
    pub async fn handle(&self, request: Request<Body>) -> Response {
        let client_addr = request
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|info| info.0);

        let mut ctx = RequestContext::new(request, client_addr);
        Span::current().record("request_id", ctx.request_id.as_str());

        let cors = self.cors.evaluate_request(ctx.method(), ctx.headers());
        ctx.advance(PipelineStage::CorsEvaluated);

        let mut response = if cors.preflight {
            ctx.advance(PipelineStage::PreflightShortCircuit);
            debug!(allowed = cors.allow, "Answered CORS preflight");
            self.cors.preflight_response(&cors)
        } else {
            if !cors.allow {
                debug!("Origin not permitted, continuing without CORS headers");
            }

            let mut response = match self.process(&mut ctx).await {
                Ok(response) => response,
                Err(err) => err.into_response(),
            };
            cors.apply_to(response.headers_mut());
            response
        };

        ctx.advance(PipelineStage::Terminal);

        if let Ok(request_id) = HeaderValue::from_str(&ctx.request_id) {
            response.headers_mut().insert(REQUEST_ID_HEADER, request_id);
        }

        let status = response.status();
        metrics::record_request(ctx.route_id(), status.as_u16(), ctx.elapsed());

        info!(
            status = status.as_u16(),
            route = ctx.route_id(),
            elapsed_ms = ctx.elapsed().as_millis() as u64,
            "Request completed"
        );

        response
    }

    async fn process(&self, ctx: &mut RequestContext) -> GatewayResult<Response> {
        let path = normalize_path(ctx.path()).map_err(|err| {
            warn!(error = %err, "Refusing request path");
            err
        })?;

        let outcome = {
            let authorization = ctx
                .headers()
                .get(header::AUTHORIZATION)
                .and_then(|v| v.to_str().ok());
            self.auth.authenticate(&path, authorization)
        };

        match outcome {
            AuthOutcome::Authenticated(claims) => {
                debug!(subject = %claims.subject(), "Token verified");
                ctx.claims = Some(claims);
                ctx.advance(PipelineStage::Authenticated);
            }
            AuthOutcome::Exempt => {
                ctx.advance(PipelineStage::Exempt);
            }
            AuthOutcome::Rejected(reason) => {
                warn!(reason = reason.reason(), "Request rejected by authentication gate");
                metrics::record_auth_rejection(reason.reason());
                ctx.auth_failure = Some(reason.clone());
                return Err(GatewayError::Authentication(reason));
            }
        }

        let route = self.routes.match_path(&path).map_err(|err| {
            debug!("No route matches request path");
            err
        })?;
        ctx.set_route(route.clone());
        ctx.advance(PipelineStage::RouteMatched);

        let response = self.proxy.forward(ctx, &route).await?;
        ctx.advance(PipelineStage::Forwarded);

        Ok(response)
    }
}
