//! # Mission Gateway Library
//!
//! Edge gateway for the mission-control microservices. Every client request
//! enters here, is checked against the CORS policy, authenticated with a
//! shared-secret JWT unless its path is public, matched against an ordered
//! route table and streamed to the owning backend service.
//!
//! ```text
//! client -> CORS -> authentication gate -> route table -> forwarding proxy -> backend
//! ```
//!
//! The route table, CORS policy and token verifier are built once at startup
//! and shared read-only by every request; each request's state lives in its
//! own [`RequestContext`].

/// Error types, configuration and per-request context
pub mod core;

/// Request pipeline and the HTTP server that hosts it
pub mod gateway;

/// CORS policy evaluation
pub mod middleware;

/// Outbound HTTP forwarding to backend services
pub mod protocols;

/// Bearer token verification and the authentication gate
pub mod auth;

/// Ordered route table with path predicates
pub mod routing;

/// Structured logging and request metrics
pub mod observability;

pub use core::config::GatewayConfig;
pub use core::error::{GatewayError, GatewayResult};
pub use core::types::{PipelineStage, RequestContext};

pub use routing::router::{RouteDefinition, RouteTable};

pub use gateway::pipeline::GatewayPipeline;
pub use gateway::server::GatewayServer;
