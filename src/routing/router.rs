//! # Router Module
//!
//! The route table is an ordered, immutable list of route definitions built once at
//! startup. Matching walks the list in declaration order and the first predicate
//! that accepts the request path wins, so overlapping predicates are resolved by
//! the order they were declared in.
//!
//! ## Predicate grammar
//!
//! Predicates are `/`-separated patterns in the style of `/api/missions/**`:
//!
//! - a literal segment matches itself
//! - `*` matches exactly one non-empty segment
//! - `**` matches zero or more trailing segments and may only appear last
//!
//! A trailing slash on the request path is ignored and the query string never
//! takes part in matching.
//!
//! Request paths go through [`normalize_path`] first. Backends resolve `..` and
//! percent-encoded dots on their own, so a path containing them could match one
//! predicate here and reach a different resource upstream; such paths are
//! refused instead.

use crate::core::config::RouteConfig;
use crate::core::error::{GatewayError, GatewayResult};
use axum::http::uri::{Authority, Scheme};
use axum::http::Uri;
use serde::{Serialize, Serializer};
use std::fmt;
use std::sync::Arc;

/// One segment of a compiled path predicate
#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Single,
    Rest,
}

/// Compiled path predicate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathPredicate {
    pattern: String,
    segments: Vec<Segment>,
}

impl PathPredicate {
    /// Compile a predicate pattern
    pub fn parse(pattern: &str) -> GatewayResult<Self> {
        if !pattern.starts_with('/') {
            return Err(GatewayError::config(format!(
                "Route predicate '{}' must start with '/'",
                pattern
            )));
        }

        let raw: Vec<&str> = pattern
            .trim_end_matches('/')
            .split('/')
            .skip(1)
            .collect();

        let mut segments = Vec::with_capacity(raw.len());
        for (index, segment) in raw.iter().enumerate() {
            let compiled = match *segment {
                "**" if index + 1 == raw.len() => Segment::Rest,
                "**" => {
                    return Err(GatewayError::config(format!(
                        "Route predicate '{}' may only use '**' as its last segment",
                        pattern
                    )))
                }
                "*" => Segment::Single,
                "" => {
                    return Err(GatewayError::config(format!(
                        "Route predicate '{}' contains an empty segment",
                        pattern
                    )))
                }
                literal => Segment::Literal(literal.to_string()),
            };
            segments.push(compiled);
        }

        Ok(Self {
            pattern: pattern.to_string(),
            segments,
        })
    }

    /// Check whether the predicate accepts the given request path
    pub fn matches(&self, path: &str) -> bool {
        let mut path_segments = path.trim_end_matches('/').split('/').skip(1);

        for segment in &self.segments {
            match segment {
                Segment::Rest => return true,
                Segment::Single => match path_segments.next() {
                    Some(value) if !value.is_empty() => {}
                    _ => return false,
                },
                Segment::Literal(literal) => match path_segments.next() {
                    Some(value) if value == literal => {}
                    _ => return false,
                },
            }
        }

        path_segments.next().is_none()
    }

    /// The pattern the predicate was compiled from
    pub fn as_str(&self) -> &str {
        &self.pattern
    }
}

impl fmt::Display for PathPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.pattern)
    }
}

impl Serialize for PathPredicate {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.pattern)
    }
}

/// A single routing rule: predicate plus backend base URI
#[derive(Debug, Clone, Serialize)]
pub struct RouteDefinition {
    /// Unique route identifier (e.g. "auth", "mission")
    pub id: String,

    /// Path predicate evaluated against the request path
    pub predicate: PathPredicate,

    /// Backend base URI exactly as configured (scheme, host and port)
    pub uri: String,

    #[serde(skip)]
    scheme: Scheme,

    #[serde(skip)]
    authority: Authority,
}

impl RouteDefinition {
    /// Create a route definition, validating the predicate and target URI
    pub fn new(id: &str, path: &str, uri: &str) -> GatewayResult<Self> {
        if id.trim().is_empty() {
            return Err(GatewayError::config("Route id cannot be empty"));
        }

        let predicate = PathPredicate::parse(path)?;
        let uri = uri.trim_end_matches('/').to_string();

        let parsed: Uri = uri.parse().map_err(|e| {
            GatewayError::config(format!("Route '{}' has invalid target URI '{}': {}", id, uri, e))
        })?;

        let parts = parsed.into_parts();
        let scheme = parts.scheme.ok_or_else(|| {
            GatewayError::config(format!("Route '{}' target URI '{}' has no scheme", id, uri))
        })?;
        let authority = parts.authority.ok_or_else(|| {
            GatewayError::config(format!("Route '{}' target URI '{}' has no host", id, uri))
        })?;

        if let Some(path_and_query) = parts.path_and_query {
            if path_and_query.as_str() != "/" && !path_and_query.as_str().is_empty() {
                return Err(GatewayError::config(format!(
                    "Route '{}' target URI '{}' must not carry a path or query",
                    id, uri
                )));
            }
        }

        Ok(Self {
            id: id.to_string(),
            predicate,
            uri,
            scheme,
            authority,
        })
    }

    /// Build the outbound URI: this route's authority with the request's path and query
    pub fn target_uri(&self, original: &Uri) -> GatewayResult<Uri> {
        let path_and_query = original
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/");

        Uri::builder()
            .scheme(self.scheme.clone())
            .authority(self.authority.clone())
            .path_and_query(path_and_query)
            .build()
            .map_err(|e| {
                GatewayError::internal(format!(
                    "Failed to build upstream URI for route '{}': {}",
                    self.id, e
                ))
            })
    }
}

/// Percent-decode a request path for matching
///
/// Fails with `BadRequest` when the path is not valid UTF-8 once decoded, carries
/// an encoded separator, contains a backslash, or has a `.` or `..` segment.
pub fn normalize_path(raw: &str) -> GatewayResult<String> {
    let lowered = raw.to_ascii_lowercase();
    if lowered.contains("%2f") || lowered.contains("%5c") {
        return Err(GatewayError::bad_request(format!(
            "Encoded path separator in request path: {}",
            raw
        )));
    }

    let decoded = urlencoding::decode(raw).map_err(|_| {
        GatewayError::bad_request(format!("Request path is not valid UTF-8: {}", raw))
    })?;

    if !decoded.starts_with('/') || decoded.contains('\\') {
        return Err(GatewayError::bad_request(format!("Malformed request path: {}", raw)));
    }

    if decoded.split('/').any(|segment| segment == "." || segment == "..") {
        return Err(GatewayError::bad_request(format!(
            "Dot segment in request path: {}",
            raw
        )));
    }

    Ok(decoded.into_owned())
}

/// Ordered, immutable route table shared read-only by every request
#[derive(Debug, Clone)]
pub struct RouteTable {
    routes: Vec<Arc<RouteDefinition>>,
}

impl RouteTable {
    /// Build the table from configuration, preserving declaration order
    pub fn from_config(routes: &[RouteConfig]) -> GatewayResult<Self> {
        let mut builder = RouteTableBuilder::new();
        for route in routes {
            builder = builder.route(&route.id, &route.path, &route.uri);
        }
        builder.build()
    }

    /// Match a request path to the first route whose predicate accepts it
    pub fn match_path(&self, path: &str) -> GatewayResult<Arc<RouteDefinition>> {
        if path.is_empty() || !path.starts_with('/') {
            return Err(GatewayError::route_not_found(path));
        }

        self.routes
            .iter()
            .find(|route| route.predicate.matches(path))
            .cloned()
            .ok_or_else(|| GatewayError::route_not_found(path))
    }

    /// All configured routes in declaration order
    pub fn routes(&self) -> &[Arc<RouteDefinition>] {
        &self.routes
    }

    /// Look up a route by id
    pub fn get(&self, id: &str) -> Option<Arc<RouteDefinition>> {
        self.routes.iter().find(|route| route.id == id).cloned()
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

/// Builder for creating route tables with a fluent API
///
/// Problems are collected while routes are added and reported together by
/// [`RouteTableBuilder::build`].
#[derive(Default)]
pub struct RouteTableBuilder {
    routes: Vec<Arc<RouteDefinition>>,
    errors: Vec<String>,
}

impl RouteTableBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a route; declaration order is match order
    pub fn route(mut self, id: &str, path: &str, uri: &str) -> Self {
        if self.routes.iter().any(|route| route.id == id) {
            self.errors.push(format!("Duplicate route id '{}'", id));
            return self;
        }

        match RouteDefinition::new(id, path, uri) {
            Ok(route) => self.routes.push(Arc::new(route)),
            Err(GatewayError::Configuration { message }) => self.errors.push(message),
            Err(e) => self.errors.push(e.to_string()),
        }
        self
    }

    /// Build the route table
    pub fn build(self) -> GatewayResult<RouteTable> {
        if !self.errors.is_empty() {
            return Err(GatewayError::config(format!(
                "Invalid route table:\n{}",
                self.errors.join("\n")
            )));
        }

        if self.routes.is_empty() {
            return Err(GatewayError::config("Route table must contain at least one route"));
        }

        Ok(RouteTable {
            routes: self.routes,
        })
    }
}
