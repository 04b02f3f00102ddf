//! # CORS Policy
//!
//! One global policy applies to every route. The policy never blocks a request
//! on its own: it decides which `Access-Control-*` headers a response gets, and
//! the browser enforces the result. `OPTIONS` requests are preflights and are
//! answered here without reaching authentication, routing or a backend.

use axum::body::Body;
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use axum::response::Response;
use serde::{Deserialize, Serialize};

use crate::core::error::{GatewayError, GatewayResult};

/// CORS configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CorsConfig {
    /// Allowed origins (use "*" for any origin)
    pub allowed_origins: Vec<String>,

    /// Allowed methods
    pub allowed_methods: Vec<String>,

    /// Allowed request headers ("*" echoes whatever the preflight asks for)
    pub allowed_headers: Vec<String>,

    /// Response headers exposed to scripts
    pub exposed_headers: Vec<String>,

    /// Allow credentials
    pub allow_credentials: bool,

    /// Max age for preflight results (seconds)
    pub max_age: u32,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: vec!["http://localhost:3000".to_string()],
            allowed_methods: vec![
                "GET".to_string(),
                "POST".to_string(),
                "PUT".to_string(),
                "DELETE".to_string(),
                "PATCH".to_string(),
                "OPTIONS".to_string(),
            ],
            allowed_headers: vec!["*".to_string()],
            exposed_headers: Vec::new(),
            allow_credentials: true,
            max_age: 3600,
        }
    }
}

/// Outcome of evaluating one request against the policy
#[derive(Debug, Clone)]
pub struct CorsDecision {
    /// Whether the origin (and, for preflights, the requested method) is permitted
    pub allow: bool,

    /// Whether this request is a preflight that ends the pipeline
    pub preflight: bool,

    /// Headers to attach to the eventual response
    pub headers: HeaderMap,
}

impl CorsDecision {
    /// Copy the decision's headers onto a response
    ///
    /// Every `Access-Control-*` header already present (set by a backend) is
    /// removed first, so the response carries the gateway's decision and nothing else.
    pub fn apply_to(&self, target: &mut HeaderMap) {
        let upstream: Vec<HeaderName> = target
            .keys()
            .filter(|name| name.as_str().starts_with("access-control-"))
            .cloned()
            .collect();
        for name in upstream {
            target.remove(name);
        }

        for (name, value) in self.headers.iter() {
            if *name == header::VARY {
                target.append(name.clone(), value.clone());
            } else {
                target.insert(name.clone(), value.clone());
            }
        }
    }
}

/// Compiled, immutable CORS policy shared by every request
#[derive(Debug, Clone)]
pub struct CorsPolicy {
    any_origin: bool,
    origins: Vec<String>,
    methods: Vec<Method>,
    methods_value: HeaderValue,
    any_header: bool,
    headers_value: Option<HeaderValue>,
    exposed_value: Option<HeaderValue>,
    allow_credentials: bool,
    max_age: HeaderValue,
}

impl CorsPolicy {
    /// Compile the policy, rejecting unparseable methods or header names
    pub fn new(config: &CorsConfig) -> GatewayResult<Self> {
        let methods = config
            .allowed_methods
            .iter()
            .map(|m| {
                m.to_uppercase()
                    .parse::<Method>()
                    .map_err(|e| GatewayError::config(format!("Invalid CORS method '{}': {}", m, e)))
            })
            .collect::<GatewayResult<Vec<_>>>()?;

        let any_header = config.allowed_headers.iter().any(|h| h == "*");
        let headers_value = if any_header {
            None
        } else {
            join_header_names(&config.allowed_headers)?
        };

        Ok(Self {
            any_origin: config.allowed_origins.iter().any(|o| o == "*"),
            origins: config.allowed_origins.clone(),
            methods_value: join_values(methods.iter().map(|m| m.as_str()))?,
            methods,
            any_header,
            headers_value,
            exposed_value: join_header_names(&config.exposed_headers)?,
            allow_credentials: config.allow_credentials,
            max_age: HeaderValue::from(config.max_age),
        })
    }

    /// Evaluate a request's origin, method and requested headers
    ///
    /// An `OPTIONS` method marks the request as a preflight. Requests without an
    /// origin are same-origin and get no CORS headers.
    pub fn evaluate(
        &self,
        origin: Option<&str>,
        method: &Method,
        requested_headers: Option<&str>,
    ) -> CorsDecision {
        let preflight = *method == Method::OPTIONS;
        let mut headers = HeaderMap::new();

        let Some(origin) = origin else {
            return CorsDecision { allow: true, preflight, headers };
        };

        let origin_value = match HeaderValue::from_str(origin) {
            Ok(value) if self.is_origin_allowed(origin) => value,
            _ => return CorsDecision { allow: false, preflight, headers },
        };

        if self.any_origin && !self.allow_credentials {
            headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
        } else {
            headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, origin_value);
            headers.insert(header::VARY, HeaderValue::from_static("Origin"));
        }

        headers.insert(header::ACCESS_CONTROL_ALLOW_METHODS, self.methods_value.clone());

        let allow_headers = if self.any_header {
            requested_headers
                .filter(|h| !h.trim().is_empty())
                .and_then(|h| HeaderValue::from_str(h).ok())
                .or_else(|| Some(HeaderValue::from_static("*")))
        } else {
            self.headers_value.clone()
        };
        if let Some(value) = allow_headers {
            headers.insert(header::ACCESS_CONTROL_ALLOW_HEADERS, value);
        }

        if self.allow_credentials {
            headers.insert(header::ACCESS_CONTROL_ALLOW_CREDENTIALS, HeaderValue::from_static("true"));
        }

        if let Some(exposed) = &self.exposed_value {
            headers.insert(header::ACCESS_CONTROL_EXPOSE_HEADERS, exposed.clone());
        }

        if preflight {
            headers.insert(header::ACCESS_CONTROL_MAX_AGE, self.max_age.clone());
        }

        CorsDecision { allow: true, preflight, headers }
    }

    /// Evaluate straight from request headers
    ///
    /// For preflights the `Access-Control-Request-Method` must be an allowed
    /// method, otherwise the grant headers are withheld.
    pub fn evaluate_request(&self, method: &Method, request_headers: &HeaderMap) -> CorsDecision {
        let origin = request_headers
            .get(header::ORIGIN)
            .and_then(|v| v.to_str().ok());
        let requested_headers = request_headers
            .get(header::ACCESS_CONTROL_REQUEST_HEADERS)
            .and_then(|v| v.to_str().ok());

        let decision = self.evaluate(origin, method, requested_headers);

        if decision.preflight && decision.allow && origin.is_some() {
            let requested_method = request_headers
                .get(header::ACCESS_CONTROL_REQUEST_METHOD)
                .and_then(|v| v.to_str().ok())
                .and_then(|m| m.parse::<Method>().ok());

            if let Some(requested_method) = requested_method {
                if !self.methods.contains(&requested_method) {
                    return CorsDecision {
                        allow: false,
                        preflight: true,
                        headers: HeaderMap::new(),
                    };
                }
            }
        }

        decision
    }

    /// Terminal response for a preflight request
    pub fn preflight_response(&self, decision: &CorsDecision) -> Response {
        let mut response = Response::new(Body::empty());
        *response.status_mut() = StatusCode::OK;
        decision.apply_to(response.headers_mut());
        response
    }

    fn is_origin_allowed(&self, origin: &str) -> bool {
        self.any_origin || self.origins.iter().any(|allowed| allowed == origin)
    }
}

fn join_values<'a>(values: impl Iterator<Item = &'a str>) -> GatewayResult<HeaderValue> {
    let joined = values.collect::<Vec<_>>().join(", ");
    HeaderValue::from_str(&joined)
        .map_err(|e| GatewayError::config(format!("Invalid CORS header value '{}': {}", joined, e)))
}

fn join_header_names(names: &[String]) -> GatewayResult<Option<HeaderValue>> {
    if names.is_empty() {
        return Ok(None);
    }

    for name in names {
        HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| GatewayError::config(format!("Invalid CORS header name '{}': {}", name, e)))?;
    }

    join_values(names.iter().map(String::as_str)).map(Some)
}
