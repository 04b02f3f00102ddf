//! # Configuration Module
//!
//! Loads the gateway configuration from YAML, applies environment variable
//! overrides and validates the result before anything is constructed.
//!
//! ## Key Features
//! - YAML parsing with serde, durations written as `"30s"` / `"500ms"`
//! - Environment variable overrides for container deployments
//! - Validation that reports every problem at once
//! - A built-in reference configuration with the six platform routes

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;
use url::Url;

use crate::core::error::{GatewayError, GatewayResult};
use crate::middleware::cors::CorsConfig;

/// Main gateway configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listener configuration
    pub server: ServerConfig,

    /// Ordered route list; declaration order is match order
    pub routes: Vec<RouteConfig>,

    /// Token verification and public paths
    pub auth: AuthSettings,

    /// Global CORS policy
    pub cors: CorsConfig,

    /// Upstream connection settings
    pub proxy: ProxyConfig,

    /// Logging and metrics
    pub observability: ObservabilityConfig,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            routes: reference_routes(),
            auth: AuthSettings::default(),
            cors: CorsConfig::default(),
            proxy: ProxyConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

/// The platform's six backend routes
fn reference_routes() -> Vec<RouteConfig> {
    [
        ("auth", "/api/auth/**", "http://localhost:8081"),
        ("entreprise", "/api/enterprise/**", "http://localhost:8082"),
        ("mission", "/api/missions/**", "http://localhost:8083"),
        ("spacecraft", "/api/spacecraft/**", "http://localhost:8084"),
        ("telemetry", "/api/telemetry/**", "http://localhost:8085"),
        ("dashboard", "/api/dashboard/**", "http://localhost:8086"),
    ]
    .into_iter()
    .map(|(id, path, uri)| RouteConfig {
        id: id.to_string(),
        path: path.to_string(),
        uri: uri.to_string(),
    })
    .collect()
}

impl GatewayConfig {
    /// Load configuration from a YAML file
    pub async fn load_from_file<P: AsRef<Path>>(path: P) -> GatewayResult<Self> {
        let content = tokio::fs::read_to_string(path).await
            .map_err(|e| GatewayError::config(format!("Failed to read config file: {}", e)))?;

        Self::from_yaml(&content)
    }

    /// Load the file when it exists, otherwise fall back to the reference configuration
    pub async fn load_or_default<P: AsRef<Path>>(path: P) -> GatewayResult<Self> {
        if tokio::fs::try_exists(path.as_ref()).await.unwrap_or(false) {
            Self::load_from_file(path).await
        } else {
            tracing::warn!(
                path = %path.as_ref().display(),
                "Configuration file not found, using reference configuration"
            );
            let mut config = Self::default();
            config.apply_env_overrides()?;
            config.validate()?;
            Ok(config)
        }
    }

    /// Parse, override and validate configuration from a YAML string
    pub fn from_yaml(content: &str) -> GatewayResult<Self> {
        let mut config: GatewayConfig = serde_yaml::from_str(content)
            .map_err(|e| GatewayError::config(format!("Failed to parse config: {}", e)))?;

        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Apply environment variable overrides to configuration
    ///
    /// Route targets can be repointed with `GATEWAY_ROUTE_<ID>_URI`, where `<ID>`
    /// is the upper-cased route id (e.g. `GATEWAY_ROUTE_MISSION_URI`).
    pub fn apply_env_overrides(&mut self) -> GatewayResult<()> {
        use std::env;

        if let Ok(addr) = env::var("GATEWAY_SERVER_BIND_ADDRESS") {
            self.server.bind_address = addr;
        }

        if let Ok(port) = env::var("GATEWAY_SERVER_HTTP_PORT") {
            self.server.http_port = port.parse()
                .map_err(|e| GatewayError::config(format!("Invalid GATEWAY_SERVER_HTTP_PORT: {}", e)))?;
        }

        if let Ok(secret) = env::var("JWT_SECRET") {
            self.auth.jwt_secret = Some(secret);
        }

        if let Ok(timeout) = env::var("GATEWAY_PROXY_CONNECT_TIMEOUT") {
            self.proxy.connect_timeout = humantime::parse_duration(&timeout)
                .map_err(|e| GatewayError::config(format!("Invalid GATEWAY_PROXY_CONNECT_TIMEOUT: {}", e)))?;
        }

        if let Ok(timeout) = env::var("GATEWAY_PROXY_RESPONSE_TIMEOUT") {
            self.proxy.response_timeout = humantime::parse_duration(&timeout)
                .map_err(|e| GatewayError::config(format!("Invalid GATEWAY_PROXY_RESPONSE_TIMEOUT: {}", e)))?;
        }

        if let Ok(level) = env::var("GATEWAY_LOG_LEVEL") {
            self.observability.logging.level = level;
        }

        if let Ok(format) = env::var("GATEWAY_LOG_FORMAT") {
            self.observability.logging.format = format;
        }

        if let Ok(enabled) = env::var("GATEWAY_METRICS_ENABLED") {
            self.observability.metrics.enabled = enabled.parse()
                .map_err(|e| GatewayError::config(format!("Invalid GATEWAY_METRICS_ENABLED: {}", e)))?;
        }

        for route in &mut self.routes {
            let var = format!("GATEWAY_ROUTE_{}_URI", route.id.to_uppercase().replace('-', "_"));
            if let Ok(uri) = env::var(&var) {
                route.uri = uri;
            }
        }

        Ok(())
    }

    /// Configuration validation with detailed error messages
    ///
    /// The signing secret is deliberately left to the token verifier's
    /// constructor, which is the single place that rejects it.
    pub fn validate(&self) -> GatewayResult<()> {
        let mut errors = Vec::new();

        if self.server.bind_address.is_empty() {
            errors.push("bind_address cannot be empty".to_string());
        }

        if self.routes.is_empty() {
            errors.push("At least one route must be configured".to_string());
        }

        let mut seen_ids = HashSet::new();
        for (index, route) in self.routes.iter().enumerate() {
            if route.id.trim().is_empty() {
                errors.push(format!("Route {} has empty id", index));
            } else if !seen_ids.insert(route.id.as_str()) {
                errors.push(format!("Duplicate route id '{}'", route.id));
            }

            if !route.path.starts_with('/') {
                errors.push(format!("Route '{}' path must start with '/': {}", route.id, route.path));
            }

            let segments: Vec<&str> = route.path.trim_end_matches('/').split('/').collect();
            if let Some(position) = segments.iter().position(|s| *s == "**") {
                if position + 1 != segments.len() {
                    errors.push(format!("Route '{}' may only use '**' as the last path segment", route.id));
                }
            }

            match Url::parse(&route.uri) {
                Ok(url) => {
                    if url.scheme() != "http" {
                        errors.push(format!("Route '{}' target must use plain http: {}", route.id, route.uri));
                    }
                    if url.host_str().is_none() {
                        errors.push(format!("Route '{}' target has no host: {}", route.id, route.uri));
                    }
                    if (url.path() != "/" && !url.path().is_empty()) || url.query().is_some() {
                        errors.push(format!("Route '{}' target must not carry a path or query: {}", route.id, route.uri));
                    }
                }
                Err(e) => errors.push(format!("Route '{}' has invalid target URI '{}': {}", route.id, route.uri, e)),
            }
        }

        for public_path in &self.auth.public_paths {
            if !public_path.starts_with('/') {
                errors.push(format!("Public path must start with '/': {}", public_path));
            }
        }

        if self.proxy.connect_timeout.is_zero() {
            errors.push("proxy connect_timeout must be greater than 0".to_string());
        }

        if self.proxy.response_timeout.is_zero() {
            errors.push("proxy response_timeout must be greater than 0".to_string());
        }

        match self.observability.logging.level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {},
            _ => errors.push(format!("Invalid log level: {}", self.observability.logging.level)),
        }

        match self.observability.logging.format.to_lowercase().as_str() {
            "json" | "text" => {},
            _ => errors.push(format!("Invalid log format: {}", self.observability.logging.format)),
        }

        if !errors.is_empty() {
            return Err(GatewayError::config(format!(
                "Configuration validation failed:\n{}",
                errors.join("\n")
            )));
        }

        Ok(())
    }

    /// Socket address the gateway listens on
    pub fn listen_addr(&self) -> GatewayResult<SocketAddr> {
        format!("{}:{}", self.server.bind_address, self.server.http_port)
            .parse()
            .map_err(|e| GatewayError::config(format!("Invalid bind address: {}", e)))
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Server bind address
    pub bind_address: String,

    /// HTTP port
    pub http_port: u16,

    /// Time allowed for in-flight requests after a shutdown signal
    #[serde(with = "humantime_serde")]
    pub shutdown_grace: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            http_port: 8080,
            shutdown_grace: Duration::from_secs(30),
        }
    }
}

/// Route entry as written in configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteConfig {
    /// Unique route identifier
    pub id: String,

    /// Path predicate, e.g. `/api/missions/**`
    pub path: String,

    /// Backend base URI, e.g. `http://localhost:8083`
    pub uri: String,
}

/// How the configured secret string is turned into key bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SecretEncoding {
    /// UTF-8 bytes of the string
    Raw,
    /// Standard base64
    Base64,
}

/// Authentication settings for the gate and its token verifier
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthSettings {
    /// Shared HMAC secret; usually supplied through `JWT_SECRET`
    #[serde(skip_serializing)]
    pub jwt_secret: Option<String>,

    pub secret_encoding: SecretEncoding,

    /// Accepted HMAC algorithms ("HS256", "HS384", "HS512")
    pub algorithms: Vec<String>,

    /// Clock skew tolerated on `exp`
    #[serde(with = "humantime_serde")]
    pub leeway: Duration,

    /// Paths that bypass token verification
    pub public_paths: Vec<String>,

    /// Forward the verified subject to backends as `x-auth-subject`
    pub propagate_identity: bool,
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            jwt_secret: None,
            secret_encoding: SecretEncoding::Raw,
            algorithms: vec!["HS256".to_string(), "HS384".to_string(), "HS512".to_string()],
            leeway: Duration::from_secs(60),
            public_paths: vec![
                "/api/auth/signup".to_string(),
                "/api/auth/signin".to_string(),
            ],
            propagate_identity: true,
        }
    }
}

/// Upstream connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
    /// Time allowed to establish the backend connection
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Duration,

    /// Time allowed for backend response headers to arrive
    #[serde(with = "humantime_serde")]
    pub response_timeout: Duration,

    /// Idle pooled connections are closed after this long
    #[serde(with = "humantime_serde")]
    pub pool_idle_timeout: Duration,

    pub pool_max_idle_per_host: usize,

    /// Add `x-forwarded-for`, `x-forwarded-proto` and `x-forwarded-host`
    pub add_forwarded_headers: bool,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            response_timeout: Duration::from_secs(30),
            pool_idle_timeout: Duration::from_secs(90),
            pool_max_idle_per_host: 32,
            add_forwarded_headers: true,
        }
    }
}

/// Observability settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    pub logging: LoggingConfig,
    pub metrics: MetricsConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// trace | debug | info | warn | error
    pub level: String,

    /// json | text
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "json".to_string(),
        }
    }
}

/// Prometheus exporter configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub enabled: bool,

    /// Address the exporter's scrape endpoint listens on
    pub listen_address: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen_address: "0.0.0.0:9090".to_string(),
        }
    }
}
