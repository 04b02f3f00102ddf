//! Shared helpers for the integration tests.

#![allow(dead_code)]

use std::time::Duration;

use axum_test::TestServer;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use mission_gateway::core::config::GatewayConfig;
use mission_gateway::gateway::server::GatewayServer;
use serde_json::json;

pub const SECRET: &str = "integration-test-shared-secret";
pub const ORIGIN: &str = "http://localhost:3000";

/// Reference configuration with the test secret and selected routes repointed
pub fn config_with_backends(backends: &[(&str, String)]) -> GatewayConfig {
    let mut config = GatewayConfig::default();
    config.auth.jwt_secret = Some(SECRET.to_string());

    for (id, uri) in backends {
        let route = config
            .routes
            .iter_mut()
            .find(|route| route.id == *id)
            .unwrap_or_else(|| panic!("no route with id {}", id));
        route.uri = uri.clone();
    }

    config
}

pub fn test_server(config: GatewayConfig) -> TestServer {
    let gateway = GatewayServer::new(config).unwrap();
    TestServer::new(gateway.app()).unwrap()
}

/// Mint an HS256 token expiring `expires_in` from now (negative for expired)
pub fn token(secret: &str, subject: &str, expires_in: Duration, expired: bool) -> String {
    let now = chrono::Utc::now().timestamp();
    let offset = expires_in.as_secs() as i64;
    let exp = if expired { now - offset } else { now + offset };

    encode(
        &Header::new(Algorithm::HS256),
        &json!({
            "sub": subject,
            "iat": now,
            "exp": exp,
            "role": "MISSION_OPERATOR",
            "enterpriseId": 42
        }),
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .unwrap()
}

pub fn valid_token(subject: &str) -> String {
    token(SECRET, subject, Duration::from_secs(3600), false)
}

pub fn bearer(token: &str) -> String {
    format!("Bearer {}", token)
}

/// A local port with nothing listening on it
pub fn refused_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}
