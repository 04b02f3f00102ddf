//! # Route Table and Startup Integration Tests
//!
//! Route enumeration, gateway-local endpoints, configuration files and the
//! fail-fast checks that run before a request is ever served.

mod common;

use axum::http::StatusCode;
use common::{config_with_backends, test_server, SECRET};
use mission_gateway::core::config::GatewayConfig;
use mission_gateway::gateway::server::GatewayServer;
use mission_gateway::routing::router::RouteTable;
use mission_gateway::GatewayError;
use tempfile::TempDir;

const REFERENCE_ROUTES: [(&str, &str, &str); 6] = [
    ("auth", "/api/auth/**", "http://localhost:8081"),
    ("entreprise", "/api/enterprise/**", "http://localhost:8082"),
    ("mission", "/api/missions/**", "http://localhost:8083"),
    ("spacecraft", "/api/spacecraft/**", "http://localhost:8084"),
    ("telemetry", "/api/telemetry/**", "http://localhost:8085"),
    ("dashboard", "/api/dashboard/**", "http://localhost:8086"),
];

#[tokio::test]
async fn test_routes_endpoint_enumerates_reference_table() {
    let server = test_server(config_with_backends(&[]));

    let response = server.get("/gateway/routes").await;

    assert_eq!(response.status_code(), StatusCode::OK);
    let routes: Vec<serde_json::Value> = response.json();
    assert_eq!(routes.len(), 6);

    for (route, (id, predicate, uri)) in routes.iter().zip(REFERENCE_ROUTES) {
        assert_eq!(route["id"], id);
        assert_eq!(route["predicate"], predicate);
        assert_eq!(route["uri"], uri);
    }
}

#[test]
fn test_route_table_ids_are_distinct() {
    let table = RouteTable::from_config(&GatewayConfig::default().routes).unwrap();

    let mut ids: Vec<&str> = table.routes().iter().map(|r| r.id.as_str()).collect();
    ids.sort_unstable();
    ids.dedup();
    assert_eq!(ids.len(), 6);
    assert_eq!(table.get("auth").unwrap().uri, "http://localhost:8081");
}

#[tokio::test]
async fn test_health_and_readiness_endpoints() {
    let server = test_server(config_with_backends(&[]));

    let health = server.get("/health").await;
    assert_eq!(health.status_code(), StatusCode::OK);
    assert_eq!(health.json::<serde_json::Value>()["status"], "healthy");

    let ready = server.get("/ready").await;
    assert_eq!(ready.status_code(), StatusCode::OK);
    assert_eq!(ready.json::<serde_json::Value>()["routes"], 6);
}

/// Null, empty and whitespace-only secrets all stop startup
#[test]
fn test_gateway_refuses_to_start_without_secret() {
    for secret in [None, Some(""), Some(" \t ")] {
        let mut config = GatewayConfig::default();
        config.auth.jwt_secret = secret.map(str::to_string);

        match GatewayServer::new(config) {
            Err(GatewayError::Configuration { message }) => {
                assert!(message.contains("JWT secret cannot be empty"), "{}", message);
            }
            Err(other) => panic!("unexpected error for {:?}: {}", secret, other),
            Ok(_) => panic!("gateway started with secret {:?}", secret),
        }
    }
}

#[tokio::test]
async fn test_gateway_from_yaml_file() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("gateway.yaml");

    tokio::fs::write(
        &config_path,
        format!(
            r#"
server:
  http_port: 0
routes:
  - id: mission
    path: /api/missions/**
    uri: http://127.0.0.1:18083
  - id: fallback
    path: /api/**
    uri: http://127.0.0.1:18090
auth:
  jwt_secret: {}
cors:
  allowed_origins: ["*"]
  allow_credentials: false
"#,
            SECRET
        ),
    )
    .await
    .unwrap();

    let config = GatewayConfig::load_from_file(&config_path).await.unwrap();
    let gateway = GatewayServer::new(config).unwrap();
    let routes = gateway.pipeline().routes();

    assert_eq!(routes.len(), 2);
    assert_eq!(routes.match_path("/api/missions/1").unwrap().id, "mission");
    assert_eq!(routes.match_path("/api/spacecraft/1").unwrap().id, "fallback");
}

#[test]
fn test_invalid_route_table_is_rejected_at_startup() {
    let mut config = GatewayConfig::default();
    config.auth.jwt_secret = Some(SECRET.to_string());
    config.routes[2].path = "/api/**/missions".to_string();

    assert!(matches!(
        GatewayServer::new(config),
        Err(GatewayError::Configuration { .. })
    ));
}
