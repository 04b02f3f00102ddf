//! # Authentication Gate
//!
//! Decides, per request, whether the path is public or whether a valid bearer
//! token must be presented. The gate only classifies; the pipeline turns a
//! rejection into a 401 before any route lookup or backend call happens.

use std::sync::Arc;

use crate::auth::providers::{AuthError, AuthProvider, JwtAuthProvider, TokenClaims};
use crate::core::config::AuthSettings;
use crate::core::error::GatewayResult;

/// Result of running a request through the gate
#[derive(Debug, Clone, PartialEq)]
pub enum AuthOutcome {
    /// A valid token was presented
    Authenticated(TokenClaims),
    /// The path is public; no token was checked
    Exempt,
    /// A protected path without a usable token
    Rejected(AuthError),
}

impl AuthOutcome {
    pub fn is_rejected(&self) -> bool {
        matches!(self, Self::Rejected(_))
    }

    pub fn claims(&self) -> Option<&TokenClaims> {
        match self {
            Self::Authenticated(claims) => Some(claims),
            _ => None,
        }
    }
}

/// Authentication gate in front of the route table
#[derive(Clone)]
pub struct AuthGate {
    provider: Arc<dyn AuthProvider>,
    public_paths: Vec<String>,
    propagate_identity: bool,
}

impl std::fmt::Debug for AuthGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthGate")
            .field("provider", &self.provider.name())
            .field("public_paths", &self.public_paths)
            .field("propagate_identity", &self.propagate_identity)
            .finish()
    }
}

impl AuthGate {
    /// Build the gate with a JWT verifier; fails on an empty secret
    pub fn new(settings: &AuthSettings) -> GatewayResult<Self> {
        let provider = JwtAuthProvider::new(settings)?;
        Ok(Self::with_provider(
            Arc::new(provider),
            settings.public_paths.clone(),
            settings.propagate_identity,
        ))
    }

    /// Build the gate around any verifier
    pub fn with_provider(
        provider: Arc<dyn AuthProvider>,
        public_paths: Vec<String>,
        propagate_identity: bool,
    ) -> Self {
        Self {
            provider,
            public_paths,
            propagate_identity,
        }
    }

    /// Whether verified identity should be forwarded to backends
    pub fn propagate_identity(&self) -> bool {
        self.propagate_identity
    }

    /// Classify a request by its path and raw `Authorization` header value
    pub fn authenticate(&self, path: &str, authorization: Option<&str>) -> AuthOutcome {
        if self.is_public_path(path) {
            return AuthOutcome::Exempt;
        }

        let Some(token) = authorization.and_then(extract_bearer_token) else {
            return AuthOutcome::Rejected(AuthError::MissingToken);
        };

        match self.provider.authenticate(token) {
            Ok(claims) => AuthOutcome::Authenticated(claims),
            Err(err) => AuthOutcome::Rejected(err),
        }
    }

    /// Public paths match exactly, as a whole-segment prefix, or as a raw
    /// prefix when written with a trailing `*`.
    pub fn is_public_path(&self, path: &str) -> bool {
        let path = normalize(path);

        self.public_paths.iter().any(|public| {
            if let Some(prefix) = public.strip_suffix('*') {
                return path.starts_with(prefix);
            }

            let public = normalize(public);
            path == public
                || path
                    .strip_prefix(public)
                    .is_some_and(|rest| rest.starts_with('/'))
        })
    }
}

fn normalize(path: &str) -> &str {
    if path.len() > 1 {
        path.trim_end_matches('/')
    } else {
        path
    }
}

/// Pull the token out of `Bearer <token>`; the scheme is case-insensitive
fn extract_bearer_token(header: &str) -> Option<&str> {
    let header = header.trim();
    let (scheme, token) = header.split_once(' ')?;

    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }

    let token = token.trim();
    (!token.is_empty()).then_some(token)
}
