//! # Authentication Providers
//!
//! Token verification for the authentication gate. The gateway never issues
//! tokens; it only checks HMAC-signed JWTs minted by the auth service against
//! the secret both sides share. Verification is pure CPU work with a local key,
//! so providers are synchronous.

use std::collections::HashMap;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::config::{AuthSettings, SecretEncoding};
use crate::core::error::{GatewayError, GatewayResult};

/// Reasons a request fails authentication
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    /// No `Authorization: Bearer <token>` header
    #[error("missing bearer token")]
    MissingToken,

    /// The token is not a well-formed signed JWT
    #[error("malformed token: {0}")]
    MalformedToken(String),

    /// The signature does not match the shared secret
    #[error("invalid token signature")]
    InvalidSignature,

    /// The token's `exp` claim is in the past
    #[error("token has expired")]
    ExpiredToken,
}

impl AuthError {
    /// Short label used in logs and metrics
    pub fn reason(&self) -> &'static str {
        match self {
            Self::MissingToken => "missing_token",
            Self::MalformedToken(_) => "malformed_token",
            Self::InvalidSignature => "invalid_signature",
            Self::ExpiredToken => "expired_token",
        }
    }
}

/// Claims carried by a verified token
///
/// Only the subject and timestamps are interpreted; everything else the auth
/// service puts in the token (username, role, enterpriseId, ...) is kept in
/// `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Operator username or id
    pub sub: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,

    pub exp: i64,

    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

impl TokenClaims {
    pub fn subject(&self) -> &str {
        &self.sub
    }

    pub fn issued_at(&self) -> Option<DateTime<Utc>> {
        self.iat.and_then(|secs| DateTime::from_timestamp(secs, 0))
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.exp, 0)
    }

    /// Any additional claim by name
    pub fn claim(&self, name: &str) -> Option<&serde_json::Value> {
        self.extra.get(name)
    }

    pub fn role(&self) -> Option<&str> {
        self.claim("role").and_then(|v| v.as_str())
    }

    /// The operator's enterprise, whether the token encodes it as a string or a number
    pub fn enterprise_id(&self) -> Option<String> {
        match self.claim("enterpriseId")? {
            serde_json::Value::String(id) => Some(id.clone()),
            serde_json::Value::Number(id) => Some(id.to_string()),
            _ => None,
        }
    }
}

/// A token verifier usable by the authentication gate
pub trait AuthProvider: Send + Sync {
    /// Provider name for logging
    fn name(&self) -> &'static str;

    /// Verify a raw token (without the `Bearer ` prefix) and return its claims
    fn authenticate(&self, token: &str) -> Result<TokenClaims, AuthError>;
}

/// HMAC JWT verifier keyed by the shared secret
pub struct JwtAuthProvider {
    key: DecodingKey,
    validation: Validation,
}

impl std::fmt::Debug for JwtAuthProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtAuthProvider")
            .field("algorithms", &self.validation.algorithms)
            .field("leeway", &self.validation.leeway)
            .finish_non_exhaustive()
    }
}

impl JwtAuthProvider {
    /// Build the verifier, failing if the secret is missing, empty or blank
    pub fn new(settings: &AuthSettings) -> GatewayResult<Self> {
        let secret = settings
            .jwt_secret
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| GatewayError::config("JWT secret cannot be empty"))?;

        let key = match settings.secret_encoding {
            SecretEncoding::Raw => DecodingKey::from_secret(secret.as_bytes()),
            SecretEncoding::Base64 => {
                let bytes = BASE64.decode(secret.trim()).map_err(|e| {
                    GatewayError::config(format!("JWT secret is not valid base64: {}", e))
                })?;
                DecodingKey::from_secret(&bytes)
            }
        };

        let algorithms = settings
            .algorithms
            .iter()
            .map(|name| match name.to_uppercase().as_str() {
                "HS256" => Ok(Algorithm::HS256),
                "HS384" => Ok(Algorithm::HS384),
                "HS512" => Ok(Algorithm::HS512),
                other => Err(GatewayError::config(format!(
                    "Unsupported JWT algorithm '{}': only HS256, HS384 and HS512 are accepted",
                    other
                ))),
            })
            .collect::<GatewayResult<Vec<_>>>()?;

        if algorithms.is_empty() {
            return Err(GatewayError::config("At least one JWT algorithm must be accepted"));
        }

        let mut validation = Validation::new(algorithms[0]);
        validation.algorithms = algorithms;
        validation.leeway = settings.leeway.as_secs();
        validation.validate_exp = true;
        validation.validate_aud = false;
        validation.set_required_spec_claims(&["exp", "sub"]);

        Ok(Self { key, validation })
    }

    /// Convenience constructor from a secret with default settings
    pub fn from_secret(secret: Option<&str>) -> GatewayResult<Self> {
        let settings = AuthSettings {
            jwt_secret: secret.map(str::to_string),
            ..AuthSettings::default()
        };
        Self::new(&settings)
    }
}

impl AuthProvider for JwtAuthProvider {
    fn name(&self) -> &'static str {
        "jwt"
    }

    fn authenticate(&self, token: &str) -> Result<TokenClaims, AuthError> {
        if token.trim().is_empty() {
            return Err(AuthError::MissingToken);
        }

        decode::<TokenClaims>(token, &self.key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::InvalidSignature | ErrorKind::InvalidAlgorithm => AuthError::InvalidSignature,
                ErrorKind::ExpiredSignature => AuthError::ExpiredToken,
                _ => AuthError::MalformedToken(e.to_string()),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};
    use serde_json::json;

    const SECRET: &str = "test-secret-key-for-unit-tests-only";

    fn sign(secret: &str, claims: serde_json::Value) -> String {
        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    fn claims_for(sub: &str, expires_in: i64) -> serde_json::Value {
        let now = Utc::now().timestamp();
        json!({
            "sub": sub,
            "iat": now,
            "exp": now + expires_in,
            "role": "OPERATOR",
            "enterpriseId": 42
        })
    }

    #[test]
    fn test_valid_secret_builds_verifier() {
        assert!(JwtAuthProvider::from_secret(Some(SECRET)).is_ok());
    }

    #[test]
    fn test_empty_null_and_blank_secrets_rejected() {
        for secret in [None, Some(""), Some("   ")] {
            let err = JwtAuthProvider::from_secret(secret).unwrap_err();
            assert!(matches!(err, GatewayError::Configuration { .. }));
            assert!(err.to_string().contains("JWT secret cannot be empty"));
        }
    }

    #[test]
    fn test_valid_token_yields_claims() {
        let provider = JwtAuthProvider::from_secret(Some(SECRET)).unwrap();
        let token = sign(SECRET, claims_for("operator-7", 3600));

        let claims = provider.authenticate(&token).unwrap();
        assert_eq!(claims.subject(), "operator-7");
        assert_eq!(claims.role(), Some("OPERATOR"));
        assert_eq!(claims.enterprise_id(), Some("42".to_string()));
        assert!(claims.issued_at().is_some());
        assert!(claims.expires_at().unwrap() > Utc::now());
    }

    #[test]
    fn test_wrong_secret_is_invalid_signature() {
        let provider = JwtAuthProvider::from_secret(Some(SECRET)).unwrap();
        let token = sign("some-other-secret", claims_for("operator-7", 3600));

        assert_eq!(provider.authenticate(&token), Err(AuthError::InvalidSignature));
    }

    #[test]
    fn test_expired_token() {
        let provider = JwtAuthProvider::from_secret(Some(SECRET)).unwrap();
        let token = sign(SECRET, claims_for("operator-7", -3600));

        assert_eq!(provider.authenticate(&token), Err(AuthError::ExpiredToken));
    }

    #[test]
    fn test_garbage_is_malformed() {
        let provider = JwtAuthProvider::from_secret(Some(SECRET)).unwrap();

        let result = provider.authenticate("not-a-jwt");
        assert!(matches!(result, Err(AuthError::MalformedToken(_))));
        assert_eq!(provider.authenticate("  "), Err(AuthError::MissingToken));
    }

    #[test]
    fn test_token_without_subject_is_malformed() {
        let provider = JwtAuthProvider::from_secret(Some(SECRET)).unwrap();
        let exp = Utc::now().timestamp() + 3600;
        let token = sign(SECRET, json!({ "exp": exp }));

        assert!(matches!(provider.authenticate(&token), Err(AuthError::MalformedToken(_))));
    }

    #[test]
    fn test_hs512_and_base64_secret() {
        let raw = b"0123456789abcdef0123456789abcdef0123456789abcdef0123456789abcdef";
        let settings = AuthSettings {
            jwt_secret: Some(BASE64.encode(raw)),
            secret_encoding: SecretEncoding::Base64,
            ..AuthSettings::default()
        };
        let provider = JwtAuthProvider::new(&settings).unwrap();

        let token = encode(
            &Header::new(Algorithm::HS512),
            &claims_for("operator-9", 600),
            &EncodingKey::from_secret(raw),
        )
        .unwrap();

        assert_eq!(provider.authenticate(&token).unwrap().sub, "operator-9");
    }

    #[test]
    fn test_unsupported_algorithm_rejected_at_construction() {
        let settings = AuthSettings {
            jwt_secret: Some(SECRET.to_string()),
            algorithms: vec!["RS256".to_string()],
            ..AuthSettings::default()
        };
        assert!(JwtAuthProvider::new(&settings).is_err());
    }
}
