pub mod providers;
pub mod middleware;

pub use middleware::{AuthGate, AuthOutcome};
pub use providers::{AuthError, AuthProvider, JwtAuthProvider, TokenClaims};
