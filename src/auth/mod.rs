//! Authentication and authorization.
//!
//! The pieces compose into one pipeline that every protected request walks:
//!
//! 1. [`TokenResolver`] finds the credential (query parameter, then
//!    `Authorization` header, then session binding).
//! 2. [`TokenValidator`] checks the signature and expiry and derives an
//!    [`Identity`] with a normalized [`RoleSet`].
//! 3. [`AuthorizationGate`] enforces the route's role requirement.
//! 4. [`SecurityContext`] scopes the identity to the handler invocation.
//!
//! Failures are deliberately split into "who are you" ([`AuthError::NoCredential`],
//! [`AuthError::InvalidCredential`]) and "you may not" ([`AuthError::Forbidden`]);
//! the HTTP layer maps the former to 401 and the latter to 403 and never
//! collapses the two.

mod context;
mod gate;
mod resolver;
pub mod roles;
mod validator;

pub use context::{ContextGuard, SecurityContext};
pub use gate::AuthorizationGate;
pub use resolver::{ResolvedToken, SessionWritePolicy, TokenResolver, TokenSource};
pub use roles::{Role, RoleSet};
pub use validator::{CacheStats, Claims, TokenValidator};

use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// An authenticated principal derived from a validated token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    /// Token subject, typically the account email.
    pub subject: String,
    /// Optional display name claim.
    pub display_name: Option<String>,
    /// Canonical roles carried by the token. Never empty.
    pub roles: RoleSet,
    /// The raw credential, kept so proxied requests can present it upstream.
    pub token: String,
}

impl Identity {
    pub fn has_role(&self, role: &Role) -> bool {
        self.roles.contains(role)
    }
}

/// Shared handle to an identity, cheap to clone across the request pipeline.
pub type SharedIdentity = Arc<Identity>;

/// Why an authentication or authorization check failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// No credential was found in the parameter, header, or session tiers.
    /// Maps to 401 (or a login redirect for page routes).
    NoCredential,
    /// A credential was presented but did not validate. Maps to 401.
    InvalidCredential { reason: String },
    /// The identity is valid but lacks every required role. Maps to 403.
    Forbidden { required: Vec<String> },
}

impl AuthError {
    pub fn invalid(reason: impl Into<String>) -> Self {
        AuthError::InvalidCredential {
            reason: reason.into(),
        }
    }

    /// HTTP status for API routes.
    pub fn status(&self) -> u16 {
        match self {
            AuthError::NoCredential | AuthError::InvalidCredential { .. } => 401,
            AuthError::Forbidden { .. } => 403,
        }
    }

    /// Error code used in login-redirect query strings for page routes.
    pub fn redirect_code(&self) -> &'static str {
        match self {
            AuthError::NoCredential => "session_expired",
            AuthError::InvalidCredential { .. } => "invalid_token",
            AuthError::Forbidden { .. } => "access_denied",
        }
    }

    /// Client-facing message. Never echoes token contents or role details.
    pub fn public_message(&self) -> &'static str {
        match self {
            AuthError::NoCredential => "Authentication required",
            AuthError::InvalidCredential { .. } => "Invalid or expired token",
            AuthError::Forbidden { .. } => "Access denied",
        }
    }

    /// Log the failure at a severity matching its variant.
    pub fn log(&self) {
        match self {
            AuthError::NoCredential => {
                debug!("no credential resolved for protected route");
            }
            AuthError::InvalidCredential { reason } => {
                warn!(reason = %reason, "credential rejected");
            }
            AuthError::Forbidden { required } => {
                warn!(required = ?required, "identity lacks required role");
            }
        }
    }
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthError::NoCredential => write!(f, "no credential presented"),
            AuthError::InvalidCredential { reason } => {
                write!(f, "invalid credential: {reason}")
            }
            AuthError::Forbidden { required } => {
                write!(f, "missing required role (need one of: {})", required.join(", "))
            }
        }
    }
}

impl std::error::Error for AuthError {}
