//! Credential resolution.
//!
//! One resolver replaces the per-controller token plumbing that tends to
//! accrete in MVC codebases. The precedence order is fixed:
//!
//! 1. `token` query parameter
//! 2. `Authorization: Bearer <token>` header
//! 3. session binding
//!
//! The first tier that yields a non-empty token wins and the rest are not
//! consulted. A parameter token is written into the session before the
//! resolver returns, so a link-style login survives into the next request
//! even if downstream validation rejects the token. Header tokens only touch
//! the session under [`SessionWritePolicy::Rehydrate`].

use crate::logging::token_preview;
use crate::session::SessionHandle;
use tracing::debug;

/// Which tier produced the credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenSource {
    Parameter,
    BearerHeader,
    Session,
}

impl TokenSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenSource::Parameter => "parameter",
            TokenSource::BearerHeader => "bearer_header",
            TokenSource::Session => "session",
        }
    }
}

/// A resolved credential plus where it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedToken {
    pub token: String,
    pub source: TokenSource,
}

/// Whether header-sourced tokens are written back into the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionWritePolicy {
    /// Header tokens never touch the session. Stateless API clients stay
    /// stateless.
    #[default]
    Never,
    /// Header tokens are bound into the session, rehydrating it for
    /// browser-style clients that lost their cookie.
    Rehydrate,
}

/// Resolves the effective credential for a request.
///
/// Resolution is the single source of truth for "which token does this
/// request carry"; nothing downstream re-reads the parameter, header, or
/// session directly.
#[derive(Debug, Clone, Default)]
pub struct TokenResolver {
    write_policy: SessionWritePolicy,
}

impl TokenResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_write_policy(policy: SessionWritePolicy) -> Self {
        Self {
            write_policy: policy,
        }
    }

    pub fn write_policy(&self) -> SessionWritePolicy {
        self.write_policy
    }

    /// Resolve the credential for one request.
    ///
    /// Returns `None` when no tier yields a token; absence is an ordinary
    /// outcome (an anonymous request), not an error.
    pub fn resolve(
        &self,
        param: Option<&str>,
        authorization: Option<&str>,
        session: &SessionHandle<'_>,
    ) -> Option<ResolvedToken> {
        if let Some(token) = param.map(str::trim).filter(|t| !t.is_empty()) {
            // Parameter tokens are persisted eagerly so the link-based login
            // flow works on the very next request, cookie only.
            session.bind_token(token);
            debug!(
                source = TokenSource::Parameter.as_str(),
                token = %token_preview(token),
                session_id = %session.id(),
                "credential resolved"
            );
            return Some(ResolvedToken {
                token: token.to_string(),
                source: TokenSource::Parameter,
            });
        }

        if let Some(token) = authorization.and_then(bearer_token) {
            if self.write_policy == SessionWritePolicy::Rehydrate {
                session.bind_token(token);
            }
            debug!(
                source = TokenSource::BearerHeader.as_str(),
                token = %token_preview(token),
                "credential resolved"
            );
            return Some(ResolvedToken {
                token: token.to_string(),
                source: TokenSource::BearerHeader,
            });
        }

        if let Some(token) = session.token().filter(|t| !t.trim().is_empty()) {
            debug!(
                source = TokenSource::Session.as_str(),
                token = %token_preview(&token),
                session_id = %session.id(),
                "credential resolved"
            );
            return Some(ResolvedToken {
                token,
                source: TokenSource::Session,
            });
        }

        debug!("no credential in parameter, header, or session");
        None
    }
}

/// Extract the token from an `Authorization` header value.
///
/// Only the `Bearer` scheme is recognized; anything else yields `None`.
fn bearer_token(value: &str) -> Option<&str> {
    let rest = value.strip_prefix("Bearer ")?;
    let token = rest.trim();
    if token.is_empty() {
        None
    } else {
        Some(token)
    }
}
