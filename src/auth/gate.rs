//! Role-based authorization gate.

use super::roles::{Role, RoleSet};
use super::{AuthError, Identity};

/// Declarative role requirement for a route.
///
/// The check is any-of: the identity passes when it holds at least one of
/// the required roles. An empty requirement means "any authenticated
/// identity". The gate never answers the "who are you" question; it assumes
/// validation already succeeded and only ever fails with
/// [`AuthError::Forbidden`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthorizationGate {
    required: RoleSet,
}

impl AuthorizationGate {
    /// Gate that admits any authenticated identity.
    pub fn authenticated() -> Self {
        Self::default()
    }

    /// Gate that admits identities holding at least one of the given roles.
    /// Names are normalized, so `"admin"` and `"ROLE_ADMIN"` declare the
    /// same requirement.
    pub fn any_of<I, S>(roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            required: roles.into_iter().map(|r| Role::new(r.as_ref())).collect(),
        }
    }

    pub fn required(&self) -> &RoleSet {
        &self.required
    }

    /// Check the identity against this gate.
    pub fn authorize(&self, identity: &Identity) -> Result<(), AuthError> {
        if self.required.is_empty() || identity.roles.intersects(&self.required) {
            Ok(())
        } else {
            Err(AuthError::Forbidden {
                required: self.required.names(),
            })
        }
    }
}
