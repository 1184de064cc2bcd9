//! Role names and role sets.
//!
//! Tokens minted by the backend have carried roles in several shapes over
//! time: `ADMIN`, `admin`, `ROLE_ADMIN`, and a camel-cased `serviceAdvisor`.
//! Everything is folded into one canonical form at the edge (trim, strip an
//! optional `ROLE_` prefix, upper-case) so authorization checks compare
//! canonical names only.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use smallvec::SmallVec;
use std::fmt;

/// Canonical role names used by the route table.
pub mod names {
    pub const ADMIN: &str = "ADMIN";
    pub const CUSTOMER: &str = "CUSTOMER";
    pub const SERVICE_ADVISOR: &str = "SERVICEADVISOR";
}

/// A single role in canonical form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Role(String);

impl Role {
    /// Normalize a raw role string into canonical form.
    pub fn new(raw: &str) -> Self {
        let trimmed = raw.trim();
        let without_prefix = match trimmed.get(..5) {
            Some(prefix) if prefix.eq_ignore_ascii_case("ROLE_") => &trimmed[5..],
            _ => trimmed,
        };
        Role(without_prefix.to_ascii_uppercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True for roles that carry no usable name after normalization.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Serialize for Role {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for Role {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Role::new(&raw))
    }
}

const MAX_INLINE_ROLES: usize = 4;

/// A small set of canonical roles. Most identities carry exactly one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoleSet(SmallVec<[Role; MAX_INLINE_ROLES]>);

impl RoleSet {
    pub fn new() -> Self {
        Self(SmallVec::new())
    }

    /// Insert a role, dropping duplicates and roles that normalize to empty.
    pub fn insert(&mut self, role: Role) {
        if role.is_empty() || self.0.contains(&role) {
            return;
        }
        self.0.push(role);
    }

    pub fn contains(&self, role: &Role) -> bool {
        self.0.contains(role)
    }

    /// True when the two sets share at least one role.
    pub fn intersects(&self, other: &RoleSet) -> bool {
        self.0.iter().any(|r| other.contains(r))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Role> {
        self.0.iter()
    }

    /// Canonical names, for logs and page models.
    pub fn names(&self) -> Vec<String> {
        self.0.iter().map(|r| r.0.clone()).collect()
    }
}

impl FromIterator<Role> for RoleSet {
    fn from_iter<I: IntoIterator<Item = Role>>(iter: I) -> Self {
        let mut set = RoleSet::new();
        for role in iter {
            set.insert(role);
        }
        set
    }
}

impl<'a> FromIterator<&'a str> for RoleSet {
    fn from_iter<I: IntoIterator<Item = &'a str>>(iter: I) -> Self {
        iter.into_iter().map(Role::new).collect()
    }
}

impl fmt::Display for RoleSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for role in &self.0 {
            if !first {
                f.write_str(", ")?;
            }
            first = false;
            f.write_str(role.as_str())?;
        }
        Ok(())
    }
}
