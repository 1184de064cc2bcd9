//! Token validation and the validated-claims cache.
//!
//! Validation is a pure check: signature (HS256), required `exp` claim, and
//! expiry with a configurable leeway. It never consults the session store
//! and never performs I/O, so it is safe to call from any tier of the
//! resolver without ordering concerns.
//!
//! Successful validations land in an LRU cache keyed by the raw token.
//! Cache hits still re-check expiry against the current clock, so caching
//! never extends a token's life.

use super::roles::{Role, RoleSet};
use super::{AuthError, Identity};
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use lru::LruCache;
use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::debug;

const DEFAULT_CACHE_SIZE: usize = 1_000;
const DEFAULT_LEEWAY_SECS: u64 = 30;

/// Claims carried by backend-minted tokens.
///
/// Older tokens carry a single `role` string, newer ones a `roles` array;
/// both are accepted and merged.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub roles: Vec<String>,
    pub exp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,
}

#[derive(Debug, Clone)]
struct CachedIdentity {
    subject: String,
    display_name: Option<String>,
    roles: RoleSet,
    /// Expiry cutoff with leeway already applied, as a unix timestamp.
    expires_at: i64,
}

/// Counters for the claims cache, exposed via `/metrics`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub size: usize,
    pub capacity: usize,
}

/// HS256 token validator with an LRU claims cache.
pub struct TokenValidator {
    decoding_key: DecodingKey,
    validation: Validation,
    leeway_secs: u64,
    cache: RwLock<LruCache<Arc<str>, CachedIdentity>>,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    cache_evictions: AtomicU64,
}

impl std::fmt::Debug for TokenValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenValidator")
            .field("leeway_secs", &self.leeway_secs)
            .finish_non_exhaustive()
    }
}

impl TokenValidator {
    /// Build a validator for tokens signed with the given HMAC secret.
    pub fn new(secret: &[u8]) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.leeway = DEFAULT_LEEWAY_SECS;
        validation.set_required_spec_claims(&["exp"]);
        let capacity = NonZeroUsize::new(DEFAULT_CACHE_SIZE).unwrap_or(NonZeroUsize::MIN);
        Self {
            decoding_key: DecodingKey::from_secret(secret),
            validation,
            leeway_secs: DEFAULT_LEEWAY_SECS,
            cache: RwLock::new(LruCache::new(capacity)),
            cache_hits: AtomicU64::new(0),
            cache_misses: AtomicU64::new(0),
            cache_evictions: AtomicU64::new(0),
        }
    }

    /// Set the clock-skew leeway applied to expiry checks.
    pub fn leeway(mut self, secs: u64) -> Self {
        self.leeway_secs = secs;
        self.validation.leeway = secs;
        self
    }

    /// Set the claims cache capacity.
    pub fn claims_cache_size(self, size: usize) -> Self {
        let capacity = NonZeroUsize::new(size).unwrap_or(NonZeroUsize::MIN);
        Self {
            cache: RwLock::new(LruCache::new(capacity)),
            ..self
        }
    }

    /// Validate a token and derive its identity.
    ///
    /// Pure with respect to request state: the same token and clock always
    /// produce the same outcome regardless of which tier resolved it.
    pub fn validate(&self, token: &str) -> Result<Identity, AuthError> {
        let token = token.trim();
        if token.is_empty() {
            return Err(AuthError::invalid("empty credential"));
        }

        let key: Arc<str> = Arc::from(token);
        let now = unix_now();

        let cached = match self.cache.write() {
            Ok(mut guard) => guard.get(&key).cloned(),
            Err(_) => None,
        };
        if let Some(entry) = cached {
            if now < entry.expires_at {
                self.cache_hits.fetch_add(1, Ordering::Relaxed);
                debug!(subject = %entry.subject, "claims cache hit");
                return Ok(Identity {
                    subject: entry.subject,
                    display_name: entry.display_name,
                    roles: entry.roles,
                    token: token.to_string(),
                });
            }
            // Expired while cached. Drop the entry and fall through to a
            // full decode so the caller sees the standard expiry error.
            if let Ok(mut guard) = self.cache.write() {
                guard.pop(&key);
            }
        }
        self.cache_misses.fetch_add(1, Ordering::Relaxed);

        let data = jsonwebtoken::decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map_err(map_jwt_error)?;
        let claims = data.claims;

        let mut roles = RoleSet::new();
        if let Some(role) = &claims.role {
            roles.insert(Role::new(role));
        }
        for role in &claims.roles {
            roles.insert(Role::new(role));
        }
        if roles.is_empty() {
            return Err(AuthError::invalid("credential carries no roles"));
        }

        let identity = Identity {
            subject: claims.sub.clone(),
            display_name: claims.name.clone(),
            roles: roles.clone(),
            token: token.to_string(),
        };

        let entry = CachedIdentity {
            subject: claims.sub,
            display_name: claims.name,
            roles,
            expires_at: claims.exp.saturating_add(self.leeway_secs as i64),
        };
        if let Ok(mut guard) = self.cache.write() {
            let key_exists = guard.peek(&key).is_some();
            let at_capacity = guard.len() >= guard.cap().get();
            if !key_exists && at_capacity {
                self.cache_evictions.fetch_add(1, Ordering::Relaxed);
            }
            guard.put(key, entry);
        }

        debug!(subject = %identity.subject, roles = %identity.roles, "token validated");
        Ok(identity)
    }

    pub fn cache_stats(&self) -> CacheStats {
        let (size, capacity) = match self.cache.read() {
            Ok(guard) => (guard.len(), guard.cap().get()),
            Err(_) => (0, 0),
        };
        CacheStats {
            hits: self.cache_hits.load(Ordering::Relaxed),
            misses: self.cache_misses.load(Ordering::Relaxed),
            evictions: self.cache_evictions.load(Ordering::Relaxed),
            size,
            capacity,
        }
    }
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

fn map_jwt_error(err: jsonwebtoken::errors::Error) -> AuthError {
    use jsonwebtoken::errors::ErrorKind;
    let reason = match err.kind() {
        ErrorKind::ExpiredSignature => "token expired".to_string(),
        ErrorKind::InvalidSignature => "invalid signature".to_string(),
        ErrorKind::InvalidToken => "malformed token".to_string(),
        ErrorKind::InvalidAlgorithm => "unexpected signing algorithm".to_string(),
        ErrorKind::MissingRequiredClaim(claim) => {
            format!("missing required claim '{claim}'")
        }
        ErrorKind::ImmatureSignature => "token not yet valid".to_string(),
        other => format!("token rejected: {other:?}"),
    };
    AuthError::InvalidCredential { reason }
}
