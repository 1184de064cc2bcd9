//! Gateway configuration.
//!
//! Configuration is layered: built-in defaults, then an optional TOML file,
//! then `SERVICEBAY_*` environment variable overrides. The environment layer
//! exists so deployments can inject the JWT secret and backend URL without
//! baking them into an image.

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Top-level gateway configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GatewayConfig {
    /// Bind address for the HTTP listener.
    pub addr: String,
    pub backend: BackendConfig,
    pub auth: AuthConfig,
    pub session: SessionConfig,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            addr: "0.0.0.0:8080".to_string(),
            backend: BackendConfig::default(),
            auth: AuthConfig::default(),
            session: SessionConfig::default(),
        }
    }
}

/// Upstream REST backend the gateway fronts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BackendConfig {
    /// Base URL, e.g. `http://localhost:8081`. Trailing slashes are ignored.
    pub base_url: String,
    pub connect_timeout_ms: u64,
    pub read_timeout_ms: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8081".to_string(),
            connect_timeout_ms: 2_000,
            read_timeout_ms: 10_000,
        }
    }
}

impl BackendConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}

/// Token validation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AuthConfig {
    /// HMAC secret shared with the backend that mints tokens. Must be set;
    /// the gateway refuses to start with an empty secret.
    pub jwt_secret: String,
    /// Clock skew tolerance applied to `exp` checks, in seconds.
    pub leeway_secs: u64,
    /// Capacity of the validated-claims LRU cache.
    pub claims_cache_size: usize,
    /// When true, tokens that arrive via the `Authorization` header are also
    /// written into the server-side session (rehydration). Off by default so
    /// stateless API clients never create sessions.
    pub persist_header_tokens: bool,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: String::new(),
            leeway_secs: 30,
            claims_cache_size: 1_000,
            persist_header_tokens: false,
        }
    }
}

/// Server-side session settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SessionConfig {
    /// Name of the session cookie.
    pub cookie_name: String,
    /// Idle expiry for session entries, in seconds.
    pub ttl_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cookie_name: "sb_session".to_string(),
            ttl_secs: 1_800,
        }
    }
}

impl SessionConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

impl GatewayConfig {
    /// Parse a TOML document into a config. Unknown keys are rejected so a
    /// typo in a deployment file fails loudly instead of silently using a
    /// default.
    pub fn from_toml_str(s: &str) -> anyhow::Result<Self> {
        let config: GatewayConfig = toml::from_str(s).context("failed to parse gateway config")?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        Self::from_toml_str(&raw)
            .with_context(|| format!("invalid config file {}", path.display()))
    }

    /// Load configuration: defaults, then the optional file, then environment
    /// overrides.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let mut config = match path {
            Some(p) => Self::from_file(p)?,
            None => Self::default(),
        };
        config.apply_env();
        Ok(config)
    }

    /// Apply `SERVICEBAY_*` environment overrides in place.
    pub fn apply_env(&mut self) {
        if let Ok(addr) = std::env::var("SERVICEBAY_ADDR") {
            self.addr = addr;
        }
        if let Ok(url) = std::env::var("SERVICEBAY_BACKEND_URL") {
            self.backend.base_url = url;
        }
        if let Ok(secret) = std::env::var("SERVICEBAY_JWT_SECRET") {
            self.auth.jwt_secret = secret;
        }
        if let Ok(raw) = std::env::var("SERVICEBAY_JWT_LEEWAY_SECS") {
            if let Ok(secs) = raw.parse() {
                self.auth.leeway_secs = secs;
            }
        }
        if let Ok(raw) = std::env::var("SERVICEBAY_SESSION_TTL_SECS") {
            if let Ok(secs) = raw.parse() {
                self.session.ttl_secs = secs;
            }
        }
        if let Ok(raw) = std::env::var("SERVICEBAY_PERSIST_HEADER_TOKENS") {
            self.auth.persist_header_tokens = raw.eq_ignore_ascii_case("true") || raw == "1";
        }
    }
}
