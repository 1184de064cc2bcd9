//! Coroutine runtime tuning.
//!
//! The server runs on may's stackful coroutines, so the per-coroutine stack
//! size is the main knob. Proxy handlers keep very little on the stack; the
//! default leaves generous headroom for JSON bodies and the blocking HTTP
//! client.

use std::env;
use tracing::warn;

/// Default coroutine stack size in bytes (0x8000 = 32 KiB).
pub const DEFAULT_STACK_SIZE: usize = 0x8000;

/// Runtime configuration loaded from environment variables.
#[derive(Debug, Clone, Copy)]
pub struct RuntimeConfig {
    /// Stack size for handler coroutines in bytes.
    pub stack_size: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            stack_size: DEFAULT_STACK_SIZE,
        }
    }
}

impl RuntimeConfig {
    /// Read `SERVICEBAY_STACK_SIZE` from the environment. Accepts decimal or
    /// hex with an `0x` prefix. Unparseable values fall back to the default.
    pub fn from_env() -> Self {
        let stack_size = match env::var("SERVICEBAY_STACK_SIZE") {
            Ok(raw) => {
                let parsed = if let Some(hex) = raw.strip_prefix("0x") {
                    usize::from_str_radix(hex, 16)
                } else {
                    raw.parse::<usize>()
                };
                match parsed {
                    Ok(size) => size,
                    Err(_) => {
                        warn!(value = %raw, "invalid SERVICEBAY_STACK_SIZE, using default");
                        DEFAULT_STACK_SIZE
                    }
                }
            }
            Err(_) => DEFAULT_STACK_SIZE,
        };
        RuntimeConfig { stack_size }
    }
}
