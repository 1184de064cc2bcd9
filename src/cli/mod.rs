//! Command-line interface.
//!
//! Two commands:
//!
//! - `serve` runs the gateway (`--config`, with `--addr` and `--backend`
//!   overrides)
//! - `check-config` prints the effective configuration with the JWT secret
//!   redacted
//!
//! ```bash
//! servicebay serve --config servicebay.toml
//! SERVICEBAY_JWT_SECRET=... servicebay serve --backend http://localhost:8081
//! servicebay check-config --config servicebay.toml
//! ```

mod commands;

pub use commands::{run_cli, Cli, Commands};
