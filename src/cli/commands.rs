use crate::config::GatewayConfig;
use crate::gateway::Gateway;
use crate::logging::{self, LogConfig};
use crate::runtime_config::RuntimeConfig;
use crate::server::{GatewayService, HttpServer};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// Command-line interface for the service center gateway.
#[derive(Parser)]
#[command(name = "servicebay")]
#[command(about = "Authenticating gateway for the vehicle service center backend", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the gateway server
    Serve {
        /// Path to a TOML configuration file
        #[arg(short, long, env = "SERVICEBAY_CONFIG")]
        config: Option<PathBuf>,

        /// Bind address override, e.g. 0.0.0.0:8080
        #[arg(long)]
        addr: Option<String>,

        /// Backend base URL override, e.g. http://localhost:8081
        #[arg(long)]
        backend: Option<String>,
    },
    /// Print the effective configuration and exit
    CheckConfig {
        /// Path to a TOML configuration file
        #[arg(short, long, env = "SERVICEBAY_CONFIG")]
        config: Option<PathBuf>,
    },
}

/// Execute the CLI command provided by the user.
pub fn run_cli() -> anyhow::Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Serve {
            config,
            addr,
            backend,
        } => serve(config, addr, backend),
        Commands::CheckConfig { config } => check_config(config),
    }
}

fn serve(
    config_path: Option<PathBuf>,
    addr: Option<String>,
    backend: Option<String>,
) -> anyhow::Result<()> {
    logging::init(&LogConfig::from_env())?;

    let mut config = GatewayConfig::load(config_path.as_deref())?;
    if let Some(addr) = addr {
        config.addr = addr;
    }
    if let Some(backend) = backend {
        config.backend.base_url = backend;
    }

    let runtime = RuntimeConfig::from_env();
    may::config().set_stack_size(runtime.stack_size);

    let addr = config.addr.clone();
    let gateway = Arc::new(Gateway::from_config(config)?);
    let service = GatewayService::new(Arc::clone(&gateway))?.with_default_middleware();

    let handle = HttpServer(service).start(&addr)?;
    info!(
        addr = %addr,
        backend = %gateway.backend.base_url(),
        stack_size = runtime.stack_size,
        "gateway listening"
    );

    wait_for_shutdown(handle)
}

#[cfg(unix)]
fn wait_for_shutdown(handle: crate::server::ServerHandle) -> anyhow::Result<()> {
    use signal_hook::consts::{SIGINT, SIGTERM};
    use signal_hook::iterator::Signals;

    let mut signals = Signals::new([SIGINT, SIGTERM])?;
    if let Some(signal) = signals.forever().next() {
        info!(signal = signal, "shutdown signal received");
    }
    handle.stop();
    Ok(())
}

#[cfg(not(unix))]
fn wait_for_shutdown(handle: crate::server::ServerHandle) -> anyhow::Result<()> {
    handle
        .join()
        .map_err(|e| anyhow::anyhow!("server exited abnormally: {e:?}"))
}

fn check_config(config_path: Option<PathBuf>) -> anyhow::Result<()> {
    let config = GatewayConfig::load(config_path.as_deref())?;
    // never print the real secret
    let mut shown = config;
    shown.auth.jwt_secret = logging::token_preview(&shown.auth.jwt_secret);
    println!("{}", toml::to_string_pretty(&shown)?);
    Ok(())
}
