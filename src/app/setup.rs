//! This module handles the initial setup of the bridge process.
use super::args::ServeArgs;
use crate::bridge::{BridgeConfig, DEFAULT_PORT};
use crate::storage::LogStore;
use anyhow::{anyhow, Result};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Environment variable consulted when `--port` is not given.
pub const PORT_ENV: &str = "EVENT_BRIDGE_PORT";

/// Contains everything the bridge needs to run.
///
/// This struct is created by the `prepare` function and passed to
/// `serve::run`.
pub struct PreparedBridge {
    /// The address to listen on, as `host:port`.
    pub listen_addr: String,
    /// The path of the durable log file.
    pub log_file: String,
    /// Pool size and protocol limits.
    pub config: BridgeConfig,
    /// The process-wide record history.
    pub store: Arc<LogStore>,
}

/// Prepares the bridge for running.
///
/// This function performs the following steps:
/// 1. Resolves the listening port.
/// 2. Prints a start banner.
/// 3. Opens the durable log, writing the startup sentinel.
///
/// # Arguments
///
/// * `args` - The `serve` command-line arguments.
///
/// # Errors
///
/// This function will return an error if the port is invalid or the durable
/// log cannot be written.
pub fn prepare(args: ServeArgs) -> Result<PreparedBridge> {
    let port = resolve_port(&args)?;
    let listen_addr = format!("{}:{}", args.host, port);
    let config = BridgeConfig {
        workers: args.workers.max(1),
        max_line_bytes: args.max_line_bytes,
        expose_queries: args.expose_queries,
    };

    print_start_banner(&listen_addr, &args.log_file, &config);

    let store = Arc::new(LogStore::open(&args.log_file)?);

    Ok(PreparedBridge {
        listen_addr,
        log_file: args.log_file,
        config,
        store,
    })
}

/// Configures the operational log output.
///
/// `RUST_LOG` takes precedence over the verbosity flag.
pub fn configure_logging(verbose: bool) {
    let default_filter = if verbose {
        "info,event_bridge=debug"
    } else {
        "info"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

/// Prints a banner with startup information.
fn print_start_banner(listen_addr: &str, log_file: &str, config: &BridgeConfig) {
    println!("{}", "=".repeat(50));
    println!("🚀 Starting event bridge");
    println!("{}", "=".repeat(50));
    println!("Address: {}", listen_addr);
    println!("Log file: {}", log_file);
    println!("Workers: {}", config.workers);
    println!(
        "Queries: {}",
        if config.expose_queries {
            "exposed"
        } else {
            "disabled"
        }
    );
    println!();
}

/// Resolves the listening port.
///
/// The port can be provided via a command-line argument or an environment variable.
fn resolve_port(args: &ServeArgs) -> Result<u16> {
    if let Some(port) = args.port {
        return Ok(port);
    }

    match std::env::var(PORT_ENV) {
        Ok(value) => value
            .trim()
            .parse()
            .map_err(|_| anyhow!("{} must be a port number, got '{}'", PORT_ENV, value)),
        Err(_) => Ok(DEFAULT_PORT),
    }
}
