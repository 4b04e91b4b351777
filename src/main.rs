//! sandbox-broker: host-side capability broker for agent containers.
//!
//! # I/O Architecture
//!
//! - **stdout**: machine-readable output only (`SANDBOX_BROKER_SOCKET=...`
//!   from `serve`, response JSON from `internal-request`)
//! - **stderr**: diagnostic logging via `tracing`
//! - **syslog**: audit events, tag `SANDBOX_BROKER`

use anyhow::{Context, Result};
use clap::Parser;
use sandbox_broker::{
    cli::{Cli, Commands},
    cli_handler,
    config::ConfigLoader,
    telemetry,
};
use tracing::{debug, warn};

fn main() -> Result<()> {
    let cli = Cli::parse();

    let loader = ConfigLoader::new();
    let config = loader
        .load(cli.config.as_deref())
        .context("Failed to load configuration")?;

    init_tracing(cli.verbose, &config.general.log_level)?;
    debug!("Parsed CLI arguments: {:?}", cli);
    debug!("Loaded configuration: {:?}", config);

    // Inside the container there is usually no syslog; requests are audited
    // on the host side anyway.
    if !matches!(cli.command, Commands::InternalRequest { .. })
        && let Err(e) = telemetry::init_logger()
    {
        warn!("Audit logging to syslog unavailable: {}", e);
        telemetry::init_null_logger().context("Failed to initialize telemetry")?;
    }

    cli_handler::handle_command(cli.command, &config, &loader)
}

/// Initialize the tracing subscriber for diagnostic logging.
///
/// # Verbosity Levels
/// - 0 (default): `RUST_LOG`, then `general.log_level`, then warnings only
/// - 1 (-v): Info level
/// - 2 (-vv): Debug level
/// - 3+ (-vvv): Trace level
fn init_tracing(verbose: u8, configured: &str) -> Result<()> {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let filter = match verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(if configured.is_empty() { "warn" } else { configured })
        }),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .try_init()
        .context("Failed to initialize tracing subscriber")?;

    Ok(())
}
