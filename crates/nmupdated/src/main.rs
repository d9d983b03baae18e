// # nmupdated - DNS search domain daemon
//
// Keeps the DNS search domains of NetworkManager devices in sync with a
// YAML config file.
//
// This daemon is a thin integration layer:
// 1. Parse the command line and initialize logging
// 2. Load the config file and connect to NetworkManager (fatal on failure)
// 3. Start the nmupdate engine
// 4. Wait for SIGINT/SIGTERM and shut every task down before exiting
//
// ## Config file
//
// ```yaml
// tunnelPrefix: tun-
// tunnels:
//   - vpn0
// whitelist:
//   - corp.example.com
// ```
//
// ## Example
//
// ```bash
// nmupdated --config /etc/nmupdate/config.yaml --log-level debug
// ```

use anyhow::{Context, Result};
use clap::Parser;
use nmupdate_core::{ApplyMode, Engine, EngineConfig, EngineHandle};
use nmupdate_nmcli::{DEFAULT_NMCLI, NmcliDirectory, NmcliMutator};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

/// Exit codes for different termination scenarios
///
/// These codes follow systemd conventions:
/// - 0: Clean shutdown
/// - 1: Configuration or startup error
/// - 2: Runtime error (unexpected)
#[derive(Debug, Clone, Copy)]
enum NmupdateExitCode {
    /// Clean shutdown (normal exit)
    CleanShutdown = 0,
    /// Configuration error or startup failure
    ConfigError = 1,
    /// Runtime error (unexpected failure)
    RuntimeError = 2,
}

impl From<NmupdateExitCode> for ExitCode {
    fn from(code: NmupdateExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

/// Apply DNS search domains from a config file to matching network devices
#[derive(Debug, Parser)]
#[command(name = "nmupdated", version, about)]
struct Cli {
    /// Path to the YAML config file
    #[arg(long, env = "NMUPDATE_CONFIG")]
    config: PathBuf,

    /// Log level (overridden by RUST_LOG)
    #[arg(
        long,
        env = "NMUPDATE_LOG_LEVEL",
        default_value = "info",
        value_parser = ["trace", "debug", "info", "warn", "error"]
    )]
    log_level: String,

    /// Delay between device scans, in milliseconds
    #[arg(long, default_value_t = 1000, value_parser = clap::value_parser!(u64).range(1..))]
    scan_interval_ms: u64,

    /// How device updates are scheduled: "concurrent" or "latest"
    #[arg(long, default_value = "concurrent")]
    apply_mode: ApplyMode,

    /// Seconds to wait for tasks to stop on shutdown
    #[arg(long, default_value_t = 10)]
    shutdown_timeout_secs: u64,

    /// Path to the nmcli binary
    #[arg(long, default_value = DEFAULT_NMCLI)]
    nmcli: PathBuf,
}

impl Cli {
    fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            scan_interval_ms: self.scan_interval_ms,
            apply_mode: self.apply_mode,
            shutdown_timeout_secs: self.shutdown_timeout_secs,
            ..EngineConfig::default()
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if !cli.config.is_file() {
        eprintln!(
            "Configuration error: config file must be provided and must exist: {}",
            cli.config.display()
        );
        return NmupdateExitCode::ConfigError.into();
    }

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    if let Err(e) = tracing_subscriber::fmt().with_env_filter(filter).try_init() {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return NmupdateExitCode::ConfigError.into();
    }

    info!("Starting nmupdated");

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return NmupdateExitCode::RuntimeError.into();
        }
    };

    let result = rt.block_on(async {
        let engine = match start_engine(&cli).await {
            Ok(engine) => engine,
            Err(e) => {
                error!("Startup error: {:#}", e);
                return NmupdateExitCode::ConfigError;
            }
        };

        if let Err(e) = run_until_shutdown(engine, &cli).await {
            error!("Daemon error: {:#}", e);
            NmupdateExitCode::RuntimeError
        } else {
            NmupdateExitCode::CleanShutdown
        }
    });

    result.into()
}

/// Load the config, connect to NetworkManager and start the engine
async fn start_engine(cli: &Cli) -> Result<EngineHandle> {
    let initial = nmupdate_core::config::load(&cli.config).await;
    if initial.is_unset() {
        info!("Config is empty, waiting for changes before updating devices");
    } else {
        info!(
            prefix = %initial.prefix,
            tunnels = ?initial.tunnels,
            whitelist = ?initial.whitelist,
            "Config loaded"
        );
    }

    let directory = NmcliDirectory::connect(&cli.nmcli)
        .await
        .context("failed to connect to NetworkManager")?;
    let mutator = NmcliMutator::new(&cli.nmcli);

    let engine = Engine::new(
        &cli.config,
        initial,
        Arc::new(directory),
        Arc::new(mutator),
        cli.engine_config(),
    )
    .context("invalid engine settings")?;

    engine
        .start()
        .with_context(|| format!("failed to watch {}", cli.config.display()))
}

/// Wait for a shutdown signal, then stop the engine
async fn run_until_shutdown(engine: EngineHandle, cli: &Cli) -> Result<()> {
    let signal = wait_for_shutdown().await?;
    info!("Received shutdown signal: {}", signal);

    let timeout = cli.engine_config().shutdown_timeout();
    match tokio::time::timeout(timeout, engine.shutdown()).await {
        Ok(result) => result.context("engine did not stop cleanly"),
        Err(_) => Err(anyhow::anyhow!("Shutdown timeout after {:?}", timeout)),
    }
}

/// Wait for shutdown signals (SIGTERM, SIGINT)
///
/// # Returns
///
/// Returns the name of the signal received.
#[cfg(unix)]
async fn wait_for_shutdown() -> Result<&'static str> {
    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGTERM handler: {}", e))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGINT handler: {}", e))?;

    let received = tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    };
    Ok(received)
}

/// Wait for shutdown signals (SIGINT only)
///
/// Fallback implementation for non-Unix platforms.
#[cfg(not(unix))]
async fn wait_for_shutdown() -> Result<&'static str> {
    tokio::signal::ctrl_c()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to wait for CTRL-C: {}", e))?;
    Ok("SIGINT")
}
