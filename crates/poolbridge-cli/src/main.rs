//! `poolbridge` – pool controller HTTP bridge
//!
//! Entry point of the bridge.  It:
//!
//! 1. Loads `~/.poolbridge/config.toml` (or `--config <PATH>`), applying
//!    `POOLBRIDGE_*` environment overrides.
//! 2. Starts the **link supervisor**, which keeps the controller link alive
//!    and republishes its state into the shared store.
//! 3. Serves the HTTP API and event streams until **Ctrl-C** / `SIGTERM`,
//!    then cancels every task and exits.
//!
//! `poolbridge config init` writes a default config file;
//! `poolbridge config show` prints the effective configuration.

mod config;
mod telemetry;

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use poolbridge_cockpit::{BridgeError, BridgeServer};
use poolbridge_hal::{SimConnector, SimPanel};
use poolbridge_kernel::{CommandGate, LinkSlot, StateStore};
use poolbridge_middleware::{LinkSupervisor, SupervisorConfig};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Bridges a pool controller to HTTP clients
#[derive(Parser, Debug)]
#[command(name = "poolbridge")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Config file (defaults to `~/.poolbridge/config.toml`)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// HTTP port, overriding the config file and environment
    #[arg(long, global = true)]
    port: Option<u16>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the bridge (default)
    Serve,
    /// Inspect or create the config file
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[derive(Subcommand, Debug)]
enum ConfigCommand {
    /// Write a config file with default values
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Print the effective configuration
    Show,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let path = cli.config.clone().unwrap_or_else(config::config_path);

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(&path, cli.port),
        Command::Config(ConfigCommand::Init { force }) => init_config(&path, force),
        Command::Config(ConfigCommand::Show) => show_config(&path, cli.port),
    }
}

fn effective_config(path: &Path, port: Option<u16>) -> Result<config::Config, String> {
    let mut cfg = config::resolve(path)?;
    if let Some(port) = port {
        cfg.http_port = port;
    }
    Ok(cfg)
}

// ─────────────────────────────────────────────────────────────────────────────
// serve
// ─────────────────────────────────────────────────────────────────────────────

fn serve(path: &Path, port: Option<u16>) -> ExitCode {
    // Hold the guard until exit so pending spans are flushed.
    let _guard = telemetry::init_tracing("poolbridge");

    let cfg = match effective_config(path, port) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!(error = %e, "invalid configuration");
            return ExitCode::FAILURE;
        }
    };

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            error!(error = %e, "failed to start the Tokio runtime");
            return ExitCode::FAILURE;
        }
    };

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        if let Err(e) = ctrlc::set_handler(move || {
            info!("shutdown requested");
            cancel.cancel();
        }) {
            warn!(error = %e, "failed to install Ctrl-C handler; graceful shutdown unavailable");
        }
    }

    info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %path.display(),
        "poolbridge starting"
    );

    match runtime.block_on(run_bridge(cfg, cancel)) {
        Ok(()) => {
            info!("poolbridge stopped");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "bridge failed");
            ExitCode::FAILURE
        }
    }
}

/// Wire store, link slot, supervisor, and HTTP server together and run until
/// `cancel` fires.
async fn run_bridge(cfg: config::Config, cancel: CancellationToken) -> Result<(), BridgeError> {
    let store = Arc::new(StateStore::new());
    let slot = LinkSlot::new();

    let panel = Arc::new(SimPanel::new(cfg.sim_tick()));
    let supervisor = LinkSupervisor::new(
        Arc::new(SimConnector::new(panel)),
        Arc::clone(&store),
        slot.clone(),
    )
    .with_config(SupervisorConfig {
        retry_delay: cfg.reconnect_delay(),
    });
    let mut link_state = supervisor.subscribe_state();
    let supervisor_task = supervisor.spawn(cancel.clone());

    // Ends when the supervisor drops its sender.
    tokio::spawn(async move {
        while link_state.changed().await.is_ok() {
            let state = *link_state.borrow_and_update();
            debug!(?state, "controller link state changed");
        }
    });

    let result = BridgeServer::new(store, CommandGate::new(slot))
        .with_bind_address(cfg.bind_address)
        .with_port(cfg.http_port)
        .with_stream_interval(cfg.stream_interval())
        .with_max_body_bytes(cfg.max_body_bytes)
        .run(cancel.clone())
        .await;

    // A failed bind must stop the supervisor too.
    cancel.cancel();
    if let Err(e) = supervisor_task.await {
        error!(error = %e, "link supervisor task failed");
    }
    result
}

// ─────────────────────────────────────────────────────────────────────────────
// config
// ─────────────────────────────────────────────────────────────────────────────

fn init_config(path: &Path, force: bool) -> ExitCode {
    match write_default_config(path, force) {
        Ok(()) => {
            println!("Config saved to {}", path.display());
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn write_default_config(path: &Path, force: bool) -> Result<(), String> {
    if path.exists() && !force {
        return Err(format!(
            "Config already exists at {} (use --force to overwrite)",
            path.display()
        ));
    }
    config::save_to(&config::Config::default(), path)
}

fn show_config(path: &Path, port: Option<u16>) -> ExitCode {
    match effective_config(path, port).and_then(|cfg| config::to_toml(&cfg)) {
        Ok(rendered) => {
            println!("# {}", path.display());
            print!("{rendered}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Config error: {e}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_subcommand_means_serve() {
        let cli = Cli::try_parse_from(["poolbridge"]).unwrap();
        assert!(cli.command.is_none());
        assert!(cli.port.is_none());
    }

    #[test]
    fn global_flags_parse_after_subcommands() {
        let cli = Cli::try_parse_from(["poolbridge", "config", "show", "--port", "8080", "--config", "/tmp/pb.toml"])
            .unwrap();
        assert!(matches!(cli.command, Some(Command::Config(ConfigCommand::Show))));
        assert_eq!(cli.port, Some(8080));
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/pb.toml")));
    }

    #[test]
    fn init_accepts_force() {
        let cli = Cli::try_parse_from(["poolbridge", "config", "init", "--force"]).unwrap();
        assert!(matches!(
            cli.command,
            Some(Command::Config(ConfigCommand::Init { force: true }))
        ));
    }

    #[test]
    fn port_flag_wins_over_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "http_port = 9000\n").unwrap();

        assert_eq!(effective_config(&path, Some(7000)).unwrap().http_port, 7000);
    }

    #[test]
    fn init_refuses_to_overwrite_without_force() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "http_port = 9000\n").unwrap();

        assert!(write_default_config(&path, false).unwrap_err().contains("--force"));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "http_port = 9000\n");

        write_default_config(&path, true).unwrap();
        assert_eq!(config::read_from(&path).unwrap(), Some(config::Config::default()));
    }

    #[tokio::test]
    async fn bind_failure_stops_the_bridge() {
        let taken = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let cfg = config::Config {
            bind_address: "127.0.0.1".parse().unwrap(),
            http_port: taken.local_addr().unwrap().port(),
            ..config::Config::default()
        };
        let result = run_bridge(cfg, CancellationToken::new()).await;
        assert!(matches!(result, Err(BridgeError::Bind { .. })));
    }
}
