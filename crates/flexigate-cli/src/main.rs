//! `flexigate-cli` – FlexiGate process entry point
//!
//! 1. Initialises logging (see `flexigate_runtime::telemetry`).
//! 2. Loads the gateway configuration; writes a default file on first run.
//! 3. Connects to the safety controller.  A failed connection is fatal: the
//!    process exits with status 1 before any control cycle runs.
//! 4. Serves the newline-delimited JSON console on stdin.
//! 5. On Ctrl-C (or a `quit` command) shuts the session down gracefully.

mod config;
mod console;

use std::process::ExitCode;
use std::sync::Arc;

use colored::Colorize;
use flexigate_hal::TcpTransport;
use flexigate_runtime::{init_tracing, GatewaySession};
use tokio::sync::watch;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> ExitCode {
    let _tracing = init_tracing("flexigate");
    print_banner();

    let path = config::resolve_path(std::env::args().nth(1));
    let cfg = match config::load(&path) {
        Ok(Some(cfg)) => {
            info!(path = %path.display(), "config loaded");
            cfg
        }
        Ok(None) => {
            match config::save_to(&config::Config::default(), &path) {
                Ok(()) => info!(path = %path.display(), "wrote default config"),
                Err(e) => warn!(error = %e, "could not write default config"),
            }
            let mut cfg = config::Config::default();
            config::apply_env_overrides(&mut cfg);
            cfg
        }
        Err(e) => {
            error!(error = %e, path = %path.display(), "cannot load config");
            return ExitCode::FAILURE;
        }
    };

    let (gateway_config, connection) = match cfg.validate() {
        Ok(parts) => parts,
        Err(e) => {
            error!(error = %e, "invalid configuration");
            return ExitCode::FAILURE;
        }
    };

    let transport = Arc::new(TcpTransport::new(cfg.connect_timeout()));
    let session = match GatewaySession::new(gateway_config, transport) {
        Ok(session) => Arc::new(session),
        Err(e) => {
            error!(error = %e, "invalid zone settings");
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = session.configure(&connection).await {
        error!(error = %e, "could not start gateway session");
        return ExitCode::FAILURE;
    }

    let (stop_tx, mut stop_rx) = watch::channel(false);
    let ctrlc_tx = stop_tx.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        eprintln!();
        eprintln!("{}", "⚠  Ctrl-C received – shutting down …".yellow().bold());
        ctrlc_tx.send_replace(true);
    }) {
        warn!(error = %e, "failed to install Ctrl-C handler; use the quit command to stop");
    }

    let console = tokio::spawn(console::run(Arc::clone(&session), stop_tx));

    if stop_rx.wait_for(|stop| *stop).await.is_err() {
        warn!("stop signal channel closed");
    }
    session.shutdown().await;
    console.abort();
    eprintln!("{}", "  ✓ Gateway stopped.".green());
    ExitCode::SUCCESS
}

fn print_banner() {
    eprintln!();
    eprintln!("  {} {}",
        "FlexiGate".bold().cyan(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
    eprintln!("  Safety controller gateway");
    eprintln!();
}
