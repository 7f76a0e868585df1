// SPDX-License-Identifier: MIT OR Apache-2.0
//! DIANNE Builder - console front end
//!
//! Edits a neural network the way the web builder does:
//! - Build: add modules and blocks, chain modules, configure properties
//! - Deploy: place modules on runtime targets
//! - Learn: train and evaluate through trainer and evaluator blocks
//! - Run: forward drawings, URLs and dataset samples, watch the outputs
//!
//! ## Architecture
//!
//! The console drives an [`EditingSession`] backed by an in-process
//! [`backend::OfflineBackend`]; every collaborator sits behind a service
//! trait, so a networked backend plugs into the same session.

mod backend;
mod console;

use backend::OfflineBackend;
use console::Console;
use dianne_builder_session::config::CONFIG_FILE_NAME;
use dianne_builder_session::{BuilderConfig, DianneRpc, EditingSession, Services};
use std::io::Write as _;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::AsyncBufReadExt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

fn init_logging(directive: &str) {
    let mut env_filter = tracing_subscriber::EnvFilter::from_default_env();
    match directive.parse() {
        Ok(directive) => env_filter = env_filter.add_directive(directive),
        Err(e) => eprintln!("Ignoring log filter {directive:?}: {e}"),
    }

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn prompt(console: &Console) {
    let mode = console.session().graph().mode();
    print!("{} [{mode}]> ", console.session().name());
    let _ = std::io::stdout().flush();
}

#[tokio::main]
async fn main() {
    let config_path = std::env::args()
        .nth(1)
        .map_or_else(|| PathBuf::from(CONFIG_FILE_NAME), PathBuf::from);
    let config = match BuilderConfig::load_or_default(&config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Cannot read {}: {e}", config_path.display());
            std::process::exit(1);
        }
    };

    init_logging(&config.log_filter);
    tracing::info!("Starting DIANNE Builder v{}", env!("CARGO_PKG_VERSION"));

    let backend = Arc::new(OfflineBackend::new(&config));
    let rpc = DianneRpc::with_timeout(backend.clone(), config.server.rpc_timeout());
    let mut session = EditingSession::new(config, Services::from_backend(backend));
    if let Err(e) = session.refresh_catalog().await {
        tracing::warn!("Module catalog unavailable: {e}");
    }

    let mut console = Console::new(session, rpc);
    println!("Type `help` for a list of commands");

    let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
    loop {
        prompt(&console);
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                tracing::error!("Cannot read input: {e}");
                break;
            }
        };

        match console.execute(&line).await {
            Ok(output) => {
                for line in output {
                    println!("{line}");
                }
            }
            Err(e) => println!("Error: {e}"),
        }
        if console.should_quit() {
            break;
        }
    }

    tracing::info!("Builder closed");
}
