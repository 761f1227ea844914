//! Reference driver: loads a configuration file, optionally runs one
//! script, then enters the event loop (spec §6, §9).

use clap::Parser;
use sheriff::bus::{Bus, InMemoryBus};
use sheriff::{EventLoop, Sheriff};
use std::path::PathBuf;
use tokio::sync::oneshot;
use tracing::{error, info};

/// `sheriff [config_file [script_name]]` (spec §6).
#[derive(Parser, Debug)]
#[command(author, about, long_about = None)]
struct Cli {
    /// Declarative configuration file to load at startup.
    config_file: Option<PathBuf>,
    /// Script to execute once, immediately after the config is loaded.
    script_name: Option<String>,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let mut sheriff = Sheriff::new();
    let (bus, _handle) = InMemoryBus::new();

    if let Some(path) = &cli.config_file {
        match load_config_file(&mut sheriff, &bus, path).await {
            Ok(()) => info!(path = %path.display(), "loaded configuration"),
            Err(err) => {
                error!(path = %path.display(), %err, "failed to load configuration");
                std::process::exit(1);
            }
        }
    }

    let mut event_loop = EventLoop::new(sheriff, bus);

    if let Some(script_name) = &cli.script_name {
        if let Err(err) = event_loop.execute_script(script_name) {
            error!(script = %script_name, %err, "script validation failed");
            std::process::exit(1);
        }
    }

    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    if let Err(err) = install_shutdown_handler(shutdown_tx) {
        error!(%err, "could not install signal handler");
        std::process::exit(1);
    }

    event_loop.run(shutdown_rx).await;
}

async fn load_config_file(sheriff: &mut Sheriff, bus: &dyn Bus, path: &PathBuf) -> sheriff::Result<()> {
    let text = std::fs::read_to_string(path)
        .map_err(|err| sheriff::SheriffError::InvalidArgument(err.to_string()))?;
    let config = sheriff::config::parse(&text)?;
    sheriff.load_config(bus, &config).await
}

fn install_shutdown_handler(tx: oneshot::Sender<()>) -> Result<(), ctrlc::Error> {
    let tx = std::sync::Mutex::new(Some(tx));
    ctrlc::set_handler(move || {
        if let Some(tx) = tx.lock().expect("shutdown handler lock poisoned").take() {
            let _ = tx.send(());
        }
    })
}
