//! rhino-dispatch - front-end dispatcher for geometry compute workers

mod cli;
mod config;
mod error;
mod logging;
mod pool;
mod server;

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use owo_colors::{OwoColorize, Stream::Stderr};

use cli::Cli;
use config::ServiceConfig;
use pool::{LifecycleController, PoolConfig, Scheduler};

fn main() {
    let cli = Cli::parse();
    logging::init(cli.log_config());

    if let Err(e) = run(&cli) {
        eprintln!(
            "{}: {}",
            "error"
                .if_supports_color(Stderr, |text| text.red())
                .if_supports_color(Stderr, |text| text.bold()),
            e
        );
        // Print the error chain if there are causes
        for cause in e.chain().skip(1) {
            eprintln!(
                "  {}: {}",
                "caused by".if_supports_color(Stderr, |text| text.yellow()),
                cause
            );
        }
        std::process::exit(1);
    }
}

fn run(cli: &Cli) -> Result<()> {
    let config = ServiceConfig::from_cli(cli);
    let pool_config = PoolConfig::default();
    let reap_interval = pool_config.reap_interval;

    let scheduler = Arc::new(Scheduler::new(config.clone(), pool_config)?);

    // Optionally pay the first spawn up front so the first request does
    // not wait on worker startup.
    if config.spawn_on_startup {
        tracing::info!("spawning startup worker");
        scheduler.seed_blocking()?;
    }

    let mut controller = LifecycleController::start(scheduler.clone(), reap_interval);

    let state = Arc::new(server::AppState::new(scheduler.clone(), config));
    let rt = tokio::runtime::Runtime::new().expect("Failed to create Tokio runtime");
    let result = rt.block_on(server::run_server(state));

    // Stop the reaper before killing children so it cannot respawn them.
    controller.stop();
    scheduler.shutdown();

    result?;
    Ok(())
}
