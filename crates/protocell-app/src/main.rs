use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use protocell_app::config::{Cli, Command};
use protocell_app::{AppState, SessionSettings, run_headless, serve};
use protocell_core::SnapshotStore;
use protocell_storage::DirectoryStore;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let config = cli.sim.resolve()?;
    let store = DirectoryStore::open(&cli.sim.saves_dir)
        .with_context(|| format!("failed to open {}", cli.sim.saves_dir.display()))?;
    info!(
        saves = %store.root().display(),
        width = config.world_width,
        height = config.world_height,
        auto_save = config.auto_save,
        "protocell configured"
    );

    match cli.command {
        Command::Serve { bind } => {
            let settings = SessionSettings::new(
                config,
                Arc::new(move || Box::new(store.clone()) as Box<dyn SnapshotStore>),
            );
            serve(bind, AppState::new(settings)).await
        }
        Command::Simulate { steps, output } => {
            let summary = tokio::task::spawn_blocking(move || {
                run_headless(config, Box::new(store), steps, &output)
            })
            .await
            .context("simulation task panicked")??;
            info!(
                identity = %summary.identity,
                tick = summary.restored_tick.0,
                population = summary.population,
                "headless run complete"
            );
            Ok(())
        }
    }
}
