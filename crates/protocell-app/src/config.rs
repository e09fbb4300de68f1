use std::fs;
use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use protocell_core::SimConfig;

#[derive(Parser, Debug)]
#[command(
    name = "protocell",
    version,
    about = "Evolving protocell colonies, one world per connected viewer"
)]
pub struct Cli {
    #[command(flatten)]
    pub sim: SimArgs,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Serve the WebSocket endpoint; every viewer gets its own world.
    Serve {
        #[arg(long, env = "PROTOCELL_BIND", default_value = "127.0.0.1:8080")]
        bind: SocketAddr,
    },
    /// Run one world headless, write it to disk and read it back.
    Simulate {
        #[arg(long, default_value_t = 1_000)]
        steps: u64,
        #[arg(long, default_value = "simulation_state.json")]
        output: PathBuf,
    },
}

/// Simulation settings shared by every subcommand.
#[derive(Args, Debug, Clone)]
pub struct SimArgs {
    /// JSON file overriding the built-in simulation defaults.
    #[arg(long, env = "PROTOCELL_CONFIG")]
    pub config: Option<PathBuf>,
    /// Directory receiving automatic snapshots.
    #[arg(long, env = "PROTOCELL_SAVES_DIR", default_value = "saves")]
    pub saves_dir: PathBuf,
    #[arg(long, env = "PROTOCELL_SEED")]
    pub seed: Option<u64>,
    #[arg(long)]
    pub width: Option<u32>,
    #[arg(long)]
    pub height: Option<u32>,
    /// Disable periodic snapshots.
    #[arg(long)]
    pub no_auto_save: bool,
    /// Ticks between automatic snapshots.
    #[arg(long)]
    pub save_period: Option<u64>,
    #[arg(long)]
    pub fps: Option<u32>,
}

impl SimArgs {
    /// Layers the optional config file and the flags over the defaults.
    pub fn resolve(&self) -> Result<SimConfig> {
        let mut config = match &self.config {
            Some(path) => {
                let raw = fs::read_to_string(path)
                    .with_context(|| format!("failed to read {}", path.display()))?;
                serde_json::from_str::<SimConfig>(&raw)
                    .with_context(|| format!("failed to parse {}", path.display()))?
            }
            None => SimConfig::default(),
        };
        if let Some(seed) = self.seed {
            config.rng_seed = Some(seed);
        }
        if let Some(width) = self.width {
            config.world_width = width;
        }
        if let Some(height) = self.height {
            config.world_height = height;
        }
        if self.no_auto_save {
            config.auto_save = false;
        }
        if let Some(period) = self.save_period {
            config.save_period = period;
        }
        if let Some(fps) = self.fps {
            config.fps = fps;
        }
        config.validate().context("invalid simulation config")?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn serve_defaults_to_local_bind() {
        let cli = Cli::try_parse_from(["protocell", "serve"]).expect("parse");
        match cli.command {
            Command::Serve { bind } => assert_eq!(bind.to_string(), "127.0.0.1:8080"),
            other => panic!("unexpected command {other:?}"),
        }
        assert_eq!(cli.sim.saves_dir, PathBuf::from("saves"));
        let config = cli.sim.resolve().expect("config");
        assert_eq!(config, SimConfig::default());
    }

    #[test]
    fn flags_override_the_config_file() {
        let mut file = tempfile::NamedTempFile::new().expect("tempfile");
        write!(file, r#"{{"world_width": 30, "fps": 20, "cells_limit": 64}}"#).expect("write");
        let path = file.path().to_string_lossy().into_owned();
        let cli = Cli::try_parse_from([
            "protocell",
            "--config",
            path.as_str(),
            "--seed",
            "9",
            "--fps",
            "30",
            "--no-auto-save",
            "simulate",
            "--steps",
            "25",
        ])
        .expect("parse");
        let config = cli.sim.resolve().expect("config");
        assert_eq!(config.world_width, 30);
        assert_eq!(config.cells_limit, 64);
        assert_eq!(config.fps, 30);
        assert_eq!(config.rng_seed, Some(9));
        assert!(!config.auto_save);
        assert!(matches!(cli.command, Command::Simulate { steps: 25, .. }));
    }

    #[test]
    fn invalid_overrides_are_rejected() {
        let cli = Cli::try_parse_from(["protocell", "--width", "0", "serve"]).expect("parse");
        assert!(cli.sim.resolve().is_err());
    }
}
