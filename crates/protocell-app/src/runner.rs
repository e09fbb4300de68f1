use std::path::Path;
use std::time::Instant;

use anyhow::{Context, Result};
use protocell_core::{NullStore, SimConfig, SnapshotStore, Tick, World};
use protocell_storage::{load_world_file, save_world_file};
use tracing::info;

const REPORT_EVERY: u64 = 10;

/// Outcome of a headless run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeadlessSummary {
    pub identity: String,
    pub final_tick: Tick,
    pub restored_tick: Tick,
    pub population: usize,
}

/// Populates a world, advances it `steps` ticks, writes it to `output` and
/// reloads the file to confirm it decodes.
pub fn run_headless(
    config: SimConfig,
    store: Box<dyn SnapshotStore>,
    steps: u64,
    output: &Path,
) -> Result<HeadlessSummary> {
    let mut world =
        World::with_store(config.clone(), store).context("failed to create world")?;
    world.populate();

    let started = Instant::now();
    let mut window = Instant::now();
    for step in 1..=steps {
        let events = world.update().context("tick failed")?;
        if step.is_multiple_of(REPORT_EVERY) {
            let rate = REPORT_EVERY as f64 / window.elapsed().as_secs_f64().max(f64::EPSILON);
            info!(
                tick = events.tick.0,
                population = events.population,
                ticks_per_sec = rate,
                "simulation progress"
            );
            window = Instant::now();
        }
    }
    info!(
        steps,
        elapsed_ms = started.elapsed().as_secs_f64() * 1_000.0,
        "simulation finished"
    );

    save_world_file(output, &world.to_snapshot())
        .with_context(|| format!("failed to write {}", output.display()))?;
    let snapshot = load_world_file(output)
        .with_context(|| format!("failed to read back {}", output.display()))?;
    let restored = World::from_snapshot(snapshot, config, Box::new(NullStore))
        .context("saved world did not decode")?;
    info!(tick = restored.tick().0, path = %output.display(), "restored tick");

    Ok(HeadlessSummary {
        identity: world.identity().to_owned(),
        final_tick: world.tick(),
        restored_tick: restored.tick(),
        population: restored.environment().live_count(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn headless_run_writes_a_reloadable_world() {
        let dir = tempfile::tempdir().expect("tempdir");
        let output = dir.path().join("out").join("world.json");
        let config = SimConfig {
            world_width: 20,
            world_height: 20,
            initial_cells: 10,
            auto_save: false,
            rng_seed: Some(11),
            ..SimConfig::default()
        };
        let summary = run_headless(config, Box::new(NullStore), 12, &output).expect("run");
        assert_eq!(summary.final_tick, summary.restored_tick);
        assert!(output.exists());
        assert!(!summary.identity.is_empty());
    }
}
