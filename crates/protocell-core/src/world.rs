//! The world: tick driver, auto-save, auto-recovery and full-state snapshots.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use rand::{Rng, rngs::SmallRng};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::cell::Cell;
use crate::config::SimConfig;
use crate::environment::{Environment, EnvironmentState};
use crate::persistence::{NullStore, SnapshotStore};
use crate::substance::{Catalog, Substance, SubstanceKind};
use crate::{Tick, WorldError};

const SEED_CONCENTRATION: std::ops::Range<f64> = 0.1..100.0;

/// Full serialized world state, used for persistence, recovery and the
/// session save/load commands.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldSnapshot {
    pub tick: Tick,
    #[serde(default)]
    pub tick_time_ms: f64,
    pub environment: EnvironmentState,
    /// Chemistry catalog; the stock catalog is used when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub substances: Option<Catalog>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,
}

/// Summary of what a single [`World::update`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TickEvents {
    /// Tick the world is at after the update.
    pub tick: Tick,
    pub population: usize,
    pub births: usize,
    pub deaths: usize,
    /// Set when the population collapsed and a snapshot was restored.
    pub restored_from: Option<Tick>,
    /// A scheduled snapshot was written this tick.
    pub persisted: bool,
}

struct Restored {
    environment: Environment,
    tick: Tick,
    tick_time_ms: f64,
    identity: String,
    catalog: Arc<Catalog>,
}

/// Owns one environment and advances it one tick per [`World::update`].
pub struct World {
    environment: Environment,
    tick: Tick,
    tick_time_ms: f64,
    identity: String,
    config: Arc<SimConfig>,
    catalog: Arc<Catalog>,
    rng: SmallRng,
    store: Box<dyn SnapshotStore>,
}

impl fmt::Debug for World {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("World")
            .field("identity", &self.identity)
            .field("tick", &self.tick)
            .field("tick_time_ms", &self.tick_time_ms)
            .field("live", &self.environment.live_count())
            .finish_non_exhaustive()
    }
}

fn new_identity() -> String {
    Uuid::new_v4().to_string()
}

impl World {
    /// Creates an empty world that never persists.
    pub fn new(config: SimConfig) -> Result<Self, WorldError> {
        Self::with_store(config, Box::new(NullStore))
    }

    /// Creates an empty world backed by `store` for auto-save and recovery.
    pub fn with_store(
        config: SimConfig,
        store: Box<dyn SnapshotStore>,
    ) -> Result<Self, WorldError> {
        config.validate()?;
        let rng = config.seeded_rng();
        let catalog = Arc::new(Catalog::standard(config.unique_inorganic_count));
        let config = Arc::new(config);
        let environment = Environment::new(Arc::clone(&config), Arc::clone(&catalog));
        Ok(Self {
            environment,
            tick: Tick::zero(),
            tick_time_ms: 0.0,
            identity: new_identity(),
            config,
            catalog,
            rng,
            store,
        })
    }

    /// Rebuilds a world from a snapshot. Tunables come from `config`; the
    /// grid size, cells, chemistry, tick and identity come from the snapshot.
    pub fn from_snapshot(
        snapshot: WorldSnapshot,
        config: SimConfig,
        store: Box<dyn SnapshotStore>,
    ) -> Result<Self, WorldError> {
        config.validate()?;
        let rng = config.seeded_rng();
        let config = Arc::new(config);
        let restored = Self::decode(snapshot, &config)?;
        Ok(Self {
            environment: restored.environment,
            tick: restored.tick,
            tick_time_ms: restored.tick_time_ms,
            identity: restored.identity,
            config,
            catalog: restored.catalog,
            rng,
            store,
        })
    }

    fn decode(snapshot: WorldSnapshot, config: &Arc<SimConfig>) -> Result<Restored, WorldError> {
        let catalog = snapshot
            .substances
            .unwrap_or_else(|| Catalog::standard(config.unique_inorganic_count));
        if !catalog.has_usable_organic() {
            return Err(WorldError::InvalidState(
                "substance catalog has no organic substance with positive energy".to_owned(),
            ));
        }
        let catalog = Arc::new(catalog);
        let environment = Environment::from_state(
            snapshot.environment,
            Arc::clone(config),
            Arc::clone(&catalog),
        )?;
        Ok(Restored {
            environment,
            tick: snapshot.tick,
            tick_time_ms: snapshot.tick_time_ms,
            identity: snapshot.uuid.unwrap_or_else(new_identity),
            catalog,
        })
    }

    /// Scatters the configured substance sources and seeds the initial cells.
    pub fn populate(&mut self) {
        let width = self.environment.grid().width() as i32;
        let height = self.environment.grid().height() as i32;
        let distribution = self.config.substance_distribution;
        for (kind, count) in [
            (SubstanceKind::Organic, distribution.organic),
            (SubstanceKind::Toxin, distribution.toxin),
            (SubstanceKind::Inorganic, distribution.inorganic),
        ] {
            for _ in 0..count {
                let Some((name, def)) = self.catalog.random_of_kind(kind, &mut self.rng) else {
                    break;
                };
                let concentration = self.rng.random_range(SEED_CONCENTRATION);
                let x = self.rng.random_range(0..width);
                let y = self.rng.random_range(0..height);
                self.environment
                    .add_substance(x, y, Substance::from_def(name, def, concentration));
            }
        }

        for _ in 0..self.config.initial_cells {
            let x = self.rng.random_range(0..width);
            let y = self.rng.random_range(0..height);
            let cell = Cell::random(
                x,
                y,
                &self.catalog,
                self.config.include_base_genes,
                &mut self.rng,
            );
            if !self.environment.add_cell(cell) {
                break;
            }
        }
        self.environment.promote_nursery();
        self.environment.refresh_stats();
        info!(
            identity = %self.identity,
            cells = self.environment.live_count(),
            substances = self.environment.grid().occupied_locations(),
            "world populated"
        );
    }

    /// Advances one tick: cells, physics, ambient spawning, chemistry, stats.
    ///
    /// When the population has collapsed the latest snapshot for this world's
    /// identity is restored instead. Only a failed scheduled save is an error.
    pub fn update(&mut self) -> Result<TickEvents, WorldError> {
        let started = Instant::now();
        self.tick = self.tick.next();

        let census = self.environment.update_cells(&mut self.rng);
        self.environment.apply_physics();
        self.environment.spawn_random_organic(&mut self.rng);
        self.environment.decay_and_diffuse();
        self.environment.refresh_stats();

        let mut events = TickEvents {
            tick: self.tick,
            population: self.environment.live_count(),
            births: census.births,
            deaths: census.deaths,
            restored_from: None,
            persisted: false,
        };

        if self.environment.live_count() == 0 {
            events.restored_from = self.restore_latest();
            events.tick = self.tick;
            events.population = self.environment.live_count();
            return Ok(events);
        }

        if self.config.auto_save && self.tick.0.is_multiple_of(self.config.save_period) {
            self.persist()?;
            events.persisted = true;
        }

        self.tick_time_ms = started.elapsed().as_secs_f64() * 1_000.0;
        Ok(events)
    }

    fn persist(&mut self) -> Result<(), WorldError> {
        let snapshot = self.to_snapshot();
        self.store.save(&self.identity, self.tick, &snapshot)?;
        info!(identity = %self.identity, tick = self.tick.0, "world snapshot written");
        Ok(())
    }

    fn restore_latest(&mut self) -> Option<Tick> {
        let snapshot = match self.store.latest(&self.identity) {
            Ok(Some(snapshot)) => snapshot,
            Ok(None) => {
                debug!(
                    identity = %self.identity,
                    "population collapsed with no snapshot to restore"
                );
                return None;
            }
            Err(err) => {
                warn!(identity = %self.identity, error = %err, "failed to read latest snapshot");
                return None;
            }
        };
        match Self::decode(snapshot, &self.config) {
            Ok(restored) => {
                self.environment = restored.environment;
                self.tick = restored.tick;
                self.tick_time_ms = restored.tick_time_ms;
                self.identity = restored.identity;
                self.catalog = restored.catalog;
                info!(
                    identity = %self.identity,
                    tick = self.tick.0,
                    "world restored after collapse"
                );
                Some(self.tick)
            }
            Err(err) => {
                warn!(identity = %self.identity, error = %err, "latest snapshot is unusable");
                None
            }
        }
    }

    #[must_use]
    pub fn to_snapshot(&self) -> WorldSnapshot {
        WorldSnapshot {
            tick: self.tick,
            tick_time_ms: self.tick_time_ms,
            environment: self.environment.to_state(),
            substances: Some(self.catalog.as_ref().clone()),
            uuid: Some(self.identity.clone()),
        }
    }

    /// Swaps the snapshot store.
    pub fn set_store(&mut self, store: Box<dyn SnapshotStore>) {
        self.store = store;
    }

    #[must_use]
    pub const fn tick(&self) -> Tick {
        self.tick
    }

    /// Wall-clock duration of the last completed tick.
    #[must_use]
    pub const fn tick_time_ms(&self) -> f64 {
        self.tick_time_ms
    }

    /// Random identity scoping this world's snapshots.
    #[must_use]
    pub fn identity(&self) -> &str {
        &self.identity
    }

    #[must_use]
    pub fn environment(&self) -> &Environment {
        &self.environment
    }

    pub fn environment_mut(&mut self) -> &mut Environment {
        &mut self.environment
    }

    #[must_use]
    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    #[must_use]
    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::Position;
    use crate::config::SubstanceDistribution;
    use crate::persistence::{MemoryStore, SnapshotError};

    fn quiet_config(save_period: u64) -> SimConfig {
        SimConfig {
            world_width: 12,
            world_height: 12,
            initial_cells: 0,
            organic_spawn_probability: 0.0,
            substance_distribution: SubstanceDistribution {
                organic: 0,
                toxin: 0,
                inorganic: 0,
            },
            save_period,
            rng_seed: Some(17),
            ..SimConfig::default()
        }
    }

    fn seed_idle_cells(world: &mut World, count: usize) {
        for index in 0..count {
            let position = Position::new(2.0 + 3.0 * index as f64, 6.0);
            world
                .environment_mut()
                .add_cell(Cell::new(position, Vec::new()));
        }
        world.environment_mut().promote_nursery();
    }

    struct FailingStore;

    impl SnapshotStore for FailingStore {
        fn save(&mut self, _: &str, _: Tick, _: &WorldSnapshot) -> Result<(), SnapshotError> {
            Err(SnapshotError::Backend("disk full".to_owned()))
        }

        fn latest(&self, _: &str) -> Result<Option<WorldSnapshot>, SnapshotError> {
            Ok(None)
        }
    }

    #[test]
    fn update_advances_tick_and_stats() {
        let mut world = World::new(quiet_config(1_000)).expect("world");
        seed_idle_cells(&mut world, 3);
        let events = world.update().expect("tick");
        assert_eq!(events.tick, Tick(1));
        assert_eq!(events.population, 3);
        assert_eq!(world.environment().stats().cells_total, 3);
        assert!(world.tick_time_ms() >= 0.0);
    }

    #[test]
    fn auto_save_runs_on_period() {
        let store = MemoryStore::new();
        let mut world =
            World::with_store(quiet_config(4), Box::new(store.clone())).expect("world");
        seed_idle_cells(&mut world, 2);
        for _ in 0..9 {
            world.update().expect("tick");
        }
        assert_eq!(store.ticks(world.identity()).expect("ticks"), vec![Tick(4), Tick(8)]);
    }

    #[test]
    fn collapse_restores_latest_snapshot() {
        let store = MemoryStore::new();
        let mut world =
            World::with_store(quiet_config(5), Box::new(store.clone())).expect("world");
        seed_idle_cells(&mut world, 3);
        let identity = world.identity().to_owned();
        for _ in 0..7 {
            world.update().expect("tick");
        }
        for cell in world.environment_mut().cells_mut() {
            cell.health = 0.0;
        }

        let events = world.update().expect("collapse tick");
        assert_eq!(events.restored_from, Some(Tick(5)));
        assert_eq!(world.tick(), Tick(5));
        assert_eq!(world.identity(), identity);
        assert_eq!(world.environment().live_count(), 3);
    }

    #[test]
    fn collapse_without_snapshot_is_quiet() {
        let mut world = World::new(quiet_config(5)).expect("world");
        let events = world.update().expect("tick");
        assert_eq!(events.restored_from, None);
        assert_eq!(world.tick(), Tick(1));
        assert_eq!(world.environment().live_count(), 0);
    }

    #[test]
    fn failed_auto_save_is_propagated() {
        let mut world = World::with_store(quiet_config(2), Box::new(FailingStore)).expect("world");
        seed_idle_cells(&mut world, 1);
        world.update().expect("first tick does not save");
        let err = world.update().expect_err("save failure surfaces");
        assert!(matches!(err, WorldError::Persistence(_)));
    }

    #[test]
    fn snapshot_rejects_catalog_without_food() {
        let world = World::new(quiet_config(10)).expect("world");
        let mut snapshot = world.to_snapshot();
        snapshot.substances = Some(Catalog::default());
        let err = World::from_snapshot(snapshot, quiet_config(10), Box::new(NullStore))
            .expect_err("unusable catalog");
        assert!(matches!(err, WorldError::InvalidState(_)));
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = SimConfig {
            world_width: 0,
            ..SimConfig::default()
        };
        assert!(matches!(World::new(config), Err(WorldError::InvalidConfig(_))));
    }
}
