//! The environment: the substance grid plus the cell population living on it.

use std::f64::consts::TAU;
use std::sync::Arc;

use rand::{Rng, RngCore};
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::cell::{Cell, CellRecord};
use crate::config::SimConfig;
use crate::grid::{GridState, SubstanceGrid};
use crate::stats::EnvStats;
use crate::substance::{Catalog, Substance};
use crate::WorldError;

/// Cells closer than this multiple of the radius push each other apart.
const REPULSION_RANGE: f64 = 1.8;
/// Distinct fallback headings used when two cells sit exactly on top of each other.
const COINCIDENT_HEADINGS: usize = 8;

/// Everything a cell may touch while it is being updated.
pub struct TickContext<'a> {
    pub grid: &'a mut SubstanceGrid,
    /// Cells born this tick; promoted to the live set once every live cell ran.
    pub nursery: &'a mut Vec<Cell>,
    /// Size of the live set at the start of the update pass.
    pub live_population: usize,
    pub config: &'a SimConfig,
    pub catalog: &'a Catalog,
    pub rng: &'a mut dyn RngCore,
}

impl TickContext<'_> {
    /// Live plus buffered cells.
    #[must_use]
    pub fn population(&self) -> usize {
        self.live_population + self.nursery.len()
    }
}

/// Births and deaths observed during one update pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CellCensus {
    pub births: usize,
    pub deaths: usize,
}

/// Grid plus population, with the per-tick stages the world drives.
#[derive(Debug, Clone)]
pub struct Environment {
    grid: SubstanceGrid,
    cells: Vec<Cell>,
    nursery: Vec<Cell>,
    stats: EnvStats,
    config: Arc<SimConfig>,
    catalog: Arc<Catalog>,
}

impl Environment {
    #[must_use]
    pub fn new(config: Arc<SimConfig>, catalog: Arc<Catalog>) -> Self {
        let grid = SubstanceGrid::new(config.world_width, config.world_height);
        let mut environment = Self {
            grid,
            cells: Vec::new(),
            nursery: Vec::new(),
            stats: EnvStats::default(),
            config,
            catalog,
        };
        environment.refresh_stats();
        environment
    }

    #[must_use]
    pub fn grid(&self) -> &SubstanceGrid {
        &self.grid
    }

    pub fn grid_mut(&mut self) -> &mut SubstanceGrid {
        &mut self.grid
    }

    /// Live cells, in update order.
    #[must_use]
    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    pub fn cells_mut(&mut self) -> &mut [Cell] {
        &mut self.cells
    }

    /// Cells waiting to join the live set.
    #[must_use]
    pub fn nursery(&self) -> &[Cell] {
        &self.nursery
    }

    #[must_use]
    pub fn stats(&self) -> &EnvStats {
        &self.stats
    }

    #[must_use]
    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    #[must_use]
    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    #[must_use]
    pub fn live_count(&self) -> usize {
        self.cells.len()
    }

    /// Live plus buffered cells.
    #[must_use]
    pub fn population(&self) -> usize {
        self.cells.len() + self.nursery.len()
    }

    /// Buffers a cell for the next promotion. Returns `false` when the
    /// population ceiling is reached.
    pub fn add_cell(&mut self, cell: Cell) -> bool {
        if self.population() >= self.config.cells_limit {
            return false;
        }
        self.nursery.push(cell);
        true
    }

    /// Moves every buffered cell into the live set.
    pub fn promote_nursery(&mut self) -> usize {
        let promoted = self.nursery.len();
        self.cells.append(&mut self.nursery);
        promoted
    }

    pub fn add_substance(&mut self, x: i32, y: i32, substance: Substance) {
        self.grid.add(x, y, substance);
    }

    /// Updates every live cell, promotes the newborn and drops the dead.
    pub fn update_cells(&mut self, rng: &mut dyn RngCore) -> CellCensus {
        let mut ctx = TickContext {
            grid: &mut self.grid,
            nursery: &mut self.nursery,
            live_population: self.cells.len(),
            config: &self.config,
            catalog: &self.catalog,
            rng,
        };
        for cell in &mut self.cells {
            cell.update(&mut ctx);
        }

        let births = self.promote_nursery();
        let before = self.cells.len();
        self.cells.retain(Cell::is_alive);
        let census = CellCensus {
            births,
            deaths: before - self.cells.len(),
        };
        trace!(
            births = census.births,
            deaths = census.deaths,
            live = self.cells.len(),
            "cells updated"
        );
        census
    }

    /// Pairwise repulsion between overlapping live cells.
    pub fn apply_physics(&mut self) {
        let min_distance = REPULSION_RANGE * self.config.cell_radius;
        let strength = self.config.repulsion_force;
        let count = self.cells.len();
        for i in 0..count {
            for j in (i + 1)..count {
                let (head, tail) = self.cells.split_at_mut(j);
                let a = &mut head[i];
                let b = &mut tail[0];
                if !a.is_alive() || !b.is_alive() {
                    continue;
                }
                let dx = b.position.x - a.position.x;
                let dy = b.position.y - a.position.y;
                let distance = dx.hypot(dy);
                if distance >= min_distance {
                    continue;
                }
                let (nx, ny) = if distance > 0.0 {
                    (dx / distance, dy / distance)
                } else {
                    let heading = (i % COINCIDENT_HEADINGS) as f64;
                    let angle = TAU * heading / COINCIDENT_HEADINGS as f64;
                    (angle.cos(), angle.sin())
                };
                let push = (min_distance - distance) * strength;
                a.velocity.vx -= nx * push;
                a.velocity.vy -= ny * push;
                b.velocity.vx += nx * push;
                b.velocity.vy += ny * push;
            }
        }
    }

    /// Rolls ambient organic spawning independently for every grid location.
    pub fn spawn_random_organic(&mut self, rng: &mut dyn RngCore) -> usize {
        let probability = self.config.organic_spawn_probability;
        if probability <= 0.0 {
            return 0;
        }
        let concentration = self.config.organic_spawn_concentration;
        let (width, height) = (self.grid.width() as i32, self.grid.height() as i32);
        let mut spawned = 0;
        for x in 0..width {
            for y in 0..height {
                if rng.random::<f64>() < probability
                    && let Some((name, def)) = self.catalog.random_organic(rng)
                {
                    self.grid
                        .add(x, y, Substance::from_def(name, def, concentration));
                    spawned += 1;
                }
            }
        }
        spawned
    }

    pub fn decay_and_diffuse(&mut self) {
        self.grid.decay_and_diffuse(self.config.diffusion_rate);
    }

    /// Recomputes the aggregate statistics from scratch.
    pub fn refresh_stats(&mut self) {
        self.stats = EnvStats::compute(&self.cells, &self.grid, self.config.cells_limit);
    }

    /// Persisted form. Buffered cells are included after the live ones.
    #[must_use]
    pub fn to_state(&self) -> EnvironmentState {
        EnvironmentState {
            grid: self.grid.to_state(),
            cells: self
                .cells
                .iter()
                .chain(&self.nursery)
                .map(Cell::to_record)
                .collect(),
            env_stats: Some(self.stats.clone()),
        }
    }

    /// Rebuilds an environment; statistics are recomputed when absent.
    /// States holding more cells than the configured ceiling are rejected.
    pub fn from_state(
        state: EnvironmentState,
        config: Arc<SimConfig>,
        catalog: Arc<Catalog>,
    ) -> Result<Self, WorldError> {
        if state.cells.len() > config.cells_limit {
            return Err(WorldError::InvalidState(format!(
                "{} cells exceed the population ceiling of {}",
                state.cells.len(),
                config.cells_limit
            )));
        }
        let grid = SubstanceGrid::from_state(state.grid)?;
        let cells: Vec<Cell> = state.cells.into_iter().map(Cell::from_record).collect();
        let mut environment = Self {
            grid,
            cells,
            nursery: Vec::new(),
            stats: EnvStats::default(),
            config,
            catalog,
        };
        match state.env_stats {
            Some(stats) => environment.stats = stats,
            None => environment.refresh_stats(),
        }
        Ok(environment)
    }
}

/// Persisted form of an [`Environment`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentState {
    pub grid: GridState,
    #[serde(default)]
    pub cells: Vec<CellRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env_stats: Option<EnvStats>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::{Position, Velocity};
    use crate::gene::{Action, Effect, Gene, Receptor, Trigger, TriggerMode};
    use rand::{SeedableRng, rngs::SmallRng};

    fn environment(cells_limit: usize) -> Environment {
        let config = SimConfig {
            world_width: 10,
            world_height: 10,
            cells_limit,
            organic_spawn_probability: 0.0,
            ..SimConfig::default()
        };
        Environment::new(Arc::new(config), Arc::new(Catalog::standard(2)))
    }

    fn eager_divider() -> Cell {
        let mut gene = Gene::new(
            Receptor::Energy,
            Trigger::new(0.5, TriggerMode::Greater),
            Action::new(Effect::Divide, 1.0),
        );
        gene.mutation_rate = 0.0;
        let mut cell = Cell::new(Position::new(5.0, 5.0), vec![gene]);
        cell.mutation_rate = 0.0;
        cell
    }

    #[test]
    fn newborn_cells_wait_a_tick() {
        let mut env = environment(100);
        assert!(env.add_cell(eager_divider()));
        env.promote_nursery();
        let mut rng = SmallRng::seed_from_u64(1);

        let census = env.update_cells(&mut rng);
        assert_eq!(census.births, 1);
        assert_eq!(env.live_count(), 2);
        let newborn = &env.cells()[1];
        assert_eq!(newborn.age, 0);
        assert!(env.nursery().is_empty());
    }

    #[test]
    fn population_never_exceeds_ceiling() {
        let mut env = environment(5);
        env.add_cell(eager_divider());
        env.promote_nursery();
        let mut rng = SmallRng::seed_from_u64(2);
        for _ in 0..20 {
            env.update_cells(&mut rng);
            assert!(env.population() <= 5);
        }
        assert_eq!(env.live_count(), 5);
        assert!(!env.add_cell(eager_divider()));
    }

    #[test]
    fn dead_cells_are_removed() {
        let mut env = environment(10);
        let mut doomed = Cell::new(Position::new(2.0, 2.0), Vec::new());
        doomed.health = 0.0;
        env.add_cell(doomed);
        env.add_cell(Cell::new(Position::new(7.0, 7.0), Vec::new()));
        env.promote_nursery();
        let census = env.update_cells(&mut SmallRng::seed_from_u64(3));
        assert_eq!(census.deaths, 1);
        assert_eq!(env.live_count(), 1);
    }

    #[test]
    fn overlapping_cells_repel_symmetrically() {
        let mut env = environment(10);
        env.add_cell(Cell::new(Position::new(5.0, 5.0), Vec::new()));
        env.add_cell(Cell::new(Position::new(5.5, 5.0), Vec::new()));
        env.promote_nursery();
        env.apply_physics();
        let a = env.cells()[0].velocity;
        let b = env.cells()[1].velocity;
        assert!(a.vx < 0.0 && b.vx > 0.0);
        assert!((a.vx + b.vx).abs() < 1e-12);
        // overlap 0.4 times force 2.5
        assert!((b.vx - 1.0).abs() < 1e-12);
    }

    #[test]
    fn coincident_cells_still_separate() {
        let mut env = environment(10);
        env.add_cell(Cell::new(Position::new(3.0, 3.0), Vec::new()));
        env.add_cell(Cell::new(Position::new(3.0, 3.0), Vec::new()));
        env.promote_nursery();
        env.apply_physics();
        assert_ne!(env.cells()[0].velocity, Velocity::default());
        assert_ne!(env.cells()[1].velocity, Velocity::default());
    }

    #[test]
    fn certain_spawning_covers_the_grid() {
        let config = SimConfig {
            world_width: 4,
            world_height: 3,
            organic_spawn_probability: 1.0,
            ..SimConfig::default()
        };
        let mut env = Environment::new(Arc::new(config), Arc::new(Catalog::standard(0)));
        let spawned = env.spawn_random_organic(&mut SmallRng::seed_from_u64(4));
        assert_eq!(spawned, 12);
        assert_eq!(env.grid().occupied_locations(), 12);
    }

    #[test]
    fn missing_stats_are_recomputed_identically() {
        let mut env = environment(10);
        env.add_cell(Cell::new(Position::new(1.5, 1.5), Vec::new()));
        env.promote_nursery();
        env.refresh_stats();
        let mut state = env.to_state();
        let stored = state.env_stats.take().expect("stats present");
        let rebuilt =
            Environment::from_state(state, Arc::clone(&env.config), Arc::clone(&env.catalog))
                .expect("rebuild");
        assert_eq!(rebuilt.stats(), &stored);
    }

    #[test]
    fn states_above_the_ceiling_are_rejected() {
        let mut env = environment(10);
        for index in 0..4 {
            env.add_cell(Cell::new(Position::new(1.5 + index as f64, 1.5), Vec::new()));
        }
        env.promote_nursery();
        let state = env.to_state();

        let tight = Arc::new(SimConfig {
            cells_limit: 3,
            ..env.config().clone()
        });
        let err = Environment::from_state(state.clone(), tight, Arc::clone(&env.catalog))
            .expect_err("over the ceiling");
        assert!(matches!(err, WorldError::InvalidState(_)));

        let exact = Arc::new(SimConfig {
            cells_limit: 4,
            ..env.config().clone()
        });
        let rebuilt = Environment::from_state(state, exact, Arc::clone(&env.catalog))
            .expect("at the ceiling");
        assert_eq!(rebuilt.population(), 4);
    }
}
