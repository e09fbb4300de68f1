//! Cells: gene-driven agents with position, energy and a species colour.

use std::sync::Arc;

use rand::{Rng, RngCore};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::config::SimConfig;
use crate::environment::TickContext;
use crate::gene::Gene;
use crate::grid::SubstanceGrid;
use crate::substance::{Catalog, Substance, SubstanceKind};
use crate::{EPSILON, MAX_HEALTH};

/// Mutation probability applied when a cell divides.
pub const DEFAULT_CELL_MUTATION_RATE: f64 = 0.1;
/// Energy and health a seeded cell starts with.
pub const STARTING_VITALS: f64 = 100.0;

const MIN_DIVISION_ENERGY: f64 = 0.1;
const CHILD_OFFSET: f64 = 0.5;
const CHILD_SPEED: f64 = 0.5;
const EMIT_FLOOR: f64 = 0.001;
const HEAL_RESERVE: f64 = 5.0;
const RANDOM_GENE_WEIGHTS: [u32; 10] = [10, 15, 20, 20, 15, 10, 5, 3, 1, 1];

/// Continuous position on the grid.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    #[must_use]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Velocity in grid units per tick.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Velocity {
    pub vx: f64,
    pub vy: f64,
}

impl Velocity {
    #[must_use]
    pub const fn new(vx: f64, vy: f64) -> Self {
        Self { vx, vy }
    }

    #[must_use]
    pub fn speed(&self) -> f64 {
        self.vx.hypot(self.vy)
    }
}

/// An agent living on the substance grid.
///
/// Genes are shared copy-on-write so a tick can iterate them while the cell
/// itself is being mutated, and so unmutated offspring share their parent's
/// list.
#[derive(Debug, Clone, PartialEq)]
pub struct Cell {
    pub position: Position,
    pub velocity: Velocity,
    pub energy: f64,
    pub health: f64,
    pub age: u64,
    /// Ticks since this lineage last changed its gene set.
    pub species_duration: u64,
    pub mutation_rate: f64,
    alive: bool,
    genes: Arc<Vec<Gene>>,
    color: String,
}

impl Cell {
    /// Creates a living cell with full vitals and no motion.
    #[must_use]
    pub fn new(position: Position, genes: Vec<Gene>) -> Self {
        let color = species_color(&genes);
        Self {
            position,
            velocity: Velocity::default(),
            energy: STARTING_VITALS,
            health: STARTING_VITALS,
            age: 0,
            species_duration: 0,
            mutation_rate: DEFAULT_CELL_MUTATION_RATE,
            alive: true,
            genes: Arc::new(genes),
            color,
        }
    }

    /// Seeds a cell near `(x, y)` with optional base genes plus one to ten
    /// random genes.
    pub fn random(
        x: i32,
        y: i32,
        catalog: &Catalog,
        include_base_genes: bool,
        rng: &mut dyn RngCore,
    ) -> Self {
        let position = Position::new(
            f64::from(x) + rng.random::<f64>(),
            f64::from(y) + rng.random::<f64>(),
        );
        let mut genes = if include_base_genes {
            Gene::base_genes(catalog)
        } else {
            Vec::new()
        };
        let extra = weighted_gene_count(rng);
        genes.extend((0..extra).map(|_| Gene::random(catalog, rng)));
        Self::new(position, genes)
    }

    #[must_use]
    pub const fn is_alive(&self) -> bool {
        self.alive
    }

    #[must_use]
    pub fn genes(&self) -> &[Gene] {
        &self.genes
    }

    /// Species colour as `#RRGGBB`.
    #[must_use]
    pub fn color_hex(&self) -> &str {
        &self.color
    }

    /// Replaces the gene list and recomputes the colour.
    pub fn set_genes(&mut self, genes: Vec<Gene>) {
        self.genes = Arc::new(genes);
        self.refresh_color();
    }

    pub fn refresh_color(&mut self) {
        self.color = species_color(&self.genes);
    }

    /// Integer grid location (truncated toward zero).
    #[must_use]
    pub fn grid_position(&self) -> (i32, i32) {
        (self.position.x as i32, self.position.y as i32)
    }

    #[must_use]
    pub fn active_gene_count(&self) -> usize {
        self.genes.iter().filter(|gene| gene.active).count()
    }

    /// Advances this cell by one tick. Dead cells are left untouched.
    pub fn update(&mut self, ctx: &mut TickContext<'_>) {
        if !self.alive {
            return;
        }
        self.age += 1;
        self.species_duration += 1;
        self.energy -= ctx.config.metabolic_cost;
        self.apply_toxins(ctx.grid);
        self.express_genes(ctx);
        let bounds = (f64::from(ctx.grid.width()), f64::from(ctx.grid.height()));
        self.integrate_motion(ctx.config, bounds);
        if self.energy <= EPSILON || self.health <= EPSILON {
            self.die(ctx);
        }
    }

    fn apply_toxins(&mut self, grid: &SubstanceGrid) {
        let (x, y) = self.grid_position();
        let damage: f64 = grid
            .substances_at(x, y)
            .iter()
            .filter(|substance| {
                substance.kind == SubstanceKind::Toxin && substance.concentration > EPSILON
            })
            .map(Substance::energy)
            .sum();
        if damage > 0.0 {
            self.health = (self.health - damage).max(0.0);
        }
    }

    fn express_genes(&mut self, ctx: &mut TickContext<'_>) {
        let genes = Arc::clone(&self.genes);
        for gene in genes.iter().filter(|gene| gene.active) {
            if let Some(signal) = gene.receptor.read(self, ctx.grid)
                && gene.trigger.check(signal)
            {
                gene.action.execute(self, ctx);
            }
        }
    }

    /// Friction, speed cap, integration, edge clamping and the movement cost.
    /// `bounds` is the grid's `(width, height)`.
    pub fn integrate_motion(&mut self, config: &SimConfig, bounds: (f64, f64)) {
        self.velocity.vx *= config.friction;
        self.velocity.vy *= config.friction;
        let mut speed = self.velocity.speed();
        if speed > config.max_velocity {
            let scale = config.max_velocity / speed;
            self.velocity.vx *= scale;
            self.velocity.vy *= scale;
            speed = config.max_velocity;
        }

        let radius = config.cell_radius;
        let (next_x, clamp_x) = clamp_axis(self.position.x + self.velocity.vx, bounds.0, radius);
        let (next_y, clamp_y) = clamp_axis(self.position.y + self.velocity.vy, bounds.1, radius);
        if clamp_x {
            self.velocity.vx = 0.0;
        }
        if clamp_y {
            self.velocity.vy = 0.0;
        }
        self.position = Position::new(next_x, next_y);
        self.energy -= config.movement_cost * speed;
    }

    /// Blends a steering impulse into the current velocity.
    pub fn steer(&mut self, dx: f64, dy: f64, config: &SimConfig) {
        let length = dx.hypot(dy);
        if length == 0.0 {
            return;
        }
        let ax = dx / length * config.max_acceleration;
        let ay = dy / length * config.max_acceleration;
        let blend = config.acceleration_factor;
        self.velocity.vx = self.velocity.vx * (1.0 - blend) + ax * blend;
        self.velocity.vy = self.velocity.vy * (1.0 - blend) + ay * blend;
    }

    /// Consumes the named substance under the cell for its full energy.
    pub fn absorb(&mut self, name: &str, grid: &mut SubstanceGrid) {
        let (x, y) = self.grid_position();
        if let Some(found) = grid.get_mut(x, y, name)
            && found.concentration > EPSILON
        {
            self.energy += found.energy();
            found.concentration = 0.0;
        }
    }

    /// Spends energy to spread `amount` of a substance over the 3x3 block
    /// around the cell.
    pub fn emit(&mut self, name: &str, amount: f64, ctx: &mut TickContext<'_>) {
        if self.energy <= EMIT_FLOOR || amount <= EMIT_FLOOR {
            return;
        }
        let Some(def) = ctx.catalog.lookup(name) else {
            return;
        };
        let mut amount = amount;
        let mut cost = amount * def.energy;
        if cost > self.energy {
            amount = self.energy / def.energy;
            cost = self.energy;
        }
        self.energy -= cost;

        let part = amount / 9.0;
        let (cx, cy) = self.grid_position();
        for dx in -1..=1 {
            for dy in -1..=1 {
                ctx.grid
                    .add(cx + dx, cy + dy, Substance::from_def(name, def, part));
            }
        }
    }

    /// Converts energy into health, keeping a safety reserve.
    pub fn heal(&mut self, amount: f64) {
        let amount = amount.max(1.0);
        if self.energy < amount + HEAL_RESERVE || self.health >= MAX_HEALTH {
            return;
        }
        self.energy -= amount;
        self.health = (self.health + amount).min(MAX_HEALTH);
    }

    /// Splits off a child, or returns `None` when the population is at its
    /// ceiling or the cell is too weak.
    pub fn divide(&mut self, ctx: &mut TickContext<'_>) -> Option<Cell> {
        if self.energy < MIN_DIVISION_ENERGY || ctx.population() >= ctx.config.cells_limit {
            return None;
        }
        let mut child = self.clone();
        child.age = 0;
        self.energy /= 2.0;
        child.energy = self.energy;
        child.position = Position::new(
            self.position.x + random_sign(ctx.rng) * CHILD_OFFSET,
            self.position.y + random_sign(ctx.rng) * CHILD_OFFSET,
        );
        child.velocity = Velocity::new(
            ctx.rng.random_range(-CHILD_SPEED..CHILD_SPEED),
            ctx.rng.random_range(-CHILD_SPEED..CHILD_SPEED),
        );
        if ctx.rng.random::<f64>() < self.mutation_rate && child.mutate(ctx.catalog, ctx.rng) {
            child.species_duration = 0;
            child.refresh_color();
        }
        Some(child)
    }

    /// Runs every gene's mutation operators and appends any spawned genes.
    /// Returns whether the gene list changed.
    pub fn mutate(&mut self, catalog: &Catalog, rng: &mut dyn RngCore) -> bool {
        let genes = Arc::make_mut(&mut self.genes);
        let mut changed = false;
        let mut spawned = Vec::new();
        for gene in genes.iter_mut() {
            let outcome = gene.mutate(catalog, rng);
            changed |= outcome.changed;
            spawned.extend(outcome.spawned);
        }
        changed |= !spawned.is_empty();
        genes.extend(spawned);
        changed
    }

    /// Marks the cell dead and returns its remaining energy to the grid as
    /// organic matter.
    pub fn die(&mut self, ctx: &mut TickContext<'_>) {
        self.alive = false;
        if self.energy > 0.0
            && let Some((name, def)) = ctx.catalog.random_organic(ctx.rng)
            && def.energy > 0.0
        {
            let (x, y) = self.grid_position();
            ctx.grid
                .add(x, y, Substance::from_def(name, def, self.energy / def.energy));
        }
        self.energy = 0.0;
        self.health = 0.0;
    }

    #[must_use]
    pub fn to_record(&self) -> CellRecord {
        CellRecord {
            position: [self.position.x, self.position.y],
            velocity: [self.velocity.vx, self.velocity.vy],
            species_duration: self.species_duration,
            energy: self.energy,
            health: self.health,
            age: self.age,
            color_hex: Some(self.color.clone()),
            mutation_rate: self.mutation_rate,
            genes: self.genes.as_ref().clone(),
        }
    }

    /// Rebuilds a living cell. A stored colour is kept as-is; a missing one
    /// is derived from the genes.
    #[must_use]
    pub fn from_record(record: CellRecord) -> Self {
        let color = record
            .color_hex
            .unwrap_or_else(|| species_color(&record.genes));
        Self {
            position: Position::new(record.position[0], record.position[1]),
            velocity: Velocity::new(record.velocity[0], record.velocity[1]),
            energy: record.energy,
            health: record.health,
            age: record.age,
            species_duration: record.species_duration,
            mutation_rate: record.mutation_rate,
            alive: true,
            genes: Arc::new(record.genes),
            color,
        }
    }
}

fn clamp_axis(value: f64, extent: f64, radius: f64) -> (f64, bool) {
    if value < 0.0 {
        (radius, true)
    } else if value >= extent {
        (extent - radius, true)
    } else {
        (value, false)
    }
}

fn random_sign(rng: &mut dyn RngCore) -> f64 {
    if rng.random_bool(0.5) { 1.0 } else { -1.0 }
}

fn weighted_gene_count(rng: &mut dyn RngCore) -> usize {
    let total: u32 = RANDOM_GENE_WEIGHTS.iter().sum();
    let mut roll = rng.random_range(0..total);
    for (index, weight) in RANDOM_GENE_WEIGHTS.iter().enumerate() {
        if roll < *weight {
            return index + 1;
        }
        roll -= weight;
    }
    RANDOM_GENE_WEIGHTS.len()
}

/// Species colour for a gene set: a pure function of the sorted gene
/// signatures, biased toward bright channels.
#[must_use]
pub fn species_color(genes: &[Gene]) -> String {
    let mut signatures: Vec<String> = genes.iter().map(Gene::signature).collect();
    signatures.sort_unstable();
    let digest = Sha256::digest(signatures.join("|").as_bytes());
    let channel = |a: usize, b: usize, c: usize, d: usize| {
        let mixed = digest[a] ^ digest[b] ^ digest[c] ^ digest[d];
        (100 + u16::from(mixed) / 2).min(255)
    };
    format!(
        "#{:02X}{:02X}{:02X}",
        channel(0, 3, 6, 9),
        channel(1, 4, 7, 10),
        channel(2, 5, 8, 11)
    )
}

/// Persisted form of a [`Cell`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CellRecord {
    pub position: [f64; 2],
    #[serde(default)]
    pub velocity: [f64; 2],
    #[serde(default)]
    pub species_duration: u64,
    pub energy: f64,
    pub health: f64,
    #[serde(default)]
    pub age: u64,
    #[serde(default)]
    pub color_hex: Option<String>,
    #[serde(default = "default_cell_mutation_rate")]
    pub mutation_rate: f64,
    #[serde(default)]
    pub genes: Vec<Gene>,
}

fn default_cell_mutation_rate() -> f64 {
    DEFAULT_CELL_MUTATION_RATE
}
