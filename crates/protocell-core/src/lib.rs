//! Core types for the protocell simulation: a sparse chemical grid, gene-driven
//! cells living on it, and the world tick that advances and persists them.

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod cell;
pub mod config;
pub mod environment;
pub mod gene;
pub mod grid;
pub mod persistence;
pub mod stats;
pub mod substance;
pub mod world;

pub use cell::{Cell, CellRecord, Position, Velocity, species_color};
pub use config::{SimConfig, SubstanceDistribution};
pub use environment::{CellCensus, Environment, EnvironmentState, TickContext};
pub use gene::{
    Action, Effect, Gene, GeneMutation, MoveMode, MutationOp, Receptor, Trigger, TriggerMode,
};
pub use grid::{GridPos, GridState, MAX_GRID_AREA, SubstanceGrid, SubstanceRecord};
pub use persistence::{MemoryStore, NullStore, SnapshotError, SnapshotStore};
pub use stats::{EnvStats, SpeciesCount, SpeciesDuration};
pub use substance::{Catalog, Substance, SubstanceDef, SubstanceKind};
pub use world::{TickEvents, World, WorldSnapshot};

/// Concentrations, energy and health at or below this floor count as depleted.
pub const EPSILON: f64 = 0.01;

/// Upper bound for cell health.
pub const MAX_HEALTH: f64 = 100.0;

/// High level simulation clock (ticks processed since the world was created).
#[derive(
    Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
pub struct Tick(pub u64);

impl Tick {
    /// Returns the next sequential tick.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }

    /// The tick every fresh world starts from.
    #[must_use]
    pub const fn zero() -> Self {
        Self(0)
    }
}

/// Errors raised while building, restoring or persisting a world.
#[derive(Debug, Error)]
pub enum WorldError {
    /// A configuration value cannot be used.
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),
    /// A submitted or persisted state is structurally unusable.
    #[error("invalid world state: {0}")]
    InvalidState(String),
    /// A scheduled snapshot could not be written.
    #[error("failed to persist world snapshot: {0}")]
    Persistence(#[from] SnapshotError),
}
