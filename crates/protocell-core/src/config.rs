//! Static configuration for a protocell world.

use std::time::Duration;

use rand::{SeedableRng, rngs::SmallRng};
use serde::{Deserialize, Serialize};

use crate::WorldError;
use crate::grid::grid_area_in_bounds;

/// Number of random substance sources scattered per category when a world is populated.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SubstanceDistribution {
    pub organic: u32,
    pub toxin: u32,
    pub inorganic: u32,
}

impl Default for SubstanceDistribution {
    fn default() -> Self {
        Self {
            organic: 100,
            toxin: 10,
            inorganic: 10,
        }
    }
}

/// Tunables read by the grid, the cells, the environment and the world tick.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SimConfig {
    /// Width of the substance grid in cells.
    pub world_width: u32,
    /// Height of the substance grid in cells.
    pub world_height: u32,
    /// Cells spawned when a world is populated.
    pub initial_cells: usize,
    /// Ceiling on live plus freshly divided cells.
    pub cells_limit: usize,
    /// Radius used for repulsion and for clamping against the grid edge.
    pub cell_radius: f64,
    /// Impulse per unit of overlap between two cells.
    pub repulsion_force: f64,
    /// Velocity retained per tick.
    pub friction: f64,
    /// Speed cap applied after friction.
    pub max_velocity: f64,
    /// Smoothing factor blending a steering impulse into the current velocity.
    pub acceleration_factor: f64,
    /// Magnitude of a normalised steering impulse.
    pub max_acceleration: f64,
    /// Energy every living cell pays per tick.
    pub metabolic_cost: f64,
    /// Energy paid per unit of speed after moving.
    pub movement_cost: f64,
    /// Chance that a grid cell spawns organic matter on a given tick.
    pub organic_spawn_probability: f64,
    /// Concentration of spontaneously spawned organic matter.
    pub organic_spawn_concentration: f64,
    /// Fraction of each substance handed to orthogonal neighbours per tick.
    pub diffusion_rate: f64,
    /// Random substance sources scattered at population time.
    pub substance_distribution: SubstanceDistribution,
    /// Number of distinct inorganic substances in the default catalog.
    pub unique_inorganic_count: u32,
    /// Whether populated cells start with the foraging/division base genes.
    pub include_base_genes: bool,
    /// Write periodic snapshots through the world's snapshot store.
    pub auto_save: bool,
    /// Interval (ticks) between automatic snapshots.
    pub save_period: u64,
    /// Optional RNG seed for reproducible worlds.
    pub rng_seed: Option<u64>,
    /// Frame rate a session paces itself to in normal speed mode.
    pub fps: u32,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            world_width: 50,
            world_height: 50,
            initial_cells: 50,
            cells_limit: 1_000,
            cell_radius: 0.5,
            repulsion_force: 2.5,
            friction: 0.85,
            max_velocity: 1.0,
            acceleration_factor: 0.07,
            max_acceleration: 0.85,
            metabolic_cost: 0.1,
            movement_cost: 0.05,
            organic_spawn_probability: 0.000_8,
            organic_spawn_concentration: 10.0,
            diffusion_rate: 0.1,
            substance_distribution: SubstanceDistribution::default(),
            unique_inorganic_count: 30,
            include_base_genes: true,
            auto_save: true,
            save_period: 10_000,
            rng_seed: None,
            fps: 60,
        }
    }
}

impl SimConfig {
    /// Checks every value the engine depends on.
    pub fn validate(&self) -> Result<(), WorldError> {
        if self.world_width == 0 || self.world_height == 0 {
            return Err(WorldError::InvalidConfig(
                "world dimensions must be non-zero",
            ));
        }
        if !grid_area_in_bounds(self.world_width, self.world_height) {
            return Err(WorldError::InvalidConfig(
                "world area exceeds the maximum grid size",
            ));
        }
        if self.cells_limit == 0 {
            return Err(WorldError::InvalidConfig("cells_limit must be non-zero"));
        }
        if self.auto_save && self.save_period == 0 {
            return Err(WorldError::InvalidConfig(
                "save_period must be non-zero when auto_save is enabled",
            ));
        }
        if self.cell_radius <= 0.0 || self.repulsion_force < 0.0 {
            return Err(WorldError::InvalidConfig(
                "cell_radius must be positive and repulsion_force non-negative",
            ));
        }
        if !(0.0..=1.0).contains(&self.friction)
            || !(0.0..=1.0).contains(&self.acceleration_factor)
        {
            return Err(WorldError::InvalidConfig(
                "friction and acceleration_factor must lie in [0, 1]",
            ));
        }
        if self.max_velocity <= 0.0 || self.max_acceleration < 0.0 {
            return Err(WorldError::InvalidConfig(
                "max_velocity must be positive and max_acceleration non-negative",
            ));
        }
        if self.metabolic_cost < 0.0 || self.movement_cost < 0.0 {
            return Err(WorldError::InvalidConfig(
                "metabolic and movement costs must be non-negative",
            ));
        }
        if !(0.0..=1.0).contains(&self.organic_spawn_probability)
            || self.organic_spawn_concentration < 0.0
        {
            return Err(WorldError::InvalidConfig(
                "organic spawn probability must lie in [0, 1] and concentration be non-negative",
            ));
        }
        if !(0.0..=1.0).contains(&self.diffusion_rate) {
            return Err(WorldError::InvalidConfig(
                "diffusion_rate must lie in [0, 1]",
            ));
        }
        if self.fps == 0 {
            return Err(WorldError::InvalidConfig("fps must be non-zero"));
        }
        Ok(())
    }

    /// Returns the configured RNG, seeding from entropy when no seed is set.
    #[must_use]
    pub fn seeded_rng(&self) -> SmallRng {
        match self.rng_seed {
            Some(seed) => SmallRng::seed_from_u64(seed),
            None => {
                let seed: u64 = rand::random();
                SmallRng::seed_from_u64(seed)
            }
        }
    }

    /// Wall-clock budget of one frame in normal speed mode.
    #[must_use]
    pub fn frame_time(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.fps.max(1)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        SimConfig::default().validate().expect("defaults validate");
    }

    #[test]
    fn rejects_zero_save_period_only_when_auto_saving() {
        let mut config = SimConfig {
            save_period: 0,
            ..SimConfig::default()
        };
        assert!(config.validate().is_err());
        config.auto_save = false;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_out_of_range_rates() {
        let config = SimConfig {
            diffusion_rate: 1.5,
            ..SimConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(WorldError::InvalidConfig(_))
        ));
    }

    #[test]
    fn rejects_oversized_worlds() {
        let config = SimConfig {
            world_width: 2_048,
            world_height: 1_024,
            ..SimConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(WorldError::InvalidConfig(_))
        ));
    }

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let config: SimConfig =
            serde_json::from_str(r#"{"world_width": 20, "rng_seed": 7}"#).expect("parse");
        assert_eq!(config.world_width, 20);
        assert_eq!(config.world_height, 50);
        assert_eq!(config.rng_seed, Some(7));
        assert_eq!(config.frame_time(), Duration::from_secs_f64(1.0 / 60.0));
    }
}
