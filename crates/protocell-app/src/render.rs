//! Per-tick render frames: a lightweight view of the world for viewers.

use protocell_core::{EnvStats, SubstanceKind, Tick, World};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct RenderFrame<'a> {
    pub tick: Tick,
    pub tick_time_ms: f64,
    pub cell_radius: f64,
    pub environment: RenderEnvironment<'a>,
}

#[derive(Debug, Serialize)]
pub struct RenderEnvironment<'a> {
    pub grid: RenderGrid,
    pub cells: Vec<RenderCell<'a>>,
    pub env_stats: &'a EnvStats,
}

#[derive(Debug, Serialize)]
pub struct RenderGrid {
    pub width: u32,
    pub height: u32,
    pub substances: Vec<RenderSubstance>,
}

/// Substance entry trimmed to what a viewer draws.
#[derive(Debug, Serialize)]
pub struct RenderSubstance {
    pub x: i32,
    pub y: i32,
    #[serde(rename = "type")]
    pub kind: SubstanceKind,
    pub concentration: f64,
}

#[derive(Debug, Serialize)]
pub struct RenderCell<'a> {
    pub position: [f64; 2],
    pub color_hex: &'a str,
}

impl<'a> RenderFrame<'a> {
    /// Captures the live cells and every positive substance of `world`.
    #[must_use]
    pub fn capture(world: &'a World) -> Self {
        let environment = world.environment();
        let grid = environment.grid();
        let substances = grid
            .iter()
            .filter(|(_, substance)| substance.concentration > 0.0)
            .map(|(pos, substance)| RenderSubstance {
                x: pos.x,
                y: pos.y,
                kind: substance.kind,
                concentration: substance.concentration,
            })
            .collect();
        let cells = environment
            .cells()
            .iter()
            .map(|cell| RenderCell {
                position: [cell.position.x, cell.position.y],
                color_hex: cell.color_hex(),
            })
            .collect();

        Self {
            tick: world.tick(),
            tick_time_ms: world.tick_time_ms(),
            cell_radius: world.config().cell_radius,
            environment: RenderEnvironment {
                grid: RenderGrid {
                    width: grid.width(),
                    height: grid.height(),
                    substances,
                },
                cells,
                env_stats: environment.stats(),
            },
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use protocell_core::{Cell, Position, SimConfig, Substance, SubstanceKind};
    use serde_json::Value;

    #[test]
    fn frame_carries_the_render_keys_only() {
        let config = SimConfig {
            world_width: 6,
            world_height: 4,
            initial_cells: 0,
            auto_save: false,
            rng_seed: Some(5),
            ..SimConfig::default()
        };
        let mut world = World::new(config).expect("world");
        world.environment_mut().add_substance(
            2,
            3,
            Substance::new("ORGANIC_1", SubstanceKind::Organic, 4.0, 3.0),
        );
        world
            .environment_mut()
            .add_cell(Cell::new(Position::new(1.5, 2.5), Vec::new()));
        world.environment_mut().promote_nursery();
        world.environment_mut().refresh_stats();

        let encoded = RenderFrame::capture(&world).to_json().expect("encode");
        let value: Value = serde_json::from_str(&encoded).expect("json");
        assert_eq!(value["tick"], 0);
        assert_eq!(value["cell_radius"], 0.5);
        let grid = &value["environment"]["grid"];
        assert_eq!(grid["width"], 6);
        assert_eq!(grid["height"], 4);
        let substance = &grid["substances"][0];
        assert_eq!(substance["x"], 2);
        assert_eq!(substance["y"], 3);
        assert_eq!(substance["type"], "ORGANIC");
        assert_eq!(substance["concentration"], 4.0);
        assert!(substance.get("name").is_none());

        let cell = &value["environment"]["cells"][0];
        assert_eq!(cell["position"], serde_json::json!([1.5, 2.5]));
        assert_eq!(cell["color_hex"].as_str().map(str::len), Some(7));
        assert!(cell.get("genes").is_none());
        assert_eq!(value["environment"]["env_stats"]["cells_total"], 1);
    }
}
