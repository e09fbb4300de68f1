//! Sparse substance field with per-tick diffusion and decay.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::WorldError;
use crate::substance::{Substance, SubstanceKind};

const NEIGHBOURS: [(i32, i32); 4] = [(1, 0), (-1, 0), (0, 1), (0, -1)];

/// Largest number of grid locations a world may have. Ambient spawning visits
/// every location each tick, so this also caps the cost of a tick.
pub const MAX_GRID_AREA: u64 = 1 << 20;

/// Whether a `width` x `height` grid is non-empty and within [`MAX_GRID_AREA`].
#[must_use]
pub fn grid_area_in_bounds(width: u32, height: u32) -> bool {
    width > 0 && height > 0 && u64::from(width) * u64::from(height) <= MAX_GRID_AREA
}

/// Integer grid coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GridPos {
    pub x: i32,
    pub y: i32,
}

impl GridPos {
    #[must_use]
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// Bounded sparse map from grid coordinates to the substances present there.
///
/// Locations with no substances are never stored, and no stored substance has
/// a non-positive concentration once a tick's decay has run.
#[derive(Debug, Clone, PartialEq)]
pub struct SubstanceGrid {
    width: u32,
    height: u32,
    cells: BTreeMap<GridPos, Vec<Substance>>,
}

fn merge_into(slot: &mut Vec<Substance>, substance: Substance) {
    match slot.iter_mut().find(|existing| existing.name == substance.name) {
        Some(existing) => existing.concentration += substance.concentration,
        None => slot.push(substance),
    }
}

impl SubstanceGrid {
    #[must_use]
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            cells: BTreeMap::new(),
        }
    }

    #[must_use]
    pub const fn width(&self) -> u32 {
        self.width
    }

    #[must_use]
    pub const fn height(&self) -> u32 {
        self.height
    }

    #[must_use]
    pub fn contains(&self, x: i32, y: i32) -> bool {
        x >= 0
            && y >= 0
            && i64::from(x) < i64::from(self.width)
            && i64::from(y) < i64::from(self.height)
    }

    /// Adds `substance` at `(x, y)`, summing into an existing entry of the same
    /// name. Out-of-bounds coordinates and empty quantities are ignored.
    pub fn add(&mut self, x: i32, y: i32, substance: Substance) {
        if !self.contains(x, y) || substance.concentration <= 0.0 {
            return;
        }
        merge_into(self.cells.entry(GridPos::new(x, y)).or_default(), substance);
    }

    #[must_use]
    pub fn get(&self, x: i32, y: i32, name: &str) -> Option<&Substance> {
        self.cells
            .get(&GridPos::new(x, y))?
            .iter()
            .find(|substance| substance.name == name)
    }

    pub fn get_mut(&mut self, x: i32, y: i32, name: &str) -> Option<&mut Substance> {
        self.cells
            .get_mut(&GridPos::new(x, y))?
            .iter_mut()
            .find(|substance| substance.name == name)
    }

    /// Concentration of `name` at `(x, y)`, zero when absent.
    #[must_use]
    pub fn concentration(&self, x: i32, y: i32, name: &str) -> f64 {
        self.get(x, y, name)
            .map_or(0.0, |substance| substance.concentration)
    }

    /// All substances at one location.
    #[must_use]
    pub fn substances_at(&self, x: i32, y: i32) -> &[Substance] {
        self.cells
            .get(&GridPos::new(x, y))
            .map_or(&[], Vec::as_slice)
    }

    /// Every stored substance in coordinate order.
    pub fn iter(&self) -> impl Iterator<Item = (GridPos, &Substance)> {
        self.cells
            .iter()
            .flat_map(|(pos, substances)| substances.iter().map(move |substance| (*pos, substance)))
    }

    /// Number of locations holding at least one substance.
    #[must_use]
    pub fn occupied_locations(&self) -> usize {
        self.cells.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Sum of `name` across the whole grid.
    #[must_use]
    pub fn total_concentration(&self, name: &str) -> f64 {
        self.iter()
            .filter(|(_, substance)| substance.name == name)
            .map(|(_, substance)| substance.concentration)
            .sum()
    }

    /// Runs one tick of chemistry: diffusion first, then decay and pruning.
    pub fn decay_and_diffuse(&mut self, diffusion_rate: f64) {
        if diffusion_rate > 0.0 {
            self.diffuse(diffusion_rate.min(1.0));
        }
        self.decay();
    }

    fn diffuse(&mut self, rate: f64) {
        let share_rate = rate / 4.0;
        let mut next: BTreeMap<GridPos, Vec<Substance>> = BTreeMap::new();
        for (&pos, substances) in &self.cells {
            for substance in substances {
                let share = substance.concentration * share_rate;
                let mut retained = substance.concentration * (1.0 - rate);
                for (dx, dy) in NEIGHBOURS {
                    let (nx, ny) = (pos.x + dx, pos.y + dy);
                    if self.contains(nx, ny) {
                        merge_into(
                            next.entry(GridPos::new(nx, ny)).or_default(),
                            substance.with_concentration(share),
                        );
                    } else {
                        retained += share;
                    }
                }
                merge_into(next.entry(pos).or_default(), substance.with_concentration(retained));
            }
        }
        self.cells = next;
    }

    fn decay(&mut self) {
        self.cells.retain(|_, substances| {
            for substance in substances.iter_mut() {
                substance.decay();
            }
            substances.retain(|substance| !substance.is_depleted());
            !substances.is_empty()
        });
    }

    /// Removes depleted entries without decaying anything.
    pub fn prune(&mut self) {
        self.cells.retain(|_, substances| {
            substances.retain(|substance| !substance.is_depleted());
            !substances.is_empty()
        });
    }

    #[must_use]
    pub fn to_state(&self) -> GridState {
        GridState {
            width: self.width,
            height: self.height,
            substances: self
                .iter()
                .map(|(pos, substance)| SubstanceRecord {
                    x: pos.x,
                    y: pos.y,
                    name: substance.name.clone(),
                    kind: substance.kind,
                    concentration: substance.concentration,
                    energy: substance.energy_per_unit,
                    volatility: substance.volatility,
                })
                .collect(),
        }
    }

    /// Rebuilds a grid from its persisted form. Records outside the grid are
    /// dropped the same way [`SubstanceGrid::add`] drops them.
    pub fn from_state(state: GridState) -> Result<Self, WorldError> {
        if !grid_area_in_bounds(state.width, state.height) {
            return Err(WorldError::InvalidState(format!(
                "grid dimensions {}x{} are out of range",
                state.width, state.height
            )));
        }
        let mut grid = Self::new(state.width, state.height);
        for record in state.substances {
            let substance = Substance {
                name: record.name,
                kind: record.kind,
                concentration: record.concentration,
                energy_per_unit: record.energy,
                volatility: record.volatility,
            };
            grid.add(record.x, record.y, substance);
        }
        Ok(grid)
    }
}

/// Persisted form of a [`SubstanceGrid`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridState {
    pub width: u32,
    pub height: u32,
    #[serde(default)]
    pub substances: Vec<SubstanceRecord>,
}

/// One substance at one location, flattened for persistence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubstanceRecord {
    pub x: i32,
    pub y: i32,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: SubstanceKind,
    pub concentration: f64,
    pub energy: f64,
    #[serde(default = "crate::substance::default_volatility")]
    pub volatility: f64,
}
