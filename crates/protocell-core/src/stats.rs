//! Aggregate population and chemistry statistics, recomputed every tick.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::cell::Cell;
use crate::grid::SubstanceGrid;
use crate::substance::SubstanceKind;

/// Species listed in each leaderboard.
pub const TOP_SPECIES: usize = 5;

/// A species (colour) and how many live cells carry it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpeciesCount {
    pub key: String,
    pub count: usize,
}

/// A species and the longest unbroken lineage among its members.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpeciesDuration {
    pub key: String,
    pub species_duration: u64,
}

/// Derived view of an environment. Never authoritative: recomputing from the
/// same cells and grid reproduces it exactly.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvStats {
    pub cells_total: usize,
    pub cells_limit: usize,
    pub unique_cells: usize,
    pub avg_energy: f64,
    pub avg_health: f64,
    pub avg_age: f64,
    pub avg_genes: f64,
    pub avg_active_genes: f64,
    pub top_cells: Vec<SpeciesCount>,
    pub top_cells_by_species_duration: Vec<SpeciesDuration>,
    pub total_unique_substances: usize,
    /// Distinct substance names present, per category.
    pub substances_by_type: BTreeMap<String, usize>,
    /// Total concentration per category, rounded to three decimals.
    pub substances_concentration_by_type: BTreeMap<String, f64>,
}

fn mean(values: impl Iterator<Item = f64>, count: usize) -> f64 {
    if count == 0 {
        return 0.0;
    }
    values.sum::<f64>() / count as f64
}

fn round3(value: f64) -> f64 {
    (value * 1_000.0).round() / 1_000.0
}

impl EnvStats {
    #[must_use]
    pub fn compute(cells: &[Cell], grid: &SubstanceGrid, cells_limit: usize) -> Self {
        let alive: Vec<&Cell> = cells.iter().filter(|cell| cell.is_alive()).collect();
        let n = alive.len();

        let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
        let mut durations: BTreeMap<&str, u64> = BTreeMap::new();
        for cell in &alive {
            *counts.entry(cell.color_hex()).or_default() += 1;
            let longest = durations.entry(cell.color_hex()).or_default();
            *longest = (*longest).max(cell.species_duration);
        }

        let mut top_cells: Vec<SpeciesCount> = counts
            .iter()
            .map(|(key, count)| SpeciesCount {
                key: (*key).to_owned(),
                count: *count,
            })
            .collect();
        // Stable sort keeps key order among ties.
        top_cells.sort_by(|a, b| b.count.cmp(&a.count));
        top_cells.truncate(TOP_SPECIES);

        let mut top_durations: Vec<SpeciesDuration> = durations
            .iter()
            .map(|(key, duration)| SpeciesDuration {
                key: (*key).to_owned(),
                species_duration: *duration,
            })
            .collect();
        top_durations.sort_by(|a, b| b.species_duration.cmp(&a.species_duration));
        top_durations.truncate(TOP_SPECIES);

        let mut totals: BTreeMap<(&str, SubstanceKind), f64> = BTreeMap::new();
        for (_, substance) in grid.iter() {
            *totals
                .entry((substance.name.as_str(), substance.kind))
                .or_default() += substance.concentration;
        }
        let mut substances_by_type = BTreeMap::new();
        let mut concentration_by_type = BTreeMap::new();
        for kind in SubstanceKind::ALL {
            let (distinct, total) = totals
                .iter()
                .filter(|((_, entry_kind), _)| *entry_kind == kind)
                .fold((0usize, 0.0f64), |(distinct, total), (_, concentration)| {
                    (distinct + 1, total + concentration)
                });
            substances_by_type.insert(kind.as_str().to_owned(), distinct);
            concentration_by_type.insert(kind.as_str().to_owned(), round3(total));
        }

        Self {
            cells_total: cells.len(),
            cells_limit,
            unique_cells: counts.len(),
            avg_energy: mean(alive.iter().map(|cell| cell.energy), n),
            avg_health: mean(alive.iter().map(|cell| cell.health), n),
            avg_age: mean(alive.iter().map(|cell| cell.age as f64), n),
            avg_genes: mean(alive.iter().map(|cell| cell.genes().len() as f64), n),
            avg_active_genes: mean(alive.iter().map(|cell| cell.active_gene_count() as f64), n),
            top_cells,
            top_cells_by_species_duration: top_durations,
            total_unique_substances: totals.len(),
            substances_by_type,
            substances_concentration_by_type: concentration_by_type,
        }
    }
}
