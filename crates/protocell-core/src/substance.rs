//! Chemical substances and the catalog describing every substance a world knows.

use std::collections::BTreeMap;
use std::fmt;

use rand::{Rng, RngCore};
use serde::{Deserialize, Serialize};

use crate::EPSILON;

/// Per-tick decay applied to substances that do not specify their own.
pub const DEFAULT_VOLATILITY: f64 = 0.01;

const ORGANIC_ENERGIES: [f64; 3] = [1.5, 3.0, 5.0];
const TOXIN_ENERGIES: [f64; 3] = [1.0, 3.0, 4.0];
const INORGANIC_ENERGY: f64 = 0.5;

/// Broad category of a substance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SubstanceKind {
    /// Food; the only kind deposited by dying cells and ambient spawning.
    Organic,
    Inorganic,
    /// Damages the health of cells standing on it.
    Toxin,
}

impl SubstanceKind {
    pub const ALL: [Self; 3] = [Self::Organic, Self::Inorganic, Self::Toxin];

    /// Wire name of the category.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Organic => "ORGANIC",
            Self::Inorganic => "INORGANIC",
            Self::Toxin => "TOXIN",
        }
    }
}

impl fmt::Display for SubstanceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A quantity of one named substance at one grid location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Substance {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: SubstanceKind,
    pub concentration: f64,
    /// Energy released per unit of concentration.
    #[serde(rename = "energy")]
    pub energy_per_unit: f64,
    #[serde(default = "default_volatility")]
    pub volatility: f64,
}

pub(crate) fn default_volatility() -> f64 {
    DEFAULT_VOLATILITY
}

impl Substance {
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        kind: SubstanceKind,
        concentration: f64,
        energy_per_unit: f64,
    ) -> Self {
        Self {
            name: name.into(),
            kind,
            concentration,
            energy_per_unit,
            volatility: DEFAULT_VOLATILITY,
        }
    }

    /// Instantiates a catalog entry at the given concentration.
    #[must_use]
    pub fn from_def(name: impl Into<String>, def: SubstanceDef, concentration: f64) -> Self {
        Self::new(name, def.kind, concentration, def.energy)
    }

    #[must_use]
    pub fn with_volatility(mut self, volatility: f64) -> Self {
        self.volatility = volatility;
        self
    }

    /// Copy of this substance carrying a different concentration.
    #[must_use]
    pub fn with_concentration(&self, concentration: f64) -> Self {
        Self {
            concentration,
            ..self.clone()
        }
    }

    /// Applies one tick of decay, snapping tiny remainders to zero.
    pub fn decay(&mut self) {
        self.concentration *= 1.0 - self.volatility;
        if self.concentration < EPSILON {
            self.concentration = 0.0;
        }
    }

    #[must_use]
    pub fn is_depleted(&self) -> bool {
        self.concentration <= 0.0
    }

    /// Total energy held by this quantity.
    #[must_use]
    pub fn energy(&self) -> f64 {
        self.concentration * self.energy_per_unit
    }
}

/// Catalog entry: the category and energy density of a named substance.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SubstanceDef {
    #[serde(rename = "type")]
    pub kind: SubstanceKind,
    pub energy: f64,
}

/// Immutable table of every substance a world knows, keyed by name.
///
/// Owned by the world behind an `Arc` and passed explicitly to everything that
/// needs substance metadata.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "BTreeMap<String, SubstanceDef>", into = "BTreeMap<String, SubstanceDef>")]
pub struct Catalog {
    entries: BTreeMap<String, SubstanceDef>,
    names: Vec<String>,
}

impl From<BTreeMap<String, SubstanceDef>> for Catalog {
    fn from(entries: BTreeMap<String, SubstanceDef>) -> Self {
        let names = entries.keys().cloned().collect();
        Self { entries, names }
    }
}

impl From<Catalog> for BTreeMap<String, SubstanceDef> {
    fn from(catalog: Catalog) -> Self {
        catalog.entries
    }
}

impl FromIterator<(String, SubstanceDef)> for Catalog {
    fn from_iter<I: IntoIterator<Item = (String, SubstanceDef)>>(iter: I) -> Self {
        Self::from(iter.into_iter().collect::<BTreeMap<_, _>>())
    }
}

impl Catalog {
    /// Builds the stock chemistry: three organics, three toxins and
    /// `inorganic_count` inorganic filler substances.
    #[must_use]
    pub fn standard(inorganic_count: u32) -> Self {
        let organics = ORGANIC_ENERGIES.iter().enumerate().map(|(index, &energy)| {
            (
                format!("ORGANIC_{index}"),
                SubstanceDef {
                    kind: SubstanceKind::Organic,
                    energy,
                },
            )
        });
        let toxins = TOXIN_ENERGIES.iter().enumerate().map(|(index, &energy)| {
            (
                format!("TOXIN_{index}"),
                SubstanceDef {
                    kind: SubstanceKind::Toxin,
                    energy,
                },
            )
        });
        let inorganics = (0..inorganic_count).map(|index| {
            (
                format!("INORGANIC_{index}"),
                SubstanceDef {
                    kind: SubstanceKind::Inorganic,
                    energy: INORGANIC_ENERGY,
                },
            )
        });
        organics.chain(toxins).chain(inorganics).collect()
    }

    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<SubstanceDef> {
        self.entries.get(name).copied()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates entries in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, SubstanceDef)> {
        self.entries.iter().map(|(name, def)| (name.as_str(), *def))
    }

    /// Names of every substance of `kind`, in name order.
    #[must_use]
    pub fn names_of_kind(&self, kind: SubstanceKind) -> Vec<&str> {
        self.iter()
            .filter(|(_, def)| def.kind == kind)
            .map(|(name, _)| name)
            .collect()
    }

    /// Picks any substance name uniformly.
    pub fn random_name(&self, rng: &mut dyn RngCore) -> Option<&str> {
        if self.names.is_empty() {
            return None;
        }
        let index = rng.random_range(0..self.names.len());
        Some(self.names[index].as_str())
    }

    /// Picks a substance of `kind` uniformly, with its definition.
    pub fn random_of_kind(
        &self,
        kind: SubstanceKind,
        rng: &mut dyn RngCore,
    ) -> Option<(&str, SubstanceDef)> {
        let candidates = self.names_of_kind(kind);
        if candidates.is_empty() {
            return None;
        }
        let name = candidates[rng.random_range(0..candidates.len())];
        self.lookup(name).map(|def| (name, def))
    }

    pub fn random_organic(&self, rng: &mut dyn RngCore) -> Option<(&str, SubstanceDef)> {
        self.random_of_kind(SubstanceKind::Organic, rng)
    }

    /// A catalog is usable by a world when it can feed ambient spawning and
    /// death deposits.
    #[must_use]
    pub fn has_usable_organic(&self) -> bool {
        self.entries
            .values()
            .any(|def| def.kind == SubstanceKind::Organic && def.energy > 0.0)
    }
}
