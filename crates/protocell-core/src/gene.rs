//! Gene-encoded behaviour: receptors, triggers, actions and the mutation operators.

use std::fmt;
use std::ops::Range;

use rand::{Rng, RngCore};
use serde::{Deserialize, Serialize};

use crate::cell::Cell;
use crate::environment::TickContext;
use crate::grid::SubstanceGrid;
use crate::substance::Catalog;

/// Mutation probability new genes start with.
pub const DEFAULT_GENE_MUTATION_RATE: f64 = 0.07;

/// Half-width of the square a MOVE action scans for gradients.
const VISION_RADIUS: i32 = 3;
/// Scale from action power to steering impulse.
const MOVE_POWER_SCALE: f64 = 0.1;

const POWER_RANGE: Range<f64> = 0.1..10.0;
const ATTRIBUTE_THRESHOLD_RANGE: Range<f64> = 1.0..100.0;
const SUBSTANCE_THRESHOLD_RANGE: Range<f64> = 0.1..10.0;
const SUBSTANCE_RECEPTOR_PROBABILITY: f64 = 0.85;
const RATE_DRIFT_UP: f64 = 1.15;
const RATE_DRIFT_DOWN: f64 = 0.85;

/// Comparison applied by a [`Trigger`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TriggerMode {
    Less,
    Greater,
}

impl TriggerMode {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Less => "LESS",
            Self::Greater => "GREATER",
        }
    }
}

/// Threshold predicate gating a gene's action.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Trigger {
    pub threshold: f64,
    pub mode: TriggerMode,
}

impl Trigger {
    #[must_use]
    pub const fn new(threshold: f64, mode: TriggerMode) -> Self {
        Self { threshold, mode }
    }

    /// Strict comparison of `value` against the threshold.
    #[must_use]
    pub fn check(&self, value: f64) -> bool {
        match self.mode {
            TriggerMode::Less => value < self.threshold,
            TriggerMode::Greater => value > self.threshold,
        }
    }
}

/// How a MOVE action reacts to the gradient of its target substance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MoveMode {
    Random,
    Toward,
    Away,
    /// Circles the strongest source by turning a quarter from it.
    Around,
}

impl MoveMode {
    pub const ALL: [Self; 4] = [Self::Random, Self::Toward, Self::Away, Self::Around];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Random => "RANDOM",
            Self::Toward => "TOWARD",
            Self::Away => "AWAY",
            Self::Around => "AROUND",
        }
    }

    fn random(rng: &mut dyn RngCore) -> Self {
        Self::ALL[rng.random_range(0..Self::ALL.len())]
    }
}

/// The effect a triggered gene applies.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Steers the cell. A `None` mode leaves velocity untouched.
    Move {
        target: Option<String>,
        mode: Option<MoveMode>,
    },
    Absorb {
        substance: Option<String>,
    },
    Emit {
        substance: Option<String>,
    },
    Divide,
    Heal,
}

impl Effect {
    fn kind(&self) -> ActionKind {
        match self {
            Self::Move { .. } => ActionKind::Move,
            Self::Absorb { .. } => ActionKind::Absorb,
            Self::Emit { .. } => ActionKind::Emit,
            Self::Divide => ActionKind::Divide,
            Self::Heal => ActionKind::Heal,
        }
    }

    fn substance(&self) -> Option<&str> {
        match self {
            Self::Move { target, .. } => target.as_deref(),
            Self::Absorb { substance } | Self::Emit { substance } => substance.as_deref(),
            Self::Divide | Self::Heal => None,
        }
    }

    fn move_mode(&self) -> Option<MoveMode> {
        match self {
            Self::Move { mode, .. } => *mode,
            _ => None,
        }
    }
}

/// A parameterised effect plus the strength it is applied with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "ActionRecord", into = "ActionRecord")]
pub struct Action {
    pub effect: Effect,
    pub power: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
enum ActionKind {
    Move,
    Absorb,
    Emit,
    Divide,
    #[serde(alias = "HEALS")]
    Heal,
}

impl ActionKind {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Move => "MOVE",
            Self::Absorb => "ABSORB",
            Self::Emit => "EMIT",
            Self::Divide => "DIVIDE",
            Self::Heal => "HEAL",
        }
    }
}

/// Flat wire form of an [`Action`].
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ActionRecord {
    #[serde(rename = "type")]
    kind: ActionKind,
    #[serde(default = "default_power")]
    power: f64,
    #[serde(default)]
    substance_name: Option<String>,
    #[serde(default)]
    move_mode: Option<MoveMode>,
}

fn default_power() -> f64 {
    1.0
}

impl From<Action> for ActionRecord {
    fn from(action: Action) -> Self {
        let kind = action.effect.kind();
        let move_mode = action.effect.move_mode();
        let substance_name = match action.effect {
            Effect::Move { target, .. } => target,
            Effect::Absorb { substance } | Effect::Emit { substance } => substance,
            Effect::Divide | Effect::Heal => None,
        };
        Self {
            kind,
            power: action.power,
            substance_name,
            move_mode,
        }
    }
}

impl From<ActionRecord> for Action {
    fn from(record: ActionRecord) -> Self {
        let effect = match record.kind {
            ActionKind::Move => Effect::Move {
                target: record.substance_name,
                mode: record.move_mode,
            },
            ActionKind::Absorb => Effect::Absorb {
                substance: record.substance_name,
            },
            ActionKind::Emit => Effect::Emit {
                substance: record.substance_name,
            },
            ActionKind::Divide => Effect::Divide,
            ActionKind::Heal => Effect::Heal,
        };
        Self {
            effect,
            power: record.power,
        }
    }
}

impl Action {
    #[must_use]
    pub const fn new(effect: Effect, power: f64) -> Self {
        Self { effect, power }
    }

    /// Applies the effect to `cell`. Any children produced land in the
    /// context's nursery so they are not visited again this tick.
    pub fn execute(&self, cell: &mut Cell, ctx: &mut TickContext<'_>) {
        match &self.effect {
            Effect::Move { target, mode } => {
                if let Some(mode) = *mode
                    && let Some((dx, dy)) =
                        steering_impulse(cell, target.as_deref(), mode, self.power, ctx)
                {
                    cell.steer(dx, dy, ctx.config);
                }
            }
            Effect::Absorb {
                substance: Some(name),
            } => cell.absorb(name, ctx.grid),
            Effect::Emit {
                substance: Some(name),
            } => cell.emit(name, self.power, ctx),
            Effect::Absorb { substance: None } | Effect::Emit { substance: None } => {}
            Effect::Divide => {
                if let Some(child) = cell.divide(ctx) {
                    ctx.nursery.push(child);
                }
            }
            Effect::Heal => cell.heal(self.power),
        }
    }
}

fn steering_impulse(
    cell: &Cell,
    target: Option<&str>,
    mode: MoveMode,
    power: f64,
    ctx: &mut TickContext<'_>,
) -> Option<(f64, f64)> {
    let (dx, dy) = match (mode, target) {
        (MoveMode::Random, _) | (_, None) => {
            let angle = ctx.rng.random_range(0.0..std::f64::consts::TAU);
            (angle.cos(), angle.sin())
        }
        (mode, Some(name)) => gradient_direction(ctx.grid, cell.grid_position(), name, mode)?,
    };
    let length = dx.hypot(dy);
    if length == 0.0 {
        return None;
    }
    let scale = power * MOVE_POWER_SCALE / length;
    Some((dx * scale, dy * scale))
}

/// Scans the vision square around `origin` for the first strictly better
/// offset: richer for TOWARD/AROUND, poorer for AWAY.
fn gradient_direction(
    grid: &SubstanceGrid,
    origin: (i32, i32),
    name: &str,
    mode: MoveMode,
) -> Option<(f64, f64)> {
    let (x, y) = origin;
    let current = grid.concentration(x, y, name);
    let mut best: Option<(i32, i32, f64)> = None;
    for ix in -VISION_RADIUS..=VISION_RADIUS {
        for iy in -VISION_RADIUS..=VISION_RADIUS {
            if (ix == 0 && iy == 0) || !grid.contains(x + ix, y + iy) {
                continue;
            }
            let value = grid.concentration(x + ix, y + iy, name);
            let improves = match mode {
                MoveMode::Toward | MoveMode::Around => {
                    value > current && best.is_none_or(|(_, _, held)| value > held)
                }
                MoveMode::Away => value < current && best.is_none_or(|(_, _, held)| value < held),
                MoveMode::Random => false,
            };
            if improves {
                best = Some((ix, iy, value));
            }
        }
    }
    let (ix, iy, _) = best?;
    let (dx, dy) = (f64::from(ix), f64::from(iy));
    Some(if mode == MoveMode::Around {
        (-dy, dx)
    } else {
        (dx, dy)
    })
}

/// The scalar signal a gene reads.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Receptor {
    Energy,
    Health,
    /// Concentration of the named substance under the cell.
    Substance(String),
}

impl From<String> for Receptor {
    fn from(value: String) -> Self {
        match value.as_str() {
            "energy" => Self::Energy,
            "health" => Self::Health,
            _ => Self::Substance(value),
        }
    }
}

impl From<Receptor> for String {
    fn from(receptor: Receptor) -> Self {
        match receptor {
            Receptor::Energy => "energy".to_owned(),
            Receptor::Health => "health".to_owned(),
            Receptor::Substance(name) => name,
        }
    }
}

impl fmt::Display for Receptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Energy => f.write_str("energy"),
            Self::Health => f.write_str("health"),
            Self::Substance(name) => f.write_str(name),
        }
    }
}

impl Receptor {
    /// Reads the signal for `cell`. A substance absent from the cell's
    /// location yields `None`, which skips the gene.
    #[must_use]
    pub fn read(&self, cell: &Cell, grid: &SubstanceGrid) -> Option<f64> {
        match self {
            Self::Energy => Some(cell.energy),
            Self::Health => Some(cell.health),
            Self::Substance(name) => {
                let (x, y) = cell.grid_position();
                grid.get(x, y, name).map(|substance| substance.concentration)
            }
        }
    }

    const fn is_attribute(&self) -> bool {
        matches!(self, Self::Energy | Self::Health)
    }

    fn random(catalog: &Catalog, rng: &mut dyn RngCore) -> Self {
        if rng.random_bool(SUBSTANCE_RECEPTOR_PROBABILITY)
            && let Some(name) = catalog.random_name(rng)
        {
            return Self::Substance(name.to_owned());
        }
        if rng.random_bool(0.5) {
            Self::Energy
        } else {
            Self::Health
        }
    }

    fn random_threshold(&self, rng: &mut dyn RngCore) -> f64 {
        if self.is_attribute() {
            rng.random_range(ATTRIBUTE_THRESHOLD_RANGE)
        } else {
            rng.random_range(SUBSTANCE_THRESHOLD_RANGE)
        }
    }
}

/// One mutation operator. Each is rolled independently against the gene's
/// own mutation rate, in [`MutationOp::ORDER`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationOp {
    ToggleActive,
    Receptor,
    Threshold,
    Power,
    /// Spawns an unrelated random gene for the owning cell to append.
    AppendGene,
    MoveMode,
    /// Scales the gene's own mutation rate up or down.
    RateDrift,
}

impl MutationOp {
    pub const ORDER: [Self; 7] = [
        Self::ToggleActive,
        Self::Receptor,
        Self::Threshold,
        Self::Power,
        Self::AppendGene,
        Self::MoveMode,
        Self::RateDrift,
    ];
}

/// Outcome of mutating one gene.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct GeneMutation {
    /// The gene's serialised form differs from before.
    pub changed: bool,
    /// A fresh gene to append to the owner's list.
    pub spawned: Option<Gene>,
}

/// Binds a receptor to a trigger and an action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Gene {
    pub receptor: Receptor,
    pub trigger: Trigger,
    pub action: Action,
    #[serde(default = "default_active")]
    pub active: bool,
    #[serde(default = "default_gene_mutation_rate")]
    pub mutation_rate: f64,
}

fn default_active() -> bool {
    true
}

fn default_gene_mutation_rate() -> f64 {
    DEFAULT_GENE_MUTATION_RATE
}

impl Gene {
    #[must_use]
    pub const fn new(receptor: Receptor, trigger: Trigger, action: Action) -> Self {
        Self {
            receptor,
            trigger,
            action,
            active: true,
            mutation_rate: DEFAULT_GENE_MUTATION_RATE,
        }
    }

    /// Foraging and division genes every seeded cell may start with.
    #[must_use]
    pub fn base_genes(catalog: &Catalog) -> Vec<Self> {
        let organics = catalog.names_of_kind(crate::SubstanceKind::Organic);
        let seek = organics.iter().map(|name| {
            Self::new(
                Receptor::Substance((*name).to_owned()),
                Trigger::new(0.1, TriggerMode::Greater),
                Action::new(
                    Effect::Move {
                        target: Some((*name).to_owned()),
                        mode: Some(MoveMode::Toward),
                    },
                    1.0,
                ),
            )
        });
        let feed = organics.iter().map(|name| {
            Self::new(
                Receptor::Substance((*name).to_owned()),
                Trigger::new(0.3, TriggerMode::Greater),
                Action::new(
                    Effect::Absorb {
                        substance: Some((*name).to_owned()),
                    },
                    1.0,
                ),
            )
        });
        let divide = Self::new(
            Receptor::Energy,
            Trigger::new(90.0, TriggerMode::Greater),
            Action::new(Effect::Divide, 1.0),
        );
        seek.chain(feed).chain(std::iter::once(divide)).collect()
    }

    /// Draws a gene with random receptor, trigger and action.
    pub fn random(catalog: &Catalog, rng: &mut dyn RngCore) -> Self {
        let receptor = Receptor::random(catalog, rng);
        let threshold = receptor.random_threshold(rng);
        let mode = if rng.random_bool(0.5) {
            TriggerMode::Less
        } else {
            TriggerMode::Greater
        };
        let power = rng.random_range(POWER_RANGE);
        let substance = catalog.random_name(rng).map(str::to_owned);
        let effect = match rng.random_range(0..5u8) {
            0 => Effect::Move {
                target: substance,
                mode: Some(MoveMode::random(rng)),
            },
            1 => Effect::Absorb { substance },
            2 => Effect::Emit { substance },
            3 => Effect::Divide,
            _ => Effect::Heal,
        };
        Self::new(receptor, Trigger::new(threshold, mode), Action::new(effect, power))
    }

    /// Stable text form used for species identity.
    #[must_use]
    pub fn signature(&self) -> String {
        format!(
            "{}|{}|{:.3}|{}|{:.3}|{}|{}|{}",
            self.receptor,
            self.trigger.mode.as_str(),
            self.trigger.threshold,
            self.action.effect.kind().as_str(),
            self.action.power,
            self.action.effect.substance().unwrap_or("none"),
            self.action.effect.move_mode().map_or("none", MoveMode::as_str),
            self.active,
        )
    }

    /// Rolls every operator in [`MutationOp::ORDER`] against this gene's rate.
    pub fn mutate(&mut self, catalog: &Catalog, rng: &mut dyn RngCore) -> GeneMutation {
        let before = self.clone();
        let mut spawned = None;
        for op in MutationOp::ORDER {
            if rng.random::<f64>() < self.mutation_rate {
                self.apply(op, catalog, rng, &mut spawned);
            }
        }
        GeneMutation {
            changed: *self != before,
            spawned,
        }
    }

    /// Applies a single operator unconditionally.
    pub fn apply(
        &mut self,
        op: MutationOp,
        catalog: &Catalog,
        rng: &mut dyn RngCore,
        spawned: &mut Option<Gene>,
    ) {
        match op {
            MutationOp::ToggleActive => self.active = !self.active,
            MutationOp::Receptor => {
                if let Some(name) = catalog.random_name(rng) {
                    self.receptor = Receptor::Substance(name.to_owned());
                }
            }
            MutationOp::Threshold => self.trigger.threshold = self.receptor.random_threshold(rng),
            MutationOp::Power => self.action.power = rng.random_range(POWER_RANGE),
            MutationOp::AppendGene => *spawned = Some(Self::random(catalog, rng)),
            MutationOp::MoveMode => {
                if let Effect::Move { mode, .. } = &mut self.action.effect {
                    // One extra slot clears the mode entirely.
                    let pick = rng.random_range(0..=MoveMode::ALL.len());
                    *mode = MoveMode::ALL.get(pick).copied();
                }
            }
            MutationOp::RateDrift => {
                let factor = if rng.random_bool(0.5) {
                    RATE_DRIFT_UP
                } else {
                    RATE_DRIFT_DOWN
                };
                self.mutation_rate = (self.mutation_rate * factor).min(1.0);
            }
        }
    }
}
