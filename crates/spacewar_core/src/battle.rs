//! The battle aggregate: who fights, in which phase, and how it ends.
//!
//! A [`Battle`] is created once per encounter, mutated by the tick loop and
//! consumed when the outcome is applied. It never touches structures
//! directly; those live in the unit registry.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::grid::Location;
use crate::inventory::{BuildingId, FleetId, ItemRef, PlanetId, UnitCondition};
use crate::layout::LayoutTemplate;
use crate::structure::{PlayerId, Side, StructureId};

/// Life-cycle phase of a battle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BattlePhase {
    /// A human side may still pick its formation; nothing moves.
    FormationSelect,
    /// Fighting.
    Combat,
    /// A side asked to retreat; fighting continues until it confirms.
    RetreatRequested,
    /// The retreating side's units are fleeing toward their edge.
    RetreatConfirmed,
    /// The battle is over.
    Concluded,
}

impl BattlePhase {
    /// Whether ticks advance fighting in this phase.
    #[must_use]
    pub const fn is_active(self) -> bool {
        matches!(
            self,
            Self::Combat | Self::RetreatRequested | Self::RetreatConfirmed
        )
    }
}

/// Why a battle ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConclusionReason {
    /// One side has no units left in the arena.
    Elimination,
    /// One side left the arena.
    Retreat,
    /// A strategy gave up.
    Surrender,
    /// A script forced the result.
    Scripted,
    /// The tick limit was reached.
    Stalemate,
}

/// The decided result, before the outcome is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    /// Winning side; `None` is a draw.
    pub winner: Option<Side>,
    /// Why.
    pub reason: ConclusionReason,
    /// Tick the decision was made.
    pub tick: u64,
}

/// One side's participants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SideSetup {
    /// Commanding player.
    pub player: PlayerId,
    /// Fleets fighting for this side.
    #[serde(default)]
    pub fleets: Vec<FleetId>,
    /// Formation template name.
    #[serde(default)]
    pub template: Option<String>,
    /// Whether a person commands this side.
    #[serde(default)]
    pub human: bool,
    /// Start ships in guard mode.
    #[serde(default)]
    pub guard: bool,
}

impl SideSetup {
    /// A computer-controlled side with the given fleets.
    #[must_use]
    pub fn new(player: impl Into<PlayerId>, fleets: Vec<FleetId>) -> Self {
        Self {
            player: player.into(),
            fleets,
            template: None,
            human: false,
            guard: false,
        }
    }
}

/// Everything needed to start a battle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BattleSetup {
    /// Initiating side.
    pub attacker: SideSetup,
    /// Defending side; owns the planet if there is one.
    pub defender: SideSetup,
    /// Planet being fought over.
    #[serde(default)]
    pub planet: Option<PlanetId>,
    /// Whether sides may retreat.
    #[serde(default = "default_true")]
    pub retreat_allowed: bool,
    /// The attacker intends to invade the planet if it wins.
    #[serde(default)]
    pub invasion: bool,
    /// Player that scrambled rockets never re-target onto.
    #[serde(default)]
    pub protected_player: Option<PlayerId>,
    /// Formation templates available to both sides.
    #[serde(default)]
    pub templates: Vec<LayoutTemplate>,
}

const fn default_true() -> bool {
    true
}

impl BattleSetup {
    /// A fleet-versus-fleet battle with default options.
    #[must_use]
    pub fn new(attacker: SideSetup, defender: SideSetup) -> Self {
        Self {
            attacker,
            defender,
            planet: None,
            retreat_allowed: true,
            invasion: false,
            protected_player: None,
            templates: Vec::new(),
        }
    }

    /// Setup of one side.
    #[must_use]
    pub const fn side(&self, side: Side) -> &SideSetup {
        match side {
            Side::Attacker => &self.attacker,
            Side::Defender => &self.defender,
        }
    }

    /// Template by name.
    #[must_use]
    pub fn template(&self, name: &str) -> Option<&LayoutTemplate> {
        self.templates.iter().find(|t| t.name == name)
    }
}

/// Per-player combat record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BattleStatistics {
    /// Enemy units destroyed.
    pub kills: u64,
    /// Own units lost.
    pub losses: u64,
    /// Hit and shield points removed from enemies.
    pub damage_dealt: u64,
    /// Hit and shield points lost.
    pub damage_taken: u64,
    /// Weapon ports fired.
    pub shots_fired: u64,
    /// Enemy buildings destroyed.
    pub buildings_destroyed: u64,
    /// Own buildings lost.
    pub buildings_lost: u64,
    /// Battles won.
    pub battles_won: u64,
    /// Battles lost.
    pub battles_lost: u64,
    /// Battles drawn.
    pub battles_drawn: u64,
}

impl BattleStatistics {
    /// Add another record to this one.
    pub fn merge(&mut self, other: &Self) {
        self.kills += other.kills;
        self.losses += other.losses;
        self.damage_dealt += other.damage_dealt;
        self.damage_taken += other.damage_taken;
        self.shots_fired += other.shots_fired;
        self.buildings_destroyed += other.buildings_destroyed;
        self.buildings_lost += other.buildings_lost;
        self.battles_won += other.battles_won;
        self.battles_lost += other.battles_lost;
        self.battles_drawn += other.battles_drawn;
    }
}

/// A planet building as the battle sees it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildingState {
    /// Technology of the building.
    pub tech_id: String,
    /// Cell on the planet surface.
    pub location: Location,
    /// Current hit points; synced from the structure if it has one.
    pub hp: i32,
    /// Structure fighting for this building, if it is a defense.
    pub structure: Option<StructureId>,
    /// Reduced to zero hit points.
    pub destroyed: bool,
}

/// Units that are not on the grid but still exist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OffGridUnits {
    /// Side the units belong to.
    pub side: Side,
    /// Inventory item they come from.
    pub item: ItemRef,
    /// Technology id.
    pub tech_id: String,
    /// Number of units.
    pub count: u32,
    /// Condition of the front unit when it left the grid.
    #[serde(default)]
    pub condition: UnitCondition,
}

/// The battle aggregate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Battle {
    /// Participants and options.
    pub setup: BattleSetup,
    /// Current phase.
    pub phase: BattlePhase,
    /// Set once a winner (or draw) is known; conclusion follows once
    /// explosions and projectiles have settled.
    pub decision: Option<Decision>,
    /// Side that asked to retreat.
    pub retreating: Option<Side>,
    /// Statistics per side, indexed by [`Side::index`].
    pub statistics: [BattleStatistics; 2],
    /// Units the layout could not place.
    pub unplaced: Vec<OffGridUnits>,
    /// Units that fled beyond the battle rectangle.
    pub escaped: Vec<OffGridUnits>,
    /// Units each inventory item brought into the battle.
    pub deployed: BTreeMap<ItemRef, u32>,
    /// Planet buildings taking part.
    pub buildings: BTreeMap<BuildingId, BuildingState>,
    /// A virus bomb reached the planet.
    pub planet_infected: bool,
}

impl Battle {
    /// Create a battle in its initial phase.
    #[must_use]
    pub fn new(setup: BattleSetup) -> Self {
        let phase = if Side::BOTH
            .iter()
            .any(|s| setup.side(*s).human && setup.side(*s).template.is_some())
        {
            BattlePhase::FormationSelect
        } else {
            BattlePhase::Combat
        };
        Self {
            setup,
            phase,
            decision: None,
            retreating: None,
            statistics: [BattleStatistics::default(); 2],
            unplaced: Vec::new(),
            escaped: Vec::new(),
            deployed: BTreeMap::new(),
            buildings: BTreeMap::new(),
            planet_infected: false,
        }
    }

    /// Player commanding a side.
    #[must_use]
    pub fn player(&self, side: Side) -> &str {
        &self.setup.side(side).player
    }

    /// Statistics of a side.
    #[must_use]
    pub const fn stats(&self, side: Side) -> &BattleStatistics {
        &self.statistics[side.index()]
    }

    /// Mutable statistics of a side.
    pub fn stats_mut(&mut self, side: Side) -> &mut BattleStatistics {
        &mut self.statistics[side.index()]
    }

    /// Record a decision. The first decision sticks.
    pub fn decide(&mut self, winner: Option<Side>, reason: ConclusionReason, tick: u64) {
        if self.decision.is_some() {
            return;
        }
        tracing::info!(tick, ?winner, ?reason, "battle decided");
        self.decision = Some(Decision {
            winner,
            reason,
            tick,
        });
    }

    /// Whether the winner is known.
    #[must_use]
    pub const fn is_decided(&self) -> bool {
        self.decision.is_some()
    }

    /// Units of a side that left the arena alive.
    #[must_use]
    pub fn escaped_count(&self, side: Side) -> u32 {
        self.escaped
            .iter()
            .filter(|e| e.side == side)
            .map(|e| e.count)
            .sum()
    }
}
