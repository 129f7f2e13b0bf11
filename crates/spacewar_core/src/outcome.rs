//! Battle results and their write-back into the persistent world.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::battle::{Battle, BattleStatistics, ConclusionReason, OffGridUnits};
use crate::inventory::{InventoryProvider, ItemRef, PlanetId, UnitCondition};
use crate::registry::UnitRegistry;
use crate::structure::{PlayerId, Side};

/// Work handed to the strategic layer after the battle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FollowUp {
    /// The attacker won a planet battle and wants to land troops.
    GroundInvasion {
        /// Planet to invade.
        planet: PlanetId,
        /// Invading player.
        attacker: PlayerId,
    },
}

/// Result for one side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SideOutcome {
    /// Commanding player.
    pub player: PlayerId,
    /// Statistics of this battle, including the won/lost/drawn tally.
    pub statistics: BattleStatistics,
    /// Units still in the arena.
    pub survivors: u32,
    /// Units that left the arena alive.
    pub escaped: u32,
    /// Units that never made it onto the grid.
    pub unplaced: u32,
}

/// Summary of a concluded battle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BattleResult {
    /// Winning side; `None` is a draw.
    pub winner: Option<Side>,
    /// Winning player.
    pub winner_player: Option<PlayerId>,
    /// Why the battle ended.
    pub reason: ConclusionReason,
    /// Ticks simulated.
    pub ticks: u64,
    /// Attacker result.
    pub attacker: SideOutcome,
    /// Defender result.
    pub defender: SideOutcome,
    /// A virus bomb reached the planet.
    pub planet_infected: bool,
    /// Follow-up for the strategic layer.
    pub follow_up: Option<FollowUp>,
}

impl BattleResult {
    /// Result of one side.
    #[must_use]
    pub const fn side(&self, side: Side) -> &SideOutcome {
        match side {
            Side::Attacker => &self.attacker,
            Side::Defender => &self.defender,
        }
    }
}

fn off_grid(list: &[OffGridUnits], side: Side) -> u32 {
    list.iter().filter(|u| u.side == side).map(|u| u.count).sum()
}

/// Build the result of a decided battle.
#[must_use]
pub fn summarize(battle: &Battle, registry: &UnitRegistry, tick: u64) -> BattleResult {
    let (winner, reason) = battle
        .decision
        .map_or((None, ConclusionReason::Stalemate), |d| (d.winner, d.reason));

    let side_outcome = |side: Side| {
        let mut statistics = *battle.stats(side);
        match winner {
            Some(w) if w == side => statistics.battles_won += 1,
            Some(_) => statistics.battles_lost += 1,
            None => statistics.battles_drawn += 1,
        }
        SideOutcome {
            player: battle.player(side).to_string(),
            statistics,
            survivors: registry.units_of(side).map(|u| u.count).sum(),
            escaped: battle.escaped_count(side),
            unplaced: off_grid(&battle.unplaced, side),
        }
    };

    let follow_up = match (winner, battle.setup.planet) {
        (Some(Side::Attacker), Some(planet)) if battle.setup.invasion => Some(FollowUp::GroundInvasion {
            planet,
            attacker: battle.player(Side::Attacker).to_string(),
        }),
        _ => None,
    };

    BattleResult {
        winner,
        winner_player: winner.map(|w| battle.player(w).to_string()),
        reason,
        ticks: tick,
        attacker: side_outcome(Side::Attacker),
        defender: side_outcome(Side::Defender),
        planet_infected: battle.planet_infected,
        follow_up,
    }
}

/// Units per inventory item still alive: on the grid, escaped or unplaced.
#[must_use]
pub fn surviving_counts(battle: &Battle, registry: &UnitRegistry) -> BTreeMap<ItemRef, u32> {
    let mut counts: BTreeMap<ItemRef, u32> = BTreeMap::new();
    for s in registry.iter().filter(|s| s.is_alive() && !s.is_projectile()) {
        if let Some(item) = s.source {
            *counts.entry(item).or_default() += s.count;
        }
    }
    for u in battle.escaped.iter().chain(&battle.unplaced) {
        *counts.entry(u.item).or_default() += u.count;
    }
    counts
}

/// Condition of the most damaged survivor per inventory item.
#[must_use]
pub fn surviving_conditions(battle: &Battle, registry: &UnitRegistry) -> BTreeMap<ItemRef, UnitCondition> {
    let mut conditions: BTreeMap<ItemRef, UnitCondition> = BTreeMap::new();
    let on_grid = registry
        .iter()
        .filter(|s| s.is_alive() && !s.is_projectile())
        .filter_map(|s| s.source.map(|item| (item, s.condition())));
    let off_grid = battle
        .escaped
        .iter()
        .chain(&battle.unplaced)
        .map(|u| (u.item, u.condition));
    for (item, condition) in on_grid.chain(off_grid) {
        conditions
            .entry(item)
            .and_modify(|c| *c = c.worst(condition))
            .or_insert(condition);
    }
    conditions
}

/// Write survivors, building damage, infection and statistics back.
///
/// Items that entered the battle get their surviving count (zero removes
/// them) and the condition of their most damaged survivor. Destroyed
/// buildings are removed and empty fleets deleted.
pub fn write_back(
    battle: &Battle,
    registry: &UnitRegistry,
    result: &BattleResult,
    world: &mut dyn InventoryProvider,
) {
    let counts = surviving_counts(battle, registry);
    let conditions = surviving_conditions(battle, registry);
    for item in battle.deployed.keys() {
        let count = counts.get(item).copied().unwrap_or(0);
        world.set_item_count(*item, count);
        if let Some(condition) = conditions.get(item).filter(|_| count > 0) {
            world.set_item_condition(*item, *condition);
        }
    }

    if let Some(planet) = battle.setup.planet {
        for (id, b) in &battle.buildings {
            let hp = b
                .structure
                .and_then(|s| registry.get(s))
                .filter(|s| s.is_alive())
                .map_or(b.hp, |s| s.hp);
            if b.destroyed || hp <= 0 {
                world.remove_building(planet, *id);
            } else {
                world.set_building_hp(planet, *id, hp);
            }
        }
        if battle.planet_infected {
            world.infect_planet(planet);
        }
    }

    for fleet in battle
        .setup
        .attacker
        .fleets
        .iter()
        .chain(&battle.setup.defender.fleets)
    {
        if world.remove_fleet_if_empty(*fleet) {
            tracing::info!(fleet = fleet.0, "fleet destroyed");
        }
    }

    for side in Side::BOTH {
        let outcome = result.side(side);
        world.record_statistics(&outcome.player, &outcome.statistics);
    }
}
