//! The battle simulation: deployment, the tick loop and commands.
//!
//! [`BattleSimulation`] owns everything a battle needs: the unit registry,
//! the movement handler, the battle aggregate, one strategy per side,
//! script hooks and the seeded RNG. The presentation layer (or the
//! headless runner) calls [`BattleSimulation::tick`] at the pace given by
//! [`BattleConfig::tick_interval`] and reads [`BattleSnapshot`]s back.
//!
//! # Tick order
//!
//! 1. Explosions count down
//! 2. Projectiles fly, get scrambled and hit
//! 3. Units are dispatched (engage, fire, idle handling, strategies)
//! 4. Queued path requests are planned
//! 5. Units move; fleeing units may leave, kamikaze units may ram
//! 6. Destroyed structures are removed
//! 7. Scripts and the win condition are checked
//!
//! Once a winner is known, steps 3 to 5 stop. The battle concludes when the
//! last explosion and projectile are gone.

use std::collections::hash_map::DefaultHasher;
use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::battle::{
    Battle, BattlePhase, BattleSetup, BattleStatistics, BuildingState, ConclusionReason, Decision,
};
use crate::combat::{DamageEvent, Explosion};
use crate::config::BattleConfig;
use crate::data::TechCatalog;
use crate::deploy::RosterEntry;
use crate::diagnostics::{Diagnostic, DiagnosticSink, Diagnostics};
use crate::error::{BattleError, Result};
use crate::grid::BattleGrid;
use crate::inventory::{BuildingId, InventoryProvider};
use crate::layout::Occupancy;
use crate::movement::{create_handler, MoveContext, MovementHandler};
use crate::outcome::{self, BattleResult};
use crate::registry::UnitRegistry;
use crate::scripting::{NoScript, ScriptContext, ScriptHooks};
use crate::strategy::{AttackNearestStrategy, BattleStrategy, PassiveStrategy, UnitOrder};
use crate::structure::{Side, Structure, StructureId};

/// An instant beam hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BeamShot {
    /// Firing structure.
    pub source: StructureId,
    /// Structure hit.
    pub target: StructureId,
    /// Damage before shields.
    pub damage: i32,
}

/// Events generated during a single tick.
///
/// The presentation layer uses these for sound and effects.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickEvents {
    /// Tick the events belong to.
    pub tick: u64,
    /// Beams fired.
    pub beams: Vec<BeamShot>,
    /// Projectiles launched.
    pub launched: Vec<StructureId>,
    /// Projectiles that hit.
    pub impacts: Vec<StructureId>,
    /// Projectiles that expired or left the arena.
    pub fizzled: Vec<StructureId>,
    /// Projectiles that rolled against ECM.
    pub scramble_rolls: Vec<StructureId>,
    /// Projectiles that were re-targeted by ECM.
    pub scrambled: Vec<StructureId>,
    /// Damage applications.
    pub damage: Vec<DamageEvent>,
    /// Structures destroyed.
    pub destroyed: Vec<StructureId>,
    /// Units that left the arena.
    pub escaped: Vec<StructureId>,
}

/// Serializable view of a battle at one tick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BattleSnapshot {
    /// Tick.
    pub tick: u64,
    /// Phase.
    pub phase: BattlePhase,
    /// Decision, once made.
    pub decision: Option<Decision>,
    /// All structures in handle order.
    pub structures: Vec<Structure>,
    /// Explosions on screen.
    pub explosions: Vec<Explosion>,
    /// Statistics per side.
    pub statistics: [BattleStatistics; 2],
    /// Planet buildings.
    pub buildings: BTreeMap<BuildingId, BuildingState>,
    /// A virus bomb reached the planet.
    pub planet_infected: bool,
}

impl BattleSnapshot {
    /// Encode with `bincode`.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        bincode::serialize(self).map_err(|e| BattleError::SnapshotEncoding(e.to_string()))
    }

    /// Decode bytes produced by [`BattleSnapshot::to_bytes`].
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        bincode::deserialize(bytes).map_err(|e| BattleError::SnapshotEncoding(e.to_string()))
    }
}

/// A running battle.
pub struct BattleSimulation {
    pub(crate) config: BattleConfig,
    pub(crate) grid: BattleGrid,
    pub(crate) catalog: Arc<dyn TechCatalog>,
    pub(crate) registry: UnitRegistry,
    pub(crate) movement: Box<dyn MovementHandler>,
    pub(crate) battle: Battle,
    pub(crate) occupancy: Occupancy,
    pub(crate) rosters: [Vec<RosterEntry>; 2],
    pub(crate) explosions: Vec<Explosion>,
    pub(crate) rng: ChaCha8Rng,
    pub(crate) diagnostics: Diagnostics,
    pub(crate) strategies: [Box<dyn BattleStrategy>; 2],
    pub(crate) script: Box<dyn ScriptHooks>,
    pub(crate) tick: u64,
    pub(crate) events: TickEvents,
    started: bool,
    result: Option<BattleResult>,
    written_back: bool,
}

impl std::fmt::Debug for BattleSimulation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BattleSimulation")
            .field("tick", &self.tick)
            .field("phase", &self.battle.phase)
            .field("structures", &self.registry.len())
            .finish_non_exhaustive()
    }
}

impl BattleSimulation {
    /// Deploy both sides of `setup` from `world` and prepare the battle.
    ///
    /// Computer-controlled sides get an [`AttackNearestStrategy`], sides
    /// commanded by a person a [`PassiveStrategy`].
    ///
    /// # Errors
    ///
    /// Fails on an invalid configuration or a template name the setup does
    /// not define.
    pub fn new(
        setup: BattleSetup,
        config: BattleConfig,
        catalog: Arc<dyn TechCatalog>,
        world: &dyn InventoryProvider,
    ) -> Result<Self> {
        config.validate()?;
        for side in Side::BOTH {
            if let Some(name) = &setup.side(side).template {
                if setup.template(name).is_none() {
                    return Err(BattleError::UnknownLayout(name.clone()));
                }
            }
        }

        let strategy_for = |side: Side| -> Box<dyn BattleStrategy> {
            if setup.side(side).human {
                Box::new(PassiveStrategy)
            } else {
                Box::new(AttackNearestStrategy::new())
            }
        };
        let strategies = [strategy_for(Side::Attacker), strategy_for(Side::Defender)];

        let mut sim = Self {
            grid: config.battle_grid(),
            movement: create_handler(&config),
            rng: ChaCha8Rng::seed_from_u64(config.seed),
            config,
            catalog,
            registry: UnitRegistry::new(),
            battle: Battle::new(setup),
            occupancy: Occupancy::new(),
            rosters: [Vec::new(), Vec::new()],
            explosions: Vec::new(),
            diagnostics: Diagnostics::new(),
            strategies,
            script: Box::new(NoScript),
            tick: 0,
            events: TickEvents::default(),
            started: false,
            result: None,
            written_back: false,
        };
        for side in Side::BOTH {
            sim.rosters[side.index()] = sim.collect_roster(side, world);
            sim.deploy(side);
        }
        tracing::info!(
            structures = sim.registry.len(),
            phase = ?sim.battle.phase,
            "battle deployed"
        );
        Ok(sim)
    }

    /// Replace the strategy of one side.
    #[must_use]
    pub fn with_strategy(mut self, side: Side, strategy: Box<dyn BattleStrategy>) -> Self {
        self.strategies[side.index()] = strategy;
        self
    }

    /// Attach script hooks.
    #[must_use]
    pub fn with_script(mut self, script: Box<dyn ScriptHooks>) -> Self {
        self.script = script;
        self
    }

    /// Current tick.
    #[must_use]
    pub const fn tick_count(&self) -> u64 {
        self.tick
    }

    /// Current phase.
    #[must_use]
    pub const fn phase(&self) -> BattlePhase {
        self.battle.phase
    }

    /// The battle aggregate.
    #[must_use]
    pub const fn battle(&self) -> &Battle {
        &self.battle
    }

    /// All structures.
    #[must_use]
    pub const fn registry(&self) -> &UnitRegistry {
        &self.registry
    }

    /// Battle grid.
    #[must_use]
    pub const fn grid(&self) -> &BattleGrid {
        &self.grid
    }

    /// Configuration.
    #[must_use]
    pub const fn config(&self) -> &BattleConfig {
        &self.config
    }

    /// Layout occupancy.
    #[must_use]
    pub const fn occupancy(&self) -> &Occupancy {
        &self.occupancy
    }

    /// Explosions on screen.
    #[must_use]
    pub fn explosions(&self) -> &[Explosion] {
        &self.explosions
    }

    /// Result, once concluded.
    #[must_use]
    pub const fn result(&self) -> Option<&BattleResult> {
        self.result.as_ref()
    }

    /// Whether the battle is over.
    #[must_use]
    pub fn is_concluded(&self) -> bool {
        self.battle.phase == BattlePhase::Concluded
    }

    /// Drain collected diagnostics.
    pub fn take_diagnostics(&mut self) -> Vec<(u64, Diagnostic)> {
        self.diagnostics.drain()
    }

    /// Forward collected diagnostics to a sink.
    pub fn flush_diagnostics(&mut self, sink: &mut dyn DiagnosticSink) {
        self.diagnostics.flush_into(sink);
    }

    /// Advance the battle by one tick.
    ///
    /// Does nothing during formation selection and after conclusion.
    pub fn tick(&mut self) -> TickEvents {
        if !self.battle.phase.is_active() {
            return TickEvents {
                tick: self.tick,
                ..TickEvents::default()
            };
        }
        if !self.started {
            self.started = true;
            let ctx = ScriptContext {
                tick: self.tick,
                battle: &self.battle,
                registry: &self.registry,
            };
            self.script.on_battle_start(&ctx);
        }

        self.tick += 1;
        self.events = TickEvents {
            tick: self.tick,
            ..TickEvents::default()
        };

        self.advance_explosions();
        self.advance_projectiles();
        if !self.battle.is_decided() {
            self.dispatch_units();
            let ctx = MoveContext {
                grid: &self.grid,
                config: &self.config,
            };
            self.movement.do_path_plannings(&ctx);
            self.move_units();
        }
        self.remove_dead();

        if !self.battle.is_decided() {
            self.run_script_tick();
            self.check_win();
            if !self.battle.is_decided() && self.tick >= self.config.max_ticks {
                tracing::warn!(tick = self.tick, "tick limit reached");
                self.battle.decide(None, ConclusionReason::Stalemate, self.tick);
            }
        }
        if self.battle.is_decided() && self.explosions.is_empty() && self.projectile_count() == 0 {
            self.finish();
        }

        #[cfg(feature = "debug-validation")]
        {
            let hash = self.state_hash();
            tracing::trace!(tick = self.tick, state_hash = hash, "battle state hash");
            for s in self.registry.iter() {
                debug_assert!(s.hp <= s.hp_max && s.shield <= s.shield_max, "{} out of bounds", s.id);
            }
        }

        std::mem::take(&mut self.events)
    }

    /// Tick until the battle concludes. Returns the number of ticks run.
    ///
    /// # Errors
    ///
    /// Fails during formation selection, which needs
    /// [`BattleSimulation::start_combat`] first.
    pub fn run_to_conclusion(&mut self) -> Result<u64> {
        if self.battle.phase == BattlePhase::FormationSelect {
            return Err(self.invalid_phase("run"));
        }
        let start = self.tick;
        while !self.is_concluded() {
            self.tick();
        }
        Ok(self.tick - start)
    }

    fn move_units(&mut self) {
        let ids: Vec<StructureId> = self
            .registry
            .iter()
            .filter(|s| s.is_alive() && !s.is_projectile())
            .map(|s| s.id)
            .collect();
        for id in ids {
            let ctx = MoveContext {
                grid: &self.grid,
                config: &self.config,
            };
            let Some(unit) = self.registry.get_mut(id) else {
                continue;
            };
            if !unit.is_alive() {
                continue;
            }
            let from = unit.position;
            self.movement.move_unit(unit, &ctx);
            let (flee, ram, pos) = (unit.flee, unit.kamikaze > 0 && unit.attack.is_some(), unit.position);
            if flee && !self.grid.contains_point(pos) {
                self.escape(id);
            } else if ram {
                self.check_ram(id, from);
            }
        }
    }

    fn remove_dead(&mut self) {
        for id in self.registry.dead_ids() {
            self.registry.remove(id);
            self.movement.remove_unit(id);
        }
    }

    fn run_script_tick(&mut self) {
        let ctx = ScriptContext {
            tick: self.tick,
            battle: &self.battle,
            registry: &self.registry,
        };
        if let Some(verdict) = self.script.on_tick(&ctx) {
            self.battle
                .decide(verdict.winner, ConclusionReason::Scripted, self.tick);
        }
    }

    fn check_win(&mut self) {
        let left = |side: Side| self.registry.unit_count(side);
        let reason = |loser: Side| {
            if self.battle.retreating == Some(loser) && self.battle.escaped_count(loser) > 0 {
                ConclusionReason::Retreat
            } else {
                ConclusionReason::Elimination
            }
        };
        let decision = match (left(Side::Attacker), left(Side::Defender)) {
            (0, 0) => Some((None, ConclusionReason::Elimination)),
            (0, _) => Some((Some(Side::Defender), reason(Side::Attacker))),
            (_, 0) => Some((Some(Side::Attacker), reason(Side::Defender))),
            _ => None,
        };
        if let Some((winner, reason)) = decision {
            self.battle.decide(winner, reason, self.tick);
        }
    }

    fn finish(&mut self) {
        self.battle.phase = BattlePhase::Concluded;
        let result = outcome::summarize(&self.battle, &self.registry, self.tick);
        tracing::info!(
            tick = self.tick,
            winner = ?result.winner,
            reason = ?result.reason,
            "battle concluded"
        );
        self.script.on_battle_finish(&result);
        self.result = Some(result);
    }

    /// Write the result back into the world. Only the first call writes;
    /// later calls return the cached result.
    ///
    /// # Errors
    ///
    /// Fails before the battle has concluded.
    pub fn conclude(&mut self, world: &mut dyn InventoryProvider) -> Result<&BattleResult> {
        if !self.is_concluded() {
            return Err(self.invalid_phase("conclude"));
        }
        let Some(result) = self.result.as_ref() else {
            return Err(self.invalid_phase("conclude"));
        };
        if !self.written_back {
            outcome::write_back(&self.battle, &self.registry, result, world);
            self.written_back = true;
        }
        Ok(result)
    }

    fn invalid_phase(&self, command: &str) -> BattleError {
        BattleError::InvalidPhase {
            command: command.to_string(),
            phase: self.battle.phase,
        }
    }

    /// Leave formation selection and start fighting.
    ///
    /// # Errors
    ///
    /// Fails outside formation selection.
    pub fn start_combat(&mut self) -> Result<()> {
        if self.battle.phase != BattlePhase::FormationSelect {
            return Err(self.invalid_phase("start_combat"));
        }
        self.battle.phase = BattlePhase::Combat;
        Ok(())
    }

    /// Re-lay a side out with another template.
    ///
    /// # Errors
    ///
    /// Fails outside formation selection or for an unknown template.
    pub fn change_formation(&mut self, side: Side, template: &str) -> Result<()> {
        if self.battle.phase != BattlePhase::FormationSelect {
            return Err(self.invalid_phase("change_formation"));
        }
        if self.battle.setup.template(template).is_none() {
            return Err(BattleError::UnknownLayout(template.to_string()));
        }
        let slot = match side {
            Side::Attacker => &mut self.battle.setup.attacker.template,
            Side::Defender => &mut self.battle.setup.defender.template,
        };
        *slot = Some(template.to_string());
        self.redeploy(side);
        Ok(())
    }

    /// Ask to retreat. The request has to be confirmed.
    ///
    /// # Errors
    ///
    /// Fails outside combat or when the battle forbids retreat.
    pub fn request_retreat(&mut self, side: Side) -> Result<()> {
        if self.battle.phase != BattlePhase::Combat {
            return Err(self.invalid_phase("request_retreat"));
        }
        if !self.battle.setup.retreat_allowed {
            return Err(BattleError::RetreatNotAllowed);
        }
        self.battle.retreating = Some(side);
        self.battle.phase = BattlePhase::RetreatRequested;
        Ok(())
    }

    /// Confirm a requested retreat: the side's units flee.
    ///
    /// # Errors
    ///
    /// Fails unless a retreat was requested.
    pub fn confirm_retreat(&mut self) -> Result<()> {
        if self.battle.phase != BattlePhase::RetreatRequested {
            return Err(self.invalid_phase("confirm_retreat"));
        }
        let Some(side) = self.battle.retreating else {
            return Err(self.invalid_phase("confirm_retreat"));
        };
        self.battle.phase = BattlePhase::RetreatConfirmed;
        self.set_fleeing(side, true);
        Ok(())
    }

    /// Withdraw a retreat. Units that already left stay gone.
    ///
    /// # Errors
    ///
    /// Fails unless a retreat is requested or confirmed.
    pub fn cancel_retreat(&mut self) -> Result<()> {
        match self.battle.phase {
            BattlePhase::RetreatRequested => {}
            BattlePhase::RetreatConfirmed => {
                if let Some(side) = self.battle.retreating {
                    self.set_fleeing(side, false);
                }
            }
            _ => return Err(self.invalid_phase("cancel_retreat")),
        }
        self.battle.retreating = None;
        self.battle.phase = BattlePhase::Combat;
        Ok(())
    }

    /// Issue an order on behalf of the person commanding `side`.
    ///
    /// # Errors
    ///
    /// Fails after conclusion, or when the unit or target does not exist.
    pub fn issue_order(&mut self, side: Side, order: UnitOrder) -> Result<()> {
        if self.battle.phase == BattlePhase::Concluded {
            return Err(self.invalid_phase("issue_order"));
        }
        self.apply_order(side, order, true)
    }

    /// Mark a structure as selected in the presentation layer.
    ///
    /// # Errors
    ///
    /// Fails for unknown handles.
    pub fn set_selected(&mut self, id: StructureId, selected: bool) -> Result<()> {
        let unit = self
            .registry
            .get_mut(id)
            .ok_or(BattleError::StructureNotFound(id))?;
        unit.selected = selected;
        Ok(())
    }

    /// Serializable view of the current state.
    #[must_use]
    pub fn snapshot(&self) -> BattleSnapshot {
        BattleSnapshot {
            tick: self.tick,
            phase: self.battle.phase,
            decision: self.battle.decision,
            structures: self.registry.iter().cloned().collect(),
            explosions: self.explosions.clone(),
            statistics: self.battle.statistics,
            buildings: self.battle.buildings.clone(),
            planet_infected: self.battle.planet_infected,
        }
    }

    /// Hash of the current state, for determinism checks.
    #[must_use]
    pub fn state_hash(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.tick.hash(&mut hasher);
        match self.snapshot().to_bytes() {
            Ok(bytes) => bytes.hash(&mut hasher),
            Err(e) => tracing::warn!(error = %e, "snapshot encoding failed"),
        }
        hasher.finish()
    }
}
