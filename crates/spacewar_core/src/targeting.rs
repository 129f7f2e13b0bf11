//! Target acquisition, approach and weapon fire.
//!
//! Each tick every live unit is dispatched once: units with a target
//! engage it, units with a goal keep moving, the rest are idle. Idle guard
//! units (and everything that cannot move) pick the nearest enemy in range;
//! other idle units are handed to their side's strategy.

use crate::collision::sweep;
use crate::combat::{to_points, volley_damage, DamageKind, DamageTarget, ExplosionCause};
use crate::config::MovementMode;
use crate::data::ProjectileDef;
use crate::diagnostics::Diagnostic;
use crate::error::{BattleError, Result};
use crate::math::{Fixed, Vec2Fixed};
use crate::movement::MoveContext;
use crate::projectile::{can_target, sweep_target};
use crate::simulation::{BattleSimulation, BeamShot};
use crate::strategy::{Intent, StrategyContext, UnitOrder};
use crate::structure::{MovementGoal, Side, Structure, StructureId};
use crate::battle::{BattlePhase, ConclusionReason, OffGridUnits};

/// Share of the weapon reach a freeform approach stops at.
const STANDOFF_PERCENT: i32 = 90;

/// A grid approach goal is refreshed once the target strays this many cells.
const APPROACH_SLACK: u32 = 2;

/// Whether `unit` has any way to hurt `target`.
fn can_engage(unit: &Structure, target: &Structure) -> bool {
    if !target.is_alive() || target.is_projectile() || target.side == unit.side {
        return false;
    }
    unit.kamikaze > 0
        || unit
            .ports
            .iter()
            .filter_map(|p| p.definition.as_ref())
            .any(|d| can_target(d.mode, target))
}

impl BattleSimulation {
    /// Dispatch every live unit for this tick.
    pub(crate) fn dispatch_units(&mut self) {
        let ids: Vec<StructureId> = self
            .registry
            .iter()
            .filter(|s| s.is_alive() && !s.is_projectile())
            .map(|s| s.id)
            .collect();
        let mut idle: [Vec<StructureId>; 2] = [Vec::new(), Vec::new()];

        for id in ids {
            let Some(unit) = self.registry.get_mut(id) else {
                continue;
            };
            if !unit.is_alive() {
                continue;
            }
            unit.ports.iter_mut().for_each(|p| p.tick_cooldown());
            if unit.flee {
                continue;
            }
            if unit.attack.is_some() {
                self.engage(id);
                continue;
            }
            if unit.goal.is_some() {
                continue;
            }
            unit.direct_control = false;
            let side = unit.side;
            if (unit.guard || !unit.is_mobile()) && self.acquire(id) {
                self.engage(id);
                continue;
            }
            idle[side.index()].push(id);
        }

        for side in Side::BOTH {
            if self.battle.is_decided() {
                break;
            }
            self.consult_strategy(side, &idle[side.index()]);
        }
    }

    /// Pick the nearest enemy within weapon range. Returns whether a target
    /// was set.
    fn acquire(&mut self, id: StructureId) -> bool {
        let Some(unit) = self.registry.get(id) else {
            return false;
        };
        let range = unit.max_range();
        if range <= Fixed::ZERO {
            return false;
        }
        let target = self
            .registry
            .nearest_enemy(unit.side, unit.position, Some(range), |t| can_engage(unit, t));
        let Some(target) = target else {
            return false;
        };
        tracing::trace!(tick = self.tick, id = %id, target = %target, "target acquired");
        if let Some(unit) = self.registry.get_mut(id) {
            unit.attack = Some(target);
        }
        true
    }

    fn drop_target(&mut self, id: StructureId) {
        let ctx = MoveContext {
            grid: &self.grid,
            config: &self.config,
        };
        let Some(unit) = self.registry.get_mut(id) else {
            return;
        };
        unit.attack = None;
        unit.direct_control = false;
        if unit.goal.is_some() {
            self.movement.clear_unit_goal(unit, &ctx);
        }
    }

    /// Ports whose projectile the catalog lacks are reported the first time
    /// they would fire, then stay silent.
    fn report_missing_ports(&mut self, id: StructureId) {
        let Some(unit) = self.registry.get_mut(id) else {
            return;
        };
        let mut missing = Vec::new();
        for port in unit.ports.iter_mut().filter(|p| p.definition.is_none() && p.is_ready()) {
            port.cooldown = u32::MAX;
            missing.push(port.projectile_id.clone());
        }
        for projectile in missing {
            self.diagnostics.report(
                self.tick,
                Diagnostic::MissingProjectile {
                    source: id,
                    projectile,
                },
            );
        }
    }

    /// Close in on the current target and fire once in reach.
    fn engage(&mut self, id: StructureId) {
        self.report_missing_ports(id);
        let Some(unit) = self.registry.get(id) else {
            return;
        };
        let Some(target_id) = unit.attack else {
            return;
        };
        let Some(target) = self
            .registry
            .get(target_id)
            .filter(|t| can_engage(unit, t))
        else {
            self.drop_target(id);
            return;
        };
        let target_pos = target.position;

        if unit.kamikaze > 0 {
            if unit.is_mobile() {
                self.set_goal(
                    id,
                    MovementGoal::Point {
                        target: target_pos,
                        standoff: Fixed::ZERO,
                    },
                );
            }
            return;
        }

        let reach = if unit.must_approach() {
            unit.min_range()
        } else {
            unit.max_range()
        };
        if reach <= Fixed::ZERO {
            self.drop_target(id);
            return;
        }
        let distance = unit.position.distance(target_pos);
        if distance > reach {
            if unit.is_mobile() {
                self.approach(id, target_pos, reach);
            } else if !unit.direct_control {
                // Turrets re-acquire next tick
                self.drop_target(id);
            }
            return;
        }

        let ctx = MoveContext {
            grid: &self.grid,
            config: &self.config,
        };
        let Some(unit) = self.registry.get_mut(id) else {
            return;
        };
        if unit.goal.is_some() {
            self.movement.clear_unit_goal(unit, &ctx);
        }
        if !self.movement.rotate_step(unit, target_pos, &ctx) {
            return;
        }
        self.fire_ports(id, target_id);
    }

    fn approach(&mut self, id: StructureId, target: Vec2Fixed, reach: Fixed) {
        let Some(unit) = self.registry.get(id) else {
            return;
        };
        match self.config.movement_mode {
            MovementMode::Grid => {
                let wanted = self.grid.nearest_cell(target);
                let stale = match unit.goal {
                    MovementGoal::Cell(c) => c.chebyshev(wanted) > APPROACH_SLACK,
                    MovementGoal::None | MovementGoal::Point { .. } => true,
                };
                if stale {
                    self.set_goal(id, MovementGoal::Cell(wanted));
                }
            }
            MovementMode::Freeform => {
                let standoff = reach * Fixed::from_num(STANDOFF_PERCENT) / Fixed::from_num(100);
                let goal = MovementGoal::Point { target, standoff };
                if unit.goal != goal {
                    self.set_goal(id, goal);
                }
            }
        }
    }

    pub(crate) fn set_goal(&mut self, id: StructureId, goal: MovementGoal) {
        let ctx = MoveContext {
            grid: &self.grid,
            config: &self.config,
        };
        if let Some(unit) = self.registry.get_mut(id) {
            self.movement.set_movement_goal(unit, goal, &ctx);
        }
    }

    fn fire_ports(&mut self, id: StructureId, target_id: StructureId) {
        let (Some(unit), Some(target)) = (self.registry.get(id), self.registry.get(target_id)) else {
            return;
        };
        let distance = unit.position.distance(target.position);
        let ready: Vec<(usize, ProjectileDef, u32)> = unit
            .ports
            .iter()
            .enumerate()
            .filter(|(_, p)| p.is_ready())
            .filter_map(|(i, p)| p.definition.clone().map(|d| (i, d, p.count)))
            .filter(|(_, d, _)| distance <= d.range && can_target(d.mode, target))
            .collect();
        let (side, category, count) = (unit.side, unit.category, unit.count);
        let (target_category, target_pos) = (target.category, target.position);

        for (index, def, port_count) in ready {
            if !self.registry.get(target_id).is_some_and(Structure::is_alive) {
                break;
            }
            if def.is_beam() {
                let efficiency = self.catalog.efficiency(category, target_category);
                let focus = if self.config.diminishing_returns.apply_to_beams {
                    self.config.diminishing_returns.factor(self.attackers_on(target_id))
                } else {
                    Fixed::ONE
                };
                let damage = volley_damage(def.damage, port_count, count) * efficiency * focus;
                self.events.beams.push(BeamShot {
                    source: id,
                    target: target_id,
                    damage: to_points(damage),
                });
                self.spawn_explosion(target_pos, ExplosionCause::Hit);
                self.apply_damage(side, Some(id), DamageTarget::Structure(target_id), damage, DamageKind::Direct);
            } else if self.spawn_projectile(id, target_id, &def, port_count).is_none() {
                self.diagnostics
                    .report(self.tick, Diagnostic::MissingRocketTarget { source: id });
                continue;
            }
            self.battle.stats_mut(side).shots_fired += 1;
            if let Some(port) = self.registry.get_mut(id).and_then(|u| u.ports.get_mut(index)) {
                port.cooldown = def.delay.max(1);
            }
        }
    }

    /// Kamikaze collision test for the displacement `from → position`.
    pub(crate) fn check_ram(&mut self, id: StructureId, from: Vec2Fixed) {
        let Some(unit) = self.registry.get(id) else {
            return;
        };
        let Some(target) = unit.attack.and_then(|t| self.registry.get(t)) else {
            return;
        };
        if !can_engage(unit, target) {
            return;
        }
        let geometry = sweep_target(self.catalog.as_ref(), target);
        if sweep(
            from,
            unit.position,
            unit.bounding_radius(),
            &geometry,
            self.config.collision_substeps,
        )
        .is_none()
        {
            return;
        }
        let damage = Fixed::from_num(unit.kamikaze.max(0))
            .saturating_mul(Fixed::from_num(unit.count))
            .saturating_mul(self.catalog.efficiency(unit.category, target.category));
        let (side, target_id, at) = (unit.side, target.id, target.position);
        tracing::debug!(tick = self.tick, id = %id, target = %target_id, "kamikaze impact");
        self.apply_damage(side, Some(id), DamageTarget::Structure(target_id), damage, DamageKind::Direct);
        self.spawn_explosion(at, ExplosionCause::Impact);
        self.destroy_structure(id);
    }

    fn consult_strategy(&mut self, side: Side, idle: &[StructureId]) {
        let decision = {
            let ctx = StrategyContext {
                side,
                tick: self.tick,
                registry: &self.registry,
                grid: &self.grid,
                idle,
            };
            self.strategies[side.index()].decide(&ctx)
        };
        match decision.intent {
            Intent::Continue => {}
            Intent::Flee => self.begin_flee(side),
            Intent::Surrender => {
                tracing::info!(tick = self.tick, ?side, "side surrendered");
                self.battle
                    .decide(Some(side.opponent()), ConclusionReason::Surrender, self.tick);
            }
        }
        for order in decision.orders {
            if let Err(BattleError::StructureNotFound(id)) = self.apply_order(side, order, false) {
                self.diagnostics.report(self.tick, Diagnostic::StaleStructure { id });
            }
        }
    }

    /// Validate and apply one order. `direct` marks orders from a person.
    pub(crate) fn apply_order(&mut self, side: Side, order: UnitOrder, direct: bool) -> Result<()> {
        let id = order.unit();
        let ok = self
            .registry
            .get(id)
            .is_some_and(|u| u.is_alive() && !u.is_projectile() && u.side == side);
        if !ok {
            return Err(BattleError::StructureNotFound(id));
        }
        if self.registry.get(id).is_some_and(|u| u.flee) {
            return Ok(());
        }

        match order {
            UnitOrder::Attack { target, .. } => {
                let valid = self
                    .registry
                    .get(target)
                    .is_some_and(|t| t.is_alive() && !t.is_projectile() && t.side != side);
                if !valid {
                    return Err(BattleError::StructureNotFound(target));
                }
                self.drop_target(id);
                if let Some(unit) = self.registry.get_mut(id) {
                    unit.attack = Some(target);
                    unit.direct_control = direct;
                }
            }
            UnitOrder::MoveTo { cell, .. } => {
                self.drop_target(id);
                let mobile = self.registry.get(id).is_some_and(Structure::is_mobile);
                if mobile {
                    self.set_goal(id, MovementGoal::Cell(cell));
                }
                if let Some(unit) = self.registry.get_mut(id) {
                    unit.direct_control = direct;
                }
            }
            UnitOrder::Stop { .. } => {
                self.drop_target(id);
                if let Some(unit) = self.registry.get_mut(id) {
                    unit.direct_control = direct;
                }
            }
            UnitOrder::Guard { enabled, .. } => {
                if let Some(unit) = self.registry.get_mut(id) {
                    unit.guard = enabled;
                }
            }
        }
        Ok(())
    }

    /// Send every mobile unit of `side` toward its edge.
    pub(crate) fn begin_flee(&mut self, side: Side) {
        if !self.battle.setup.retreat_allowed {
            tracing::debug!(tick = self.tick, ?side, "flee ignored, retreat not allowed");
            return;
        }
        if self.battle.retreating == Some(side) && self.battle.phase == BattlePhase::RetreatConfirmed {
            return;
        }
        tracing::info!(tick = self.tick, ?side, "side retreating");
        self.battle.retreating = Some(side);
        self.battle.phase = BattlePhase::RetreatConfirmed;
        self.set_fleeing(side, true);
    }

    /// Start or stop fleeing for every mobile unit of `side`.
    pub(crate) fn set_fleeing(&mut self, side: Side, flee: bool) {
        let ids: Vec<StructureId> = self
            .registry
            .units_of(side)
            .filter(|u| u.is_mobile())
            .map(|u| u.id)
            .collect();
        let exit_x = match side {
            Side::Attacker => self.grid.origin().x - self.grid.width(),
            Side::Defender => self.grid.origin().x + self.grid.width() * Fixed::from_num(2),
        };
        let ctx = MoveContext {
            grid: &self.grid,
            config: &self.config,
        };
        for id in ids {
            let Some(unit) = self.registry.get_mut(id) else {
                continue;
            };
            unit.flee = flee;
            unit.attack = None;
            unit.direct_control = false;
            if flee {
                let exit = Vec2Fixed::new(exit_x, unit.position.y);
                self.movement.set_movement_goal(
                    unit,
                    MovementGoal::Point {
                        target: exit,
                        standoff: Fixed::ZERO,
                    },
                    &ctx,
                );
            } else {
                self.movement.clear_unit_goal(unit, &ctx);
            }
        }
    }

    /// Take a unit that left the rectangle out of the battle for good.
    pub(crate) fn escape(&mut self, id: StructureId) {
        let Some(unit) = self.registry.remove(id) else {
            return;
        };
        self.movement.remove_unit(id);
        tracing::debug!(tick = self.tick, id = %id, side = ?unit.side, "unit escaped");
        if let Some(item) = unit.source {
            self.battle.escaped.push(OffGridUnits {
                side: unit.side,
                item,
                condition: unit.condition(),
                tech_id: unit.tech_id,
                count: unit.count,
            });
        }
        self.events.escaped.push(id);
    }
}
