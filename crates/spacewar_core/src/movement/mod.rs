//! Per-tick movement of battle structures.
//!
//! Two interchangeable strategies implement [`MovementHandler`]:
//!
//! - [`GridMovement`] reserves grid cells and follows A* paths.
//! - [`FreeformMovement`] moves straight toward continuous targets.
//!
//! Both rotate before they translate, and both only keep handles: the
//! structures themselves stay in the unit registry and are lent to the
//! handler one at a time.

mod freeform;
mod grid;

pub use freeform::FreeformMovement;
pub use grid::GridMovement;

use crate::config::{BattleConfig, MovementMode};
use crate::grid::BattleGrid;
use crate::math::{angle_delta, normalize_angle, Fixed, Vec2Fixed};
use crate::structure::{MovementGoal, Structure, StructureId};

/// Read-only battle geometry lent to the handler for one call.
#[derive(Debug, Clone, Copy)]
pub struct MoveContext<'a> {
    /// Battle grid.
    pub grid: &'a BattleGrid,
    /// Battle configuration.
    pub config: &'a BattleConfig,
}

/// What a unit did during one `move_unit` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveStatus {
    /// No goal.
    Idle,
    /// Waiting for a path or for a blocked cell.
    Waiting,
    /// Turned toward the next waypoint without translating.
    Rotating,
    /// Translated toward the goal.
    Moving,
    /// Reached the goal this tick; the goal has been cleared.
    Arrived,
}

/// Movement strategy contract.
pub trait MovementHandler: Send {
    /// Start tracking a unit that was just placed on the battlefield.
    fn register_unit(&mut self, unit: &mut Structure, ctx: &MoveContext<'_>);

    /// Give a unit a new goal, replacing any previous one.
    fn set_movement_goal(&mut self, unit: &mut Structure, goal: MovementGoal, ctx: &MoveContext<'_>);

    /// Drop a unit's goal. Idempotent.
    fn clear_unit_goal(&mut self, unit: &mut Structure, ctx: &MoveContext<'_>);

    /// Advance one unit by one tick.
    fn move_unit(&mut self, unit: &mut Structure, ctx: &MoveContext<'_>) -> MoveStatus;

    /// Turn toward `target` by at most one tick's rotation. Returns `true`
    /// once the unit faces the target within tolerance.
    fn rotate_step(&mut self, unit: &mut Structure, target: Vec2Fixed, ctx: &MoveContext<'_>) -> bool {
        rotate_toward(unit, target, ctx.config)
    }

    /// Forget a unit that left the battle. Unknown handles are ignored.
    fn remove_unit(&mut self, id: StructureId);

    /// Resolve queued path requests.
    fn do_path_plannings(&mut self, ctx: &MoveContext<'_>);
}

/// Build the handler selected by the configuration.
#[must_use]
pub fn create_handler(config: &BattleConfig) -> Box<dyn MovementHandler> {
    match config.movement_mode {
        MovementMode::Grid => Box::new(GridMovement::new(config.max_cached_paths)),
        MovementMode::Freeform => Box::new(FreeformMovement::new()),
    }
}

/// Shared rotation rule: turn by `delay / rotation_time` radians per tick.
pub(crate) fn rotate_toward(unit: &mut Structure, target: Vec2Fixed, config: &BattleConfig) -> bool {
    if target == unit.position {
        return true;
    }
    let desired = (target - unit.position).angle();
    let delta = angle_delta(unit.angle, desired);
    if delta.abs() <= config.rotation_tolerance {
        return true;
    }
    match config.rotation_per_tick(unit.rotation_time) {
        None => {
            unit.angle = desired;
            true
        }
        Some(step) if delta.abs() <= step => {
            unit.angle = desired;
            true
        }
        Some(step) => {
            let turn = if delta > Fixed::ZERO { step } else { -step };
            unit.angle = normalize_angle(unit.angle + turn);
            angle_delta(unit.angle, desired).abs() <= config.rotation_tolerance
        }
    }
}

/// Rotate, then translate toward `target`, stopping `standoff` short.
///
/// Returns `Arrived` once within `standoff`, without moving further.
pub(crate) fn steer_directly(
    unit: &mut Structure,
    target: Vec2Fixed,
    standoff: Fixed,
    config: &BattleConfig,
) -> MoveStatus {
    let dist = unit.position.distance(target);
    if dist <= standoff {
        return MoveStatus::Arrived;
    }
    if !rotate_toward(unit, target, config) {
        return MoveStatus::Rotating;
    }
    let step = config.distance_per_tick(unit.movement_speed);
    if step == Fixed::ZERO {
        return MoveStatus::Waiting;
    }
    let travel = step.min(dist - standoff);
    let (pos, _) = unit.position.step_toward(target, travel);
    unit.position = pos;
    if unit.position.distance(target) <= standoff || travel < step {
        MoveStatus::Arrived
    } else {
        MoveStatus::Moving
    }
}
