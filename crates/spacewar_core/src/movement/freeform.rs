//! Freeform movement: straight lines in continuous space.

use super::{steer_directly, MoveContext, MoveStatus, MovementHandler};
use crate::math::Fixed;
use crate::structure::{MovementGoal, Structure, StructureId};

/// Movement strategy without reservations or paths.
#[derive(Debug, Default, Clone, Copy)]
pub struct FreeformMovement;

impl FreeformMovement {
    /// Create the handler.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl MovementHandler for FreeformMovement {
    fn register_unit(&mut self, _unit: &mut Structure, _ctx: &MoveContext<'_>) {}

    fn set_movement_goal(&mut self, unit: &mut Structure, goal: MovementGoal, _ctx: &MoveContext<'_>) {
        unit.goal = goal;
    }

    fn clear_unit_goal(&mut self, unit: &mut Structure, _ctx: &MoveContext<'_>) {
        unit.goal = MovementGoal::None;
    }

    fn move_unit(&mut self, unit: &mut Structure, ctx: &MoveContext<'_>) -> MoveStatus {
        let (target, standoff) = match unit.goal {
            MovementGoal::None => return MoveStatus::Idle,
            MovementGoal::Cell(cell) => (ctx.grid.cell_center(cell), Fixed::ZERO),
            MovementGoal::Point { target, standoff } => (target, standoff),
        };
        let status = steer_directly(unit, target, standoff, ctx.config);
        if status == MoveStatus::Arrived {
            if let MovementGoal::Cell(cell) = unit.goal {
                unit.cell = Some(cell);
            }
            if !unit.flee {
                unit.goal = MovementGoal::None;
            }
        } else if status == MoveStatus::Moving {
            unit.cell = ctx.grid.world_to_cell(unit.position);
        }
        status
    }

    fn remove_unit(&mut self, _id: StructureId) {}

    fn do_path_plannings(&mut self, _ctx: &MoveContext<'_>) {}
}
