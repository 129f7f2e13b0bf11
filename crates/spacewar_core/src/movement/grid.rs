//! Grid movement: exclusive cell reservations and A* paths.

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};

use rayon::prelude::*;

use super::{rotate_toward, steer_directly, MoveContext, MoveStatus, MovementHandler};
use crate::grid::Location;
use crate::math::Fixed;
use crate::pathfinding::{find_path, nearest_passable, DEFAULT_SEARCH_LIMIT};
use crate::structure::{MovementGoal, Structure, StructureId};

/// Ticks a unit waits on a blocked cell before asking for a new path.
const REPLAN_AFTER_BLOCKED_TICKS: u32 = 3;

#[derive(Debug, Clone, Copy)]
struct PathRequest {
    unit: StructureId,
    start: Location,
    goal: Location,
}

/// Movement strategy that keeps every unit on its own grid cell.
///
/// A unit holds its current cell and, while stepping, the next cell of its
/// path. No cell is ever held by two units. A unit whose goal is cleared
/// mid-step keeps both cells and drifts onto the next one.
#[derive(Debug, Default)]
pub struct GridMovement {
    /// Cell → holder. The authoritative reservation map.
    reservations: HashMap<Location, StructureId>,
    /// Holder → cells it holds (current, then next).
    held: BTreeMap<StructureId, Vec<Location>>,
    /// Remaining path per unit.
    paths: BTreeMap<StructureId, VecDeque<Location>>,
    /// Path insertion order, oldest first, for eviction.
    path_order: VecDeque<StructureId>,
    max_cached_paths: usize,
    pending: Vec<PathRequest>,
    pending_units: BTreeSet<StructureId>,
    unreachable: BTreeSet<StructureId>,
    blocked_ticks: BTreeMap<StructureId, u32>,
    /// Goal-less units finishing a step onto this cell.
    settling: BTreeMap<StructureId, Location>,
}

impl GridMovement {
    /// Create a handler caching at most `max_cached_paths` paths.
    #[must_use]
    pub fn new(max_cached_paths: usize) -> Self {
        Self {
            max_cached_paths: max_cached_paths.max(1),
            ..Self::default()
        }
    }

    /// Holder of a cell, if any.
    #[must_use]
    pub fn holder(&self, cell: Location) -> Option<StructureId> {
        self.reservations.get(&cell).copied()
    }

    /// Number of reserved cells.
    #[must_use]
    pub fn reserved_cells(&self) -> usize {
        self.reservations.len()
    }

    /// Number of cached paths.
    #[must_use]
    pub fn cached_paths(&self) -> usize {
        self.paths.len()
    }

    /// Whether a unit is waiting for its path.
    #[must_use]
    pub fn is_pending(&self, id: StructureId) -> bool {
        self.pending_units.contains(&id)
    }

    fn is_free_for(&self, cell: Location, id: StructureId) -> bool {
        self.reservations.get(&cell).map_or(true, |h| *h == id)
    }

    fn reserve(&mut self, id: StructureId, cell: Location) -> bool {
        if !self.is_free_for(cell, id) {
            return false;
        }
        self.reservations.insert(cell, id);
        let cells = self.held.entry(id).or_default();
        if !cells.contains(&cell) {
            cells.push(cell);
        }
        true
    }

    fn release_all(&mut self, id: StructureId) {
        if let Some(cells) = self.held.remove(&id) {
            for cell in cells {
                if self.reservations.get(&cell) == Some(&id) {
                    self.reservations.remove(&cell);
                }
            }
        }
    }

    /// Keep only `keep` reserved for `id`.
    fn release_except(&mut self, id: StructureId, keep: Location) {
        if let Some(cells) = self.held.get_mut(&id) {
            for cell in cells.iter().filter(|c| **c != keep) {
                if self.reservations.get(cell) == Some(&id) {
                    self.reservations.remove(cell);
                }
            }
            cells.retain(|c| *c == keep);
        }
    }

    fn forget_path(&mut self, id: StructureId) {
        self.paths.remove(&id);
        self.path_order.retain(|p| *p != id);
        self.pending.retain(|r| r.unit != id);
        self.pending_units.remove(&id);
        self.unreachable.remove(&id);
        self.blocked_ticks.remove(&id);
        self.settling.remove(&id);
    }

    /// Slide a goal-less unit onto the cell it is settling into. Heading
    /// is left alone so the unit can keep aiming while it drifts.
    fn settle(&mut self, unit: &mut Structure, ctx: &MoveContext<'_>) -> MoveStatus {
        let Some(cell) = self.settling.get(&unit.id).copied() else {
            return MoveStatus::Idle;
        };
        let step = match ctx.config.distance_per_tick(unit.movement_speed) {
            s if s == Fixed::ZERO => ctx.grid.cell_size(),
            s => s,
        };
        let (pos, reached) = unit.position.step_toward(ctx.grid.cell_center(cell), step);
        unit.position = pos;
        if !reached {
            return MoveStatus::Moving;
        }
        self.settling.remove(&unit.id);
        self.release_except(unit.id, cell);
        unit.cell = Some(cell);
        MoveStatus::Idle
    }

    /// Whether `id` is still finishing a step after its goal was cleared.
    #[must_use]
    pub fn is_settling(&self, id: StructureId) -> bool {
        self.settling.contains_key(&id)
    }

    fn store_path(&mut self, id: StructureId, path: VecDeque<Location>) {
        while self.paths.len() >= self.max_cached_paths {
            let Some(oldest) = self.path_order.pop_front() else {
                break;
            };
            self.paths.remove(&oldest);
            tracing::trace!(unit = %oldest, "evicted cached path");
        }
        self.path_order.retain(|p| *p != id);
        self.path_order.push_back(id);
        self.paths.insert(id, path);
    }

    fn request_path(&mut self, unit: &Structure, goal: Location, ctx: &MoveContext<'_>) {
        let start = unit
            .cell
            .unwrap_or_else(|| ctx.grid.nearest_cell(unit.position));
        self.pending.retain(|r| r.unit != unit.id);
        self.pending.push(PathRequest {
            unit: unit.id,
            start,
            goal,
        });
        self.pending_units.insert(unit.id);
    }

    /// Re-attach a unit without a cell (after a direct move) to the grid.
    fn snap_to_grid(&mut self, unit: &mut Structure, ctx: &MoveContext<'_>) {
        if unit.cell.is_some() && self.held.contains_key(&unit.id) {
            return;
        }
        let near = ctx.grid.nearest_cell(unit.position);
        let id = unit.id;
        let cell = nearest_passable(ctx.grid, near, |c| self.is_free_for(c, id));
        if let Some(cell) = cell {
            self.reserve(id, cell);
        }
        unit.cell = cell;
    }
}

impl MovementHandler for GridMovement {
    fn register_unit(&mut self, unit: &mut Structure, ctx: &MoveContext<'_>) {
        let id = unit.id;
        match unit.cell {
            Some(cell) if self.reserve(id, cell) => {}
            _ => {
                unit.cell = None;
                self.snap_to_grid(unit, ctx);
            }
        }
    }

    fn set_movement_goal(&mut self, unit: &mut Structure, goal: MovementGoal, ctx: &MoveContext<'_>) {
        self.forget_path(unit.id);
        match goal {
            MovementGoal::None => self.clear_unit_goal(unit, ctx),
            MovementGoal::Cell(target) => {
                let id = unit.id;
                let target = ctx.grid.nearest_cell(ctx.grid.cell_center(target));
                let Some(goal_cell) = nearest_passable(ctx.grid, target, |c| self.is_free_for(c, id))
                else {
                    unit.goal = MovementGoal::None;
                    return;
                };
                if unit.cell.is_none() {
                    self.snap_to_grid(unit, ctx);
                }
                unit.goal = MovementGoal::Cell(goal_cell);
                self.request_path(unit, goal_cell, ctx);
            }
            MovementGoal::Point { .. } => {
                // Direct moves leave the grid until the goal is cleared
                self.release_all(unit.id);
                unit.cell = None;
                unit.goal = goal;
            }
        }
    }

    fn clear_unit_goal(&mut self, unit: &mut Structure, ctx: &MoveContext<'_>) {
        let id = unit.id;
        self.forget_path(id);
        unit.goal = MovementGoal::None;
        if unit.cell.is_none() {
            self.snap_to_grid(unit, ctx);
        }
        let Some(cell) = unit.cell else {
            return;
        };
        if unit.position == ctx.grid.cell_center(cell) {
            self.release_except(id, cell);
            return;
        }
        // Mid-step: finish onto the reserved next cell, or back onto the
        // current one when there is none
        let next = self
            .held
            .get(&id)
            .and_then(|cells| cells.iter().copied().find(|c| *c != cell))
            .unwrap_or(cell);
        self.settling.insert(id, next);
    }

    fn move_unit(&mut self, unit: &mut Structure, ctx: &MoveContext<'_>) -> MoveStatus {
        match unit.goal {
            MovementGoal::None => self.settle(unit, ctx),
            MovementGoal::Point { target, standoff } => {
                let status = steer_directly(unit, target, standoff, ctx.config);
                if status == MoveStatus::Arrived && !unit.flee {
                    unit.goal = MovementGoal::None;
                }
                status
            }
            MovementGoal::Cell(goal) => {
                let id = unit.id;
                if self.unreachable.remove(&id) {
                    tracing::debug!(unit = %id, %goal, "goal unreachable");
                    unit.goal = MovementGoal::None;
                    return MoveStatus::Idle;
                }
                if self.pending_units.contains(&id) {
                    return MoveStatus::Waiting;
                }
                let Some(next) = self.paths.get(&id).and_then(|p| p.front().copied()) else {
                    if unit.cell == Some(goal) {
                        unit.goal = MovementGoal::None;
                        return MoveStatus::Arrived;
                    }
                    // Path was evicted
                    self.request_path(unit, goal, ctx);
                    return MoveStatus::Waiting;
                };

                if !self.reserve(id, next) {
                    let waited = self.blocked_ticks.entry(id).or_insert(0);
                    *waited += 1;
                    if *waited >= REPLAN_AFTER_BLOCKED_TICKS {
                        self.blocked_ticks.remove(&id);
                        self.paths.remove(&id);
                        self.request_path(unit, goal, ctx);
                    }
                    return MoveStatus::Waiting;
                }
                self.blocked_ticks.remove(&id);

                let center = ctx.grid.cell_center(next);
                if !rotate_toward(unit, center, ctx.config) {
                    return MoveStatus::Rotating;
                }
                let step = ctx.config.distance_per_tick(unit.movement_speed);
                if step == Fixed::ZERO {
                    return MoveStatus::Waiting;
                }
                let (pos, reached) = unit.position.step_toward(center, step);
                unit.position = pos;
                if !reached {
                    return MoveStatus::Moving;
                }

                self.release_except(id, next);
                unit.cell = Some(next);
                if let Some(path) = self.paths.get_mut(&id) {
                    path.pop_front();
                }
                if next == goal {
                    self.forget_path(id);
                    unit.goal = MovementGoal::None;
                    MoveStatus::Arrived
                } else {
                    MoveStatus::Moving
                }
            }
        }
    }

    fn remove_unit(&mut self, id: StructureId) {
        self.forget_path(id);
        self.release_all(id);
    }

    fn do_path_plannings(&mut self, ctx: &MoveContext<'_>) {
        if self.pending.is_empty() {
            return;
        }
        let requests = std::mem::take(&mut self.pending);
        let snapshot = &self.reservations;
        let grid = ctx.grid;

        let results: Vec<Option<Vec<Location>>> = requests
            .par_iter()
            .map(|r| {
                find_path(
                    grid,
                    r.start,
                    r.goal,
                    |c| snapshot.get(&c).map_or(true, |h| *h == r.unit),
                    DEFAULT_SEARCH_LIMIT,
                )
            })
            .collect();

        tracing::trace!(requests = requests.len(), "path plannings resolved");
        for (request, result) in requests.into_iter().zip(results) {
            self.pending_units.remove(&request.unit);
            match result {
                Some(path) => self.store_path(request.unit, path.into_iter().collect()),
                None => {
                    self.unreachable.insert(request.unit);
                }
            }
        }
    }
}
