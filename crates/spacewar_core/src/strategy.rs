//! Per-side decision strategies.
//!
//! A strategy is consulted once per tick with the side's idle units. It
//! answers with an [`Intent`] for the whole side plus orders for single
//! units; the simulation validates and applies them.

use serde::{Deserialize, Serialize};

use crate::grid::{BattleGrid, Location};
use crate::projectile::can_target;
use crate::registry::UnitRegistry;
use crate::structure::{Side, StructureId};

/// What a side wants to do as a whole.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Intent {
    /// Keep fighting.
    #[default]
    Continue,
    /// Leave the battle toward the side's edge.
    Flee,
    /// Give up; the opponent wins.
    Surrender,
}

/// An order for one unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnitOrder {
    /// Attack a structure.
    Attack {
        /// Ordered unit.
        unit: StructureId,
        /// Enemy to attack.
        target: StructureId,
    },
    /// Move to a grid cell.
    MoveTo {
        /// Ordered unit.
        unit: StructureId,
        /// Destination.
        cell: Location,
    },
    /// Drop target and goal.
    Stop {
        /// Ordered unit.
        unit: StructureId,
    },
    /// Toggle guard mode.
    Guard {
        /// Ordered unit.
        unit: StructureId,
        /// New guard flag.
        enabled: bool,
    },
}

impl UnitOrder {
    /// Unit the order is for.
    #[must_use]
    pub const fn unit(&self) -> StructureId {
        match *self {
            Self::Attack { unit, .. }
            | Self::MoveTo { unit, .. }
            | Self::Stop { unit }
            | Self::Guard { unit, .. } => unit,
        }
    }
}

/// Answer of a strategy for one tick.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StrategyDecision {
    /// Side-wide intent.
    pub intent: Intent,
    /// Unit orders, applied in order.
    pub orders: Vec<UnitOrder>,
}

/// Read-only view handed to a strategy.
#[derive(Debug, Clone, Copy)]
pub struct StrategyContext<'a> {
    /// Side being decided for.
    pub side: Side,
    /// Current tick.
    pub tick: u64,
    /// All structures.
    pub registry: &'a UnitRegistry,
    /// Battle grid.
    pub grid: &'a BattleGrid,
    /// Units of `side` without target, goal or orders.
    pub idle: &'a [StructureId],
}

/// Decision policy of one side.
pub trait BattleStrategy: Send {
    /// Decide for this tick.
    fn decide(&mut self, ctx: &StrategyContext<'_>) -> StrategyDecision;
}

/// Does nothing; for sides steered entirely by a person.
#[derive(Debug, Default, Clone, Copy)]
pub struct PassiveStrategy;

impl BattleStrategy for PassiveStrategy {
    fn decide(&mut self, _ctx: &StrategyContext<'_>) -> StrategyDecision {
        StrategyDecision::default()
    }
}

/// Sends every idle unit at the nearest enemy.
///
/// Optionally flees once the side is outnumbered by `flee_ratio` to one.
#[derive(Debug, Default, Clone, Copy)]
pub struct AttackNearestStrategy {
    /// Flee when `enemies >= own × ratio`; `None` never flees.
    pub flee_ratio: Option<u32>,
}

impl AttackNearestStrategy {
    /// A strategy that never flees.
    #[must_use]
    pub const fn new() -> Self {
        Self { flee_ratio: None }
    }
}

impl BattleStrategy for AttackNearestStrategy {
    fn decide(&mut self, ctx: &StrategyContext<'_>) -> StrategyDecision {
        if let Some(ratio) = self.flee_ratio {
            let own = ctx.registry.unit_count(ctx.side);
            let enemies = ctx.registry.unit_count(ctx.side.opponent());
            if own > 0 && enemies >= own * ratio as usize {
                return StrategyDecision {
                    intent: Intent::Flee,
                    orders: Vec::new(),
                };
            }
        }

        let orders = ctx
            .idle
            .iter()
            .filter_map(|&unit| {
                let from = ctx.registry.get(unit)?;
                if from.ports.is_empty() && from.kamikaze == 0 {
                    return None;
                }
                let target = ctx.registry.nearest_enemy(ctx.side, from.position, None, |t| {
                    from.kamikaze > 0
                        || from
                            .ports
                            .iter()
                            .filter_map(|p| p.definition.as_ref())
                            .any(|d| can_target(d.mode, t))
                })?;
                Some(UnitOrder::Attack { unit, target })
            })
            .collect();
        StrategyDecision {
            intent: Intent::Continue,
            orders,
        }
    }
}
