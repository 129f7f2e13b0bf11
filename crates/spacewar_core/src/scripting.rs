//! Scenario script hooks.

use crate::battle::Battle;
use crate::outcome::BattleResult;
use crate::registry::UnitRegistry;
use crate::structure::{Side, Structure};

/// Read-only view handed to script hooks.
#[derive(Debug, Clone, Copy)]
pub struct ScriptContext<'a> {
    /// Current tick.
    pub tick: u64,
    /// Battle aggregate.
    pub battle: &'a Battle,
    /// All structures.
    pub registry: &'a UnitRegistry,
}

/// Outcome forced by a script.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScriptVerdict {
    /// Winning side; `None` is a draw.
    pub winner: Option<Side>,
}

/// Callbacks a scenario can attach to a battle. All default to no-ops.
pub trait ScriptHooks: Send {
    /// Called once, after deployment.
    fn on_battle_start(&mut self, _ctx: &ScriptContext<'_>) {}

    /// Called at the end of every combat tick. Returning a verdict decides
    /// the battle.
    fn on_tick(&mut self, _ctx: &ScriptContext<'_>) -> Option<ScriptVerdict> {
        None
    }

    /// Called when a structure's last unit is destroyed.
    fn on_structure_destroyed(&mut self, _structure: &Structure) {}

    /// Called once when the battle concludes.
    fn on_battle_finish(&mut self, _result: &BattleResult) {}
}

/// No scripting.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoScript;

impl ScriptHooks for NoScript {}

/// Forces a result at a given tick. Used by scenarios with a time limit.
#[derive(Debug, Clone, Copy)]
pub struct DeadlineScript {
    /// Tick the verdict fires.
    pub tick: u64,
    /// Side declared the winner.
    pub winner: Option<Side>,
}

impl ScriptHooks for DeadlineScript {
    fn on_tick(&mut self, ctx: &ScriptContext<'_>) -> Option<ScriptVerdict> {
        (ctx.tick >= self.tick).then_some(ScriptVerdict {
            winner: self.winner,
        })
    }
}
