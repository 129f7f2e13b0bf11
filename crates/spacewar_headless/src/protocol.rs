//! JSON protocol for interactive headless battles.
//!
//! The runner communicates via JSON lines (one JSON object per line):
//!
//! **Input (stdin):** Commands from the controller
//! **Output (stdout):** Battle state updates and responses
//!
//! # Protocol Flow
//!
//! 1. Runner deploys the scenario, outputs `{"type":"ready",...}`
//! 2. Controller sends commands as JSON lines
//! 3. Runner answers every command (and reports state on `query`)
//! 4. Once the battle concludes, outputs `{"type":"concluded",...}`
//!
//! # Example Session
//!
//! ```text
//! <- {"type":"ready","version":"1.0","tick":0,"phase":"FormationSelect"}
//! -> {"cmd":"formation","side":"Attacker","template":"line"}
//! <- {"type":"ack","cmd":"formation"}
//! -> {"cmd":"start"}
//! <- {"type":"ack","cmd":"start"}
//! -> {"cmd":"tick","count":60}
//! <- {"type":"ticked","tick":60,"shots":14,"destroyed":[...],"phase":"Combat"}
//! -> {"cmd":"retreat","side":"Attacker"}
//! <- {"type":"ack","cmd":"retreat"}
//! ```

use serde::{Deserialize, Serialize};
use spacewar_core::battle::BattlePhase;
use spacewar_core::grid::Location;
use spacewar_core::outcome::BattleResult;
use spacewar_core::strategy::UnitOrder;
use spacewar_core::structure::{Category, Side, Structure, StructureId};

/// Protocol version reported in the ready message.
pub const PROTOCOL_VERSION: &str = "1.0";

// ============================================================================
// Input Commands (Controller -> Runner)
// ============================================================================

/// Commands accepted on stdin.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum Command {
    /// Advance the battle.
    Tick {
        /// Ticks to run.
        #[serde(default = "default_tick_count")]
        count: u32,
    },
    /// Report the full state.
    Query,
    /// Pick a formation during formation selection.
    Formation {
        /// Side to re-deploy.
        side: Side,
        /// Template name.
        template: String,
    },
    /// Leave formation selection.
    Start,
    /// Ask to withdraw a side.
    Retreat {
        /// Retreating side.
        side: Side,
    },
    /// Confirm the pending retreat.
    ConfirmRetreat,
    /// Cancel the retreat.
    CancelRetreat,
    /// Give an order to one unit.
    Order {
        /// Side issuing the order.
        side: Side,
        /// The order.
        order: UnitOrder,
    },
    /// Attack a structure, shorthand for an attack order.
    Attack {
        /// Side issuing the order.
        side: Side,
        /// Ordered unit.
        unit: u64,
        /// Target.
        target: u64,
    },
    /// Move a unit to a grid cell.
    Move {
        /// Side issuing the order.
        side: Side,
        /// Ordered unit.
        unit: u64,
        /// Destination column.
        x: i32,
        /// Destination row.
        y: i32,
    },
    /// Toggle the selection flag of a structure.
    Select {
        /// Structure.
        unit: u64,
        /// New flag.
        #[serde(default = "default_true")]
        selected: bool,
    },
    /// Run until the battle concludes.
    Finish,
    /// Report the state hash.
    Hash,
    /// Print the current layout as ASCII.
    Layout,
    /// End the session.
    Quit,
}

fn default_tick_count() -> u32 {
    1
}

fn default_true() -> bool {
    true
}

impl Command {
    /// Parse a JSON line.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Command name, as echoed in acknowledgements.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Tick { .. } => "tick",
            Self::Query => "query",
            Self::Formation { .. } => "formation",
            Self::Start => "start",
            Self::Retreat { .. } => "retreat",
            Self::ConfirmRetreat => "confirm_retreat",
            Self::CancelRetreat => "cancel_retreat",
            Self::Order { .. } => "order",
            Self::Attack { .. } => "attack",
            Self::Move { .. } => "move",
            Self::Select { .. } => "select",
            Self::Finish => "finish",
            Self::Hash => "hash",
            Self::Layout => "layout",
            Self::Quit => "quit",
        }
    }

    /// The unit order this command stands for, if any.
    #[must_use]
    pub fn as_order(&self) -> Option<(Side, UnitOrder)> {
        match *self {
            Self::Order { side, order } => Some((side, order)),
            Self::Attack { side, unit, target } => Some((
                side,
                UnitOrder::Attack {
                    unit: StructureId(unit),
                    target: StructureId(target),
                },
            )),
            Self::Move { side, unit, x, y } => Some((
                side,
                UnitOrder::MoveTo {
                    unit: StructureId(unit),
                    cell: Location::new(x, y),
                },
            )),
            _ => None,
        }
    }
}

// ============================================================================
// Output Responses (Runner -> Controller)
// ============================================================================

/// Responses written to stdout.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    /// Battle deployed, waiting for commands.
    Ready {
        /// Protocol version.
        version: String,
        /// Current tick.
        tick: u64,
        /// Current phase.
        phase: BattlePhase,
    },
    /// Command accepted.
    Ack {
        /// Command name.
        cmd: String,
    },
    /// Command rejected.
    Error {
        /// What went wrong.
        message: String,
        /// Command name, if it parsed.
        cmd: Option<String>,
    },
    /// Summary of the ticks just run.
    Ticked {
        /// Tick after the batch.
        tick: u64,
        /// Ports fired.
        shots: u32,
        /// Structures destroyed.
        destroyed: Vec<StructureId>,
        /// Phase after the batch.
        phase: BattlePhase,
    },
    /// Full state.
    State {
        /// Current tick.
        tick: u64,
        /// Current phase.
        phase: BattlePhase,
        /// Ships, stations and defenses still in the arena.
        units: Vec<UnitState>,
        /// Projectiles in flight.
        projectiles: usize,
        /// State hash.
        hash: u64,
    },
    /// ASCII picture of the occupancy grid.
    Layout {
        /// One line per grid row.
        rows: Vec<String>,
    },
    /// The battle is over.
    Concluded {
        /// Final result.
        result: Box<BattleResult>,
    },
    /// State hash.
    StateHash {
        /// Current tick.
        tick: u64,
        /// Hash.
        hash: u64,
    },
    /// Session ended.
    Bye,
}

/// External view of a structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnitState {
    /// Handle.
    pub id: StructureId,
    /// Owning side.
    pub side: Side,
    /// Technology.
    pub tech_id: String,
    /// Category.
    pub category: Category,
    /// Units in the group.
    pub count: u32,
    /// Position in battle space.
    pub x: f64,
    /// Position in battle space.
    pub y: f64,
    /// Hit points of the group.
    pub hp: i32,
    /// Shield points of the group.
    pub shield: i32,
    /// Current attack target.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<StructureId>,
    /// Guarding its position.
    pub guard: bool,
    /// Leaving the arena.
    pub fleeing: bool,
}

impl From<&Structure> for UnitState {
    fn from(s: &Structure) -> Self {
        Self {
            id: s.id,
            side: s.side,
            tech_id: s.tech_id.clone(),
            category: s.category,
            count: s.count,
            x: s.position.x.to_num(),
            y: s.position.y.to_num(),
            hp: s.hp,
            shield: s.shield,
            target: s.attack,
            guard: s.guard,
            fleeing: s.flee,
        }
    }
}

impl Response {
    /// Ready message.
    #[must_use]
    pub fn ready(tick: u64, phase: BattlePhase) -> Self {
        Self::Ready {
            version: PROTOCOL_VERSION.to_string(),
            tick,
            phase,
        }
    }

    /// Acknowledgement.
    #[must_use]
    pub fn ack(cmd: &str) -> Self {
        Self::Ack {
            cmd: cmd.to_string(),
        }
    }

    /// Error response.
    pub fn error(message: impl Into<String>, cmd: Option<&str>) -> Self {
        Self::Error {
            message: message.into(),
            cmd: cmd.map(String::from),
        }
    }

    /// Serialize as a single JSON line including the newline.
    #[must_use]
    pub fn to_json_line(&self) -> String {
        let mut json = serde_json::to_string(self).unwrap_or_else(|e| {
            format!(r#"{{"type":"error","message":"Serialization failed: {e}"}}"#)
        });
        json.push('\n');
        json
    }
}
