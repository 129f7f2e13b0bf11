//! # Spacewar Core
//!
//! Deterministic tactical space battle engine.
//!
//! This crate contains **only** deterministic logic:
//! - No rendering
//! - No IO (data arrives as RON strings or through provider traits)
//! - No system randomness (a seeded ChaCha RNG owned by the battle)
//! - Fixed-point positions, distances and damage multipliers
//!
//! This separation enables:
//! - Headless batch runs and balance testing
//! - Replays and determinism checks from snapshot bytes
//! - Embedding in any presentation layer
//!
//! ## Crate Structure
//!
//! - [`simulation`] - Deployment, the tick loop and commands
//! - [`battle`] - Battle aggregate, phases and statistics
//! - [`structure`] / [`registry`] - Battle participants and their arena
//! - [`layout`] - Formation templates and grid placement
//! - [`movement`] / [`pathfinding`] - Grid and freeform movement
//! - [`combat`] / [`projectile`] / [`collision`] - Damage, rockets, hit tests
//! - [`strategy`] / [`scripting`] - Pluggable decisions and scenario hooks
//! - [`outcome`] - Results and write-back into the world
//! - [`data`] / [`inventory`] - Catalog and world provider contracts
//! - [`math`] - Fixed-point math utilities

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]

pub mod battle;
pub mod collision;
pub mod combat;
pub mod config;
pub mod data;
mod deploy;
pub mod diagnostics;
pub mod error;
pub mod grid;
pub mod inventory;
pub mod layout;
pub mod math;
pub mod movement;
pub mod outcome;
pub mod pathfinding;
pub mod projectile;
pub mod registry;
pub mod scripting;
pub mod simulation;
pub mod sprite;
pub mod strategy;
pub mod structure;
mod targeting;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::battle::{
        Battle, BattlePhase, BattleSetup, BattleStatistics, ConclusionReason, SideSetup,
    };
    pub use crate::config::{BattleConfig, MovementMode, SimulationSpeed};
    pub use crate::data::{Catalog, CatalogData, TechCatalog};
    pub use crate::diagnostics::Diagnostic;
    pub use crate::error::{BattleError, Result};
    pub use crate::grid::{BattleGrid, Location};
    pub use crate::inventory::{
        Container, Fleet, FleetId, InMemoryWorld, InventoryItem, InventoryProvider, ItemId,
        ItemRef, Planet, PlanetBuilding, PlanetId, BuildingId, UnitCondition,
    };
    pub use crate::layout::LayoutTemplate;
    pub use crate::math::{Fixed, Vec2Fixed};
    pub use crate::outcome::{BattleResult, FollowUp};
    pub use crate::scripting::{NoScript, ScriptHooks};
    pub use crate::simulation::{BattleSimulation, BattleSnapshot, TickEvents};
    pub use crate::strategy::{
        AttackNearestStrategy, BattleStrategy, Intent, PassiveStrategy, UnitOrder,
    };
    pub use crate::structure::{Category, Side, Structure, StructureId, StructureKind};
}
