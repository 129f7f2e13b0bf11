//! Scenario loading and configuration.
//!
//! A scenario bundles everything one battle needs: the engine config, the
//! technology catalog, the world holding the fleets and planets, and the
//! setup naming who fights whom. Scenarios are RON documents; two of them
//! ship with the binary and can be referenced by name.

use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use spacewar_core::battle::BattleSetup;
use spacewar_core::config::BattleConfig;
use spacewar_core::data::{Catalog, CatalogData};
use spacewar_core::error::BattleError;
use spacewar_core::inventory::InMemoryWorld;
use spacewar_core::simulation::BattleSimulation;
use thiserror::Error;

const SKIRMISH: &str = include_str!("../scenarios/skirmish.ron");
const PLANET_ASSAULT: &str = include_str!("../scenarios/planet_assault.ron");

/// Names of the scenarios compiled into the binary.
pub const BUILTIN_SCENARIOS: [&str; 2] = ["skirmish", "planet_assault"];

/// Error type for scenario operations.
#[derive(Error, Debug)]
pub enum ScenarioError {
    /// Neither a file nor a built-in scenario.
    #[error("Scenario not found: {0}")]
    NotFound(String),
    /// Failed to read file.
    #[error("Failed to read scenario file: {0}")]
    ReadError(#[from] std::io::Error),
    /// Failed to parse RON.
    #[error("Failed to parse scenario: {0}")]
    ParseError(#[from] ron::error::SpannedError),
    /// The engine rejected the scenario.
    #[error("Invalid scenario: {0}")]
    Battle(#[from] BattleError),
}

/// A complete battle scenario.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    /// Scenario name.
    pub name: String,
    /// Human-readable description.
    #[serde(default)]
    pub description: String,
    /// Engine configuration.
    #[serde(default)]
    pub config: BattleConfig,
    /// Technologies available in this battle.
    pub catalog: CatalogData,
    /// Fleets and planets.
    #[serde(default)]
    pub world: InMemoryWorld,
    /// Sides, planet and templates.
    pub setup: BattleSetup,
}

impl Scenario {
    /// Load a scenario from a RON file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ScenarioError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ScenarioError::NotFound(path.display().to_string()));
        }
        let contents = std::fs::read_to_string(path)?;
        Self::from_ron_str(&contents)
    }

    /// Load from a RON string (useful for embedded scenarios).
    pub fn from_ron_str(ron: &str) -> Result<Self, ScenarioError> {
        let scenario: Scenario = ron::from_str(ron)?;
        scenario.config.validate()?;
        Ok(scenario)
    }

    /// A built-in scenario by name.
    pub fn builtin(name: &str) -> Result<Self, ScenarioError> {
        match name {
            "skirmish" => Self::from_ron_str(SKIRMISH),
            "planet_assault" => Self::from_ron_str(PLANET_ASSAULT),
            _ => Err(ScenarioError::NotFound(name.to_string())),
        }
    }

    /// Load `reference` as a file if one exists, otherwise as a built-in name.
    pub fn resolve(reference: &str) -> Result<Self, ScenarioError> {
        if Path::new(reference).is_file() {
            Self::load(reference)
        } else {
            Self::builtin(reference)
        }
    }

    /// Same scenario with another RNG seed.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.config.seed = seed;
        self
    }

    /// Same scenario with another tick limit.
    #[must_use]
    pub fn with_max_ticks(mut self, max_ticks: u64) -> Self {
        self.config.max_ticks = max_ticks;
        self
    }

    /// Deploy the battle. Returns the simulation and the scenario's world,
    /// which receives the write-back once the battle concludes.
    pub fn build(&self) -> Result<(BattleSimulation, InMemoryWorld), ScenarioError> {
        let catalog = Arc::new(Catalog::from_data(self.catalog.clone()));
        let world = self.world.clone();
        let sim = BattleSimulation::new(self.setup.clone(), self.config.clone(), catalog, &world)?;
        Ok((sim, world))
    }
}
