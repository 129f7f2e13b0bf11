//! Technology and ballistics catalog.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{BattleError, Result};
use crate::math::{decimal_serde, Fixed};
use crate::structure::Category;

use super::{ProjectileDef, SpaceEntityDef};

/// Read-only access to the technology data a battle needs.
pub trait TechCatalog: Send + Sync {
    /// Space-entity definition for a technology id.
    fn entity(&self, tech_id: &str) -> Option<&SpaceEntityDef>;

    /// Projectile definition by id.
    fn projectile(&self, id: &str) -> Option<&ProjectileDef>;

    /// Damage multiplier of `attacker` against `defender`.
    fn efficiency(&self, attacker: Category, defender: Category) -> Fixed;
}

/// One override of the built-in efficiency table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EfficiencyEntry {
    /// Attacking category.
    pub attacker: Category,
    /// Defending category.
    pub defender: Category,
    /// Damage multiplier (1.0 = unchanged).
    #[serde(with = "decimal_serde")]
    pub multiplier: Fixed,
}

/// Serialized form of a catalog.
///
/// # Example RON
///
/// ```ron
/// CatalogData(
///     entities: [
///         SpaceEntityDef(tech_id: "Fighter1", category: Fighter, hp: 10,
///                        movement_speed: 20.0,
///                        weapons: [WeaponMount(projectile: "Laser")]),
///     ],
///     projectiles: [
///         ProjectileDef(id: "Laser", mode: Beam, damage: 2, delay: 10, range: 90.0),
///     ],
///     efficiency: [
///         EfficiencyEntry(attacker: Fighter, defender: Battleship, multiplier: 0.25),
///     ],
/// )
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogData {
    /// Ships, stations and planet defenses.
    #[serde(default)]
    pub entities: Vec<SpaceEntityDef>,
    /// Weapons.
    #[serde(default)]
    pub projectiles: Vec<ProjectileDef>,
    /// Overrides of the built-in efficiency table.
    #[serde(default)]
    pub efficiency: Vec<EfficiencyEntry>,
}

/// Indexed catalog built from [`CatalogData`].
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    entities: HashMap<String, SpaceEntityDef>,
    projectiles: HashMap<String, ProjectileDef>,
    efficiency: HashMap<(Category, Category), Fixed>,
}

impl Catalog {
    /// Build the lookup tables. Later duplicates replace earlier ones.
    #[must_use]
    pub fn from_data(data: CatalogData) -> Self {
        let mut catalog = Self::default();
        for def in data.entities {
            catalog.insert_entity(def);
        }
        for def in data.projectiles {
            catalog.insert_projectile(def);
        }
        for entry in data.efficiency {
            catalog
                .efficiency
                .insert((entry.attacker, entry.defender), entry.multiplier);
        }
        catalog
    }

    /// Parse a catalog from RON text.
    ///
    /// # Errors
    ///
    /// Returns [`BattleError::DataParseError`] if the text is not a valid
    /// [`CatalogData`] document.
    pub fn from_ron_str(text: &str) -> Result<Self> {
        let data: CatalogData = ron::from_str(text).map_err(|e| BattleError::DataParseError {
            what: "catalog".into(),
            message: e.to_string(),
        })?;
        Ok(Self::from_data(data))
    }

    /// Add or replace an entity definition.
    pub fn insert_entity(&mut self, def: SpaceEntityDef) {
        self.entities.insert(def.tech_id.clone(), def);
    }

    /// Add or replace a projectile definition.
    pub fn insert_projectile(&mut self, def: ProjectileDef) {
        self.projectiles.insert(def.id.clone(), def);
    }

    /// Number of entity definitions.
    #[must_use]
    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }
}

impl TechCatalog for Catalog {
    fn entity(&self, tech_id: &str) -> Option<&SpaceEntityDef> {
        self.entities.get(tech_id)
    }

    fn projectile(&self, id: &str) -> Option<&ProjectileDef> {
        self.projectiles.get(id)
    }

    fn efficiency(&self, attacker: Category, defender: Category) -> Fixed {
        self.efficiency
            .get(&(attacker, defender))
            .copied()
            .unwrap_or_else(|| default_efficiency(attacker, defender))
    }
}

/// Built-in efficiency of one category against another.
///
/// Small craft struggle against capital armour; capital guns track small
/// craft poorly.
#[must_use]
pub fn default_efficiency(attacker: Category, defender: Category) -> Fixed {
    use Category::{Battleship, Cruiser, Fighter, Missile, Projector, Shield, Station};

    let percent = match (attacker, defender) {
        (Missile, _) | (_, Missile) => 100,

        // Fighters: swarm small targets, scratch the big ones
        (Fighter, Fighter) => 100,
        (Fighter, Cruiser) => 75,
        (Fighter, Battleship | Station) => 50,
        (Fighter, Projector | Shield) => 50,

        // Cruisers: all-rounders
        (Cruiser, Fighter) => 75,
        (Cruiser, Cruiser | Battleship | Station) => 100,
        (Cruiser, Projector | Shield) => 75,

        // Battleships: heavy guns, poor tracking
        (Battleship, Fighter) => 50,
        (Battleship, Cruiser) => 100,
        (Battleship, Battleship | Station) => 125,
        (Battleship, Projector | Shield) => 100,

        // Static defenses
        (Station | Projector | Shield, Fighter) => 75,
        (Station | Projector | Shield, _) => 100,
    };

    Fixed::from_num(percent) / Fixed::from_num(100)
}
