//! Space entity definitions: ships, stations and planet defenses.

use serde::{Deserialize, Serialize};

use crate::math::{decimal_serde, Fixed};
use crate::sprite::SpriteDef;
use crate::structure::Category;

/// A weapon slot of an entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeaponMount {
    /// Projectile id in the catalog.
    pub projectile: String,
    /// Parallel weapon instances.
    #[serde(default = "default_count")]
    pub count: u32,
}

const fn default_count() -> u32 {
    1
}

/// Data-driven definition of anything that can appear on the battle plane.
///
/// # Example RON
///
/// ```ron
/// SpaceEntityDef(
///     tech_id: "Cruiser1",
///     category: Cruiser,
///     hp: 120,
///     shield: 40,
///     movement_speed: 40.0,
///     rotation_time: 300.0,
///     ecm: 1,
///     weapons: [
///         WeaponMount(projectile: "Laser", count: 2),
///     ],
///     sprite: SpriteDef(width: 30, height: 30),
/// )
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpaceEntityDef {
    /// Technology id the entity is built from.
    pub tech_id: String,

    /// Layout and efficiency category.
    pub category: Category,

    /// Hit points of a single unit.
    pub hp: i32,

    /// Shield points of a single unit.
    #[serde(default)]
    pub shield: i32,

    /// Milliseconds per unit of travel; zero = immobile.
    #[serde(with = "decimal_serde", default)]
    pub movement_speed: Fixed,

    /// Milliseconds per radian of rotation; zero = turns instantly.
    #[serde(with = "decimal_serde", default)]
    pub rotation_time: Fixed,

    /// Electronic countermeasure level.
    #[serde(default)]
    pub ecm: u8,

    /// Ramming damage; zero = not a kamikaze.
    #[serde(default)]
    pub kamikaze: i32,

    /// Armament.
    #[serde(default)]
    pub weapons: Vec<WeaponMount>,

    /// Bounds and collision masks.
    #[serde(default)]
    pub sprite: SpriteDef,
}

impl SpaceEntityDef {
    /// Minimal definition, mostly useful for tests and fixtures.
    #[must_use]
    pub fn new(tech_id: impl Into<String>, category: Category, hp: i32) -> Self {
        Self {
            tech_id: tech_id.into(),
            category,
            hp,
            shield: 0,
            movement_speed: Fixed::ZERO,
            rotation_time: Fixed::ZERO,
            ecm: 0,
            kamikaze: 0,
            weapons: Vec::new(),
            sprite: SpriteDef::default(),
        }
    }

    /// Add a weapon mount.
    #[must_use]
    pub fn with_weapon(mut self, projectile: impl Into<String>, count: u32) -> Self {
        self.weapons.push(WeaponMount {
            projectile: projectile.into(),
            count,
        });
        self
    }

    /// Set the travel speed in milliseconds per unit.
    #[must_use]
    pub fn with_speed(mut self, movement_speed: Fixed) -> Self {
        self.movement_speed = movement_speed;
        self
    }

    /// Whether the entity can fire at all.
    #[must_use]
    pub fn is_armed(&self) -> bool {
        !self.weapons.is_empty() || self.kamikaze > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal_entity() {
        let def: SpaceEntityDef = ron::from_str(
            "SpaceEntityDef(tech_id: \"Fighter1\", category: Fighter, hp: 10, \
             weapons: [WeaponMount(projectile: \"Laser\")])",
        )
        .unwrap();
        assert_eq!(def.weapons[0].count, 1);
        assert_eq!(def.sprite, SpriteDef::default());
        assert_eq!(def.movement_speed, Fixed::ZERO);
        assert!(def.is_armed());
    }

    #[test]
    fn test_kamikaze_counts_as_armed() {
        let mut def = SpaceEntityDef::new("Drone", Category::Fighter, 5);
        assert!(!def.is_armed());
        def.kamikaze = 50;
        assert!(def.is_armed());
    }
}
