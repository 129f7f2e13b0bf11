//! Persistent fleets and planets seen from the battle.
//!
//! The battle reads what takes part through an [`InventoryProvider`] and
//! writes the surviving counts and condition, destroyed buildings and
//! statistics back through the same trait when it concludes. [`InMemoryWorld`] is a plain
//! in-memory implementation used by tests and the headless runner.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::battle::BattleStatistics;
use crate::data::WeaponMount;
use crate::grid::Location;
use crate::structure::PlayerId;

/// Handle of a fleet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FleetId(pub u64);

/// Handle of a planet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlanetId(pub u64);

/// Handle of a planet building.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BuildingId(pub u64);

/// Handle of an inventory item within its container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(pub u64);

/// Something that holds inventory items.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Container {
    /// A fleet in space.
    Fleet(FleetId),
    /// A planet's orbit (stations, docked ships).
    Planet(PlanetId),
}

impl fmt::Display for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fleet(id) => write!(f, "fleet {}", id.0),
            Self::Planet(id) => write!(f, "planet {}", id.0),
        }
    }
}

/// Back-reference from a structure to the inventory item it came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ItemRef {
    /// Holding container.
    pub container: Container,
    /// Item within the container.
    pub item: ItemId,
}

/// A stack of identical units in a fleet or planet orbit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryItem {
    /// Item handle, unique within the container.
    pub id: ItemId,
    /// Technology the units are built from.
    pub tech_id: String,
    /// Number of units.
    pub count: u32,
    /// Hit points of the front unit; `None` is undamaged.
    #[serde(default)]
    pub hp: Option<i32>,
    /// Shield points of the front unit; `None` is fully charged.
    #[serde(default)]
    pub shield: Option<i32>,
    /// Equipment fitted on top of the technology's own weapons.
    #[serde(default)]
    pub slots: Vec<WeaponMount>,
}

impl InventoryItem {
    /// An undamaged stack without extra equipment.
    #[must_use]
    pub fn new(id: ItemId, tech_id: impl Into<String>, count: u32) -> Self {
        Self {
            id,
            tech_id: tech_id.into(),
            count,
            hp: None,
            shield: None,
            slots: Vec::new(),
        }
    }

    /// Current condition of the front unit.
    #[must_use]
    pub const fn condition(&self) -> UnitCondition {
        UnitCondition {
            hp: self.hp,
            shield: self.shield,
        }
    }
}

/// Hit and shield points of the front unit of a stack. `None` means the
/// value is at its maximum.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitCondition {
    /// Current hit points.
    pub hp: Option<i32>,
    /// Current shield points.
    pub shield: Option<i32>,
}

impl UnitCondition {
    /// The more damaged of two conditions, field by field.
    #[must_use]
    pub fn worst(self, other: Self) -> Self {
        let lower = |a: Option<i32>, b: Option<i32>| a.into_iter().chain(b).min();
        Self {
            hp: lower(self.hp, other.hp),
            shield: lower(self.shield, other.shield),
        }
    }
}

/// A building on a planet surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanetBuilding {
    /// Building handle.
    pub id: BuildingId,
    /// Technology of the building.
    pub tech_id: String,
    /// Cell on the planet surface map.
    pub location: Location,
    /// Current hit points.
    pub hp: i32,
}

/// A fleet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fleet {
    /// Fleet handle.
    pub id: FleetId,
    /// Owning player.
    pub owner: PlayerId,
    /// Ships in the fleet.
    pub items: Vec<InventoryItem>,
}

/// A planet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Planet {
    /// Planet handle.
    pub id: PlanetId,
    /// Owning player.
    pub owner: PlayerId,
    /// Orbital units (stations, garrisoned ships).
    #[serde(default)]
    pub items: Vec<InventoryItem>,
    /// Surface buildings.
    #[serde(default)]
    pub buildings: Vec<PlanetBuilding>,
    /// Population infected by a virus bomb.
    #[serde(default)]
    pub infected: bool,
}

/// Access to the persistent world a battle takes place in.
pub trait InventoryProvider {
    /// Owner of a container, `None` if it does not exist.
    fn owner(&self, container: Container) -> Option<PlayerId>;

    /// Items held by a container; empty if it does not exist.
    fn items(&self, container: Container) -> Vec<InventoryItem>;

    /// Buildings of a planet; empty if it does not exist.
    fn buildings(&self, planet: PlanetId) -> Vec<PlanetBuilding>;

    /// Overwrite an item's count. A count of zero removes the item.
    fn set_item_count(&mut self, item: ItemRef, count: u32);

    /// Overwrite the condition of an item's front unit.
    fn set_item_condition(&mut self, item: ItemRef, condition: UnitCondition);

    /// Overwrite a building's hit points.
    fn set_building_hp(&mut self, planet: PlanetId, building: BuildingId, hp: i32);

    /// Remove a destroyed building.
    fn remove_building(&mut self, planet: PlanetId, building: BuildingId);

    /// Delete a fleet if it has no items left. Returns whether it was deleted.
    fn remove_fleet_if_empty(&mut self, fleet: FleetId) -> bool;

    /// Mark a planet's population as infected.
    fn infect_planet(&mut self, planet: PlanetId);

    /// Add one battle's statistics to a player's record.
    fn record_statistics(&mut self, player: &str, statistics: &BattleStatistics);
}

/// In-memory world.
///
/// # Example RON
///
/// ```ron
/// InMemoryWorld(
///     fleets: {
///         1: Fleet(id: 1, owner: "Empire", items: [
///             InventoryItem(id: 1, tech_id: "Fighter1", count: 12),
///             InventoryItem(id: 2, tech_id: "Cruiser1", count: 2, hp: Some(70),
///                           slots: [WeaponMount(projectile: "Rocket")]),
///         ]),
///     },
///     planets: {},
/// )
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InMemoryWorld {
    /// Fleets by id.
    #[serde(default)]
    pub fleets: BTreeMap<FleetId, Fleet>,
    /// Planets by id.
    #[serde(default)]
    pub planets: BTreeMap<PlanetId, Planet>,
    /// Accumulated statistics per player.
    #[serde(default)]
    pub statistics: BTreeMap<PlayerId, BattleStatistics>,
}

impl InMemoryWorld {
    /// Create an empty world.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a fleet, replacing any fleet with the same id.
    pub fn add_fleet(&mut self, fleet: Fleet) {
        self.fleets.insert(fleet.id, fleet);
    }

    /// Add a planet, replacing any planet with the same id.
    pub fn add_planet(&mut self, planet: Planet) {
        self.planets.insert(planet.id, planet);
    }

    /// Total number of units of a technology in a container.
    #[must_use]
    pub fn unit_count(&self, container: Container, tech_id: &str) -> u32 {
        self.items(container)
            .iter()
            .filter(|i| i.tech_id == tech_id)
            .map(|i| i.count)
            .sum()
    }

    fn items_mut(&mut self, container: Container) -> Option<&mut Vec<InventoryItem>> {
        match container {
            Container::Fleet(id) => self.fleets.get_mut(&id).map(|f| &mut f.items),
            Container::Planet(id) => self.planets.get_mut(&id).map(|p| &mut p.items),
        }
    }
}

impl InventoryProvider for InMemoryWorld {
    fn owner(&self, container: Container) -> Option<PlayerId> {
        match container {
            Container::Fleet(id) => self.fleets.get(&id).map(|f| f.owner.clone()),
            Container::Planet(id) => self.planets.get(&id).map(|p| p.owner.clone()),
        }
    }

    fn items(&self, container: Container) -> Vec<InventoryItem> {
        match container {
            Container::Fleet(id) => self.fleets.get(&id).map(|f| f.items.clone()),
            Container::Planet(id) => self.planets.get(&id).map(|p| p.items.clone()),
        }
        .unwrap_or_default()
    }

    fn buildings(&self, planet: PlanetId) -> Vec<PlanetBuilding> {
        self.planets
            .get(&planet)
            .map(|p| p.buildings.clone())
            .unwrap_or_default()
    }

    fn set_item_count(&mut self, item: ItemRef, count: u32) {
        let Some(items) = self.items_mut(item.container) else {
            tracing::warn!(container = %item.container, "write-back to missing container");
            return;
        };
        if count == 0 {
            items.retain(|i| i.id != item.item);
        } else if let Some(entry) = items.iter_mut().find(|i| i.id == item.item) {
            entry.count = count;
        }
    }

    fn set_item_condition(&mut self, item: ItemRef, condition: UnitCondition) {
        if let Some(entry) = self
            .items_mut(item.container)
            .and_then(|items| items.iter_mut().find(|i| i.id == item.item))
        {
            entry.hp = condition.hp;
            entry.shield = condition.shield;
        }
    }

    fn set_building_hp(&mut self, planet: PlanetId, building: BuildingId, hp: i32) {
        if let Some(b) = self
            .planets
            .get_mut(&planet)
            .and_then(|p| p.buildings.iter_mut().find(|b| b.id == building))
        {
            b.hp = hp;
        }
    }

    fn remove_building(&mut self, planet: PlanetId, building: BuildingId) {
        if let Some(p) = self.planets.get_mut(&planet) {
            p.buildings.retain(|b| b.id != building);
        }
    }

    fn remove_fleet_if_empty(&mut self, fleet: FleetId) -> bool {
        let empty = self
            .fleets
            .get(&fleet)
            .is_some_and(|f| f.items.iter().all(|i| i.count == 0));
        if empty {
            self.fleets.remove(&fleet);
        }
        empty
    }

    fn infect_planet(&mut self, planet: PlanetId) {
        if let Some(p) = self.planets.get_mut(&planet) {
            p.infected = true;
        }
    }

    fn record_statistics(&mut self, player: &str, statistics: &BattleStatistics) {
        self.statistics
            .entry(player.to_string())
            .or_default()
            .merge(statistics);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn world() -> InMemoryWorld {
        let mut world = InMemoryWorld::new();
        world.add_fleet(Fleet {
            id: FleetId(1),
            owner: "Empire".into(),
            items: vec![
                InventoryItem::new(ItemId(1), "Fighter1", 10),
                InventoryItem::new(ItemId(2), "Cruiser1", 2),
            ],
        });
        world.add_planet(Planet {
            id: PlanetId(7),
            owner: "Rebels".into(),
            items: Vec::new(),
            buildings: vec![PlanetBuilding {
                id: BuildingId(1),
                tech_id: "Cannon".into(),
                location: Location::new(2, 2),
                hp: 50,
            }],
            infected: false,
        });
        world
    }

    #[test]
    fn test_write_back_counts() {
        let mut world = world();
        let fleet = Container::Fleet(FleetId(1));
        world.set_item_count(
            ItemRef {
                container: fleet,
                item: ItemId(1),
            },
            4,
        );
        assert_eq!(world.unit_count(fleet, "Fighter1"), 4);

        world.set_item_count(
            ItemRef {
                container: fleet,
                item: ItemId(2),
            },
            0,
        );
        assert_eq!(world.items(fleet).len(), 1);
    }

    #[test]
    fn test_write_back_condition() {
        let mut world = world();
        let cruisers = ItemRef {
            container: Container::Fleet(FleetId(1)),
            item: ItemId(2),
        };
        world.set_item_condition(
            cruisers,
            UnitCondition {
                hp: Some(35),
                shield: Some(0),
            },
        );
        let item = &world.items(cruisers.container)[1];
        assert_eq!((item.hp, item.shield), (Some(35), Some(0)));

        world.set_item_condition(cruisers, UnitCondition::default());
        assert_eq!(world.items(cruisers.container)[1].condition(), UnitCondition::default());
    }

    #[test]
    fn test_worst_condition() {
        let a = UnitCondition {
            hp: Some(40),
            shield: None,
        };
        let b = UnitCondition {
            hp: Some(55),
            shield: Some(3),
        };
        assert_eq!(
            a.worst(b),
            UnitCondition {
                hp: Some(40),
                shield: Some(3)
            }
        );
        assert_eq!(UnitCondition::default().worst(UnitCondition::default()), UnitCondition::default());
    }

    #[test]
    fn test_item_parses_with_equipment() {
        let item: InventoryItem = ron::from_str(
            r#"InventoryItem(id: 4, tech_id: "Cruiser1", count: 2, hp: Some(70),
                             slots: [WeaponMount(projectile: "Rocket")])"#,
        )
        .unwrap();
        assert_eq!(item.hp, Some(70));
        assert_eq!(item.shield, None);
        assert_eq!(item.slots[0].count, 1);
    }

    #[test]
    fn test_empty_fleet_removed() {
        let mut world = world();
        assert!(!world.remove_fleet_if_empty(FleetId(1)));
        world.fleets.get_mut(&FleetId(1)).unwrap().items.clear();
        assert!(world.remove_fleet_if_empty(FleetId(1)));
        assert!(world.owner(Container::Fleet(FleetId(1))).is_none());
    }

    #[test]
    fn test_buildings_and_infection() {
        let mut world = world();
        world.set_building_hp(PlanetId(7), BuildingId(1), 20);
        assert_eq!(world.buildings(PlanetId(7))[0].hp, 20);
        world.remove_building(PlanetId(7), BuildingId(1));
        assert!(world.buildings(PlanetId(7)).is_empty());
        world.infect_planet(PlanetId(7));
        assert!(world.planets[&PlanetId(7)].infected);
    }

    #[test]
    fn test_missing_containers_are_ignored() {
        let mut world = world();
        let ghost = ItemRef {
            container: Container::Fleet(FleetId(99)),
            item: ItemId(1),
        };
        world.set_item_count(ghost, 3);
        assert!(world.items(Container::Fleet(FleetId(99))).is_empty());
        assert!(!world.remove_fleet_if_empty(FleetId(99)));
    }

    #[test]
    fn test_statistics_accumulate() {
        let mut world = world();
        let stats = BattleStatistics {
            kills: 3,
            ..BattleStatistics::default()
        };
        world.record_statistics("Empire", &stats);
        world.record_statistics("Empire", &stats);
        assert_eq!(world.statistics["Empire"].kills, 6);
    }
}
