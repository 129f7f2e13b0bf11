//! Test fixtures and helpers.
//!
//! Pre-built catalogs, worlds and battle setups for consistent testing.
//! Fleet ids below 100 belong to the attacker, planet ids start at 100.

use std::sync::Arc;

use fixed::types::I32F32;
use spacewar_core::battle::{BattleSetup, SideSetup};
use spacewar_core::config::BattleConfig;
use spacewar_core::data::{Catalog, ProjectileDef, SpaceEntityDef, TechCatalog};
use spacewar_core::error::Result;
use spacewar_core::grid::Location;
use spacewar_core::inventory::{
    BuildingId, Fleet, FleetId, InMemoryWorld, InventoryItem, ItemId, Planet, PlanetBuilding,
    PlanetId,
};
use spacewar_core::layout::LayoutTemplate;
use spacewar_core::simulation::BattleSimulation;
use spacewar_core::structure::Category;

/// Create a fixed-point number from an integer.
#[must_use]
pub fn fixed(n: i32) -> I32F32 {
    I32F32::from_num(n)
}

/// Create a fixed-point number from a float (for tests only).
///
/// Note: In real simulation code, never use floats.
/// This is only for convenient test setup.
#[must_use]
pub fn fixed_f(n: f64) -> I32F32 {
    I32F32::from_num(n)
}

/// Attacking player in every fixture.
pub const ATTACKER: &str = "Empire";
/// Defending player in every fixture.
pub const DEFENDER: &str = "Rebels";

/// A small but complete technology catalog.
pub const SAMPLE_CATALOG: &str = r#"
CatalogData(
    entities: [
        SpaceEntityDef(tech_id: "Fighter1", category: Fighter, hp: 12,
                       movement_speed: 20.0,
                       weapons: [WeaponMount(projectile: "Laser")]),
        SpaceEntityDef(tech_id: "Drone", category: Fighter, hp: 6,
                       movement_speed: 15.0, kamikaze: 30),
        SpaceEntityDef(tech_id: "Cruiser1", category: Cruiser, hp: 120, shield: 40,
                       movement_speed: 40.0, rotation_time: 300.0, ecm: 1,
                       weapons: [WeaponMount(projectile: "Laser", count: 2),
                                 WeaponMount(projectile: "Rocket")],
                       sprite: SpriteDef(width: 30, height: 30)),
        SpaceEntityDef(tech_id: "Jammer", category: Cruiser, hp: 80, shield: 20,
                       movement_speed: 40.0, ecm: 3,
                       weapons: [WeaponMount(projectile: "Laser")],
                       sprite: SpriteDef(width: 30, height: 30)),
        SpaceEntityDef(tech_id: "Battleship1", category: Battleship, hp: 400, shield: 120,
                       movement_speed: 80.0, rotation_time: 600.0,
                       weapons: [WeaponMount(projectile: "HeavyLaser", count: 2),
                                 WeaponMount(projectile: "ClusterRocket")],
                       sprite: SpriteDef(width: 48, height: 48)),
        SpaceEntityDef(tech_id: "Bomber", category: Cruiser, hp: 90,
                       movement_speed: 50.0,
                       weapons: [WeaponMount(projectile: "Bomb", count: 2)],
                       sprite: SpriteDef(width: 30, height: 30)),
        SpaceEntityDef(tech_id: "Plaguebringer", category: Cruiser, hp: 90,
                       movement_speed: 50.0,
                       weapons: [WeaponMount(projectile: "VirusBomb")],
                       sprite: SpriteDef(width: 30, height: 30)),
        SpaceEntityDef(tech_id: "Station1", category: Station, hp: 600, shield: 200,
                       weapons: [WeaponMount(projectile: "HeavyLaser", count: 3)],
                       sprite: SpriteDef(width: 56, height: 56)),
        SpaceEntityDef(tech_id: "Projector1", category: Projector, hp: 200,
                       weapons: [WeaponMount(projectile: "HeavyLaser")],
                       sprite: SpriteDef(width: 40, height: 40)),
        SpaceEntityDef(tech_id: "Shield1", category: Shield, hp: 250, shield: 300,
                       sprite: SpriteDef(width: 40, height: 40)),
    ],
    projectiles: [
        ProjectileDef(id: "Laser", mode: Beam, damage: 3, delay: 10, range: 96.0),
        ProjectileDef(id: "HeavyLaser", mode: Beam, damage: 12, delay: 20, range: 200.0),
        ProjectileDef(id: "Rocket", mode: Rocket, damage: 20, delay: 40, range: 300.0,
                      movement_speed: 5.0, anti_ecm: 1),
        ProjectileDef(id: "ClusterRocket", mode: MultiRocket, damage: 30, delay: 60,
                      range: 320.0, movement_speed: 6.0, ttl: 150, anti_ecm: 2,
                      area: Some(AreaEffect(radius: 24.0, secondary_count: 4,
                                            secondary_radius: 16.0,
                                            secondary_multiplier: 0.5))),
        ProjectileDef(id: "Bomb", mode: Bomb, damage: 40, delay: 50, range: 260.0,
                      movement_speed: 8.0,
                      area: Some(AreaEffect(radius: 20.0))),
        ProjectileDef(id: "VirusBomb", mode: VirusBomb, damage: 1, delay: 80, range: 260.0,
                      movement_speed: 8.0),
    ],
    efficiency: [
        EfficiencyEntry(attacker: Fighter, defender: Shield, multiplier: 0.25),
    ],
)
"#;

/// Parse [`SAMPLE_CATALOG`].
///
/// # Panics
///
/// Panics if the built-in catalog text no longer parses.
#[must_use]
pub fn sample_catalog() -> Catalog {
    Catalog::from_ron_str(SAMPLE_CATALOG).expect("sample catalog parses")
}

/// Catalog with a single 1-HP fighter armed with a 1-damage beam that
/// reaches across the whole default grid.
#[must_use]
pub fn duel_catalog() -> Catalog {
    let mut catalog = Catalog::default();
    catalog.insert_projectile(ProjectileDef::beam("Pulse", 1, fixed(2000)));
    catalog.insert_entity(
        SpaceEntityDef::new("Fighter1", Category::Fighter, 1)
            .with_speed(fixed(20))
            .with_weapon("Pulse", 1),
    );
    catalog
}

/// Share a catalog the way the simulation wants it.
#[must_use]
pub fn shared(catalog: Catalog) -> Arc<dyn TechCatalog> {
    Arc::new(catalog)
}

/// A fleet from `(tech_id, count)` pairs. Item ids follow the list order.
#[must_use]
pub fn fleet(id: u64, owner: &str, items: &[(&str, u32)]) -> Fleet {
    Fleet {
        id: FleetId(id),
        owner: owner.into(),
        items: inventory(items),
    }
}

fn inventory(items: &[(&str, u32)]) -> Vec<InventoryItem> {
    items
        .iter()
        .zip(1..)
        .map(|(&(tech_id, count), id)| InventoryItem::new(ItemId(id), tech_id, count))
        .collect()
}

/// Builder for [`InMemoryWorld`].
#[derive(Debug, Default)]
pub struct WorldBuilder {
    world: InMemoryWorld,
}

impl WorldBuilder {
    /// Start from an empty world.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a fleet.
    #[must_use]
    pub fn fleet(mut self, id: u64, owner: &str, items: &[(&str, u32)]) -> Self {
        self.world.add_fleet(fleet(id, owner, items));
        self
    }

    /// Add a planet with orbital items and `(tech_id, location, hp)`
    /// buildings. Building ids follow the list order.
    #[must_use]
    pub fn planet(
        mut self,
        id: u64,
        owner: &str,
        items: &[(&str, u32)],
        buildings: &[(&str, (i32, i32), i32)],
    ) -> Self {
        let buildings = buildings
            .iter()
            .zip(1..)
            .map(|(&(tech_id, (x, y), hp), id)| PlanetBuilding {
                id: BuildingId(id),
                tech_id: tech_id.into(),
                location: Location::new(x, y),
                hp,
            })
            .collect();
        self.world.add_planet(Planet {
            id: PlanetId(id),
            owner: owner.into(),
            items: inventory(items),
            buildings,
            infected: false,
        });
        self
    }

    /// Finish.
    #[must_use]
    pub fn build(self) -> InMemoryWorld {
        self.world
    }
}

/// A computer-versus-computer setup between two fleet lists.
#[must_use]
pub fn setup(attacker_fleets: &[u64], defender_fleets: &[u64]) -> BattleSetup {
    BattleSetup::new(
        SideSetup::new(ATTACKER, attacker_fleets.iter().copied().map(FleetId).collect()),
        SideSetup::new(DEFENDER, defender_fleets.iter().copied().map(FleetId).collect()),
    )
}

/// Like [`setup`] with both sides in guard mode.
#[must_use]
pub fn guarded_setup(attacker_fleets: &[u64], defender_fleets: &[u64]) -> BattleSetup {
    let mut setup = setup(attacker_fleets, defender_fleets);
    setup.attacker.guard = true;
    setup.defender.guard = true;
    setup
}

/// A wedge formation with three large and four fighter slots.
#[must_use]
pub fn wedge_template() -> LayoutTemplate {
    LayoutTemplate {
        name: "wedge".into(),
        large_slots: vec![(4, 4), (2, 0), (2, 8)],
        fighter_slots: vec![(7, 2), (7, 6), (8, 4), (6, 4)],
    }
}

/// A single-column line formation.
#[must_use]
pub fn line_template() -> LayoutTemplate {
    LayoutTemplate {
        name: "line".into(),
        large_slots: vec![(2, 0), (2, 4), (2, 8), (2, 12)],
        fighter_slots: vec![(5, 1), (5, 3), (5, 5), (5, 7), (5, 9), (5, 11)],
    }
}

/// Everything needed to start a battle.
#[derive(Debug, Clone)]
pub struct BattleFixture {
    /// Sides, planet and templates.
    pub setup: BattleSetup,
    /// Tunables.
    pub config: BattleConfig,
    /// Technology data.
    pub catalog: Catalog,
    /// Persistent fleets and planets.
    pub world: InMemoryWorld,
}

impl BattleFixture {
    /// Deploy the fixture.
    ///
    /// # Errors
    ///
    /// Propagates configuration and template errors from
    /// [`BattleSimulation::new`].
    pub fn try_simulation(&self) -> Result<BattleSimulation> {
        BattleSimulation::new(
            self.setup.clone(),
            self.config.clone(),
            shared(self.catalog.clone()),
            &self.world,
        )
    }

    /// Deploy the fixture.
    ///
    /// # Panics
    ///
    /// Panics if the fixture does not deploy.
    #[must_use]
    pub fn simulation(&self) -> BattleSimulation {
        self.try_simulation().expect("fixture deploys")
    }

    /// Same fixture with another seed.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.config.seed = seed;
        self
    }
}

/// Two 1-HP fighters in guard mode, one per side.
#[must_use]
pub fn fighter_duel() -> BattleFixture {
    BattleFixture {
        setup: guarded_setup(&[1], &[2]),
        config: BattleConfig::default(),
        catalog: duel_catalog(),
        world: WorldBuilder::new()
            .fleet(1, ATTACKER, &[("Fighter1", 1)])
            .fleet(2, DEFENDER, &[("Fighter1", 1)])
            .build(),
    }
}

/// Mixed fleets of fighters, cruisers and a battleship on each side.
#[must_use]
pub fn fleet_engagement() -> BattleFixture {
    BattleFixture {
        setup: setup(&[1], &[2]),
        config: BattleConfig::default(),
        catalog: sample_catalog(),
        world: WorldBuilder::new()
            .fleet(
                1,
                ATTACKER,
                &[("Fighter1", 24), ("Cruiser1", 3), ("Battleship1", 1)],
            )
            .fleet(
                2,
                DEFENDER,
                &[("Fighter1", 20), ("Cruiser1", 2), ("Jammer", 1), ("Battleship1", 1)],
            )
            .build(),
    }
}

/// Bombers against a defended planet with an invasion follow-up.
#[must_use]
pub fn planet_assault() -> BattleFixture {
    let mut setup = setup(&[1], &[]);
    setup.planet = Some(PlanetId(100));
    setup.invasion = true;
    BattleFixture {
        setup,
        config: BattleConfig::default(),
        catalog: sample_catalog(),
        world: WorldBuilder::new()
            .fleet(
                1,
                ATTACKER,
                &[("Bomber", 3), ("Cruiser1", 2), ("Fighter1", 12)],
            )
            .planet(
                100,
                DEFENDER,
                &[("Station1", 1)],
                &[
                    ("Projector1", (1, 1), 200),
                    ("Shield1", (2, 1), 250),
                    ("Colony Hub", (1, 2), 500),
                ],
            )
            .build(),
    }
}
