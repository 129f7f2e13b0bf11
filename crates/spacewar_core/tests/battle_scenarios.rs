//! End-to-end battles driven through the public simulation API.

use std::collections::BTreeSet;

use spacewar_core::battle::{BattlePhase, ConclusionReason};
use spacewar_core::config::BattleConfig;
use spacewar_core::combat::{DamageTarget, ExplosionCause};
use spacewar_core::data::{
    AreaEffect, Catalog, ProjectileDef, ProjectileMode, SpaceEntityDef, WeaponMount,
};
use spacewar_core::diagnostics::Diagnostic;
use spacewar_core::error::BattleError;
use spacewar_core::inventory::{BuildingId, Container, FleetId, PlanetId};
use spacewar_core::outcome::FollowUp;
use spacewar_core::scripting::DeadlineScript;
use spacewar_core::simulation::{BattleSimulation, TickEvents};
use spacewar_core::sprite::SpriteDef;
use spacewar_core::strategy::{
    AttackNearestStrategy, BattleStrategy, Intent, PassiveStrategy, StrategyContext,
    StrategyDecision, UnitOrder,
};
use spacewar_core::structure::{Category, Side, StructureId};
use spacewar_test_utils::determinism::verify_battle_determinism;
use spacewar_test_utils::fixtures::{
    fighter_duel, fixed, fixed_f, fleet_engagement, guarded_setup, line_template, planet_assault,
    sample_catalog, setup, shared, wedge_template, BattleFixture, WorldBuilder, ATTACKER,
    DEFENDER,
};

fn passive(sim: BattleSimulation) -> BattleSimulation {
    sim.with_strategy(Side::Attacker, Box::new(PassiveStrategy))
        .with_strategy(Side::Defender, Box::new(PassiveStrategy))
}

/// Tick until the battle concludes or `limit` ticks pass, keeping every
/// tick's events.
fn run_collecting(sim: &mut BattleSimulation, limit: u64) -> Vec<TickEvents> {
    let mut events = Vec::new();
    for _ in 0..limit {
        if sim.is_concluded() {
            break;
        }
        events.push(sim.tick());
    }
    events
}

/// An immobile rocket platform and what it shoots at.
fn rocket_catalog(ttl: u32) -> Catalog {
    let mut catalog = Catalog::default();
    let mut rocket = ProjectileDef::rocket("SlowRocket", 5, fixed(2000), fixed(25));
    rocket.ttl = ttl;
    catalog.insert_projectile(rocket);
    catalog.insert_entity(
        SpaceEntityDef::new("Launcher", Category::Station, 500).with_weapon("SlowRocket", 1),
    );
    catalog.insert_entity(SpaceEntityDef::new("Sprinter", Category::Fighter, 50).with_speed(fixed(5)));
    let mut decoy = SpaceEntityDef::new("Decoy", Category::Station, 1_000_000);
    decoy.ecm = 3;
    decoy.sprite = SpriteDef {
        width: 56,
        height: 56,
        frames: Vec::new(),
    };
    catalog.insert_entity(decoy);
    catalog
}

/// Kamikaze drones, a cluster launcher and an unarmed target hulk.
fn ram_catalog() -> Catalog {
    let mut catalog = Catalog::default();
    let mut cluster = ProjectileDef::rocket("Cluster", 40, fixed(2000), fixed(6));
    cluster.mode = ProjectileMode::MultiRocket;
    cluster.ttl = 600;
    cluster.area = Some(AreaEffect {
        radius: fixed(64),
        multiplier: fixed(1),
        secondary_count: 4,
        secondary_radius: fixed(32),
        secondary_multiplier: fixed_f(0.5),
    });
    catalog.insert_projectile(cluster);
    catalog.insert_entity(
        SpaceEntityDef::new("ClusterBattery", Category::Station, 500).with_weapon("Cluster", 1),
    );
    let mut drone = SpaceEntityDef::new("Drone", Category::Fighter, 5).with_speed(fixed(15));
    drone.kamikaze = 30;
    catalog.insert_entity(drone);
    catalog.insert_entity(SpaceEntityDef::new("Hulk", Category::Station, 1000));
    catalog
}

/// Stations trading beams with an unarmed hulk; `zapper` carries a slow
/// rocket next to its beam.
fn gunnery_catalog() -> Catalog {
    let mut catalog = ram_catalog();
    let mut zap = ProjectileDef::beam("Zap", 10, fixed(2000));
    zap.delay = 5;
    catalog.insert_projectile(zap);
    let mut rocket = ProjectileDef::rocket("SlowRocket", 5, fixed(2000), fixed(25));
    rocket.ttl = 600;
    catalog.insert_projectile(rocket);
    catalog.insert_entity(SpaceEntityDef::new("Zapper", Category::Station, 500).with_weapon("Zap", 1));
    catalog.insert_entity(
        SpaceEntityDef::new("RocketZapper", Category::Station, 500)
            .with_weapon("Zap", 1)
            .with_weapon("SlowRocket", 1),
    );
    catalog
}

fn beams_from(events: &[TickEvents], source: StructureId) -> Vec<i32> {
    events
        .iter()
        .flat_map(|e| e.beams.iter())
        .filter(|b| b.source == source)
        .map(|b| b.damage)
        .collect()
}

#[test]
fn test_guard_duel_leaves_one_side() {
    let fixture = fighter_duel();
    let mut sim = fixture.simulation();
    sim.run_to_conclusion().unwrap();

    let result = sim.result().unwrap().clone();
    assert!(result.winner.is_some());
    assert_eq!(result.reason, ConclusionReason::Elimination);

    let remaining: Vec<usize> = Side::BOTH.iter().map(|s| sim.registry().unit_count(*s)).collect();
    assert_eq!(remaining.iter().filter(|n| **n > 0).count(), 1);

    let kills: u64 = Side::BOTH.iter().map(|s| sim.battle().stats(*s).kills).sum();
    let shots: u64 = Side::BOTH.iter().map(|s| sim.battle().stats(*s).shots_fired).sum();
    let losses: u64 = Side::BOTH.iter().map(|s| sim.battle().stats(*s).losses).sum();
    assert_eq!(kills, 1);
    assert_eq!(kills, shots);
    assert_eq!(kills, losses);
}

#[test]
fn test_concluded_battle_ignores_further_ticks() {
    let mut sim = fighter_duel().simulation();
    sim.run_to_conclusion().unwrap();
    let (tick, hash) = (sim.tick_count(), sim.state_hash());

    for _ in 0..10 {
        let events = sim.tick();
        assert!(events.beams.is_empty());
        assert!(events.damage.is_empty());
    }
    assert_eq!(sim.tick_count(), tick);
    assert_eq!(sim.state_hash(), hash);
    assert_eq!(sim.run_to_conclusion().unwrap(), 0);
}

#[test]
fn test_write_back_removes_destroyed_fleet() {
    let fixture = fighter_duel();
    let mut world = fixture.world.clone();
    let mut sim = fixture.simulation();
    sim.run_to_conclusion().unwrap();
    let result = sim.conclude(&mut world).unwrap().clone();

    let loser = result.winner.unwrap().opponent();
    let (winner_fleet, loser_fleet) = match loser {
        Side::Attacker => (FleetId(2), FleetId(1)),
        Side::Defender => (FleetId(1), FleetId(2)),
    };
    assert!(!world.fleets.contains_key(&loser_fleet));
    assert_eq!(world.unit_count(Container::Fleet(winner_fleet), "Fighter1"), 1);
    // The survivor was never hit
    assert_eq!(world.fleets[&winner_fleet].items[0].hp, None);
    assert_eq!(world.statistics[ATTACKER].battles_won + world.statistics[DEFENDER].battles_won, 1);
}

#[test]
fn test_retreated_units_never_return() {
    let fixture = BattleFixture {
        world: WorldBuilder::new()
            .fleet(1, ATTACKER, &[("Fighter1", 6), ("Station1", 1)])
            .fleet(2, DEFENDER, &[("Fighter1", 6)])
            .build(),
        ..fleet_engagement()
    };
    let mut sim = passive(fixture.simulation());
    sim.request_retreat(Side::Attacker).unwrap();
    assert_eq!(sim.phase(), BattlePhase::RetreatRequested);
    sim.confirm_retreat().unwrap();
    assert_eq!(sim.phase(), BattlePhase::RetreatConfirmed);

    let mut escaped: Vec<StructureId> = Vec::new();
    for _ in 0..600 {
        escaped.extend(sim.tick().escaped);
        if !escaped.is_empty() {
            break;
        }
    }
    assert!(!escaped.is_empty(), "no unit left the arena");
    let escaped_units = sim.battle().escaped_count(Side::Attacker);
    assert!(escaped_units > 0);

    sim.cancel_retreat().unwrap();
    assert_eq!(sim.phase(), BattlePhase::Combat);
    assert!(sim.registry().units_of(Side::Attacker).all(|u| !u.flee));
    // The station cannot flee and keeps the side in the battle
    assert!(sim.registry().unit_count(Side::Attacker) > 0);

    for _ in 0..300 {
        let events = sim.tick();
        assert!(events.escaped.is_empty());
        for id in &escaped {
            assert!(sim.registry().get(*id).is_none());
        }
    }
    assert_eq!(sim.battle().escaped_count(Side::Attacker), escaped_units);
}

#[test]
fn test_retreat_of_whole_side_ends_battle() {
    let fixture = BattleFixture {
        setup: setup(&[1], &[2]),
        config: BattleConfig::default(),
        catalog: rocket_catalog(0),
        world: WorldBuilder::new()
            .fleet(1, ATTACKER, &[("Launcher", 1)])
            .fleet(2, DEFENDER, &[("Sprinter", 1)])
            .build(),
    };
    let mut world = fixture.world.clone();
    let mut sim = fixture.simulation();
    sim.request_retreat(Side::Defender).unwrap();
    sim.confirm_retreat().unwrap();

    let events = run_collecting(&mut sim, 2_000);
    assert!(sim.is_concluded());

    let result = sim.conclude(&mut world).unwrap().clone();
    assert_eq!(result.winner, Some(Side::Attacker));
    assert_eq!(result.reason, ConclusionReason::Retreat);
    assert_eq!(result.defender.escaped, 1);
    assert_eq!(world.unit_count(Container::Fleet(FleetId(2)), "Sprinter"), 1);

    // The rocket chasing the sprinter expires without hitting anything
    let launched: Vec<StructureId> = events.iter().flat_map(|e| e.launched.clone()).collect();
    let fizzled: BTreeSet<StructureId> = events.iter().flat_map(|e| e.fizzled.clone()).collect();
    assert!(!launched.is_empty());
    assert!(events.iter().all(|e| e.impacts.is_empty()));
    assert!(launched.iter().all(|id| fizzled.contains(id)));
}

#[test]
fn test_each_rocket_rolls_against_ecm_once() {
    let fixture = BattleFixture {
        setup: setup(&[1], &[2]),
        config: BattleConfig {
            seed: 7,
            ..BattleConfig::default()
        },
        catalog: rocket_catalog(600),
        world: WorldBuilder::new()
            .fleet(1, ATTACKER, &[("Launcher", 1)])
            .fleet(2, DEFENDER, &[("Decoy", 1)])
            .build(),
    };
    let mut sim = passive(fixture.simulation());

    let events = run_collecting(&mut sim, 800);
    let rolls: Vec<StructureId> = events.iter().flat_map(|e| e.scramble_rolls.clone()).collect();
    let unique: BTreeSet<StructureId> = rolls.iter().copied().collect();
    assert!(!rolls.is_empty());
    assert_eq!(rolls.len(), unique.len(), "a rocket rolled twice");

    let impacts: Vec<StructureId> = events.iter().flat_map(|e| e.impacts.clone()).collect();
    assert!(!impacts.is_empty());
    assert!(impacts.iter().all(|id| unique.contains(id)));

    let scrambled: BTreeSet<StructureId> = events.iter().flat_map(|e| e.scrambled.clone()).collect();
    assert!(scrambled.is_subset(&unique));
}

#[test]
fn test_formation_select_and_change() {
    let mut fixture = BattleFixture {
        world: WorldBuilder::new()
            .fleet(1, ATTACKER, &[("Cruiser1", 2), ("Fighter1", 8)])
            .fleet(2, DEFENDER, &[("Fighter1", 8)])
            .build(),
        ..fleet_engagement()
    };
    fixture.setup.templates = vec![wedge_template(), line_template()];
    fixture.setup.attacker.human = true;
    fixture.setup.attacker.template = Some("wedge".into());

    let mut sim = fixture.simulation();
    assert_eq!(sim.phase(), BattlePhase::FormationSelect);
    assert!(sim.run_to_conclusion().is_err());
    sim.tick();
    assert_eq!(sim.tick_count(), 0);

    let cruisers = |sim: &BattleSimulation| -> BTreeSet<(i32, i32)> {
        sim.registry()
            .units_of(Side::Attacker)
            .filter(|u| u.category == Category::Cruiser)
            .filter_map(|u| u.cell)
            .map(|c| (c.x, c.y))
            .collect()
    };
    let wedge = cruisers(&sim);
    assert!(!wedge.is_empty());

    assert!(matches!(
        sim.change_formation(Side::Attacker, "box"),
        Err(BattleError::UnknownLayout(_))
    ));
    sim.change_formation(Side::Attacker, "line").unwrap();
    let line = cruisers(&sim);
    assert_eq!(line.len(), wedge.len());
    assert_ne!(line, wedge);
    assert_eq!(sim.battle().setup.attacker.template.as_deref(), Some("line"));
    assert!(sim.registry().unit_count(Side::Defender) > 0);

    sim.start_combat().unwrap();
    assert_eq!(sim.phase(), BattlePhase::Combat);
    assert!(sim.change_formation(Side::Attacker, "wedge").is_err());
    sim.tick();
    assert_eq!(sim.tick_count(), 1);
}

#[test]
fn test_unknown_technology_is_reported_and_left_alone() {
    let fixture = BattleFixture {
        world: WorldBuilder::new()
            .fleet(1, ATTACKER, &[("Fighter1", 4), ("Ghost", 3)])
            .fleet(2, DEFENDER, &[("Fighter1", 1)])
            .build(),
        ..fighter_duel()
    };
    let mut world = fixture.world.clone();
    let mut sim = fixture.simulation();
    let diagnostics = sim.take_diagnostics();
    assert!(diagnostics.iter().any(|(_, d)| matches!(
        d,
        Diagnostic::MissingEntityDefinition { tech_id } if tech_id == "Ghost"
    )));

    sim.run_to_conclusion().unwrap();
    sim.conclude(&mut world).unwrap();
    assert_eq!(world.unit_count(Container::Fleet(FleetId(1)), "Ghost"), 3);
}

#[test]
fn test_deadline_script_decides_battle() {
    let mut sim = fleet_engagement()
        .simulation()
        .with_script(Box::new(DeadlineScript {
            tick: 5,
            winner: Some(Side::Defender),
        }));
    sim.run_to_conclusion().unwrap();
    let result = sim.result().unwrap();
    assert_eq!(result.winner, Some(Side::Defender));
    assert_eq!(result.reason, ConclusionReason::Scripted);
    assert_eq!(sim.battle().decision.unwrap().tick, 5);
}

struct GiveUp;

impl BattleStrategy for GiveUp {
    fn decide(&mut self, _ctx: &StrategyContext<'_>) -> StrategyDecision {
        StrategyDecision {
            intent: Intent::Surrender,
            orders: Vec::new(),
        }
    }
}

#[test]
fn test_surrender_hands_victory_to_opponent() {
    let mut sim = fleet_engagement()
        .simulation()
        .with_strategy(Side::Attacker, Box::new(GiveUp));
    sim.run_to_conclusion().unwrap();
    let result = sim.result().unwrap();
    assert_eq!(result.winner, Some(Side::Defender));
    assert_eq!(result.reason, ConclusionReason::Surrender);
    assert_eq!(result.attacker.statistics.battles_lost, 1);
}

#[test]
fn test_hp_and_shields_stay_in_bounds() {
    let mut sim = fleet_engagement().simulation();
    for _ in 0..800 {
        if sim.is_concluded() {
            break;
        }
        sim.tick();
        for s in sim.registry().iter() {
            assert!(s.hp >= 0 && s.hp <= s.hp_max, "{} hp {}", s.tech_id, s.hp);
            assert!(s.shield >= 0 && s.shield <= s.shield_max, "{} shield {}", s.tech_id, s.shield);
        }
    }
}

#[test]
fn test_virus_bomb_infects_planet() {
    let mut s = setup(&[1], &[]);
    s.planet = Some(PlanetId(100));
    let fixture = BattleFixture {
        setup: s,
        config: BattleConfig {
            max_ticks: 2_000,
            ..BattleConfig::default()
        },
        catalog: sample_catalog(),
        world: WorldBuilder::new()
            .fleet(1, ATTACKER, &[("Plaguebringer", 1)])
            .planet(100, DEFENDER, &[], &[("Shield1", (1, 1), 250)])
            .build(),
    };
    let mut world = fixture.world.clone();
    let mut sim = fixture.simulation();
    sim.run_to_conclusion().unwrap();
    let result = sim.conclude(&mut world).unwrap().clone();

    assert!(result.planet_infected);
    assert!(world.planets[&PlanetId(100)].infected);
    assert_eq!(result.reason, ConclusionReason::Stalemate);
    assert_eq!(result.winner, None);
    assert_eq!(result.follow_up, None);
}

#[test]
fn test_planet_assault_writes_back_consistently() {
    let mut fixture = planet_assault();
    fixture.config.max_ticks = 6_000;
    let mut world = fixture.world.clone();
    let mut sim = fixture.simulation();
    assert_eq!(sim.battle().buildings.len(), 3);
    sim.run_to_conclusion().unwrap();
    let result = sim.conclude(&mut world).unwrap().clone();

    let planet = &world.planets[&PlanetId(100)];
    for (id, b) in &sim.battle().buildings {
        let kept = planet.buildings.iter().find(|pb| pb.id == *id);
        if b.destroyed {
            assert!(kept.is_none());
        } else {
            assert!(kept.is_some_and(|pb| pb.hp > 0));
        }
    }

    match result.winner {
        Some(Side::Attacker) => assert_eq!(
            result.follow_up,
            Some(FollowUp::GroundInvasion {
                planet: PlanetId(100),
                attacker: ATTACKER.into()
            })
        ),
        _ => assert_eq!(result.follow_up, None),
    }
    let surviving_fighters = world.unit_count(Container::Fleet(FleetId(1)), "Fighter1");
    assert!(surviving_fighters <= 12);
    assert!(world.statistics.contains_key(ATTACKER));
    assert!(world.statistics.contains_key(DEFENDER));
}

#[test]
fn test_same_seed_same_battle() {
    let fixture = fleet_engagement().with_seed(42);
    assert!(verify_battle_determinism(|| fixture.simulation(), 300));

    let mut a = fixture.simulation();
    let mut b = fixture.simulation();
    for _ in 0..200 {
        a.tick();
        b.tick();
    }
    assert_eq!(a.snapshot().to_bytes().unwrap(), b.snapshot().to_bytes().unwrap());
}

#[test]
fn test_custom_setup_without_fleets_is_an_immediate_draw() {
    let fixture = BattleFixture {
        setup: guarded_setup(&[], &[]),
        config: BattleConfig::default(),
        catalog: sample_catalog(),
        world: WorldBuilder::new().build(),
    };
    let mut sim = BattleSimulation::new(
        fixture.setup.clone(),
        fixture.config.clone(),
        shared(fixture.catalog.clone()),
        &fixture.world,
    )
    .unwrap();
    assert_eq!(sim.run_to_conclusion().unwrap(), 1);
    let result = sim.result().unwrap();
    assert_eq!(result.winner, None);
    assert_eq!(result.attacker.statistics.battles_drawn, 1);
    assert_eq!(result.defender.statistics.battles_drawn, 1);
}

#[test]
fn test_kamikaze_group_rams_once_and_is_destroyed() {
    let fixture = BattleFixture {
        setup: setup(&[1], &[2]),
        config: BattleConfig::default(),
        catalog: ram_catalog(),
        world: WorldBuilder::new()
            .fleet(1, ATTACKER, &[("Drone", 3)])
            .fleet(2, DEFENDER, &[("Hulk", 1)])
            .build(),
    };
    let mut sim = fixture.simulation();
    let hulk = sim.registry().units_of(Side::Defender).map(|u| u.id).next().unwrap();

    let events = run_collecting(&mut sim, 3_000);
    assert!(sim.is_concluded());

    let rams: Vec<_> = events
        .iter()
        .flat_map(|e| e.damage.clone())
        .filter(|d| d.target == DamageTarget::Structure(hulk))
        .collect();
    assert_eq!(rams.len(), 1);
    // 30 per drone, three drones, fighters do half damage to stations
    assert_eq!(rams[0].amount, 45);
    assert_eq!(sim.registry().get(hulk).unwrap().hp, 955);

    let result = sim.result().unwrap();
    assert_eq!(result.winner, Some(Side::Defender));
    assert_eq!(sim.registry().unit_count(Side::Attacker), 0);
}

#[test]
fn test_multi_rocket_bursts_into_secondaries() {
    let fixture = BattleFixture {
        setup: setup(&[1], &[2]),
        config: BattleConfig::default(),
        catalog: ram_catalog(),
        world: WorldBuilder::new()
            .fleet(1, ATTACKER, &[("ClusterBattery", 1)])
            .fleet(2, DEFENDER, &[("Hulk", 1)])
            .build(),
    };
    let mut sim = passive(fixture.simulation());
    let hulk = sim.registry().units_of(Side::Defender).map(|u| u.id).next().unwrap();

    let mut impacted = false;
    for _ in 0..600 {
        let events = sim.tick();
        if events.impacts.is_empty() {
            continue;
        }
        let secondaries = sim
            .explosions()
            .iter()
            .filter(|e| e.cause == ExplosionCause::Secondary)
            .count();
        assert_eq!(secondaries, 4);
        impacted = true;
        break;
    }
    assert!(impacted, "the cluster rocket never arrived");
    let hulk = sim.registry().get(hulk).unwrap();
    assert!(hulk.hp < hulk.hp_max);
}

#[test]
fn test_damage_carries_over_to_inventory() {
    let fixture = BattleFixture {
        setup: setup(&[1], &[2]),
        config: BattleConfig::default(),
        catalog: ram_catalog(),
        world: WorldBuilder::new()
            .fleet(1, ATTACKER, &[("Drone", 3)])
            .fleet(2, DEFENDER, &[("Hulk", 1)])
            .build(),
    };
    let mut world = fixture.world.clone();
    let mut sim = fixture.simulation();
    sim.run_to_conclusion().unwrap();
    sim.conclude(&mut world).unwrap();

    let hulk = &world.fleets[&FleetId(2)].items[0];
    assert_eq!(hulk.count, 1);
    assert_eq!(hulk.hp, Some(955));
    assert_eq!(hulk.shield, None);
    assert!(!world.fleets.contains_key(&FleetId(1)));
}

#[test]
fn test_damaged_item_deploys_with_its_condition_and_equipment() {
    let mut fixture = BattleFixture {
        world: WorldBuilder::new()
            .fleet(1, ATTACKER, &[("Cruiser1", 1), ("Cruiser1", 1)])
            .fleet(2, DEFENDER, &[("Fighter1", 4)])
            .build(),
        ..fleet_engagement()
    };
    let cruiser = &mut fixture.world.fleets.get_mut(&FleetId(1)).unwrap().items[0];
    cruiser.hp = Some(50);
    cruiser.shield = Some(5);
    cruiser.slots = vec![WeaponMount {
        projectile: "Bomb".into(),
        count: 2,
    }];

    let sim = fixture.simulation();
    let mut cruisers: Vec<_> = sim
        .registry()
        .units_of(Side::Attacker)
        .filter(|u| u.tech_id == "Cruiser1")
        .collect();
    cruisers.sort_by_key(|u| u.hp);
    assert_eq!(cruisers.len(), 2);

    let (damaged, fresh) = (cruisers[0], cruisers[1]);
    assert_eq!((damaged.hp, damaged.hp_max), (50, 120));
    assert_eq!((damaged.shield, damaged.shield_max), (5, 40));
    assert_eq!(damaged.ports.len(), 3);
    assert!(damaged.ports.iter().any(|p| p.projectile_id == "Bomb" && p.count == 2));

    assert_eq!((fresh.hp, fresh.shield), (120, 40));
    assert_eq!(fresh.ports.len(), 2);
}

#[test]
fn test_formation_change_keeps_planet_defenses_linked() {
    let mut fixture = planet_assault();
    fixture.config.max_ticks = 1_500;
    fixture.setup.templates = vec![wedge_template(), line_template()];
    fixture.setup.attacker.human = true;
    fixture.setup.attacker.template = Some("wedge".into());
    let mut world = fixture.world.clone();
    let mut sim = fixture
        .simulation()
        .with_strategy(Side::Attacker, Box::new(AttackNearestStrategy::new()));
    assert_eq!(sim.phase(), BattlePhase::FormationSelect);

    let links = |sim: &BattleSimulation| -> Vec<(BuildingId, Option<StructureId>)> {
        sim.battle()
            .buildings
            .iter()
            .map(|(id, b)| (*id, b.structure))
            .collect()
    };
    let before = links(&sim);
    sim.change_formation(Side::Attacker, "line").unwrap();
    assert_eq!(links(&sim), before);

    for (id, structure) in &before {
        let tech = &sim.battle().buildings[id].tech_id;
        if tech == "Colony Hub" {
            assert_eq!(*structure, None);
            continue;
        }
        let defense = structure.and_then(|s| sim.registry().get(s)).unwrap();
        assert_eq!(defense.building, Some(*id));
        assert_eq!(&defense.tech_id, tech);
    }

    sim.start_combat().unwrap();
    sim.run_to_conclusion().unwrap();
    sim.conclude(&mut world).unwrap();

    let planet = &world.planets[&PlanetId(100)];
    for (id, b) in &sim.battle().buildings {
        let live = b
            .structure
            .and_then(|s| sim.registry().get(s))
            .filter(|s| s.is_alive());
        let kept = planet.buildings.iter().find(|pb| pb.id == *id);
        match live {
            Some(defense) => assert_eq!(kept.map(|pb| pb.hp), Some(defense.hp)),
            None if b.destroyed => assert!(kept.is_none()),
            None => assert_eq!(kept.map(|pb| pb.hp), Some(b.hp)),
        }
    }
}

#[test]
fn test_rockets_in_flight_are_not_extra_attackers() {
    let mut fixture = BattleFixture {
        setup: setup(&[1], &[2]),
        config: BattleConfig::default(),
        catalog: gunnery_catalog(),
        world: WorldBuilder::new()
            .fleet(1, ATTACKER, &[("RocketZapper", 1)])
            .fleet(2, DEFENDER, &[("Hulk", 1)])
            .build(),
    };
    fixture.config.diminishing_returns.apply_to_beams = true;
    let mut sim = passive(fixture.simulation());
    let zapper = sim.registry().units_of(Side::Attacker).map(|u| u.id).next().unwrap();

    let events = run_collecting(&mut sim, 80);
    assert!(sim.registry().iter().any(|s| s.is_projectile()));
    let shots = beams_from(&events, zapper);
    assert!(shots.len() > 5);
    assert!(shots.iter().all(|d| *d == 10), "{shots:?}");
}

#[test]
fn test_focus_fire_weakens_beams_when_enabled() {
    let mut fixture = BattleFixture {
        setup: setup(&[1], &[2]),
        config: BattleConfig::default(),
        catalog: gunnery_catalog(),
        world: WorldBuilder::new()
            .fleet(1, ATTACKER, &[("Zapper", 1), ("Zapper", 1)])
            .fleet(2, DEFENDER, &[("Hulk", 1)])
            .build(),
    };
    fixture.config.diminishing_returns.apply_to_beams = true;
    let mut sim = passive(fixture.simulation());
    let zappers: Vec<StructureId> = sim.registry().units_of(Side::Attacker).map(|u| u.id).collect();
    assert_eq!(zappers.len(), 2);

    let events = run_collecting(&mut sim, 60);
    // Both zappers are on the hulk from the second tick on: 10 × 2^(-0.3)
    for zapper in zappers {
        let later = beams_from(&events[1..], zapper);
        assert!(!later.is_empty());
        assert!(later.iter().all(|d| *d == 8), "{later:?}");
    }

    fixture.config.diminishing_returns.apply_to_beams = false;
    let mut sim = passive(fixture.simulation());
    let events = run_collecting(&mut sim, 60);
    let shots: Vec<i32> = events.iter().flat_map(|e| e.beams.iter().map(|b| b.damage)).collect();
    assert!(!shots.is_empty());
    assert!(shots.iter().all(|d| *d == 10));
}

#[test]
fn test_ship_closes_to_shortest_range_before_firing() {
    let mut catalog = rocket_catalog(200);
    catalog.insert_projectile(ProjectileDef::beam("Short", 1, fixed(100)));
    catalog.insert_projectile(ProjectileDef::beam("Long", 1, fixed(600)));
    catalog.insert_entity(
        SpaceEntityDef::new("Gunboat", Category::Cruiser, 200)
            .with_speed(fixed(5))
            .with_weapon("Short", 1)
            .with_weapon("Long", 1),
    );
    let fixture = BattleFixture {
        setup: setup(&[1], &[2]),
        config: BattleConfig::default(),
        catalog,
        world: WorldBuilder::new()
            .fleet(1, ATTACKER, &[("Gunboat", 1)])
            .fleet(2, DEFENDER, &[("Decoy", 1)])
            .build(),
    };
    let mut sim = fixture
        .simulation()
        .with_strategy(Side::Defender, Box::new(PassiveStrategy));
    let gunboat = sim.registry().units_of(Side::Attacker).map(|u| u.id).next().unwrap();
    let decoy = sim.registry().units_of(Side::Defender).map(|u| u.id).next().unwrap();
    let gap = |sim: &BattleSimulation| {
        let (a, b) = (sim.registry().get(gunboat).unwrap(), sim.registry().get(decoy).unwrap());
        a.position.distance(b.position)
    };
    assert!(gap(&sim) > fixed(600));

    let mut fired = 0;
    for _ in 0..800 {
        let events = sim.tick();
        if events.beams.iter().any(|b| b.source == gunboat) {
            assert!(gap(&sim) <= fixed(100), "fired from {}", gap(&sim));
            fired += 1;
        }
    }
    assert!(fired > 0, "the gunboat never closed in");
}

#[test]
fn test_turret_fires_at_longest_range_and_lets_go_out_of_reach() {
    let mut catalog = rocket_catalog(200);
    catalog.insert_projectile(ProjectileDef::beam("Short", 1, fixed(100)));
    catalog.insert_projectile(ProjectileDef::beam("Long", 1, fixed(300)));
    catalog.insert_entity(
        SpaceEntityDef::new("Tower", Category::Station, 500)
            .with_weapon("Short", 1)
            .with_weapon("Long", 1),
    );
    let fixture = BattleFixture {
        setup: setup(&[1], &[2]),
        config: BattleConfig::default(),
        catalog,
        world: WorldBuilder::new()
            .fleet(1, ATTACKER, &[("Sprinter", 1)])
            .fleet(2, DEFENDER, &[("Tower", 1)])
            .build(),
    };
    let mut sim = passive(fixture.simulation());
    let sprinter = sim.registry().units_of(Side::Attacker).map(|u| u.id).next().unwrap();
    let tower = sim.registry().units_of(Side::Defender).map(|u| u.id).next().unwrap();
    let home = sim.registry().get(sprinter).unwrap().cell.unwrap();
    let post = sim.registry().get(tower).unwrap().cell.unwrap();
    let gap = |sim: &BattleSimulation| {
        let (a, b) = (sim.registry().get(sprinter).unwrap(), sim.registry().get(tower).unwrap());
        a.position.distance(b.position)
    };

    // Eight cells short of the tower: inside the long beam only
    let offset = if home.x < post.x { -8 } else { 8 };
    sim.issue_order(
        Side::Attacker,
        UnitOrder::MoveTo {
            unit: sprinter,
            cell: post.offset(offset, 0),
        },
    )
    .unwrap();
    let mut first_shot = None;
    for _ in 0..400 {
        let events = sim.tick();
        if events.beams.iter().any(|b| b.source == tower) {
            first_shot = Some(gap(&sim));
            break;
        }
    }
    let first_shot = first_shot.expect("the tower never fired");
    assert!(first_shot > fixed(100));
    assert!(first_shot <= fixed(324));
    assert_eq!(sim.registry().get(tower).unwrap().attack, Some(sprinter));

    sim.issue_order(Side::Attacker, UnitOrder::MoveTo { unit: sprinter, cell: home })
        .unwrap();
    for _ in 0..400 {
        sim.tick();
        if gap(&sim) > fixed(330) {
            break;
        }
    }
    sim.tick();
    assert!(gap(&sim) > fixed(300));
    assert_eq!(sim.registry().get(tower).unwrap().attack, None);
}

#[test]
fn test_rocket_lifetime_counts_moves() {
    let fixture = BattleFixture {
        setup: setup(&[1], &[2]),
        config: BattleConfig::default(),
        catalog: rocket_catalog(3),
        world: WorldBuilder::new()
            .fleet(1, ATTACKER, &[("Launcher", 1)])
            .fleet(2, DEFENDER, &[("Decoy", 1)])
            .build(),
    };
    let mut sim = passive(fixture.simulation());
    let events = run_collecting(&mut sim, 120);

    let launched_at = |id: StructureId| events.iter().position(|e| e.launched.contains(&id));
    let mut expired = 0;
    for (tick, e) in events.iter().enumerate() {
        for id in &e.fizzled {
            assert_eq!(launched_at(*id).map(|l| tick - l), Some(3));
            expired += 1;
        }
    }
    assert!(expired > 0);
    assert!(events.iter().all(|e| e.impacts.is_empty()));
}

#[test]
fn test_splash_spares_the_target_it_hit() {
    let mut catalog = ram_catalog();
    let mut shell = ProjectileDef::rocket("Shell", 40, fixed(2000), fixed(2));
    shell.ttl = 600;
    shell.delay = 1_000;
    shell.area = Some(AreaEffect {
        radius: fixed(64),
        multiplier: fixed(1),
        secondary_count: 0,
        secondary_radius: fixed(0),
        secondary_multiplier: fixed(0),
    });
    catalog.insert_projectile(shell);
    catalog.insert_entity(SpaceEntityDef::new("Mortar", Category::Station, 500).with_weapon("Shell", 1));
    let fixture = BattleFixture {
        setup: setup(&[1], &[2]),
        config: BattleConfig::default(),
        catalog,
        world: WorldBuilder::new()
            .fleet(1, ATTACKER, &[("Mortar", 1)])
            .fleet(2, DEFENDER, &[("Hulk", 1)])
            .build(),
    };
    let mut sim = passive(fixture.simulation());
    let hulk = sim.registry().units_of(Side::Defender).map(|u| u.id).next().unwrap();

    let mut hits = Vec::new();
    for _ in 0..800 {
        let events = sim.tick();
        hits.extend(events.damage.iter().filter(|d| d.target == DamageTarget::Structure(hulk)).cloned());
        if !events.impacts.is_empty() {
            break;
        }
    }
    assert_eq!(hits.len(), 1, "{hits:?}");
    assert_eq!(hits[0].amount, 40);
    assert_eq!(sim.registry().get(hulk).unwrap().hp, 960);
}
