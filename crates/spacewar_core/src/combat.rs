//! Damage resolution.
//!
//! Every hit point change in a battle goes through
//! [`BattleSimulation::apply_damage`]: beams, rocket impacts, area effects,
//! building splash and kamikaze rams. The routine updates the structure,
//! the loss counters of both sides and the per-tick event list.

use serde::{Deserialize, Serialize};

use crate::inventory::BuildingId;
use crate::math::{Fixed, Vec2Fixed};
use crate::simulation::BattleSimulation;
use crate::structure::{Category, Side, StructureId};

/// What a damage application hits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DamageTarget {
    /// A structure on the battle plane.
    Structure(StructureId),
    /// A planet building, with or without a structure.
    Building(BuildingId),
}

/// How damage is spread over a group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DamageKind {
    /// Hits the front unit and overflows into the next.
    Direct,
    /// Hits every unit of the group with the same amount.
    Uniform,
}

/// A damage application, reported to the presentation layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DamageEvent {
    /// Structure responsible, if any.
    pub source: Option<StructureId>,
    /// What was hit.
    pub target: DamageTarget,
    /// Hit and shield points removed.
    pub amount: u32,
    /// Units destroyed.
    pub killed: u32,
}

/// Why an explosion is on screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExplosionCause {
    /// Beam hit.
    Hit,
    /// Rocket or bomb impact.
    Impact,
    /// Secondary blast of a multi-rocket.
    Secondary,
    /// Projectile expired or left the arena.
    Fizzle,
    /// A structure was destroyed.
    Destroyed,
    /// A virus bomb reached the planet.
    Virus,
}

/// A transient explosion animation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Explosion {
    /// Where.
    pub position: Vec2Fixed,
    /// Ticks left on screen.
    pub remaining: u32,
    /// Why.
    pub cause: ExplosionCause,
}

/// One area-of-effect detonation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct AreaBlast {
    pub center: Vec2Fixed,
    pub radius: Fixed,
    /// Damage at the centre.
    pub damage: Fixed,
    /// Structure left out of the blast, typically the one hit directly.
    pub spare: Option<StructureId>,
}

impl AreaBlast {
    pub(crate) const fn new(center: Vec2Fixed, radius: Fixed, damage: Fixed) -> Self {
        Self {
            center,
            radius,
            damage,
            spare: None,
        }
    }
}

/// Linear falloff: full damage at distance zero, nothing at `radius` and
/// beyond.
#[must_use]
pub fn area_falloff(damage: Fixed, distance: Fixed, radius: Fixed) -> Fixed {
    if radius <= Fixed::ZERO || distance >= radius || damage <= Fixed::ZERO {
        return Fixed::ZERO;
    }
    let distance = distance.max(Fixed::ZERO);
    damage * (radius - distance) / radius
}

/// Raw damage of one port volley: `base × port count × unit count`.
#[must_use]
pub fn volley_damage(base: i32, port_count: u32, unit_count: u32) -> Fixed {
    Fixed::from_num(base.max(0))
        .saturating_mul(Fixed::from_num(port_count))
        .saturating_mul(Fixed::from_num(unit_count))
}

/// Round damage to whole points.
#[must_use]
pub fn to_points(damage: Fixed) -> i32 {
    damage.saturating_round().saturating_to_num::<i32>()
}

fn location_distance(a: crate::grid::Location, b: crate::grid::Location) -> Fixed {
    Vec2Fixed::from_ints(a.x, a.y).distance(Vec2Fixed::from_ints(b.x, b.y))
}

impl BattleSimulation {
    /// Apply damage and update statistics. Returns units destroyed.
    ///
    /// Allied, dead and unknown targets are ignored. Damage to a structure
    /// backed by a planet building splashes onto nearby buildings.
    pub(crate) fn apply_damage(
        &mut self,
        source_side: Side,
        source: Option<StructureId>,
        target: DamageTarget,
        amount: Fixed,
        kind: DamageKind,
    ) -> u32 {
        match target {
            DamageTarget::Structure(id) => self.damage_structure(source_side, source, id, amount, kind, true),
            DamageTarget::Building(id) => self.damage_building(source_side, source, id, amount),
        }
    }

    fn damage_structure(
        &mut self,
        source_side: Side,
        source: Option<StructureId>,
        id: StructureId,
        amount: Fixed,
        kind: DamageKind,
        splash: bool,
    ) -> u32 {
        let points = to_points(amount);
        if points <= 0 {
            return 0;
        }
        let Some(s) = self.registry.get_mut(id) else {
            return 0;
        };
        if !s.is_alive() || s.side == source_side {
            return 0;
        }
        let before = s.total_hp() + i64::from(s.shield);
        let killed = match kind {
            DamageKind::Direct => s.take_damage(points),
            DamageKind::Uniform => s.take_uniform_damage(points),
        };
        let dealt = (before - s.total_hp() - i64::from(s.shield)).max(0) as u64;
        let (target_side, building, alive, hp) = (s.side, s.building, s.is_alive(), s.hp);

        self.credit(source_side, target_side, dealt, u64::from(killed));
        self.events.damage.push(DamageEvent {
            source,
            target: DamageTarget::Structure(id),
            amount: dealt as u32,
            killed,
        });

        if let Some(b) = building {
            self.sync_building(source_side, b, hp, alive);
            if splash {
                self.splash_buildings(source_side, source, b, points);
            }
        }
        if !alive {
            self.on_destroyed(id);
        }
        killed
    }

    fn damage_building(
        &mut self,
        source_side: Side,
        source: Option<StructureId>,
        id: BuildingId,
        amount: Fixed,
    ) -> u32 {
        let Some(b) = self.battle.buildings.get_mut(&id) else {
            return 0;
        };
        if b.destroyed {
            return 0;
        }
        if let Some(sid) = b.structure {
            if self.registry.contains(sid) {
                return self.damage_structure(source_side, source, sid, amount, DamageKind::Direct, false);
            }
        }
        let points = to_points(amount);
        if points <= 0 {
            return 0;
        }
        let dealt = points.min(b.hp).max(0);
        b.hp = (b.hp - points).max(0);
        let destroyed = b.hp == 0;
        b.destroyed = destroyed;

        let target_side = source_side.opponent();
        self.credit(source_side, target_side, dealt as u64, 0);
        if destroyed {
            tracing::debug!(tick = self.tick, building = id.0, "building destroyed");
            self.battle.stats_mut(source_side).buildings_destroyed += 1;
            self.battle.stats_mut(target_side).buildings_lost += 1;
        }
        self.events.damage.push(DamageEvent {
            source,
            target: DamageTarget::Building(id),
            amount: dealt as u32,
            killed: u32::from(destroyed),
        });
        u32::from(destroyed)
    }

    fn credit(&mut self, source_side: Side, target_side: Side, dealt: u64, killed: u64) {
        let by = self.battle.stats_mut(source_side);
        by.damage_dealt += dealt;
        by.kills += killed;
        let on = self.battle.stats_mut(target_side);
        on.damage_taken += dealt;
        on.losses += killed;
    }

    fn sync_building(&mut self, source_side: Side, id: BuildingId, hp: i32, alive: bool) {
        let Some(b) = self.battle.buildings.get_mut(&id) else {
            return;
        };
        if b.destroyed {
            return;
        }
        b.hp = if alive { hp } else { 0 };
        if !alive {
            b.destroyed = true;
            self.battle.stats_mut(source_side).buildings_destroyed += 1;
            self.battle.stats_mut(source_side.opponent()).buildings_lost += 1;
        }
    }

    /// Spread a share of the damage a building took onto its neighbours.
    fn splash_buildings(
        &mut self,
        source_side: Side,
        source: Option<StructureId>,
        origin: BuildingId,
        damage: i32,
    ) {
        let percent = self.config.building_splash_percent;
        let radius = self.config.ground_radius;
        if percent == 0 || radius <= Fixed::ZERO {
            return;
        }
        let Some(at) = self.battle.buildings.get(&origin).map(|b| b.location) else {
            return;
        };
        let splash = Fixed::from_num(damage) * Fixed::from_num(percent) / Fixed::from_num(100);
        let targets: Vec<(BuildingId, Fixed)> = self
            .battle
            .buildings
            .iter()
            .filter(|(id, b)| **id != origin && !b.destroyed)
            .map(|(id, b)| (*id, area_falloff(splash, location_distance(at, b.location), radius)))
            .filter(|(_, amount)| *amount > Fixed::ZERO)
            .collect();
        for (id, amount) in targets {
            self.damage_building(source_side, source, id, amount);
        }
    }

    /// Damage every non-allied structure around the blast centre.
    ///
    /// Falloff is linear, fighter groups take uniform damage and focus fire
    /// is penalised. Returns units destroyed.
    pub(crate) fn apply_area_damage(
        &mut self,
        source_side: Side,
        source: Option<StructureId>,
        source_category: Category,
        blast: AreaBlast,
    ) -> u32 {
        let AreaBlast {
            center,
            radius,
            damage,
            spare,
        } = blast;
        if radius <= Fixed::ZERO {
            return 0;
        }
        let hits: Vec<(StructureId, Category, Fixed)> = self
            .registry
            .iter()
            .filter(|s| s.is_alive() && !s.is_projectile() && s.side != source_side)
            .filter(|s| spare != Some(s.id))
            .map(|s| (s.id, s.category, area_falloff(damage, s.position.distance(center), radius)))
            .filter(|(_, _, d)| *d > Fixed::ZERO)
            .collect();

        let mut killed = 0;
        for (id, category, falloff) in hits {
            let focus = self.config.diminishing_returns.factor(self.attackers_on(id));
            let amount = falloff * self.catalog.efficiency(source_category, category) * focus;
            let kind = if category == Category::Fighter {
                DamageKind::Uniform
            } else {
                DamageKind::Direct
            };
            killed += self.apply_damage(source_side, source, DamageTarget::Structure(id), amount, kind);
        }
        killed
    }

    /// Distinct live units currently attacking `target`. Rockets and bombs
    /// in flight do not count.
    pub(crate) fn attackers_on(&self, target: StructureId) -> u32 {
        self.registry
            .iter()
            .filter(|s| s.is_alive() && !s.is_projectile() && s.attack == Some(target))
            .count() as u32
    }

    /// Destroy a whole group outside normal damage (kamikaze rams).
    pub(crate) fn destroy_structure(&mut self, id: StructureId) {
        let Some(s) = self.registry.get_mut(id) else {
            return;
        };
        if !s.is_alive() {
            return;
        }
        let killed = s.destroy();
        let side = s.side;
        self.battle.stats_mut(side).losses += u64::from(killed);
        self.on_destroyed(id);
    }

    pub(crate) fn spawn_explosion(&mut self, position: Vec2Fixed, cause: ExplosionCause) {
        if self.config.explosion_ticks == 0 {
            return;
        }
        self.explosions.push(Explosion {
            position,
            remaining: self.config.explosion_ticks,
            cause,
        });
    }

    fn on_destroyed(&mut self, id: StructureId) {
        let Some(s) = self.registry.get(id) else {
            return;
        };
        tracing::debug!(tick = self.tick, id = %id, side = ?s.side, tech = %s.tech_id, "structure destroyed");
        let position = s.position;
        self.script.on_structure_destroyed(s);
        self.events.destroyed.push(id);
        self.spawn_explosion(position, ExplosionCause::Destroyed);
    }

    /// Count explosions down and drop finished ones.
    pub(crate) fn advance_explosions(&mut self) {
        for e in &mut self.explosions {
            e.remaining = e.remaining.saturating_sub(1);
        }
        self.explosions.retain(|e| e.remaining > 0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn f(n: i32) -> Fixed {
        Fixed::from_num(n)
    }

    #[test]
    fn test_falloff_edges() {
        assert_eq!(area_falloff(f(100), f(0), f(50)), f(100));
        assert_eq!(area_falloff(f(100), f(50), f(50)), f(0));
        assert_eq!(area_falloff(f(100), f(60), f(50)), f(0));
        assert_eq!(area_falloff(f(100), f(25), f(50)), f(50));
    }

    #[test]
    fn test_falloff_zero_radius() {
        assert_eq!(area_falloff(f(100), f(0), f(0)), f(0));
    }

    #[test]
    fn test_volley_damage() {
        assert_eq!(volley_damage(5, 2, 3), f(30));
        assert_eq!(volley_damage(-5, 2, 3), f(0));
    }

    #[test]
    fn test_to_points_rounds() {
        assert_eq!(to_points(Fixed::from_num(2.5)), 3);
        assert_eq!(to_points(Fixed::from_num(2.4)), 2);
        assert_eq!(to_points(Fixed::MAX), i32::MAX);
    }
}
