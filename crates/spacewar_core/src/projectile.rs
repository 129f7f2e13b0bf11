//! Rockets and bombs in flight.
//!
//! Projectiles are structures of their own. Each tick they may get
//! scrambled by the target's ECM (once), fly straight at their target,
//! sweep-test the tick's displacement against it and count down their
//! lifetime.

use rand::Rng;
use rand_chacha::ChaCha8Rng;

use crate::collision::{sweep, SweepTarget};
use crate::combat::{AreaBlast, DamageKind, DamageTarget, ExplosionCause};
use crate::data::{ProjectileDef, ProjectileMode, TechCatalog};
use crate::math::{tau, Fixed, Vec2Fixed};
use crate::simulation::BattleSimulation;
use crate::structure::{
    Category, MovementGoal, ProjectileState, Side, Structure, StructureId, StructureKind,
};

/// Sprite bounds of a rocket or bomb.
pub const PROJECTILE_SIZE: (u32, u32) = (4, 4);

/// Roll a percentage chance.
pub fn roll_percent(rng: &mut ChaCha8Rng, chance: u8) -> bool {
    chance > 0 && rng.gen_range(0..100u8) < chance
}

/// Collision geometry of a structure.
pub(crate) fn sweep_target<'a>(catalog: &'a dyn TechCatalog, s: &Structure) -> SweepTarget<'a> {
    SweepTarget {
        center: s.position,
        angle: s.angle,
        sprite: catalog.entity(&s.tech_id).map(|d| &d.sprite),
        size: s.size,
    }
}

/// Whether `target` is a legal target for a weapon mode.
#[must_use]
pub fn can_target(mode: ProjectileMode, target: &Structure) -> bool {
    if !target.is_alive() || target.is_projectile() {
        return false;
    }
    !mode.targets_planet_only() || target.kind.is_planetary()
}

impl BattleSimulation {
    /// Launch a projectile from `source` at `target`.
    pub(crate) fn spawn_projectile(
        &mut self,
        source: StructureId,
        target: StructureId,
        def: &ProjectileDef,
        port_count: u32,
    ) -> Option<StructureId> {
        let kind = StructureKind::for_projectile(def.mode)?;
        let (origin, at) = match (self.registry.get(source), self.registry.get(target)) {
            (Some(s), Some(t)) => (s, t.position),
            _ => return None,
        };
        let damage = crate::combat::volley_damage(def.damage, port_count, origin.count);
        let ttl = if def.ttl == 0 {
            self.config.default_rocket_ttl
        } else {
            def.ttl
        };
        let rocket = Structure {
            id: StructureId::default(),
            side: origin.side,
            owner: origin.owner.clone(),
            tech_id: def.id.clone(),
            source: None,
            building: None,
            kind,
            category: Category::Missile,
            position: origin.position,
            angle: (at - origin.position).angle(),
            movement_speed: def.movement_speed,
            rotation_time: Fixed::ZERO,
            hp: 1,
            hp_max: 1,
            shield: 0,
            shield_max: 0,
            count: 1,
            loss: 0,
            ports: Vec::new(),
            attack: Some(target),
            goal: MovementGoal::None,
            guard: false,
            flee: false,
            selected: false,
            direct_control: false,
            kamikaze: 0,
            ecm: 0,
            size: PROJECTILE_SIZE,
            cell: None,
            projectile: Some(ProjectileState {
                source,
                target: Some(target),
                ttl,
                mode: def.mode,
                damage,
                anti_ecm: def.anti_ecm,
                area: def.area.clone(),
                scramble_checked: false,
                source_category: origin.category,
            }),
        };
        let id = self.registry.insert(rocket);
        tracing::trace!(tick = self.tick, id = %id, source = %source, target = %target, "projectile launched");
        self.events.launched.push(id);
        Some(id)
    }

    /// Fly, scramble and collide every projectile.
    pub(crate) fn advance_projectiles(&mut self) {
        let ids: Vec<StructureId> = self
            .registry
            .iter()
            .filter(|s| s.is_projectile())
            .map(|s| s.id)
            .collect();
        for id in ids {
            self.advance_projectile(id);
        }
    }

    /// Live projectiles in the arena.
    pub(crate) fn projectile_count(&self) -> usize {
        self.registry.iter().filter(|s| s.is_projectile()).count()
    }

    fn advance_projectile(&mut self, id: StructureId) {
        let Some(state) = self.registry.get(id).and_then(|p| p.projectile.clone()) else {
            return;
        };

        // Targets that died or left stop steering the projectile
        let target = state
            .target
            .filter(|t| self.registry.get(*t).is_some_and(|s| can_target(state.mode, s)));
        if target.is_none() && state.target.is_some() {
            if let Some(p) = self.registry.get_mut(id) {
                p.attack = None;
                if let Some(ps) = p.projectile.as_mut() {
                    ps.target = None;
                }
            }
        }
        if let Some(t) = target {
            if !state.scramble_checked {
                self.check_scramble(id, t);
            }
        }

        let Some(p) = self.registry.get_mut(id) else {
            return;
        };
        let Some(ps) = p.projectile.as_mut() else {
            return;
        };
        ps.ttl = ps.ttl.saturating_sub(1);
        let (target, expired) = (ps.target, ps.ttl == 0);
        let (from, heading, speed) = (p.position, p.angle, p.movement_speed);

        let step = match self.config.distance_per_tick(speed) {
            s if s == Fixed::ZERO => self.grid.cell_size(),
            s => s,
        };
        let aim = target.and_then(|t| self.registry.get(t)).map(|t| t.position);
        let to = match aim {
            Some(at) => from.step_toward(at, step).0,
            None => from + Vec2Fixed::from_angle(heading).scale(step),
        };

        let hit = target.and_then(|t| {
            let s = self.registry.get(t)?;
            let geometry = sweep_target(self.catalog.as_ref(), s);
            let radius = Fixed::from_num(PROJECTILE_SIZE.0) / Fixed::from_num(2);
            sweep(from, to, radius, &geometry, self.config.collision_substeps).map(|at| (t, at))
        });

        if let Some((t, at)) = hit {
            self.impact(id, t, at);
            return;
        }
        if let Some(p) = self.registry.get_mut(id) {
            if to != from {
                p.angle = (to - from).angle();
            }
            p.position = to;
        }
        if expired || self.grid.is_beyond(to, self.config.out_of_bounds_margin) {
            self.fizzle(id);
        }
    }

    /// One-time ECM roll once the projectile closes in on its target.
    fn check_scramble(&mut self, id: StructureId, target: StructureId) {
        let (Some(p), Some(t)) = (self.registry.get(id), self.registry.get(target)) else {
            return;
        };
        if t.ecm == 0 || p.position.distance(t.position) > self.config.engagement_distance {
            return;
        }
        let Some(state) = p.projectile.as_ref() else {
            return;
        };
        let (side, mode) = (p.side, state.mode);
        let chance = self.config.ecm.scramble_chance(state.anti_ecm, t.ecm);

        if let Some(ps) = self.registry.get_mut(id).and_then(|p| p.projectile.as_mut()) {
            ps.scramble_checked = true;
        }
        self.events.scramble_rolls.push(id);
        if !roll_percent(&mut self.rng, chance) {
            return;
        }

        let protected = self.battle.setup.protected_player.as_deref();
        let candidates: Vec<StructureId> = self
            .registry
            .units_of(side.opponent())
            .filter(|s| can_target(mode, s))
            .filter(|s| protected != Some(s.owner.as_str()))
            .map(|s| s.id)
            .collect();
        if candidates.is_empty() {
            return;
        }
        let pick = candidates[self.rng.gen_range(0..candidates.len())];
        tracing::debug!(tick = self.tick, id = %id, from = %target, to = %pick, "rocket scrambled");
        if let Some(p) = self.registry.get_mut(id) {
            p.attack = Some(pick);
            if let Some(ps) = p.projectile.as_mut() {
                ps.target = Some(pick);
            }
        }
        self.events.scrambled.push(id);
    }

    fn impact(&mut self, id: StructureId, target: StructureId, at: Vec2Fixed) {
        let Some(rocket) = self.registry.remove(id) else {
            return;
        };
        let Some(state) = rocket.projectile else {
            return;
        };
        let side: Side = rocket.side;
        let source = Some(state.source);
        let category = self
            .registry
            .get(target)
            .map_or(Category::Missile, |t| t.category);
        let efficiency = self.catalog.efficiency(state.source_category, category);

        match state.mode {
            ProjectileMode::VirusBomb => {
                tracing::info!(tick = self.tick, "planet infected");
                self.battle.planet_infected = true;
                self.spawn_explosion(at, ExplosionCause::Virus);
            }
            ProjectileMode::MultiRocket => {
                self.spawn_explosion(at, ExplosionCause::Impact);
                if let Some(area) = state.area {
                    let primary = state.damage * area.multiplier;
                    self.apply_area_damage(
                        side,
                        source,
                        state.source_category,
                        AreaBlast::new(at, area.radius, primary),
                    );
                    let n = area.secondary_count;
                    let secondary = state.damage * area.secondary_multiplier;
                    for k in 0..n {
                        let angle = tau() * Fixed::from_num(k) / Fixed::from_num(n);
                        let center = at + Vec2Fixed::from_angle(angle).scale(area.radius);
                        self.spawn_explosion(center, ExplosionCause::Secondary);
                        self.apply_area_damage(
                            side,
                            source,
                            state.source_category,
                            AreaBlast::new(center, area.secondary_radius, secondary),
                        );
                    }
                } else {
                    self.apply_damage(
                        side,
                        source,
                        DamageTarget::Structure(target),
                        state.damage * efficiency,
                        DamageKind::Direct,
                    );
                }
            }
            ProjectileMode::Rocket | ProjectileMode::Bomb | ProjectileMode::Beam => {
                self.spawn_explosion(at, ExplosionCause::Impact);
                self.apply_damage(
                    side,
                    source,
                    DamageTarget::Structure(target),
                    state.damage * efficiency,
                    DamageKind::Direct,
                );
                // The target already took the full hit
                if let Some(area) = state.area {
                    let splash = state.damage * area.multiplier;
                    self.apply_area_damage(
                        side,
                        source,
                        state.source_category,
                        AreaBlast {
                            center: at,
                            radius: area.radius,
                            damage: splash,
                            spare: Some(target),
                        },
                    );
                }
            }
        }
        self.events.impacts.push(id);
    }

    fn fizzle(&mut self, id: StructureId) {
        if let Some(p) = self.registry.remove(id) {
            tracing::trace!(tick = self.tick, id = %id, "projectile fizzled");
            self.spawn_explosion(p.position, ExplosionCause::Fizzle);
            self.events.fizzled.push(id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    use crate::structure::tests::ship;

    #[test]
    fn test_zero_chance_never_rolls() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        assert!((0..100).all(|_| !roll_percent(&mut rng, 0)));
        assert!((0..100).all(|_| roll_percent(&mut rng, 100)));
    }

    #[test]
    fn test_rolls_are_seeded() {
        let mut a = ChaCha8Rng::seed_from_u64(7);
        let mut b = ChaCha8Rng::seed_from_u64(7);
        let ra: Vec<bool> = (0..32).map(|_| roll_percent(&mut a, 50)).collect();
        let rb: Vec<bool> = (0..32).map(|_| roll_percent(&mut b, 50)).collect();
        assert_eq!(ra, rb);
    }

    #[test]
    fn test_bombs_only_target_planet_structures() {
        let ship = ship(10, 0, 1);
        assert!(can_target(ProjectileMode::Rocket, &ship));
        assert!(!can_target(ProjectileMode::Bomb, &ship));

        let mut projector = ship.clone();
        projector.kind = StructureKind::Projector;
        assert!(can_target(ProjectileMode::VirusBomb, &projector));

        projector.count = 0;
        assert!(!can_target(ProjectileMode::Bomb, &projector));
    }
}
