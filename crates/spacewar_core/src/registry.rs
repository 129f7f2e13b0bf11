//! Unit registry: the arena owning every structure in a battle.
//!
//! Handles are handed out from a monotonically increasing counter and never
//! reused, so a stale [`StructureId`] simply misses. Iteration is in handle
//! order, which keeps every per-tick pass deterministic.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::math::{Fixed, Vec2Fixed};
use crate::structure::{Side, Structure, StructureId};

/// Owner of all battle participants.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnitRegistry {
    structures: BTreeMap<StructureId, Structure>,
    next_id: u64,
}

impl Default for UnitRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl UnitRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            structures: BTreeMap::new(),
            next_id: 1,
        }
    }

    /// Insert a structure, assigning it a fresh handle.
    pub fn insert(&mut self, mut structure: Structure) -> StructureId {
        let id = StructureId(self.next_id);
        self.next_id += 1;
        structure.id = id;
        self.structures.insert(id, structure);
        id
    }

    /// Remove a structure.
    pub fn remove(&mut self, id: StructureId) -> Option<Structure> {
        self.structures.remove(&id)
    }

    /// Get a structure.
    #[must_use]
    pub fn get(&self, id: StructureId) -> Option<&Structure> {
        self.structures.get(&id)
    }

    /// Get a mutable structure.
    pub fn get_mut(&mut self, id: StructureId) -> Option<&mut Structure> {
        self.structures.get_mut(&id)
    }

    /// Check if a handle is live.
    #[must_use]
    pub fn contains(&self, id: StructureId) -> bool {
        self.structures.contains_key(&id)
    }

    /// Number of structures, projectiles included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.structures.len()
    }

    /// Whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.structures.is_empty()
    }

    /// Snapshot of live handles, in order. Use this to mutate while walking.
    #[must_use]
    pub fn ids(&self) -> Vec<StructureId> {
        self.structures.keys().copied().collect()
    }

    /// Iterate structures in handle order.
    pub fn iter(&self) -> impl Iterator<Item = &Structure> {
        self.structures.values()
    }

    /// Iterate structures mutably in handle order.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Structure> {
        self.structures.values_mut()
    }

    /// Live non-projectile structures of a side.
    pub fn units_of(&self, side: Side) -> impl Iterator<Item = &Structure> {
        self.iter()
            .filter(move |s| s.side == side && !s.is_projectile() && s.is_alive())
    }

    /// Number of live non-projectile structures of a side.
    #[must_use]
    pub fn unit_count(&self, side: Side) -> usize {
        self.units_of(side).count()
    }

    /// Handles of structures whose group has been wiped out.
    #[must_use]
    pub fn dead_ids(&self) -> Vec<StructureId> {
        self.iter().filter(|s| !s.is_alive()).map(|s| s.id).collect()
    }

    /// Live enemy of `side` nearest to `from`, optionally limited to
    /// `max_distance`. Ties go to the lower handle.
    #[must_use]
    pub fn nearest_enemy(
        &self,
        side: Side,
        from: Vec2Fixed,
        max_distance: Option<Fixed>,
        filter: impl Fn(&Structure) -> bool,
    ) -> Option<StructureId> {
        let limit = max_distance.map(|d| d.saturating_mul(d));
        self.units_of(side.opponent())
            .filter(|s| filter(s))
            .map(|s| (s.position.distance_squared(from), s.id))
            .filter(|(d, _)| limit.map_or(true, |l| *d <= l))
            .min()
            .map(|(_, id)| id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::structure::tests::ship;

    #[test]
    fn test_handles_are_monotonic() {
        let mut registry = UnitRegistry::new();
        let a = registry.insert(ship(10, 0, 1));
        let b = registry.insert(ship(10, 0, 1));
        registry.remove(a);
        let c = registry.insert(ship(10, 0, 1));
        assert!(a < b && b < c);
        assert!(!registry.contains(a));
        assert_eq!(registry.ids(), vec![b, c]);
    }

    #[test]
    fn test_unit_count_skips_projectiles_and_dead() {
        let mut registry = UnitRegistry::new();
        registry.insert(ship(10, 0, 3));
        let mut rocket = ship(1, 0, 1);
        rocket.kind = crate::structure::StructureKind::Rocket;
        registry.insert(rocket);
        let mut dead = ship(10, 0, 1);
        dead.destroy();
        let dead_id = registry.insert(dead);
        let mut enemy = ship(10, 0, 1);
        enemy.side = Side::Defender;
        registry.insert(enemy);

        assert_eq!(registry.unit_count(Side::Attacker), 1);
        assert_eq!(registry.unit_count(Side::Defender), 1);
        assert_eq!(registry.dead_ids(), vec![dead_id]);
    }

    #[test]
    fn test_nearest_enemy() {
        let mut registry = UnitRegistry::new();
        let mut near = ship(10, 0, 1);
        near.side = Side::Defender;
        near.position = Vec2Fixed::from_ints(10, 0);
        let mut far = near.clone();
        far.position = Vec2Fixed::from_ints(50, 0);
        let far_id = registry.insert(far);
        let near_id = registry.insert(near);

        let found = registry.nearest_enemy(Side::Attacker, Vec2Fixed::ZERO, None, |_| true);
        assert_eq!(found, Some(near_id));
        let limited = registry.nearest_enemy(
            Side::Attacker,
            Vec2Fixed::ZERO,
            Some(Fixed::from_num(5)),
            |_| true,
        );
        assert_eq!(limited, None);
        let filtered = registry.nearest_enemy(Side::Attacker, Vec2Fixed::ZERO, None, |s| {
            s.id == far_id
        });
        assert_eq!(filtered, Some(far_id));
    }
}
