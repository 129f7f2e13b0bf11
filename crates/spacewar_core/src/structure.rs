//! Battle participants.
//!
//! A [`Structure`] is anything that exists on the battle plane: ships,
//! space stations, planetary projectors and shields, and in-flight rockets
//! and bombs. Structures are pure data; the simulation mutates them through
//! the registry, and all hit point changes go through
//! [`Structure::take_damage`] / [`Structure::take_uniform_damage`].

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::data::{AreaEffect, ProjectileDef, ProjectileMode};
use crate::grid::{BattleGrid, Location};
use crate::inventory::{BuildingId, ItemRef, UnitCondition};
use crate::math::{fixed_serde, Fixed, Vec2Fixed};

/// Stable handle of a structure inside the unit registry.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
pub struct StructureId(pub u64);

impl fmt::Display for StructureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Identifier of a player (empire) taking part in a battle.
pub type PlayerId = String;

/// The two opposing sides of a battle.
///
/// The attacker is laid out on the left edge, the defender (and its planet)
/// on the right edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Side {
    /// The side that initiated the encounter.
    Attacker,
    /// The side being attacked, owner of the planet if any.
    Defender,
}

impl Side {
    /// The opposing side.
    #[must_use]
    pub const fn opponent(self) -> Self {
        match self {
            Self::Attacker => Self::Defender,
            Self::Defender => Self::Attacker,
        }
    }

    /// Both sides, in a fixed order.
    pub const BOTH: [Side; 2] = [Side::Attacker, Side::Defender];

    /// Position in [`Side::BOTH`], for per-side tables.
    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            Self::Attacker => 0,
            Self::Defender => 1,
        }
    }
}

/// Closed set of structure kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StructureKind {
    /// A ship or group of ships.
    Ship,
    /// An orbital space station.
    Station,
    /// A planetary ground weapon.
    Projector,
    /// A planetary shield generator.
    Shield,
    /// A single-target guided rocket.
    Rocket,
    /// A rocket that splits into secondary explosions on impact.
    MultiRocket,
    /// A bomb aimed at planetary structures.
    Bomb,
    /// A bomb that infects the planet's population.
    VirusBomb,
}

impl StructureKind {
    /// Whether this kind is an in-flight projectile.
    #[must_use]
    pub const fn is_projectile(self) -> bool {
        matches!(
            self,
            Self::Rocket | Self::MultiRocket | Self::Bomb | Self::VirusBomb
        )
    }

    /// Whether this kind sits on a planet surface.
    #[must_use]
    pub const fn is_planetary(self) -> bool {
        matches!(self, Self::Projector | Self::Shield)
    }

    /// Projectile kind spawned by a weapon mode, `None` for beams.
    #[must_use]
    pub const fn for_projectile(mode: ProjectileMode) -> Option<Self> {
        match mode {
            ProjectileMode::Beam => None,
            ProjectileMode::Rocket => Some(Self::Rocket),
            ProjectileMode::MultiRocket => Some(Self::MultiRocket),
            ProjectileMode::Bomb => Some(Self::Bomb),
            ProjectileMode::VirusBomb => Some(Self::VirusBomb),
        }
    }
}

/// Size/role category used by the layout engine and the efficiency table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Category {
    /// Small craft, one grid cell.
    Fighter,
    /// Medium warship, 3x3 cells that may share edges with other cruisers.
    Cruiser,
    /// Capital ship, exclusive 3x3 cells.
    Battleship,
    /// Orbital station, exclusive 3x3 cells.
    Station,
    /// Ground weapon, exclusive 3x3 cells.
    Projector,
    /// Shield generator, exclusive 3x3 cells.
    Shield,
    /// Rocket or bomb in flight; never placed.
    Missile,
}

impl Category {
    /// Half-width of the square footprint in cells (0 = single cell).
    #[must_use]
    pub const fn footprint_radius(self) -> i32 {
        match self {
            Self::Fighter | Self::Missile => 0,
            Self::Cruiser | Self::Battleship | Self::Station | Self::Projector | Self::Shield => 1,
        }
    }

    /// Structure kind for non-missile categories.
    #[must_use]
    pub const fn structure_kind(self) -> StructureKind {
        match self {
            Self::Fighter | Self::Cruiser | Self::Battleship => StructureKind::Ship,
            Self::Station => StructureKind::Station,
            Self::Projector => StructureKind::Projector,
            Self::Shield => StructureKind::Shield,
            Self::Missile => StructureKind::Rocket,
        }
    }

    /// Whether the category is a ship class.
    #[must_use]
    pub const fn is_ship(self) -> bool {
        matches!(self, Self::Fighter | Self::Cruiser | Self::Battleship)
    }
}

/// Where a structure is trying to go.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MovementGoal {
    /// Holding position.
    #[default]
    None,
    /// Move to a grid cell.
    Cell(Location),
    /// Move toward a battle-space point, stopping `standoff` units short.
    Point {
        /// Destination.
        target: Vec2Fixed,
        /// Distance to stop before the destination.
        #[serde(with = "fixed_serde")]
        standoff: Fixed,
    },
}

impl MovementGoal {
    /// Whether a goal is set.
    #[must_use]
    pub const fn is_some(&self) -> bool {
        !matches!(self, Self::None)
    }
}

/// One armament slot of a structure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeaponPort {
    /// Projectile id in the catalog.
    pub projectile_id: String,
    /// Resolved projectile definition; `None` when the catalog lacks it.
    pub definition: Option<ProjectileDef>,
    /// Parallel weapon instances in this port.
    pub count: u32,
    /// Ticks until the port can fire again.
    pub cooldown: u32,
}

impl WeaponPort {
    /// Create a ready-to-fire port.
    #[must_use]
    pub fn new(projectile_id: impl Into<String>, definition: Option<ProjectileDef>, count: u32) -> Self {
        Self {
            projectile_id: projectile_id.into(),
            definition,
            count,
            cooldown: 0,
        }
    }

    /// Count the cooldown down by one tick, floored at zero.
    pub fn tick_cooldown(&mut self) {
        self.cooldown = self.cooldown.saturating_sub(1);
    }

    /// Whether the port can fire this tick.
    #[must_use]
    pub const fn is_ready(&self) -> bool {
        self.cooldown == 0
    }

    /// Range of the port, zero when the definition is missing.
    #[must_use]
    pub fn range(&self) -> Fixed {
        self.definition.as_ref().map_or(Fixed::ZERO, |d| d.range)
    }
}

/// State carried by rockets and bombs in flight.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectileState {
    /// Structure that fired the projectile.
    pub source: StructureId,
    /// Current target, `None` once it vanished.
    pub target: Option<StructureId>,
    /// Moves left; the projectile fizzles after the move that brings
    /// this to zero.
    pub ttl: u32,
    /// Weapon mode.
    pub mode: ProjectileMode,
    /// Damage dealt on impact, already scaled by port and unit counts.
    #[serde(with = "fixed_serde")]
    pub damage: Fixed,
    /// Anti-ECM level of the seeker.
    pub anti_ecm: u8,
    /// Splash configuration for multi-rockets and bombs.
    pub area: Option<AreaEffect>,
    /// Whether the one-time ECM scramble roll already happened.
    pub scramble_checked: bool,
    /// Category of the firing structure, for efficiency lookups.
    pub source_category: Category,
}

/// A battle participant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Structure {
    /// Registry handle.
    pub id: StructureId,
    /// Side the structure fights for.
    pub side: Side,
    /// Owning player.
    pub owner: PlayerId,
    /// Technology the structure was built from.
    pub tech_id: String,
    /// Inventory entry the structure was created from, if any.
    pub source: Option<ItemRef>,
    /// Planet building backing this structure, if any.
    pub building: Option<BuildingId>,
    /// Kind of structure.
    pub kind: StructureKind,
    /// Layout category.
    pub category: Category,
    /// Battle-space position.
    pub position: Vec2Fixed,
    /// Facing angle in radians, `[0, 2π)`.
    #[serde(with = "fixed_serde")]
    pub angle: Fixed,
    /// Milliseconds needed to travel one unit; zero = immobile.
    #[serde(with = "fixed_serde")]
    pub movement_speed: Fixed,
    /// Milliseconds needed to turn one radian; zero = turns instantly.
    #[serde(with = "fixed_serde")]
    pub rotation_time: Fixed,
    /// Hit points of the front unit of the group.
    pub hp: i32,
    /// Hit points of a single unit.
    pub hp_max: i32,
    /// Shield points.
    pub shield: i32,
    /// Maximum shield points.
    pub shield_max: i32,
    /// Number of units represented.
    pub count: u32,
    /// Units of this group lost so far.
    pub loss: u32,
    /// Weapons.
    pub ports: Vec<WeaponPort>,
    /// Current attack target.
    pub attack: Option<StructureId>,
    /// Planned movement.
    pub goal: MovementGoal,
    /// Automatically engage enemies entering weapon range.
    pub guard: bool,
    /// Fleeing toward the side's map edge.
    pub flee: bool,
    /// Selected by the player.
    pub selected: bool,
    /// Current orders were issued by the player.
    pub direct_control: bool,
    /// Damage dealt when ramming; zero = not a kamikaze.
    pub kamikaze: i32,
    /// Electronic countermeasure level.
    pub ecm: u8,
    /// Sprite bounds (width, height) in battle-space units.
    pub size: (u32, u32),
    /// Grid cell assigned by the layout engine.
    pub cell: Option<Location>,
    /// Flight state for rockets and bombs.
    pub projectile: Option<ProjectileState>,
}

impl Structure {
    /// Whether the structure still represents at least one live unit.
    #[must_use]
    pub const fn is_alive(&self) -> bool {
        self.count > 0
    }

    /// Hit and shield points of the front unit, `None` where full.
    #[must_use]
    pub const fn condition(&self) -> UnitCondition {
        UnitCondition {
            hp: if self.hp < self.hp_max { Some(self.hp) } else { None },
            shield: if self.shield < self.shield_max {
                Some(self.shield)
            } else {
                None
            },
        }
    }

    /// Whether the structure is a rocket or bomb.
    #[must_use]
    pub const fn is_projectile(&self) -> bool {
        self.kind.is_projectile()
    }

    /// Whether the structure can move at all.
    #[must_use]
    pub fn is_mobile(&self) -> bool {
        self.movement_speed > Fixed::ZERO && !self.kind.is_planetary()
    }

    /// Whether the structure has to approach to minimum range before firing.
    #[must_use]
    pub fn must_approach(&self) -> bool {
        self.kind == StructureKind::Ship && self.is_mobile()
    }

    /// Whether two structures fight for the same side.
    #[must_use]
    pub fn is_allied(&self, other: &Self) -> bool {
        self.side == other.side
    }

    /// Longest range among ports with a known definition.
    #[must_use]
    pub fn max_range(&self) -> Fixed {
        self.ports
            .iter()
            .map(WeaponPort::range)
            .max()
            .unwrap_or(Fixed::ZERO)
    }

    /// Shortest non-zero range among ports with a known definition.
    #[must_use]
    pub fn min_range(&self) -> Fixed {
        self.ports
            .iter()
            .map(WeaponPort::range)
            .filter(|r| *r > Fixed::ZERO)
            .min()
            .unwrap_or(Fixed::ZERO)
    }

    /// Grid-fractional position.
    #[must_use]
    pub fn grid_position(&self, grid: &BattleGrid) -> (Fixed, Fixed) {
        grid.grid_position(self.position)
    }

    /// Radius of a circle enclosing the sprite bounds.
    #[must_use]
    pub fn bounding_radius(&self) -> Fixed {
        Fixed::from_num(self.size.0.max(self.size.1)) / Fixed::from_num(2)
    }

    /// Total hit points of the group.
    #[must_use]
    pub fn total_hp(&self) -> i64 {
        if self.count == 0 {
            return 0;
        }
        i64::from(self.hp) + i64::from(self.hp_max) * i64::from(self.count - 1)
    }

    /// Reduce the incoming hit by the shield, which absorbs half of each hit
    /// while it lasts. Returns the damage that reaches the hull.
    fn absorb_with_shield(&mut self, amount: i32) -> i32 {
        if self.shield <= 0 || amount <= 0 {
            return amount.max(0);
        }
        let half = amount / 2;
        if self.shield > half {
            self.shield -= half;
            amount - half
        } else {
            let through = amount - self.shield;
            self.shield = 0;
            through
        }
    }

    /// Apply direct damage to the group.
    ///
    /// Damage overflows from the front unit into the next one. Returns the
    /// number of units destroyed.
    pub fn take_damage(&mut self, amount: i32) -> u32 {
        if !self.is_alive() || amount <= 0 {
            return 0;
        }
        let mut remaining = self.absorb_with_shield(amount);
        let mut killed = 0;
        while remaining > 0 && self.count > 0 {
            if remaining >= self.hp {
                remaining -= self.hp;
                self.count -= 1;
                killed += 1;
                self.hp = if self.count > 0 { self.hp_max } else { 0 };
            } else {
                self.hp -= remaining;
                remaining = 0;
            }
        }
        self.loss += killed;
        self.clamp_points();
        killed
    }

    /// Apply the same per-unit damage to every unit of the group, as area
    /// effects do. Returns the number of units destroyed.
    ///
    /// The front unit is the most damaged one; the others are at full hit
    /// points, so either only the front unit dies, or all units do.
    pub fn take_uniform_damage(&mut self, per_unit: i32) -> u32 {
        if !self.is_alive() || per_unit <= 0 {
            return 0;
        }
        let hit = self.absorb_with_shield(per_unit);
        if hit <= 0 {
            return 0;
        }
        let killed = if hit >= self.hp_max {
            self.count
        } else if hit >= self.hp {
            1
        } else {
            0
        };
        self.count -= killed;
        if self.count == 0 {
            self.hp = 0;
        } else if killed == 1 {
            self.hp = self.hp_max - hit;
        } else {
            self.hp -= hit;
        }
        self.loss += killed;
        self.clamp_points();
        killed
    }

    /// Destroy the whole group at once (kamikaze impact, virus carriers).
    /// Returns the number of units removed.
    pub fn destroy(&mut self) -> u32 {
        let killed = self.count;
        self.loss += killed;
        self.count = 0;
        self.hp = 0;
        killed
    }

    fn clamp_points(&mut self) {
        self.hp = self.hp.clamp(0, self.hp_max.max(0));
        self.shield = self.shield.clamp(0, self.shield_max.max(0));
    }
}
