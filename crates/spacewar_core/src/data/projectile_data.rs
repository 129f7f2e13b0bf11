//! Projectile (ballistics) definitions.

use serde::{Deserialize, Serialize};

use crate::math::{decimal_serde, Fixed};

/// How a weapon delivers its damage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProjectileMode {
    /// Instant line hit.
    Beam,
    /// Guided single-target rocket.
    Rocket,
    /// Rocket that bursts into secondary explosions.
    MultiRocket,
    /// Bomb against planet structures.
    Bomb,
    /// Bomb that infects the planet population.
    VirusBomb,
}

impl ProjectileMode {
    /// Whether the weapon may only be aimed at planet structures.
    #[must_use]
    pub const fn targets_planet_only(self) -> bool {
        matches!(self, Self::Bomb | Self::VirusBomb)
    }
}

/// Splash parameters of an exploding projectile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AreaEffect {
    /// Radius of the primary explosion.
    #[serde(with = "decimal_serde")]
    pub radius: Fixed,
    /// Damage multiplier of the primary explosion.
    #[serde(with = "decimal_serde", default = "one")]
    pub multiplier: Fixed,
    /// Number of secondary explosions spread around the impact.
    #[serde(default)]
    pub secondary_count: u32,
    /// Radius of each secondary explosion.
    #[serde(with = "decimal_serde", default)]
    pub secondary_radius: Fixed,
    /// Damage multiplier of each secondary explosion.
    #[serde(with = "decimal_serde", default)]
    pub secondary_multiplier: Fixed,
}

fn one() -> Fixed {
    Fixed::ONE
}

/// Data-driven projectile definition.
///
/// # Example RON
///
/// ```ron
/// ProjectileDef(
///     id: "ClusterRocket",
///     mode: MultiRocket,
///     damage: 40,
///     delay: 30,
///     range: 220.0,
///     movement_speed: 4.0,
///     ttl: 150,
///     anti_ecm: 2,
///     area: Some(AreaEffect(
///         radius: 24.0,
///         multiplier: 1.0,
///         secondary_count: 4,
///         secondary_radius: 16.0,
///         secondary_multiplier: 0.5,
///     )),
/// )
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectileDef {
    /// Unique identifier referenced by weapon mounts.
    pub id: String,

    /// Delivery mode.
    pub mode: ProjectileMode,

    /// Base damage of one weapon instance.
    pub damage: i32,

    /// Ticks between two shots of the same port.
    pub delay: u32,

    /// Maximum firing range in battle-space units.
    #[serde(with = "decimal_serde")]
    pub range: Fixed,

    /// Milliseconds a rocket needs to travel one unit. Ignored for beams.
    #[serde(with = "decimal_serde", default)]
    pub movement_speed: Fixed,

    /// Moves a rocket makes before fizzling. A rocket launched with a
    /// lifetime of `n` flies on the `n` ticks after launch and fizzles at
    /// the end of the last one unless it hit. Zero uses the configured
    /// default.
    #[serde(default)]
    pub ttl: u32,

    /// Seeker quality against ECM.
    #[serde(default)]
    pub anti_ecm: u8,

    /// Splash damage, if any.
    #[serde(default)]
    pub area: Option<AreaEffect>,
}

impl ProjectileDef {
    /// A beam weapon definition.
    #[must_use]
    pub fn beam(id: impl Into<String>, damage: i32, range: Fixed) -> Self {
        Self {
            id: id.into(),
            mode: ProjectileMode::Beam,
            damage,
            delay: 10,
            range,
            movement_speed: Fixed::ZERO,
            ttl: 0,
            anti_ecm: 0,
            area: None,
        }
    }

    /// A guided rocket definition.
    #[must_use]
    pub fn rocket(id: impl Into<String>, damage: i32, range: Fixed, movement_speed: Fixed) -> Self {
        Self {
            mode: ProjectileMode::Rocket,
            movement_speed,
            delay: 30,
            ..Self::beam(id, damage, range)
        }
    }

    /// Whether the projectile is an instant beam.
    #[must_use]
    pub const fn is_beam(&self) -> bool {
        matches!(self.mode, ProjectileMode::Beam)
    }
}
