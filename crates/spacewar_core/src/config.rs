//! Battle configuration.
//!
//! Every field has a default, so a configuration file only needs to list
//! what it changes:
//!
//! ```ron
//! BattleConfig(
//!     grid: GridConfig(cols: 48, rows: 30),
//!     movement_mode: Freeform,
//!     seed: 42,
//! )
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{BattleError, Result};
use crate::grid::BattleGrid;
use crate::math::{decimal_serde, fixed_pow, Fixed};

/// Which movement strategy the battle uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MovementMode {
    /// Cell reservations and A* paths.
    #[default]
    Grid,
    /// Straight-line movement in continuous space.
    Freeform,
}

/// Wall-clock pacing requested by the presentation layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SimulationSpeed {
    /// One tick per simulation delay.
    #[default]
    Normal,
    /// `fast_multiplier` ticks per delay.
    Fast,
    /// `ultra_fast_multiplier` ticks per delay.
    UltraFast,
}

/// Grid dimensions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridConfig {
    /// Columns.
    pub cols: u32,
    /// Rows.
    pub rows: u32,
    /// Cell size in battle-space units.
    #[serde(with = "decimal_serde")]
    pub cell_size: Fixed,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            cols: 40,
            rows: 24,
            cell_size: Fixed::from_num(24),
        }
    }
}

/// Chance (percent) that a rocket's seeker is scrambled, indexed by
/// `[anti_ecm][ecm]`. Levels beyond the table use its last row/column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EcmTable(pub Vec<Vec<u8>>);

impl Default for EcmTable {
    fn default() -> Self {
        Self(vec![
            vec![0, 50, 70, 90],
            vec![0, 30, 50, 70],
            vec![0, 15, 30, 50],
            vec![0, 5, 15, 30],
        ])
    }
}

impl EcmTable {
    /// Scramble chance in percent.
    #[must_use]
    pub fn scramble_chance(&self, anti_ecm: u8, ecm: u8) -> u8 {
        let Some(row) = self
            .0
            .get(usize::from(anti_ecm))
            .or_else(|| self.0.last())
        else {
            return 0;
        };
        row.get(usize::from(ecm))
            .or_else(|| row.last())
            .copied()
            .unwrap_or(0)
            .min(100)
    }
}

/// Focus-fire penalty: `n` attackers on one target each deal `n^(-3/c)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiminishingReturns {
    /// Whether the rule is active at all.
    pub enabled: bool,
    /// The constant `c`; larger values soften the penalty.
    #[serde(with = "decimal_serde")]
    pub constant: Fixed,
    /// Also apply the rule to direct beam fire, not only to area damage.
    pub apply_to_beams: bool,
}

impl Default for DiminishingReturns {
    fn default() -> Self {
        Self {
            enabled: true,
            constant: Fixed::from_num(10),
            apply_to_beams: false,
        }
    }
}

impl DiminishingReturns {
    /// Damage factor for `attackers` structures focusing the same target.
    #[must_use]
    pub fn factor(&self, attackers: u32) -> Fixed {
        if !self.enabled || attackers <= 1 || self.constant <= Fixed::ZERO {
            return Fixed::ONE;
        }
        let exponent = Fixed::from_num(-3) / self.constant;
        fixed_pow(Fixed::from_num(attackers), exponent)
    }
}

/// Tunables of one battle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BattleConfig {
    /// Battle grid dimensions.
    pub grid: GridConfig,
    /// Milliseconds of simulated time per tick.
    pub simulation_delay_ms: u32,
    /// Tick rate multiplier for fast speed.
    pub fast_multiplier: u32,
    /// Tick rate multiplier for ultra-fast speed.
    pub ultra_fast_multiplier: u32,
    /// Movement strategy.
    pub movement_mode: MovementMode,
    /// Facing error (radians) within which a unit counts as aimed.
    #[serde(with = "decimal_serde")]
    pub rotation_tolerance: Fixed,
    /// Distance at which a rocket's target gets to jam it.
    #[serde(with = "decimal_serde")]
    pub engagement_distance: Fixed,
    /// Rocket scramble chances.
    pub ecm: EcmTable,
    /// Focus-fire penalty.
    pub diminishing_returns: DiminishingReturns,
    /// Share of damage to a building that splashes onto its neighbours.
    pub building_splash_percent: u32,
    /// Splash radius on the planet surface, in surface cells.
    #[serde(with = "decimal_serde")]
    pub ground_radius: Fixed,
    /// Ticks an explosion stays on screen.
    pub explosion_ticks: u32,
    /// Pixel-test samples along a collision segment.
    pub collision_substeps: u32,
    /// How far outside the rectangle a rocket may fly before it is removed.
    #[serde(with = "decimal_serde")]
    pub out_of_bounds_margin: Fixed,
    /// Rocket lifetime when its definition leaves it at zero.
    pub default_rocket_ttl: u32,
    /// Upper bound on cached paths in the grid movement strategy.
    pub max_cached_paths: usize,
    /// Stalemate after this many ticks.
    pub max_ticks: u64,
    /// Seed of the battle RNG.
    pub seed: u64,
}

impl Default for BattleConfig {
    fn default() -> Self {
        Self {
            grid: GridConfig::default(),
            simulation_delay_ms: 50,
            fast_multiplier: 2,
            ultra_fast_multiplier: 4,
            movement_mode: MovementMode::Grid,
            rotation_tolerance: Fixed::from_num(0.1),
            engagement_distance: Fixed::from_num(48),
            ecm: EcmTable::default(),
            diminishing_returns: DiminishingReturns::default(),
            building_splash_percent: 25,
            ground_radius: Fixed::from_num(3),
            explosion_ticks: 10,
            collision_substeps: 8,
            out_of_bounds_margin: Fixed::from_num(48),
            default_rocket_ttl: 200,
            max_cached_paths: 256,
            max_ticks: 20_000,
            seed: 0,
        }
    }
}

impl BattleConfig {
    /// Parse and validate a configuration from RON text.
    ///
    /// # Errors
    ///
    /// Returns [`BattleError::DataParseError`] for malformed RON or values
    /// that cannot produce a battle (empty grid, zero tick delay).
    pub fn from_ron_str(text: &str) -> Result<Self> {
        let config: Self = ron::from_str(text).map_err(|e| BattleError::DataParseError {
            what: "battle config".into(),
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Check the values the simulation depends on.
    ///
    /// # Errors
    ///
    /// Returns [`BattleError::DataParseError`] naming the offending field.
    pub fn validate(&self) -> Result<()> {
        let invalid = |message: &str| {
            Err(BattleError::DataParseError {
                what: "battle config".into(),
                message: message.into(),
            })
        };
        if self.grid.cols == 0 || self.grid.rows == 0 {
            return invalid("grid must have at least one row and column");
        }
        if self.grid.cell_size <= Fixed::ZERO {
            return invalid("grid.cell_size must be positive");
        }
        if self.simulation_delay_ms == 0 {
            return invalid("simulation_delay_ms must be positive");
        }
        if self.collision_substeps == 0 {
            return invalid("collision_substeps must be positive");
        }
        Ok(())
    }

    /// Grid described by this configuration.
    #[must_use]
    pub fn battle_grid(&self) -> BattleGrid {
        BattleGrid::new(self.grid.cols, self.grid.rows, self.grid.cell_size)
    }

    /// Battle-space distance a unit covers in one tick.
    ///
    /// `movement_speed` is milliseconds per unit; zero means immobile.
    #[must_use]
    pub fn distance_per_tick(&self, movement_speed: Fixed) -> Fixed {
        if movement_speed <= Fixed::ZERO {
            return Fixed::ZERO;
        }
        Fixed::from_num(self.simulation_delay_ms) / movement_speed
    }

    /// Radians a unit turns in one tick.
    ///
    /// `rotation_time` is milliseconds per radian; zero turns instantly.
    #[must_use]
    pub fn rotation_per_tick(&self, rotation_time: Fixed) -> Option<Fixed> {
        (rotation_time > Fixed::ZERO)
            .then(|| Fixed::from_num(self.simulation_delay_ms) / rotation_time)
    }

    /// Wall-clock time between ticks at the given speed.
    #[must_use]
    pub fn tick_interval(&self, speed: SimulationSpeed) -> Duration {
        let multiplier = match speed {
            SimulationSpeed::Normal => 1,
            SimulationSpeed::Fast => self.fast_multiplier,
            SimulationSpeed::UltraFast => self.ultra_fast_multiplier,
        }
        .max(1);
        Duration::from_millis(u64::from(self.simulation_delay_ms)) / multiplier
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_keeps_defaults() {
        let config =
            BattleConfig::from_ron_str("BattleConfig(grid: GridConfig(cols: 10), seed: 9)").unwrap();
        assert_eq!(config.grid.cols, 10);
        assert_eq!(config.grid.rows, 24);
        assert_eq!(config.seed, 9);
        assert_eq!(config.simulation_delay_ms, 50);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let err = BattleConfig::from_ron_str("BattleConfig(simulation_delay_ms: 0)").unwrap_err();
        assert!(matches!(err, BattleError::DataParseError { .. }));
    }

    #[test]
    fn test_distance_per_tick() {
        let config = BattleConfig::default();
        // 50ms per tick, 10ms per unit
        assert_eq!(config.distance_per_tick(Fixed::from_num(10)), Fixed::from_num(5));
        assert_eq!(config.distance_per_tick(Fixed::ZERO), Fixed::ZERO);
        assert_eq!(config.rotation_per_tick(Fixed::ZERO), None);
    }

    #[test]
    fn test_tick_interval_multipliers() {
        let config = BattleConfig::default();
        assert_eq!(config.tick_interval(SimulationSpeed::Normal), Duration::from_millis(50));
        assert_eq!(config.tick_interval(SimulationSpeed::Fast), Duration::from_millis(25));
        assert_eq!(
            config.tick_interval(SimulationSpeed::UltraFast),
            Duration::from_micros(12_500)
        );
    }

    #[test]
    fn test_ecm_table_clamps_levels() {
        let table = EcmTable::default();
        assert_eq!(table.scramble_chance(0, 0), 0);
        assert_eq!(table.scramble_chance(0, 1), 50);
        assert_eq!(table.scramble_chance(9, 9), 30);
        assert_eq!(EcmTable(Vec::new()).scramble_chance(1, 1), 0);
    }

    #[test]
    fn test_diminishing_returns_factor() {
        let mut rule = DiminishingReturns {
            constant: Fixed::from_num(3),
            ..DiminishingReturns::default()
        };
        assert_eq!(rule.factor(1), Fixed::ONE);
        // 2^(-1) = 0.5
        let f = rule.factor(2);
        assert!((f - Fixed::from_num(0.5)).abs() < Fixed::from_num(0.001));
        // 4^(-3/10) with the default constant
        let default = DiminishingReturns::default();
        let f = default.factor(4);
        assert!((f - Fixed::from_num(0.659_754)).abs() < Fixed::from_num(0.000_01));
        assert_eq!(default.factor(4), f);
        rule.enabled = false;
        assert_eq!(rule.factor(5), Fixed::ONE);
    }
}
