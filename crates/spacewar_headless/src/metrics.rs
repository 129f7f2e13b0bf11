//! Battle metrics collection for balance analysis.
//!
//! Flattens finished battles into per-player records and aggregates them
//! across a batch.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use spacewar_core::battle::{BattleStatistics, ConclusionReason};
use spacewar_core::outcome::SideOutcome;
use spacewar_core::structure::Side;

use crate::runner::RunReport;

/// Complete metrics for a single battle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameMetrics {
    /// Scenario name.
    pub scenario: String,
    /// Random seed used.
    pub seed: u64,
    /// Battle duration in ticks.
    pub duration_ticks: u64,
    /// Winning player (None = draw).
    pub winner: Option<String>,
    /// Winning side.
    pub winning_side: Option<Side>,
    /// How the battle ended.
    pub reason: ConclusionReason,
    /// Attacker metrics.
    pub attacker: SideMetrics,
    /// Defender metrics.
    pub defender: SideMetrics,
    /// A virus bomb reached the planet.
    pub planet_infected: bool,
    /// Number of diagnostics raised.
    pub diagnostics: usize,
    /// Final simulation state hash (for determinism validation).
    pub final_state_hash: u64,
}

impl GameMetrics {
    /// Extract the metrics of a finished run.
    #[must_use]
    pub fn from_report(report: &RunReport) -> Self {
        let result = &report.result;
        Self {
            scenario: report.scenario.clone(),
            seed: report.seed,
            duration_ticks: result.ticks,
            winner: result.winner_player.clone(),
            winning_side: result.winner,
            reason: result.reason,
            attacker: SideMetrics::from(&result.attacker),
            defender: SideMetrics::from(&result.defender),
            planet_infected: result.planet_infected,
            diagnostics: report.diagnostics.len(),
            final_state_hash: report.final_state_hash,
        }
    }

    /// Metrics of one side.
    #[must_use]
    pub const fn side(&self, side: Side) -> &SideMetrics {
        match side {
            Side::Attacker => &self.attacker,
            Side::Defender => &self.defender,
        }
    }
}

/// Metrics for one side of a battle.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SideMetrics {
    /// Commanding player.
    pub player: String,
    /// Raw statistics.
    pub statistics: BattleStatistics,
    /// Units left in the arena.
    pub survivors: u32,
    /// Units that escaped.
    pub escaped: u32,
    /// Units that never got onto the grid.
    pub unplaced: u32,
    /// Kill/loss ratio.
    pub kd_ratio: f64,
}

impl From<&SideOutcome> for SideMetrics {
    fn from(outcome: &SideOutcome) -> Self {
        let stats = &outcome.statistics;
        // Flawless wins count as one loss
        let kd_ratio = if stats.kills == 0 && stats.losses == 0 {
            1.0
        } else {
            stats.kills as f64 / stats.losses.max(1) as f64
        };
        Self {
            player: outcome.player.clone(),
            statistics: *stats,
            survivors: outcome.survivors,
            escaped: outcome.escaped,
            unplaced: outcome.unplaced,
            kd_ratio,
        }
    }
}

/// Summary statistics across multiple battles.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchSummary {
    /// Total battles fought.
    pub total_games: u32,
    /// Battles won by each player.
    pub wins_by_player: BTreeMap<String, u32>,
    /// Win rates by player.
    pub win_rates: BTreeMap<String, f64>,
    /// Draws count.
    pub draws: u32,
    /// How many battles ended for each reason.
    pub reasons: BTreeMap<String, u32>,
    /// Average battle duration in ticks.
    pub avg_duration_ticks: f64,
    /// Shortest battle.
    pub min_duration_ticks: u64,
    /// Longest battle.
    pub max_duration_ticks: u64,

    // === Aggregated Stats ===
    /// Average kills per battle by player.
    pub avg_kills: BTreeMap<String, f64>,
    /// Average damage dealt per battle by player.
    pub avg_damage_dealt: BTreeMap<String, f64>,
    /// Average shots fired per battle by player.
    pub avg_shots_fired: BTreeMap<String, f64>,
    /// Average K/D ratio by player.
    pub avg_kd_ratio: BTreeMap<String, f64>,
    /// Battles in which the planet got infected.
    pub planets_infected: u32,
}

#[derive(Default)]
struct PlayerTotals {
    games: u32,
    kills: u64,
    damage_dealt: u64,
    shots_fired: u64,
    kd_sum: f64,
}

impl BatchSummary {
    /// Calculate summary from a list of battle metrics.
    #[must_use]
    pub fn from_games(games: &[GameMetrics]) -> Self {
        if games.is_empty() {
            return Self::default();
        }

        let mut summary = Self {
            total_games: games.len() as u32,
            min_duration_ticks: u64::MAX,
            ..Default::default()
        };
        let mut duration_sum = 0u64;
        let mut totals: BTreeMap<String, PlayerTotals> = BTreeMap::new();

        for game in games {
            // Duration stats
            duration_sum += game.duration_ticks;
            summary.min_duration_ticks = summary.min_duration_ticks.min(game.duration_ticks);
            summary.max_duration_ticks = summary.max_duration_ticks.max(game.duration_ticks);

            // Win tracking
            match &game.winner {
                Some(winner) => *summary.wins_by_player.entry(winner.clone()).or_default() += 1,
                None => summary.draws += 1,
            }
            *summary.reasons.entry(format!("{:?}", game.reason)).or_default() += 1;
            if game.planet_infected {
                summary.planets_infected += 1;
            }

            // Per-player aggregation
            for side in Side::BOTH {
                let metrics = game.side(side);
                let entry = totals.entry(metrics.player.clone()).or_default();
                entry.games += 1;
                entry.kills += metrics.statistics.kills;
                entry.damage_dealt += metrics.statistics.damage_dealt;
                entry.shots_fired += metrics.statistics.shots_fired;
                entry.kd_sum += metrics.kd_ratio;
            }
        }

        summary.avg_duration_ticks = duration_sum as f64 / games.len() as f64;

        for (player, wins) in &summary.wins_by_player {
            summary
                .win_rates
                .insert(player.clone(), f64::from(*wins) / f64::from(summary.total_games));
        }

        for (player, t) in totals {
            let n = f64::from(t.games);
            summary.avg_kills.insert(player.clone(), t.kills as f64 / n);
            summary.avg_damage_dealt.insert(player.clone(), t.damage_dealt as f64 / n);
            summary.avg_shots_fired.insert(player.clone(), t.shots_fired as f64 / n);
            summary.avg_kd_ratio.insert(player, t.kd_sum / n);
        }

        summary
    }

    /// Check if win rates are within `threshold` of an even split.
    #[must_use]
    pub fn is_balanced(&self, threshold: f64) -> bool {
        self.win_rates.values().all(|rate| (rate - 0.5).abs() <= threshold)
    }

    /// The player winning clearly more than half of the battles, if any.
    #[must_use]
    pub fn dominant_player(&self, threshold: f64) -> Option<&String> {
        self.win_rates
            .iter()
            .find(|(_, rate)| **rate > 0.5 + threshold)
            .map(|(player, _)| player)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn side(player: &str, kills: u64, losses: u64) -> SideMetrics {
        SideMetrics::from(&SideOutcome {
            player: player.to_string(),
            statistics: BattleStatistics {
                kills,
                losses,
                damage_dealt: kills * 10,
                shots_fired: kills * 3,
                ..Default::default()
            },
            survivors: 0,
            escaped: 0,
            unplaced: 0,
        })
    }

    fn game(seed: u64, ticks: u64, winner: Option<Side>) -> GameMetrics {
        let (a_kills, d_kills) = match winner {
            Some(Side::Attacker) => (4, 1),
            Some(Side::Defender) => (1, 4),
            None => (2, 2),
        };
        let attacker = side("Empire", a_kills, d_kills);
        let defender = side("Rebels", d_kills, a_kills);
        GameMetrics {
            scenario: "test".into(),
            seed,
            duration_ticks: ticks,
            winner: winner.map(|w| match w {
                Side::Attacker => "Empire".to_string(),
                Side::Defender => "Rebels".to_string(),
            }),
            winning_side: winner,
            reason: if winner.is_some() {
                ConclusionReason::Elimination
            } else {
                ConclusionReason::Stalemate
            },
            attacker,
            defender,
            planet_infected: false,
            diagnostics: 0,
            final_state_hash: seed,
        }
    }

    #[test]
    fn test_kd_ratio() {
        assert!((side("A", 6, 3).kd_ratio - 2.0).abs() < f64::EPSILON);
        assert!((side("A", 5, 0).kd_ratio - 5.0).abs() < f64::EPSILON);
        assert!((side("A", 0, 0).kd_ratio - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_empty_summary() {
        let summary = BatchSummary::from_games(&[]);
        assert_eq!(summary.total_games, 0);
        assert!(summary.win_rates.is_empty());
    }

    #[test]
    fn test_batch_summary() {
        let games = vec![
            game(1, 100, Some(Side::Attacker)),
            game(2, 300, Some(Side::Attacker)),
            game(3, 200, Some(Side::Defender)),
            game(4, 400, None),
        ];
        let summary = BatchSummary::from_games(&games);

        assert_eq!(summary.total_games, 4);
        assert_eq!(summary.draws, 1);
        assert_eq!(summary.wins_by_player["Empire"], 2);
        assert!((summary.win_rates["Empire"] - 0.5).abs() < 1e-9);
        assert!((summary.win_rates["Rebels"] - 0.25).abs() < 1e-9);
        assert_eq!(summary.min_duration_ticks, 100);
        assert_eq!(summary.max_duration_ticks, 400);
        assert!((summary.avg_duration_ticks - 250.0).abs() < 1e-9);
        assert_eq!(summary.reasons["Elimination"], 3);
        assert_eq!(summary.reasons["Stalemate"], 1);
        // Empire kills: 4 + 4 + 1 + 2
        assert!((summary.avg_kills["Empire"] - 2.75).abs() < 1e-9);
    }

    #[test]
    fn test_balance_checks() {
        let games = vec![
            game(1, 100, Some(Side::Attacker)),
            game(2, 100, Some(Side::Attacker)),
            game(3, 100, Some(Side::Attacker)),
            game(4, 100, Some(Side::Defender)),
        ];
        let summary = BatchSummary::from_games(&games);
        assert!(!summary.is_balanced(0.1));
        assert!(summary.is_balanced(0.3));
        assert_eq!(summary.dominant_player(0.1).map(String::as_str), Some("Empire"));
        assert_eq!(summary.dominant_player(0.3), None);
    }
}
