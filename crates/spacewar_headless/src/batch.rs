//! Batch battle runner for balance testing.
//!
//! Runs one scenario over a range of seeds in parallel using rayon and
//! aggregates the outcomes.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::metrics::{BatchSummary, GameMetrics};
use crate::runner::HeadlessRunner;
use crate::scenario::{Scenario, ScenarioError};

/// Configuration for a batch run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Scenario file or built-in name
    pub scenario: String,
    /// Number of battles to run
    pub game_count: u32,
    /// Maximum parallel battles (0 = use rayon default)
    pub parallel_games: u32,
    /// Output directory for results
    pub output_dir: PathBuf,
    /// Starting seed for deterministic runs
    pub seed_start: u64,
    /// Tick limit override
    pub max_ticks: Option<u64>,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            scenario: "skirmish".to_string(),
            game_count: 100,
            parallel_games: 0,
            output_dir: PathBuf::from("results"),
            seed_start: 0,
            max_ticks: None,
        }
    }
}

impl BatchConfig {
    /// Create config for a specific scenario
    pub fn new(scenario: &str, game_count: u32) -> Self {
        Self {
            scenario: scenario.to_string(),
            game_count,
            ..Default::default()
        }
    }

    /// Set output directory
    pub fn with_output(mut self, dir: PathBuf) -> Self {
        self.output_dir = dir;
        self
    }

    /// Set seed start
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed_start = seed;
        self
    }

    /// Set the tick limit of every battle
    pub fn with_max_ticks(mut self, max_ticks: u64) -> Self {
        self.max_ticks = Some(max_ticks);
        self
    }
}

/// Results from a batch run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchResults {
    /// Configuration used
    pub config: BatchConfig,
    /// Individual battle metrics, in seed order
    pub games: Vec<GameMetrics>,
    /// Aggregate summary
    pub summary: BatchSummary,
    /// Total runtime
    pub duration_seconds: f64,
    /// Errors encountered
    pub errors: Vec<BatchError>,
}

impl BatchResults {
    /// Save results to JSON file
    pub fn save(&self, path: &Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        std::fs::write(path, json)
    }

    /// Load results from JSON file
    pub fn load(path: &Path) -> std::io::Result<Self> {
        let json = std::fs::read_to_string(path)?;
        serde_json::from_str(&json).map_err(std::io::Error::other)
    }
}

/// Error during batch run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchError {
    /// Battle index
    pub game_index: u32,
    /// Seed used
    pub seed: u64,
    /// Error message
    pub message: String,
}

/// Progress tracking for batch runs
#[derive(Debug)]
pub struct BatchProgress {
    /// Total battles
    pub total: u32,
    completed: AtomicU32,
    start_time: Instant,
    partial_wins: Mutex<BTreeMap<String, u32>>,
}

impl BatchProgress {
    /// Create new progress tracker
    pub fn new(total: u32) -> Self {
        Self {
            total,
            completed: AtomicU32::new(0),
            start_time: Instant::now(),
            partial_wins: Mutex::new(BTreeMap::new()),
        }
    }

    /// Record a completed battle
    pub fn record_completion(&self, winner: Option<&str>) {
        self.completed.fetch_add(1, Ordering::Relaxed);
        if let Some(w) = winner {
            if let Ok(mut wins) = self.partial_wins.lock() {
                *wins.entry(w.to_string()).or_insert(0) += 1;
            }
        }
    }

    /// Get current completion count
    pub fn current(&self) -> u32 {
        self.completed.load(Ordering::Relaxed)
    }

    /// Get completion percentage
    pub fn percentage(&self) -> f64 {
        f64::from(self.current()) / f64::from(self.total.max(1)) * 100.0
    }

    /// Get estimated time remaining
    pub fn eta(&self) -> Duration {
        let completed = self.current();
        if completed == 0 {
            return Duration::from_secs(0);
        }
        let per_game = self.start_time.elapsed().as_secs_f64() / f64::from(completed);
        let remaining = self.total.saturating_sub(completed);
        Duration::from_secs_f64(per_game * f64::from(remaining))
    }

    /// Get current win rates
    pub fn current_win_rates(&self) -> BTreeMap<String, f64> {
        let completed = self.current();
        if completed == 0 {
            return BTreeMap::new();
        }
        match self.partial_wins.lock() {
            Ok(wins) => wins
                .iter()
                .map(|(k, v)| (k.clone(), f64::from(*v) / f64::from(completed)))
                .collect(),
            Err(_) => BTreeMap::new(),
        }
    }

    /// Log progress
    pub fn display(&self) {
        let eta = self.eta();
        info!(
            completed = self.current(),
            total = self.total,
            percent = format!("{:.1}", self.percentage()),
            eta = format!("{}m {}s", eta.as_secs() / 60, eta.as_secs() % 60),
            win_rates = ?self.current_win_rates(),
            "Batch progress"
        );
    }
}

/// Run a single battle of `scenario` with `seed`.
pub fn run_single_game(scenario: &Scenario, seed: u64) -> Result<GameMetrics, ScenarioError> {
    let scenario = scenario.clone().with_seed(seed);
    let report = HeadlessRunner::new(&scenario)?.run_to_end()?;
    Ok(GameMetrics::from_report(&report))
}

/// Run a batch of battles
pub fn run_batch(config: BatchConfig) -> Result<BatchResults, ScenarioError> {
    let mut scenario = Scenario::resolve(&config.scenario)?;
    if let Some(max_ticks) = config.max_ticks {
        scenario = scenario.with_max_ticks(max_ticks);
    }
    Ok(run_batch_with(&scenario, config))
}

/// Run a batch of battles over an already loaded scenario
pub fn run_batch_with(scenario: &Scenario, config: BatchConfig) -> BatchResults {
    let start = Instant::now();
    let progress = BatchProgress::new(config.game_count);

    info!(
        "Starting batch run: {} battles of '{}'",
        config.game_count, scenario.name
    );

    let run_all = || -> Vec<Result<GameMetrics, BatchError>> {
        (0..config.game_count)
            .into_par_iter()
            .map(|i| {
                let seed = config.seed_start.wrapping_add(u64::from(i));
                match run_single_game(scenario, seed) {
                    Ok(metrics) => {
                        progress.record_completion(metrics.winner.as_deref());
                        let completed = progress.current();
                        if completed % 10 == 0 {
                            debug!("Progress: {}/{}", completed, config.game_count);
                        }
                        if completed % 100 == 0 {
                            progress.display();
                        }
                        Ok(metrics)
                    }
                    Err(e) => {
                        warn!("Battle {} failed: {}", i, e);
                        Err(BatchError {
                            game_index: i,
                            seed,
                            message: e.to_string(),
                        })
                    }
                }
            })
            .collect()
    };

    // Configure thread pool if specified
    let results = if config.parallel_games > 0 {
        match rayon::ThreadPoolBuilder::new()
            .num_threads(config.parallel_games as usize)
            .build()
        {
            Ok(pool) => pool.install(run_all),
            Err(e) => {
                warn!(error = %e, "Failed to build thread pool, using the global one");
                run_all()
            }
        }
    } else {
        run_all()
    };

    let (games, errors): (Vec<_>, Vec<_>) = results.into_iter().partition(Result::is_ok);
    let games: Vec<GameMetrics> = games.into_iter().filter_map(Result::ok).collect();
    let errors: Vec<BatchError> = errors.into_iter().filter_map(Result::err).collect();

    let summary = BatchSummary::from_games(&games);
    let duration_seconds = start.elapsed().as_secs_f64();

    info!(
        "Batch complete: {} battles in {:.1}s ({:.1} battles/sec)",
        games.len(),
        duration_seconds,
        games.len() as f64 / duration_seconds.max(0.001)
    );

    BatchResults {
        config,
        games,
        summary,
        duration_seconds,
        errors,
    }
}

/// Verify determinism by running the same seed several times.
///
/// Runs are compared on state hash, duration and result.
pub fn verify_determinism(scenario: &Scenario, seed: u64, runs: u32) -> Result<bool, ScenarioError> {
    let results: Vec<GameMetrics> = (0..runs.max(1))
        .into_par_iter()
        .map(|_| run_single_game(scenario, seed))
        .collect::<Result<_, _>>()?;

    let first = &results[0];
    let identical = results.iter().all(|r| {
        r.final_state_hash == first.final_state_hash
            && r.duration_ticks == first.duration_ticks
            && r.winner == first.winner
            && r.reason == first.reason
    });
    if !identical {
        let hashes: Vec<u64> = results.iter().map(|r| r.final_state_hash).collect();
        warn!(seed, ?hashes, "runs diverged");
    }
    Ok(identical)
}
