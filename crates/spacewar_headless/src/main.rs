//! Headless spacewar battle runner.
//!
//! Runs battles without graphics, either to the end or controlled via JSON
//! on stdin/stdout. Designed for AI agents, CI testing and balance batches.
//!
//! # Usage
//!
//! ```bash
//! # Interactive mode - read commands from stdin
//! cargo run -p spacewar_headless
//!
//! # Run a single battle and print the result as JSON
//! cargo run -p spacewar_headless -- run --scenario skirmish --seed 7
//!
//! # Run a batch for balance testing
//! cargo run -p spacewar_headless -- batch --scenario skirmish --count 500 --output results/
//!
//! # Check that a seed always produces the same battle
//! cargo run -p spacewar_headless -- verify --scenario planet_assault --runs 5
//!
//! # Show where the layout engine puts every unit
//! cargo run -p spacewar_headless -- layout --scenario skirmish
//! ```

use std::io;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use spacewar_core::structure::Side;
use spacewar_headless::{
    batch::{run_batch, verify_determinism, BatchConfig},
    runner::{HeadlessConfig, HeadlessRunner},
    scenario::Scenario,
};

#[derive(Parser)]
#[command(name = "spacewar_headless")]
#[command(about = "Headless spacewar battle runner for AI testing and CI")]
#[command(version)]
struct Cli {
    /// Enable verbose logging to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a single battle
    Run {
        /// Scenario file or built-in name
        #[arg(short, long, default_value = "skirmish")]
        scenario: String,

        /// Override the scenario's seed
        #[arg(long)]
        seed: Option<u64>,

        /// Override the tick limit
        #[arg(long)]
        max_ticks: Option<u64>,

        /// Read JSON commands from stdin instead of running to the end
        #[arg(short, long)]
        interactive: bool,

        /// Output state after every tick command (interactive only)
        #[arg(long)]
        auto_state: bool,

        /// Also write the report (result, diagnostics, world) to this file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Run a batch of battles for balance testing
    Batch {
        /// Scenario file or built-in name
        #[arg(short, long, default_value = "skirmish")]
        scenario: String,

        /// Number of battles to run
        #[arg(short, long, default_value = "100")]
        count: u32,

        /// Maximum parallel battles (0 = auto)
        #[arg(short, long, default_value = "0")]
        parallel: u32,

        /// Output directory for results
        #[arg(short, long, default_value = "results")]
        output: PathBuf,

        /// Starting random seed
        #[arg(long, default_value = "0")]
        seed: u64,

        /// Override the tick limit
        #[arg(long)]
        max_ticks: Option<u64>,
    },

    /// Verify determinism by running same seed multiple times
    Verify {
        /// Scenario to test
        #[arg(short, long, default_value = "skirmish")]
        scenario: String,

        /// Seed to verify
        #[arg(long, default_value = "12345")]
        seed: u64,

        /// Number of verification runs
        #[arg(short, long, default_value = "5")]
        runs: u32,
    },

    /// Print the deployment layout as ASCII
    Layout {
        /// Scenario file or built-in name
        #[arg(short, long, default_value = "skirmish")]
        scenario: String,

        /// Formation template for the attacker
        #[arg(long)]
        attacker_template: Option<String>,

        /// Formation template for the defender
        #[arg(long)]
        defender_template: Option<String>,
    },
}

fn main() {
    let cli = Cli::parse();

    // Initialize logging to stderr (stdout is for results and the protocol)
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(io::stderr)
                .with_ansi(true),
        )
        .with(filter)
        .init();

    match cli.command {
        Some(Commands::Run {
            scenario,
            seed,
            max_ticks,
            interactive,
            auto_state,
            output,
        }) => {
            let scenario = load_scenario(&scenario, seed, max_ticks);
            if interactive {
                cmd_interactive(&scenario, auto_state);
            } else {
                cmd_run(&scenario, output);
            }
        }
        Some(Commands::Batch {
            scenario,
            count,
            parallel,
            output,
            seed,
            max_ticks,
        }) => {
            cmd_batch(BatchConfig {
                scenario,
                game_count: count,
                parallel_games: parallel,
                output_dir: output,
                seed_start: seed,
                max_ticks,
            });
        }
        Some(Commands::Verify {
            scenario,
            seed,
            runs,
        }) => {
            cmd_verify(&scenario, seed, runs);
        }
        Some(Commands::Layout {
            scenario,
            attacker_template,
            defender_template,
        }) => {
            cmd_layout(&scenario, attacker_template, defender_template);
        }
        None => {
            // Default: interactive mode
            let scenario = load_scenario("skirmish", None, None);
            cmd_interactive(&scenario, false);
        }
    }
}

fn fail(message: &str) -> ! {
    tracing::error!("{message}");
    eprintln!("FATAL: {message}");
    std::process::exit(1);
}

fn load_scenario(reference: &str, seed: Option<u64>, max_ticks: Option<u64>) -> Scenario {
    let mut scenario = match Scenario::resolve(reference) {
        Ok(s) => s,
        Err(e) => fail(&format!("Failed to load scenario '{reference}': {e}")),
    };
    if let Some(seed) = seed {
        scenario = scenario.with_seed(seed);
    }
    if let Some(max_ticks) = max_ticks {
        scenario = scenario.with_max_ticks(max_ticks);
    }
    tracing::info!(
        scenario = %scenario.name,
        seed = scenario.config.seed,
        max_ticks = scenario.config.max_ticks,
        "Scenario loaded"
    );
    scenario
}

fn deploy(scenario: &Scenario) -> HeadlessRunner {
    match HeadlessRunner::new(scenario) {
        Ok(r) => r,
        Err(e) => fail(&format!("Failed to deploy scenario: {e}")),
    }
}

/// Interactive JSON session on stdin/stdout
fn cmd_interactive(scenario: &Scenario, auto_state: bool) {
    let mut runner = deploy(scenario).with_config(HeadlessConfig {
        auto_state_output: auto_state,
    });
    let stdin = io::stdin();
    if let Err(e) = runner.run(stdin.lock(), io::stdout().lock()) {
        fail(&format!("Session failed: {e}"));
    }
}

/// Run one battle to the end and print its result
fn cmd_run(scenario: &Scenario, output: Option<PathBuf>) {
    let report = match deploy(scenario).run_to_end() {
        Ok(r) => r,
        Err(e) => fail(&format!("Battle failed: {e}")),
    };

    match serde_json::to_string_pretty(&report.result) {
        Ok(json) => println!("{json}"),
        Err(e) => fail(&format!("Failed to encode result: {e}")),
    }

    eprintln!("Ticks: {}", report.result.ticks);
    eprintln!(
        "Winner: {} ({:?})",
        report.result.winner_player.as_deref().unwrap_or("draw"),
        report.result.reason
    );
    for (tick, diagnostic) in report.diagnostics.iter().take(10) {
        eprintln!("  [tick {tick}] {diagnostic:?}");
    }
    if report.diagnostics.len() > 10 {
        eprintln!("  ... and {} more diagnostics", report.diagnostics.len() - 10);
    }
    eprintln!("State hash: {:016x}", report.final_state_hash);

    if let Some(path) = output {
        let written = serde_json::to_string_pretty(&report)
            .map_err(io::Error::other)
            .and_then(|json| std::fs::write(&path, json));
        if let Err(e) = written {
            fail(&format!("Failed to write report '{}': {e}", path.display()));
        }
        eprintln!("Report saved to: {}", path.display());
    }
}

/// Run batch of battles for balance testing
fn cmd_batch(config: BatchConfig) {
    let num_cpus = std::thread::available_parallelism()
        .map(|p| p.get())
        .unwrap_or(1);
    tracing::info!(
        scenario = %config.scenario,
        count = config.game_count,
        parallel = config.parallel_games,
        seed = config.seed_start,
        output = %config.output_dir.display(),
        cpus_available = num_cpus,
        max_ticks = ?config.max_ticks,
        "Batch configuration"
    );

    if let Err(e) = std::fs::create_dir_all(&config.output_dir) {
        fail(&format!(
            "Cannot create output directory '{}': {e}",
            config.output_dir.display()
        ));
    }
    let output = config.output_dir.clone();

    let results = match run_batch(config) {
        Ok(r) => r,
        Err(e) => fail(&format!("Batch failed: {e}")),
    };

    let results_path = output.join("batch_results.json");
    if let Err(e) = results.save(&results_path) {
        fail(&format!("Failed to save results: {e}"));
    }

    // Print summary
    eprintln!("\n{}", "=".repeat(50));
    eprintln!("BATCH COMPLETE");
    eprintln!("{}", "=".repeat(50));
    eprintln!("Battles fought: {}", results.games.len());
    if !results.errors.is_empty() {
        eprintln!("Battles FAILED: {}", results.errors.len());
    }
    eprintln!("Duration: {:.1}s", results.duration_seconds);
    eprintln!(
        "Throughput: {:.1} battles/sec",
        results.games.len() as f64 / results.duration_seconds.max(0.001)
    );
    eprintln!("\nWin Rates:");
    for (player, rate) in &results.summary.win_rates {
        eprintln!("  {}: {:.1}%", player, rate * 100.0);
    }
    eprintln!("  draws: {}", results.summary.draws);
    eprintln!("\nEndings:");
    for (reason, count) in &results.summary.reasons {
        eprintln!("  {reason}: {count}");
    }

    if !results.errors.is_empty() {
        eprintln!("\nBATTLE FAILURES:");
        for error in results.errors.iter().take(10) {
            eprintln!(
                "  Battle {} (seed {}): {}",
                error.game_index, error.seed, error.message
            );
        }
        if results.errors.len() > 10 {
            eprintln!("  ... and {} more failures", results.errors.len() - 10);
        }
    }

    if let Some(player) = results.summary.dominant_player(0.1) {
        eprintln!("\nBalance: {player} wins clearly more than half of the battles");
    }
    eprintln!("\nResults saved to: {}", results_path.display());
}

/// Verify determinism
fn cmd_verify(scenario: &str, seed: u64, runs: u32) {
    tracing::info!(
        "Verifying determinism: {} with seed {} ({} runs)",
        scenario,
        seed,
        runs
    );
    let scenario = load_scenario(scenario, None, None);

    match verify_determinism(&scenario, seed, runs) {
        Ok(true) => eprintln!("PASS: All {runs} runs produced identical results"),
        Ok(false) => {
            eprintln!("FAIL: Non-determinism detected!");
            std::process::exit(1);
        }
        Err(e) => fail(&format!("Verification failed: {e}")),
    }
}

/// Print the deployment of both sides
fn cmd_layout(reference: &str, attacker: Option<String>, defender: Option<String>) {
    let mut scenario = load_scenario(reference, None, None);
    if attacker.is_some() {
        scenario.setup.attacker.template = attacker;
    }
    if defender.is_some() {
        scenario.setup.defender.template = defender;
    }

    let runner = deploy(&scenario);
    let sim = runner.simulation();
    print!("{}", sim.occupancy().render(sim.grid()));

    for side in Side::BOTH {
        let units: u32 = sim.registry().units_of(side).map(|u| u.count).sum();
        let template = scenario.setup.side(side).template.as_deref().unwrap_or("(anchor)");
        eprintln!("{side:?}: {units} units deployed, formation {template}");
    }
    for unplaced in &sim.battle().unplaced {
        eprintln!(
            "  unplaced: {} x{} ({:?})",
            unplaced.tech_id, unplaced.count, unplaced.side
        );
    }
    eprintln!("Legend: . free  f fighter  C cruiser  c cruiser edge  # large unit");
}
