//! Determinism testing utilities.
//!
//! Provides a harness for verifying that a battle produces identical
//! results given identical inputs.
//!
//! # Testing Strategy
//!
//! Replays and headless balance runs rely on a battle being 100%
//! reproducible from its setup and seed. Sources of non-determinism include:
//!
//! - **Floating-point math**: positions, distances and damage multipliers
//!   use [`spacewar_core::math::Fixed`]; trigonometry is rounded into
//!   fixed-point immediately.
//!
//! - **HashMap iteration order**: the registry, occupancy and building
//!   tables are ordered maps, so iteration follows handle order.
//!
//! - **System randomness**: ECM rolls draw from a ChaCha RNG seeded from
//!   the battle configuration.
//!
//! # Test Levels
//!
//! 1. **Unit tests**: individual rules (damage, layout, scramble rolls)
//! 2. **Property tests**: random fleets must still replay exactly
//! 3. **Integration tests**: full battles are reproducible
//! 4. **Parallel tests**: running N battles in parallel all match

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::thread;

use spacewar_core::simulation::{BattleSimulation, BattleSnapshot};

/// Result of a determinism test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeterminismResult {
    /// Whether all runs produced identical results.
    pub is_deterministic: bool,
    /// Hashes from each run.
    pub hashes: Vec<u64>,
    /// Number of ticks simulated.
    pub ticks: u64,
}

impl DeterminismResult {
    /// Get all unique hashes (should be 1 for deterministic simulation).
    #[must_use]
    pub fn unique_hashes(&self) -> Vec<u64> {
        let mut unique: Vec<u64> = self.hashes.clone();
        unique.sort_unstable();
        unique.dedup();
        unique
    }

    /// Assert that the battle was deterministic, with a detailed error message.
    ///
    /// # Panics
    ///
    /// Panics if the runs produced different hashes.
    pub fn assert_deterministic(&self) {
        if !self.is_deterministic {
            let unique = self.unique_hashes();
            panic!(
                "Battle is non-deterministic!\n\
                 Runs: {}\n\
                 Ticks: {}\n\
                 Unique hashes: {} (expected 1)\n\
                 All hashes: {:?}",
                self.hashes.len(),
                self.ticks,
                unique.len(),
                self.hashes
            );
        }
    }
}

/// Result of parallel battle runs.
#[derive(Debug, Clone)]
pub struct ParallelSimResult {
    /// Final state hash from each battle.
    pub hashes: Vec<u64>,
    /// Number of ticks each battle ran.
    pub ticks: u64,
    /// Number of battles run.
    pub num_sims: usize,
}

impl ParallelSimResult {
    /// Check if all battles produced identical results.
    #[must_use]
    pub fn is_deterministic(&self) -> bool {
        self.hashes.windows(2).all(|w| w[0] == w[1])
    }

    /// Assert all battles matched.
    ///
    /// # Panics
    ///
    /// Panics if the battles produced different hashes.
    pub fn assert_deterministic(&self) {
        if !self.is_deterministic() {
            let mut unique: Vec<u64> = self.hashes.clone();
            unique.sort_unstable();
            unique.dedup();
            panic!(
                "Parallel battles diverged!\n\
                 Battles: {}\n\
                 Ticks: {}\n\
                 Unique hashes: {}\n\
                 All hashes: {:?}",
                self.num_sims,
                self.ticks,
                unique.len(),
                self.hashes
            );
        }
    }
}

/// Run a state machine multiple times and verify determinism.
///
/// # Arguments
///
/// * `runs` - Number of times to run
/// * `ticks` - Number of steps per run
/// * `setup` - Function to create the initial state
/// * `step` - Function to advance the state by one tick
/// * `hash` - Function to compute the state hash
///
/// # Example
///
/// ```ignore
/// use spacewar_test_utils::determinism::verify_determinism;
/// use spacewar_test_utils::fixtures::fleet_engagement;
///
/// let fixture = fleet_engagement();
/// let result = verify_determinism(
///     5,   // Run 5 times
///     300, // 300 ticks each
///     || fixture.simulation(),
///     |sim| { sim.tick(); },
///     |sim| sim.state_hash(),
/// );
/// result.assert_deterministic();
/// ```
pub fn verify_determinism<S, Setup, Step, HashFn>(
    runs: usize,
    ticks: u64,
    setup: Setup,
    step: Step,
    hash: HashFn,
) -> DeterminismResult
where
    Setup: Fn() -> S,
    Step: Fn(&mut S),
    HashFn: Fn(&S) -> u64,
{
    let mut hashes = Vec::with_capacity(runs);

    for _ in 0..runs {
        let mut state = setup();

        for _ in 0..ticks {
            step(&mut state);
        }

        hashes.push(hash(&state));
    }

    let is_deterministic = hashes.windows(2).all(|w| w[0] == w[1]);
    tracing::debug!(runs, ticks, is_deterministic, "determinism check finished");

    DeterminismResult {
        is_deterministic,
        hashes,
        ticks,
    }
}

/// Run a battle twice with identical setup and compare the final state
/// hashes.
pub fn verify_battle_determinism<F>(setup_fn: F, num_ticks: u64) -> bool
where
    F: Fn() -> BattleSimulation,
{
    verify_determinism(
        2,
        num_ticks,
        &setup_fn,
        |sim| {
            sim.tick();
        },
        BattleSimulation::state_hash,
    )
    .is_deterministic
}

/// Run N battles on scoped threads and collect their final hashes.
///
/// Catches non-determinism that only shows up under thread scheduling
/// variations or different memory layouts.
///
/// # Panics
///
/// Panics if a battle thread panics.
pub fn run_parallel_battles<F>(setup_fn: F, num_sims: usize, num_ticks: u64) -> ParallelSimResult
where
    F: Fn() -> BattleSimulation + Sync,
{
    let hashes = thread::scope(|s| {
        let handles: Vec<_> = (0..num_sims)
            .map(|_| {
                s.spawn(|| {
                    let mut sim = setup_fn();
                    for _ in 0..num_ticks {
                        sim.tick();
                    }
                    sim.state_hash()
                })
            })
            .collect();

        handles
            .into_iter()
            .map(|h| h.join().expect("battle thread panicked"))
            .collect()
    });

    ParallelSimResult {
        hashes,
        ticks: num_ticks,
        num_sims,
    }
}

/// Compare two battle runs tick-by-tick, finding the first divergence.
///
/// # Returns
///
/// `None` if the runs stay identical, `Some(tick)` if they diverge at that
/// tick.
pub fn find_first_divergence<F>(setup_fn: F, num_ticks: u64) -> Option<u64>
where
    F: Fn() -> BattleSimulation,
{
    let mut sim1 = setup_fn();
    let mut sim2 = setup_fn();

    if sim1.state_hash() != sim2.state_hash() {
        return Some(0);
    }

    for tick in 1..=num_ticks {
        sim1.tick();
        sim2.tick();

        if sim1.state_hash() != sim2.state_hash() {
            return Some(tick);
        }
    }

    None
}

/// Verify that a snapshot survives a bincode round-trip unchanged.
pub fn verify_snapshot_roundtrip<F>(setup_fn: F, num_ticks: u64) -> bool
where
    F: Fn() -> BattleSimulation,
{
    let mut sim = setup_fn();
    for _ in 0..num_ticks {
        sim.tick();
    }

    let snapshot = sim.snapshot();
    let Ok(bytes) = snapshot.to_bytes() else {
        return false;
    };
    BattleSnapshot::from_bytes(&bytes).is_ok_and(|restored| restored == snapshot)
}

/// Compute a simple hash for any hashable value.
pub fn compute_hash<T: Hash>(value: &T) -> u64 {
    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}

/// Proptest strategies for battle inputs.
pub mod strategies {
    use proptest::prelude::*;
    use spacewar_core::layout::LayoutTemplate;
    use spacewar_core::math::{Fixed, Vec2Fixed};
    use spacewar_core::structure::Category;

    /// A fixed-point coordinate inside a typical battle rectangle.
    pub fn arb_fixed_position() -> impl Strategy<Value = Fixed> {
        (0i32..1000i32).prop_map(Fixed::from_num)
    }

    /// A fixed-point 2D position.
    pub fn arb_vec2_position() -> impl Strategy<Value = Vec2Fixed> {
        (arb_fixed_position(), arb_fixed_position()).prop_map(|(x, y)| Vec2Fixed::new(x, y))
    }

    /// Any placeable category.
    pub fn arb_category() -> impl Strategy<Value = Category> {
        prop_oneof![
            Just(Category::Fighter),
            Just(Category::Cruiser),
            Just(Category::Battleship),
            Just(Category::Station),
            Just(Category::Projector),
            Just(Category::Shield),
        ]
    }

    /// Squadron sizes for fighter splitting.
    pub fn arb_fighter_counts(max_groups: usize) -> impl Strategy<Value = Vec<u32>> {
        proptest::collection::vec(1u32..60, 1..=max_groups)
    }

    /// `(category, count)` groups of a fleet.
    pub fn arb_fleet(max_groups: usize) -> impl Strategy<Value = Vec<(Category, u32)>> {
        proptest::collection::vec((arb_category(), 1u32..8), 1..=max_groups)
    }

    /// A template with slots inside a `cols x rows` region.
    pub fn arb_template(cols: i32, rows: i32) -> impl Strategy<Value = LayoutTemplate> {
        (
            proptest::collection::vec((0..cols, 0..rows), 0..6),
            proptest::collection::vec((0..cols, 0..rows), 0..10),
        )
            .prop_map(|(large_slots, fighter_slots)| LayoutTemplate {
                name: "generated".into(),
                large_slots,
                fighter_slots,
            })
    }

    /// Fleet sizes for the sample catalog: fighters, cruisers, battleships.
    pub fn arb_fleet_sizes() -> impl Strategy<Value = (u32, u32, u32)> {
        (0u32..30, 0u32..4, 0u32..2)
    }
}
