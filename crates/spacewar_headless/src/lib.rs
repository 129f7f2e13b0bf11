//! Headless battle runner for scenario testing and CI verification.
//!
//! This crate loads battle scenarios from RON and runs them without
//! graphics. It enables:
//!
//! - **AI testing**: A controller can fight a battle through JSON commands
//! - **Balance testing**: Many seeds of one scenario in parallel
//! - **CI verification**: Determinism checks on final state hashes
//!
//! # Protocol
//!
//! Interactive sessions use JSON lines (one JSON object per line):
//!
//! - **stdin**: Commands from the controller (tick, formation, retreat...)
//! - **stdout**: State updates and responses (JSON)
//! - **stderr**: Logs (human-readable)
//!
//! See the [`protocol`] module for every command and response.
//!
//! # Example
//!
//! ```bash
//! # Run interactively
//! echo '{"cmd":"tick","count":60}' | cargo run -p spacewar_headless -- run --interactive
//!
//! # Run a scenario to the end and print the result
//! cargo run -p spacewar_headless -- run --scenario planet_assault
//!
//! # Verify determinism
//! cargo run -p spacewar_headless -- verify --scenario skirmish --runs 5
//! ```

pub mod batch;
pub mod metrics;
pub mod protocol;
pub mod runner;
pub mod scenario;

pub use batch::{run_batch, BatchConfig, BatchResults};
pub use metrics::{BatchSummary, GameMetrics, SideMetrics};
pub use protocol::{Command, Response};
pub use runner::{HeadlessConfig, HeadlessRunner, RunReport};
pub use scenario::{Scenario, ScenarioError};
