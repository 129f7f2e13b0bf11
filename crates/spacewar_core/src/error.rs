//! Error types for the battle simulation.
//!
//! Errors here are returned from public API calls made *between* ticks
//! (loading data, issuing commands in the wrong phase). Problems detected
//! while a tick runs never surface as errors; they are reported through
//! [`crate::diagnostics`] instead.

use thiserror::Error;

use crate::battle::BattlePhase;
use crate::structure::StructureId;

/// Result type alias using [`BattleError`].
pub type Result<T> = std::result::Result<T, BattleError>;

/// Top-level error type for battle engine API calls.
#[derive(Debug, Error)]
pub enum BattleError {
    /// Data file parsing error.
    #[error("Failed to parse {what}: {message}")]
    DataParseError {
        /// Which document failed to parse (catalog, config, template...).
        what: String,
        /// Error message.
        message: String,
    },

    /// A structure handle does not refer to a live structure.
    #[error("Structure not found: {0}")]
    StructureNotFound(StructureId),

    /// Command is not valid in the current battle phase.
    #[error("Command '{command}' is not allowed in phase {phase:?}")]
    InvalidPhase {
        /// The rejected command.
        command: String,
        /// Phase the battle was in.
        phase: BattlePhase,
    },

    /// The battle does not allow retreating.
    #[error("Retreat is not allowed in this battle")]
    RetreatNotAllowed,

    /// The named layout template does not exist.
    #[error("Unknown layout template: {0}")]
    UnknownLayout(String),

    /// Snapshot encoding failed.
    #[error("Failed to encode snapshot: {0}")]
    SnapshotEncoding(String),
}
