//! Non-fatal diagnostics raised while a tick runs.
//!
//! The tick loop never returns an error. Missing catalog entries, vanished
//! rocket targets and placement failures are recorded here, logged through
//! `tracing`, and the affected action is skipped.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::structure::{Category, Side, StructureId};

/// Maximum number of diagnostics retained before the oldest are dropped.
pub const DIAGNOSTIC_CAPACITY: usize = 1024;

/// A single non-fatal problem detected during simulation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Diagnostic {
    /// A weapon port refers to a projectile the catalog does not define.
    MissingProjectile {
        /// Firing structure.
        source: StructureId,
        /// Unknown projectile id.
        projectile: String,
    },
    /// An inventory item refers to a technology with no space-entity definition.
    MissingEntityDefinition {
        /// Unknown technology id.
        tech_id: String,
    },
    /// A rocket port fired while its target had already disappeared.
    MissingRocketTarget {
        /// Firing structure.
        source: StructureId,
    },
    /// The layout engine could not fit a unit anywhere on the grid.
    PlacementFailed {
        /// Owning side.
        side: Side,
        /// Technology of the unit.
        tech_id: String,
        /// Layout category.
        category: Category,
        /// Units in the group that stayed off the grid.
        count: u32,
    },
    /// An order referenced a structure that no longer exists.
    StaleStructure {
        /// The missing handle.
        id: StructureId,
    },
}

/// Receiver for diagnostics, implemented by embedders that want to forward
/// them elsewhere (log files, debug overlays).
pub trait DiagnosticSink {
    /// Handle one diagnostic.
    fn report(&mut self, tick: u64, diagnostic: &Diagnostic);
}

/// Bounded buffer of diagnostics raised by the simulation.
#[derive(Debug, Clone, Default)]
pub struct Diagnostics {
    entries: VecDeque<(u64, Diagnostic)>,
    dropped: u64,
}

impl Diagnostics {
    /// Create an empty buffer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a diagnostic raised at `tick`.
    pub fn report(&mut self, tick: u64, diagnostic: Diagnostic) {
        tracing::warn!(tick, ?diagnostic, "battle diagnostic");
        if self.entries.len() == DIAGNOSTIC_CAPACITY {
            self.entries.pop_front();
            self.dropped += 1;
        }
        self.entries.push_back((tick, diagnostic));
    }

    /// Number of buffered diagnostics.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the buffer is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Diagnostics discarded because the buffer was full.
    #[must_use]
    pub const fn dropped(&self) -> u64 {
        self.dropped
    }

    /// Iterate buffered diagnostics without removing them.
    pub fn iter(&self) -> impl Iterator<Item = &(u64, Diagnostic)> {
        self.entries.iter()
    }

    /// Remove and return all buffered diagnostics.
    pub fn drain(&mut self) -> Vec<(u64, Diagnostic)> {
        self.entries.drain(..).collect()
    }

    /// Forward all buffered diagnostics to `sink`, emptying the buffer.
    pub fn flush_into(&mut self, sink: &mut dyn DiagnosticSink) {
        for (tick, diagnostic) in self.entries.drain(..) {
            sink.report(tick, &diagnostic);
        }
    }
}

impl DiagnosticSink for Vec<(u64, Diagnostic)> {
    fn report(&mut self, tick: u64, diagnostic: &Diagnostic) {
        self.push((tick, diagnostic.clone()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_is_bounded() {
        let mut diags = Diagnostics::new();
        for i in 0..(DIAGNOSTIC_CAPACITY as u64 + 5) {
            diags.report(i, Diagnostic::StaleStructure { id: StructureId(i) });
        }
        assert_eq!(diags.len(), DIAGNOSTIC_CAPACITY);
        assert_eq!(diags.dropped(), 5);
        let first = diags.iter().next().map(|(tick, _)| *tick);
        assert_eq!(first, Some(5));
    }

    #[test]
    fn test_flush_into_sink() {
        let mut diags = Diagnostics::new();
        diags.report(
            3,
            Diagnostic::MissingEntityDefinition {
                tech_id: "Ghost".into(),
            },
        );
        let mut sink: Vec<(u64, Diagnostic)> = Vec::new();
        diags.flush_into(&mut sink);
        assert!(diags.is_empty());
        assert_eq!(sink.len(), 1);
        assert_eq!(sink[0].0, 3);
    }
}
