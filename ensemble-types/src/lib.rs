//! # ensemble-types
//!
//! Shared data definitions for the ensemble engine: harmony, arrangement,
//! meter, groove, styles, band configuration and note events. Plain data
//! only; behaviour lives in `ensemble-engine`.

mod note;
pub mod state;

pub use note::{DrumHit, NoteEvent, PedalChange, StepSlot};

// Re-export all state types at crate root for convenience
pub use state::*;

/// Monotonic flush counter stamped on generated material.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, serde::Serialize, serde::Deserialize,
)]
#[serde(transparent)]
pub struct Epoch(u64);

impl Epoch {
    pub fn new(id: u64) -> Self {
        Self(id)
    }
    pub fn get(self) -> u64 {
        self.0
    }
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl std::fmt::Display for Epoch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
