//! Per-instrument note generators.
//!
//! Each generator owns its rolling memory and its own [`GenRng`]; the
//! pipeline calls [`Generator::generate`] once per step with the chord
//! context and everything it needs to know about the rest of the band.

pub mod bass;
pub mod comping;
pub mod harmonies;
pub mod resolution;
pub mod scales;
pub mod soloist;

use ensemble_types::{
    Arrangement, BandConfig, Chord, InstrumentTag, PerformanceState, StepInfo, StepSlot, TimeSignature,
};

use crate::error::GenerationError;

pub use bass::BassGenerator;
pub use comping::CompingGenerator;
pub use harmonies::HarmonyGenerator;
pub use soloist::SoloistGenerator;

/// Read-only view handed to a generator for one step.
#[derive(Debug, Clone, Copy)]
pub struct GenContext<'a> {
    pub config: &'a BandConfig,
    pub performance: PerformanceState,
    /// Absolute step
    pub step: u64,
    pub step_in_chord: u32,
    /// Length of the active chord in steps
    pub chord_steps: u32,
    pub chord_index: usize,
    /// Most recent bass pitch the pipeline has seen
    pub bass_pitch: Option<i32>,
    /// Most recent soloist pitch the pipeline has seen
    pub soloist_pitch: Option<i32>,
    /// A soloist note is still sounding at this step
    pub soloist_busy: bool,
}

impl<'a> GenContext<'a> {
    pub fn arrangement(&self) -> &'a Arrangement {
        &self.config.arrangement
    }

    pub fn time_signature(&self) -> TimeSignature {
        self.config.time_signature
    }

    pub fn steps_per_beat(&self) -> u32 {
        self.config.time_signature.steps_per_beat()
    }

    pub fn steps_per_measure(&self) -> u32 {
        self.config.time_signature.steps_per_measure()
    }

    pub fn step_info(&self) -> StepInfo {
        self.config.time_signature.step_info(self.step)
    }

    pub fn intensity(&self) -> f32 {
        self.performance.intensity
    }

    pub fn complexity(&self) -> f32 {
        self.performance.complexity
    }

    /// Steps into the 4-measure harmonic cycle.
    pub fn cycle_step(&self) -> u32 {
        let cycle = self.steps_per_measure() as u64 * 4;
        (self.step % cycle.max(1)) as u32
    }
}

/// One band member's note source.
pub trait Generator: Send {
    fn instrument(&self) -> InstrumentTag;

    /// Material for `ctx.step`. An empty slot means silence.
    fn generate(&mut self, chord: &Chord, next: Option<&Chord>, ctx: &GenContext) -> Result<StepSlot, GenerationError>;

    /// Forget all phrase and motif memory.
    fn reset(&mut self);
}

/// Rejects chords no generator can voice.
pub(crate) fn check_chord(instrument: InstrumentTag, chord: &Chord, step: u64) -> Result<(), GenerationError> {
    if chord.intervals.is_empty() {
        return Err(GenerationError::new(
            instrument,
            step,
            format!("chord '{}' has no intervals", chord.symbol),
        ));
    }
    Ok(())
}

/// Convert a length in beats to whole steps (at least one).
pub(crate) fn beats_to_steps(beats: f32, steps_per_beat: u32) -> u32 {
    ((beats * steps_per_beat as f32).round() as u32).max(1)
}
