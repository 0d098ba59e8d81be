//! Events the engine releases for playback.

use serde::{Deserialize, Serialize};

use crate::{DrumVoice, InstrumentTag};

/// A single pitched note decided by a generator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoteEvent {
    /// MIDI pitch
    pub pitch: i32,
    /// 0..=1
    pub velocity: f32,
    pub duration_steps: u32,
    /// Offset from the step's dispatch time in seconds (negative = early)
    pub timing_offset: f64,
    /// Ghost/dead note
    pub muted: bool,
    pub instrument: InstrumentTag,
    /// Semitones below the target the note starts from (0 = no curl)
    pub bend: f32,
    /// Second pitch sounded with this one
    pub double_stop: Option<i32>,
}

impl NoteEvent {
    pub fn new(instrument: InstrumentTag, pitch: i32, velocity: f32, duration_steps: u32) -> Self {
        Self {
            pitch,
            velocity: velocity.clamp(0.0, 1.0),
            duration_steps: duration_steps.max(1),
            timing_offset: 0.0,
            muted: false,
            instrument,
            bend: 0.0,
            double_stop: None,
        }
    }

    pub fn with_offset(mut self, offset: f64) -> Self {
        self.timing_offset = offset;
        self
    }

    pub fn with_bend(mut self, bend: f32) -> Self {
        self.bend = bend;
        self
    }

    pub fn muted(mut self) -> Self {
        self.muted = true;
        self
    }

    pub fn frequency(&self) -> f32 {
        crate::midi_to_freq(self.pitch as f32)
    }
}

/// Sustain pedal change attached to a step.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PedalChange {
    pub down: bool,
    pub timing_offset: f64,
}

/// Everything one instrument plays on one step.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct StepSlot {
    pub notes: Vec<NoteEvent>,
    pub pedal: Vec<PedalChange>,
}

impl StepSlot {
    pub fn is_empty(&self) -> bool {
        self.notes.is_empty() && self.pedal.is_empty()
    }

    pub fn note(note: NoteEvent) -> Self {
        Self {
            notes: vec![note],
            pedal: Vec::new(),
        }
    }

    pub fn merge(&mut self, other: StepSlot) {
        self.notes.extend(other.notes);
        self.pedal.extend(other.pedal);
    }
}

/// A single drum trigger after groove processing.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DrumHit {
    pub voice: DrumVoice,
    pub velocity: f32,
    pub timing_offset: f64,
}
