//! Compiled arrangement: chord list plus a precomputed step → chord table.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::chord::Chord;
use super::music::Key;
use super::time_signature::TimeSignature;

/// One contiguous run of steps covered by a single chord.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepMapEntry {
    /// First step (inclusive)
    pub start: u32,
    /// Last step (exclusive)
    pub end: u32,
    pub chord_index: usize,
}

impl StepMapEntry {
    pub fn len(&self) -> u32 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.end == self.start
    }
}

/// A run of consecutive chords sharing a section id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Section {
    pub id: String,
    pub label: String,
    pub start_step: u32,
    pub end_step: u32,
    pub first_chord: usize,
    pub chord_count: usize,
    /// How many earlier sections carry the same label
    pub repeat_index: u32,
    pub seamless: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArrangementError {
    /// A step in `[0, total)` is not covered
    Gap { step: u32 },
    /// Two entries claim the same step
    Overlap { step: u32 },
    /// An entry points past the chord list
    BadChordIndex { index: usize },
    /// Entries do not end at `total_steps`
    LengthMismatch { covered: u32, total: u32 },
}

impl fmt::Display for ArrangementError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArrangementError::Gap { step } => write!(f, "step {} is not covered by the step map", step),
            ArrangementError::Overlap { step } => write!(f, "step {} is covered twice", step),
            ArrangementError::BadChordIndex { index } => write!(f, "chord index {} out of range", index),
            ArrangementError::LengthMismatch { covered, total } => {
                write!(f, "step map covers {} steps, arrangement has {}", covered, total)
            }
        }
    }
}

impl std::error::Error for ArrangementError {}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Arrangement {
    pub chords: Vec<Chord>,
    pub step_map: Vec<StepMapEntry>,
    pub sections: Vec<Section>,
    pub total_steps: u32,
    pub time_signature: TimeSignature,
    pub key: Key,
    pub minor: bool,
}

impl Default for Arrangement {
    fn default() -> Self {
        Self::empty(TimeSignature::default(), Key::default(), false)
    }
}

impl Arrangement {
    pub fn empty(time_signature: TimeSignature, key: Key, minor: bool) -> Self {
        Self {
            chords: Vec::new(),
            step_map: Vec::new(),
            sections: Vec::new(),
            total_steps: 0,
            time_signature,
            key,
            minor,
        }
    }

    /// Lay chords end to end. Each chord occupies `round(beats × steps_per_beat)`
    /// steps, at least one.
    pub fn compile(chords: Vec<Chord>, time_signature: TimeSignature, key: Key, minor: bool) -> Self {
        let spb = time_signature.steps_per_beat() as f32;
        let mut step_map = Vec::with_capacity(chords.len());
        let mut cursor = 0u32;
        for (i, chord) in chords.iter().enumerate() {
            let len = ((chord.beats * spb).round() as u32).max(1);
            step_map.push(StepMapEntry {
                start: cursor,
                end: cursor + len,
                chord_index: i,
            });
            cursor += len;
        }

        let mut sections: Vec<Section> = Vec::new();
        for (i, (chord, entry)) in chords.iter().zip(&step_map).enumerate() {
            match sections.last_mut() {
                Some(s) if s.id == chord.section_id => {
                    s.end_step = entry.end;
                    s.chord_count += 1;
                }
                _ => {
                    let repeat_index = sections.iter().filter(|s| s.label == chord.section_label).count() as u32;
                    sections.push(Section {
                        id: chord.section_id.clone(),
                        label: chord.section_label.clone(),
                        start_step: entry.start,
                        end_step: entry.end,
                        first_chord: i,
                        chord_count: 1,
                        repeat_index,
                        seamless: chord.seamless,
                    });
                }
            }
        }

        Self {
            chords,
            step_map,
            sections,
            total_steps: cursor,
            time_signature,
            key,
            minor,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.total_steps == 0 || self.step_map.is_empty()
    }

    /// Step map entry covering `step` (wrapped to the loop).
    pub fn entry_at(&self, step: u64) -> Option<&StepMapEntry> {
        if self.is_empty() {
            return None;
        }
        let local = (step % self.total_steps as u64) as u32;
        let idx = self.step_map.partition_point(|e| e.end <= local);
        self.step_map.get(idx).filter(|e| e.start <= local)
    }

    /// Chord at `step` and the step offset within it.
    pub fn chord_at(&self, step: u64) -> Option<(&Chord, u32)> {
        let entry = self.entry_at(step)?;
        let local = (step % self.total_steps as u64) as u32;
        self.chords.get(entry.chord_index).map(|c| (c, local - entry.start))
    }

    pub fn section_at(&self, step: u64) -> Option<&Section> {
        if self.is_empty() {
            return None;
        }
        let local = (step % self.total_steps as u64) as u32;
        self.sections.iter().find(|s| s.start_step <= local && local < s.end_step)
    }

    /// Section after the one containing `step`, wrapping to the first.
    pub fn next_section(&self, step: u64) -> Option<&Section> {
        let current = self.section_at(step)?;
        let idx = self.sections.iter().position(|s| s.start_step == current.start_step)?;
        self.sections.get((idx + 1) % self.sections.len())
    }

    pub fn steps_per_measure(&self) -> u32 {
        self.time_signature.steps_per_measure()
    }

    /// Check that the step map covers `[0, total_steps)` exactly once.
    pub fn validate(&self) -> Result<(), ArrangementError> {
        let mut expected = 0u32;
        for entry in &self.step_map {
            if entry.chord_index >= self.chords.len() {
                return Err(ArrangementError::BadChordIndex { index: entry.chord_index });
            }
            if entry.start > expected {
                return Err(ArrangementError::Gap { step: expected });
            }
            if entry.start < expected {
                return Err(ArrangementError::Overlap { step: entry.start });
            }
            if entry.end <= entry.start {
                return Err(ArrangementError::Gap { step: entry.start });
            }
            expected = entry.end;
        }
        if expected != self.total_steps {
            return Err(ArrangementError::LengthMismatch {
                covered: expected,
                total: self.total_steps,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ChordQuality;

    fn four_chords() -> Arrangement {
        let chords = vec![
            Chord::new("C", 60, ChordQuality::Major, false, 4.0),
            Chord::new("F", 65, ChordQuality::Major, false, 4.0),
            Chord::new("G", 55, ChordQuality::Major, false, 4.0).with_section("b", "Chorus"),
            Chord::new("C", 60, ChordQuality::Major, false, 4.0).with_section("b", "Chorus"),
        ];
        Arrangement::compile(chords, TimeSignature::FourFour, Key::C, false)
    }

    #[test]
    fn compile_covers_every_step_once() {
        let arr = four_chords();
        assert_eq!(arr.total_steps, 64);
        assert!(arr.validate().is_ok());
        for step in 0..64u64 {
            let hits = arr
                .step_map
                .iter()
                .filter(|e| (e.start as u64) <= step && step < e.end as u64)
                .count();
            assert_eq!(hits, 1, "step {}", step);
        }
    }

    #[test]
    fn chord_at_wraps_the_loop() {
        let arr = four_chords();
        let (chord, offset) = arr.chord_at(64 + 17).unwrap();
        assert_eq!(chord.symbol, "F");
        assert_eq!(offset, 1);
        let (chord, offset) = arr.chord_at(63).unwrap();
        assert_eq!(chord.symbol, "C");
        assert_eq!(offset, 15);
    }

    #[test]
    fn sections_group_consecutive_ids() {
        let arr = four_chords();
        assert_eq!(arr.sections.len(), 2);
        assert_eq!(arr.sections[1].start_step, 32);
        assert_eq!(arr.sections[1].end_step, 64);
        assert_eq!(arr.next_section(40).unwrap().id, "main");
    }

    #[test]
    fn empty_arrangement_has_no_chords() {
        let arr = Arrangement::default();
        assert!(arr.is_empty());
        assert!(arr.chord_at(5).is_none());
        assert!(arr.validate().is_ok());
    }

    #[test]
    fn validate_detects_gap() {
        let mut arr = four_chords();
        arr.step_map[1].start += 1;
        assert_eq!(arr.validate(), Err(ArrangementError::Gap { step: 16 }));
    }

    #[test]
    fn fractional_beats_round_to_whole_steps() {
        let chords = vec![
            Chord::new("C", 60, ChordQuality::Major, false, 1.5),
            Chord::new("G", 55, ChordQuality::Major, false, 0.1),
        ];
        let arr = Arrangement::compile(chords, TimeSignature::SixEight, Key::C, false);
        assert_eq!(arr.step_map[0].len(), 3);
        assert_eq!(arr.step_map[1].len(), 1);
    }
}
