//! Compiled chord data shared by every generator.

use serde::{Deserialize, Serialize};

use super::music::{midi_to_freq, pitch_class};

/// Chord quality as recognised from a chord symbol suffix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum ChordQuality {
    #[default]
    Major,
    Minor,
    Dim,
    HalfDim,
    Aug,
    AugMaj7,
    Maj7,
    Dominant7,
    Sus4,
    Sus2,
    Add9,
    Six,
    MinorSix,
    Nine,
    Maj9,
    Minor9,
    Eleven,
    Minor11,
    Maj11,
    Maj7Sharp11,
    Thirteen,
    Minor13,
    Maj13,
    Alt,
    SevenFlat9,
    SevenSharp9,
    SevenSharp11,
    SevenFlat13,
    Power,
}

impl ChordQuality {
    pub fn is_minor(&self) -> bool {
        matches!(
            self,
            ChordQuality::Minor
                | ChordQuality::MinorSix
                | ChordQuality::Minor9
                | ChordQuality::Minor11
                | ChordQuality::Minor13
                | ChordQuality::Dim
                | ChordQuality::HalfDim
        )
    }

    /// Dominant-function qualities (a flat seventh over a major third).
    pub fn is_dominant_family(&self) -> bool {
        matches!(
            self,
            ChordQuality::Dominant7
                | ChordQuality::Nine
                | ChordQuality::Eleven
                | ChordQuality::Thirteen
                | ChordQuality::Alt
                | ChordQuality::SevenFlat9
                | ChordQuality::SevenSharp9
                | ChordQuality::SevenSharp11
                | ChordQuality::SevenFlat13
        )
    }

    pub fn is_major_seventh_family(&self) -> bool {
        matches!(
            self,
            ChordQuality::Maj7
                | ChordQuality::Maj9
                | ChordQuality::Maj11
                | ChordQuality::Maj13
                | ChordQuality::Maj7Sharp11
                | ChordQuality::AugMaj7
        )
    }

    /// Semitone intervals from the root for a plain close voicing.
    pub fn intervals(&self, is_seventh: bool) -> Vec<i32> {
        let v: &[i32] = match self {
            ChordQuality::Major => &[0, 4, 7],
            ChordQuality::Minor if is_seventh => &[0, 3, 7, 10],
            ChordQuality::Minor => &[0, 3, 7],
            ChordQuality::Dim if is_seventh => &[0, 3, 6, 9],
            ChordQuality::Dim => &[0, 3, 6],
            ChordQuality::HalfDim => &[0, 3, 6, 10],
            ChordQuality::Aug if is_seventh => &[0, 4, 8, 10],
            ChordQuality::Aug => &[0, 4, 8],
            ChordQuality::AugMaj7 => &[0, 4, 8, 11],
            ChordQuality::Maj7 => &[0, 4, 7, 11],
            ChordQuality::Dominant7 => &[0, 4, 7, 10],
            ChordQuality::Sus4 if is_seventh => &[0, 5, 7, 10],
            ChordQuality::Sus4 => &[0, 5, 7],
            ChordQuality::Sus2 => &[0, 2, 7],
            ChordQuality::Add9 => &[0, 4, 7, 14],
            ChordQuality::Six => &[0, 4, 7, 9],
            ChordQuality::MinorSix => &[0, 3, 7, 9],
            ChordQuality::Nine => &[0, 4, 7, 10, 14],
            ChordQuality::Maj9 => &[0, 4, 7, 11, 14],
            ChordQuality::Minor9 => &[0, 3, 7, 10, 14],
            ChordQuality::Eleven => &[0, 5, 7, 10, 14, 17],
            ChordQuality::Minor11 => &[0, 3, 7, 10, 14, 17],
            ChordQuality::Maj11 => &[0, 4, 7, 11, 14, 17],
            ChordQuality::Maj7Sharp11 => &[0, 4, 7, 11, 14, 18],
            ChordQuality::Thirteen => &[0, 4, 7, 10, 14, 21],
            ChordQuality::Minor13 => &[0, 3, 7, 10, 14, 21],
            ChordQuality::Maj13 => &[0, 4, 7, 11, 14, 21],
            ChordQuality::Alt => &[0, 4, 10, 13, 15, 18, 20],
            ChordQuality::SevenFlat9 => &[0, 4, 7, 10, 13],
            ChordQuality::SevenSharp9 => &[0, 4, 7, 10, 15],
            ChordQuality::SevenSharp11 => &[0, 4, 7, 10, 18],
            ChordQuality::SevenFlat13 => &[0, 4, 7, 10, 20],
            ChordQuality::Power => &[0, 7],
        };
        v.to_vec()
    }

    pub fn suffix(&self, is_seventh: bool) -> &'static str {
        match self {
            ChordQuality::Major => "",
            ChordQuality::Minor if is_seventh => "m7",
            ChordQuality::Minor => "m",
            ChordQuality::Dim if is_seventh => "o7",
            ChordQuality::Dim => "o",
            ChordQuality::HalfDim => "m7b5",
            ChordQuality::Aug if is_seventh => "7#5",
            ChordQuality::Aug => "+",
            ChordQuality::AugMaj7 => "maj7#5",
            ChordQuality::Maj7 => "maj7",
            ChordQuality::Dominant7 => "7",
            ChordQuality::Sus4 if is_seventh => "7sus4",
            ChordQuality::Sus4 => "sus4",
            ChordQuality::Sus2 => "sus2",
            ChordQuality::Add9 => "add9",
            ChordQuality::Six => "6",
            ChordQuality::MinorSix => "m6",
            ChordQuality::Nine => "9",
            ChordQuality::Maj9 => "maj9",
            ChordQuality::Minor9 => "m9",
            ChordQuality::Eleven => "11",
            ChordQuality::Minor11 => "m11",
            ChordQuality::Maj11 => "maj11",
            ChordQuality::Maj7Sharp11 => "maj7#11",
            ChordQuality::Thirteen => "13",
            ChordQuality::Minor13 => "m13",
            ChordQuality::Maj13 => "maj13",
            ChordQuality::Alt => "7alt",
            ChordQuality::SevenFlat9 => "7b9",
            ChordQuality::SevenSharp9 => "7#9",
            ChordQuality::SevenSharp11 => "7#11",
            ChordQuality::SevenFlat13 => "7b13",
            ChordQuality::Power => "5",
        }
    }
}

/// A compiled chord. Immutable once built; a new arrangement is compiled
/// whenever the progression changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chord {
    /// Display symbol, e.g. "Dm7" or "C/E"
    pub symbol: String,
    /// Root as a MIDI note (octave-anchored by the parser)
    pub root: i32,
    /// Explicit slash bass as a MIDI note
    pub bass: Option<i32>,
    pub quality: ChordQuality,
    pub is_seventh: bool,
    /// Semitone intervals from the root
    pub intervals: Vec<i32>,
    /// Comping voicing as MIDI notes
    pub voicing: Vec<i32>,
    /// Voicing frequencies in Hz
    pub frequencies: Vec<f32>,
    /// Length in beats of the active time signature
    pub beats: f32,
    pub section_id: String,
    pub section_label: String,
    /// Sections flagged seamless flow into the next one without a fill
    #[serde(default)]
    pub seamless: bool,
}

impl Chord {
    /// Build a chord with a default close voicing around middle C.
    pub fn new(symbol: impl Into<String>, root: i32, quality: ChordQuality, is_seventh: bool, beats: f32) -> Self {
        let intervals = quality.intervals(is_seventh);
        let pc = pitch_class(root);
        let base = if pc <= 5 { 60 + pc } else { 48 + pc };
        let voicing: Vec<i32> = intervals.iter().map(|i| base + i).collect();
        let frequencies = voicing.iter().map(|&m| midi_to_freq(m as f32)).collect();
        Self {
            symbol: symbol.into(),
            root,
            bass: None,
            quality,
            is_seventh,
            intervals,
            voicing,
            frequencies,
            beats,
            section_id: String::from("main"),
            section_label: String::from("Main"),
            seamless: false,
        }
    }

    pub fn with_bass(mut self, bass: i32) -> Self {
        self.bass = Some(bass);
        self
    }

    pub fn with_section(mut self, id: impl Into<String>, label: impl Into<String>) -> Self {
        self.section_id = id.into();
        self.section_label = label.into();
        self
    }

    /// Replace the voicing, keeping frequencies in step.
    pub fn set_voicing(&mut self, voicing: Vec<i32>) {
        self.frequencies = voicing.iter().map(|&m| midi_to_freq(m as f32)).collect();
        self.voicing = voicing;
    }

    pub fn root_pc(&self) -> i32 {
        pitch_class(self.root)
    }

    /// Pitch class the bass should land on: slash bass if present, else the root.
    pub fn bass_pc(&self) -> i32 {
        pitch_class(self.bass.unwrap_or(self.root))
    }

    /// Chord tone pitch classes, relative to C.
    pub fn pitch_classes(&self) -> Vec<i32> {
        self.intervals.iter().map(|i| pitch_class(self.root + i)).collect()
    }

    /// Whether `interval` (from the root, any octave) is a chord tone.
    pub fn has_interval(&self, interval: i32) -> bool {
        let iv = interval.rem_euclid(12);
        self.intervals.iter().any(|i| i.rem_euclid(12) == iv)
    }

    /// Interval of the chord's third (3 or 4); suspended chords report the 4th.
    pub fn third(&self) -> i32 {
        if self.has_interval(4) {
            4
        } else if self.has_interval(3) {
            3
        } else if self.has_interval(5) {
            5
        } else {
            2
        }
    }

    pub fn fifth(&self) -> i32 {
        if self.has_interval(7) {
            7
        } else if self.has_interval(6) {
            6
        } else if self.has_interval(8) {
            8
        } else {
            7
        }
    }

    pub fn seventh(&self) -> Option<i32> {
        if self.has_interval(10) {
            Some(10)
        } else if self.has_interval(11) {
            Some(11)
        } else if self.quality == ChordQuality::Dim && self.is_seventh {
            Some(9)
        } else {
            None
        }
    }

    pub fn is_dominant(&self) -> bool {
        self.quality.is_dominant_family()
            || (self.quality == ChordQuality::Aug && self.is_seventh)
            || (self.quality == ChordQuality::Sus4 && self.is_seventh)
    }
}
