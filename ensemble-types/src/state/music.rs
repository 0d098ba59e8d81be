use serde::{Deserialize, Serialize};

/// Musical key (pitch class)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Key {
    #[default]
    C,
    Cs,
    D,
    Ds,
    E,
    F,
    Fs,
    G,
    Gs,
    A,
    As,
    B,
}

impl Key {
    pub const ALL: [Key; 12] = [
        Key::C,
        Key::Cs,
        Key::D,
        Key::Ds,
        Key::E,
        Key::F,
        Key::Fs,
        Key::G,
        Key::Gs,
        Key::A,
        Key::As,
        Key::B,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Key::C => "C",
            Key::Cs => "C#",
            Key::D => "D",
            Key::Ds => "D#",
            Key::E => "E",
            Key::F => "F",
            Key::Fs => "F#",
            Key::G => "G",
            Key::Gs => "G#",
            Key::A => "A",
            Key::As => "A#",
            Key::B => "B",
        }
    }

    /// Pitch class of this key (C = 0)
    pub fn semitone(&self) -> i32 {
        Key::ALL.iter().position(|k| k == self).unwrap_or(0) as i32
    }

    pub fn from_semitone(pc: i32) -> Key {
        Key::ALL[pc.rem_euclid(12) as usize]
    }

    /// Parse a note name. Accepts sharps and flats, case-insensitive letter.
    pub fn from_name(name: &str) -> Option<Key> {
        let mut chars = name.trim().chars();
        let letter = chars.next()?.to_ascii_uppercase();
        let base = match letter {
            'C' => 0,
            'D' => 2,
            'E' => 4,
            'F' => 5,
            'G' => 7,
            'A' => 9,
            'B' => 11,
            _ => return None,
        };
        let accidental = match chars.next() {
            None => 0,
            Some('#') | Some('s') => 1,
            Some('b') => -1,
            Some(_) => return None,
        };
        if chars.next().is_some() {
            return None;
        }
        Some(Key::from_semitone(base + accidental))
    }
}

impl std::fmt::Display for Key {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Scale definition as intervals from root
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Scale {
    Major,
    Minor,
    Dorian,
    Phrygian,
    Lydian,
    Mixolydian,
    Locrian,
    HarmonicMinor,
    MelodicMinor,
    PhrygianDominant,
    LydianDominant,
    Altered,
    HalfWholeDiminished,
    WholeHalfDiminished,
    LydianAugmented,
    WholeTone,
    MajorPentatonic,
    MinorPentatonic,
    Blues,
    MajorBlues,
    BebopDominant,
    Chromatic,
}

impl Scale {
    /// Semitone intervals from root for this scale
    pub fn intervals(&self) -> &'static [i32] {
        match self {
            Scale::Major => &[0, 2, 4, 5, 7, 9, 11],
            Scale::Minor => &[0, 2, 3, 5, 7, 8, 10],
            Scale::Dorian => &[0, 2, 3, 5, 7, 9, 10],
            Scale::Phrygian => &[0, 1, 3, 5, 7, 8, 10],
            Scale::Lydian => &[0, 2, 4, 6, 7, 9, 11],
            Scale::Mixolydian => &[0, 2, 4, 5, 7, 9, 10],
            Scale::Locrian => &[0, 1, 3, 5, 6, 8, 10],
            Scale::HarmonicMinor => &[0, 2, 3, 5, 7, 8, 11],
            Scale::MelodicMinor => &[0, 2, 3, 5, 7, 9, 11],
            Scale::PhrygianDominant => &[0, 1, 4, 5, 7, 8, 10],
            Scale::LydianDominant => &[0, 2, 4, 6, 7, 9, 10],
            Scale::Altered => &[0, 1, 3, 4, 6, 8, 10],
            Scale::HalfWholeDiminished => &[0, 1, 3, 4, 6, 7, 9, 10],
            Scale::WholeHalfDiminished => &[0, 2, 3, 5, 6, 8, 9, 11],
            Scale::LydianAugmented => &[0, 2, 4, 6, 8, 9, 11],
            Scale::WholeTone => &[0, 2, 4, 6, 8, 10],
            Scale::MajorPentatonic => &[0, 2, 4, 7, 9],
            Scale::MinorPentatonic => &[0, 3, 5, 7, 10],
            Scale::Blues => &[0, 3, 5, 6, 7, 10],
            Scale::MajorBlues => &[0, 2, 3, 4, 7, 9],
            Scale::BebopDominant => &[0, 2, 4, 5, 7, 9, 10, 11],
            Scale::Chromatic => &[0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11],
        }
    }

    pub fn contains(&self, interval: i32) -> bool {
        self.intervals().contains(&interval.rem_euclid(12))
    }
}

/// Equal-tempered frequency for a (possibly fractional) MIDI note.
pub fn midi_to_freq(midi: f32) -> f32 {
    440.0 * 2f32.powf((midi - 69.0) / 12.0)
}

/// Pitch class of a MIDI note, always in 0..12.
pub fn pitch_class(midi: i32) -> i32 {
    midi.rem_euclid(12)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn key_names_unique() {
        let names: HashSet<&str> = Key::ALL.iter().map(|k| k.name()).collect();
        assert_eq!(names.len(), 12);
    }

    #[test]
    fn key_semitones_0_to_11() {
        let semitones: Vec<i32> = Key::ALL.iter().map(|k| k.semitone()).collect();
        assert_eq!(semitones, (0..12).collect::<Vec<i32>>());
    }

    #[test]
    fn key_from_name_handles_flats() {
        assert_eq!(Key::from_name("Bb"), Some(Key::As));
        assert_eq!(Key::from_name("cb"), Some(Key::B));
        assert_eq!(Key::from_name("F#"), Some(Key::Fs));
        assert_eq!(Key::from_name("H"), None);
        assert_eq!(Key::from_name("C##"), None);
    }

    #[test]
    fn a4_is_440() {
        assert!((midi_to_freq(69.0) - 440.0).abs() < 1e-3);
        assert!((midi_to_freq(81.0) - 880.0).abs() < 1e-2);
    }

    #[test]
    fn pitch_class_wraps_negative() {
        assert_eq!(pitch_class(-1), 11);
        assert_eq!(pitch_class(60), 0);
    }

    #[test]
    fn scales_start_on_root() {
        for scale in [Scale::Major, Scale::Altered, Scale::Blues, Scale::PhrygianDominant] {
            assert_eq!(scale.intervals()[0], 0);
            assert!(scale.contains(12));
        }
    }
}
