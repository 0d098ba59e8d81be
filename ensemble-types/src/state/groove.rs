//! Genre feel, swing and drum pattern data.

use serde::{Deserialize, Serialize};

/// Swing grid subdivision - which notes are affected by swing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum SwingSubdivision {
    /// Delays the off-beat 8th (steps 2 and 3 of each beat)
    #[default]
    Eighths,
    /// Delays every odd 16th
    Sixteenths,
}

impl SwingSubdivision {
    pub fn name(self) -> &'static str {
        match self {
            SwingSubdivision::Eighths => "8th",
            SwingSubdivision::Sixteenths => "16th",
        }
    }

    pub fn from_name(name: &str) -> Option<SwingSubdivision> {
        match name.trim().to_ascii_lowercase().as_str() {
            "8th" | "8ths" | "eighths" => Some(SwingSubdivision::Eighths),
            "16th" | "16ths" | "sixteenths" => Some(SwingSubdivision::Sixteenths),
            _ => None,
        }
    }

    /// Whether step `step_in_beat` (0..4) sits on the delayed half of the grid.
    pub fn is_delayed(self, step_in_beat: u32) -> bool {
        match self {
            SwingSubdivision::Eighths => step_in_beat >= 2,
            SwingSubdivision::Sixteenths => step_in_beat % 2 == 1,
        }
    }
}

/// Genre feel: selects drum pattern, groove rules and smart styles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum GenreFeel {
    #[default]
    Rock,
    Funk,
    Disco,
    Jazz,
    Blues,
    Reggae,
    HipHop,
    NeoSoul,
    Bossa,
    Acoustic,
}

impl GenreFeel {
    pub const ALL: [GenreFeel; 10] = [
        GenreFeel::Rock,
        GenreFeel::Funk,
        GenreFeel::Disco,
        GenreFeel::Jazz,
        GenreFeel::Blues,
        GenreFeel::Reggae,
        GenreFeel::HipHop,
        GenreFeel::NeoSoul,
        GenreFeel::Bossa,
        GenreFeel::Acoustic,
    ];

    pub fn name(self) -> &'static str {
        match self {
            GenreFeel::Rock => "Rock",
            GenreFeel::Funk => "Funk",
            GenreFeel::Disco => "Disco",
            GenreFeel::Jazz => "Jazz",
            GenreFeel::Blues => "Blues",
            GenreFeel::Reggae => "Reggae",
            GenreFeel::HipHop => "Hip Hop",
            GenreFeel::NeoSoul => "Neo-Soul",
            GenreFeel::Bossa => "Bossa",
            GenreFeel::Acoustic => "Acoustic",
        }
    }

    pub fn from_name(name: &str) -> Option<GenreFeel> {
        let wanted: String = name.chars().filter(|c| c.is_ascii_alphanumeric()).collect::<String>().to_ascii_lowercase();
        let wanted = match wanted.as_str() {
            "bossanova" => "bossa".to_string(),
            "swing" => "jazz".to_string(),
            "bluesshuffle" => "blues".to_string(),
            _ => wanted,
        };
        GenreFeel::ALL.into_iter().find(|g| {
            let n: String = g.name().chars().filter(|c| c.is_ascii_alphanumeric()).collect();
            n.to_ascii_lowercase() == wanted
        })
    }

    /// Swing percentage the genre's drum preset ships with.
    pub fn default_swing(self) -> f32 {
        match self {
            GenreFeel::Rock | GenreFeel::Disco | GenreFeel::Bossa => 0.0,
            GenreFeel::Funk | GenreFeel::Acoustic => 15.0,
            GenreFeel::Reggae => 20.0,
            GenreFeel::HipHop => 25.0,
            GenreFeel::NeoSoul => 45.0,
            GenreFeel::Jazz => 60.0,
            GenreFeel::Blues => 100.0,
        }
    }

    pub fn default_subdivision(self) -> SwingSubdivision {
        match self {
            GenreFeel::Funk
            | GenreFeel::Disco
            | GenreFeel::Reggae
            | GenreFeel::HipHop
            | GenreFeel::NeoSoul
            | GenreFeel::Bossa => SwingSubdivision::Sixteenths,
            GenreFeel::Rock | GenreFeel::Jazz | GenreFeel::Blues | GenreFeel::Acoustic => SwingSubdivision::Eighths,
        }
    }
}

impl std::fmt::Display for GenreFeel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Drum kit pieces the engine triggers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DrumVoice {
    Kick,
    Snare,
    HiHat,
    Open,
    Crash,
    Rim,
    Ride,
}

impl DrumVoice {
    pub fn name(self) -> &'static str {
        match self {
            DrumVoice::Kick => "Kick",
            DrumVoice::Snare => "Snare",
            DrumVoice::HiHat => "HiHat",
            DrumVoice::Open => "Open",
            DrumVoice::Crash => "Crash",
            DrumVoice::Rim => "Rim",
            DrumVoice::Ride => "Ride",
        }
    }
}

/// Per-voice step levels: 0 off, 1 soft, 2 accent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct DrumPattern {
    pub lanes: Vec<(DrumVoice, Vec<u8>)>,
}

impl DrumPattern {
    /// Build from level strings such as `"2000000010000000"`. Non-digit
    /// characters count as 0.
    pub fn from_strings(lanes: &[(DrumVoice, &str)]) -> Self {
        let lanes = lanes
            .iter()
            .map(|(voice, s)| {
                let levels = s
                    .chars()
                    .map(|c| c.to_digit(10).map(|d| d.min(2) as u8).unwrap_or(0))
                    .collect();
                (*voice, levels)
            })
            .collect();
        Self { lanes }
    }

    pub fn preset(genre: GenreFeel) -> Self {
        use DrumVoice::*;
        match genre {
            GenreFeel::Rock => Self::from_strings(&[
                (Kick, "2000000020100000"),
                (Snare, "0000200000002000"),
                (HiHat, "2121212121212121"),
                (Open, "0000000000000000"),
            ]),
            GenreFeel::Funk => Self::from_strings(&[
                (Kick, "20010020010000102001002001001020"),
                (Snare, "00002000000020000000200001012000"),
                (HiHat, "21212121212121212121212121212121"),
                (Open, "00000000000000000000000000000000"),
            ]),
            GenreFeel::Disco => Self::from_strings(&[
                (Kick, "2000200020002000"),
                (Snare, "0000200000002000"),
                (HiHat, "1010101010101010"),
                (Open, "0020002000200020"),
            ]),
            GenreFeel::Jazz => Self::from_strings(&[
                (Kick, "10001000100010001000100010001000"),
                (Snare, "00000000000000000000000001001000"),
                (HiHat, "00002000000020000000200000002000"),
                (Ride, "20001020200010202000102020101020"),
            ]),
            GenreFeel::Blues => Self::from_strings(&[
                (Kick, "2000000020000010"),
                (Snare, "0000200000002000"),
                (HiHat, "2010201020102010"),
                (Open, "1000000000001000"),
            ]),
            GenreFeel::Reggae => Self::from_strings(&[
                (Kick, "0000000020000000"),
                (Snare, "0000000020000000"),
                (HiHat, "2010201020102010"),
                (Open, "0000002000000020"),
            ]),
            GenreFeel::HipHop => Self::from_strings(&[
                (Kick, "2000000002100000"),
                (Snare, "0000200000002000"),
                (HiHat, "2111211121112111"),
                (Open, "0000000000000000"),
            ]),
            GenreFeel::NeoSoul => Self::from_strings(&[
                (Kick, "20000001002000002000010000200010"),
                (Snare, "00002000000020000000200000002000"),
                (HiHat, "11111111111111111111111111111111"),
                (Open, "00000000000000200000000000000020"),
            ]),
            GenreFeel::Bossa => Self::from_strings(&[
                (Kick, "20000020200000202000002020000020"),
                (Rim, "20000020000020000000200000200000"),
                (HiHat, "11111111111111111111111111111111"),
                (Open, "00000000000000000000000000000000"),
            ]),
            GenreFeel::Acoustic => Self::from_strings(&[
                (Kick, "2000000010000000"),
                (Snare, "0000200000002000"),
                (HiHat, "1010101010101010"),
                (Open, "0000000000000000"),
            ]),
        }
    }

    /// Pattern length in steps (longest lane).
    pub fn len(&self) -> usize {
        self.lanes.iter().map(|(_, l)| l.len()).max().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of 16-step measures the pattern spans.
    pub fn measures(&self) -> usize {
        self.len().div_ceil(16).max(1)
    }

    /// Level for `voice` at an absolute step, mapped onto the pattern with
    /// `steps_per_measure` steps per bar. Bars shorter than 16 steps read the
    /// start of each pattern bar; longer bars wrap within it.
    pub fn level(&self, voice: DrumVoice, step: u64, steps_per_measure: u32) -> u8 {
        let Some((_, lane)) = self.lanes.iter().find(|(v, _)| *v == voice) else {
            return 0;
        };
        if lane.is_empty() || steps_per_measure == 0 {
            return 0;
        }
        let spm = steps_per_measure as u64;
        let bar = (step / spm) as usize % self.measures();
        let in_bar = (step % spm) as usize % 16;
        lane.get(bar * 16 + in_bar).copied().unwrap_or(0)
    }

    pub fn voices(&self) -> impl Iterator<Item = DrumVoice> + '_ {
        self.lanes.iter().map(|(v, _)| *v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn swing_subdivision_delay_positions() {
        let eighths: Vec<bool> = (0..4).map(|s| SwingSubdivision::Eighths.is_delayed(s)).collect();
        assert_eq!(eighths, vec![false, false, true, true]);
        let sixteenths: Vec<bool> = (0..4).map(|s| SwingSubdivision::Sixteenths.is_delayed(s)).collect();
        assert_eq!(sixteenths, vec![false, true, false, true]);
    }

    #[test]
    fn genre_names_parse() {
        assert_eq!(GenreFeel::from_name("neo-soul"), Some(GenreFeel::NeoSoul));
        assert_eq!(GenreFeel::from_name("Bossa Nova"), Some(GenreFeel::Bossa));
        assert_eq!(GenreFeel::from_name("hip hop"), Some(GenreFeel::HipHop));
        assert_eq!(GenreFeel::from_name("polka"), None);
    }

    #[test]
    fn standard_pattern_levels() {
        let p = DrumPattern::preset(GenreFeel::Rock);
        assert_eq!(p.level(DrumVoice::Kick, 0, 16), 2);
        assert_eq!(p.level(DrumVoice::Snare, 4, 16), 2);
        assert_eq!(p.level(DrumVoice::Snare, 5, 16), 0);
        assert_eq!(p.level(DrumVoice::Crash, 0, 16), 0);
    }

    #[test]
    fn two_bar_pattern_alternates() {
        let p = DrumPattern::preset(GenreFeel::Funk);
        assert_eq!(p.measures(), 2);
        // Second bar kick differs from the first at step 3
        assert_eq!(p.level(DrumVoice::Kick, 3, 16), 1);
        assert_eq!(p.level(DrumVoice::Kick, 16 + 3, 16), 1);
        assert_eq!(p.level(DrumVoice::Kick, 16 + 14, 16), 2);
        assert_eq!(p.level(DrumVoice::Kick, 32 + 3, 16), 1);
    }

    #[test]
    fn short_measures_read_bar_start() {
        let p = DrumPattern::preset(GenreFeel::Rock);
        // 3/4: step 12 starts the next bar
        assert_eq!(p.level(DrumVoice::Kick, 12, 12), 2);
    }
}
