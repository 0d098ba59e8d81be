//! Per-instrument style identifiers. `Smart` resolves to a concrete style
//! from the genre feel; every concrete variant has its own rule function.

use serde::{Deserialize, Serialize};

use super::groove::GenreFeel;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum BassStyle {
    #[default]
    Smart,
    Whole,
    Half,
    Arp,
    Rock,
    Bossa,
    Funk,
    Rocco,
    Neo,
    Disco,
    Dub,
    Walking,
}

impl BassStyle {
    pub const ALL: [BassStyle; 12] = [
        BassStyle::Smart,
        BassStyle::Whole,
        BassStyle::Half,
        BassStyle::Arp,
        BassStyle::Rock,
        BassStyle::Bossa,
        BassStyle::Funk,
        BassStyle::Rocco,
        BassStyle::Neo,
        BassStyle::Disco,
        BassStyle::Dub,
        BassStyle::Walking,
    ];

    pub fn name(self) -> &'static str {
        match self {
            BassStyle::Smart => "smart",
            BassStyle::Whole => "whole",
            BassStyle::Half => "half",
            BassStyle::Arp => "arp",
            BassStyle::Rock => "rock",
            BassStyle::Bossa => "bossa",
            BassStyle::Funk => "funk",
            BassStyle::Rocco => "rocco",
            BassStyle::Neo => "neo",
            BassStyle::Disco => "disco",
            BassStyle::Dub => "dub",
            BassStyle::Walking => "walking",
        }
    }

    pub fn from_name(name: &str) -> Option<BassStyle> {
        let name = name.trim().to_ascii_lowercase();
        if name == "quarter" {
            return Some(BassStyle::Walking);
        }
        BassStyle::ALL.into_iter().find(|s| s.name() == name)
    }

    pub fn resolve(self, genre: GenreFeel) -> BassStyle {
        if self != BassStyle::Smart {
            return self;
        }
        match genre {
            GenreFeel::Rock | GenreFeel::HipHop => BassStyle::Rock,
            GenreFeel::Jazz | GenreFeel::Blues => BassStyle::Walking,
            GenreFeel::Funk => BassStyle::Funk,
            GenreFeel::NeoSoul => BassStyle::Neo,
            GenreFeel::Bossa => BassStyle::Bossa,
            GenreFeel::Reggae => BassStyle::Dub,
            GenreFeel::Disco => BassStyle::Disco,
            GenreFeel::Acoustic => BassStyle::Half,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum SoloistStyle {
    #[default]
    Smart,
    Scalar,
    Shred,
    Blues,
    Neo,
    Funk,
    Minimal,
    Bird,
    Disco,
    Bossa,
    Country,
    Metal,
}

impl SoloistStyle {
    pub const ALL: [SoloistStyle; 12] = [
        SoloistStyle::Smart,
        SoloistStyle::Scalar,
        SoloistStyle::Shred,
        SoloistStyle::Blues,
        SoloistStyle::Neo,
        SoloistStyle::Funk,
        SoloistStyle::Minimal,
        SoloistStyle::Bird,
        SoloistStyle::Disco,
        SoloistStyle::Bossa,
        SoloistStyle::Country,
        SoloistStyle::Metal,
    ];

    pub fn name(self) -> &'static str {
        match self {
            SoloistStyle::Smart => "smart",
            SoloistStyle::Scalar => "scalar",
            SoloistStyle::Shred => "shred",
            SoloistStyle::Blues => "blues",
            SoloistStyle::Neo => "neo",
            SoloistStyle::Funk => "funk",
            SoloistStyle::Minimal => "minimal",
            SoloistStyle::Bird => "bird",
            SoloistStyle::Disco => "disco",
            SoloistStyle::Bossa => "bossa",
            SoloistStyle::Country => "country",
            SoloistStyle::Metal => "metal",
        }
    }

    pub fn from_name(name: &str) -> Option<SoloistStyle> {
        let name = name.trim().to_ascii_lowercase();
        SoloistStyle::ALL.into_iter().find(|s| s.name() == name)
    }

    pub fn resolve(self, genre: GenreFeel) -> SoloistStyle {
        if self != SoloistStyle::Smart {
            return self;
        }
        match genre {
            GenreFeel::Rock | GenreFeel::HipHop => SoloistStyle::Scalar,
            GenreFeel::Jazz => SoloistStyle::Bird,
            GenreFeel::Funk => SoloistStyle::Funk,
            GenreFeel::Blues => SoloistStyle::Blues,
            GenreFeel::NeoSoul => SoloistStyle::Neo,
            GenreFeel::Disco => SoloistStyle::Disco,
            GenreFeel::Bossa => SoloistStyle::Bossa,
            GenreFeel::Acoustic | GenreFeel::Reggae => SoloistStyle::Minimal,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum CompingStyle {
    #[default]
    Smart,
    Pad,
    Jazz,
    Funk,
    Strum8,
}

impl CompingStyle {
    pub const ALL: [CompingStyle; 5] = [
        CompingStyle::Smart,
        CompingStyle::Pad,
        CompingStyle::Jazz,
        CompingStyle::Funk,
        CompingStyle::Strum8,
    ];

    pub fn name(self) -> &'static str {
        match self {
            CompingStyle::Smart => "smart",
            CompingStyle::Pad => "pad",
            CompingStyle::Jazz => "jazz",
            CompingStyle::Funk => "funk",
            CompingStyle::Strum8 => "strum8",
        }
    }

    pub fn from_name(name: &str) -> Option<CompingStyle> {
        let name = name.trim().to_ascii_lowercase();
        CompingStyle::ALL.into_iter().find(|s| s.name() == name)
    }

    /// Genre whose rhythm cells this style borrows. `Smart` and `Pad` follow
    /// the band's feel.
    pub fn rhythm_genre(self, genre: GenreFeel) -> GenreFeel {
        match self {
            CompingStyle::Smart | CompingStyle::Pad => genre,
            CompingStyle::Jazz => GenreFeel::Jazz,
            CompingStyle::Funk => GenreFeel::Funk,
            CompingStyle::Strum8 => GenreFeel::Rock,
        }
    }
}

/// Sound of the backing harmony part.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum HarmonyStyle {
    #[default]
    Smart,
    Horns,
    Strings,
    Organ,
    Plucks,
    Counter,
}

impl HarmonyStyle {
    pub const ALL: [HarmonyStyle; 6] = [
        HarmonyStyle::Smart,
        HarmonyStyle::Horns,
        HarmonyStyle::Strings,
        HarmonyStyle::Organ,
        HarmonyStyle::Plucks,
        HarmonyStyle::Counter,
    ];

    pub fn name(self) -> &'static str {
        match self {
            HarmonyStyle::Smart => "smart",
            HarmonyStyle::Horns => "horns",
            HarmonyStyle::Strings => "strings",
            HarmonyStyle::Organ => "organ",
            HarmonyStyle::Plucks => "plucks",
            HarmonyStyle::Counter => "counter",
        }
    }

    pub fn from_name(name: &str) -> Option<HarmonyStyle> {
        let name = name.trim().to_ascii_lowercase();
        HarmonyStyle::ALL.into_iter().find(|s| s.name() == name)
    }

    /// Concrete style for `genre`. Jazz and funk never get string pads;
    /// they swap to organ stabs.
    pub fn resolve(self, genre: GenreFeel) -> HarmonyStyle {
        let style = match self {
            HarmonyStyle::Smart => match genre {
                GenreFeel::Blues => HarmonyStyle::Organ,
                GenreFeel::Jazz | GenreFeel::Bossa => HarmonyStyle::Strings,
                GenreFeel::Disco | GenreFeel::HipHop => HarmonyStyle::Plucks,
                GenreFeel::Funk => HarmonyStyle::Horns,
                _ => HarmonyStyle::Strings,
            },
            other => other,
        };
        if style == HarmonyStyle::Strings && matches!(genre, GenreFeel::Jazz | GenreFeel::Funk) {
            HarmonyStyle::Organ
        } else {
            style
        }
    }
}

/// Which member of the band produced an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum InstrumentTag {
    Bass,
    Soloist,
    Comping,
    Harmonies,
    Drums,
}

impl InstrumentTag {
    /// Instruments whose material comes from the generation worker, in the
    /// order each step is generated.
    pub const GENERATED: [InstrumentTag; 4] = [
        InstrumentTag::Bass,
        InstrumentTag::Soloist,
        InstrumentTag::Comping,
        InstrumentTag::Harmonies,
    ];

    pub fn name(self) -> &'static str {
        match self {
            InstrumentTag::Bass => "bass",
            InstrumentTag::Soloist => "soloist",
            InstrumentTag::Comping => "comping",
            InstrumentTag::Harmonies => "harmonies",
            InstrumentTag::Drums => "drums",
        }
    }

    /// Position in [`InstrumentTag::GENERATED`].
    pub fn generated_index(self) -> Option<usize> {
        InstrumentTag::GENERATED.iter().position(|&i| i == self)
    }

    /// Single-voice instruments are subject to monophonic truncation.
    pub fn is_monophonic(self) -> bool {
        matches!(self, InstrumentTag::Bass | InstrumentTag::Soloist)
    }
}

impl std::fmt::Display for InstrumentTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn smart_bass_follows_genre() {
        assert_eq!(BassStyle::Smart.resolve(GenreFeel::Jazz), BassStyle::Walking);
        assert_eq!(BassStyle::Smart.resolve(GenreFeel::Reggae), BassStyle::Dub);
        assert_eq!(BassStyle::Funk.resolve(GenreFeel::Jazz), BassStyle::Funk);
    }

    #[test]
    fn smart_soloist_follows_genre() {
        assert_eq!(SoloistStyle::Smart.resolve(GenreFeel::Jazz), SoloistStyle::Bird);
        assert_eq!(SoloistStyle::Smart.resolve(GenreFeel::Reggae), SoloistStyle::Minimal);
    }

    #[test]
    fn resolved_styles_are_never_smart() {
        for genre in GenreFeel::ALL {
            assert_ne!(BassStyle::Smart.resolve(genre), BassStyle::Smart);
            assert_ne!(SoloistStyle::Smart.resolve(genre), SoloistStyle::Smart);
        }
    }

    #[test]
    fn harmony_strings_become_organ_in_jazz_and_funk() {
        assert_eq!(HarmonyStyle::Smart.resolve(GenreFeel::Bossa), HarmonyStyle::Strings);
        assert_eq!(HarmonyStyle::Smart.resolve(GenreFeel::Jazz), HarmonyStyle::Organ);
        assert_eq!(HarmonyStyle::Strings.resolve(GenreFeel::Funk), HarmonyStyle::Organ);
        assert_eq!(HarmonyStyle::Smart.resolve(GenreFeel::Disco), HarmonyStyle::Plucks);
        assert_eq!(HarmonyStyle::Counter.resolve(GenreFeel::Jazz), HarmonyStyle::Counter);
        assert_eq!(HarmonyStyle::from_name(" Horns "), Some(HarmonyStyle::Horns));
    }

    #[test]
    fn generated_order_is_indexed() {
        for (i, inst) in InstrumentTag::GENERATED.iter().enumerate() {
            assert_eq!(inst.generated_index(), Some(i));
        }
        assert_eq!(InstrumentTag::Drums.generated_index(), None);
        assert!(!InstrumentTag::Harmonies.is_monophonic());
    }

    #[test]
    fn quarter_is_walking() {
        assert_eq!(BassStyle::from_name("Quarter"), Some(BassStyle::Walking));
        assert_eq!(CompingStyle::from_name("strum8"), Some(CompingStyle::Strum8));
    }
}
