//! Chord-scale choice for the bass walk and the soloist.

use ensemble_types::{Chord, ChordQuality, GenreFeel, Key, Scale, SoloistStyle};

/// Harmonic surroundings a scale choice depends on.
#[derive(Debug, Clone, Copy)]
pub struct ScaleContext {
    pub key: Key,
    pub minor_key: bool,
    pub genre: GenreFeel,
    /// Soloist tension, 0..=1
    pub tension: f32,
}

fn minor_family(q: ChordQuality) -> bool {
    matches!(
        q,
        ChordQuality::Minor
            | ChordQuality::MinorSix
            | ChordQuality::Minor9
            | ChordQuality::Minor11
            | ChordQuality::Minor13
    )
}

fn major_family(q: ChordQuality) -> bool {
    q == ChordQuality::Major || q.is_major_seventh_family()
}

fn resolves_down_fifth(chord: &Chord, next: &Chord) -> bool {
    (next.root_pc() - chord.root_pc()).rem_euclid(12) == 5
}

fn sorted(mut v: Vec<i32>) -> Vec<i32> {
    v.sort_unstable();
    v.dedup();
    v
}

/// Mode of the key starting on the chord root, if every chord tone is in
/// the key.
fn diatonic_mode(chord: &Chord, key: Key, minor_key: bool) -> Option<Vec<i32>> {
    let key_scale = if minor_key { Scale::Minor } else { Scale::Major };
    let key_notes: Vec<i32> = key_scale.intervals().iter().map(|i| (key.semitone() + i) % 12).collect();
    let root = chord.root_pc();
    if !chord.pitch_classes().iter().all(|pc| key_notes.contains(pc)) {
        return None;
    }
    Some(sorted(key_notes.iter().map(|n| (n - root).rem_euclid(12)).collect()))
}

/// Scale for the walking bass.
pub fn bass_scale(chord: &Chord, next: Option<&Chord>, minor_key: bool) -> &'static [i32] {
    let v7_to_minor = chord.has_interval(10)
        && chord.has_interval(4)
        && next.is_some_and(|n| {
            matches!(n.quality, ChordQuality::Minor | ChordQuality::Dim | ChordQuality::HalfDim)
        });
    if v7_to_minor {
        return Scale::PhrygianDominant.intervals();
    }
    if minor_key {
        match chord.quality {
            ChordQuality::Major => return Scale::Mixolydian.intervals(),
            ChordQuality::Minor => return Scale::Minor.intervals(),
            _ => {}
        }
    }
    match chord.quality {
        ChordQuality::Minor => Scale::Dorian.intervals(),
        ChordQuality::Dim => Scale::WholeHalfDiminished.intervals(),
        ChordQuality::HalfDim => Scale::Locrian.intervals(),
        ChordQuality::Maj7 => Scale::Major.intervals(),
        _ if chord.has_interval(10) => Scale::Mixolydian.intervals(),
        _ => Scale::Major.intervals(),
    }
}

/// Scale the soloist draws candidates from. `style` must already be
/// resolved (never `Smart`).
pub fn soloist_scale(chord: &Chord, next: Option<&Chord>, style: SoloistStyle, cx: &ScaleContext) -> Vec<i32> {
    let q = chord.quality;
    let dominant = chord.is_dominant();

    if cx.tension > 0.7 && dominant {
        return Scale::Altered.intervals().to_vec();
    }

    match style {
        SoloistStyle::Country => return vec![0, 2, 3, 4, 7, 9, 10],
        SoloistStyle::Metal => {
            return if dominant || q == ChordQuality::Major {
                Scale::PhrygianDominant.intervals().to_vec()
            } else {
                Scale::Minor.intervals().to_vec()
            };
        }
        SoloistStyle::Blues | SoloistStyle::Disco | SoloistStyle::Funk => {
            if major_family(q) {
                return Scale::Major.intervals().to_vec();
            }
            let minor_local = minor_family(q) || matches!(q, ChordQuality::Dim | ChordQuality::HalfDim);
            let mut base = if q == ChordQuality::HalfDim {
                Scale::Locrian.intervals().to_vec()
            } else if minor_local {
                vec![0, 2, 3, 5, 6, 7, 10]
            } else {
                vec![0, 2, 3, 4, 5, 6, 7, 9, 10]
            };
            if cx.tension > 0.7 {
                base.push(11);
            }
            return sorted(base);
        }
        SoloistStyle::Neo | SoloistStyle::Bird => {
            if major_family(q) {
                return Scale::Major.intervals().to_vec();
            }
            if minor_family(q) {
                let rel = (chord.root_pc() - cx.key.semitone()).rem_euclid(12);
                return if rel == 9 && !cx.minor_key {
                    Scale::Minor.intervals().to_vec()
                } else {
                    Scale::Dorian.intervals().to_vec()
                };
            }
        }
        SoloistStyle::Bossa if major_family(q) => return Scale::Lydian.intervals().to_vec(),
        _ => {}
    }

    let by_quality = match q {
        ChordQuality::Dim => Some(Scale::WholeHalfDiminished),
        ChordQuality::HalfDim => Some(Scale::Locrian),
        ChordQuality::Aug => Some(Scale::WholeTone),
        ChordQuality::AugMaj7 => Some(Scale::LydianAugmented),
        ChordQuality::Minor9 | ChordQuality::Minor11 | ChordQuality::Minor13 | ChordQuality::MinorSix => {
            Some(Scale::Dorian)
        }
        ChordQuality::Alt => Some(Scale::Altered),
        ChordQuality::SevenSharp9 => {
            if style == SoloistStyle::Funk || cx.genre == GenreFeel::Funk {
                return vec![0, 1, 3, 4, 5, 7, 8, 10];
            }
            Some(Scale::Altered)
        }
        ChordQuality::SevenFlat9 | ChordQuality::SevenFlat13 => Some(Scale::PhrygianDominant),
        ChordQuality::SevenSharp11 => Some(Scale::LydianDominant),
        ChordQuality::Nine | ChordQuality::Thirteen => Some(Scale::Mixolydian),
        ChordQuality::Sus4 => return vec![0, 2, 5, 7, 9, 10],
        _ => None,
    };
    if let Some(scale) = by_quality {
        return scale.intervals().to_vec();
    }

    if q == ChordQuality::Dominant7 {
        if let Some(next) = next {
            if resolves_down_fifth(chord, next) {
                let next_minor = minor_family(next.quality) || matches!(next.quality, ChordQuality::Dim | ChordQuality::HalfDim);
                return if next_minor {
                    Scale::PhrygianDominant.intervals().to_vec()
                } else {
                    Scale::Mixolydian.intervals().to_vec()
                };
            }
        }
    }

    if minor_family(q) {
        let dorian_genre = matches!(cx.genre, GenreFeel::Jazz | GenreFeel::NeoSoul | GenreFeel::Funk | GenreFeel::Bossa);
        if dorian_genre || matches!(style, SoloistStyle::Bird | SoloistStyle::Neo | SoloistStyle::Bossa) {
            return Scale::Dorian.intervals().to_vec();
        }
    }

    if dominant || q == ChordQuality::Major {
        let rel = (chord.root_pc() - cx.key.semitone()).rem_euclid(12);
        if cx.minor_key && rel == 7 {
            return Scale::PhrygianDominant.intervals().to_vec();
        }
        if dominant {
            if !cx.minor_key && (rel == 2 || rel == 10) {
                return Scale::LydianDominant.intervals().to_vec();
            }
            return Scale::Mixolydian.intervals().to_vec();
        }
    }

    if let Some(mode) = diatonic_mode(chord, cx.key, cx.minor_key) {
        return mode;
    }
    if minor_family(q) {
        return Scale::Minor.intervals().to_vec();
    }
    if chord.has_interval(11) {
        Scale::Major.intervals().to_vec()
    } else {
        Scale::Mixolydian.intervals().to_vec()
    }
}
