//! Backing harmony above the comping: string pads, horn and organ stabs,
//! plucks, and a low counter line.
//!
//! Stabs follow a 16-step pattern built once per section. Each entry is the
//! band intensity a hit needs: 1 always sounds, 2 from 0.4 and 3 from 0.7.
//! Pads sound at chord and measure starts. Voices come from the guide tones
//! first and stay near the previous chord's register. Under a busy soloist
//! the part drops to safe tones held as pads.

use std::collections::HashMap;

use ensemble_types::{Chord, GenreFeel, HarmonyStyle, InstrumentTag, NoteEvent, StepSlot};

use super::{check_chord, GenContext, Generator};
use crate::error::GenerationError;
use crate::rng::GenRng;

pub type StabPattern = [u8; 16];

/// Below this band intensity the part sits out.
pub const MIN_INTENSITY: f32 = 0.22;
/// Register the first voicing centres on.
const HOME: i32 = 60;
const TOP: i32 = 79;
/// Lowest pitch kept, except for the counter and pluck styles.
const FLOOR: i32 = 55;
const CEILING: i32 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Rhythm {
    Pads,
    Stabs,
}

#[derive(Debug, Clone, Copy)]
struct Profile {
    rhythm: Rhythm,
    /// Largest random push behind the beat, seconds
    jitter: f64,
    velocity: f32,
    octave: i32,
}

fn profile(style: HarmonyStyle) -> Profile {
    let (rhythm, jitter, velocity, octave) = match style {
        HarmonyStyle::Horns => (Rhythm::Stabs, 0.005, 0.85, 0),
        HarmonyStyle::Strings => (Rhythm::Pads, 0.02, 0.6, 0),
        HarmonyStyle::Organ => (Rhythm::Stabs, 0.015, 0.85, 0),
        HarmonyStyle::Plucks => (Rhythm::Stabs, 0.002, 0.7, 24),
        HarmonyStyle::Counter => (Rhythm::Pads, 0.03, 0.75, -12),
        HarmonyStyle::Smart => (Rhythm::Pads, 0.008, 0.75, 0),
    };
    Profile {
        rhythm,
        jitter,
        velocity,
        octave,
    }
}

/// Thirds and sevenths: the tones that name a chord's quality.
pub fn guide_tones(intervals: &[i32]) -> Vec<i32> {
    intervals
        .iter()
        .copied()
        .filter(|i| matches!(i.rem_euclid(12), 3 | 4 | 10 | 11))
        .collect()
}

/// Root, thirds, fifth, sixth and sevenths. Ninths, elevenths and altered
/// tones are left to the soloist.
pub fn safe_tones(intervals: &[i32]) -> Vec<i32> {
    intervals
        .iter()
        .copied()
        .filter(|i| matches!(i.rem_euclid(12), 0 | 3 | 4 | 7 | 9 | 10 | 11))
        .collect()
}

const fn cell(steps: &[usize]) -> StabPattern {
    let mut out = [0u8; 16];
    let mut i = 0;
    while i < steps.len() {
        out[steps[i]] = 1;
        i += 1;
    }
    out
}

const BOSSA: &[StabPattern] = &[cell(&[0, 3, 6, 10, 14]), cell(&[2, 6, 11])];
const DISCO: &[StabPattern] = &[cell(&[6, 7, 14, 15]), cell(&[0, 4, 8, 12])];
const ROCK: &[StabPattern] = &[cell(&[0, 8]), cell(&[0, 3, 6, 10])];
const REGGAE: &[StabPattern] = &[cell(&[4, 12]), cell(&[4, 5, 12, 13])];
const ACOUSTIC: &[StabPattern] = &[cell(&[0]), cell(&[0, 8])];
const HIP_HOP: &[StabPattern] = &[cell(&[4, 12]), cell(&[2, 10])];

/// Patterns for one section in `genre`. Fixed feels choose among stock
/// figures; jazz, funk and neo soul are built hit by hit.
pub fn stab_pattern(genre: GenreFeel, rng: &mut GenRng) -> StabPattern {
    let stock = match genre {
        GenreFeel::Bossa => Some(BOSSA),
        GenreFeel::Disco => Some(DISCO),
        GenreFeel::Rock => Some(ROCK),
        GenreFeel::Reggae => Some(REGGAE),
        GenreFeel::Acoustic => Some(ACOUSTIC),
        GenreFeel::HipHop => Some(HIP_HOP),
        _ => None,
    };
    if let Some(options) = stock {
        return rng.pick(options).copied().unwrap_or([0; 16]);
    }

    let mut p = [0u8; 16];
    match genre {
        GenreFeel::Jazz => {
            if rng.chance(0.6) {
                // Charleston, sometimes anticipating the next bar
                p[0] = 1;
                if rng.chance(0.7) {
                    p[6] = 1;
                }
                if rng.chance(0.5) {
                    p[14] = 3;
                }
            } else {
                p[4] = 1;
                if rng.chance(0.7) {
                    p[10] = 1;
                }
            }
            for ghost in [3, 9, 13] {
                if rng.chance(0.3) {
                    p[ghost] = 2;
                }
            }
        }
        GenreFeel::Funk => {
            p[0] = 1;
            for s in [3, 6, 9, 12, 14] {
                let r = rng.next_f32();
                p[s] = if r < 0.4 {
                    1
                } else if r < 0.7 {
                    2
                } else {
                    3
                };
            }
        }
        GenreFeel::NeoSoul => {
            if rng.chance(0.6) {
                p[0] = 1;
            }
            if rng.chance(0.5) {
                p[7] = 1;
            }
            p[15] = 3;
        }
        _ => {
            p[0] = 1;
            p[6] = 2;
            p[12] = 3;
        }
    }
    p
}

fn threshold(level: u8) -> f32 {
    match level {
        1 => 0.0,
        2 => 0.4,
        _ => 0.7,
    }
}

fn section_seed(section: &str, genre: GenreFeel) -> u64 {
    // FNV-1a
    let mut h: u64 = 0xcbf2_9ce4_8422_2325;
    for b in section.bytes().chain(genre.name().bytes()) {
        h ^= b as u64;
        h = h.wrapping_mul(0x0100_0000_01b3);
    }
    h
}

/// Guide tones first, then the rest in chord order, up to `voices`.
fn choose_voices(intervals: &[i32], voices: usize) -> Vec<i32> {
    if intervals.len() <= voices {
        return intervals.to_vec();
    }
    let guides = guide_tones(intervals);
    guides
        .iter()
        .copied()
        .chain(intervals.iter().copied().filter(|i| !guides.contains(i)))
        .take(voices)
        .collect()
}

#[derive(Debug, Clone)]
pub struct HarmonyGenerator {
    seed: u64,
    rng: GenRng,
    patterns: HashMap<(String, GenreFeel), StabPattern>,
    last_pitches: Vec<i32>,
    last_played: Option<u64>,
}

impl HarmonyGenerator {
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            rng: GenRng::new(seed),
            patterns: HashMap::new(),
            last_pitches: Vec::new(),
            last_played: None,
        }
    }

    /// The section's pattern, built on first use.
    pub fn pattern(&mut self, section: &str, genre: GenreFeel) -> StabPattern {
        let seed = self.seed;
        *self
            .patterns
            .entry((section.to_string(), genre))
            .or_insert_with(|| stab_pattern(genre, &mut GenRng::new(seed ^ section_seed(section, genre))))
    }

    fn intervals(chord: &Chord, soloist_busy: bool, intensity: f32, complexity: f32) -> Vec<i32> {
        if soloist_busy {
            let safe = safe_tones(&chord.intervals);
            if complexity >= 0.4 {
                return safe;
            }
            let guides = guide_tones(&safe);
            if guides.is_empty() {
                return vec![0, 7];
            }
            return std::iter::once(0).chain(guides).collect();
        }
        if complexity < 0.4 || intensity < 0.4 {
            let guides = guide_tones(&chord.intervals);
            if !guides.is_empty() {
                return guides;
            }
        }
        chord.intervals.clone()
    }

    /// Place each tone in the octave nearest the last voicing, inside
    /// `low..=TOP`.
    fn lead(&self, root: i32, intervals: &[i32], low: i32) -> Vec<i32> {
        let center = if self.last_pitches.is_empty() {
            HOME as f32
        } else {
            self.last_pitches.iter().sum::<i32>() as f32 / self.last_pitches.len() as f32
        };
        let mut out: Vec<i32> = intervals
            .iter()
            .map(|iv| {
                let pc = (root + iv).rem_euclid(12);
                let mut candidate = low + (pc - low).rem_euclid(12);
                let mut best = candidate;
                while candidate <= TOP {
                    if (candidate as f32 - center).abs() < (best as f32 - center).abs() {
                        best = candidate;
                    }
                    candidate += 12;
                }
                best
            })
            .collect();
        out.sort_unstable();
        out.dedup();
        out
    }
}

impl Generator for HarmonyGenerator {
    fn instrument(&self) -> InstrumentTag {
        InstrumentTag::Harmonies
    }

    fn generate(&mut self, chord: &Chord, _next: Option<&Chord>, ctx: &GenContext) -> Result<StepSlot, GenerationError> {
        check_chord(InstrumentTag::Harmonies, chord, ctx.step)?;
        let i = ctx.intensity();
        if i < MIN_INTENSITY {
            return Ok(StepSlot::default());
        }
        let cfg = ctx.config;
        let soloist_on = cfg.soloist.enabled;
        let busy = soloist_on && ctx.soloist_busy;
        // Stay off the step right after a hit while the soloist is playing
        if busy && self.last_played.is_some_and(|s| s + 1 == ctx.step) {
            return Ok(StepSlot::default());
        }

        let genre = cfg.genre;
        let style = cfg.harmonies.style.resolve(genre);
        let profile = profile(style);
        let rhythm = if busy {
            Rhythm::Pads
        } else if matches!(genre, GenreFeel::Jazz | GenreFeel::Funk) {
            Rhythm::Stabs
        } else {
            profile.rhythm
        };
        let c = ctx.complexity();
        let info = ctx.step_info();
        let spm = ctx.steps_per_measure();

        let duration = match rhythm {
            Rhythm::Pads => {
                if ctx.step_in_chord != 0 && info.step_in_measure != 0 {
                    return Ok(StepSlot::default());
                }
                let rest_of_chord = ctx.chord_steps.saturating_sub(ctx.step_in_chord);
                rest_of_chord.min(spm.saturating_sub(info.step_in_measure)).max(1)
            }
            Rhythm::Stabs => {
                let pattern = self.pattern(&chord.section_id, genre);
                let level = pattern[(info.step_in_measure % 16) as usize];
                let on_pattern = level > 0 && i >= threshold(level);
                // Answer the soloist in the gaps of a phrase
                let answer = !on_pattern
                    && soloist_on
                    && !ctx.soloist_busy
                    && ctx.soloist_pitch.is_some()
                    && self.rng.chance(0.3 * c);
                if !on_pattern && !answer {
                    return Ok(StepSlot::default());
                }
                2
            }
        };

        let intervals = Self::intervals(chord, busy, i, c);
        let mut voices = ((1.0 + i * 3.0 * c).floor() as usize).max(1);
        if matches!(style, HarmonyStyle::Organ | HarmonyStyle::Strings) {
            voices = voices.max(2);
        }
        let chosen = choose_voices(&intervals, voices);
        let low = if style == HarmonyStyle::Organ { 57 } else { 53 };
        let keep_low = matches!(style, HarmonyStyle::Counter | HarmonyStyle::Plucks);
        let pitches: Vec<i32> = self
            .lead(chord.root, &chosen, low)
            .into_iter()
            .filter_map(|p| {
                let mut p = p + profile.octave;
                if p < FLOOR && !keep_low {
                    return None;
                }
                if p > CEILING {
                    p -= 12;
                }
                (p <= CEILING).then_some(p)
            })
            .collect();
        if pitches.is_empty() {
            return Ok(StepSlot::default());
        }

        let n = pitches.len();
        let velocity = profile.velocity * (0.6 + 0.4 * i) / (n as f32).sqrt();
        let mut slot = StepSlot::default();
        for (idx, &pitch) in pitches.iter().enumerate() {
            let stagger = (idx as f64 - (n - 1) as f64 / 2.0) * 0.005;
            let push = self.rng.next_f64() * profile.jitter;
            let mut note =
                NoteEvent::new(InstrumentTag::Harmonies, pitch, velocity, duration).with_offset(stagger + push);
            if genre == GenreFeel::NeoSoul && self.rng.chance(0.3) {
                note = note.with_bend(if self.rng.chance(0.5) { 1.0 } else { 2.0 });
            }
            slot.notes.push(note);
        }
        self.last_pitches = pitches;
        self.last_played = Some(ctx.step);
        Ok(slot)
    }

    fn reset(&mut self) {
        self.patterns.clear();
        self.last_pitches.clear();
        self.last_played = None;
    }
}
