//! Lead line generator.
//!
//! The soloist breathes: phrases start and stop with a rest probability that
//! grows with phrase length, motifs are remembered and replayed, and a
//! weighted candidate draw picks each pitch from the chord scale.

use std::collections::VecDeque;

use ensemble_types::{Chord, GenreFeel, InstrumentTag, NoteEvent, SoloistStyle, StepSlot};

use super::scales::{soloist_scale, ScaleContext};
use super::{check_chord, GenContext, Generator};
use crate::error::GenerationError;
use crate::rng::GenRng;

/// Motif and hook capacity.
pub const MOTIF_CAP: usize = 16;

/// Onset patterns a style draws from, one entry per sixteenth.
const RHYTHMIC_CELLS: [&[u8]; 15] = [
    &[1, 0, 1, 0],
    &[1, 1, 1, 1],
    &[1, 0, 0, 0],
    &[1, 1, 1, 0],
    &[1, 0, 1, 1],
    &[0, 1, 1, 1],
    &[1, 0, 0, 1],
    &[1, 1, 0, 1],
    &[0, 1, 1, 0],
    &[1, 0, 1, 1],
    &[0, 1, 0, 1],
    &[1, 0, 0, 0, 0, 0, 0, 0],
    &[0, 0, 1, 0],
    &[1, 0, 1, 0, 1, 0],
    &[0, 1, 0, 0],
];

const GUIDE_TONES: [i32; 4] = [3, 4, 10, 11];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Device {
    Run,
    Slide,
    Enclosure,
    GuitarDouble,
    Quartal,
    BirdFlurry,
}

/// Phrasing and pitch-choice parameters for one concrete style.
#[derive(Debug, Clone, Copy)]
pub struct StyleProfile {
    pub rest_base: f32,
    pub rest_growth: f32,
    pub cells: &'static [usize],
    pub register_soar: f32,
    pub max_notes_per_phrase: u32,
    pub double_stop_prob: f32,
    pub anticipation_prob: f32,
    pub target_extensions: &'static [i32],
    pub device_prob: f32,
    pub devices: &'static [Device],
    pub motif_prob: f32,
    pub hook_prob: f32,
    /// How hard rising tension pulls toward the extension targets.
    pub tension_scale: f32,
    /// Widest timing push or drag, in seconds, before straightness.
    pub timing_jitter: f64,
}

impl StyleProfile {
    pub fn for_style(style: SoloistStyle) -> StyleProfile {
        use Device::*;
        let p = profile;
        match style {
            SoloistStyle::Scalar | SoloistStyle::Smart => p(
                0.2, 0.05, &[0, 2, 11, 1], 10.0, 16, 0.1, 0.1, &[2, 9], 0.15, &[Run, Slide, GuitarDouble], 0.3, 0.1, 0.6, 8.0,
            ),
            SoloistStyle::Shred => p(0.1, 0.02, &[1, 3, 4, 7, 0], 16.0, 32, 0.05, 0.05, &[2], 0.4, &[Run, GuitarDouble], 0.1, 0.05, 0.3, 4.0),
            SoloistStyle::Blues => p(
                0.6, 0.15, &[2, 11, 0, 12, 6], 4.0, 5, 0.35, 0.3, &[9, 10], 0.3, &[Slide, Enclosure, GuitarDouble], 0.5, 0.3, 0.8, 25.0,
            ),
            SoloistStyle::Neo => p(
                0.45, 0.12, &[11, 2, 6, 10, 12, 14], 6.0, 8, 0.15, 0.45, &[2, 6, 9, 11], 0.25, &[Quartal, Slide, GuitarDouble], 0.4, 0.2, 0.7, 25.0,
            ),
            SoloistStyle::Funk => p(0.35, 0.08, &[1, 10, 14, 0, 6], 5.0, 16, 0.15, 0.2, &[9, 13], 0.2, &[Slide, Run], 0.3, 0.15, 0.4, 5.0),
            SoloistStyle::Minimal => p(0.75, 0.15, &[11, 2, 12, 14], 6.0, 3, 0.0, 0.25, &[2, 9, 11], 0.25, &[Slide], 0.7, 0.5, 0.95, 35.0),
            SoloistStyle::Bird => p(
                0.15, 0.03, &[0, 1, 7, 3], 8.0, 48, 0.05, 0.6, &[2, 5, 6, 9], 0.6, &[Enclosure, Run, BirdFlurry], 0.2, 0.1, 0.7, 12.0,
            ),
            SoloistStyle::Disco => p(0.25, 0.06, &[0, 2, 5, 10], 12.0, 12, 0.05, 0.2, &[2, 9], 0.1, &[Run], 0.4, 0.2, 0.5, 8.0),
            SoloistStyle::Bossa => p(
                0.4, 0.08, &[11, 2, 0, 6, 8], 8.0, 8, 0.08, 0.35, &[2, 6, 9], 0.2, &[Enclosure, Slide, GuitarDouble], 0.5, 0.25, 0.7, 15.0,
            ),
            SoloistStyle::Country => p(
                0.2, 0.1, &[1, 3, 4, 12, 14], 8.0, 12, 0.4, 0.2, &[2, 4, 9, 11], 0.35, &[GuitarDouble, Slide, Run], 0.4, 0.2, 0.5, 4.0,
            ),
            SoloistStyle::Metal => p(0.1, 0.05, &[1, 3, 0], 14.0, 32, 0.05, 0.05, &[2, 7], 0.5, &[Run], 0.1, 0.05, 0.4, 2.0),
        }
    }
}

#[allow(clippy::too_many_arguments)]
const fn profile(
    rest_base: f32,
    rest_growth: f32,
    cells: &'static [usize],
    register_soar: f32,
    max_notes_per_phrase: u32,
    double_stop_prob: f32,
    anticipation_prob: f32,
    target_extensions: &'static [i32],
    device_prob: f32,
    devices: &'static [Device],
    motif_prob: f32,
    hook_prob: f32,
    tension_scale: f32,
    jitter_ms: f64,
) -> StyleProfile {
    StyleProfile {
        rest_base,
        rest_growth,
        cells,
        register_soar,
        max_notes_per_phrase,
        double_stop_prob,
        anticipation_prob,
        target_extensions,
        device_prob,
        devices,
        motif_prob,
        hook_prob,
        tension_scale,
        timing_jitter: jitter_ms / 1000.0,
    }
}

/// How straight the soloist plays against the band's swing, 0 (fully swung)
/// to 1 (straight).
pub fn straightness(genre: GenreFeel, style: SoloistStyle) -> f64 {
    if genre == GenreFeel::Reggae {
        return 0.5;
    }
    match style.resolve(genre) {
        SoloistStyle::Blues => 0.55,
        SoloistStyle::Bossa => 0.75,
        _ => 0.65,
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct MotifNote {
    /// Chord root the note was played over
    root: i32,
    interval: i32,
    duration: u32,
    cycle_step: u32,
}

#[derive(Debug, Clone)]
struct Replay {
    notes: Vec<MotifNote>,
    played: usize,
    elapsed: u32,
}

/// Fold a pitch-class delta into `-6..=5`.
fn fold_delta(delta: i32) -> i32 {
    let d = delta.rem_euclid(12);
    if d > 5 {
        d - 12
    } else {
        d
    }
}

#[derive(Debug, Clone)]
pub struct SoloistGenerator {
    rng: GenRng,
    session_steps: u64,
    started: bool,
    resting: bool,
    busy: u32,
    phrase_steps: u32,
    notes_in_phrase: u32,
    smoothed_tension: f32,
    last_pitch: Option<i32>,
    last_interval: i32,
    cell: usize,
    device_buffer: VecDeque<NoteEvent>,
    motif: Vec<MotifNote>,
    hook: Vec<MotifNote>,
    replay: Option<Replay>,
}

impl SoloistGenerator {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: GenRng::new(seed),
            session_steps: 0,
            started: false,
            resting: false,
            busy: 0,
            phrase_steps: 0,
            notes_in_phrase: 0,
            smoothed_tension: 0.0,
            last_pitch: None,
            last_interval: 0,
            cell: 0,
            device_buffer: VecDeque::new(),
            motif: Vec::new(),
            hook: Vec::new(),
            replay: None,
        }
    }

    pub fn last_pitch(&self) -> Option<i32> {
        self.last_pitch
    }

    pub fn is_resting(&self) -> bool {
        self.resting
    }

    pub fn motif_len(&self) -> usize {
        self.motif.len()
    }

    pub fn hook_len(&self) -> usize {
        self.hook.len()
    }

    fn phrase_velocity(&self, profile: &StyleProfile) -> f32 {
        let p = self.notes_in_phrase as f32 / profile.max_notes_per_phrase.max(1) as f32;
        let arc = (1.0 - 4.0 * (p - 0.5).powi(2)).max(0.0);
        0.8 * (0.75 + 0.25 * arc)
    }

    fn remember(&mut self, chord: &Chord, pitch: i32, duration: u32, cycle_step: u32) {
        if self.motif.len() >= MOTIF_CAP {
            self.motif.remove(0);
        }
        self.motif.push(MotifNote {
            root: chord.root,
            interval: pitch - chord.root,
            duration,
            cycle_step,
        });
    }

    fn start_rest(&mut self, hook_retention: f32) {
        self.resting = true;
        self.replay = None;
        if self.motif.len() >= 4 && self.rng.chance(hook_retention) {
            self.hook = self.motif.clone();
        }
    }

    fn resume(&mut self, profile: &StyleProfile) {
        self.resting = false;
        self.phrase_steps = 0;
        self.notes_in_phrase = 0;
        let source = if !self.hook.is_empty() && self.rng.chance(profile.hook_prob) {
            Some(self.hook.clone())
        } else if !self.motif.is_empty() && self.rng.chance(profile.motif_prob) {
            Some(self.motif.clone())
        } else {
            self.motif.clear();
            None
        };
        self.replay = source.map(|notes| Replay {
            notes,
            played: 0,
            elapsed: 0,
        });
    }

    /// Position-locked replay. `None` means the replay is over and normal
    /// generation takes the step.
    fn replay_step(&mut self, chord: &Chord, ctx: &GenContext, profile: &StyleProfile) -> Option<StepSlot> {
        let cycle = ctx.steps_per_measure() * 4;
        let cycle_step = ctx.cycle_step();
        let replay = self.replay.as_mut()?;
        if replay.played >= replay.notes.len() || replay.elapsed >= cycle {
            self.replay = None;
            return None;
        }
        replay.elapsed += 1;
        let Some(note) = replay.notes.iter().find(|n| n.cycle_step == cycle_step).copied() else {
            return Some(StepSlot::default());
        };
        replay.played += 1;
        let delta = fold_delta(chord.root_pc() - note.root.rem_euclid(12));
        let pitch = (note.root + note.interval + delta).clamp(0, 127);
        let velocity = self.phrase_velocity(profile);
        if let Some(last) = self.last_pitch {
            self.last_interval = pitch - last;
        }
        self.last_pitch = Some(pitch);
        self.busy = note.duration.saturating_sub(1);
        self.notes_in_phrase += 1;
        Some(StepSlot::note(NoteEvent::new(
            InstrumentTag::Soloist,
            pitch,
            velocity,
            note.duration,
        )))
    }

    #[allow(clippy::too_many_arguments)]
    fn weigh(
        &self,
        candidate: i32,
        last: i32,
        center: i32,
        (current, target): (&Chord, &Chord),
        ctx: &GenContext,
        profile: &StyleProfile,
        style: SoloistStyle,
    ) -> f32 {
        let interval = (candidate - target.root_pc()).rem_euclid(12);
        let dist = (candidate - last).abs();
        let dir = (candidate - last).signum();
        // Chord tones are judged against what is sounding, even while anticipating.
        let chord_tone = current.pitch_classes().contains(&candidate.rem_euclid(12));
        let guide = GUIDE_TONES.contains(&(candidate - current.root_pc()).rem_euclid(12));
        let on_beat = ctx.step_info().step_in_beat == 0;
        let minimal = style == SoloistStyle::Minimal;
        let mut w = 1.0f32;

        if self.last_interval.abs() > 4 {
            let leap_dir = self.last_interval.signum();
            if dir == -leap_dir && (1..=2).contains(&dist) {
                w += 5000.0;
            } else if dir == leap_dir && dist > 2 {
                w -= 1000.0;
            }
        }
        if profile.target_extensions.contains(&interval) {
            w += 12.0 * (1.0 + 2.0 * self.smoothed_tension * profile.tension_scale);
        }
        if guide {
            w += if minimal { 40.0 } else { 15.0 };
        }
        if on_beat {
            if chord_tone {
                w += 15.0;
                if guide {
                    w += 20.0;
                }
            } else {
                w -= 15.0;
            }
        }
        if ctx.step_in_chord == 0 && dist == 1 && chord_tone {
            w += if minimal { 2000.0 } else { 500.0 };
        }
        w += match dist {
            0 => -50.0,
            1 | 2 => 50.0 + ctx.config.bpm / 100.0 * 20.0,
            3 | 4 => 10.0,
            5..=7 => -30.0,
            12 => 10.0,
            _ => -500.0,
        };
        let from_center = (candidate - center).abs();
        if from_center > 7 {
            w -= (from_center - 7) as f32 * 5.0;
        }
        if on_beat {
            let avoid_fourth = interval == 5 && target.has_interval(4);
            let avoid_flat9 = interval == 1 && !target.is_dominant();
            if avoid_fourth || avoid_flat9 {
                w -= 1000.0;
            }
        }
        w.max(0.1)
    }

    /// Ornament around `selected`. Returns the first note to sound now; the
    /// rest queue in the device buffer.
    fn apply_device(&mut self, device: Device, selected: i32, scale: &[i32], root_pc: i32, style: SoloistStyle, double_stops: bool) -> Option<NoteEvent> {
        let note = |pitch: i32, velocity: f32| NoteEvent::new(InstrumentTag::Soloist, pitch.clamp(0, 127), velocity, 1);
        let in_scale = |p: i32| scale.contains(&(p - root_pc).rem_euclid(12));
        match device {
            Device::BirdFlurry => {
                let mut notes: Vec<i32> = (selected - 12..=selected + 3).rev().filter(|p| in_scale(*p)).take(4).collect();
                if notes.is_empty() {
                    return None;
                }
                let first = notes.remove(0);
                self.device_buffer.extend(notes.into_iter().map(|p| note(p, 0.8)));
                Some(note(first, 0.85))
            }
            Device::Run => {
                let size = if self.rng.chance(0.5) { 1 } else { 2 };
                self.device_buffer.push_back(note(selected - size, 0.8));
                self.device_buffer.push_back(note(selected, 0.9));
                Some(note(selected - 2 * size, 0.7))
            }
            Device::Enclosure => {
                let above = if in_scale(selected + 1) { selected + 1 } else { selected + 2 };
                self.device_buffer.push_back(note(selected - 1, 0.8));
                self.device_buffer.push_back(note(selected, 0.9));
                Some(note(above, 0.8))
            }
            Device::Slide => {
                self.device_buffer.push_back(note(selected, 0.9));
                Some(note(selected - 1, 0.7))
            }
            Device::Quartal | Device::GuitarDouble => {
                if !double_stops {
                    return None;
                }
                let interval = if matches!(style, SoloistStyle::Blues | SoloistStyle::Scalar) || device == Device::Quartal {
                    5
                } else {
                    4
                };
                let mut n = note(selected, 0.85);
                n.double_stop = Some((selected + interval).min(127));
                Some(n)
            }
        }
    }
}

impl Generator for SoloistGenerator {
    fn instrument(&self) -> InstrumentTag {
        InstrumentTag::Soloist
    }

    fn generate(&mut self, chord: &Chord, next: Option<&Chord>, ctx: &GenContext) -> Result<StepSlot, GenerationError> {
        check_chord(InstrumentTag::Soloist, chord, ctx.step)?;
        let cfg = ctx.config;
        let style = cfg.soloist.style.resolve(cfg.genre);
        let profile = StyleProfile::for_style(style);
        let spm = ctx.steps_per_measure();
        let info = ctx.step_info();
        let intensity = ctx.intensity();

        self.session_steps += 1;
        let maturity = (self.session_steps as f32 / 1024.0).min(1.0);
        let warmup = (self.session_steps as f32 / (2 * spm).max(1) as f32).min(1.0);
        let effective = (intensity + 0.25 * maturity).min(1.0);

        if let Some(mut note) = self.device_buffer.pop_front() {
            note.velocity = (note.velocity * self.phrase_velocity(&profile) / 0.8).clamp(0.0, 1.0);
            self.busy = note.duration_steps.saturating_sub(1);
            self.notes_in_phrase += 1;
            if let Some(last) = self.last_pitch {
                self.last_interval = note.pitch - last;
            }
            self.last_pitch = Some(note.pitch);
            return Ok(StepSlot::note(note));
        }
        if self.busy > 0 {
            self.busy -= 1;
            return Ok(StepSlot::default());
        }

        let measure_in_cycle = (ctx.cycle_step() / spm.max(1)) as f32;
        let tension = ((measure_in_cycle / 4.0) * (0.5 + 0.5 * intensity)).clamp(0.0, 1.0);
        self.smoothed_tension = self.smoothed_tension * 0.8 + tension * 0.2;

        if !self.started {
            self.started = true;
            self.resting = true;
            return Ok(StepSlot::default());
        }

        let phrase_bars = self.phrase_steps as f32 / spm.max(1) as f32;
        let mut rest_prob = (profile.rest_base * (2.0 - 1.5 * effective) + phrase_bars * profile.rest_growth
            - 0.15 * maturity)
            .max(0.05)
            + (1.0 - warmup) * 0.4;
        if self.notes_in_phrase >= profile.max_notes_per_phrase {
            rest_prob += 0.4;
        }

        if self.resting {
            if self.rng.chance(0.4 + 0.3 * intensity) {
                self.resume(&profile);
            } else {
                return Ok(StepSlot::default());
            }
        } else if self.phrase_steps > 4 && self.rng.chance(rest_prob) {
            self.start_rest(ctx.performance.hook_retention);
            return Ok(StepSlot::default());
        }
        self.phrase_steps += 1;

        if let Some(slot) = self.replay_step(chord, ctx, &profile) {
            return Ok(slot);
        }

        if info.step_in_beat == 0 {
            self.cell = self.rng.pick(profile.cells).copied().unwrap_or(0);
        }
        let cell = RHYTHMIC_CELLS[self.cell % RHYTHMIC_CELLS.len()];
        if cell[info.step_in_beat as usize % cell.len()] == 0 {
            return Ok(StepSlot::default());
        }

        let anticipate = ctx.step_in_chord + 2 >= ctx.chord_steps && next.is_some() && self.rng.chance(profile.anticipation_prob);
        let (target, scale_next) = match next {
            Some(n) if anticipate => (n, None),
            _ => (chord, next),
        };
        let scale_cx = ScaleContext {
            key: cfg.key,
            minor_key: cfg.minor,
            genre: cfg.genre,
            tension: self.smoothed_tension,
        };
        let scale = soloist_scale(target, scale_next, style, &scale_cx);
        let root_pc = target.root_pc();

        let center = 72 + (self.smoothed_tension * profile.register_soar * (0.5 + intensity)).floor() as i32;
        let last = self.last_pitch.unwrap_or(center);
        let lo = (center - 12).min(last - 14).max(0);
        let hi = (center + 12).max(last + 14).min(127);

        let candidates: Vec<i32> = (lo..=hi).filter(|p| scale.contains(&(p - root_pc).rem_euclid(12))).collect();
        let weights: Vec<f32> = candidates
            .iter()
            .map(|&c| self.weigh(c, last, center, (chord, target), ctx, &profile, style))
            .collect();
        let selected = self
            .rng
            .weighted_index(&weights)
            .and_then(|i| candidates.get(i).copied())
            .unwrap_or(last);
        self.last_interval = selected - last;

        let cycle_step = ctx.cycle_step();
        if info.step_in_beat == 0 && !profile.devices.is_empty() && self.rng.chance(profile.device_prob * 0.7 * warmup) {
            if let Some(&device) = self.rng.pick(profile.devices) {
                if let Some(first) = self.apply_device(device, selected, &scale, root_pc, style, cfg.double_stops) {
                    let velocity_scale = self.phrase_velocity(&profile) / 0.8;
                    let first = NoteEvent {
                        velocity: (first.velocity * velocity_scale).clamp(0.0, 1.0),
                        ..first
                    };
                    self.notes_in_phrase += 1;
                    self.busy = 0;
                    self.last_pitch = Some(first.pitch);
                    self.remember(chord, selected, 1, cycle_step);
                    return Ok(StepSlot::note(first));
                }
            }
        }

        let step_in_beat = info.step_in_beat;
        let important = step_in_beat == 0 || (step_in_beat == 2 && self.rng.chance(0.3));
        let sustained = matches!(
            style,
            SoloistStyle::Neo | SoloistStyle::Blues | SoloistStyle::Minimal | SoloistStyle::Bossa
        );
        let duration = if important && sustained {
            if self.rng.chance(0.4 + 0.2 * maturity) {
                8
            } else {
                4
            }
        } else if style == SoloistStyle::Scalar && step_in_beat == 0 && self.rng.chance(0.15 + 0.1 * maturity) {
            4
        } else if style == SoloistStyle::Neo && self.rng.chance(0.2) {
            2
        } else {
            1
        };

        let velocity = self.phrase_velocity(&profile);
        let straight = straightness(cfg.genre, style);
        let mut note = NoteEvent::new(InstrumentTag::Soloist, selected, velocity, duration)
            .with_offset(self.rng.jitter(profile.timing_jitter * (1.0 - straight)));

        let curls = matches!(
            style,
            SoloistStyle::Blues | SoloistStyle::Neo | SoloistStyle::Bird | SoloistStyle::Minimal
        );
        if duration >= 4 && curls && self.rng.chance(0.3 + 0.2 * maturity) {
            note = note.with_bend(if self.rng.chance(0.7) { 1.0 } else { 2.0 });
        }

        if cfg.double_stops {
            let accent = if step_in_beat == 2 { 1.2 } else { 0.6 };
            if self.rng.chance((profile.double_stop_prob + 0.2 * maturity) * accent * warmup) {
                let interval = self.rng.pick(&[5, 7, 9, 12]).copied().unwrap_or(7);
                note.double_stop = Some((selected + interval).min(127));
            }
        }

        self.busy = duration - 1;
        self.notes_in_phrase += 1;
        self.last_pitch = Some(selected);
        self.remember(chord, selected, duration, cycle_step);
        Ok(StepSlot::note(note))
    }

    fn reset(&mut self) {
        self.session_steps = 0;
        self.started = false;
        self.resting = false;
        self.busy = 0;
        self.phrase_steps = 0;
        self.notes_in_phrase = 0;
        self.smoothed_tension = 0.0;
        self.last_pitch = None;
        self.last_interval = 0;
        self.device_buffer.clear();
        self.motif.clear();
        self.hook.clear();
        self.replay = None;
    }
}
