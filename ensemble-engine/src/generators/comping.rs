//! Chordal accompaniment.
//!
//! Rhythm comes from 16-step cells chosen once per measure ("intent"); the
//! voicing is thinned around the soloist and lifted clear of the bass.

use ensemble_types::{Chord, ChordQuality, CompingStyle, GenreFeel, InstrumentTag, NoteEvent, PedalChange, StepSlot};

use super::{check_chord, GenContext, Generator};
use crate::error::GenerationError;
use crate::rng::GenRng;

type Cell = [u8; 16];

const fn hits(steps: &[usize]) -> Cell {
    let mut cell = [0u8; 16];
    let mut i = 0;
    while i < steps.len() {
        cell[steps[i]] = 1;
        i += 1;
    }
    cell
}

const EIGHTHS: Cell = hits(&[0, 2, 4, 6, 8, 10, 12, 14]);
const QUARTERS: Cell = hits(&[0, 4, 8, 12]);

const BALANCED: [Cell; 3] = [hits(&[0, 6]), hits(&[0, 4]), hits(&[0, 8])];
const SPARSE: [Cell; 3] = [hits(&[0]), hits(&[6]), [0; 16]];
const ACTIVE: [Cell; 3] = [
    hits(&[0, 3, 6, 10, 14]),
    EIGHTHS,
    [1, 1, 0, 1, 1, 0, 1, 1, 0, 1, 1, 0, 1, 1, 0, 1],
];

fn genre_cells(genre: GenreFeel) -> Option<[Cell; 3]> {
    Some(match genre {
        GenreFeel::Rock => [EIGHTHS, QUARTERS, [1, 0, 1, 0, 1, 0, 1, 1, 1, 0, 1, 0, 1, 0, 1, 1]],
        GenreFeel::Funk => [hits(&[2, 6, 10, 14]), hits(&[0, 3, 6, 12, 15]), hits(&[1, 5, 9, 13])],
        GenreFeel::Disco => [hits(&[2, 6, 10, 14]), hits(&[2, 6, 10]), hits(&[0, 6, 10, 14])],
        GenreFeel::Blues => [hits(&[0, 3, 6, 9, 12, 15]), hits(&[0, 8]), hits(&[4, 12])],
        GenreFeel::Reggae => [hits(&[4, 12]), hits(&[4, 6, 12, 14]), hits(&[4, 5, 12, 13])],
        GenreFeel::Acoustic => [QUARTERS, hits(&[0, 3, 8, 11]), hits(&[0, 6])],
        GenreFeel::Bossa => [hits(&[0, 3, 6, 10, 13]), hits(&[0, 6, 10]), hits(&[8, 11, 14])],
        GenreFeel::NeoSoul => [hits(&[0, 14]), hits(&[1]), hits(&[0, 6, 12])],
        GenreFeel::Jazz => return None,
        GenreFeel::HipHop => return None,
    })
}

/// Jazz has four cells; kept apart from the three-cell table.
const JAZZ: [Cell; 4] = [hits(&[0, 6]), hits(&[6, 10]), hits(&[14]), QUARTERS];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Vibe {
    Sparse,
    Balanced,
    Active,
}

/// Rhythmic plan for one measure.
#[derive(Debug, Clone, Copy)]
struct Intent {
    vibe: Vibe,
    cell: Cell,
    locked_until: u64,
    anticipation: f32,
    lay_back: f64,
}

#[derive(Debug, Clone)]
pub struct CompingGenerator {
    rng: GenRng,
    intent: Option<Intent>,
    last_chord_index: Option<usize>,
}

impl CompingGenerator {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: GenRng::new(seed),
            intent: None,
            last_chord_index: None,
        }
    }

    pub fn vibe(&self) -> Option<Vibe> {
        self.intent.map(|i| i.vibe)
    }

    fn choose_intent(&mut self, ctx: &GenContext, rhythm_genre: GenreFeel) -> Intent {
        let i = ctx.intensity();
        let c = ctx.complexity();
        let vibe = if ctx.soloist_busy {
            Vibe::Sparse
        } else if i > 0.75 || c > 0.7 {
            Vibe::Active
        } else if i < 0.3 {
            Vibe::Sparse
        } else {
            Vibe::Balanced
        };
        let vibe_pool: &[Cell] = match vibe {
            Vibe::Sparse => &SPARSE,
            Vibe::Balanced => &BALANCED,
            Vibe::Active => &ACTIVE,
        };
        let genre_pool = genre_cells(rhythm_genre);
        let pool: &[Cell] = match (&genre_pool, rhythm_genre) {
            (_, GenreFeel::Jazz) => {
                if self.swap_for_vibe(vibe) {
                    vibe_pool
                } else {
                    &JAZZ
                }
            }
            (Some(cells), _) => {
                if self.swap_for_vibe(vibe) {
                    vibe_pool
                } else {
                    cells
                }
            }
            (None, _) => vibe_pool,
        };
        let cell = self.rng.pick(pool).copied().unwrap_or([0; 16]);

        let genre = ctx.config.genre;
        let mut anticipation = 0.2 * i;
        if matches!(genre, GenreFeel::Jazz | GenreFeel::Bossa) {
            anticipation += 0.15;
        }
        let mut lay_back = if i < 0.4 { 0.02 } else { 0.0 };
        if genre == GenreFeel::NeoSoul {
            lay_back += 0.04;
        }
        Intent {
            vibe,
            cell,
            locked_until: ctx.step + ctx.steps_per_measure() as u64,
            anticipation,
            lay_back,
        }
    }

    /// Genre pools occasionally give way to the vibe pool.
    fn swap_for_vibe(&mut self, vibe: Vibe) -> bool {
        match vibe {
            Vibe::Sparse | Vibe::Active => self.rng.chance(0.3),
            Vibe::Balanced => self.rng.chance(0.2),
        }
    }

    fn pedal(&mut self, ctx: &GenContext, genre: GenreFeel, chord_changed: bool) -> Vec<PedalChange> {
        let info = ctx.step_info();
        let up = |t: f64| PedalChange {
            down: false,
            timing_offset: t,
        };
        let down = |t: f64| PedalChange {
            down: true,
            timing_offset: t,
        };
        let i = ctx.intensity();
        // Only the ringing feels hold the pedal; the rest keep it lifted
        if !matches!(genre, GenreFeel::Acoustic | GenreFeel::Bossa | GenreFeel::Jazz) {
            return if info.step_in_measure == 0 { vec![up(0.0)] } else { Vec::new() };
        }
        if info.step_in_measure == 0 || chord_changed {
            return vec![up(0.0), down(0.01)];
        }
        if info.is_group_start && self.rng.chance(i * 0.5) {
            return vec![up(-0.01), down(0.0)];
        }
        if info.is_beat_start && self.rng.chance(0.4 * i) {
            return vec![up(-0.015), down(0.0)];
        }
        if genre == GenreFeel::Jazz && !info.is_beat_start {
            return vec![up(0.1)];
        }
        Vec::new()
    }

    fn duration_beats(rhythm_genre: GenreFeel) -> f32 {
        match rhythm_genre {
            GenreFeel::Reggae | GenreFeel::Funk | GenreFeel::Disco => 0.25,
            GenreFeel::Jazz => 1.0,
            GenreFeel::Acoustic => 2.5,
            GenreFeel::Rock | GenreFeel::Bossa => 1.5,
            _ => 2.0,
        }
    }

    fn voice(&mut self, chord: &Chord, ctx: &GenContext, structural: bool) -> Vec<i32> {
        let mut notes = chord.voicing.clone();
        if ctx.soloist_pitch.is_some_and(|p| p > 72) && self.rng.chance(0.7) {
            notes.truncate(3);
        } else if !structural && notes.len() > 3 && self.rng.chance(0.5) {
            notes.truncate(3);
        }
        if let Some(bass) = ctx.bass_pitch {
            notes.sort_unstable();
            if let Some(lowest) = notes.first_mut() {
                if *lowest <= bass + 12 {
                    *lowest += 12;
                }
            }
            notes.sort_unstable();
            if notes.len() > 3 {
                notes.remove(0);
                let nine = matches!(chord.quality, ChordQuality::Nine | ChordQuality::Maj9 | ChordQuality::Minor9);
                if (chord.is_seventh || nine) && notes.len() > 3 {
                    let fifth_pc = (chord.root + chord.fifth()).rem_euclid(12);
                    if let Some(pos) = notes.iter().position(|n| n.rem_euclid(12) == fifth_pc) {
                        notes.remove(pos);
                    }
                }
            }
        }
        notes
    }
}

impl Generator for CompingGenerator {
    fn instrument(&self) -> InstrumentTag {
        InstrumentTag::Comping
    }

    fn generate(&mut self, chord: &Chord, _next: Option<&Chord>, ctx: &GenContext) -> Result<StepSlot, GenerationError> {
        check_chord(InstrumentTag::Comping, chord, ctx.step)?;
        let cfg = ctx.config;
        let genre = cfg.genre;
        let style = cfg.comping.style;
        let rhythm_genre = style.rhythm_genre(genre);
        let info = ctx.step_info();
        let spm = ctx.steps_per_measure();
        let i = ctx.intensity();

        let relock = match self.intent {
            Some(intent) => ctx.step >= intent.locked_until || info.step_in_measure == 0,
            None => true,
        };
        if relock {
            self.intent = Some(self.choose_intent(ctx, rhythm_genre));
        }
        let Some(intent) = self.intent else {
            return Ok(StepSlot::default());
        };

        let chord_changed = self.last_chord_index != Some(ctx.chord_index);
        let mut slot = StepSlot {
            notes: Vec::new(),
            pedal: self.pedal(ctx, genre, chord_changed),
        };
        if info.step_in_measure == 0 || chord_changed {
            self.last_chord_index = Some(ctx.chord_index);
        }

        let pad = style == CompingStyle::Pad;
        let should_hit = if pad {
            ctx.step_in_chord == 0
        } else {
            let in_cell = intent.cell[(info.step_in_measure % spm) as usize % 16] == 1;
            in_cell
                || (info.step_in_measure == 0 && self.rng.chance(0.8))
                || (info.is_group_start && self.rng.chance(0.4 + 0.4 * i))
        };
        if !should_hit {
            return Ok(slot);
        }

        let mut timing = 0.0f64;
        if !pad && info.step_in_measure != 0 {
            if self.rng.chance(0.15 + 0.2 * i) {
                timing -= 0.025;
            }
            if self.rng.chance(intent.anticipation) {
                timing -= 0.010;
            }
            if self.rng.chance(intent.lay_back as f32) {
                timing += 0.020;
            }
        }

        let spb = ctx.steps_per_beat();
        let beats = if pad { chord.beats } else { Self::duration_beats(rhythm_genre) };
        let duration = super::beats_to_steps(beats, spb);

        let structural = info.is_group_start;
        let base = if structural {
            0.6
        } else if info.is_beat_start {
            0.5
        } else {
            0.35
        };
        let velocity = base * (0.8 + 0.4 * i);

        let mut notes = if style == CompingStyle::Smart || pad {
            self.voice(chord, ctx, structural)
        } else {
            chord.voicing.clone()
        };
        if matches!(rhythm_genre, GenreFeel::Jazz | GenreFeel::Acoustic)
            && chord.quality == ChordQuality::Maj7
            && notes.len() > 1
            && self.rng.chance(0.6)
        {
            notes[1] += 12;
        }

        let strum = if rhythm_genre == GenreFeel::Acoustic { 0.025 } else { 0.008 };
        for (idx, pitch) in notes.into_iter().enumerate() {
            let shift = self.rng.jitter(0.003);
            let v = (velocity * self.rng.range(0.95, 1.05)).min(1.0);
            let offset = timing + idx as f64 * strum + shift;
            slot.notes
                .push(NoteEvent::new(InstrumentTag::Comping, pitch.clamp(0, 127), v, duration).with_offset(offset));
        }
        Ok(slot)
    }

    fn reset(&mut self) {
        self.intent = None;
        self.last_chord_index = None;
    }
}
