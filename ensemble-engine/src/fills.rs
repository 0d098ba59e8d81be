//! Drum fill templates and the active-fill state the dispatcher plays from.

use ensemble_types::{DrumHit, DrumVoice, GenreFeel};

use crate::rng::GenRng;

use DrumVoice::{Crash, Kick, Open, Snare};

/// One template: parallel step/voice/velocity lists on a 16-step bar.
struct Template {
    steps: &'static [u32],
    voices: &'static [DrumVoice],
    velocities: &'static [f32],
}

const fn t(steps: &'static [u32], voices: &'static [DrumVoice], velocities: &'static [f32]) -> Template {
    Template {
        steps,
        voices,
        velocities,
    }
}

const ROLL: [u32; 8] = [8, 9, 10, 11, 12, 13, 14, 15];
const EIGHTHS: [u32; 8] = [0, 2, 4, 6, 8, 10, 12, 14];

static ROCK: [&[Template]; 3] = [
    &[
        t(&[12, 14], &[Snare, Snare], &[0.8, 0.7]),
        t(&[12, 13, 14], &[Kick, Snare, Snare], &[1.0, 0.7, 0.9]),
    ],
    &[
        t(&[8, 10, 12, 14], &[Snare, Snare, Snare, Snare], &[0.6, 0.7, 0.8, 0.9]),
        t(&[8, 10, 12, 14], &[Snare, Kick, Snare, Kick], &[0.8, 1.0, 0.9, 1.1]),
    ],
    &[
        t(&ROLL, &[Snare; 8], &[0.5, 0.4, 0.6, 0.5, 0.7, 0.6, 0.9, 0.8]),
        t(
            &EIGHTHS,
            &[Kick, Crash, Snare, Snare, Kick, Crash, Snare, Kick],
            &[1.2, 1.0, 0.9, 0.9, 1.2, 1.0, 1.0, 1.2],
        ),
    ],
];

static FUNK: [&[Template]; 3] = [
    &[t(&[13, 15], &[Snare, Snare], &[0.3, 0.4]), t(&[14], &[Open], &[0.8])],
    &[t(&[12, 13, 14, 15], &[Kick, Snare, Kick, Snare], &[0.9, 0.4, 0.9, 0.8])],
    &[t(&[8, 10, 11, 13, 14], &[Snare, Snare, Kick, Snare, Kick], &[0.9, 0.4, 1.0, 0.9, 1.1])],
];

static JAZZ: [&[Template]; 3] = [
    &[t(&[11, 14], &[Snare, Snare], &[0.4, 0.5])],
    &[t(&[8, 11, 14], &[Snare, Snare, Snare], &[0.5, 0.6, 0.7])],
    &[t(&[4, 7, 10, 13], &[Snare, Kick, Snare, Kick], &[0.7, 0.8, 0.8, 0.9])],
];

static BLUES: [&[Template]; 3] = [
    &[t(&[14], &[Snare], &[0.6]), t(&[14], &[Kick], &[0.8])],
    &[
        t(&[10, 12, 14], &[Snare, Snare, Snare], &[0.6, 0.7, 0.9]),
        t(&[12, 14], &[Kick, Snare], &[0.9, 0.8]),
    ],
    &[
        t(&[8, 10, 12, 14], &[Snare, Kick, Snare, Crash], &[0.8, 0.9, 0.9, 1.1]),
        t(&[8, 10, 12, 14], &[Snare, Snare, Snare, Snare], &[0.7, 0.8, 0.9, 1.0]),
    ],
];

static DISCO: [&[Template]; 3] = [
    &[t(&[14], &[Open], &[0.9]), t(&[12, 14], &[Snare, Snare], &[0.7, 0.8])],
    &[t(&[8, 10, 12, 13, 14, 15], &[Snare; 6], &[0.6, 0.7, 0.8, 0.9, 0.9, 1.0])],
    &[t(
        &ROLL,
        &[Snare, Kick, Snare, Kick, Snare, Open, Snare, Crash],
        &[0.8, 0.9, 0.9, 1.0, 1.0, 1.1, 1.1, 1.2],
    )],
];

static ACOUSTIC: [&[Template]; 3] = [
    &[t(&[14], &[Kick], &[0.6]), t(&[12, 14], &[Snare, Snare], &[0.4, 0.5])],
    &[
        t(&[12, 13, 14, 15], &[Snare; 4], &[0.4, 0.5, 0.6, 0.5]),
        t(&[10, 12, 14], &[Kick, Snare, Kick], &[0.7, 0.6, 0.8]),
    ],
    &[t(&[8, 10, 12, 14], &[Snare, Snare, Snare, Crash], &[0.6, 0.7, 0.8, 0.9])],
];

fn templates(genre: GenreFeel) -> &'static [&'static [Template]; 3] {
    match genre {
        GenreFeel::Funk => &FUNK,
        GenreFeel::Jazz => &JAZZ,
        GenreFeel::Blues => &BLUES,
        GenreFeel::Disco => &DISCO,
        GenreFeel::Acoustic => &ACOUSTIC,
        _ => &ROCK,
    }
}

/// A generated fill: hits keyed by step offset from the fill start.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Fill {
    pub steps: Vec<(u32, DrumVoice, f32)>,
    pub length: u32,
    /// Crash on the downbeat that follows
    pub crash: bool,
}

impl Fill {
    pub fn hits_at(&self, offset: u32) -> impl Iterator<Item = (DrumVoice, f32)> + '_ {
        self.steps.iter().filter(move |(s, _, _)| *s == offset).map(|(_, v, vel)| (*v, *vel))
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

/// Pick a template for `genre` at `intensity`, aligned to the end of a
/// `steps_per_measure` bar.
pub fn generate_fill(genre: GenreFeel, intensity: f32, steps_per_measure: u32, rng: &mut GenRng) -> Fill {
    let level = if intensity > 0.75 {
        2
    } else if intensity > 0.4 {
        1
    } else {
        0
    };
    let mut fill = Fill {
        steps: Vec::new(),
        length: steps_per_measure,
        crash: true,
    };
    let Some(template) = rng.pick(templates(genre)[level]) else {
        return fill;
    };
    let shift = steps_per_measure as i64 - 16;
    for ((step, voice), velocity) in template.steps.iter().zip(template.voices).zip(template.velocities) {
        let actual = *step as i64 + shift;
        if actual >= 0 && actual < steps_per_measure as i64 {
            fill.steps.push((actual as u32, *voice, *velocity));
        }
    }
    fill
}

/// What the drums do on a step while a fill is armed.
#[derive(Debug, Clone, PartialEq)]
pub enum FillPlay {
    /// Fill hits replace the groove on this step
    Hits(Vec<DrumHit>),
    /// Fill just ended; play the groove plus these hits
    Finished(Vec<DrumHit>),
    /// Nothing from the fill; play the groove
    Groove,
}

/// A fill scheduled to start at an absolute step.
#[derive(Debug, Clone, PartialEq)]
pub struct ActiveFill {
    pub start_step: u64,
    pub fill: Fill,
}

impl ActiveFill {
    pub fn new(start_step: u64, fill: Fill) -> Self {
        Self { start_step, fill }
    }

    pub fn is_over(&self, step: u64) -> bool {
        step >= self.start_step + self.fill.length as u64
    }

    /// Hits for `step`, scaled by `velocity_scale`. A quiet band only plays
    /// the second half of the fill.
    pub fn play(&self, step: u64, intensity: f32, velocity_scale: f32) -> FillPlay {
        if step < self.start_step {
            return FillPlay::Groove;
        }
        let offset = step - self.start_step;
        if offset >= self.fill.length as u64 {
            let crash = if self.fill.crash {
                vec![DrumHit {
                    voice: Crash,
                    velocity: 1.1 * velocity_scale,
                    timing_offset: 0.0,
                }]
            } else {
                Vec::new()
            };
            return FillPlay::Finished(crash);
        }
        if intensity < 0.5 && (offset as f32) < self.fill.length as f32 / 2.0 {
            return FillPlay::Groove;
        }
        let hits: Vec<DrumHit> = self
            .fill
            .hits_at(offset as u32)
            .map(|(voice, velocity)| DrumHit {
                voice,
                velocity: velocity * velocity_scale,
                timing_offset: 0.0,
            })
            .collect();
        if hits.is_empty() {
            FillPlay::Groove
        } else {
            FillPlay::Hits(hits)
        }
    }
}
