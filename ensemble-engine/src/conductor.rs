//! Band-level energy controller.
//!
//! Runs on the dispatch side once per scheduled step. It ramps the band
//! intensity toward a target chosen from the song form, arms drum fills
//! before section and loop boundaries, and drifts the tempo with the energy.
//! Generators only ever see the [`PerformanceState`] it publishes.

use ensemble_types::{Arrangement, BandConfig, PerformanceState};

use crate::fills::{generate_fill, ActiveFill, Fill, FillPlay};
use crate::form::{analyze, section_energy, FormAnalysis, StructuralRole};
use crate::rng::GenRng;

const DEFAULT_RAMP: f32 = 0.0005;
const FALL_RATE: f32 = 2.5;

/// Intensity band for a position in the eight-loop arc.
fn macro_band(form_iteration: u32) -> (f32, f32) {
    match form_iteration % 8 {
        0 => (0.15, 0.45),
        1 | 2 => (0.35, 0.75),
        3 | 4 => (0.6, 1.0),
        5 | 6 => (0.3, 0.6),
        _ => (0.1, 0.35),
    }
}

#[derive(Debug, Clone)]
pub struct Conductor {
    rng: GenRng,
    intensity: f32,
    complexity: f32,
    target: f32,
    ramp_step: f32,
    loop_count: u32,
    form_iteration: u32,
    /// BPM added to the configured tempo
    tempo_offset: f32,
    fill: Option<ActiveFill>,
    form: FormAnalysis,
    auto_intensity: bool,
}

impl Conductor {
    pub fn new(seed: u64, config: &BandConfig) -> Self {
        Self {
            rng: GenRng::new(seed),
            intensity: config.intensity.clamp(0.01, 1.0),
            complexity: config.complexity,
            target: config.intensity,
            ramp_step: DEFAULT_RAMP,
            loop_count: 0,
            form_iteration: 0,
            tempo_offset: 0.0,
            fill: None,
            form: analyze(&config.arrangement),
            auto_intensity: config.auto_intensity,
        }
    }

    pub fn set_arrangement(&mut self, arrangement: &Arrangement) {
        self.form = analyze(arrangement);
    }

    /// Take user-facing values from a new configuration. Without
    /// auto-intensity the user's setting is the band intensity.
    pub fn apply_config(&mut self, config: &BandConfig) {
        self.complexity = config.complexity;
        self.auto_intensity = config.auto_intensity;
        if !config.auto_intensity {
            self.intensity = config.intensity.clamp(0.01, 1.0);
            self.target = self.intensity;
        }
        if config.tempo_drift <= 0.0 {
            self.tempo_offset = 0.0;
        }
    }

    pub fn intensity(&self) -> f32 {
        self.intensity
    }

    pub fn target(&self) -> f32 {
        self.target
    }

    pub fn tempo_offset(&self) -> f32 {
        self.tempo_offset
    }

    pub fn loop_count(&self) -> u32 {
        self.loop_count
    }

    pub fn form(&self) -> &FormAnalysis {
        &self.form
    }

    pub fn fill(&self) -> Option<&ActiveFill> {
        self.fill.as_ref()
    }

    pub fn performance(&self) -> PerformanceState {
        PerformanceState::from_intensity(self.intensity, self.complexity)
    }

    /// Advance one scheduled step. Returns true when a fill was armed.
    pub fn tick(&mut self, step: u64, config: &BandConfig) -> bool {
        if self.auto_intensity {
            self.ramp();
        }
        let spm = config.steps_per_measure() as u64;
        if spm > 0 && step % spm == 0 {
            self.update_tempo_drift(step, config);
        }
        if !config.drums_enabled {
            return false;
        }
        let armed = self.check_transition(step, config);
        self.anticipate(step, config) || armed
    }

    fn ramp(&mut self) {
        if (self.intensity - self.target).abs() <= 0.001 {
            return;
        }
        let step = self.ramp_step.abs();
        let next = if self.intensity < self.target {
            self.intensity + step
        } else {
            self.intensity - step * FALL_RATE
        };
        self.intensity = next.clamp(0.01, 1.0);
    }

    fn check_transition(&mut self, step: u64, config: &BandConfig) -> bool {
        let arr = &config.arrangement;
        if arr.is_empty() {
            return false;
        }
        let total = arr.total_steps as u64;
        let spm = config.steps_per_measure() as u64;
        let local = step % total;
        if spm == 0 || local % spm != 0 {
            return false;
        }
        let measure_end = local + spm;
        if measure_end - 1 >= total {
            return false;
        }
        let Some(entry) = arr.entry_at(measure_end - 1) else {
            return false;
        };
        let is_loop_end = measure_end >= total;
        let next_entry = if is_loop_end {
            arr.step_map.first()
        } else {
            arr.entry_at(measure_end)
        };
        let Some(next_entry) = next_entry else {
            return false;
        };
        let (Some(chord), Some(next_chord)) = (arr.chords.get(entry.chord_index), arr.chords.get(next_entry.chord_index))
        else {
            return false;
        };
        if !is_loop_end && next_chord.section_id == chord.section_id {
            return false;
        }

        let next_section = arr.section_at(next_entry.start as u64);
        let mut should_fill = !next_section.is_some_and(|s| s.seamless);

        if is_loop_end && should_fill {
            self.loop_count += 1;
            self.form_iteration += 1;
            if total <= 64 {
                let every = if self.intensity > 0.75 {
                    1
                } else if self.intensity > 0.4 {
                    2
                } else {
                    4
                };
                should_fill = self.loop_count % every == 0;
            }
        }
        if !should_fill {
            return false;
        }

        let (floor, ceiling) = macro_band(self.form_iteration);
        let form_section = next_section.and_then(|s| self.form.section_starting_at(s.start_step));
        let mut target = match form_section {
            Some(section) => {
                let mid = (floor + ceiling) / 2.0;
                let mut t = match section.role {
                    StructuralRole::Exposition => floor + 0.1,
                    StructuralRole::Development => mid + 0.1,
                    StructuralRole::Contrast => {
                        if self.intensity > mid {
                            floor
                        } else {
                            ceiling
                        }
                    }
                    StructuralRole::Build => ceiling,
                    StructuralRole::Climax => ceiling + 0.1,
                    StructuralRole::Recapitulation => floor + 0.2,
                    StructuralRole::Resolution => floor - 0.1,
                };
                if section.flux > 2.6 {
                    t += 0.1;
                }
                if section.iteration == 2 {
                    t += 0.1;
                } else if section.iteration >= 3 {
                    t -= 0.15;
                }
                t
            }
            None => section_energy(&next_chord.section_label),
        };
        target = target.clamp(floor, ceiling);
        target = (target + self.rng.range(-0.075, 0.075)).clamp(0.1, 1.0);
        if is_loop_end && self.auto_intensity {
            target = (target + self.rng.range(-0.1, 0.1)).clamp(0.3, 0.95);
        }

        let fill = generate_fill(config.genre, self.intensity, spm as u32, &mut self.rng);
        self.fill = Some(ActiveFill::new(step, fill));
        if self.auto_intensity {
            self.target = target;
            self.ramp_step = (self.target - self.intensity) / spm as f32;
        }
        log::debug!(
            target: "ensemble::conductor",
            "fill armed at step {} (loop end: {}), target {:.2}",
            step,
            is_loop_end,
            target
        );
        true
    }

    /// One-step kick and open-hat push on the last step of a chord that
    /// leaves its section.
    fn anticipate(&mut self, step: u64, config: &BandConfig) -> bool {
        let arr = &config.arrangement;
        if arr.is_empty() || self.fill.is_some() || self.intensity <= 0.4 {
            return false;
        }
        let local = (step % arr.total_steps as u64) as u32;
        let Some(pos) = arr.step_map.iter().position(|e| e.start <= local && local < e.end) else {
            return false;
        };
        let entry = arr.step_map[pos];
        if local != entry.end - 1 {
            return false;
        }
        let leaves_section = match arr.step_map.get(pos + 1) {
            None => true,
            Some(next) => match (arr.chords.get(entry.chord_index), arr.chords.get(next.chord_index)) {
                (Some(a), Some(b)) => a.section_id != b.section_id,
                _ => false,
            },
        };
        if !leaves_section {
            return false;
        }
        let push = Fill {
            steps: vec![
                (0, ensemble_types::DrumVoice::Kick, 0.6),
                (0, ensemble_types::DrumVoice::Open, 0.9),
            ],
            length: 1,
            crash: true,
        };
        self.fill = Some(ActiveFill::new(step, push));
        true
    }

    fn update_tempo_drift(&mut self, step: u64, config: &BandConfig) {
        if config.tempo_drift <= 0.0 {
            self.tempo_offset = 0.0;
            return;
        }
        let Some((chord, _)) = config.arrangement.chord_at(step) else {
            return;
        };
        let label = chord.section_label.to_lowercase();
        let energy = if label.contains("section") {
            self.intensity
        } else {
            section_energy(&label) * 0.6 + self.intensity * 0.4
        };
        let drift = config.tempo_drift;
        let filling = self.fill.is_some();
        let mut target = (energy - 0.5) * 2.0 * 15.0 * drift;
        if filling {
            target += 8.0 * drift;
        }
        let lerp = if filling { 0.08 } else { 0.03 };
        self.tempo_offset += (target - self.tempo_offset) * lerp;
        if self.tempo_offset.abs() < 0.01 && target.abs() < 0.01 {
            self.tempo_offset = 0.0;
        }
    }

    /// Drum material from an armed fill for `step`. Clears the fill once it
    /// has played out.
    pub fn fill_drums(&mut self, step: u64) -> FillPlay {
        let Some(active) = &self.fill else {
            return FillPlay::Groove;
        };
        let velocity_scale = self.performance().velocity_scale;
        let play = active.play(step, self.intensity, velocity_scale);
        if matches!(play, FillPlay::Finished(_)) {
            self.fill = None;
        }
        play
    }

    /// Forget loop counting, fills and drift. Intensity restarts from the
    /// user setting.
    pub fn reset(&mut self, config: &BandConfig) {
        self.intensity = config.intensity.clamp(0.01, 1.0);
        self.target = self.intensity;
        self.complexity = config.complexity;
        self.auto_intensity = config.auto_intensity;
        self.ramp_step = DEFAULT_RAMP;
        self.loop_count = 0;
        self.form_iteration = 0;
        self.tempo_offset = 0.0;
        self.fill = None;
        self.form = analyze(&config.arrangement);
    }
}
