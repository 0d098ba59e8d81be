//! The generation pipeline run by the worker thread.
//!
//! Owns the mirrored band snapshot, one generator per harmonic instrument and
//! a buffer head for each. Every pump advances the heads toward
//! `playback_step + lookahead` and returns note batches stamped with the
//! current epoch and the head's revision. Bass and soloist notes are held
//! back until their successor is known so they can be cut to end where the
//! next note begins.

use std::collections::VecDeque;

use ensemble_types::{BandConfig, Epoch, InstrumentTag, PerformanceState, StepSlot};

use crate::error::GenerationError;
use crate::generators::{BassGenerator, CompingGenerator, GenContext, Generator, HarmonyGenerator, SoloistGenerator};
use crate::rng::GenRng;

pub const DEFAULT_LOOKAHEAD: u32 = 32;
pub const DEFAULT_STALENESS_MEASURES: u32 = 3;

/// Generated material for one instrument, keyed by absolute step.
#[derive(Debug, Clone, PartialEq)]
pub struct NoteBatch {
    pub epoch: Epoch,
    /// Bumped each time this instrument alone is regenerated
    pub revision: u32,
    pub instrument: InstrumentTag,
    pub slots: Vec<(u64, StepSlot)>,
}

#[derive(Debug, Clone)]
struct Pending {
    step: u64,
    slot: StepSlot,
}

impl Pending {
    fn nominal_end(&self) -> u64 {
        let longest = self.slot.notes.iter().map(|n| n.duration_steps).max().unwrap_or(1);
        self.step + longest as u64
    }

    /// Cut every note so it ends no later than `end`.
    fn truncate_to(mut self, end: u64) -> (u64, StepSlot) {
        let room = end.saturating_sub(self.step).max(1) as u32;
        for note in &mut self.slot.notes {
            note.duration_steps = note.duration_steps.min(room).max(1);
        }
        (self.step, self.slot)
    }
}

#[derive(Debug, Clone)]
struct Head {
    instrument: InstrumentTag,
    next_step: u64,
    revision: u32,
    pending: Option<Pending>,
}

impl Head {
    fn new(instrument: InstrumentTag, step: u64) -> Self {
        Self {
            instrument,
            next_step: step,
            revision: 0,
            pending: None,
        }
    }
}

/// Recent note spans of one instrument, for what the others hear.
#[derive(Debug, Default)]
struct Trail {
    spans: VecDeque<(u64, u64, i32)>,
}

impl Trail {
    const CAP: usize = 64;

    fn push(&mut self, start: u64, duration: u32, pitch: i32) {
        self.spans.push_back((start, start + duration.max(1) as u64, pitch));
        while self.spans.len() > Self::CAP {
            self.spans.pop_front();
        }
    }

    fn sounding_at(&self, step: u64) -> bool {
        self.spans.iter().any(|(s, e, _)| *s <= step && step < *e)
    }

    fn latest_at(&self, step: u64) -> Option<i32> {
        self.spans.iter().rev().find(|(s, _, _)| *s <= step).map(|(_, _, p)| *p)
    }

    /// Forget spans starting at or after `step`.
    fn drop_from(&mut self, step: u64) {
        self.spans.retain(|(s, _, _)| *s < step);
    }

    fn clear(&mut self) {
        self.spans.clear();
    }
}

/// Instruments in the order each step is generated. Soloist and comping
/// listen to the bass line of the same step; harmonies listen to the soloist.
const ORDER: [InstrumentTag; 4] = InstrumentTag::GENERATED;

pub struct GenerationPipeline {
    config: BandConfig,
    performance: PerformanceState,
    epoch: Epoch,
    playback_step: u64,
    lookahead: u32,
    staleness_measures: u32,
    running: bool,
    bass: BassGenerator,
    soloist: SoloistGenerator,
    comping: CompingGenerator,
    harmonies: HarmonyGenerator,
    heads: [Head; 4],
    bass_trail: Trail,
    soloist_trail: Trail,
}

impl GenerationPipeline {
    pub fn new(config: BandConfig, seed: u64) -> Self {
        let mut root = GenRng::new(seed);
        let performance = PerformanceState::from_intensity(config.intensity, config.complexity);
        Self {
            config,
            performance,
            epoch: Epoch::default(),
            playback_step: 0,
            lookahead: DEFAULT_LOOKAHEAD,
            staleness_measures: DEFAULT_STALENESS_MEASURES,
            running: false,
            bass: BassGenerator::new(root.fork(1).next_u64()),
            soloist: SoloistGenerator::new(root.fork(2).next_u64()),
            comping: CompingGenerator::new(root.fork(3).next_u64()),
            harmonies: HarmonyGenerator::new(root.fork(4).next_u64()),
            heads: ORDER.map(|i| Head::new(i, 0)),
            bass_trail: Trail::default(),
            soloist_trail: Trail::default(),
        }
    }

    pub fn with_lookahead(mut self, lookahead: u32, staleness_measures: u32) -> Self {
        self.lookahead = lookahead.max(1);
        self.staleness_measures = staleness_measures.max(1);
        self
    }

    pub fn config(&self) -> &BandConfig {
        &self.config
    }

    pub fn performance(&self) -> PerformanceState {
        self.performance
    }

    pub fn epoch(&self) -> Epoch {
        self.epoch
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn playback_step(&self) -> u64 {
        self.playback_step
    }

    pub fn head(&self, instrument: InstrumentTag) -> Option<u64> {
        self.heads.iter().find(|h| h.instrument == instrument).map(|h| h.next_step)
    }

    pub fn has_pending(&self, instrument: InstrumentTag) -> bool {
        self.heads.iter().any(|h| h.instrument == instrument && h.pending.is_some())
    }

    pub fn revision(&self, instrument: InstrumentTag) -> Option<u32> {
        self.heads.iter().find(|h| h.instrument == instrument).map(|h| h.revision)
    }

    /// Steps a held note may wait for its successor.
    pub fn staleness_horizon(&self) -> u64 {
        let measures = self.staleness_measures as u64 * self.config.steps_per_measure() as u64;
        let window = self.lookahead.saturating_sub(4) as u64;
        measures.min(window).max(1)
    }

    /// Replace the mirrored configuration. Heads never move backwards and
    /// never sit below the playback step, so material already generated
    /// keeps the old settings. Part changes that must be heard at once come
    /// with a [`GenerationPipeline::regenerate`] for that instrument.
    pub fn apply_checkpoint(&mut self, config: BandConfig) {
        let arrangement_changed = config.arrangement != self.config.arrangement;
        self.config = config;
        if !self.config.auto_intensity {
            self.performance = PerformanceState::from_intensity(self.config.intensity, self.config.complexity);
        }
        let floor = self.playback_step;
        for head in &mut self.heads {
            head.next_step = head.next_step.max(floor);
            if arrangement_changed {
                head.pending = None;
            }
        }
    }

    pub fn set_performance(&mut self, performance: PerformanceState) {
        self.performance = performance;
    }

    pub fn start(&mut self, step: u64, epoch: Epoch) {
        self.reset_generators();
        self.epoch = epoch;
        self.playback_step = step;
        for head in &mut self.heads {
            head.next_step = step;
            head.pending = None;
        }
        self.running = true;
    }

    pub fn stop(&mut self) {
        self.running = false;
        self.reset_generators();
        for head in &mut self.heads {
            head.pending = None;
        }
    }

    /// Dispatcher reached `step`.
    pub fn request(&mut self, step: u64) {
        self.playback_step = step;
        for head in &mut self.heads {
            head.next_step = head.next_step.max(step);
        }
    }

    /// Restart generation at `step` with fresh memory; later batches carry
    /// `epoch`.
    pub fn flush(&mut self, step: u64, epoch: Epoch) {
        self.reset_generators();
        self.epoch = epoch;
        self.playback_step = step;
        for head in &mut self.heads {
            head.next_step = step;
            head.pending = None;
        }
    }

    /// Restart one instrument at `step` with fresh memory. Its later
    /// batches carry `revision`; the other heads are left alone.
    pub fn regenerate(&mut self, instrument: InstrumentTag, step: u64, revision: u32) {
        let step = step.max(self.playback_step);
        let Some(head) = self.heads.iter_mut().find(|h| h.instrument == instrument) else {
            return;
        };
        head.next_step = step;
        head.pending = None;
        head.revision = revision;
        match instrument {
            InstrumentTag::Bass => {
                self.bass.reset();
                self.bass_trail.drop_from(step);
            }
            InstrumentTag::Soloist => {
                self.soloist.reset();
                self.soloist_trail.drop_from(step);
            }
            InstrumentTag::Comping => self.comping.reset(),
            InstrumentTag::Harmonies => self.harmonies.reset(),
            InstrumentTag::Drums => {}
        }
    }

    fn reset_generators(&mut self) {
        self.bass.reset();
        self.soloist.reset();
        self.comping.reset();
        self.harmonies.reset();
        self.bass_trail.clear();
        self.soloist_trail.clear();
    }

    fn enabled(&self, instrument: InstrumentTag) -> bool {
        instrument != InstrumentTag::Drums && self.config.part_enabled(instrument)
    }

    /// Generate everything up to the lookahead target.
    pub fn pump(&mut self) -> (Vec<NoteBatch>, Vec<GenerationError>) {
        let mut errors = Vec::new();
        let mut out: [Vec<(u64, StepSlot)>; 4] = Default::default();
        if !self.running {
            return (Vec::new(), errors);
        }
        let target = self.playback_step + self.lookahead as u64;
        let horizon = self.staleness_horizon();

        let Some(mut step) = self.heads.iter().map(|h| h.next_step).min() else {
            return (Vec::new(), errors);
        };
        while step < target {
            for idx in 0..self.heads.len() {
                if self.heads[idx].next_step != step {
                    continue;
                }
                let instrument = self.heads[idx].instrument;
                let slot = if self.enabled(instrument) {
                    match self.generate_one(instrument, step) {
                        Ok(slot) => slot,
                        Err(e) => {
                            errors.push(e);
                            StepSlot::default()
                        }
                    }
                } else {
                    StepSlot::default()
                };
                self.record_trail(instrument, step, &slot);

                let head = &mut self.heads[idx];
                if instrument.is_monophonic() {
                    if !slot.notes.is_empty() {
                        if let Some(prev) = head.pending.take() {
                            out[idx].push(prev.truncate_to(step));
                        }
                        head.pending = Some(Pending { step, slot });
                    } else if !slot.is_empty() {
                        out[idx].push((step, slot));
                    }
                    let known = step + 1;
                    let expired = head
                        .pending
                        .as_ref()
                        .is_some_and(|p| known >= p.nominal_end() || known - p.step >= horizon);
                    if expired {
                        if let Some(p) = head.pending.take() {
                            out[idx].push(p.truncate_to(known));
                        }
                    }
                } else if !slot.is_empty() {
                    out[idx].push((step, slot));
                }
                head.next_step = step + 1;
            }
            step += 1;
        }

        let batches = self
            .heads
            .iter()
            .zip(out)
            .filter(|(_, slots)| !slots.is_empty())
            .map(|(head, slots)| NoteBatch {
                epoch: self.epoch,
                revision: head.revision,
                instrument: head.instrument,
                slots,
            })
            .collect();
        (batches, errors)
    }

    fn record_trail(&mut self, instrument: InstrumentTag, step: u64, slot: &StepSlot) {
        let trail = match instrument {
            InstrumentTag::Bass => &mut self.bass_trail,
            InstrumentTag::Soloist => &mut self.soloist_trail,
            _ => return,
        };
        if let Some(note) = slot.notes.iter().find(|n| !n.muted) {
            trail.push(step, note.duration_steps, note.pitch);
        }
    }

    fn generate_one(&mut self, instrument: InstrumentTag, step: u64) -> Result<StepSlot, GenerationError> {
        let arrangement = &self.config.arrangement;
        let (Some(entry), Some((chord, step_in_chord))) = (arrangement.entry_at(step), arrangement.chord_at(step)) else {
            return Ok(StepSlot::default());
        };
        let next = arrangement
            .chord_at(step + 4)
            .map(|(c, _)| c)
            .filter(|c| !c.intervals.is_empty());
        let ctx = GenContext {
            config: &self.config,
            performance: self.performance,
            step,
            step_in_chord,
            chord_steps: entry.len(),
            chord_index: entry.chord_index,
            bass_pitch: self.bass_trail.latest_at(step),
            soloist_pitch: self.soloist_trail.latest_at(step),
            soloist_busy: self.soloist_trail.sounding_at(step),
        };
        match instrument {
            InstrumentTag::Bass => self.bass.generate(chord, next, &ctx),
            InstrumentTag::Soloist => self.soloist.generate(chord, next, &ctx),
            InstrumentTag::Comping => self.comping.generate(chord, next, &ctx),
            InstrumentTag::Harmonies => self.harmonies.generate(chord, next, &ctx),
            InstrumentTag::Drums => Ok(StepSlot::default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use ensemble_types::{Arrangement, Chord, ChordQuality, Key, TimeSignature};

    fn config() -> BandConfig {
        let chords = ["C", "F", "G", "C"]
            .iter()
            .zip([60, 65, 67, 60])
            .map(|(s, r)| Chord::new(*s, r, ChordQuality::Major, false, 4.0))
            .collect();
        BandConfig {
            arrangement: Arc::new(Arrangement::compile(chords, TimeSignature::FourFour, Key::C, false)),
            ..BandConfig::default()
        }
    }

    fn collect(p: &mut GenerationPipeline, upto: u64) -> Vec<NoteBatch> {
        let mut all = Vec::new();
        let mut step = p.playback_step();
        while step < upto {
            p.request(step);
            let (batches, errors) = p.pump();
            assert!(errors.is_empty());
            all.extend(batches);
            step += 8;
        }
        all
    }

    #[test]
    fn heads_reach_lookahead() {
        let mut p = GenerationPipeline::new(config(), 1);
        p.start(0, Epoch::default());
        p.pump();
        for i in ORDER {
            assert_eq!(p.head(i), Some(DEFAULT_LOOKAHEAD as u64));
        }
    }

    #[test]
    fn monophonic_notes_never_overlap() {
        let mut p = GenerationPipeline::new(config(), 9);
        p.start(0, Epoch::default());
        let batches = collect(&mut p, 1024);
        for inst in [InstrumentTag::Bass, InstrumentTag::Soloist] {
            let mut spans: Vec<(u64, u64)> = batches
                .iter()
                .filter(|b| b.instrument == inst)
                .flat_map(|b| b.slots.iter())
                .flat_map(|(s, slot)| slot.notes.iter().map(move |n| (*s, *s + n.duration_steps as u64)))
                .collect();
            spans.sort();
            for pair in spans.windows(2) {
                assert!(pair[0].1 <= pair[1].0, "{:?} overlaps in {:?}", inst, pair);
            }
        }
    }

    #[test]
    fn flush_resets_heads_and_drops_pending() {
        let mut p = GenerationPipeline::new(config(), 3);
        p.start(0, Epoch::default());
        collect(&mut p, 64);
        let epoch = p.epoch().next();
        p.flush(100, epoch);
        assert_eq!(p.epoch(), epoch);
        for i in ORDER {
            assert_eq!(p.head(i), Some(100));
            assert!(!p.has_pending(i));
        }
        let (batches, _) = p.pump();
        assert!(batches.iter().all(|b| b.epoch == epoch));
        assert!(batches.iter().flat_map(|b| b.slots.iter()).all(|(s, _)| *s >= 100));
    }

    #[test]
    fn checkpoint_never_backfills() {
        let mut p = GenerationPipeline::new(config(), 4);
        p.start(0, Epoch::default());
        p.request(40);
        let mut cfg = config();
        cfg.version = 2;
        p.apply_checkpoint(cfg);
        for i in ORDER {
            assert!(p.head(i).is_some_and(|h| h >= 40));
        }
    }

    #[test]
    fn regenerate_moves_one_head() {
        let mut p = GenerationPipeline::new(config(), 8);
        p.start(0, Epoch::default());
        p.pump();
        p.request(8);
        p.regenerate(InstrumentTag::Bass, 12, 1);
        assert_eq!(p.head(InstrumentTag::Bass), Some(12));
        assert!(!p.has_pending(InstrumentTag::Bass));
        assert_eq!(p.revision(InstrumentTag::Bass), Some(1));
        assert_eq!(p.head(InstrumentTag::Comping), Some(DEFAULT_LOOKAHEAD as u64));

        let (batches, _) = p.pump();
        assert!(!batches.is_empty());
        for b in &batches {
            assert_eq!(b.instrument == InstrumentTag::Bass, b.revision == 1);
            if b.instrument == InstrumentTag::Bass {
                assert!(b.slots.iter().all(|(s, _)| *s >= 12));
            }
        }
        // Never behind playback
        p.regenerate(InstrumentTag::Comping, 2, 1);
        assert_eq!(p.head(InstrumentTag::Comping), Some(8));
    }

    #[test]
    fn harmonies_follow_their_enable_flag() {
        let mut cfg = config();
        cfg.intensity = 0.7;
        cfg.auto_intensity = false;
        let mut p = GenerationPipeline::new(cfg.clone(), 10);
        p.start(0, Epoch::default());
        assert!(collect(&mut p, 128).iter().all(|b| b.instrument != InstrumentTag::Harmonies));

        cfg.harmonies.enabled = true;
        let mut p = GenerationPipeline::new(cfg, 10);
        p.start(0, Epoch::default());
        let batches = collect(&mut p, 128);
        assert!(batches
            .iter()
            .filter(|b| b.instrument == InstrumentTag::Harmonies)
            .flat_map(|b| b.slots.iter())
            .any(|(_, slot)| !slot.notes.is_empty()));
    }

    #[test]
    fn disabled_instrument_stays_silent() {
        let mut cfg = config();
        cfg.comping.enabled = false;
        let mut p = GenerationPipeline::new(cfg, 5);
        p.start(0, Epoch::default());
        let batches = collect(&mut p, 256);
        assert!(batches.iter().all(|b| b.instrument != InstrumentTag::Comping));
        assert!(batches.iter().any(|b| b.instrument == InstrumentTag::Bass));
    }

    #[test]
    fn stopped_pipeline_generates_nothing() {
        let mut p = GenerationPipeline::new(config(), 6);
        let (batches, errors) = p.pump();
        assert!(batches.is_empty() && errors.is_empty());
    }

    #[test]
    fn empty_chord_reports_error_and_continues() {
        let mut cfg = config();
        let mut arr = (*cfg.arrangement).clone();
        arr.chords[1].intervals.clear();
        cfg.arrangement = Arc::new(arr);
        let mut p = GenerationPipeline::new(cfg, 7);
        p.start(0, Epoch::default());
        let (batches, errors) = p.pump();
        assert!(!errors.is_empty());
        assert!(errors.iter().all(|e| (16..32).contains(&e.step)));
        assert!(!batches.is_empty());
    }

    #[test]
    fn staleness_horizon_respects_lookahead() {
        let p = GenerationPipeline::new(config(), 1).with_lookahead(16, 3);
        assert_eq!(p.staleness_horizon(), 12);
        let q = GenerationPipeline::new(config(), 1).with_lookahead(128, 1);
        assert_eq!(q.staleness_horizon(), 16);
    }
}
