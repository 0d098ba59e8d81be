//! Dispatch side of playback.
//!
//! Owns the [`ClockScheduler`] and everything that runs on its pump: the
//! per-instrument buffers fed by worker batches, the conductor, the groove
//! engine and the visual event queue. Each due step is turned into sink calls
//! here; generation only ever happens on the worker.

use std::collections::VecDeque;
use std::sync::Arc;

use serde::Serialize;

use ensemble_types::{
    BandConfig, DrumHit, DrumPattern, Epoch, GenreFeel, InstrumentTag, NoteEvent, StepSlot,
};

use crate::buffer::InstrumentBuffers;
use crate::clock::{ClockConfig, ClockScheduler, StepHandler, TransportState};
use crate::conductor::Conductor;
use crate::fills::FillPlay;
use crate::generators::resolution::cadence;
use crate::generators::soloist::straightness;
use crate::groove::{GrooveContext, GrooveEngine};
use crate::sink::SynthesisSink;
use crate::sync_log::SyncLogWriter;
use crate::telemetry::TelemetrySummary;
use crate::worker::{WorkerCmd, WorkerFeedback, WorkerLink};

pub const VISUAL_QUEUE_CAP: usize = 256;

const PARTS: usize = InstrumentTag::GENERATED.len();

/// Beats the final cadence rings before the engine stops.
const RING_OUT_BEATS: f64 = 8.0;
/// Beats into the ring-out at which the sustain pedal lifts.
const PEDAL_RELEASE_BEATS: f64 = 6.0;

/// Display cue for whatever draws the performance.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum VisualEvent {
    Step { step: u64, time: f64 },
    ChordChange { symbol: String, chord_index: usize, time: f64 },
    Flash { intensity: f32, time: f64 },
    CountIn { beat: u32, time: f64 },
    SectionChange { label: String, time: f64 },
}

/// Counters for what the dispatcher saw.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct DispatchStats {
    pub steps: u64,
    pub notes: u64,
    pub drum_hits: u64,
    /// Batches dropped for carrying an old epoch or revision
    pub stale_batches: u64,
    /// Slots dropped for arriving after their step
    pub late_slots: u64,
    pub generation_errors: u64,
    pub last_telemetry: Option<TelemetrySummary>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DispatchOptions {
    pub clock: ClockConfig,
    pub metronome: bool,
    /// Arm the ending once this many seconds have been played
    pub session_timer: Option<f64>,
    pub seed: u64,
}

impl Default for DispatchOptions {
    fn default() -> Self {
        Self {
            clock: ClockConfig::default(),
            metronome: false,
            session_timer: None,
            seed: 0,
        }
    }
}

struct Stage {
    config: BandConfig,
    buffers: InstrumentBuffers,
    conductor: Conductor,
    groove: GrooveEngine,
    pattern: DrumPattern,
    epoch: Epoch,
    /// No slot below this step is accepted
    flush_floor: u64,
    /// Per generated instrument, in generation order
    revisions: [u32; PARTS],
    /// Monophonic voices are released at the first step dispatched from here
    cut_at: [Option<u64>; PARTS],
    visuals: VecDeque<VisualEvent>,
    pending_genre: Option<GenreFeel>,
    metronome: bool,
    session_timer: Option<f64>,
    started_at: f64,
    last_request: Option<u64>,
    stats: DispatchStats,
}

pub struct Dispatcher {
    clock: ClockScheduler,
    stage: Stage,
}

fn send(worker: &mut WorkerLink, cmd: WorkerCmd) {
    if let Err(e) = worker.send(cmd) {
        log::warn!(target: "ensemble::dispatch", "{}", e);
    }
}

fn scaled(note: &NoteEvent, scale: f32) -> NoteEvent {
    let mut out = note.clone();
    out.velocity = (note.velocity * scale).clamp(0.0, 1.0);
    out
}

impl Stage {
    fn push_visual(&mut self, event: VisualEvent) {
        if self.visuals.len() >= VISUAL_QUEUE_CAP {
            self.visuals.pop_front();
        }
        self.visuals.push_back(event);
    }

    fn sixteenth(&self) -> f64 {
        BandConfig::sixteenth(self.config.bpm + self.conductor.tempo_offset())
    }

    fn absorb(&mut self, feedback: Vec<WorkerFeedback>, playback_step: u64) {
        for fb in feedback {
            match fb {
                WorkerFeedback::Notes(batch) => {
                    let current = batch
                        .instrument
                        .generated_index()
                        .is_some_and(|i| self.revisions[i] == batch.revision);
                    if batch.epoch != self.epoch || !current {
                        self.stats.stale_batches += 1;
                        continue;
                    }
                    let floor = self.flush_floor.max(playback_step);
                    let Some(buffer) = self.buffers.get_mut(batch.instrument) else {
                        continue;
                    };
                    for (step, slot) in batch.slots {
                        if step < floor {
                            self.stats.late_slots += 1;
                            continue;
                        }
                        buffer.insert(step, slot);
                    }
                }
                WorkerFeedback::Error(e) => {
                    self.stats.generation_errors += 1;
                    log::debug!(target: "ensemble::dispatch", "generation error reported: {}", e);
                }
                WorkerFeedback::Telemetry(summary) => {
                    if summary.overruns > 0 {
                        log::debug!(
                            target: "ensemble::dispatch",
                            "worker overran its interval {} times (max {}us)",
                            summary.overruns,
                            summary.max_us
                        );
                    }
                    self.stats.last_telemetry = Some(summary);
                }
            }
        }
    }

    /// Drop buffered material after `step` and restart generation there.
    /// The kept bass and soloist notes at `step` last one step, since the
    /// successors they were cut against are gone.
    fn flush_after(&mut self, step: u64, worker: &mut WorkerLink) {
        let kept: Vec<(InstrumentTag, StepSlot)> = InstrumentTag::GENERATED
            .iter()
            .filter_map(|&inst| {
                let mut slot = self.buffers.get_mut(inst)?.take(step)?;
                if inst.is_monophonic() {
                    for note in &mut slot.notes {
                        note.duration_steps = 1;
                    }
                }
                Some((inst, slot))
            })
            .collect();
        self.buffers.clear();
        for (inst, slot) in kept {
            if let Some(buffer) = self.buffers.get_mut(inst) {
                buffer.insert(step, slot);
            }
        }
        self.flush_to(step + 1, worker);
    }

    fn flush_to(&mut self, step: u64, worker: &mut WorkerLink) {
        self.epoch = self.epoch.next();
        self.flush_floor = step;
        self.cut_at = [Some(step); PARTS];
        self.last_request = None;
        send(worker, WorkerCmd::Flush { step, epoch: self.epoch });
    }

    /// Throw away `instrument`'s buffered material and have the worker
    /// write it again from `step` under the current settings.
    fn regenerate(&mut self, instrument: InstrumentTag, step: u64, worker: &mut WorkerLink) {
        let Some(idx) = instrument.generated_index() else {
            return;
        };
        self.revisions[idx] = self.revisions[idx].wrapping_add(1);
        self.cut_at[idx] = Some(step);
        if let Some(buffer) = self.buffers.get_mut(instrument) {
            buffer.clear();
        }
        log::debug!(target: "ensemble::dispatch", "{} changed, regenerating from step {}", instrument, step);
        send(
            worker,
            WorkerCmd::Regenerate {
                instrument,
                step,
                revision: self.revisions[idx],
            },
        );
    }
}

/// One pump's view of the dispatch side plus the outputs it writes to.
struct StepDriver<'a> {
    stage: &'a mut Stage,
    sink: &'a mut dyn SynthesisSink,
    worker: &'a mut WorkerLink,
    sync: &'a mut SyncLogWriter,
    now: f64,
}

impl StepHandler for StepDriver<'_> {
    fn on_due(&mut self, clock: &mut ClockScheduler) -> bool {
        match clock.state() {
            TransportState::CountingIn { beat } => {
                self.count_in(clock, beat);
                true
            }
            TransportState::Playing | TransportState::EndingArmed => self.play(clock),
            TransportState::Resolving { .. } | TransportState::Stopped => false,
        }
    }
}

impl StepDriver<'_> {
    fn count_in(&mut self, clock: &mut ClockScheduler, beat: u32) {
        let ts = self.stage.config.time_signature;
        let spb = ts.steps_per_beat();
        let time = clock.next_time();
        let frequency = if beat == 0 {
            1000.0
        } else if ts.step_info((beat * spb) as u64).is_group_start {
            800.0
        } else {
            440.0
        };
        self.sink.click(frequency, time);
        self.stage.push_visual(VisualEvent::CountIn { beat, time });
        let beat_duration = self.stage.sixteenth() * spb as f64;
        if clock.advance_count_in(beat_duration, ts.beats()) {
            log::debug!(target: "ensemble::clock", "count-in done, step 0 at {:.3}s", clock.next_time());
        }
    }

    fn play(&mut self, clock: &mut ClockScheduler) -> bool {
        let step = clock.step();
        let spm = self.stage.config.steps_per_measure().max(1) as u64;
        let total = self.stage.config.arrangement.total_steps as u64;
        let loop_len = if total > 0 { total } else { spm };

        if clock.state() == TransportState::Playing {
            if let Some(limit) = self.stage.session_timer {
                if self.now - self.stage.started_at >= limit {
                    log::info!(target: "ensemble::clock", "session timer expired, ending at loop end");
                    clock.set_state(TransportState::EndingArmed);
                }
            }
        }

        if clock.state() == TransportState::EndingArmed && step > 0 && step % loop_len == 0 {
            self.resolve(clock);
            return false;
        }

        if step % spm == 0 {
            if let Some(genre) = self.stage.pending_genre.take() {
                self.apply_genre(clock, genre, step);
            }
        }

        self.dispatch(clock);

        let cfg = &self.stage.config;
        let sixteenth = self.stage.sixteenth();
        clock.advance_step(sixteenth, cfg.swing, cfg.swing_subdivision, cfg.time_signature);
        true
    }

    fn apply_genre(&mut self, clock: &mut ClockScheduler, genre: GenreFeel, step: u64) {
        let stage = &mut *self.stage;
        log::info!(target: "ensemble::dispatch", "genre {} -> {} at step {}", stage.config.genre.name(), genre.name(), step);
        stage.config.genre = genre;
        stage.config.swing = genre.default_swing();
        stage.config.swing_subdivision = genre.default_subdivision();
        stage.config.version += 1;
        stage.pattern = DrumPattern::preset(genre);
        stage.conductor.apply_config(&stage.config);
        clock.re_anchor();
        self.sync.checkpoint(stage.config.clone());
        stage.flush_after(step, self.worker);
        stage.push_visual(VisualEvent::Flash {
            intensity: 0.15,
            time: clock.next_time(),
        });
    }

    fn dispatch(&mut self, clock: &ClockScheduler) {
        let step = clock.step();
        let time = clock.next_time();
        let stage = &mut *self.stage;
        let ts = stage.config.time_signature;
        let info = ts.step_info(step);

        stage.conductor.tick(step, &stage.config);
        if info.step_in_measure == 0 {
            self.sync.performance(stage.conductor.performance());
        }
        let velocity_scale = stage.conductor.performance().velocity_scale;
        let sixteenth = stage.sixteenth();

        stage.stats.steps += 1;
        stage.push_visual(VisualEvent::Step { step, time });

        if info.is_beat_start {
            let (frequency, flash) = if info.step_in_measure == 0 {
                (1000.0, 0.2)
            } else if info.is_group_start {
                (800.0, 0.15)
            } else {
                (600.0, 0.1)
            };
            if stage.metronome {
                self.sink.click(frequency, time);
            }
            stage.push_visual(VisualEvent::Flash { intensity: flash, time });
        }

        if stage.config.drums_enabled {
            let cx = GrooveContext {
                genre: stage.config.genre,
                intensity: stage.conductor.intensity(),
                complexity: stage.config.complexity,
                bpm: stage.config.bpm,
            };
            let mut hits: Vec<DrumHit> = Vec::new();
            let groove = match stage.conductor.fill_drums(step) {
                FillPlay::Hits(fill) => {
                    let pocket = GrooveEngine::pocket_offset(&cx);
                    hits.extend(fill.into_iter().map(|h| DrumHit {
                        timing_offset: h.timing_offset + pocket,
                        ..h
                    }));
                    false
                }
                FillPlay::Finished(extra) => {
                    hits.extend(extra);
                    true
                }
                FillPlay::Groove => true,
            };
            if groove {
                let pattern = &stage.pattern;
                hits.extend(
                    stage
                        .groove
                        .hits(pattern, step, ts, &cx)
                        .into_iter()
                        .map(|h| DrumHit {
                            velocity: h.velocity * velocity_scale,
                            ..h
                        }),
                );
            }
            for h in hits {
                self.sink.drum(h.voice, h.velocity, time + h.timing_offset);
                stage.stats.drum_hits += 1;
            }
        }

        let arrangement = Arc::clone(&stage.config.arrangement);
        let chord = arrangement.chord_at(step);
        if let Some((chord, step_in_chord)) = chord {
            if step_in_chord == 0 {
                let chord_index = arrangement.entry_at(step).map_or(0, |e| e.chord_index);
                stage.push_visual(VisualEvent::ChordChange {
                    symbol: chord.symbol.clone(),
                    chord_index,
                    time,
                });
                stage.push_visual(VisualEvent::Flash { intensity: 0.15, time });
            }
            if let Some(section) = arrangement.section_at(step) {
                let local = (step % arrangement.total_steps.max(1) as u64) as u32;
                if local == section.start_step {
                    stage.push_visual(VisualEvent::SectionChange {
                        label: section.label.clone(),
                        time,
                    });
                }
            }
        }

        for (idx, inst) in InstrumentTag::GENERATED.into_iter().enumerate() {
            let cut = stage.cut_at[idx].is_some_and(|s| step >= s);
            if cut {
                stage.cut_at[idx] = None;
            }
            let slot = stage.buffers.get_mut(inst).and_then(|b| b.take(step));
            let base = match inst {
                InstrumentTag::Soloist => {
                    clock.blended_time(straightness(stage.config.genre, stage.config.soloist.style))
                }
                _ => time,
            };
            if cut && inst.is_monophonic() {
                // Material from before the flush may still ring; end it before
                // the first new onset.
                let at = slot
                    .iter()
                    .flat_map(|s| s.notes.iter())
                    .map(|n| base + n.timing_offset)
                    .fold(time, f64::min);
                self.sink.release(inst, at);
            }
            let Some(slot) = slot else {
                continue;
            };
            // No harmony to play against
            if chord.is_none() {
                continue;
            }
            match inst {
                InstrumentTag::Soloist => {
                    let notes: Vec<NoteEvent> = if stage.config.double_stops {
                        slot.notes
                    } else {
                        slot.notes
                            .into_iter()
                            .take(1)
                            .map(|mut n| {
                                n.double_stop = None;
                                n
                            })
                            .collect()
                    };
                    let voices: usize = notes.iter().map(|n| 1 + n.double_stop.is_some() as usize).sum();
                    let comp = 1.0 / (voices.max(1) as f32).sqrt();
                    for n in &notes {
                        let out = scaled(n, velocity_scale * comp);
                        self.sink
                            .note(&out, base + n.timing_offset, n.duration_steps as f64 * sixteenth);
                        stage.stats.notes += 1;
                    }
                }
                _ => {
                    for p in &slot.pedal {
                        self.sink.pedal(inst, p.down, time + p.timing_offset);
                    }
                    for n in &slot.notes {
                        let out = scaled(n, velocity_scale);
                        self.sink
                            .note(&out, time + n.timing_offset, n.duration_steps as f64 * sixteenth);
                        stage.stats.notes += 1;
                    }
                }
            }
        }
    }

    fn resolve(&mut self, clock: &mut ClockScheduler) {
        let stage = &mut *self.stage;
        let time = clock.next_time();
        let beat = 60.0 / stage.config.bpm.max(1.0) as f64;
        let sixteenth = BandConfig::sixteenth(stage.config.bpm);
        let key = stage.config.key;
        log::info!(target: "ensemble::clock", "resolving to {} at step {}", key.name(), clock.step());

        let cad = cadence(&stage.config, key);
        for p in &cad.pedal {
            self.sink.pedal(InstrumentTag::Comping, p.down, time + p.timing_offset);
        }
        for n in &cad.notes {
            self.sink.note(n, time + n.timing_offset, n.duration_steps as f64 * sixteenth);
        }
        for d in &cad.drums {
            self.sink.drum(d.voice, d.velocity, time + d.timing_offset);
        }
        if !cad.pedal.is_empty() {
            self.sink.pedal(InstrumentTag::Comping, false, time + PEDAL_RELEASE_BEATS * beat);
        }
        let stop_at = time + RING_OUT_BEATS * beat;
        self.sink.release_all(stop_at);
        stage.push_visual(VisualEvent::Flash { intensity: 0.2, time });

        stage.buffers.clear();
        stage.pending_genre = None;
        send(self.worker, WorkerCmd::Stop);
        clock.set_state(TransportState::Resolving { stop_at });
    }
}

impl Dispatcher {
    pub fn new(config: BandConfig, options: DispatchOptions) -> Self {
        let conductor = Conductor::new(options.seed ^ 0xC0DC, &config);
        let pattern = DrumPattern::preset(config.genre);
        Self {
            clock: ClockScheduler::new(options.clock),
            stage: Stage {
                config,
                buffers: InstrumentBuffers::new(),
                conductor,
                groove: GrooveEngine::new(options.seed ^ 0x6800),
                pattern,
                epoch: Epoch::default(),
                flush_floor: 0,
                revisions: [0; PARTS],
                cut_at: [None; PARTS],
                visuals: VecDeque::new(),
                pending_genre: None,
                metronome: options.metronome,
                session_timer: options.session_timer,
                started_at: 0.0,
                last_request: None,
                stats: DispatchStats::default(),
            },
        }
    }

    pub fn clock(&self) -> &ClockScheduler {
        &self.clock
    }

    pub fn config(&self) -> &BandConfig {
        &self.stage.config
    }

    pub fn conductor(&self) -> &Conductor {
        &self.stage.conductor
    }

    pub fn buffers(&self) -> &InstrumentBuffers {
        &self.stage.buffers
    }

    pub fn epoch(&self) -> Epoch {
        self.stage.epoch
    }

    pub fn stats(&self) -> DispatchStats {
        self.stage.stats
    }

    pub fn pending_genre(&self) -> Option<GenreFeel> {
        self.stage.pending_genre
    }

    pub fn set_metronome(&mut self, on: bool) {
        self.stage.metronome = on;
    }

    pub fn set_session_timer(&mut self, seconds: Option<f64>) {
        self.stage.session_timer = seconds;
    }

    /// Replace the drum pattern until the next genre change.
    pub fn set_pattern(&mut self, pattern: DrumPattern) {
        self.stage.pattern = pattern;
    }

    pub fn drain_visuals(&mut self) -> Vec<VisualEvent> {
        self.stage.visuals.drain(..).collect()
    }

    pub fn visual_backlog(&self) -> usize {
        self.stage.visuals.len()
    }

    /// Take a new configuration. A different arrangement restarts generation
    /// from the current step; a part whose enable flag or style changed is
    /// regenerated on its own from there.
    pub fn apply_config(&mut self, config: BandConfig, now: f64, worker: &mut WorkerLink, sync: &mut SyncLogWriter) {
        let stage = &mut self.stage;
        let new_arrangement = !Arc::ptr_eq(&stage.config.arrangement, &config.arrangement);
        if stage.config.bpm != config.bpm && self.clock.is_running() {
            self.clock.retime(now, stage.config.bpm.max(1.0) as f64 / config.bpm.max(1.0) as f64);
        }
        if stage.config.genre != config.genre {
            stage.pattern = DrumPattern::preset(config.genre);
        }
        if new_arrangement {
            stage.conductor.set_arrangement(&config.arrangement);
        }
        stage.conductor.apply_config(&config);
        let changed: Vec<InstrumentTag> = InstrumentTag::GENERATED
            .into_iter()
            .filter(|&i| stage.config.part_differs(&config, i))
            .collect();
        stage.config = config;
        sync.checkpoint(stage.config.clone());
        if !self.clock.is_running() {
            return;
        }
        let step = self.clock.step();
        if new_arrangement {
            stage.buffers.clear();
            stage.flush_to(step, worker);
        } else {
            for inst in changed {
                stage.regenerate(inst, step, worker);
            }
        }
    }

    pub fn start(&mut self, now: f64, worker: &mut WorkerLink, sync: &mut SyncLogWriter) {
        let stage = &mut self.stage;
        stage.conductor.reset(&stage.config);
        stage.pattern = DrumPattern::preset(stage.config.genre);
        stage.buffers.clear();
        stage.pending_genre = None;
        stage.epoch = stage.epoch.next();
        stage.flush_floor = 0;
        stage.cut_at = [None; PARTS];
        stage.last_request = None;
        stage.started_at = now;
        sync.checkpoint(stage.config.clone());
        sync.performance(stage.conductor.performance());
        send(worker, WorkerCmd::Start { step: 0, epoch: stage.epoch });
        self.clock.start(now, stage.config.count_in);
        log::info!(
            target: "ensemble::dispatch",
            "playing {} at {} bpm ({} steps)",
            stage.config.genre.name(),
            stage.config.bpm,
            stage.config.arrangement.total_steps
        );
    }

    /// Silence everything and stop generation. Safe in any state.
    pub fn stop(&mut self, now: f64, sink: &mut dyn SynthesisSink, worker: &mut WorkerLink) {
        if self.clock.is_running() {
            sink.release_all(now);
        }
        self.clock.stop();
        self.stage.buffers.clear();
        self.stage.pending_genre = None;
        self.stage.last_request = None;
        self.stage.cut_at = [None; PARTS];
        send(worker, WorkerCmd::Stop);
    }

    /// Discard buffered material and regenerate from the current step.
    pub fn flush(&mut self, worker: &mut WorkerLink) {
        self.stage.buffers.clear();
        self.stage.flush_to(self.clock.step(), worker);
    }

    /// Stop, then forget conductor history and rewind to step 0.
    pub fn reset(&mut self, now: f64, sink: &mut dyn SynthesisSink, worker: &mut WorkerLink) {
        self.stop(now, sink, worker);
        let stage = &mut self.stage;
        stage.conductor.reset(&stage.config);
        stage.pattern = DrumPattern::preset(stage.config.genre);
        stage.epoch = stage.epoch.next();
        stage.flush_floor = 0;
        self.clock.seek(0);
    }

    /// Arm the ending; the band resolves at the next loop boundary.
    pub fn request_stop_at_loop_end(&mut self) {
        if self.clock.state() == TransportState::Playing {
            log::info!(target: "ensemble::dispatch", "ending armed at step {}", self.clock.step());
            self.clock.set_state(TransportState::EndingArmed);
        }
    }

    /// Change feel at the next measure start. Applied at once when stopped.
    pub fn request_genre(&mut self, genre: GenreFeel, sync: &mut SyncLogWriter) {
        if self.clock.is_running() {
            self.stage.pending_genre = Some(genre);
            return;
        }
        let stage = &mut self.stage;
        stage.config.genre = genre;
        stage.config.swing = genre.default_swing();
        stage.config.swing_subdivision = genre.default_subdivision();
        stage.config.version += 1;
        stage.pattern = DrumPattern::preset(genre);
        sync.checkpoint(stage.config.clone());
    }

    /// Take worker output, dispatch every due step and ask the worker to
    /// keep up. Returns the number of positions dispatched.
    pub fn pump(
        &mut self,
        now: f64,
        sink: &mut dyn SynthesisSink,
        worker: &mut WorkerLink,
        sync: &mut SyncLogWriter,
    ) -> usize {
        if let TransportState::Resolving { stop_at } = self.clock.state() {
            if now >= stop_at {
                log::info!(target: "ensemble::dispatch", "stopped after resolution");
                self.clock.stop();
            }
            return 0;
        }
        if !self.clock.is_running() {
            return 0;
        }

        let feedback = worker.poll();
        self.stage.absorb(feedback, self.clock.step());

        let mut driver = StepDriver {
            stage: &mut self.stage,
            sink,
            worker: &mut *worker,
            sync,
            now,
        };
        let dispatched = self.clock.pump(now, &mut driver);

        let step = self.clock.step();
        if self.clock.is_running() && !matches!(self.clock.state(), TransportState::Resolving { .. }) {
            self.stage.buffers.prune_below(step);
            if self.stage.last_request != Some(step) {
                self.stage.last_request = Some(step);
                send(worker, WorkerCmd::RequestBuffer { step });
            }
        }
        dispatched
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generation::GenerationPipeline;
    use crate::sink::{RecordingSink, SinkEvent};
    use crate::worker::InlineWorker;
    use ensemble_types::{Arrangement, Chord, ChordQuality, Key, TimeSignature};

    fn config() -> BandConfig {
        let chords = vec![
            Chord::new("C", 60, ChordQuality::Major, false, 4.0),
            Chord::new("F", 65, ChordQuality::Major, false, 4.0),
        ];
        BandConfig {
            bpm: 120.0,
            genre: GenreFeel::Rock,
            swing: 0.0,
            tempo_drift: 0.0,
            arrangement: Arc::new(Arrangement::compile(chords, TimeSignature::FourFour, Key::C, false)),
            ..BandConfig::default()
        }
    }

    fn rig(cfg: BandConfig) -> (Dispatcher, WorkerLink, SyncLogWriter) {
        let (sync, reader) = SyncLogWriter::new();
        let worker = WorkerLink::Inline(Box::new(InlineWorker::new(GenerationPipeline::new(cfg.clone(), 9), reader)));
        let dispatcher = Dispatcher::new(cfg, DispatchOptions::default());
        (dispatcher, worker, sync)
    }

    #[test]
    fn first_pump_plays_step_zero_at_start_time() {
        let (mut d, mut w, mut s) = rig(config());
        let mut sink = RecordingSink::new();
        d.start(1.0, &mut w, &mut s);
        assert_eq!(d.pump(1.05, &mut sink, &mut w, &mut s), 1);
        let visuals = d.drain_visuals();
        assert!(visuals.contains(&VisualEvent::Step { step: 0, time: 1.1 }));
        assert!(visuals
            .iter()
            .any(|v| matches!(v, VisualEvent::ChordChange { symbol, .. } if symbol == "C")));
    }

    #[test]
    fn buffered_bass_is_dispatched_once() {
        let (mut d, mut w, mut s) = rig(config());
        let mut sink = RecordingSink::new();
        d.start(0.0, &mut w, &mut s);
        let mut t = 0.0;
        while t < 4.0 {
            d.pump(t, &mut sink, &mut w, &mut s);
            t += 0.025;
        }
        let bass: Vec<&SinkEvent> = sink.notes_for(InstrumentTag::Bass).collect();
        assert!(!bass.is_empty());
        let mut times: Vec<u64> = bass.iter().map(|e| (e.time() * 1e6).round() as u64).collect();
        let before = times.len();
        times.dedup();
        assert_eq!(times.len(), before);
    }

    #[test]
    fn empty_arrangement_still_drums() {
        let mut cfg = config();
        cfg.arrangement = Arc::new(Arrangement::empty(TimeSignature::FourFour, Key::C, false));
        let (mut d, mut w, mut s) = rig(cfg);
        let mut sink = RecordingSink::new();
        d.set_metronome(true);
        d.start(0.0, &mut w, &mut s);
        let mut t = 0.0;
        while t < 2.0 {
            d.pump(t, &mut sink, &mut w, &mut s);
            t += 0.025;
        }
        assert!(sink.clicks().count() >= 4);
        assert!(sink.drums().count() > 0);
        assert_eq!(sink.notes_for(InstrumentTag::Bass).count(), 0);
    }

    #[test]
    fn metronome_accents_measure_and_group() {
        let (mut d, mut w, mut s) = rig(config());
        let mut sink = RecordingSink::new();
        d.set_metronome(true);
        d.start(0.0, &mut w, &mut s);
        d.pump(2.0, &mut sink, &mut w, &mut s);
        let freqs: Vec<f32> = sink
            .clicks()
            .filter_map(|e| match e {
                SinkEvent::Click { frequency, .. } => Some(*frequency),
                _ => None,
            })
            .take(4)
            .collect();
        assert_eq!(freqs, vec![1000.0, 600.0, 800.0, 600.0]);
    }

    #[test]
    fn count_in_precedes_step_zero() {
        let mut cfg = config();
        cfg.count_in = true;
        let (mut d, mut w, mut s) = rig(cfg);
        let mut sink = RecordingSink::new();
        d.start(0.0, &mut w, &mut s);
        d.pump(2.05, &mut sink, &mut w, &mut s);
        let visuals = d.drain_visuals();
        let beats: Vec<u32> = visuals
            .iter()
            .filter_map(|v| match v {
                VisualEvent::CountIn { beat, .. } => Some(*beat),
                _ => None,
            })
            .collect();
        assert_eq!(beats, vec![0, 1, 2, 3]);
        let first_step = visuals.iter().find_map(|v| match v {
            VisualEvent::Step { step: 0, time } => Some(*time),
            _ => None,
        });
        assert!((first_step.unwrap() - 2.1).abs() < 1e-9);
    }

    #[test]
    fn armed_ending_resolves_at_loop_boundary() {
        let (mut d, mut w, mut s) = rig(config());
        let mut sink = RecordingSink::new();
        d.start(0.0, &mut w, &mut s);
        d.pump(0.5, &mut sink, &mut w, &mut s);
        d.request_stop_at_loop_end();
        assert_eq!(d.clock().state(), TransportState::EndingArmed);
        // 32 steps at 0.125s: the boundary falls at 4.1s
        d.pump(4.5, &mut sink, &mut w, &mut s);
        let TransportState::Resolving { stop_at } = d.clock().state() else {
            panic!("expected resolution, got {:?}", d.clock().state());
        };
        assert!((stop_at - (4.1 + 4.0)).abs() < 1e-9);
        assert!(sink.events.iter().any(|e| matches!(e, SinkEvent::ReleaseAll { .. })));
        d.pump(stop_at + 0.01, &mut sink, &mut w, &mut s);
        assert_eq!(d.clock().state(), TransportState::Stopped);
    }

    #[test]
    fn genre_change_waits_for_measure() {
        let (mut d, mut w, mut s) = rig(config());
        let mut sink = RecordingSink::new();
        d.start(0.0, &mut w, &mut s);
        d.pump(0.5, &mut sink, &mut w, &mut s);
        let epoch = d.epoch();
        d.request_genre(GenreFeel::Funk, &mut s);
        assert_eq!(d.config().genre, GenreFeel::Rock);
        assert_eq!(d.pending_genre(), Some(GenreFeel::Funk));
        d.pump(2.2, &mut sink, &mut w, &mut s);
        assert_eq!(d.config().genre, GenreFeel::Funk);
        assert_eq!(d.pending_genre(), None);
        assert_eq!(d.epoch(), epoch.next());
    }

    #[test]
    fn genre_change_cuts_monophonic_voices() {
        let (mut d, mut w, mut s) = rig(config());
        let mut sink = RecordingSink::new();
        d.start(0.0, &mut w, &mut s);
        d.pump(0.5, &mut sink, &mut w, &mut s);
        d.request_genre(GenreFeel::Funk, &mut s);
        d.pump(2.6, &mut sink, &mut w, &mut s);

        // Measure two starts at 2.1s; the kept downbeat note lasts one step
        let downbeat: Vec<f64> = sink
            .notes_for(InstrumentTag::Bass)
            .filter_map(|e| match e {
                SinkEvent::Note { time, duration, .. } if (time - 2.1).abs() < 1e-6 => Some(*duration),
                _ => None,
            })
            .collect();
        assert_eq!(downbeat.len(), 1);
        assert!(downbeat[0] <= 0.125 + 1e-9);

        for inst in [InstrumentTag::Bass, InstrumentTag::Soloist] {
            let releases: Vec<f64> = sink
                .events
                .iter()
                .filter_map(|e| match e {
                    SinkEvent::Release { instrument, time } if *instrument == inst => Some(*time),
                    _ => None,
                })
                .collect();
            assert_eq!(releases.len(), 1, "{:?}", inst);
            assert!(releases[0] > 2.1 && releases[0] < 2.4, "{:?} released at {}", inst, releases[0]);
        }
        assert!(sink
            .events
            .iter()
            .all(|e| !matches!(e, SinkEvent::Release { instrument: InstrumentTag::Comping, .. })));
    }

    #[test]
    fn flush_releases_at_next_dispatched_step() {
        let (mut d, mut w, mut s) = rig(config());
        let mut sink = RecordingSink::new();
        d.start(0.0, &mut w, &mut s);
        d.pump(1.0, &mut sink, &mut w, &mut s);
        d.flush(&mut w);
        assert!(!sink.events.iter().any(|e| matches!(e, SinkEvent::Release { .. })));
        d.pump(1.2, &mut sink, &mut w, &mut s);
        let released: Vec<&SinkEvent> = sink
            .events
            .iter()
            .filter(|e| matches!(e, SinkEvent::Release { .. }))
            .collect();
        assert_eq!(released.len(), 2);
        // Everything due before 1.1s was out before the flush
        assert!(released.iter().all(|e| e.time() > 1.0 && e.time() < 1.3));
    }

    #[test]
    fn disabling_bass_silences_it_at_once() {
        let cfg = config();
        let (mut d, mut w, mut s) = rig(cfg.clone());
        let mut sink = RecordingSink::new();
        d.start(0.0, &mut w, &mut s);
        d.pump(1.0, &mut sink, &mut w, &mut s);
        let before = d.stats().stale_batches;

        let mut off = cfg;
        off.version = 1;
        off.bass.enabled = false;
        d.apply_config(off, 1.0, &mut w, &mut s);
        assert!(d.buffers().get(InstrumentTag::Bass).is_some_and(|b| b.is_empty()));
        let comping_left = d.buffers().get(InstrumentTag::Comping).map_or(0, |b| b.len());
        assert!(comping_left > 0);
        d.pump(5.0, &mut sink, &mut w, &mut s);

        // Steps up to 1.1s were dispatched before the change
        assert!(sink.notes_for(InstrumentTag::Bass).all(|e| e.time() < 1.1 + 1e-9));
        assert!(sink.notes_for(InstrumentTag::Comping).any(|e| e.time() > 1.5));
        let released: Vec<f64> = sink
            .events
            .iter()
            .filter_map(|e| match e {
                SinkEvent::Release {
                    instrument: InstrumentTag::Bass,
                    time,
                } => Some(*time),
                _ => None,
            })
            .collect();
        assert_eq!(released.len(), 1);
        assert!(released[0] > 1.0 && released[0] < 1.3);
        assert!(!sink
            .events
            .iter()
            .any(|e| matches!(e, SinkEvent::Release { instrument: InstrumentTag::Soloist, .. })));
        assert_eq!(d.stats().stale_batches, before);
    }

    #[test]
    fn style_change_keeps_other_parts_buffered() {
        let cfg = config();
        let (mut d, mut w, mut s) = rig(cfg.clone());
        let mut sink = RecordingSink::new();
        d.start(0.0, &mut w, &mut s);
        d.pump(1.0, &mut sink, &mut w, &mut s);
        let epoch = d.epoch();
        let bass_left = d.buffers().get(InstrumentTag::Bass).map_or(0, |b| b.len());

        let mut bird = cfg;
        bird.version = 1;
        bird.soloist.style = ensemble_types::SoloistStyle::Bird;
        d.apply_config(bird, 1.0, &mut w, &mut s);
        assert_eq!(d.epoch(), epoch);
        assert_eq!(d.buffers().get(InstrumentTag::Bass).map_or(0, |b| b.len()), bass_left);
        assert!(d.buffers().get(InstrumentTag::Soloist).is_some_and(|b| b.is_empty()));

        d.pump(6.0, &mut sink, &mut w, &mut s);
        assert!(sink.notes_for(InstrumentTag::Soloist).any(|e| e.time() > 1.1));
    }

    #[test]
    fn visual_queue_is_capped() {
        let (mut d, mut w, mut s) = rig(config());
        let mut sink = RecordingSink::new();
        d.start(0.0, &mut w, &mut s);
        d.pump(60.0, &mut sink, &mut w, &mut s);
        assert_eq!(d.visual_backlog(), VISUAL_QUEUE_CAP);
    }

    #[test]
    fn stop_is_safe_when_idle() {
        let (mut d, mut w, _s) = rig(config());
        let mut sink = RecordingSink::new();
        d.stop(0.0, &mut sink, &mut w);
        d.flush(&mut w);
        assert!(sink.events.is_empty());
        assert!(!d.clock().is_running());
    }
}
