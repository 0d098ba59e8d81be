//! Playback facade: one object the session drives.
//!
//! Wires a [`Dispatcher`] to a generation worker (threaded or inline) over
//! the sync log and command channel, and reads time from a [`Clock`].

use std::time::Duration;

use ensemble_types::{BandConfig, GenreFeel};

use crate::clock::{Clock, SystemClock, TransportState};
use crate::conductor::Conductor;
use crate::dispatcher::{DispatchOptions, DispatchStats, Dispatcher, VisualEvent};
use crate::error::EngineError;
use crate::generation::{GenerationPipeline, DEFAULT_LOOKAHEAD, DEFAULT_STALENESS_MEASURES};
use crate::sink::SynthesisSink;
use crate::sync_log::SyncLogWriter;
use crate::worker::{InlineWorker, WorkerHandle, WorkerLink, DEFAULT_WORKER_INTERVAL};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EngineConfig {
    pub dispatch: DispatchOptions,
    /// Steps the worker keeps generated ahead of playback
    pub lookahead: u32,
    pub staleness_measures: u32,
    pub worker_interval: Duration,
    /// Run generation on its own thread
    pub threaded: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            dispatch: DispatchOptions::default(),
            lookahead: DEFAULT_LOOKAHEAD,
            staleness_measures: DEFAULT_STALENESS_MEASURES,
            worker_interval: DEFAULT_WORKER_INTERVAL,
            threaded: true,
        }
    }
}

pub struct PlaybackEngine<C: Clock = SystemClock> {
    clock: C,
    dispatcher: Dispatcher,
    worker: WorkerLink,
    sync: SyncLogWriter,
}

impl<C: Clock> PlaybackEngine<C> {
    pub fn new(config: BandConfig, settings: EngineConfig, clock: C) -> Result<Self, EngineError> {
        let (sync, reader) = SyncLogWriter::new();
        let pipeline = GenerationPipeline::new(config.clone(), settings.dispatch.seed)
            .with_lookahead(settings.lookahead, settings.staleness_measures);
        let worker = if settings.threaded {
            WorkerLink::Threaded(WorkerHandle::spawn(pipeline, reader, settings.worker_interval)?)
        } else {
            WorkerLink::Inline(Box::new(InlineWorker::new(pipeline, reader)))
        };
        log::debug!(
            target: "ensemble::dispatch",
            "engine ready (threaded: {}, lookahead: {})",
            settings.threaded,
            settings.lookahead
        );
        Ok(Self {
            clock,
            dispatcher: Dispatcher::new(config, settings.dispatch),
            worker,
            sync,
        })
    }

    /// Engine with generation on the caller's thread. Deterministic for a
    /// given seed and clock.
    pub fn inline(config: BandConfig, settings: EngineConfig, clock: C) -> Self {
        let (sync, reader) = SyncLogWriter::new();
        let pipeline = GenerationPipeline::new(config.clone(), settings.dispatch.seed)
            .with_lookahead(settings.lookahead, settings.staleness_measures);
        Self {
            clock,
            dispatcher: Dispatcher::new(config, settings.dispatch),
            worker: WorkerLink::Inline(Box::new(InlineWorker::new(pipeline, reader))),
            sync,
        }
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn now(&self) -> f64 {
        self.clock.now()
    }

    pub fn config(&self) -> &BandConfig {
        self.dispatcher.config()
    }

    pub fn conductor(&self) -> &Conductor {
        self.dispatcher.conductor()
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn sync_log(&self) -> &SyncLogWriter {
        &self.sync
    }

    pub fn state(&self) -> TransportState {
        self.dispatcher.clock().state()
    }

    pub fn is_running(&self) -> bool {
        self.dispatcher.clock().is_running()
    }

    pub fn step(&self) -> u64 {
        self.dispatcher.clock().step()
    }

    pub fn stats(&self) -> DispatchStats {
        self.dispatcher.stats()
    }

    pub fn start(&mut self) {
        let now = self.clock.now();
        self.dispatcher.start(now, &mut self.worker, &mut self.sync);
    }

    pub fn stop(&mut self, sink: &mut dyn SynthesisSink) {
        let now = self.clock.now();
        self.dispatcher.stop(now, sink, &mut self.worker);
    }

    pub fn flush(&mut self) {
        self.dispatcher.flush(&mut self.worker);
    }

    pub fn reset(&mut self, sink: &mut dyn SynthesisSink) {
        let now = self.clock.now();
        self.dispatcher.reset(now, sink, &mut self.worker);
    }

    /// Dispatch everything due at the clock's current time.
    pub fn pump(&mut self, sink: &mut dyn SynthesisSink) -> usize {
        let now = self.clock.now();
        self.dispatcher.pump(now, sink, &mut self.worker, &mut self.sync)
    }

    /// Publish a new configuration snapshot.
    pub fn apply_config(&mut self, config: BandConfig) {
        let now = self.clock.now();
        self.dispatcher.apply_config(config, now, &mut self.worker, &mut self.sync);
    }

    pub fn request_genre(&mut self, genre: GenreFeel) {
        self.dispatcher.request_genre(genre, &mut self.sync);
    }

    pub fn request_stop_at_loop_end(&mut self) {
        self.dispatcher.request_stop_at_loop_end();
    }

    pub fn set_metronome(&mut self, on: bool) {
        self.dispatcher.set_metronome(on);
    }

    pub fn set_session_timer(&mut self, seconds: Option<f64>) {
        self.dispatcher.set_session_timer(seconds);
    }

    pub fn drain_visuals(&mut self) -> Vec<VisualEvent> {
        self.dispatcher.drain_visuals()
    }

    /// Stop the worker thread. Further pumps dispatch nothing new.
    pub fn shutdown(&mut self) {
        self.worker.shutdown();
    }
}

impl<C: Clock> Drop for PlaybackEngine<C> {
    fn drop(&mut self) {
        self.worker.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::clock::ManualClock;
    use crate::sink::RecordingSink;
    use ensemble_types::{Arrangement, Chord, ChordQuality, InstrumentTag, Key, TimeSignature};

    fn config() -> BandConfig {
        let chords = vec![
            Chord::new("Am", 57, ChordQuality::Minor, false, 4.0),
            Chord::new("D", 62, ChordQuality::Major, false, 4.0),
        ];
        BandConfig {
            bpm: 110.0,
            arrangement: Arc::new(Arrangement::compile(chords, TimeSignature::FourFour, Key::C, false)),
            ..BandConfig::default()
        }
    }

    #[test]
    fn inline_engine_plays_all_parts() {
        let clock = ManualClock::new(0.0);
        let mut engine = PlaybackEngine::inline(config(), EngineConfig::default(), clock.clone());
        let mut sink = RecordingSink::new();
        engine.start();
        for _ in 0..320 {
            engine.pump(&mut sink);
            clock.advance(0.025);
        }
        assert!(engine.is_running());
        assert!(sink.notes_for(InstrumentTag::Bass).count() > 0);
        assert!(sink.notes_for(InstrumentTag::Comping).count() > 0);
        assert!(sink.drums().count() > 0);
        assert!(engine.step() > 50);
    }

    #[test]
    fn stop_releases_and_halts() {
        let clock = ManualClock::new(0.0);
        let mut engine = PlaybackEngine::inline(config(), EngineConfig::default(), clock.clone());
        let mut sink = RecordingSink::new();
        engine.start();
        engine.pump(&mut sink);
        clock.advance(1.0);
        engine.stop(&mut sink);
        let step = engine.step();
        clock.advance(1.0);
        assert_eq!(engine.pump(&mut sink), 0);
        assert_eq!(engine.step(), step);
        assert!(!engine.is_running());
    }

    #[test]
    fn threaded_engine_starts_and_shuts_down() {
        let mut engine = PlaybackEngine::new(config(), EngineConfig::default(), SystemClock::default()).unwrap();
        let mut sink = RecordingSink::new();
        engine.start();
        for _ in 0..10 {
            engine.pump(&mut sink);
            std::thread::sleep(Duration::from_millis(20));
        }
        engine.shutdown();
        assert!(sink.drums().count() > 0);
    }

    #[test]
    fn config_publish_reaches_sync_log() {
        let clock = ManualClock::new(0.0);
        let mut engine = PlaybackEngine::inline(config(), EngineConfig::default(), clock);
        let before = engine.sync_log().next_seq();
        let mut cfg = engine.config().clone();
        cfg.version += 1;
        cfg.bpm = 140.0;
        engine.apply_config(cfg);
        assert_eq!(engine.sync_log().next_seq(), before + 1);
        assert_eq!(engine.config().bpm, 140.0);
    }
}
