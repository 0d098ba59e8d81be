//! The session owns the band configuration. Every mutation goes through
//! here, bumps the version and publishes a full snapshot to the engine.

use std::sync::Arc;

use serde::Serialize;

use ensemble_engine::{
    Clock, DispatchStats, EngineConfig, EngineError, PlaybackEngine, SynthesisSink, SystemClock, TransportState,
    VisualEvent,
};
use ensemble_types::{
    Arrangement, BandConfig, BassStyle, CompingStyle, GenreFeel, HarmonyStyle, Key, PartConfig, SoloistStyle,
    SwingSubdivision, TimeSignature,
};

use crate::config::{Config, MAX_BPM, MIN_BPM};
use crate::progression::{parse_progression, ProgressionError};

/// Snapshot of what the session is doing, for status lines.
#[derive(Debug, Clone, Serialize)]
pub struct SessionStatus {
    pub version: u64,
    pub playing: bool,
    pub step: u64,
    pub bpm: f32,
    pub genre: &'static str,
    pub intensity: f32,
    pub loop_count: u32,
    pub chords: usize,
    pub stats: DispatchStats,
}

pub struct Session<C: Clock = SystemClock> {
    engine: PlaybackEngine<C>,
    progression: String,
}

impl Session<SystemClock> {
    /// Session on the wall clock with generation on its own thread.
    pub fn from_config(config: &Config) -> Result<Self, EngineError> {
        Self::new(config.band_config(), config.engine_config(), SystemClock::default())
    }
}

impl<C: Clock> Session<C> {
    pub fn new(config: BandConfig, settings: EngineConfig, clock: C) -> Result<Self, EngineError> {
        Ok(Self {
            engine: PlaybackEngine::new(config, settings, clock)?,
            progression: String::new(),
        })
    }

    /// Session with generation on the caller's thread.
    pub fn inline(config: BandConfig, settings: EngineConfig, clock: C) -> Self {
        Self {
            engine: PlaybackEngine::inline(config, settings, clock),
            progression: String::new(),
        }
    }

    pub fn engine(&self) -> &PlaybackEngine<C> {
        &self.engine
    }

    pub fn config(&self) -> &BandConfig {
        self.engine.config()
    }

    pub fn version(&self) -> u64 {
        self.engine.config().version
    }

    pub fn progression(&self) -> &str {
        &self.progression
    }

    fn update(&mut self, what: &str, change: impl FnOnce(&mut BandConfig)) {
        let mut config = self.engine.config().clone();
        change(&mut config);
        config.version += 1;
        log::debug!(target: "ensemble::session", "{} (v{})", what, config.version);
        self.engine.apply_config(config);
    }

    /// Parse and install a new progression. On error the current
    /// arrangement keeps playing.
    pub fn set_progression(&mut self, text: &str) -> Result<(), ProgressionError> {
        let config = self.engine.config();
        let arrangement = parse_progression(text, config.key, config.time_signature, config.minor)?;
        log::info!(
            target: "ensemble::session",
            "progression: {} chords, {} steps",
            arrangement.chords.len(),
            arrangement.total_steps
        );
        self.progression = text.to_string();
        self.update("progression", |c| c.arrangement = Arc::new(arrangement));
        Ok(())
    }

    /// Install an arrangement built elsewhere. Forgets the progression text.
    pub fn set_arrangement(&mut self, arrangement: Arrangement) {
        self.progression.clear();
        self.update("arrangement", |c| c.arrangement = Arc::new(arrangement));
    }

    /// Change key or mode. Roman and Nashville roots move with the key, so
    /// the progression is parsed again.
    pub fn set_key(&mut self, key: Key, minor: bool) -> Result<(), ProgressionError> {
        let ts = self.engine.config().time_signature;
        let arrangement = self.reparse(key, ts, minor)?;
        self.update("key", |c| {
            c.key = key;
            c.minor = minor;
            if let Some(a) = arrangement {
                c.arrangement = a;
            }
        });
        Ok(())
    }

    pub fn set_time_signature(&mut self, ts: TimeSignature) -> Result<(), ProgressionError> {
        let (key, minor) = (self.engine.config().key, self.engine.config().minor);
        let arrangement = self.reparse(key, ts, minor)?;
        self.update("time signature", |c| {
            c.time_signature = ts;
            if let Some(a) = arrangement {
                c.arrangement = a;
            }
        });
        Ok(())
    }

    fn reparse(&self, key: Key, ts: TimeSignature, minor: bool) -> Result<Option<Arc<Arrangement>>, ProgressionError> {
        if self.progression.trim().is_empty() {
            return Ok(None);
        }
        Ok(Some(Arc::new(parse_progression(&self.progression, key, ts, minor)?)))
    }

    pub fn set_bpm(&mut self, bpm: f32) {
        let bpm = if bpm.is_finite() { bpm.clamp(MIN_BPM, MAX_BPM) } else { MIN_BPM };
        self.update("tempo", |c| c.bpm = bpm);
    }

    /// Switch genre feel. While playing the change lands on the next measure.
    pub fn set_genre(&mut self, genre: GenreFeel) {
        log::info!(target: "ensemble::session", "genre {}", genre.name());
        self.engine.request_genre(genre);
    }

    pub fn set_swing(&mut self, swing: f32, subdivision: SwingSubdivision) {
        self.update("swing", |c| {
            c.swing = swing.clamp(0.0, 100.0);
            c.swing_subdivision = subdivision;
        });
    }

    /// Manual intensity. Turns auto-intensity off so the conductor holds it.
    pub fn set_intensity(&mut self, intensity: f32) {
        self.update("intensity", |c| {
            c.intensity = intensity.clamp(0.0, 1.0);
            c.auto_intensity = false;
        });
    }

    pub fn set_auto_intensity(&mut self, on: bool) {
        self.update("auto intensity", |c| c.auto_intensity = on);
    }

    pub fn set_complexity(&mut self, complexity: f32) {
        self.update("complexity", |c| c.complexity = complexity.clamp(0.0, 1.0));
    }

    pub fn set_double_stops(&mut self, on: bool) {
        self.update("double stops", |c| c.double_stops = on);
    }

    pub fn set_tempo_drift(&mut self, drift: f32) {
        self.update("tempo drift", |c| c.tempo_drift = drift.max(0.0));
    }

    pub fn set_count_in(&mut self, on: bool) {
        self.update("count-in", |c| c.count_in = on);
    }

    pub fn set_bass(&mut self, part: PartConfig<BassStyle>) {
        self.update("bass", |c| c.bass = part);
    }

    pub fn set_soloist(&mut self, part: PartConfig<SoloistStyle>) {
        self.update("soloist", |c| c.soloist = part);
    }

    pub fn set_comping(&mut self, part: PartConfig<CompingStyle>) {
        self.update("comping", |c| c.comping = part);
    }

    pub fn set_harmonies(&mut self, part: PartConfig<HarmonyStyle>) {
        self.update("harmonies", |c| c.harmonies = part);
    }

    pub fn set_drums(&mut self, on: bool) {
        self.update("drums", |c| c.drums_enabled = on);
    }

    pub fn set_metronome(&mut self, on: bool) {
        self.engine.set_metronome(on);
    }

    pub fn set_session_timer(&mut self, seconds: Option<f64>) {
        self.engine.set_session_timer(seconds);
    }

    pub fn start(&mut self) {
        self.engine.start();
    }

    pub fn stop(&mut self, sink: &mut dyn SynthesisSink) {
        self.engine.stop(sink);
    }

    /// Play to the end of the loop and ring out on the home chord.
    pub fn end_at_loop(&mut self) {
        self.engine.request_stop_at_loop_end();
    }

    pub fn flush(&mut self) {
        self.engine.flush();
    }

    pub fn reset(&mut self, sink: &mut dyn SynthesisSink) {
        self.engine.reset(sink);
    }

    pub fn pump(&mut self, sink: &mut dyn SynthesisSink) -> usize {
        self.engine.pump(sink)
    }

    pub fn drain_visuals(&mut self) -> Vec<VisualEvent> {
        self.engine.drain_visuals()
    }

    pub fn state(&self) -> TransportState {
        self.engine.state()
    }

    pub fn is_running(&self) -> bool {
        self.engine.is_running()
    }

    pub fn status(&self) -> SessionStatus {
        let config = self.engine.config();
        SessionStatus {
            version: config.version,
            playing: self.engine.is_running(),
            step: self.engine.step(),
            bpm: config.bpm,
            genre: config.genre.name(),
            intensity: self.engine.conductor().intensity(),
            loop_count: self.engine.conductor().loop_count(),
            chords: config.arrangement.chords.len(),
            stats: self.engine.stats(),
        }
    }

    pub fn shutdown(&mut self) {
        self.engine.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ensemble_engine::{ManualClock, RecordingSink};
    use ensemble_types::InstrumentTag;

    fn session() -> (Session<ManualClock>, ManualClock) {
        let clock = ManualClock::new(0.0);
        let mut settings = EngineConfig::default();
        settings.threaded = false;
        settings.dispatch.seed = 12;
        let config = BandConfig {
            bpm: 120.0,
            tempo_drift: 0.0,
            ..BandConfig::default()
        };
        (Session::inline(config, settings, clock.clone()), clock)
    }

    fn run(session: &mut Session<ManualClock>, clock: &ManualClock, sink: &mut RecordingSink, seconds: f64) {
        let end = clock.now() + seconds;
        while clock.now() < end {
            session.pump(sink);
            clock.advance(0.025);
        }
    }

    #[test]
    fn every_mutation_bumps_the_version() {
        let (mut s, _) = session();
        let v = s.version();
        s.set_bpm(130.0);
        s.set_swing(40.0, SwingSubdivision::Sixteenths);
        s.set_complexity(0.8);
        assert_eq!(s.version(), v + 3);
        assert_eq!(s.config().bpm, 130.0);
        assert_eq!(s.config().swing_subdivision, SwingSubdivision::Sixteenths);
    }

    #[test]
    fn tempo_is_clamped() {
        let (mut s, _) = session();
        s.set_bpm(500.0);
        assert_eq!(s.config().bpm, MAX_BPM);
        s.set_bpm(f32::NAN);
        assert_eq!(s.config().bpm, MIN_BPM);
    }

    #[test]
    fn bad_progression_keeps_the_old_one() {
        let (mut s, _) = session();
        s.set_progression("C | F | G | C").unwrap();
        let v = s.version();
        let err = s.set_progression("C | Q").unwrap_err();
        assert_eq!(err.token, "Q");
        assert_eq!(s.version(), v);
        assert_eq!(s.config().arrangement.chords.len(), 4);
        assert_eq!(s.progression(), "C | F | G | C");
    }

    #[test]
    fn key_change_moves_roman_numerals() {
        let (mut s, _) = session();
        s.set_progression("I | IV | V").unwrap();
        assert_eq!(s.config().arrangement.chords[1].root, 65);
        s.set_key(Key::G, false).unwrap();
        assert_eq!(s.config().key, Key::G);
        assert_eq!(s.config().arrangement.chords[1].root, 72);
    }

    #[test]
    fn time_signature_change_rebuilds_the_step_map() {
        let (mut s, _) = session();
        s.set_progression("C | G").unwrap();
        assert_eq!(s.config().arrangement.total_steps, 32);
        s.set_time_signature(TimeSignature::ThreeFour).unwrap();
        assert_eq!(s.config().arrangement.total_steps, 24);
    }

    #[test]
    fn manual_intensity_turns_auto_off() {
        let (mut s, _) = session();
        s.set_intensity(0.9);
        assert!(!s.config().auto_intensity);
        assert!((s.engine().conductor().intensity() - 0.9).abs() < 1e-6);
    }

    #[test]
    fn genre_waits_for_the_measure_while_playing() {
        let (mut s, clock) = session();
        s.set_progression("C | F | G | C").unwrap();
        let mut sink = RecordingSink::new();
        s.start();
        run(&mut s, &clock, &mut sink, 0.3);
        s.set_genre(GenreFeel::Jazz);
        assert_eq!(s.config().genre, GenreFeel::Rock);
        run(&mut s, &clock, &mut sink, 2.5);
        assert_eq!(s.config().genre, GenreFeel::Jazz);
    }

    #[test]
    fn harmonies_join_at_the_next_chord() {
        let (mut s, clock) = session();
        s.set_progression("C | F | G | C").unwrap();
        s.set_intensity(0.7);
        let mut sink = RecordingSink::new();
        s.start();
        run(&mut s, &clock, &mut sink, 1.0);
        s.set_harmonies(PartConfig {
            enabled: true,
            style: HarmonyStyle::Strings,
        });
        // The measure at 2.1s is inside the old lookahead window
        run(&mut s, &clock, &mut sink, 1.5);
        let pads: Vec<f64> = sink.notes_for(InstrumentTag::Harmonies).map(|e| e.time()).collect();
        assert!(!pads.is_empty());
        assert!(pads.iter().all(|t| *t > 2.0 && *t < 2.2), "{:?}", pads);
    }

    #[test]
    fn plays_and_ends_on_request() {
        let (mut s, clock) = session();
        s.set_progression("C | F | G | C").unwrap();
        let mut sink = RecordingSink::new();
        s.start();
        run(&mut s, &clock, &mut sink, 1.0);
        assert!(sink.notes_for(InstrumentTag::Bass).count() > 0);
        s.end_at_loop();
        run(&mut s, &clock, &mut sink, 12.0);
        assert_eq!(s.state(), TransportState::Stopped);
        let status = s.status();
        assert!(!status.playing);
        assert_eq!(status.chords, 4);
        assert!(status.stats.notes > 0);
    }
}
