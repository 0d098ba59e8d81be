#![allow(dead_code)]
//! Shared helpers for ensemble-engine integration tests.

use std::sync::Arc;

use ensemble_engine::generation::{GenerationPipeline, NoteBatch};
use ensemble_engine::{Clock, EngineConfig, ManualClock, PlaybackEngine, RecordingSink};
use ensemble_types::{
    Arrangement, BandConfig, Chord, ChordQuality, GenreFeel, Key, StepSlot, SwingSubdivision, TimeSignature,
};

pub const PUMP_INTERVAL: f64 = 0.025;

/// C → F → G → C, one measure each.
pub fn c_f_g_c() -> Vec<Chord> {
    vec![
        Chord::new("C", 60, ChordQuality::Major, false, 4.0),
        Chord::new("F", 65, ChordQuality::Major, false, 4.0),
        Chord::new("G", 67, ChordQuality::Major, false, 4.0),
        Chord::new("C", 60, ChordQuality::Major, false, 4.0),
    ]
}

/// ii-V-I with a slash chord, two measures per chord pair.
pub fn ii_v_i() -> Vec<Chord> {
    vec![
        Chord::new("Dm7", 62, ChordQuality::Minor, true, 2.0),
        Chord::new("G7", 67, ChordQuality::Dominant7, true, 2.0),
        Chord::new("Cmaj7", 60, ChordQuality::Major, true, 4.0),
        Chord::new("Am7/G", 57, ChordQuality::Minor, true, 4.0).with_bass(55),
        Chord::new("D7", 62, ChordQuality::Dominant7, true, 4.0),
    ]
}

pub fn arrangement(chords: Vec<Chord>) -> Arc<Arrangement> {
    Arc::new(Arrangement::compile(chords, TimeSignature::FourFour, Key::C, false))
}

/// 120 BPM 4/4 with swing on the given subdivision and no tempo drift.
pub fn band(chords: Vec<Chord>, swing: f32, subdivision: SwingSubdivision) -> BandConfig {
    BandConfig {
        bpm: 120.0,
        genre: GenreFeel::Rock,
        swing,
        swing_subdivision: subdivision,
        tempo_drift: 0.0,
        count_in: false,
        arrangement: arrangement(chords),
        ..BandConfig::default()
    }
}

pub fn inline_engine(config: BandConfig, seed: u64) -> (PlaybackEngine<ManualClock>, ManualClock) {
    let clock = ManualClock::new(0.0);
    let mut settings = EngineConfig::default();
    settings.threaded = false;
    settings.dispatch.seed = seed;
    (PlaybackEngine::inline(config, settings, clock.clone()), clock)
}

/// Pump at the regular interval until `seconds` of clock time have passed.
pub fn run_for(engine: &mut PlaybackEngine<ManualClock>, clock: &ManualClock, sink: &mut RecordingSink, seconds: f64) {
    let end = clock.now() + seconds;
    while clock.now() < end {
        engine.pump(sink);
        clock.advance(PUMP_INTERVAL);
    }
}

/// Drive a pipeline like the dispatcher would: request each step in turn
/// and collect every emitted slot.
pub fn drive_pipeline(pipeline: &mut GenerationPipeline, steps: u64) -> Vec<NoteBatch> {
    let mut out = Vec::new();
    for step in 0..steps {
        pipeline.request(step);
        let (batches, _) = pipeline.pump();
        out.extend(batches);
    }
    out
}

/// Flatten batches into `(step, slot)` pairs.
pub fn slots(batches: &[NoteBatch]) -> Vec<(u64, &StepSlot)> {
    batches
        .iter()
        .flat_map(|b| b.slots.iter().map(|(s, slot)| (*s, slot)))
        .collect()
}
