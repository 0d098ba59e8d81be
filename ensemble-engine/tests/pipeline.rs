mod common;

use std::sync::Arc;

use ensemble_engine::generation::GenerationPipeline;
use ensemble_engine::{RecordingSink, SinkEvent, VisualEvent};
use ensemble_types::{
    Arrangement, BassStyle, Chord, ChordQuality, Epoch, GenreFeel, InstrumentTag, Key, PartConfig, SoloistStyle,
    SwingSubdivision, TimeSignature,
};

fn monophonic_lines_hold(pipeline: &mut GenerationPipeline, steps: u64, label: &str) {
    let batches = common::drive_pipeline(pipeline, steps);
    for inst in [InstrumentTag::Bass, InstrumentTag::Soloist] {
        let mut notes: Vec<(u64, u32)> = batches
            .iter()
            .filter(|b| b.instrument == inst)
            .flat_map(|b| b.slots.iter())
            .flat_map(|(s, slot)| slot.notes.iter().map(move |n| (*s, n.duration_steps)))
            .collect();
        notes.sort();
        for w in notes.windows(2) {
            let (start, dur) = w[0];
            assert!(dur >= 1, "{} {:?} zero length at {}", label, inst, start);
            assert!(w[1].0 > start, "{} {:?} two notes at {}", label, inst, start);
            assert!(start + dur as u64 <= w[1].0, "{} {:?} overlap at {}", label, inst, start);
        }
    }
}

#[test]
fn monophony_across_styles() {
    for (i, bass) in BassStyle::ALL.iter().enumerate() {
        let soloist = SoloistStyle::ALL[i % SoloistStyle::ALL.len()];
        let mut config = common::band(common::ii_v_i(), 50.0, SwingSubdivision::Eighths);
        config.bass = PartConfig { enabled: true, style: *bass };
        config.soloist = PartConfig { enabled: true, style: soloist };
        config.intensity = 0.9;
        let mut pipeline = GenerationPipeline::new(config, i as u64);
        pipeline.start(0, Epoch::default());
        monophonic_lines_hold(&mut pipeline, 1024, bass.name());
    }
}

#[test]
fn flush_restarts_heads_at_target() {
    let config = common::band(common::c_f_g_c(), 0.0, SwingSubdivision::Eighths);
    let mut pipeline = GenerationPipeline::new(config, 21);
    pipeline.start(0, Epoch::default());
    common::drive_pipeline(&mut pipeline, 100);

    let k = 160;
    pipeline.flush(k, Epoch::new(5));
    for inst in InstrumentTag::GENERATED {
        assert_eq!(pipeline.head(inst), Some(k));
        assert!(!pipeline.has_pending(inst));
    }
    let (batches, _) = pipeline.pump();
    assert!(!batches.is_empty());
    for b in &batches {
        assert_eq!(b.epoch, Epoch::new(5));
        assert!(b.slots.iter().all(|(s, _)| *s >= k));
    }
}

#[test]
fn walking_bass_resets_on_every_chord() {
    let mut chords = common::c_f_g_c();
    chords.push(Chord::new("C/E", 60, ChordQuality::Major, false, 4.0).with_bass(64));
    let mut config = common::band(chords, 0.0, SwingSubdivision::Eighths);
    config.bass = PartConfig {
        enabled: true,
        style: BassStyle::Walking,
    };
    let arrangement = Arc::clone(&config.arrangement);
    for seed in 0..8 {
        let mut pipeline = GenerationPipeline::new(config.clone(), seed);
        pipeline.start(0, Epoch::default());
        let batches = common::drive_pipeline(&mut pipeline, 240);
        let bass: Vec<(u64, i32)> = batches
            .iter()
            .filter(|b| b.instrument == InstrumentTag::Bass)
            .flat_map(|b| b.slots.iter())
            .filter_map(|(s, slot)| slot.notes.first().map(|n| (*s, n.pitch)))
            .collect();
        for step in (0..200u64).filter(|s| arrangement.chord_at(*s).is_some_and(|(_, sic)| sic == 0)) {
            let (chord, _) = arrangement.chord_at(step).unwrap();
            let pitch = bass
                .iter()
                .find(|(s, _)| *s == step)
                .map(|(_, p)| *p)
                .unwrap_or_else(|| panic!("seed {} no bass at chord start {}", seed, step));
            assert_eq!(pitch.rem_euclid(12), chord.bass_pc(), "seed {} step {}", seed, step);
        }
    }
}

#[test]
fn bad_chord_only_silences_its_steps() {
    let mut bad = Chord::new("X", 60, ChordQuality::Major, false, 4.0);
    bad.intervals.clear();
    let chords = vec![Chord::new("C", 60, ChordQuality::Major, false, 4.0), bad];
    let mut config = common::band(Vec::new(), 0.0, SwingSubdivision::Eighths);
    config.arrangement = Arc::new(Arrangement::compile(chords, TimeSignature::FourFour, Key::C, false));
    let mut pipeline = GenerationPipeline::new(config, 2);
    pipeline.start(0, Epoch::default());
    let mut errors = Vec::new();
    let mut bass_steps = Vec::new();
    for step in 0..64u64 {
        pipeline.request(step);
        let (batches, errs) = pipeline.pump();
        errors.extend(errs);
        bass_steps.extend(
            batches
                .iter()
                .filter(|b| b.instrument == InstrumentTag::Bass)
                .flat_map(|b| b.slots.iter().map(|(s, _)| *s)),
        );
    }
    assert!(!errors.is_empty());
    assert!(errors.iter().all(|e| (e.step % 32) >= 16));
    // The good chord keeps sounding on the second pass
    assert!(bass_steps.iter().any(|s| (32..48).contains(s)));
}

#[test]
fn dispatched_steps_are_consumed_once() {
    let config = common::band(common::ii_v_i(), 60.0, SwingSubdivision::Eighths);
    let (mut engine, clock) = common::inline_engine(config, 31);
    let mut sink = RecordingSink::new();
    engine.start();
    let mut steps = Vec::new();
    for _ in 0..1200 {
        engine.pump(&mut sink);
        clock.advance(common::PUMP_INTERVAL);
        steps.extend(engine.drain_visuals().into_iter().filter_map(|v| match v {
            VisualEvent::Step { step, .. } => Some(step),
            _ => None,
        }));
    }
    assert!(steps.len() > 200);
    assert!(steps.windows(2).all(|w| w[1] == w[0] + 1));
    // Each consumed slot left the buffer
    let step = engine.step();
    for inst in InstrumentTag::GENERATED {
        let buffer = engine.dispatcher().buffers().get(inst).unwrap();
        for s in 0..step {
            assert!(buffer.peek(s).is_none());
        }
    }
    let mut bass: Vec<u64> = sink
        .notes_for(InstrumentTag::Bass)
        .map(|e| (e.time() * 1e6).round() as u64)
        .collect();
    let n = bass.len();
    bass.sort();
    bass.dedup();
    assert_eq!(bass.len(), n);
}

#[test]
fn engine_flush_discards_buffered_material() {
    let config = common::band(common::c_f_g_c(), 0.0, SwingSubdivision::Eighths);
    let (mut engine, clock) = common::inline_engine(config, 41);
    let mut sink = RecordingSink::new();
    engine.start();
    common::run_for(&mut engine, &clock, &mut sink, 2.0);
    assert!(engine.dispatcher().buffers().total_len() > 0);
    let epoch = engine.dispatcher().epoch();

    engine.flush();
    assert_eq!(engine.dispatcher().buffers().total_len(), 0);
    assert_eq!(engine.dispatcher().epoch(), epoch.next());

    sink.clear();
    common::run_for(&mut engine, &clock, &mut sink, 2.0);
    assert!(engine.dispatcher().buffers().total_len() > 0);
    assert!(sink.notes_for(InstrumentTag::Bass).count() > 0);
}

/// Note spans in seconds, each cut short by any later release of its
/// instrument.
fn sounding_spans(sink: &RecordingSink, instrument: InstrumentTag) -> Vec<(f64, f64)> {
    let mut spans: Vec<(f64, f64)> = Vec::new();
    for event in &sink.events {
        match event {
            SinkEvent::Note { instrument: i, time, duration, .. } if *i == instrument => {
                spans.push((*time, time + duration));
            }
            SinkEvent::Release { instrument: i, time } if *i == instrument => {
                for span in &mut spans {
                    if span.1 > *time {
                        span.1 = time.max(span.0);
                    }
                }
            }
            _ => {}
        }
    }
    spans.sort_by(|a, b| a.0.total_cmp(&b.0));
    spans
}

#[test]
fn bass_stays_monophonic_across_flushes() {
    for seed in 0..6 {
        let mut config = common::band(common::c_f_g_c(), 0.0, SwingSubdivision::Eighths);
        config.bass = PartConfig {
            enabled: true,
            style: BassStyle::Walking,
        };
        config.soloist.enabled = false;
        config.comping.enabled = false;
        config.drums_enabled = false;
        let (mut engine, clock) = common::inline_engine(config, seed);
        let mut sink = RecordingSink::new();
        engine.start();

        for round in 0..40 {
            common::run_for(&mut engine, &clock, &mut sink, 2.0);
            match round % 3 {
                0 => engine.request_genre(GenreFeel::Rock),
                1 => {
                    let mut next = engine.config().clone();
                    next.version += 1;
                    next.arrangement = common::arrangement(common::c_f_g_c());
                    engine.apply_config(next);
                }
                _ => engine.flush(),
            }
        }
        common::run_for(&mut engine, &clock, &mut sink, 2.0);

        let releases = sink
            .events
            .iter()
            .filter(|e| matches!(e, SinkEvent::Release { instrument: InstrumentTag::Bass, .. }))
            .count();
        assert!(releases >= 39, "seed {} only {} releases", seed, releases);

        let spans = sounding_spans(&sink, InstrumentTag::Bass);
        assert!(spans.len() > 100);
        for w in spans.windows(2) {
            assert!(
                w[0].1 <= w[1].0 + 1e-9,
                "seed {}: note at {:.3}s lasting {:.3}s, next at {:.3}s",
                seed,
                w[0].0,
                w[0].1 - w[0].0,
                w[1].0
            );
        }
    }
}
