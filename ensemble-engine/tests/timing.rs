mod common;

use ensemble_engine::clock::{swing_offset, ClockConfig, ClockScheduler};
use ensemble_engine::{Clock, RecordingSink, TransportState, VisualEvent};
use ensemble_types::{BandConfig, SwingSubdivision, TimeSignature};

fn step_times(visuals: &[VisualEvent]) -> Vec<(u64, f64)> {
    visuals
        .iter()
        .filter_map(|v| match v {
            VisualEvent::Step { step, time } => Some((*step, *time)),
            _ => None,
        })
        .collect()
}

#[test]
fn swing_never_drifts() {
    let sixteenth = BandConfig::sixteenth(120.0);
    for subdivision in [SwingSubdivision::Eighths, SwingSubdivision::Sixteenths] {
        for swing in [0.0f32, 10.0, 33.0, 50.0, 60.0, 75.0, 100.0] {
            let shift = (sixteenth / 3.0) * (swing as f64 / 100.0);
            let mut clock = ClockScheduler::new(ClockConfig::default());
            clock.start(0.0, false);
            let t0 = clock.unswung_time();
            for n in 1..=14_400u64 {
                clock.advance_step(sixteenth, swing, subdivision, TimeSignature::FourFour);
                let drift = clock.next_time() - clock.unswung_time();
                assert!(drift >= -1e-12 && drift <= shift + 1e-9, "swing {} step {}", swing, n);
                let expected = t0 + n as f64 * sixteenth;
                assert!((clock.unswung_time() - expected).abs() < 1e-6, "swing {} step {}", swing, n);
            }
        }
    }
}

#[test]
fn sixteenth_swing_delays_odd_steps() {
    let six = 0.1;
    for step in 0..8u64 {
        let off = swing_offset(step, six, 100.0, SwingSubdivision::Sixteenths, TimeSignature::FourFour);
        if step % 2 == 1 {
            assert!((off - six / 3.0).abs() < 1e-12);
        } else {
            assert_eq!(off, 0.0);
        }
    }
}

#[test]
fn worked_example_at_120_bpm() {
    let config = common::band(common::c_f_g_c(), 60.0, SwingSubdivision::Eighths);
    assert_eq!(config.arrangement.total_steps, 64);
    let (mut engine, clock) = common::inline_engine(config, 3);
    let mut sink = RecordingSink::new();
    engine.start();
    let t0 = engine.dispatcher().clock().next_time();
    common::run_for(&mut engine, &clock, &mut sink, 1.0);

    let times = step_times(&engine.drain_visuals());
    let sixteenth = 0.125;
    let shift = (sixteenth / 3.0) * 0.6;
    assert_eq!(times[0], (0, t0));
    let (step, t2) = times[2];
    assert_eq!(step, 2);
    assert!((t2 - (t0 + 2.0 * sixteenth + shift)).abs() < 1e-9);
    let (_, t1) = times[1];
    assert!((t1 - (t0 + sixteenth)).abs() < 1e-9);
}

#[test]
fn one_pump_catches_up_after_stall() {
    let config = common::band(common::c_f_g_c(), 0.0, SwingSubdivision::Eighths);
    let (mut engine, clock) = common::inline_engine(config, 4);
    let mut sink = RecordingSink::new();
    engine.start();
    engine.pump(&mut sink);
    let before = engine.step();

    clock.advance(0.5);
    let dispatched = engine.pump(&mut sink);
    let ahead = engine.dispatcher().clock().config().schedule_ahead;
    assert!(dispatched >= 4);
    assert_eq!(engine.step(), before + dispatched as u64);
    assert!(engine.dispatcher().clock().next_time() >= clock.now() + ahead);
}

#[test]
fn long_stall_is_bounded() {
    let config = common::band(common::c_f_g_c(), 30.0, SwingSubdivision::Sixteenths);
    let (mut engine, clock) = common::inline_engine(config, 5);
    let mut sink = RecordingSink::new();
    engine.start();
    engine.pump(&mut sink);

    clock.advance(60.0);
    let dispatched = engine.pump(&mut sink);
    assert!(dispatched <= 4096);
    assert!(engine.dispatcher().clock().next_time() >= clock.now());
    // Steps kept monotonic through the catch-up
    let times = step_times(&engine.drain_visuals());
    assert!(times.windows(2).all(|w| w[1].0 == w[0].0 + 1 && w[1].1 > w[0].1));
}

#[test]
fn count_in_then_step_zero_on_the_next_beat() {
    let mut config = common::band(common::c_f_g_c(), 0.0, SwingSubdivision::Eighths);
    config.count_in = true;
    let (mut engine, clock) = common::inline_engine(config, 6);
    let mut sink = RecordingSink::new();
    engine.start();
    let t0 = engine.dispatcher().clock().next_time();
    common::run_for(&mut engine, &clock, &mut sink, 2.5);
    let clicks: Vec<f64> = sink.clicks().map(|e| e.time()).collect();
    assert_eq!(clicks.len(), 4);
    let first = step_times(&engine.drain_visuals())[0];
    assert_eq!(first.0, 0);
    assert!((first.1 - (t0 + 4.0 * 0.5)).abs() < 1e-9);
}

#[test]
fn session_timer_ends_with_resolution() {
    let config = common::band(common::c_f_g_c(), 0.0, SwingSubdivision::Eighths);
    let (mut engine, clock) = common::inline_engine(config, 7);
    let mut sink = RecordingSink::new();
    engine.set_session_timer(Some(5.0));
    engine.start();
    common::run_for(&mut engine, &clock, &mut sink, 6.0);
    assert_eq!(engine.state(), TransportState::EndingArmed);
    common::run_for(&mut engine, &clock, &mut sink, 8.0);
    assert_eq!(engine.state(), TransportState::Stopped);
    // Loop of 64 steps resolves at step 64
    assert_eq!(engine.step(), 64);
    assert!(sink.events.iter().any(|e| matches!(e, ensemble_engine::SinkEvent::ReleaseAll { .. })));
}
