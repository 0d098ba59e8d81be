//! Lookahead step clock.
//!
//! Keeps two time lines: `unswung_time`, which advances by exactly one
//! sixteenth per step, and `next_time`, the swung dispatch time derived from
//! it by position. Because the swing offset is recomputed from the unswung
//! line every step it can never accumulate.

use std::cell::Cell;
use std::rc::Rc;
use std::time::Instant;

use ensemble_types::{SwingSubdivision, TimeSignature};

/// Source of "now" in seconds.
pub trait Clock {
    fn now(&self) -> f64;
}

/// Wall-clock time since construction.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    origin: Instant,
}

impl Default for SystemClock {
    fn default() -> Self {
        Self { origin: Instant::now() }
    }
}

impl Clock for SystemClock {
    fn now(&self) -> f64 {
        self.origin.elapsed().as_secs_f64()
    }
}

/// Hand-driven clock. Clones share the same time.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Rc<Cell<f64>>,
}

impl ManualClock {
    pub fn new(start: f64) -> Self {
        Self {
            now: Rc::new(Cell::new(start)),
        }
    }

    pub fn set(&self, t: f64) {
        self.now.set(t);
    }

    pub fn advance(&self, dt: f64) {
        self.now.set(self.now.get() + dt);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> f64 {
        self.now.get()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClockConfig {
    /// Seconds of material kept scheduled ahead of now
    pub schedule_ahead: f64,
    /// Delay between start and the first step
    pub latency_pad: f64,
    /// Upper bound on steps dispatched by one pump
    pub max_steps_per_pump: usize,
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self {
            schedule_ahead: 0.1,
            latency_pad: 0.1,
            max_steps_per_pump: 4096,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TransportState {
    Stopped,
    CountingIn { beat: u32 },
    Playing,
    /// Stop at the next loop boundary
    EndingArmed,
    /// Cadence dispatched; silent until `stop_at`
    Resolving { stop_at: f64 },
}

/// Delay of `step` relative to the unswung grid.
///
/// Only meters with four steps per beat swing. Sixteenth swing delays every
/// odd step; eighth swing delays the second eighth of each beat (steps 2
/// and 3 of 4).
pub fn swing_offset(step: u64, sixteenth: f64, swing: f32, subdivision: SwingSubdivision, ts: TimeSignature) -> f64 {
    if swing <= 0.0 || ts.steps_per_beat() != 4 {
        return 0.0;
    }
    let shift = (sixteenth / 3.0) * (swing.clamp(0.0, 100.0) as f64 / 100.0);
    if subdivision.is_delayed((step % 4) as u32) {
        shift
    } else {
        0.0
    }
}

/// Called by [`ClockScheduler::pump`] for each due position.
pub trait StepHandler {
    /// Dispatch whatever sits at the clock's current position and advance
    /// the clock. Returning false ends the pump early.
    fn on_due(&mut self, clock: &mut ClockScheduler) -> bool;
}

#[derive(Debug, Clone)]
pub struct ClockScheduler {
    config: ClockConfig,
    state: TransportState,
    step: u64,
    next_time: f64,
    unswung_time: f64,
}

impl ClockScheduler {
    pub fn new(config: ClockConfig) -> Self {
        Self {
            config,
            state: TransportState::Stopped,
            step: 0,
            next_time: 0.0,
            unswung_time: 0.0,
        }
    }

    pub fn config(&self) -> &ClockConfig {
        &self.config
    }

    pub fn state(&self) -> TransportState {
        self.state
    }

    pub fn set_state(&mut self, state: TransportState) {
        self.state = state;
    }

    pub fn step(&self) -> u64 {
        self.step
    }

    pub fn next_time(&self) -> f64 {
        self.next_time
    }

    pub fn unswung_time(&self) -> f64 {
        self.unswung_time
    }

    pub fn is_running(&self) -> bool {
        !matches!(self.state, TransportState::Stopped)
    }

    /// Begin at step 0, `latency_pad` from `now`.
    pub fn start(&mut self, now: f64, count_in: bool) {
        self.step = 0;
        self.next_time = now + self.config.latency_pad;
        self.unswung_time = self.next_time;
        self.state = if count_in {
            TransportState::CountingIn { beat: 0 }
        } else {
            TransportState::Playing
        };
        log::debug!(target: "ensemble::clock", "start at {:.3}s (count-in: {})", self.next_time, count_in);
    }

    pub fn stop(&mut self) {
        self.state = TransportState::Stopped;
    }

    /// The next step falls inside the schedule-ahead window.
    pub fn is_due(&self, now: f64) -> bool {
        self.next_time < now + self.config.schedule_ahead
    }

    fn is_dispatching(&self) -> bool {
        matches!(
            self.state,
            TransportState::CountingIn { .. } | TransportState::Playing | TransportState::EndingArmed
        )
    }

    /// Hand every due position to `handler`, catching up after a stall.
    /// Returns how many positions were dispatched.
    ///
    /// One call dispatches at most `max_steps_per_pump` positions (4096 by
    /// default, over eight minutes of sixteenths at 120 bpm). A longer stall
    /// logs a warning and the remainder goes out on the following pumps,
    /// still in order and with nothing skipped.
    pub fn pump<H: StepHandler + ?Sized>(&mut self, now: f64, handler: &mut H) -> usize {
        let mut count = 0;
        while self.is_dispatching() && self.is_due(now) {
            if count >= self.config.max_steps_per_pump {
                log::warn!(
                    target: "ensemble::clock",
                    "pump capped at {} steps, {:.3}s behind",
                    count,
                    now - self.next_time
                );
                break;
            }
            let before = (self.step, self.next_time);
            let keep_going = handler.on_due(self);
            count += 1;
            if !keep_going || (self.step, self.next_time) == before {
                break;
            }
        }
        count
    }

    /// Move to the next step.
    pub fn advance_step(&mut self, sixteenth: f64, swing: f32, subdivision: SwingSubdivision, ts: TimeSignature) {
        self.unswung_time += sixteenth;
        self.step += 1;
        self.next_time = self.unswung_time + swing_offset(self.step, sixteenth, swing, subdivision, ts);
    }

    /// Count-in moves a whole beat at a time. Returns true when the count
    /// is complete and step 0 is due.
    pub fn advance_count_in(&mut self, beat_duration: f64, beats: u32) -> bool {
        let TransportState::CountingIn { beat } = self.state else {
            return false;
        };
        self.next_time += beat_duration;
        self.unswung_time += beat_duration;
        let beat = beat + 1;
        if beat >= beats {
            self.step = 0;
            self.state = TransportState::Playing;
            true
        } else {
            self.state = TransportState::CountingIn { beat };
            false
        }
    }

    /// Snap the swung time line back onto the grid, e.g. when the feel
    /// changes.
    pub fn re_anchor(&mut self) {
        self.next_time = self.unswung_time;
    }

    /// Rescale the wait until the next step after a tempo change. `ratio`
    /// is old bpm over new bpm; times already in the past stay put.
    pub fn retime(&mut self, now: f64, ratio: f64) {
        if !ratio.is_finite() || ratio <= 0.0 {
            return;
        }
        if self.next_time > now {
            self.next_time = now + (self.next_time - now) * ratio;
        }
        if self.unswung_time > now {
            self.unswung_time = now + (self.unswung_time - now) * ratio;
        }
    }

    /// Move playback to `step` without touching time, for flushes and seeks.
    pub fn seek(&mut self, step: u64) {
        self.step = step;
    }

    /// Blend of the grid and swung times for instruments that sit straighter
    /// than the drums.
    pub fn blended_time(&self, straightness: f64) -> f64 {
        let s = straightness.clamp(0.0, 1.0);
        s * self.unswung_time + (1.0 - s) * self.next_time
    }
}
