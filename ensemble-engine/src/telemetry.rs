//! Generation-pass timing for the worker thread.
//!
//! Fixed-size ring of pass durations; recording never allocates.

use std::time::Duration;

use serde::{Deserialize, Serialize};

const SAMPLE_RING: usize = 256;

/// Window summary sent back to the dispatcher.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TelemetrySummary {
    pub avg_us: u32,
    pub max_us: u32,
    pub p95_us: u32,
    /// Passes that exceeded the budget since start (cumulative)
    pub overruns: u64,
}

pub struct GenerationTelemetry {
    samples_us: [u32; SAMPLE_RING],
    next: usize,
    filled: usize,
    max_us: u32,
    overruns: u64,
}

impl Default for GenerationTelemetry {
    fn default() -> Self {
        Self::new()
    }
}

impl GenerationTelemetry {
    pub fn new() -> Self {
        Self {
            samples_us: [0; SAMPLE_RING],
            next: 0,
            filled: 0,
            max_us: 0,
            overruns: 0,
        }
    }

    /// Record one generation pass against a budget in microseconds.
    #[inline]
    pub fn record(&mut self, pass: Duration, budget_us: u32) {
        let us = pass.as_micros().min(u32::MAX as u128) as u32;
        self.samples_us[self.next] = us;
        self.next = (self.next + 1) % SAMPLE_RING;
        self.filled = (self.filled + 1).min(SAMPLE_RING);
        self.max_us = self.max_us.max(us);
        if us > budget_us {
            self.overruns += 1;
        }
    }

    pub fn sample_count(&self) -> usize {
        self.filled
    }

    /// Summarize the ring and start a new max window.
    pub fn take_summary(&mut self) -> TelemetrySummary {
        if self.filled == 0 {
            return TelemetrySummary::default();
        }
        let window = &self.samples_us[..self.filled];
        let sum: u64 = window.iter().map(|&x| x as u64).sum();
        let mut sorted = self.samples_us;
        sorted[..self.filled].sort_unstable();
        let p95_idx = ((self.filled * 95 / 100).max(1) - 1).min(self.filled - 1);
        let summary = TelemetrySummary {
            avg_us: (sum / self.filled as u64) as u32,
            max_us: self.max_us,
            p95_us: sorted[p95_idx],
            overruns: self.overruns,
        };
        self.max_us = 0;
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_of_three_passes() {
        let mut t = GenerationTelemetry::new();
        for us in [100, 200, 900] {
            t.record(Duration::from_micros(us), 500);
        }
        let s = t.take_summary();
        assert_eq!(s.avg_us, 400);
        assert_eq!(s.max_us, 900);
        assert_eq!(s.overruns, 1);
        // max resets per window, overruns do not
        assert_eq!(t.take_summary().max_us, 0);
        assert_eq!(t.take_summary().overruns, 1);
    }

    #[test]
    fn ring_stays_bounded() {
        let mut t = GenerationTelemetry::new();
        for i in 0..1000u64 {
            t.record(Duration::from_micros(i), 10_000);
        }
        assert_eq!(t.sample_count(), SAMPLE_RING);
        assert!(t.take_summary().p95_us >= 744);
    }

    #[test]
    fn empty_summary_is_zero() {
        assert_eq!(GenerationTelemetry::new().take_summary(), TelemetrySummary::default());
    }
}
