//! Where dispatched material goes. The engine never makes sound itself.

use serde::{Deserialize, Serialize};

use ensemble_types::{DrumVoice, InstrumentTag, NoteEvent};

/// Receiver of timed performance events. Times are in the clock's seconds.
pub trait SynthesisSink {
    /// `duration` is the sounding length in seconds.
    fn note(&mut self, note: &NoteEvent, time: f64, duration: f64);
    fn drum(&mut self, voice: DrumVoice, velocity: f32, time: f64);
    fn pedal(&mut self, instrument: InstrumentTag, down: bool, time: f64);
    /// Metronome or count-in click at `frequency` Hz.
    fn click(&mut self, frequency: f32, time: f64);
    /// Cut whatever `instrument` is sounding at `time`.
    fn release(&mut self, instrument: InstrumentTag, time: f64);
    /// Silence everything still sounding from `time` on.
    fn release_all(&mut self, time: f64);
}

/// One sink call, as recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SinkEvent {
    Note {
        instrument: InstrumentTag,
        pitch: i32,
        velocity: f32,
        time: f64,
        duration: f64,
        #[serde(default, skip_serializing_if = "std::ops::Not::not")]
        muted: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        double_stop: Option<i32>,
    },
    Drum {
        voice: DrumVoice,
        velocity: f32,
        time: f64,
    },
    Pedal {
        instrument: InstrumentTag,
        down: bool,
        time: f64,
    },
    Click {
        frequency: f32,
        time: f64,
    },
    Release {
        instrument: InstrumentTag,
        time: f64,
    },
    ReleaseAll {
        time: f64,
    },
}

impl SinkEvent {
    pub fn time(&self) -> f64 {
        match self {
            SinkEvent::Note { time, .. }
            | SinkEvent::Drum { time, .. }
            | SinkEvent::Pedal { time, .. }
            | SinkEvent::Click { time, .. }
            | SinkEvent::Release { time, .. }
            | SinkEvent::ReleaseAll { time } => *time,
        }
    }

    pub fn instrument(&self) -> Option<InstrumentTag> {
        match self {
            SinkEvent::Note { instrument, .. }
            | SinkEvent::Pedal { instrument, .. }
            | SinkEvent::Release { instrument, .. } => Some(*instrument),
            SinkEvent::Drum { .. } => Some(InstrumentTag::Drums),
            _ => None,
        }
    }
}

/// Keeps every event in call order.
#[derive(Debug, Default, Clone)]
pub struct RecordingSink {
    pub events: Vec<SinkEvent>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notes_for(&self, instrument: InstrumentTag) -> impl Iterator<Item = &SinkEvent> + '_ {
        self.events
            .iter()
            .filter(move |e| matches!(e, SinkEvent::Note { instrument: i, .. } if *i == instrument))
    }

    pub fn drums(&self) -> impl Iterator<Item = &SinkEvent> + '_ {
        self.events.iter().filter(|e| matches!(e, SinkEvent::Drum { .. }))
    }

    pub fn clicks(&self) -> impl Iterator<Item = &SinkEvent> + '_ {
        self.events.iter().filter(|e| matches!(e, SinkEvent::Click { .. }))
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }

    /// One JSON object per line.
    pub fn to_json_lines(&self) -> Result<String, serde_json::Error> {
        let mut out = String::new();
        for e in &self.events {
            out.push_str(&serde_json::to_string(e)?);
            out.push('\n');
        }
        Ok(out)
    }
}

impl SynthesisSink for RecordingSink {
    fn note(&mut self, note: &NoteEvent, time: f64, duration: f64) {
        self.events.push(SinkEvent::Note {
            instrument: note.instrument,
            pitch: note.pitch,
            velocity: note.velocity,
            time,
            duration,
            muted: note.muted,
            double_stop: note.double_stop,
        });
    }

    fn drum(&mut self, voice: DrumVoice, velocity: f32, time: f64) {
        self.events.push(SinkEvent::Drum { voice, velocity, time });
    }

    fn pedal(&mut self, instrument: InstrumentTag, down: bool, time: f64) {
        self.events.push(SinkEvent::Pedal { instrument, down, time });
    }

    fn click(&mut self, frequency: f32, time: f64) {
        self.events.push(SinkEvent::Click { frequency, time });
    }

    fn release(&mut self, instrument: InstrumentTag, time: f64) {
        self.events.push(SinkEvent::Release { instrument, time });
    }

    fn release_all(&mut self, time: f64) {
        self.events.push(SinkEvent::ReleaseAll { time });
    }
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl SynthesisSink for NullSink {
    fn note(&mut self, _: &NoteEvent, _: f64, _: f64) {}
    fn drum(&mut self, _: DrumVoice, _: f32, _: f64) {}
    fn pedal(&mut self, _: InstrumentTag, _: bool, _: f64) {}
    fn click(&mut self, _: f32, _: f64) {}
    fn release(&mut self, _: InstrumentTag, _: f64) {}
    fn release_all(&mut self, _: f64) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_in_order() {
        let mut sink = RecordingSink::new();
        sink.click(1000.0, 0.0);
        sink.note(&NoteEvent::new(InstrumentTag::Bass, 36, 0.8, 4), 0.5, 0.5);
        sink.drum(DrumVoice::Kick, 1.0, 0.5);
        sink.release(InstrumentTag::Soloist, 0.75);
        assert_eq!(sink.events.len(), 4);
        assert_eq!(sink.events[3].instrument(), Some(InstrumentTag::Soloist));
        assert_eq!(sink.notes_for(InstrumentTag::Bass).count(), 1);
        assert_eq!(sink.events[2].instrument(), Some(InstrumentTag::Drums));
        assert_eq!(sink.events[1].time(), 0.5);
    }

    #[test]
    fn json_lines_are_tagged() {
        let mut sink = RecordingSink::new();
        sink.drum(DrumVoice::Snare, 0.9, 1.25);
        sink.release_all(2.0);
        let text = sink.to_json_lines().unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        let back: SinkEvent = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(back, SinkEvent::Drum {
            voice: DrumVoice::Snare,
            velocity: 0.9,
            time: 1.25
        });
        assert!(lines[1].contains("\"release_all\""));
    }
}
