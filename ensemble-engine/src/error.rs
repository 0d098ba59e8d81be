use std::fmt;

use ensemble_types::InstrumentTag;

/// A generator could not produce material for one step. Reported as worker
/// feedback; the instrument stays silent for that step only.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationError {
    pub instrument: InstrumentTag,
    pub step: u64,
    pub message: String,
}

impl GenerationError {
    pub fn new(instrument: InstrumentTag, step: u64, message: impl Into<String>) -> Self {
        Self {
            instrument,
            step,
            message: message.into(),
        }
    }
}

impl fmt::Display for GenerationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} failed at step {}: {}", self.instrument, self.step, self.message)
    }
}

impl std::error::Error for GenerationError {}

/// Engine lifecycle failure (worker spawn, dead channel).
#[derive(Debug, Clone, PartialEq)]
pub struct EngineError(pub String);

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for EngineError {}

impl From<std::io::Error> for EngineError {
    fn from(e: std::io::Error) -> Self {
        EngineError(e.to_string())
    }
}

impl From<String> for EngineError {
    fn from(s: String) -> Self {
        EngineError(s)
    }
}
