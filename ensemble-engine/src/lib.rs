pub mod buffer;
pub mod clock;
pub mod conductor;
pub mod dispatcher;
pub mod engine;
pub mod error;
pub mod fills;
pub mod form;
pub mod generation;
pub mod generators;
pub mod groove;
pub mod rng;
pub mod sink;
pub mod sync_log;
pub mod telemetry;
pub mod worker;

pub use clock::{Clock, ClockConfig, ClockScheduler, ManualClock, SystemClock, TransportState};
pub use dispatcher::{DispatchOptions, DispatchStats, Dispatcher, VisualEvent};
pub use engine::{EngineConfig, PlaybackEngine};
pub use error::{EngineError, GenerationError};
pub use rng::GenRng;
pub use sink::{NullSink, RecordingSink, SinkEvent, SynthesisSink};
