pub mod arrangement;
pub mod band;
pub mod chord;
pub mod groove;
pub mod music;
pub mod style;
pub mod time_signature;

pub use arrangement::{Arrangement, ArrangementError, Section, StepMapEntry};
pub use band::{BandConfig, Density, PartConfig, PerformanceState};
pub use chord::{Chord, ChordQuality};
pub use groove::{DrumPattern, DrumVoice, GenreFeel, SwingSubdivision};
pub use music::{midi_to_freq, pitch_class, Key, Scale};
pub use style::{BassStyle, CompingStyle, HarmonyStyle, InstrumentTag, SoloistStyle};
pub use time_signature::{StepInfo, TimeSignature};
