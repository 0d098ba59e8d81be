//! # ensemble-core
//!
//! Session-level pieces around the playback engine: configuration loading,
//! the chord progression parser and the [`Session`] that owns the band
//! configuration.
//!
//! ```rust,ignore
//! use ensemble_core::{Config, Session};
//! use ensemble_engine::NullSink;
//!
//! let config = Config::load();
//! let mut session = Session::from_config(&config)?;
//! session.set_progression("[Verse x2] ii7 | V7 | Imaj7 | Imaj7")?;
//! session.start();
//! let mut sink = NullSink;
//! loop {
//!     session.pump(&mut sink);
//!     std::thread::sleep(config.pump_interval());
//! }
//! ```

pub mod config;
pub mod progression;
pub mod session;

pub use config::{Config, ConfigError};
pub use progression::{parse_progression, ProgressionError};
pub use session::{Session, SessionStatus};
