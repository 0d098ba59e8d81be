use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use ensemble_engine::{ClockConfig, DispatchOptions, EngineConfig};
use ensemble_types::{
    BandConfig, BassStyle, CompingStyle, GenreFeel, HarmonyStyle, Key, PartConfig, SoloistStyle, SwingSubdivision,
    TimeSignature,
};

const DEFAULT_CONFIG: &str = include_str!("../config.toml");

pub const MIN_BPM: f32 = 40.0;
pub const MAX_BPM: f32 = 240.0;

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(toml::de::Error),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "could not read config: {}", e),
            ConfigError::Parse(e) => write!(f, "malformed config: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io(e) => Some(e),
            ConfigError::Parse(e) => Some(e),
        }
    }
}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        ConfigError::Io(e)
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(e: toml::de::Error) -> Self {
        ConfigError::Parse(e)
    }
}

#[derive(Deserialize, Default)]
struct ConfigFile {
    #[serde(default)]
    defaults: DefaultsConfig,
    #[serde(default)]
    engine: EngineSection,
}

#[derive(Deserialize, Default)]
struct DefaultsConfig {
    bpm: Option<f32>,
    key: Option<String>,
    minor: Option<bool>,
    time_signature: Option<String>,
    genre: Option<String>,
    swing: Option<f32>,
    swing_subdivision: Option<String>,
    bass_style: Option<String>,
    soloist_style: Option<String>,
    comping_style: Option<String>,
    harmonies: Option<bool>,
    harmony_style: Option<String>,
    intensity: Option<f32>,
    complexity: Option<f32>,
    auto_intensity: Option<bool>,
    count_in: Option<bool>,
    double_stops: Option<bool>,
    tempo_drift: Option<f32>,
}

#[derive(Deserialize, Default)]
struct EngineSection {
    schedule_ahead_ms: Option<u64>,
    latency_pad_ms: Option<u64>,
    pump_interval_ms: Option<u64>,
    worker_interval_ms: Option<u64>,
    lookahead_steps: Option<u32>,
    staleness_measures: Option<u32>,
    session_timer_minutes: Option<f64>,
    seed: Option<u64>,
}

pub struct Config {
    defaults: DefaultsConfig,
    engine: EngineSection,
}

impl Config {
    /// Embedded defaults with the user's file layered on top. A missing,
    /// unreadable or malformed user file is logged and ignored.
    pub fn load() -> Self {
        let mut config = Self::embedded();
        if let Some(path) = user_config_path() {
            if path.exists() {
                match read_file(&path) {
                    Ok(user) => config.merge(user),
                    Err(e) => {
                        log::warn!(target: "ensemble::config", "ignoring {}: {}", path.display(), e)
                    }
                }
            }
        }
        config
    }

    /// Embedded defaults overridden by the file at `path`.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let user = read_file(path)?;
        let mut config = Self::embedded();
        config.merge(user);
        Ok(config)
    }

    /// Embedded defaults overridden by `text`.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let user: ConfigFile = toml::from_str(text)?;
        let mut config = Self::embedded();
        config.merge(user);
        Ok(config)
    }

    fn embedded() -> Self {
        let base: ConfigFile = match toml::from_str(DEFAULT_CONFIG) {
            Ok(base) => base,
            Err(e) => {
                log::warn!(target: "ensemble::config", "embedded config.toml is malformed: {}", e);
                ConfigFile::default()
            }
        };
        Config {
            defaults: base.defaults,
            engine: base.engine,
        }
    }

    fn merge(&mut self, user: ConfigFile) {
        merge_defaults(&mut self.defaults, user.defaults);
        merge_engine(&mut self.engine, user.engine);
    }

    /// Starting band configuration with an empty arrangement.
    pub fn band_config(&self) -> BandConfig {
        let fallback = BandConfig::default();
        let d = &self.defaults;
        BandConfig {
            bpm: d.bpm.unwrap_or(fallback.bpm).clamp(MIN_BPM, MAX_BPM),
            key: named(d.key.as_deref(), "key", Key::from_name).unwrap_or(fallback.key),
            minor: d.minor.unwrap_or(fallback.minor),
            time_signature: named(d.time_signature.as_deref(), "time signature", TimeSignature::from_name)
                .unwrap_or(fallback.time_signature),
            genre: named(d.genre.as_deref(), "genre", GenreFeel::from_name).unwrap_or(fallback.genre),
            swing: d.swing.unwrap_or(fallback.swing).clamp(0.0, 100.0),
            swing_subdivision: named(d.swing_subdivision.as_deref(), "swing subdivision", SwingSubdivision::from_name)
                .unwrap_or(fallback.swing_subdivision),
            bass: PartConfig {
                enabled: true,
                style: named(d.bass_style.as_deref(), "bass style", BassStyle::from_name).unwrap_or_default(),
            },
            soloist: PartConfig {
                enabled: true,
                style: named(d.soloist_style.as_deref(), "soloist style", SoloistStyle::from_name)
                    .unwrap_or_default(),
            },
            comping: PartConfig {
                enabled: true,
                style: named(d.comping_style.as_deref(), "comping style", CompingStyle::from_name)
                    .unwrap_or_default(),
            },
            harmonies: PartConfig {
                enabled: d.harmonies.unwrap_or(fallback.harmonies.enabled),
                style: named(d.harmony_style.as_deref(), "harmony style", HarmonyStyle::from_name)
                    .unwrap_or_default(),
            },
            intensity: d.intensity.unwrap_or(fallback.intensity).clamp(0.0, 1.0),
            complexity: d.complexity.unwrap_or(fallback.complexity).clamp(0.0, 1.0),
            auto_intensity: d.auto_intensity.unwrap_or(fallback.auto_intensity),
            count_in: d.count_in.unwrap_or(fallback.count_in),
            double_stops: d.double_stops.unwrap_or(fallback.double_stops),
            tempo_drift: d.tempo_drift.unwrap_or(fallback.tempo_drift).max(0.0),
            ..fallback
        }
    }

    pub fn engine_config(&self) -> EngineConfig {
        let fallback = EngineConfig::default();
        let clock = ClockConfig::default();
        let e = &self.engine;
        EngineConfig {
            dispatch: DispatchOptions {
                clock: ClockConfig {
                    schedule_ahead: e.schedule_ahead_ms.map(ms_to_secs).unwrap_or(clock.schedule_ahead),
                    latency_pad: e.latency_pad_ms.map(ms_to_secs).unwrap_or(clock.latency_pad),
                    ..clock
                },
                session_timer: self.session_timer(),
                seed: e.seed.unwrap_or(fallback.dispatch.seed),
                ..fallback.dispatch
            },
            lookahead: e.lookahead_steps.unwrap_or(fallback.lookahead).max(4),
            staleness_measures: e.staleness_measures.unwrap_or(fallback.staleness_measures).max(1),
            worker_interval: e
                .worker_interval_ms
                .map(|ms| Duration::from_millis(ms.max(1)))
                .unwrap_or(fallback.worker_interval),
            ..fallback
        }
    }

    /// How often the caller should pump the dispatcher.
    pub fn pump_interval(&self) -> Duration {
        Duration::from_millis(self.engine.pump_interval_ms.unwrap_or(25).clamp(1, 1000))
    }

    /// Session length in seconds; zero or missing means no timer.
    pub fn session_timer(&self) -> Option<f64> {
        self.engine
            .session_timer_minutes
            .filter(|m| m.is_finite() && *m > 0.0)
            .map(|m| m * 60.0)
    }
}

fn read_file(path: &Path) -> Result<ConfigFile, ConfigError> {
    let contents = std::fs::read_to_string(path)?;
    Ok(toml::from_str(&contents)?)
}

fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("ensemble").join("config.toml"))
}

fn ms_to_secs(ms: u64) -> f64 {
    ms as f64 / 1000.0
}

/// Parse an optional name, warning when it is set but not recognised.
fn named<T>(value: Option<&str>, what: &str, parse: fn(&str) -> Option<T>) -> Option<T> {
    let value = value?;
    let parsed = parse(value);
    if parsed.is_none() {
        log::warn!(target: "ensemble::config", "unknown {} {:?}, using default", what, value);
    }
    parsed
}

fn merge_defaults(base: &mut DefaultsConfig, user: DefaultsConfig) {
    if user.bpm.is_some() {
        base.bpm = user.bpm;
    }
    if user.key.is_some() {
        base.key = user.key;
    }
    if user.minor.is_some() {
        base.minor = user.minor;
    }
    if user.time_signature.is_some() {
        base.time_signature = user.time_signature;
    }
    if user.genre.is_some() {
        base.genre = user.genre;
    }
    if user.swing.is_some() {
        base.swing = user.swing;
    }
    if user.swing_subdivision.is_some() {
        base.swing_subdivision = user.swing_subdivision;
    }
    if user.bass_style.is_some() {
        base.bass_style = user.bass_style;
    }
    if user.soloist_style.is_some() {
        base.soloist_style = user.soloist_style;
    }
    if user.comping_style.is_some() {
        base.comping_style = user.comping_style;
    }
    if user.harmonies.is_some() {
        base.harmonies = user.harmonies;
    }
    if user.harmony_style.is_some() {
        base.harmony_style = user.harmony_style;
    }
    if user.intensity.is_some() {
        base.intensity = user.intensity;
    }
    if user.complexity.is_some() {
        base.complexity = user.complexity;
    }
    if user.auto_intensity.is_some() {
        base.auto_intensity = user.auto_intensity;
    }
    if user.count_in.is_some() {
        base.count_in = user.count_in;
    }
    if user.double_stops.is_some() {
        base.double_stops = user.double_stops;
    }
    if user.tempo_drift.is_some() {
        base.tempo_drift = user.tempo_drift;
    }
}

fn merge_engine(base: &mut EngineSection, user: EngineSection) {
    if user.schedule_ahead_ms.is_some() {
        base.schedule_ahead_ms = user.schedule_ahead_ms;
    }
    if user.latency_pad_ms.is_some() {
        base.latency_pad_ms = user.latency_pad_ms;
    }
    if user.pump_interval_ms.is_some() {
        base.pump_interval_ms = user.pump_interval_ms;
    }
    if user.worker_interval_ms.is_some() {
        base.worker_interval_ms = user.worker_interval_ms;
    }
    if user.lookahead_steps.is_some() {
        base.lookahead_steps = user.lookahead_steps;
    }
    if user.staleness_measures.is_some() {
        base.staleness_measures = user.staleness_measures;
    }
    if user.session_timer_minutes.is_some() {
        base.session_timer_minutes = user.session_timer_minutes;
    }
    if user.seed.is_some() {
        base.seed = user.seed;
    }
}
