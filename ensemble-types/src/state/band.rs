//! Band configuration: the versioned, single-writer state every generator
//! and the scheduler read from.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::arrangement::Arrangement;
use super::groove::{GenreFeel, SwingSubdivision};
use super::music::Key;
use super::style::{BassStyle, CompingStyle, HarmonyStyle, InstrumentTag, SoloistStyle};
use super::time_signature::TimeSignature;

/// Enable flag plus style for one band member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartConfig<S> {
    pub enabled: bool,
    pub style: S,
}

impl<S: Default> Default for PartConfig<S> {
    fn default() -> Self {
        Self {
            enabled: true,
            style: S::default(),
        }
    }
}

/// Full band configuration. Cloned wholesale into the generation worker on
/// every change; `version` increases with each published mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BandConfig {
    pub version: u64,
    pub bpm: f32,
    pub key: Key,
    pub minor: bool,
    pub time_signature: TimeSignature,
    pub genre: GenreFeel,
    /// 0..=100
    pub swing: f32,
    pub swing_subdivision: SwingSubdivision,
    pub bass: PartConfig<BassStyle>,
    pub soloist: PartConfig<SoloistStyle>,
    pub comping: PartConfig<CompingStyle>,
    /// Pads and stabs over the comping; off unless asked for
    pub harmonies: PartConfig<HarmonyStyle>,
    pub drums_enabled: bool,
    /// User-set energy, 0..=1
    pub intensity: f32,
    /// 0..=1
    pub complexity: f32,
    /// Let the conductor steer intensity from the song form
    pub auto_intensity: bool,
    pub double_stops: bool,
    /// Tempo drift depth, 0..=1 (0 keeps the tempo fixed)
    pub tempo_drift: f32,
    pub count_in: bool,
    pub arrangement: Arc<Arrangement>,
}

impl Default for BandConfig {
    fn default() -> Self {
        Self {
            version: 0,
            bpm: 100.0,
            key: Key::C,
            minor: false,
            time_signature: TimeSignature::FourFour,
            genre: GenreFeel::Rock,
            swing: 0.0,
            swing_subdivision: SwingSubdivision::Eighths,
            bass: PartConfig::default(),
            soloist: PartConfig::default(),
            comping: PartConfig::default(),
            harmonies: PartConfig {
                enabled: false,
                style: HarmonyStyle::Smart,
            },
            drums_enabled: true,
            intensity: 0.5,
            complexity: 0.3,
            auto_intensity: true,
            double_stops: false,
            tempo_drift: 0.0,
            count_in: false,
            arrangement: Arc::new(Arrangement::default()),
        }
    }
}

impl BandConfig {
    /// Seconds per sixteenth step at `bpm`.
    pub fn sixteenth(bpm: f32) -> f64 {
        60.0 / bpm.max(1.0) as f64 / 4.0
    }

    pub fn steps_per_measure(&self) -> u32 {
        self.time_signature.steps_per_measure()
    }

    pub fn part_enabled(&self, instrument: InstrumentTag) -> bool {
        match instrument {
            InstrumentTag::Bass => self.bass.enabled,
            InstrumentTag::Soloist => self.soloist.enabled,
            InstrumentTag::Comping => self.comping.enabled,
            InstrumentTag::Harmonies => self.harmonies.enabled,
            InstrumentTag::Drums => self.drums_enabled,
        }
    }

    /// Whether `instrument`'s enable flag or style differs from `other`.
    pub fn part_differs(&self, other: &BandConfig, instrument: InstrumentTag) -> bool {
        match instrument {
            InstrumentTag::Bass => self.bass != other.bass,
            InstrumentTag::Soloist => self.soloist != other.soloist,
            InstrumentTag::Comping => self.comping != other.comping,
            InstrumentTag::Harmonies => self.harmonies != other.harmonies,
            InstrumentTag::Drums => self.drums_enabled != other.drums_enabled,
        }
    }
}

/// Ensemble density derived from intensity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Density {
    Thin,
    #[default]
    Standard,
    Rich,
}

impl Density {
    pub fn from_intensity(intensity: f32) -> Density {
        if intensity < 0.4 {
            Density::Thin
        } else if intensity > 0.85 {
            Density::Rich
        } else {
            Density::Standard
        }
    }
}

/// Fast-moving performance values published by the conductor. Replaced
/// wholesale on every publish.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PerformanceState {
    /// Band intensity, 0..=1
    pub intensity: f32,
    pub complexity: f32,
    /// Global velocity multiplier
    pub velocity_scale: f32,
    /// Probability a finished motif is kept as a hook
    pub hook_retention: f32,
    pub density: Density,
}

impl Default for PerformanceState {
    fn default() -> Self {
        Self::from_intensity(0.5, 0.3)
    }
}

impl PerformanceState {
    pub fn from_intensity(intensity: f32, complexity: f32) -> Self {
        let intensity = intensity.clamp(0.0, 1.0);
        let complexity = complexity.clamp(0.0, 1.0);
        Self {
            intensity,
            complexity,
            velocity_scale: 0.7 + intensity * 0.45,
            hook_retention: 0.2 + complexity * 0.6,
            density: Density::from_intensity(intensity),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sixteenth_at_120_bpm() {
        assert!((BandConfig::sixteenth(120.0) - 0.125).abs() < 1e-12);
    }

    #[test]
    fn performance_derivation() {
        let p = PerformanceState::from_intensity(1.0, 1.0);
        assert!((p.velocity_scale - 1.15).abs() < 1e-6);
        assert!((p.hook_retention - 0.8).abs() < 1e-6);
        assert_eq!(p.density, Density::Rich);
        assert_eq!(PerformanceState::from_intensity(0.2, 0.0).density, Density::Thin);
    }

    #[test]
    fn part_changes_are_per_instrument() {
        let a = BandConfig::default();
        let mut b = a.clone();
        assert!(!b.part_enabled(InstrumentTag::Harmonies));
        b.soloist.style = crate::SoloistStyle::Bird;
        b.harmonies.enabled = true;
        assert!(a.part_differs(&b, InstrumentTag::Soloist));
        assert!(a.part_differs(&b, InstrumentTag::Harmonies));
        assert!(!a.part_differs(&b, InstrumentTag::Bass));
        assert!(!a.part_differs(&b, InstrumentTag::Comping));
    }

    #[test]
    fn config_serializes_with_arrangement() {
        let cfg = BandConfig::default();
        let json = serde_json::to_string(&cfg).unwrap();
        let back: BandConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, cfg);
    }
}
