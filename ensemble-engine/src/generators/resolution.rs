//! Closing V → I cadence played when an armed ending reaches the loop
//! boundary. Everything sounds relative to one dispatch step; the tonic
//! lands two beats later through timing offsets.

use ensemble_types::{BandConfig, DrumHit, DrumVoice, InstrumentTag, Key, NoteEvent, PedalChange};

/// Material for the final cadence.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Cadence {
    pub notes: Vec<NoteEvent>,
    pub pedal: Vec<PedalChange>,
    pub drums: Vec<DrumHit>,
}

fn low_octave(pc: i32) -> i32 {
    let drop = if pc > 7 { 12 } else { 0 };
    pc + 24 - drop
}

fn hit(voice: DrumVoice, velocity: f32, timing_offset: f64) -> DrumHit {
    DrumHit {
        voice,
        velocity,
        timing_offset,
    }
}

/// Build the cadence in `key` for the parts enabled in `config`.
pub fn cadence(config: &BandConfig, key: Key) -> Cadence {
    let beat = 60.0 / config.bpm.max(1.0) as f64;
    let minor = config.minor;
    let key_pc = key.semitone();
    let dom_pc = (key_pc + 7) % 12;
    let tonic_root = 60 + key_pc;
    let dom_root = 60 + dom_pc;
    let mut out = Cadence::default();

    if config.bass.enabled {
        out.notes.push(NoteEvent::new(InstrumentTag::Bass, low_octave(dom_pc), 0.9, 8));
        out.notes
            .push(NoteEvent::new(InstrumentTag::Bass, low_octave(key_pc), 1.0, 16).with_offset(beat * 2.0));
    }

    if config.comping.enabled {
        out.pedal.push(PedalChange {
            down: true,
            timing_offset: 0.0,
        });
        let dominant: &[i32] = if minor { &[0, 4, 10, 13] } else { &[0, 4, 10, 14] };
        let comp = 1.0 / (dominant.len() as f32).sqrt();
        for (i, iv) in dominant.iter().enumerate() {
            out.notes.push(
                NoteEvent::new(InstrumentTag::Comping, dom_root + iv, 0.6 * comp, 8).with_offset(i as f64 * 0.015),
            );
        }
        let tonic: &[i32] = if minor { &[0, 2, 3, 7, 10] } else { &[0, 2, 4, 7, 9] };
        let comp = 1.0 / (tonic.len() as f32).sqrt();
        for (i, iv) in tonic.iter().enumerate() {
            out.notes.push(
                NoteEvent::new(InstrumentTag::Comping, tonic_root + iv, 0.75 * comp, 24)
                    .with_offset(beat * 2.0 + i as f64 * 0.04),
            );
        }
    }

    if config.soloist.enabled {
        let g1 = dom_root + 10 + 12;
        let third = if minor { 3 } else { 4 };
        let mut g2 = tonic_root + third + 12;
        if (g1 - g2).abs() > 6 {
            g2 -= 12;
        }
        out.notes.push(NoteEvent::new(InstrumentTag::Soloist, g1, 0.7, 8));
        out.notes.push(
            NoteEvent::new(InstrumentTag::Soloist, g2, 0.85, 16)
                .with_offset(beat * 2.0)
                .with_bend(0.5),
        );
    }

    if config.drums_enabled {
        out.drums.extend([
            hit(DrumVoice::Kick, 0.9, 0.0),
            hit(DrumVoice::HiHat, 0.7, 0.0),
            hit(DrumVoice::Snare, 0.8, beat),
            hit(DrumVoice::Kick, 1.0, beat * 2.0),
            hit(DrumVoice::Crash, 0.95, beat * 2.0),
        ]);
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn c_major_cadence() {
        let cfg = BandConfig {
            bpm: 120.0,
            ..BandConfig::default()
        };
        let c = cadence(&cfg, Key::C);
        let bass: Vec<i32> = c.notes.iter().filter(|n| n.instrument == InstrumentTag::Bass).map(|n| n.pitch).collect();
        // G1 then C2
        assert_eq!(bass, vec![31, 24]);
        let solo: Vec<&NoteEvent> = c.notes.iter().filter(|n| n.instrument == InstrumentTag::Soloist).collect();
        assert_eq!(solo[0].pitch, 89); // F, seventh of G7
        assert_eq!(solo[1].pitch, 64); // E, third of C, pulled down toward F
        assert_eq!(solo[1].bend, 0.5);
        assert!((solo[1].timing_offset - 1.0).abs() < 1e-9);
        assert_eq!(c.drums.len(), 5);
        assert!(c.pedal[0].down);
    }

    #[test]
    fn minor_tonic_voicing() {
        let cfg = BandConfig {
            minor: true,
            ..BandConfig::default()
        };
        let c = cadence(&cfg, Key::A);
        let tonic: Vec<i32> = c
            .notes
            .iter()
            .filter(|n| n.instrument == InstrumentTag::Comping && n.duration_steps == 24)
            .map(|n| n.pitch - 69)
            .collect();
        assert_eq!(tonic, vec![0, 2, 3, 7, 10]);
        assert!(c.notes.iter().filter(|n| n.instrument == InstrumentTag::Bass).all(|n| n.pitch < 36));
    }

    #[test]
    fn disabled_parts_stay_silent() {
        let mut cfg = BandConfig::default();
        cfg.bass.enabled = false;
        cfg.soloist.enabled = false;
        cfg.comping.enabled = false;
        cfg.drums_enabled = false;
        assert_eq!(cadence(&cfg, Key::C), Cadence::default());
    }
}
