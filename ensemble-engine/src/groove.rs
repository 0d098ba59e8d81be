//! Drum humanization: per-feel rules applied to every pattern hit.

use ensemble_types::{DrumHit, DrumPattern, DrumVoice, GenreFeel, TimeSignature};

use crate::rng::GenRng;

/// Band-level inputs every rule reads.
#[derive(Debug, Clone, Copy)]
pub struct GrooveContext {
    pub genre: GenreFeel,
    pub intensity: f32,
    pub complexity: f32,
    pub bpm: f32,
}

/// Where a hit falls.
#[derive(Debug, Clone, Copy)]
pub struct DrumPosition {
    /// Absolute step; two-measure rules read it modulo 32
    pub step: u64,
    /// Position inside a 16-step bar
    pub step16: u32,
    pub is_downbeat: bool,
    pub is_quarter: bool,
    pub is_backbeat: bool,
    pub is_group_start: bool,
    /// Pattern level of the kick on this step
    pub kick_level: u8,
}

impl DrumPosition {
    pub fn new(step: u64, time_signature: TimeSignature, kick_level: u8) -> Self {
        let info = time_signature.step_info(step);
        Self {
            step,
            step16: info.step_in_measure % 16,
            is_downbeat: info.step_in_measure == 0,
            is_quarter: info.is_beat_start,
            is_backbeat: info.is_beat_start && info.beat % 2 == 1 && time_signature.beats() == 4,
            is_group_start: info.is_group_start,
            kick_level,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GrooveDecision {
    pub play: bool,
    pub velocity: f32,
    pub voice: DrumVoice,
    pub timing_offset: f64,
}

fn is_hat(voice: DrumVoice) -> bool {
    matches!(voice, DrumVoice::HiHat | DrumVoice::Open)
}

/// Stateless rule set plus its own random stream.
#[derive(Debug, Clone)]
pub struct GrooveEngine {
    rng: GenRng,
}

impl GrooveEngine {
    pub fn new(seed: u64) -> Self {
        Self { rng: GenRng::new(seed) }
    }

    /// Micro-timing of the whole kit.
    pub fn pocket_offset(cx: &GrooveContext) -> f64 {
        let mut pocket = 0.0;
        if cx.intensity > 0.75 {
            pocket -= 0.008;
        } else if cx.intensity < 0.3 {
            pocket += 0.010;
        }
        if matches!(cx.genre, GenreFeel::NeoSoul | GenreFeel::HipHop) {
            pocket += 0.015;
        }
        pocket
    }

    pub fn decide(&mut self, voice: DrumVoice, level: u8, pos: &DrumPosition, cx: &GrooveContext) -> GrooveDecision {
        let s = pos.step16;
        let i = cx.intensity;
        let mut d = GrooveDecision {
            play: level > 0,
            velocity: if level == 2 { 1.25 } else { 0.9 },
            voice,
            timing_offset: 0.0,
        };

        if matches!(cx.genre, GenreFeel::NeoSoul | GenreFeel::HipHop) {
            if is_hat(voice) {
                d.timing_offset -= 0.012;
            }
            if voice == DrumVoice::Snare {
                d.timing_offset += 0.008;
            }
        }

        match cx.genre {
            GenreFeel::HipHop => self.hip_hop(voice, s, &mut d),
            GenreFeel::Funk => self.funk(voice, level, pos, cx, &mut d),
            GenreFeel::Disco => self.disco(voice, s, i, &mut d),
            GenreFeel::Reggae => Self::reggae(voice, s, i, &mut d),
            GenreFeel::Jazz => self.jazz(voice, s, i, &mut d),
            GenreFeel::Blues => self.blues(voice, s, i, &mut d),
            GenreFeel::Rock | GenreFeel::NeoSoul | GenreFeel::Bossa | GenreFeel::Acoustic => {}
        }

        if d.play {
            self.shape(voice, level, pos, cx, &mut d);
        }
        d
    }

    fn hip_hop(&mut self, voice: DrumVoice, s: u32, d: &mut GrooveDecision) {
        if s % 2 == 1 {
            d.timing_offset += 0.035;
        }
        if voice == DrumVoice::Kick && (s == 3 || s == 11) && self.rng.chance(0.3) {
            d.play = true;
            d.velocity = 0.6;
        }
        if voice == DrumVoice::Snare && (s == 4 || s == 12) {
            d.timing_offset += 0.015;
            d.velocity = 1.15;
        }
    }

    fn funk(&mut self, voice: DrumVoice, level: u8, pos: &DrumPosition, cx: &GrooveContext, d: &mut GrooveDecision) {
        let s = pos.step16;
        if voice == DrumVoice::Snare && level == 0 {
            let subdivision = s % 4 != 0 && s % 4 != 2;
            if subdivision && pos.kick_level == 0 && self.rng.chance(cx.complexity * 0.5) {
                d.play = true;
                d.velocity = 0.15 + self.rng.next_f32() * 0.1;
            }
        }
        if voice == DrumVoice::HiHat && d.play && s % 4 == 3 && self.rng.chance(cx.intensity * 0.35) {
            d.voice = DrumVoice::Open;
            d.velocity *= 1.1;
        }
    }

    fn disco(&mut self, voice: DrumVoice, s: u32, i: f32, d: &mut GrooveDecision) {
        match voice {
            DrumVoice::Kick => {
                d.play = s % 4 == 0;
                if d.play {
                    d.velocity = if s == 0 { 1.2 } else { 1.1 };
                }
            }
            DrumVoice::Snare => {
                d.play = s == 4 || s == 12;
                if d.play {
                    d.velocity = 1.15;
                }
                if s == 15 && self.rng.chance(0.2) {
                    d.play = true;
                    d.velocity = 0.4;
                }
            }
            DrumVoice::HiHat | DrumVoice::Open => {
                d.play = false;
                if s % 4 == 2 {
                    d.play = true;
                    if i > 0.6 {
                        d.voice = DrumVoice::Open;
                        d.velocity = 1.1;
                    } else {
                        d.voice = DrumVoice::HiHat;
                        d.velocity = 0.9;
                    }
                }
                if s % 2 == 1 && self.rng.chance(0.6) {
                    d.play = true;
                    d.voice = DrumVoice::HiHat;
                    d.velocity = 0.5;
                }
            }
            _ => {}
        }
    }

    fn reggae(voice: DrumVoice, s: u32, i: f32, d: &mut GrooveDecision) {
        if voice != DrumVoice::Kick {
            return;
        }
        if i > 0.7 {
            d.play = s % 4 == 0;
            if d.play {
                d.velocity = 1.15;
            }
        } else if i > 0.45 {
            if s == 0 {
                d.play = true;
                d.velocity = 1.1;
            }
            if s == 8 {
                d.play = true;
                d.velocity = 1.15;
            }
        }
    }

    fn jazz(&mut self, voice: DrumVoice, s: u32, i: f32, d: &mut GrooveDecision) {
        match voice {
            DrumVoice::Ride | DrumVoice::Open => {
                d.play = [0, 4, 6, 8, 12, 14].contains(&s);
                if d.play {
                    d.velocity = if s % 4 == 0 { 1.15 } else { 0.75 };
                }
            }
            DrumVoice::HiHat => {
                d.play = s == 4 || s == 12;
                if d.play {
                    d.velocity = 0.8;
                }
            }
            DrumVoice::Kick => {
                d.play = false;
                if s % 4 == 0 {
                    d.play = true;
                    d.velocity = 0.35;
                }
                if self.rng.chance(i * 0.3) && [10, 14, 15].contains(&s) {
                    d.play = true;
                    d.velocity = 0.9 + self.rng.next_f32() * 0.2;
                }
            }
            DrumVoice::Snare => {
                d.play = false;
                if self.rng.chance(0.08) {
                    d.play = true;
                    d.velocity = 0.25;
                }
                if s == 14 {
                    if self.rng.chance(0.6 + i * 0.3) {
                        d.play = true;
                        d.velocity = 0.85;
                    }
                } else if s == 6 && self.rng.chance(0.3 + i * 0.3) {
                    d.play = true;
                    d.velocity = 0.8;
                }
            }
            _ => {}
        }
    }

    fn blues(&mut self, voice: DrumVoice, s: u32, i: f32, d: &mut GrooveDecision) {
        match voice {
            DrumVoice::HiHat => {
                d.play = s == 4 || s == 12;
                if d.play {
                    d.velocity = 0.85;
                }
            }
            DrumVoice::Open => {
                d.play = false;
                if s % 4 == 0 {
                    d.play = true;
                    d.velocity = 1.1;
                } else if s % 2 == 0 && self.rng.chance(0.4 + i * 0.5) {
                    d.play = true;
                    d.velocity = 0.7;
                }
            }
            DrumVoice::Kick if s == 0 => {
                d.play = true;
                d.velocity = 1.2;
            }
            DrumVoice::Snare if s == 4 || s == 12 => {
                d.play = true;
                d.velocity = 1.1;
            }
            _ => {}
        }
    }

    /// Cross-genre gain and articulation for hits that will sound.
    fn shape(&mut self, voice: DrumVoice, level: u8, pos: &DrumPosition, cx: &GrooveContext, d: &mut GrooveDecision) {
        let s = pos.step16;
        let i = cx.intensity;
        let genre = cx.genre;
        let snare_like = voice == DrumVoice::Snare || (genre == GenreFeel::Bossa && voice == DrumVoice::Rim);

        if genre == GenreFeel::Funk && is_hat(voice) {
            if level == 2 && i > 0.6 {
                d.velocity = 1.0;
            } else if level != 2 {
                d.velocity = d.velocity.min(0.75);
            }
        }
        if matches!(genre, GenreFeel::NeoSoul | GenreFeel::HipHop) {
            d.velocity *= 0.75;
        }

        if snare_like {
            if genre == GenreFeel::Bossa {
                d.voice = DrumVoice::Rim;
                let bossa_step = pos.step % 32;
                if i > 0.5 && (bossa_step == 7 || bossa_step == 23) && self.rng.chance(0.2) {
                    d.velocity = 0.6;
                }
                if bossa_step == 31 && self.rng.chance(0.2) {
                    d.velocity = 0.45;
                }
            } else if genre == GenreFeel::Acoustic {
                d.voice = if i > 0.7 { DrumVoice::Snare } else { DrumVoice::Rim };
            } else if i < 0.35 && genre != GenreFeel::Rock {
                d.voice = DrumVoice::Rim;
            }
        }

        if genre == GenreFeel::Rock {
            if is_hat(voice) {
                if s % 4 == 0 {
                    d.velocity *= 1.05;
                } else if s % 4 == 2 {
                    d.velocity *= 0.95;
                }
            }
            if voice == DrumVoice::Kick && s == 10 && i > 0.4 && self.rng.chance(0.25) {
                d.velocity = 0.9;
            }
            if i > 0.7 {
                if voice == DrumVoice::HiHat {
                    d.voice = DrumVoice::Open;
                    d.velocity *= 1.1;
                }
                if voice == DrumVoice::Snare {
                    d.velocity *= 1.15;
                }
                if voice == DrumVoice::Kick && pos.is_downbeat {
                    d.velocity *= 1.25;
                }
            } else if i < 0.4 {
                if voice == DrumVoice::Snare {
                    d.velocity *= 0.85;
                    if i < 0.25 {
                        d.voice = DrumVoice::Rim;
                    }
                }
                if voice == DrumVoice::HiHat {
                    d.velocity *= 0.8;
                }
                if voice == DrumVoice::Kick && !pos.is_downbeat {
                    d.velocity *= 0.7;
                }
            } else {
                if voice == DrumVoice::Kick && pos.is_downbeat {
                    d.velocity *= 1.2;
                }
                if voice == DrumVoice::Snare && pos.is_backbeat {
                    d.velocity *= 1.2;
                }
            }
        } else if genre == GenreFeel::Funk && level == 2 {
            d.velocity *= 1.1;
        }

        if genre == GenreFeel::Disco && d.voice == DrumVoice::Open {
            d.velocity *= 1.15;
        }
        if voice == DrumVoice::HiHat && genre != GenreFeel::Jazz && i > 0.8 && pos.is_quarter {
            d.voice = DrumVoice::Open;
            d.velocity *= 1.1;
        }

        match voice {
            DrumVoice::Kick => {
                d.velocity *= if pos.is_downbeat {
                    1.15
                } else if pos.is_group_start {
                    1.1
                } else if pos.is_quarter {
                    1.05
                } else {
                    0.9
                };
            }
            DrumVoice::Snare => d.velocity *= if pos.is_backbeat { 1.1 } else { 0.9 },
            DrumVoice::HiHat | DrumVoice::Open | DrumVoice::Ride => {
                d.velocity *= if pos.is_quarter { 1.1 } else { 0.85 };
                if genre != GenreFeel::Jazz && cx.bpm > 165.0 {
                    d.velocity *= 0.7;
                    if !pos.is_quarter {
                        d.velocity *= 0.6;
                    }
                }
            }
            _ => {}
        }
    }

    /// Everything the kit plays on `step`, pocket applied.
    pub fn hits(&mut self, pattern: &DrumPattern, step: u64, time_signature: TimeSignature, cx: &GrooveContext) -> Vec<DrumHit> {
        let spm = time_signature.steps_per_measure();
        let kick_level = pattern.level(DrumVoice::Kick, step, spm);
        let pos = DrumPosition::new(step, time_signature, kick_level);
        let pocket = Self::pocket_offset(cx);
        let voices: Vec<DrumVoice> = pattern.voices().collect();
        voices
            .into_iter()
            .filter_map(|voice| {
                let level = pattern.level(voice, step, spm);
                let d = self.decide(voice, level, &pos, cx);
                d.play.then_some(DrumHit {
                    voice: d.voice,
                    velocity: d.velocity.max(0.0),
                    timing_offset: d.timing_offset + pocket,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cx(genre: GenreFeel, intensity: f32) -> GrooveContext {
        GrooveContext {
            genre,
            intensity,
            complexity: 0.5,
            bpm: 120.0,
        }
    }

    fn pos(step: u64) -> DrumPosition {
        DrumPosition::new(step, TimeSignature::FourFour, 0)
    }

    #[test]
    fn disco_kick_is_four_on_the_floor() {
        let mut g = GrooveEngine::new(1);
        let c = cx(GenreFeel::Disco, 0.5);
        for s in 0..16 {
            let d = g.decide(DrumVoice::Kick, 0, &pos(s), &c);
            assert_eq!(d.play, s % 4 == 0, "step {}", s);
        }
    }

    #[test]
    fn hip_hop_snare_drags() {
        let mut g = GrooveEngine::new(1);
        let d = g.decide(DrumVoice::Snare, 2, &pos(4), &cx(GenreFeel::HipHop, 0.5));
        assert!(d.play);
        assert!((d.timing_offset - 0.023).abs() < 1e-9);
    }

    #[test]
    fn quiet_feel_uses_cross_stick() {
        let mut g = GrooveEngine::new(1);
        let d = g.decide(DrumVoice::Snare, 2, &pos(4), &cx(GenreFeel::Funk, 0.2));
        assert_eq!(d.voice, DrumVoice::Rim);
        let rock = g.decide(DrumVoice::Snare, 2, &pos(4), &cx(GenreFeel::Rock, 0.3));
        assert_eq!(rock.voice, DrumVoice::Snare);
    }

    #[test]
    fn jazz_ride_accents_quarters() {
        let mut g = GrooveEngine::new(1);
        let c = cx(GenreFeel::Jazz, 0.5);
        let on = g.decide(DrumVoice::Ride, 2, &pos(0), &c);
        let skip = g.decide(DrumVoice::Ride, 1, &pos(6), &c);
        let off = g.decide(DrumVoice::Ride, 2, &pos(2), &c);
        assert!(on.play && skip.play && !off.play);
        assert!(on.velocity > skip.velocity);
    }

    #[test]
    fn pocket_by_intensity_and_feel() {
        assert!((GrooveEngine::pocket_offset(&cx(GenreFeel::Rock, 0.9)) + 0.008).abs() < 1e-9);
        assert!((GrooveEngine::pocket_offset(&cx(GenreFeel::Rock, 0.2)) - 0.010).abs() < 1e-9);
        assert!((GrooveEngine::pocket_offset(&cx(GenreFeel::NeoSoul, 0.5)) - 0.015).abs() < 1e-9);
    }

    #[test]
    fn fast_tempo_thins_offbeat_hats() {
        let mut g = GrooveEngine::new(1);
        let slow = g.decide(DrumVoice::HiHat, 1, &pos(2), &cx(GenreFeel::Acoustic, 0.5));
        let fast = g.decide(
            DrumVoice::HiHat,
            1,
            &pos(2),
            &GrooveContext {
                bpm: 180.0,
                ..cx(GenreFeel::Acoustic, 0.5)
            },
        );
        assert!((fast.velocity - slow.velocity * 0.42).abs() < 1e-5);
    }

    #[test]
    fn rock_pattern_plays_backbeat() {
        let mut g = GrooveEngine::new(3);
        let pattern = DrumPattern::preset(GenreFeel::Rock);
        let c = cx(GenreFeel::Rock, 0.5);
        let hits = g.hits(&pattern, 4, TimeSignature::FourFour, &c);
        assert!(hits.iter().any(|h| h.voice == DrumVoice::Snare));
        let downbeat = g.hits(&pattern, 0, TimeSignature::FourFour, &c);
        assert!(downbeat.iter().any(|h| h.voice == DrumVoice::Kick));
    }
}
