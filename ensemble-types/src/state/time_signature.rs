use serde::{Deserialize, Serialize};

/// Supported meters. A step is always a sixteenth note; eighth-based meters
/// count two steps per beat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum TimeSignature {
    TwoFour,
    ThreeFour,
    #[default]
    FourFour,
    FiveFour,
    SixEight,
    SevenEight,
    SevenFour,
    TwelveEight,
}

/// Position of a step inside its measure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepInfo {
    pub step_in_measure: u32,
    pub beat: u32,
    pub step_in_beat: u32,
    /// First step of a beat
    pub is_beat_start: bool,
    /// First step of a beat grouping (e.g. beats 1 and 3 in 4/4)
    pub is_group_start: bool,
    /// Step carries a primary pulse
    pub is_pulse: bool,
}

impl TimeSignature {
    pub const ALL: [TimeSignature; 8] = [
        TimeSignature::TwoFour,
        TimeSignature::ThreeFour,
        TimeSignature::FourFour,
        TimeSignature::FiveFour,
        TimeSignature::SixEight,
        TimeSignature::SevenEight,
        TimeSignature::SevenFour,
        TimeSignature::TwelveEight,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            TimeSignature::TwoFour => "2/4",
            TimeSignature::ThreeFour => "3/4",
            TimeSignature::FourFour => "4/4",
            TimeSignature::FiveFour => "5/4",
            TimeSignature::SixEight => "6/8",
            TimeSignature::SevenEight => "7/8",
            TimeSignature::SevenFour => "7/4",
            TimeSignature::TwelveEight => "12/8",
        }
    }

    pub fn from_name(name: &str) -> Option<TimeSignature> {
        TimeSignature::ALL.into_iter().find(|ts| ts.name() == name.trim())
    }

    pub fn beats(&self) -> u32 {
        match self {
            TimeSignature::TwoFour => 2,
            TimeSignature::ThreeFour => 3,
            TimeSignature::FourFour => 4,
            TimeSignature::FiveFour => 5,
            TimeSignature::SixEight => 6,
            TimeSignature::SevenEight => 7,
            TimeSignature::SevenFour => 7,
            TimeSignature::TwelveEight => 12,
        }
    }

    pub fn steps_per_beat(&self) -> u32 {
        match self {
            TimeSignature::SixEight | TimeSignature::SevenEight | TimeSignature::TwelveEight => 2,
            _ => 4,
        }
    }

    pub fn steps_per_measure(&self) -> u32 {
        self.beats() * self.steps_per_beat()
    }

    /// Steps carrying the primary pulse.
    pub fn pulse(&self) -> &'static [u32] {
        match self {
            TimeSignature::TwoFour => &[0, 4],
            TimeSignature::ThreeFour => &[0, 4, 8],
            TimeSignature::FourFour => &[0, 4, 8, 12],
            TimeSignature::FiveFour => &[0, 4, 8, 12, 16],
            TimeSignature::SixEight => &[0, 6],
            TimeSignature::SevenEight => &[0, 4, 8],
            TimeSignature::SevenFour => &[0, 4, 8, 12, 16, 20, 24],
            TimeSignature::TwelveEight => &[0, 6, 12, 18],
        }
    }

    /// Beat groupings, in beats.
    pub fn grouping(&self) -> &'static [u32] {
        match self {
            TimeSignature::TwoFour => &[2],
            TimeSignature::ThreeFour => &[3],
            TimeSignature::FourFour => &[2, 2],
            TimeSignature::FiveFour => &[3, 2],
            TimeSignature::SixEight => &[3, 3],
            TimeSignature::SevenEight => &[2, 2, 3],
            TimeSignature::SevenFour => &[4, 3],
            TimeSignature::TwelveEight => &[3, 3, 3, 3],
        }
    }

    pub fn step_info(&self, step: u64) -> StepInfo {
        let spm = self.steps_per_measure();
        let spb = self.steps_per_beat();
        let step_in_measure = (step % spm as u64) as u32;
        let beat = step_in_measure / spb;
        let step_in_beat = step_in_measure % spb;

        let mut group_start = 0;
        let mut is_group_start = false;
        for g in self.grouping() {
            if step_in_measure == group_start {
                is_group_start = true;
                break;
            }
            group_start += g * spb;
        }

        StepInfo {
            step_in_measure,
            beat,
            step_in_beat,
            is_beat_start: step_in_beat == 0,
            is_group_start,
            is_pulse: self.pulse().contains(&step_in_measure),
        }
    }
}

impl std::fmt::Display for TimeSignature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn measure_lengths() {
        assert_eq!(TimeSignature::FourFour.steps_per_measure(), 16);
        assert_eq!(TimeSignature::ThreeFour.steps_per_measure(), 12);
        assert_eq!(TimeSignature::SixEight.steps_per_measure(), 12);
        assert_eq!(TimeSignature::SevenEight.steps_per_measure(), 14);
        assert_eq!(TimeSignature::TwelveEight.steps_per_measure(), 24);
    }

    #[test]
    fn four_four_groups_on_one_and_three() {
        let ts = TimeSignature::FourFour;
        let starts: Vec<u64> = (0..16).filter(|&s| ts.step_info(s).is_group_start).collect();
        assert_eq!(starts, vec![0, 8]);
    }

    #[test]
    fn seven_eight_groups_two_two_three() {
        let ts = TimeSignature::SevenEight;
        let starts: Vec<u64> = (0..14).filter(|&s| ts.step_info(s).is_group_start).collect();
        assert_eq!(starts, vec![0, 4, 8]);
    }

    #[test]
    fn step_info_wraps_measures() {
        let info = TimeSignature::FourFour.step_info(16 * 7 + 6);
        assert_eq!(info.step_in_measure, 6);
        assert_eq!(info.beat, 1);
        assert_eq!(info.step_in_beat, 2);
        assert!(!info.is_beat_start);
    }

    #[test]
    fn names_round_trip() {
        for ts in TimeSignature::ALL {
            assert_eq!(TimeSignature::from_name(ts.name()), Some(ts));
        }
    }
}
