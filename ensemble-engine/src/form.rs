//! Song-form analysis: what job each section does in the arrangement.

use std::collections::HashMap;

use ensemble_types::Arrangement;

/// Baseline energy by label keyword, checked in order.
const SECTION_ENERGY: [(&str, f32); 10] = [
    ("intro", 0.4),
    ("verse", 0.5),
    ("pre-chorus", 0.6),
    ("build", 0.7),
    ("chorus", 0.9),
    ("drop", 1.0),
    ("bridge", 0.6),
    ("solo", 0.8),
    ("outro", 0.4),
    ("breakdown", 0.3),
];

pub fn section_energy(label: &str) -> f32 {
    let lower = label.to_lowercase();
    SECTION_ENERGY
        .iter()
        .find(|(key, _)| lower.contains(key))
        .map(|(_, e)| *e)
        .unwrap_or(0.5)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StructuralRole {
    Exposition,
    Development,
    Contrast,
    Build,
    Climax,
    Recapitulation,
    Resolution,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SectionForm {
    pub id: String,
    pub label: String,
    pub start_step: u32,
    pub role: StructuralRole,
    /// Chord changes per 16-step bar
    pub flux: f32,
    /// 1 for the first section with this chord sequence
    pub iteration: u32,
}

/// One entry per arrangement section, in order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FormAnalysis {
    pub sections: Vec<SectionForm>,
}

impl FormAnalysis {
    /// Section starting at `step` within the loop.
    pub fn section_starting_at(&self, step: u32) -> Option<&SectionForm> {
        self.sections.iter().find(|s| s.start_step == step)
    }
}

fn is_bridge(label: &str) -> bool {
    label == "b" || label.contains("bridge")
}

fn role_for(label: &str, index: usize, is_last: bool, flux: f32, iteration: u32) -> StructuralRole {
    use StructuralRole::*;
    if label.contains("intro") {
        return Exposition;
    }
    if label.contains("outro") {
        return Resolution;
    }
    if label.contains("solo") || label.contains("chorus") || label.contains("drop") {
        return Climax;
    }
    if iteration == 1 {
        if index == 0 {
            Exposition
        } else if is_bridge(label) {
            Contrast
        } else if flux > 2.8 {
            Development
        } else {
            Contrast
        }
    } else if is_bridge(label) {
        Contrast
    } else if iteration >= 3 {
        Recapitulation
    } else if flux > 2.2 {
        Build
    } else if is_last {
        Recapitulation
    } else {
        Development
    }
}

pub fn analyze(arrangement: &Arrangement) -> FormAnalysis {
    let mut seen: HashMap<Vec<&str>, u32> = HashMap::new();
    let count = arrangement.sections.len();
    let sections = arrangement
        .sections
        .iter()
        .enumerate()
        .map(|(i, section)| {
            let chords = arrangement.chords.iter().skip(section.first_chord).take(section.chord_count);
            let mut signature: Vec<&str> = Vec::new();
            let mut changes = 0u32;
            let mut last: Option<(&str, i32)> = None;
            for chord in chords {
                let id = (chord.symbol.as_str(), chord.root);
                if last != Some(id) {
                    changes += 1;
                    last = Some(id);
                }
                if signature.last() != Some(&chord.symbol.as_str()) {
                    signature.push(chord.symbol.as_str());
                }
            }
            let bars = (section.end_step - section.start_step) as f32 / 16.0;
            let flux = if bars > 0.0 { changes as f32 / bars } else { 0.0 };
            let iteration = {
                let n = seen.entry(signature).or_insert(0);
                *n += 1;
                *n
            };
            let label = section.label.to_lowercase();
            SectionForm {
                id: section.id.clone(),
                label: section.label.clone(),
                start_step: section.start_step,
                role: role_for(&label, i, i + 1 == count, flux, iteration),
                flux,
                iteration,
            }
        })
        .collect();
    FormAnalysis { sections }
}
