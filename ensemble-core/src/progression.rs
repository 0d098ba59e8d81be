//! Chord progression text to [`Arrangement`].
//!
//! Chords are separated by whitespace. `|` and line breaks end a bar, and
//! the chords of one bar share its beats evenly. A root is a note name
//! (`Eb7`), a Roman numeral relative to the key (`ii7`, `bVII`) or a
//! Nashville number (`4`, `b7`); `/` adds a slash bass. `[Label]` starts a
//! section, `[Label x2]` repeats it and `[Label seamless]` lets it flow into
//! the next one without a fill.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;

use ensemble_types::{Arrangement, Chord, ChordQuality, Key, TimeSignature};

const BASE_OCTAVE: i32 = 60;
/// Register the comping voicing is pulled back towards
const VOICING_HOME: f32 = 60.0;
const VOICING_LOW: i32 = 48;
const VOICING_HIGH: i32 = 84;

const NNS_OFFSETS: [i32; 7] = [0, 2, 4, 5, 7, 9, 11];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressionError {
    /// Offending text as written
    pub token: String,
    /// Byte offset of the token in the input
    pub position: usize,
    pub reason: &'static str,
}

impl ProgressionError {
    fn new(token: impl Into<String>, position: usize, reason: &'static str) -> Self {
        Self {
            token: token.into(),
            position,
            reason,
        }
    }
}

impl fmt::Display for ProgressionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {:?} at {}", self.reason, self.token, self.position)
    }
}

impl std::error::Error for ProgressionError {}

struct Patterns {
    roman: Regex,
    nns: Regex,
    note: Regex,
    suffix: Regex,
    /// Explicit quality markers that stop a bare `vii` turning half-diminished
    quality_marker: Regex,
}

impl Patterns {
    fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            roman: Regex::new(r"^([#b])?(III|II|IV|I|VII|VI|V|iii|ii|iv|i|vii|vi|v)")?,
            nns: Regex::new(r"^([#b])?([1-7])")?,
            note: Regex::new(r"^([A-Ga-g])([#b]?)")?,
            suffix: Regex::new(
                r"(maj7#11|maj7#5|maj7\+|maj13|maj11|maj9|maj7|maj|M7#5|M7\+|M7|m13|m11|m9|m7b5|m7|m6|min|m|dim7|dim|o7|o|°7|°|7sus4|9sus4|7#5|7\+|7aug|aug7|aug|\+7|\+|-|ø7|ø|h7|7b5|sus4|sus2|add9|7alt|7b13|7#11|7b9|7#9|7|alt|13|11|9|6|5)",
            )?,
            quality_marker: Regex::new(r"(maj|min|m|dim|o|°|aug|\+|ø|h|7b5)")?,
        })
    }
}

static PATTERNS: LazyLock<Result<Patterns, regex::Error>> = LazyLock::new(Patterns::new);

/// A resolved chord root.
struct Root<'a> {
    midi: i32,
    /// Bytes of the token the root consumed
    len: usize,
    /// Roman numeral without accidental, when written as one
    numeral: Option<&'a str>,
    accidental: bool,
}

fn resolve_root<'a>(part: &'a str, key_root: i32, patterns: &Patterns) -> Option<Root<'a>> {
    if let Some(caps) = patterns.roman.captures(part) {
        let numeral = caps.get(2)?.as_str();
        let accidental = caps.get(1).map(|m| m.as_str());
        let midi = key_root + roman_value(numeral) + accidental_shift(accidental);
        return Some(Root {
            midi,
            len: caps.get(0)?.end(),
            numeral: Some(numeral),
            accidental: accidental.is_some(),
        });
    }
    if let Some(caps) = patterns.nns.captures(part) {
        let degree: usize = caps.get(2)?.as_str().parse().ok()?;
        let accidental = caps.get(1).map(|m| m.as_str());
        let midi = key_root + NNS_OFFSETS[degree - 1] + accidental_shift(accidental);
        return Some(Root {
            midi,
            len: caps.get(0)?.end(),
            numeral: None,
            accidental: accidental.is_some(),
        });
    }
    let caps = patterns.note.captures(part)?;
    let key = Key::from_name(caps.get(0)?.as_str())?;
    Some(Root {
        midi: BASE_OCTAVE + key.semitone(),
        len: caps.get(0)?.end(),
        numeral: None,
        accidental: !caps.get(2)?.as_str().is_empty(),
    })
}

fn roman_value(numeral: &str) -> i32 {
    match numeral.to_ascii_uppercase().as_str() {
        "I" => 0,
        "II" => 2,
        "III" => 4,
        "IV" => 5,
        "V" => 7,
        "VI" => 9,
        "VII" => 11,
        _ => 0,
    }
}

fn accidental_shift(accidental: Option<&str>) -> i32 {
    match accidental {
        Some("b") => -1,
        Some("#") => 1,
        _ => 0,
    }
}

/// Quality and seventh flag for the text after the root.
fn chord_details(suffix: &str, patterns: &Patterns) -> (ChordQuality, bool) {
    let has_seventh = ["7", "9", "11", "13", "alt"].iter().any(|m| suffix.contains(m));
    if suffix.contains("7b5") {
        return (ChordQuality::HalfDim, true);
    }
    let matched = patterns.suffix.find(suffix).map(|m| m.as_str()).unwrap_or("");
    match matched {
        "maj13" => (ChordQuality::Maj13, true),
        "maj11" => (ChordQuality::Maj11, true),
        "maj9" => (ChordQuality::Maj9, true),
        "maj7#11" => (ChordQuality::Maj7Sharp11, true),
        "maj7#5" | "maj7+" | "M7#5" | "M7+" => (ChordQuality::AugMaj7, true),
        "maj7" | "M7" => (ChordQuality::Maj7, true),
        "maj" if has_seventh => (ChordQuality::Maj7, true),
        "m13" => (ChordQuality::Minor13, true),
        "m11" => (ChordQuality::Minor11, true),
        "m9" => (ChordQuality::Minor9, true),
        "m7b5" | "ø7" | "ø" | "h7" => (ChordQuality::HalfDim, true),
        "m6" => (ChordQuality::MinorSix, false),
        "m7" | "min" | "m" | "-" => (ChordQuality::Minor, has_seventh),
        "dim7" | "o7" | "°7" => (ChordQuality::Dim, true),
        "dim" | "o" | "°" => (ChordQuality::Dim, has_seventh),
        "7#5" | "7+" | "7aug" | "aug7" | "+7" => (ChordQuality::Aug, true),
        "aug" | "+" => (ChordQuality::Aug, has_seventh),
        "7sus4" | "9sus4" => (ChordQuality::Sus4, true),
        "sus4" => (ChordQuality::Sus4, has_seventh),
        "sus2" => (ChordQuality::Sus2, false),
        "add9" => (ChordQuality::Add9, false),
        "7alt" | "alt" => (ChordQuality::Alt, true),
        "7b13" => (ChordQuality::SevenFlat13, true),
        "7#11" => (ChordQuality::SevenSharp11, true),
        "7b9" => (ChordQuality::SevenFlat9, true),
        "7#9" => (ChordQuality::SevenSharp9, true),
        "13" => (ChordQuality::Thirteen, true),
        "11" => (ChordQuality::Eleven, true),
        "9" => (ChordQuality::Nine, true),
        "7" => (ChordQuality::Dominant7, true),
        "6" => (ChordQuality::Six, false),
        "5" => (ChordQuality::Power, false),
        _ => (ChordQuality::Major, false),
    }
}

/// Close voicing nearest the previous chord, drawn back towards the home
/// register so long progressions do not creep.
fn best_inversion(root: i32, intervals: &[i32], previous: &[i32]) -> Vec<i32> {
    let center = if previous.is_empty() {
        VOICING_HOME
    } else {
        let mean = previous.iter().sum::<i32>() as f32 / previous.len() as f32;
        mean * 0.75 + VOICING_HOME * 0.25
    };
    let floor = (center / 12.0).floor() as i32 * 12;
    let mut voicing: Vec<i32> = intervals
        .iter()
        .map(|interval| {
            let pc = (root + interval).rem_euclid(12);
            let mut best = floor + pc;
            for octave in [-24, -12, 12, 24] {
                let candidate = floor + octave + pc;
                if (candidate as f32 - center).abs() < (best as f32 - center).abs() {
                    best = candidate;
                }
            }
            while best < VOICING_LOW {
                best += 12;
            }
            while best > VOICING_HIGH {
                best -= 12;
            }
            best
        })
        .collect();
    voicing.sort_unstable();
    voicing.dedup();
    voicing
}

struct Token {
    text: String,
    position: usize,
}

struct SectionSpec {
    id: String,
    label: String,
    repeat: u32,
    seamless: bool,
    bars: Vec<Vec<Token>>,
}

impl SectionSpec {
    fn main() -> Self {
        Self {
            id: String::from("main"),
            label: String::from("Main"),
            repeat: 1,
            seamless: false,
            bars: Vec::new(),
        }
    }

    fn from_header(header: &str, index: usize) -> Self {
        let mut repeat = 1;
        let mut seamless = false;
        let mut words = Vec::new();
        for word in header.split_whitespace() {
            let count = word
                .strip_prefix('x')
                .or_else(|| word.strip_prefix('X'))
                .and_then(|n| n.parse::<u32>().ok());
            match count {
                Some(n) => repeat = n.clamp(1, 64),
                None if word.eq_ignore_ascii_case("seamless") => seamless = true,
                None => words.push(word),
            }
        }
        let label = if words.is_empty() {
            format!("Section {}", index)
        } else {
            words.join(" ")
        };
        let slug: String = label
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '-' })
            .collect();
        Self {
            id: format!("{}-{}", slug, index),
            label,
            repeat,
            seamless,
            bars: Vec::new(),
        }
    }
}

fn close_bar(sections: &mut [SectionSpec], bar: &mut Vec<Token>) {
    if bar.is_empty() {
        return;
    }
    if let Some(section) = sections.last_mut() {
        section.bars.push(std::mem::take(bar));
    }
}

fn scan(text: &str) -> Result<Vec<SectionSpec>, ProgressionError> {
    let mut sections = vec![SectionSpec::main()];
    let mut bar: Vec<Token> = Vec::new();
    let mut chars = text.char_indices().peekable();
    while let Some((position, c)) = chars.next() {
        match c {
            '|' | '\n' => close_bar(&mut sections, &mut bar),
            '[' => {
                close_bar(&mut sections, &mut bar);
                let mut header = String::new();
                let mut closed = false;
                for (_, c) in chars.by_ref() {
                    if c == ']' {
                        closed = true;
                        break;
                    }
                    header.push(c);
                }
                if !closed {
                    return Err(ProgressionError::new(&text[position..], position, "unterminated section header"));
                }
                let index = sections.len();
                sections.push(SectionSpec::from_header(&header, index));
            }
            c if c.is_whitespace() => {}
            c => {
                let mut token = String::from(c);
                while let Some(&(_, next)) = chars.peek() {
                    if next.is_whitespace() || next == '|' || next == '[' {
                        break;
                    }
                    token.push(next);
                    chars.next();
                }
                bar.push(Token { text: token, position });
            }
        }
    }
    close_bar(&mut sections, &mut bar);
    sections.retain(|s| !s.bars.is_empty());
    Ok(sections)
}

fn parse_chord(
    token: &Token,
    key_root: i32,
    beats: f32,
    previous: &[i32],
    patterns: &Patterns,
) -> Result<Chord, ProgressionError> {
    let unknown = |reason| ProgressionError::new(token.text.clone(), token.position, reason);
    let (chord_part, bass_part) = match token.text.split_once('/') {
        Some((chord, bass)) => (chord, Some(bass)),
        None => (token.text.as_str(), None),
    };
    let root = resolve_root(chord_part, key_root, patterns).ok_or_else(|| unknown("unknown chord root"))?;
    let suffix = &chord_part[root.len..];
    let (mut quality, mut seventh) = chord_details(suffix, patterns);

    if let Some(numeral) = root.numeral {
        if numeral.chars().all(|c| c.is_ascii_lowercase()) {
            quality = match quality {
                ChordQuality::Major | ChordQuality::Dominant7 => ChordQuality::Minor,
                ChordQuality::Nine => ChordQuality::Minor9,
                ChordQuality::Eleven => ChordQuality::Minor11,
                ChordQuality::Thirteen => ChordQuality::Minor13,
                other => other,
            };
        }
        if numeral.eq_ignore_ascii_case("vii") && !root.accidental && !patterns.quality_marker.is_match(suffix) {
            quality = ChordQuality::HalfDim;
            seventh = true;
        }
    }

    let bass = match bass_part {
        Some(text) => {
            let resolved = resolve_root(text, key_root, patterns)
                .filter(|r| r.len == text.len())
                .ok_or_else(|| unknown("bad slash bass"))?;
            let mut midi = resolved.midi;
            while midi >= root.midi {
                midi -= 12;
            }
            while midi < root.midi - 12 {
                midi += 12;
            }
            Some(midi)
        }
        None => None,
    };

    let mut symbol = format!("{}{}", Key::from_semitone(root.midi).name(), quality.suffix(seventh));
    if let Some(b) = bass {
        symbol.push('/');
        symbol.push_str(Key::from_semitone(b).name());
    }
    let mut chord = Chord::new(symbol, root.midi, quality, seventh, beats);
    let mut voicing = best_inversion(root.midi, &chord.intervals, previous);
    if let Some(b) = bass {
        chord = chord.with_bass(b);
        let bass_pc = b.rem_euclid(12);
        let without: Vec<i32> = voicing.iter().copied().filter(|m| m.rem_euclid(12) != bass_pc).collect();
        if !without.is_empty() {
            voicing = without;
        }
        voicing.push(b);
        voicing.sort_unstable();
    }
    chord.set_voicing(voicing);
    Ok(chord)
}

/// Parse progression text into a compiled arrangement. Empty text yields an
/// empty arrangement.
pub fn parse_progression(
    text: &str,
    key: Key,
    time_signature: TimeSignature,
    minor: bool,
) -> Result<Arrangement, ProgressionError> {
    let patterns = PATTERNS
        .as_ref()
        .map_err(|_| ProgressionError::new(text, 0, "chord patterns unavailable"))?;
    let key_root = BASE_OCTAVE + key.semitone();
    let bar_beats = time_signature.beats() as f32;

    let mut chords = Vec::new();
    let mut previous: Vec<i32> = Vec::new();
    for section in scan(text)? {
        for pass in 0..section.repeat {
            let id = if pass == 0 {
                section.id.clone()
            } else {
                format!("{}#{}", section.id, pass)
            };
            for bar in &section.bars {
                let beats = bar_beats / bar.len() as f32;
                for token in bar {
                    let mut chord = parse_chord(token, key_root, beats, &previous, patterns)?
                        .with_section(id.clone(), section.label.clone());
                    chord.seamless = section.seamless;
                    previous.clone_from(&chord.voicing);
                    chords.push(chord);
                }
            }
        }
    }
    Ok(Arrangement::compile(chords, time_signature, key, minor))
}
