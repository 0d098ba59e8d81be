use std::path::PathBuf;

pub const USAGE: &str = "\
usage: ensemble [options]

  -p, --progression TEXT   chords, e.g. \"ii7 | V7 | Imaj7\"
  -f, --file PATH          read the progression from a file
  -c, --config PATH        config file instead of the user config
  -g, --genre NAME         genre feel (rock, jazz, funk, bossa, ...)
  -k, --key NAME           key for Roman and Nashville roots
      --minor              minor mode
      --harmonies STYLE    add pads or stabs (smart, horns, strings, organ, ...)
  -b, --bpm N              tempo (40-240)
  -s, --seconds N          how long to play (default 16)
      --seed N             generator seed
      --offline            run on a simulated clock as fast as possible
      --json               print every dispatched event as a JSON line
      --metronome          click on every beat
      --end                finish the loop and ring out instead of cutting off
  -v, --verbose            debug logging
  -h, --help               this text";

#[derive(Debug, Clone, PartialEq)]
pub struct Args {
    pub progression: Option<String>,
    pub file: Option<PathBuf>,
    pub config: Option<PathBuf>,
    pub genre: Option<String>,
    pub key: Option<String>,
    pub minor: bool,
    pub harmonies: Option<String>,
    pub bpm: Option<f32>,
    pub seconds: f64,
    pub seed: Option<u64>,
    pub offline: bool,
    pub json: bool,
    pub metronome: bool,
    pub end: bool,
    pub verbose: bool,
    pub help: bool,
}

fn value<'a>(args: &'a [String], flags: &[&str]) -> Option<&'a String> {
    args.iter().position(|a| flags.contains(&a.as_str())).and_then(|i| args.get(i + 1))
}

fn flag(args: &[String], flags: &[&str]) -> bool {
    args.iter().any(|a| flags.contains(&a.as_str()))
}

fn number<T: std::str::FromStr>(args: &[String], flags: &[&str]) -> Result<Option<T>, String> {
    match value(args, flags) {
        Some(v) => v
            .parse()
            .map(Some)
            .map_err(|_| format!("{} expects a number, got {:?}", flags[flags.len() - 1], v)),
        None => Ok(None),
    }
}

impl Args {
    /// Parse arguments, program name excluded.
    pub fn parse(args: &[String]) -> Result<Args, String> {
        let seconds: Option<f64> = number(args, &["-s", "--seconds"])?;
        let seconds = seconds.unwrap_or(16.0);
        if !seconds.is_finite() || seconds <= 0.0 {
            return Err(format!("--seconds must be positive, got {}", seconds));
        }
        Ok(Args {
            progression: value(args, &["-p", "--progression"]).cloned(),
            file: value(args, &["-f", "--file"]).map(PathBuf::from),
            config: value(args, &["-c", "--config"]).map(PathBuf::from),
            genre: value(args, &["-g", "--genre"]).cloned(),
            key: value(args, &["-k", "--key"]).cloned(),
            minor: flag(args, &["--minor"]),
            harmonies: value(args, &["--harmonies"]).cloned(),
            bpm: number(args, &["-b", "--bpm"])?,
            seconds,
            seed: number(args, &["--seed"])?,
            offline: flag(args, &["--offline"]),
            json: flag(args, &["--json"]),
            metronome: flag(args, &["--metronome"]),
            end: flag(args, &["--end"]),
            verbose: flag(args, &["-v", "--verbose"]),
            help: flag(args, &["-h", "--help"]),
        })
    }

    /// Progression text from `--progression` or `--file`, in that order.
    pub fn progression_text(&self) -> std::io::Result<Option<String>> {
        if let Some(text) = &self.progression {
            return Ok(Some(text.clone()));
        }
        match &self.file {
            Some(path) => std::fs::read_to_string(path).map(Some),
            None => Ok(None),
        }
    }
}
