mod args;

use std::error::Error;
use std::fs::File;
use std::io::{self, Write};
use std::process::ExitCode;
use std::time::Duration;

use ensemble_core::{Config, Session};
use ensemble_engine::{Clock, ManualClock, RecordingSink, SystemClock, VisualEvent};
use ensemble_types::{GenreFeel, HarmonyStyle, Key, PartConfig};

use args::{Args, USAGE};

const DEFAULT_PROGRESSION: &str = "I | vi | IV | V";

fn init_logging(verbose: bool) {
    use simplelog::*;

    let log_level = if verbose { LevelFilter::Debug } else { LevelFilter::Info };

    let log_path = dirs::config_dir()
        .unwrap_or_else(|| std::path::PathBuf::from("."))
        .join("ensemble")
        .join("ensemble.log");

    if let Some(parent) = log_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }

    let log_file = match File::create(&log_path).or_else(|_| File::create("ensemble.log")) {
        Ok(file) => file,
        Err(e) => {
            eprintln!("logging disabled: {}", e);
            return;
        }
    };

    if let Err(e) = WriteLogger::init(log_level, simplelog::Config::default(), log_file) {
        eprintln!("logging disabled: {}", e);
        return;
    }

    log::info!("ensemble starting (log level: {:?})", log_level);
}

fn main() -> ExitCode {
    let raw: Vec<String> = std::env::args().skip(1).collect();
    let args = match Args::parse(&raw) {
        Ok(args) => args,
        Err(e) => {
            eprintln!("{}\n\n{}", e, USAGE);
            return ExitCode::from(2);
        }
    };
    if args.help {
        println!("{}", USAGE);
        return ExitCode::SUCCESS;
    }
    init_logging(args.verbose);

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{}", e);
            eprintln!("ensemble: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> Result<(), Box<dyn Error>> {
    let config = match &args.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load(),
    };

    let mut band = config.band_config();
    if let Some(name) = &args.genre {
        let genre = GenreFeel::from_name(name).ok_or_else(|| format!("unknown genre {:?}", name))?;
        band.genre = genre;
        band.swing = genre.default_swing();
        band.swing_subdivision = genre.default_subdivision();
    }
    if let Some(name) = &args.key {
        band.key = Key::from_name(name).ok_or_else(|| format!("unknown key {:?}", name))?;
    }
    band.minor |= args.minor;
    if let Some(name) = &args.harmonies {
        let style = HarmonyStyle::from_name(name).ok_or_else(|| format!("unknown harmony style {:?}", name))?;
        band.harmonies = PartConfig { enabled: true, style };
    }

    let mut settings = config.engine_config();
    settings.dispatch.metronome = args.metronome;
    if let Some(seed) = args.seed {
        settings.dispatch.seed = seed;
    }
    let interval = config.pump_interval();
    let text = args.progression_text()?.unwrap_or_else(|| DEFAULT_PROGRESSION.to_string());

    if args.offline {
        settings.threaded = false;
        let clock = ManualClock::new(0.0);
        let mut session = Session::inline(band, settings, clock.clone());
        prepare(&mut session, args, &text)?;
        drive(&mut session, args, interval, |d| clock.advance(d.as_secs_f64()))
    } else {
        let mut session = Session::new(band, settings, SystemClock::default())?;
        prepare(&mut session, args, &text)?;
        let result = drive(&mut session, args, interval, std::thread::sleep);
        session.shutdown();
        result
    }
}

fn prepare<C: Clock>(session: &mut Session<C>, args: &Args, text: &str) -> Result<(), Box<dyn Error>> {
    session.set_progression(text)?;
    if let Some(bpm) = args.bpm {
        session.set_bpm(bpm);
    }
    Ok(())
}

/// Pump until the transport stops, printing as we go.
fn drive<C: Clock>(
    session: &mut Session<C>,
    args: &Args,
    interval: Duration,
    mut wait: impl FnMut(Duration),
) -> Result<(), Box<dyn Error>> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    let mut sink = RecordingSink::new();

    session.start();
    let started = session.engine().now();
    let mut finishing = false;
    while session.is_running() {
        session.pump(&mut sink);
        emit(&mut out, &mut sink, session.drain_visuals(), args.json)?;
        if !finishing && session.engine().now() - started >= args.seconds {
            finishing = true;
            if args.end {
                session.end_at_loop();
            } else {
                session.stop(&mut sink);
            }
        }
        wait(interval);
    }
    emit(&mut out, &mut sink, session.drain_visuals(), args.json)?;

    let status = session.status();
    log::info!("finished: {}", serde_json::to_string(&status)?);
    eprintln!(
        "{} steps, {} notes, {} drum hits, {} late, {} errors",
        status.stats.steps,
        status.stats.notes,
        status.stats.drum_hits,
        status.stats.late_slots,
        status.stats.generation_errors
    );
    Ok(())
}

fn emit(
    out: &mut impl Write,
    sink: &mut RecordingSink,
    visuals: Vec<VisualEvent>,
    json: bool,
) -> Result<(), Box<dyn Error>> {
    if json {
        for event in sink.events.drain(..) {
            writeln!(out, "{}", serde_json::to_string(&event)?)?;
        }
        for visual in visuals {
            if matches!(
                visual,
                VisualEvent::ChordChange { .. } | VisualEvent::SectionChange { .. } | VisualEvent::CountIn { .. }
            ) {
                writeln!(out, "{}", serde_json::to_string(&visual)?)?;
            }
        }
    } else {
        sink.clear();
        for visual in visuals {
            match visual {
                VisualEvent::ChordChange { symbol, time, .. } => writeln!(out, "{:8.3}  {}", time, symbol)?,
                VisualEvent::SectionChange { label, time } => writeln!(out, "{:8.3}  [{}]", time, label)?,
                VisualEvent::CountIn { beat, time } => writeln!(out, "{:8.3}  count {}", time, beat + 1)?,
                _ => {}
            }
        }
    }
    Ok(())
}
