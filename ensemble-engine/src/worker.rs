//! The generation worker: runs the pipeline off the scheduling path.
//!
//! A dedicated thread waits on its command channel with a timeout, drains
//! the sync log, and pumps the pipeline every `interval`. Generated batches,
//! generator errors and timing summaries flow back on the feedback channel.
//! [`InlineWorker`] runs the same core on the caller's thread for
//! deterministic tests and offline drivers.

use std::collections::VecDeque;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender, TryRecvError};

use ensemble_types::{Epoch, InstrumentTag};

use crate::error::{EngineError, GenerationError};
use crate::generation::{GenerationPipeline, NoteBatch};
use crate::sync_log::{SyncKind, SyncLogReader};
use crate::telemetry::{GenerationTelemetry, TelemetrySummary};

pub const DEFAULT_WORKER_INTERVAL: Duration = Duration::from_millis(25);
const TELEMETRY_PERIOD: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, PartialEq)]
pub enum WorkerCmd {
    Start { step: u64, epoch: Epoch },
    Stop,
    /// Playback reached `step`; generate up to the lookahead from here
    RequestBuffer { step: u64 },
    /// Drop everything and restart at `step` under `epoch`
    Flush { step: u64, epoch: Epoch },
    /// Restart one instrument at `step`; its batches carry `revision`
    Regenerate {
        instrument: InstrumentTag,
        step: u64,
        revision: u32,
    },
    Shutdown,
}

#[derive(Debug, Clone, PartialEq)]
pub enum WorkerFeedback {
    Notes(NoteBatch),
    Error(GenerationError),
    Telemetry(TelemetrySummary),
}

/// State shared by the threaded and inline workers.
struct WorkerCore {
    pipeline: GenerationPipeline,
    sync: SyncLogReader,
    telemetry: GenerationTelemetry,
    budget_us: u32,
}

impl WorkerCore {
    fn new(pipeline: GenerationPipeline, sync: SyncLogReader, interval: Duration) -> Self {
        Self {
            pipeline,
            sync,
            telemetry: GenerationTelemetry::new(),
            budget_us: interval.as_micros().min(u32::MAX as u128) as u32,
        }
    }

    /// Returns true on shutdown.
    fn handle_cmd(&mut self, cmd: WorkerCmd) -> bool {
        match cmd {
            WorkerCmd::Start { step, epoch } => {
                log::debug!(target: "ensemble::worker", "start at step {} ({})", step, epoch);
                self.pipeline.start(step, epoch);
            }
            WorkerCmd::Stop => self.pipeline.stop(),
            WorkerCmd::RequestBuffer { step } => self.pipeline.request(step),
            WorkerCmd::Flush { step, epoch } => {
                log::debug!(target: "ensemble::worker", "flush to step {} ({})", step, epoch);
                self.drain_sync();
                self.pipeline.flush(step, epoch);
            }
            WorkerCmd::Regenerate {
                instrument,
                step,
                revision,
            } => {
                log::debug!(target: "ensemble::worker", "regenerate {} from step {} (r{})", instrument, step, revision);
                // The checkpoint that prompted this must land first
                self.drain_sync();
                self.pipeline.regenerate(instrument, step, revision);
            }
            WorkerCmd::Shutdown => return true,
        }
        false
    }

    fn drain_sync(&mut self) {
        const BUDGET: Duration = Duration::from_micros(200);
        for entry in self.sync.drain(BUDGET) {
            match &entry.kind {
                SyncKind::Checkpoint(snapshot) => {
                    log::debug!(target: "ensemble::worker", "checkpoint v{} (seq {})", snapshot.version, entry.seq);
                    self.pipeline.apply_checkpoint((**snapshot).clone());
                }
                SyncKind::Performance(perf) => self.pipeline.set_performance(*perf),
            }
        }
    }

    fn generate(&mut self, out: &mut Vec<WorkerFeedback>) {
        let started = Instant::now();
        let (batches, errors) = self.pipeline.pump();
        self.telemetry.record(started.elapsed(), self.budget_us);
        for e in errors {
            log::warn!(target: "ensemble::worker", "{}", e);
            out.push(WorkerFeedback::Error(e));
        }
        out.extend(batches.into_iter().map(WorkerFeedback::Notes));
    }
}

struct WorkerThread {
    core: WorkerCore,
    cmd_rx: Receiver<WorkerCmd>,
    feedback_tx: Sender<WorkerFeedback>,
    interval: Duration,
    last_pump: Instant,
    last_telemetry: Instant,
}

impl WorkerThread {
    fn run(mut self) {
        loop {
            let remaining = self.interval.saturating_sub(self.last_pump.elapsed());
            crossbeam_channel::select! {
                recv(self.cmd_rx) -> result => match result {
                    Ok(cmd) => {
                        if self.core.handle_cmd(cmd) {
                            break;
                        }
                    }
                    Err(_) => break,
                },
                default(remaining) => {}
            }

            if self.drain_commands() {
                break;
            }
            self.core.drain_sync();

            if self.last_pump.elapsed() >= self.interval {
                self.last_pump = Instant::now();
                let mut out = Vec::new();
                self.core.generate(&mut out);
                if !self.send(out) {
                    break;
                }
            }

            if self.last_telemetry.elapsed() >= TELEMETRY_PERIOD {
                self.last_telemetry = Instant::now();
                let summary = self.core.telemetry.take_summary();
                if !self.send(vec![WorkerFeedback::Telemetry(summary)]) {
                    break;
                }
            }
        }
        log::debug!(target: "ensemble::worker", "worker exiting");
    }

    /// Time-budgeted command drain. Returns true on shutdown or hangup.
    fn drain_commands(&mut self) -> bool {
        const MAX_DURATION: Duration = Duration::from_micros(200);
        const MAX_COUNT: usize = 64;

        let start = Instant::now();
        for _ in 0..MAX_COUNT {
            if start.elapsed() >= MAX_DURATION {
                break;
            }
            match self.cmd_rx.try_recv() {
                Ok(cmd) => {
                    if self.core.handle_cmd(cmd) {
                        return true;
                    }
                }
                Err(TryRecvError::Empty) => return false,
                Err(TryRecvError::Disconnected) => return true,
            }
        }
        false
    }

    /// False once the dispatcher side has gone away.
    fn send(&self, out: Vec<WorkerFeedback>) -> bool {
        for fb in out {
            if self.feedback_tx.send(fb).is_err() {
                return false;
            }
        }
        true
    }
}

/// Control side of a spawned worker thread.
pub struct WorkerHandle {
    cmd_tx: Sender<WorkerCmd>,
    feedback_rx: Receiver<WorkerFeedback>,
    join: Option<JoinHandle<()>>,
}

impl WorkerHandle {
    pub fn spawn(pipeline: GenerationPipeline, sync: SyncLogReader, interval: Duration) -> Result<Self, EngineError> {
        let (cmd_tx, cmd_rx) = crossbeam_channel::unbounded();
        let (feedback_tx, feedback_rx) = crossbeam_channel::unbounded();
        let thread = WorkerThread {
            core: WorkerCore::new(pipeline, sync, interval),
            cmd_rx,
            feedback_tx,
            interval,
            last_pump: Instant::now(),
            last_telemetry: Instant::now(),
        };
        let join = std::thread::Builder::new()
            .name("ensemble-worker".into())
            .spawn(move || thread.run())?;
        Ok(Self {
            cmd_tx,
            feedback_rx,
            join: Some(join),
        })
    }

    pub fn send(&self, cmd: WorkerCmd) -> Result<(), EngineError> {
        self.cmd_tx
            .send(cmd)
            .map_err(|_| EngineError("generation worker is not running".to_string()))
    }

    pub fn try_feedback(&self) -> Vec<WorkerFeedback> {
        self.feedback_rx.try_iter().collect()
    }

    /// Stop the thread and wait for it.
    pub fn shutdown(&mut self) {
        let _ = self.cmd_tx.send(WorkerCmd::Shutdown);
        if let Some(join) = self.join.take() {
            if join.join().is_err() {
                log::warn!(target: "ensemble::worker", "worker thread panicked");
            }
        }
    }
}

impl Drop for WorkerHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Same worker logic, driven synchronously by [`InlineWorker::poll`].
pub struct InlineWorker {
    core: WorkerCore,
    queue: VecDeque<WorkerFeedback>,
    stopped: bool,
}

impl InlineWorker {
    pub fn new(pipeline: GenerationPipeline, sync: SyncLogReader) -> Self {
        Self {
            core: WorkerCore::new(pipeline, sync, DEFAULT_WORKER_INTERVAL),
            queue: VecDeque::new(),
            stopped: false,
        }
    }

    pub fn send(&mut self, cmd: WorkerCmd) -> Result<(), EngineError> {
        if self.stopped {
            return Err(EngineError("generation worker is not running".to_string()));
        }
        self.core.drain_sync();
        self.stopped = self.core.handle_cmd(cmd);
        Ok(())
    }

    /// Apply pending sync entries, run one generation pass and hand back
    /// everything produced since the last poll.
    pub fn poll(&mut self) -> Vec<WorkerFeedback> {
        if !self.stopped {
            self.core.drain_sync();
            let mut out = Vec::new();
            self.core.generate(&mut out);
            self.queue.extend(out);
        }
        self.queue.drain(..).collect()
    }

    pub fn pipeline(&self) -> &GenerationPipeline {
        &self.core.pipeline
    }

    pub fn telemetry(&mut self) -> TelemetrySummary {
        self.core.telemetry.take_summary()
    }
}

/// How the dispatcher talks to generation.
pub enum WorkerLink {
    Threaded(WorkerHandle),
    Inline(Box<InlineWorker>),
}

impl WorkerLink {
    pub fn send(&mut self, cmd: WorkerCmd) -> Result<(), EngineError> {
        match self {
            WorkerLink::Threaded(h) => h.send(cmd),
            WorkerLink::Inline(w) => w.send(cmd),
        }
    }

    /// Feedback available now. The inline worker generates on demand.
    pub fn poll(&mut self) -> Vec<WorkerFeedback> {
        match self {
            WorkerLink::Threaded(h) => h.try_feedback(),
            WorkerLink::Inline(w) => w.poll(),
        }
    }

    pub fn shutdown(&mut self) {
        match self {
            WorkerLink::Threaded(h) => h.shutdown(),
            WorkerLink::Inline(w) => {
                let _ = w.send(WorkerCmd::Shutdown);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::sync_log::SyncLogWriter;
    use ensemble_types::{Arrangement, BandConfig, Chord, ChordQuality, InstrumentTag, Key, TimeSignature};

    fn config() -> BandConfig {
        let chords = vec![
            Chord::new("C", 60, ChordQuality::Major, false, 4.0),
            Chord::new("G", 67, ChordQuality::Major, false, 4.0),
        ];
        BandConfig {
            arrangement: Arc::new(Arrangement::compile(chords, TimeSignature::FourFour, Key::C, false)),
            ..BandConfig::default()
        }
    }

    fn notes(feedback: &[WorkerFeedback]) -> Vec<&NoteBatch> {
        feedback
            .iter()
            .filter_map(|f| match f {
                WorkerFeedback::Notes(b) => Some(b),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn inline_worker_generates_after_start() {
        let (_writer, reader) = SyncLogWriter::new();
        let mut w = InlineWorker::new(GenerationPipeline::new(config(), 1), reader);
        assert!(w.poll().is_empty());
        w.send(WorkerCmd::Start {
            step: 0,
            epoch: Epoch::default(),
        })
        .unwrap();
        let fb = w.poll();
        assert!(notes(&fb).iter().any(|b| b.instrument == InstrumentTag::Bass));
    }

    #[test]
    fn inline_worker_applies_checkpoints() {
        let (mut writer, reader) = SyncLogWriter::new();
        let mut w = InlineWorker::new(GenerationPipeline::new(config(), 1), reader);
        let mut cfg = config();
        cfg.version = 7;
        cfg.bass.enabled = false;
        writer.checkpoint(cfg);
        w.send(WorkerCmd::Start {
            step: 0,
            epoch: Epoch::default(),
        })
        .unwrap();
        assert_eq!(w.pipeline().config().version, 7);
        let fb = w.poll();
        assert!(notes(&fb).iter().all(|b| b.instrument != InstrumentTag::Bass));
    }

    #[test]
    fn flush_stamps_new_epoch() {
        let (_writer, reader) = SyncLogWriter::new();
        let mut w = InlineWorker::new(GenerationPipeline::new(config(), 2), reader);
        w.send(WorkerCmd::Start {
            step: 0,
            epoch: Epoch::default(),
        })
        .unwrap();
        w.poll();
        w.send(WorkerCmd::Flush {
            step: 64,
            epoch: Epoch::new(3),
        })
        .unwrap();
        let fb = w.poll();
        let batches = notes(&fb);
        assert!(!batches.is_empty());
        assert!(batches.iter().all(|b| b.epoch == Epoch::new(3)));
        assert!(batches.iter().flat_map(|b| b.slots.iter()).all(|(s, _)| *s >= 64));
    }

    #[test]
    fn regenerate_applies_pending_checkpoint_first() {
        let (mut writer, reader) = SyncLogWriter::new();
        let mut w = InlineWorker::new(GenerationPipeline::new(config(), 5), reader);
        w.send(WorkerCmd::Start {
            step: 0,
            epoch: Epoch::default(),
        })
        .unwrap();
        w.poll();
        let mut cfg = config();
        cfg.version = 2;
        cfg.soloist.enabled = false;
        writer.checkpoint(cfg);
        w.send(WorkerCmd::Regenerate {
            instrument: InstrumentTag::Soloist,
            step: 4,
            revision: 1,
        })
        .unwrap();
        assert_eq!(w.pipeline().config().version, 2);
        assert_eq!(w.pipeline().head(InstrumentTag::Soloist), Some(4));
        let fb = w.poll();
        assert!(notes(&fb).iter().all(|b| b.instrument != InstrumentTag::Soloist));
    }

    #[test]
    fn shutdown_rejects_later_commands() {
        let (_writer, reader) = SyncLogWriter::new();
        let mut w = InlineWorker::new(GenerationPipeline::new(config(), 3), reader);
        w.send(WorkerCmd::Shutdown).unwrap();
        assert!(w.send(WorkerCmd::Stop).is_err());
    }

    #[test]
    fn threaded_worker_round_trip() {
        let (_writer, reader) = SyncLogWriter::new();
        let mut handle =
            WorkerHandle::spawn(GenerationPipeline::new(config(), 4), reader, Duration::from_millis(2)).unwrap();
        handle
            .send(WorkerCmd::Start {
                step: 0,
                epoch: Epoch::default(),
            })
            .unwrap();
        let deadline = Instant::now() + Duration::from_secs(2);
        let mut got = Vec::new();
        while got.is_empty() && Instant::now() < deadline {
            got.extend(handle.try_feedback().into_iter().filter(|f| matches!(f, WorkerFeedback::Notes(_))));
            std::thread::sleep(Duration::from_millis(2));
        }
        assert!(!got.is_empty());
        handle.shutdown();
        assert!(handle.send(WorkerCmd::Stop).is_err());
    }
}
