//! Control-side to worker state sync.
//!
//! The session appends full snapshots; the worker drains them on its own
//! schedule. Entries are shared with a short retained history for
//! inspection.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender, TryRecvError};

use ensemble_types::{BandConfig, PerformanceState};

/// Everything the worker mirrors, replaced wholesale.
pub type BandSnapshot = BandConfig;

#[derive(Debug)]
pub struct SyncEntry {
    pub seq: u64,
    pub kind: SyncKind,
}

#[derive(Debug)]
pub enum SyncKind {
    /// Full configuration and arrangement
    Checkpoint(Box<BandSnapshot>),
    /// Conductor output for the coming measure
    Performance(PerformanceState),
}

const HISTORY_CAPACITY: usize = 256;

pub struct SyncLogWriter {
    tx: Sender<Arc<SyncEntry>>,
    history: Vec<Arc<SyncEntry>>,
    next_seq: u64,
    capacity: usize,
}

impl SyncLogWriter {
    pub fn new() -> (Self, SyncLogReader) {
        Self::with_capacity(HISTORY_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> (Self, SyncLogReader) {
        let (tx, rx) = crossbeam_channel::unbounded();
        let writer = Self {
            tx,
            history: Vec::new(),
            next_seq: 0,
            capacity,
        };
        (writer, SyncLogReader { rx })
    }

    pub fn checkpoint(&mut self, snapshot: BandSnapshot) {
        self.append(SyncKind::Checkpoint(Box::new(snapshot)));
    }

    pub fn performance(&mut self, performance: PerformanceState) {
        self.append(SyncKind::Performance(performance));
    }

    pub fn append(&mut self, kind: SyncKind) {
        let entry = Arc::new(SyncEntry {
            seq: self.next_seq,
            kind,
        });
        self.next_seq += 1;
        if let Err(e) = self.tx.send(Arc::clone(&entry)) {
            log::warn!(target: "ensemble::worker", "sync entry {} dropped: {}", entry.seq, e);
        }
        self.history.push(entry);
        if self.history.len() > self.capacity {
            let excess = self.history.len() - self.capacity;
            self.history.drain(..excess);
        }
    }

    pub fn history(&self) -> &[Arc<SyncEntry>] {
        &self.history
    }

    pub fn next_seq(&self) -> u64 {
        self.next_seq
    }
}

pub struct SyncLogReader {
    rx: Receiver<Arc<SyncEntry>>,
}

impl SyncLogReader {
    /// Pull pending entries in order until the channel is empty or `budget`
    /// runs out.
    pub fn drain(&self, budget: Duration) -> Vec<Arc<SyncEntry>> {
        let start = Instant::now();
        let mut out = Vec::new();
        while start.elapsed() < budget {
            match self.rx.try_recv() {
                Ok(entry) => out.push(entry),
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entries_arrive_in_order() {
        let (mut writer, reader) = SyncLogWriter::new();
        writer.checkpoint(BandConfig::default());
        writer.performance(PerformanceState::from_intensity(0.9, 0.1));
        let entries = reader.drain(Duration::from_millis(10));
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].seq, 0);
        assert!(matches!(entries[0].kind, SyncKind::Checkpoint(_)));
        match &entries[1].kind {
            SyncKind::Performance(p) => assert!((p.intensity - 0.9).abs() < 1e-6),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn history_is_capped() {
        let (mut writer, _reader) = SyncLogWriter::with_capacity(4);
        for _ in 0..10 {
            writer.performance(PerformanceState::default());
        }
        assert_eq!(writer.history().len(), 4);
        assert_eq!(writer.history()[0].seq, 6);
        assert_eq!(writer.next_seq(), 10);
    }

    #[test]
    fn reader_and_history_share_entries() {
        let (mut writer, reader) = SyncLogWriter::new();
        writer.performance(PerformanceState::default());
        let drained = reader.drain(Duration::from_millis(10));
        assert!(Arc::ptr_eq(&writer.history()[0], &drained[0]));
    }

    #[test]
    fn writer_survives_dropped_reader() {
        let (mut writer, reader) = SyncLogWriter::new();
        drop(reader);
        writer.checkpoint(BandConfig::default());
        assert_eq!(writer.history().len(), 1);
    }
}
