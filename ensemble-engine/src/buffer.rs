//! Per-instrument lookahead buffers on the dispatch side.
//!
//! The worker fills them through note batches; the dispatcher consumes them
//! with [`StepBuffer::take`], which removes the slot so a step plays at most
//! once.

use std::collections::BTreeMap;

use ensemble_types::{InstrumentTag, StepSlot};

/// Hard cap on buffered slots per instrument.
pub const MAX_BUFFERED_STEPS: usize = 512;

#[derive(Debug, Default)]
pub struct StepBuffer {
    slots: BTreeMap<u64, StepSlot>,
}

impl StepBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add material for `step`, merging with anything already there.
    pub fn insert(&mut self, step: u64, slot: StepSlot) {
        if slot.is_empty() {
            return;
        }
        self.slots.entry(step).or_default().merge(slot);
        while self.slots.len() > MAX_BUFFERED_STEPS {
            self.slots.pop_first();
        }
    }

    /// Remove and return the slot for `step`.
    pub fn take(&mut self, step: u64) -> Option<StepSlot> {
        self.slots.remove(&step)
    }

    pub fn peek(&self, step: u64) -> Option<&StepSlot> {
        self.slots.get(&step)
    }

    /// Drop everything before `step`.
    pub fn prune_below(&mut self, step: u64) {
        self.slots = self.slots.split_off(&step);
    }

    pub fn clear(&mut self) {
        self.slots.clear();
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Highest buffered step, if any.
    pub fn horizon(&self) -> Option<u64> {
        self.slots.last_key_value().map(|(k, _)| *k)
    }
}

/// One buffer per generated instrument, in generation order.
#[derive(Debug, Default)]
pub struct InstrumentBuffers {
    buffers: [StepBuffer; InstrumentTag::GENERATED.len()],
}

impl InstrumentBuffers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drums are pattern-driven and never buffered.
    pub fn get(&self, instrument: InstrumentTag) -> Option<&StepBuffer> {
        self.buffers.get(instrument.generated_index()?)
    }

    pub fn get_mut(&mut self, instrument: InstrumentTag) -> Option<&mut StepBuffer> {
        self.buffers.get_mut(instrument.generated_index()?)
    }

    pub fn prune_below(&mut self, step: u64) {
        for b in &mut self.buffers {
            b.prune_below(step);
        }
    }

    pub fn clear(&mut self) {
        for b in &mut self.buffers {
            b.clear();
        }
    }

    pub fn total_len(&self) -> usize {
        self.buffers.iter().map(StepBuffer::len).sum()
    }
}
