use std::collections::VecDeque;

use log::{trace, warn};
use rand::rngs::StdRng;

use crate::error::RuntimeError;
use crate::value::Value;
use crate::vm::VmStatus;
use crate::vm::frame::Frame;

/// Full copy of mutable VM state, taken before a step runs.
#[derive(Debug, Clone)]
pub(crate) struct Snapshot {
    pub(crate) ip: usize,
    pub(crate) frames: Vec<Frame>,
    pub(crate) stack: Vec<Value>,
    pub(crate) status: VmStatus,
    pub(crate) error: Option<RuntimeError>,
    pub(crate) rng: StdRng,
    pub(crate) output_len: usize,
    pub(crate) steps: usize,
    pub(crate) ticks: usize,
}

/// Bounded window of snapshots; the oldest are discarded first.
#[derive(Debug)]
pub(crate) struct History {
    entries: VecDeque<Snapshot>,
    limit: usize,
    evicted: usize,
}

impl History {
    pub(crate) fn new(limit: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            limit,
            evicted: 0,
        }
    }

    pub(crate) fn push(&mut self, snapshot: Snapshot) {
        if self.limit == 0 {
            return;
        }
        if self.entries.len() == self.limit {
            self.entries.pop_front();
            self.evicted += 1;
            if self.evicted == 1 {
                warn!(
                    "step history is full ({} entries); dropping oldest snapshots",
                    self.limit
                );
            } else {
                trace!("evicted history snapshot #{}", self.evicted);
            }
        }
        self.entries.push_back(snapshot);
    }

    pub(crate) fn pop(&mut self) -> Option<Snapshot> {
        self.entries.pop_back()
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
        self.evicted = 0;
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}
