//! Line breakpoints for paused, host-driven execution.

use std::collections::BTreeSet;

/// Breakpoints by user source line.
#[derive(Debug, Default, Clone)]
pub(crate) struct Breakpoints {
    lines: BTreeSet<usize>,
}

impl Breakpoints {
    pub(crate) fn insert(&mut self, line: usize) -> bool {
        self.lines.insert(line)
    }

    pub(crate) fn remove(&mut self, line: usize) -> bool {
        self.lines.remove(&line)
    }

    pub(crate) fn clear(&mut self) {
        self.lines.clear();
    }

    pub(crate) fn contains(&self, line: usize) -> bool {
        self.lines.contains(&line)
    }

    pub(crate) fn lines(&self) -> Vec<usize> {
        self.lines.iter().copied().collect()
    }
}
