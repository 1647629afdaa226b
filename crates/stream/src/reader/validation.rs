//! Post-read validation callbacks

use objstream_core::{Heap, Result};

/// Callback run once the outermost read has rebuilt the whole graph
pub type ValidationCallback = Box<dyn FnOnce(&mut Heap) -> Result<()>>;

struct Entry {
    priority: i32,
    seq: u64,
    callback: ValidationCallback,
}

/// Callbacks registered during one outermost read
///
/// Higher priorities run first; among equal priorities the most recently
/// registered runs first.
#[derive(Default)]
pub(crate) struct ValidationList {
    entries: Vec<Entry>,
    next_seq: u64,
}

impl ValidationList {
    pub(crate) fn register(&mut self, priority: i32, callback: ValidationCallback) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.entries.push(Entry {
            priority,
            seq,
            callback,
        });
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    /// Run and drop every callback; stops at the first failure
    pub(crate) fn run(&mut self, heap: &mut Heap) -> Result<()> {
        let mut entries = std::mem::take(&mut self.entries);
        self.next_seq = 0;
        entries.sort_by(|a, b| b.priority.cmp(&a.priority).then(b.seq.cmp(&a.seq)));
        for entry in entries {
            (entry.callback)(heap)?;
        }
        Ok(())
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
        self.next_seq = 0;
    }
}
