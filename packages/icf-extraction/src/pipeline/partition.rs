//! Partition module - group unexamined pages into query batches.

use crate::types::document::DocumentStore;

/// A batch of segment indices queried together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    /// Indices into [`DocumentStore::segments`], in reading order
    pub segments: Vec<usize>,

    /// Total characters of segment text
    pub chars: usize,
}

impl Batch {
    fn new() -> Self {
        Self {
            segments: Vec::new(),
            chars: 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }
}

/// Partition the not-yet-examined segments into batches of at most
/// `max_chars` characters.
///
/// Order is preserved. A segment larger than `max_chars` forms its own
/// batch rather than being split.
pub fn partition_unexamined(
    store: &DocumentStore,
    examined: &[bool],
    max_chars: usize,
) -> Vec<Batch> {
    let mut batches = Vec::new();
    let mut current = Batch::new();

    for (idx, segment) in store.segments().iter().enumerate() {
        if examined.get(idx).copied().unwrap_or(false) {
            continue;
        }

        let len = segment.len();
        if !current.is_empty() && current.chars + len > max_chars {
            batches.push(std::mem::replace(&mut current, Batch::new()));
        }

        current.segments.push(idx);
        current.chars += len;
    }

    if !current.is_empty() {
        batches.push(current);
    }

    batches
}
