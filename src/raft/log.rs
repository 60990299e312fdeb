//! Ordered command log.

use crate::error::{MetanodeError, Result};
use crate::types::{LogIndex, Term};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;

/// A single committed entry in the command log.
///
/// The payload is Arc-wrapped so handing entries to several replicas never copies it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    /// The term when the entry was proposed.
    pub term: Term,
    /// The index of this entry in the log.
    pub index: LogIndex,
    /// The encoded command.
    #[serde(with = "arc_bytes")]
    pub data: Arc<Vec<u8>>,
}

impl LogEntry {
    /// Create a new log entry.
    pub fn new(term: Term, index: LogIndex, data: Vec<u8>) -> Self {
        Self { term, index, data: Arc::new(data) }
    }

    /// Get a reference to the data bytes.
    #[inline]
    pub fn data_bytes(&self) -> &[u8] {
        &self.data
    }
}

/// Serde helper module for Arc<Vec<u8>> serialization.
mod arc_bytes {
    use serde::{Deserializer, Serializer};
    use std::sync::Arc;

    pub fn serialize<S>(data: &Arc<Vec<u8>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serde_bytes::serialize(data.as_slice(), serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Arc<Vec<u8>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let bytes: Vec<u8> = serde_bytes::deserialize(deserializer)?;
        Ok(Arc::new(bytes))
    }
}

/// In-memory command log. Entries before `first_index` have been folded into a snapshot.
#[derive(Debug)]
pub struct RaftLog {
    entries: VecDeque<LogEntry>,
    first_index: LogIndex,
    snapshot_term: Term,
}

impl RaftLog {
    pub fn new() -> Self {
        Self {
            entries: VecDeque::new(),
            first_index: 1,
            snapshot_term: 0,
        }
    }

    /// An empty log continuing after a snapshot that covers `index`.
    pub fn with_snapshot(index: LogIndex, term: Term) -> Self {
        Self {
            entries: VecDeque::new(),
            first_index: index + 1,
            snapshot_term: term,
        }
    }

    /// Get the index of the last log entry.
    pub fn last_index(&self) -> LogIndex {
        if self.entries.is_empty() {
            self.first_index.saturating_sub(1)
        } else {
            self.first_index + self.entries.len() as u64 - 1
        }
    }

    /// Get the term of the last log entry.
    pub fn last_term(&self) -> Term {
        self.entries.back().map(|e| e.term).unwrap_or(self.snapshot_term)
    }

    /// Get the first index in the log.
    pub fn first_index(&self) -> LogIndex {
        self.first_index
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Append an entry to the log.
    pub fn append(&mut self, entry: LogEntry) -> Result<()> {
        let expected_index = self.last_index() + 1;
        if entry.index != expected_index {
            return Err(MetanodeError::RaftLog(format!(
                "Expected index {}, got {}",
                expected_index, entry.index
            )));
        }
        self.entries.push_back(entry);
        Ok(())
    }

    /// Get an entry by index.
    pub fn get(&self, index: LogIndex) -> Option<&LogEntry> {
        if index < self.first_index || index > self.last_index() {
            return None;
        }
        let offset = (index - self.first_index) as usize;
        self.entries.get(offset)
    }

    /// Get entries starting from the given index.
    pub fn entries_from(&self, start_index: LogIndex) -> Vec<LogEntry> {
        if start_index > self.last_index() {
            return Vec::new();
        }
        let start = start_index.max(self.first_index);
        let offset = (start - self.first_index) as usize;
        self.entries.iter().skip(offset).cloned().collect()
    }

    /// Drop every entry up to and including `up_to_index` once a snapshot covers them.
    pub fn compact(&mut self, up_to_index: LogIndex, snapshot_term: Term) {
        if up_to_index < self.first_index {
            return;
        }

        let entries_to_remove = (up_to_index - self.first_index + 1) as usize;
        for _ in 0..entries_to_remove.min(self.entries.len()) {
            self.entries.pop_front();
        }

        self.first_index = up_to_index + 1;
        self.snapshot_term = snapshot_term;
    }
}

impl Default for RaftLog {
    fn default() -> Self {
        Self::new()
    }
}
