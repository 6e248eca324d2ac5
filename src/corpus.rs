//! Corpus store: ordered entries, each held as a string of token codes.
//!
//! The engine talks to storage only through [`CorpusStore`], so the
//! in-memory store below and a persistent backend are interchangeable.
//! Entries are addressed by a dense slot (insertion order) inside the
//! engine and by the caller's [`EntryId`] at the boundary.

use std::collections::HashMap;

use crate::{error::CorpusError, types::EntryId};

/// Storage contract for corpus entries.
///
/// Implementations must keep slots stable: the slot returned by
/// [`CorpusStore::insert`] addresses the same entry until [`CorpusStore::clear`].
pub trait CorpusStore: Send + Sync {
    /// Stores a new entry and returns its slot.
    ///
    /// # Errors
    ///
    /// Returns [`CorpusError::DuplicateEntry`] if `id` is already stored,
    /// or [`CorpusError::Store`] if a backend cannot persist the entry.
    fn insert(&mut self, id: EntryId, content_code: String) -> Result<usize, CorpusError>;

    /// Whether an entry with `id` was ingested.
    fn contains(&self, id: EntryId) -> bool;

    /// Largest ingested id, for resuming ingestion from a checkpoint.
    fn last_entry_id(&self) -> Option<EntryId>;

    /// Number of stored entries.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Caller id of the entry at `slot`.
    fn entry_id(&self, slot: usize) -> Option<EntryId>;

    /// Code string of the entry at `slot`.
    fn content(&self, slot: usize) -> Option<&str>;

    /// Replaces the code string of the entry at `slot`.
    fn rewrite(&mut self, slot: usize, content_code: String);

    /// Slots whose code string contains `pattern`.
    fn slots_containing(&self, pattern: &str) -> Vec<usize> {
        (0..self.len())
            .filter(|&slot| self.content(slot).is_some_and(|c| c.contains(pattern)))
            .collect()
    }

    /// Drops every entry.
    fn clear(&mut self);
}

/// One stored entry.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Entry {
    id: EntryId,
    content_code: String,
}

/// Corpus held in process memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryCorpus {
    entries: Vec<Entry>,
    slots: HashMap<EntryId, usize>,
    last_id: Option<EntryId>,
}

impl MemoryCorpus {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CorpusStore for MemoryCorpus {
    fn insert(&mut self, id: EntryId, content_code: String) -> Result<usize, CorpusError> {
        if self.slots.contains_key(&id) {
            return Err(CorpusError::DuplicateEntry(id));
        }
        let slot = self.entries.len();
        self.entries.push(Entry { id, content_code });
        self.slots.insert(id, slot);
        self.last_id = Some(self.last_id.map_or(id, |last| last.max(id)));
        Ok(slot)
    }

    fn contains(&self, id: EntryId) -> bool {
        self.slots.contains_key(&id)
    }

    fn last_entry_id(&self) -> Option<EntryId> {
        self.last_id
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn entry_id(&self, slot: usize) -> Option<EntryId> {
        self.entries.get(slot).map(|e| e.id)
    }

    fn content(&self, slot: usize) -> Option<&str> {
        self.entries.get(slot).map(|e| e.content_code.as_str())
    }

    fn rewrite(&mut self, slot: usize, content_code: String) {
        if let Some(entry) = self.entries.get_mut(slot) {
            entry.content_code = content_code;
        }
    }

    fn clear(&mut self) {
        self.entries.clear();
        self.slots.clear();
        self.last_id = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_and_lookup() {
        let mut corpus = MemoryCorpus::new();
        let slot = corpus.insert(7, "\u{1}\u{2}".to_string()).expect("id 7 is new");
        assert_eq!(slot, 0);
        assert!(corpus.contains(7));
        assert!(!corpus.contains(8));
        assert_eq!(corpus.entry_id(0), Some(7));
        assert_eq!(corpus.content(0), Some("\u{1}\u{2}"));
    }

    #[test]
    fn test_duplicate_entry_rejected() {
        let mut corpus = MemoryCorpus::new();
        corpus.insert(1, "\u{1}".to_string()).expect("id 1 is new");
        let result = corpus.insert(1, "\u{2}".to_string());
        assert_eq!(result, Err(CorpusError::DuplicateEntry(1)));
        assert_eq!(corpus.len(), 1);
        assert_eq!(corpus.content(0), Some("\u{1}"));
    }

    #[test]
    fn test_last_entry_id_tracks_maximum() {
        let mut corpus = MemoryCorpus::new();
        assert_eq!(corpus.last_entry_id(), None);
        corpus.insert(5, String::new()).expect("id 5 is new");
        corpus.insert(2, String::new()).expect("id 2 is new");
        assert_eq!(corpus.last_entry_id(), Some(5));
    }

    #[test]
    fn test_slots_containing() {
        let mut corpus = MemoryCorpus::new();
        corpus.insert(0, "\u{1}\u{2}\u{3}".to_string()).expect("id 0 is new");
        corpus.insert(1, "\u{3}\u{3}".to_string()).expect("id 1 is new");
        corpus.insert(2, "\u{2}\u{3}".to_string()).expect("id 2 is new");
        assert_eq!(corpus.slots_containing("\u{2}\u{3}"), vec![0, 2]);

        corpus.rewrite(2, "\u{4}".to_string());
        assert_eq!(corpus.slots_containing("\u{2}\u{3}"), vec![0]);
    }

    #[test]
    fn test_clear() {
        let mut corpus = MemoryCorpus::new();
        corpus.insert(3, "\u{1}".to_string()).expect("id 3 is new");
        corpus.clear();
        assert!(corpus.is_empty());
        assert!(!corpus.contains(3));
        assert_eq!(corpus.last_entry_id(), None);
    }
}
