//! # History Manager
//!
//! Bounded, linear undo/redo over state snapshots.
//!
//! ## Design
//!
//! - The history is an ordered list of immutable entries plus a cursor
//! - Pushing while the cursor is behind the tail discards the redo branch
//!   (no multi-branch history)
//! - When the list grows past `max_states`, the oldest entries are evicted
//! - The list is never empty: `cursor` always lies in `0..len`
//!
//! ## Example
//!
//! ```rust
//! use easel_editor::HistoryManager;
//!
//! let mut history = HistoryManager::new("A", 10);
//! history.push("B", Some("type"));
//! history.push("C", None);
//!
//! assert_eq!(history.undo(), Some(&"B"));
//! history.push("D", None);
//! assert_eq!(history.redo(), None);
//! ```

use chrono::{DateTime, Utc};
use easel_common::HistoryConfig;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// One captured snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry<T> {
    pub data: T,
    pub timestamp: DateTime<Utc>,
    pub description: Option<String>,
}

impl<T> HistoryEntry<T> {
    fn new(data: T, description: Option<String>) -> Self {
        Self {
            data,
            timestamp: Utc::now(),
            description,
        }
    }
}

/// Linear undo/redo stack
#[derive(Debug, Clone)]
pub struct HistoryManager<T> {
    entries: Vec<HistoryEntry<T>>,

    /// Index of the current entry
    cursor: usize,

    /// Maximum number of entries kept (at least 1)
    max_states: usize,
}

impl<T> HistoryManager<T> {
    /// Create a history holding a single initial entry
    pub fn new(initial: T, max_states: usize) -> Self {
        Self {
            entries: vec![HistoryEntry::new(initial, None)],
            cursor: 0,
            max_states: max_states.max(1),
        }
    }

    pub fn from_config(initial: T, config: &HistoryConfig) -> Self {
        Self::new(initial, config.max_states)
    }

    /// Record a new snapshot after the cursor. Returns the entries that fell
    /// out of the history: the discarded redo branch, then any evicted oldest
    /// entries.
    pub fn push(&mut self, data: T, description: Option<&str>) -> Vec<HistoryEntry<T>> {
        // New action invalidates the redo branch
        let mut discarded: Vec<HistoryEntry<T>> = self.entries.split_off(self.cursor + 1);
        if !discarded.is_empty() {
            debug!(dropped = discarded.len(), "Discarded redo branch");
        }

        self.entries
            .push(HistoryEntry::new(data, description.map(str::to_string)));

        if self.entries.len() > self.max_states {
            let overflow = self.entries.len() - self.max_states;
            discarded.extend(self.entries.drain(..overflow));
            debug!(evicted = overflow, "Evicted oldest history entries");
        }

        self.cursor = self.entries.len() - 1;
        discarded
    }

    /// Step back. `None` means there is nothing to undo.
    pub fn undo(&mut self) -> Option<&T> {
        if self.cursor == 0 {
            return None;
        }
        self.cursor -= 1;
        Some(&self.entries[self.cursor].data)
    }

    /// Step forward. `None` means there is nothing to redo.
    pub fn redo(&mut self) -> Option<&T> {
        if self.cursor + 1 >= self.entries.len() {
            return None;
        }
        self.cursor += 1;
        Some(&self.entries[self.cursor].data)
    }

    /// What `undo` would return, without moving the cursor
    pub fn peek_undo(&self) -> Option<&T> {
        self.cursor
            .checked_sub(1)
            .map(|index| &self.entries[index].data)
    }

    /// What `redo` would return, without moving the cursor
    pub fn peek_redo(&self) -> Option<&T> {
        self.entries.get(self.cursor + 1).map(|entry| &entry.data)
    }

    /// Entry at the cursor
    pub fn current(&self) -> &HistoryEntry<T> {
        &self.entries[self.cursor]
    }

    /// Move the cursor to an arbitrary entry without discarding anything
    pub fn jump_to(&mut self, index: usize) -> Option<&T> {
        if index >= self.entries.len() {
            return None;
        }
        self.cursor = index;
        Some(&self.entries[index].data)
    }

    /// Reset to a single-entry history
    pub fn clear(&mut self, initial: T) {
        self.entries.clear();
        self.entries.push(HistoryEntry::new(initial, None));
        self.cursor = 0;
    }

    pub fn can_undo(&self) -> bool {
        self.cursor > 0
    }

    pub fn can_redo(&self) -> bool {
        self.cursor + 1 < self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn max_states(&self) -> usize {
        self.max_states
    }

    pub fn entries(&self) -> &[HistoryEntry<T>] {
        &self.entries
    }

    /// Description of the step `undo` would revert
    pub fn undo_description(&self) -> Option<&str> {
        if !self.can_undo() {
            return None;
        }
        self.entries[self.cursor].description.as_deref()
    }

    /// Description of the step `redo` would reapply
    pub fn redo_description(&self) -> Option<&str> {
        self.entries
            .get(self.cursor + 1)
            .and_then(|entry| entry.description.as_deref())
    }
}
