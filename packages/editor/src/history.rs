//! # Undo/Redo History
//!
//! Linear log of whole-collection snapshots with a cursor.
//!
//! ## Design
//!
//! - Each entry is a full snapshot of the section list plus a label
//! - Pushing discards every entry after the cursor (redo branch is pruned)
//! - Undo/redo only move the cursor; the caller restores `current().state`
//! - The log is bounded; the oldest entries are evicted first
//! - Recording can be paused for mutations derived from other recorded ones
//!
//! ## Example
//!
//! ```rust,ignore
//! let mut history = History::new(sections.clone(), "Loaded template", 50);
//!
//! history.push(next.clone(), "Added section", Some("Hero".into()));
//!
//! if history.undo() {
//!     sections = history.current().state.clone();
//! }
//! ```

use storefront_common::Section;

/// One snapshot in the history log
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryEntry {
    /// The section list as it was after the action
    pub state: Vec<Section>,

    /// Human readable action label
    pub action: String,

    /// Milliseconds since the unix epoch
    pub timestamp: i64,

    /// Optional detail, usually the affected section title
    pub details: Option<String>,
}

impl HistoryEntry {
    fn new(state: Vec<Section>, action: impl Into<String>, details: Option<String>) -> Self {
        Self {
            state,
            action: action.into(),
            timestamp: chrono::Utc::now().timestamp_millis(),
            details,
        }
    }
}

/// Bounded undo/redo log over section snapshots
#[derive(Debug, Clone)]
pub struct History {
    entries: Vec<HistoryEntry>,

    /// Always `< entries.len()`
    current_index: usize,

    /// Maximum number of entries (at least 1)
    max_size: usize,

    /// Nesting depth of paused recording
    paused: usize,
}

impl History {
    /// Start a log whose only entry is `initial`
    pub fn new(initial: Vec<Section>, action: impl Into<String>, max_size: usize) -> Self {
        Self {
            entries: vec![HistoryEntry::new(initial, action, None)],
            current_index: 0,
            max_size: max_size.max(1),
            paused: 0,
        }
    }

    /// Record a new snapshot.
    ///
    /// Returns `false` without touching the log while recording is paused.
    pub fn push(
        &mut self,
        state: Vec<Section>,
        action: impl Into<String>,
        details: Option<String>,
    ) -> bool {
        if !self.is_recording() {
            return false;
        }

        self.entries.truncate(self.current_index + 1);
        self.entries.push(HistoryEntry::new(state, action, details));
        self.current_index = self.entries.len() - 1;

        // Evict from the front and re-base the cursor
        if self.entries.len() > self.max_size {
            let overflow = self.entries.len() - self.max_size;
            self.entries.drain(..overflow);
            self.current_index -= overflow;
        }

        true
    }

    /// Step the cursor back. Returns whether it moved.
    pub fn undo(&mut self) -> bool {
        if self.current_index > 0 {
            self.current_index -= 1;
            true
        } else {
            false
        }
    }

    /// Step the cursor forward. Returns whether it moved.
    pub fn redo(&mut self) -> bool {
        if self.current_index + 1 < self.entries.len() {
            self.current_index += 1;
            true
        } else {
            false
        }
    }

    /// Jump to `index`, clamped into range. Returns the new cursor.
    pub fn go_to(&mut self, index: usize) -> usize {
        self.current_index = index.min(self.entries.len() - 1);
        self.current_index
    }

    /// Run `f` with recording paused
    pub fn without_recording<R>(&mut self, f: impl FnOnce(&mut Self) -> R) -> R {
        self.pause();
        let result = f(self);
        self.resume();
        result
    }

    /// Pause recording until a matching [`History::resume`].
    ///
    /// Pauses nest. Used when the paused span crosses an await point and a
    /// closure cannot express it.
    pub fn pause(&mut self) {
        self.paused += 1;
    }

    pub fn resume(&mut self) {
        self.paused = self.paused.saturating_sub(1);
    }

    pub fn is_recording(&self) -> bool {
        self.paused == 0
    }

    /// Replace the whole log with a single baseline entry
    pub fn reset(&mut self, state: Vec<Section>, action: impl Into<String>) {
        self.entries = vec![HistoryEntry::new(state, action, None)];
        self.current_index = 0;
    }

    /// Drop the newest entry if the cursor sits on it.
    ///
    /// Used to take back an entry whose mutation failed to persist. The first
    /// entry is never removed.
    pub fn retract(&mut self) -> bool {
        let at_end = self.current_index + 1 == self.entries.len();
        if !at_end || self.entries.len() < 2 {
            return false;
        }
        self.entries.pop();
        self.current_index -= 1;
        true
    }

    /// Rewrite a section id across every snapshot.
    ///
    /// Placeholder ids are swapped for server ids once creation is confirmed,
    /// so that restoring an older snapshot refers to the persisted section.
    pub fn rename_section(&mut self, from: &str, to: &str) {
        for entry in &mut self.entries {
            for section in entry.state.iter_mut().filter(|s| s.id == from) {
                section.id = to.to_string();
            }
        }
    }

    /// Overwrite one section inside the entry under the cursor.
    ///
    /// Keeps the entry in line with the store after a write that failed and was
    /// reverted locally. Returns false when the entry has no such section.
    pub fn amend_section(&mut self, section: &Section) -> bool {
        let entry = &mut self.entries[self.current_index];
        match entry.state.iter_mut().find(|s| s.id == section.id) {
            Some(stored) => {
                *stored = section.clone();
                true
            }
            None => false,
        }
    }

    pub fn current(&self) -> &HistoryEntry {
        &self.entries[self.current_index]
    }

    pub fn current_index(&self) -> usize {
        self.current_index
    }

    pub fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    pub fn can_undo(&self) -> bool {
        self.current_index > 0
    }

    pub fn can_redo(&self) -> bool {
        self.current_index + 1 < self.entries.len()
    }

    /// Label of the entry that undo would step away from
    pub fn undo_description(&self) -> Option<&str> {
        self.can_undo().then(|| self.current().action.as_str())
    }

    /// Label of the entry that redo would step onto
    pub fn redo_description(&self) -> Option<&str> {
        self.entries
            .get(self.current_index + 1)
            .map(|entry| entry.action.as_str())
    }
}
