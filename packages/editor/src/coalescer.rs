//! # Update Coalescer
//!
//! Debounces rapid per-section patches. Patches for the same section merge
//! (later fields win, settings merge key-wise) and every `schedule` restarts
//! the window. When the window elapses the owner drains all pending patches at
//! once, in the order their sections were first scheduled.
//!
//! The coalescer does not spawn anything. It exposes its deadline through
//! [`Coalescer::expired`], which the owning session awaits next to its other
//! event sources, so clearing the coalescer is all it takes to cancel it.

use std::future;
use std::time::Duration;
use tokio::time::{self, Instant};

use storefront_common::SectionPatch;

/// Merged patch awaiting dispatch
#[derive(Debug, Clone, PartialEq)]
pub struct PendingUpdate {
    pub section_id: String,
    pub patch: SectionPatch,
}

#[derive(Debug)]
pub struct Coalescer {
    /// Used in log lines only
    name: &'static str,
    window: Duration,
    pending: Vec<PendingUpdate>,
    deadline: Option<Instant>,
}

impl Coalescer {
    pub fn new(name: &'static str, window: Duration) -> Self {
        Self {
            name,
            window,
            pending: Vec::new(),
            deadline: None,
        }
    }

    /// Merge `patch` into the pending patch of `section_id` and restart the window
    pub fn schedule(&mut self, section_id: &str, patch: SectionPatch) {
        match self
            .pending
            .iter_mut()
            .find(|update| update.section_id == section_id)
        {
            Some(update) => update.patch.merge(patch),
            None => self.pending.push(PendingUpdate {
                section_id: section_id.to_string(),
                patch,
            }),
        }
        self.deadline = Some(Instant::now() + self.window);
        tracing::trace!(
            "[Coalescer:{}] scheduled {} ({} pending)",
            self.name,
            section_id,
            self.pending.len()
        );
    }

    /// Resolves once the window has elapsed; never resolves while idle
    pub async fn expired(&self) {
        match self.deadline {
            Some(deadline) => time::sleep_until(deadline).await,
            None => future::pending::<()>().await,
        }
    }

    /// Take every pending patch and stop the timer
    pub fn drain(&mut self) -> Vec<PendingUpdate> {
        self.deadline = None;
        let drained = std::mem::take(&mut self.pending);
        if !drained.is_empty() {
            tracing::debug!("[Coalescer:{}] flushing {} update(s)", self.name, drained.len());
        }
        drained
    }

    /// Discard everything pending. Returns how many patches were dropped.
    pub fn clear(&mut self) -> usize {
        self.deadline = None;
        let dropped = self.pending.len();
        self.pending.clear();
        if dropped > 0 {
            tracing::debug!("[Coalescer:{}] cleared {} pending update(s)", self.name, dropped);
        }
        dropped
    }

    /// Forget the pending patch of one section, keeping the timer for the rest
    pub fn discard(&mut self, section_id: &str) -> Option<SectionPatch> {
        let index = self
            .pending
            .iter()
            .position(|update| update.section_id == section_id)?;
        let removed = self.pending.remove(index);
        if self.pending.is_empty() {
            self.deadline = None;
        }
        Some(removed.patch)
    }

    pub fn pending(&self, section_id: &str) -> Option<&SectionPatch> {
        self.pending
            .iter()
            .find(|update| update.section_id == section_id)
            .map(|update| &update.patch)
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_idle(&self) -> bool {
        self.pending.is_empty()
    }
}
