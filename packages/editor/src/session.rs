//! # Edit Session
//!
//! The single authority over one template's section list.
//!
//! Every operation follows the same shape:
//!
//! ```text
//! snapshot → apply locally → record history → notify preview → persist
//!                                                           │
//!                                   failure: restore snapshot, retract history
//! ```
//!
//! Structural edits (add, delete, reorder, visibility) persist immediately.
//! Text-like settings edits are applied locally at once but reach the store
//! and the preview through two coalescers, so a burst of keystrokes costs one
//! write and one preview message.
//!
//! All methods take `&mut self`, so operations never interleave and every read
//! sees the current list. A host drives the coalescer timers by awaiting
//! [`EditSession::process_timers`] (or running [`EditSession::run`]) next to
//! its own event sources.

use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;
use tokio::sync::mpsc;

use crate::coalescer::Coalescer;
use crate::config::EditorConfig;
use crate::history::History;
use crate::protocol::{PreviewMessage, SyncUpdate};
use crate::sequencer;
use crate::store::SectionStore;
use crate::sync_channel::{PreviewPort, SyncChannel};
use crate::{EditorError, StoreError};
use storefront_common::{NewSection, Section, SectionPatch};

/// What an operation did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationOutcome {
    /// Applied locally and confirmed by the store
    Applied,
    /// Applied locally; the write waits in the storage coalescer
    Scheduled,
    /// The next value equals the current one, nothing happened
    Unchanged,
    /// The section no longer exists
    Skipped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpdateOptions {
    /// Push a history entry and persist immediately, instead of coalescing
    pub record_history: bool,
}

impl UpdateOptions {
    pub fn recorded() -> Self {
        Self {
            record_history: true,
        }
    }

    pub fn coalesced() -> Self {
        Self {
            record_history: false,
        }
    }

    /// Text-like edits coalesce, everything else is recorded
    pub fn for_patch(patch: &SectionPatch) -> Self {
        Self {
            record_history: !patch.is_text_like(),
        }
    }
}

/// Which coalescer window elapsed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    Storage,
    Preview,
}

enum RunEvent {
    Message(PreviewMessage),
    Timer(TimerKind),
}

/// Position writes that stopped partway
struct PositionWriteFailure {
    error: StoreError,
    /// Ids whose new position already reached the store
    written: Vec<String>,
}

/// Store writes made while restoring a history entry
#[derive(Default)]
struct ReconcileLog {
    deleted: Vec<Section>,
    /// (id in the snapshot, id the store assigned)
    created: Vec<(String, String)>,
    updated: Vec<String>,
}

async fn with_deadline<T>(
    limit: Option<Duration>,
    call: impl Future<Output = Result<T, StoreError>>,
) -> Result<T, StoreError> {
    match limit {
        Some(limit) => tokio::time::timeout(limit, call)
            .await
            .unwrap_or_else(|_| Err(StoreError::Timeout(limit))),
        None => call.await,
    }
}

/// Update body for the fields `touched` mentions, taken from `section`.
///
/// Settings always travel whole.
fn stored_patch(section: &Section, touched: &SectionPatch) -> SectionPatch {
    SectionPatch {
        settings: touched.settings.as_ref().map(|_| section.settings.clone()),
        enabled: touched.enabled.map(|_| section.enabled),
        position: touched.position.map(|_| section.position),
    }
}

fn update_label(patch: &SectionPatch) -> &'static str {
    match patch.enabled {
        Some(true) if patch.settings.is_none() => "Showed section",
        Some(false) if patch.settings.is_none() => "Hid section",
        _ => "Updated section",
    }
}

pub struct EditSession<S> {
    store: S,
    config: EditorConfig,
    template: String,
    sections: Vec<Section>,
    history: History,
    channel: SyncChannel,

    /// Coalesced writes to the store
    storage_updates: Coalescer,
    /// Coalesced upserts to the preview
    preview_updates: Coalescer,
    /// Section state before its first coalesced edit, restored if the write fails
    storage_baselines: HashMap<String, Section>,

    selected_section: Option<String>,
    selector_mode: bool,

    /// Set while the session writes state derived from history
    is_applying: bool,
    /// Stored positions may disagree with local order
    order_dirty: bool,
    next_transient: u64,
}

impl<S: SectionStore> EditSession<S> {
    /// Session over an empty, unloaded template
    pub fn new(
        store: S,
        config: EditorConfig,
        template: impl Into<String>,
    ) -> Result<Self, EditorError> {
        config.validate()?;
        Ok(Self {
            store,
            template: template.into(),
            sections: Vec::new(),
            history: History::new(Vec::new(), "Loaded template", config.max_history),
            channel: SyncChannel::new(),
            storage_updates: Coalescer::new("storage", config.storage_window()),
            preview_updates: Coalescer::new("preview", config.preview_window()),
            storage_baselines: HashMap::new(),
            selected_section: None,
            selector_mode: false,
            is_applying: false,
            order_dirty: false,
            next_transient: 0,
            config,
        })
    }

    /// Create a session and load `template` from the store
    pub async fn open(
        store: S,
        config: EditorConfig,
        template: impl Into<String>,
    ) -> Result<Self, EditorError> {
        let mut session = Self::new(store, config, template)?;
        let template = session.template.clone();
        session.load_template(&template).await?;
        Ok(session)
    }

    // ----- accessors -----

    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    pub fn section(&self, section_id: &str) -> Option<&Section> {
        self.sections.iter().find(|section| section.id == section_id)
    }

    fn index_of(&self, section_id: &str) -> Option<usize> {
        self.sections
            .iter()
            .position(|section| section.id == section_id)
    }

    pub fn template(&self) -> &str {
        &self.template
    }

    pub fn config(&self) -> &EditorConfig {
        &self.config
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn channel(&self) -> &SyncChannel {
        &self.channel
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn selected_section(&self) -> Option<&str> {
        self.selected_section.as_deref()
    }

    pub fn selector_mode(&self) -> bool {
        self.selector_mode
    }

    pub fn is_applying(&self) -> bool {
        self.is_applying
    }

    /// Whether a sibling position write failed and [`EditSession::fix_order`] should run
    pub fn needs_order_repair(&self) -> bool {
        self.order_dirty
    }

    /// Sections with edits not yet written to the store
    pub fn pending_writes(&self) -> usize {
        self.storage_updates.len()
    }

    pub fn has_pending(&self) -> bool {
        !self.storage_updates.is_idle() || !self.preview_updates.is_idle()
    }

    // ----- template lifecycle -----

    /// Switch to `template`, replacing the section list wholesale.
    ///
    /// Pending coalesced edits of the current template are written first, so a
    /// failed write or load leaves the session where it was. A template the
    /// store does not know yet starts empty.
    pub async fn load_template(&mut self, template: &str) -> Result<usize, EditorError> {
        self.flush().await?;

        let loaded = with_deadline(self.config.persist_timeout(), self.store.load(template)).await?;
        self.cancel_pending();
        let sections = match loaded {
            Some(sections) => sections,
            None => {
                tracing::info!(
                    "[EditSession] template {} not materialized, starting empty",
                    template
                );
                Vec::new()
            }
        };

        let mut stored: Vec<usize> = sections.iter().map(|section| section.position).collect();
        stored.sort_unstable();
        self.order_dirty = stored.iter().enumerate().any(|(index, position)| *position != index);
        if self.order_dirty {
            tracing::warn!(
                "[EditSession] stored positions of {} are not dense",
                template
            );
        }

        self.template = template.to_string();
        self.sections = sequencer::normalize(sections);
        self.history.reset(self.sections.clone(), "Loaded template");
        self.selected_section = None;

        self.channel.send(SyncUpdate::navigate(template));
        self.channel.send(SyncUpdate::full_replace(&self.sections));

        tracing::info!(
            "[EditSession] loaded {} with {} section(s)",
            template,
            self.sections.len()
        );
        Ok(self.sections.len())
    }

    /// Flush pending edits and make the current list the new history baseline
    pub async fn save_baseline(&mut self) -> Result<(), EditorError> {
        self.flush().await?;
        self.history.reset(self.sections.clone(), "Saved");
        Ok(())
    }

    /// Cancel every timer and stop talking to the preview
    pub fn teardown(&mut self) {
        self.cancel_pending();
        self.channel.dispose();
    }

    fn cancel_pending(&mut self) {
        self.storage_updates.clear();
        self.preview_updates.clear();
        self.storage_baselines.clear();
    }

    // ----- mutations -----

    /// Insert a section at `at` (append when `None`) and return its server id
    pub async fn add_section(
        &mut self,
        section: NewSection,
        at: Option<usize>,
    ) -> Result<String, EditorError> {
        let before = self.sections.clone();
        let index = sequencer::clamp_index(at.unwrap_or(before.len()), before.len());
        let transient_id = self.next_transient_id();

        let mut request = section;
        request.position = index;
        let title = request.title.clone();
        let next = sequencer::insert_at(
            &before,
            request.clone().into_section(transient_id.clone()),
            Some(index),
        );

        self.commit(next, Some(("Added section", Some(title.clone()))));
        self.channel.send(SyncUpdate::full_replace(&self.sections));

        let created = match with_deadline(
            self.config.persist_timeout(),
            self.store.create(&self.template, &request),
        )
        .await
        {
            Ok(created) => created,
            Err(error) => {
                tracing::warn!(
                    "[EditSession] create of {:?} failed, rolling back: {}",
                    title,
                    error
                );
                self.rollback(before, true);
                return Err(error.into());
            }
        };

        self.confirm_id(&transient_id, &created.id);
        self.channel.send(SyncUpdate::full_replace(&self.sections));
        tracing::info!(
            "[EditSession] added {} ({}) at {}",
            created.id,
            created.section_type,
            index
        );

        let shifted = sequencer::changed_positions(&before, &self.sections);
        self.persist_sibling_positions(shifted).await;
        Ok(created.id)
    }

    /// Copy a section's type and settings into a new section appended at the end
    pub async fn duplicate_section(
        &mut self,
        section_id: &str,
    ) -> Result<Option<String>, EditorError> {
        let Some(source) = self.section(section_id) else {
            tracing::debug!("[EditSession] duplicate of stale section {} ignored", section_id);
            return Ok(None);
        };
        let copy = NewSection::new(
            source.section_type.clone(),
            format!("{}{}", source.title, self.config.duplicate_suffix),
        )
        .with_settings(source.settings.clone());

        self.add_section(copy, None).await.map(Some)
    }

    /// Apply a partial update.
    ///
    /// A `position` in the patch is handled as a reorder of the section.
    pub async fn update_section(
        &mut self,
        section_id: &str,
        mut patch: SectionPatch,
        options: UpdateOptions,
    ) -> Result<MutationOutcome, EditorError> {
        let Some(index) = self.index_of(section_id) else {
            tracing::debug!("[EditSession] update of stale section {} ignored", section_id);
            return Ok(MutationOutcome::Skipped);
        };

        let position = patch.position.take();
        let fields = self.update_fields(index, patch, options).await?;
        let Some(position) = position else {
            return Ok(fields);
        };

        let moved = self.reorder(section_id, position).await?;
        Ok(match fields {
            MutationOutcome::Unchanged => moved,
            fields => fields,
        })
    }

    /// Merge an untyped settings object into a section
    pub async fn update_settings(
        &mut self,
        section_id: &str,
        settings: serde_json::Value,
    ) -> Result<MutationOutcome, EditorError> {
        let patch = SectionPatch::from_settings_value(settings)?;
        let options = UpdateOptions::for_patch(&patch);
        self.update_section(section_id, patch, options).await
    }

    pub async fn set_enabled(
        &mut self,
        section_id: &str,
        enabled: bool,
    ) -> Result<MutationOutcome, EditorError> {
        self.update_section(
            section_id,
            SectionPatch::enabled(enabled),
            UpdateOptions::recorded(),
        )
        .await
    }

    async fn update_fields(
        &mut self,
        index: usize,
        patch: SectionPatch,
        options: UpdateOptions,
    ) -> Result<MutationOutcome, EditorError> {
        let current = &self.sections[index];
        let updated = current.patched(&patch);
        if updated == *current {
            return Ok(MutationOutcome::Unchanged);
        }

        let before = self.sections.clone();
        let section_id = updated.id.clone();
        let title = updated.title.clone();
        let mut next = before.clone();
        next[index] = updated;

        if !options.record_history {
            self.commit(next, None);
            self.storage_baselines.entry(section_id.clone()).or_insert_with(|| before[index].clone());
            self.storage_updates.schedule(&section_id, patch.clone());
            self.preview_updates.schedule(&section_id, patch);
            return Ok(MutationOutcome::Scheduled);
        }

        self.commit(next, Some((update_label(&patch), Some(title))));
        let section = self.sections[index].clone();
        self.channel.send(SyncUpdate::upsert(&section, &patch));

        let request = stored_patch(&section, &patch);
        match with_deadline(
            self.config.persist_timeout(),
            self.store.update(&section_id, &request),
        )
        .await
        {
            Ok(()) => {
                if let Some(baseline) = self.storage_baselines.get_mut(&section_id) {
                    if let Some(settings) = &request.settings {
                        baseline.settings = settings.clone();
                    }
                    if let Some(enabled) = request.enabled {
                        baseline.enabled = enabled;
                    }
                }
                Ok(MutationOutcome::Applied)
            }
            Err(error) => {
                tracing::warn!(
                    "[EditSession] update of {} failed, rolling back: {}",
                    section_id,
                    error
                );
                self.rollback(before, true);
                Err(error.into())
            }
        }
    }

    /// Remove a section. Callers confirm with the user first.
    pub async fn delete_section(&mut self, section_id: &str) -> Result<MutationOutcome, EditorError> {
        let Some(index) = self.index_of(section_id) else {
            tracing::debug!("[EditSession] delete of stale section {} ignored", section_id);
            return Ok(MutationOutcome::Skipped);
        };

        let before = self.sections.clone();
        let removed = before[index].clone();
        let next = sequencer::remove(&before, section_id);

        // Coalesced edits of the section are moot unless the delete fails
        let pending_write = self.storage_updates.discard(section_id);
        let pending_preview = self.preview_updates.discard(section_id);
        let baseline = self.storage_baselines.remove(section_id);
        let selected_before = self.selected_section.clone();

        self.commit(next, Some(("Deleted section", Some(removed.title.clone()))));
        if self.selected_section.as_deref() == Some(section_id) {
            self.selected_section = None;
        }
        self.channel.send(SyncUpdate::delete(section_id));

        if let Err(error) = with_deadline(
            self.config.persist_timeout(),
            self.store.delete(section_id),
        )
        .await
        {
            tracing::warn!(
                "[EditSession] delete of {} failed, rolling back: {}",
                section_id,
                error
            );
            self.rollback(before, true);
            self.selected_section = selected_before;
            if let Some(patch) = pending_write {
                self.storage_updates.schedule(section_id, patch);
            }
            if let Some(patch) = pending_preview {
                self.preview_updates.schedule(section_id, patch);
            }
            if let Some(baseline) = baseline {
                self.storage_baselines.insert(section_id.to_string(), baseline);
            }
            return Err(error.into());
        }

        tracing::info!("[EditSession] deleted {} ({:?})", section_id, removed.title);
        let shifted = sequencer::changed_positions(&before, &self.sections);
        self.persist_sibling_positions(shifted).await;
        Ok(MutationOutcome::Applied)
    }

    /// Move a section to `to_index` (clamped) and persist the new order.
    ///
    /// Position writes go out one at a time in increasing target index. If one
    /// fails, the writes that already landed are reverted and the local order
    /// is rolled back.
    pub async fn reorder(
        &mut self,
        section_id: &str,
        to_index: usize,
    ) -> Result<MutationOutcome, EditorError> {
        let Some(from) = self.index_of(section_id) else {
            tracing::debug!("[EditSession] reorder of stale section {} ignored", section_id);
            return Ok(MutationOutcome::Skipped);
        };
        let to = to_index.min(self.sections.len() - 1);
        if from == to {
            return Ok(MutationOutcome::Unchanged);
        }

        let before = self.sections.clone();
        let title = before[from].title.clone();
        let next = sequencer::move_to(&before, section_id, to);

        // The entry holds the order after the move
        self.commit(next, Some(("Reordered sections", Some(title))));
        self.channel.send(SyncUpdate::full_replace(&self.sections));

        let targets = sequencer::changed_positions(&before, &self.sections);
        match self.write_positions(&targets).await {
            Ok(()) => {
                tracing::info!("[EditSession] moved {} from {} to {}", section_id, from, to);
                Ok(MutationOutcome::Applied)
            }
            Err(failure) => {
                tracing::warn!(
                    "[EditSession] reorder failed after {} of {} write(s), rolling back: {}",
                    failure.written.len(),
                    targets.len(),
                    failure.error
                );
                self.compensate_positions(&before, &failure.written).await;
                self.rollback(before, true);
                Err(failure.error.into())
            }
        }
    }

    /// Re-derive positions from list order and write all of them to the store
    pub async fn fix_order(&mut self) -> Result<MutationOutcome, EditorError> {
        let repaired = sequencer::resequence(self.sections.clone());
        let changed = repaired != self.sections;
        self.commit(repaired, None);
        if changed {
            self.channel.send(SyncUpdate::full_replace(&self.sections));
        }

        let targets: Vec<(String, usize)> = self
            .sections
            .iter()
            .map(|section| (section.id.clone(), section.position))
            .collect();
        match self.write_positions(&targets).await {
            Ok(()) => {
                self.order_dirty = false;
                Ok(MutationOutcome::Applied)
            }
            Err(failure) => {
                tracing::warn!("[EditSession] order repair failed: {}", failure.error);
                self.order_dirty = true;
                Err(failure.error.into())
            }
        }
    }

    // ----- history -----

    pub async fn undo(&mut self) -> Result<MutationOutcome, EditorError> {
        self.flush().await?;
        self.record_unrecorded_edits();
        if !self.history.can_undo() {
            return Ok(MutationOutcome::Unchanged);
        }
        let previous = self.history.current_index();
        self.history.undo();
        self.restore_snapshot(previous).await
    }

    pub async fn redo(&mut self) -> Result<MutationOutcome, EditorError> {
        self.flush().await?;
        self.record_unrecorded_edits();
        if !self.history.can_redo() {
            return Ok(MutationOutcome::Unchanged);
        }
        let previous = self.history.current_index();
        self.history.redo();
        self.restore_snapshot(previous).await
    }

    /// Jump to a history entry (clamped), as a history browser does
    pub async fn go_to(&mut self, index: usize) -> Result<MutationOutcome, EditorError> {
        self.flush().await?;
        self.record_unrecorded_edits();
        let target = index.min(self.history.len() - 1);
        if target == self.history.current_index() {
            return Ok(MutationOutcome::Unchanged);
        }
        let previous = self.history.current_index();
        self.history.go_to(target);
        self.restore_snapshot(previous).await
    }

    /// Make the snapshot under the cursor the live list and persist it.
    ///
    /// On failure the cursor returns to `previous_index` and the list to what it was.
    async fn restore_snapshot(&mut self, previous_index: usize) -> Result<MutationOutcome, EditorError> {
        let snapshot = self.history.current().state.clone();
        let action = self.history.current().action.clone();
        let before = std::mem::replace(&mut self.sections, snapshot);

        self.begin_applying();
        self.channel.send(SyncUpdate::full_replace(&self.sections));
        let mut log = ReconcileLog::default();
        let result = self.reconcile(&before, &mut log).await;
        self.end_applying();

        match result {
            Ok(()) => {
                if let Some(selected) = self.selected_section.clone() {
                    if self.index_of(&selected).is_none() {
                        self.selected_section = None;
                    }
                }
                tracing::debug!(
                    "[EditSession] restored history entry {} ({})",
                    self.history.current_index(),
                    action
                );
                Ok(MutationOutcome::Applied)
            }
            Err(error) => {
                tracing::warn!("[EditSession] restoring {:?} failed: {}", action, error);
                self.history.go_to(previous_index);
                self.sections = before;
                self.undo_reconcile(log).await;
                self.channel.send(SyncUpdate::full_replace(&self.sections));
                Err(error.into())
            }
        }
    }

    /// Bring the store from `before` to the current list, noting each write in `log`
    async fn reconcile(&mut self, before: &[Section], log: &mut ReconcileLog) -> Result<(), StoreError> {
        let limit = self.config.persist_timeout();

        let removed: Vec<Section> = before
            .iter()
            .filter(|old| self.index_of(&old.id).is_none())
            .cloned()
            .collect();
        for section in removed {
            with_deadline(limit, self.store.delete(&section.id)).await?;
            log.deleted.push(section);
        }

        // Sections deleted since the snapshot come back under new ids
        let missing: Vec<Section> = self
            .sections
            .iter()
            .filter(|section| !before.iter().any(|old| old.id == section.id))
            .cloned()
            .collect();
        for section in missing {
            let request = NewSection {
                section_type: section.section_type.clone(),
                title: section.title.clone(),
                settings: section.settings.clone(),
                position: section.position,
            };
            let created = with_deadline(limit, self.store.create(&self.template, &request)).await?;
            log.created.push((section.id.clone(), created.id.clone()));
            self.confirm_id(&section.id, &created.id);
            if !section.enabled {
                with_deadline(
                    limit,
                    self.store.update(&created.id, &SectionPatch::enabled(false)),
                )
                .await?;
            }
        }

        let changed: Vec<(String, SectionPatch)> = self
            .sections
            .iter()
            .filter_map(|section| {
                let old = before.iter().find(|old| old.id == section.id)?;
                let patch = SectionPatch {
                    settings: (old.settings != section.settings).then(|| section.settings.clone()),
                    enabled: (old.enabled != section.enabled).then_some(section.enabled),
                    position: (old.position != section.position).then_some(section.position),
                };
                let touched =
                    patch.settings.is_some() || patch.enabled.is_some() || patch.position.is_some();
                touched.then(|| (section.id.clone(), patch))
            })
            .collect();
        for (section_id, patch) in changed {
            with_deadline(limit, self.store.update(&section_id, &patch)).await?;
            log.updated.push(section_id);
        }

        Ok(())
    }

    /// Take back the writes of a failed reconcile so the store matches the live list again.
    ///
    /// Best effort: anything that cannot be taken back flags the order for repair.
    async fn undo_reconcile(&mut self, log: ReconcileLog) {
        let limit = self.config.persist_timeout();
        let mut clean = true;

        for section_id in &log.updated {
            let Some(section) = self.section(section_id).cloned() else {
                continue;
            };
            let patch = SectionPatch {
                settings: Some(section.settings),
                enabled: Some(section.enabled),
                position: Some(section.position),
            };
            if let Err(error) = with_deadline(limit, self.store.update(section_id, &patch)).await {
                tracing::warn!("[EditSession] could not revert {}: {}", section_id, error);
                clean = false;
            }
        }

        for (snapshot_id, created_id) in log.created.iter().rev() {
            match with_deadline(limit, self.store.delete(created_id)).await {
                Ok(()) => self.history.rename_section(created_id, snapshot_id),
                Err(error) => {
                    tracing::warn!("[EditSession] could not remove {}: {}", created_id, error);
                    clean = false;
                }
            }
        }

        for section in log.deleted {
            let request = NewSection {
                section_type: section.section_type.clone(),
                title: section.title.clone(),
                settings: section.settings.clone(),
                position: section.position,
            };
            let created = match with_deadline(limit, self.store.create(&self.template, &request)).await {
                Ok(created) => created,
                Err(error) => {
                    tracing::warn!("[EditSession] could not re-create {}: {}", section.id, error);
                    clean = false;
                    continue;
                }
            };
            self.confirm_id(&section.id, &created.id);
            if !section.enabled {
                let hidden = with_deadline(
                    limit,
                    self.store.update(&created.id, &SectionPatch::enabled(false)),
                )
                .await;
                if let Err(error) = hidden {
                    tracing::warn!("[EditSession] could not hide {}: {}", created.id, error);
                    clean = false;
                }
            }
        }

        if !clean {
            self.order_dirty = true;
        }
    }

    fn begin_applying(&mut self) {
        self.is_applying = true;
        self.history.pause();
    }

    fn end_applying(&mut self) {
        self.history.resume();
        self.is_applying = false;
    }

    // ----- coalescer timers -----

    /// Wait for the next coalescer window to elapse. Pending forever when idle.
    pub async fn next_timer(&self) -> TimerKind {
        tokio::select! {
            _ = self.storage_updates.expired() => TimerKind::Storage,
            _ = self.preview_updates.expired() => TimerKind::Preview,
        }
    }

    /// Flush the coalescer behind `kind`; returns how many sections it handled
    pub async fn fire(&mut self, kind: TimerKind) -> Result<usize, EditorError> {
        match kind {
            TimerKind::Storage => self.flush_storage().await,
            TimerKind::Preview => Ok(self.flush_preview()),
        }
    }

    /// Wait for the next elapsed window and flush it
    pub async fn process_timers(&mut self) -> Result<TimerKind, EditorError> {
        let kind = self.next_timer().await;
        self.fire(kind).await?;
        Ok(kind)
    }

    /// Flush both coalescers now
    pub async fn flush(&mut self) -> Result<(), EditorError> {
        self.flush_preview();
        self.flush_storage().await.map(|_| ())
    }

    fn flush_preview(&mut self) -> usize {
        let mut sent = 0;
        for update in self.preview_updates.drain() {
            let Some(message) = self
                .section(&update.section_id)
                .map(|section| SyncUpdate::upsert(section, &update.patch))
            else {
                continue;
            };
            self.channel.send(message);
            sent += 1;
        }
        sent
    }

    async fn flush_storage(&mut self) -> Result<usize, EditorError> {
        let limit = self.config.persist_timeout();
        let mut written = 0;
        let mut first_error: Option<StoreError> = None;

        for update in self.storage_updates.drain() {
            let baseline = self.storage_baselines.remove(&update.section_id);
            let Some(section) = self.section(&update.section_id).cloned() else {
                continue;
            };

            let request = stored_patch(&section, &update.patch);
            match with_deadline(limit, self.store.update(&section.id, &request)).await {
                Ok(()) => written += 1,
                Err(error) => {
                    tracing::warn!(
                        "[EditSession] coalesced write of {} failed, reverting: {}",
                        section.id,
                        error
                    );
                    if let Some(baseline) = baseline {
                        self.revert_fields(baseline, &update.patch);
                    }
                    first_error.get_or_insert(error);
                }
            }
        }

        match first_error {
            Some(error) => Err(error.into()),
            None => Ok(written),
        }
    }

    /// Put the fields a failed `patch` touched back to `baseline`, the last
    /// values the store confirmed for the section
    fn revert_fields(&mut self, baseline: Section, patch: &SectionPatch) {
        let Some(index) = self.index_of(&baseline.id) else {
            return;
        };
        self.preview_updates.discard(&baseline.id);

        let section = &mut self.sections[index];
        if let Some(settings) = &patch.settings {
            for key in settings.keys() {
                match baseline.settings.get(key) {
                    Some(value) => {
                        section.settings.insert(key.clone(), value.clone());
                    }
                    None => {
                        section.settings.remove(key);
                    }
                }
            }
        }
        if patch.enabled.is_some() {
            section.enabled = baseline.enabled;
        }

        let section = self.sections[index].clone();
        if !self.is_applying {
            self.history.amend_section(&section);
        }
        let upsert = SectionPatch {
            settings: Some(section.settings.clone()),
            enabled: Some(section.enabled),
            position: None,
        };
        self.channel.send(SyncUpdate::upsert(&section, &upsert));
    }

    // ----- preview -----

    /// Connect the preview transport. Messages keep buffering until it reports ready.
    pub fn attach_preview(&mut self, port: impl PreviewPort + 'static) {
        self.channel.attach(port);
    }

    pub fn detach_preview(&mut self) {
        self.channel.detach();
    }

    /// Handle a message from the preview. Inbound traffic never mutates sections.
    pub fn handle_preview_message(&mut self, message: PreviewMessage) {
        match message {
            PreviewMessage::Ready => {
                tracing::debug!(
                    "[EditSession] preview ready, {} message(s) buffered",
                    self.channel.buffered()
                );
                self.channel.mark_ready(&self.sections);
            }
            PreviewMessage::SectionSelected {
                section_id,
                section_type,
            } => {
                if self.index_of(&section_id).is_some() {
                    tracing::debug!("[EditSession] selected {} ({})", section_id, section_type);
                    self.selected_section = Some(section_id);
                } else {
                    tracing::debug!("[EditSession] selection of stale section {} ignored", section_id);
                }
            }
        }
    }

    /// Toggle click-to-select inside the preview
    pub fn set_selector_mode(&mut self, active: bool) {
        self.selector_mode = active;
        self.channel.send(SyncUpdate::selector_mode(active));
    }

    /// Serve preview messages and coalescer timers until the preview hangs up
    pub async fn run(&mut self, mut inbound: mpsc::UnboundedReceiver<PreviewMessage>) {
        loop {
            let event = tokio::select! {
                message = inbound.recv() => match message {
                    Some(message) => RunEvent::Message(message),
                    None => break,
                },
                kind = self.next_timer() => RunEvent::Timer(kind),
            };

            match event {
                RunEvent::Message(message) => self.handle_preview_message(message),
                RunEvent::Timer(kind) => {
                    if let Err(error) = self.fire(kind).await {
                        tracing::warn!("[EditSession] {:?} flush failed: {}", kind, error);
                    }
                }
            }
        }

        tracing::debug!("[EditSession] preview disconnected");
        self.channel.detach();
    }

    // ----- internals -----

    fn next_transient_id(&mut self) -> String {
        self.next_transient += 1;
        format!("{}{}", self.config.transient_id_prefix, self.next_transient)
    }

    /// Replace the live list, recording `record` unless history is paused
    fn commit(&mut self, next: Vec<Section>, record: Option<(&'static str, Option<String>)>) {
        if record.is_some() {
            self.record_unrecorded_edits();
        }
        self.sections = next;
        let Some((action, details)) = record else {
            return;
        };
        if !self.history.push(self.sections.clone(), action, details) {
            tracing::debug!("[EditSession] {:?} not recorded while applying", action);
        }
    }

    /// Give live changes that bypassed history (coalesced edits, order repair)
    /// an entry of their own so undo and redo step over them
    fn record_unrecorded_edits(&mut self) {
        if self.is_applying || self.sections == self.history.current().state {
            return;
        }
        self.history.push(self.sections.clone(), "Edited settings", None);
    }

    /// Restore `before` after a failed write
    fn rollback(&mut self, before: Vec<Section>, recorded: bool) {
        self.sections = before;
        if recorded {
            self.history.retract();
        }
        self.channel.send(SyncUpdate::full_replace(&self.sections));
    }

    /// Swap a placeholder id for the id the store assigned
    fn confirm_id(&mut self, transient_id: &str, id: &str) {
        if let Some(section) = self
            .sections
            .iter_mut()
            .find(|section| section.id == transient_id)
        {
            section.id = id.to_string();
        }
        self.history.rename_section(transient_id, id);
        if self.selected_section.as_deref() == Some(transient_id) {
            self.selected_section = Some(id.to_string());
        }
    }

    async fn write_positions(&self, targets: &[(String, usize)]) -> Result<(), PositionWriteFailure> {
        let limit = self.config.persist_timeout();
        let mut written = Vec::new();
        for (section_id, position) in targets {
            let patch = SectionPatch::position(*position);
            if let Err(error) = with_deadline(limit, self.store.update(section_id, &patch)).await {
                return Err(PositionWriteFailure { error, written });
            }
            written.push(section_id.clone());
        }
        Ok(())
    }

    /// Best-effort write of positions shifted by an insert or delete
    async fn persist_sibling_positions(&mut self, targets: Vec<(String, usize)>) {
        if targets.is_empty() {
            return;
        }
        if let Err(failure) = self.write_positions(&targets).await {
            tracing::warn!(
                "[EditSession] sibling position write failed after {} write(s): {}",
                failure.written.len(),
                failure.error
            );
            self.order_dirty = true;
        }
    }

    /// Put already-written positions back to their values in `before`
    async fn compensate_positions(&mut self, before: &[Section], written: &[String]) {
        let restore: Vec<(String, usize)> = before
            .iter()
            .filter(|section| written.contains(&section.id))
            .map(|section| (section.id.clone(), section.position))
            .collect();
        if let Err(failure) = self.write_positions(&restore).await {
            tracing::warn!(
                "[EditSession] could not revert stored positions: {}",
                failure.error
            );
            self.order_dirty = true;
        }
    }
}
