//! In-process section store.
//!
//! Keeps sections per template, assigns `sec-N` ids on create and logs every
//! call it receives. Failures and latency can be injected per operation, which
//! is what the session tests use to exercise rollback.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use super::SectionStore;
use crate::StoreError;
use storefront_common::{NewSection, Section, SectionPatch};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    Load,
    Create,
    Update,
    Delete,
}

impl StoreOp {
    fn name(self) -> &'static str {
        match self {
            StoreOp::Load => "load",
            StoreOp::Create => "create",
            StoreOp::Update => "update",
            StoreOp::Delete => "delete",
        }
    }
}

/// One call as received by the store
#[derive(Debug, Clone, PartialEq)]
pub struct StoreCall {
    pub op: StoreOp,
    /// Template for load/create, section id for update/delete
    pub target: String,
    pub patch: Option<SectionPatch>,
}

#[derive(Debug, Default)]
struct MemoryState {
    templates: HashMap<String, Vec<Section>>,
    next_id: u64,
    calls: Vec<StoreCall>,
    /// Per op: number of calls to let through before failing the next one
    failures: HashMap<StoreOp, Vec<usize>>,
    latency: HashMap<StoreOp, Duration>,
}

impl MemoryState {
    fn find_mut(&mut self, section_id: &str) -> Option<&mut Section> {
        self.templates
            .values_mut()
            .flat_map(|sections| sections.iter_mut())
            .find(|section| section.id == section_id)
    }

    /// Consume a scheduled failure for `op` if one is due
    fn take_failure(&mut self, op: StoreOp) -> bool {
        let Some(queue) = self.failures.get_mut(&op) else {
            return false;
        };
        let Some(skip) = queue.first_mut() else {
            return false;
        };
        if *skip == 0 {
            queue.remove(0);
            true
        } else {
            *skip -= 1;
            false
        }
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed `template` with sections (ids kept as given)
    pub fn with_template(self, template: &str, sections: Vec<Section>) -> Self {
        self.lock().templates.insert(template.to_string(), sections);
        self
    }

    /// Fail the next call of `op`
    pub fn fail_next(&self, op: StoreOp) {
        self.fail_after(op, 0);
    }

    /// Let `successes` calls of `op` through, then fail one
    pub fn fail_after(&self, op: StoreOp, successes: usize) {
        self.lock().failures.entry(op).or_default().push(successes);
    }

    /// Delay every call of `op` by `latency`
    pub fn set_latency(&self, op: StoreOp, latency: Duration) {
        self.lock().latency.insert(op, latency);
    }

    /// Stored sections of `template` in position order
    pub fn sections(&self, template: &str) -> Vec<Section> {
        let mut sections = self
            .lock()
            .templates
            .get(template)
            .cloned()
            .unwrap_or_default();
        sections.sort_by_key(|section| section.position);
        sections
    }

    pub fn calls(&self) -> Vec<StoreCall> {
        self.lock().calls.clone()
    }

    pub fn calls_of(&self, op: StoreOp) -> Vec<StoreCall> {
        self.lock()
            .calls
            .iter()
            .filter(|call| call.op == op)
            .cloned()
            .collect()
    }

    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryState> {
        // A panicking test thread must not wedge the other assertions
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Record the call, wait out the latency, then report an injected failure
    async fn enter(
        &self,
        op: StoreOp,
        target: &str,
        patch: Option<&SectionPatch>,
    ) -> Result<(), StoreError> {
        let (latency, fail) = {
            let mut state = self.lock();
            state.calls.push(StoreCall {
                op,
                target: target.to_string(),
                patch: patch.cloned(),
            });
            let fail = state.take_failure(op);
            (state.latency.get(&op).copied(), fail)
        };

        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        if fail {
            return Err(StoreError::Rejected {
                operation: op.name(),
                reason: "injected failure".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl SectionStore for MemoryStore {
    async fn load(&self, template: &str) -> Result<Option<Vec<Section>>, StoreError> {
        self.enter(StoreOp::Load, template, None).await?;
        Ok(self.lock().templates.get(template).cloned())
    }

    async fn create(&self, template: &str, section: &NewSection) -> Result<Section, StoreError> {
        self.enter(StoreOp::Create, template, None).await?;

        let mut state = self.lock();
        state.next_id += 1;
        let created = section.clone().into_section(format!("sec-{}", state.next_id));
        state
            .templates
            .entry(template.to_string())
            .or_default()
            .push(created.clone());
        Ok(created)
    }

    async fn update(&self, section_id: &str, patch: &SectionPatch) -> Result<(), StoreError> {
        self.enter(StoreOp::Update, section_id, Some(patch)).await?;

        let mut state = self.lock();
        let section = state
            .find_mut(section_id)
            .ok_or_else(|| StoreError::NotFound(section_id.to_string()))?;
        if let Some(settings) = &patch.settings {
            section.settings = settings.clone();
        }
        if let Some(enabled) = patch.enabled {
            section.enabled = enabled;
        }
        if let Some(position) = patch.position {
            section.position = position;
        }
        Ok(())
    }

    async fn delete(&self, section_id: &str) -> Result<(), StoreError> {
        self.enter(StoreOp::Delete, section_id, None).await?;

        let mut state = self.lock();
        for sections in state.templates.values_mut() {
            if let Some(index) = sections.iter().position(|s| s.id == section_id) {
                sections.remove(index);
                return Ok(());
            }
        }
        Err(StoreError::NotFound(section_id.to_string()))
    }
}
