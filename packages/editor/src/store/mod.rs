//! # External Section Store
//!
//! The request/response contract the session persists through:
//!
//! | call     | request                                   | response            |
//! |----------|-------------------------------------------|---------------------|
//! | `load`   | `GET template sections`                   | sections, or `None` when the template is not materialized yet |
//! | `create` | `POST section {sectionType, title, settings, position}` | section with server id |
//! | `update` | `PUT section/{id} {settings?, enabled?, position?}` | success/failure |
//! | `delete` | `DELETE section/{id}`                     | success/failure     |
//!
//! `settings` in an update is the complete settings object of the section.

mod http;
mod memory;

pub use http::HttpSectionStore;
pub use memory::{MemoryStore, StoreCall, StoreOp};

use async_trait::async_trait;
use std::sync::Arc;

use crate::StoreError;
use storefront_common::{NewSection, Section, SectionPatch};

#[async_trait]
pub trait SectionStore: Send + Sync {
    /// Sections of `template`; `Ok(None)` means the template has no sections record yet
    async fn load(&self, template: &str) -> Result<Option<Vec<Section>>, StoreError>;

    async fn create(&self, template: &str, section: &NewSection) -> Result<Section, StoreError>;

    async fn update(&self, section_id: &str, patch: &SectionPatch) -> Result<(), StoreError>;

    async fn delete(&self, section_id: &str) -> Result<(), StoreError>;
}

#[async_trait]
impl<T: SectionStore + ?Sized> SectionStore for Arc<T> {
    async fn load(&self, template: &str) -> Result<Option<Vec<Section>>, StoreError> {
        (**self).load(template).await
    }

    async fn create(&self, template: &str, section: &NewSection) -> Result<Section, StoreError> {
        (**self).create(template, section).await
    }

    async fn update(&self, section_id: &str, patch: &SectionPatch) -> Result<(), StoreError> {
        (**self).update(section_id, patch).await
    }

    async fn delete(&self, section_id: &str) -> Result<(), StoreError> {
        (**self).delete(section_id).await
    }
}
