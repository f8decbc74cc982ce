//! # Preview Wire Protocol
//!
//! Messages exchanged with the preview context.
//!
//! Outbound (editor → preview):
//!
//! ```text
//! { "type": "SYNC_EVENT", "update": {
//!     "kind": "FULL_REPLACE" | "ITEM_UPSERT" | "ITEM_DELETE" | "SELECTOR_MODE" | "NAVIGATE",
//!     "sections"?, "sectionId"?, "section"?, "settingsPatch"?, "enabled"?, "position"?, "template"?
//! } }
//! ```
//!
//! Inbound (preview → editor): `PREVIEW_READY` and `SECTION_SELECTED`. Inbound
//! traffic never mutates sections.

use serde::{Deserialize, Serialize};
use storefront_common::{Section, SectionPatch, SettingsMap};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SyncKind {
    FullReplace,
    ItemUpsert,
    ItemDelete,
    SelectorMode,
    Navigate,
}

/// Payload of a `SYNC_EVENT`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncUpdate {
    pub kind: SyncKind,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sections: Option<Vec<Section>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section: Option<Section>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settings_patch: Option<SettingsMap>,

    /// Section visibility, or the selector-mode flag for `SELECTOR_MODE`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<usize>,

    /// Target template of a `NAVIGATE`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,
}

impl SyncUpdate {
    fn bare(kind: SyncKind) -> Self {
        Self {
            kind,
            sections: None,
            section_id: None,
            section: None,
            settings_patch: None,
            enabled: None,
            position: None,
            template: None,
        }
    }

    pub fn full_replace(sections: &[Section]) -> Self {
        Self {
            sections: Some(sections.to_vec()),
            ..Self::bare(SyncKind::FullReplace)
        }
    }

    /// Upsert carrying both the resulting section and the fields that changed
    pub fn upsert(section: &Section, patch: &SectionPatch) -> Self {
        Self {
            section_id: Some(section.id.clone()),
            section: Some(section.clone()),
            settings_patch: patch.settings.clone(),
            enabled: patch.enabled,
            position: patch.position,
            ..Self::bare(SyncKind::ItemUpsert)
        }
    }

    pub fn delete(section_id: &str) -> Self {
        Self {
            section_id: Some(section_id.to_string()),
            ..Self::bare(SyncKind::ItemDelete)
        }
    }

    pub fn selector_mode(active: bool) -> Self {
        Self {
            enabled: Some(active),
            ..Self::bare(SyncKind::SelectorMode)
        }
    }

    pub fn navigate(template: &str) -> Self {
        Self {
            template: Some(template.to_string()),
            ..Self::bare(SyncKind::Navigate)
        }
    }
}

/// Envelope posted to the preview context
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum OutboundMessage {
    #[serde(rename = "SYNC_EVENT")]
    SyncEvent { update: SyncUpdate },
}

impl OutboundMessage {
    pub fn sync(update: SyncUpdate) -> Self {
        OutboundMessage::SyncEvent { update }
    }

    pub fn update(&self) -> &SyncUpdate {
        match self {
            OutboundMessage::SyncEvent { update } => update,
        }
    }

    pub fn kind(&self) -> SyncKind {
        self.update().kind
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Message received from the preview context
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PreviewMessage {
    /// The preview finished loading and can receive updates
    #[serde(rename = "PREVIEW_READY")]
    Ready,

    /// The user clicked a section inside the preview
    #[serde(rename = "SECTION_SELECTED", rename_all = "camelCase")]
    SectionSelected {
        section_id: String,
        section_type: String,
    },
}

impl PreviewMessage {
    pub fn from_json(source: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(source)
    }
}
