//! # Section Data Model
//!
//! A template page is an ordered list of sections. Each section carries an
//! opaque settings object whose shape depends on its `section_type`; nothing in
//! this crate inspects settings beyond merging keys.
//!
//! ## Wire shape
//!
//! Sections serialize in camelCase so the same value can be posted to the
//! preview context and to the external store unchanged:
//!
//! ```text
//! { "id": "sec-1", "sectionType": "hero", "title": "Hero",
//!   "settings": { ... }, "enabled": true, "position": 0 }
//! ```

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{CommonError, CommonResult};

/// Open key-value settings of a section
pub type SettingsMap = Map<String, Value>;

fn default_enabled() -> bool {
    true
}

/// The unit of editable content on a template page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Section {
    /// Server-assigned id, or a transient placeholder until creation is confirmed
    pub id: String,

    /// Selects the settings schema and renderer; immutable after creation
    pub section_type: String,

    /// Human display label
    pub title: String,

    /// Opaque settings, shape depends on `section_type`
    #[serde(default)]
    pub settings: SettingsMap,

    /// Visibility flag
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Dense, zero-based order among sibling sections
    #[serde(default)]
    pub position: usize,
}

impl Section {
    /// Create an enabled section at position 0
    pub fn new(
        id: impl Into<String>,
        section_type: impl Into<String>,
        title: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            section_type: section_type.into(),
            title: title.into(),
            settings: SettingsMap::new(),
            enabled: true,
            position: 0,
        }
    }

    pub fn with_settings(mut self, settings: SettingsMap) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_position(mut self, position: usize) -> Self {
        self.position = position;
        self
    }

    /// Apply a partial update in place.
    ///
    /// Settings merge key-wise: keys present in the patch overwrite, all other
    /// keys are kept.
    pub fn apply_patch(&mut self, patch: &SectionPatch) {
        if let Some(settings) = &patch.settings {
            for (key, value) in settings {
                self.settings.insert(key.clone(), value.clone());
            }
        }
        if let Some(enabled) = patch.enabled {
            self.enabled = enabled;
        }
        if let Some(position) = patch.position {
            self.position = position;
        }
    }

    /// Copy of this section with `patch` applied
    pub fn patched(&self, patch: &SectionPatch) -> Self {
        let mut next = self.clone();
        next.apply_patch(patch);
        next
    }
}

/// Payload for creating a section in the external store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewSection {
    pub section_type: String,
    pub title: String,
    #[serde(default)]
    pub settings: SettingsMap,
    #[serde(default)]
    pub position: usize,
}

impl NewSection {
    pub fn new(section_type: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            section_type: section_type.into(),
            title: title.into(),
            settings: SettingsMap::new(),
            position: 0,
        }
    }

    pub fn with_settings(mut self, settings: SettingsMap) -> Self {
        self.settings = settings;
        self
    }

    /// Materialize as a local section under `id`
    pub fn into_section(self, id: impl Into<String>) -> Section {
        Section {
            id: id.into(),
            section_type: self.section_type,
            title: self.title,
            settings: self.settings,
            enabled: true,
            position: self.position,
        }
    }
}

/// Partial mutation of a section.
///
/// Used both as the coalescing unit (keyed by section id) and as the body of
/// an update call. When sent to the store, `settings` is the complete settings
/// object of the section.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SectionPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settings: Option<SettingsMap>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<usize>,
}

impl SectionPatch {
    /// Patch touching a single settings key
    pub fn setting(key: impl Into<String>, value: impl Into<Value>) -> Self {
        let mut settings = SettingsMap::new();
        settings.insert(key.into(), value.into());
        Self {
            settings: Some(settings),
            ..Self::default()
        }
    }

    pub fn settings(settings: SettingsMap) -> Self {
        Self {
            settings: Some(settings),
            ..Self::default()
        }
    }

    pub fn enabled(enabled: bool) -> Self {
        Self {
            enabled: Some(enabled),
            ..Self::default()
        }
    }

    pub fn position(position: usize) -> Self {
        Self {
            position: Some(position),
            ..Self::default()
        }
    }

    /// Build a settings patch from an untyped JSON value
    pub fn from_settings_value(value: Value) -> CommonResult<Self> {
        Ok(Self::settings(settings_from_value(value)?))
    }

    pub fn is_empty(&self) -> bool {
        self.settings.as_ref().map_or(true, |s| s.is_empty())
            && self.enabled.is_none()
            && self.position.is_none()
    }

    /// Fold a later patch into this one. Later fields win; settings merge key-wise.
    pub fn merge(&mut self, later: SectionPatch) {
        if let Some(settings) = later.settings {
            let merged = self.settings.get_or_insert_with(SettingsMap::new);
            for (key, value) in settings {
                merged.insert(key, value);
            }
        }
        if later.enabled.is_some() {
            self.enabled = later.enabled;
        }
        if later.position.is_some() {
            self.position = later.position;
        }
    }

    /// True when the patch only rewrites one string-valued setting, the shape
    /// produced by typing into a text field.
    pub fn is_text_like(&self) -> bool {
        if self.enabled.is_some() || self.position.is_some() {
            return false;
        }
        match &self.settings {
            Some(settings) if settings.len() == 1 => {
                settings.values().all(|value| value.is_string())
            }
            _ => false,
        }
    }
}

/// Interpret a JSON value as a settings object
pub fn settings_from_value(value: Value) -> CommonResult<SettingsMap> {
    match value {
        Value::Object(map) => Ok(map),
        Value::Null => Err(CommonError::SettingsNotAnObject("null")),
        Value::Bool(_) => Err(CommonError::SettingsNotAnObject("boolean")),
        Value::Number(_) => Err(CommonError::SettingsNotAnObject("number")),
        Value::String(_) => Err(CommonError::SettingsNotAnObject("string")),
        Value::Array(_) => Err(CommonError::SettingsNotAnObject("array")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_section_wire_shape_is_camel_case() {
        let section = Section::new("sec-1", "hero", "Hero").with_position(2);
        let value = serde_json::to_value(&section).unwrap();

        assert_eq!(value["sectionType"], "hero");
        assert_eq!(value["position"], 2);
        assert_eq!(value["enabled"], true);
    }

    #[test]
    fn test_section_defaults_when_fields_missing() {
        let section: Section =
            serde_json::from_value(json!({"id": "a", "sectionType": "footer", "title": "Footer"}))
                .unwrap();

        assert!(section.enabled);
        assert_eq!(section.position, 0);
        assert!(section.settings.is_empty());
    }

    #[test]
    fn test_merge_later_fields_win_and_settings_merge_keywise() {
        let mut patch = SectionPatch::setting("a", 1);
        patch.merge(SectionPatch::setting("a", 2));
        patch.merge(SectionPatch::setting("b", 3));

        let settings = patch.settings.unwrap();
        assert_eq!(settings.get("a"), Some(&json!(2)));
        assert_eq!(settings.get("b"), Some(&json!(3)));
        assert_eq!(settings.len(), 2);
    }

    #[test]
    fn test_merge_keeps_earlier_fields_not_in_later_patch() {
        let mut patch = SectionPatch::enabled(false);
        patch.merge(SectionPatch::setting("heading", "Hi"));

        assert_eq!(patch.enabled, Some(false));
        assert!(patch.settings.is_some());
    }

    #[test]
    fn test_apply_patch_keeps_untouched_settings() {
        let mut settings = SettingsMap::new();
        settings.insert("heading".into(), json!("Welcome"));
        settings.insert("align".into(), json!("left"));
        let section = Section::new("a", "hero", "Hero").with_settings(settings);

        let next = section.patched(&SectionPatch::setting("heading", "Sale"));

        assert_eq!(next.settings["heading"], json!("Sale"));
        assert_eq!(next.settings["align"], json!("left"));
    }

    #[test]
    fn test_text_like_detection() {
        assert!(SectionPatch::setting("heading", "x").is_text_like());
        assert!(!SectionPatch::setting("columns", 3).is_text_like());
        assert!(!SectionPatch::enabled(false).is_text_like());

        let mut two = SectionPatch::setting("a", "x");
        two.merge(SectionPatch::setting("b", "y"));
        assert!(!two.is_text_like());
    }

    #[test]
    fn test_empty_patch() {
        assert!(SectionPatch::default().is_empty());
        assert!(SectionPatch::settings(SettingsMap::new()).is_empty());
        assert!(!SectionPatch::position(0).is_empty());
    }

    #[test]
    fn test_patch_body_omits_absent_fields() {
        let body = serde_json::to_value(SectionPatch::enabled(false)).unwrap();
        assert_eq!(body, json!({"enabled": false}));
    }

    #[test]
    fn test_settings_from_value_rejects_non_objects() {
        assert!(settings_from_value(json!({"a": 1})).is_ok());
        assert!(matches!(
            settings_from_value(json!([1, 2])),
            Err(CommonError::SettingsNotAnObject("array"))
        ));
        assert!(SectionPatch::from_settings_value(json!("text")).is_err());
    }
}
