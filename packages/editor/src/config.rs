//! Editor configuration with environment overrides.

use serde::Deserialize;
use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::EditorError;

/// Tunables of an edit session
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct EditorConfig {
    /// Maximum number of history entries kept (oldest evicted first)
    pub max_history: usize,

    /// Debounce window before coalesced edits are written to the store
    pub storage_debounce_ms: u64,

    /// Debounce window before coalesced edits are forwarded to the preview
    pub preview_debounce_ms: u64,

    /// Timeout for every store call, 0 disables it
    pub persist_timeout_ms: u64,

    /// Prefix of placeholder ids used between optimistic insert and confirmation
    pub transient_id_prefix: String,

    /// Appended to the title of duplicated sections
    pub duplicate_suffix: String,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            max_history: 50,
            storage_debounce_ms: 300,
            preview_debounce_ms: 800,
            persist_timeout_ms: 10_000,
            transient_id_prefix: "temp-".to_string(),
            duplicate_suffix: " (Copy)".to_string(),
        }
    }
}

fn env_number<T: FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|value| value.trim().parse().ok())
}

impl EditorConfig {
    /// Defaults overridden by `EDITOR_*` environment variables.
    ///
    /// Unparseable values are ignored.
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    pub fn with_env_overrides(mut self) -> Self {
        if let Some(max_history) = env_number("EDITOR_MAX_HISTORY") {
            self.max_history = max_history;
        }
        if let Some(ms) = env_number("EDITOR_STORAGE_DEBOUNCE_MS") {
            self.storage_debounce_ms = ms;
        }
        if let Some(ms) = env_number("EDITOR_PREVIEW_DEBOUNCE_MS") {
            self.preview_debounce_ms = ms;
        }
        if let Some(ms) = env_number("EDITOR_PERSIST_TIMEOUT_MS") {
            self.persist_timeout_ms = ms;
        }
        self
    }

    /// Parse a JSON config document; missing fields take their defaults
    pub fn from_json(source: &str) -> Result<Self, EditorError> {
        let config: Self =
            serde_json::from_str(source).map_err(|e| EditorError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), EditorError> {
        if self.max_history == 0 {
            return Err(EditorError::Config(
                "max_history must be at least 1".to_string(),
            ));
        }
        if self.transient_id_prefix.is_empty() {
            return Err(EditorError::Config(
                "transient_id_prefix must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    pub fn storage_window(&self) -> Duration {
        Duration::from_millis(self.storage_debounce_ms)
    }

    pub fn preview_window(&self) -> Duration {
        Duration::from_millis(self.preview_debounce_ms)
    }

    pub fn persist_timeout(&self) -> Option<Duration> {
        (self.persist_timeout_ms > 0).then(|| Duration::from_millis(self.persist_timeout_ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EditorConfig::default();
        assert_eq!(config.storage_window(), Duration::from_millis(300));
        assert_eq!(config.preview_window(), Duration::from_millis(800));
        assert_eq!(config.persist_timeout(), Some(Duration::from_secs(10)));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_json_fills_missing_fields() {
        let config = EditorConfig::from_json(r#"{"max_history": 5, "persist_timeout_ms": 0}"#)
            .unwrap();

        assert_eq!(config.max_history, 5);
        assert_eq!(config.persist_timeout(), None);
        assert_eq!(config.storage_debounce_ms, 300);
    }

    #[test]
    fn test_zero_history_is_rejected() {
        let result = EditorConfig::from_json(r#"{"max_history": 0}"#);
        assert!(matches!(result, Err(EditorError::Config(_))));
    }

    #[test]
    fn test_malformed_json_is_config_error() {
        assert!(matches!(
            EditorConfig::from_json("{not json"),
            Err(EditorError::Config(_))
        ));
    }
}
