//! Shared fixtures for the editor integration tests

#![allow(dead_code)]

use serde_json::Value;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use storefront_editor::{
    preview_link, EditSession, EditorConfig, MemoryStore, OutboundMessage, PreviewEndpoint,
    PreviewMessage, Section, SettingsMap, SyncKind,
};

pub type Session = EditSession<Arc<MemoryStore>>;

/// Log to the test writer when RUST_LOG is set; safe to call from every test
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn settings(value: Value) -> SettingsMap {
    value.as_object().cloned().unwrap_or_default()
}

/// Home page with a hero, a rich text block and a footer
pub fn storefront() -> Arc<MemoryStore> {
    Arc::new(MemoryStore::new().with_template(
        "index",
        vec![
            Section::new("a", "hero", "Hero")
                .with_settings(settings(serde_json::json!({"heading": "Welcome"})))
                .with_position(0),
            Section::new("b", "rich-text", "Text")
                .with_settings(settings(serde_json::json!({"body": "Hello"})))
                .with_position(1),
            Section::new("c", "footer", "Footer").with_position(2),
        ],
    ))
}

pub async fn open(store: Arc<MemoryStore>) -> Session {
    open_with(store, EditorConfig::default()).await
}

pub async fn open_with(store: Arc<MemoryStore>, config: EditorConfig) -> Session {
    init_tracing();
    EditSession::open(store, config, "index")
        .await
        .expect("session opens")
}

/// Attach a preview, signal ready and drop the initial burst
pub fn connect_preview(session: &mut Session) -> PreviewEndpoint {
    let (port, mut endpoint) = preview_link();
    session.attach_preview(port);
    session.handle_preview_message(PreviewMessage::Ready);
    endpoint.drain();
    endpoint
}

pub fn ids(session: &Session) -> Vec<String> {
    session.sections().iter().map(|s| s.id.clone()).collect()
}

pub fn stored_ids(store: &MemoryStore) -> Vec<String> {
    store.sections("index").into_iter().map(|s| s.id).collect()
}

pub fn kinds(messages: &[OutboundMessage]) -> Vec<SyncKind> {
    messages.iter().map(|m| m.kind()).collect()
}
