//! # Storefront Editor
//!
//! Editor state engine for the storefront theme editor.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │ host: panels, drag handles, text fields     │
//! └─────────────────────────────────────────────┘
//!                     ↓
//! ┌─────────────────────────────────────────────┐
//! │ session: optimistic mutation coordinator    │
//! │  - Apply locally, persist, roll back        │
//! │  - Snapshot history with undo/redo          │
//! │  - Coalesce text edits per section          │
//! │  - Keep positions dense (sequencer)         │
//! └─────────────────────────────────────────────┘
//!          ↓                           ↓
//! ┌──────────────────────┐   ┌──────────────────────┐
//! │ store: SectionStore  │   │ sync_channel: buffer │
//! │  (HTTP / in-memory)  │   │  → preview context   │
//! └──────────────────────┘   └──────────────────────┘
//! ```
//!
//! ## Core Principles
//!
//! 1. **Local first**: the UI sees every edit before the store confirms it
//! 2. **Store is authority**: a rejected write restores the prior list
//! 3. **One writer**: all mutation goes through `&mut EditSession`
//! 4. **Preview is derived**: it only ever receives state, never sends edits
//!
//! ## Usage
//!
//! ```rust,ignore
//! use storefront_editor::{EditSession, EditorConfig, HttpSectionStore, UpdateOptions};
//! use storefront_common::SectionPatch;
//!
//! let store = HttpSectionStore::new("https://shop.example/api");
//! let mut session = EditSession::open(store, EditorConfig::from_env(), "index").await?;
//!
//! // Keystrokes: applied now, written once the typing pauses
//! let patch = SectionPatch::setting("heading", "Summer sale");
//! session.update_section("sec-1", patch, UpdateOptions::coalesced()).await?;
//!
//! // Structural edits persist immediately and land in history
//! session.reorder("sec-1", 0).await?;
//! session.undo().await?;
//!
//! // Drive the coalescer windows
//! session.process_timers().await?;
//! ```

mod coalescer;
mod config;
mod errors;
mod history;
mod protocol;
pub mod sequencer;
mod session;
mod store;
mod sync_channel;

pub use coalescer::{Coalescer, PendingUpdate};
pub use config::EditorConfig;
pub use errors::{EditorError, StoreError};
pub use history::{History, HistoryEntry};
pub use protocol::{OutboundMessage, PreviewMessage, SyncKind, SyncUpdate};
pub use session::{EditSession, MutationOutcome, TimerKind, UpdateOptions};
pub use store::{HttpSectionStore, MemoryStore, SectionStore, StoreCall, StoreOp};
pub use sync_channel::{
    preview_link, ChannelState, MpscPort, PortClosed, PreviewEndpoint, PreviewPort, SyncChannel,
};

// Re-export common types for convenience
pub use storefront_common::{NewSection, Section, SectionPatch, SettingsMap};
