//! Error types for the editor

use std::time::Duration;
use thiserror::Error;

/// Failure of a call against the external section store
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Section not found: {0}")]
    NotFound(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Store returned status {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Store call timed out after {0:?}")]
    Timeout(Duration),

    #[error("Store rejected {operation}: {reason}")]
    Rejected {
        operation: &'static str,
        reason: String,
    },
}

/// Failure surfaced by an edit session operation.
///
/// By the time one of these is returned, local state has already been rolled
/// back to what it was before the operation.
#[derive(Error, Debug)]
pub enum EditorError {
    #[error("Persistence failed: {0}")]
    Store(#[from] StoreError),

    #[error("Invalid section data: {0}")]
    Common(#[from] storefront_common::CommonError),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl EditorError {
    /// Whether the failure came from the store timing out
    pub fn is_timeout(&self) -> bool {
        matches!(self, EditorError::Store(StoreError::Timeout(_)))
    }
}
