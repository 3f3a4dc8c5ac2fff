//! Error types for the capture reconciler.

use thiserror::Error;

/// Errors surfaced by the container engine driver.
///
/// The engine reports most failures as HTTP statuses; `404` is the one case
/// callers branch on (removal of something already gone is a valid terminal
/// state), and `403` on a network attach means the container is already
/// connected.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("engine returned status {status}: {message}")]
    Api { status: u16, message: String },

    #[error("engine transport error: {0}")]
    Transport(#[from] bollard::errors::Error),
}

impl EngineError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, EngineError::NotFound(_))
    }

    /// `403` from a network attach: the container is already connected.
    pub fn is_already_attached(&self) -> bool {
        matches!(self, EngineError::Api { status: 403, .. })
    }
}

/// Errors surfaced by the registry store.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("registry request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("registry returned status {status}: {body}")]
    Endpoint { status: u16, body: String },

    #[error("malformed registry response: {0}")]
    Malformed(String),
}

/// Errors raised while decoding a delta payload.
#[derive(Debug, Error)]
pub enum DeltaError {
    #[error("invalid delta JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("no entry in the delta payload carries inserts")]
    NoInserts,
}
