//! Error types for engine operations.

use thiserror::Error;

/// Errors produced by the batching engine and its collaborators.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The interrogator failed while processing one item.
    #[error("worker failure: {0}")]
    Worker(String),
    /// The requested model is not loaded or not known to the interrogator.
    #[error("model unavailable: {0}")]
    ModelUnavailable(String),
    /// The engine dropped the reply channel before the item resolved.
    #[error("engine shut down before the item completed")]
    Shutdown,
    /// Backend-specific failure with context.
    #[error("backend error: {0}")]
    Backend(String),
}

/// Application-facing result using anyhow for higher-level contexts.
pub type AppResult<T> = Result<T, anyhow::Error>;
