//! Error types for the Brandloom domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant.

use thiserror::Error;

/// The top-level error type for all Brandloom operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Model errors ---
    #[error("Model error: {0}")]
    Model(#[from] ModelError),

    // --- Memory errors ---
    #[error("Memory error: {0}")]
    Memory(#[from] MemoryError),

    // --- Dispatch errors ---
    #[error("Dispatch error: {0}")]
    Dispatch(#[from] DispatchError),

    // --- Session errors ---
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum ModelError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Model not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Malformed model response: {0}")]
    MalformedResponse(String),
}

#[derive(Debug, Error)]
pub enum MemoryError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Unknown dispatch target: {0}")]
    UnknownTarget(String),

    #[error("Dispatch failed: {target} — {reason}")]
    Failed { target: String, reason: String },

    #[error("Dispatch timed out: {target} after {timeout_secs}s")]
    Timeout { target: String, timeout_secs: u64 },

    #[error("Invalid dispatch parameters: {0}")]
    InvalidParams(String),
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Unknown session: {0}")]
    UnknownSession(String),

    #[error("No chat bound to session {0}")]
    NoChatBound(String),
}
