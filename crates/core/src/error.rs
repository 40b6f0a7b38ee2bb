//! Error types for the modelmux domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant; the propagation policy is:
//! boot-time configuration problems are aggregated into the boot report,
//! per-turn errors are returned to the caller with enough structure to tell
//! "fix your configuration" from "try again" from "the model misbehaved".

use thiserror::Error;

use crate::descriptor::{Capability, InstanceId};

/// The top-level error type for all modelmux operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Registry / boot errors ---
    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    // --- Keyed resolution errors ---
    #[error("Resolution error: {0}")]
    Resolution(#[from] ResolutionError),

    // --- Engine errors ---
    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    // --- Tool errors ---
    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    // --- History store errors ---
    #[error("History error: {0}")]
    History(#[from] HistoryError),

    // --- Tool-calling round cap ---
    #[error("Tool loop exceeded {rounds} rounds for session {session_id}")]
    LoopLimit { session_id: String, rounds: u32 },

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

/// Startup faults raised while populating the engine catalog.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Duplicate registration for {capability} engine '{instance_id}'")]
    DuplicateRegistration {
        capability: Capability,
        instance_id: InstanceId,
    },

    #[error("Module '{module}' failed to register: {reason}")]
    ModuleFailed { module: String, reason: String },
}

/// A requested (capability, instance) key could not be resolved.
///
/// One error kind covers both "configured but skipped at boot" and
/// "unknown instance id"; the detail string tells the two apart.
#[derive(Debug, Clone, Error)]
pub enum ResolutionError {
    #[error("No {capability} engine registered for '{instance_id}': {detail}")]
    NotRegistered {
        capability: Capability,
        instance_id: InstanceId,
        detail: String,
    },
}

/// Errors from a provider engine call.
#[derive(Debug, Clone, Error)]
pub enum EngineError {
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Malformed provider response: {0}")]
    MalformedResponse(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Stream interrupted: {0}")]
    StreamInterrupted(String),

    #[error("Not supported by engine: {0}")]
    NotSupported(String),
}

impl EngineError {
    /// Whether a bounded retry with backoff is worth attempting.
    ///
    /// Auth failures, malformed responses, and 4xx-style API errors are
    /// permanent; network hiccups, timeouts, and rate limits are not.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Network(_) | Self::Timeout(_) | Self::RateLimited { .. }
        )
    }
}

/// Errors from a single tool invocation.
#[derive(Debug, Clone, Error)]
pub enum ToolError {
    #[error("Tool not available: {0}")]
    NotAvailable(String),

    #[error("Tool execution failed: {tool_name} — {reason}")]
    ExecutionFailed { tool_name: String, reason: String },

    #[error("Tool timed out: {tool_name} after {timeout_secs}s")]
    Timeout { tool_name: String, timeout_secs: u64 },

    #[error("Invalid tool arguments: {0}")]
    InvalidArguments(String),
}

/// Errors from the chat history store.
#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}
