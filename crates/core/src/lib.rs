//! # modelmux core
//!
//! Domain types, traits, and error definitions for the modelmux inference
//! router. This crate has **zero framework dependencies** — it defines the
//! domain model that all other crates implement against.
//!
//! ## Design Philosophy
//!
//! Every subsystem is defined as a trait here. Implementations live in their
//! respective crates. This enables:
//! - Swapping engine implementations via configuration
//! - Easy testing with mock/stub implementations
//! - Clean dependency graph (all crates depend inward on core)

pub mod agent;
pub mod conversation;
pub mod descriptor;
pub mod engine;
pub mod error;
pub mod history;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use agent::{AgentProfile, DEFAULT_MAX_TOOL_ROUNDS, DEFAULT_TEMPERATURE};
pub use conversation::{ConversationState, Role, SessionId, Turn};
pub use descriptor::{Capability, ConnectionConfig, InstanceId, ProviderDescriptor, ProviderKind};
pub use engine::{
    ChatEngine, ChatRequest, ChatResponse, EmbeddingEngine, EmbeddingRequest, EmbeddingResponse,
    StreamFragment, ToolDefinition, Usage,
};
pub use error::{
    EngineError, Error, HistoryError, RegistryError, ResolutionError, Result, ToolError,
};
pub use history::HistoryStore;
pub use tool::{Tool, ToolCallRequest, ToolCallResult, ToolCatalog};
