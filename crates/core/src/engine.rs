//! Engine traits — the per-capability contracts over inference backends.
//!
//! A ChatEngine knows how to send a conversation to a model and get a
//! response back, either complete or as an ordered stream of fragments.
//! An EmbeddingEngine turns texts into vectors. Implementations live in
//! `modelmux-engines`; the orchestrator only ever sees these traits via
//! the keyed catalog.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::conversation::Turn;
use crate::error::EngineError;
use crate::tool::ToolCallRequest;

/// A provider-agnostic chat completion request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    /// The model to use (e.g. "gpt-4o", "llama3.1")
    pub model: String,

    /// The conversation turns, oldest first
    pub turns: Vec<Turn>,

    /// Temperature (0.0 = deterministic)
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Maximum tokens to generate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Tools the model may call
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolDefinition>,
}

fn default_temperature() -> f32 {
    crate::agent::DEFAULT_TEMPERATURE
}

/// A tool definition sent to the model so it knows what it can call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    /// JSON Schema describing the tool's parameters
    pub parameters: serde_json::Value,
}

/// A complete (non-streaming) chat response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    /// The generated assistant turn (may carry tool call requests)
    pub turn: Turn,

    /// Token usage statistics
    pub usage: Option<Usage>,

    /// Which model actually responded
    pub model: String,
}

/// Token usage counters.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

impl Usage {
    /// Fold another usage record into this one (per-turn totals).
    pub fn accumulate(&mut self, other: &Usage) {
        self.prompt_tokens += other.prompt_tokens;
        self.completion_tokens += other.completion_tokens;
        self.total_tokens += other.total_tokens;
    }
}

/// One fragment of a streaming response.
///
/// Fragments arrive strictly in generation order; the terminal fragment has
/// `done == true` and carries the usage counters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamFragment {
    /// Partial content delta
    #[serde(default)]
    pub content: Option<String>,

    /// Tool call requests (complete, delivered on the terminal fragment)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCallRequest>,

    /// Whether this is the terminal fragment
    #[serde(default)]
    pub done: bool,

    /// Usage counters (terminal fragment only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

/// An embedding request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingRequest {
    /// The embedding model id
    pub model: String,

    /// The texts to embed
    pub inputs: Vec<String>,
}

/// An embedding response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingResponse {
    /// One vector per input text
    pub embeddings: Vec<Vec<f32>>,

    /// Which model was used
    pub model: String,

    /// Token usage
    pub usage: Option<Usage>,
}

/// The chat capability contract.
///
/// Every backend (OpenAI-compatible remote, local runner) implements this.
/// The orchestrator calls `complete()` or `complete_streaming()` without
/// knowing which provider instance is behind the handle.
#[async_trait]
pub trait ChatEngine: std::fmt::Debug + Send + Sync {
    /// Human-readable provider name (e.g. "openai-compat", "local-runner").
    fn provider_name(&self) -> &str;

    /// Send a request and get a complete response.
    async fn complete(
        &self,
        request: ChatRequest,
    ) -> std::result::Result<ChatResponse, EngineError>;

    /// Send a request and get an ordered, finite stream of fragments.
    ///
    /// Default implementation calls `complete()` and wraps the result as a
    /// single terminal fragment.
    async fn complete_streaming(
        &self,
        request: ChatRequest,
    ) -> std::result::Result<
        tokio::sync::mpsc::Receiver<std::result::Result<StreamFragment, EngineError>>,
        EngineError,
    > {
        let response = self.complete(request).await?;
        let (tx, rx) = tokio::sync::mpsc::channel(1);
        let _ = tx
            .send(Ok(StreamFragment {
                content: Some(response.turn.content.clone()),
                tool_calls: response.turn.tool_calls.clone(),
                done: true,
                usage: response.usage,
            }))
            .await;
        Ok(rx)
    }

    /// List models available behind this engine.
    async fn list_models(&self) -> std::result::Result<Vec<String>, EngineError> {
        Ok(Vec::new())
    }

    /// Health check — can we reach the provider?
    async fn health_check(&self) -> std::result::Result<bool, EngineError> {
        Ok(true)
    }
}

/// The embedding capability contract.
#[async_trait]
pub trait EmbeddingEngine: std::fmt::Debug + Send + Sync {
    /// Human-readable provider name.
    fn provider_name(&self) -> &str;

    /// Generate embeddings for the given texts.
    async fn embed(
        &self,
        request: EmbeddingRequest,
    ) -> std::result::Result<EmbeddingResponse, EngineError>;
}
