//! Agent profiles — per-agent parameters applied when building a request.

use serde::{Deserialize, Serialize};

use crate::descriptor::InstanceId;

/// Sampling temperature applied when neither the agent nor the request
/// specifies one.
pub const DEFAULT_TEMPERATURE: f32 = 0.7;

/// Tool-calling rounds allowed per turn unless the agent overrides it.
pub const DEFAULT_MAX_TOOL_ROUNDS: u32 = 8;

/// The configuration of one agent: which provider instance it talks to and
/// how its requests are shaped.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentProfile {
    /// Unique agent id
    pub id: String,

    /// The provider instance this agent is bound to
    pub provider_instance_id: InstanceId,

    /// Model id (overrides the instance's configured chat model when set)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// Sampling temperature
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Max tokens per model response
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Persona system prompt prepended to every turn
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,

    /// Names of tools this agent may use
    #[serde(default)]
    pub enabled_tools: Vec<String>,

    /// Maximum tool-calling rounds per turn (infinite-loop guard)
    #[serde(default = "default_max_tool_rounds")]
    pub max_tool_rounds: u32,
}

fn default_temperature() -> f32 {
    DEFAULT_TEMPERATURE
}

fn default_max_tool_rounds() -> u32 {
    DEFAULT_MAX_TOOL_ROUNDS
}

impl AgentProfile {
    /// A minimal profile bound to a provider instance, with defaults.
    pub fn new(id: impl Into<String>, provider_instance_id: InstanceId) -> Self {
        Self {
            id: id.into(),
            provider_instance_id,
            model: None,
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: None,
            system_prompt: None,
            enabled_tools: Vec::new(),
            max_tool_rounds: DEFAULT_MAX_TOOL_ROUNDS,
        }
    }
}
