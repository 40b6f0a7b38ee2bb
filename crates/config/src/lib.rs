//! Configuration loading, validation, and management for modelmux.
//!
//! Loads configuration from `~/.modelmux/config.toml` with environment
//! variable overrides. The loaded snapshot is immutable for the life of a
//! boot cycle; readiness evaluation reads it, never the other way around.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use modelmux_core::descriptor::{
    Capability, ConnectionConfig, InstanceId, ProviderDescriptor, ProviderKind,
};
use modelmux_core::AgentProfile;

/// The root configuration structure.
///
/// Maps directly to `~/.modelmux/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Fallback API key applied to provider instances without their own
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// The agent used when none is named
    #[serde(default = "default_agent")]
    pub default_agent: String,

    /// Instance id of the deployment-wide embedding provider.
    ///
    /// Cross-provider setting: document search and memory features embed
    /// through this instance regardless of which provider serves the chat.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding_instance: Option<String>,

    /// Configured provider instances
    #[serde(default)]
    pub providers: Vec<ProviderInstanceConfig>,

    /// Agent definitions, keyed by agent id
    #[serde(default)]
    pub agents: HashMap<String, AgentConfig>,

    /// History store configuration
    #[serde(default)]
    pub history: HistoryConfig,

    /// Orchestrator tuning
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
}

fn default_agent() -> String {
    "assistant".into()
}

/// Redact a secret for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_key", &redact(&self.api_key))
            .field("default_agent", &self.default_agent)
            .field("embedding_instance", &self.embedding_instance)
            .field("providers", &self.providers)
            .field("agents", &self.agents)
            .field("history", &self.history)
            .field("orchestrator", &self.orchestrator)
            .finish()
    }
}

/// One configured provider instance.
#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderInstanceConfig {
    /// Unique instance id (referenced by agents)
    pub id: String,

    /// "remote_compatible" or "local_runner"
    pub kind: ProviderKind,

    /// Base URL of the endpoint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chat_model: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding_model: Option<String>,

    /// Capabilities this instance declares
    #[serde(default = "default_capabilities")]
    pub capabilities: Vec<Capability>,
}

fn default_capabilities() -> Vec<Capability> {
    vec![Capability::Chat]
}

impl std::fmt::Debug for ProviderInstanceConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderInstanceConfig")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("endpoint", &self.endpoint)
            .field("api_key", &redact(&self.api_key))
            .field("chat_model", &self.chat_model)
            .field("embedding_model", &self.embedding_model)
            .field("capabilities", &self.capabilities)
            .finish()
    }
}

impl ProviderInstanceConfig {
    /// Build the immutable descriptor the registry works from.
    ///
    /// `fallback_api_key` is the top-level key applied when this instance
    /// has none of its own.
    pub fn to_descriptor(&self, fallback_api_key: Option<&str>) -> ProviderDescriptor {
        ProviderDescriptor {
            instance_id: InstanceId::from(&self.id),
            kind: self.kind,
            capabilities: self.capabilities.iter().copied().collect(),
            connection: ConnectionConfig {
                endpoint: self.endpoint.clone().unwrap_or_default(),
                api_key: self
                    .api_key
                    .clone()
                    .or_else(|| fallback_api_key.map(String::from)),
                chat_model: self.chat_model.clone(),
                embedding_model: self.embedding_model.clone(),
            },
        }
    }
}

/// An agent definition as written in the config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// The provider instance this agent talks to
    pub provider_instance_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,

    #[serde(default)]
    pub enabled_tools: Vec<String>,

    #[serde(default = "default_max_tool_rounds")]
    pub max_tool_rounds: u32,
}

fn default_temperature() -> f32 {
    modelmux_core::DEFAULT_TEMPERATURE
}
fn default_max_tool_rounds() -> u32 {
    modelmux_core::DEFAULT_MAX_TOOL_ROUNDS
}

/// History store selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConfig {
    /// "sqlite" or "memory"
    #[serde(default = "default_history_backend")]
    pub backend: String,

    /// SQLite database path (ignored for the memory backend)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

fn default_history_backend() -> String {
    "sqlite".into()
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            backend: default_history_backend(),
            path: None,
        }
    }
}

/// Orchestrator tuning knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Max attempts per engine call (1 = no retry)
    #[serde(default = "default_retry_attempts")]
    pub retry_max_attempts: u32,

    /// Base backoff delay in milliseconds (doubled per attempt)
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,

    /// Per-tool-call timeout in seconds
    #[serde(default = "default_tool_timeout_secs")]
    pub tool_timeout_secs: u64,
}

fn default_retry_attempts() -> u32 {
    3
}
fn default_retry_base_delay_ms() -> u64 {
    250
}
fn default_tool_timeout_secs() -> u64 {
    30
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            retry_max_attempts: default_retry_attempts(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            tool_timeout_secs: default_tool_timeout_secs(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.modelmux/config.toml).
    ///
    /// Environment overrides:
    /// - `MODELMUX_API_KEY` — fallback API key
    /// - `MODELMUX_AGENT` — default agent
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;

        if config.api_key.is_none() {
            config.api_key = std::env::var("MODELMUX_API_KEY").ok();
        }

        if let Ok(agent) = std::env::var("MODELMUX_AGENT") {
            config.default_agent = agent;
        }

        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".modelmux")
    }

    /// Validate the configuration snapshot.
    ///
    /// Only structural problems are rejected here; incomplete instances
    /// (missing keys, missing endpoints) are left for boot-time readiness
    /// evaluation, which excludes them without failing the load.
    fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = std::collections::HashSet::new();
        for provider in &self.providers {
            if !seen.insert(provider.id.as_str()) {
                return Err(ConfigError::ValidationError(format!(
                    "duplicate provider instance id '{}'",
                    provider.id
                )));
            }
            if provider.capabilities.is_empty() {
                return Err(ConfigError::ValidationError(format!(
                    "provider instance '{}' declares no capabilities",
                    provider.id
                )));
            }
        }

        for (id, agent) in &self.agents {
            if agent.temperature < 0.0 || agent.temperature > 2.0 {
                return Err(ConfigError::ValidationError(format!(
                    "agent '{id}': temperature must be between 0.0 and 2.0"
                )));
            }
        }

        Ok(())
    }

    /// Find a provider instance config by id.
    pub fn provider(&self, id: &str) -> Option<&ProviderInstanceConfig> {
        self.providers.iter().find(|p| p.id == id)
    }

    /// Build the agent profile for the given agent id.
    pub fn agent_profile(&self, id: &str) -> Option<AgentProfile> {
        self.agents.get(id).map(|a| AgentProfile {
            id: id.to_string(),
            provider_instance_id: InstanceId::from(&a.provider_instance_id),
            model: a.model.clone(),
            temperature: a.temperature,
            max_tokens: a.max_tokens,
            system_prompt: a.system_prompt.clone(),
            enabled_tools: a.enabled_tools.clone(),
            max_tool_rounds: a.max_tool_rounds,
        })
    }

    /// Generate a default config TOML string (for first-run setup).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            default_agent: default_agent(),
            embedding_instance: None,
            providers: Vec::new(),
            agents: HashMap::new(),
            history: HistoryConfig::default(),
            orchestrator: OrchestratorConfig::default(),
        }
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
