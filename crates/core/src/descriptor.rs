//! Provider descriptors — the immutable boot-time view of configured
//! provider instances.
//!
//! A descriptor is built from persisted configuration during the module
//! registration phase and never mutated afterwards; request handling only
//! ever sees the engines that were registered from it.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Unique identifier for a configured provider instance (e.g. "eng-1").
///
/// One provider product can be configured several times with different
/// credentials or endpoints; each configuration row is its own instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct InstanceId(pub String);

impl InstanceId {
    pub fn from(s: &str) -> Self {
        Self(s.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for InstanceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A capability a provider instance can expose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Capability {
    Chat,
    Embedding,
    Vision,
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Chat => write!(f, "chat"),
            Self::Embedding => write!(f, "embedding"),
            Self::Vision => write!(f, "vision"),
        }
    }
}

/// The broad category of a provider instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// A model runner on this machine or LAN (Ollama-style native API).
    LocalRunner,
    /// A remote OpenAI-compatible API service.
    RemoteCompatible,
}

/// Connection settings for one provider instance.
#[derive(Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Base URL of the provider endpoint.
    pub endpoint: String,

    /// API key, if the provider requires one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Model id used for chat completions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chat_model: Option<String>,

    /// Model id used for embeddings.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding_model: Option<String>,
}

impl std::fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("endpoint", &self.endpoint)
            .field("api_key", if self.api_key.is_some() { &"[REDACTED]" } else { &"None" })
            .field("chat_model", &self.chat_model)
            .field("embedding_model", &self.embedding_model)
            .finish()
    }
}

/// Everything the registry needs to know about one configured provider
/// instance before any engine is constructed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderDescriptor {
    pub instance_id: InstanceId,
    pub kind: ProviderKind,
    pub capabilities: BTreeSet<Capability>,
    pub connection: ConnectionConfig,
}

impl ProviderDescriptor {
    pub fn has_capability(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor() -> ProviderDescriptor {
        ProviderDescriptor {
            instance_id: InstanceId::from("eng-1"),
            kind: ProviderKind::RemoteCompatible,
            capabilities: [Capability::Chat, Capability::Embedding].into_iter().collect(),
            connection: ConnectionConfig {
                endpoint: "https://api.example.com/v1".into(),
                api_key: Some("sk-secret".into()),
                chat_model: Some("gpt-4o".into()),
                embedding_model: None,
            },
        }
    }

    #[test]
    fn capability_lookup() {
        let d = descriptor();
        assert!(d.has_capability(Capability::Chat));
        assert!(d.has_capability(Capability::Embedding));
        assert!(!d.has_capability(Capability::Vision));
    }

    #[test]
    fn debug_redacts_api_key() {
        let d = descriptor();
        let debug = format!("{d:?}");
        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains("sk-secret"));
    }

    #[test]
    fn capability_serializes_lowercase() {
        let json = serde_json::to_string(&Capability::Embedding).unwrap();
        assert_eq!(json, r#""embedding""#);
    }
}
