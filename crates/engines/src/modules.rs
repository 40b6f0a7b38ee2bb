//! Feature modules contributed by this crate.
//!
//! Each module owns one provider family: it validates its slice of the
//! configuration during the sequential registration phase and constructs
//! engines for the instances that pass. Validation failures degrade the
//! single instance; only deployment-wide settings gate the whole boot.

use std::sync::Arc;

use tracing::{debug, warn};

use modelmux_config::AppConfig;
use modelmux_core::descriptor::{Capability, ProviderDescriptor, ProviderKind};
use modelmux_core::error::RegistryError;
use modelmux_registry::{EngineSet, ProviderModule, ReadinessTracker};

use crate::local_runner::{LocalRunnerEngine, DEFAULT_LOCAL_ENDPOINT};
use crate::openai_compat::RemoteCompatibleEngine;

/// Module for remote OpenAI-compatible provider instances.
///
/// An instance is not ready without an endpoint and an API key (its own or
/// the top-level fallback). Neither failure blocks the rest of the boot.
pub struct RemoteProviderModule;

impl ProviderModule for RemoteProviderModule {
    fn name(&self) -> &str {
        "remote_compatible"
    }

    fn configure(
        &self,
        config: &AppConfig,
        readiness: &mut ReadinessTracker,
    ) -> Result<Vec<ProviderDescriptor>, RegistryError> {
        let mut descriptors = Vec::new();

        for instance in config
            .providers
            .iter()
            .filter(|p| p.kind == ProviderKind::RemoteCompatible)
        {
            let descriptor = instance.to_descriptor(config.api_key.as_deref());
            let id = descriptor.instance_id.clone();

            if descriptor.connection.endpoint.is_empty() {
                warn!(instance = %id, "Remote instance has no endpoint");
                readiness.mark_instance_not_ready(id.clone());
            } else if descriptor.connection.api_key.is_none() {
                warn!(instance = %id, "Remote instance has no API key and no fallback key is set");
                readiness.mark_instance_not_ready(id.clone());
            } else {
                validate_models(&descriptor, readiness);
            }

            descriptors.push(descriptor);
        }

        debug!(count = descriptors.len(), "Remote module configured");
        Ok(descriptors)
    }

    fn build(&self, descriptor: &ProviderDescriptor) -> Result<EngineSet, RegistryError> {
        let api_key = descriptor
            .connection
            .api_key
            .clone()
            .ok_or_else(|| RegistryError::ModuleFailed {
                module: "remote_compatible".into(),
                reason: format!(
                    "instance '{}' reached build without an API key",
                    descriptor.instance_id
                ),
            })?;

        let engine = Arc::new(RemoteCompatibleEngine::new(
            descriptor.instance_id.as_str(),
            &descriptor.connection.endpoint,
            api_key,
        ));

        Ok(EngineSet {
            chat: descriptor
                .has_capability(Capability::Chat)
                .then(|| engine.clone() as _),
            embedding: descriptor
                .has_capability(Capability::Embedding)
                .then(|| engine as _),
        })
    }
}

/// Module for local runner instances (Ollama-native API).
///
/// Local runners need no API key. A missing endpoint falls back to the
/// default localhost address rather than degrading the instance.
pub struct LocalRunnerModule;

impl ProviderModule for LocalRunnerModule {
    fn name(&self) -> &str {
        "local_runner"
    }

    fn configure(
        &self,
        config: &AppConfig,
        readiness: &mut ReadinessTracker,
    ) -> Result<Vec<ProviderDescriptor>, RegistryError> {
        let mut descriptors = Vec::new();

        for instance in config
            .providers
            .iter()
            .filter(|p| p.kind == ProviderKind::LocalRunner)
        {
            let mut descriptor = instance.to_descriptor(None);
            if descriptor.connection.endpoint.is_empty() {
                descriptor.connection.endpoint = DEFAULT_LOCAL_ENDPOINT.into();
            }

            validate_models(&descriptor, readiness);
            descriptors.push(descriptor);
        }

        debug!(count = descriptors.len(), "Local runner module configured");
        Ok(descriptors)
    }

    fn build(&self, descriptor: &ProviderDescriptor) -> Result<EngineSet, RegistryError> {
        let engine = Arc::new(LocalRunnerEngine::new(
            descriptor.instance_id.as_str(),
            &descriptor.connection.endpoint,
        ));

        Ok(EngineSet {
            chat: descriptor
                .has_capability(Capability::Chat)
                .then(|| engine.clone() as _),
            embedding: descriptor
                .has_capability(Capability::Embedding)
                .then(|| engine as _),
        })
    }
}

/// Check model settings against declared capabilities.
///
/// Chat (and vision, which rides on chat) needs a `chat_model`; embedding
/// needs an `embedding_model`.
fn validate_models(descriptor: &ProviderDescriptor, readiness: &mut ReadinessTracker) {
    let id = &descriptor.instance_id;

    if descriptor.has_capability(Capability::Chat) && descriptor.connection.chat_model.is_none() {
        warn!(instance = %id, "Instance declares chat but sets no chat_model");
        readiness.mark_instance_not_ready(id.clone());
    } else if descriptor.has_capability(Capability::Embedding)
        && descriptor.connection.embedding_model.is_none()
    {
        warn!(instance = %id, "Instance declares embedding but sets no embedding_model");
        readiness.mark_instance_not_ready(id.clone());
    }
}

/// Module for the deployment-wide shared embedding setting.
///
/// Contributes no instances of its own. Its job is to validate that
/// `embedding_instance`, when set, points at a configured provider that
/// declares the embedding capability. A dangling reference is a
/// deployment-wide misconfiguration: it reports missing configuration,
/// which closes the global gate and empties the catalog.
pub struct SharedEmbeddingModule;

impl ProviderModule for SharedEmbeddingModule {
    fn name(&self) -> &str {
        "shared_embedding"
    }

    fn configure(
        &self,
        config: &AppConfig,
        readiness: &mut ReadinessTracker,
    ) -> Result<Vec<ProviderDescriptor>, RegistryError> {
        if let Some(instance_id) = &config.embedding_instance {
            match config.provider(instance_id) {
                None => {
                    readiness.report_missing_configuration(format!(
                        "embedding_instance '{instance_id}' does not match any configured provider"
                    ));
                }
                Some(instance) if !instance.capabilities.contains(&Capability::Embedding) => {
                    readiness.report_missing_configuration(format!(
                        "embedding_instance '{instance_id}' does not declare the embedding capability"
                    ));
                }
                Some(_) => {
                    debug!(instance = %instance_id, "Shared embedding instance validated");
                }
            }
        }

        Ok(Vec::new())
    }

    fn build(&self, descriptor: &ProviderDescriptor) -> Result<EngineSet, RegistryError> {
        // Declares no instances, so this is never reached
        Err(RegistryError::ModuleFailed {
            module: "shared_embedding".into(),
            reason: format!(
                "unexpected build request for instance '{}'",
                descriptor.instance_id
            ),
        })
    }
}

/// The standard module manifest, in registration order.
pub fn standard_modules() -> Vec<Box<dyn ProviderModule>> {
    vec![
        Box::new(RemoteProviderModule),
        Box::new(LocalRunnerModule),
        Box::new(SharedEmbeddingModule),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use modelmux_config::ProviderInstanceConfig;
    use modelmux_core::InstanceId;

    fn remote_instance(id: &str, api_key: Option<&str>) -> ProviderInstanceConfig {
        ProviderInstanceConfig {
            id: id.into(),
            kind: ProviderKind::RemoteCompatible,
            endpoint: Some("https://api.example.com/v1".into()),
            api_key: api_key.map(String::from),
            chat_model: Some("gpt-4o".into()),
            embedding_model: None,
            capabilities: vec![Capability::Chat],
        }
    }

    fn config_with(providers: Vec<ProviderInstanceConfig>) -> AppConfig {
        AppConfig {
            api_key: None,
            default_agent: "assistant".into(),
            embedding_instance: None,
            providers,
            agents: Default::default(),
            history: Default::default(),
            orchestrator: Default::default(),
        }
    }

    #[test]
    fn remote_instance_without_key_is_marked_not_ready() {
        let config = config_with(vec![
            remote_instance("eng-1", Some("sk-test")),
            remote_instance("eng-2", None),
        ]);

        let mut readiness = ReadinessTracker::new();
        let descriptors = RemoteProviderModule
            .configure(&config, &mut readiness)
            .unwrap();

        // Both are declared, only eng-2 is degraded
        assert_eq!(descriptors.len(), 2);
        assert!(readiness.is_instance_ready(&InstanceId::from("eng-1")));
        assert!(!readiness.is_instance_ready(&InstanceId::from("eng-2")));
        assert!(readiness.is_ready_at_boot());
    }

    #[test]
    fn fallback_api_key_rescues_keyless_instance() {
        let mut config = config_with(vec![remote_instance("eng-2", None)]);
        config.api_key = Some("sk-fallback".into());

        let mut readiness = ReadinessTracker::new();
        RemoteProviderModule
            .configure(&config, &mut readiness)
            .unwrap();

        assert!(readiness.is_instance_ready(&InstanceId::from("eng-2")));
    }

    #[test]
    fn local_instance_defaults_endpoint() {
        let config = config_with(vec![ProviderInstanceConfig {
            id: "local-1".into(),
            kind: ProviderKind::LocalRunner,
            endpoint: None,
            api_key: None,
            chat_model: Some("llama3.2".into()),
            embedding_model: None,
            capabilities: vec![Capability::Chat],
        }]);

        let mut readiness = ReadinessTracker::new();
        let descriptors = LocalRunnerModule
            .configure(&config, &mut readiness)
            .unwrap();

        assert_eq!(descriptors[0].connection.endpoint, DEFAULT_LOCAL_ENDPOINT);
        assert!(readiness.is_instance_ready(&InstanceId::from("local-1")));
    }

    #[test]
    fn missing_chat_model_degrades_instance() {
        let config = config_with(vec![ProviderInstanceConfig {
            id: "local-1".into(),
            kind: ProviderKind::LocalRunner,
            endpoint: None,
            api_key: None,
            chat_model: None,
            embedding_model: None,
            capabilities: vec![Capability::Chat],
        }]);

        let mut readiness = ReadinessTracker::new();
        LocalRunnerModule
            .configure(&config, &mut readiness)
            .unwrap();

        assert!(!readiness.is_instance_ready(&InstanceId::from("local-1")));
        assert!(readiness.is_ready_at_boot());
    }

    #[test]
    fn dangling_embedding_instance_closes_global_gate() {
        let mut config = config_with(vec![remote_instance("eng-1", Some("sk-test"))]);
        config.embedding_instance = Some("no-such-instance".into());

        let mut readiness = ReadinessTracker::new();
        SharedEmbeddingModule
            .configure(&config, &mut readiness)
            .unwrap();

        assert!(!readiness.is_ready_at_boot());
    }

    #[test]
    fn embedding_instance_without_capability_closes_global_gate() {
        let mut config = config_with(vec![remote_instance("eng-1", Some("sk-test"))]);
        config.embedding_instance = Some("eng-1".into());

        let mut readiness = ReadinessTracker::new();
        SharedEmbeddingModule
            .configure(&config, &mut readiness)
            .unwrap();

        assert!(!readiness.is_ready_at_boot());
    }

    #[test]
    fn valid_embedding_instance_passes() {
        let mut instance = remote_instance("eng-1", Some("sk-test"));
        instance.capabilities.push(Capability::Embedding);
        instance.embedding_model = Some("text-embedding-3-small".into());
        let mut config = config_with(vec![instance]);
        config.embedding_instance = Some("eng-1".into());

        let mut readiness = ReadinessTracker::new();
        SharedEmbeddingModule
            .configure(&config, &mut readiness)
            .unwrap();

        assert!(readiness.is_ready_at_boot());
    }

    #[test]
    fn build_produces_handles_per_capability() {
        let mut instance = remote_instance("eng-1", Some("sk-test"));
        instance.capabilities.push(Capability::Embedding);
        instance.embedding_model = Some("text-embedding-3-small".into());

        let descriptor = instance.to_descriptor(None);
        let engines = RemoteProviderModule.build(&descriptor).unwrap();

        assert!(engines.chat.is_some());
        assert!(engines.embedding.is_some());
    }
}
