//! The keyed engine catalog — (capability, instance id) → engine handle.
//!
//! Populated once during boot through [`CatalogBuilder`] (write-once keys,
//! duplicate registration is a startup fault), then frozen into an immutable
//! [`EngineCatalog`] shared by every request-handling task. Resolution is a
//! pure lookup with no side effects.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use modelmux_core::engine::{ChatEngine, EmbeddingEngine};
use modelmux_core::error::{RegistryError, ResolutionError};
use modelmux_core::{Capability, InstanceId};
use tracing::info;

/// An engine handle registered under one capability key.
#[derive(Debug, Clone)]
pub enum EngineHandle {
    Chat(Arc<dyn ChatEngine>),
    Embedding(Arc<dyn EmbeddingEngine>),
}

/// Write-once builder for the engine catalog. Used only during boot.
#[derive(Default)]
pub struct CatalogBuilder {
    engines: HashMap<(Capability, InstanceId), EngineHandle>,
    skipped: HashSet<InstanceId>,
}

impl CatalogBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an engine under (capability, instance id).
    ///
    /// Registering the same key twice is a startup fault, not a runtime
    /// error: the boot sequence aborts rather than shadowing an engine.
    pub fn register(
        &mut self,
        capability: Capability,
        instance_id: InstanceId,
        handle: EngineHandle,
    ) -> Result<(), RegistryError> {
        let key = (capability, instance_id.clone());
        if self.engines.contains_key(&key) {
            return Err(RegistryError::DuplicateRegistration {
                capability,
                instance_id,
            });
        }
        info!(capability = %capability, instance = %instance_id, "Registered engine");
        self.engines.insert(key, handle);
        Ok(())
    }

    /// Record an instance that was configured but excluded at boot, so later
    /// resolution failures can say why.
    pub fn mark_skipped(&mut self, instance_id: InstanceId) {
        self.skipped.insert(instance_id);
    }

    /// Freeze into the immutable catalog.
    pub fn build(self) -> EngineCatalog {
        EngineCatalog {
            engines: self.engines,
            skipped: self.skipped,
        }
    }
}

/// The immutable post-boot lookup table.
///
/// Safe for unbounded concurrent readers; nothing mutates it after boot.
#[derive(Debug)]
pub struct EngineCatalog {
    engines: HashMap<(Capability, InstanceId), EngineHandle>,
    skipped: HashSet<InstanceId>,
}

impl EngineCatalog {
    /// An empty catalog (what a not-ready boot produces).
    pub fn empty() -> Self {
        CatalogBuilder::new().build()
    }

    fn not_registered(
        &self,
        capability: Capability,
        instance_id: &InstanceId,
    ) -> ResolutionError {
        let detail = if self.skipped.contains(instance_id) {
            "instance is configured but was not ready at boot".to_string()
        } else {
            "instance id is unknown to this deployment".to_string()
        };
        ResolutionError::NotRegistered {
            capability,
            instance_id: instance_id.clone(),
            detail,
        }
    }

    fn resolve_chat_key(
        &self,
        capability: Capability,
        instance_id: &InstanceId,
    ) -> Result<Arc<dyn ChatEngine>, ResolutionError> {
        match self.engines.get(&(capability, instance_id.clone())) {
            Some(EngineHandle::Chat(engine)) => Ok(engine.clone()),
            _ => Err(self.not_registered(capability, instance_id)),
        }
    }

    /// Resolve the chat engine for a provider instance.
    pub fn resolve_chat(
        &self,
        instance_id: &InstanceId,
    ) -> Result<Arc<dyn ChatEngine>, ResolutionError> {
        self.resolve_chat_key(Capability::Chat, instance_id)
    }

    /// Resolve the vision-capable chat engine for a provider instance.
    pub fn resolve_vision(
        &self,
        instance_id: &InstanceId,
    ) -> Result<Arc<dyn ChatEngine>, ResolutionError> {
        self.resolve_chat_key(Capability::Vision, instance_id)
    }

    /// Resolve the embedding engine for a provider instance.
    pub fn resolve_embedding(
        &self,
        instance_id: &InstanceId,
    ) -> Result<Arc<dyn EmbeddingEngine>, ResolutionError> {
        match self
            .engines
            .get(&(Capability::Embedding, instance_id.clone()))
        {
            Some(EngineHandle::Embedding(engine)) => Ok(engine.clone()),
            _ => Err(self.not_registered(Capability::Embedding, instance_id)),
        }
    }

    /// All registered (capability, instance) keys, for status output.
    pub fn registered_keys(&self) -> Vec<(Capability, InstanceId)> {
        let mut keys: Vec<_> = self.engines.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Instances that were configured but excluded at boot.
    pub fn skipped_instances(&self) -> Vec<InstanceId> {
        let mut ids: Vec<_> = self.skipped.iter().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.engines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.engines.is_empty()
    }
}
