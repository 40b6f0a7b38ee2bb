//! The feature module contract.
//!
//! A module is one optional feature unit (a provider family, typically) that
//! declares provider instances from configuration and knows how to construct
//! their engines. Modules are supplied to the boot sequence as an explicit,
//! ordered manifest; there is no runtime type scanning.

use std::sync::Arc;

use modelmux_config::AppConfig;
use modelmux_core::engine::{ChatEngine, EmbeddingEngine};
use modelmux_core::error::RegistryError;
use modelmux_core::ProviderDescriptor;

use crate::readiness::ReadinessTracker;

/// The engines one provider instance exposes, by capability family.
///
/// Chat and vision share the chat handle; an instance declaring the vision
/// capability gets its chat engine registered under both keys.
#[derive(Default)]
pub struct EngineSet {
    pub chat: Option<Arc<dyn ChatEngine>>,
    pub embedding: Option<Arc<dyn EmbeddingEngine>>,
}

/// One feature module.
///
/// `configure` runs during the sequential registration phase and is the only
/// window in which a module may report readiness problems. `build` runs
/// after the global gate, once per ready instance.
pub trait ProviderModule: Send + Sync {
    /// Module name, for logs and the boot report.
    fn name(&self) -> &str;

    /// Read configuration, report any missing settings or invalid instances
    /// into the tracker, and declare the provider instances this module
    /// contributes. Declaring an instance it also marked not-ready is fine;
    /// the boot sequence skips it.
    fn configure(
        &self,
        config: &AppConfig,
        readiness: &mut ReadinessTracker,
    ) -> Result<Vec<ProviderDescriptor>, RegistryError>;

    /// Construct the connection client and engines for one declared
    /// instance. Only called for instances that passed readiness.
    fn build(&self, descriptor: &ProviderDescriptor) -> Result<EngineSet, RegistryError>;
}
