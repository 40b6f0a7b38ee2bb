//! The boot sequence: module configuration → readiness gate → registration.
//!
//! Strictly sequential and single-threaded so the readiness gate is
//! deterministic. Produces the immutable [`EngineCatalog`] plus a
//! [`BootReport`] for operators.

use modelmux_config::AppConfig;
use modelmux_core::error::RegistryError;
use modelmux_core::{Capability, InstanceId, ProviderDescriptor};
use tracing::{info, warn};

use crate::catalog::{CatalogBuilder, EngineCatalog, EngineHandle};
use crate::module::ProviderModule;
use crate::readiness::ReadinessTracker;

/// Boot-time summary exposed to operators.
#[derive(Debug, Clone)]
pub struct BootReport {
    /// Whether the system passed the global readiness gate
    pub ready_at_boot: bool,

    /// Missing-configuration reasons, in reporting order
    pub missing_config: Vec<String>,

    /// Keys that were registered
    pub registered: Vec<(Capability, InstanceId)>,

    /// Instances excluded by per-instance readiness
    pub skipped: Vec<InstanceId>,

    /// Modules whose registration failed (isolated, others proceeded)
    pub failed_modules: Vec<String>,
}

impl BootReport {
    /// Human-readable multi-line summary.
    pub fn summary(&self) -> String {
        let mut out = String::new();
        if self.ready_at_boot {
            out.push_str("ready: yes\n");
        } else {
            out.push_str("ready: NO — all provider registration skipped\n");
            for reason in &self.missing_config {
                out.push_str(&format!("  missing: {reason}\n"));
            }
        }
        for (capability, instance) in &self.registered {
            out.push_str(&format!("  registered: {capability} @ {instance}\n"));
        }
        for instance in &self.skipped {
            out.push_str(&format!("  skipped (not ready): {instance}\n"));
        }
        for module in &self.failed_modules {
            out.push_str(&format!("  module failed: {module}\n"));
        }
        out
    }
}

/// Run the boot sequence over an explicit, ordered module manifest.
///
/// Phase 1 invokes every module's `configure`, collecting declared instances;
/// a failing module is logged and contributes nothing, without blocking the
/// others. Phase 2 is the global fail-closed gate: any missing-configuration
/// reason means nothing at all is registered. Phase 3 builds engines for the
/// instances that passed per-instance readiness.
///
/// The only fatal error is a duplicate (capability, instance) registration,
/// which is a startup fault.
pub fn boot(
    config: &AppConfig,
    modules: &[Box<dyn ProviderModule>],
) -> Result<(EngineCatalog, BootReport), RegistryError> {
    let mut readiness = ReadinessTracker::new();
    let mut declared: Vec<(usize, Vec<ProviderDescriptor>)> = Vec::new();
    let mut failed_modules = Vec::new();

    // Phase 1: sequential module configuration. This is the only window in
    // which readiness state may change.
    for (index, module) in modules.iter().enumerate() {
        match module.configure(config, &mut readiness) {
            Ok(descriptors) => {
                info!(
                    module = module.name(),
                    instances = descriptors.len(),
                    "Module configured"
                );
                declared.push((index, descriptors));
            }
            Err(e) => {
                warn!(module = module.name(), error = %e, "Module configuration failed, continuing with others");
                failed_modules.push(module.name().to_string());
            }
        }
    }

    let readiness = readiness.freeze();
    let mut builder = CatalogBuilder::new();

    // Phase 2: global fail-closed gate. An incompletely configured system
    // refuses to expose any provider rather than a degraded subset.
    if !readiness.is_ready_at_boot() {
        warn!(
            reasons = readiness.missing_config.len(),
            "System not ready at boot; skipping all provider registration"
        );
        let report = BootReport {
            ready_at_boot: false,
            missing_config: readiness.missing_config.clone(),
            registered: Vec::new(),
            skipped: Vec::new(),
            failed_modules,
        };
        return Ok((builder.build(), report));
    }

    // Phase 3: per-instance registration.
    for (index, descriptors) in declared {
        let module = &modules[index];
        for descriptor in descriptors {
            if !readiness.is_instance_ready(&descriptor.instance_id) {
                info!(
                    module = module.name(),
                    instance = %descriptor.instance_id,
                    "Skipping instance that failed readiness"
                );
                builder.mark_skipped(descriptor.instance_id.clone());
                continue;
            }

            let engines = match module.build(&descriptor) {
                Ok(engines) => engines,
                Err(e) => {
                    // Abort this module's remaining contribution only.
                    warn!(module = module.name(), instance = %descriptor.instance_id, error = %e, "Engine construction failed, aborting module contribution");
                    failed_modules.push(module.name().to_string());
                    break;
                }
            };

            register_instance(&mut builder, &descriptor, engines, module.name())?;
        }
    }

    let catalog = builder.build();
    let report = BootReport {
        ready_at_boot: true,
        missing_config: Vec::new(),
        registered: catalog.registered_keys(),
        skipped: catalog.skipped_instances(),
        failed_modules,
    };
    Ok((catalog, report))
}

/// Register one instance's engines under each declared capability.
fn register_instance(
    builder: &mut CatalogBuilder,
    descriptor: &ProviderDescriptor,
    engines: crate::module::EngineSet,
    module_name: &str,
) -> Result<(), RegistryError> {
    for capability in &descriptor.capabilities {
        let handle = match capability {
            Capability::Chat | Capability::Vision => {
                engines.chat.clone().map(EngineHandle::Chat)
            }
            Capability::Embedding => engines.embedding.clone().map(EngineHandle::Embedding),
        };

        match handle {
            Some(handle) => {
                builder.register(*capability, descriptor.instance_id.clone(), handle)?;
            }
            None => {
                warn!(
                    module = module_name,
                    instance = %descriptor.instance_id,
                    capability = %capability,
                    "Declared capability has no engine, skipping key"
                );
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::EngineSet;
    use async_trait::async_trait;
    use modelmux_core::descriptor::{ConnectionConfig, ProviderKind};
    use modelmux_core::engine::{ChatEngine, ChatRequest, ChatResponse};
    use modelmux_core::error::EngineError;
    use modelmux_core::Turn;
    use std::sync::Arc;

    #[derive(Debug)]
    struct StubEngine;

    #[async_trait]
    impl ChatEngine for StubEngine {
        fn provider_name(&self) -> &str {
            "stub"
        }

        async fn complete(
            &self,
            _request: ChatRequest,
        ) -> Result<ChatResponse, EngineError> {
            Ok(ChatResponse {
                turn: Turn::assistant("ok"),
                usage: None,
                model: "stub".into(),
            })
        }
    }

    fn descriptor(id: &str) -> ProviderDescriptor {
        ProviderDescriptor {
            instance_id: InstanceId::from(id),
            kind: ProviderKind::RemoteCompatible,
            capabilities: [Capability::Chat].into_iter().collect(),
            connection: ConnectionConfig {
                endpoint: "https://api.example.com/v1".into(),
                api_key: Some("sk-test".into()),
                chat_model: Some("test-model".into()),
                embedding_model: None,
            },
        }
    }

    /// A module declaring a fixed list of instances, optionally reporting
    /// readiness problems or failing outright.
    struct TestModule {
        name: String,
        instances: Vec<String>,
        missing_config: Option<String>,
        not_ready: Vec<String>,
        fail_configure: bool,
    }

    impl TestModule {
        fn new(name: &str, instances: &[&str]) -> Self {
            Self {
                name: name.into(),
                instances: instances.iter().map(|s| s.to_string()).collect(),
                missing_config: None,
                not_ready: Vec::new(),
                fail_configure: false,
            }
        }

        fn with_missing_config(mut self, reason: &str) -> Self {
            self.missing_config = Some(reason.into());
            self
        }

        fn with_not_ready(mut self, id: &str) -> Self {
            self.not_ready.push(id.into());
            self
        }

        fn failing(mut self) -> Self {
            self.fail_configure = true;
            self
        }
    }

    impl ProviderModule for TestModule {
        fn name(&self) -> &str {
            &self.name
        }

        fn configure(
            &self,
            _config: &AppConfig,
            readiness: &mut ReadinessTracker,
        ) -> Result<Vec<ProviderDescriptor>, RegistryError> {
            if self.fail_configure {
                return Err(RegistryError::ModuleFailed {
                    module: self.name.clone(),
                    reason: "boom".into(),
                });
            }
            if let Some(reason) = &self.missing_config {
                readiness.report_missing_configuration(reason.clone());
            }
            for id in &self.not_ready {
                readiness.mark_instance_not_ready(InstanceId::from(id));
            }
            Ok(self.instances.iter().map(|id| descriptor(id)).collect())
        }

        fn build(&self, _descriptor: &ProviderDescriptor) -> Result<EngineSet, RegistryError> {
            Ok(EngineSet {
                chat: Some(Arc::new(StubEngine)),
                embedding: None,
            })
        }
    }

    fn empty_config() -> AppConfig {
        AppConfig::default()
    }

    #[test]
    fn ready_boot_registers_declared_instances() {
        let modules: Vec<Box<dyn ProviderModule>> =
            vec![Box::new(TestModule::new("remote", &["eng-1", "eng-2"]))];

        let (catalog, report) = boot(&empty_config(), &modules).unwrap();
        assert!(report.ready_at_boot);
        assert_eq!(catalog.len(), 2);
        assert!(catalog.resolve_chat(&InstanceId::from("eng-1")).is_ok());
        assert!(catalog.resolve_chat(&InstanceId::from("eng-2")).is_ok());
    }

    #[test]
    fn missing_configuration_skips_all_registration() {
        // Even the healthy module's instances must not be exposed.
        let modules: Vec<Box<dyn ProviderModule>> = vec![
            Box::new(TestModule::new("healthy", &["eng-1"])),
            Box::new(
                TestModule::new("broken", &["eng-2"])
                    .with_missing_config("shared embedding instance not configured"),
            ),
        ];

        let (catalog, report) = boot(&empty_config(), &modules).unwrap();
        assert!(!report.ready_at_boot);
        assert!(catalog.is_empty());
        assert!(catalog.resolve_chat(&InstanceId::from("eng-1")).is_err());
        assert_eq!(report.missing_config.len(), 1);
    }

    #[test]
    fn not_ready_instance_is_skipped_without_blocking_the_rest() {
        let modules: Vec<Box<dyn ProviderModule>> = vec![Box::new(
            TestModule::new("remote", &["eng-1", "eng-2"]).with_not_ready("eng-2"),
        )];

        let (catalog, report) = boot(&empty_config(), &modules).unwrap();
        assert!(report.ready_at_boot);
        assert_eq!(catalog.len(), 1);
        assert!(catalog.resolve_chat(&InstanceId::from("eng-1")).is_ok());

        let err = catalog
            .resolve_chat(&InstanceId::from("eng-2"))
            .unwrap_err();
        assert!(err.to_string().contains("not ready at boot"));
        assert_eq!(report.skipped, vec![InstanceId::from("eng-2")]);
    }

    #[test]
    fn failing_module_is_isolated() {
        let modules: Vec<Box<dyn ProviderModule>> = vec![
            Box::new(TestModule::new("broken", &["eng-x"]).failing()),
            Box::new(TestModule::new("remote", &["eng-1"])),
        ];

        let (catalog, report) = boot(&empty_config(), &modules).unwrap();
        assert!(report.ready_at_boot);
        assert_eq!(catalog.len(), 1);
        assert!(catalog.resolve_chat(&InstanceId::from("eng-1")).is_ok());
        assert_eq!(report.failed_modules, vec!["broken".to_string()]);
    }

    #[test]
    fn duplicate_declaration_across_modules_is_fatal() {
        let modules: Vec<Box<dyn ProviderModule>> = vec![
            Box::new(TestModule::new("first", &["eng-1"])),
            Box::new(TestModule::new("second", &["eng-1"])),
        ];

        let err = boot(&empty_config(), &modules).unwrap_err();
        assert!(matches!(err, RegistryError::DuplicateRegistration { .. }));
    }

    #[test]
    fn boot_report_summary_mentions_state() {
        let modules: Vec<Box<dyn ProviderModule>> = vec![Box::new(
            TestModule::new("remote", &["eng-1"]).with_missing_config("api key missing"),
        )];

        let (_, report) = boot(&empty_config(), &modules).unwrap();
        let summary = report.summary();
        assert!(summary.contains("ready: NO"));
        assert!(summary.contains("api key missing"));
    }
}
