//! Module lifecycle and keyed-service composition for modelmux.
//!
//! The pipeline: an explicit module manifest is configured sequentially
//! (readiness evaluation), the global gate decides whether anything gets
//! registered at all, and ready instances land in an immutable keyed catalog
//! that request handling resolves engines from at call time.

pub mod boot;
pub mod catalog;
pub mod module;
pub mod readiness;

pub use boot::{boot, BootReport};
pub use catalog::{CatalogBuilder, EngineCatalog, EngineHandle};
pub use module::{EngineSet, ProviderModule};
pub use readiness::{ReadinessReport, ReadinessTracker};
