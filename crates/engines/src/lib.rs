//! Inference engine implementations and provider feature modules.
//!
//! Two engine families: [`RemoteCompatibleEngine`] for OpenAI-compatible
//! API services and [`LocalRunnerEngine`] for local runner daemons. The
//! module types plug them into the boot sequence.

pub mod local_runner;
pub mod modules;
pub mod openai_compat;

pub use local_runner::{LocalRunnerEngine, DEFAULT_LOCAL_ENDPOINT};
pub use modules::{
    standard_modules, LocalRunnerModule, RemoteProviderModule, SharedEmbeddingModule,
};
pub use openai_compat::RemoteCompatibleEngine;
