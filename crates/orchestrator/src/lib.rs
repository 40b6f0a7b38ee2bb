//! Chat turn orchestration for modelmux.
//!
//! The orchestrator sits between the engine catalog and the outside world:
//! it binds sessions to provider instances, shapes requests from agent
//! profiles and persisted history, drives the tool-calling loop, and
//! finalizes each turn with a single atomic history write. Streaming turns
//! run the same state machine with deltas forwarded as they arrive.

pub mod retry;
pub mod stream;
pub mod tool_loop;
pub mod turn;

pub use retry::RetryPolicy;
pub use stream::TurnStreamEvent;
pub use tool_loop::ToolInvocationLoop;
pub use turn::{ChatOrchestrator, TurnOutcome};
