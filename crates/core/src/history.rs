//! History store trait — the external collaborator that persists sessions.
//!
//! The core only requires read-then-append semantics; serializing writes per
//! session is the store's responsibility. Both operations can fail and the
//! failure must propagate, never be swallowed.

use async_trait::async_trait;

use crate::conversation::{ConversationState, SessionId, Turn};
use crate::descriptor::InstanceId;
use crate::error::HistoryError;

/// Persistence contract for conversation state.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Backend name (e.g. "in_memory", "sqlite").
    fn name(&self) -> &str;

    /// Load the state for a session, or `None` if the session is new.
    async fn load(
        &self,
        session_id: &SessionId,
    ) -> std::result::Result<Option<ConversationState>, HistoryError>;

    /// Append turns to a session, creating the session row if it does not
    /// exist yet. The whole slice is committed atomically: either every turn
    /// lands or none does.
    async fn append_turns(
        &self,
        session_id: &SessionId,
        provider_instance_id: &InstanceId,
        turns: &[Turn],
    ) -> std::result::Result<(), HistoryError>;
}
