//! Conversation state — the persisted, append-only record of a chat session.
//!
//! A session is bound to one provider instance for its whole life: if that
//! instance disappears from the catalog, turns addressed to the session fail
//! with a resolution error instead of silently switching providers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::descriptor::InstanceId;
use crate::tool::ToolCallRequest;

/// Unique identifier for a chat session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from(s: &str) -> Self {
        Self(s.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The role of a turn in a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The end user
    User,
    /// The model
    Assistant,
    /// Persona / system instructions
    System,
    /// Tool execution result
    Tool,
}

/// A single turn in a conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    /// Unique turn ID
    pub id: String,

    /// Who produced this turn
    pub role: Role,

    /// The text content
    pub content: String,

    /// Tool calls requested by the assistant (if any)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCallRequest>,

    /// If this is a tool result, the call it answers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,

    /// Image attachments (URLs or data URIs) for vision-capable engines
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<String>,

    /// Timestamp
    pub timestamp: DateTime<Utc>,
}

impl Turn {
    fn base(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
            images: Vec::new(),
            timestamp: Utc::now(),
        }
    }

    /// Create a new user turn.
    pub fn user(content: impl Into<String>) -> Self {
        Self::base(Role::User, content)
    }

    /// Create a new assistant turn.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::base(Role::Assistant, content)
    }

    /// Create an assistant turn carrying tool call requests.
    pub fn assistant_with_tool_calls(
        content: impl Into<String>,
        tool_calls: Vec<ToolCallRequest>,
    ) -> Self {
        let mut turn = Self::base(Role::Assistant, content);
        turn.tool_calls = tool_calls;
        turn
    }

    /// Create a system turn.
    pub fn system(content: impl Into<String>) -> Self {
        Self::base(Role::System, content)
    }

    /// Create a tool result turn answering `call_id`.
    pub fn tool_result(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        let mut turn = Self::base(Role::Tool, content);
        turn.tool_call_id = Some(call_id.into());
        turn
    }

    /// Attach images to this turn.
    pub fn with_images(mut self, images: Vec<String>) -> Self {
        self.images = images;
        self
    }
}

/// The persisted state of one chat session.
///
/// Created on the first turn, appended to on every subsequent turn. The core
/// never deletes it; deletion is an external operation on the history store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationState {
    /// Session this state belongs to
    pub session_id: SessionId,

    /// The provider instance this session is bound to
    pub provider_instance_id: InstanceId,

    /// Ordered turns
    pub turns: Vec<Turn>,

    /// When the session was created
    pub created_at: DateTime<Utc>,

    /// When the last turn was appended
    pub updated_at: DateTime<Utc>,
}

impl ConversationState {
    /// Create a fresh state for a new session bound to a provider instance.
    pub fn new(session_id: SessionId, provider_instance_id: InstanceId) -> Self {
        let now = Utc::now();
        Self {
            session_id,
            provider_instance_id,
            turns: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Append a turn.
    pub fn push(&mut self, turn: Turn) {
        self.updated_at = Utc::now();
        self.turns.push(turn);
    }

    /// The most recent user turn, if any.
    pub fn last_user_turn(&self) -> Option<&Turn> {
        self.turns.iter().rev().find(|t| t.role == Role::User)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_user_turn() {
        let turn = Turn::user("Hello!");
        assert_eq!(turn.role, Role::User);
        assert_eq!(turn.content, "Hello!");
        assert!(turn.tool_calls.is_empty());
    }

    #[test]
    fn tool_result_carries_call_id() {
        let turn = Turn::tool_result("call_1", "42");
        assert_eq!(turn.role, Role::Tool);
        assert_eq!(turn.tool_call_id.as_deref(), Some("call_1"));
    }

    #[test]
    fn state_tracks_updates() {
        let mut state =
            ConversationState::new(SessionId::new(), InstanceId::from("eng-1"));
        let created = state.created_at;

        state.push(Turn::user("First"));
        assert_eq!(state.turns.len(), 1);
        assert!(state.updated_at >= created);
    }

    #[test]
    fn last_user_turn_skips_assistant() {
        let mut state =
            ConversationState::new(SessionId::new(), InstanceId::from("eng-1"));
        state.push(Turn::user("question"));
        state.push(Turn::assistant("answer"));

        assert_eq!(state.last_user_turn().unwrap().content, "question");
    }

    #[test]
    fn turn_serialization_roundtrip() {
        let turn = Turn::user("Test turn");
        let json = serde_json::to_string(&turn).unwrap();
        let parsed: Turn = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.content, "Test turn");
        assert_eq!(parsed.role, Role::User);
    }
}
