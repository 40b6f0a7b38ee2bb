//! In-memory history store.
//!
//! Zero persistence: state lives in a map behind an async lock and vanishes
//! with the process. Used for tests and ephemeral one-shot sessions.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use modelmux_core::conversation::{ConversationState, SessionId, Turn};
use modelmux_core::error::HistoryError;
use modelmux_core::history::HistoryStore;
use modelmux_core::InstanceId;

/// History store backed by a process-local map.
#[derive(Default)]
pub struct InMemoryStore {
    sessions: RwLock<HashMap<SessionId, ConversationState>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of sessions currently held.
    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }
}

#[async_trait]
impl HistoryStore for InMemoryStore {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn load(
        &self,
        session_id: &SessionId,
    ) -> std::result::Result<Option<ConversationState>, HistoryError> {
        Ok(self.sessions.read().await.get(session_id).cloned())
    }

    async fn append_turns(
        &self,
        session_id: &SessionId,
        provider_instance_id: &InstanceId,
        turns: &[Turn],
    ) -> std::result::Result<(), HistoryError> {
        // The write lock spans the whole append, so the slice lands atomically
        let mut sessions = self.sessions.write().await;
        let state = sessions.entry(session_id.clone()).or_insert_with(|| {
            ConversationState::new(session_id.clone(), provider_instance_id.clone())
        });

        for turn in turns {
            state.push(turn.clone());
        }

        debug!(
            session = %session_id,
            appended = turns.len(),
            total = state.turns.len(),
            "Appended turns to in-memory session"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use modelmux_core::conversation::Role;

    #[tokio::test]
    async fn load_unknown_session_returns_none() {
        let store = InMemoryStore::new();
        let loaded = store.load(&SessionId::from("nope")).await.unwrap();
        assert!(loaded.is_none());
    }

    #[tokio::test]
    async fn append_creates_session() {
        let store = InMemoryStore::new();
        let session = SessionId::from("s-1");
        let instance = InstanceId::from("eng-1");

        store
            .append_turns(&session, &instance, &[Turn::user("hello")])
            .await
            .unwrap();

        let state = store.load(&session).await.unwrap().unwrap();
        assert_eq!(state.provider_instance_id, instance);
        assert_eq!(state.turns.len(), 1);
        assert_eq!(state.turns[0].role, Role::User);
    }

    #[tokio::test]
    async fn append_extends_existing_session() {
        let store = InMemoryStore::new();
        let session = SessionId::from("s-1");
        let instance = InstanceId::from("eng-1");

        store
            .append_turns(&session, &instance, &[Turn::user("hi")])
            .await
            .unwrap();
        store
            .append_turns(
                &session,
                &instance,
                &[Turn::assistant("hello"), Turn::user("how are you?")],
            )
            .await
            .unwrap();

        let state = store.load(&session).await.unwrap().unwrap();
        assert_eq!(state.turns.len(), 3);
        assert_eq!(state.turns[1].content, "hello");
        assert_eq!(store.session_count().await, 1);
    }

    #[tokio::test]
    async fn sessions_are_isolated() {
        let store = InMemoryStore::new();
        let instance = InstanceId::from("eng-1");

        store
            .append_turns(&SessionId::from("a"), &instance, &[Turn::user("one")])
            .await
            .unwrap();
        store
            .append_turns(&SessionId::from("b"), &instance, &[Turn::user("two")])
            .await
            .unwrap();

        let a = store.load(&SessionId::from("a")).await.unwrap().unwrap();
        let b = store.load(&SessionId::from("b")).await.unwrap().unwrap();
        assert_eq!(a.turns[0].content, "one");
        assert_eq!(b.turns[0].content, "two");
    }
}
