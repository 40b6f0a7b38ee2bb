//! SQLite history store.
//!
//! One database file, two tables:
//! - `sessions` — one row per session with its provider binding
//! - `turns` — ordered turn payloads, serialized as JSON
//!
//! Appends run in a transaction: a multi-turn exchange is committed as a
//! whole or not at all.

use std::str::FromStr;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use tracing::{debug, info};

use modelmux_core::conversation::{ConversationState, SessionId, Turn};
use modelmux_core::error::HistoryError;
use modelmux_core::history::HistoryStore;
use modelmux_core::InstanceId;

/// History store backed by a SQLite database.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (or create) a SQLite history database at `path`.
    ///
    /// Pass `"sqlite::memory:"` for an ephemeral in-process database.
    pub async fn new(path: &str) -> Result<Self, HistoryError> {
        let options = SqliteConnectOptions::from_str(path)
            .map_err(|e| HistoryError::Storage(format!("Invalid SQLite path: {e}")))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .pragma("foreign_keys", "ON");

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(|e| HistoryError::Storage(format!("Failed to open SQLite: {e}")))?;

        let store = Self { pool };
        store.run_migrations().await?;
        info!("SQLite history store initialized at {path}");
        Ok(store)
    }

    async fn run_migrations(&self) -> Result<(), HistoryError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS sessions (
                session_id            TEXT PRIMARY KEY,
                provider_instance_id  TEXT NOT NULL,
                created_at            TEXT NOT NULL,
                updated_at            TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| HistoryError::Storage(format!("sessions table: {e}")))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS turns (
                iid         INTEGER PRIMARY KEY AUTOINCREMENT,
                session_id  TEXT NOT NULL REFERENCES sessions(session_id),
                payload     TEXT NOT NULL,
                created_at  TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| HistoryError::Storage(format!("turns table: {e}")))?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_turns_session ON turns(session_id, iid)")
            .execute(&self.pool)
            .await
            .map_err(|e| HistoryError::Storage(format!("turns index: {e}")))?;

        debug!("SQLite history migrations complete");
        Ok(())
    }
}

#[async_trait]
impl HistoryStore for SqliteStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn load(
        &self,
        session_id: &SessionId,
    ) -> std::result::Result<Option<ConversationState>, HistoryError> {
        let session_row = sqlx::query(
            "SELECT provider_instance_id, created_at, updated_at FROM sessions WHERE session_id = ?1",
        )
        .bind(session_id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| HistoryError::Storage(format!("session lookup: {e}")))?;

        let Some(session_row) = session_row else {
            return Ok(None);
        };

        let provider: String = session_row
            .try_get("provider_instance_id")
            .map_err(|e| HistoryError::Storage(format!("provider column: {e}")))?;
        let created_at: String = session_row
            .try_get("created_at")
            .map_err(|e| HistoryError::Storage(format!("created_at column: {e}")))?;
        let updated_at: String = session_row
            .try_get("updated_at")
            .map_err(|e| HistoryError::Storage(format!("updated_at column: {e}")))?;

        let turn_rows =
            sqlx::query("SELECT payload FROM turns WHERE session_id = ?1 ORDER BY iid ASC")
                .bind(session_id.as_str())
                .fetch_all(&self.pool)
                .await
                .map_err(|e| HistoryError::Storage(format!("turn fetch: {e}")))?;

        let mut turns = Vec::with_capacity(turn_rows.len());
        for row in &turn_rows {
            let payload: String = row
                .try_get("payload")
                .map_err(|e| HistoryError::Storage(format!("payload column: {e}")))?;
            let turn: Turn = serde_json::from_str(&payload)
                .map_err(|e| HistoryError::Serialization(format!("turn payload: {e}")))?;
            turns.push(turn);
        }

        Ok(Some(ConversationState {
            session_id: session_id.clone(),
            provider_instance_id: InstanceId::from(&provider),
            turns,
            created_at: parse_timestamp(&created_at)?,
            updated_at: parse_timestamp(&updated_at)?,
        }))
    }

    async fn append_turns(
        &self,
        session_id: &SessionId,
        provider_instance_id: &InstanceId,
        turns: &[Turn],
    ) -> std::result::Result<(), HistoryError> {
        let now = Utc::now().to_rfc3339();

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| HistoryError::Storage(format!("begin transaction: {e}")))?;

        sqlx::query(
            r#"
            INSERT INTO sessions (session_id, provider_instance_id, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?3)
            ON CONFLICT(session_id) DO UPDATE SET updated_at = excluded.updated_at
            "#,
        )
        .bind(session_id.as_str())
        .bind(provider_instance_id.as_str())
        .bind(&now)
        .execute(&mut *tx)
        .await
        .map_err(|e| HistoryError::Storage(format!("session upsert: {e}")))?;

        for turn in turns {
            let payload = serde_json::to_string(turn)
                .map_err(|e| HistoryError::Serialization(format!("turn payload: {e}")))?;

            sqlx::query("INSERT INTO turns (session_id, payload, created_at) VALUES (?1, ?2, ?3)")
                .bind(session_id.as_str())
                .bind(&payload)
                .bind(&now)
                .execute(&mut *tx)
                .await
                .map_err(|e| HistoryError::Storage(format!("turn insert: {e}")))?;
        }

        tx.commit()
            .await
            .map_err(|e| HistoryError::Storage(format!("commit: {e}")))?;

        debug!(session = %session_id, appended = turns.len(), "Appended turns to SQLite session");
        Ok(())
    }
}

fn parse_timestamp(s: &str) -> Result<chrono::DateTime<Utc>, HistoryError> {
    chrono::DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| HistoryError::Serialization(format!("stored timestamp '{s}': {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use modelmux_core::conversation::Role;
    use modelmux_core::tool::ToolCallRequest;

    async fn test_store() -> SqliteStore {
        SqliteStore::new("sqlite::memory:").await.unwrap()
    }

    #[tokio::test]
    async fn load_unknown_session_returns_none() {
        let store = test_store().await;
        let loaded = store.load(&SessionId::from("missing")).await.unwrap();
        assert!(loaded.is_none());
    }

    #[tokio::test]
    async fn append_creates_session_with_binding() {
        let store = test_store().await;
        let session = SessionId::from("s-1");
        let instance = InstanceId::from("eng-1");

        store
            .append_turns(&session, &instance, &[Turn::user("hello")])
            .await
            .unwrap();

        let state = store.load(&session).await.unwrap().unwrap();
        assert_eq!(state.provider_instance_id, instance);
        assert_eq!(state.turns.len(), 1);
        assert_eq!(state.turns[0].content, "hello");
    }

    #[tokio::test]
    async fn turns_preserve_order_across_appends() {
        let store = test_store().await;
        let session = SessionId::from("s-1");
        let instance = InstanceId::from("eng-1");

        store
            .append_turns(&session, &instance, &[Turn::user("first")])
            .await
            .unwrap();
        store
            .append_turns(
                &session,
                &instance,
                &[Turn::assistant("second"), Turn::user("third")],
            )
            .await
            .unwrap();

        let state = store.load(&session).await.unwrap().unwrap();
        let contents: Vec<&str> = state.turns.iter().map(|t| t.content.as_str()).collect();
        assert_eq!(contents, vec!["first", "second", "third"]);
    }

    #[tokio::test]
    async fn tool_turns_round_trip() {
        let store = test_store().await;
        let session = SessionId::from("s-1");
        let instance = InstanceId::from("eng-1");

        let request = ToolCallRequest {
            call_id: "call_7".into(),
            tool_name: "calculator".into(),
            arguments: serde_json::json!({"expression": "6*7"}),
        };
        let assistant = Turn::assistant_with_tool_calls("", vec![request]);
        let result = Turn::tool_result("call_7", "42");

        store
            .append_turns(&session, &instance, &[assistant, result])
            .await
            .unwrap();

        let state = store.load(&session).await.unwrap().unwrap();
        assert_eq!(state.turns[0].tool_calls.len(), 1);
        assert_eq!(state.turns[0].tool_calls[0].call_id, "call_7");
        assert_eq!(state.turns[1].role, Role::Tool);
        assert_eq!(state.turns[1].tool_call_id.as_deref(), Some("call_7"));
    }

    #[tokio::test]
    async fn persists_across_reopens() {
        let dir = tempfile::tempdir().unwrap();
        let path = format!("sqlite://{}/history.db", dir.path().display());
        let session = SessionId::from("s-1");
        let instance = InstanceId::from("eng-1");

        {
            let store = SqliteStore::new(&path).await.unwrap();
            store
                .append_turns(&session, &instance, &[Turn::user("durable")])
                .await
                .unwrap();
        }

        let store = SqliteStore::new(&path).await.unwrap();
        let state = store.load(&session).await.unwrap().unwrap();
        assert_eq!(state.turns[0].content, "durable");
    }

    #[tokio::test]
    async fn corrupted_timestamp_is_a_load_error() {
        let store = test_store().await;
        let session = SessionId::from("s-1");
        let instance = InstanceId::from("eng-1");

        store
            .append_turns(&session, &instance, &[Turn::user("hello")])
            .await
            .unwrap();

        sqlx::query("UPDATE sessions SET created_at = 'not-a-timestamp'")
            .execute(&store.pool)
            .await
            .unwrap();

        let err = store.load(&session).await.unwrap_err();
        assert!(matches!(err, HistoryError::Serialization(_)));
        assert!(err.to_string().contains("not-a-timestamp"));
    }

    #[tokio::test]
    async fn empty_append_still_creates_session() {
        let store = test_store().await;
        let session = SessionId::from("s-1");
        let instance = InstanceId::from("eng-1");

        store.append_turns(&session, &instance, &[]).await.unwrap();

        let state = store.load(&session).await.unwrap().unwrap();
        assert!(state.turns.is_empty());
        assert_eq!(state.provider_instance_id, instance);
    }
}
