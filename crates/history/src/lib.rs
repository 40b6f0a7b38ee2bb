//! Conversation history stores.
//!
//! Two backends behind the same [`HistoryStore`] trait: a SQLite database
//! for durable sessions and an in-memory map for tests and ephemeral runs.

pub mod in_memory;
pub mod sqlite;

use std::sync::Arc;

use tracing::info;

use modelmux_config::{AppConfig, HistoryConfig};
use modelmux_core::error::HistoryError;
use modelmux_core::history::HistoryStore;

pub use in_memory::InMemoryStore;
pub use sqlite::SqliteStore;

/// Open the history store selected by configuration.
pub async fn open_store(config: &HistoryConfig) -> Result<Arc<dyn HistoryStore>, HistoryError> {
    match config.backend.as_str() {
        "memory" | "in_memory" => {
            info!("Using in-memory history store");
            Ok(Arc::new(InMemoryStore::new()))
        }
        "sqlite" => {
            let path = match &config.path {
                Some(path) => path.clone(),
                None => default_db_path()?,
            };
            Ok(Arc::new(SqliteStore::new(&path).await?))
        }
        other => Err(HistoryError::Storage(format!(
            "unknown history backend '{other}' (expected \"sqlite\" or \"memory\")"
        ))),
    }
}

fn default_db_path() -> Result<String, HistoryError> {
    let dir = AppConfig::config_dir();
    std::fs::create_dir_all(&dir)
        .map_err(|e| HistoryError::Storage(format!("cannot create {}: {e}", dir.display())))?;
    Ok(format!("sqlite://{}/history.db", dir.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_backend_selected_by_name() {
        let config = HistoryConfig {
            backend: "memory".into(),
            path: None,
        };
        let store = open_store(&config).await.unwrap();
        assert_eq!(store.name(), "in_memory");
    }

    #[tokio::test]
    async fn sqlite_backend_uses_configured_path() {
        let config = HistoryConfig {
            backend: "sqlite".into(),
            path: Some("sqlite::memory:".into()),
        };
        let store = open_store(&config).await.unwrap();
        assert_eq!(store.name(), "sqlite");
    }

    #[tokio::test]
    async fn unknown_backend_is_an_error() {
        let config = HistoryConfig {
            backend: "postgres".into(),
            path: None,
        };
        assert!(open_store(&config).await.is_err());
    }
}
