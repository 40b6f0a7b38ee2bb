//! Document search tool — semantic retrieval over an indexed corpus.
//!
//! The tool itself knows nothing about embeddings or storage; it delegates
//! to a [`DocumentIndex`] collaborator. The deployment wires the index to
//! the shared embedding instance, so every agent searches the same corpus
//! no matter which provider serves its chat.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tracing::debug;

use modelmux_core::error::ToolError;
use modelmux_core::tool::Tool;

/// One retrieved chunk.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentHit {
    pub document_id: String,
    pub content: String,
    pub source: String,
    pub similarity: f32,
}

/// Retrieval contract the document search tool depends on.
#[async_trait]
pub trait DocumentIndex: Send + Sync {
    /// Search the corpus, returning at most `top_k` hits sorted by
    /// descending similarity.
    async fn search(&self, query: &str, top_k: usize) -> Result<Vec<DocumentHit>, ToolError>;
}

pub struct DocumentSearchTool {
    index: Arc<dyn DocumentIndex>,
}

impl DocumentSearchTool {
    pub fn new(index: Arc<dyn DocumentIndex>) -> Self {
        Self { index }
    }
}

#[async_trait]
impl Tool for DocumentSearchTool {
    fn name(&self) -> &str {
        "document_search"
    }

    fn description(&self) -> &str {
        "Search the indexed document corpus for relevant passages. Returns chunks sorted by relevance."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "The search query to find relevant documents"
                },
                "top_k": {
                    "type": "integer",
                    "description": "Maximum number of results to return (default 3)",
                    "default": 3
                }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<String, ToolError> {
        let query = arguments["query"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'query' argument".into()))?;

        let top_k = arguments["top_k"].as_u64().unwrap_or(3).min(10) as usize;

        let hits = self.index.search(query, top_k).await?;
        debug!(query, hits = hits.len(), "Document search complete");

        if hits.is_empty() {
            return Ok("No matching documents found.".into());
        }

        serde_json::to_string_pretty(&hits)
            .map_err(|e| ToolError::ExecutionFailed {
                tool_name: "document_search".into(),
                reason: format!("result serialization: {e}"),
            })
    }
}
