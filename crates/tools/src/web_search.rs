//! Web search tool.
//!
//! Delegates to a [`SearchBackend`] collaborator. The default backend
//! returns deterministic mock results so the agent loop can be exercised
//! end-to-end without network access; deployments can plug in a real
//! search API behind the same trait.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;

use modelmux_core::error::ToolError;
use modelmux_core::tool::Tool;

/// One web search result.
#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

/// Search provider contract.
#[async_trait]
pub trait SearchBackend: Send + Sync {
    async fn search(&self, query: &str, count: usize) -> Result<Vec<SearchResult>, ToolError>;
}

pub struct WebSearchTool {
    backend: Arc<dyn SearchBackend>,
}

impl WebSearchTool {
    pub fn new(backend: Arc<dyn SearchBackend>) -> Self {
        Self { backend }
    }

    /// Tool with the built-in mock backend.
    pub fn mock() -> Self {
        Self::new(Arc::new(MockSearchBackend))
    }
}

#[async_trait]
impl Tool for WebSearchTool {
    fn name(&self) -> &str {
        "web_search"
    }

    fn description(&self) -> &str {
        "Search the web for information. Returns a list of relevant results with titles, URLs, and snippets."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "The search query"
                },
                "num_results": {
                    "type": "integer",
                    "description": "Number of results to return (default 3)",
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

        let num_results = arguments["num_results"].as_u64().unwrap_or(3).min(5) as usize;

        let results = self.backend.search(query, num_results).await?;

        serde_json::to_string_pretty(&results).map_err(|e| ToolError::ExecutionFailed {
            tool_name: "web_search".into(),
            reason: format!("result serialization: {e}"),
        })
    }
}

/// Deterministic mock backend for offline use and tests.
pub struct MockSearchBackend;

#[async_trait]
impl SearchBackend for MockSearchBackend {
    async fn search(&self, query: &str, count: usize) -> Result<Vec<SearchResult>, ToolError> {
        Ok((0..count)
            .map(|i| SearchResult {
                title: format!("Result {} for: {}", i + 1, query),
                url: format!(
                    "https://example.com/search?q={}&p={}",
                    query.replace(' ', "+"),
                    i + 1
                ),
                snippet: format!(
                    "Mock search result for the query '{query}'. A real backend would return live content."
                ),
            })
            .collect())
    }
}
