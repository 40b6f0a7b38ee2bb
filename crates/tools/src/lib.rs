//! Built-in tools for modelmux agents.
//!
//! Tools are opt-in per agent: a catalog is assembled from the agent's
//! `enabled_tools` list, so an agent only advertises (and can only invoke)
//! what its profile allows.

pub mod calculator;
pub mod document_search;
pub mod web_search;

use std::sync::Arc;

use tracing::warn;

use modelmux_core::tool::ToolCatalog;
use modelmux_core::AgentProfile;

pub use calculator::CalculatorTool;
pub use document_search::{DocumentHit, DocumentIndex, DocumentSearchTool};
pub use web_search::{MockSearchBackend, SearchBackend, SearchResult, WebSearchTool};

/// Assemble the tool catalog for one agent profile.
///
/// `document_index` is the deployment's shared retrieval index; agents that
/// enable `document_search` without one get a warning and no such tool.
pub fn catalog_for(
    profile: &AgentProfile,
    document_index: Option<Arc<dyn DocumentIndex>>,
) -> ToolCatalog {
    let mut catalog = ToolCatalog::new();

    for name in &profile.enabled_tools {
        match name.as_str() {
            "calculator" => catalog.register(Arc::new(CalculatorTool)),
            "web_search" => catalog.register(Arc::new(WebSearchTool::mock())),
            "document_search" => match &document_index {
                Some(index) => catalog.register(Arc::new(DocumentSearchTool::new(index.clone()))),
                None => {
                    warn!(
                        agent = %profile.id,
                        "Agent enables document_search but no document index is configured"
                    );
                }
            },
            other => {
                warn!(agent = %profile.id, tool = other, "Unknown tool in enabled_tools, skipping");
            }
        }
    }

    catalog
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use modelmux_core::error::ToolError;
    use modelmux_core::InstanceId;

    struct EmptyIndex;

    #[async_trait]
    impl DocumentIndex for EmptyIndex {
        async fn search(
            &self,
            _query: &str,
            _top_k: usize,
        ) -> Result<Vec<DocumentHit>, ToolError> {
            Ok(vec![])
        }
    }

    fn profile_with_tools(tools: &[&str]) -> AgentProfile {
        let mut profile = AgentProfile::new("tester", InstanceId::from("eng-1"));
        profile.enabled_tools = tools.iter().map(|s| s.to_string()).collect();
        profile
    }

    #[test]
    fn empty_profile_gets_empty_catalog() {
        let catalog = catalog_for(&profile_with_tools(&[]), None);
        assert!(catalog.is_empty());
    }

    #[test]
    fn enabled_tools_are_registered() {
        let catalog = catalog_for(&profile_with_tools(&["calculator", "web_search"]), None);
        assert_eq!(catalog.len(), 2);
        assert!(catalog.get("calculator").is_some());
        assert!(catalog.get("web_search").is_some());
    }

    #[test]
    fn document_search_requires_an_index() {
        let without = catalog_for(&profile_with_tools(&["document_search"]), None);
        assert!(without.get("document_search").is_none());

        let with = catalog_for(
            &profile_with_tools(&["document_search"]),
            Some(Arc::new(EmptyIndex)),
        );
        assert!(with.get("document_search").is_some());
    }

    #[test]
    fn unknown_tool_names_are_skipped() {
        let catalog = catalog_for(&profile_with_tools(&["calculator", "teleport"]), None);
        assert_eq!(catalog.len(), 1);
    }
}
