//! Tool trait and call correlation types.
//!
//! Tools are the model's way of acting during a turn: searching documents,
//! querying the web, doing arithmetic. The orchestrator's tool loop resolves
//! requested calls against a catalog and folds the results back into the
//! conversation.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use crate::engine::ToolDefinition;
use crate::error::ToolError;

/// A tool call requested by the model.
///
/// Transient: exists only within a single orchestration pass, correlated to
/// its result by `call_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallRequest {
    /// Unique call ID (matches the provider's tool_call id)
    pub call_id: String,

    /// Name of the tool to invoke
    pub tool_name: String,

    /// Arguments as a JSON value
    pub arguments: serde_json::Value,
}

/// The result of one tool call. Exactly one exists per request, including
/// synthetic failure results.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallResult {
    /// The call this result answers
    pub call_id: String,

    /// Which tool produced it
    pub tool_name: String,

    /// Whether execution succeeded
    pub success: bool,

    /// Output content (or an error description on failure)
    pub output: String,
}

impl ToolCallResult {
    /// A successful result.
    pub fn ok(request: &ToolCallRequest, output: impl Into<String>) -> Self {
        Self {
            call_id: request.call_id.clone(),
            tool_name: request.tool_name.clone(),
            success: true,
            output: output.into(),
        }
    }

    /// A synthetic failure result, reported back to the model instead of
    /// aborting the turn.
    pub fn failure(request: &ToolCallRequest, reason: impl Into<String>) -> Self {
        Self {
            call_id: request.call_id.clone(),
            tool_name: request.tool_name.clone(),
            success: false,
            output: reason.into(),
        }
    }
}

/// The core Tool trait.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique name of this tool (e.g. "calculator", "document_search").
    fn name(&self) -> &str;

    /// Description sent to the model.
    fn description(&self) -> &str;

    /// JSON Schema describing this tool's parameters.
    fn parameters_schema(&self) -> serde_json::Value;

    /// Execute the tool and return its textual output.
    async fn execute(
        &self,
        arguments: serde_json::Value,
    ) -> std::result::Result<String, ToolError>;

    /// Convert this tool into a definition for the model.
    fn to_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
        }
    }
}

/// The set of tools enabled for one agent.
///
/// The tool loop uses this to look up requested tools by name and to build
/// the definitions advertised to the model.
pub struct ToolCatalog {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolCatalog {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Register a tool. Replaces any existing tool with the same name.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    /// Look up a tool by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// All tool definitions for the model.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.values().map(|t| t.to_definition()).collect()
    }

    /// All registered tool names.
    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(|s| s.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl Default for ToolCatalog {
    fn default() -> Self {
        Self::new()
    }
}
