//! Tool invocation round execution.
//!
//! One round takes the model's requested calls and produces exactly one
//! result per request, correlated by call id. Unknown tools, execution
//! failures, and timeouts become synthetic failure results reported back to
//! the model; a tool can never abort the turn.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use modelmux_core::tool::{ToolCallRequest, ToolCallResult, ToolCatalog};

/// Executes one round of tool calls against an agent's catalog.
pub struct ToolInvocationLoop {
    catalog: Arc<ToolCatalog>,
    call_timeout: Duration,
}

impl ToolInvocationLoop {
    pub fn new(catalog: Arc<ToolCatalog>, call_timeout: Duration) -> Self {
        Self {
            catalog,
            call_timeout,
        }
    }

    /// Execute every requested call, in order.
    ///
    /// The output vector always has the same length as the input; result `i`
    /// answers request `i` and carries its call id.
    pub async fn execute_round(&self, requests: &[ToolCallRequest]) -> Vec<ToolCallResult> {
        let mut results = Vec::with_capacity(requests.len());

        for request in requests {
            results.push(self.execute_one(request).await);
        }

        results
    }

    async fn execute_one(&self, request: &ToolCallRequest) -> ToolCallResult {
        let Some(tool) = self.catalog.get(&request.tool_name) else {
            warn!(tool = %request.tool_name, call = %request.call_id, "Requested tool is not available");
            return ToolCallResult::failure(
                request,
                format!("Tool '{}' is not available", request.tool_name),
            );
        };

        let start = std::time::Instant::now();
        let outcome =
            tokio::time::timeout(self.call_timeout, tool.execute(request.arguments.clone())).await;
        let duration_ms = start.elapsed().as_millis() as u64;

        match outcome {
            Ok(Ok(output)) => {
                debug!(tool = %request.tool_name, call = %request.call_id, duration_ms, "Tool call succeeded");
                ToolCallResult::ok(request, output)
            }
            Ok(Err(e)) => {
                warn!(tool = %request.tool_name, call = %request.call_id, error = %e, "Tool call failed");
                ToolCallResult::failure(request, format!("Error: {e}"))
            }
            Err(_) => {
                warn!(
                    tool = %request.tool_name,
                    call = %request.call_id,
                    timeout_secs = self.call_timeout.as_secs(),
                    "Tool call timed out"
                );
                ToolCallResult::failure(
                    request,
                    format!(
                        "Tool '{}' timed out after {} seconds",
                        request.tool_name,
                        self.call_timeout.as_secs()
                    ),
                )
            }
        }
    }
}
