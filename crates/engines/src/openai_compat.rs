//! Engine for remote OpenAI-compatible API services.
//!
//! Works with any service exposing the `/v1/chat/completions` family of
//! endpoints. Supports chat completions (non-streaming and streaming SSE),
//! tool calling, image content parts for vision-declared instances,
//! embeddings, model listing, and health checks.

use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use modelmux_core::conversation::{Role, Turn};
use modelmux_core::engine::{
    ChatEngine, ChatRequest, ChatResponse, EmbeddingEngine, EmbeddingRequest, EmbeddingResponse,
    StreamFragment, ToolDefinition, Usage,
};
use modelmux_core::error::EngineError;
use modelmux_core::tool::ToolCallRequest;

/// A remote OpenAI-compatible inference engine.
#[derive(Debug)]
pub struct RemoteCompatibleEngine {
    name: String,
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl RemoteCompatibleEngine {
    /// Create a new engine for the given endpoint.
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            name: name.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            client,
        }
    }

    fn request_body(request: &ChatRequest, stream: bool) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": request.model,
            "messages": to_wire_messages(&request.turns),
            "temperature": request.temperature,
            "stream": stream,
        });

        if stream {
            body["stream_options"] = serde_json::json!({ "include_usage": true });
        }
        if let Some(max_tokens) = request.max_tokens {
            body["max_tokens"] = serde_json::json!(max_tokens);
        }
        if !request.tools.is_empty() {
            body["tools"] = serde_json::json!(to_wire_tools(&request.tools));
        }

        body
    }

    async fn post_chat(
        &self,
        body: &serde_json::Value,
        accept_sse: bool,
    ) -> Result<reqwest::Response, EngineError> {
        let url = format!("{}/chat/completions", self.base_url);

        let mut builder = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json");
        if accept_sse {
            builder = builder.header("Accept", "text/event-stream");
        }

        let response = builder
            .json(body)
            .send()
            .await
            .map_err(map_transport_error)?;

        check_status(response).await
    }
}

/// Map a reqwest failure into the engine error taxonomy.
fn map_transport_error(e: reqwest::Error) -> EngineError {
    if e.is_timeout() {
        EngineError::Timeout(e.to_string())
    } else {
        EngineError::Network(e.to_string())
    }
}

/// Turn a non-200 response into the matching error kind.
async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, EngineError> {
    let status = response.status().as_u16();

    match status {
        200 => Ok(response),
        429 => {
            let retry_after_secs = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok())
                .unwrap_or(5);
            Err(EngineError::RateLimited { retry_after_secs })
        }
        401 | 403 => Err(EngineError::AuthenticationFailed(
            "Invalid API key or insufficient permissions".into(),
        )),
        _ => {
            let message = response.text().await.unwrap_or_default();
            warn!(status, body = %message, "Provider returned error");
            Err(EngineError::ApiError {
                status_code: status,
                message,
            })
        }
    }
}

/// Convert domain turns to OpenAI wire messages.
///
/// Turns with image attachments become multi-part content arrays so that
/// vision-capable models receive them; plain turns stay simple strings.
fn to_wire_messages(turns: &[Turn]) -> Vec<WireMessage> {
    turns
        .iter()
        .map(|turn| {
            let role = match turn.role {
                Role::User => "user",
                Role::Assistant => "assistant",
                Role::System => "system",
                Role::Tool => "tool",
            };

            let content = if turn.images.is_empty() {
                serde_json::Value::String(turn.content.clone())
            } else {
                let mut parts = vec![serde_json::json!({
                    "type": "text",
                    "text": turn.content,
                })];
                for image in &turn.images {
                    parts.push(serde_json::json!({
                        "type": "image_url",
                        "image_url": { "url": image },
                    }));
                }
                serde_json::Value::Array(parts)
            };

            WireMessage {
                role: role.into(),
                content: Some(content),
                tool_calls: if turn.tool_calls.is_empty() {
                    None
                } else {
                    Some(
                        turn.tool_calls
                            .iter()
                            .map(|tc| WireToolCall {
                                id: tc.call_id.clone(),
                                r#type: "function".into(),
                                function: WireFunction {
                                    name: tc.tool_name.clone(),
                                    arguments: tc.arguments.to_string(),
                                },
                            })
                            .collect(),
                    )
                },
                tool_call_id: turn.tool_call_id.clone(),
            }
        })
        .collect()
}

fn to_wire_tools(tools: &[ToolDefinition]) -> Vec<serde_json::Value> {
    tools
        .iter()
        .map(|t| {
            serde_json::json!({
                "type": "function",
                "function": {
                    "name": t.name,
                    "description": t.description,
                    "parameters": t.parameters,
                },
            })
        })
        .collect()
}

/// Parse a wire tool call's argument string into a JSON value.
///
/// Providers occasionally emit arguments that are not valid JSON; those are
/// passed through as a raw string so the tool can report a useful error.
fn parse_arguments(raw: &str) -> serde_json::Value {
    serde_json::from_str(raw).unwrap_or_else(|_| serde_json::Value::String(raw.to_string()))
}

fn to_tool_call_requests(calls: Vec<WireToolCall>) -> Vec<ToolCallRequest> {
    calls
        .into_iter()
        .map(|tc| ToolCallRequest {
            call_id: tc.id,
            tool_name: tc.function.name,
            arguments: parse_arguments(&tc.function.arguments),
        })
        .collect()
}

#[async_trait]
impl ChatEngine for RemoteCompatibleEngine {
    fn provider_name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, request: ChatRequest) -> Result<ChatResponse, EngineError> {
        let body = Self::request_body(&request, false);
        debug!(engine = %self.name, model = %request.model, "Sending completion request");

        let response = self.post_chat(&body, false).await?;

        let wire: WireResponse = response
            .json()
            .await
            .map_err(|e| EngineError::MalformedResponse(format!("invalid JSON body: {e}")))?;

        let choice = wire
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| EngineError::MalformedResponse("no choices in response".into()))?;

        let tool_calls = to_tool_call_requests(choice.message.tool_calls.unwrap_or_default());
        let content = choice
            .message
            .content
            .and_then(|c| c.as_str().map(String::from))
            .unwrap_or_default();

        let turn = Turn::assistant_with_tool_calls(content, tool_calls);

        let usage = wire.usage.map(|u| Usage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
            total_tokens: u.total_tokens,
        });

        Ok(ChatResponse {
            turn,
            usage,
            model: wire.model,
        })
    }

    async fn complete_streaming(
        &self,
        request: ChatRequest,
    ) -> Result<
        tokio::sync::mpsc::Receiver<Result<StreamFragment, EngineError>>,
        EngineError,
    > {
        let body = Self::request_body(&request, true);
        debug!(engine = %self.name, model = %request.model, "Sending streaming request");

        let response = self.post_chat(&body, true).await?;

        let (tx, rx) = tokio::sync::mpsc::channel(64);
        let engine_name = self.name.clone();

        tokio::spawn(async move {
            let mut byte_stream = response.bytes_stream();
            let mut buffer = String::new();
            let mut accumulators: std::collections::HashMap<u32, ToolCallAccumulator> =
                std::collections::HashMap::new();

            while let Some(chunk_result) = byte_stream.next().await {
                let bytes = match chunk_result {
                    Ok(b) => b,
                    Err(e) => {
                        let _ = tx
                            .send(Err(EngineError::StreamInterrupted(e.to_string())))
                            .await;
                        return;
                    }
                };

                buffer.push_str(&String::from_utf8_lossy(&bytes));

                while let Some(line_end) = buffer.find('\n') {
                    let line = buffer[..line_end].trim_end_matches('\r').to_string();
                    buffer = buffer[line_end + 1..].to_string();

                    if line.is_empty() || line.starts_with(':') {
                        continue;
                    }

                    let Some(data) = line.strip_prefix("data: ") else {
                        continue;
                    };
                    let data = data.trim();

                    if data == "[DONE]" {
                        let _ = tx
                            .send(Ok(terminal_fragment(&mut accumulators, None)))
                            .await;
                        return;
                    }

                    match serde_json::from_str::<WireStreamEvent>(data) {
                        Ok(event) => {
                            if let Some(choice) = event.choices.first() {
                                for delta in choice.delta.tool_calls.iter().flatten() {
                                    let acc = accumulators
                                        .entry(delta.index)
                                        .or_default();
                                    if let Some(id) = &delta.id {
                                        acc.id = id.clone();
                                    }
                                    if let Some(func) = &delta.function {
                                        if let Some(name) = &func.name {
                                            acc.name = name.clone();
                                        }
                                        if let Some(args) = &func.arguments {
                                            acc.arguments.push_str(args);
                                        }
                                    }
                                }

                                if choice
                                    .delta
                                    .content
                                    .as_ref()
                                    .is_some_and(|c| !c.is_empty())
                                {
                                    let fragment = StreamFragment {
                                        content: choice.delta.content.clone(),
                                        tool_calls: Vec::new(),
                                        done: false,
                                        usage: None,
                                    };
                                    if tx.send(Ok(fragment)).await.is_err() {
                                        return; // consumer cancelled
                                    }
                                }
                            }

                            if let Some(usage) = event.usage {
                                let usage = Usage {
                                    prompt_tokens: usage.prompt_tokens,
                                    completion_tokens: usage.completion_tokens,
                                    total_tokens: usage.total_tokens,
                                };
                                let _ = tx
                                    .send(Ok(terminal_fragment(&mut accumulators, Some(usage))))
                                    .await;
                                return;
                            }
                        }
                        Err(e) => {
                            trace!(engine = %engine_name, data = %data, error = %e, "Ignoring unparseable SSE event");
                        }
                    }
                }
            }

            // Stream ended without [DONE]
            let _ = tx.send(Ok(terminal_fragment(&mut accumulators, None))).await;
        });

        Ok(rx)
    }

    async fn list_models(&self) -> Result<Vec<String>, EngineError> {
        let url = format!("{}/models", self.base_url);
        let response = self
            .client
            .get(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .send()
            .await
            .map_err(map_transport_error)?;

        if !response.status().is_success() {
            return Ok(Vec::new());
        }

        let body: serde_json::Value = response.json().await.map_err(map_transport_error)?;
        let models = body["data"]
            .as_array()
            .map(|arr| {
                arr.iter()
                    .filter_map(|m| m["id"].as_str().map(String::from))
                    .collect()
            })
            .unwrap_or_default();

        Ok(models)
    }

    async fn health_check(&self) -> Result<bool, EngineError> {
        let url = format!("{}/models", self.base_url);
        let response = self
            .client
            .get(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .send()
            .await
            .map_err(map_transport_error)?;

        Ok(response.status().is_success())
    }
}

#[async_trait]
impl EmbeddingEngine for RemoteCompatibleEngine {
    fn provider_name(&self) -> &str {
        &self.name
    }

    async fn embed(&self, request: EmbeddingRequest) -> Result<EmbeddingResponse, EngineError> {
        let url = format!("{}/embeddings", self.base_url);

        let body = serde_json::json!({
            "model": request.model,
            "input": request.inputs,
            "encoding_format": "float",
        });

        debug!(
            engine = %self.name,
            model = %request.model,
            count = request.inputs.len(),
            "Sending embedding request"
        );

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(map_transport_error)?;

        let response = check_status(response).await?;

        let wire: WireEmbeddingResponse = response
            .json()
            .await
            .map_err(|e| EngineError::MalformedResponse(format!("invalid embedding body: {e}")))?;

        let usage = wire.usage.map(|u| Usage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: 0,
            total_tokens: u.total_tokens,
        });

        Ok(EmbeddingResponse {
            embeddings: wire.data.into_iter().map(|d| d.embedding).collect(),
            model: wire.model,
            usage,
        })
    }
}

/// Drain the tool-call accumulators into the terminal fragment.
fn terminal_fragment(
    accumulators: &mut std::collections::HashMap<u32, ToolCallAccumulator>,
    usage: Option<Usage>,
) -> StreamFragment {
    let mut indexed: Vec<_> = accumulators.drain().collect();
    indexed.sort_by_key(|(index, _)| *index);

    StreamFragment {
        content: None,
        tool_calls: indexed
            .into_iter()
            .map(|(_, acc)| ToolCallRequest {
                call_id: acc.id,
                tool_name: acc.name,
                arguments: parse_arguments(&acc.arguments),
            })
            .collect(),
        done: true,
        usage,
    }
}

// --- Wire types (internal) ---

#[derive(Debug, Serialize, Deserialize)]
struct WireMessage {
    role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<WireToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireToolCall {
    id: String,
    r#type: String,
    function: WireFunction,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireFunction {
    name: String,
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct WireResponse {
    model: String,
    choices: Vec<WireChoice>,
    usage: Option<WireUsage>,
}

#[derive(Debug, Deserialize)]
struct WireChoice {
    message: WireMessage,
}

#[derive(Debug, Deserialize)]
struct WireUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct WireEmbeddingResponse {
    data: Vec<WireEmbeddingData>,
    model: String,
    usage: Option<WireEmbeddingUsage>,
}

#[derive(Debug, Deserialize)]
struct WireEmbeddingData {
    embedding: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct WireEmbeddingUsage {
    prompt_tokens: u32,
    total_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct WireStreamEvent {
    #[serde(default)]
    choices: Vec<WireStreamChoice>,
    #[serde(default)]
    usage: Option<WireUsage>,
}

#[derive(Debug, Deserialize)]
struct WireStreamChoice {
    delta: WireStreamDelta,
}

#[derive(Debug, Deserialize)]
struct WireStreamDelta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<WireStreamToolCallDelta>>,
}

/// A tool call delta — arrives incrementally across SSE events.
#[derive(Debug, Deserialize)]
struct WireStreamToolCallDelta {
    index: u32,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    function: Option<WireStreamFunctionDelta>,
}

#[derive(Debug, Deserialize)]
struct WireStreamFunctionDelta {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<String>,
}

#[derive(Debug, Default)]
struct ToolCallAccumulator {
    id: String,
    name: String,
    arguments: String,
}
