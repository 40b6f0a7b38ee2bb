//! Engine for local model runners speaking the Ollama-native API.
//!
//! Talks to a runner daemon over HTTP: `/api/chat` for completions (NDJSON
//! streaming), `/api/embed` for embeddings, `/api/tags` for installed models.
//! No API key is required; the runner is assumed to be on a trusted host.

use async_trait::async_trait;
use futures::StreamExt;
use serde::Deserialize;
use tracing::{debug, trace};

use modelmux_core::conversation::{Role, Turn};
use modelmux_core::engine::{
    ChatEngine, ChatRequest, ChatResponse, EmbeddingEngine, EmbeddingRequest, EmbeddingResponse,
    StreamFragment, Usage,
};
use modelmux_core::error::EngineError;
use modelmux_core::tool::ToolCallRequest;

/// Default endpoint for a runner on the local machine.
pub const DEFAULT_LOCAL_ENDPOINT: &str = "http://localhost:11434";

/// A chat/embedding engine backed by a local runner daemon.
#[derive(Debug)]
pub struct LocalRunnerEngine {
    name: String,
    base_url: String,
    client: reqwest::Client,
}

impl LocalRunnerEngine {
    pub fn new(name: impl Into<String>, base_url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(300))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            name: name.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        }
    }

    fn request_body(request: &ChatRequest, stream: bool) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": request.model,
            "messages": to_runner_messages(&request.turns),
            "stream": stream,
            "options": {
                "temperature": request.temperature,
            },
        });

        if let Some(max_tokens) = request.max_tokens {
            body["options"]["num_predict"] = serde_json::json!(max_tokens);
        }
        if !request.tools.is_empty() {
            let tools: Vec<_> = request
                .tools
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
                .collect();
            body["tools"] = serde_json::json!(tools);
        }

        body
    }

    async fn post_chat(&self, body: &serde_json::Value) -> Result<reqwest::Response, EngineError> {
        let url = format!("{}/api/chat", self.base_url);

        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status().as_u16();
        if status != 200 {
            let message = response.text().await.unwrap_or_default();
            return Err(EngineError::ApiError {
                status_code: status,
                message,
            });
        }
        Ok(response)
    }
}

fn map_transport_error(e: reqwest::Error) -> EngineError {
    if e.is_timeout() {
        EngineError::Timeout(e.to_string())
    } else if e.is_connect() {
        EngineError::Network(format!(
            "cannot reach local runner (is it running?): {e}"
        ))
    } else {
        EngineError::Network(e.to_string())
    }
}

/// Convert domain turns to the runner's message format.
///
/// The runner takes base64 image payloads in a separate `images` field
/// rather than inline content parts.
fn to_runner_messages(turns: &[Turn]) -> Vec<serde_json::Value> {
    turns
        .iter()
        .map(|turn| {
            let role = match turn.role {
                Role::User => "user",
                Role::Assistant => "assistant",
                Role::System => "system",
                Role::Tool => "tool",
            };

            let mut msg = serde_json::json!({
                "role": role,
                "content": turn.content,
            });

            if !turn.images.is_empty() {
                msg["images"] = serde_json::json!(turn.images);
            }
            if !turn.tool_calls.is_empty() {
                let calls: Vec<_> = turn
                    .tool_calls
                    .iter()
                    .map(|tc| {
                        serde_json::json!({
                            "function": {
                                "name": tc.tool_name,
                                "arguments": tc.arguments,
                            },
                        })
                    })
                    .collect();
                msg["tool_calls"] = serde_json::json!(calls);
            }

            msg
        })
        .collect()
}

/// The runner does not assign tool call ids, so synthesize them locally.
/// Correlation between requests and results still holds within a turn.
fn to_tool_call_requests(calls: Vec<RunnerToolCall>) -> Vec<ToolCallRequest> {
    calls
        .into_iter()
        .map(|tc| ToolCallRequest {
            call_id: format!("call_{}", uuid::Uuid::new_v4().simple()),
            tool_name: tc.function.name,
            arguments: tc.function.arguments,
        })
        .collect()
}

fn usage_from(message: &RunnerChatPayload) -> Option<Usage> {
    match (message.prompt_eval_count, message.eval_count) {
        (None, None) => None,
        (prompt, completion) => {
            let prompt_tokens = prompt.unwrap_or(0);
            let completion_tokens = completion.unwrap_or(0);
            Some(Usage {
                prompt_tokens,
                completion_tokens,
                total_tokens: prompt_tokens + completion_tokens,
            })
        }
    }
}

#[async_trait]
impl ChatEngine for LocalRunnerEngine {
    fn provider_name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, request: ChatRequest) -> Result<ChatResponse, EngineError> {
        let body = Self::request_body(&request, false);
        debug!(engine = %self.name, model = %request.model, "Sending local completion request");

        let response = self.post_chat(&body).await?;

        let payload: RunnerChatPayload = response
            .json()
            .await
            .map_err(|e| EngineError::MalformedResponse(format!("invalid JSON body: {e}")))?;

        let usage = usage_from(&payload);
        let message = payload
            .message
            .ok_or_else(|| EngineError::MalformedResponse("no message in response".into()))?;

        let tool_calls = to_tool_call_requests(message.tool_calls.unwrap_or_default());
        let turn = Turn::assistant_with_tool_calls(message.content.unwrap_or_default(), tool_calls);

        Ok(ChatResponse {
            turn,
            usage,
            model: payload.model.unwrap_or(request.model),
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
        debug!(engine = %self.name, model = %request.model, "Sending local streaming request");

        let response = self.post_chat(&body).await?;

        let (tx, rx) = tokio::sync::mpsc::channel(64);
        let engine_name = self.name.clone();

        tokio::spawn(async move {
            let mut byte_stream = response.bytes_stream();
            let mut buffer = String::new();
            let mut pending_tool_calls: Vec<ToolCallRequest> = Vec::new();

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

                // NDJSON: one JSON object per line
                while let Some(line_end) = buffer.find('\n') {
                    let line = buffer[..line_end].trim().to_string();
                    buffer = buffer[line_end + 1..].to_string();

                    if line.is_empty() {
                        continue;
                    }

                    let payload = match serde_json::from_str::<RunnerChatPayload>(&line) {
                        Ok(p) => p,
                        Err(e) => {
                            trace!(engine = %engine_name, line = %line, error = %e, "Ignoring unparseable stream line");
                            continue;
                        }
                    };

                    let usage = usage_from(&payload);
                    let done = payload.done.unwrap_or(false);

                    if let Some(message) = payload.message {
                        if let Some(calls) = message.tool_calls {
                            pending_tool_calls.extend(to_tool_call_requests(calls));
                        }
                        if message.content.as_deref().is_some_and(|c| !c.is_empty()) {
                            let fragment = StreamFragment {
                                content: message.content,
                                tool_calls: Vec::new(),
                                done: false,
                                usage: None,
                            };
                            if tx.send(Ok(fragment)).await.is_err() {
                                return; // consumer cancelled
                            }
                        }
                    }

                    if done {
                        let _ = tx
                            .send(Ok(StreamFragment {
                                content: None,
                                tool_calls: std::mem::take(&mut pending_tool_calls),
                                done: true,
                                usage,
                            }))
                            .await;
                        return;
                    }
                }
            }

            // Stream ended without a done marker
            let _ = tx
                .send(Ok(StreamFragment {
                    content: None,
                    tool_calls: std::mem::take(&mut pending_tool_calls),
                    done: true,
                    usage: None,
                }))
                .await;
        });

        Ok(rx)
    }

    async fn list_models(&self) -> Result<Vec<String>, EngineError> {
        let url = format!("{}/api/tags", self.base_url);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(map_transport_error)?;

        if !response.status().is_success() {
            return Ok(Vec::new());
        }

        let body: serde_json::Value = response.json().await.map_err(map_transport_error)?;
        let models = body["models"]
            .as_array()
            .map(|arr| {
                arr.iter()
                    .filter_map(|m| m["name"].as_str().map(String::from))
                    .collect()
            })
            .unwrap_or_default();

        Ok(models)
    }

    async fn health_check(&self) -> Result<bool, EngineError> {
        let url = format!("{}/api/tags", self.base_url);
        match self.client.get(&url).send().await {
            Ok(response) => Ok(response.status().is_success()),
            Err(_) => Ok(false),
        }
    }
}

#[async_trait]
impl EmbeddingEngine for LocalRunnerEngine {
    fn provider_name(&self) -> &str {
        &self.name
    }

    async fn embed(&self, request: EmbeddingRequest) -> Result<EmbeddingResponse, EngineError> {
        let url = format!("{}/api/embed", self.base_url);

        let body = serde_json::json!({
            "model": request.model,
            "input": request.inputs,
        });

        debug!(
            engine = %self.name,
            model = %request.model,
            count = request.inputs.len(),
            "Sending local embedding request"
        );

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status().as_u16();
        if status != 200 {
            let message = response.text().await.unwrap_or_default();
            return Err(EngineError::ApiError {
                status_code: status,
                message,
            });
        }

        let payload: RunnerEmbedPayload = response
            .json()
            .await
            .map_err(|e| EngineError::MalformedResponse(format!("invalid embedding body: {e}")))?;

        let usage = payload.prompt_eval_count.map(|prompt_tokens| Usage {
            prompt_tokens,
            completion_tokens: 0,
            total_tokens: prompt_tokens,
        });

        Ok(EmbeddingResponse {
            embeddings: payload.embeddings,
            model: payload.model.unwrap_or(request.model),
            usage,
        })
    }
}

// --- Runner wire types (internal) ---

#[derive(Debug, Deserialize)]
struct RunnerChatPayload {
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    message: Option<RunnerMessage>,
    #[serde(default)]
    done: Option<bool>,
    #[serde(default)]
    prompt_eval_count: Option<u32>,
    #[serde(default)]
    eval_count: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct RunnerMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<RunnerToolCall>>,
}

#[derive(Debug, Deserialize)]
struct RunnerToolCall {
    function: RunnerFunction,
}

#[derive(Debug, Deserialize)]
struct RunnerFunction {
    name: String,
    // Runner arguments arrive as a JSON object, not a string
    arguments: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct RunnerEmbedPayload {
    #[serde(default)]
    model: Option<String>,
    embeddings: Vec<Vec<f32>>,
    #[serde(default)]
    prompt_eval_count: Option<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_turn_uses_images_field() {
        let turn = Turn::user("describe this").with_images(vec!["aGVsbG8=".into()]);
        let messages = to_runner_messages(&[turn]);
        assert_eq!(messages[0]["content"], "describe this");
        assert_eq!(messages[0]["images"][0], "aGVsbG8=");
    }

    #[test]
    fn plain_turn_has_no_images_field() {
        let messages = to_runner_messages(&[Turn::user("hi")]);
        assert!(messages[0].get("images").is_none());
    }

    #[test]
    fn synthesized_call_ids_are_unique() {
        let calls = vec![
            RunnerToolCall {
                function: RunnerFunction {
                    name: "calculator".into(),
                    arguments: serde_json::json!({"expression": "1+1"}),
                },
            },
            RunnerToolCall {
                function: RunnerFunction {
                    name: "calculator".into(),
                    arguments: serde_json::json!({"expression": "2+2"}),
                },
            },
        ];

        let requests = to_tool_call_requests(calls);
        assert_eq!(requests.len(), 2);
        assert_ne!(requests[0].call_id, requests[1].call_id);
        assert!(requests[0].call_id.starts_with("call_"));
    }

    #[test]
    fn stream_payload_parses_done_line() {
        let line = r#"{"model":"llama3.2","message":{"content":""},"done":true,"prompt_eval_count":10,"eval_count":25}"#;
        let payload: RunnerChatPayload = serde_json::from_str(line).unwrap();
        assert_eq!(payload.done, Some(true));

        let usage = usage_from(&payload).unwrap();
        assert_eq!(usage.prompt_tokens, 10);
        assert_eq!(usage.completion_tokens, 25);
        assert_eq!(usage.total_tokens, 35);
    }

    #[test]
    fn request_body_maps_max_tokens_to_num_predict() {
        let request = ChatRequest {
            model: "llama3.2".into(),
            turns: vec![Turn::user("hi")],
            temperature: 0.5,
            max_tokens: Some(128),
            tools: vec![],
        };

        let body = LocalRunnerEngine::request_body(&request, true);
        assert_eq!(body["options"]["num_predict"], 128);
        assert_eq!(body["options"]["temperature"], 0.5);
        assert_eq!(body["stream"], true);
    }
}
