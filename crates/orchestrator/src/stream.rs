//! Streaming turn execution.
//!
//! Same state machine as [`ChatOrchestrator::run_turn`], but content deltas
//! are forwarded to the client as they arrive while the full turn is
//! buffered for the single finalize write. Cancellation (token fired or
//! receiver dropped) abandons the turn without touching the history store;
//! a mid-stream engine failure does the same, after reporting it.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use modelmux_core::conversation::{SessionId, Turn};
use modelmux_core::engine::Usage;
use modelmux_core::error::Error;
use modelmux_core::tool::ToolCatalog;
use modelmux_core::AgentProfile;

use crate::tool_loop::ToolInvocationLoop;
use crate::turn::ChatOrchestrator;

/// Events emitted over the stream during a turn.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TurnStreamEvent {
    /// A content delta from the model, in generation order
    Fragment { content: String },

    /// The model requested a tool call
    ToolCall {
        call_id: String,
        name: String,
        arguments: serde_json::Value,
    },

    /// A tool call finished (synthetic failures included)
    ToolResult {
        call_id: String,
        name: String,
        output: String,
        success: bool,
    },

    /// The turn finalized; history has been written
    Done {
        session_id: String,
        usage: Option<Usage>,
        rounds: u32,
    },

    /// The turn failed; nothing past the last finalize was persisted
    Error { message: String },
}

impl TurnStreamEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Fragment { .. } => "fragment",
            Self::ToolCall { .. } => "tool_call",
            Self::ToolResult { .. } => "tool_result",
            Self::Done { .. } => "done",
            Self::Error { .. } => "error",
        }
    }
}

impl ChatOrchestrator {
    /// Run one turn, streaming events to the returned receiver.
    ///
    /// Resolution and request assembly happen before this returns, so a
    /// not-ready instance fails here rather than as a stream event. The
    /// turn itself runs on a spawned task; dropping the receiver or firing
    /// `cancel` abandons it with no history write.
    pub async fn run_turn_streaming(
        &self,
        profile: &AgentProfile,
        session_id: &SessionId,
        user_turn: Turn,
        tools: Arc<ToolCatalog>,
        cancel: CancellationToken,
    ) -> Result<mpsc::Receiver<TurnStreamEvent>, Error> {
        let (instance_id, mut request) = self
            .prepare_turn(profile, session_id, &user_turn, &tools)
            .await?;

        let engine = if user_turn.images.is_empty() {
            self.engines().resolve_chat(&instance_id)?
        } else {
            self.engines().resolve_vision(&instance_id)?
        };

        info!(
            session = %session_id,
            agent = %profile.id,
            instance = %instance_id,
            engine = engine.provider_name(),
            "Running streaming turn"
        );

        let (tx, rx) = mpsc::channel(64);
        let history = self.history().clone();
        let retry = self.retry().clone();
        let tool_loop = ToolInvocationLoop::new(tools, self.tool_timeout());
        let session_id = session_id.clone();
        let max_rounds = profile.max_tool_rounds;

        tokio::spawn(async move {
            let mut delta = vec![user_turn];
            let mut usage = Usage::default();
            let mut rounds = 0u32;

            loop {
                let established = tokio::select! {
                    _ = cancel.cancelled() => {
                        debug!(session = %session_id, "Streaming turn cancelled before engine call");
                        return;
                    }
                    result = retry.run(|| engine.complete_streaming(request.clone())) => result,
                };

                let mut fragments = match established {
                    Ok(rx) => rx,
                    Err(e) => {
                        warn!(session = %session_id, error = %e, "Engine call failed, abandoning turn");
                        let _ = tx
                            .send(TurnStreamEvent::Error {
                                message: Error::Engine(e).to_string(),
                            })
                            .await;
                        return;
                    }
                };

                let mut buffered = String::new();
                let mut tool_calls = Vec::new();

                loop {
                    let next = tokio::select! {
                        _ = cancel.cancelled() => {
                            debug!(session = %session_id, "Streaming turn cancelled mid-stream");
                            return;
                        }
                        next = fragments.recv() => next,
                    };

                    match next {
                        Some(Ok(fragment)) => {
                            if let Some(content) = fragment.content {
                                if !content.is_empty() {
                                    buffered.push_str(&content);
                                    if tx
                                        .send(TurnStreamEvent::Fragment { content })
                                        .await
                                        .is_err()
                                    {
                                        // Receiver dropped: client is gone
                                        return;
                                    }
                                }
                            }
                            if fragment.done {
                                tool_calls = fragment.tool_calls;
                                if let Some(u) = &fragment.usage {
                                    usage.accumulate(u);
                                }
                                break;
                            }
                        }
                        Some(Err(e)) => {
                            warn!(session = %session_id, error = %e, "Stream interrupted, abandoning turn");
                            let _ = tx
                                .send(TurnStreamEvent::Error {
                                    message: Error::Engine(e).to_string(),
                                })
                                .await;
                            return;
                        }
                        // Channel closed without a terminal fragment; take
                        // what we have as the final content.
                        None => break,
                    }
                }

                let assistant = if tool_calls.is_empty() {
                    Turn::assistant(buffered)
                } else {
                    Turn::assistant_with_tool_calls(buffered, tool_calls.clone())
                };
                request.turns.push(assistant.clone());
                delta.push(assistant);

                if tool_calls.is_empty() {
                    if let Err(e) = history.append_turns(&session_id, &instance_id, &delta).await {
                        let _ = tx
                            .send(TurnStreamEvent::Error {
                                message: Error::History(e).to_string(),
                            })
                            .await;
                        return;
                    }
                    let _ = tx
                        .send(TurnStreamEvent::Done {
                            session_id: session_id.to_string(),
                            usage: Some(usage),
                            rounds,
                        })
                        .await;
                    return;
                }

                rounds += 1;
                if rounds > max_rounds {
                    warn!(
                        session = %session_id,
                        rounds = max_rounds,
                        "Tool round cap reached, persisting accumulated turns"
                    );
                    if let Err(e) = history.append_turns(&session_id, &instance_id, &delta).await {
                        warn!(session = %session_id, error = %e, "Failed to persist capped turn");
                    }
                    let _ = tx
                        .send(TurnStreamEvent::Error {
                            message: Error::LoopLimit {
                                session_id: session_id.to_string(),
                                rounds: max_rounds,
                            }
                            .to_string(),
                        })
                        .await;
                    return;
                }

                for call in &tool_calls {
                    let _ = tx
                        .send(TurnStreamEvent::ToolCall {
                            call_id: call.call_id.clone(),
                            name: call.tool_name.clone(),
                            arguments: call.arguments.clone(),
                        })
                        .await;
                }

                if cancel.is_cancelled() {
                    debug!(session = %session_id, "Streaming turn cancelled before tool round");
                    return;
                }

                for result in tool_loop.execute_round(&tool_calls).await {
                    let _ = tx
                        .send(TurnStreamEvent::ToolResult {
                            call_id: result.call_id.clone(),
                            name: result.tool_name.clone(),
                            output: result.output.clone(),
                            success: result.success,
                        })
                        .await;

                    let turn = Turn::tool_result(result.call_id, result.output);
                    request.turns.push(turn.clone());
                    delta.push(turn);
                }
            }
        });

        Ok(rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use modelmux_config::AppConfig;
    use modelmux_core::engine::{ChatEngine, ChatRequest, ChatResponse, StreamFragment};
    use modelmux_core::error::{EngineError, ToolError};
    use modelmux_core::history::HistoryStore;
    use modelmux_core::tool::{Tool, ToolCallRequest};
    use modelmux_core::{Capability, InstanceId};
    use modelmux_history::InMemoryStore;
    use modelmux_registry::{CatalogBuilder, EngineHandle};
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Debug)]
    struct ScriptedEngine {
        responses: Mutex<VecDeque<ChatResponse>>,
    }

    impl ScriptedEngine {
        fn new(responses: Vec<ChatResponse>) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
            }
        }
    }

    #[async_trait]
    impl ChatEngine for ScriptedEngine {
        fn provider_name(&self) -> &str {
            "scripted"
        }

        async fn complete(&self, _request: ChatRequest) -> Result<ChatResponse, EngineError> {
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| EngineError::MalformedResponse("script exhausted".into()))
        }
    }

    /// Never responds; used to exercise cancellation.
    #[derive(Debug)]
    struct StalledEngine;

    #[async_trait]
    impl ChatEngine for StalledEngine {
        fn provider_name(&self) -> &str {
            "stalled"
        }

        async fn complete(&self, _request: ChatRequest) -> Result<ChatResponse, EngineError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Err(EngineError::Timeout("unreachable".into()))
        }
    }

    /// Streams the given content fragments, then stalls with the channel
    /// held open; used to exercise cancellation mid-generation.
    #[derive(Debug)]
    struct DrippingEngine {
        fragments: Vec<String>,
    }

    #[async_trait]
    impl ChatEngine for DrippingEngine {
        fn provider_name(&self) -> &str {
            "dripping"
        }

        async fn complete(&self, _request: ChatRequest) -> Result<ChatResponse, EngineError> {
            Err(EngineError::NotSupported("streaming only".into()))
        }

        async fn complete_streaming(
            &self,
            _request: ChatRequest,
        ) -> Result<mpsc::Receiver<Result<StreamFragment, EngineError>>, EngineError> {
            let (tx, rx) = mpsc::channel(8);
            let fragments = self.fragments.clone();
            tokio::spawn(async move {
                for content in fragments {
                    let fragment = StreamFragment {
                        content: Some(content),
                        tool_calls: Vec::new(),
                        done: false,
                        usage: None,
                    };
                    if tx.send(Ok(fragment)).await.is_err() {
                        return;
                    }
                }
                // Keep the sender alive so the stream never ends on its own
                tokio::time::sleep(Duration::from_secs(3600)).await;
                drop(tx);
            });
            Ok(rx)
        }
    }

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }
        fn description(&self) -> &str {
            "Echoes the input"
        }
        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({"type": "object"})
        }
        async fn execute(&self, arguments: serde_json::Value) -> Result<String, ToolError> {
            Ok(arguments["text"].as_str().unwrap_or("").to_string())
        }
    }

    fn text_response(content: &str) -> ChatResponse {
        ChatResponse {
            turn: Turn::assistant(content),
            usage: Some(Usage {
                prompt_tokens: 10,
                completion_tokens: 5,
                total_tokens: 15,
            }),
            model: "mock-model".into(),
        }
    }

    fn tool_call_response(call_id: &str) -> ChatResponse {
        ChatResponse {
            turn: Turn::assistant_with_tool_calls(
                "",
                vec![ToolCallRequest {
                    call_id: call_id.into(),
                    tool_name: "echo".into(),
                    arguments: serde_json::json!({"text": "pong"}),
                }],
            ),
            usage: None,
            model: "mock-model".into(),
        }
    }

    fn catalog_with(engine: Arc<dyn ChatEngine>) -> Arc<modelmux_registry::EngineCatalog> {
        let mut builder = CatalogBuilder::new();
        builder
            .register(
                Capability::Chat,
                InstanceId::from("eng-1"),
                EngineHandle::Chat(engine),
            )
            .unwrap();
        Arc::new(builder.build())
    }

    fn profile() -> AgentProfile {
        let mut profile = AgentProfile::new("tester", InstanceId::from("eng-1"));
        profile.model = Some("mock-model".into());
        profile
    }

    fn tools() -> Arc<ToolCatalog> {
        let mut catalog = ToolCatalog::new();
        catalog.register(Arc::new(EchoTool));
        Arc::new(catalog)
    }

    async fn collect(mut rx: mpsc::Receiver<TurnStreamEvent>) -> Vec<TurnStreamEvent> {
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn simple_stream_emits_fragment_then_done() {
        let engine = Arc::new(ScriptedEngine::new(vec![text_response("Hello there!")]));
        let history: Arc<dyn HistoryStore> = Arc::new(InMemoryStore::new());
        let orch =
            ChatOrchestrator::new(catalog_with(engine), history.clone(), &AppConfig::default());
        let session = SessionId::from("s-1");

        let rx = orch
            .run_turn_streaming(
                &profile(),
                &session,
                Turn::user("Hi"),
                tools(),
                CancellationToken::new(),
            )
            .await
            .unwrap();

        let events = collect(rx).await;
        let types: Vec<_> = events.iter().map(|e| e.event_type()).collect();
        assert_eq!(types, vec!["fragment", "done"]);

        match &events[1] {
            TurnStreamEvent::Done { rounds, usage, .. } => {
                assert_eq!(*rounds, 0);
                assert_eq!(usage.unwrap().total_tokens, 15);
            }
            other => panic!("expected Done, got {other:?}"),
        }

        let state = history.load(&session).await.unwrap().unwrap();
        assert_eq!(state.turns.len(), 2);
    }

    #[tokio::test]
    async fn tool_round_events_arrive_in_order() {
        let engine = Arc::new(ScriptedEngine::new(vec![
            tool_call_response("call_1"),
            text_response("The tool said pong."),
        ]));
        let history: Arc<dyn HistoryStore> = Arc::new(InMemoryStore::new());
        let orch =
            ChatOrchestrator::new(catalog_with(engine), history.clone(), &AppConfig::default());
        let session = SessionId::from("s-1");

        let rx = orch
            .run_turn_streaming(
                &profile(),
                &session,
                Turn::user("ping?"),
                tools(),
                CancellationToken::new(),
            )
            .await
            .unwrap();

        let events = collect(rx).await;
        let types: Vec<_> = events.iter().map(|e| e.event_type()).collect();
        assert_eq!(types, vec!["tool_call", "tool_result", "fragment", "done"]);

        match &events[1] {
            TurnStreamEvent::ToolResult {
                call_id,
                output,
                success,
                ..
            } => {
                assert_eq!(call_id, "call_1");
                assert_eq!(output, "pong");
                assert!(success);
            }
            other => panic!("expected ToolResult, got {other:?}"),
        }

        let state = history.load(&session).await.unwrap().unwrap();
        assert_eq!(state.turns.len(), 4);
    }

    #[tokio::test]
    async fn cancellation_abandons_turn_without_persisting() {
        let history: Arc<dyn HistoryStore> = Arc::new(InMemoryStore::new());
        let orch = ChatOrchestrator::new(
            catalog_with(Arc::new(StalledEngine)),
            history.clone(),
            &AppConfig::default(),
        );
        let session = SessionId::from("s-1");
        let cancel = CancellationToken::new();

        let rx = orch
            .run_turn_streaming(
                &profile(),
                &session,
                Turn::user("Hi"),
                tools(),
                cancel.clone(),
            )
            .await
            .unwrap();

        cancel.cancel();

        // Channel closes with no terminal event
        let events = collect(rx).await;
        assert!(events.is_empty());

        assert!(history.load(&session).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn cancellation_after_partial_fragments_discards_them() {
        let engine = Arc::new(DrippingEngine {
            fragments: vec!["The ".into(), "answer ".into(), "is ".into()],
        });
        let history: Arc<dyn HistoryStore> = Arc::new(InMemoryStore::new());
        let orch =
            ChatOrchestrator::new(catalog_with(engine), history.clone(), &AppConfig::default());
        let session = SessionId::from("s-1");
        let cancel = CancellationToken::new();

        let mut rx = orch
            .run_turn_streaming(
                &profile(),
                &session,
                Turn::user("Hi"),
                tools(),
                cancel.clone(),
            )
            .await
            .unwrap();

        // Three deltas arrive, then the client walks away mid-generation
        for expected in ["The ", "answer ", "is "] {
            match rx.recv().await {
                Some(TurnStreamEvent::Fragment { content }) => assert_eq!(content, expected),
                other => panic!("expected Fragment, got {other:?}"),
            }
        }
        cancel.cancel();

        // Channel closes with no Done or Error event
        assert!(rx.recv().await.is_none());

        // The partial assistant content was never persisted
        assert!(history.load(&session).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn round_cap_persists_then_reports_error() {
        let engine = Arc::new(ScriptedEngine::new(vec![
            tool_call_response("call_1"),
            tool_call_response("call_2"),
        ]));
        let history: Arc<dyn HistoryStore> = Arc::new(InMemoryStore::new());
        let orch =
            ChatOrchestrator::new(catalog_with(engine), history.clone(), &AppConfig::default());
        let session = SessionId::from("s-1");

        let mut capped = profile();
        capped.max_tool_rounds = 1;

        let rx = orch
            .run_turn_streaming(
                &capped,
                &session,
                Turn::user("loop"),
                tools(),
                CancellationToken::new(),
            )
            .await
            .unwrap();

        let events = collect(rx).await;
        let last = events.last().unwrap();
        assert_eq!(last.event_type(), "error");
        match last {
            TurnStreamEvent::Error { message } => assert!(message.contains("exceeded")),
            other => panic!("expected Error, got {other:?}"),
        }

        // Accumulated turns were persisted before the error
        let state = history.load(&session).await.unwrap().unwrap();
        assert!(state.turns.len() >= 3);
    }

    #[tokio::test]
    async fn unregistered_instance_fails_before_streaming() {
        let mut builder = CatalogBuilder::new();
        builder.mark_skipped(InstanceId::from("eng-1"));
        let history: Arc<dyn HistoryStore> = Arc::new(InMemoryStore::new());
        let orch = ChatOrchestrator::new(
            Arc::new(builder.build()),
            history,
            &AppConfig::default(),
        );

        let err = orch
            .run_turn_streaming(
                &profile(),
                &SessionId::from("s-1"),
                Turn::user("Hi"),
                tools(),
                CancellationToken::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Resolution(_)));
    }

    #[test]
    fn events_serialize_with_type_tag() {
        let event = TurnStreamEvent::Fragment {
            content: "hello".into(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "fragment");
        assert_eq!(json["content"], "hello");

        let done = TurnStreamEvent::Done {
            session_id: "s-1".into(),
            usage: None,
            rounds: 2,
        };
        let json = serde_json::to_value(&done).unwrap();
        assert_eq!(json["type"], "done");
        assert_eq!(json["rounds"], 2);
    }
}
