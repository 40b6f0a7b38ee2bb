//! The per-turn orchestration state machine.
//!
//! A turn: resolve the session's engine from the keyed catalog, merge
//! persisted state with the new user turn and the agent's parameters, invoke
//! the engine, run tool rounds until the model stops asking (or the round
//! cap trips), then append the whole turn delta to the history store in one
//! write. Failures before finalize leave the session untouched; the round
//! cap persists what was accumulated before surfacing the fault.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use modelmux_config::AppConfig;
use modelmux_core::conversation::{SessionId, Turn};
use modelmux_core::engine::{ChatRequest, Usage};
use modelmux_core::error::Error;
use modelmux_core::history::HistoryStore;
use modelmux_core::tool::ToolCatalog;
use modelmux_core::{AgentProfile, InstanceId};
use modelmux_registry::EngineCatalog;

use crate::retry::RetryPolicy;
use crate::tool_loop::ToolInvocationLoop;

/// The result of a completed turn.
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    /// The final assistant turn
    pub reply: Turn,

    /// Token usage accumulated across every engine call in the turn
    pub usage: Usage,

    /// How many tool rounds ran
    pub rounds: u32,
}

/// Drives chat turns against the engine catalog.
pub struct ChatOrchestrator {
    engines: Arc<EngineCatalog>,
    history: Arc<dyn HistoryStore>,
    retry: RetryPolicy,
    tool_timeout: Duration,
    default_models: HashMap<InstanceId, String>,
}

impl ChatOrchestrator {
    pub fn new(
        engines: Arc<EngineCatalog>,
        history: Arc<dyn HistoryStore>,
        config: &AppConfig,
    ) -> Self {
        let default_models = config
            .providers
            .iter()
            .filter_map(|p| {
                p.chat_model
                    .as_ref()
                    .map(|m| (InstanceId::from(&p.id), m.clone()))
            })
            .collect();

        Self {
            engines,
            history,
            retry: RetryPolicy::from_config(&config.orchestrator),
            tool_timeout: Duration::from_secs(config.orchestrator.tool_timeout_secs),
            default_models,
        }
    }

    pub(crate) fn engines(&self) -> &Arc<EngineCatalog> {
        &self.engines
    }

    pub(crate) fn history(&self) -> &Arc<dyn HistoryStore> {
        &self.history
    }

    pub(crate) fn retry(&self) -> &RetryPolicy {
        &self.retry
    }

    pub(crate) fn tool_timeout(&self) -> Duration {
        self.tool_timeout
    }

    /// The model used for this agent on this instance: the agent's override
    /// when set, otherwise the instance's configured chat model.
    pub(crate) fn model_for(
        &self,
        profile: &AgentProfile,
        instance_id: &InstanceId,
    ) -> Result<String, Error> {
        profile
            .model
            .clone()
            .or_else(|| self.default_models.get(instance_id).cloned())
            .ok_or_else(|| Error::Config {
                message: format!(
                    "no chat model configured for instance '{instance_id}' and agent '{}' sets none",
                    profile.id
                ),
            })
    }

    /// Build the opening request for a turn: persona system prompt first,
    /// then the persisted turns, then the new user turn.
    ///
    /// Returns the request together with the instance the session is bound
    /// to (existing sessions keep their binding; a new session adopts the
    /// agent's instance).
    pub(crate) async fn prepare_turn(
        &self,
        profile: &AgentProfile,
        session_id: &SessionId,
        user_turn: &Turn,
        tools: &ToolCatalog,
    ) -> Result<(InstanceId, ChatRequest), Error> {
        let prior = self.history.load(session_id).await?;
        let instance_id = prior
            .as_ref()
            .map(|s| s.provider_instance_id.clone())
            .unwrap_or_else(|| profile.provider_instance_id.clone());

        let model = self.model_for(profile, &instance_id)?;

        let mut turns = Vec::new();
        if let Some(prompt) = &profile.system_prompt {
            turns.push(Turn::system(prompt.clone()));
        }
        if let Some(prior) = &prior {
            turns.extend(prior.turns.iter().cloned());
        }
        turns.push(user_turn.clone());

        Ok((
            instance_id,
            ChatRequest {
                model,
                turns,
                temperature: profile.temperature,
                max_tokens: profile.max_tokens,
                tools: tools.definitions(),
            },
        ))
    }

    /// Run one complete (non-streaming) turn.
    ///
    /// On success the whole turn delta — user turn, assistant turns, tool
    /// results — is appended to the session in a single write.
    pub async fn run_turn(
        &self,
        profile: &AgentProfile,
        session_id: &SessionId,
        user_turn: Turn,
        tools: Arc<ToolCatalog>,
    ) -> Result<TurnOutcome, Error> {
        let (instance_id, mut request) = self
            .prepare_turn(profile, session_id, &user_turn, &tools)
            .await?;

        // Image-bearing turns need the vision registration; plain turns the
        // chat one. Both fail with a resolution error when absent.
        let engine = if user_turn.images.is_empty() {
            self.engines.resolve_chat(&instance_id)?
        } else {
            self.engines.resolve_vision(&instance_id)?
        };

        info!(
            session = %session_id,
            agent = %profile.id,
            instance = %instance_id,
            engine = engine.provider_name(),
            "Running turn"
        );

        let tool_loop = ToolInvocationLoop::new(tools, self.tool_timeout);
        let mut delta = vec![user_turn];
        let mut usage = Usage::default();
        let mut rounds = 0u32;

        loop {
            let response = self.retry.run(|| engine.complete(request.clone())).await?;
            if let Some(u) = &response.usage {
                usage.accumulate(u);
            }

            let assistant = response.turn;
            request.turns.push(assistant.clone());
            delta.push(assistant.clone());

            if assistant.tool_calls.is_empty() {
                self.history
                    .append_turns(session_id, &instance_id, &delta)
                    .await?;
                debug!(session = %session_id, rounds, turns = delta.len(), "Turn finalized");
                return Ok(TurnOutcome {
                    reply: assistant,
                    usage,
                    rounds,
                });
            }

            rounds += 1;
            if rounds > profile.max_tool_rounds {
                warn!(
                    session = %session_id,
                    rounds = profile.max_tool_rounds,
                    "Tool round cap reached, persisting accumulated turns"
                );
                self.history
                    .append_turns(session_id, &instance_id, &delta)
                    .await?;
                return Err(Error::LoopLimit {
                    session_id: session_id.as_str().to_string(),
                    rounds: profile.max_tool_rounds,
                });
            }

            debug!(
                session = %session_id,
                round = rounds,
                calls = assistant.tool_calls.len(),
                "Executing tool round"
            );

            for result in tool_loop.execute_round(&assistant.tool_calls).await {
                let turn = Turn::tool_result(result.call_id, result.output);
                request.turns.push(turn.clone());
                delta.push(turn);
            }
        }
    }
}
