//! `modelmux chat` — Interactive or single-message chat mode.

use std::io::Write as _;
use std::sync::Arc;

use tokio::io::AsyncBufReadExt;
use tokio_util::sync::CancellationToken;

use modelmux_config::AppConfig;
use modelmux_core::conversation::{SessionId, Turn};
use modelmux_core::tool::ToolCatalog;
use modelmux_core::AgentProfile;
use modelmux_engines::standard_modules;
use modelmux_orchestrator::{ChatOrchestrator, TurnStreamEvent};
use modelmux_registry::boot;

pub async fn run(
    message: Option<String>,
    agent: Option<String>,
    session: Option<String>,
    stream: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

    let agent_id = agent.unwrap_or_else(|| config.default_agent.clone());
    let profile = config.agent_profile(&agent_id).ok_or_else(|| {
        format!(
            "unknown agent '{agent_id}' — configured agents: {}",
            if config.agents.is_empty() {
                "(none; run `modelmux init`)".to_string()
            } else {
                config.agents.keys().cloned().collect::<Vec<_>>().join(", ")
            }
        )
    })?;

    let modules = standard_modules();
    let (catalog, report) = boot(&config, &modules)?;
    if !report.ready_at_boot {
        eprintln!("System is not ready:");
        eprint!("{}", report.summary());
        return Err("boot gate closed, nothing registered".into());
    }

    let history = modelmux_history::open_store(&config.history)
        .await
        .map_err(|e| format!("Failed to open history store: {e}"))?;

    let tools = Arc::new(modelmux_tools::catalog_for(&profile, None));
    let orchestrator = ChatOrchestrator::new(Arc::new(catalog), history, &config);

    let session_id = match session {
        Some(s) => SessionId::from(&s),
        None => SessionId::new(),
    };

    // Ctrl+C abandons the in-flight turn without persisting it
    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        });
    }

    if let Some(msg) = message {
        run_one(
            &orchestrator,
            &profile,
            &session_id,
            Turn::user(msg),
            tools,
            stream,
            &cancel,
        )
        .await?;
        eprintln!("session: {session_id}");
        return Ok(());
    }

    // Interactive mode
    println!();
    println!("  modelmux — agent '{agent_id}' via '{}'", profile.provider_instance_id);
    println!("  session: {session_id}");
    if !tools.is_empty() {
        println!("  tools:   {}", tools.names().join(", "));
    }
    println!("  Type your message and press Enter. 'exit' or Ctrl+C quits.");
    println!();

    let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("you > ");
        std::io::stdout().flush()?;

        let line = tokio::select! {
            _ = cancel.cancelled() => break,
            line = lines.next_line() => line?,
        };
        let Some(line) = line else { break };
        let text = line.trim();
        if text.is_empty() {
            continue;
        }
        if text == "exit" || text == "quit" {
            break;
        }

        if let Err(e) = run_one(
            &orchestrator,
            &profile,
            &session_id,
            Turn::user(text),
            tools.clone(),
            stream,
            &cancel,
        )
        .await
        {
            eprintln!("[error] {e}");
        }
        println!();
    }

    println!("\nbye");
    Ok(())
}

async fn run_one(
    orchestrator: &ChatOrchestrator,
    profile: &AgentProfile,
    session_id: &SessionId,
    user_turn: Turn,
    tools: Arc<ToolCatalog>,
    stream: bool,
    cancel: &CancellationToken,
) -> Result<(), Box<dyn std::error::Error>> {
    if stream {
        let rx = orchestrator
            .run_turn_streaming(profile, session_id, user_turn, tools, cancel.clone())
            .await?;
        render_stream(rx).await
    } else {
        let outcome = orchestrator
            .run_turn(profile, session_id, user_turn, tools)
            .await?;
        println!("{}", outcome.reply.content);
        tracing::debug!(
            rounds = outcome.rounds,
            total_tokens = outcome.usage.total_tokens,
            "Turn complete"
        );
        Ok(())
    }
}

async fn render_stream(
    mut rx: tokio::sync::mpsc::Receiver<TurnStreamEvent>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut failed = None;

    while let Some(event) = rx.recv().await {
        match event {
            TurnStreamEvent::Fragment { content } => {
                print!("{content}");
                std::io::stdout().flush()?;
            }
            TurnStreamEvent::ToolCall { name, .. } => {
                eprintln!("[tool] calling {name}...");
            }
            TurnStreamEvent::ToolResult { name, success, .. } => {
                eprintln!("[tool] {name} {}", if success { "ok" } else { "failed" });
            }
            TurnStreamEvent::Done { usage, rounds, .. } => {
                println!();
                if let Some(usage) = usage {
                    tracing::debug!(rounds, total_tokens = usage.total_tokens, "Turn complete");
                }
            }
            TurnStreamEvent::Error { message } => {
                println!();
                failed = Some(message);
            }
        }
    }

    match failed {
        Some(message) => Err(message.into()),
        None => Ok(()),
    }
}
