//! modelmux CLI — the main entry point.
//!
//! Commands:
//! - `init`    — Write a starter config file
//! - `chat`    — Interactive chat or single-message mode
//! - `status`  — Boot the registry and show what registered
//! - `models`  — List models behind each registered chat engine

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "modelmux",
    about = "modelmux — route conversational AI across inference providers",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a starter configuration file
    Init,

    /// Chat through a configured agent
    Chat {
        /// Send a single message instead of entering interactive mode
        #[arg(short, long)]
        message: Option<String>,

        /// Agent to use (defaults to the configured default_agent)
        #[arg(short, long)]
        agent: Option<String>,

        /// Session id to continue (a new one is created when omitted)
        #[arg(short, long)]
        session: Option<String>,

        /// Stream the response as it is generated
        #[arg(long)]
        stream: bool,
    },

    /// Boot the provider registry and show what registered
    Status,

    /// List models available behind each registered chat engine
    Models,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    match cli.command {
        Commands::Init => commands::init::run().await?,
        Commands::Chat {
            message,
            agent,
            session,
            stream,
        } => commands::chat::run(message, agent, session, stream).await?,
        Commands::Status => commands::status::run().await?,
        Commands::Models => commands::models::run().await?,
    }

    Ok(())
}
