//! `modelmux init` — Write a starter configuration file.

use modelmux_config::AppConfig;

const STARTER_CONFIG: &str = r#"# modelmux configuration
#
# Each [[providers]] block is one provider instance; agents reference an
# instance by id. The same remote service can appear twice under different
# ids with different models or keys.

default_agent = "assistant"

# Deployment-wide embedding provider, used by document search.
# Uncomment once an instance below declares the "embedding" capability:
# embedding_instance = "openai-main"

[[providers]]
id = "openai-main"
kind = "remote_compatible"
endpoint = "https://api.openai.com/v1"
# api_key = "sk-..."            # or set MODELMUX_API_KEY
chat_model = "gpt-4o-mini"
capabilities = ["chat"]

[[providers]]
id = "local-1"
kind = "local_runner"
endpoint = "http://localhost:11434"
chat_model = "llama3.1"
capabilities = ["chat"]

[agents.assistant]
provider_instance_id = "openai-main"
system_prompt = "You are a helpful assistant."
enabled_tools = ["calculator"]

[history]
backend = "sqlite"
"#;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config_dir = AppConfig::config_dir();
    let config_path = config_dir.join("config.toml");

    println!("modelmux — first-time setup");
    println!("===========================\n");

    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir)?;
        println!("  created config directory: {}", config_dir.display());
    } else {
        println!("  config directory exists:  {}", config_dir.display());
    }

    if config_path.exists() {
        println!("\n  config already exists at: {}", config_path.display());
        println!("  edit it manually or delete and re-run init.\n");
        return Ok(());
    }

    std::fs::write(&config_path, STARTER_CONFIG)?;
    println!("  created config.toml at:   {}", config_path.display());
    println!("\nNext steps:");
    println!("  1. Edit {} and add your API key", config_path.display());
    println!("  2. Run: modelmux status");
    println!("  3. Run: modelmux chat -m \"hello\"\n");

    Ok(())
}
