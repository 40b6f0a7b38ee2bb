//! `modelmux status` — Boot the provider registry and show what registered.

use modelmux_config::AppConfig;
use modelmux_engines::standard_modules;
use modelmux_registry::boot;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

    println!("modelmux status");
    println!("===============");
    println!("  config dir:     {}", AppConfig::config_dir().display());
    println!("  default agent:  {}", config.default_agent);
    println!(
        "  embedding via:  {}",
        config.embedding_instance.as_deref().unwrap_or("(none)")
    );
    println!("  history:        {}", config.history.backend);
    println!("  providers:      {}", config.providers.len());
    println!("  agents:         {}", config.agents.len());
    println!();

    let modules = standard_modules();
    let (_catalog, report) = boot(&config, &modules)?;
    print!("{}", report.summary());

    let config_path = AppConfig::config_dir().join("config.toml");
    if !config_path.exists() {
        println!("\n  no config file — run `modelmux init` first");
    }

    Ok(())
}
