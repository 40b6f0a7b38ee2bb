//! `modelmux models` — List models behind each registered chat engine.

use modelmux_config::AppConfig;
use modelmux_core::Capability;
use modelmux_engines::standard_modules;
use modelmux_registry::boot;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

    let modules = standard_modules();
    let (catalog, report) = boot(&config, &modules)?;

    if !report.ready_at_boot {
        eprintln!("System is not ready:");
        eprint!("{}", report.summary());
        return Err("boot gate closed, nothing registered".into());
    }

    if catalog.is_empty() {
        println!("No engines registered. Run `modelmux status` for details.");
        return Ok(());
    }

    for (capability, instance_id) in catalog.registered_keys() {
        // Chat handles carry the model-listing endpoint; the vision and
        // embedding keys point at the same engines.
        if capability != Capability::Chat {
            continue;
        }
        let engine = catalog.resolve_chat(&instance_id)?;

        println!("{instance_id} ({}):", engine.provider_name());
        match engine.list_models().await {
            Ok(models) if models.is_empty() => println!("  (no models reported)"),
            Ok(models) => {
                for model in models {
                    println!("  {model}");
                }
            }
            Err(e) => println!("  error: {e}"),
        }
        println!();
    }

    Ok(())
}
