//! Models command - list the registry.

use ava_local_ai::{ModelKind, SupervisorConfig};
use ava_registry::{read_registry, ModelAvailability};

pub(crate) async fn run(config: &SupervisorConfig, json: bool) -> miette::Result<()> {
    let registry = read_registry(&config.registry_path)
        .await
        .map_err(|e| miette::miette!("Failed to read model config: {}", e))?;

    if json {
        let out = serde_json::to_string_pretty(&registry)
            .map_err(|e| miette::miette!("Failed to serialize model config: {}", e))?;
        println!("{}", out);
        return Ok(());
    }

    if registry.models.is_empty() {
        println!("No models configured.");
        println!();
        println!("Add models to: {}", config.registry_path.display());
        return Ok(());
    }

    println!("Models:");
    for model in &registry.models {
        let kind = match model.kind {
            ModelKind::LocalWeights => "gguf",
            ModelKind::RemoteApi => "api",
        };
        print!(
            "  {:<20} {:<30} {:<4} {}",
            model.id,
            model.name,
            kind,
            availability_label(model.availability())
        );
        if model.kind == ModelKind::LocalWeights && model.required_memory_gb() > 0.0 {
            print!(" ({:.1} GB)", model.required_memory_gb());
        }
        println!();
    }

    for id in registry.duplicate_ids() {
        println!("  warning: duplicate id '{}', only the first entry is used", id);
    }

    Ok(())
}

fn availability_label(availability: ModelAvailability) -> &'static str {
    match availability {
        ModelAvailability::NotInstalled => "not installed",
        ModelAvailability::Available => "available",
        ModelAvailability::NeedApiKey => "needs API key",
        ModelAvailability::ApiKeyInstalled => "API key set",
    }
}
