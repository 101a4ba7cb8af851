//! Info command - show paths and runtime configuration.

use ava_local_ai::SupervisorConfig;
use ava_registry::paths;

pub(crate) fn run(config: &SupervisorConfig) -> miette::Result<()> {
    println!("Ava Model Supervisor");
    println!("====================");
    println!();
    println!("Version: {}", env!("CARGO_PKG_VERSION"));
    println!();

    println!("Model config:     {}", config.registry_path.display());
    println!("  Exists: {}", config.registry_path.exists());
    println!("Data directory:   {}", paths::ava_data_dir().display());
    println!();

    match &config.runtime_binary {
        Some(path) => println!("llamafile:        {}", path.display()),
        None => {
            println!("llamafile:        not found");
            println!("  Searched:");
            for candidate in paths::llamafile_candidates() {
                println!("    {}", candidate.display());
            }
        }
    }
    println!();

    println!("Base port:        {}", config.base_port);
    match config.kill_grace {
        Some(grace) => println!("Kill grace:       {}s", grace.as_secs()),
        None => println!("Kill grace:       disabled"),
    }

    Ok(())
}
