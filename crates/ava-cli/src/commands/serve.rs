//! Serve command - run the supervisor behind the stdio protocol.

use ava_local_ai::{protocol, Boundary, ProcessSupervisor, SupervisorConfig};
use tokio::io::BufReader;
use tracing::info;

pub(crate) async fn run(config: SupervisorConfig) -> miette::Result<()> {
    info!(
        registry = %config.registry_path.display(),
        base_port = config.base_port,
        "starting model supervisor"
    );

    let (boundary, handle) = Boundary::new(ProcessSupervisor::new(config));
    let event_loop = tokio::spawn(boundary.run());

    let stdin = BufReader::new(tokio::io::stdin());
    let stdout = tokio::io::stdout();

    let result = tokio::select! {
        result = protocol::serve(handle.clone(), stdin, stdout) => {
            result.map_err(|e| miette::miette!("Protocol I/O failed: {}", e))
        }
        _ = tokio::signal::ctrl_c() => {
            info!("interrupted");
            Ok(())
        }
    };

    // Every model process goes down with the host
    handle.shutdown().await;
    event_loop
        .await
        .map_err(|e| miette::miette!("Supervisor task failed: {}", e))?;

    result
}
