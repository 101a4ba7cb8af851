//! Chat command - start a model and stream one reply.

use std::io::Write;
use std::time::Duration;

use ava_local_ai::{
    ChatClient, ChatCompletionParams, ChatMessage, ModelReady, ProcessSupervisor, SpawnOutcome,
    StreamAccumulator, SupervisorConfig,
};
use ava_registry::read_registry;
use futures_util::StreamExt;
use tokio::sync::broadcast::{self, error::RecvError};

pub(crate) struct ChatArgs {
    pub model: String,
    pub prompt: String,
    pub system: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub timeout: Duration,
}

pub(crate) async fn run(config: SupervisorConfig, args: ChatArgs) -> miette::Result<()> {
    let registry = read_registry(&config.registry_path)
        .await
        .map_err(|e| miette::miette!("Failed to read model config: {}", e))?;
    let model = registry
        .find(&args.model)
        .cloned()
        .ok_or_else(|| miette::miette!("Model '{}' not found", args.model))?;

    let mut messages = Vec::new();
    if let Some(system) = &args.system {
        messages.push(ChatMessage::system(system.as_str()));
    }
    messages.push(ChatMessage::user(args.prompt.as_str()));

    let mut params = ChatCompletionParams {
        model: model.id.clone(),
        temperature: args.temperature,
        max_tokens: args.max_tokens,
        ..Default::default()
    };

    // Remote models have nothing to launch
    if let Some(client) = ChatClient::for_remote(&model) {
        if let Some(api_model) = &model.api_model_id {
            params.model = api_model.clone();
        }
        return stream_reply(&client, &messages, &params).await;
    }

    let supervisor = ProcessSupervisor::new(config);
    let mut ready = supervisor.subscribe();
    let port = match supervisor
        .spawn(&model.id)
        .await
        .map_err(|e| miette::miette!("Failed to start model: {}", e))?
    {
        SpawnOutcome::Launched { port, .. } | SpawnOutcome::AlreadyRunning { port } => port,
    };

    eprintln!("Waiting for {} on port {}...", model.name, port);
    let result = match tokio::time::timeout(
        args.timeout,
        wait_ready(&supervisor, &mut ready, &model.id),
    )
    .await
    {
        Ok(Ok(())) => stream_reply(&ChatClient::with_port(port), &messages, &params).await,
        Ok(Err(e)) => Err(e),
        Err(_) => Err(miette::miette!(
            "Model '{}' did not become ready within {}s",
            model.id,
            args.timeout.as_secs()
        )),
    };

    supervisor.shutdown().await;
    result
}

async fn wait_ready(
    supervisor: &ProcessSupervisor,
    ready: &mut broadcast::Receiver<ModelReady>,
    model_id: &str,
) -> miette::Result<()> {
    let mut poll = tokio::time::interval(Duration::from_millis(500));
    loop {
        tokio::select! {
            event = ready.recv() => match event {
                Ok(event) if event.model_id == model_id => return Ok(()),
                Ok(_) | Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => return Err(miette::miette!("Supervisor stopped")),
            },
            _ = poll.tick() => match supervisor.status(model_id).await {
                Some(status) if status.is_initialized => return Ok(()),
                Some(_) => {}
                None => {
                    return Err(miette::miette!(
                        "Model '{}' exited before becoming ready",
                        model_id
                    ))
                }
            },
        }
    }
}

async fn stream_reply(
    client: &ChatClient,
    messages: &[ChatMessage],
    params: &ChatCompletionParams,
) -> miette::Result<()> {
    let mut stream = client
        .complete_stream(messages, params)
        .await
        .map_err(|e| miette::miette!("Chat request failed: {}", e))?;

    let mut reply = StreamAccumulator::new();
    let mut stdout = std::io::stdout();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| miette::miette!("Chat stream failed: {}", e))?;
        print!("{}", reply.push(&chunk));
        stdout.flush().ok();
    }
    println!();

    if !reply.is_finished() {
        tracing::warn!("reply stream ended without a finish reason");
    }

    Ok(())
}
