//! `jarlsmad`: send one prompt to the Venice API and print the reply.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use futures::StreamExt;
use tokio::io::AsyncWriteExt;

use jarlsmad::agents::AgentRegistry;
use jarlsmad::commands::chat::{
    self, ChatRequest, ConversationMessage, ConversationRole, SystemPromptSetting,
};
use jarlsmad::inference::config::{find_config_path, load_provider_config};
use jarlsmad::inference::{
    ChatCompletionRequest, ChatMessage, ProviderConfig, Role, VeniceClient, VeniceError,
    VeniceParameters, WebSearchMode,
};

#[derive(Parser, Debug)]
#[command(name = "jarlsmad")]
#[command(
    version,
    about = "Chat with the Jarlheim tavern through the Venice API",
    long_about = None
)]
struct Cli {
    /// Prompt to send
    #[arg(value_name = "PROMPT")]
    prompt: String,

    /// Provider configuration file (defaults to a discovered jarlsmad.yaml, then the environment)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Model to use instead of the configured default
    #[arg(short, long)]
    model: Option<String>,

    /// Speak to a registered agent (slug or key, e.g. dungeonMaster)
    #[arg(short, long)]
    agent: Option<String>,

    /// Extra system prompt appended to the built-in one
    #[arg(short, long)]
    system: Option<String>,

    /// Let the provider search the web
    #[arg(long)]
    web_search: bool,

    /// Wait for the whole reply instead of streaming it
    #[arg(long)]
    no_stream: bool,
}

#[tokio::main]
async fn main() {
    jarlsmad::init_tracing();
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = resolve_config(cli.config.as_deref())?;
    let client = VeniceClient::new(config).map_err(user_facing)?;

    let mut request = build_request(&cli, client.default_model())?;
    if let Some(model) = &cli.model {
        request.model = model.clone();
    }

    if cli.no_stream {
        let text = client
            .create_non_streaming_completion(request)
            .await
            .map_err(user_facing)?;
        println!("{text}");
        return Ok(());
    }

    let stream = client.stream_chat_completion(request).await.map_err(user_facing)?;
    let mut stream = std::pin::pin!(stream);
    let mut stdout = tokio::io::stdout();

    loop {
        tokio::select! {
            item = stream.next() => match item {
                Some(fragment) => {
                    let fragment = fragment.map_err(user_facing)?;
                    stdout.write_all(fragment.as_bytes()).await?;
                    stdout.flush().await?;
                }
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("interrupted, dropping stream");
                break;
            }
        }
    }

    stdout.write_all(b"\n").await?;
    stdout.flush().await?;
    Ok(())
}

/// Explicit file, else a discovered `jarlsmad.yaml`, else the environment.
fn resolve_config(explicit: Option<&Path>) -> Result<ProviderConfig> {
    if let Some(path) = explicit {
        return load_provider_config(path)
            .with_context(|| format!("loading config from {}", path.display()));
    }

    let cwd = std::env::current_dir().context("reading current directory")?;
    match find_config_path(&cwd) {
        Ok(path) => load_provider_config(&path)
            .with_context(|| format!("loading config from {}", path.display())),
        Err(_) => Ok(ProviderConfig::from_env()),
    }
}

fn build_request(cli: &Cli, default_model: &str) -> Result<ChatCompletionRequest> {
    let Some(name) = &cli.agent else {
        let chat_request = ChatRequest {
            messages: vec![ConversationMessage {
                id: "cli".into(),
                role: ConversationRole::User,
                content: cli.prompt.clone(),
            }],
            system_prompt: cli.system.as_ref().map(|value| SystemPromptSetting {
                value: value.clone(),
                enabled: true,
            }),
            model: None,
            web_search_enabled: cli.web_search,
        };
        return chat::build_request(&chat_request, default_model)
            .map_err(|f| anyhow::anyhow!(f.message));
    };

    let registry = AgentRegistry::load_builtin().context("loading agent registry")?;
    let agent = registry.find(name)?;
    tracing::info!(agent = %agent.key, model = %agent.chat_model, "using agent persona");

    let mut request = agent.completion_request(vec![ChatMessage::user(cli.prompt.trim())]);
    if let Some(extra) = &cli.system {
        if let Some(system) = request.messages.iter_mut().find(|m| m.role == Role::System) {
            system.content = format!("{}\n\n{extra}", system.content);
        }
    }
    if cli.web_search {
        request.provider_parameters = Some(VeniceParameters {
            enable_web_search: Some(WebSearchMode::Auto),
            enable_web_citations: Some(true),
            ..VeniceParameters::default()
        });
    }
    Ok(request)
}

fn user_facing(e: VeniceError) -> anyhow::Error {
    tracing::error!(error = %e, kind = ?e.kind(), "request failed");
    anyhow::anyhow!(e.user_message())
}
