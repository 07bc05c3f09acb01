//! # parley-chatd
//!
//! Parley chat server binary — wires rooms, the AI orchestrator, and the
//! HTTP/WebSocket server together.

#![deny(unsafe_code)]

mod settings;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use parley_llm::openai::{DEFAULT_BASE_URL, OpenAiConfig, OpenAiProvider};
use parley_llm::orchestrator::{ChatOrchestrator, OrchestratorConfig};
use parley_llm::provider::Provider;
use parley_llm::search::{BraveSearch, SearchProvider};
use parley_llm::session::ConversationStore;
use parley_rooms::RoomDirectory;
use parley_server::{ParleyServer, ServerConfig};

use crate::settings::ParleySettings;

/// Parley chat server.
#[derive(Parser, Debug)]
#[command(name = "parley-chatd", about = "Parley chat server")]
struct Cli {
    /// Host to bind (overrides settings if specified).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind (overrides settings if specified; 0 for auto-assign).
    #[arg(long)]
    port: Option<u16>,

    /// Path to the settings file (defaults to `~/.parley/settings.json`).
    #[arg(long)]
    config: Option<PathBuf>,
}

fn build_orchestrator(settings: &ParleySettings, client: reqwest::Client) -> ChatOrchestrator {
    let chat = &settings.chat;
    let providers = &settings.providers;

    let openai_config = OpenAiConfig {
        base_url: providers
            .openai_base_url
            .clone()
            .unwrap_or_else(|| DEFAULT_BASE_URL.into()),
        api_key: providers.openai_api_key.clone().unwrap_or_default(),
    };
    let provider: Arc<dyn Provider> =
        Arc::new(OpenAiProvider::with_client(openai_config, client));

    let search: Option<Arc<dyn SearchProvider>> = providers.brave_api_key.as_ref().map(|key| {
        Arc::new(BraveSearch::new(key.clone())) as Arc<dyn SearchProvider>
    });

    let store = Arc::new(ConversationStore::new(chat.session_cap));
    let config = OrchestratorConfig {
        primary_model: chat.primary_model.clone(),
        fallback_model: chat.fallback_model.clone(),
        system_prompt: chat.system_prompt.clone(),
        max_search_results: chat.max_search_results,
        max_tokens: chat.max_tokens,
        temperature: chat.temperature,
        retry: chat.retry.clone(),
    };
    ChatOrchestrator::new(provider, search, store, config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let settings_path = args.config.unwrap_or_else(settings::settings_path);
    let settings = settings::load_settings_from_path(&settings_path)
        .with_context(|| format!("failed to load settings from {}", settings_path.display()))?;

    if settings.providers.openai_api_key.is_none() {
        tracing::warn!(
            "no OpenAI API key configured — chat requests will fail (set OPENAI_API_KEY)"
        );
    }
    if settings.providers.brave_api_key.is_some() {
        tracing::info!("Brave API key loaded — search augmentation enabled");
    } else {
        tracing::info!("no Brave API key — search augmentation disabled");
    }

    let client = reqwest::Client::new();
    let orchestrator = Arc::new(build_orchestrator(&settings, client));
    let directory = Arc::new(RoomDirectory::new());

    let config = ServerConfig {
        host: args.host.unwrap_or(settings.server.host.clone()),
        port: args.port.unwrap_or(settings.server.port),
        ..settings.server.clone()
    };

    tracing::info!(
        primary_model = settings.chat.primary_model.as_str(),
        fallback_model = settings.chat.fallback_model.as_str(),
        "starting parley-chatd"
    );

    let server = Arc::new(ParleyServer::new(config, directory, orchestrator));
    let (_addr, serve_handle) = server
        .listen()
        .await
        .context("failed to bind server listener")?;

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c")?;

    tracing::info!("shutting down...");
    server
        .shutdown()
        .graceful_shutdown(vec![serve_handle], None)
        .await;
    tracing::info!("shutdown complete");
    Ok(())
}
