//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`ParleySettings::default()`]
//! 2. If the settings file exists, deep-merge user values over defaults
//! 3. Apply `PARLEY_*` environment variable overrides (highest priority)
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use parley_core::retry::RetryConfig;
use parley_llm::session::DEFAULT_SESSION_CAP;
use parley_server::ServerConfig;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

/// Errors from settings loading.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    /// Settings file could not be read.
    #[error("failed to read settings: {0}")]
    Io(#[from] std::io::Error),

    /// Settings file contained invalid JSON or the wrong shape.
    #[error("failed to parse settings: {0}")]
    Json(#[from] serde_json::Error),
}

/// AI chat settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ChatSettings {
    /// Model tried first for every request.
    pub primary_model: String,
    /// Model tried once when the primary is unavailable.
    pub fallback_model: String,
    /// Base system instructions.
    pub system_prompt: String,
    /// Upper bound on search results injected into context.
    pub max_search_results: usize,
    /// Maximum tokens per generation.
    pub max_tokens: Option<u32>,
    /// Sampling temperature.
    pub temperature: Option<f64>,
    /// Turns retained per conversation.
    pub session_cap: usize,
    /// Backoff settings for transient provider errors.
    pub retry: RetryConfig,
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self {
            primary_model: "gpt-4o".into(),
            fallback_model: "gpt-4o-mini".into(),
            system_prompt: "You are a helpful assistant in a group chat. Keep replies concise."
                .into(),
            max_search_results: 3,
            max_tokens: Some(1024),
            temperature: None,
            session_cap: DEFAULT_SESSION_CAP,
            retry: RetryConfig::default(),
        }
    }
}

/// External provider credentials and endpoints.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ProviderSettings {
    /// OpenAI-compatible endpoint base URL (defaults to the public API).
    pub openai_base_url: Option<String>,
    /// OpenAI API key.
    pub openai_api_key: Option<String>,
    /// Brave Search API key; search augmentation is disabled without one.
    pub brave_api_key: Option<String>,
}

/// Top-level settings for the Parley server.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ParleySettings {
    /// HTTP/WebSocket server settings.
    pub server: ServerConfig,
    /// AI chat settings.
    pub chat: ChatSettings,
    /// External provider credentials.
    pub providers: ProviderSettings,
}

/// Resolve the path to the settings file (`~/.parley/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".parley").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<ParleySettings, SettingsError> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// If the file does not exist, returns defaults. If the file contains
/// invalid JSON, returns an error.
pub fn load_settings_from_path(path: &Path) -> Result<ParleySettings, SettingsError> {
    let defaults = serde_json::to_value(ParleySettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    let mut settings: ParleySettings = serde_json::from_value(merged)?;
    apply_env_overrides(&mut settings);
    Ok(settings)
}

/// Recursive deep merge of two JSON values.
///
/// - Objects are merged recursively (source overrides target per-key)
/// - Arrays and primitives are replaced entirely by source
/// - Null values in source are skipped (preserving target)
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = if let Some(target_val) = target_map.remove(&key) {
                    deep_merge(target_val, source_val)
                } else {
                    source_val
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply environment variable overrides to loaded settings.
///
/// Invalid values are silently ignored (fall back to file/default). Plain
/// `OPENAI_API_KEY` / `BRAVE_API_KEY` are honored so keys do not have to
/// live in the settings file.
pub fn apply_env_overrides(settings: &mut ParleySettings) {
    if let Some(v) = read_env_string("PARLEY_HOST") {
        settings.server.host = v;
    }
    if let Some(v) = read_env_u16("PARLEY_PORT") {
        settings.server.port = v;
    }
    if let Some(v) = read_env_string("PARLEY_PRIMARY_MODEL") {
        settings.chat.primary_model = v;
    }
    if let Some(v) = read_env_string("PARLEY_FALLBACK_MODEL") {
        settings.chat.fallback_model = v;
    }
    if let Some(v) = read_env_usize("PARLEY_SESSION_CAP", 1, 10_000) {
        settings.chat.session_cap = v;
    }
    if let Some(v) = read_env_string("PARLEY_OPENAI_BASE_URL") {
        settings.providers.openai_base_url = Some(v);
    }
    if let Some(v) =
        read_env_string("PARLEY_OPENAI_API_KEY").or_else(|| read_env_string("OPENAI_API_KEY"))
    {
        settings.providers.openai_api_key = Some(v);
    }
    if let Some(v) =
        read_env_string("PARLEY_BRAVE_API_KEY").or_else(|| read_env_string("BRAVE_API_KEY"))
    {
        settings.providers.brave_api_key = Some(v);
    }
}

fn read_env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn read_env_u16(name: &str) -> Option<u16> {
    std::env::var(name).ok()?.trim().parse().ok()
}

fn read_env_usize(name: &str, min: usize, max: usize) -> Option<usize> {
    let v: usize = std::env::var(name).ok()?.trim().parse().ok()?;
    (min..=max).contains(&v).then_some(v)
}
