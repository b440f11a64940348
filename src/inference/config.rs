//! Provider configuration loading.
//!
//! Configuration comes from either a `jarlsmad.yaml` file (with environment
//! variable interpolation) or straight from the process environment. The API
//! key is never hardcoded.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use super::errors::VeniceError;

/// Default Venice API endpoint.
pub const DEFAULT_BASE_URL: &str = "https://api.venice.ai/api/v1";

/// Default connection timeout in seconds.
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Name of the config file searched for by [`find_config_path`].
pub const CONFIG_FILE_NAME: &str = "jarlsmad.yaml";

/// Venice chat and embedding model identifiers.
pub mod models {
    /// Default model for unrestricted narratives.
    pub const UNCENSORED: &str = "venice-uncensored";

    pub const LLAMA_3_3_70B: &str = "llama-3.3-70b";
    pub const LLAMA_3_1_405B: &str = "llama-3.1-405b";
    pub const LLAMA_3_2_3B: &str = "llama-3.2-3b";

    pub const QWEN_REASONING: &str = "qwen-2.5-qwq-32b";
    pub const QWEN_LARGE: &str = "qwen3-235b";
    pub const QWEN_SMALL: &str = "qwen3-4b";
    pub const QWEN_CODER: &str = "qwen-2.5-coder-32b";

    pub const DOLPHIN: &str = "dolphin-2.9.2-qwen2-72b";
    pub const DEEPSEEK_R1: &str = "deepseek-r1-671b";
    pub const MISTRAL: &str = "mistral-31-24b";
    pub const DEEPSEEK_CODER: &str = "deepseek-coder-v2-lite";

    /// Embedding model used by the agent personas. Venice serves it through
    /// its OpenAI-compatible surface.
    pub const EMBEDDING_SMALL: &str = "text-embedding-3-small";
}

// ─── Public Types ────────────────────────────────────────────────────────────

/// Connection settings for the Venice API.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ProviderConfig {
    /// Bearer token. `None` (or blank) fails every request before it is sent.
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_model")]
    pub default_model: String,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    /// Overall deadline for one request. Unset means the caller imposes one.
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}
fn default_model() -> String {
    models::UNCENSORED.to_string()
}
fn default_connect_timeout() -> u64 {
    DEFAULT_CONNECT_TIMEOUT_SECS
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_base_url(),
            default_model: default_model(),
            connect_timeout_secs: default_connect_timeout(),
            request_timeout_secs: None,
        }
    }
}

impl ProviderConfig {
    /// Config with the given key and every other setting at its default.
    pub fn with_api_key(api_key: impl Into<String>) -> Self {
        Self {
            api_key: Some(api_key.into()),
            ..Self::default()
        }
    }

    /// Build the config from environment variables.
    ///
    /// `VENICE_API_KEY` (falling back to `VITE_VENICE_API_KEY`),
    /// `VENICE_BASE_URL` and `VENICE_MODEL`. Missing values keep their defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            api_key: non_blank_env("VENICE_API_KEY")
                .or_else(|| non_blank_env("VITE_VENICE_API_KEY")),
            base_url: non_blank_env("VENICE_BASE_URL").unwrap_or(defaults.base_url),
            default_model: non_blank_env("VENICE_MODEL").unwrap_or(defaults.default_model),
            ..defaults
        }
    }

    /// The API key, if one is configured and not blank.
    pub fn api_key(&self) -> Option<&str> {
        self.api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
    }

    /// Short, non-secret rendering of the key for log lines.
    pub fn masked_api_key(&self) -> String {
        match self.api_key() {
            Some(key) => {
                let prefix: String = key.chars().take(4).collect();
                format!("{prefix}…")
            }
            None => "NOT FOUND".to_string(),
        }
    }
}

fn non_blank_env(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

// ─── Loading ─────────────────────────────────────────────────────────────────

/// Locate `jarlsmad.yaml`.
///
/// Honors `JARLSMAD_CONFIG` first, then searches upward from `start`.
pub fn find_config_path(start: &Path) -> Result<PathBuf, VeniceError> {
    if let Ok(explicit) = std::env::var("JARLSMAD_CONFIG") {
        let candidate = PathBuf::from(expand_tilde(&explicit));
        if candidate.exists() {
            return Ok(candidate);
        }
        return Err(VeniceError::ConfigError {
            reason: format!("JARLSMAD_CONFIG points at missing file {}", candidate.display()),
        });
    }

    let mut dir = start.to_path_buf();
    loop {
        let candidate = dir.join(CONFIG_FILE_NAME);
        if candidate.exists() {
            return Ok(candidate);
        }
        if !dir.pop() {
            break;
        }
    }

    Err(VeniceError::ConfigError {
        reason: format!("could not find {CONFIG_FILE_NAME}"),
    })
}

/// Load and parse a provider configuration file.
///
/// String values may reference `${VAR_NAME}` or `${VAR_NAME:-default}`.
pub fn load_provider_config(path: &Path) -> Result<ProviderConfig, VeniceError> {
    let raw = std::fs::read_to_string(path).map_err(|e| VeniceError::ConfigError {
        reason: format!("failed to read {}: {e}", path.display()),
    })?;

    parse_provider_config(&raw)
}

/// Parse configuration YAML after environment interpolation.
pub fn parse_provider_config(raw: &str) -> Result<ProviderConfig, VeniceError> {
    let interpolated = interpolate_env_vars(raw);

    let config: ProviderConfig =
        serde_yaml::from_str(&interpolated).map_err(|e| VeniceError::ConfigError {
            reason: format!("failed to parse config: {e}"),
        })?;

    if !config.base_url.starts_with("http://") && !config.base_url.starts_with("https://") {
        return Err(VeniceError::ConfigError {
            reason: format!("base_url must be an http(s) URL, got '{}'", config.base_url),
        });
    }

    Ok(config)
}

// ─── Env-var interpolation ───────────────────────────────────────────────────

/// Replace `${VAR}` and `${VAR:-default}` in a string.
fn interpolate_env_vars(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && chars.peek() == Some(&'{') {
            chars.next();
            let mut var_expr = String::new();
            for c in chars.by_ref() {
                if c == '}' {
                    break;
                }
                var_expr.push(c);
            }
            result.push_str(&resolve_var_expr(&var_expr));
        } else {
            result.push(ch);
        }
    }

    result
}

fn resolve_var_expr(expr: &str) -> String {
    match expr.split_once(":-") {
        Some((name, default)) => std::env::var(name).unwrap_or_else(|_| default.to_string()),
        None => std::env::var(expr).unwrap_or_default(),
    }
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &str) -> String {
    if let Some(rest) = path.strip_prefix('~') {
        if let Some(home) = dirs::home_dir() {
            return format!("{}{rest}", home.display());
        }
    }
    path.to_string()
}

// ─── Tests ───────────────────────────────────────────────────────────────────
