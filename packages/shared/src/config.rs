//! Application configuration for zenrag.
//!
//! User config lives at `~/.zenrag/zenrag.toml`. CLI flags override config
//! file values, which override defaults. API keys are never stored in the
//! file — only the names of the environment variables that hold them.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, ZenragError};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "zenrag.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".zenrag";

// ---------------------------------------------------------------------------
// Config structs (matching zenrag.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Global defaults.
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// Source workspace API settings.
    #[serde(default)]
    pub workspace: WorkspaceApiConfig,

    /// Enrichment API settings.
    #[serde(default)]
    pub enrichment: EnrichmentApiConfig,

    /// HTTP client retry/backoff policy.
    #[serde(default)]
    pub client: ClientConfig,
}

/// `[defaults]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Default output directory for data and logs.
    #[serde(default = "default_output_dir")]
    pub output_dir: String,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
        }
    }
}

fn default_output_dir() -> String {
    "output".into()
}

/// `[workspace]` section — the Zenhub-style source API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceApiConfig {
    /// Base URL of the workspace API.
    #[serde(default = "default_workspace_base")]
    pub api_base: String,

    /// Name of the env var holding the bearer token (never the token itself).
    #[serde(default = "default_workspace_key_env")]
    pub api_key_env: String,

    /// Items requested per page.
    #[serde(default = "default_per_page")]
    pub per_page: u32,
}

impl Default for WorkspaceApiConfig {
    fn default() -> Self {
        Self {
            api_base: default_workspace_base(),
            api_key_env: default_workspace_key_env(),
            per_page: default_per_page(),
        }
    }
}

fn default_workspace_base() -> String {
    "https://api.zenhub.com/v2".into()
}
fn default_workspace_key_env() -> String {
    "ZENHUB_TOKEN".into()
}
fn default_per_page() -> u32 {
    100
}

/// `[enrichment]` section — the text-generation API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichmentApiConfig {
    /// Base URL of the enrichment API.
    #[serde(default = "default_enrichment_base")]
    pub api_base: String,

    /// Name of the env var holding the API key.
    #[serde(default = "default_enrichment_key_env")]
    pub api_key_env: String,

    /// Default model for enrichment requests.
    #[serde(default = "default_model")]
    pub default_model: String,

    /// Records per enrichment request.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Retry budget per batch.
    #[serde(default = "default_enrich_retries")]
    pub max_retries: u32,

    /// Sampling temperature, forwarded opaquely to the API.
    #[serde(default = "default_temperature")]
    pub temperature: f64,
}

impl Default for EnrichmentApiConfig {
    fn default() -> Self {
        Self {
            api_base: default_enrichment_base(),
            api_key_env: default_enrichment_key_env(),
            default_model: default_model(),
            batch_size: default_batch_size(),
            max_retries: default_enrich_retries(),
            temperature: default_temperature(),
        }
    }
}

fn default_enrichment_base() -> String {
    "https://api.openai.com/v1".into()
}
fn default_enrichment_key_env() -> String {
    "OPENAI_API_KEY".into()
}
fn default_model() -> String {
    "gpt-4o-mini".into()
}
fn default_batch_size() -> usize {
    5
}
fn default_enrich_retries() -> u32 {
    3
}
fn default_temperature() -> f64 {
    0.3
}

/// `[client]` section — retry/backoff for every outbound call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Retry budget for transient failures (429, 5xx, timeouts).
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Base backoff delay in ms; doubles per attempt.
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Backoff cap in ms.
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Per-request client-side deadline in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_max_retries() -> u32 {
    4
}
fn default_base_delay_ms() -> u64 {
    500
}
fn default_max_delay_ms() -> u64 {
    30_000
}
fn default_timeout_secs() -> u64 {
    30
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.zenrag/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| ZenragError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.zenrag/zenrag.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| ZenragError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| ZenragError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| ZenragError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| ZenragError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| ZenragError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Resolve a credential: an explicit CLI value wins, then the configured
/// environment variable. Missing credentials are a fatal config error
/// before any network call is made.
pub fn resolve_token(explicit: Option<&str>, env_var: &str) -> Result<String> {
    if let Some(token) = explicit {
        if !token.is_empty() {
            return Ok(token.to_string());
        }
    }
    match std::env::var(env_var) {
        Ok(val) if !val.is_empty() => Ok(val),
        _ => Err(ZenragError::config(format!(
            "no API token provided. Pass --access-token or set the {env_var} environment variable."
        ))),
    }
}
