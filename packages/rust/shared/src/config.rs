//! Application configuration for Debrief.
//!
//! User config lives at `~/.debrief/debrief.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{DebriefError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "debrief.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".debrief";

// ---------------------------------------------------------------------------
// Config structs (matching debrief.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Global defaults.
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// Embedding-map service settings.
    #[serde(default)]
    pub atlas: AtlasConfig,

    /// Language-model settings.
    #[serde(default)]
    pub llm: LlmConfig,

    /// Article scraping and truncation limits.
    #[serde(default)]
    pub scrape: ScrapeConfig,

    /// Completion cache.
    #[serde(default)]
    pub cache: CacheConfig,
}

/// `[defaults]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Root directory for run checkpoints and the database.
    #[serde(default = "default_output_dir")]
    pub output_dir: String,

    /// Maximum in-flight requests per fan-out stage (0 = unbounded).
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Whether to write JSON checkpoints after each stage.
    #[serde(default = "default_true")]
    pub checkpoints: bool,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            concurrency: default_concurrency(),
            checkpoints: true,
        }
    }
}

fn default_output_dir() -> String {
    "var/debrief".into()
}
fn default_concurrency() -> usize {
    8
}
fn default_true() -> bool {
    true
}

/// `[atlas]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AtlasConfig {
    /// Base URL of the embedding-map API.
    #[serde(default = "default_atlas_url")]
    pub api_url: String,

    /// Name of the map project holding the headlines.
    #[serde(default = "default_project")]
    pub project: String,

    /// Name of the env var holding the API key (never store the key itself).
    #[serde(default = "default_atlas_key_env")]
    pub api_key_env: String,

    /// Depth of the topic hierarchy used for sampling (`_topic_depth_N`).
    #[serde(default = "default_topic_depth")]
    pub topic_depth: u32,

    /// Column holding the datum identifier in map tiles.
    #[serde(default = "default_id_field")]
    pub id_field: String,

    /// Maximum datum ids per data request.
    #[serde(default = "default_fetch_batch_size")]
    pub fetch_batch_size: usize,

    /// Request timeout in seconds.
    #[serde(default = "default_atlas_timeout")]
    pub timeout_secs: u64,
}

impl Default for AtlasConfig {
    fn default() -> Self {
        Self {
            api_url: default_atlas_url(),
            project: default_project(),
            api_key_env: default_atlas_key_env(),
            topic_depth: default_topic_depth(),
            id_field: default_id_field(),
            fetch_batch_size: default_fetch_batch_size(),
            timeout_secs: default_atlas_timeout(),
        }
    }
}

impl AtlasConfig {
    /// Tile column carrying the topic label at the configured depth.
    pub fn topic_column(&self) -> String {
        format!("_topic_depth_{}", self.topic_depth)
    }
}

fn default_atlas_url() -> String {
    "https://api-atlas.nomic.ai".into()
}
fn default_project() -> String {
    "Debrief".into()
}
fn default_atlas_key_env() -> String {
    "ATLAS_API_KEY".into()
}
fn default_topic_depth() -> u32 {
    3
}
fn default_id_field() -> String {
    "id_field".into()
}
fn default_fetch_batch_size() -> usize {
    100
}
fn default_atlas_timeout() -> u64 {
    60
}

/// `[llm]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Base URL of the OpenAI-compatible API.
    #[serde(default = "default_llm_url")]
    pub base_url: String,

    /// Name of the env var holding the API key.
    #[serde(default = "default_llm_key_env")]
    pub api_key_env: String,

    /// Chat model identifier.
    #[serde(default = "default_model")]
    pub model: String,

    /// Sampling temperature.
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Optional cap on generated tokens.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Request timeout in seconds.
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,

    /// Base delay for exponential retry backoff.
    #[serde(default = "default_retry_delay")]
    pub retry_base_delay_ms: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: default_llm_url(),
            api_key_env: default_llm_key_env(),
            model: default_model(),
            temperature: default_temperature(),
            max_tokens: None,
            timeout_secs: default_llm_timeout(),
            retry_base_delay_ms: default_retry_delay(),
        }
    }
}

fn default_llm_url() -> String {
    "https://api.openai.com".into()
}
fn default_llm_key_env() -> String {
    "OPENAI_API_KEY".into()
}
fn default_model() -> String {
    "gpt-4o-mini".into()
}
fn default_temperature() -> f32 {
    0.8
}
fn default_llm_timeout() -> u64 {
    120
}
fn default_retry_delay() -> u64 {
    1000
}

/// How scraped article HTML is turned into text for the model.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArticleFormat {
    /// All visible text nodes of the page.
    #[default]
    Text,
    /// Main content converted to Markdown.
    Markdown,
}

/// `[scrape]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapeConfig {
    /// Article fetch timeout in seconds.
    #[serde(default = "default_scrape_timeout")]
    pub timeout_secs: u64,

    /// Article extraction format.
    #[serde(default)]
    pub format: ArticleFormat,

    /// Feed titles whose records are never scraped.
    #[serde(default = "default_skip_feeds")]
    pub skip_feeds: Vec<String>,

    /// Characters of article text sent for summarization.
    #[serde(default = "default_max_article_chars")]
    pub max_article_chars: usize,

    /// Characters of headline text sent for relevance checks.
    #[serde(default = "default_max_headline_chars")]
    pub max_headline_chars: usize,

    /// Characters of combined summaries sent for the final briefing.
    #[serde(default = "default_max_briefing_input_chars")]
    pub max_briefing_input_chars: usize,

    /// Allow fetching from loopback/private hosts.
    #[serde(default)]
    pub allow_private_hosts: bool,
}

impl Default for ScrapeConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_scrape_timeout(),
            format: ArticleFormat::default(),
            skip_feeds: default_skip_feeds(),
            max_article_chars: default_max_article_chars(),
            max_headline_chars: default_max_headline_chars(),
            max_briefing_input_chars: default_max_briefing_input_chars(),
            allow_private_hosts: false,
        }
    }
}

fn default_scrape_timeout() -> u64 {
    30
}
fn default_skip_feeds() -> Vec<String> {
    vec!["Twitter Feed".into(), "Reddit Feed".into()]
}
fn default_max_article_chars() -> usize {
    12_000
}
fn default_max_headline_chars() -> usize {
    100
}
fn default_max_briefing_input_chars() -> usize {
    14_000
}

/// `[cache]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Reuse stored completions for identical prompts.
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.debrief/`).
pub fn config_dir() -> Result<PathBuf> {
    let home =
        dirs::home_dir().ok_or_else(|| DebriefError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.debrief/debrief.toml`).
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
    let content = std::fs::read_to_string(path).map_err(|e| DebriefError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| DebriefError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| DebriefError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| DebriefError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| DebriefError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Read an API key from the named env var.
pub fn resolve_api_key(var_name: &str) -> Result<String> {
    match std::env::var(var_name) {
        Ok(val) if !val.is_empty() => Ok(val),
        _ => Err(DebriefError::config(format!(
            "API key not found. Set the {var_name} environment variable."
        ))),
    }
}

/// Check that both the embedding-map and language-model keys are present.
pub fn validate_api_keys(config: &AppConfig) -> Result<()> {
    resolve_api_key(&config.atlas.api_key_env)?;
    resolve_api_key(&config.llm.api_key_env)?;
    Ok(())
}
