use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Error, Result};

/// How translated text is written back relative to the original
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InsertMode {
    #[default]
    Replace,
    Append,
    Prepend,
}

impl InsertMode {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "replace" => Some(Self::Replace),
            "append" => Some(Self::Append),
            "prepend" => Some(Self::Prepend),
            _ => None,
        }
    }
}

/// Reasoning switch sent to providers that support one
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThinkingMode {
    /// Leave the provider default alone
    #[default]
    Default,
    Enable,
    Disable,
}

/// Chat-completion backend configuration for OpenAI-compatible APIs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_model_id")]
    pub model_id: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_top_p")]
    pub top_p: f32,
    /// Per-call timeout enforced by the HTTP client
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Maximum in-flight requests
    #[serde(default = "default_concurrent")]
    pub concurrent: usize,
    /// Retries per call on transport failure
    #[serde(default = "default_retry")]
    pub retry: usize,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    /// Ceiling on retries across all calls of one translate run
    #[serde(default = "default_max_total_retries")]
    pub max_total_retries: usize,
    #[serde(default)]
    pub thinking: ThinkingMode,
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_model_id() -> String {
    "gpt-4o-mini".to_string()
}

const fn default_temperature() -> f32 {
    0.7
}

const fn default_top_p() -> f32 {
    0.9
}

const fn default_timeout_secs() -> u64 {
    1200
}

const fn default_concurrent() -> usize {
    30
}

const fn default_retry() -> usize {
    2
}

const fn default_retry_delay_ms() -> u64 {
    500
}

const fn default_max_total_retries() -> usize {
    10
}

impl AgentConfig {
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<String>,
        model_id: impl Into<String>,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            api_key,
            model_id: model_id.into(),
            ..Self::default()
        }
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key: None,
            model_id: default_model_id(),
            temperature: default_temperature(),
            top_p: default_top_p(),
            timeout_secs: default_timeout_secs(),
            concurrent: default_concurrent(),
            retry: default_retry(),
            retry_delay_ms: default_retry_delay_ms(),
            max_total_retries: default_max_total_retries(),
            thinking: ThinkingMode::Default,
        }
    }
}

/// One configured glossary pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlossaryEntryConfig {
    pub src: String,
    pub dst: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GlossaryConfig {
    /// Extract a glossary from the document before translating
    #[serde(default)]
    pub enabled: bool,

    /// Entries known up front; they win over extracted ones
    #[serde(default)]
    pub entries: Vec<GlossaryEntryConfig>,
}

/// Converter cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Maximum cached conversions (oldest evicted first)
    #[serde(default = "default_cache_capacity")]
    pub capacity: usize,
}

const fn default_cache_capacity() -> usize {
    10
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: default_cache_capacity(),
        }
    }
}

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Target language, as free text passed to the model
    #[serde(default = "default_to_lang")]
    pub to_lang: String,

    /// Extra rules appended to every translation prompt
    #[serde(default)]
    pub custom_prompt: Option<String>,

    /// Upper bound on the serialized size of one prompt, in bytes
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    #[serde(default)]
    pub insert_mode: InsertMode,

    /// Separator for append/prepend; each format has its own default
    #[serde(default)]
    pub separator: Option<String>,

    /// xlsx only: `Sheet1!A1:B10`, `C:D`, `3:5`, `E5`
    #[serde(default)]
    pub translate_regions: Vec<String>,

    /// json only: JSONPath expressions selecting what to translate
    #[serde(default = "default_json_paths")]
    pub json_paths: Vec<String>,

    #[serde(default)]
    pub glossary: GlossaryConfig,

    /// Converter used for formats translated through markdown
    #[serde(default = "default_convert_engine")]
    pub convert_engine: String,

    #[serde(default)]
    pub agent: AgentConfig,

    #[serde(default)]
    pub cache: CacheConfig,
}

fn default_to_lang() -> String {
    "中文".to_string()
}

const fn default_chunk_size() -> usize {
    3000
}

fn default_json_paths() -> Vec<String> {
    vec!["$".to_string()]
}

fn default_convert_engine() -> String {
    "identity".to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            to_lang: default_to_lang(),
            custom_prompt: None,
            chunk_size: default_chunk_size(),
            insert_mode: InsertMode::Replace,
            separator: None,
            translate_regions: Vec::new(),
            json_paths: default_json_paths(),
            glossary: GlossaryConfig::default(),
            convert_engine: default_convert_engine(),
            agent: AgentConfig::default(),
            cache: CacheConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            Error::ConfigLoad(format!(
                "Failed to read config file {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;

        let config: Self = toml::from_str(&content)
            .map_err(|e| Error::ConfigLoad(format!("Failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from default locations, lowest precedence first:
    /// `~/.config/doc-translator/config.toml`, `./config.toml`, then
    /// `DOCTRANS_*` environment variables (`DOCTRANS_AGENT__API_KEY`, ...).
    pub fn load() -> Result<Self> {
        let mut builder = ::config::Config::builder();

        if let Some(user_config) = crate::util::user_config_path() {
            tracing::debug!("Looking for config at {}", user_config.display());
            builder = builder.add_source(::config::File::from(user_config).required(false));
        }

        let config: Self = builder
            .add_source(::config::File::new("config.toml", ::config::FileFormat::Toml).required(false))
            .add_source(
                ::config::Environment::with_prefix("DOCTRANS")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .and_then(::config::Config::try_deserialize)
            .map_err(|e| Error::ConfigLoad(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(Error::ConfigInvalid {
                field: "chunk_size".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.agent.concurrent == 0 {
            return Err(Error::ConfigInvalid {
                field: "agent.concurrent".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }
        if !(0.0..=2.0).contains(&self.agent.temperature) {
            return Err(Error::ConfigInvalid {
                field: "agent.temperature".to_string(),
                reason: format!("{} is outside 0.0..=2.0", self.agent.temperature),
            });
        }
        Ok(())
    }
}
