use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::conversation::DEFAULT_GREETING;
use crate::error::{ChatError, Result};
use crate::generation::{
    GenerationConfig, Model, DEFAULT_MAX_TOKENS, DEFAULT_TEMPERATURE, MAX_MAX_TOKENS,
    MAX_TEMPERATURE, MIN_MAX_TOKENS, MIN_TEMPERATURE,
};
use crate::llm::DEFAULT_BASE_URL;

pub const DEFAULT_API_KEY_ENV: &str = "OPENAI_API_KEY";

/// Main application configuration, read from `~/.streamchat/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Explicit credential; takes precedence over the environment
    pub api_key: Option<String>,

    /// Environment variable holding the credential
    pub api_key_env: String,

    /// Base URL of the OpenAI-compatible API
    pub base_url: String,

    pub connect_timeout_secs: u64,

    /// Initial generation settings for new sessions
    pub generation: GenerationDefaults,

    pub ui: UiConfig,
}

/// Generation settings as written in the file. Not validated until
/// [`GenerationDefaults::to_generation_config`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationDefaults {
    pub model: Model,
    pub temperature: f32,
    pub max_tokens: u32,
}

/// UI configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UiConfig {
    pub greeting: String,
    pub show_timestamps: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            api_key: None,
            api_key_env: DEFAULT_API_KEY_ENV.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            connect_timeout_secs: 10,
            generation: GenerationDefaults::default(),
            ui: UiConfig::default(),
        }
    }
}

impl Default for GenerationDefaults {
    fn default() -> Self {
        Self {
            model: Model::default(),
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            greeting: DEFAULT_GREETING.to_string(),
            show_timestamps: true,
        }
    }
}

impl GenerationDefaults {
    /// File values are clamped into range rather than rejected.
    pub fn to_generation_config(&self) -> GenerationConfig {
        let mut config = GenerationConfig::default();
        config.set_model(self.model);

        if !(MIN_TEMPERATURE..=MAX_TEMPERATURE).contains(&self.temperature) {
            warn!(temperature = self.temperature, "temperature in config file out of range, clamping");
        }
        if config.set_temperature(self.temperature).is_err() {
            warn!("temperature in config file is not a number, using default");
        }

        if !(MIN_MAX_TOKENS..=MAX_MAX_TOKENS).contains(&self.max_tokens) {
            warn!(max_tokens = self.max_tokens, "max_tokens in config file out of range, clamping");
        }
        config.set_max_tokens(self.max_tokens);

        config
    }
}

impl Config {
    /// Directory holding the config file and the log.
    pub fn home_dir() -> Result<PathBuf> {
        let home = dirs::home_dir()
            .ok_or_else(|| ChatError::Config("could not find home directory".to_string()))?;
        Ok(home.join(".streamchat"))
    }

    pub fn default_path() -> Result<PathBuf> {
        Ok(Self::home_dir()?.join("config.toml"))
    }

    /// Load from `path`, or from the default location when `None`. A missing
    /// file yields the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => Self::default_path()?,
        };

        if !path.exists() {
            debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Config::default());
        }

        let content = fs::read_to_string(&path)
            .map_err(|e| ChatError::Config(format!("failed to read {}: {e}", path.display())))?;
        Self::parse(&content)
            .map_err(|e| ChatError::Config(format!("failed to parse {}: {e}", path.display())))
    }

    pub fn parse(content: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| ChatError::Config(format!("failed to create {}: {e}", parent.display())))?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| ChatError::Config(format!("failed to serialize config: {e}")))?;
        fs::write(path, content)
            .map_err(|e| ChatError::Config(format!("failed to write {}: {e}", path.display())))
    }

    /// Credential from the file first, then from the environment. Blank values
    /// count as missing.
    pub fn resolve_api_key<F>(&self, env: F) -> Option<String>
    where
        F: Fn(&str) -> Option<String>,
    {
        self.api_key
            .clone()
            .filter(|key| !key.trim().is_empty())
            .or_else(|| env(&self.api_key_env).filter(|key| !key.trim().is_empty()))
            .map(|key| key.trim().to_string())
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}
