//! Connection settings for the chat-completions endpoint.

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{Error, Result};

/// Default request timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Default number of connection retries.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Everything needed to talk to an OpenAI-compatible API.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LlmConfig {
    pub base_url: String,
    pub model: String,
    pub api_key: String,
    #[serde(default = "default_timeout")]
    pub timeout: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default = "default_top_p")]
    pub top_p: f32,
    #[serde(default)]
    pub frequency_penalty: f32,
    #[serde(default)]
    pub presence_penalty: f32,
}

fn default_timeout() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}

fn default_temperature() -> f32 {
    0.7
}

fn default_top_p() -> f32 {
    1.0
}

impl LlmConfig {
    /// Creates a config with default sampling settings.
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            model: model.into(),
            api_key: api_key.into(),
            timeout: DEFAULT_TIMEOUT_SECS,
            max_retries: DEFAULT_MAX_RETRIES,
            temperature: default_temperature(),
            max_tokens: None,
            top_p: default_top_p(),
            frequency_penalty: 0.0,
            presence_penalty: 0.0,
        }
    }

    /// Reads `LLM_*` variables, loading `.env` from the working directory
    /// first.  Variables already in the environment win over `.env`.
    pub fn from_env() -> Result<Self> {
        match dotenvy::dotenv() {
            Ok(path) => tracing::debug!(path = %path.display(), "loaded .env"),
            Err(err) if err.not_found() => {}
            Err(err) => tracing::warn!(error = %err, "ignoring unreadable .env"),
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a config from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| {
            lookup(key)
                .filter(|value| !value.trim().is_empty())
                .ok_or_else(|| {
                    Error::configuration(
                        format!("{key} environment variable is required"),
                        Some(key.to_string()),
                    )
                })
        };
        let mut config = Self::new(
            required("LLM_BASE_URL")?,
            required("LLM_MODEL")?,
            required("LLM_API_KEY")?,
        );
        if let Some(timeout) = parse_var(&lookup, "LLM_TIMEOUT")? {
            config.timeout = timeout;
        }
        if let Some(retries) = parse_var(&lookup, "LLM_MAX_RETRIES")? {
            config.max_retries = retries;
        }
        if let Some(temperature) = parse_var(&lookup, "LLM_TEMPERATURE")? {
            config.temperature = temperature;
        }
        config.max_tokens = parse_var(&lookup, "LLM_MAX_TOKENS")?;
        if let Some(top_p) = parse_var(&lookup, "LLM_TOP_P")? {
            config.top_p = top_p;
        }
        if let Some(penalty) = parse_var(&lookup, "LLM_FREQUENCY_PENALTY")? {
            config.frequency_penalty = penalty;
        }
        if let Some(penalty) = parse_var(&lookup, "LLM_PRESENCE_PENALTY")? {
            config.presence_penalty = penalty;
        }
        config.validate()?;
        Ok(config)
    }

    /// Reads a YAML file holding the same fields as the environment.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|err| {
            Error::io(format!("failed to read config {}", path.display()), err)
        })?;
        let config: Self = serde_yaml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks field values and that the base URL parses.
    pub fn validate(&self) -> Result<()> {
        if self.model.trim().is_empty() {
            return Err(Error::configuration("model must not be empty", Some("model".into())));
        }
        if self.api_key.trim().is_empty() {
            return Err(Error::configuration(
                "api_key must not be empty",
                Some("api_key".into()),
            ));
        }
        if self.timeout == 0 {
            return Err(Error::configuration(
                "timeout must be at least one second",
                Some("timeout".into()),
            ));
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(Error::configuration(
                format!("temperature {} is outside 0.0..=2.0", self.temperature),
                Some("temperature".into()),
            ));
        }
        if !(0.0..=1.0).contains(&self.top_p) {
            return Err(Error::configuration(
                format!("top_p {} is outside 0.0..=1.0", self.top_p),
                Some("top_p".into()),
            ));
        }
        self.endpoint().map(|_| ())
    }

    /// The `chat/completions` URL under the base URL.
    pub fn endpoint(&self) -> Result<Url> {
        let mut base = self.base_url.trim().to_string();
        if !base.ends_with('/') {
            base.push('/');
        }
        let base = Url::parse(&base)
            .map_err(|err| Error::url(format!("invalid base URL {base:?}: {err}"), Some(err)))?;
        Ok(base.join("chat/completions")?)
    }

    pub fn timeout_duration(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }
}

fn parse_var<F, T>(lookup: &F, key: &str) -> Result<Option<T>>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) if raw.trim().is_empty() => Ok(None),
        Some(raw) => raw.trim().parse().map(Some).map_err(|err| {
            Error::configuration(format!("invalid {key} {raw:?}: {err}"), Some(key.to_string()))
        }),
    }
}
