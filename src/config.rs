//! Invocation configuration and the pre-flight gate.
//!
//! [`Config`] is read once per invocation from a key lookup (normally the
//! process environment after the `.env` file has been loaded), then adjusted
//! by command-line [`ConfigOverrides`]. It is immutable afterwards and passed
//! by reference into [`validate`] and the orchestrator.
//!
//! [`validate`] is pure and touches nothing but the prompt file's metadata, so
//! a misconfigured run fails in milliseconds instead of after a PDF download.

use crate::retry::RetryPolicy;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_API_BASE_URL: &str = "https://openrouter.ai/api";
pub const DEFAULT_BULLETIN_BASE_URL: &str = "https://ru.muenchen.de";
pub const DEFAULT_CONVERTER_COMMAND: &str = "pdftotext -layout {input} -";
pub const DEFAULT_CACHE_DIR_NAME: &str = "bulletin_digest_cache";

/// Pre-flight configuration problems.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("OPENROUTER_API_KEY is required")]
    MissingCredential,

    #[error("a model is required: pass --model or set DEFAULT_MODEL")]
    MissingModel,

    #[error("a system prompt is required: pass --prompt, or set DEFAULT_PROMPT_FILE or DEFAULT_SYSTEM_PROMPT")]
    MissingPrompt,

    #[error("prompt file not found: {}", .0.display())]
    PromptFileNotFound(PathBuf),

    #[error("could not read prompt file {}: {source}", .path.display())]
    PromptUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid value for {key}: {value:?} ({reason})")]
    InvalidValue {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// Everything one invocation needs to know, fixed for its whole lifetime.
#[derive(Clone)]
pub struct Config {
    pub api_key: Option<String>,
    pub model: Option<String>,
    /// Model tried once the primary model's attempts are exhausted.
    pub fallback_model: Option<String>,
    /// Inline system prompt. Ignored when `prompt_file` is set.
    pub system_prompt: Option<String>,
    pub prompt_file: Option<PathBuf>,
    pub api_base_url: String,
    pub bulletin_base_url: String,
    /// Per-attempt bound on the PDF download.
    pub request_timeout: Duration,
    /// Per-attempt bound on the analyzer call.
    pub analyzer_timeout: Duration,
    /// Retries after the first attempt; `0` means a single attempt.
    pub max_retries: u32,
    pub retry_delay: Duration,
    pub retry_backoff: f64,
    pub cache_enabled: bool,
    pub cache_dir: Option<PathBuf>,
    pub cache_max_age: Duration,
    pub cache_cleanup_age: Duration,
    pub temperature: f64,
    pub max_tokens: u32,
    /// Converter command line; `{input}` is replaced with the PDF path.
    pub converter_command: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_key: None,
            model: None,
            fallback_model: None,
            system_prompt: None,
            prompt_file: None,
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            bulletin_base_url: DEFAULT_BULLETIN_BASE_URL.to_string(),
            request_timeout: Duration::from_secs(30),
            analyzer_timeout: Duration::from_secs(120),
            max_retries: 3,
            retry_delay: Duration::from_secs(1),
            retry_backoff: 2.0,
            cache_enabled: true,
            cache_dir: None,
            cache_max_age: Duration::from_secs(24 * 3600),
            cache_cleanup_age: Duration::from_secs(7 * 24 * 3600),
            temperature: 0.1,
            max_tokens: 4000,
            converter_command: DEFAULT_CONVERTER_COMMAND.to_string(),
        }
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("api_key", &self.api_key.as_ref().map(|_| "***"))
            .field("model", &self.model)
            .field("fallback_model", &self.fallback_model)
            .field("system_prompt", &self.system_prompt.as_ref().map(|p| p.len()))
            .field("prompt_file", &self.prompt_file)
            .field("api_base_url", &self.api_base_url)
            .field("bulletin_base_url", &self.bulletin_base_url)
            .field("request_timeout", &self.request_timeout)
            .field("analyzer_timeout", &self.analyzer_timeout)
            .field("max_retries", &self.max_retries)
            .field("retry_delay", &self.retry_delay)
            .field("retry_backoff", &self.retry_backoff)
            .field("cache_enabled", &self.cache_enabled)
            .field("cache_dir", &self.cache_dir)
            .field("cache_max_age", &self.cache_max_age)
            .field("cache_cleanup_age", &self.cache_cleanup_age)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("converter_command", &self.converter_command)
            .finish()
    }
}

/// Command-line values that take precedence over the environment.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub model: Option<String>,
    pub fallback_model: Option<String>,
    pub prompt_file: Option<PathBuf>,
    pub cache_dir: Option<PathBuf>,
    pub no_cache: bool,
    pub temperature: Option<f64>,
    pub max_tokens: Option<u32>,
}

impl Config {
    /// Read configuration from the process environment.
    ///
    /// Only the binary calls this; library code receives a finished `Config`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from any key lookup.
    ///
    /// Missing keys fall back to defaults; blank values count as missing.
    /// Required values are not enforced here, that is [`validate`]'s job.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let defaults = Self::default();

        Ok(Self {
            api_key: get("OPENROUTER_API_KEY"),
            model: get("DEFAULT_MODEL"),
            fallback_model: get("FALLBACK_MODEL"),
            system_prompt: get("DEFAULT_SYSTEM_PROMPT"),
            prompt_file: get("DEFAULT_PROMPT_FILE").map(PathBuf::from),
            api_base_url: get("OPENROUTER_BASE_URL").unwrap_or(defaults.api_base_url),
            bulletin_base_url: get("BULLETIN_BASE_URL").unwrap_or(defaults.bulletin_base_url),
            request_timeout: parse_var::<u64>(&get, "REQUEST_TIMEOUT")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.request_timeout),
            analyzer_timeout: parse_var::<u64>(&get, "ANALYZER_TIMEOUT")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.analyzer_timeout),
            max_retries: parse_var(&get, "MAX_RETRIES")?.unwrap_or(defaults.max_retries),
            retry_delay: parse_seconds(&get, "RETRY_DELAY")?.unwrap_or(defaults.retry_delay),
            retry_backoff: parse_var(&get, "RETRY_BACKOFF")?.unwrap_or(defaults.retry_backoff),
            cache_enabled: parse_bool(&get, "CACHE_ENABLED")?.unwrap_or(defaults.cache_enabled),
            cache_dir: get("CACHE_DIR").map(PathBuf::from),
            cache_max_age: parse_scaled(&get, "CACHE_MAX_AGE_HOURS", 3600)?
                .unwrap_or(defaults.cache_max_age),
            cache_cleanup_age: parse_scaled(&get, "CACHE_CLEANUP_DAYS", 24 * 3600)?
                .unwrap_or(defaults.cache_cleanup_age),
            temperature: defaults.temperature,
            max_tokens: defaults.max_tokens,
            converter_command: get("CONVERTER_COMMAND").unwrap_or(defaults.converter_command),
        })
    }

    /// Apply command-line values on top of the environment.
    pub fn with_overrides(mut self, overrides: ConfigOverrides) -> Self {
        if overrides.model.is_some() {
            self.model = overrides.model;
        }
        if overrides.fallback_model.is_some() {
            self.fallback_model = overrides.fallback_model;
        }
        if overrides.prompt_file.is_some() {
            self.prompt_file = overrides.prompt_file;
        }
        if overrides.cache_dir.is_some() {
            self.cache_dir = overrides.cache_dir;
        }
        if overrides.no_cache {
            self.cache_enabled = false;
        }
        if let Some(t) = overrides.temperature {
            self.temperature = t;
        }
        if let Some(m) = overrides.max_tokens {
            self.max_tokens = m;
        }
        self
    }

    /// Cache root: the configured directory or one under the system temp dir.
    pub fn cache_root(&self) -> PathBuf {
        self.cache_dir
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join(DEFAULT_CACHE_DIR_NAME))
    }

    /// Retry policy shared by the download and analyze stages.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_retries.saturating_add(1))
            .with_base_delay(self.retry_delay)
            .with_multiplier(self.retry_backoff)
    }

    /// Resolve the system prompt: the prompt file wins over the inline prompt.
    pub fn load_prompt(&self) -> Result<String, ConfigError> {
        let prompt = match (&self.prompt_file, &self.system_prompt) {
            (Some(path), _) => std::fs::read_to_string(path)
                .map_err(|source| ConfigError::PromptUnreadable {
                    path: path.clone(),
                    source,
                })?
                .trim()
                .to_string(),
            (None, Some(inline)) => inline.trim().to_string(),
            (None, None) => return Err(ConfigError::MissingPrompt),
        };
        if prompt.is_empty() {
            return Err(ConfigError::MissingPrompt);
        }
        Ok(prompt)
    }

    /// The primary model id. Only meaningful after [`validate`] succeeded.
    pub fn model_id(&self) -> &str {
        self.model.as_deref().unwrap_or_default()
    }
}

/// Check that a run can start at all.
///
/// Order matters only for which problem is reported first: credential, model,
/// prompt presence, then prompt file existence.
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    if config.api_key.as_deref().map_or(true, |k| k.trim().is_empty()) {
        return Err(ConfigError::MissingCredential);
    }
    if config.model.as_deref().map_or(true, |m| m.trim().is_empty()) {
        return Err(ConfigError::MissingModel);
    }
    match (&config.prompt_file, &config.system_prompt) {
        (None, None) => Err(ConfigError::MissingPrompt),
        (Some(path), _) if !is_file(path) => Err(ConfigError::PromptFileNotFound(path.clone())),
        _ => Ok(()),
    }
}

fn is_file(path: &Path) -> bool {
    std::fs::metadata(path).map(|m| m.is_file()).unwrap_or(false)
}

fn parse_var<T>(
    get: &impl Fn(&str) -> Option<String>,
    key: &'static str,
) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    get(key)
        .map(|raw| {
            raw.parse::<T>().map_err(|e| ConfigError::InvalidValue {
                key,
                value: raw.clone(),
                reason: e.to_string(),
            })
        })
        .transpose()
}

fn parse_seconds(
    get: &impl Fn(&str) -> Option<String>,
    key: &'static str,
) -> Result<Option<Duration>, ConfigError> {
    match parse_var::<f64>(get, key)? {
        Some(secs) if secs >= 0.0 => Duration::try_from_secs_f64(secs).map(Some).map_err(|e| {
            ConfigError::InvalidValue {
                key,
                value: secs.to_string(),
                reason: e.to_string(),
            }
        }),
        Some(secs) => Err(ConfigError::InvalidValue {
            key,
            value: secs.to_string(),
            reason: "must be a non-negative number of seconds".into(),
        }),
        None => Ok(None),
    }
}

/// A whole number of `unit_secs`-long units, e.g. hours or days.
fn parse_scaled(
    get: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    unit_secs: u64,
) -> Result<Option<Duration>, ConfigError> {
    match parse_var::<u64>(get, key)? {
        Some(n) => n
            .checked_mul(unit_secs)
            .map(|secs| Some(Duration::from_secs(secs)))
            .ok_or_else(|| ConfigError::InvalidValue {
                key,
                value: n.to_string(),
                reason: "too large".into(),
            }),
        None => Ok(None),
    }
}

fn parse_bool(
    get: &impl Fn(&str) -> Option<String>,
    key: &'static str,
) -> Result<Option<bool>, ConfigError> {
    get(key)
        .map(|raw| match raw.to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Ok(true),
            "false" | "0" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::InvalidValue {
                key,
                value: raw.clone(),
                reason: "expected true or false".into(),
            }),
        })
        .transpose()
}
