//! Screening pipeline settings.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::{ConfigError, DEFAULT_RESULTS_FILE};

/// Built-in keyword list used when none is supplied.
pub const DEFAULT_KEYWORDS: &[&str] = &[
    "русский",
    "русская",
    "россия",
    "москва",
    "санкт-петербург",
    "питер",
    "киев",
    "украина",
    "работа",
    "объявления",
    "барахолка",
    "чат",
    "чаты",
    "общение",
    "для_друзей",
];

/// What the request gate does when Telegram asks us to wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CooldownPolicy {
    /// Hand the cooldown back to the caller, which stops the current phase.
    #[default]
    Abort,
    /// Sleep for the requested time and retry the call once.
    RetryOnce,
}

impl FromStr for CooldownPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "abort" | "stop" => Ok(Self::Abort),
            "retry-once" | "retry_once" | "retry" => Ok(Self::RetryOnce),
            _ => Err(ConfigError::InvalidValue {
                key: "cooldown_policy",
                value: s.to_owned(),
            }),
        }
    }
}

impl fmt::Display for CooldownPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Abort => write!(f, "abort"),
            Self::RetryOnce => write!(f, "retry-once"),
        }
    }
}

/// Tunables for one screening run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchSettings {
    /// Ordered keyword list for the console run.
    #[serde(default = "default_keywords")]
    pub keywords: Vec<String>,

    /// Maximum chats requested per keyword.
    #[serde(default = "default_search_limit")]
    pub search_limit: u32,

    /// Maximum members fetched per candidate.
    #[serde(default = "default_max_members")]
    pub max_members: u32,

    /// Pause between successfully sampled candidates.
    #[serde(default = "default_sample_delay")]
    pub sample_delay: Duration,

    /// Reaction to a flood wait.
    #[serde(default)]
    pub cooldown_policy: CooldownPolicy,

    /// Longest flood wait the gate is willing to sleep through under
    /// [`CooldownPolicy::RetryOnce`].
    #[serde(default = "default_max_cooldown_wait")]
    pub max_cooldown_wait_secs: u32,

    /// Where the result document is written.
    #[serde(default = "default_results_path")]
    pub results_path: PathBuf,
}

fn default_keywords() -> Vec<String> {
    DEFAULT_KEYWORDS.iter().map(|k| (*k).to_owned()).collect()
}

const fn default_search_limit() -> u32 {
    40
}

const fn default_max_members() -> u32 {
    80
}

const fn default_sample_delay() -> Duration {
    Duration::from_secs(1)
}

const fn default_max_cooldown_wait() -> u32 {
    60
}

fn default_results_path() -> PathBuf {
    PathBuf::from(DEFAULT_RESULTS_FILE)
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            keywords: default_keywords(),
            search_limit: default_search_limit(),
            max_members: default_max_members(),
            sample_delay: default_sample_delay(),
            cooldown_policy: CooldownPolicy::default(),
            max_cooldown_wait_secs: default_max_cooldown_wait(),
            results_path: default_results_path(),
        }
    }
}

impl SearchSettings {
    /// Creates settings from environment variables with defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is set but cannot be parsed.
    pub fn from_env_with_defaults() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(env: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut settings = Self::default();

        if let Some(raw) = env("GF_KEYWORDS") {
            let keywords = parse_keywords(&raw);
            if !keywords.is_empty() {
                settings.keywords = keywords;
            }
        }
        if let Some(raw) = env("GF_SEARCH_LIMIT") {
            settings.search_limit = parse_number("GF_SEARCH_LIMIT", &raw)?;
        }
        if let Some(raw) = env("GF_MAX_MEMBERS") {
            settings.max_members = parse_number("GF_MAX_MEMBERS", &raw)?;
        }
        if let Some(raw) = env("GF_SAMPLE_DELAY_MS") {
            settings.sample_delay =
                Duration::from_millis(parse_number("GF_SAMPLE_DELAY_MS", &raw)?);
        }
        if let Some(raw) = env("GF_COOLDOWN_POLICY") {
            settings.cooldown_policy = raw.parse()?;
        }
        if let Some(raw) = env("GF_MAX_COOLDOWN_WAIT") {
            settings.max_cooldown_wait_secs = parse_number("GF_MAX_COOLDOWN_WAIT", &raw)?;
        }
        if let Some(raw) = env("GF_RESULTS_PATH") {
            settings.results_path = PathBuf::from(raw);
        }

        Ok(settings)
    }
}

/// Splits a comma separated keyword list, dropping blanks.
pub(crate) fn parse_keywords(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .map(str::to_owned)
        .collect()
}

fn parse_number<T: FromStr>(key: &'static str, raw: &str) -> Result<T, ConfigError> {
    raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key,
        value: raw.to_owned(),
    })
}
