//! Telegram credentials.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Telegram API configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    /// Telegram API ID (obtain from <https://my.telegram.org>).
    pub api_id: i32,

    /// Telegram API hash (obtain from <https://my.telegram.org>).
    pub api_hash: String,

    /// Bot API token, only needed by the command bot.
    #[serde(default)]
    pub bot_token: Option<String>,

    /// Path to the session file.
    #[serde(default = "default_session_path")]
    pub session_path: PathBuf,
}

fn default_session_path() -> PathBuf {
    PathBuf::from("group_finder.session")
}

/// Shape of `config.json`. Every key is optional so that missing ones can
/// fall back to the environment.
#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    api_id: Option<serde_json::Value>,
    api_hash: Option<String>,
    bot_token: Option<String>,
    session_path: Option<PathBuf>,
}

impl TelegramConfig {
    /// Loads credentials from `path` if the file exists, filling any missing
    /// key from `TG_API_ID`, `TG_API_HASH`, `TG_BOT_TOKEN` and
    /// `TG_SESSION_PATH`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is unreadable or a required credential
    /// is missing from both sources.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let file = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            serde_json::from_str(&content)?
        } else {
            ConfigFile::default()
        };

        Self::from_sources(file, |key| std::env::var(key).ok())
    }

    fn from_sources(
        file: ConfigFile,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let api_id = match file.api_id {
            Some(value) => parse_api_id(&value)?,
            None => env("TG_API_ID")
                .ok_or(ConfigError::MissingCredential("api_id / TG_API_ID"))?
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidApiId)?,
        };
        if api_id <= 0 {
            return Err(ConfigError::InvalidApiId);
        }

        let api_hash = file
            .api_hash
            .or_else(|| env("TG_API_HASH"))
            .filter(|h| !h.trim().is_empty())
            .ok_or(ConfigError::MissingCredential("api_hash / TG_API_HASH"))?;

        let bot_token = file
            .bot_token
            .or_else(|| env("TG_BOT_TOKEN"))
            .filter(|t| !t.trim().is_empty());

        let session_path = file
            .session_path
            .or_else(|| env("TG_SESSION_PATH").map(PathBuf::from))
            .unwrap_or_else(default_session_path);

        Ok(Self {
            api_id,
            api_hash,
            bot_token,
            session_path,
        })
    }

    /// Returns the bot token, failing if the bot variant was started
    /// without one.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingCredential`] if no token is configured.
    pub fn require_bot_token(&self) -> Result<&str, ConfigError> {
        self.bot_token
            .as_deref()
            .ok_or(ConfigError::MissingCredential("bot_token / TG_BOT_TOKEN"))
    }
}

/// `api_id` is accepted both as a JSON number and as a numeric string.
fn parse_api_id(value: &serde_json::Value) -> Result<i32, ConfigError> {
    match value {
        serde_json::Value::Number(n) => n
            .as_i64()
            .and_then(|n| i32::try_from(n).ok())
            .ok_or(ConfigError::InvalidApiId),
        serde_json::Value::String(s) => s.trim().parse().map_err(|_| ConfigError::InvalidApiId),
        _ => Err(ConfigError::InvalidApiId),
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required credential: {0}")]
    MissingCredential(&'static str),

    #[error("Invalid API ID format (must be a positive integer)")]
    InvalidApiId,

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: &'static str, value: String },

    #[error("Failed to read configuration file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse configuration file: {0}")]
    Parse(#[from] serde_json::Error),
}
