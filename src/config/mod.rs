//! Configuration module for the group finder.
//!
//! Handles loading and validation of Telegram API credentials
//! and the tunable knobs of the screening pipeline.

mod search;
mod settings;

pub use search::{CooldownPolicy, SearchSettings, DEFAULT_KEYWORDS};
pub use settings::{ConfigError, TelegramConfig};

/// Default path of the optional JSON credentials file.
pub const DEFAULT_CONFIG_FILE: &str = "config.json";

/// Default path of the result document.
pub const DEFAULT_RESULTS_FILE: &str = "results.json";
