//! Command handling module.
//!
//! Parses `/start`, `/search <keyword>` and `/results` and turns them into
//! pipeline runs and reply texts. The chat transport lives in the bot
//! binary.

mod handler;
mod types;

pub use handler::{CommandHandler, MAX_LISTED_GROUPS};
pub use types::{BotCommand, CommandResult};
