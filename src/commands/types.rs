//! Command types and definitions.

use std::fmt;

/// Commands understood by the group finder bot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BotCommand {
    /// Describe what the bot can do.
    Start,

    /// Run the pipeline for one keyword. `None` when the keyword is missing.
    Search(Option<String>),

    /// Show the good groups of the last completed run.
    Results,
}

impl BotCommand {
    /// Parses a command from a message text.
    ///
    /// Accepts `/command` and `/command@botname`. Returns `None` for
    /// anything that is not one of the known commands.
    #[must_use]
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        let after_slash = text.strip_prefix('/')?;

        let (head, args) = match after_slash.split_once(char::is_whitespace) {
            Some((head, args)) => (head, Some(args.trim())),
            None => (after_slash, None),
        };

        // Group chats address commands as /search@some_bot
        let cmd = head.split_once('@').map_or(head, |(cmd, _)| cmd).to_lowercase();

        match cmd.as_str() {
            "start" | "help" => Some(Self::Start),
            "search" | "find" => Some(Self::Search(
                args.filter(|a| !a.is_empty()).map(str::to_owned),
            )),
            "results" => Some(Self::Results),
            _ => None,
        }
    }

    /// Returns the command name as it appears in help.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Search(_) => "search",
            Self::Results => "results",
        }
    }

    /// Returns all available commands with their descriptions.
    #[must_use]
    pub fn all_commands() -> Vec<(&'static str, &'static str)> {
        vec![
            ("/start", "Show this help message"),
            ("/search <keyword>", "Find public groups without bots"),
            ("/results", "Show the groups from the last search"),
        ]
    }
}

impl fmt::Display for BotCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Search(Some(keyword)) => write!(f, "search {keyword}"),
            _ => write!(f, "{}", self.name()),
        }
    }
}

/// Result of command execution.
#[derive(Debug, Clone)]
pub struct CommandResult {
    /// Whether the command was successful.
    pub success: bool,

    /// Messages to send back, in order. Never empty.
    pub messages: Vec<String>,
}

impl CommandResult {
    /// Creates a successful single-message result.
    #[must_use]
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            success: true,
            messages: vec![message.into()],
        }
    }

    /// Creates a successful multi-message result.
    #[must_use]
    pub fn success_many(messages: Vec<String>) -> Self {
        Self {
            success: true,
            messages,
        }
    }

    /// Creates an error result.
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            messages: vec![message.into()],
        }
    }
}
