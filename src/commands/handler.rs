//! Command handler implementation.

use std::fmt::Write as _;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::types::{BotCommand, CommandResult};
use crate::finder::{Candidate, PipelineError, RunPhase, ScreeningPipeline, ScreeningReport};

/// Maximum number of groups listed in one reply.
pub const MAX_LISTED_GROUPS: usize = 20;

/// Turns bot commands into pipeline runs and reply texts.
pub struct CommandHandler {
    pipeline: Arc<ScreeningPipeline>,

    /// Cancelled on shutdown so a running search stops between calls.
    cancel: CancellationToken,
}

impl CommandHandler {
    /// Creates a new command handler.
    #[must_use]
    pub const fn new(pipeline: Arc<ScreeningPipeline>, cancel: CancellationToken) -> Self {
        Self { pipeline, cancel }
    }

    /// Text to send right away, before a long running command finishes.
    #[must_use]
    pub fn acknowledgement(command: &BotCommand) -> Option<String> {
        match command {
            BotCommand::Search(Some(keyword)) => {
                Some(format!("🔍 Searching groups for: {keyword}"))
            }
            _ => None,
        }
    }

    /// Executes a parsed command.
    pub async fn execute(&self, command: BotCommand) -> CommandResult {
        debug!("Handling command: {}", command);
        let result = match command {
            BotCommand::Start => Self::handle_start(),
            BotCommand::Search(Some(keyword)) => self.handle_search(keyword).await,
            BotCommand::Search(None) => {
                CommandResult::error("❌ Usage: /search <keyword>")
            }
            BotCommand::Results => self.handle_results().await,
        };
        info!(
            "Command result: success={}, messages={}",
            result.success,
            result.messages.len()
        );
        result
    }

    fn handle_start() -> CommandResult {
        let mut lines = vec![
            "👋 I look for public Telegram groups you can join without a request".to_owned(),
            "and check a sample of their members for bots.".to_owned(),
            String::new(),
            "Commands:".to_owned(),
        ];
        for (usage, description) in BotCommand::all_commands() {
            lines.push(format!("{usage} - {description}"));
        }
        CommandResult::success(lines.join("\n"))
    }

    async fn handle_search(&self, keyword: String) -> CommandResult {
        let keywords = [keyword];
        match self.pipeline.run(&keywords, &self.cancel).await {
            Ok(report) => search_replies(&report),
            Err(PipelineError::Cancelled) => {
                CommandResult::error("⏹ Search was cancelled, nothing was saved.")
            }
            Err(e) => {
                warn!("Search for \"{}\" failed: {e}", keywords[0]);
                CommandResult::error(format!("❌ Search failed: {e}"))
            }
        }
    }

    async fn handle_results(&self) -> CommandResult {
        let groups = self.pipeline.sink().latest().await;
        if groups.is_empty() {
            return CommandResult::success(
                "📭 No results yet. Run /search <keyword> first.",
            );
        }
        CommandResult::success(format_group_list(&groups))
    }
}

/// Builds the replies for a finished run: the candidate count, then the
/// good groups, then notes on failed keywords and flood waits.
fn search_replies(report: &ScreeningReport) -> CommandResult {
    let found = report.candidates().len();
    let good = report.good_groups();

    if found == 0
        && let Some(cooldown) = report
            .cooldowns
            .iter()
            .find(|c| c.phase == RunPhase::SearchingKeyword)
    {
        return CommandResult::error(format!(
            "⏳ Telegram rate limit: wait {} seconds and try again.",
            cooldown.seconds
        ));
    }

    let mut messages = vec![format!("Found candidate groups: {found}")];
    if good.is_empty() {
        messages.push("😔 No groups without bots found.".to_owned());
    } else {
        messages.push(format_group_list(good));
    }

    if !report.failed_keywords.is_empty() {
        messages.push(format!(
            "⚠️ Search failed for: {}",
            report.failed_keywords.join(", ")
        ));
    }

    for cooldown in &report.cooldowns {
        let skipped = if cooldown.phase == RunPhase::SearchingKeyword {
            format!("{} keyword(s) were skipped", cooldown.skipped)
        } else {
            format!("{} group(s) were not checked", cooldown.skipped)
        };
        messages.push(format!(
            "⏳ Telegram rate limit hit, {skipped}. Wait {} seconds before searching again.",
            cooldown.seconds
        ));
    }

    CommandResult::success_many(messages)
}

/// Formats up to [`MAX_LISTED_GROUPS`] groups, one per line.
fn format_group_list(groups: &[Candidate]) -> String {
    let mut text = String::from("✅ Groups without bots:");
    for group in groups.iter().take(MAX_LISTED_GROUPS) {
        let _ = write!(
            text,
            "\n📌 {} (@{}) - {} members checked",
            truncate(&group.title, 60),
            group.username,
            group.participants_sampled
        );
    }
    if groups.len() > MAX_LISTED_GROUPS {
        let _ = write!(text, "\n…and {} more", groups.len() - MAX_LISTED_GROUPS);
    }
    text
}

/// Truncates a string to a maximum length, adding "..." if truncated.
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_owned()
    } else {
        format!("{}...", s.chars().take(max_len).collect::<String>())
    }
}

impl std::fmt::Debug for CommandHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandHandler").finish_non_exhaustive()
    }
}
