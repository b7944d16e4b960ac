//! Group Finder - Console Entry Point
//!
//! Searches public groups for every configured keyword, checks a sample
//! of their members for bots and writes the result document.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use group_finder::config::{
    CooldownPolicy, SearchSettings, TelegramConfig, DEFAULT_CONFIG_FILE,
};
use group_finder::finder::{BotStatus, PipelineError, ScreeningPipeline, ScreeningReport};
use group_finder::results::ResultSink;
use group_finder::telegram::{ensure_authorized, TelegramClient};

/// Find public Telegram groups without bots.
#[derive(Parser, Debug)]
#[command(name = "group_finder")]
#[command(about = "Search public Telegram groups by keyword and screen them for bots")]
#[command(version)]
struct Args {
    /// Path to the JSON file with `api_id` / `api_hash`.
    #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Path to the .env file for environment variables.
    #[arg(long, default_value = ".env")]
    env_file: String,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Keyword to search for. Repeat for several; defaults to the built-in list.
    #[arg(short, long = "keyword")]
    keywords: Vec<String>,

    /// Where to write the result document.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Maximum chats requested per keyword.
    #[arg(long)]
    search_limit: Option<u32>,

    /// Maximum members checked per group.
    #[arg(long)]
    max_members: Option<u32>,

    /// Pause between checked groups, in milliseconds.
    #[arg(long)]
    delay_ms: Option<u64>,

    /// What to do on a flood wait: abort or retry-once.
    #[arg(long)]
    cooldown_policy: Option<CooldownPolicy>,
}

impl Args {
    /// Applies command line overrides on top of environment settings.
    fn apply(&self, mut settings: SearchSettings) -> SearchSettings {
        if !self.keywords.is_empty() {
            settings.keywords.clone_from(&self.keywords);
        }
        if let Some(output) = &self.output {
            settings.results_path.clone_from(output);
        }
        if let Some(limit) = self.search_limit {
            settings.search_limit = limit;
        }
        if let Some(max) = self.max_members {
            settings.max_members = max;
        }
        if let Some(delay) = self.delay_ms {
            settings.sample_delay = std::time::Duration::from_millis(delay);
        }
        if let Some(policy) = self.cooldown_policy {
            settings.cooldown_policy = policy;
        }
        settings
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&args.log_level);

    if let Err(e) = dotenvy::from_filename(&args.env_file) {
        debug!("Could not load .env file ({}): {}", args.env_file, e);
    }

    let tg_config = TelegramConfig::load(&args.config)
        .context("Failed to load Telegram credentials")?;

    let settings = args.apply(
        SearchSettings::from_env_with_defaults().context("Invalid search settings")?,
    );

    info!(
        "{} keywords, up to {} chats each, {} members checked per group, cooldown policy: {}",
        settings.keywords.len(),
        settings.search_limit,
        settings.max_members,
        settings.cooldown_policy
    );

    let client = Arc::new(
        TelegramClient::connect(&tg_config)
            .await
            .context("Failed to connect to Telegram")?,
    );

    ensure_authorized(&client, &tg_config)
        .await
        .context("Authentication failed")?;

    let sink = Arc::new(ResultSink::new(settings.results_path.clone()));
    let pipeline = ScreeningPipeline::new(client.clone(), sink, &settings);

    let cancel = CancellationToken::new();
    let ctrl_c = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Received Ctrl+C, stopping after the current request...");
                cancel.cancel();
            }
        })
    };

    let outcome = pipeline.run(&settings.keywords, &cancel).await;
    ctrl_c.abort();
    client.disconnect();

    match outcome {
        Ok(report) => {
            print_report(&report, &settings);
            Ok(())
        }
        Err(PipelineError::Cancelled) => {
            warn!("Cancelled by user, no results were written");
            Ok(())
        }
        Err(e) => Err(e).context("Screening run failed"),
    }
}

/// Initializes the logging subsystem.
fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

/// Prints per-group verdicts and the final list of good groups.
fn print_report(report: &ScreeningReport, settings: &SearchSettings) {
    println!("\nCandidates found: {}", report.candidates().len());

    for candidate in report.candidates() {
        match candidate.bot_status {
            BotStatus::Clean => println!(
                "OK: @{} - no bots in the first {} members",
                candidate.username, candidate.participants_sampled
            ),
            BotStatus::Contaminated => println!("Skipped: bots found in @{}", candidate.username),
            BotStatus::Unknown => println!(
                "Unknown: could not check members of @{}",
                candidate.username
            ),
        }
    }

    if !report.failed_keywords.is_empty() {
        println!("\nKeywords that failed: {}", report.failed_keywords.join(", "));
    }
    for cooldown in &report.cooldowns {
        println!(
            "\nStopped early during {}: Telegram asked to wait {} seconds ({} item(s) skipped).",
            cooldown.phase, cooldown.seconds, cooldown.skipped
        );
    }

    println!("\nDone. Results saved to {}", settings.results_path.display());

    let good = report.good_groups();
    if good.is_empty() {
        println!("No groups without bots were found.");
        return;
    }

    println!("Groups you can join without a request and with no bots in the checked sample:");
    for group in good {
        println!(
            "- {} (@{}) - participants checked: {}",
            group.title, group.username, group.participants_sampled
        );
    }
}
