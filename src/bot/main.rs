//! Group Finder Bot - chat command entry point.
//!
//! Exposes `/start`, `/search <keyword>` and `/results` through a Bot API
//! bot while the searches themselves run on the user account.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use teloxide::prelude::*;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use group_finder::commands::{BotCommand, CommandHandler};
use group_finder::config::{SearchSettings, TelegramConfig, DEFAULT_CONFIG_FILE};
use group_finder::finder::ScreeningPipeline;
use group_finder::results::ResultSink;
use group_finder::telegram::{ensure_authorized, TelegramClient};

/// Chat bot front end for the group finder.
#[derive(Parser, Debug)]
#[command(name = "group_finder_bot")]
#[command(about = "Telegram bot that searches public groups without bots")]
#[command(version)]
struct Args {
    /// Path to the JSON file with `api_id`, `api_hash` and `bot_token`.
    #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Path to the .env file for environment variables.
    #[arg(long, default_value = ".env")]
    env_file: String,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info")]
    log_level: String,
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
    let bot_token = tg_config
        .require_bot_token()
        .context("The bot needs a Bot API token")?
        .to_owned();
    let settings =
        SearchSettings::from_env_with_defaults().context("Invalid search settings")?;

    let client = Arc::new(
        TelegramClient::connect(&tg_config)
            .await
            .context("Failed to connect to Telegram")?,
    );
    ensure_authorized(&client, &tg_config)
        .await
        .context("Authentication failed")?;

    let sink = Arc::new(ResultSink::new(settings.results_path.clone()));
    let pipeline = Arc::new(ScreeningPipeline::new(client.clone(), sink, &settings));

    let cancel = CancellationToken::new();
    let handler = Arc::new(CommandHandler::new(pipeline, cancel.clone()));

    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Received Ctrl+C, cancelling running searches...");
                cancel.cancel();
            }
        });
    }

    info!("Bot is running. Use Ctrl+C to stop.");

    let bot = Bot::new(bot_token);
    Dispatcher::builder(bot, Update::filter_message().endpoint(handle_message))
        .dependencies(dptree::deps![handler])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    info!("Shutting down...");
    cancel.cancel();
    client.disconnect();

    Ok(())
}

/// Answers one incoming message. Anything that is not a known command is
/// ignored.
async fn handle_message(
    bot: Bot,
    msg: Message,
    handler: Arc<CommandHandler>,
) -> ResponseResult<()> {
    let Some(command) = msg.text().and_then(BotCommand::parse) else {
        return Ok(());
    };

    debug!("Chat {}: {}", msg.chat.id, command);

    if let Some(ack) = CommandHandler::acknowledgement(&command) {
        bot.send_message(msg.chat.id, ack).await?;
    }

    let result = handler.execute(command).await;
    for message in result.messages {
        bot.send_message(msg.chat.id, message).await?;
    }

    Ok(())
}

/// Initializes the logging subsystem.
fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}
