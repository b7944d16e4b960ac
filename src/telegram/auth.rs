//! Interactive sign-in for the user account.

use dialoguer::{Input, Password};
use tracing::info;

use super::{TelegramClient, TelegramError};
use crate::config::TelegramConfig;

/// Signs the client in by prompting for phone, login code and, if
/// enabled, the 2FA password. Does nothing if already authorized.
///
/// # Errors
///
/// Returns an error if a prompt fails or Telegram rejects the credentials.
pub async fn ensure_authorized(
    client: &TelegramClient,
    config: &TelegramConfig,
) -> Result<(), TelegramError> {
    if client.is_authorized().await? {
        return Ok(());
    }

    info!("Authentication required");

    let phone: String = Input::new()
        .with_prompt("Enter your phone number (with country code)")
        .interact_text()
        .map_err(prompt_error)?;

    let token = client.request_login_code(&phone, &config.api_hash).await?;

    info!("Login code sent to your Telegram app");

    let code: String = Input::new()
        .with_prompt("Enter the login code")
        .interact_text()
        .map_err(prompt_error)?;

    match client.sign_in(&token, &code).await {
        Ok(()) => {
            info!("Successfully signed in!");
            Ok(())
        }
        Err(TelegramError::PasswordRequired(password_token)) => {
            info!("Two-factor authentication is enabled");

            let hint = password_token.hint().unwrap_or("no hint");
            info!("Password hint: {}", hint);

            let password: String = Password::new()
                .with_prompt("Enter your 2FA password")
                .interact()
                .map_err(prompt_error)?;

            client.check_password(password_token, &password).await?;

            info!("Successfully signed in with 2FA!");
            Ok(())
        }
        Err(e) => Err(e),
    }
}

fn prompt_error(err: dialoguer::Error) -> TelegramError {
    TelegramError::Prompt(err.to_string())
}
