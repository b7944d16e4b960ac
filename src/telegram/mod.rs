//! Telegram client wrapper module.
//!
//! Connects a user account over `MTProto`, handles sign-in, and exposes
//! the account as a [`GroupDirectory`](crate::finder::GroupDirectory).

mod auth;
mod client;

pub use auth::ensure_authorized;
pub use client::{TelegramClient, TelegramError};
