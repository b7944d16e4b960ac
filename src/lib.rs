//! Group Finder Library
//!
//! Finds public Telegram supergroups by keyword through a user account
//! and keeps the ones whose sampled members contain no bots.
//!
//! This crate provides the core functionality for:
//! - Loading Telegram credentials and search settings
//! - Searching, deduplicating and screening candidate groups
//! - Persisting the result document
//! - Parsing and answering chat-bot commands

pub mod commands;
pub mod config;
pub mod finder;
pub mod results;
pub mod telegram;
