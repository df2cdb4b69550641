//! Unified error types for Court Herald.
//!
//! Every fallible operation in the crate returns [`Result`], whose error side is the
//! [`Error`] enum below. Conversions from the database, serialization and Discord
//! layers are provided so `?` works across module boundaries.

use thiserror::Error;

/// Application-wide error type.
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid or unreadable configuration (config file, environment, stored ids).
    #[error("Configuration error: {message}")]
    Config {
        /// Human-readable description of the problem
        message: String,
    },

    /// Any failure reported by `SeaORM` / the underlying `SQLite` driver.
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    /// JSON encoding or decoding of a stored collection failed.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A required environment variable is missing or not unicode.
    #[error("Environment variable error: {0}")]
    EnvVar(#[from] std::env::VarError),

    /// Writing into a `String` buffer failed.
    #[error("Formatting error: {0}")]
    Format(#[from] std::fmt::Error),

    /// The platform reported that a modmail channel no longer exists.
    #[error("Channel {channel_id} no longer exists")]
    ChannelMissing {
        /// Raw id of the missing channel
        channel_id: u64,
    },

    /// A thread is already registered for this user.
    #[error("User {user_id} already has an open modmail thread")]
    ThreadExists {
        /// Raw id of the user
        user_id: u64,
    },

    /// No open thread is bound to the given channel.
    #[error("No open modmail thread in channel {channel_id}")]
    ThreadNotFound {
        /// Raw id of the channel
        channel_id: u64,
    },

    /// The guild has no settings row, or modmail is disabled there.
    #[error("Modmail is not enabled for guild {guild_id}")]
    ModmailDisabled {
        /// Raw id of the guild
        guild_id: u64,
    },

    /// Error surfaced by serenity or poise.
    #[error("Discord error: {0}")]
    Discord(Box<poise::serenity_prelude::Error>),
}

impl From<poise::serenity_prelude::Error> for Error {
    fn from(value: poise::serenity_prelude::Error) -> Self {
        Self::Discord(Box::new(value))
    }
}

/// Convenience `Result` type
pub type Result<T> = std::result::Result<T, Error>;
