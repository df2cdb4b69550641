//! Discord command implementations organized by category.

#![allow(clippy::too_long_first_doc_paragraph)]

/// General utility commands
pub mod general;

/// Log channel commands
pub mod logging;

/// Modmail configuration and thread commands
pub mod modmail;

/// Feature category commands
pub mod moderation;

use crate::{
    bot::BotData,
    errors::{Error, Result},
};
use poise::serenity_prelude::GuildId;

// Export commands
pub use general::*;
pub use logging::*;
pub use modmail::*;
pub use moderation::*;

/// The guild a command runs in.
///
/// # Errors
/// Returns `Error::Config` when invoked outside a server.
pub fn require_guild(ctx: poise::Context<'_, BotData, Error>) -> Result<GuildId> {
    ctx.guild_id().ok_or_else(|| Error::Config {
        message: "This command can only be used in a server".to_string(),
    })
}
