//! Logging Discord commands - choose, disable and show the modmail log channel.

// Inner module to suppress missing_docs warnings for poise macro-generated code
mod inner {
    #![allow(missing_docs)]

    use crate::{
        bot::{BotData, commands::require_guild},
        core::settings::{self, ModerationCategory},
        errors::{Error, Result},
    };
    use poise::serenity_prelude as serenity;

    /// Parent command for the modmail log channel.
    #[poise::command(
        slash_command,
        guild_only,
        required_permissions = "MANAGE_GUILD",
        subcommands("logging_channel", "logging_disable", "logging_show")
    )]
    pub async fn logging(ctx: poise::Context<'_, BotData, Error>) -> Result<()> {
        let help_text = "Logging command. Available subcommands:\n\
            `/logging channel [channel]` - Log thread openings and closings to a channel\n\
            `/logging disable` - Stop logging\n\
            `/logging show` - Show the current log settings";

        ctx.say(help_text).await?;
        Ok(())
    }

    /// Sets the log channel and enables logging. Omit the channel to clear it.
    #[poise::command(
        slash_command,
        guild_only,
        rename = "channel",
        required_permissions = "MANAGE_GUILD"
    )]
    pub async fn logging_channel(
        ctx: poise::Context<'_, BotData, Error>,
        #[description = "Text channel for modmail logs"]
        #[channel_types("Text")]
        channel: Option<serenity::GuildChannel>,
    ) -> Result<()> {
        let guild_id = require_guild(ctx)?;
        let channel_id = channel.as_ref().map(|c| c.id);

        settings::set_log_channel(
            &ctx.data().database,
            &guild_id.to_string(),
            channel_id.map(|id| id.to_string()),
        )
        .await?;

        match channel_id {
            Some(id) => ctx.say(format!("✅ Modmail events will be logged in <#{id}>.")).await?,
            None => ctx.say("✅ Log channel cleared; logging is off.").await?,
        };
        Ok(())
    }

    /// Stops posting modmail events, keeping the configured channel.
    #[poise::command(
        slash_command,
        guild_only,
        rename = "disable",
        required_permissions = "MANAGE_GUILD"
    )]
    pub async fn logging_disable(ctx: poise::Context<'_, BotData, Error>) -> Result<()> {
        let guild_id = require_guild(ctx)?;

        settings::set_category_enabled(
            &ctx.data().database,
            &guild_id.to_string(),
            ModerationCategory::Logging,
            false,
        )
        .await?;

        ctx.say("✅ Logging disabled.").await?;
        Ok(())
    }

    /// Shows whether logging is on and where logs go.
    #[poise::command(
        slash_command,
        guild_only,
        rename = "show",
        required_permissions = "MANAGE_GUILD"
    )]
    pub async fn logging_show(ctx: poise::Context<'_, BotData, Error>) -> Result<()> {
        let guild_id = require_guild(ctx)?;
        let current =
            settings::get_or_create_guild_settings(&ctx.data().database, &guild_id.to_string())
                .await?;

        let channel = current
            .log_channel_id
            .as_deref()
            .map_or_else(|| "not set".to_string(), |id| format!("<#{id}>"));
        let state = if current.logging_enabled { "enabled" } else { "disabled" };

        ctx.say(format!("📋 Logging is **{state}**. Log channel: {channel}."))
            .await?;
        Ok(())
    }
}

// Re-export all commands
pub use inner::*;
