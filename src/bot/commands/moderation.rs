//! Moderation Discord commands - toggle feature categories and show their status.

use crate::core::settings::ModerationCategory;

/// Feature category as offered in slash command choices.
#[derive(Clone, Copy, Debug, PartialEq, Eq, poise::ChoiceParameter)]
pub enum CategoryChoice {
    /// Modmail threads
    #[name = "modmail"]
    Modmail,
    /// Modmail event logging
    #[name = "logging"]
    Logging,
}

impl From<CategoryChoice> for ModerationCategory {
    fn from(choice: CategoryChoice) -> Self {
        match choice {
            CategoryChoice::Modmail => Self::Modmail,
            CategoryChoice::Logging => Self::Logging,
        }
    }
}

// Inner module to suppress missing_docs warnings for poise macro-generated code
mod inner {
    #![allow(missing_docs)]

    use super::CategoryChoice;
    use crate::{
        bot::{BotData, commands::require_guild},
        core::{
            modmail::relay::format_duration,
            settings::{self, ModerationCategory},
        },
        errors::{Error, Result},
    };
    use poise::serenity_prelude as serenity;
    use std::fmt::Write;

    /// Parent command for switching bot features on and off.
    #[poise::command(
        slash_command,
        guild_only,
        required_permissions = "MANAGE_GUILD",
        subcommands("moderation_toggle", "moderation_status")
    )]
    pub async fn moderation(ctx: poise::Context<'_, BotData, Error>) -> Result<()> {
        let help_text = "Moderation command. Available subcommands:\n\
            `/moderation toggle <category> <enabled>` - Switch a feature on or off\n\
            `/moderation status` - Show which features are on";

        ctx.say(help_text).await?;
        Ok(())
    }

    /// Switches a feature category on or off.
    #[poise::command(
        slash_command,
        guild_only,
        rename = "toggle",
        required_permissions = "MANAGE_GUILD"
    )]
    pub async fn moderation_toggle(
        ctx: poise::Context<'_, BotData, Error>,
        #[description = "Feature to change"] category: CategoryChoice,
        #[description = "Whether the feature should be on"] enabled: bool,
    ) -> Result<()> {
        let guild_id = require_guild(ctx)?;
        let category = ModerationCategory::from(category);

        let updated = settings::set_category_enabled(
            &ctx.data().database,
            &guild_id.to_string(),
            category,
            enabled,
        )
        .await?;

        let state = if enabled { "enabled" } else { "disabled" };
        let mut reply = format!("✅ **{category}** is now {state}.");
        if category == ModerationCategory::Logging && enabled && updated.log_channel_id.is_none() {
            reply.push_str(" No log channel is set yet; use `/logging channel`.");
        }

        ctx.say(reply).await?;
        Ok(())
    }

    /// Shows every feature category and the modmail configuration.
    #[poise::command(
        slash_command,
        guild_only,
        rename = "status",
        required_permissions = "MANAGE_GUILD"
    )]
    pub async fn moderation_status(ctx: poise::Context<'_, BotData, Error>) -> Result<()> {
        let guild_id = require_guild(ctx)?;
        let current =
            settings::get_or_create_guild_settings(&ctx.data().database, &guild_id.to_string())
                .await?;

        let mut categories = String::new();
        for category in ModerationCategory::ALL {
            let mark = if category.is_enabled(&current) { "🟢" } else { "🔴" };
            writeln!(categories, "{mark} {category}")?;
        }

        let blocked = settings::decode_blocked_users(&current)?.len();
        let thread_category = current
            .modmail_category_id
            .as_deref()
            .map_or_else(|| "created on first thread".to_string(), |id| format!("<#{id}>"));
        let log_channel = current
            .log_channel_id
            .as_deref()
            .map_or_else(|| "not set".to_string(), |id| format!("<#{id}>"));

        let embed = serenity::CreateEmbed::default()
            .title("**Moderation Status**")
            .color(0x0058_65F2)
            .field("Categories", categories, false)
            .field("Thread category", thread_category, true)
            .field("Log channel", log_channel, true)
            .field("Blocked users", blocked.to_string(), true)
            .field(
                "Idle close",
                format_duration(ctx.data().modmail.config().close_after),
                true,
            );

        ctx.send(poise::CreateReply::default().embed(embed)).await?;
        Ok(())
    }
}

// Re-export all commands
pub use inner::*;
