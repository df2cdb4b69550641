//! Modmail Discord commands - enable, disable, category, close, block and unblock.
//!
//! Settings changes go through `core::settings`; closing and blocking also reach into
//! the running modmail service so open threads react immediately.

// Inner module to suppress missing_docs warnings for poise macro-generated code
mod inner {
    #![allow(missing_docs)]

    use crate::{
        bot::{BotData, commands::require_guild},
        core::{
            modmail::CloseReason,
            settings::{self, ModerationCategory},
        },
        errors::{Error, Result},
    };
    use poise::serenity_prelude as serenity;
    use tracing::info;

    /// Parent command for modmail configuration and thread management.
    #[poise::command(
        slash_command,
        guild_only,
        subcommands(
            "modmail_enable",
            "modmail_disable",
            "modmail_category",
            "modmail_close",
            "modmail_block",
            "modmail_unblock"
        )
    )]
    pub async fn modmail(ctx: poise::Context<'_, BotData, Error>) -> Result<()> {
        let help_text = "Modmail command. Available subcommands:\n\
            `/modmail enable` - Start accepting modmail in this server\n\
            `/modmail disable` - Stop accepting modmail\n\
            `/modmail category <category>` - Set where thread channels are created\n\
            `/modmail close` - Close the thread in this channel\n\
            `/modmail block <user>` - Stop a user from opening threads\n\
            `/modmail unblock <user>` - Allow a blocked user again";

        ctx.say(help_text).await?;
        Ok(())
    }

    /// Enables modmail for this server.
    #[poise::command(
        slash_command,
        guild_only,
        rename = "enable",
        required_permissions = "MANAGE_GUILD"
    )]
    pub async fn modmail_enable(ctx: poise::Context<'_, BotData, Error>) -> Result<()> {
        let guild_id = require_guild(ctx)?;
        let db = &ctx.data().database;

        settings::set_category_enabled(db, &guild_id.to_string(), ModerationCategory::Modmail, true)
            .await?;
        info!(%guild_id, "Modmail enabled");

        ctx.say("✅ Modmail is now enabled. Members can DM me to reach the staff team.")
            .await?;
        Ok(())
    }

    /// Disables modmail for this server. Open threads run out normally.
    #[poise::command(
        slash_command,
        guild_only,
        rename = "disable",
        required_permissions = "MANAGE_GUILD"
    )]
    pub async fn modmail_disable(ctx: poise::Context<'_, BotData, Error>) -> Result<()> {
        let guild_id = require_guild(ctx)?;
        let db = &ctx.data().database;

        settings::set_category_enabled(
            db,
            &guild_id.to_string(),
            ModerationCategory::Modmail,
            false,
        )
        .await?;
        info!(%guild_id, "Modmail disabled");

        ctx.say("✅ Modmail is now disabled. New DMs will not open threads here.")
            .await?;
        Ok(())
    }

    /// Sets the category that new thread channels are created under.
    #[poise::command(
        slash_command,
        guild_only,
        rename = "category",
        required_permissions = "MANAGE_GUILD"
    )]
    pub async fn modmail_category(
        ctx: poise::Context<'_, BotData, Error>,
        #[description = "Category for modmail thread channels"]
        #[channel_types("Category")]
        category: serenity::GuildChannel,
    ) -> Result<()> {
        let guild_id = require_guild(ctx)?;

        if category.kind != serenity::ChannelType::Category || category.guild_id != guild_id {
            ctx.say("❌ Please pick a category from this server.").await?;
            return Ok(());
        }

        settings::set_modmail_category(
            &ctx.data().database,
            &guild_id.to_string(),
            Some(category.id.to_string()),
        )
        .await?;

        ctx.say(format!(
            "✅ New modmail threads will be created under **{}**.",
            category.name
        ))
        .await?;
        Ok(())
    }

    /// Closes the modmail thread in the current channel.
    #[poise::command(
        slash_command,
        guild_only,
        rename = "close",
        required_permissions = "MODERATE_MEMBERS"
    )]
    pub async fn modmail_close(ctx: poise::Context<'_, BotData, Error>) -> Result<()> {
        ctx.defer().await?;

        let closed_by = ctx
            .author()
            .global_name
            .clone()
            .unwrap_or_else(|| ctx.author().name.clone());

        match ctx
            .data()
            .modmail
            .close_thread_in_channel(ctx.channel_id(), closed_by)
            .await
        {
            Ok(user_id) => {
                ctx.say(format!("🔒 Closed the thread with <@{user_id}>."))
                    .await?;
            }
            Err(Error::ThreadNotFound { .. }) => {
                ctx.say("❌ This channel is not an open modmail thread.")
                    .await?;
            }
            Err(e) => return Err(e),
        }

        Ok(())
    }

    /// Blocks a user from opening modmail threads in this server.
    ///
    /// An open thread with the user in this server is closed right away.
    #[poise::command(
        slash_command,
        guild_only,
        rename = "block",
        required_permissions = "MANAGE_GUILD"
    )]
    pub async fn modmail_block(
        ctx: poise::Context<'_, BotData, Error>,
        #[description = "User to block"] user: serenity::User,
    ) -> Result<()> {
        let guild_id = require_guild(ctx)?;
        ctx.defer().await?;

        let newly_blocked = settings::block_user(
            &ctx.data().database,
            &guild_id.to_string(),
            &user.id.to_string(),
        )
        .await?;

        if !newly_blocked {
            ctx.say(format!("⚠️ <@{}> is already blocked.", user.id))
                .await?;
            return Ok(());
        }

        info!(%guild_id, user_id = %user.id, "User blocked from modmail");
        let closed = ctx
            .data()
            .modmail
            .close_user_thread(guild_id, user.id, CloseReason::Blocked)
            .await;

        let suffix = if closed { " Their open thread was closed." } else { "" };
        ctx.say(format!("✅ <@{}> can no longer open modmail threads.{suffix}", user.id))
            .await?;
        Ok(())
    }

    /// Allows a previously blocked user to open modmail threads again.
    #[poise::command(
        slash_command,
        guild_only,
        rename = "unblock",
        required_permissions = "MANAGE_GUILD"
    )]
    pub async fn modmail_unblock(
        ctx: poise::Context<'_, BotData, Error>,
        #[description = "User to unblock"] user: serenity::User,
    ) -> Result<()> {
        let guild_id = require_guild(ctx)?;

        let removed = settings::unblock_user(
            &ctx.data().database,
            &guild_id.to_string(),
            &user.id.to_string(),
        )
        .await?;

        if removed {
            info!(%guild_id, user_id = %user.id, "User unblocked from modmail");
            ctx.say(format!("✅ <@{}> can open modmail threads again.", user.id))
                .await?;
        } else {
            ctx.say(format!("⚠️ <@{}> was not blocked.", user.id))
                .await?;
        }
        Ok(())
    }
}

// Re-export all commands
pub use inner::*;
