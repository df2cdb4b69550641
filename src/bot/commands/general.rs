//! General Discord commands - ping and help.
//! These commands touch neither the database nor the modmail service.

// Inner module to suppress missing_docs warnings for poise macro-generated code
mod inner {
    #![allow(missing_docs)]

    use crate::{
        bot::BotData,
        errors::{Error, Result},
    };

    /// Responds with "Pong!" to test bot connectivity.
    #[poise::command(slash_command)]
    pub async fn ping(ctx: poise::Context<'_, BotData, Error>) -> Result<()> {
        ctx.say("Pong!").await?;
        Ok(())
    }

    /// Displays help information about modmail and the available commands.
    #[poise::command(slash_command)]
    pub async fn help(ctx: poise::Context<'_, BotData, Error>) -> Result<()> {
        let help_text = "**Court Herald Help**\n\
        Send me a direct message to reach the staff of a server we share. If several \
        servers have modmail enabled you will be asked to pick one. Threads close after \
        a minute without messages; just write again to start a new one.\n\n\
        **Modmail Commands** (Manage Server)\n\
        • `/modmail enable` / `/modmail disable` - Turn modmail on or off.\n\
        • `/modmail category <category>` - Choose where thread channels are created.\n\
        • `/modmail block <user>` / `/modmail unblock <user>` - Manage the block list.\n\
        • `/modmail close` - Close the thread in the current channel (Moderate Members).\n\n\
        **Logging & Moderation** (Manage Server)\n\
        • `/logging channel [channel]` / `/logging disable` / `/logging show`\n\
        • `/moderation toggle <category> <enabled>` / `/moderation status`\n\n\
        **Utility Commands**\n\
        • `/ping` - Checks if the bot is responsive.\n\
        • `/help` - Shows this help message.\n\n\
        Staff reply to a user simply by writing in the thread channel.";

        ctx.say(help_text).await?;
        Ok(())
    }
}

// Re-export all commands
pub use inner::*;
