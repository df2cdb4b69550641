//! The chat platform as seen by the modmail core.
//!
//! The bot implements [`MailGateway`] on top of serenity; tests use a recording double.

use super::relay::MailPost;
use crate::errors::Result;
use async_trait::async_trait;
use poise::serenity_prelude::{ChannelId, GuildId, MessageId, UserId};

/// Most guilds a single selection prompt can offer.
pub const MAX_GUILD_CHOICES: usize = 25;

/// One entry of a server selection prompt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GuildChoice {
    /// Guild offered
    pub guild_id: GuildId,
    /// Name shown to the user
    pub name: String,
}

/// Platform operations the modmail lifecycle needs.
///
/// Methods that post into a channel must report a deleted channel as
/// `Error::ChannelMissing` so the controller can recover from it.
#[async_trait]
pub trait MailGateway: Send + Sync + 'static {
    /// Whether the user is a member of the guild.
    async fn is_member(&self, guild_id: GuildId, user_id: UserId) -> Result<bool>;

    /// The guild's display name, if known.
    async fn guild_name(&self, guild_id: GuildId) -> Option<String>;

    /// Returns `existing` if it is still a category in the guild, otherwise creates a
    /// category called `name` and returns its id.
    async fn ensure_category(
        &self,
        guild_id: GuildId,
        existing: Option<ChannelId>,
        name: &str,
    ) -> Result<ChannelId>;

    /// Creates a text channel for a thread under `category_id`.
    async fn create_thread_channel(
        &self,
        guild_id: GuildId,
        category_id: ChannelId,
        name: &str,
        topic: &str,
    ) -> Result<ChannelId>;

    /// Whether the channel still exists.
    async fn channel_exists(&self, channel_id: ChannelId) -> Result<bool>;

    /// Posts into a guild channel.
    async fn post(&self, channel_id: ChannelId, post: &MailPost) -> Result<()>;

    /// Sends a direct message.
    async fn send_dm(&self, user_id: UserId, post: &MailPost) -> Result<()>;

    /// Reacts to a message.
    async fn react(&self, channel_id: ChannelId, message_id: MessageId, emoji: char) -> Result<()>;

    /// Sends the user an interactive server choice.
    async fn prompt_guild_selection(
        &self,
        user_id: UserId,
        choices: &[GuildChoice],
        post: &MailPost,
    ) -> Result<()>;

    /// Deletes a channel.
    async fn delete_channel(&self, channel_id: ChannelId) -> Result<()>;
}
