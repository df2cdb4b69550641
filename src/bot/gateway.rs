//! Serenity-backed [`MailGateway`].
//!
//! Posts become embeds, the server choice becomes a string select menu. HTTP 404s on
//! channel operations are mapped to `Error::ChannelMissing`.

use crate::{
    core::modmail::{GuildChoice, MailGateway, MailPost, gateway::MAX_GUILD_CHOICES},
    errors::{Error, Result},
};
use async_trait::async_trait;
use poise::serenity_prelude::{
    self as serenity, Cache, Channel, ChannelId, ChannelType, CreateActionRow, CreateChannel,
    CreateEmbed, CreateEmbedAuthor, CreateEmbedFooter, CreateMessage, CreateSelectMenu,
    CreateSelectMenuKind, CreateSelectMenuOption, GuildId, Http, MessageId, Timestamp, UserId,
};
use std::sync::Arc;

/// Custom id of the server selection menu.
pub const GUILD_SELECT_ID: &str = "modmail_guild_select";

/// Discord's limit on select option labels.
const MAX_LABEL_LEN: usize = 100;

/// Gateway talking to Discord through serenity's HTTP client and cache.
#[derive(Clone)]
pub struct SerenityGateway {
    http: Arc<Http>,
    cache: Arc<Cache>,
}

impl SerenityGateway {
    /// Wraps the client's HTTP handle and cache.
    #[must_use]
    pub const fn new(http: Arc<Http>, cache: Arc<Cache>) -> Self {
        Self { http, cache }
    }
}

fn is_not_found(error: &serenity::Error) -> bool {
    matches!(
        error,
        serenity::Error::Http(http) if http.status_code().is_some_and(|status| status.as_u16() == 404)
    )
}

fn channel_error(error: serenity::Error, channel_id: ChannelId) -> Error {
    if is_not_found(&error) {
        Error::ChannelMissing {
            channel_id: channel_id.get(),
        }
    } else {
        error.into()
    }
}

/// Renders a post as embeds, one per page of its body.
///
/// The title and author go on the first embed, the footer on the last.
#[must_use]
pub fn post_embeds(post: &MailPost) -> Vec<CreateEmbed> {
    let pages = post.rendered_pages();
    let last = pages.len().saturating_sub(1);

    pages
        .into_iter()
        .enumerate()
        .map(|(index, page)| {
            let mut embed = CreateEmbed::new()
                .description(page)
                .color(post.color())
                .timestamp(Timestamp::now());

            if index == 0 {
                embed = embed.title(&post.title);
                if let Some(author) = &post.author {
                    embed = embed.author(CreateEmbedAuthor::new(author));
                }
            }
            if index == last {
                if let Some(footer) = &post.footer {
                    embed = embed.footer(CreateEmbedFooter::new(footer));
                }
            }

            embed
        })
        .collect()
}

fn select_label(name: &str) -> String {
    name.chars().take(MAX_LABEL_LEN).collect()
}

#[async_trait]
impl MailGateway for SerenityGateway {
    async fn is_member(&self, guild_id: GuildId, user_id: UserId) -> Result<bool> {
        let cached = self
            .cache
            .guild(guild_id)
            .map(|guild| guild.members.contains_key(&user_id));
        if cached == Some(true) {
            return Ok(true);
        }

        match self.http.get_member(guild_id, user_id).await {
            Ok(_) => Ok(true),
            Err(e) if is_not_found(&e) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn guild_name(&self, guild_id: GuildId) -> Option<String> {
        if let Some(name) = self.cache.guild(guild_id).map(|guild| guild.name.clone()) {
            return Some(name);
        }

        self.http
            .get_guild(guild_id)
            .await
            .ok()
            .map(|guild| guild.name)
    }

    async fn ensure_category(
        &self,
        guild_id: GuildId,
        existing: Option<ChannelId>,
        name: &str,
    ) -> Result<ChannelId> {
        if let Some(category_id) = existing {
            match self.http.get_channel(category_id).await {
                Ok(Channel::Guild(channel))
                    if channel.kind == ChannelType::Category && channel.guild_id == guild_id =>
                {
                    return Ok(category_id);
                }
                Ok(_) => {}
                Err(e) if is_not_found(&e) => {}
                Err(e) => return Err(e.into()),
            }
        }

        let category = guild_id
            .create_channel(
                self.http.as_ref(),
                CreateChannel::new(name).kind(ChannelType::Category),
            )
            .await?;

        Ok(category.id)
    }

    async fn create_thread_channel(
        &self,
        guild_id: GuildId,
        category_id: ChannelId,
        name: &str,
        topic: &str,
    ) -> Result<ChannelId> {
        let builder = CreateChannel::new(name)
            .kind(ChannelType::Text)
            .category(category_id)
            .topic(topic);
        let channel = guild_id.create_channel(self.http.as_ref(), builder).await?;

        Ok(channel.id)
    }

    async fn channel_exists(&self, channel_id: ChannelId) -> Result<bool> {
        match self.http.get_channel(channel_id).await {
            Ok(_) => Ok(true),
            Err(e) if is_not_found(&e) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    // Long posts go out as consecutive messages so each stays within Discord's limits.
    async fn post(&self, channel_id: ChannelId, post: &MailPost) -> Result<()> {
        for embed in post_embeds(post) {
            channel_id
                .send_message(self.http.as_ref(), CreateMessage::new().embed(embed))
                .await
                .map_err(|e| channel_error(e, channel_id))?;
        }
        Ok(())
    }

    async fn send_dm(&self, user_id: UserId, post: &MailPost) -> Result<()> {
        for embed in post_embeds(post) {
            user_id
                .direct_message(self.http.as_ref(), CreateMessage::new().embed(embed))
                .await?;
        }
        Ok(())
    }

    async fn react(&self, channel_id: ChannelId, message_id: MessageId, emoji: char) -> Result<()> {
        channel_id
            .create_reaction(self.http.as_ref(), message_id, emoji)
            .await
            .map_err(|e| channel_error(e, channel_id))
    }

    async fn prompt_guild_selection(
        &self,
        user_id: UserId,
        choices: &[GuildChoice],
        post: &MailPost,
    ) -> Result<()> {
        let options = choices
            .iter()
            .take(MAX_GUILD_CHOICES)
            .map(|choice| {
                CreateSelectMenuOption::new(select_label(&choice.name), choice.guild_id.to_string())
            })
            .collect();
        let menu = CreateSelectMenu::new(GUILD_SELECT_ID, CreateSelectMenuKind::String { options })
            .placeholder("Choose a server");

        let message = CreateMessage::new()
            .embeds(post_embeds(post))
            .components(vec![CreateActionRow::SelectMenu(menu)]);
        user_id.direct_message(self.http.as_ref(), message).await?;

        Ok(())
    }

    async fn delete_channel(&self, channel_id: ChannelId) -> Result<()> {
        channel_id
            .delete(self.http.as_ref())
            .await
            .map_err(|e| channel_error(e, channel_id))?;
        Ok(())
    }
}
