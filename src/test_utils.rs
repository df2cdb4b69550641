//! Shared test utilities for the Court Herald.
//!
//! Provides an in-memory database, a recording [`MockGateway`] that stands in for
//! Discord, and a [`MemorySettings`] store so modmail tests can run on paused time
//! without touching `SQLite`.

use crate::{
    core::modmail::{GuildChoice, InboundMail, MailGateway, MailPost, ModmailGuild, SettingsStore},
    errors::{Error, Result},
};
use async_trait::async_trait;
use chrono::DateTime;
use poise::serenity_prelude::{ChannelId, GuildId, MessageId, UserId};
use sea_orm::DatabaseConnection;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Creates an in-memory `SQLite` database with all tables initialized.
pub async fn setup_test_db() -> Result<DatabaseConnection> {
    let db = sea_orm::Database::connect("sqlite::memory:").await?;
    crate::config::database::create_tables(&db).await?;
    Ok(db)
}

/// A direct message from `user_id` with sensible defaults.
///
/// # Defaults
/// * display name: "Test User", username: "test_user"
/// * DM channel 1, message 1, no attachments
pub fn inbound(user_id: u64, content: &str) -> InboundMail {
    InboundMail {
        user_id: UserId::new(user_id),
        dm_channel_id: ChannelId::new(1),
        message_id: MessageId::new(1),
        display_name: "Test User".to_string(),
        username: "test_user".to_string(),
        account_created: DateTime::from_timestamp(1_500_000_000, 0).unwrap_or_default(),
        content: content.to_string(),
        attachments: Vec::new(),
    }
}

/// A channel created through the mock gateway.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CreatedChannel {
    /// Owning guild
    pub guild_id: GuildId,
    /// Parent category
    pub category_id: ChannelId,
    /// The new channel
    pub channel_id: ChannelId,
    /// Channel name
    pub name: String,
}

/// Every side effect the mock gateway was asked to perform.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GatewayCall {
    /// A category was created
    CreateCategory {
        /// Guild
        guild_id: GuildId,
        /// New category
        category_id: ChannelId,
        /// Category name
        name: String,
    },
    /// A thread channel was created
    CreateChannel(CreatedChannel),
    /// Something was posted into a channel
    Post {
        /// Target channel
        channel_id: ChannelId,
        /// The post
        post: MailPost,
    },
    /// A DM was sent
    Dm {
        /// Recipient
        user_id: UserId,
        /// The post
        post: MailPost,
    },
    /// A reaction was added
    React {
        /// Channel of the message
        channel_id: ChannelId,
        /// Message reacted to
        message_id: MessageId,
        /// Emoji
        emoji: char,
    },
    /// A server selection prompt was sent
    Prompt {
        /// Recipient
        user_id: UserId,
        /// Offered guilds
        choices: Vec<GuildChoice>,
    },
    /// A channel was deleted
    Delete {
        /// Deleted channel
        channel_id: ChannelId,
    },
}

#[derive(Debug)]
struct MockState {
    calls: Vec<GatewayCall>,
    members: HashSet<(GuildId, UserId)>,
    failing_membership: HashSet<GuildId>,
    categories: HashSet<ChannelId>,
    deleted: HashSet<ChannelId>,
    closed_dms: HashSet<UserId>,
    guild_names: HashMap<GuildId, String>,
    fail_channel_creation: bool,
    next_id: u64,
}

/// In-memory stand-in for Discord that records every call.
#[derive(Debug)]
pub struct MockGateway {
    state: Mutex<MockState>,
}

impl Default for MockGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl MockGateway {
    /// Creates a gateway with no members; allocated ids start at 1000.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState {
                calls: Vec::new(),
                members: HashSet::new(),
                failing_membership: HashSet::new(),
                categories: HashSet::new(),
                deleted: HashSet::new(),
                closed_dms: HashSet::new(),
                guild_names: HashMap::new(),
                fail_channel_creation: false,
                next_id: 1000,
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Makes `user_id` a member of `guild_id`.
    pub fn add_member(&self, guild_id: GuildId, user_id: UserId) {
        self.state().members.insert((guild_id, user_id));
    }

    /// Makes membership checks against `guild_id` fail.
    pub fn fail_membership(&self, guild_id: GuildId) {
        self.state().failing_membership.insert(guild_id);
    }

    /// Registers an existing category channel.
    pub fn add_category(&self, category_id: ChannelId) -> ChannelId {
        self.state().categories.insert(category_id);
        category_id
    }

    /// Gives a guild a display name.
    pub fn set_guild_name(&self, guild_id: GuildId, name: &str) {
        self.state().guild_names.insert(guild_id, name.to_string());
    }

    /// Simulates a channel deleted outside the bot.
    pub fn remove_channel(&self, channel_id: ChannelId) {
        self.state().deleted.insert(channel_id);
    }

    /// Makes every later channel creation fail.
    pub fn fail_channel_creation(&self) {
        self.state().fail_channel_creation = true;
    }

    /// Makes DMs to `user_id` fail.
    pub fn close_dms(&self, user_id: UserId) {
        self.state().closed_dms.insert(user_id);
    }

    /// Every recorded call, in order.
    pub fn calls(&self) -> Vec<GatewayCall> {
        self.state().calls.clone()
    }

    /// Categories created, with their names.
    pub fn created_categories(&self) -> Vec<(ChannelId, String)> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                GatewayCall::CreateCategory {
                    category_id, name, ..
                } => Some((category_id, name)),
                _ => None,
            })
            .collect()
    }

    /// Thread channels created.
    pub fn created_channels(&self) -> Vec<CreatedChannel> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                GatewayCall::CreateChannel(created) => Some(created),
                _ => None,
            })
            .collect()
    }

    /// Posts made into `channel_id`.
    pub fn posts_to(&self, channel_id: ChannelId) -> Vec<MailPost> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                GatewayCall::Post { channel_id: target, post } if target == channel_id => Some(post),
                _ => None,
            })
            .collect()
    }

    /// DMs delivered to `user_id`.
    pub fn dms_to(&self, user_id: UserId) -> Vec<MailPost> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                GatewayCall::Dm { user_id: target, post } if target == user_id => Some(post),
                _ => None,
            })
            .collect()
    }

    /// Offered choices of every selection prompt.
    pub fn prompts(&self) -> Vec<Vec<GuildChoice>> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                GatewayCall::Prompt { choices, .. } => Some(choices),
                _ => None,
            })
            .collect()
    }

    /// Channels deleted by the bot.
    pub fn deleted_channels(&self) -> Vec<ChannelId> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                GatewayCall::Delete { channel_id } => Some(channel_id),
                _ => None,
            })
            .collect()
    }
}

fn refused(what: &str) -> Error {
    Error::Config {
        message: format!("mock gateway refused to {what}"),
    }
}

#[async_trait]
impl MailGateway for MockGateway {
    async fn is_member(&self, guild_id: GuildId, user_id: UserId) -> Result<bool> {
        let state = self.state();
        if state.failing_membership.contains(&guild_id) {
            return Err(refused("check membership"));
        }
        Ok(state.members.contains(&(guild_id, user_id)))
    }

    async fn guild_name(&self, guild_id: GuildId) -> Option<String> {
        self.state().guild_names.get(&guild_id).cloned()
    }

    async fn ensure_category(
        &self,
        guild_id: GuildId,
        existing: Option<ChannelId>,
        name: &str,
    ) -> Result<ChannelId> {
        let mut state = self.state();
        if let Some(category_id) = existing.filter(|id| state.categories.contains(id)) {
            return Ok(category_id);
        }

        state.next_id += 1;
        let category_id = ChannelId::new(state.next_id);
        state.categories.insert(category_id);
        state.calls.push(GatewayCall::CreateCategory {
            guild_id,
            category_id,
            name: name.to_string(),
        });
        Ok(category_id)
    }

    async fn create_thread_channel(
        &self,
        guild_id: GuildId,
        category_id: ChannelId,
        name: &str,
        _topic: &str,
    ) -> Result<ChannelId> {
        let mut state = self.state();
        if state.fail_channel_creation {
            return Err(refused("create a channel"));
        }

        state.next_id += 1;
        let channel_id = ChannelId::new(state.next_id);
        state.calls.push(GatewayCall::CreateChannel(CreatedChannel {
            guild_id,
            category_id,
            channel_id,
            name: name.to_string(),
        }));
        Ok(channel_id)
    }

    async fn channel_exists(&self, channel_id: ChannelId) -> Result<bool> {
        Ok(!self.state().deleted.contains(&channel_id))
    }

    async fn post(&self, channel_id: ChannelId, post: &MailPost) -> Result<()> {
        let mut state = self.state();
        if state.deleted.contains(&channel_id) {
            return Err(Error::ChannelMissing {
                channel_id: channel_id.get(),
            });
        }

        state.calls.push(GatewayCall::Post {
            channel_id,
            post: post.clone(),
        });
        Ok(())
    }

    async fn send_dm(&self, user_id: UserId, post: &MailPost) -> Result<()> {
        let mut state = self.state();
        if state.closed_dms.contains(&user_id) {
            return Err(refused("send a DM"));
        }

        state.calls.push(GatewayCall::Dm {
            user_id,
            post: post.clone(),
        });
        Ok(())
    }

    async fn react(&self, channel_id: ChannelId, message_id: MessageId, emoji: char) -> Result<()> {
        self.state().calls.push(GatewayCall::React {
            channel_id,
            message_id,
            emoji,
        });
        Ok(())
    }

    async fn prompt_guild_selection(
        &self,
        user_id: UserId,
        choices: &[GuildChoice],
        _post: &MailPost,
    ) -> Result<()> {
        self.state().calls.push(GatewayCall::Prompt {
            user_id,
            choices: choices.to_vec(),
        });
        Ok(())
    }

    async fn delete_channel(&self, channel_id: ChannelId) -> Result<()> {
        let mut state = self.state();
        if !state.deleted.insert(channel_id) {
            return Err(Error::ChannelMissing {
                channel_id: channel_id.get(),
            });
        }

        state.calls.push(GatewayCall::Delete { channel_id });
        Ok(())
    }
}

/// Settings store backed by a map, for tests that must not touch a database.
#[derive(Debug, Default)]
pub struct MemorySettings {
    guilds: Mutex<BTreeMap<GuildId, ModmailGuild>>,
}

impl MemorySettings {
    /// Creates a store with no guilds.
    pub fn new() -> Self {
        Self::default()
    }

    fn guilds(&self) -> MutexGuard<'_, BTreeMap<GuildId, ModmailGuild>> {
        self.guilds.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn edit(&self, guild_id: GuildId, edit: impl FnOnce(&mut ModmailGuild)) {
        let mut guilds = self.guilds();
        let guild = guilds.entry(guild_id).or_insert_with(|| ModmailGuild {
            guild_id,
            category_id: None,
            log_channel_id: None,
            blocked_users: Vec::new(),
        });
        edit(guild);
    }

    /// Enables modmail in `guild_id`.
    pub fn enable(&self, guild_id: GuildId) {
        self.edit(guild_id, |_| {});
    }

    /// Blocks `user_id` in `guild_id`.
    pub fn block(&self, guild_id: GuildId, user_id: UserId) {
        self.edit(guild_id, |guild| guild.blocked_users.push(user_id));
    }

    /// Sets the thread category of `guild_id`.
    pub fn set_category(&self, guild_id: GuildId, category_id: ChannelId) {
        self.edit(guild_id, |guild| guild.category_id = Some(category_id));
    }

    /// Enables logging into `channel_id`.
    pub fn set_log_channel(&self, guild_id: GuildId, channel_id: ChannelId) {
        self.edit(guild_id, |guild| guild.log_channel_id = Some(channel_id));
    }

    /// The stored thread category of `guild_id`.
    pub fn category(&self, guild_id: GuildId) -> Option<ChannelId> {
        self.guilds().get(&guild_id).and_then(|guild| guild.category_id)
    }
}

#[async_trait]
impl SettingsStore for MemorySettings {
    async fn modmail_guilds(&self) -> Result<Vec<ModmailGuild>> {
        Ok(self.guilds().values().cloned().collect())
    }

    async fn modmail_guild(&self, guild_id: GuildId) -> Result<Option<ModmailGuild>> {
        Ok(self.guilds().get(&guild_id).cloned())
    }

    async fn save_category(&self, guild_id: GuildId, category_id: ChannelId) -> Result<()> {
        self.set_category(guild_id, category_id);
        Ok(())
    }
}
