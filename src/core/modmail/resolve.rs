//! Server resolution - which guild a direct message is meant for.
//!
//! Eligible guilds come from the [`SettingsStore`]; membership is checked through the
//! gateway. When several guilds qualify the user is asked to pick one and the message
//! waits in [`PendingSelections`] until they do, or the prompt expires.

use super::gateway::{GuildChoice, MailGateway};
use super::relay::InboundMail;
use crate::entities::guild_settings;
use crate::errors::{Error, Result};
use async_trait::async_trait;
use poise::serenity_prelude::{ChannelId, GuildId, UserId};
use std::collections::HashMap;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::debug;

/// Modmail-relevant settings of one guild.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ModmailGuild {
    /// The guild
    pub guild_id: GuildId,
    /// Configured thread category, if any
    pub category_id: Option<ChannelId>,
    /// Log channel, present only while logging is enabled
    pub log_channel_id: Option<ChannelId>,
    /// Users barred from opening threads here
    pub blocked_users: Vec<UserId>,
}

impl ModmailGuild {
    /// Whether `user_id` is on this guild's block list.
    #[must_use]
    pub fn is_blocked(&self, user_id: UserId) -> bool {
        self.blocked_users.contains(&user_id)
    }
}

fn parse_id(raw: &str, what: &str) -> Result<u64> {
    raw.trim()
        .parse::<u64>()
        .ok()
        .filter(|id| *id != 0)
        .ok_or_else(|| Error::Config {
            message: format!("Invalid {what} id stored in guild settings: {raw:?}"),
        })
}

impl TryFrom<&guild_settings::Model> for ModmailGuild {
    type Error = Error;

    fn try_from(settings: &guild_settings::Model) -> Result<Self> {
        let guild_id = GuildId::new(parse_id(&settings.guild_id, "guild")?);
        let category_id = settings
            .modmail_category_id
            .as_deref()
            .map(|raw| parse_id(raw, "category").map(ChannelId::new))
            .transpose()?;
        let log_channel_id = if settings.logging_enabled {
            settings
                .log_channel_id
                .as_deref()
                .map(|raw| parse_id(raw, "log channel").map(ChannelId::new))
                .transpose()?
        } else {
            None
        };
        let blocked_users = crate::core::settings::decode_blocked_users(settings)?
            .iter()
            .map(|raw| parse_id(raw, "user").map(UserId::new))
            .collect::<Result<_>>()?;

        Ok(Self { guild_id, category_id, log_channel_id, blocked_users })
    }
}

/// Source of per-guild modmail settings.
#[async_trait]
pub trait SettingsStore: Send + Sync + 'static {
    /// Every guild with modmail enabled.
    async fn modmail_guilds(&self) -> Result<Vec<ModmailGuild>>;

    /// One guild's settings, or None if modmail is disabled there.
    async fn modmail_guild(&self, guild_id: GuildId) -> Result<Option<ModmailGuild>>;

    /// Remembers the category threads are created under.
    async fn save_category(&self, guild_id: GuildId, category_id: ChannelId) -> Result<()>;
}

/// Lists the guilds a user may open a thread in.
///
/// Guilds that blocked the user are skipped. A failed membership check counts as
/// "not a member".
pub async fn eligible_guilds<G, S>(gateway: &G, store: &S, user_id: UserId) -> Result<Vec<GuildId>>
where
    G: MailGateway + ?Sized,
    S: SettingsStore + ?Sized,
{
    let mut eligible = Vec::new();

    for guild in store.modmail_guilds().await? {
        if guild.is_blocked(user_id) {
            debug!(%user_id, guild_id = %guild.guild_id, "Skipping guild that blocked user");
            continue;
        }

        match gateway.is_member(guild.guild_id, user_id).await {
            Ok(true) => eligible.push(guild.guild_id),
            Ok(false) => {}
            Err(e) => {
                debug!(%user_id, guild_id = %guild.guild_id, "Membership check failed: {e}");
            }
        }
    }

    Ok(eligible)
}

/// Messages waiting for the user to choose a guild.
#[derive(Debug)]
pub struct PendingServerSelection {
    /// Queued messages, oldest first
    pub messages: Vec<InboundMail>,
    /// Guilds offered in the prompt
    pub choices: Vec<GuildChoice>,
    /// When the prompt stops being answerable
    pub expires_at: Instant,
    token: u64,
    expiry: Option<JoinHandle<()>>,
}

impl PendingServerSelection {
    /// Whether `guild_id` was one of the offered choices.
    #[must_use]
    pub fn offers(&self, guild_id: GuildId) -> bool {
        self.choices.iter().any(|choice| choice.guild_id == guild_id)
    }
}

impl Drop for PendingServerSelection {
    fn drop(&mut self) {
        if let Some(expiry) = self.expiry.take() {
            expiry.abort();
        }
    }
}

/// Pending selections keyed by user.
#[derive(Debug, Default)]
pub struct PendingSelections {
    entries: HashMap<UserId, PendingServerSelection>,
    next_token: u64,
}

impl PendingSelections {
    /// Whether the user has an unanswered prompt.
    #[must_use]
    pub fn contains(&self, user_id: UserId) -> bool {
        self.entries.contains_key(&user_id)
    }

    /// The user's pending selection.
    #[must_use]
    pub fn get(&self, user_id: UserId) -> Option<&PendingServerSelection> {
        self.entries.get(&user_id)
    }

    /// Starts a selection, replacing any previous one. Returns the expiry token.
    pub fn insert(
        &mut self,
        user_id: UserId,
        message: InboundMail,
        choices: Vec<GuildChoice>,
        expires_at: Instant,
    ) -> u64 {
        self.next_token += 1;
        let token = self.next_token;

        self.entries.insert(
            user_id,
            PendingServerSelection {
                messages: vec![message],
                choices,
                expires_at,
                token,
                expiry: None,
            },
        );

        token
    }

    /// Queues another message on a pending selection and pushes its expiry back.
    ///
    /// Returns the offered choices and the new expiry token, or None if nothing is pending.
    pub fn append(
        &mut self,
        user_id: UserId,
        message: InboundMail,
        expires_at: Instant,
    ) -> Option<(Vec<GuildChoice>, u64)> {
        self.next_token += 1;
        let token = self.next_token;
        let entry = self.entries.get_mut(&user_id)?;

        entry.messages.push(message);
        entry.expires_at = expires_at;
        entry.token = token;
        if let Some(previous) = entry.expiry.take() {
            previous.abort();
        }

        Some((entry.choices.clone(), token))
    }

    /// Attaches the expiry task for the selection identified by `token`.
    ///
    /// If the selection is gone or was refreshed meanwhile, the task is aborted instead.
    pub fn set_expiry(&mut self, user_id: UserId, token: u64, handle: JoinHandle<()>) {
        match self.entries.get_mut(&user_id) {
            Some(entry) if entry.token == token => {
                if let Some(previous) = entry.expiry.replace(handle) {
                    previous.abort();
                }
            }
            _ => handle.abort(),
        }
    }

    /// Removes and returns the user's selection.
    pub fn take(&mut self, user_id: UserId) -> Option<PendingServerSelection> {
        self.entries.remove(&user_id)
    }

    /// Drops the selection if it still carries `token`. Called by the expiry task itself.
    pub fn expire(&mut self, user_id: UserId, token: u64) -> bool {
        if self.entries.get(&user_id).is_none_or(|entry| entry.token != token) {
            return false;
        }

        if let Some(mut entry) = self.entries.remove(&user_id) {
            // The running expiry task must not abort itself.
            drop(entry.expiry.take());
        }
        true
    }

    /// Number of pending selections.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }
}
