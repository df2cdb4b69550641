//! Guild settings business logic - reads and writes the per-guild configuration row.
//!
//! Every setter creates the row on first use, so commands never need to check whether
//! a guild has been configured before. Collection settings (the modmail block list) are
//! kept as JSON text and decoded here.

use crate::{
    core::modmail::{ModmailGuild, SettingsStore},
    entities::{GuildSettings, guild_settings},
    errors::{Error, Result},
};
use async_trait::async_trait;
use poise::serenity_prelude::{ChannelId, GuildId};
use sea_orm::{QueryOrder, Set, prelude::*};
use std::fmt;

/// Bot features that can be switched on or off per guild.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ModerationCategory {
    /// Direct-message relay into staff channels
    Modmail,
    /// Posting lifecycle events into the log channel
    Logging,
}

impl ModerationCategory {
    /// All categories, in display order.
    pub const ALL: [Self; 2] = [Self::Modmail, Self::Logging];

    /// Whether this category is switched on in the given settings row.
    #[must_use]
    pub const fn is_enabled(self, settings: &guild_settings::Model) -> bool {
        match self {
            Self::Modmail => settings.modmail_enabled,
            Self::Logging => settings.logging_enabled,
        }
    }
}

impl fmt::Display for ModerationCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Modmail => f.write_str("modmail"),
            Self::Logging => f.write_str("logging"),
        }
    }
}

/// Finds the settings row for a guild, returning None if the guild was never configured.
pub async fn get_guild_settings(
    db: &DatabaseConnection,
    guild_id: &str,
) -> Result<Option<guild_settings::Model>> {
    GuildSettings::find_by_id(guild_id.to_string())
        .one(db)
        .await
        .map_err(Into::into)
}

/// Returns the settings row for a guild, inserting a default row if none exists.
///
/// New rows start with every feature disabled and an empty block list.
pub async fn get_or_create_guild_settings(
    db: &DatabaseConnection,
    guild_id: &str,
) -> Result<guild_settings::Model> {
    if guild_id.trim().is_empty() {
        return Err(Error::Config {
            message: "Guild id cannot be empty".to_string(),
        });
    }

    if let Some(existing) = get_guild_settings(db, guild_id).await? {
        return Ok(existing);
    }

    let settings = guild_settings::ActiveModel {
        guild_id: Set(guild_id.to_string()),
        modmail_enabled: Set(false),
        modmail_category_id: Set(None),
        logging_enabled: Set(false),
        log_channel_id: Set(None),
        blocked_users: Set("[]".to_string()),
        updated_at: Set(chrono::Utc::now().naive_utc()),
    };

    settings.insert(db).await.map_err(Into::into)
}

/// Lists every guild with modmail switched on, ordered by guild id.
pub async fn get_modmail_enabled_guilds(
    db: &DatabaseConnection,
) -> Result<Vec<guild_settings::Model>> {
    GuildSettings::find()
        .filter(guild_settings::Column::ModmailEnabled.eq(true))
        .order_by_asc(guild_settings::Column::GuildId)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Applies `edit` to the guild's row (created on demand) and saves it.
async fn update_guild_settings<F>(
    db: &DatabaseConnection,
    guild_id: &str,
    edit: F,
) -> Result<guild_settings::Model>
where
    F: FnOnce(&mut guild_settings::ActiveModel),
{
    let settings = get_or_create_guild_settings(db, guild_id).await?;
    let mut active: guild_settings::ActiveModel = settings.into();

    edit(&mut active);
    active.updated_at = Set(chrono::Utc::now().naive_utc());

    active.update(db).await.map_err(Into::into)
}

/// Switches a moderation category on or off.
pub async fn set_category_enabled(
    db: &DatabaseConnection,
    guild_id: &str,
    category: ModerationCategory,
    enabled: bool,
) -> Result<guild_settings::Model> {
    update_guild_settings(db, guild_id, |active| match category {
        ModerationCategory::Modmail => active.modmail_enabled = Set(enabled),
        ModerationCategory::Logging => active.logging_enabled = Set(enabled),
    })
    .await
}

/// Sets (or clears) the category channel modmail threads are created under.
pub async fn set_modmail_category(
    db: &DatabaseConnection,
    guild_id: &str,
    category_id: Option<String>,
) -> Result<guild_settings::Model> {
    update_guild_settings(db, guild_id, |active| {
        active.modmail_category_id = Set(category_id);
    })
    .await
}

/// Sets (or clears) the log channel. Setting a channel also enables logging.
pub async fn set_log_channel(
    db: &DatabaseConnection,
    guild_id: &str,
    channel_id: Option<String>,
) -> Result<guild_settings::Model> {
    update_guild_settings(db, guild_id, |active| {
        active.logging_enabled = Set(channel_id.is_some());
        active.log_channel_id = Set(channel_id);
    })
    .await
}

/// Decodes the JSON block list stored on a settings row.
pub fn decode_blocked_users(settings: &guild_settings::Model) -> Result<Vec<String>> {
    if settings.blocked_users.trim().is_empty() {
        return Ok(Vec::new());
    }

    serde_json::from_str(&settings.blocked_users).map_err(Into::into)
}

/// Adds a user to the guild's modmail block list.
///
/// Returns false if the user was already blocked.
pub async fn block_user(db: &DatabaseConnection, guild_id: &str, user_id: &str) -> Result<bool> {
    let settings = get_or_create_guild_settings(db, guild_id).await?;
    let mut blocked = decode_blocked_users(&settings)?;

    if blocked.iter().any(|id| id == user_id) {
        return Ok(false);
    }

    blocked.push(user_id.to_string());
    let encoded = serde_json::to_string(&blocked)?;

    update_guild_settings(db, guild_id, |active| active.blocked_users = Set(encoded)).await?;
    Ok(true)
}

/// Removes a user from the guild's modmail block list.
///
/// Returns false if the user was not blocked.
pub async fn unblock_user(db: &DatabaseConnection, guild_id: &str, user_id: &str) -> Result<bool> {
    let settings = get_or_create_guild_settings(db, guild_id).await?;
    let mut blocked = decode_blocked_users(&settings)?;
    let before = blocked.len();

    blocked.retain(|id| id != user_id);
    if blocked.len() == before {
        return Ok(false);
    }

    let encoded = serde_json::to_string(&blocked)?;

    update_guild_settings(db, guild_id, |active| active.blocked_users = Set(encoded)).await?;
    Ok(true)
}

#[async_trait]
impl SettingsStore for DatabaseConnection {
    async fn modmail_guilds(&self) -> Result<Vec<ModmailGuild>> {
        get_modmail_enabled_guilds(self)
            .await?
            .iter()
            .map(ModmailGuild::try_from)
            .collect()
    }

    async fn modmail_guild(&self, guild_id: GuildId) -> Result<Option<ModmailGuild>> {
        match get_guild_settings(self, &guild_id.to_string()).await? {
            Some(settings) if settings.modmail_enabled => {
                ModmailGuild::try_from(&settings).map(Some)
            }
            _ => Ok(None),
        }
    }

    async fn save_category(&self, guild_id: GuildId, category_id: ChannelId) -> Result<()> {
        set_modmail_category(self, &guild_id.to_string(), Some(category_id.to_string())).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::setup_test_db;

    #[tokio::test]
    async fn test_get_or_create_inserts_defaults_once() -> Result<()> {
        let db = setup_test_db().await?;

        let created = get_or_create_guild_settings(&db, "100").await?;
        assert!(!created.modmail_enabled);
        assert!(!created.logging_enabled);
        assert_eq!(created.blocked_users, "[]");

        let again = get_or_create_guild_settings(&db, "100").await?;
        assert_eq!(created.guild_id, again.guild_id);
        assert_eq!(GuildSettings::find().count(&db).await?, 1);

        Ok(())
    }

    #[tokio::test]
    async fn test_empty_guild_id_rejected() -> Result<()> {
        let db = setup_test_db().await?;

        let result = get_or_create_guild_settings(&db, "  ").await;
        assert!(matches!(result, Err(Error::Config { .. })));

        Ok(())
    }

    #[tokio::test]
    async fn test_modmail_enabled_guilds_filter() -> Result<()> {
        let db = setup_test_db().await?;

        set_category_enabled(&db, "1", ModerationCategory::Modmail, true).await?;
        set_category_enabled(&db, "2", ModerationCategory::Logging, true).await?;
        set_category_enabled(&db, "3", ModerationCategory::Modmail, true).await?;
        set_category_enabled(&db, "3", ModerationCategory::Modmail, false).await?;

        let enabled = get_modmail_enabled_guilds(&db).await?;
        let ids: Vec<_> = enabled.iter().map(|s| s.guild_id.as_str()).collect();
        assert_eq!(ids, vec!["1"]);

        Ok(())
    }

    #[tokio::test]
    async fn test_log_channel_toggles_logging() -> Result<()> {
        let db = setup_test_db().await?;

        let settings = set_log_channel(&db, "1", Some("55".to_string())).await?;
        assert!(settings.logging_enabled);
        assert_eq!(settings.log_channel_id.as_deref(), Some("55"));

        let settings = set_log_channel(&db, "1", None).await?;
        assert!(!settings.logging_enabled);
        assert!(settings.log_channel_id.is_none());

        Ok(())
    }

    #[tokio::test]
    async fn test_block_and_unblock_user() -> Result<()> {
        let db = setup_test_db().await?;

        assert!(block_user(&db, "1", "42").await?);
        assert!(!block_user(&db, "1", "42").await?);
        assert!(block_user(&db, "1", "43").await?);

        let settings = get_or_create_guild_settings(&db, "1").await?;
        assert_eq!(decode_blocked_users(&settings)?, vec!["42", "43"]);

        assert!(unblock_user(&db, "1", "42").await?);
        assert!(!unblock_user(&db, "1", "42").await?);

        let settings = get_or_create_guild_settings(&db, "1").await?;
        assert_eq!(decode_blocked_users(&settings)?, vec!["43"]);

        Ok(())
    }

    #[tokio::test]
    async fn test_settings_store_skips_disabled_guilds() -> Result<()> {
        let db = setup_test_db().await?;

        set_category_enabled(&db, "10", ModerationCategory::Modmail, true).await?;
        set_modmail_category(&db, "10", Some("77".to_string())).await?;
        block_user(&db, "10", "5").await?;
        get_or_create_guild_settings(&db, "11").await?;

        let guilds = db.modmail_guilds().await?;
        assert_eq!(guilds.len(), 1);
        assert_eq!(guilds[0].guild_id, GuildId::new(10));
        assert_eq!(guilds[0].category_id, Some(ChannelId::new(77)));
        assert!(guilds[0].is_blocked(poise::serenity_prelude::UserId::new(5)));

        assert!(db.modmail_guild(GuildId::new(11)).await?.is_none());

        db.save_category(GuildId::new(10), ChannelId::new(78)).await?;
        let guild = db.modmail_guild(GuildId::new(10)).await?;
        assert_eq!(guild.and_then(|g| g.category_id), Some(ChannelId::new(78)));

        Ok(())
    }
}
