//! Guild settings entity - Per-guild configuration for the bot's features.
//!
//! One row per guild, keyed by the Discord guild id. Collection-valued settings are
//! stored as JSON-encoded text columns and decoded in `core::settings`.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Guild settings database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "guild_settings")]
pub struct Model {
    /// Discord guild id
    #[sea_orm(primary_key, auto_increment = false)]
    pub guild_id: String,
    /// Whether members may open modmail threads by messaging the bot
    pub modmail_enabled: bool,
    /// Category channel that modmail threads are created under
    pub modmail_category_id: Option<String>,
    /// Whether lifecycle events are posted to the log channel
    pub logging_enabled: bool,
    /// Channel receiving log posts
    pub log_channel_id: Option<String>,
    /// JSON array of user ids that may not open modmail threads in this guild
    pub blocked_users: String,
    /// When this row was last modified
    pub updated_at: DateTime,
}

/// `GuildSettings` has no relationships with other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
