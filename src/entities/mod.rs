//! Entity module - Contains all SeaORM entity definitions for the database.
//! Each entity has a Model struct for data and an Entity struct for operations.

pub mod guild_settings;

pub use guild_settings::{
    Column as GuildSettingsColumn, Entity as GuildSettings, Model as GuildSettingsModel,
};
