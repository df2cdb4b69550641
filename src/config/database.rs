//! Database configuration module for Court Herald.
//!
//! This module handles `SQLite` database connection and table creation using `SeaORM`.
//! Tables are generated from the entity definitions with `Schema::create_table_from_entity`,
//! so the schema always matches the Rust structs without hand-written SQL.

use crate::entities::GuildSettings;
use crate::errors::{Error, Result};
use sea_orm::{ConnectionTrait, Database, DatabaseConnection, Schema};
use std::path::Path;
use tracing::info;

/// Default database location used when `DATABASE_URL` is not set.
pub const DEFAULT_DATABASE_URL: &str = "sqlite://data/court_herald.sqlite?mode=rwc";

/// Gets the database URL from the environment or returns the default `SQLite` path.
#[must_use]
pub fn get_database_url() -> String {
    std::env::var("DATABASE_URL").unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_string())
}

/// Directory that must exist before `SQLite` can create the file at `url`.
fn sqlite_parent_dir(url: &str) -> Option<&Path> {
    let path = url.strip_prefix("sqlite://")?;
    let path = path.split('?').next()?;
    if path.is_empty() || path.starts_with(':') {
        return None;
    }

    Path::new(path).parent().filter(|dir| !dir.as_os_str().is_empty())
}

/// Establishes a connection to the database named by [`get_database_url`], creating
/// the database directory first when needed.
pub async fn create_connection() -> Result<DatabaseConnection> {
    let url = get_database_url();

    if let Some(dir) = sqlite_parent_dir(&url) {
        std::fs::create_dir_all(dir).map_err(|e| Error::Config {
            message: format!("Cannot create database directory {}: {e}", dir.display()),
        })?;
    }

    info!("Connecting to database");
    Database::connect(&url).await.map_err(Into::into)
}

/// Creates all tables that do not exist yet, using `SeaORM`'s schema generation.
pub async fn create_tables(db: &DatabaseConnection) -> Result<()> {
    let builder = db.get_database_backend();
    let schema = Schema::new(builder);

    let mut guild_settings_table = schema.create_table_from_entity(GuildSettings);
    guild_settings_table.if_not_exists();

    db.execute(builder.build(&guild_settings_table)).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::GuildSettingsModel;
    use sea_orm::{EntityTrait, QuerySelect};

    #[tokio::test]
    async fn test_create_tables() -> Result<()> {
        let db = Database::connect("sqlite::memory:").await?;
        create_tables(&db).await?;

        let rows: Vec<GuildSettingsModel> = GuildSettings::find().limit(1).all(&db).await?;
        assert!(rows.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_create_tables_is_idempotent() -> Result<()> {
        let db = Database::connect("sqlite::memory:").await?;
        create_tables(&db).await?;
        create_tables(&db).await?;
        Ok(())
    }

    #[test]
    fn test_sqlite_parent_dir() {
        assert_eq!(
            sqlite_parent_dir(DEFAULT_DATABASE_URL),
            Some(Path::new("data"))
        );
        assert_eq!(sqlite_parent_dir("sqlite://herald.sqlite?mode=rwc"), None);
        assert_eq!(sqlite_parent_dir("sqlite::memory:"), None);
        assert_eq!(sqlite_parent_dir("postgres://localhost/herald"), None);
    }
}
