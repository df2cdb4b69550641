//! Bot layer - Discord-specific interface and command handlers
//!
//! This module wires the modmail core to Discord: slash commands for guild
//! configuration, the event handler feeding DMs and staff replies into the
//! [`ModmailService`], and the serenity-backed gateway the service talks through.

/// Discord command implementations (modmail, logging, moderation, general)
pub mod commands;
/// Serenity implementation of the modmail gateway
pub mod gateway;
/// Discord event handlers (direct messages, staff replies, component interactions)
pub mod handlers;

use crate::{
    core::modmail::{ModmailConfig, ModmailService},
    errors::{Error, Result},
};
use gateway::SerenityGateway;
use poise::serenity_prelude as serenity;
use sea_orm::DatabaseConnection;
use std::sync::Arc;
use tracing::{error, info, instrument};

/// Modmail service as run by the bot.
pub type BotModmail = ModmailService<SerenityGateway, DatabaseConnection>;

/// Shared data available to all bot commands and event handlers.
pub struct BotData {
    /// Database connection for guild settings
    pub database: DatabaseConnection,
    /// Modmail state and lifecycle
    pub modmail: BotModmail,
}

impl BotData {
    /// Creates a new `BotData`, building the modmail service on top of the client's
    /// HTTP handle and cache.
    #[must_use]
    pub fn new(
        database: DatabaseConnection,
        http: Arc<serenity::Http>,
        cache: Arc<serenity::Cache>,
        config: ModmailConfig,
    ) -> Self {
        let gateway = SerenityGateway::new(http, cache);
        let modmail = ModmailService::new(gateway, database.clone(), config);

        Self { database, modmail }
    }
}

pub use commands::*;
pub use handlers::*;

async fn on_error(error: poise::FrameworkError<'_, BotData, Error>) {
    match error {
        poise::FrameworkError::Setup { error, .. } => {
            error!("Failed to start bot: {error}");
        }
        poise::FrameworkError::Command { error, ctx, .. } => {
            error!("Error in command `{}`: {error}", ctx.command().qualified_name);
            let reply = poise::CreateReply::default()
                .content(format!("❌ {error}"))
                .ephemeral(true);
            if let Err(e) = ctx.send(reply).await {
                error!("Failed to send error message: {e}");
            }
        }
        poise::FrameworkError::EventHandler { error, event, .. } => {
            error!("Error handling event {}: {error}", event.snake_case_name());
        }
        error => {
            if let Err(e) = poise::builtins::on_error(error).await {
                error!("Error while handling error: {e}");
            }
        }
    }
}

/// Every slash command the bot registers.
#[must_use]
pub fn all_commands() -> Vec<poise::Command<BotData, Error>> {
    vec![
        commands::modmail(),
        commands::logging(),
        commands::moderation(),
        commands::ping(),
        commands::help(),
    ]
}

/// Connects to Discord and runs until the client stops.
#[instrument(skip_all)]
pub async fn run_bot(
    token: String,
    config: ModmailConfig,
    database: DatabaseConnection,
) -> Result<()> {
    let framework = poise::Framework::builder()
        .options(poise::FrameworkOptions {
            commands: all_commands(),
            on_error: |error| Box::pin(on_error(error)),
            event_handler: |ctx, event, framework, data| {
                Box::pin(handlers::event_handler(ctx, event, framework, data))
            },
            ..Default::default()
        })
        .setup(move |ctx, ready, framework| {
            Box::pin(async move {
                info!("Logged in as {}", ready.user.name);
                info!("Registering commands globally...");
                poise::builtins::register_globally(ctx, &framework.options().commands).await?;

                Ok(BotData::new(
                    database,
                    Arc::clone(&ctx.http),
                    Arc::clone(&ctx.cache),
                    config,
                ))
            })
        })
        .build();

    let intents = serenity::GatewayIntents::GUILDS
        | serenity::GatewayIntents::GUILD_MEMBERS
        | serenity::GatewayIntents::GUILD_MESSAGES
        | serenity::GatewayIntents::DIRECT_MESSAGES
        | serenity::GatewayIntents::MESSAGE_CONTENT;

    info!("Setting up Serenity client...");
    let mut client = serenity::ClientBuilder::new(token, intents)
        .framework(framework)
        .await
        .inspect_err(|e| error!("Error creating client: {e}"))?;

    info!("Starting bot client...");
    client
        .start()
        .await
        .inspect_err(|e| error!("Client error: {e}"))?;

    Ok(())
}
