//! Gateway event dispatch.
//!
//! Direct messages feed the modmail service, messages in thread channels are staff
//! replies, and the server selection menu answers a pending prompt.

use crate::{
    bot::{BotData, gateway::GUILD_SELECT_ID},
    core::modmail::{InboundMail, MailAttachment, StaffReply},
    errors::{Error, Result},
};
use chrono::DateTime;
use poise::serenity_prelude::{
    self as serenity, ComponentInteraction, ComponentInteractionDataKind,
    CreateInteractionResponse, CreateInteractionResponseMessage, GuildId, Message, User,
};
use tracing::{debug, warn};

/// Entry point registered as poise's `event_handler`.
pub async fn event_handler(
    ctx: &serenity::Context,
    event: &serenity::FullEvent,
    _framework: poise::FrameworkContext<'_, BotData, Error>,
    data: &BotData,
) -> Result<()> {
    match event {
        serenity::FullEvent::Message { new_message } => on_message(data, new_message).await,
        serenity::FullEvent::InteractionCreate {
            interaction: serenity::Interaction::Component(component),
        } if component.data.custom_id == GUILD_SELECT_ID => {
            on_guild_selected(ctx, data, component).await
        }
        _ => Ok(()),
    }
}

fn display_name(user: &User) -> String {
    user.global_name.clone().unwrap_or_else(|| user.name.clone())
}

fn attachments(message: &Message) -> Vec<MailAttachment> {
    message
        .attachments
        .iter()
        .map(|attachment| MailAttachment {
            filename: attachment.filename.clone(),
            url: attachment.url.clone(),
        })
        .collect()
}

/// Reduces a DM to what the modmail core needs.
#[must_use]
pub fn inbound_mail(message: &Message) -> InboundMail {
    let created = message.author.id.created_at().unix_timestamp();

    InboundMail {
        user_id: message.author.id,
        dm_channel_id: message.channel_id,
        message_id: message.id,
        display_name: display_name(&message.author),
        username: message.author.name.clone(),
        account_created: DateTime::from_timestamp(created, 0).unwrap_or_default(),
        content: message.content.clone(),
        attachments: attachments(message),
    }
}

async fn on_message(data: &BotData, message: &Message) -> Result<()> {
    if message.author.bot {
        return Ok(());
    }

    if message.guild_id.is_none() {
        let outcome = data.modmail.handle_direct_message(inbound_mail(message)).await;
        debug!(user_id = %message.author.id, ?outcome, "Handled direct message");
        return Ok(());
    }

    if data.modmail.thread_for_channel(message.channel_id).is_none() {
        return Ok(());
    }

    let reply = StaffReply {
        channel_id: message.channel_id,
        message_id: message.id,
        author_name: display_name(&message.author),
        content: message.content.clone(),
        attachments: attachments(message),
    };
    data.modmail.handle_staff_reply(reply).await;

    Ok(())
}

fn selected_guild(component: &ComponentInteraction) -> Option<GuildId> {
    let ComponentInteractionDataKind::StringSelect { values } = &component.data.kind else {
        return None;
    };

    values
        .first()?
        .parse::<u64>()
        .ok()
        .filter(|id| *id != 0)
        .map(GuildId::new)
}

async fn on_guild_selected(
    ctx: &serenity::Context,
    data: &BotData,
    component: &ComponentInteraction,
) -> Result<()> {
    // Drop the menu so the prompt cannot be answered twice.
    let response = CreateInteractionResponse::UpdateMessage(
        CreateInteractionResponseMessage::new().components(Vec::new()),
    );
    if let Err(e) = component.create_response(ctx, response).await {
        warn!(user_id = %component.user.id, "Failed to acknowledge server selection: {e}");
    }

    let Some(guild_id) = selected_guild(component) else {
        warn!(user_id = %component.user.id, "Server selection carried no usable guild id");
        return Ok(());
    };

    let outcome = data
        .modmail
        .handle_guild_selection(component.user.id, guild_id)
        .await;
    debug!(user_id = %component.user.id, %guild_id, ?outcome, "Handled server selection");

    Ok(())
}
