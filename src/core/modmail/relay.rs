//! Relay formatting - turns modmail traffic into uniform posts.
//!
//! Everything here is pure: the gateway decides how a [`MailPost`] is rendered on the
//! platform (an embed, in the serenity gateway), this module only decides what it says.

use super::registry::IdleStage;
use chrono::{DateTime, Utc};
use poise::serenity_prelude::{ChannelId, MessageId, UserId};
use std::fmt::Write;
use std::time::Duration;

/// Maximum length Discord accepts for a channel name.
const MAX_CHANNEL_NAME_LEN: usize = 90;

/// Maximum length Discord accepts for an embed description.
pub const MAX_PAGE_LEN: usize = 4096;

/// Emoji used to acknowledge relayed messages.
pub const ACK_REACTION: char = '✅';

/// A file attached to a relayed message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MailAttachment {
    /// Original file name
    pub filename: String,
    /// CDN link to the file
    pub url: String,
}

/// A direct message sent to the bot, reduced to what modmail needs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InboundMail {
    /// Sender
    pub user_id: UserId,
    /// DM channel the message arrived in
    pub dm_channel_id: ChannelId,
    /// The message itself, for acknowledgement reactions
    pub message_id: MessageId,
    /// Sender's display name (global name, falling back to the username)
    pub display_name: String,
    /// Sender's unique username
    pub username: String,
    /// When the sender's account was created
    pub account_created: DateTime<Utc>,
    /// Text content, possibly empty
    pub content: String,
    /// Attached files
    pub attachments: Vec<MailAttachment>,
}

/// A staff message written inside a thread channel.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StaffReply {
    /// Thread channel the reply was written in
    pub channel_id: ChannelId,
    /// The reply message, for acknowledgement reactions
    pub message_id: MessageId,
    /// Staff member's display name
    pub author_name: String,
    /// Text content, possibly empty
    pub content: String,
    /// Attached files
    pub attachments: Vec<MailAttachment>,
}

/// Why a thread was closed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CloseReason {
    /// The idle timeout ran out
    Idle,
    /// A staff member closed it
    Staff {
        /// Who closed it
        closed_by: String,
    },
    /// The user was blocked from modmail in this guild
    Blocked,
}

/// What a post is for; the gateway picks colors from this.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PostKind {
    /// Thread header with the user's details
    Header,
    /// A user's message relayed into the thread
    Inbound,
    /// A staff reply relayed to the user
    StaffReply,
    /// Informational message
    Notice,
    /// Idle warning (either stage)
    Warning,
    /// Thread closed
    Closure,
    /// Something went wrong
    Failure,
}

/// Platform-neutral message content.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MailPost {
    /// Purpose of the post
    pub kind: PostKind,
    /// Short heading
    pub title: String,
    /// Main text
    pub body: String,
    /// Display name of whoever wrote the relayed content
    pub author: Option<String>,
    /// Attachment links to list under the body
    pub attachments: Vec<MailAttachment>,
    /// Small print
    pub footer: Option<String>,
}

impl MailPost {
    /// Creates a post with no author, attachments or footer.
    #[must_use]
    pub fn new(kind: PostKind, title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            kind,
            title: title.into(),
            body: body.into(),
            author: None,
            attachments: Vec::new(),
            footer: None,
        }
    }

    /// Sets the author line.
    #[must_use]
    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = Some(author.into());
        self
    }

    /// Sets the footer line.
    #[must_use]
    pub fn with_footer(mut self, footer: impl Into<String>) -> Self {
        self.footer = Some(footer.into());
        self
    }

    /// Attaches file links.
    #[must_use]
    pub fn with_attachments(mut self, attachments: Vec<MailAttachment>) -> Self {
        self.attachments = attachments;
        self
    }

    /// Embed color for this post's kind.
    #[must_use]
    pub const fn color(&self) -> u32 {
        match self.kind {
            PostKind::Header => 0x0034_98DB,
            PostKind::Inbound => 0x0095_A5A6,
            PostKind::StaffReply => 0x002E_CC71,
            PostKind::Notice => 0x0000_BCD4,
            PostKind::Warning => 0x00F1_C40F,
            PostKind::Closure => 0x0099_AAB5,
            PostKind::Failure => 0x00E7_4C3C,
        }
    }

    /// The body with the attachment list appended, as shown on the platform.
    #[must_use]
    pub fn rendered_body(&self) -> String {
        let mut text = self.body.clone();

        if !self.attachments.is_empty() {
            if !text.is_empty() {
                text.push_str("\n\n");
            }
            text.push_str("**Attachments:**");
            for attachment in &self.attachments {
                let _ = write!(text, "\n[{}]({})", attachment.filename, attachment.url);
            }
        }

        text
    }

    /// The rendered body split into pages of at most [`MAX_PAGE_LEN`] characters.
    ///
    /// Pages break on line boundaries where possible; joining them gives back
    /// [`Self::rendered_body`] unchanged. There is always at least one page.
    #[must_use]
    pub fn rendered_pages(&self) -> Vec<String> {
        split_pages(&self.rendered_body(), MAX_PAGE_LEN)
    }
}

fn split_pages(text: &str, limit: usize) -> Vec<String> {
    let mut pages = Vec::new();
    let mut page = String::new();
    let mut page_len = 0;

    for line in text.split_inclusive('\n') {
        let line_len = line.chars().count();
        if page_len + line_len > limit && page_len > 0 {
            pages.push(std::mem::take(&mut page));
            page_len = 0;
        }

        if line_len <= limit {
            page.push_str(line);
            page_len += line_len;
            continue;
        }

        // A single line longer than a page is cut mid-line.
        for c in line.chars() {
            if page_len == limit {
                pages.push(std::mem::take(&mut page));
                page_len = 0;
            }
            page.push(c);
            page_len += 1;
        }
    }

    if page_len > 0 || pages.is_empty() {
        pages.push(page);
    }
    pages
}

/// Builds a channel name from a display name.
///
/// Lowercases, replaces anything that is not an ASCII letter, digit, `-` or `_` with a
/// dash, collapses repeated dashes and trims them from the ends. Names that end up empty
/// fall back to `user-<id>`.
#[must_use]
pub fn thread_channel_name(display_name: &str, user_id: UserId) -> String {
    let mut name = String::with_capacity(display_name.len());

    for c in display_name.chars().flat_map(char::to_lowercase) {
        let c = if c.is_ascii_alphanumeric() || c == '_' { c } else { '-' };
        if c == '-' && (name.is_empty() || name.ends_with('-')) {
            continue;
        }
        name.push(c);
    }

    name.truncate(MAX_CHANNEL_NAME_LEN);
    let name = name.trim_matches('-');

    if name.is_empty() {
        format!("user-{user_id}")
    } else {
        name.to_string()
    }
}

/// Formats a duration as e.g. `1h 2m 3s`, omitting leading zero units.
#[must_use]
pub fn format_duration(duration: Duration) -> String {
    let total = duration.as_secs();
    let (hours, minutes, seconds) = (total / 3600, (total % 3600) / 60, total % 60);

    match (hours, minutes) {
        (0, 0) => format!("{seconds}s"),
        (0, _) => format!("{minutes}m {seconds}s"),
        _ => format!("{hours}h {minutes}m {seconds}s"),
    }
}

/// Topic set on a newly created thread channel.
#[must_use]
pub fn channel_topic(mail: &InboundMail) -> String {
    format!("Modmail thread for {} ({})", mail.username, mail.user_id)
}

/// Header posted first in a new thread.
#[must_use]
pub fn header_post(mail: &InboundMail) -> MailPost {
    let created = mail.account_created.timestamp();
    let body = format!(
        "**User:** <@{id}> (`{username}`)\n**User ID:** {id}\n**Account created:** <t:{created}:F> (<t:{created}:R>)",
        id = mail.user_id,
        username = mail.username,
    );

    MailPost::new(PostKind::Header, "New modmail thread", body)
        .with_footer("Messages sent in this channel are relayed to the user.")
}

/// A user's message as relayed into their thread.
#[must_use]
pub fn inbound_post(mail: &InboundMail) -> MailPost {
    let body = if mail.content.trim().is_empty() && mail.attachments.is_empty() {
        "*no text content*".to_string()
    } else {
        mail.content.clone()
    };

    MailPost::new(PostKind::Inbound, "Message received", body)
        .with_author(mail.display_name.clone())
        .with_attachments(mail.attachments.clone())
        .with_footer(format!("User ID: {}", mail.user_id))
}

/// A staff reply as delivered to the user.
#[must_use]
pub fn staff_reply_post(reply: &StaffReply, guild_name: &str) -> MailPost {
    MailPost::new(PostKind::StaffReply, format!("Reply from {guild_name}"), reply.content.clone())
        .with_author(reply.author_name.clone())
        .with_attachments(reply.attachments.clone())
}

/// Idle warning posted in the thread and sent to the user.
#[must_use]
pub fn warning_post(stage: IdleStage, closes_in: Duration) -> MailPost {
    let remaining = format_duration(closes_in);

    match stage {
        IdleStage::FinalWarning => MailPost::new(
            PostKind::Warning,
            "Final warning",
            format!("This thread will be closed in **{remaining}**. Send a message now to keep it open."),
        ),
        _ => MailPost::new(
            PostKind::Warning,
            "Thread inactive",
            format!(
                "This thread has been inactive for a while and will be closed in **{remaining}** unless a new message is sent."
            ),
        ),
    }
}

/// Closure notice posted in the thread before it is deleted.
#[must_use]
pub fn closure_post(reason: &CloseReason, open_for: Duration, delete_in: Duration) -> MailPost {
    let cause = match reason {
        CloseReason::Idle => "Closed after inactivity.".to_string(),
        CloseReason::Staff { closed_by } => format!("Closed by {closed_by}."),
        CloseReason::Blocked => "Closed because the user was blocked from modmail.".to_string(),
    };

    MailPost::new(
        PostKind::Closure,
        "Thread closed",
        format!(
            "{cause}\n**Thread duration:** {}\nThis channel will be deleted in {}.",
            format_duration(open_for),
            format_duration(delete_in)
        ),
    )
}

/// Closure notice sent to the user.
#[must_use]
pub fn closure_dm(reason: &CloseReason, guild_name: &str) -> MailPost {
    let body = match reason {
        CloseReason::Idle => "Your conversation was closed due to inactivity. Send a new message any time to start another one.",
        CloseReason::Staff { .. } => "Staff have closed your conversation. Send a new message any time to start another one.",
        CloseReason::Blocked => "Your conversation was closed and you can no longer open new ones with this server.",
    };

    MailPost::new(PostKind::Closure, format!("Conversation with {guild_name} closed"), body)
}

/// Acknowledgement sent to the user when a thread opens.
#[must_use]
pub fn opened_ack_post(guild_name: &str) -> MailPost {
    MailPost::new(
        PostKind::Notice,
        "Message sent",
        format!("Your message has been forwarded to the staff of **{guild_name}**. They will reply here."),
    )
}

/// Reply for users who share no modmail-enabled server with the bot.
#[must_use]
pub fn no_eligible_guild_post() -> MailPost {
    MailPost::new(
        PostKind::Failure,
        "Modmail unavailable",
        "You are not in any server that has modmail enabled, so your message could not be delivered.",
    )
}

/// Prompt asking the user which server to contact.
#[must_use]
pub fn selection_prompt_post(choice_count: usize, timeout: Duration) -> MailPost {
    MailPost::new(
        PostKind::Notice,
        "Choose a server",
        format!(
            "You share {choice_count} servers with modmail enabled. Pick the one your message is for within {}.",
            format_duration(timeout)
        ),
    )
}

/// Reminder sent when the user writes again before choosing a server.
#[must_use]
pub fn selection_reminder_post(queued: usize) -> MailPost {
    MailPost::new(
        PostKind::Notice,
        "Still waiting for your choice",
        format!("{queued} messages are queued. They will be delivered once you pick a server below."),
    )
}

/// Reply to a server choice that arrives after the prompt expired.
#[must_use]
pub fn selection_expired_post() -> MailPost {
    MailPost::new(
        PostKind::Failure,
        "Selection expired",
        "This server selection is no longer active. Please send your message again.",
    )
}

/// Generic failure reply.
#[must_use]
pub fn failure_post() -> MailPost {
    MailPost::new(
        PostKind::Failure,
        "Something went wrong",
        "Your message could not be delivered. Please try again later.",
    )
}

/// Posted in the thread when a staff reply cannot be delivered.
#[must_use]
pub fn undeliverable_post() -> MailPost {
    MailPost::new(
        PostKind::Failure,
        "Reply not delivered",
        "The user could not be messaged. They may have left the server or closed their DMs.",
    )
}

/// Log channel entry for a newly opened thread.
#[must_use]
pub fn log_opened_post(user_id: UserId, channel_id: ChannelId) -> MailPost {
    MailPost::new(
        PostKind::Notice,
        "Modmail thread opened",
        format!("<@{user_id}> opened <#{channel_id}>."),
    )
}

/// Log channel entry for a closed thread.
#[must_use]
pub fn log_closed_post(user_id: UserId, reason: &CloseReason, open_for: Duration) -> MailPost {
    let cause = match reason {
        CloseReason::Idle => "inactivity".to_string(),
        CloseReason::Staff { closed_by } => format!("staff ({closed_by})"),
        CloseReason::Blocked => "block".to_string(),
    };

    MailPost::new(
        PostKind::Closure,
        "Modmail thread closed",
        format!(
            "Thread with <@{user_id}> closed by {cause} after {}.",
            format_duration(open_for)
        ),
    )
}
