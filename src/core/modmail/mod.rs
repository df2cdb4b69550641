//! Modmail - relays direct messages into per-user staff channels.
//!
//! The [`ModmailService`] owns all modmail state: the thread registry, pending server
//! selections and the per-user locks that serialise work for one user. It talks to the
//! platform only through a [`MailGateway`] and reads guild configuration only through a
//! [`SettingsStore`], so the whole lifecycle can run against test doubles.

pub mod gateway;
pub mod registry;
pub mod relay;
pub mod resolve;
mod service;

pub use gateway::{GuildChoice, MailGateway};
pub use registry::{IdleStage, ThreadSnapshot, ThreadStatus, WarningFlags};
pub use relay::{CloseReason, InboundMail, MailAttachment, MailPost, PostKind, StaffReply};
pub use resolve::{ModmailGuild, SettingsStore};
pub use service::{MailOutcome, ModmailService};

use std::time::Duration;

/// Timings and naming used by the modmail lifecycle.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ModmailConfig {
    /// Name of the category created when a guild has none configured
    pub category_name: String,
    /// Idle time before the first warning
    pub warning_after: Duration,
    /// Idle time before the final warning
    pub final_warning_after: Duration,
    /// Idle time before the thread is closed
    pub close_after: Duration,
    /// How long a closed channel stays before deletion
    pub delete_grace: Duration,
    /// How long a server selection prompt stays answerable
    pub selection_timeout: Duration,
}

impl Default for ModmailConfig {
    fn default() -> Self {
        Self {
            category_name: "Modmail".to_string(),
            warning_after: Duration::from_secs(30),
            final_warning_after: Duration::from_secs(50),
            close_after: Duration::from_secs(60),
            delete_grace: Duration::from_secs(10),
            selection_timeout: Duration::from_secs(300),
        }
    }
}
