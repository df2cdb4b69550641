//! Thread lifecycle controller.
//!
//! All entry points take the user's lock first, so one user's messages, selections,
//! staff replies and idle timers never interleave. Registry and selection maps are
//! guarded by short synchronous locks that are never held across an await.

use super::{
    ModmailConfig,
    gateway::{GuildChoice, MAX_GUILD_CHOICES, MailGateway},
    registry::{IdleStage, ThreadRecord, ThreadRegistry, ThreadSnapshot, ThreadStatus, UserLocks},
    relay::{self, CloseReason, InboundMail, MailPost, StaffReply},
    resolve::{self, PendingSelections, SettingsStore},
};
use crate::errors::{Error, Result};
use poise::serenity_prelude::{ChannelId, GuildId, UserId};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::{Instant, sleep, sleep_until};
use tracing::{debug, error, info, instrument, warn};

/// What happened to an inbound message or selection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MailOutcome {
    /// A new thread was opened
    Opened {
        /// Guild the thread belongs to
        guild_id: GuildId,
        /// The new thread channel
        channel_id: ChannelId,
    },
    /// The message was relayed into the user's existing thread
    Relayed {
        /// The thread channel
        channel_id: ChannelId,
    },
    /// The user was asked to choose a guild
    AwaitingSelection {
        /// Number of guilds offered
        choices: usize,
    },
    /// The user shares no modmail-enabled guild with the bot
    NoEligibleGuild,
    /// A guild was chosen after the prompt expired
    SelectionExpired,
    /// A guild was chosen that was never offered
    InvalidSelection,
    /// Delivery failed; the user was told
    Failed,
}

enum IdleAction {
    Warn {
        channel_id: ChannelId,
        closes_in: Duration,
    },
    Close(ThreadRecord),
}

struct Shared<G, S> {
    gateway: G,
    store: S,
    config: ModmailConfig,
    threads: Mutex<ThreadRegistry>,
    pending: Mutex<PendingSelections>,
    locks: UserLocks,
}

/// Handle to the modmail state. Cloning is cheap and every clone sees the same state.
pub struct ModmailService<G, S> {
    shared: Arc<Shared<G, S>>,
}

impl<G, S> Clone for ModmailService<G, S> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<G: MailGateway, S: SettingsStore> ModmailService<G, S> {
    /// Creates a service with no open threads.
    #[must_use]
    pub fn new(gateway: G, store: S, config: ModmailConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                gateway,
                store,
                config,
                threads: Mutex::new(ThreadRegistry::new()),
                pending: Mutex::new(PendingSelections::default()),
                locks: UserLocks::default(),
            }),
        }
    }

    /// Timings in use.
    #[must_use]
    pub fn config(&self) -> &ModmailConfig {
        &self.shared.config
    }

    /// The platform gateway.
    #[must_use]
    pub fn gateway(&self) -> &G {
        &self.shared.gateway
    }

    /// The settings store.
    #[must_use]
    pub fn store(&self) -> &S {
        &self.shared.store
    }

    fn threads(&self) -> MutexGuard<'_, ThreadRegistry> {
        self.shared
            .threads
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn pending(&self) -> MutexGuard<'_, PendingSelections> {
        self.shared
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// The user's open thread.
    #[must_use]
    pub fn thread(&self, user_id: UserId) -> Option<ThreadSnapshot> {
        self.threads().get(user_id).map(ThreadRecord::snapshot)
    }

    /// The open thread living in `channel_id`.
    #[must_use]
    pub fn thread_for_channel(&self, channel_id: ChannelId) -> Option<ThreadSnapshot> {
        let threads = self.threads();
        threads
            .find_by_channel(channel_id)
            .and_then(|user_id| threads.get(user_id))
            .map(ThreadRecord::snapshot)
    }

    /// Number of open threads.
    #[must_use]
    pub fn open_thread_count(&self) -> usize {
        self.threads().len()
    }

    /// Whether the user has an unanswered server selection.
    #[must_use]
    pub fn has_pending_selection(&self, user_id: UserId) -> bool {
        self.pending().contains(user_id)
    }

    /// Handles a direct message sent to the bot.
    ///
    /// Relays into the user's open thread, queues behind a pending server selection,
    /// or resolves a guild and opens a new thread. Failures are reported to the user
    /// and logged, never returned.
    #[instrument(skip(self, mail), fields(user_id = %mail.user_id))]
    pub async fn handle_direct_message(&self, mail: InboundMail) -> MailOutcome {
        let guard = self.shared.locks.lock(mail.user_id).await;
        let outcome = self.route_direct_message(mail).await;
        drop(guard);

        self.shared.locks.prune();
        outcome
    }

    /// Handles the user's answer to a server selection prompt.
    #[instrument(skip(self))]
    pub async fn handle_guild_selection(&self, user_id: UserId, guild_id: GuildId) -> MailOutcome {
        let guard = self.shared.locks.lock(user_id).await;
        let outcome = self.apply_guild_selection(user_id, guild_id).await;
        drop(guard);

        self.shared.locks.prune();
        outcome
    }

    // Caller holds the user's lock.
    async fn route_direct_message(&self, mail: InboundMail) -> MailOutcome {
        let user_id = mail.user_id;

        let existing = self
            .threads()
            .get(user_id)
            .map(|record| (record.guild_id, record.channel_id));

        if let Some((guild_id, channel_id)) = existing {
            return match self.relay_into_thread(&mail, channel_id).await {
                Ok(()) => MailOutcome::Relayed { channel_id },
                Err(Error::ChannelMissing { .. }) => {
                    warn!(%guild_id, %channel_id, "Thread channel no longer exists, opening a new thread");
                    self.threads().remove(user_id);
                    self.open_thread(guild_id, vec![mail]).await
                }
                Err(e) => {
                    error!(%channel_id, "Failed to relay message into thread: {e}");
                    self.notify(user_id, &relay::failure_post()).await;
                    MailOutcome::Failed
                }
            };
        }

        if self.has_pending_selection(user_id) {
            return self.queue_for_selection(mail).await;
        }

        let eligible = match resolve::eligible_guilds(
            &self.shared.gateway,
            &self.shared.store,
            user_id,
        )
        .await
        {
            Ok(eligible) => eligible,
            Err(e) => {
                error!("Failed to resolve modmail guilds: {e}");
                self.notify(user_id, &relay::failure_post()).await;
                return MailOutcome::Failed;
            }
        };

        match eligible.len() {
            0 => {
                info!("User shares no modmail-enabled guild with the bot");
                self.notify(user_id, &relay::no_eligible_guild_post()).await;
                MailOutcome::NoEligibleGuild
            }
            1 => self.open_thread(eligible[0], vec![mail]).await,
            _ => self.begin_selection(mail, eligible).await,
        }
    }

    // Caller holds the user's lock.
    async fn apply_guild_selection(&self, user_id: UserId, guild_id: GuildId) -> MailOutcome {
        let offered = self.pending().get(user_id).map(|p| p.offers(guild_id));
        match offered {
            None => {
                info!("Server selection answered after it expired");
                self.notify(user_id, &relay::selection_expired_post()).await;
                return MailOutcome::SelectionExpired;
            }
            Some(false) => {
                warn!("Ignoring selection of a guild that was not offered");
                return MailOutcome::InvalidSelection;
            }
            Some(true) => {}
        }

        let Some(mut selection) = self.pending().take(user_id) else {
            return MailOutcome::SelectionExpired;
        };
        let messages = std::mem::take(&mut selection.messages);
        drop(selection);

        self.open_thread(guild_id, messages).await
    }

    /// Relays a staff message from a thread channel to the thread's user.
    ///
    /// Returns true if the channel belongs to an open thread and the DM was delivered.
    #[instrument(skip(self, reply), fields(channel_id = %reply.channel_id))]
    pub async fn handle_staff_reply(&self, reply: StaffReply) -> bool {
        let Some(user_id) = self.threads().find_by_channel(reply.channel_id) else {
            return false;
        };
        let _guard = self.shared.locks.lock(user_id).await;

        let guild_id = self
            .threads()
            .get(user_id)
            .filter(|record| record.channel_id == reply.channel_id)
            .map(|record| record.guild_id);
        let Some(guild_id) = guild_id else {
            return false;
        };

        let guild_name = self.guild_name(guild_id).await;
        let post = relay::staff_reply_post(&reply, &guild_name);

        match self.shared.gateway.send_dm(user_id, &post).await {
            Ok(()) => {
                self.record_activity(user_id);
                if let Err(e) = self
                    .shared
                    .gateway
                    .react(reply.channel_id, reply.message_id, relay::ACK_REACTION)
                    .await
                {
                    warn!("Failed to acknowledge staff reply: {e}");
                }
                true
            }
            Err(e) => {
                warn!(%user_id, "Failed to deliver staff reply: {e}");
                if let Err(e) = self
                    .shared
                    .gateway
                    .post(reply.channel_id, &relay::undeliverable_post())
                    .await
                {
                    warn!("Failed to report undelivered reply: {e}");
                }
                false
            }
        }
    }

    /// Closes the thread living in `channel_id` on behalf of a staff member.
    ///
    /// # Errors
    /// Returns `Error::ThreadNotFound` if no open thread uses the channel.
    #[instrument(skip(self))]
    pub async fn close_thread_in_channel(
        &self,
        channel_id: ChannelId,
        closed_by: String,
    ) -> Result<UserId> {
        let not_found = || Error::ThreadNotFound {
            channel_id: channel_id.get(),
        };

        let user_id = self.threads().find_by_channel(channel_id).ok_or_else(not_found)?;
        let _guard = self.shared.locks.lock(user_id).await;

        let record = {
            let mut threads = self.threads();
            match threads.get(user_id) {
                Some(record) if record.channel_id == channel_id => threads.remove(user_id),
                _ => None,
            }
        };
        let record = record.ok_or_else(not_found)?;

        self.finish_close(record, CloseReason::Staff { closed_by }).await;
        Ok(user_id)
    }

    /// Closes the user's thread in `guild_id`, if they have one there.
    pub async fn close_user_thread(
        &self,
        guild_id: GuildId,
        user_id: UserId,
        reason: CloseReason,
    ) -> bool {
        let _guard = self.shared.locks.lock(user_id).await;

        let record = {
            let mut threads = self.threads();
            match threads.get(user_id) {
                Some(record) if record.guild_id == guild_id => threads.remove(user_id),
                _ => None,
            }
        };

        match record {
            Some(record) => {
                self.finish_close(record, reason).await;
                true
            }
            None => false,
        }
    }

    async fn relay_into_thread(&self, mail: &InboundMail, channel_id: ChannelId) -> Result<()> {
        let gateway = &self.shared.gateway;

        if !gateway.channel_exists(channel_id).await? {
            return Err(Error::ChannelMissing {
                channel_id: channel_id.get(),
            });
        }

        gateway.post(channel_id, &relay::inbound_post(mail)).await?;
        self.record_activity(mail.user_id);

        if let Err(e) = gateway
            .react(mail.dm_channel_id, mail.message_id, relay::ACK_REACTION)
            .await
        {
            warn!("Failed to acknowledge relayed message: {e}");
        }

        Ok(())
    }

    async fn open_thread(&self, guild_id: GuildId, messages: Vec<InboundMail>) -> MailOutcome {
        let Some(user_id) = messages.first().map(|mail| mail.user_id) else {
            return MailOutcome::Failed;
        };

        match self.create_thread(guild_id, &messages).await {
            Ok(channel_id) => {
                let guild_name = self.guild_name(guild_id).await;
                self.notify(user_id, &relay::opened_ack_post(&guild_name)).await;
                self.log_event(guild_id, &relay::log_opened_post(user_id, channel_id))
                    .await;
                MailOutcome::Opened {
                    guild_id,
                    channel_id,
                }
            }
            Err(e) => {
                error!(%user_id, %guild_id, "Failed to open modmail thread: {e}");
                self.notify(user_id, &relay::failure_post()).await;
                MailOutcome::Failed
            }
        }
    }

    async fn create_thread(&self, guild_id: GuildId, messages: &[InboundMail]) -> Result<ChannelId> {
        let Shared {
            gateway,
            store,
            config,
            ..
        } = &*self.shared;
        let first = messages.first().ok_or_else(|| Error::Config {
            message: "Cannot open a thread without a message".to_string(),
        })?;

        let guild = store
            .modmail_guild(guild_id)
            .await?
            .ok_or(Error::ModmailDisabled {
                guild_id: guild_id.get(),
            })?;

        let category_id = gateway
            .ensure_category(guild_id, guild.category_id, &config.category_name)
            .await?;
        if guild.category_id != Some(category_id) {
            if let Err(e) = store.save_category(guild_id, category_id).await {
                warn!(%guild_id, %category_id, "Failed to remember modmail category: {e}");
            }
        }

        let name = relay::thread_channel_name(&first.display_name, first.user_id);
        let channel_id = gateway
            .create_thread_channel(guild_id, category_id, &name, &relay::channel_topic(first))
            .await?;

        if let Err(e) = self.post_opening(channel_id, messages).await {
            if let Err(cleanup) = gateway.delete_channel(channel_id).await {
                warn!(%channel_id, "Failed to delete half-opened thread channel: {cleanup}");
            }
            return Err(e);
        }

        let mut record = ThreadRecord::new(first.user_id, guild_id, channel_id, Instant::now());
        self.schedule_idle(&mut record);
        self.threads().insert(record)?;

        info!(user_id = %first.user_id, %guild_id, %channel_id, "Modmail thread opened");
        Ok(channel_id)
    }

    async fn post_opening(&self, channel_id: ChannelId, messages: &[InboundMail]) -> Result<()> {
        let gateway = &self.shared.gateway;

        if let Some(first) = messages.first() {
            gateway.post(channel_id, &relay::header_post(first)).await?;
        }
        for mail in messages {
            gateway.post(channel_id, &relay::inbound_post(mail)).await?;
        }

        Ok(())
    }

    async fn begin_selection(&self, mail: InboundMail, eligible: Vec<GuildId>) -> MailOutcome {
        let user_id = mail.user_id;
        let timeout = self.shared.config.selection_timeout;

        if eligible.len() > MAX_GUILD_CHOICES {
            warn!(
                eligible = eligible.len(),
                "More eligible guilds than a prompt can offer, offering the first {MAX_GUILD_CHOICES}"
            );
        }

        let mut choices = Vec::with_capacity(eligible.len().min(MAX_GUILD_CHOICES));
        for guild_id in eligible.into_iter().take(MAX_GUILD_CHOICES) {
            choices.push(GuildChoice {
                guild_id,
                name: self.guild_name(guild_id).await,
            });
        }

        let prompt = relay::selection_prompt_post(choices.len(), timeout);
        if let Err(e) = self
            .shared
            .gateway
            .prompt_guild_selection(user_id, &choices, &prompt)
            .await
        {
            error!("Failed to send server selection prompt: {e}");
            self.notify(user_id, &relay::failure_post()).await;
            return MailOutcome::Failed;
        }

        let offered = choices.len();
        let token = self
            .pending()
            .insert(user_id, mail, choices, Instant::now() + timeout);
        self.schedule_selection_expiry(user_id, token);

        info!(choices = offered, "Waiting for server selection");
        MailOutcome::AwaitingSelection { choices: offered }
    }

    // A message written while a prompt is open joins the queue; the prompt is re-sent
    // rather than guessing a guild.
    async fn queue_for_selection(&self, mail: InboundMail) -> MailOutcome {
        let user_id = mail.user_id;
        let expires_at = Instant::now() + self.shared.config.selection_timeout;

        let appended = self.pending().append(user_id, mail, expires_at);
        let Some((choices, token)) = appended else {
            return MailOutcome::Failed;
        };
        self.schedule_selection_expiry(user_id, token);

        let queued = self.pending().get(user_id).map_or(0, |p| p.messages.len());
        let reminder = relay::selection_reminder_post(queued);
        if let Err(e) = self
            .shared
            .gateway
            .prompt_guild_selection(user_id, &choices, &reminder)
            .await
        {
            warn!("Failed to re-send server selection prompt: {e}");
        }

        debug!(queued, "Queued message behind pending server selection");
        MailOutcome::AwaitingSelection {
            choices: choices.len(),
        }
    }

    fn schedule_selection_expiry(&self, user_id: UserId, token: u64) {
        let service = self.clone();
        let timeout = self.shared.config.selection_timeout;

        let handle = tokio::spawn(async move {
            sleep(timeout).await;
            let _guard = service.shared.locks.lock(user_id).await;
            if service.pending().expire(user_id, token) {
                info!(%user_id, "Server selection expired, queued messages discarded");
            }
        });

        self.pending().set_expiry(user_id, token, handle);
    }

    fn record_activity(&self, user_id: UserId) -> bool {
        let mut threads = self.threads();
        let Some(record) = threads.get_mut(user_id) else {
            return false;
        };

        record.touch(Instant::now());
        self.schedule_idle(record);
        true
    }

    fn schedule_idle(&self, record: &mut ThreadRecord) {
        let user_id = record.user_id;
        let epoch = record.epoch;
        let base = record.last_activity_at;

        for stage in IdleStage::ALL {
            let service = self.clone();
            let deadline = base + stage.delay(&self.shared.config);

            let handle = tokio::spawn(async move {
                sleep_until(deadline).await;
                service.fire_idle_stage(user_id, epoch, stage).await;
            });
            record.timers.set(stage, handle);
        }
    }

    async fn fire_idle_stage(&self, user_id: UserId, epoch: u64, stage: IdleStage) {
        let _guard = self.shared.locks.lock(user_id).await;
        let now = Instant::now();

        let action = {
            let mut threads = self.threads();
            let Some(record) = threads.get_mut(user_id) else {
                debug!(%user_id, ?stage, "Idle timer fired for a closed thread");
                return;
            };
            if record.status != ThreadStatus::Open || record.epoch != epoch {
                debug!(%user_id, ?stage, "Idle timer fired for an outdated idle period");
                return;
            }

            let idle = record.idle_for(now);
            if idle < stage.delay(&self.shared.config) {
                debug!(%user_id, ?stage, "Idle timer fired early, thread saw activity");
                return;
            }

            match stage {
                IdleStage::Warning | IdleStage::FinalWarning => {
                    let flags = &mut record.warnings_sent;
                    let sent = if stage == IdleStage::Warning {
                        &mut flags.thirty_second_warning
                    } else {
                        &mut flags.final_warning
                    };
                    if *sent {
                        return;
                    }
                    *sent = true;

                    IdleAction::Warn {
                        channel_id: record.channel_id,
                        closes_in: self.shared.config.close_after.saturating_sub(idle),
                    }
                }
                IdleStage::Close => {
                    drop(record.timers.detach(IdleStage::Close));
                    match threads.remove(user_id) {
                        Some(record) => IdleAction::Close(record),
                        None => return,
                    }
                }
            }
        };

        match action {
            IdleAction::Warn {
                channel_id,
                closes_in,
            } => {
                info!(%user_id, %channel_id, ?stage, "Sending idle warning");
                let post = relay::warning_post(stage, closes_in);
                let gateway = &self.shared.gateway;

                let (posted, sent) = tokio::join!(
                    gateway.post(channel_id, &post),
                    gateway.send_dm(user_id, &post)
                );
                if let Err(e) = posted {
                    warn!(%channel_id, "Failed to post idle warning: {e}");
                }
                if let Err(e) = sent {
                    warn!(%user_id, "Failed to send idle warning: {e}");
                }
            }
            IdleAction::Close(record) => self.finish_close(record, CloseReason::Idle).await,
        }
    }

    // The record has already left the registry and its timers are cancelled.
    async fn finish_close(&self, record: ThreadRecord, reason: CloseReason) {
        let (user_id, guild_id, channel_id) = (record.user_id, record.guild_id, record.channel_id);
        let open_for = record.opened_at.elapsed();
        drop(record);

        let gateway = &self.shared.gateway;
        let guild_name = self.guild_name(guild_id).await;
        let closure = relay::closure_post(&reason, open_for, self.shared.config.delete_grace);
        let farewell = relay::closure_dm(&reason, &guild_name);

        let (posted, sent) = tokio::join!(
            gateway.post(channel_id, &closure),
            gateway.send_dm(user_id, &farewell)
        );
        if let Err(e) = posted {
            warn!(%channel_id, "Failed to post closure notice: {e}");
        }
        if let Err(e) = sent {
            warn!(%user_id, "Failed to send closure notice: {e}");
        }

        self.log_event(guild_id, &relay::log_closed_post(user_id, &reason, open_for))
            .await;
        self.schedule_channel_delete(channel_id);
        self.shared.locks.prune();

        info!(%user_id, %guild_id, %channel_id, ?reason, "Modmail thread closed");
    }

    fn schedule_channel_delete(&self, channel_id: ChannelId) {
        let service = self.clone();
        let grace = self.shared.config.delete_grace;

        tokio::spawn(async move {
            sleep(grace).await;
            match service.shared.gateway.delete_channel(channel_id).await {
                Ok(()) => debug!(%channel_id, "Deleted closed thread channel"),
                Err(Error::ChannelMissing { .. }) => {
                    debug!(%channel_id, "Closed thread channel was already deleted");
                }
                Err(e) => warn!(%channel_id, "Failed to delete closed thread channel: {e}"),
            }
        });
    }

    async fn guild_name(&self, guild_id: GuildId) -> String {
        self.shared
            .gateway
            .guild_name(guild_id)
            .await
            .unwrap_or_else(|| format!("server {guild_id}"))
    }

    async fn notify(&self, user_id: UserId, post: &MailPost) {
        if let Err(e) = self.shared.gateway.send_dm(user_id, post).await {
            warn!(%user_id, "Failed to send direct message: {e}");
        }
    }

    async fn log_event(&self, guild_id: GuildId, post: &MailPost) {
        let log_channel = match self.shared.store.modmail_guild(guild_id).await {
            Ok(guild) => guild.and_then(|g| g.log_channel_id),
            Err(e) => {
                warn!(%guild_id, "Failed to read log channel: {e}");
                None
            }
        };

        if let Some(channel_id) = log_channel {
            if let Err(e) = self.shared.gateway.post(channel_id, post).await {
                warn!(%guild_id, %channel_id, "Failed to write modmail log entry: {e}");
            }
        }
    }
}
