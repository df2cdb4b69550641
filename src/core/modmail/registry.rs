//! Thread registry - the in-memory map of open modmail threads.
//!
//! Records live only as long as the process. Each record owns the timer tasks of its
//! current idle period; dropping the record (or resetting its idle clock) aborts them.

use super::ModmailConfig;
use chrono::{DateTime, Utc};
use poise::serenity_prelude::{ChannelId, GuildId, UserId};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::OwnedMutexGuard;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::errors::{Error, Result};

/// Lifecycle state of a thread.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ThreadStatus {
    /// Relaying messages
    Open,
    /// Closed; the record is about to leave the registry
    Closed,
}

/// Which idle warnings have been sent in the current idle period.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct WarningFlags {
    /// First warning sent
    pub thirty_second_warning: bool,
    /// Final warning sent
    pub final_warning: bool,
}

/// One step of the idle timeout sequence.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum IdleStage {
    /// First warning
    Warning,
    /// Last warning before closing
    FinalWarning,
    /// Automatic close
    Close,
}

impl IdleStage {
    /// All stages, in firing order.
    pub const ALL: [Self; 3] = [Self::Warning, Self::FinalWarning, Self::Close];

    /// Idle time after which this stage fires.
    #[must_use]
    pub const fn delay(self, config: &ModmailConfig) -> Duration {
        match self {
            Self::Warning => config.warning_after,
            Self::FinalWarning => config.final_warning_after,
            Self::Close => config.close_after,
        }
    }
}

/// Handles of the three pending idle actions of a thread.
#[derive(Debug, Default)]
pub struct IdleTimers {
    warning: Option<JoinHandle<()>>,
    final_warning: Option<JoinHandle<()>>,
    close: Option<JoinHandle<()>>,
}

impl IdleTimers {
    fn slot(&mut self, stage: IdleStage) -> &mut Option<JoinHandle<()>> {
        match stage {
            IdleStage::Warning => &mut self.warning,
            IdleStage::FinalWarning => &mut self.final_warning,
            IdleStage::Close => &mut self.close,
        }
    }

    /// Stores the handle for a stage, aborting whatever was there.
    pub fn set(&mut self, stage: IdleStage, handle: JoinHandle<()>) {
        if let Some(previous) = self.slot(stage).replace(handle) {
            previous.abort();
        }
    }

    /// Removes a stage's handle without aborting it.
    ///
    /// A timer task calls this on its own handle before dropping the record, so that
    /// the drop does not abort the task mid-run.
    pub fn detach(&mut self, stage: IdleStage) -> Option<JoinHandle<()>> {
        self.slot(stage).take()
    }

    /// Aborts every pending stage.
    pub fn cancel_all(&mut self) {
        for stage in IdleStage::ALL {
            if let Some(handle) = self.slot(stage).take() {
                handle.abort();
            }
        }
    }

    /// Number of stages that have a handle which has not finished yet.
    #[must_use]
    pub fn pending(&self) -> usize {
        [&self.warning, &self.final_warning, &self.close]
            .into_iter()
            .flatten()
            .filter(|handle| !handle.is_finished())
            .count()
    }
}

impl Drop for IdleTimers {
    fn drop(&mut self) {
        self.cancel_all();
    }
}

/// One open modmail conversation.
#[derive(Debug)]
pub struct ThreadRecord {
    /// User on the DM side; registry key
    pub user_id: UserId,
    /// Guild the thread belongs to
    pub guild_id: GuildId,
    /// Staff-side channel
    pub channel_id: ChannelId,
    /// Wall-clock open time
    pub created_at: DateTime<Utc>,
    /// Monotonic open time, for durations
    pub opened_at: Instant,
    /// Last observed activity from either side
    pub last_activity_at: Instant,
    /// Current state
    pub status: ThreadStatus,
    /// Warnings sent in the current idle period
    pub warnings_sent: WarningFlags,
    /// Idle period counter; timer tasks only act on the period they were scheduled for
    pub epoch: u64,
    /// Pending idle actions of the current period
    pub timers: IdleTimers,
}

impl ThreadRecord {
    /// Creates an open record whose idle clock starts at `now`.
    #[must_use]
    pub fn new(user_id: UserId, guild_id: GuildId, channel_id: ChannelId, now: Instant) -> Self {
        Self {
            user_id,
            guild_id,
            channel_id,
            created_at: Utc::now(),
            opened_at: now,
            last_activity_at: now,
            status: ThreadStatus::Open,
            warnings_sent: WarningFlags::default(),
            epoch: 0,
            timers: IdleTimers::default(),
        }
    }

    /// Records activity: starts a new idle period and cancels the old period's timers.
    ///
    /// `last_activity_at` never moves backwards. Returns the new epoch.
    pub fn touch(&mut self, now: Instant) -> u64 {
        self.last_activity_at = self.last_activity_at.max(now);
        self.warnings_sent = WarningFlags::default();
        self.epoch += 1;
        self.timers.cancel_all();
        self.epoch
    }

    /// How long the thread has been idle at `now`.
    #[must_use]
    pub fn idle_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_activity_at)
    }

    /// A copy of the record's data without its timer handles.
    #[must_use]
    pub fn snapshot(&self) -> ThreadSnapshot {
        ThreadSnapshot {
            user_id: self.user_id,
            guild_id: self.guild_id,
            channel_id: self.channel_id,
            created_at: self.created_at,
            status: self.status,
            warnings_sent: self.warnings_sent,
            pending_timers: self.timers.pending(),
        }
    }
}

/// Read-only view of a [`ThreadRecord`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ThreadSnapshot {
    /// User on the DM side
    pub user_id: UserId,
    /// Owning guild
    pub guild_id: GuildId,
    /// Staff-side channel
    pub channel_id: ChannelId,
    /// Wall-clock open time
    pub created_at: DateTime<Utc>,
    /// Current state
    pub status: ThreadStatus,
    /// Warnings sent in the current idle period
    pub warnings_sent: WarningFlags,
    /// Idle actions still scheduled
    pub pending_timers: usize,
}

/// Map of open threads keyed by user.
#[derive(Debug, Default)]
pub struct ThreadRegistry {
    threads: HashMap<UserId, ThreadRecord>,
}

impl ThreadRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of open threads.
    #[must_use]
    pub fn len(&self) -> usize {
        self.threads.len()
    }

    /// Whether no thread is open.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.threads.is_empty()
    }

    /// The user's thread, if any.
    #[must_use]
    pub fn get(&self, user_id: UserId) -> Option<&ThreadRecord> {
        self.threads.get(&user_id)
    }

    /// The user's thread, mutably.
    pub fn get_mut(&mut self, user_id: UserId) -> Option<&mut ThreadRecord> {
        self.threads.get_mut(&user_id)
    }

    /// Adds a record. A user can only have one thread.
    ///
    /// # Errors
    /// Returns `Error::ThreadExists` if the user already has a thread.
    pub fn insert(&mut self, record: ThreadRecord) -> Result<()> {
        if self.threads.contains_key(&record.user_id) {
            return Err(Error::ThreadExists {
                user_id: record.user_id.get(),
            });
        }

        self.threads.insert(record.user_id, record);
        Ok(())
    }

    /// Removes the user's thread, marking it closed and cancelling its timers.
    pub fn remove(&mut self, user_id: UserId) -> Option<ThreadRecord> {
        let mut record = self.threads.remove(&user_id)?;

        record.status = ThreadStatus::Closed;
        record.timers.cancel_all();
        Some(record)
    }

    /// The user whose thread lives in `channel_id`.
    #[must_use]
    pub fn find_by_channel(&self, channel_id: ChannelId) -> Option<UserId> {
        self.threads
            .values()
            .find(|record| record.channel_id == channel_id)
            .map(|record| record.user_id)
    }
}

/// Per-user async locks serialising all modmail work for one user.
#[derive(Debug, Default)]
pub struct UserLocks {
    locks: Mutex<HashMap<UserId, Arc<tokio::sync::Mutex<()>>>>,
}

impl UserLocks {
    /// Waits for exclusive access to the user's modmail state.
    pub async fn lock(&self, user_id: UserId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(locks.entry(user_id).or_default())
        };

        lock.lock_owned().await
    }

    /// Drops locks nobody holds or waits for.
    pub fn prune(&self) {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
    }

    /// Number of tracked users.
    #[must_use]
    pub fn len(&self) -> usize {
        self.locks.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Whether no user is tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;

    fn record(user: u64, channel: u64) -> ThreadRecord {
        ThreadRecord::new(
            UserId::new(user),
            GuildId::new(1),
            ChannelId::new(channel),
            Instant::now(),
        )
    }

    #[tokio::test]
    async fn test_one_record_per_user() {
        let mut registry = ThreadRegistry::new();

        registry.insert(record(5, 50)).unwrap();
        let duplicate = registry.insert(record(5, 51));

        assert!(matches!(duplicate, Err(Error::ThreadExists { user_id: 5 })));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get(UserId::new(5)).unwrap().channel_id, ChannelId::new(50));
    }

    #[tokio::test]
    async fn test_find_by_channel() {
        let mut registry = ThreadRegistry::new();
        registry.insert(record(5, 50)).unwrap();
        registry.insert(record(6, 60)).unwrap();

        assert_eq!(registry.find_by_channel(ChannelId::new(60)), Some(UserId::new(6)));
        assert_eq!(registry.find_by_channel(ChannelId::new(70)), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_remove_cancels_timers() {
        let mut registry = ThreadRegistry::new();
        let mut thread = record(5, 50);
        let handle = tokio::spawn(tokio::time::sleep(Duration::from_secs(60)));
        thread.timers.set(IdleStage::Close, handle);
        registry.insert(thread).unwrap();

        let removed = registry.remove(UserId::new(5)).unwrap();

        assert_eq!(removed.status, ThreadStatus::Closed);
        assert_eq!(removed.timers.pending(), 0);
        assert!(registry.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_touch_is_monotonic_and_resets_flags() {
        let start = Instant::now();
        let mut thread = record(5, 50);
        thread.warnings_sent.thirty_second_warning = true;

        tokio::time::advance(Duration::from_secs(5)).await;
        let later = Instant::now();
        assert_eq!(thread.touch(later), 1);
        assert_eq!(thread.last_activity_at, later);
        assert!(!thread.warnings_sent.thirty_second_warning);

        assert_eq!(thread.touch(start), 2);
        assert_eq!(thread.last_activity_at, later);
    }

    #[tokio::test(start_paused = true)]
    async fn test_touch_aborts_old_timers() {
        let mut thread = record(5, 50);
        let handle = tokio::spawn(tokio::time::sleep(Duration::from_secs(30)));
        thread.timers.set(IdleStage::Warning, handle);
        assert_eq!(thread.timers.pending(), 1);

        thread.touch(Instant::now());
        assert_eq!(thread.timers.pending(), 0);
    }

    #[tokio::test]
    async fn test_user_locks_prune_idle_entries() {
        let locks = UserLocks::default();

        let guard = locks.lock(UserId::new(1)).await;
        drop(locks.lock(UserId::new(2)).await);
        locks.prune();
        assert_eq!(locks.len(), 1);

        drop(guard);
        locks.prune();
        assert_eq!(locks.len(), 0);
    }
}
