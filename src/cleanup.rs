use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, warn};

use crate::discord::ChatPlatform;
use crate::reminder::ReminderScheduler;
use crate::store::EventStore;
use crate::timer::TimerKeeper;

/// Grace period between a recorded result and the event's removal.
pub const CLEANUP_GRACE_HOURS: i64 = 2;

/// Events untouched for this long are swept at startup regardless of state.
pub const STALE_EVENT_DAYS: i64 = 7;

/// Reclaims a completed event and its artifacts after the grace period.
///
/// The deferred action deletes the posted schedule message, removes the
/// poster file, cancels any stray reminder and finally drops the record.
/// Each step is fault-isolated: a failure is logged and the remaining steps
/// still run. Re-scheduling replaces a pending cleanup; cancelling one that
/// does not exist is a no-op.
pub struct CleanupScheduler<C> {
    timers: TimerKeeper,
    store: Arc<EventStore>,
    chat: Arc<C>,
    // Handed in at wiring time so a firing cleanup can cancel a reminder
    // that outlived its event.
    reminders: Arc<ReminderScheduler<C>>,
    schedule_channel_id: String,
}

impl<C> CleanupScheduler<C>
where
    C: ChatPlatform + 'static,
{
    pub fn new(
        store: Arc<EventStore>,
        chat: Arc<C>,
        reminders: Arc<ReminderScheduler<C>>,
        schedule_channel_id: String,
    ) -> Self {
        Self {
            timers: TimerKeeper::new("cleanup"),
            store,
            chat,
            reminders,
            schedule_channel_id,
        }
    }

    pub fn schedule(&self, event_id: &str, delay: Duration, now: DateTime<Utc>) -> bool {
        let store = self.store.clone();
        let chat = self.chat.clone();
        let reminders = self.reminders.clone();
        let channel = self.schedule_channel_id.clone();
        let id = event_id.to_string();
        self.timers.schedule(event_id, now + delay, now, async move {
            run_cleanup(store, chat, reminders, channel, id).await;
        })
    }

    pub fn cancel(&self, event_id: &str) -> bool {
        self.timers.cancel(event_id)
    }

    pub fn cancel_all(&self) {
        self.timers.cancel_all();
    }

    pub fn is_pending(&self, event_id: &str) -> bool {
        self.timers.is_pending(event_id)
    }
}

async fn run_cleanup<C: ChatPlatform + 'static>(
    store: Arc<EventStore>,
    chat: Arc<C>,
    reminders: Arc<ReminderScheduler<C>>,
    schedule_channel_id: String,
    event_id: String,
) {
    // Another path may have removed the event already; nothing left to do.
    let record = match store.get(&event_id).await {
        Ok(record) => record,
        Err(_) => {
            debug!("Event {} already gone before cleanup.", event_id);
            return;
        }
    };

    if let Some(message_id) = &record.schedule_message_id {
        if let Err(e) = chat.delete_message(&schedule_channel_id, message_id).await {
            warn!("Error deleting schedule message for {}: {}", event_id, e);
        }
    }

    if let Some(path) = &record.poster_path {
        if let Err(e) = std::fs::remove_file(path) {
            warn!("Poster cleanup error for {}: {}", event_id, e);
        }
    }

    reminders.cancel(&event_id);

    if let Err(e) = store.delete(&event_id).await {
        warn!("Error removing event {} in cleanup: {}", event_id, e);
    } else {
        debug!("Event {} cleaned up.", event_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::DurableStore;
    use crate::test_utils::{record_starting_in, FakeChat};

    struct Fixture {
        store: Arc<EventStore>,
        chat: Arc<FakeChat>,
        reminders: Arc<ReminderScheduler<FakeChat>>,
        cleanup: CleanupScheduler<FakeChat>,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(EventStore::new(Arc::new(DurableStore::Memory)));
        let chat = Arc::new(FakeChat::allowing_all());
        let reminders = Arc::new(ReminderScheduler::new(store.clone(), chat.clone()));
        let cleanup = CleanupScheduler::new(
            store.clone(),
            chat.clone(),
            reminders.clone(),
            "sched-chan".to_string(),
        );
        Fixture {
            store,
            chat,
            reminders,
            cleanup,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn cleanup_removes_record_artifacts_and_stray_reminder() {
        let fx = fixture();
        let now = Utc::now();

        let poster = std::env::temp_dir().join(format!("wae-cleanup-{}.png", uuid::Uuid::new_v4()));
        std::fs::write(&poster, b"png").unwrap();

        // Starts well after the grace period so the reminder is still
        // pending when the cleanup fires.
        let mut record = record_starting_in(now, Duration::hours(4));
        record.schedule_message_id = Some("msg-1".to_string());
        record.poster_path = Some(poster.clone());
        let id = record.id.clone();
        fx.store.create(record.clone()).await.unwrap();

        // A reminder left behind by an early result.
        fx.reminders.schedule_for(&record, now);
        fx.cleanup.schedule(&id, Duration::hours(2), now);

        tokio::time::sleep(std::time::Duration::from_secs(5 * 3600)).await;

        assert!(fx.store.get(&id).await.is_err());
        assert!(!poster.exists());
        assert!(!fx.reminders.is_pending(&id));
        assert_eq!(
            fx.chat.deleted_messages(),
            vec![("sched-chan".to_string(), "msg-1".to_string())]
        );
        // The stray reminder was cancelled rather than fired.
        assert!(fx.chat.sent_messages().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_cleanup_leaves_the_event_alone() {
        let fx = fixture();
        let now = Utc::now();
        let record = record_starting_in(now, Duration::hours(1));
        let id = record.id.clone();
        fx.store.create(record).await.unwrap();

        fx.cleanup.schedule(&id, Duration::hours(2), now);
        assert!(fx.cleanup.cancel(&id));

        tokio::time::sleep(std::time::Duration::from_secs(3 * 3600)).await;
        assert!(fx.store.get(&id).await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn cleanup_of_an_already_deleted_event_is_quiet() {
        let fx = fixture();
        let now = Utc::now();
        let record = record_starting_in(now, Duration::hours(1));
        let id = record.id.clone();
        fx.store.create(record).await.unwrap();

        fx.cleanup.schedule(&id, Duration::minutes(30), now);
        fx.store.delete(&id).await.unwrap();

        tokio::time::sleep(std::time::Duration::from_secs(3600)).await;
        assert!(fx.chat.deleted_messages().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn rescheduling_replaces_the_pending_cleanup() {
        let fx = fixture();
        let now = Utc::now();
        let record = record_starting_in(now, Duration::hours(1));
        let id = record.id.clone();
        fx.store.create(record).await.unwrap();

        fx.cleanup.schedule(&id, Duration::hours(1), now);
        fx.cleanup.schedule(&id, Duration::hours(4), now);

        tokio::time::sleep(std::time::Duration::from_secs(2 * 3600)).await;
        assert!(fx.store.get(&id).await.is_ok(), "first deadline must not fire");

        tokio::time::sleep(std::time::Duration::from_secs(3 * 3600)).await;
        assert!(fx.store.get(&id).await.is_err());
    }
}
