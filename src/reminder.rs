use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{info, warn};

use crate::database::models::{EventRecord, EventStatus};
use crate::discord::ChatPlatform;
use crate::store::EventStore;
use crate::timer::TimerKeeper;

/// How long before the match the reminder goes out.
pub const REMINDER_LEAD_MINUTES: i64 = 10;

/// Fires a one-shot pre-match notification per event.
///
/// At most one timer exists per event id; rescheduling replaces the pending
/// timer. The fired action re-reads the record, so role changes between
/// scheduling and firing are reflected, and an event that was deleted or
/// completed in the meantime produces no notification at all.
pub struct ReminderScheduler<C> {
    timers: TimerKeeper,
    store: Arc<EventStore>,
    chat: Arc<C>,
}

impl<C> ReminderScheduler<C>
where
    C: ChatPlatform + 'static,
{
    pub fn new(store: Arc<EventStore>, chat: Arc<C>) -> Self {
        Self {
            timers: TimerKeeper::new("reminder"),
            store,
            chat,
        }
    }

    /// Arms the reminder for `event_id` at `fire_at`. A deadline already in
    /// the past is an informational skip, not an error; any previously
    /// pending reminder for the id is cancelled either way.
    pub fn schedule(&self, event_id: &str, fire_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        let store = self.store.clone();
        let chat = self.chat.clone();
        let id = event_id.to_string();
        self.timers.schedule(event_id, fire_at, now, async move {
            send_match_reminder(store, chat, id).await;
        })
    }

    /// Schedules the reminder at the standard lead before the match starts.
    pub fn schedule_for(&self, record: &EventRecord, now: DateTime<Utc>) -> bool {
        let fire_at = record.scheduled_at - Duration::minutes(REMINDER_LEAD_MINUTES);
        self.schedule(&record.id, fire_at, now)
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

    /// Startup pass: re-arms reminders for every still-scheduled future
    /// event. Timers do not survive a restart, so this is the only recovery.
    pub async fn reconcile(&self, now: DateTime<Utc>) -> usize {
        let mut armed = 0;
        for record in self.store.list().await {
            if record.status == EventStatus::Scheduled && self.schedule_for(&record, now) {
                armed += 1;
            }
        }
        info!("Rescheduled {} match reminders.", armed);
        armed
    }
}

/// The deferred action: compose and deliver one aggregated reminder.
async fn send_match_reminder<C: ChatPlatform>(store: Arc<EventStore>, chat: Arc<C>, event_id: String) {
    // Re-read right before acting; a cancellation or deletion that raced the
    // timer wins here.
    let record = match store.get(&event_id).await {
        Ok(record) => record,
        Err(_) => return,
    };
    if record.status != EventStatus::Scheduled {
        return;
    }

    let mut pings = Vec::new();
    for person in [&record.captain1, &record.captain2, &record.judge, &record.recorder] {
        if let Some(user_ref) = person {
            pings.push(chat.mention(user_ref));
        }
    }

    let text = format!(
        "🔔 **MATCH REMINDER**\n\n{}\n\n**{}** vs **{}** ({}, {}) starts in **{} minutes**!",
        pings.join(" "),
        record.team1,
        record.team2,
        record.tournament,
        record.round,
        REMINDER_LEAD_MINUTES,
    );

    if let Err(e) = chat.send_message(&record.channel_id, &text).await {
        warn!("Error sending reminder for event {}: {}", event_id, e);
    }
}
