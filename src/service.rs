use std::sync::Arc;

use chrono::{DateTime, Datelike, Duration, TimeZone, Timelike, Utc};
use tracing::{info, warn};

use crate::cleanup::{CleanupScheduler, CLEANUP_GRACE_HOURS, STALE_EVENT_DAYS};
use crate::config::Config;
use crate::database::models::{
    EventDraft, EventPatch, EventRecord, EventStatus, MatchResult, StaffRole, StatAdjustment,
};
use crate::database::DurableStore;
use crate::discord::ChatPlatform;
use crate::error::EventError;
use crate::poster::PosterApi;
use crate::reminder::ReminderScheduler;
use crate::sheet::SheetLog;
use crate::slots::SlotAssignmentCoordinator;
use crate::stats::StaffStatsAggregator;
use crate::store::EventStore;
use crate::BotError;

/// Edits are refused this close to the start so a pending reminder is never
/// edited out from under its own deadline.
pub const EDIT_FREEZE_MINUTES: i64 = 20;

/// The process-scoped coordination service.
///
/// Owns the event table, the slot coordinator, both timer schedulers and the
/// staff statistics, and wires them to the external collaborators. Built
/// once at startup and torn down with [`EventService::shutdown`]; handlers
/// receive it by reference instead of touching shared module state.
pub struct EventService<C, S, P> {
    store: Arc<EventStore>,
    slots: SlotAssignmentCoordinator<C, S>,
    reminders: Arc<ReminderScheduler<C>>,
    cleanup: CleanupScheduler<C>,
    stats: Arc<StaffStatsAggregator>,
    chat: Arc<C>,
    sheet: Arc<S>,
    poster: Arc<P>,
    schedule_channel_id: String,
}

impl<C, S, P> EventService<C, S, P>
where
    C: ChatPlatform + 'static,
    S: SheetLog + 'static,
    P: PosterApi + 'static,
{
    /// Builds the service, loads both collections from the durable store and
    /// runs the startup reconciliation pass.
    pub async fn start(
        archive: DurableStore,
        chat: C,
        sheet: S,
        poster: P,
        config: &Config,
        now: DateTime<Utc>,
    ) -> Result<Self, BotError> {
        let archive = Arc::new(archive);
        if !archive.is_durable() {
            warn!("Running without durable storage. All records are lost on restart.");
        }

        let store = Arc::new(EventStore::new(archive.clone()));
        if let Err(e) = store.load().await {
            warn!("Error loading scheduled events: {}", e);
        }
        let stats = Arc::new(StaffStatsAggregator::new(archive.clone()));
        if let Err(e) = stats.load().await {
            warn!("Error loading staff statistics: {}", e);
        }

        let chat = Arc::new(chat);
        let sheet = Arc::new(sheet);
        let reminders = Arc::new(ReminderScheduler::new(store.clone(), chat.clone()));
        let cleanup = CleanupScheduler::new(
            store.clone(),
            chat.clone(),
            reminders.clone(),
            config.schedule_channel_id.clone(),
        );
        let slots = SlotAssignmentCoordinator::new(store.clone(), chat.clone(), sheet.clone());

        let service = Self {
            store,
            slots,
            reminders,
            cleanup,
            stats,
            chat,
            sheet,
            poster: Arc::new(poster),
            schedule_channel_id: config.schedule_channel_id.clone(),
        };
        service.reconcile(now).await;
        Ok(service)
    }

    /// Startup pass: sweep events stale beyond the hard limit, re-arm
    /// cleanups for completed events and reminders for scheduled ones.
    pub async fn reconcile(&self, now: DateTime<Utc>) {
        let mut swept = 0;
        for record in self.store.list().await {
            if now - record.scheduled_at >= Duration::days(STALE_EVENT_DAYS) {
                match self.delete_event(&record.id).await {
                    Ok(_) => swept += 1,
                    Err(e) => warn!("Error sweeping stale event {}: {}", record.id, e),
                }
            } else if record.status == EventStatus::Completed {
                self.cleanup
                    .schedule(&record.id, Duration::hours(CLEANUP_GRACE_HOURS), now);
            }
        }
        if swept > 0 {
            info!("Swept {} stale events.", swept);
        }

        self.reminders.reconcile(now).await;
    }

    /// Cancels every pending timer and flushes both collections.
    pub async fn shutdown(&self) {
        self.reminders.cancel_all();
        self.cleanup.cancel_all();
        if let Err(e) = self.store.save().await {
            warn!("Error saving scheduled events at shutdown: {}", e);
        }
        if let Err(e) = self.stats.save().await {
            warn!("Error saving staff statistics at shutdown: {}", e);
        }
        info!("Event service shut down.");
    }

    /// Creates an event: validate, render the poster, insert the record,
    /// announce the claimable schedule and arm the reminder.
    pub async fn create_event(
        &self,
        draft: EventDraft,
        now: DateTime<Utc>,
    ) -> Result<EventRecord, EventError> {
        validate_calendar_fields(
            Some(draft.month),
            Some(draft.day),
            Some(draft.hour),
            Some(draft.minute),
        )?;
        if let (Some(c1), Some(c2)) = (&draft.captain1, &draft.captain2) {
            if c1 == c2 {
                return Err(EventError::InvalidInput(
                    "The same captain cannot lead both teams.".to_string(),
                ));
            }
        }
        let scheduled_at = compose_time(draft.month, draft.day, draft.hour, draft.minute, now)?;

        let mut record = EventRecord::from_draft(draft, scheduled_at, now);
        match self.poster.render(&record).await {
            Ok(path) => record.poster_path = path,
            Err(e) => warn!("Error creating event poster for {}: {}", record.id, e),
        }

        self.store.create(record.clone()).await?;

        let sheet = self.sheet.clone();
        let snapshot = record.clone();
        tokio::spawn(async move {
            if let Err(e) = sheet.log_creation(&snapshot).await {
                warn!("Error logging event {} to sheet: {}", snapshot.id, e);
            }
        });

        let event_id = record.id.clone();
        match self
            .chat
            .send_message(&self.schedule_channel_id, &schedule_announcement(&record))
            .await
        {
            Ok(message_id) => {
                record = self
                    .store
                    .mutate(&event_id, |r| {
                        r.schedule_message_id = Some(message_id.clone());
                        Ok(r.clone())
                    })
                    .await?;
            }
            Err(e) => warn!("Error posting schedule message for {}: {}", event_id, e),
        }

        self.reminders.schedule_for(&record, now);
        info!("Event {} created for {} vs {}.", record.id, record.team1, record.team2);
        Ok(record)
    }

    /// Applies a partial edit, re-validating the freeze window and moving
    /// the reminder when the start time changes.
    pub async fn edit_event(
        &self,
        event_id: &str,
        patch: EventPatch,
        now: DateTime<Utc>,
    ) -> Result<EventRecord, EventError> {
        if patch.is_empty() {
            return Err(EventError::InvalidInput(
                "Provide at least one field to update.".to_string(),
            ));
        }
        validate_calendar_fields(patch.month, patch.day, patch.hour, patch.minute)?;

        let current = self.store.get(event_id).await?;
        let new_time = if patch.changes_time() {
            let composed = compose_time(
                patch.month.unwrap_or(current.scheduled_at.month()),
                patch.day.unwrap_or(current.scheduled_at.day()),
                patch.hour.unwrap_or(current.scheduled_at.hour()),
                patch.minute.unwrap_or(current.scheduled_at.minute()),
                now,
            )?;
            if composed - now < Duration::minutes(EDIT_FREEZE_MINUTES) {
                return Err(EventError::InvalidInput(format!(
                    "The new match time must be at least {} minutes in the future.",
                    EDIT_FREEZE_MINUTES
                )));
            }
            Some(composed)
        } else {
            None
        };

        let updated = self
            .store
            .mutate(event_id, |record| {
                if record.status != EventStatus::Scheduled {
                    return Err(EventError::AlreadyCompleted(record.id.clone()));
                }
                if record.has_started(now) {
                    return Err(EventError::MatchAlreadyStarted(record.id.clone()));
                }
                if record.scheduled_at - now < Duration::minutes(EDIT_FREEZE_MINUTES) {
                    return Err(EventError::InvalidInput(format!(
                        "You cannot edit an event that starts in less than {} minutes.",
                        EDIT_FREEZE_MINUTES
                    )));
                }

                if let Some(team1) = &patch.team1 {
                    record.team1 = team1.clone();
                }
                if let Some(team2) = &patch.team2 {
                    record.team2 = team2.clone();
                }
                if let Some(captain1) = &patch.captain1 {
                    record.captain1 = Some(captain1.clone());
                }
                if let Some(captain2) = &patch.captain2 {
                    record.captain2 = Some(captain2.clone());
                }
                if let Some(tournament) = &patch.tournament {
                    record.tournament = tournament.clone();
                }
                if let Some(round) = &patch.round {
                    record.round = round.clone();
                }
                if let Some(group) = &patch.group {
                    record.group = Some(group.clone());
                }
                if let Some(mode) = &patch.mode {
                    record.mode = mode.clone();
                }
                if let Some(time) = new_time {
                    record.scheduled_at = time;
                }
                Ok(record.clone())
            })
            .await?;

        // Re-arm against the (possibly unchanged) start time; the old timer
        // is replaced, so the reminder can never fire twice.
        self.reminders.schedule_for(&updated, now);
        Ok(updated)
    }

    /// Records a match result: marks the event completed, credits the staff,
    /// pushes the sheet rows and arms the cleanup.
    ///
    /// Equal scores are rejected outright; a tie must be broken before a
    /// result can be recorded.
    pub async fn record_result(
        &self,
        event_id: &str,
        submitted_by: &str,
        team1_score: i32,
        team2_score: i32,
        remarks: &str,
        now: DateTime<Utc>,
    ) -> Result<EventRecord, EventError> {
        if team1_score < 0 || team2_score < 0 {
            return Err(EventError::InvalidInput("Scores cannot be negative.".to_string()));
        }
        if team1_score == team2_score {
            return Err(EventError::InvalidInput(
                "Scores are level. Play the tie-breaker before recording a result.".to_string(),
            ));
        }

        let remarks_owned = remarks.to_string();
        let updated = self
            .store
            .mutate(event_id, |record| {
                if record.status == EventStatus::Completed {
                    return Err(EventError::AlreadyCompleted(record.id.clone()));
                }
                let (winner, winner_score, loser, loser_score) = if team1_score > team2_score {
                    (record.team1.clone(), team1_score as u32, record.team2.clone(), team2_score as u32)
                } else {
                    (record.team2.clone(), team2_score as u32, record.team1.clone(), team1_score as u32)
                };
                record.status = EventStatus::Completed;
                record.result = Some(MatchResult {
                    winner,
                    winner_score,
                    loser,
                    loser_score,
                    remarks: remarks_owned,
                });
                Ok(record.clone())
            })
            .await?;

        // A reminder only exists for scheduled events.
        self.reminders.cancel(event_id);

        // The event's judge takes the credit; without one, whoever recorded
        // the result acted as the judge.
        let judge_ref = updated.judge.clone().unwrap_or_else(|| submitted_by.to_string());
        let judge_name = self.display_or_ref(&judge_ref).await;
        self.stats
            .increment(&judge_ref, &judge_name, StaffRole::Judge, now)
            .await;

        let mut recorder_name = None;
        if let Some(recorder_ref) = updated.recorder.clone() {
            let name = self.display_or_ref(&recorder_ref).await;
            self.stats
                .increment(&recorder_ref, &name, StaffRole::Recorder, now)
                .await;
            recorder_name = Some(name);
        }

        if let Some(result) = updated.result.clone() {
            let sheet = self.sheet.clone();
            let id = event_id.to_string();
            let headline = updated.headline();
            let score_text = format!(
                "{} ({}) - {} ({})",
                updated.team1, team1_score, updated.team2, team2_score
            );
            let marked_by = self.display_or_ref(submitted_by).await;
            tokio::spawn(async move {
                if let Err(e) = sheet
                    .log_result(&id, &result.winner, &score_text, &result.remarks)
                    .await
                {
                    warn!("Error logging result to sheet for {}: {}", id, e);
                }

                let date_str = now.format("%Y-%m-%d").to_string();
                let time_str = now.format("%H:%M:%S").to_string();
                if let Err(e) = sheet
                    .log_attendance(&date_str, &time_str, &headline, StaffRole::Judge, &judge_name, &marked_by)
                    .await
                {
                    warn!("Error logging judge attendance for {}: {}", id, e);
                }
                if let Some(recorder_name) = recorder_name {
                    if let Err(e) = sheet
                        .log_attendance(
                            &date_str,
                            &time_str,
                            &headline,
                            StaffRole::Recorder,
                            &recorder_name,
                            &marked_by,
                        )
                        .await
                    {
                        warn!("Error logging recorder attendance for {}: {}", id, e);
                    }
                }
            });
        }

        self.cleanup
            .schedule(event_id, Duration::hours(CLEANUP_GRACE_HOURS), now);
        info!("Result recorded for event {}; cleanup scheduled.", event_id);
        Ok(updated)
    }

    /// Removes an event immediately: both timers are cancelled and the
    /// schedule message and poster artifact go with it.
    pub async fn delete_event(&self, event_id: &str) -> Result<EventRecord, EventError> {
        let record = self.store.delete(event_id).await?;

        self.reminders.cancel(event_id);
        self.cleanup.cancel(event_id);

        if let Some(message_id) = &record.schedule_message_id {
            if let Err(e) = self
                .chat
                .delete_message(&self.schedule_channel_id, message_id)
                .await
            {
                warn!("Error deleting schedule message for {}: {}", event_id, e);
            }
        }
        if let Some(path) = &record.poster_path {
            if let Err(e) = std::fs::remove_file(path) {
                warn!("Error deleting poster file for {}: {}", event_id, e);
            }
        }

        info!("Event {} deleted.", event_id);
        Ok(record)
    }

    pub async fn claim(
        &self,
        event_id: &str,
        role: StaffRole,
        claimant: &str,
        now: DateTime<Utc>,
    ) -> Result<EventRecord, EventError> {
        self.slots.claim(event_id, role, claimant, now).await
    }

    pub async fn exchange(
        &self,
        event_id: &str,
        role: StaffRole,
        new_user: &str,
    ) -> Result<EventRecord, EventError> {
        self.slots.exchange(event_id, role, new_user).await
    }

    pub async fn adjust_stats(&self, user_ref: &str, role: StaffRole, change: StatAdjustment) -> u32 {
        self.stats.adjust(user_ref, role, change).await
    }

    pub fn stats(&self) -> &StaffStatsAggregator {
        &self.stats
    }

    pub async fn list_events(&self) -> Vec<EventRecord> {
        self.store.list().await
    }

    pub async fn get_event(&self, event_id: &str) -> Result<EventRecord, EventError> {
        self.store.get(event_id).await
    }

    async fn display_or_ref(&self, user_ref: &str) -> String {
        self.chat
            .display_name(user_ref)
            .await
            .unwrap_or_else(|_| user_ref.to_string())
    }
}

/// Builds the claimable-schedule announcement posted when an event is
/// created.
fn schedule_announcement(record: &EventRecord) -> String {
    let ts = record.scheduled_at.timestamp();
    let mut text = format!(
        "🗓️ **{}** VS **{}**\n**Tournament:** {}\n**Mode:** {}\n**Round:** {}\n",
        record.team1, record.team2, record.tournament, record.mode, record.round
    );
    if let Some(group) = &record.group {
        text.push_str(&format!("**Group:** {}\n", group));
    }
    text.push_str(&format!("**Start:** <t:{}:F> (<t:{}:R>)", ts, ts));
    text
}

fn validate_calendar_fields(
    month: Option<u32>,
    day: Option<u32>,
    hour: Option<u32>,
    minute: Option<u32>,
) -> Result<(), EventError> {
    if let Some(hour) = hour {
        if hour > 23 {
            return Err(EventError::InvalidInput("Hour must be between 0 and 23.".to_string()));
        }
    }
    if let Some(minute) = minute {
        if minute > 59 {
            return Err(EventError::InvalidInput("Minute must be between 0 and 59.".to_string()));
        }
    }
    if let Some(day) = day {
        if !(1..=31).contains(&day) {
            return Err(EventError::InvalidInput("Date must be between 1 and 31.".to_string()));
        }
    }
    if let Some(month) = month {
        if !(1..=12).contains(&month) {
            return Err(EventError::InvalidInput("Month must be between 1 and 12.".to_string()));
        }
    }
    Ok(())
}

/// Builds the UTC start instant from calendar parts in the current year.
fn compose_time(
    month: u32,
    day: u32,
    hour: u32,
    minute: u32,
    now: DateTime<Utc>,
) -> Result<DateTime<Utc>, EventError> {
    Utc.with_ymd_and_hms(now.year(), month, day, hour, minute, 0)
        .single()
        .ok_or_else(|| EventError::InvalidInput("Not a valid calendar date.".to_string()))
}
