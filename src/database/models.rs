use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use strum::Display;
use uuid::Uuid;

/// The lifecycle state of a scheduled event.
///
/// Transitions are forward-only: a completed event never returns to the
/// schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, Default)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    #[default]
    #[strum(to_string = "Scheduled")]
    Scheduled,
    #[strum(to_string = "Completed")]
    Completed,
}

/// A claimable staffing slot on an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
pub enum StaffRole {
    #[strum(to_string = "Judge")]
    Judge,
    #[strum(to_string = "Recorder")]
    Recorder,
}

/// The recorded outcome of a completed match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchResult {
    pub winner: String,
    pub winner_score: u32,
    pub loser: String,
    pub loser_score: u32,
    pub remarks: String,
}

/// One scheduled match and its mutable lifecycle state.
///
/// Discord entities are held as opaque id strings; they are resolved to
/// mentions or display names only at the chat boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    pub id: String,
    pub team1: String,
    pub team2: String,
    pub captain1: Option<String>,
    pub captain2: Option<String>,
    pub scheduled_at: DateTime<Utc>,
    pub tournament: String,
    pub round: String,
    pub group: Option<String>,
    pub mode: String,
    pub judge: Option<String>,
    pub recorder: Option<String>,
    pub status: EventStatus,
    pub result: Option<MatchResult>,
    pub channel_id: String,
    pub schedule_message_id: Option<String>,
    pub poster_path: Option<PathBuf>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
}

impl EventRecord {
    pub fn generate_id() -> String {
        format!("EVT-{}", Uuid::new_v4().simple())
    }

    pub fn from_draft(draft: EventDraft, scheduled_at: DateTime<Utc>, now: DateTime<Utc>) -> Self {
        Self {
            id: Self::generate_id(),
            team1: draft.team1,
            team2: draft.team2,
            captain1: draft.captain1,
            captain2: draft.captain2,
            scheduled_at,
            tournament: draft.tournament,
            round: draft.round,
            group: draft.group,
            mode: draft.mode,
            judge: None,
            recorder: None,
            status: EventStatus::Scheduled,
            result: None,
            channel_id: draft.channel_id,
            schedule_message_id: None,
            poster_path: None,
            created_by: draft.created_by,
            created_at: now,
        }
    }

    pub fn slot(&self, role: StaffRole) -> Option<&String> {
        match role {
            StaffRole::Judge => self.judge.as_ref(),
            StaffRole::Recorder => self.recorder.as_ref(),
        }
    }

    pub fn set_slot(&mut self, role: StaffRole, user_ref: &str) {
        match role {
            StaffRole::Judge => self.judge = Some(user_ref.to_string()),
            StaffRole::Recorder => self.recorder = Some(user_ref.to_string()),
        }
    }

    pub fn has_started(&self, now: DateTime<Utc>) -> bool {
        now >= self.scheduled_at
    }

    /// Short description used in notifications and attendance rows.
    pub fn headline(&self) -> String {
        format!("{} vs {} ({})", self.team1, self.team2, self.round)
    }
}

/// The raw creation request, calendar fields still unvalidated.
///
/// The year is always the current one; organizers schedule at most a few
/// weeks ahead.
#[derive(Debug, Clone)]
pub struct EventDraft {
    pub team1: String,
    pub team2: String,
    pub captain1: Option<String>,
    pub captain2: Option<String>,
    pub month: u32,
    pub day: u32,
    pub hour: u32,
    pub minute: u32,
    pub tournament: String,
    pub round: String,
    pub group: Option<String>,
    pub mode: String,
    pub channel_id: String,
    pub created_by: String,
}

/// A partial update applied by the edit flow. `None` keeps the current value.
#[derive(Debug, Clone, Default)]
pub struct EventPatch {
    pub team1: Option<String>,
    pub team2: Option<String>,
    pub captain1: Option<String>,
    pub captain2: Option<String>,
    pub tournament: Option<String>,
    pub round: Option<String>,
    pub group: Option<String>,
    pub mode: Option<String>,
    pub month: Option<u32>,
    pub day: Option<u32>,
    pub hour: Option<u32>,
    pub minute: Option<u32>,
}

impl EventPatch {
    pub fn is_empty(&self) -> bool {
        self.team1.is_none()
            && self.team2.is_none()
            && self.captain1.is_none()
            && self.captain2.is_none()
            && self.tournament.is_none()
            && self.round.is_none()
            && self.group.is_none()
            && self.mode.is_none()
            && !self.changes_time()
    }

    pub fn changes_time(&self) -> bool {
        self.month.is_some() || self.day.is_some() || self.hour.is_some() || self.minute.is_some()
    }
}

/// Cumulative per-person staffing counters backing the leaderboard.
///
/// Keyed by the Discord user id in the `staff_stats` collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct StaffStats {
    pub name: String,
    pub judge_count: u32,
    pub recorder_count: u32,
    pub last_activity: Option<DateTime<Utc>>,
}

impl StaffStats {
    pub fn total(&self) -> u32 {
        self.judge_count + self.recorder_count
    }

    pub fn count(&self, role: StaffRole) -> u32 {
        match role {
            StaffRole::Judge => self.judge_count,
            StaffRole::Recorder => self.recorder_count,
        }
    }

    pub fn set_count(&mut self, role: StaffRole, value: u32) {
        match role {
            StaffRole::Judge => self.judge_count = value,
            StaffRole::Recorder => self.recorder_count = value,
        }
    }
}

/// Privileged counter adjustment. Subtract and Set both floor at zero.
#[derive(Debug, Clone, Copy)]
pub enum StatAdjustment {
    Add(u32),
    Subtract(u32),
    Set(u32),
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample_record() -> EventRecord {
        let scheduled = Utc.with_ymd_and_hms(2026, 8, 10, 17, 30, 0).unwrap();
        EventRecord::from_draft(
            EventDraft {
                team1: "Night Watch".to_string(),
                team2: "Free Folk".to_string(),
                captain1: Some("1001".to_string()),
                captain2: Some("1002".to_string()),
                month: 8,
                day: 10,
                hour: 17,
                minute: 30,
                tournament: "Summer Cup".to_string(),
                round: "R1".to_string(),
                group: Some("Group A".to_string()),
                mode: "MW".to_string(),
                channel_id: "555".to_string(),
                created_by: "42".to_string(),
            },
            scheduled,
            scheduled - chrono::Duration::days(3),
        )
    }

    #[test]
    fn record_serializes_timestamps_as_iso_8601() {
        let record = sample_record();
        let json = serde_json::to_value(&record).unwrap();
        let text = json["scheduled_at"].as_str().unwrap();
        assert!(text.starts_with("2026-08-10T17:30:00"));
        assert!(text.ends_with('Z') || text.contains("+00:00"));

        let back: EventRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn slots_are_tracked_per_role() {
        let mut record = sample_record();
        assert!(record.slot(StaffRole::Judge).is_none());

        record.set_slot(StaffRole::Judge, "77");
        assert_eq!(record.slot(StaffRole::Judge).unwrap(), "77");
        assert!(record.slot(StaffRole::Recorder).is_none());
    }

    #[test]
    fn empty_patch_is_detected() {
        assert!(EventPatch::default().is_empty());

        let patch = EventPatch {
            minute: Some(45),
            ..Default::default()
        };
        assert!(!patch.is_empty());
        assert!(patch.changes_time());
    }
}
