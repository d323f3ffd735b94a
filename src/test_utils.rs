//! In-memory collaborator doubles shared by the unit tests.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use crate::config::Config;
use crate::database::models::{EventDraft, EventRecord, StaffRole};
use crate::discord::ChatPlatform;
use crate::poster::PosterApi;
use crate::sheet::SheetLog;
use crate::BotError;

/// Chat double recording every outbound call.
pub struct FakeChat {
    allow_all: bool,
    allowed: HashSet<String>,
    sent: Mutex<Vec<(String, String)>>,
    granted: Mutex<Vec<(String, String)>>,
    deleted: Mutex<Vec<(String, String)>>,
    next_message_id: AtomicU64,
}

impl FakeChat {
    pub fn allowing_all() -> Self {
        Self::new(true, &[])
    }

    pub fn allowing(users: &[&str]) -> Self {
        Self::new(false, users)
    }

    fn new(allow_all: bool, users: &[&str]) -> Self {
        Self {
            allow_all,
            allowed: users.iter().map(|u| u.to_string()).collect(),
            sent: Mutex::new(Vec::new()),
            granted: Mutex::new(Vec::new()),
            deleted: Mutex::new(Vec::new()),
            next_message_id: AtomicU64::new(1),
        }
    }

    pub fn sent_messages(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn grants(&self) -> Vec<(String, String)> {
        self.granted.lock().unwrap().clone()
    }

    pub fn deleted_messages(&self) -> Vec<(String, String)> {
        self.deleted.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatPlatform for FakeChat {
    async fn can_staff(&self, user_ref: &str, _role: StaffRole) -> Result<bool, BotError> {
        Ok(self.allow_all || self.allowed.contains(user_ref))
    }

    async fn display_name(&self, user_ref: &str) -> Result<String, BotError> {
        Ok(format!("user-{}", user_ref))
    }

    async fn grant_channel_access(
        &self,
        channel_ref: &str,
        user_ref: &str,
    ) -> Result<(), BotError> {
        self.granted
            .lock()
            .unwrap()
            .push((channel_ref.to_string(), user_ref.to_string()));
        Ok(())
    }

    async fn send_message(&self, channel_ref: &str, text: &str) -> Result<String, BotError> {
        self.sent
            .lock()
            .unwrap()
            .push((channel_ref.to_string(), text.to_string()));
        Ok(format!("msg-{}", self.next_message_id.fetch_add(1, Ordering::SeqCst)))
    }

    async fn delete_message(&self, channel_ref: &str, message_ref: &str) -> Result<(), BotError> {
        self.deleted
            .lock()
            .unwrap()
            .push((channel_ref.to_string(), message_ref.to_string()));
        Ok(())
    }
}

/// Sheet double counting calls by action name.
pub struct FakeSheet {
    calls: Mutex<Vec<String>>,
}

impl FakeSheet {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: &str) {
        self.calls.lock().unwrap().push(call.to_string());
    }
}

#[async_trait]
impl SheetLog for FakeSheet {
    async fn log_creation(&self, _record: &EventRecord) -> Result<(), BotError> {
        self.record("event_create");
        Ok(())
    }

    async fn update_staff(
        &self,
        _event_id: &str,
        _judge_name: Option<&str>,
        _recorder_name: Option<&str>,
    ) -> Result<(), BotError> {
        self.record("update_staff");
        Ok(())
    }

    async fn log_result(
        &self,
        _event_id: &str,
        _winner_name: &str,
        _score_text: &str,
        _remarks: &str,
    ) -> Result<(), BotError> {
        self.record("event_result");
        Ok(())
    }

    async fn log_attendance(
        &self,
        _date_str: &str,
        _time_str: &str,
        _event_name: &str,
        _role: StaffRole,
        _staff_name: &str,
        _marked_by: &str,
    ) -> Result<(), BotError> {
        self.record("attendance");
        Ok(())
    }
}

/// Poster double returning a fixed path, or nothing when disabled.
pub struct FakePoster {
    path: Option<PathBuf>,
}

impl FakePoster {
    pub fn disabled() -> Self {
        Self { path: None }
    }

    pub fn returning(path: PathBuf) -> Self {
        Self { path: Some(path) }
    }
}

#[async_trait]
impl PosterApi for FakePoster {
    async fn render(&self, _record: &EventRecord) -> Result<Option<PathBuf>, BotError> {
        Ok(self.path.clone())
    }
}

/// A fresh scheduled record starting `offset` from `now`.
pub fn record_starting_in(now: DateTime<Utc>, offset: Duration) -> EventRecord {
    let draft = EventDraft {
        team1: "Night Watch".to_string(),
        team2: "Free Folk".to_string(),
        captain1: Some("1001".to_string()),
        captain2: Some("1002".to_string()),
        month: 1,
        day: 1,
        hour: 0,
        minute: 0,
        tournament: "Summer Cup".to_string(),
        round: "R1".to_string(),
        group: None,
        mode: "MW".to_string(),
        channel_id: "chan-1".to_string(),
        created_by: "42".to_string(),
    };
    EventRecord::from_draft(draft, now + offset, now)
}

/// A creation request for the given calendar slot this year.
pub fn draft_at(month: u32, day: u32, hour: u32, minute: u32) -> EventDraft {
    EventDraft {
        team1: "Stark".to_string(),
        team2: "Lannister".to_string(),
        captain1: Some("2001".to_string()),
        captain2: Some("2002".to_string()),
        month,
        day,
        hour,
        minute,
        tournament: "Winter Cup".to_string(),
        round: "R1".to_string(),
        group: Some("Group A".to_string()),
        mode: "MW".to_string(),
        channel_id: "ticket-1".to_string(),
        created_by: "42".to_string(),
    }
}

pub fn test_config() -> Config {
    Config {
        database_url: None,
        data_dir: std::env::temp_dir(),
        guild_id: "1".to_string(),
        schedule_channel_id: "sched-chan".to_string(),
        judge_role_ids: vec!["10".to_string()],
        recorder_role_ids: vec!["11".to_string()],
        organizer_role_ids: vec!["12".to_string()],
        sheet_webhook: None,
        poster_api: None,
    }
}
