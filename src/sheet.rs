use async_trait::async_trait;
use reqwest::Client;
use tracing::warn;

use crate::database::models::{EventRecord, StaffRole};
use crate::BotError;

/// The organization's spreadsheet log.
///
/// Every call is fire-and-forget from the caller's perspective: call sites
/// spawn these futures and log failures, so a slow or broken sheet never
/// blocks or reverses a state transition.
#[async_trait]
pub trait SheetLog: Send + Sync {
    async fn log_creation(&self, record: &EventRecord) -> Result<(), BotError>;

    async fn update_staff(
        &self,
        event_id: &str,
        judge_name: Option<&str>,
        recorder_name: Option<&str>,
    ) -> Result<(), BotError>;

    async fn log_result(
        &self,
        event_id: &str,
        winner_name: &str,
        score_text: &str,
        remarks: &str,
    ) -> Result<(), BotError>;

    async fn log_attendance(
        &self,
        date_str: &str,
        time_str: &str,
        event_name: &str,
        role: StaffRole,
        staff_name: &str,
        marked_by: &str,
    ) -> Result<(), BotError>;
}

/// Sheet adapter posting row payloads to the organization's webhook.
///
/// When no webhook is configured the adapter degrades to a warned no-op,
/// matching how the bot behaves without sheet credentials.
pub struct SheetsApi {
    endpoint: Option<String>,
    client: Client,
}

impl SheetsApi {
    pub fn new(endpoint: Option<String>) -> Self {
        if endpoint.is_none() {
            warn!("SHEET_WEBHOOK_URL not set. Spreadsheet logging disabled.");
        }
        Self {
            endpoint,
            client: Client::new(),
        }
    }

    async fn post(&self, payload: serde_json::Value) -> Result<(), BotError> {
        let Some(endpoint) = &self.endpoint else {
            return Ok(());
        };
        self.client
            .post(endpoint)
            .json(&payload)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

#[async_trait]
impl SheetLog for SheetsApi {
    async fn log_creation(&self, record: &EventRecord) -> Result<(), BotError> {
        // Columns: EventID, Tournament, Mode, Round, Team1, Team2, Date,
        // Time, Judge, Recorder, Winner, Score, Remarks.
        self.post(serde_json::json!({
            "action": "event_create",
            "row": [
                record.id,
                record.tournament,
                record.mode,
                record.round,
                record.team1,
                record.team2,
                record.scheduled_at.format("%d/%m").to_string(),
                record.scheduled_at.format("%H:%M UTC").to_string(),
                "Unassigned",
                "Unassigned",
                "Pending",
                "Pending",
                "",
            ],
        }))
        .await
    }

    async fn update_staff(
        &self,
        event_id: &str,
        judge_name: Option<&str>,
        recorder_name: Option<&str>,
    ) -> Result<(), BotError> {
        self.post(serde_json::json!({
            "action": "update_staff",
            "event_id": event_id,
            "judge": judge_name,
            "recorder": recorder_name,
        }))
        .await
    }

    async fn log_result(
        &self,
        event_id: &str,
        winner_name: &str,
        score_text: &str,
        remarks: &str,
    ) -> Result<(), BotError> {
        self.post(serde_json::json!({
            "action": "event_result",
            "event_id": event_id,
            "winner": winner_name,
            "score": score_text,
            "remarks": remarks,
        }))
        .await
    }

    async fn log_attendance(
        &self,
        date_str: &str,
        time_str: &str,
        event_name: &str,
        role: StaffRole,
        staff_name: &str,
        marked_by: &str,
    ) -> Result<(), BotError> {
        let judge_val = matches!(role, StaffRole::Judge)
            .then_some(staff_name)
            .unwrap_or("");
        let recorder_val = matches!(role, StaffRole::Recorder)
            .then_some(staff_name)
            .unwrap_or("");
        self.post(serde_json::json!({
            "action": "attendance",
            "row": [date_str, time_str, event_name, judge_val, recorder_val, marked_by],
        }))
        .await
    }
}
