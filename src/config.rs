use std::path::PathBuf;

use crate::BotError;

/// Runtime configuration, collected from the environment at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// Primary durable backend. When unset or unreachable the service falls
    /// back to JSON files under `data_dir`.
    pub database_url: Option<String>,
    pub data_dir: PathBuf,
    pub guild_id: String,
    /// Channel where claimable schedules are announced.
    pub schedule_channel_id: String,
    pub judge_role_ids: Vec<String>,
    pub recorder_role_ids: Vec<String>,
    /// Organizer-tier roles may take either slot.
    pub organizer_role_ids: Vec<String>,
    pub sheet_webhook: Option<String>,
    pub poster_api: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self, BotError> {
        Ok(Self {
            database_url: std::env::var("DATABASE_URL").ok(),
            data_dir: std::env::var("DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(".")),
            guild_id: require("GUILD_ID")?,
            schedule_channel_id: require("SCHEDULE_CHANNEL_ID")?,
            judge_role_ids: id_list("JUDGE_ROLE_IDS"),
            recorder_role_ids: id_list("RECORDER_ROLE_IDS"),
            organizer_role_ids: id_list("ORGANIZER_ROLE_IDS"),
            sheet_webhook: std::env::var("SHEET_WEBHOOK_URL").ok(),
            poster_api: std::env::var("POSTER_API").ok(),
        })
    }
}

fn require(name: &str) -> Result<String, BotError> {
    std::env::var(name).map_err(|_| anyhow::anyhow!("Expected {} as an environment variable", name))
}

/// Parses a comma-separated list of snowflake ids.
fn id_list(name: &str) -> Vec<String> {
    std::env::var(name)
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .collect()
}
