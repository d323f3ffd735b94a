use std::path::PathBuf;

use anyhow::anyhow;
use async_trait::async_trait;
use base64::{engine::general_purpose, Engine};
use reqwest::Client;
use tracing::{debug, warn};

use crate::database::models::EventRecord;
use crate::BotError;

/// The poster rendering service, consumed once at event creation.
///
/// The returned path becomes the record's `poster_path` and is owned by the
/// event until cleanup removes the file. `None` means posters are disabled;
/// creation proceeds without one.
#[async_trait]
pub trait PosterApi: Send + Sync {
    async fn render(&self, record: &EventRecord) -> Result<Option<PathBuf>, BotError>;
}

/// HTTP poster renderer. The API picks a template for the given mode and
/// returns the finished image as a base64 payload.
pub struct PosterService {
    base_url: Option<String>,
    client: Client,
}

impl PosterService {
    pub fn new(base_url: Option<String>) -> Self {
        if base_url.is_none() {
            warn!("POSTER_API not set. Event posters disabled.");
        }
        Self {
            base_url,
            client: Client::new(),
        }
    }
}

#[async_trait]
impl PosterApi for PosterService {
    async fn render(&self, record: &EventRecord) -> Result<Option<PathBuf>, BotError> {
        let Some(base_url) = &self.base_url else {
            return Ok(None);
        };

        let payload = serde_json::json!({
            "mode": record.mode,
            "round": record.round,
            "team1": record.team1,
            "team2": record.team2,
            "utc_time": record.scheduled_at.format("%H:%M UTC").to_string(),
            "date": record.scheduled_at.format("%d/%m").to_string(),
        });

        let content = self
            .client
            .post(format!("{}/poster", base_url))
            .header("accept", "text/plain")
            .json(&payload)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;

        let bytes = general_purpose::STANDARD
            .decode(content.trim())
            .map_err(|e| anyhow!("Error decoding poster image from API: {}", e))?;

        let path = std::env::temp_dir().join(format!("{}-poster.png", record.id));
        std::fs::write(&path, bytes)?;
        debug!("Poster for {} written to {}", record.id, path.display());

        Ok(Some(path))
    }
}
