use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::database::models::{StaffRole, StaffStats, StatAdjustment};
use crate::database::DurableStore;

/// Per-person staffing counters backing the leaderboard.
///
/// Entries appear lazily on the first increment and only a privileged reset
/// removes them. Every mutation triggers a best-effort write of the whole
/// collection, mirroring how the events table persists.
pub struct StaffStatsAggregator {
    table: RwLock<HashMap<String, StaffStats>>,
    archive: Arc<DurableStore>,
}

impl StaffStatsAggregator {
    pub fn new(archive: Arc<DurableStore>) -> Self {
        Self {
            table: RwLock::new(HashMap::new()),
            archive,
        }
    }

    /// Records one completed assignment for `user_ref`.
    pub async fn increment(
        &self,
        user_ref: &str,
        display_name: &str,
        role: StaffRole,
        now: DateTime<Utc>,
    ) {
        {
            let mut table = self.table.write().await;
            let entry = table.entry(user_ref.to_string()).or_default();
            match role {
                StaffRole::Judge => entry.judge_count += 1,
                StaffRole::Recorder => entry.recorder_count += 1,
            }
            entry.last_activity = Some(now);
            // Names drift on Discord; keep the latest one.
            entry.name = display_name.to_string();
        }
        self.persist().await;
    }

    /// Privileged counter correction. Subtraction and Set floor at zero.
    /// Returns the resulting count.
    pub async fn adjust(&self, user_ref: &str, role: StaffRole, change: StatAdjustment) -> u32 {
        let updated = {
            let mut table = self.table.write().await;
            let entry = table.entry(user_ref.to_string()).or_default();
            let current = entry.count(role);
            let updated = match change {
                StatAdjustment::Add(n) => current.saturating_add(n),
                StatAdjustment::Subtract(n) => current.saturating_sub(n),
                StatAdjustment::Set(n) => n,
            };
            entry.set_count(role, updated);
            updated
        };
        self.persist().await;
        updated
    }

    /// Top staff by combined judge and recorder count, descending. Ties keep
    /// their relative order from the underlying iteration.
    pub async fn leaderboard(&self, limit: usize) -> Vec<(String, StaffStats)> {
        let table = self.table.read().await;
        let mut ranked: Vec<(String, StaffStats)> = table
            .iter()
            .map(|(user_ref, stats)| (user_ref.clone(), stats.clone()))
            .collect();
        ranked.sort_by(|a, b| b.1.total().cmp(&a.1.total()));
        ranked.truncate(limit);
        ranked
    }

    pub async fn get(&self, user_ref: &str) -> Option<StaffStats> {
        self.table.read().await.get(user_ref).cloned()
    }

    /// Privileged: clears every record and persists the empty collection.
    pub async fn reset(&self) {
        self.table.write().await.clear();
        info!("Staff statistics reset.");
        self.persist().await;
    }

    pub async fn load(&self) -> Result<usize, crate::BotError> {
        let loaded = self.archive.fetch_stats().await?;
        let count = loaded.len();
        *self.table.write().await = loaded;
        info!("Loaded staff statistics for {} users.", count);
        Ok(count)
    }

    pub async fn save(&self) -> Result<(), crate::BotError> {
        let snapshot = self.table.read().await.clone();
        self.archive.save_stats(&snapshot).await
    }

    async fn persist(&self) {
        let snapshot = self.table.read().await.clone();
        let archive = self.archive.clone();
        tokio::spawn(async move {
            if let Err(e) = archive.save_stats(&snapshot).await {
                warn!("Failed to persist staff statistics: {}", e);
            }
        });
    }
}
