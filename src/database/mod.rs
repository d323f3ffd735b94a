use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use futures::future::join_all;
use sqlx::{PgPool, Row};
use tracing::{info, warn};

use crate::config::Config;
use crate::BotError;

use models::{EventRecord, StaffStats};

/// Models shared by the in-memory table and the durable collections.
pub mod models;

/// The durable backend behind the in-memory tables.
///
/// Writes are advisory: the in-memory state is the source of truth and a
/// failed write is logged rather than rolled back. Two logical collections
/// exist, `events` keyed by event id and `staff_stats` keyed by user id,
/// with all timestamps serialized as ISO-8601 UTC text.
pub enum DurableStore {
    Postgres(PgDatabase),
    File(FileStore),
    /// Last-resort degraded mode: nothing survives a restart. Every write
    /// attempt logs a warning so operators keep seeing the condition.
    Memory,
}

impl DurableStore {
    /// Connects to the primary backend, falling back to local JSON files and
    /// finally to memory-only operation.
    pub async fn connect(config: &Config) -> Self {
        match &config.database_url {
            Some(url) => match PgDatabase::connect(url).await {
                Ok(pg) => {
                    info!("Successfully connected to the database.");
                    return Self::Postgres(pg);
                }
                Err(e) => warn!("Database unavailable, falling back to file storage: {}", e),
            },
            None => info!("DATABASE_URL not set, using file storage."),
        }

        match FileStore::open(&config.data_dir) {
            Ok(files) => Self::File(files),
            Err(e) => {
                warn!(
                    "File storage unavailable too, running memory-only; \
                     records will not survive a restart: {}",
                    e
                );
                Self::Memory
            }
        }
    }

    pub fn is_durable(&self) -> bool {
        !matches!(self, Self::Memory)
    }

    pub async fn upsert_event(&self, record: &EventRecord) -> Result<(), BotError> {
        match self {
            Self::Postgres(pg) => pg.upsert_event(record).await,
            Self::File(files) => files.upsert_event(record),
            Self::Memory => {
                warn!("Persistence disabled, event {} kept in memory only.", record.id);
                Ok(())
            }
        }
    }

    pub async fn delete_event(&self, id: &str) -> Result<(), BotError> {
        match self {
            Self::Postgres(pg) => pg.delete_event(id).await,
            Self::File(files) => files.delete_event(id),
            Self::Memory => Ok(()),
        }
    }

    pub async fn fetch_events(&self) -> Result<HashMap<String, EventRecord>, BotError> {
        match self {
            Self::Postgres(pg) => pg.fetch_events().await,
            Self::File(files) => files.fetch_events(),
            Self::Memory => Ok(HashMap::new()),
        }
    }

    pub async fn save_events(&self, all: &HashMap<String, EventRecord>) -> Result<(), BotError> {
        match self {
            Self::Postgres(pg) => pg.save_events(all).await,
            Self::File(files) => files.save_events(all),
            Self::Memory => {
                warn!("Persistence disabled, {} events kept in memory only.", all.len());
                Ok(())
            }
        }
    }

    pub async fn fetch_stats(&self) -> Result<HashMap<String, StaffStats>, BotError> {
        match self {
            Self::Postgres(pg) => pg.fetch_stats().await,
            Self::File(files) => files.fetch_stats(),
            Self::Memory => Ok(HashMap::new()),
        }
    }

    pub async fn save_stats(&self, all: &HashMap<String, StaffStats>) -> Result<(), BotError> {
        match self {
            Self::Postgres(pg) => pg.save_stats(all).await,
            Self::File(files) => files.save_stats(all),
            Self::Memory => {
                warn!("Persistence disabled, staff stats kept in memory only.");
                Ok(())
            }
        }
    }
}

/// The Postgres backend. Records are stored as JSON documents so the schema
/// matches the document collections the file fallback uses.
pub struct PgDatabase {
    pool: PgPool,
}

impl PgDatabase {
    pub async fn connect(db_url: &str) -> Result<Self, BotError> {
        let pool = PgPool::connect(db_url).await?;
        let db = PgDatabase { pool };
        db.create_tables().await?;
        Ok(db)
    }

    /// Creates the two collections if they are missing. Used in production
    /// to generate the tables at runtime.
    async fn create_tables(&self) -> Result<(), BotError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS events (
                id TEXT PRIMARY KEY,
                data TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS staff_stats (
                user_ref TEXT PRIMARY KEY,
                data TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn upsert_event(&self, record: &EventRecord) -> Result<(), BotError> {
        sqlx::query(
            r#"
            INSERT INTO events (id, data)
            VALUES ($1, $2)
            ON CONFLICT (id)
            DO UPDATE SET
                data = $2
            "#,
        )
        .bind(&record.id)
        .bind(serde_json::to_string(record)?)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn delete_event(&self, id: &str) -> Result<(), BotError> {
        sqlx::query("DELETE FROM events WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn fetch_events(&self) -> Result<HashMap<String, EventRecord>, BotError> {
        let rows = sqlx::query("SELECT id, data FROM events")
            .fetch_all(&self.pool)
            .await?;

        let mut events = HashMap::with_capacity(rows.len());
        for row in rows {
            let id: String = row.get("id");
            let data: String = row.get("data");
            match serde_json::from_str::<EventRecord>(&data) {
                Ok(record) => {
                    events.insert(id, record);
                }
                Err(e) => warn!("Skipping unreadable event row {}: {}", id, e),
            }
        }

        Ok(events)
    }

    async fn save_events(&self, all: &HashMap<String, EventRecord>) -> Result<(), BotError> {
        let writes = all.values().map(|record| self.upsert_event(record));
        for outcome in join_all(writes).await {
            outcome?;
        }
        Ok(())
    }

    async fn upsert_stats(&self, user_ref: &str, stats: &StaffStats) -> Result<(), BotError> {
        sqlx::query(
            r#"
            INSERT INTO staff_stats (user_ref, data)
            VALUES ($1, $2)
            ON CONFLICT (user_ref)
            DO UPDATE SET
                data = $2
            "#,
        )
        .bind(user_ref)
        .bind(serde_json::to_string(stats)?)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn fetch_stats(&self) -> Result<HashMap<String, StaffStats>, BotError> {
        let rows = sqlx::query("SELECT user_ref, data FROM staff_stats")
            .fetch_all(&self.pool)
            .await?;

        let mut stats = HashMap::with_capacity(rows.len());
        for row in rows {
            let user_ref: String = row.get("user_ref");
            let data: String = row.get("data");
            match serde_json::from_str::<StaffStats>(&data) {
                Ok(entry) => {
                    stats.insert(user_ref, entry);
                }
                Err(e) => warn!("Skipping unreadable staff stats row {}: {}", user_ref, e),
            }
        }

        Ok(stats)
    }

    async fn save_stats(&self, all: &HashMap<String, StaffStats>) -> Result<(), BotError> {
        sqlx::query("DELETE FROM staff_stats")
            .execute(&self.pool)
            .await?;

        let writes = all.iter().map(|(user_ref, stats)| self.upsert_stats(user_ref, stats));
        for outcome in join_all(writes).await {
            outcome?;
        }
        Ok(())
    }
}

/// The local-file fallback: each collection is one JSON document on disk.
pub struct FileStore {
    events_path: PathBuf,
    stats_path: PathBuf,
    // Serializes the read-modify-write cycles of single-record updates.
    guard: Mutex<()>,
}

impl FileStore {
    pub fn open(dir: &Path) -> Result<Self, BotError> {
        std::fs::create_dir_all(dir)?;
        Ok(Self {
            events_path: dir.join("scheduled_events.json"),
            stats_path: dir.join("staff_stats.json"),
            guard: Mutex::new(()),
        })
    }

    fn read_document<T: serde::de::DeserializeOwned>(
        path: &Path,
    ) -> Result<HashMap<String, T>, BotError> {
        if !path.exists() {
            return Ok(HashMap::new());
        }
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    fn write_document<T: serde::Serialize>(
        path: &Path,
        all: &HashMap<String, T>,
    ) -> Result<(), BotError> {
        std::fs::write(path, serde_json::to_string_pretty(all)?)?;
        Ok(())
    }

    fn upsert_event(&self, record: &EventRecord) -> Result<(), BotError> {
        let _guard = self.guard.lock().expect("file store guard poisoned");
        let mut all: HashMap<String, EventRecord> = Self::read_document(&self.events_path)?;
        all.insert(record.id.clone(), record.clone());
        Self::write_document(&self.events_path, &all)
    }

    fn delete_event(&self, id: &str) -> Result<(), BotError> {
        let _guard = self.guard.lock().expect("file store guard poisoned");
        let mut all: HashMap<String, EventRecord> = Self::read_document(&self.events_path)?;
        all.remove(id);
        Self::write_document(&self.events_path, &all)
    }

    fn fetch_events(&self) -> Result<HashMap<String, EventRecord>, BotError> {
        let _guard = self.guard.lock().expect("file store guard poisoned");
        Self::read_document(&self.events_path)
    }

    fn save_events(&self, all: &HashMap<String, EventRecord>) -> Result<(), BotError> {
        let _guard = self.guard.lock().expect("file store guard poisoned");
        Self::write_document(&self.events_path, all)
    }

    fn fetch_stats(&self) -> Result<HashMap<String, StaffStats>, BotError> {
        let _guard = self.guard.lock().expect("file store guard poisoned");
        Self::read_document(&self.stats_path)
    }

    fn save_stats(&self, all: &HashMap<String, StaffStats>) -> Result<(), BotError> {
        let _guard = self.guard.lock().expect("file store guard poisoned");
        Self::write_document(&self.stats_path, all)
    }
}
