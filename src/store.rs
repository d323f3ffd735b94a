use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::database::models::EventRecord;
use crate::database::DurableStore;
use crate::error::EventError;

/// The authoritative in-memory table of event records.
///
/// Mutations to the same record are serialized on a per-record lock;
/// mutations to different records proceed independently. The critical
/// section is purely in-memory: durable writes happen afterwards on a
/// spawned task and are advisory, so a slow backend never blocks a claim or
/// an edit.
pub struct EventStore {
    records: RwLock<HashMap<String, Arc<Mutex<Entry>>>>,
    archive: Arc<DurableStore>,
}

/// Table entry. `live` is flipped under the record lock on deletion so a
/// mutation racing a delete observes the tombstone instead of updating a
/// detached record.
struct Entry {
    record: EventRecord,
    live: bool,
}

impl EventStore {
    pub fn new(archive: Arc<DurableStore>) -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            archive,
        }
    }

    pub async fn create(&self, record: EventRecord) -> Result<(), EventError> {
        {
            let mut records = self.records.write().expect("event table poisoned");
            if records.contains_key(&record.id) {
                return Err(EventError::DuplicateId(record.id.clone()));
            }
            records.insert(
                record.id.clone(),
                Arc::new(Mutex::new(Entry {
                    record: record.clone(),
                    live: true,
                })),
            );
        }

        self.persist_upsert(record);
        Ok(())
    }

    pub async fn get(&self, id: &str) -> Result<EventRecord, EventError> {
        let entry = self.entry(id)?;
        let entry = entry.lock().await;
        if !entry.live {
            return Err(EventError::EventNotFound(id.to_string()));
        }
        Ok(entry.record.clone())
    }

    /// Applies an atomic partial update under per-record exclusion.
    ///
    /// The closure runs with the lock held and must not block; it sees the
    /// current record state, not state cached before acquisition. A closure
    /// error leaves the record untouched and skips persistence.
    pub async fn mutate<T, F>(&self, id: &str, op: F) -> Result<T, EventError>
    where
        F: FnOnce(&mut EventRecord) -> Result<T, EventError>,
    {
        let entry = self.entry(id)?;
        let mut entry = entry.lock().await;
        if !entry.live {
            return Err(EventError::EventNotFound(id.to_string()));
        }

        // The closure works on a scratch copy so a precondition failure
        // leaves the record exactly as it was.
        let mut draft = entry.record.clone();
        let out = op(&mut draft)?;
        entry.record = draft;
        let snapshot = entry.record.clone();
        drop(entry);

        self.persist_upsert(snapshot);
        Ok(out)
    }

    /// Removes the record, returning its final state.
    pub async fn delete(&self, id: &str) -> Result<EventRecord, EventError> {
        let entry = self.entry(id)?;
        let mut entry = entry.lock().await;
        if !entry.live {
            return Err(EventError::EventNotFound(id.to_string()));
        }
        entry.live = false;
        let record = entry.record.clone();
        drop(entry);

        self.records
            .write()
            .expect("event table poisoned")
            .remove(id);

        let archive = self.archive.clone();
        let gone = id.to_string();
        tokio::spawn(async move {
            if let Err(e) = archive.delete_event(&gone).await {
                warn!("Failed to remove event {} from the durable store: {}", gone, e);
            }
        });

        Ok(record)
    }

    /// Point-in-time snapshot of every record. The returned list is a plain
    /// Vec, so iteration is restartable and unaffected by later mutations.
    pub async fn list(&self) -> Vec<EventRecord> {
        let entries: Vec<Arc<Mutex<Entry>>> = {
            let records = self.records.read().expect("event table poisoned");
            records.values().cloned().collect()
        };

        let mut snapshot = Vec::with_capacity(entries.len());
        for entry in entries {
            let entry = entry.lock().await;
            if entry.live {
                snapshot.push(entry.record.clone());
            }
        }
        snapshot
    }

    pub async fn len(&self) -> usize {
        self.list().await.len()
    }

    /// Replaces the in-memory table with the durable store's contents.
    pub async fn load(&self) -> Result<usize, crate::BotError> {
        let loaded = self.archive.fetch_events().await?;
        let count = loaded.len();

        let mut records = self.records.write().expect("event table poisoned");
        records.clear();
        for (id, record) in loaded {
            records.insert(id, Arc::new(Mutex::new(Entry { record, live: true })));
        }
        drop(records);

        info!("Loaded {} scheduled events.", count);
        Ok(count)
    }

    /// Writes the full table to the durable store.
    pub async fn save(&self) -> Result<(), crate::BotError> {
        let snapshot: HashMap<String, EventRecord> = self
            .list()
            .await
            .into_iter()
            .map(|record| (record.id.clone(), record))
            .collect();
        self.archive.save_events(&snapshot).await
    }

    fn entry(&self, id: &str) -> Result<Arc<Mutex<Entry>>, EventError> {
        self.records
            .read()
            .expect("event table poisoned")
            .get(id)
            .cloned()
            .ok_or_else(|| EventError::EventNotFound(id.to_string()))
    }

    /// Best-effort durable write; failures are logged, never surfaced to the
    /// mutation that triggered them.
    fn persist_upsert(&self, record: EventRecord) {
        let archive = self.archive.clone();
        tokio::spawn(async move {
            if let Err(e) = archive.upsert_event(&record).await {
                warn!("Failed to persist event {}: {}", record.id, e);
            }
        });
    }
}
