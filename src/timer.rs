use std::collections::HashMap;
use std::future::Future;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// A registry of one-shot deadline timers, at most one per key.
///
/// Each timer is a spawned task that sleeps until its deadline and then runs
/// its action, unless the paired cancellation token fires first. Cancelling
/// is idempotent and safe in every phase: not yet started, sleeping, fired,
/// or already cancelled. Actions that race a cancellation are expected to
/// re-check the state they act on before producing visible effects.
pub struct TimerKeeper {
    label: &'static str,
    timers: Mutex<HashMap<String, TimerHandle>>,
}

struct TimerHandle {
    token: CancellationToken,
    task: JoinHandle<()>,
}

impl TimerKeeper {
    pub fn new(label: &'static str) -> Self {
        Self {
            label,
            timers: Mutex::new(HashMap::new()),
        }
    }

    /// Arms a timer for `key`, replacing any pending one.
    ///
    /// A deadline at or before `now` arms nothing: the stale request is
    /// logged as an informational skip and `false` is returned. The previous
    /// timer is cancelled either way, so a reschedule can never leave two
    /// timers racing for the same key.
    pub fn schedule<F>(&self, key: &str, fire_at: DateTime<Utc>, now: DateTime<Utc>, action: F) -> bool
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.cancel(key);

        if fire_at <= now {
            info!(
                "{} time for {} is in the past, skipping",
                self.label, key
            );
            return false;
        }

        let delay = (fire_at - now).to_std().unwrap_or_default();
        let token = CancellationToken::new();
        let armed = token.clone();
        let task = tokio::spawn(async move {
            tokio::select! {
                _ = armed.cancelled() => {}
                _ = tokio::time::sleep(delay) => action.await,
            }
        });

        let mut timers = self.timers.lock().expect("timer registry poisoned");
        timers.insert(key.to_string(), TimerHandle { token, task });
        debug!("{} for {} scheduled at {}", self.label, key, fire_at);
        true
    }

    /// Cancels the pending timer for `key`, if any. Returns whether a timer
    /// was still registered.
    pub fn cancel(&self, key: &str) -> bool {
        let removed = {
            let mut timers = self.timers.lock().expect("timer registry poisoned");
            timers.remove(key)
        };
        match removed {
            Some(handle) => {
                handle.token.cancel();
                debug!("{} for {} cancelled", self.label, key);
                true
            }
            None => false,
        }
    }

    /// Cancels every pending timer. Used at shutdown.
    pub fn cancel_all(&self) {
        let drained: Vec<TimerHandle> = {
            let mut timers = self.timers.lock().expect("timer registry poisoned");
            timers.drain().map(|(_, handle)| handle).collect()
        };
        for handle in &drained {
            handle.token.cancel();
        }
        if !drained.is_empty() {
            info!("Cancelled {} pending {} timers", drained.len(), self.label);
        }
    }

    /// Whether a timer for `key` is registered and has not yet fired.
    pub fn is_pending(&self, key: &str) -> bool {
        let timers = self.timers.lock().expect("timer registry poisoned");
        timers
            .get(key)
            .map(|handle| !handle.task.is_finished())
            .unwrap_or(false)
    }
}
