use std::{
    collections::{btree_map::Entry, BTreeMap},
    sync::Arc,
    time::Duration,
};

use async_trait::async_trait;
use thiserror::Error;
use tokio::{
    sync::{Mutex, Notify},
    time::sleep,
};
use tracing::{debug, info, instrument, warn};

use crate::{
    common::{ObjectStatus, ResourceKey, StatusReport},
    configuration::StatusConfiguration,
};

#[derive(Error, Debug)]
pub enum StatusWriteError {
    #[error("object not found")]
    NotFound,
    #[error("status write failed {0}")]
    Kube(#[from] kube::Error),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WriteOutcome {
    /// The live object does not exist, nothing was written.
    Missing,
    Unchanged,
    Patched,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyncState {
    NoStatus,
    Stale,
    Synced,
}

/// Writes one object's status to wherever it lives.
#[async_trait]
pub trait StatusWriter: Send + Sync {
    async fn write(&self, key: &ResourceKey, status: &ObjectStatus) -> Result<WriteOutcome, StatusWriteError>;
}

/// Decoupled status stage.
///
/// Reports are queued per object, a newer report replaces a pending one. A single worker drains the queue
/// after a short debounce and retries failed writes with exponential backoff. Writes that exhausted their
/// attempts stay queued and the worker comes back for them on its next tick.
pub struct StatusSyncer {
    writer: Arc<dyn StatusWriter>,
    configuration: StatusConfiguration,
    pending: Mutex<BTreeMap<ResourceKey, ObjectStatus>>,
    written: Mutex<BTreeMap<ResourceKey, ObjectStatus>>,
    states: Mutex<BTreeMap<ResourceKey, SyncState>>,
    notify: Notify,
}

impl StatusSyncer {
    pub fn new(writer: Arc<dyn StatusWriter>, configuration: StatusConfiguration) -> Self {
        Self {
            writer,
            configuration,
            pending: Mutex::new(BTreeMap::new()),
            written: Mutex::new(BTreeMap::new()),
            states: Mutex::new(BTreeMap::new()),
            notify: Notify::new(),
        }
    }

    /// Queues every entry of the report that differs from what was last written.
    pub async fn submit(&self, report: StatusReport) {
        let written = self.written.lock().await;
        let mut pending = self.pending.lock().await;
        let mut states = self.states.lock().await;
        let mut queued = 0;
        for (key, status) in report {
            if written.get(&key) == Some(&status) {
                continue;
            }
            states.insert(key.clone(), SyncState::Stale);
            pending.insert(key, status);
            queued += 1;
        }
        if queued > 0 {
            debug!("Queued {queued} status updates");
            self.notify.notify_one();
        }
    }

    pub async fn state(&self, key: &ResourceKey) -> Option<SyncState> {
        self.states.lock().await.get(key).copied()
    }

    pub async fn start(self: Arc<Self>) -> crate::Result<()> {
        info!("Status syncer started");
        loop {
            self.notify.notified().await;
            sleep(self.configuration.interval()).await;
            self.flush().await;
            if !self.pending.lock().await.is_empty() {
                debug!("Status updates left after flush, rearming");
                self.notify.notify_one();
            }
        }
    }

    /// Writes everything pending right now.
    pub async fn flush(&self) {
        let batch = std::mem::take(&mut *self.pending.lock().await);
        for (key, status) in batch {
            let state = self.write_with_retry(&key, &status).await;
            match state {
                SyncState::Synced => {
                    self.written.lock().await.insert(key.clone(), status.clone());
                }
                SyncState::NoStatus => {
                    self.written.lock().await.remove(&key);
                }
                SyncState::Stale => {}
            }
            let mut pending = self.pending.lock().await;
            let mut states = self.states.lock().await;
            match pending.entry(key) {
                Entry::Occupied(newer) => {
                    states.insert(newer.key().clone(), SyncState::Stale);
                }
                Entry::Vacant(slot) => {
                    states.insert(slot.key().clone(), state);
                    if state == SyncState::Stale {
                        slot.insert(status);
                    }
                }
            }
        }
    }

    #[instrument(level = "debug", skip_all, fields(key = %key))]
    async fn write_with_retry(&self, key: &ResourceKey, status: &ObjectStatus) -> SyncState {
        let mut backoff = self.configuration.initial_backoff();
        for attempt in 1..=self.configuration.max_attempts {
            match self.writer.write(key, status).await {
                Ok(WriteOutcome::Missing) | Err(StatusWriteError::NotFound) => {
                    debug!("Object is gone, no status to write");
                    return SyncState::NoStatus;
                }
                Ok(WriteOutcome::Unchanged) => return SyncState::Synced,
                Ok(WriteOutcome::Patched) => {
                    info!("Status patched");
                    return SyncState::Synced;
                }
                Err(e) => {
                    warn!("Status write attempt {attempt} failed {e}");
                    if attempt < self.configuration.max_attempts {
                        sleep(backoff).await;
                        backoff = next_backoff(backoff, self.configuration.max_backoff());
                    }
                }
            }
        }
        warn!("Giving up on status after {} attempts", self.configuration.max_attempts);
        SyncState::Stale
    }
}

fn next_backoff(current: Duration, max: Duration) -> Duration {
    current.saturating_mul(2).min(max)
}
