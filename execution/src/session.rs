//! Durable game records.
//!
//! Rooms hand finished [`SessionRecord`]s to a [`SessionLog`], which queues them for a single
//! writer task. Rooms never wait on storage: a full queue drops the record with a warning, and
//! a failed write is logged and not retried.

use fishhunt_types::{PlayerId, SessionRecord};
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex as StdMutex};
use thiserror::Error;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Durable storage for finished sessions.
pub trait SessionRepository: Clone + Send + Sync + 'static {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Append a finished session to its player's history.
    fn save(&self, record: SessionRecord) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// Sessions of one player, oldest first.
    fn history(
        &self,
        player_id: PlayerId,
    ) -> impl Future<Output = Result<Vec<SessionRecord>, Self::Error>> + Send;
}

#[derive(Debug, Error)]
#[error("session store unavailable")]
pub struct SessionStoreUnavailable;

#[derive(Default)]
struct MemorySessions {
    records: HashMap<PlayerId, Vec<SessionRecord>>,
    fail_saves: bool,
}

#[derive(Clone, Default)]
pub struct MemorySessionRepository {
    store: Arc<StdMutex<MemorySessions>>,
}

impl MemorySessionRepository {
    fn store(&self) -> std::sync::MutexGuard<'_, MemorySessions> {
        self.store.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn stored(&self, player_id: PlayerId) -> Vec<SessionRecord> {
        self.store()
            .records
            .get(&player_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.store().records.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn fail_saves(&self, fail: bool) {
        self.store().fail_saves = fail;
    }
}

impl SessionRepository for MemorySessionRepository {
    type Error = SessionStoreUnavailable;

    async fn save(&self, record: SessionRecord) -> Result<(), Self::Error> {
        let mut store = self.store();
        if store.fail_saves {
            return Err(SessionStoreUnavailable);
        }
        store.records.entry(record.player_id).or_default().push(record);
        Ok(())
    }

    async fn history(&self, player_id: PlayerId) -> Result<Vec<SessionRecord>, Self::Error> {
        Ok(self.stored(player_id))
    }
}

enum Request {
    Record(SessionRecord),
    Flush(oneshot::Sender<()>),
}

/// Handle rooms use to record finished sessions.
///
/// A log built with [`SessionLog::disabled`] discards everything.
#[derive(Clone)]
pub struct SessionLog {
    sender: Option<mpsc::Sender<Request>>,
}

impl SessionLog {
    /// Spawn the writer for `repository` with room for `buffer_size` queued records.
    pub fn start<S: SessionRepository>(repository: S, buffer_size: usize) -> (Self, JoinHandle<()>) {
        let (sender, receiver) = mpsc::channel(buffer_size.max(1));
        let handle = tokio::spawn(write_sessions(repository, receiver));
        (
            Self {
                sender: Some(sender),
            },
            handle,
        )
    }

    pub fn disabled() -> Self {
        Self { sender: None }
    }

    pub fn record(&self, record: SessionRecord) {
        let Some(sender) = &self.sender else {
            return;
        };
        match sender.try_send(Request::Record(record)) {
            Ok(()) => {}
            Err(TrySendError::Full(Request::Record(record))) => {
                warn!(
                    player_id = record.player_id,
                    room_id = %record.room_id,
                    "session log full; record dropped"
                );
            }
            Err(TrySendError::Full(_)) => {}
            Err(TrySendError::Closed(_)) => debug!("session log closed"),
        }
    }

    /// Wait until every record queued before this call was written (or failed).
    pub async fn flush(&self) {
        let Some(sender) = &self.sender else {
            return;
        };
        let (done, wait) = oneshot::channel();
        if sender.send(Request::Flush(done)).await.is_ok() {
            let _ = wait.await;
        }
    }
}

impl Default for SessionLog {
    fn default() -> Self {
        Self::disabled()
    }
}

async fn write_sessions<S: SessionRepository>(repository: S, mut receiver: mpsc::Receiver<Request>) {
    while let Some(request) = receiver.recv().await {
        match request {
            Request::Record(record) => {
                let player_id = record.player_id;
                let room_id = record.room_id.clone();
                match repository.save(record).await {
                    Ok(()) => debug!(player_id, %room_id, "session recorded"),
                    Err(err) => warn!(player_id, %room_id, %err, "session write failed"),
                }
            }
            Request::Flush(done) => {
                let _ = done.send(());
            }
        }
    }
}
