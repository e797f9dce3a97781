//! In-memory per-conversation session storage

use crate::workflow::SessionState;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

/// Session state of one conversation plus bookkeeping
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationSession {
    pub state: SessionState,
    pub created_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
    /// Set once the session has been dropped from the store. Whoever locks a
    /// retired handle must look the room up again.
    #[serde(skip)]
    retired: bool,
}

impl ConversationSession {
    fn new() -> Self {
        let now = Utc::now();
        Self {
            state: SessionState::new(),
            created_at: now,
            last_updated: now,
            retired: false,
        }
    }

    pub fn touch(&mut self) {
        self.last_updated = Utc::now();
    }

    pub fn is_retired(&self) -> bool {
        self.retired
    }
}

/// Locking this handle is what serializes turns of one conversation
pub type SessionHandle = Arc<Mutex<ConversationSession>>;

/// Exclusive access to one conversation for the length of a turn
pub type SessionGuard = OwnedMutexGuard<ConversationSession>;

/// Sessions keyed by conversation (room) id.
///
/// A room maps to at most one live handle. Removal retires the handle under
/// its own lock before dropping the map entry, so a turn that raced the
/// removal never runs next to a turn on the replacement session.
#[derive(Default)]
pub struct SessionStore {
    sessions: RwLock<HashMap<String, SessionHandle>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get_or_create(&self, room_id: &str) -> SessionHandle {
        if let Some(handle) = self.sessions.read().await.get(room_id) {
            return handle.clone();
        }
        let mut sessions = self.sessions.write().await;
        sessions
            .entry(room_id.to_string())
            .or_insert_with(|| {
                tracing::debug!(room_id, "Creating conversation session");
                Arc::new(Mutex::new(ConversationSession::new()))
            })
            .clone()
    }

    /// Lock the room's live session, creating it if needed
    pub async fn lock(&self, room_id: &str) -> SessionGuard {
        loop {
            let guard = self.get_or_create(room_id).await.lock_owned().await;
            if !guard.retired {
                return guard;
            }
            tracing::debug!(room_id, "Session retired while waiting, looking up again");
        }
    }

    pub async fn get(&self, room_id: &str) -> Option<SessionHandle> {
        self.sessions.read().await.get(room_id).cloned()
    }

    /// Forget one conversation, waiting for a running turn to finish.
    /// Returns whether it existed.
    pub async fn clear(&self, room_id: &str) -> bool {
        let Some(handle) = self.get(room_id).await else {
            return false;
        };
        let mut session = handle.lock().await;
        if session.retired {
            return false;
        }
        self.retire(room_id, &handle, &mut session).await;
        tracing::info!(room_id, "Cleared conversation session");
        true
    }

    /// Forget every conversation, returning how many there were
    pub async fn clear_all(&self) -> usize {
        let rooms: Vec<String> = self.sessions.read().await.keys().cloned().collect();
        let mut count = 0;
        for room_id in rooms {
            if self.clear(&room_id).await {
                count += 1;
            }
        }
        tracing::info!(count, "Cleared all conversation sessions");
        count
    }

    /// Drop conversations idle for longer than `max_idle`
    pub async fn remove_idle(&self, max_idle: Duration) -> usize {
        let Ok(max_idle) = chrono::Duration::from_std(max_idle) else {
            return 0;
        };
        let cutoff = Utc::now() - max_idle;

        let mut removed = 0;
        for (room_id, handle) in self.handles().await {
            // A session locked by a running turn is not idle
            let Ok(mut session) = handle.try_lock() else {
                continue;
            };
            if session.retired || session.last_updated >= cutoff {
                continue;
            }
            self.retire(&room_id, &handle, &mut session).await;
            removed += 1;
        }
        if removed > 0 {
            tracing::info!(count = removed, "Removed idle conversation sessions");
        }
        removed
    }

    /// Snapshot of every conversation, for diagnostics. Waits for running
    /// turns to finish.
    pub async fn dump(&self) -> BTreeMap<String, ConversationSession> {
        let mut snapshot = BTreeMap::new();
        for (room_id, handle) in self.handles().await {
            let session = handle.lock().await;
            if !session.retired {
                snapshot.insert(room_id, session.clone());
            }
        }
        snapshot
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    async fn handles(&self) -> Vec<(String, SessionHandle)> {
        self.sessions
            .read()
            .await
            .iter()
            .map(|(room, handle)| (room.clone(), handle.clone()))
            .collect()
    }

    /// Caller holds `session`, the lock of `handle`
    async fn retire(&self, room_id: &str, handle: &SessionHandle, session: &mut ConversationSession) {
        session.retired = true;
        session.state.clear();
        let mut sessions = self.sessions.write().await;
        if sessions.get(room_id).is_some_and(|live| Arc::ptr_eq(live, handle)) {
            sessions.remove(room_id);
        }
    }
}
