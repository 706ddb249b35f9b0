//! Per-connection sessions and the process-wide session store.
//!
//! A session exists for exactly one open WebSocket connection. The store maps
//! session ids to sessions and keeps a secondary player index, because one
//! player may keep several tabs open. Mutations (add, remove, join and leave
//! room) take the write lock; broadcast target resolution takes the read
//! lock.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicI64, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch, RwLock};
use tokio::time::Instant;
use uuid::Uuid;

use crate::protocol::ServerFrame;

/// Bound of each connection's send queue.
pub const SEND_QUEUE_CAPACITY: usize = 256;

/// Which endpoint the connection arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    Animal,
    Slot,
    Game,
}

impl Endpoint {
    pub fn from_path(path: &str) -> Option<Self> {
        match path {
            "/ws/animal" => Some(Endpoint::Animal),
            "/ws/slot" => Some(Endpoint::Slot),
            "/ws/game" => Some(Endpoint::Game),
            _ => None,
        }
    }
}

/// Runtime state of one connection.
pub struct Session {
    pub id: Uuid,
    pub user_id: u64,
    pub nickname: String,
    pub endpoint: Endpoint,
    /// Selected room, 0 when unplaced.
    room_id: AtomicU32,
    /// Win accumulated since entering the current room.
    total_win: AtomicI64,
    /// Milliseconds since session creation of the last client activity.
    last_active_ms: AtomicU64,
    created_at: Instant,
    /// Bounded send queue drained by the writer task.
    outbound: mpsc::Sender<ServerFrame>,
    /// Raised exactly once when either side wants the connection gone.
    done: watch::Sender<bool>,
}

impl Session {
    pub fn new(
        user_id: u64,
        nickname: String,
        endpoint: Endpoint,
    ) -> (Arc<Self>, mpsc::Receiver<ServerFrame>, watch::Receiver<bool>) {
        let (outbound, outbound_rx) = mpsc::channel(SEND_QUEUE_CAPACITY);
        let (done, done_rx) = watch::channel(false);
        let session = Arc::new(Self {
            id: Uuid::new_v4(),
            user_id,
            nickname,
            endpoint,
            room_id: AtomicU32::new(0),
            total_win: AtomicI64::new(0),
            last_active_ms: AtomicU64::new(0),
            created_at: Instant::now(),
            outbound,
            done,
        });
        (session, outbound_rx, done_rx)
    }

    pub fn room_id(&self) -> u32 {
        self.room_id.load(Ordering::Acquire)
    }

    pub fn total_win(&self) -> i64 {
        self.total_win.load(Ordering::Acquire)
    }

    pub fn add_win(&self, win: i64) -> i64 {
        self.total_win.fetch_add(win, Ordering::AcqRel) + win
    }

    pub fn touch(&self) {
        let ms = self.created_at.elapsed().as_millis() as u64;
        self.last_active_ms.store(ms, Ordering::Release);
    }

    pub fn idle_for(&self) -> Duration {
        let last = Duration::from_millis(self.last_active_ms.load(Ordering::Acquire));
        self.created_at.elapsed().saturating_sub(last)
    }

    /// Raise the done signal. Safe to call more than once; observers see the
    /// first raise.
    pub fn close(&self) {
        let _ = self.done.send(true);
    }

    pub fn is_closed(&self) -> bool {
        *self.done.borrow()
    }

    /// Best-effort enqueue for broadcasts: a full queue is a soft drop.
    pub fn try_send(&self, frame: ServerFrame) -> Result<(), ()> {
        self.outbound.try_send(frame).map_err(|_| ())
    }

    /// Bounded enqueue for responses: gives the writer up to `timeout` to
    /// drain before failing upward.
    pub async fn send(&self, frame: ServerFrame, timeout: Duration) -> Result<(), ()> {
        tokio::time::timeout(timeout, self.outbound.send(frame))
            .await
            .map_err(|_| ())?
            .map_err(|_| ())
    }
}

/// Process-wide registry of live sessions.
#[derive(Default)]
pub struct SessionStore {
    sessions: RwLock<HashMap<Uuid, Arc<Session>>>,
    players: RwLock<HashMap<u64, HashSet<Uuid>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add(&self, session: Arc<Session>) {
        let mut sessions = self.sessions.write().await;
        let mut players = self.players.write().await;
        players
            .entry(session.user_id)
            .or_default()
            .insert(session.id);
        sessions.insert(session.id, session);
    }

    /// Reclaim a session from both maps. Returns it so the caller can run
    /// the room-leave path.
    pub async fn remove(&self, id: Uuid) -> Option<Arc<Session>> {
        let mut sessions = self.sessions.write().await;
        let mut players = self.players.write().await;
        let session = sessions.remove(&id)?;
        if let Some(set) = players.get_mut(&session.user_id) {
            set.remove(&id);
            if set.is_empty() {
                players.remove(&session.user_id);
            }
        }
        Some(session)
    }

    pub async fn get(&self, id: Uuid) -> Option<Arc<Session>> {
        self.sessions.read().await.get(&id).cloned()
    }

    pub async fn sessions_of(&self, user_id: u64) -> Vec<Arc<Session>> {
        let players = self.players.read().await;
        let Some(ids) = players.get(&user_id) else {
            return Vec::new();
        };
        let sessions = self.sessions.read().await;
        ids.iter()
            .filter_map(|id| sessions.get(id).cloned())
            .collect()
    }

    pub async fn join_room(&self, id: Uuid, room_id: u32) -> Option<Arc<Session>> {
        let sessions = self.sessions.write().await;
        let session = sessions.get(&id).cloned()?;
        session.room_id.store(room_id, Ordering::Release);
        session.total_win.store(0, Ordering::Release);
        Some(session)
    }

    /// Clear the room binding. Returns the room left and the accumulated win.
    pub async fn leave_room(&self, id: Uuid) -> Option<(Arc<Session>, u32, i64)> {
        let sessions = self.sessions.write().await;
        let session = sessions.get(&id).cloned()?;
        let room_id = session.room_id.swap(0, Ordering::AcqRel);
        let total_win = session.total_win.swap(0, Ordering::AcqRel);
        Some((session, room_id, total_win))
    }

    /// All sessions currently placed in `room_id`, for broadcast fan-out.
    pub async fn room_members(&self, room_id: u32) -> Vec<Arc<Session>> {
        let sessions = self.sessions.read().await;
        sessions
            .values()
            .filter(|s| s.room_id() == room_id)
            .cloned()
            .collect()
    }

    /// Every live session, for shutdown and whole-surface pushes.
    pub async fn all(&self) -> Vec<Arc<Session>> {
        self.sessions.read().await.values().cloned().collect()
    }

    /// Sessions idle past `timeout`, for the reaper.
    pub async fn idle_sessions(&self, timeout: Duration) -> Vec<Arc<Session>> {
        let sessions = self.sessions.read().await;
        sessions
            .values()
            .filter(|s| s.idle_for() >= timeout)
            .cloned()
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}
