//! Session recovery across reconnects.
//!
//! In-flight sessions are persisted on room entry and on disconnect, so a
//! player reconnecting within the session timeout can discover the room they
//! were in. Records expire after the configured timeout (default 30 minutes):
//! stale rows are purged once at startup and then by a periodic sweep.
//!
//! The in-room accumulated win intentionally restarts at zero on the next
//! room entry; the persisted value exists for diagnosis, not for replay.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use uuid::Uuid;

use crate::errors::GameError;

const TREE_SESSIONS: &str = "sessions";

pub const SESSION_SCHEMA_VERSION: u8 = 1;

/// Interval between periodic expiry sweeps.
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(30 * 60);

/// Durable snapshot of one live session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    pub session_id: Uuid,
    pub user_id: u64,
    pub room_kind: i32,
    pub room_id: u32,
    pub total_win: i64,
    pub last_active: DateTime<Utc>,
    pub schema_version: u8,
}

impl SessionRecord {
    pub fn new(session_id: Uuid, user_id: u64, room_kind: i32, room_id: u32, total_win: i64) -> Self {
        Self {
            session_id,
            user_id,
            room_kind,
            room_id,
            total_win,
            last_active: Utc::now(),
            schema_version: SESSION_SCHEMA_VERSION,
        }
    }
}

/// Persists and expires session snapshots in the shared store.
pub struct RecoveryManager {
    tree: sled::Tree,
    timeout: chrono::Duration,
}

impl RecoveryManager {
    /// Open over the shared database. Expires anything already stale, so a
    /// restart never resurrects sessions from a previous life.
    pub fn new(db: &sled::Db, timeout_minutes: u32) -> Result<Self, GameError> {
        let manager = Self {
            tree: db.open_tree(TREE_SESSIONS)?,
            timeout: chrono::Duration::minutes(timeout_minutes as i64),
        };
        let purged = manager.expire_stale()?;
        if purged > 0 {
            info!("expired {} stale persisted sessions at startup", purged);
        }
        Ok(manager)
    }

    fn key(user_id: u64) -> Vec<u8> {
        format!("{:020}", user_id).into_bytes()
    }

    /// Persist the latest snapshot for a player. One row per player: a newer
    /// connection replaces the older snapshot.
    pub fn persist(&self, record: &SessionRecord) -> Result<(), GameError> {
        let bytes = bincode::serialize(record)?;
        self.tree.insert(Self::key(record.user_id), bytes)?;
        debug!(
            "persisted session {} for user {} (room {})",
            record.session_id, record.user_id, record.room_id
        );
        Ok(())
    }

    /// Load the recoverable snapshot for a player, if one is still fresh.
    pub fn load(&self, user_id: u64) -> Result<Option<SessionRecord>, GameError> {
        let Some(bytes) = self.tree.get(Self::key(user_id))? else {
            return Ok(None);
        };
        let record: SessionRecord = bincode::deserialize(&bytes)?;
        if Utc::now() - record.last_active >= self.timeout {
            self.tree.remove(Self::key(user_id))?;
            return Ok(None);
        }
        Ok(Some(record))
    }

    pub fn remove(&self, user_id: u64) -> Result<(), GameError> {
        self.tree.remove(Self::key(user_id))?;
        Ok(())
    }

    /// Delete every record older than the session timeout. Returns the count.
    pub fn expire_stale(&self) -> Result<usize, GameError> {
        let now = Utc::now();
        let mut purged = 0;
        for item in self.tree.iter() {
            let (key, bytes) = item?;
            let stale = match bincode::deserialize::<SessionRecord>(&bytes) {
                Ok(record) => now - record.last_active >= self.timeout,
                // Unreadable rows are purged rather than kept forever.
                Err(e) => {
                    warn!("dropping unreadable session record: {}", e);
                    true
                }
            };
            if stale {
                self.tree.remove(key)?;
                purged += 1;
            }
        }
        Ok(purged)
    }

    /// Periodic sweep deleting expired sessions from the store.
    pub fn spawn_sweeper(
        self: Arc<Self>,
        mut shutdown: watch::Receiver<bool>,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            // The first tick fires immediately; startup already swept.
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        match self.expire_stale() {
                            Ok(0) => {}
                            Ok(n) => info!("expired {} stale persisted sessions", n),
                            Err(e) => warn!("session sweep failed: {}", e),
                        }
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn open() -> (RecoveryManager, sled::Db, TempDir) {
        let tmp = TempDir::new().expect("tempdir");
        let db = sled::open(tmp.path()).expect("sled");
        let manager = RecoveryManager::new(&db, 30).expect("manager");
        (manager, db, tmp)
    }

    #[test]
    fn persist_load_round_trip() {
        let (manager, _db, _tmp) = open();
        let record = SessionRecord::new(Uuid::new_v4(), 7, 0, 3, 500);
        manager.persist(&record).unwrap();
        let loaded = manager.load(7).unwrap().expect("fresh record");
        assert_eq!(loaded.room_id, 3);
        assert_eq!(loaded.total_win, 500);
        assert_eq!(loaded.session_id, record.session_id);
    }

    #[test]
    fn load_expires_stale_records() {
        let (manager, _db, _tmp) = open();
        let mut record = SessionRecord::new(Uuid::new_v4(), 8, 0, 1, 0);
        record.last_active = Utc::now() - chrono::Duration::minutes(31);
        manager.persist(&record).unwrap();
        assert!(manager.load(8).unwrap().is_none());
        // The stale row is gone from the tree as well.
        assert!(manager.load(8).unwrap().is_none());
    }

    #[test]
    fn newer_snapshot_replaces_older() {
        let (manager, _db, _tmp) = open();
        manager
            .persist(&SessionRecord::new(Uuid::new_v4(), 9, 0, 1, 100))
            .unwrap();
        manager
            .persist(&SessionRecord::new(Uuid::new_v4(), 9, 2, 5, 0))
            .unwrap();
        let loaded = manager.load(9).unwrap().expect("record");
        assert_eq!(loaded.room_id, 5);
        assert_eq!(loaded.room_kind, 2);
    }

    #[test]
    fn expire_stale_counts_purges() {
        let (manager, _db, _tmp) = open();
        for user in 1..=3u64 {
            let mut record = SessionRecord::new(Uuid::new_v4(), user, 0, 1, 0);
            if user != 2 {
                record.last_active = Utc::now() - chrono::Duration::hours(2);
            }
            manager.persist(&record).unwrap();
        }
        let purged = manager.expire_stale().unwrap();
        assert_eq!(purged, 2);
        assert!(manager.load(2).unwrap().is_some());
    }

    #[test]
    fn remove_clears_record() {
        let (manager, _db, _tmp) = open();
        manager
            .persist(&SessionRecord::new(Uuid::new_v4(), 11, 0, 1, 0))
            .unwrap();
        manager.remove(11).unwrap();
        assert!(manager.load(11).unwrap().is_none());
    }
}
