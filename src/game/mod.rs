//! Game logic: the animal wagering game, the slot surface, and the shared
//! jackpot engine, wired together through [`GameContext`].

pub mod animal;
pub mod jackpot;
pub mod slot;

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use tokio::sync::watch;
use tokio::time::Instant;

use crate::config::Config;
use crate::game::animal::bullets::BulletRegistry;
use crate::game::animal::room::RoomManager;
use crate::game::jackpot::JackpotPool;
use crate::game::slot::SpinEngine;
use crate::net::session::SessionStore;
use crate::push::PushManager;
use crate::recovery::RecoveryManager;
use crate::wallet::WalletStore;

/// Bounded length of the cross-player recent-rewards feed.
pub const RECENT_REWARDS_LIMIT: usize = 50;

/// Every service a message handler can touch. Constructed once by the server
/// and shared; nothing in here is ambient global state.
pub struct GameContext {
    /// Latest config revision from the hot-reload watcher.
    pub config: watch::Receiver<Arc<Config>>,
    pub wallet: WalletStore,
    pub sessions: Arc<SessionStore>,
    pub rooms: Arc<RoomManager>,
    pub push: Arc<PushManager>,
    pub bullets: Arc<BulletRegistry>,
    /// The jackpot mutexes are held across plan, wallet commit and apply so
    /// concurrent wagers cannot double-spend a pool. All of that is
    /// synchronous; the lock never spans an await.
    pub animal_jackpot: Mutex<JackpotPool>,
    pub slot_jackpot: Mutex<JackpotPool>,
    pub recovery: Arc<RecoveryManager>,
    pub spin_engine: Arc<dyn SpinEngine>,
    /// Recent notable wins across all players, newest first.
    pub recent_rewards: Mutex<VecDeque<crate::proto::RewardEntry>>,
    /// Users with a slot spin currently resolving.
    pub slot_inflight: Mutex<std::collections::HashSet<u64>>,
    pub started_at: Instant,
}

impl GameContext {
    pub fn config(&self) -> Arc<Config> {
        self.config.borrow().clone()
    }

    /// Record a win in the recent-rewards feed.
    pub fn record_reward(&self, entry: crate::proto::RewardEntry) {
        let mut feed = self.recent_rewards.lock().expect("rewards feed poisoned");
        feed.push_front(entry);
        feed.truncate(RECENT_REWARDS_LIMIT);
    }

    pub fn recent_rewards(&self, limit: usize) -> Vec<crate::proto::RewardEntry> {
        let feed = self.recent_rewards.lock().expect("rewards feed poisoned");
        feed.iter().take(limit).cloned().collect()
    }
}
