//! Fired-bullet registry.
//!
//! A bullet is a short-lived, wallet-debited handle granting the right to one
//! wager resolution. Firing debits the wallet immediately; the matching bet
//! consumes the bullet and credits any win. Bullets expire unused after 30
//! seconds and a periodic sweep reclaims them.

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use uuid::Uuid;

use crate::errors::GameError;

/// Lifetime of an unused bullet.
pub const BULLET_TTL: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct Bullet {
    pub id: Uuid,
    pub user_id: u64,
    pub amount: i64,
    pub multiplier: u32,
    pub created_at: Instant,
    pub used: bool,
}

impl Bullet {
    fn expired(&self, now: Instant) -> bool {
        now - self.created_at >= BULLET_TTL
    }
}

/// Process-wide registry of in-flight bullets.
#[derive(Default)]
pub struct BulletRegistry {
    bullets: Mutex<HashMap<Uuid, Bullet>>,
}

impl BulletRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a freshly fired (already debited) bullet.
    pub async fn fire(&self, user_id: u64, amount: i64, multiplier: u32) -> Bullet {
        let bullet = Bullet {
            id: Uuid::new_v4(),
            user_id,
            amount,
            multiplier,
            created_at: Instant::now(),
            used: false,
        };
        self.bullets.lock().await.insert(bullet.id, bullet.clone());
        bullet
    }

    /// Consume a bullet for a bet. A bullet can be taken at most once, only
    /// by its owner, and only within its lifetime.
    pub async fn take(&self, id: Uuid, user_id: u64) -> Result<Bullet, GameError> {
        let mut bullets = self.bullets.lock().await;
        let now = Instant::now();
        match bullets.get(&id) {
            None => Err(GameError::NotFound(format!("bullet {}", id))),
            Some(b) if b.user_id != user_id => {
                Err(GameError::PermissionDenied("bullet owner mismatch".into()))
            }
            Some(b) if b.used => Err(GameError::GameState("bullet already used".into())),
            Some(b) if b.expired(now) => {
                bullets.remove(&id);
                Err(GameError::Timeout("bullet expired".into()))
            }
            Some(_) => {
                let mut bullet = bullets.remove(&id).expect("present under lock");
                bullet.used = true;
                Ok(bullet)
            }
        }
    }

    /// Look up a bullet without consuming it.
    pub async fn get(&self, id: Uuid) -> Result<Bullet, GameError> {
        let bullets = self.bullets.lock().await;
        match bullets.get(&id) {
            Some(b) if !b.used && !b.expired(Instant::now()) => Ok(b.clone()),
            Some(_) => Err(GameError::Timeout("bullet expired".into())),
            None => Err(GameError::NotFound(format!("bullet {}", id))),
        }
    }

    /// Drop expired bullets. Returns the reclaimed bullets so the caller can
    /// log or refund according to policy (the live policy is no refund; the
    /// debit stands, matching a shot that never hit).
    pub async fn sweep(&self) -> Vec<Bullet> {
        let mut bullets = self.bullets.lock().await;
        let now = Instant::now();
        let dead: Vec<Uuid> = bullets
            .values()
            .filter(|b| b.expired(now))
            .map(|b| b.id)
            .collect();
        dead.into_iter()
            .filter_map(|id| bullets.remove(&id))
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.bullets.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.bullets.lock().await.is_empty()
    }
}
