//! Shared progressive jackpot pool.
//!
//! One pool per game, process-wide. Every wager feeds a configured fraction
//! into the pool; eligible kills may trigger a payout of a random share of the
//! pool, after which the pool resets to the residual plus a tenth of the
//! initial seed. Trigger events land in a bounded in-memory history and are
//! persisted durably by the bet commit.
//!
//! The bet path needs the pool mutation to stand or fall with the wallet
//! transaction, so it runs in two steps: [`JackpotPool::plan`] is pure and
//! decides accumulation and trigger, the wallet commit persists the resulting
//! delta, and [`JackpotPool::apply`] mutates the pool only after the commit
//! succeeded. [`JackpotPool::accumulate`] and [`JackpotPool::try_trigger`]
//! wrap the same pair for callers outside the commit path.

use std::collections::HashMap;
use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use rand::Rng;

use crate::config::JackpotConfig;
use crate::wallet::JackpotWinRecord;

/// Bounded length of the trigger history.
pub const HISTORY_LIMIT: usize = 50;

/// Outcome of an applied trigger.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JackpotHit {
    pub win: i64,
    pub pool_after: i64,
}

/// A decided but not yet applied pool mutation.
#[derive(Debug, Clone, Copy, Default)]
pub struct JackpotPlan {
    /// Accumulation share of the wager; zero when the plan triggered.
    pub accumulated: i64,
    /// Payout amount when the trigger fired.
    pub win: Option<i64>,
}

impl JackpotPlan {
    /// Signed delta the bet commit persists for the pool row.
    pub fn pool_delta(&self) -> i64 {
        self.accumulated - self.win.unwrap_or(0)
    }
}

/// Mutable pool state. Callers wrap this in a `Mutex`; the bet path holds the
/// lock across plan, wallet commit and apply so concurrent wagers cannot
/// double-spend the pool.
#[derive(Debug)]
pub struct JackpotPool {
    config: JackpotConfig,
    amount: i64,
    /// Cumulative contribution per player since the last trigger.
    contributions: HashMap<u64, i64>,
    last_trigger: Option<DateTime<Utc>>,
    history: VecDeque<JackpotWinRecord>,
}

impl JackpotPool {
    pub fn new(config: JackpotConfig) -> Self {
        let amount = config.initial;
        Self {
            config,
            amount,
            contributions: HashMap::new(),
            last_trigger: None,
            history: VecDeque::new(),
        }
    }

    /// Restore a pool from its persisted amount.
    pub fn with_amount(config: JackpotConfig, amount: i64) -> Self {
        let mut pool = Self::new(config);
        pool.amount = amount;
        pool
    }

    pub fn amount(&self) -> i64 {
        self.amount
    }

    pub fn last_trigger(&self) -> Option<DateTime<Utc>> {
        self.last_trigger
    }

    pub fn history(&self) -> impl Iterator<Item = &JackpotWinRecord> {
        self.history.iter()
    }

    /// Contribution recorded for one player since the last trigger.
    pub fn contribution_of(&self, player: u64) -> i64 {
        self.contributions.get(&player).copied().unwrap_or(0)
    }

    /// Decide what this wager does to the pool without mutating anything.
    ///
    /// A trigger is attempted only for eligible kills (`attempt`), fires iff
    /// the pool has reached its minimum and the probability draw passes, and
    /// suppresses the accumulation share for that wager. Otherwise the wager
    /// feeds `bet * rate` into the pool up to the configured cap.
    pub fn plan<R: Rng + ?Sized>(&self, rng: &mut R, bet: i64, attempt: bool) -> JackpotPlan {
        let win = if attempt
            && self.amount >= self.config.min_trigger
            && rng.gen::<f64>() < self.config.trigger_prob
        {
            let ratio = rng.gen_range(0.5..=1.0);
            Some((self.amount as f64 * ratio) as i64)
        } else {
            None
        };
        let accumulated = if win.is_some() {
            0
        } else {
            let share = (bet as f64 * self.config.rate) as i64;
            share.min((self.config.max_trigger - self.amount).max(0))
        };
        JackpotPlan { accumulated, win }
    }

    /// Apply a previously decided plan. Returns the hit when it triggered.
    pub fn apply(&mut self, plan: &JackpotPlan, player: u64, nickname: &str) -> Option<JackpotHit> {
        if let Some(win) = plan.win {
            let residual = self.amount - win;
            self.amount = residual + self.config.initial / 10;
            self.contributions.clear();
            let now = Utc::now();
            self.last_trigger = Some(now);
            self.history.push_front(JackpotWinRecord {
                user_id: player,
                nickname: nickname.to_string(),
                amount: win,
                at: now,
            });
            self.history.truncate(HISTORY_LIMIT);
            return Some(JackpotHit {
                win,
                pool_after: self.amount,
            });
        }
        if plan.accumulated > 0 {
            self.amount += plan.accumulated;
            *self.contributions.entry(player).or_insert(0) += plan.accumulated;
        }
        None
    }

    /// Feed a share of `bet` into the pool, capped at the configured maximum.
    /// Returns the amount actually added.
    pub fn accumulate(&mut self, bet: i64, player: u64) -> i64 {
        let share = (bet as f64 * self.config.rate) as i64;
        let plan = JackpotPlan {
            accumulated: share.min((self.config.max_trigger - self.amount).max(0)),
            win: None,
        };
        self.apply(&plan, player, "");
        plan.accumulated
    }

    /// Attempt a trigger outside the bet commit path.
    pub fn try_trigger<R: Rng + ?Sized>(
        &mut self,
        rng: &mut R,
        player: u64,
        nickname: &str,
    ) -> Option<JackpotHit> {
        let plan = self.plan(rng, 0, true);
        self.apply(&plan, player, nickname)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn config() -> JackpotConfig {
        JackpotConfig {
            initial: 1_000_000,
            rate: 0.01,
            min_trigger: 10_000_000,
            max_trigger: 50_000_000,
            trigger_prob: 1.0,
        }
    }

    #[test]
    fn accumulate_adds_rate_share() {
        let mut pool = JackpotPool::new(config());
        let added = pool.accumulate(10_000, 1);
        assert_eq!(added, 100);
        assert_eq!(pool.amount(), 1_000_100);
        assert_eq!(pool.contribution_of(1), 100);
    }

    #[test]
    fn accumulate_respects_cap() {
        let mut pool = JackpotPool::with_amount(config(), 49_999_950);
        let added = pool.accumulate(100_000, 1);
        assert_eq!(added, 50);
        assert_eq!(pool.amount(), 50_000_000);
        assert_eq!(pool.accumulate(100_000, 1), 0);
    }

    #[test]
    fn no_trigger_below_minimum() {
        let mut pool = JackpotPool::new(config());
        let mut rng = StdRng::seed_from_u64(1);
        assert!(pool.try_trigger(&mut rng, 1, "p").is_none());
    }

    #[test]
    fn trigger_pays_share_and_resets() {
        let mut pool = JackpotPool::with_amount(config(), 10_000_000);
        let mut rng = StdRng::seed_from_u64(42);
        let hit = pool.try_trigger(&mut rng, 9, "winner").expect("trigger");
        // Win is a uniform share in [0.5, 1.0] of the pool.
        assert!(hit.win >= 5_000_000 && hit.win <= 10_000_000);
        // Pool after = residual + a tenth of the initial seed.
        assert_eq!(hit.pool_after, 10_000_000 - hit.win + 100_000);
        assert_eq!(pool.amount(), hit.pool_after);
        // Exactly one history record appended.
        assert_eq!(pool.history().count(), 1);
        assert_eq!(pool.history().next().unwrap().amount, hit.win);
        assert_eq!(pool.contribution_of(9), 0);
        assert!(pool.last_trigger().is_some());
    }

    #[test]
    fn plan_does_not_mutate_until_applied() {
        let mut pool = JackpotPool::with_amount(config(), 10_000_000);
        let mut rng = StdRng::seed_from_u64(2);
        let plan = pool.plan(&mut rng, 50_000, true);
        assert_eq!(pool.amount(), 10_000_000);
        assert_eq!(pool.history().count(), 0);
        let hit = pool.apply(&plan, 4, "p");
        match plan.win {
            Some(win) => {
                assert_eq!(hit.unwrap().win, win);
                assert_eq!(plan.pool_delta(), -win);
            }
            None => {
                assert_eq!(pool.amount(), 10_000_000 + plan.accumulated);
                assert_eq!(plan.pool_delta(), plan.accumulated);
            }
        }
    }

    #[test]
    fn trigger_suppresses_accumulation() {
        let pool = JackpotPool::with_amount(config(), 10_000_000);
        let mut rng = StdRng::seed_from_u64(3);
        let plan = pool.plan(&mut rng, 1_000_000, true);
        assert!(plan.win.is_some());
        assert_eq!(plan.accumulated, 0);
    }

    #[test]
    fn trigger_probability_zero_never_fires() {
        let mut cfg = config();
        cfg.trigger_prob = 0.0;
        let mut pool = JackpotPool::with_amount(cfg, 20_000_000);
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..100 {
            assert!(pool.try_trigger(&mut rng, 1, "p").is_none());
        }
    }

    #[test]
    fn history_is_bounded() {
        let mut pool = JackpotPool::with_amount(config(), 10_000_000);
        let mut rng = StdRng::seed_from_u64(3);
        for i in 0..60 {
            // Refill above the minimum so every attempt can fire.
            pool.amount = 10_000_000;
            pool.try_trigger(&mut rng, i, "p").expect("trigger");
        }
        assert_eq!(pool.history().count(), HISTORY_LIMIT);
    }
}
