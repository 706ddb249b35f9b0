//! Player wallets and durable game records.
//!
//! The gateway operations here are the only storage surface the game logic
//! touches: debit, credit, stats adjustment, lookup, and the single-transaction
//! bet commit that joins all of them with a game-result insert and the jackpot
//! pool adjustment. The embedded deployment backs them with sled; an online
//! deployment can supply another adapter behind the same calls.

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

pub mod store;

pub use store::{WalletStore, WalletStoreBuilder};

pub const USER_SCHEMA_VERSION: u8 = 1;
pub const WALLET_SCHEMA_VERSION: u8 = 1;
pub const RESULT_SCHEMA_VERSION: u8 = 1;
pub const TRANSACTION_SCHEMA_VERSION: u8 = 1;

/// One row per player, created lazily on first contact and never deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRecord {
    pub user_id: u64,
    pub nickname: String,
    pub avatar: u32,
    pub vip: u8,
    pub created_at: DateTime<Utc>,
    pub schema_version: u8,
}

/// Balance, free-play gold and cumulative statistics for one player.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletRecord {
    pub user_id: u64,
    /// Cash balance in integer coins.
    pub balance: i64,
    /// Gold converted from red bags and jackpot payouts.
    pub coins: i64,
    /// Free-play balance granted daily.
    pub free_coins: i64,
    pub total_bet: i64,
    pub total_win: i64,
    /// Physical coins inserted through the hardware bridge.
    pub coins_in: i64,
    /// Physical coins paid back out.
    pub coins_out: i64,
    /// Owned skill inventory keyed by skill id.
    pub skills: HashMap<u8, u32>,
    /// UTC day of the last free-gold grant.
    pub last_free_grant: Option<NaiveDate>,
    pub updated_at: DateTime<Utc>,
    pub schema_version: u8,
}

impl WalletRecord {
    pub fn new(user_id: u64, balance: i64) -> Self {
        Self {
            user_id,
            balance,
            coins: 0,
            free_coins: 0,
            total_bet: 0,
            total_win: 0,
            coins_in: 0,
            coins_out: 0,
            skills: HashMap::new(),
            last_free_grant: None,
            updated_at: Utc::now(),
            schema_version: WALLET_SCHEMA_VERSION,
        }
    }
}

/// One row per resolved wager.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameResultRecord {
    pub round_id: String,
    pub user_id: u64,
    /// Which game produced the row.
    pub game: GameId,
    pub bet: i64,
    pub win: i64,
    pub multiplier: u32,
    pub played_at: DateTime<Utc>,
    pub is_jackpot: bool,
    pub schema_version: u8,
}

/// Ledger row for every balance movement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub user_id: u64,
    pub kind: TransactionKind,
    pub amount: i64,
    pub balance_after: i64,
    pub at: DateTime<Utc>,
    pub schema_version: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionKind {
    Debit,
    Credit,
    CoinIn,
    CoinOut,
    FreeGrant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GameId {
    Animal,
    Slot,
}

impl GameId {
    pub fn key(self) -> &'static str {
        match self {
            GameId::Animal => "animal",
            GameId::Slot => "slot",
        }
    }
}

/// Durable jackpot trigger row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JackpotWinRecord {
    pub user_id: u64,
    pub nickname: String,
    pub amount: i64,
    pub at: DateTime<Utc>,
}

/// The atomic unit for one resolved wager: everything in here commits or
/// rolls back together.
#[derive(Debug, Clone)]
pub struct BetCommit {
    pub user_id: u64,
    pub game: GameId,
    /// Stake to debit now; zero when a fired bullet already paid it.
    pub stake: i64,
    /// Total credit: win plus gold plus any jackpot payout.
    pub payout: i64,
    /// Stake recorded in the result row and statistics (the full `a * m`,
    /// regardless of bullet prepayment).
    pub bet_recorded: i64,
    pub win_recorded: i64,
    pub multiplier: u32,
    pub is_jackpot: bool,
    /// Gold beans credited from red-bag conversion.
    pub gold_delta: i64,
    /// Signed adjustment to the persisted jackpot pool: the accumulation
    /// share minus any triggered payout.
    pub jackpot_delta: i64,
    /// Present when this wager triggered the jackpot.
    pub jackpot_win: Option<JackpotWinRecord>,
}

/// Wallet state after a successful commit.
#[derive(Debug, Clone)]
pub struct CommitOutcome {
    pub wallet: WalletRecord,
    pub round_id: String,
}
