use std::path::{Path, PathBuf};

use chrono::{NaiveDate, Utc};
use log::info;
use sled::transaction::{ConflictableTransactionError, TransactionError, Transactional};
use sled::IVec;

use crate::errors::GameError;
use crate::wallet::{
    BetCommit, CommitOutcome, GameId, GameResultRecord, JackpotWinRecord, TransactionKind,
    TransactionRecord, UserRecord, WalletRecord, RESULT_SCHEMA_VERSION,
    TRANSACTION_SCHEMA_VERSION, USER_SCHEMA_VERSION,
};

const TREE_USERS: &str = "users";
const TREE_WALLETS: &str = "wallets";
const TREE_GAMES: &str = "games";
const TREE_RESULTS: &str = "game_results";
const TREE_TRANSACTIONS: &str = "transactions";
const TREE_JACKPOTS: &str = "jackpots";

/// Starting balance for a wallet created on first contact.
const NEW_PLAYER_BALANCE: i64 = 50_000;

fn now_nanos() -> i64 {
    let now = Utc::now();
    now.timestamp_nanos_opt()
        .unwrap_or_else(|| now.timestamp_micros() * 1000)
}

/// Reasons a bet commit aborts without touching any tree.
#[derive(Debug)]
enum CommitAbort {
    InsufficientFunds,
    Corrupt(String),
}

/// Helper builder so tests can easily create throwaway stores with custom paths.
pub struct WalletStoreBuilder {
    path: PathBuf,
    seed_games: bool,
}

impl WalletStoreBuilder {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            seed_games: true,
        }
    }

    /// Opt out of seeding the game registry rows (useful for targeted tests).
    pub fn without_game_seed(mut self) -> Self {
        self.seed_games = false;
        self
    }

    pub fn open(self) -> Result<WalletStore, GameError> {
        WalletStore::open_with_options(self.path, self.seed_games)
    }
}

/// Sled-backed persistence for wallets, results and the jackpot ledger.
///
/// Cheap to clone: all internal sled handles are Arc-based, so clones share
/// the same underlying database without lock conflicts.
#[derive(Clone)]
pub struct WalletStore {
    db: sled::Db,
    users: sled::Tree,
    wallets: sled::Tree,
    games: sled::Tree,
    results: sled::Tree,
    transactions: sled::Tree,
    jackpots: sled::Tree,
}

impl WalletStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, GameError> {
        Self::open_with_options(path.as_ref().to_path_buf(), true)
    }

    fn open_with_options(path: PathBuf, seed_games: bool) -> Result<Self, GameError> {
        std::fs::create_dir_all(&path)?;
        let db = sled::open(&path).map_err(|e| GameError::DbConnect(e.to_string()))?;
        let users = db.open_tree(TREE_USERS)?;
        let wallets = db.open_tree(TREE_WALLETS)?;
        let games = db.open_tree(TREE_GAMES)?;
        let results = db.open_tree(TREE_RESULTS)?;
        let transactions = db.open_tree(TREE_TRANSACTIONS)?;
        let jackpots = db.open_tree(TREE_JACKPOTS)?;

        let store = Self {
            db,
            users,
            wallets,
            games,
            results,
            transactions,
            jackpots,
        };

        if seed_games {
            store.seed_games_if_needed()?;
        }

        Ok(store)
    }

    /// Underlying database handle, shared with the recovery manager so
    /// persisted sessions live in the same store file.
    pub fn db(&self) -> &sled::Db {
        &self.db
    }

    fn seed_games_if_needed(&self) -> Result<(), GameError> {
        for game in [GameId::Animal, GameId::Slot] {
            let key = game.key().as_bytes();
            if self.games.get(key)?.is_none() {
                self.games.insert(key, Self::serialize(&game)?)?;
                info!("seeded game registry row: {}", game.key());
            }
        }
        Ok(())
    }

    fn user_key(user_id: u64) -> Vec<u8> {
        format!("u:{:020}", user_id).into_bytes()
    }

    fn result_key(user_id: u64, nanos: i64, round_id: &str) -> Vec<u8> {
        format!("{:020}:{:020}:{}", user_id, nanos, round_id).into_bytes()
    }

    fn result_prefix(user_id: u64) -> Vec<u8> {
        format!("{:020}:", user_id).into_bytes()
    }

    fn transaction_key(user_id: u64, nanos: i64) -> Vec<u8> {
        format!("{:020}:{:020}", user_id, nanos).into_bytes()
    }

    fn jackpot_pool_key(game: GameId) -> Vec<u8> {
        format!("pool:{}", game.key()).into_bytes()
    }

    fn jackpot_win_key(game: GameId, nanos: i64) -> Vec<u8> {
        format!("win:{}:{:020}", game.key(), nanos).into_bytes()
    }

    fn serialize<T: serde::Serialize>(value: &T) -> Result<Vec<u8>, GameError> {
        Ok(bincode::serialize(value)?)
    }

    fn deserialize<T: serde::de::DeserializeOwned>(bytes: IVec) -> Result<T, GameError> {
        Ok(bincode::deserialize::<T>(&bytes)?)
    }

    /// Fetch the user row, creating user and wallet lazily on first contact.
    pub fn get_or_create_user(
        &self,
        user_id: u64,
        nickname: &str,
    ) -> Result<(UserRecord, WalletRecord), GameError> {
        let key = Self::user_key(user_id);
        let user = match self.users.get(&key)? {
            Some(bytes) => Self::deserialize(bytes)?,
            None => {
                let user = UserRecord {
                    user_id,
                    nickname: nickname.to_string(),
                    avatar: 0,
                    vip: 0,
                    created_at: Utc::now(),
                    schema_version: USER_SCHEMA_VERSION,
                };
                self.users.insert(key.clone(), Self::serialize(&user)?)?;
                info!("created user {} ({})", user_id, nickname);
                user
            }
        };
        let wallet = match self.wallets.get(&key)? {
            Some(bytes) => Self::deserialize(bytes)?,
            None => {
                let wallet = WalletRecord::new(user_id, NEW_PLAYER_BALANCE);
                self.wallets.insert(key, Self::serialize(&wallet)?)?;
                wallet
            }
        };
        Ok((user, wallet))
    }

    pub fn get_user(&self, user_id: u64) -> Result<UserRecord, GameError> {
        match self.users.get(Self::user_key(user_id))? {
            Some(bytes) => Self::deserialize(bytes),
            None => Err(GameError::NotFound(format!("user {}", user_id))),
        }
    }

    /// Current balance and coins for a player.
    pub fn get_by_user_id(&self, user_id: u64) -> Result<WalletRecord, GameError> {
        match self.wallets.get(Self::user_key(user_id))? {
            Some(bytes) => Self::deserialize(bytes),
            None => Err(GameError::NotFound(format!("wallet {}", user_id))),
        }
    }

    /// Debit `amount` from the player's balance. Fails without touching the
    /// row when the balance is short.
    pub fn debit(&self, user_id: u64, amount: i64) -> Result<WalletRecord, GameError> {
        self.adjust(user_id, -amount, TransactionKind::Debit)
    }

    /// Credit `amount` to the player's balance.
    pub fn credit(&self, user_id: u64, amount: i64) -> Result<WalletRecord, GameError> {
        self.adjust(user_id, amount, TransactionKind::Credit)
    }

    fn adjust(
        &self,
        user_id: u64,
        delta: i64,
        kind: TransactionKind,
    ) -> Result<WalletRecord, GameError> {
        let key = Self::user_key(user_id);
        let result = (&self.wallets, &self.transactions).transaction(|(wallets, txns)| {
            let bytes = wallets
                .get(key.as_slice())?
                .ok_or_else(|| abort_corrupt(format!("wallet {} missing", user_id)))?;
            let mut wallet: WalletRecord = decode_in_txn(bytes)?;
            if wallet.balance + delta < 0 {
                return Err(ConflictableTransactionError::Abort(
                    CommitAbort::InsufficientFunds,
                ));
            }
            wallet.balance += delta;
            wallet.updated_at = Utc::now();
            wallets.insert(key.as_slice(), encode_in_txn(&wallet)?)?;

            let nanos = now_nanos();
            let row = TransactionRecord {
                user_id,
                kind,
                amount: delta.abs(),
                balance_after: wallet.balance,
                at: wallet.updated_at,
                schema_version: TRANSACTION_SCHEMA_VERSION,
            };
            txns.insert(Self::transaction_key(user_id, nanos), encode_in_txn(&row)?)?;
            Ok(wallet)
        });
        map_txn_result(result)
    }

    /// Atomic adjustment of statistics alongside balance. `coins_in` and
    /// `coins_out` arrive from the hardware bridge; `bet`/`win` from games.
    pub fn update_game_stats(
        &self,
        user_id: u64,
        bet: i64,
        win: i64,
        coins_in: i64,
        coins_out: i64,
    ) -> Result<WalletRecord, GameError> {
        let key = Self::user_key(user_id);
        let result = (&self.wallets, &self.transactions).transaction(|(wallets, txns)| {
            let bytes = wallets
                .get(key.as_slice())?
                .ok_or_else(|| abort_corrupt(format!("wallet {} missing", user_id)))?;
            let mut wallet: WalletRecord = decode_in_txn(bytes)?;
            wallet.total_bet += bet;
            wallet.total_win += win;
            wallet.coins_in += coins_in;
            wallet.coins_out += coins_out;
            wallet.balance += coins_in - coins_out;
            if wallet.balance < 0 {
                return Err(ConflictableTransactionError::Abort(
                    CommitAbort::InsufficientFunds,
                ));
            }
            wallet.updated_at = Utc::now();
            wallets.insert(key.as_slice(), encode_in_txn(&wallet)?)?;
            if coins_in > 0 {
                let row = TransactionRecord {
                    user_id,
                    kind: TransactionKind::CoinIn,
                    amount: coins_in,
                    balance_after: wallet.balance,
                    at: wallet.updated_at,
                    schema_version: TRANSACTION_SCHEMA_VERSION,
                };
                txns.insert(
                    Self::transaction_key(user_id, now_nanos()),
                    encode_in_txn(&row)?,
                )?;
            }
            if coins_out > 0 {
                let row = TransactionRecord {
                    user_id,
                    kind: TransactionKind::CoinOut,
                    amount: coins_out,
                    balance_after: wallet.balance,
                    at: wallet.updated_at,
                    schema_version: TRANSACTION_SCHEMA_VERSION,
                };
                txns.insert(
                    Self::transaction_key(user_id, now_nanos()),
                    encode_in_txn(&row)?,
                )?;
            }
            Ok(wallet)
        });
        map_txn_result(result)
    }

    /// Commit one resolved wager. Debit, credit, statistics, the game-result
    /// row and the jackpot pool adjustment land together or not at all.
    pub fn commit_bet(&self, commit: &BetCommit) -> Result<CommitOutcome, GameError> {
        let key = Self::user_key(commit.user_id);
        let round_id = uuid::Uuid::new_v4().to_string();
        let pool_key = Self::jackpot_pool_key(commit.game);

        let result = (
            &self.wallets,
            &self.results,
            &self.transactions,
            &self.jackpots,
        )
            .transaction(|(wallets, results, txns, jackpots)| {
                let bytes = wallets
                    .get(key.as_slice())?
                    .ok_or_else(|| abort_corrupt(format!("wallet {} missing", commit.user_id)))?;
                let mut wallet: WalletRecord = decode_in_txn(bytes)?;
                if wallet.balance < commit.stake {
                    return Err(ConflictableTransactionError::Abort(
                        CommitAbort::InsufficientFunds,
                    ));
                }
                let now = Utc::now();
                let nanos = now_nanos();

                wallet.balance -= commit.stake;
                wallet.balance += commit.payout;
                wallet.coins += commit.gold_delta;
                if let Some(win) = &commit.jackpot_win {
                    wallet.coins += win.amount;
                }
                wallet.total_bet += commit.bet_recorded;
                wallet.total_win += commit.win_recorded;
                wallet.updated_at = now;
                wallets.insert(key.as_slice(), encode_in_txn(&wallet)?)?;

                if commit.stake > 0 {
                    let row = TransactionRecord {
                        user_id: commit.user_id,
                        kind: TransactionKind::Debit,
                        amount: commit.stake,
                        balance_after: wallet.balance - commit.payout,
                        at: now,
                        schema_version: TRANSACTION_SCHEMA_VERSION,
                    };
                    txns.insert(
                        Self::transaction_key(commit.user_id, nanos),
                        encode_in_txn(&row)?,
                    )?;
                }
                if commit.payout > 0 {
                    let row = TransactionRecord {
                        user_id: commit.user_id,
                        kind: TransactionKind::Credit,
                        amount: commit.payout,
                        balance_after: wallet.balance,
                        at: now,
                        schema_version: TRANSACTION_SCHEMA_VERSION,
                    };
                    txns.insert(
                        Self::transaction_key(commit.user_id, nanos + 1),
                        encode_in_txn(&row)?,
                    )?;
                }

                let record = GameResultRecord {
                    round_id: round_id.clone(),
                    user_id: commit.user_id,
                    game: commit.game,
                    bet: commit.bet_recorded,
                    win: commit.win_recorded,
                    multiplier: commit.multiplier,
                    played_at: now,
                    is_jackpot: commit.is_jackpot,
                    schema_version: RESULT_SCHEMA_VERSION,
                };
                results.insert(
                    Self::result_key(commit.user_id, nanos, &round_id),
                    encode_in_txn(&record)?,
                )?;

                if commit.jackpot_delta != 0 {
                    let current: i64 = match jackpots.get(pool_key.as_slice())? {
                        Some(bytes) => decode_in_txn(bytes)?,
                        None => 0,
                    };
                    jackpots.insert(
                        pool_key.as_slice(),
                        encode_in_txn(&(current + commit.jackpot_delta))?,
                    )?;
                }
                if let Some(win) = &commit.jackpot_win {
                    jackpots.insert(
                        Self::jackpot_win_key(commit.game, nanos),
                        encode_in_txn(win)?,
                    )?;
                }

                Ok(wallet)
            });

        let wallet = map_txn_result(result)?;
        Ok(CommitOutcome { wallet, round_id })
    }

    /// Most recent game results for a player, newest first.
    pub fn recent_results(
        &self,
        user_id: u64,
        limit: usize,
    ) -> Result<Vec<GameResultRecord>, GameError> {
        let mut out = Vec::with_capacity(limit);
        for item in self.results.scan_prefix(Self::result_prefix(user_id)).rev() {
            let (_, bytes) = item?;
            out.push(Self::deserialize(bytes)?);
            if out.len() >= limit {
                break;
            }
        }
        Ok(out)
    }

    /// Persisted jackpot pool amount, seeding `initial` on first access.
    pub fn load_jackpot_pool(&self, game: GameId, initial: i64) -> Result<i64, GameError> {
        let key = Self::jackpot_pool_key(game);
        match self.jackpots.get(&key)? {
            Some(bytes) => Self::deserialize(bytes),
            None => {
                self.jackpots.insert(key, Self::serialize(&initial)?)?;
                Ok(initial)
            }
        }
    }

    /// Recent jackpot trigger rows for a game, newest first.
    pub fn jackpot_history(
        &self,
        game: GameId,
        limit: usize,
    ) -> Result<Vec<JackpotWinRecord>, GameError> {
        let prefix = format!("win:{}:", game.key()).into_bytes();
        let mut out = Vec::with_capacity(limit);
        for item in self.jackpots.scan_prefix(prefix).rev() {
            let (_, bytes) = item?;
            out.push(Self::deserialize(bytes)?);
            if out.len() >= limit {
                break;
            }
        }
        Ok(out)
    }

    /// Grant the daily free-gold amount at most once per UTC day.
    /// Returns the granted amount, or None when today's grant already ran.
    pub fn grant_free_gold(
        &self,
        user_id: u64,
        amount: i64,
        today: NaiveDate,
    ) -> Result<Option<i64>, GameError> {
        if amount <= 0 {
            return Ok(None);
        }
        let key = Self::user_key(user_id);
        let result = (&self.wallets, &self.transactions).transaction(|(wallets, txns)| {
            let bytes = wallets
                .get(key.as_slice())?
                .ok_or_else(|| abort_corrupt(format!("wallet {} missing", user_id)))?;
            let mut wallet: WalletRecord = decode_in_txn(bytes)?;
            if wallet.last_free_grant == Some(today) {
                return Ok(None);
            }
            wallet.free_coins += amount;
            wallet.last_free_grant = Some(today);
            wallet.updated_at = Utc::now();
            wallets.insert(key.as_slice(), encode_in_txn(&wallet)?)?;
            let row = TransactionRecord {
                user_id,
                kind: TransactionKind::FreeGrant,
                amount,
                balance_after: wallet.balance,
                at: wallet.updated_at,
                schema_version: TRANSACTION_SCHEMA_VERSION,
            };
            txns.insert(
                Self::transaction_key(user_id, now_nanos()),
                encode_in_txn(&row)?,
            )?;
            Ok(Some(amount))
        });
        map_txn_result(result)
    }

    /// Add `count` of a purchasable skill to the player's inventory.
    pub fn add_skill(&self, user_id: u64, skill: u8, count: u32) -> Result<WalletRecord, GameError> {
        self.mutate_wallet(user_id, |wallet| {
            *wallet.skills.entry(skill).or_insert(0) += count;
            true
        })
    }

    /// Consume one charge of a skill. Fails when none are owned.
    pub fn consume_skill(&self, user_id: u64, skill: u8) -> Result<WalletRecord, GameError> {
        self.mutate_wallet(user_id, |wallet| match wallet.skills.get_mut(&skill) {
            Some(count) if *count > 0 => {
                *count -= 1;
                true
            }
            _ => false,
        })
    }

    fn mutate_wallet(
        &self,
        user_id: u64,
        mutate: impl Fn(&mut WalletRecord) -> bool,
    ) -> Result<WalletRecord, GameError> {
        let key = Self::user_key(user_id);
        let result = self.wallets.transaction(|wallets| {
            let bytes = wallets
                .get(key.as_slice())?
                .ok_or_else(|| abort_corrupt(format!("wallet {} missing", user_id)))?;
            let mut wallet: WalletRecord = decode_in_txn(bytes)?;
            if !mutate(&mut wallet) {
                return Err(ConflictableTransactionError::Abort(
                    CommitAbort::InsufficientFunds,
                ));
            }
            wallet.updated_at = Utc::now();
            wallets.insert(key.as_slice(), encode_in_txn(&wallet)?)?;
            Ok(wallet)
        });
        map_txn_result(result)
    }

    pub fn flush(&self) -> Result<(), GameError> {
        self.db.flush()?;
        Ok(())
    }
}

fn abort_corrupt(msg: String) -> ConflictableTransactionError<CommitAbort> {
    ConflictableTransactionError::Abort(CommitAbort::Corrupt(msg))
}

fn encode_in_txn<T: serde::Serialize>(
    value: &T,
) -> Result<Vec<u8>, ConflictableTransactionError<CommitAbort>> {
    bincode::serialize(value)
        .map_err(|e| ConflictableTransactionError::Abort(CommitAbort::Corrupt(e.to_string())))
}

fn decode_in_txn<T: serde::de::DeserializeOwned>(
    bytes: IVec,
) -> Result<T, ConflictableTransactionError<CommitAbort>> {
    bincode::deserialize::<T>(&bytes)
        .map_err(|e| ConflictableTransactionError::Abort(CommitAbort::Corrupt(e.to_string())))
}

fn map_txn_result<T>(result: Result<T, TransactionError<CommitAbort>>) -> Result<T, GameError> {
    match result {
        Ok(value) => Ok(value),
        Err(TransactionError::Abort(CommitAbort::InsufficientFunds)) => {
            Err(GameError::InsufficientCoins)
        }
        Err(TransactionError::Abort(CommitAbort::Corrupt(msg))) => {
            Err(GameError::DataIntegrity(Box::new(bincode::ErrorKind::Custom(
                msg,
            ))))
        }
        Err(TransactionError::Storage(e)) => Err(GameError::DbTransaction(e.to_string())),
    }
}
