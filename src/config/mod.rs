//! # Configuration Management Module
//!
//! Centralized configuration for the game server: type-safe sections with
//! serde, sensible defaults, validation on load, and hot reloading.
//!
//! ## Configuration Structure
//!
//! - [`ServerConfig`] - listen address, timeouts, run mode
//! - [`DatabaseConfig`] - embedded store driver and location
//! - [`SecurityConfig`] - JWT parameters consumed by the auth surface
//! - [`SerialConfig`] - coin acceptor / button board link
//! - [`LoggingConfig`] - level and optional file sinks
//! - [`SystemConfig`] - timezone and scheduler width
//! - [`GamesConfig`] - animal and slot game tunables
//!
//! ## Hot Reloading
//!
//! [`Config::spawn_watcher`] polls the config file's mtime and publishes each
//! successfully parsed revision over a `tokio::sync::watch` channel. A file
//! that fails to parse or validate is logged and the previous revision kept.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::sync::watch;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Seconds a connection may stay silent before the read deadline fires.
    pub read_timeout: u64,
    /// Seconds allowed for a single outbound frame write.
    pub write_timeout: u64,
    /// Seconds granted to in-flight tasks during graceful shutdown.
    pub shutdown_timeout: u64,
    /// "debug" or "release"; debug mode logs full frame dumps.
    pub mode: String,
    /// Minutes of inactivity before an idle session is reclaimed.
    #[serde(default = "default_session_timeout")]
    pub session_timeout: u32,
}

fn default_session_timeout() -> u32 {
    30
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Only "sled" ships in the embedded deployment; the field exists so an
    /// online deployment can select its own adapter.
    pub driver: String,
    /// Filesystem path for the embedded store.
    pub dsn: String,
    pub auto_migrate: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct JwtConfig {
    pub secret: String,
    pub expire_hours: u32,
    pub refresh_hours: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SecurityConfig {
    #[serde(default)]
    pub jwt: JwtConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerialPortConfig {
    pub port: String,
    pub baud_rate: u32,
}

impl Default for SerialPortConfig {
    fn default() -> Self {
        Self {
            port: String::new(),
            baud_rate: 115200,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerialConfig {
    pub enabled: bool,
    /// Replace the device with a scripted event generator.
    #[serde(default)]
    pub mock_mode: bool,
    #[serde(default)]
    pub stm32: SerialPortConfig,
    #[serde(default)]
    pub acm: SerialPortConfig,
    /// Wallet credited by physical coin events; 0 means log only.
    #[serde(default)]
    pub cabinet_user: u64,
    /// Balance units per physical coin.
    #[serde(default = "default_coin_value")]
    pub coin_value: i64,
}

fn default_coin_value() -> i64 {
    100
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            mock_mode: false,
            stm32: SerialPortConfig::default(),
            acm: SerialPortConfig::default(),
            cabinet_user: 0,
            coin_value: default_coin_value(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub file: Option<String>,
    #[serde(default)]
    pub security_file: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemConfig {
    pub timezone: String,
    /// 0 lets the runtime size its worker pool from the host.
    pub max_procs: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JackpotConfig {
    /// Pool amount seeded at first start, in coins.
    pub initial: i64,
    /// Fraction of each wager accumulated into the pool.
    pub rate: f64,
    /// Pool must reach this before a trigger is possible.
    pub min_trigger: i64,
    /// Accumulation stops at this cap.
    pub max_trigger: i64,
    /// Per-eligible-wager probability of a trigger attempt succeeding.
    pub trigger_prob: f64,
}

impl Default for JackpotConfig {
    fn default() -> Self {
        Self {
            initial: 1_000_000,
            rate: 0.01,
            min_trigger: 10_000_000,
            max_trigger: 50_000_000,
            trigger_prob: 0.001,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnimalConfig {
    /// Base probability that a bet hits its target.
    pub hit_frequency: f64,
    /// Whether eligible animals may carry a red bag. Payout code is live
    /// either way; this gates only the flag at generation time.
    #[serde(default)]
    pub red_bag_enabled: bool,
    /// Daily free-play grant on first room entry, in coins. 0 disables.
    #[serde(default)]
    pub free_gold_daily: i64,
    #[serde(default)]
    pub jackpot: JackpotConfig,
}

impl Default for AnimalConfig {
    fn default() -> Self {
        Self {
            hit_frequency: 0.5,
            red_bag_enabled: false,
            free_gold_daily: 0,
            jackpot: JackpotConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlotConfig {
    pub bet_values: Vec<i64>,
    #[serde(default)]
    pub jackpot: JackpotConfig,
}

impl Default for SlotConfig {
    fn default() -> Self {
        Self {
            bet_values: vec![100, 200, 500, 1000],
            jackpot: JackpotConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct GamesConfig {
    #[serde(default)]
    pub animal: AnimalConfig,
    #[serde(default)]
    pub slot: SlotConfig,
}

/// Main configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    #[serde(default)]
    pub security: SecurityConfig,
    #[serde(default)]
    pub serial: SerialConfig,
    pub logging: LoggingConfig,
    pub system: SystemConfig,
    #[serde(default)]
    pub games: GamesConfig,
}

impl Config {
    /// Load configuration from a file and validate it.
    pub async fn load(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| anyhow!("Failed to read config file {}: {}", path, e))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| anyhow!("Failed to parse config file {}: {}", path, e))?;

        config.validate()?;
        Ok(config)
    }

    /// Create a default configuration file.
    pub async fn create_default(path: &str) -> Result<()> {
        let config = Config::default();
        let content = toml::to_string_pretty(&config)
            .map_err(|e| anyhow!("Failed to serialize default config: {}", e))?;

        fs::write(path, content)
            .await
            .map_err(|e| anyhow!("Failed to write config file {}: {}", path, e))?;

        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(anyhow!("server.port must be non-zero"));
        }
        if self.server.session_timeout == 0 {
            return Err(anyhow!("server.session_timeout must be at least 1 minute"));
        }
        if self.database.dsn.is_empty() {
            return Err(anyhow!("database.dsn must point at a store path"));
        }
        let animal = &self.games.animal;
        if !(0.0..=1.0).contains(&animal.hit_frequency) || animal.hit_frequency == 0.0 {
            return Err(anyhow!("games.animal.hit_frequency must be in (0, 1]"));
        }
        for (label, jp) in [
            ("games.animal.jackpot", &animal.jackpot),
            ("games.slot.jackpot", &self.games.slot.jackpot),
        ] {
            if !(0.0..1.0).contains(&jp.rate) {
                return Err(anyhow!("{}.rate must be in [0, 1)", label));
            }
            if !(0.0..=1.0).contains(&jp.trigger_prob) {
                return Err(anyhow!("{}.trigger_prob must be in [0, 1]", label));
            }
            if jp.min_trigger > jp.max_trigger {
                return Err(anyhow!("{}.min_trigger exceeds max_trigger", label));
            }
        }
        if self.games.slot.bet_values.is_empty() {
            return Err(anyhow!("games.slot.bet_values must not be empty"));
        }
        if self.serial.enabled && !self.serial.mock_mode && self.serial.stm32.port.is_empty() {
            return Err(anyhow!(
                "serial.enabled requires serial.stm32.port (or serial.mock_mode)"
            ));
        }
        Ok(())
    }

    /// Spawn the hot-reload watcher. Polls the file's mtime every 5 seconds;
    /// each revision that parses and validates is published to subscribers.
    pub fn spawn_watcher(
        path: impl Into<PathBuf>,
        tx: watch::Sender<Arc<Config>>,
        mut shutdown: watch::Receiver<bool>,
    ) -> tokio::task::JoinHandle<()> {
        let path = path.into();
        tokio::spawn(async move {
            let mut last_mtime = std::fs::metadata(&path).and_then(|m| m.modified()).ok();
            let mut ticker = tokio::time::interval(Duration::from_secs(5));
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                        continue;
                    }
                }
                let mtime = match std::fs::metadata(&path).and_then(|m| m.modified()) {
                    Ok(t) => t,
                    Err(e) => {
                        warn!("config watcher: cannot stat {}: {}", path.display(), e);
                        continue;
                    }
                };
                if last_mtime == Some(mtime) {
                    continue;
                }
                last_mtime = Some(mtime);
                match Config::load(&path.to_string_lossy()).await {
                    Ok(fresh) => {
                        info!("config reloaded from {}", path.display());
                        let _ = tx.send(Arc::new(fresh));
                    }
                    Err(e) => {
                        warn!("config reload failed, keeping previous revision: {}", e);
                    }
                }
            }
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8600,
                read_timeout: 60,
                write_timeout: 10,
                shutdown_timeout: 15,
                mode: "release".to_string(),
                session_timeout: 30,
            },
            database: DatabaseConfig {
                driver: "sled".to_string(),
                dsn: "./data/store".to_string(),
                auto_migrate: true,
            },
            security: SecurityConfig::default(),
            serial: SerialConfig::default(),
            logging: LoggingConfig {
                level: "info".to_string(),
                file: Some("menagerie.log".to_string()),
                security_file: None,
            },
            system: SystemConfig {
                timezone: "UTC".to_string(),
                max_procs: 0,
            },
            games: GamesConfig::default(),
        }
    }
}
