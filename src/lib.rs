//! # Menagerie - Real-Time Arcade Game Server
//!
//! Menagerie hosts two coupled mini-games over a binary WebSocket protocol:
//! a moving-target wagering game played in dynamically sharded rooms, and a
//! slot surface whose cascade algorithm is an external collaborator. Player
//! wallets, game results and the shared progressive jackpot persist in an
//! embedded store; an optional serial bridge ingests coin-acceptor and
//! button-board events.
//!
//! ## Module Organization
//!
//! - [`protocol`] - binary frame codec (client, server and legacy framings)
//! - [`proto`] - generated payload message types
//! - [`net`] - WebSocket listener, per-connection tasks, session store
//! - [`router`] - command-id dispatch and capability gating
//! - [`push`] - room-scoped broadcast fan-out
//! - [`game`] - animal rooms, wager resolution, slot surface, jackpot engine
//! - [`wallet`] - transactional wallet gateway over the embedded store
//! - [`recovery`] - persisted session snapshots and expiry
//! - [`hardware`] - serial coin/button bridge with backoff reconnect
//! - [`config`] - hierarchical TOML configuration with hot reload
//! - [`errors`] - the error taxonomy and wire code mapping
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use menagerie::config::Config;
//! use menagerie::server::GameServer;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config.toml").await?;
//!     let server = GameServer::new(config, "config.toml").await?;
//!     server.run().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Concurrency Model
//!
//! Each connection owns exactly two cooperative tasks (reader and writer)
//! joined by a bounded send queue. Each room owns one 1 Hz tick task. A bet
//! holds its room's lock for the whole resolver call, so wagers within a
//! room serialize while rooms stay independent. The wallet commit for one
//! bet is a single store transaction; the jackpot pool mutex spans the
//! decide-commit-apply triple so the pool can never be double-spent.

pub mod config;
pub mod errors;
pub mod game;
pub mod hardware;
pub mod net;
pub mod proto;
pub mod protocol;
pub mod push;
pub mod recovery;
pub mod router;
pub mod server;
pub mod wallet;
