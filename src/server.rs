//! Server assembly and lifecycle.
//!
//! Builds every service against the loaded config, runs the accept loop and
//! the background tasks (room event fan-out, periodic sweeps, jackpot
//! pushes, hardware events, config watcher), and coordinates graceful
//! shutdown: signals flip the root watch channel, every task observes it,
//! and the process waits up to `server.shutdown_timeout` before exiting.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result};
use log::{error, info, warn};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;

use crate::config::Config;
use crate::game::animal::bullets::BulletRegistry;
use crate::game::animal::room::{RoomEvent, RoomManager};
use crate::game::jackpot::JackpotPool;
use crate::game::slot::ReelEngine;
use crate::game::GameContext;
use crate::hardware::{self, HardwareEvent};
use crate::net;
use crate::net::session::SessionStore;
use crate::proto;
use crate::protocol::cmd;
use crate::push::PushManager;
use crate::recovery::RecoveryManager;
use crate::wallet::{GameId, WalletStore};

/// Cadence of the jackpot-amount push to subscribed rooms.
const JACKPOT_PUSH_INTERVAL: Duration = Duration::from_secs(30);
/// Cadence of the housekeeping sweep (idle sessions, rooms, bullets).
const HOUSEKEEPING_INTERVAL: Duration = Duration::from_secs(30);

pub struct GameServer {
    ctx: Arc<GameContext>,
    config_path: String,
    config_tx: watch::Sender<Arc<Config>>,
    shutdown_tx: watch::Sender<bool>,
    room_events_rx: Option<mpsc::UnboundedReceiver<(u32, RoomEvent)>>,
}

impl GameServer {
    pub async fn new(config: Config, config_path: &str) -> Result<Self> {
        let config = Arc::new(config);
        let (config_tx, config_rx) = watch::channel(config.clone());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (room_events_tx, room_events_rx) = mpsc::unbounded_channel();

        let wallet = WalletStore::open(&config.database.dsn)
            .with_context(|| format!("opening store at {}", config.database.dsn))?;
        let recovery = Arc::new(
            RecoveryManager::new(wallet.db(), config.server.session_timeout)
                .context("opening recovery tree")?,
        );

        let animal_pool = wallet
            .load_jackpot_pool(GameId::Animal, config.games.animal.jackpot.initial)
            .context("loading animal jackpot pool")?;
        let slot_pool = wallet
            .load_jackpot_pool(GameId::Slot, config.games.slot.jackpot.initial)
            .context("loading slot jackpot pool")?;
        info!(
            "jackpot pools restored: animal {} / slot {}",
            animal_pool, slot_pool
        );

        let sessions = Arc::new(SessionStore::new());
        let rooms = Arc::new(RoomManager::new(
            config.games.animal.red_bag_enabled,
            room_events_tx,
            shutdown_rx.clone(),
        ));
        let push = Arc::new(PushManager::new(sessions.clone()));

        let ctx = Arc::new(GameContext {
            config: config_rx,
            wallet,
            sessions,
            rooms,
            push,
            bullets: Arc::new(BulletRegistry::new()),
            animal_jackpot: Mutex::new(JackpotPool::with_amount(
                config.games.animal.jackpot.clone(),
                animal_pool,
            )),
            slot_jackpot: Mutex::new(JackpotPool::with_amount(
                config.games.slot.jackpot.clone(),
                slot_pool,
            )),
            recovery,
            spin_engine: Arc::new(ReelEngine),
            recent_rewards: Mutex::new(VecDeque::new()),
            slot_inflight: Mutex::new(Default::default()),
            started_at: Instant::now(),
        });

        Ok(Self {
            ctx,
            config_path: config_path.to_string(),
            config_tx,
            shutdown_tx,
            room_events_rx: Some(room_events_rx),
        })
    }

    /// Print a short status summary for the CLI.
    pub async fn show_status(&self) -> Result<()> {
        let config = self.ctx.config();
        let animal = self
            .ctx
            .animal_jackpot
            .lock()
            .expect("jackpot mutex poisoned")
            .amount();
        let slot = self
            .ctx
            .slot_jackpot
            .lock()
            .expect("jackpot mutex poisoned")
            .amount();
        println!("store:           {}", config.database.dsn);
        println!("listen:          {}:{}", config.server.host, config.server.port);
        println!("animal jackpot:  {}", animal);
        println!("slot jackpot:    {}", slot);
        println!("serial enabled:  {}", config.serial.enabled);
        Ok(())
    }

    /// Run until a termination signal arrives, then drain gracefully.
    pub async fn run(mut self) -> Result<()> {
        let config = self.ctx.config();
        let addr = format!("{}:{}", config.server.host, config.server.port);
        let listener = TcpListener::bind(&addr)
            .await
            .with_context(|| format!("binding {}", addr))?;
        info!("listening on {}", addr);

        let shutdown_rx = self.shutdown_tx.subscribe();

        Config::spawn_watcher(
            self.config_path.clone(),
            self.config_tx.clone(),
            shutdown_rx.clone(),
        );
        self.spawn_room_event_fanout();
        self.spawn_housekeeping(shutdown_rx.clone());
        self.spawn_jackpot_pushes(shutdown_rx.clone());
        self.spawn_recovery_sweeper(shutdown_rx.clone());
        self.spawn_hardware(shutdown_rx.clone());

        // Signals flip the shared shutdown channel like any other trigger.
        let signal_tx = self.shutdown_tx.clone();
        tokio::spawn(async move {
            wait_for_signal().await;
            info!("termination signal received");
            let _ = signal_tx.send(true);
        });

        let mut accept_shutdown = shutdown_rx.clone();
        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    match accepted {
                        Ok((stream, _)) => {
                            let ctx = self.ctx.clone();
                            tokio::spawn(async move {
                                net::serve_connection(stream, ctx).await;
                            });
                        }
                        Err(e) => {
                            warn!("accept failed: {}", e);
                        }
                    }
                }
                changed = accept_shutdown.changed() => {
                    if changed.is_err() || *accept_shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        self.shutdown().await
    }

    async fn shutdown(&self) -> Result<()> {
        info!("shutting down");
        let _ = self.shutdown_tx.send(true);
        self.ctx.rooms.shutdown_all().await;

        // Ask every connection to close and give the drain a bounded window.
        let grace = Duration::from_secs(self.ctx.config().server.shutdown_timeout);
        let deadline = Instant::now() + grace;
        for session in self.ctx.sessions.all().await {
            session.close();
        }
        while !self.ctx.sessions.is_empty().await && Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        let stragglers = self.ctx.sessions.len().await;
        if stragglers > 0 {
            warn!("{} sessions still open at shutdown deadline", stragglers);
        }

        self.ctx.wallet.flush().map_err(|e| {
            error!("final store flush failed: {}", e);
            anyhow::anyhow!("store flush failed during shutdown")
        })?;
        info!("shutdown complete");
        Ok(())
    }

    /// Translate room tick events into push messages.
    fn spawn_room_event_fanout(&mut self) {
        let mut events_rx = self
            .room_events_rx
            .take()
            .expect("room event fan-out spawned once");
        let push = self.ctx.push.clone();
        tokio::spawn(async move {
            while let Some((room_id, event)) = events_rx.recv().await {
                match event {
                    RoomEvent::EntityEntered(info) => {
                        push.push_room(
                            room_id,
                            cmd::PUSH_ANIMAL_ENTERED,
                            &proto::AnimalEnteredPush { animal: Some(info) },
                        )
                        .await;
                    }
                    RoomEvent::EntityLeft(id) => {
                        push.push_room(
                            room_id,
                            cmd::PUSH_ANIMAL_LEFT,
                            &proto::AnimalLeftPush { id },
                        )
                        .await;
                    }
                    RoomEvent::EntityComing {
                        kind,
                        countdown_secs,
                    } => {
                        push.push_room(
                            room_id,
                            cmd::PUSH_ANIMAL_COMING,
                            &proto::AnimalComingPush {
                                kind: kind as i32,
                                countdown_secs,
                            },
                        )
                        .await;
                    }
                }
            }
        });
    }

    /// Idle sessions, idle rooms and expired bullets, on one cadence.
    fn spawn_housekeeping(&self, mut shutdown: watch::Receiver<bool>) {
        let ctx = self.ctx.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(HOUSEKEEPING_INTERVAL);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let idle = Duration::from_secs(
                            ctx.config().server.session_timeout as u64 * 60,
                        );
                        for session in ctx.sessions.idle_sessions(idle).await {
                            info!(
                                "closing idle session {} (user {})",
                                session.id, session.user_id
                            );
                            session.close();
                        }
                        ctx.rooms.sweep_idle().await;
                        let reclaimed = ctx.bullets.sweep().await;
                        if !reclaimed.is_empty() {
                            info!("expired {} unused bullets", reclaimed.len());
                        }
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }
        });
    }

    /// Periodic pool-amount pushes to every live animal room.
    fn spawn_jackpot_pushes(&self, mut shutdown: watch::Receiver<bool>) {
        let ctx = self.ctx.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(JACKPOT_PUSH_INTERVAL);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let amount = ctx
                            .animal_jackpot
                            .lock()
                            .expect("jackpot mutex poisoned")
                            .amount();
                        let body = proto::JackpotAmountPush { amount };
                        for room_id in ctx.rooms.room_ids().await {
                            ctx.push
                                .push_room(room_id, cmd::PUSH_JACKPOT_AMOUNT, &body)
                                .await;
                        }

                        // The slot has no rooms; its pool goes to every
                        // session on a slot-capable endpoint.
                        let amount = ctx
                            .slot_jackpot
                            .lock()
                            .expect("jackpot mutex poisoned")
                            .amount();
                        let frame = crate::protocol::ServerFrame::push(
                            cmd::PUSH_SLOT_JACKPOT,
                            crate::proto::encode_body(&proto::SlotJackpotPush { amount }),
                        );
                        for session in ctx.sessions.all().await {
                            if matches!(
                                session.endpoint,
                                crate::net::session::Endpoint::Slot
                                    | crate::net::session::Endpoint::Game
                            ) {
                                let _ = session.try_send(frame.clone());
                            }
                        }
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }
        });
    }

    fn spawn_recovery_sweeper(&self, shutdown: watch::Receiver<bool>) {
        self.ctx.recovery.clone().spawn_sweeper(shutdown);
    }

    /// Subscribe to hardware events and apply the coin policy.
    fn spawn_hardware(&self, shutdown: watch::Receiver<bool>) {
        let serial = self.ctx.config().serial.clone();
        let mut events = hardware::spawn(serial.clone(), shutdown);
        let ctx = self.ctx.clone();
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                match event {
                    HardwareEvent::CoinInserted { count } => {
                        info!("coin inserted x{}", count);
                        if serial.cabinet_user != 0 {
                            let credit = count as i64 * serial.coin_value;
                            if let Err(e) = ctx
                                .wallet
                                .get_or_create_user(serial.cabinet_user, "cabinet")
                                .and_then(|_| {
                                    ctx.wallet.update_game_stats(
                                        serial.cabinet_user,
                                        0,
                                        0,
                                        credit,
                                        0,
                                    )
                                })
                            {
                                warn!("coin credit failed: {}", e);
                            }
                        }
                    }
                    HardwareEvent::CoinReturned { front, left, right } => {
                        info!("coins returned front {} left {} right {}", front, left, right);
                        if serial.cabinet_user != 0 {
                            let debit =
                                (front + left + right) as i64 * serial.coin_value;
                            if let Err(e) = ctx.wallet.update_game_stats(
                                serial.cabinet_user,
                                0,
                                0,
                                0,
                                debit,
                            ) {
                                warn!("coin-out accounting failed: {}", e);
                            }
                        }
                    }
                    HardwareEvent::ButtonPressed { kind, code, action } => {
                        info!("button kind {} code {} action {}", kind, code, action);
                    }
                    HardwareEvent::FaultReported { code, level } => {
                        warn!("hardware fault code {} level {}", code, level);
                    }
                }
            }
        });
    }
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};
    let mut int = signal(SignalKind::interrupt()).expect("SIGINT handler");
    let mut term = signal(SignalKind::terminate()).expect("SIGTERM handler");
    let mut quit = signal(SignalKind::quit()).expect("SIGQUIT handler");
    tokio::select! {
        _ = int.recv() => {}
        _ = term.recv() => {}
        _ = quit.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
