//! Test utilities: an in-process game context without the network layer.
//!
//! Tests drive the router directly with encoded frames and observe responses
//! and pushes on per-session queues, which is exactly what the connection
//! tasks do on a live socket.
#![allow(dead_code)] // Not every test file uses every helper.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use prost::Message;
use tempfile::TempDir;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;

use menagerie::config::Config;
use menagerie::game::animal::bullets::BulletRegistry;
use menagerie::game::animal::room::{RoomEvent, RoomManager};
use menagerie::game::jackpot::JackpotPool;
use menagerie::game::slot::ReelEngine;
use menagerie::game::GameContext;
use menagerie::net::session::{Endpoint, Session};
use menagerie::protocol::{ClientFrame, ServerFrame};
use menagerie::push::PushManager;
use menagerie::recovery::RecoveryManager;
use menagerie::wallet::{GameId, WalletStore};

pub struct Harness {
    pub ctx: Arc<GameContext>,
    _config_tx: watch::Sender<Arc<Config>>,
    _shutdown_tx: watch::Sender<bool>,
    _room_events_rx: mpsc::UnboundedReceiver<(u32, RoomEvent)>,
    _tmp: TempDir,
}

/// Build a context over a throwaway store. `animal_pool` presets the animal
/// jackpot pool amount.
pub fn build_ctx(config: Config, animal_pool: Option<i64>) -> Harness {
    let tmp = TempDir::new().expect("tempdir");
    let mut config = config;
    config.database.dsn = tmp.path().to_string_lossy().to_string();
    let config = Arc::new(config);

    let wallet = WalletStore::open(&config.database.dsn).expect("open store");
    let recovery = Arc::new(
        RecoveryManager::new(wallet.db(), config.server.session_timeout).expect("recovery"),
    );

    let animal_amount = match animal_pool {
        Some(amount) => amount,
        None => wallet
            .load_jackpot_pool(GameId::Animal, config.games.animal.jackpot.initial)
            .expect("animal pool"),
    };
    let slot_amount = wallet
        .load_jackpot_pool(GameId::Slot, config.games.slot.jackpot.initial)
        .expect("slot pool");

    let (config_tx, config_rx) = watch::channel(config.clone());
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (room_events_tx, room_events_rx) = mpsc::unbounded_channel();

    let sessions = Arc::new(menagerie::net::session::SessionStore::new());
    let rooms = Arc::new(RoomManager::new(
        config.games.animal.red_bag_enabled,
        room_events_tx,
        shutdown_rx,
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
            animal_amount,
        )),
        slot_jackpot: Mutex::new(JackpotPool::with_amount(
            config.games.slot.jackpot.clone(),
            slot_amount,
        )),
        recovery,
        spin_engine: Arc::new(ReelEngine),
        recent_rewards: Mutex::new(VecDeque::new()),
        slot_inflight: Mutex::new(Default::default()),
        started_at: Instant::now(),
    });

    Harness {
        ctx,
        _config_tx: config_tx,
        _shutdown_tx: shutdown_tx,
        _room_events_rx: room_events_rx,
        _tmp: tmp,
    }
}

/// Open a session the way the listener would, with its outbound queue.
pub async fn connect(
    harness: &Harness,
    user_id: u64,
    endpoint: Endpoint,
) -> (Arc<Session>, mpsc::Receiver<ServerFrame>) {
    harness
        .ctx
        .wallet
        .get_or_create_user(user_id, &format!("player{}", user_id))
        .expect("bootstrap user");
    let (session, rx, _done) = Session::new(user_id, format!("player{}", user_id), endpoint);
    session.touch();
    harness.ctx.sessions.add(session.clone()).await;
    (session, rx)
}

/// Encode a request frame the way a client would.
pub fn request<M: Message>(cmd: u16, flag: u32, body: &M) -> ClientFrame {
    let mut buf = Vec::with_capacity(body.encoded_len());
    body.encode(&mut buf).expect("encode request body");
    ClientFrame::new(cmd, flag, bytes::Bytes::from(buf))
}

/// Decode a response body, asserting the frame succeeded.
pub fn decode_ok<M: Message + Default>(frame: &ServerFrame) -> M {
    assert_eq!(
        frame.error_id, 0,
        "expected success frame for cmd {}, got error {}",
        frame.cmd, frame.error_id
    );
    M::decode(frame.data.clone()).expect("decode response body")
}

/// Drain every frame currently queued for a session.
pub fn drain(rx: &mut mpsc::Receiver<ServerFrame>) -> Vec<ServerFrame> {
    let mut out = Vec::new();
    while let Ok(frame) = rx.try_recv() {
        out.push(frame);
    }
    out
}
