//! Per-connection reader and writer tasks.
//!
//! Each WebSocket connection runs exactly two cooperative tasks. The writer
//! drains the session's bounded send queue, emits keepalive pings, and
//! applies a per-message write timeout. The reader enforces a rolling read
//! deadline (reset by any inbound traffic, pongs included), decodes frames,
//! and feeds the router.
//!
//! Closing is idempotent: the session's done signal is raised once, both
//! tasks observe it and release, and any partially queued message is dropped.

use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use log::{debug, info, warn};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

use crate::errors::GameError;
use crate::game::animal::handler::leave_current_room;
use crate::game::GameContext;
use crate::net::session::Session;
use crate::protocol::{ClientFrame, ServerFrame};
use crate::recovery::SessionRecord;
use crate::router;

/// Keepalive ping cadence.
const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(54);
/// Enqueue timeout for responses; failing it is a hard error.
const ENQUEUE_TIMEOUT: Duration = Duration::from_secs(5);
/// Consecutive frame decode failures tolerated before the connection closes.
const MAX_DECODE_FAILURES: u32 = 10;

type WsSink = SplitSink<WebSocketStream<TcpStream>, Message>;
type WsStream = SplitStream<WebSocketStream<TcpStream>>;

/// Timeouts taken from the server config at accept time.
#[derive(Debug, Clone, Copy)]
pub struct ConnTimeouts {
    pub read: Duration,
    pub write: Duration,
}

/// Run a fully upgraded connection until it closes. Spawns the writer task,
/// drives the reader inline, and performs disconnect cleanup.
pub async fn run(
    ws: WebSocketStream<TcpStream>,
    session: Arc<Session>,
    outbound_rx: mpsc::Receiver<ServerFrame>,
    done_rx: watch::Receiver<bool>,
    ctx: Arc<GameContext>,
    timeouts: ConnTimeouts,
) {
    let (sink, stream) = ws.split();
    let writer = tokio::spawn(write_loop(
        sink,
        outbound_rx,
        done_rx.clone(),
        timeouts.write,
        session.clone(),
    ));

    read_loop(stream, &session, &ctx, done_rx, timeouts.read).await;

    // Reader is done; make sure the writer lets go too.
    session.close();
    let _ = writer.await;

    disconnect_cleanup(&session, &ctx).await;
}

async fn write_loop(
    mut sink: WsSink,
    mut outbound_rx: mpsc::Receiver<ServerFrame>,
    mut done: watch::Receiver<bool>,
    write_timeout: Duration,
    session: Arc<Session>,
) {
    let mut keepalive = tokio::time::interval(KEEPALIVE_INTERVAL);
    keepalive.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    keepalive.tick().await;
    loop {
        tokio::select! {
            maybe = outbound_rx.recv() => {
                let Some(frame) = maybe else { break };
                let bytes = frame.encode();
                let send = sink.send(Message::Binary(bytes.to_vec()));
                match tokio::time::timeout(write_timeout, send).await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => {
                        debug!("write failed for session {}: {}", session.id, e);
                        break;
                    }
                    Err(_) => {
                        warn!("write timeout for session {}", session.id);
                        break;
                    }
                }
            }
            _ = keepalive.tick() => {
                if sink.send(Message::Ping(Vec::new())).await.is_err() {
                    break;
                }
            }
            changed = done.changed() => {
                if changed.is_err() || *done.borrow() {
                    break;
                }
            }
        }
    }
    // Partially queued messages are dropped with the receiver.
    let _ = sink.close().await;
    session.close();
}

async fn read_loop(
    mut stream: WsStream,
    session: &Arc<Session>,
    ctx: &Arc<GameContext>,
    mut done: watch::Receiver<bool>,
    read_timeout: Duration,
) {
    let mut decode_failures = 0u32;
    loop {
        let next = tokio::select! {
            next = tokio::time::timeout(read_timeout, stream.next()) => next,
            changed = done.changed() => {
                if changed.is_err() || *done.borrow() {
                    break;
                }
                continue;
            }
        };
        let msg = match next {
            Err(_) => {
                info!("read deadline expired for session {}", session.id);
                break;
            }
            Ok(None) => break,
            Ok(Some(Err(e))) => {
                debug!("receive error on session {}: {}", session.id, e);
                break;
            }
            Ok(Some(Ok(msg))) => msg,
        };

        match msg {
            Message::Binary(data) => {
                session.touch();
                match ClientFrame::decode(&data) {
                    Ok(frame) => {
                        decode_failures = 0;
                        let reply = router::dispatch(ctx, session, frame).await;
                        if session.send(reply, ENQUEUE_TIMEOUT).await.is_err() {
                            warn!(
                                "send queue stuck for session {}, closing",
                                session.id
                            );
                            break;
                        }
                    }
                    Err(e) => {
                        decode_failures += 1;
                        warn!(
                            "frame decode failed on session {} ({}/{}): {}",
                            session.id, decode_failures, MAX_DECODE_FAILURES, e
                        );
                        let code = e.wire_code();
                        let _ = session
                            .send(
                                ServerFrame::error(0, 0, code, &e.to_string()),
                                ENQUEUE_TIMEOUT,
                            )
                            .await;
                        if decode_failures >= MAX_DECODE_FAILURES {
                            break;
                        }
                    }
                }
            }
            // Only binary frames carry the protocol.
            Message::Text(_) => {
                decode_failures += 1;
                let err = GameError::MessageFormat("text frames are not accepted".into());
                let _ = session
                    .send(
                        ServerFrame::error(0, 0, err.wire_code(), &err.to_string()),
                        ENQUEUE_TIMEOUT,
                    )
                    .await;
                if decode_failures >= MAX_DECODE_FAILURES {
                    break;
                }
            }
            Message::Pong(_) | Message::Ping(_) => {
                session.touch();
            }
            Message::Close(_) => break,
            Message::Frame(_) => {}
        }
    }
}

/// Reclaim the session: persist the recoverable snapshot first so the room
/// membership stays discoverable, then run the room-leave path and drop the
/// session from the store.
async fn disconnect_cleanup(session: &Arc<Session>, ctx: &Arc<GameContext>) {
    let room_id = session.room_id();
    if room_id != 0 {
        let room_kind = match ctx.rooms.get(room_id).await {
            Some(room) => room.kind.to_wire(),
            None => 0,
        };
        if let Err(e) = ctx.recovery.persist(&SessionRecord::new(
            session.id,
            session.user_id,
            room_kind,
            room_id,
            session.total_win(),
        )) {
            warn!("failed to persist session for recovery: {}", e);
        }
        leave_current_room(ctx, session).await;
    }
    ctx.sessions.remove(session.id).await;
    info!(
        "session {} (user {}) disconnected",
        session.id, session.user_id
    );
}
