//! Message dispatch by command id.
//!
//! The id space is partitioned per game surface: 1800..1899 animal,
//! 1900..1999 slot, 2000..2099 config, plus the generic 1002 heartbeat.
//! Connections are capability-gated by the endpoint they arrived on: the
//! combined `/ws/game` endpoint reaches every handler, the per-game endpoints
//! only their own. Unknown ids answer with wire code 1000.

use std::sync::Arc;

use chrono::Utc;
use log::warn;
use prost::Message;

use crate::errors::{GameError, CODE_UNKNOWN_CMD};
use crate::game::{animal, slot, GameContext};
use crate::net::session::{Endpoint, Session};
use crate::proto;
use crate::protocol::{cmd, ClientFrame, ServerFrame};

fn in_range(id: u16, range: (u16, u16)) -> bool {
    (range.0..=range.1).contains(&id)
}

/// Dispatch one inbound frame to its handler and produce the response frame.
/// Every error becomes an error frame carrying the same `Cmd` and `Flag`.
pub async fn dispatch(
    ctx: &GameContext,
    session: &Arc<Session>,
    frame: ClientFrame,
) -> ServerFrame {
    session.touch();
    let result = route(ctx, session, &frame).await;
    match result {
        Ok(reply) => reply,
        Err(e) => {
            warn!(
                "command {} from user {} failed: {}",
                frame.cmd, session.user_id, e
            );
            ServerFrame::error(frame.cmd, frame.flag, e.wire_code(), &e.to_string())
        }
    }
}

async fn route(
    ctx: &GameContext,
    session: &Arc<Session>,
    frame: &ClientFrame,
) -> Result<ServerFrame, GameError> {
    match frame.cmd {
        cmd::HEARTBEAT | cmd::CONFIG_HEARTBEAT => heartbeat(frame),
        cmd::CONFIG_SERVER_INFO => server_info(ctx, frame).await,
        cmd::CONFIG_CLIENT_ERROR => client_error(session, frame),
        id if in_range(id, cmd::ANIMAL_RANGE) => {
            gate(session, Endpoint::Animal)?;
            animal::handler::handle(ctx, session, frame).await
        }
        id if in_range(id, cmd::SLOT_RANGE) => {
            gate(session, Endpoint::Slot)?;
            slot::handle(ctx, session, frame).await
        }
        id => {
            warn!("unknown command {} from user {}", id, session.user_id);
            Ok(ServerFrame::error(
                frame.cmd,
                frame.flag,
                CODE_UNKNOWN_CMD,
                "unknown command",
            ))
        }
    }
}

/// Per-game capability gate: the combined endpoint reaches everything.
fn gate(session: &Arc<Session>, needed: Endpoint) -> Result<(), GameError> {
    if session.endpoint == needed || session.endpoint == Endpoint::Game {
        Ok(())
    } else {
        Err(GameError::PermissionDenied(format!(
            "endpoint {:?} cannot reach {:?} commands",
            session.endpoint, needed
        )))
    }
}

fn heartbeat(frame: &ClientFrame) -> Result<ServerFrame, GameError> {
    let resp = proto::HeartbeatResponse {
        server_time: Utc::now().timestamp(),
    };
    Ok(ServerFrame::reply(
        frame.cmd,
        frame.flag,
        proto::encode_body(&resp),
    ))
}

async fn server_info(ctx: &GameContext, frame: &ClientFrame) -> Result<ServerFrame, GameError> {
    let resp = proto::ServerInfoResponse {
        version: env!("CARGO_PKG_VERSION").to_string(),
        server_time: Utc::now().timestamp(),
        online: ctx.sessions.len().await as u32,
    };
    Ok(ServerFrame::reply(
        frame.cmd,
        frame.flag,
        proto::encode_body(&resp),
    ))
}

/// Client-side error reports are logged for diagnosis and acknowledged.
fn client_error(session: &Arc<Session>, frame: &ClientFrame) -> Result<ServerFrame, GameError> {
    let report = proto::ClientErrorReport::decode(frame.data.clone())?;
    warn!(
        "client error from user {} (client {}): {} {}",
        session.user_id, report.client_version, report.message, report.stack
    );
    Ok(ServerFrame::reply(frame.cmd, frame.flag, bytes::Bytes::new()))
}
