//! The slot surface (message ids 1901, 1902, push 1910).
//!
//! The cascade-matching algorithm itself is an external collaborator: the
//! server consumes its result as an opaque [`SpinResult`] through the
//! [`SpinEngine`] seam and is responsible only for stake validation, the
//! wallet commit, the jackpot share, and the response. [`ReelEngine`] is the
//! basic built-in implementation so the surface runs end to end.

use std::sync::Arc;

use chrono::Utc;
use log::info;
use prost::Message;
use rand::RngCore;

use crate::errors::GameError;
use crate::game::GameContext;
use crate::net::session::Session;
use crate::proto;
use crate::protocol::{cmd, ClientFrame, ServerFrame};
use crate::wallet::{BetCommit, GameId, JackpotWinRecord};

/// One resolved spin as produced by the engine. The server treats the grid
/// contents and cascade steps as opaque client-display data.
#[derive(Debug, Clone)]
pub struct SpinResult {
    pub stops: Vec<u32>,
    pub steps: Vec<proto::CascadeStep>,
    /// Total pay as a multiple of the stake, in hundredths.
    pub win: i64,
    /// Whether the outcome is eligible for a jackpot attempt.
    pub jackpot_eligible: bool,
}

/// Seam to the external spin algorithm.
pub trait SpinEngine: Send + Sync {
    fn spin(&self, rng: &mut dyn RngCore, bet: i64) -> SpinResult;
}

/// Basic three-reel engine with a fixed payout table.
pub struct ReelEngine;

/// Symbol count per reel strip.
const STRIP_LEN: u32 = 8;
/// Symbol id that pays the top line and gates the jackpot.
const SEVEN: u32 = 7;

impl SpinEngine for ReelEngine {
    fn spin(&self, rng: &mut dyn RngCore, bet: i64) -> SpinResult {
        let stops: Vec<u32> = (0..3).map(|_| rng.next_u32() % STRIP_LEN).collect();
        let multiplier = if stops[0] == stops[1] && stops[1] == stops[2] {
            match stops[0] {
                SEVEN => 100,
                6 => 50,
                5 => 20,
                4 => 14,
                3 => 10,
                2 => 8,
                _ => 5,
            }
        } else if stops[0] == stops[1] || stops[1] == stops[2] || stops[0] == stops[2] {
            2
        } else {
            0
        };
        let win = bet * multiplier;
        let steps = if win > 0 {
            vec![proto::CascadeStep {
                grid: stops.clone(),
                win,
            }]
        } else {
            Vec::new()
        };
        SpinResult {
            stops: stops.clone(),
            steps,
            win,
            jackpot_eligible: stops.iter().all(|s| *s == SEVEN),
        }
    }
}

pub async fn handle(
    ctx: &GameContext,
    session: &Arc<Session>,
    frame: &ClientFrame,
) -> Result<ServerFrame, GameError> {
    match frame.cmd {
        cmd::SLOT_ENTER => enter(ctx, session, frame),
        cmd::SLOT_START => start(ctx, session, frame).await,
        other => Err(GameError::InvalidParam(format!(
            "unhandled slot command {}",
            other
        ))),
    }
}

fn enter(
    ctx: &GameContext,
    session: &Arc<Session>,
    frame: &ClientFrame,
) -> Result<ServerFrame, GameError> {
    let _req = proto::SlotEnterRequest::decode(frame.data.clone())?;
    let (_, wallet) = ctx
        .wallet
        .get_or_create_user(session.user_id, &session.nickname)?;
    let config = ctx.config();
    let jackpot_amount = ctx
        .slot_jackpot
        .lock()
        .expect("jackpot mutex poisoned")
        .amount();
    let resp = proto::SlotEnterResponse {
        balance: wallet.balance,
        bet_values: config.games.slot.bet_values.clone(),
        jackpot_amount,
    };
    Ok(ServerFrame::reply(
        frame.cmd,
        frame.flag,
        proto::encode_body(&resp),
    ))
}

async fn start(
    ctx: &GameContext,
    session: &Arc<Session>,
    frame: &ClientFrame,
) -> Result<ServerFrame, GameError> {
    let req = proto::SlotStartRequest::decode(frame.data.clone())?;
    let config = ctx.config();
    if !config.games.slot.bet_values.contains(&req.bet) {
        return Err(GameError::InvalidBet(format!(
            "value {} not offered by the slot",
            req.bet
        )));
    }

    // One spin per player at a time, across all of their tabs.
    {
        let mut inflight = ctx.slot_inflight.lock().expect("inflight set poisoned");
        if !inflight.insert(session.user_id) {
            return Err(GameError::SpinInProgress);
        }
    }
    let result = spin_and_commit(ctx, session, req.bet);
    {
        let mut inflight = ctx.slot_inflight.lock().expect("inflight set poisoned");
        inflight.remove(&session.user_id);
    }
    let (resp, jackpot_after) = result?;

    if let Some(amount) = jackpot_after {
        // The slot has no rooms; notify the winner's own connections and let
        // the periodic jackpot push refresh everyone else.
        let push = ServerFrame::push(
            cmd::PUSH_SLOT_JACKPOT,
            proto::encode_body(&proto::SlotJackpotPush { amount }),
        );
        for tab in ctx.sessions.sessions_of(session.user_id).await {
            let _ = tab.try_send(push.clone());
        }
    }

    Ok(ServerFrame::reply(
        frame.cmd,
        frame.flag,
        proto::encode_body(&resp),
    ))
}

/// Spin, decide the jackpot share, and commit everything in one wallet
/// transaction. Returns the response body and the pool amount to push when a
/// jackpot triggered.
fn spin_and_commit(
    ctx: &GameContext,
    session: &Arc<Session>,
    bet: i64,
) -> Result<(proto::SlotStartResponse, Option<i64>), GameError> {
    let mut rng = rand::thread_rng();
    let outcome = ctx.spin_engine.spin(&mut rng, bet);

    let mut pool = ctx.slot_jackpot.lock().expect("jackpot mutex poisoned");
    let plan = pool.plan(&mut rng, bet, outcome.jackpot_eligible);
    let commit = BetCommit {
        user_id: session.user_id,
        game: GameId::Slot,
        stake: bet,
        payout: outcome.win,
        bet_recorded: bet,
        win_recorded: outcome.win,
        multiplier: 1,
        is_jackpot: plan.win.is_some(),
        gold_delta: 0,
        jackpot_delta: plan.pool_delta(),
        jackpot_win: plan.win.map(|amount| JackpotWinRecord {
            user_id: session.user_id,
            nickname: session.nickname.clone(),
            amount,
            at: Utc::now(),
        }),
    };
    let committed = ctx.wallet.commit_bet(&commit)?;
    let hit = pool.apply(&plan, session.user_id, &session.nickname);
    drop(pool);

    if let Some(hit) = &hit {
        info!(
            "user {} hit the slot jackpot for {} (pool now {})",
            session.user_id, hit.win, hit.pool_after
        );
    }

    let resp = proto::SlotStartResponse {
        balance: committed.wallet.balance,
        win: outcome.win,
        stops: outcome.stops,
        steps: outcome.steps,
        is_jackpot: hit.is_some(),
    };
    Ok((resp, hit.map(|h| h.pool_after)))
}
