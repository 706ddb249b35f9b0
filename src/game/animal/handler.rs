//! Request handlers for the animal game (message ids 1801..1815).
//!
//! Handlers decode the typed payload, run the game logic under the room lock,
//! commit wallet effects, and only then emit the spectator pushes, in the
//! contract order `hit (1899) -> die (1884) -> left (1888 per victim)`.

use std::sync::Arc;

use chrono::Utc;
use log::{info, warn};
use prost::Message;
use tokio::time::Instant;
use uuid::Uuid;

use crate::errors::GameError;
use crate::game::animal::resolver::{self, BetParams};
use crate::game::animal::room::RoomKind;
use crate::game::animal::types::{SkillKind, FREEZE_SECS, KIND_TABLE};
use crate::game::GameContext;
use crate::net::session::Session;
use crate::proto;
use crate::protocol::{cmd, ClientFrame, ServerFrame};
use crate::recovery::SessionRecord;
use crate::wallet::{BetCommit, GameId, JackpotWinRecord};

/// Entries returned by the record and reward listings.
const LISTING_LIMIT: usize = 20;
/// Bullet multipliers accepted by fire-bullet.
const MAX_MULTIPLIER: u32 = 10;

pub async fn handle(
    ctx: &GameContext,
    session: &Arc<Session>,
    frame: &ClientFrame,
) -> Result<ServerFrame, GameError> {
    match frame.cmd {
        cmd::ANIMAL_ENTER_ROOM => enter_room(ctx, session, frame).await,
        cmd::ANIMAL_LEAVE_ROOM => leave_room(ctx, session, frame).await,
        cmd::ANIMAL_BET => bet(ctx, session, frame).await,
        cmd::ANIMAL_RECORD => record(ctx, session, frame).await,
        cmd::ANIMAL_RECENT_REWARDS => recent_rewards(ctx, frame),
        cmd::ANIMAL_USE_SKILL => use_skill(ctx, session, frame).await,
        cmd::ANIMAL_ROOM_LIST => room_list(ctx, frame).await,
        cmd::ANIMAL_BUY_TOOL => buy_tool(ctx, session, frame),
        cmd::ANIMAL_TOOL_PRICE => tool_price(frame),
        cmd::ANIMAL_JACKPOT_HISTORY => jackpot_history(ctx, frame),
        cmd::ANIMAL_FIRE_BULLET => fire_bullet(ctx, session, frame).await,
        other => Err(GameError::InvalidParam(format!(
            "unhandled animal command {}",
            other
        ))),
    }
}

fn odds_table() -> Vec<proto::OddsEntry> {
    KIND_TABLE
        .iter()
        .map(|s| proto::OddsEntry {
            kind: s.kind as i32,
            min_odds: s.min_odds,
            max_odds: s.max_odds,
        })
        .collect()
}

fn skills_wire(skills: &std::collections::HashMap<u8, u32>) -> Vec<proto::SkillCount> {
    let mut list: Vec<proto::SkillCount> = skills
        .iter()
        .map(|(skill, count)| proto::SkillCount {
            skill: *skill as i32,
            count: *count,
        })
        .collect();
    list.sort_by_key(|s| s.skill);
    list
}

async fn member_wire(ctx: &GameContext, room_id: u32) -> Vec<proto::RoomMember> {
    let mut members = Vec::new();
    for member in ctx.sessions.room_members(room_id).await {
        let (user, wallet) = match ctx.wallet.get_or_create_user(member.user_id, &member.nickname)
        {
            Ok(pair) => pair,
            Err(e) => {
                warn!("member lookup failed for {}: {}", member.user_id, e);
                continue;
            }
        };
        members.push(proto::RoomMember {
            user_id: user.user_id,
            nickname: user.nickname,
            avatar: user.avatar,
            vip: user.vip as u32,
            balance: wallet.balance,
        });
    }
    members.sort_by_key(|m| m.user_id);
    members
}

/// Detach the session from its current room, if any. Returns the accumulated
/// in-room win. Shared by leave-room, implicit re-enter, and disconnect.
pub async fn leave_current_room(ctx: &GameContext, session: &Arc<Session>) -> i64 {
    // A session reaped from the store (dead queue) still needs its room
    // membership cleared, so fall back to the session's own binding.
    let (room_id, total_win) = match ctx.sessions.leave_room(session.id).await {
        Some((_, room_id, total_win)) => (room_id, total_win),
        None => (session.room_id(), session.total_win()),
    };
    if room_id == 0 {
        return 0;
    }
    if let Some(room) = ctx.rooms.get(room_id).await {
        let mut state = room.state.lock().await;
        state.members.remove(&session.id);
        state.one_blow.remove(&session.user_id);
        state.last_activity = Instant::now();
    }
    ctx.push
        .push_room(
            room_id,
            cmd::PUSH_PLAYER_LEFT,
            &proto::PlayerLeftPush {
                user_id: session.user_id,
            },
        )
        .await;
    total_win
}

async fn enter_room(
    ctx: &GameContext,
    session: &Arc<Session>,
    frame: &ClientFrame,
) -> Result<ServerFrame, GameError> {
    let req = proto::EnterRoomRequest::decode(frame.data.clone())?;
    let kind = RoomKind::from_wire(req.kind)
        .ok_or_else(|| GameError::InvalidParam(format!("room kind {}", req.kind)))?;

    let (user, _) = ctx
        .wallet
        .get_or_create_user(session.user_id, &session.nickname)?;
    if user.vip < kind.min_vip() {
        return Err(GameError::PermissionDenied(format!(
            "room kind {:?} requires vip {}",
            kind,
            kind.min_vip()
        )));
    }

    // Switching rooms leaves the old one first.
    if session.room_id() != 0 {
        leave_current_room(ctx, session).await;
    }

    let config = ctx.config();
    let free_gold = ctx
        .wallet
        .grant_free_gold(
            session.user_id,
            config.games.animal.free_gold_daily,
            Utc::now().date_naive(),
        )?
        .unwrap_or(0);

    let room = ctx.rooms.find_or_create(kind).await;
    let (animals, time, red_bag_active) = {
        let mut state = room.state.lock().await;
        state.members.insert(session.id);
        state.last_activity = Instant::now();
        (
            state.entities_wire(&ctx.rooms.paths()),
            state.freeze_remaining_secs(Instant::now()),
            state.red_bag_active,
        )
    };
    ctx.sessions.join_room(session.id, room.id).await;
    ctx.recovery.persist(&SessionRecord::new(
        session.id,
        session.user_id,
        kind.to_wire(),
        room.id,
        0,
    ))?;

    let wallet = ctx.wallet.get_by_user_id(session.user_id)?;
    let jackpot_amount = ctx
        .animal_jackpot
        .lock()
        .expect("jackpot mutex poisoned")
        .amount();
    let members = member_wire(ctx, room.id).await;

    ctx.push
        .push_room_except(
            room.id,
            cmd::PUSH_PLAYER_ENTERED,
            &proto::PlayerEnteredPush {
                member: Some(proto::RoomMember {
                    user_id: user.user_id,
                    nickname: user.nickname.clone(),
                    avatar: user.avatar,
                    vip: user.vip as u32,
                    balance: wallet.balance,
                }),
            },
            session.id,
        )
        .await;

    info!(
        "user {} entered room {} ({:?})",
        session.user_id, room.id, kind
    );

    let resp = proto::EnterRoomResponse {
        room_id: room.id,
        bet_values: kind.bet_values().to_vec(),
        odds: odds_table(),
        animals,
        members,
        red_bag_active,
        time,
        jackpot_amount,
        free_gold,
        balance: wallet.balance,
    };
    Ok(ServerFrame::reply(
        frame.cmd,
        frame.flag,
        proto::encode_body(&resp),
    ))
}

async fn leave_room(
    ctx: &GameContext,
    session: &Arc<Session>,
    frame: &ClientFrame,
) -> Result<ServerFrame, GameError> {
    let total_win = leave_current_room(ctx, session).await;
    // An explicit leave clears the recoverable state.
    ctx.recovery.remove(session.user_id)?;
    let resp = proto::LeaveRoomResponse { total_win };
    Ok(ServerFrame::reply(
        frame.cmd,
        frame.flag,
        proto::encode_body(&resp),
    ))
}

async fn bet(
    ctx: &GameContext,
    session: &Arc<Session>,
    frame: &ClientFrame,
) -> Result<ServerFrame, GameError> {
    let req = proto::BetRequest::decode(frame.data.clone())?;
    let room_id = session.room_id();
    if room_id == 0 {
        return Err(GameError::GameState("bet outside a room".into()));
    }
    let room = ctx
        .rooms
        .get(room_id)
        .await
        .ok_or_else(|| GameError::GameState(format!("room {} is gone", room_id)))?;

    let config = ctx.config();
    let user = ctx.wallet.get_user(session.user_id)?;

    // A fired bullet fixes the stake and was debited up front.
    let (amount, multiplier, prepaid) = if req.bullet_id.is_empty() {
        let amount = if req.bet_value == 0 {
            room.kind.bet_values()[0]
        } else {
            req.bet_value
        };
        if !room.kind.bet_values().contains(&amount) {
            return Err(GameError::InvalidBet(format!(
                "value {} not offered in {:?}",
                amount, room.kind
            )));
        }
        let multiplier = req.multiplier.max(1);
        if multiplier > MAX_MULTIPLIER {
            return Err(GameError::InvalidBet(format!(
                "multiplier {} exceeds {}",
                multiplier, MAX_MULTIPLIER
            )));
        }
        (amount, multiplier, false)
    } else {
        let id = Uuid::parse_str(&req.bullet_id)
            .map_err(|_| GameError::InvalidParam("malformed bullet id".into()))?;
        let bullet = ctx.bullets.take(id, session.user_id).await?;
        (bullet.amount, bullet.multiplier, true)
    };

    let params = BetParams {
        user_id: session.user_id,
        vip: user.vip,
        amount,
        multiplier,
        target: req.animal_id,
        hit_frequency: config.games.animal.hit_frequency,
    };
    let stake_recorded = params.stake();

    let mut state = room.state.lock().await;
    state.last_activity = Instant::now();
    let force_hit = state.one_blow.contains(&session.user_id);
    let resolution = resolver::resolve(&mut state, &ctx.rooms.paths(), &params, force_hit);

    // Decide the jackpot share, commit the wallet, and only then touch the
    // pool and the room. A commit failure leaves everything unchanged.
    let (outcome, jackpot_hit) = {
        let mut pool = ctx.animal_jackpot.lock().expect("jackpot mutex poisoned");
        let plan = pool.plan(&mut state.rng, stake_recorded, resolution.jackpot_attempt);
        let commit = BetCommit {
            user_id: session.user_id,
            game: GameId::Animal,
            stake: if prepaid { 0 } else { stake_recorded },
            payout: resolution.win_total,
            bet_recorded: stake_recorded,
            win_recorded: resolution.win_total + resolution.red_bag_total,
            multiplier,
            is_jackpot: plan.win.is_some(),
            gold_delta: resolution.gold,
            jackpot_delta: plan.pool_delta(),
            jackpot_win: plan.win.map(|amount| JackpotWinRecord {
                user_id: session.user_id,
                nickname: session.nickname.clone(),
                amount,
                at: Utc::now(),
            }),
        };
        let outcome = ctx.wallet.commit_bet(&commit)?;
        let hit = pool.apply(&plan, session.user_id, &session.nickname);
        (outcome, hit)
    };

    // Wallet is committed; apply the kills to the room.
    if force_hit {
        state.one_blow.remove(&session.user_id);
    }
    state.total_wagered += stake_recorded;
    state.total_paid += resolution.win_total + resolution.red_bag_total;
    let mut respawn_events = Vec::new();
    if resolution.hit {
        for victim in &resolution.victims {
            state.entities.remove(&victim.id);
        }
        if let Some(primary) = resolution.victims.first() {
            respawn_events =
                state.respawn_kind(primary.kind, &ctx.rooms.paths(), Instant::now());
        }
    }
    drop(state);

    let total_win = session.add_win(resolution.win_total);

    // Spectator pushes, in contract order: hit, die, one left per victim.
    if resolution.hit {
        ctx.push
            .push_room_except(
                room_id,
                cmd::PUSH_PLAYER_HIT,
                &proto::HitPush {
                    role_id: session.user_id,
                    animal_id: req.animal_id,
                },
                session.id,
            )
            .await;
        let died = proto::AnimalDiedPush {
            role_id: session.user_id,
            r#type: resolution.effect as i32,
            ids: resolution
                .victims
                .iter()
                .map(|v| proto::KillRecord {
                    id: v.id,
                    kind: v.kind as i32,
                    win: v.win,
                    red_bag: v.red_bag,
                })
                .collect(),
        };
        ctx.push
            .push_room_except(room_id, cmd::PUSH_ANIMAL_DIED, &died, session.id)
            .await;
        for victim in &resolution.victims {
            ctx.push
                .push_room(
                    room_id,
                    cmd::PUSH_ANIMAL_LEFT,
                    &proto::AnimalLeftPush { id: victim.id },
                )
                .await;
        }
        push_room_events(ctx, room_id, respawn_events).await;
    }

    if let Some(hit) = jackpot_hit {
        info!(
            "user {} triggered the jackpot for {} (pool now {})",
            session.user_id, hit.win, hit.pool_after
        );
        ctx.push
            .push_room(
                room_id,
                cmd::PUSH_JACKPOT_WIN,
                &proto::JackpotWinPush {
                    user_id: session.user_id,
                    nickname: session.nickname.clone(),
                    amount: hit.win,
                },
            )
            .await;
        ctx.push
            .push_room(
                room_id,
                cmd::PUSH_JACKPOT_AMOUNT,
                &proto::JackpotAmountPush {
                    amount: hit.pool_after,
                },
            )
            .await;
    }

    if resolution.win_total > 0 {
        if let Some(primary) = resolution.victims.first() {
            ctx.record_reward(proto::RewardEntry {
                user_id: session.user_id,
                nickname: session.nickname.clone(),
                kind: primary.kind as i32,
                win: resolution.win_total,
                at: Utc::now().timestamp(),
            });
        }
    }

    let resp = proto::BetResponse {
        balance: outcome.wallet.balance,
        win: resolution.win_total,
        red_bag: resolution.red_bag_total,
        total_win,
        gold: resolution.gold,
        jackpot_win: jackpot_hit.map(|h| h.win).unwrap_or(0),
        skills: skills_wire(&outcome.wallet.skills),
        free_gold: outcome.wallet.free_coins,
    };
    Ok(ServerFrame::reply(
        frame.cmd,
        frame.flag,
        proto::encode_body(&resp),
    ))
}

/// Forward spawn events produced while the room lock was held.
async fn push_room_events(
    ctx: &GameContext,
    room_id: u32,
    events: Vec<crate::game::animal::room::RoomEvent>,
) {
    use crate::game::animal::room::RoomEvent;
    for event in events {
        match event {
            RoomEvent::EntityEntered(info) => {
                ctx.push
                    .push_room(
                        room_id,
                        cmd::PUSH_ANIMAL_ENTERED,
                        &proto::AnimalEnteredPush {
                            animal: Some(info),
                        },
                    )
                    .await;
            }
            RoomEvent::EntityLeft(id) => {
                ctx.push
                    .push_room(room_id, cmd::PUSH_ANIMAL_LEFT, &proto::AnimalLeftPush { id })
                    .await;
            }
            RoomEvent::EntityComing {
                kind,
                countdown_secs,
            } => {
                ctx.push
                    .push_room(
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
}

async fn record(
    ctx: &GameContext,
    session: &Arc<Session>,
    frame: &ClientFrame,
) -> Result<ServerFrame, GameError> {
    let _req = proto::RecordRequest::decode(frame.data.clone())?;
    let results = ctx.wallet.recent_results(session.user_id, LISTING_LIMIT)?;
    let resp = proto::RecordResponse {
        records: results
            .into_iter()
            .map(|r| proto::GameRecord {
                round_id: r.round_id,
                bet: r.bet,
                win: r.win,
                multiplier: r.multiplier,
                played_at: r.played_at.timestamp(),
                is_jackpot: r.is_jackpot,
            })
            .collect(),
    };
    Ok(ServerFrame::reply(
        frame.cmd,
        frame.flag,
        proto::encode_body(&resp),
    ))
}

fn recent_rewards(ctx: &GameContext, frame: &ClientFrame) -> Result<ServerFrame, GameError> {
    let resp = proto::RecentRewardsResponse {
        rewards: ctx.recent_rewards(LISTING_LIMIT),
    };
    Ok(ServerFrame::reply(
        frame.cmd,
        frame.flag,
        proto::encode_body(&resp),
    ))
}

async fn use_skill(
    ctx: &GameContext,
    session: &Arc<Session>,
    frame: &ClientFrame,
) -> Result<ServerFrame, GameError> {
    let req = proto::UseSkillRequest::decode(frame.data.clone())?;
    let skill = SkillKind::from_wire(req.skill)
        .ok_or_else(|| GameError::InvalidParam(format!("skill {}", req.skill)))?;
    let room_id = session.room_id();
    if room_id == 0 {
        return Err(GameError::GameState("skill outside a room".into()));
    }
    let room = ctx
        .rooms
        .get(room_id)
        .await
        .ok_or_else(|| GameError::GameState(format!("room {} is gone", room_id)))?;

    let mut duration = 0u32;
    let remaining_charges;
    {
        let mut state = room.state.lock().await;
        state.last_activity = Instant::now();
        // Validate the target before spending a charge.
        if skill == SkillKind::Lock && !state.entities.contains_key(&req.animal_id) {
            return Err(GameError::NotFound(format!("animal {}", req.animal_id)));
        }
        let wallet = ctx.wallet.consume_skill(session.user_id, skill as u8)?;
        remaining_charges = wallet.skills.get(&(skill as u8)).copied().unwrap_or(0);
        match skill {
            SkillKind::Ice => {
                state.freeze_all(FREEZE_SECS, Instant::now());
                duration = FREEZE_SECS as u32;
            }
            SkillKind::Lock => {
                if let Some(entity) = state.entities.get_mut(&req.animal_id) {
                    entity.lock_holder = Some(session.user_id);
                }
            }
            SkillKind::OneBlow => {
                state.one_blow.insert(session.user_id);
            }
        }
    }

    ctx.push
        .push_room_except(
            room_id,
            cmd::PUSH_SKILL_USED,
            &proto::SkillUsedPush {
                user_id: session.user_id,
                skill: skill as u8 as i32,
                animal_id: req.animal_id,
                duration_secs: duration,
            },
            session.id,
        )
        .await;

    let resp = proto::UseSkillResponse {
        ok: true,
        remaining: duration,
        count: remaining_charges,
    };
    Ok(ServerFrame::reply(
        frame.cmd,
        frame.flag,
        proto::encode_body(&resp),
    ))
}

async fn room_list(ctx: &GameContext, frame: &ClientFrame) -> Result<ServerFrame, GameError> {
    let occupancy = ctx.rooms.occupancy().await;
    let resp = proto::RoomListResponse {
        rooms: RoomKind::ALL
            .iter()
            .map(|kind| proto::RoomInfo {
                kind: kind.to_wire(),
                bet_values: kind.bet_values().to_vec(),
                min_vip: kind.min_vip() as u32,
                players: occupancy.get(kind).copied().unwrap_or(0) as u32,
                capacity: kind.capacity() as u32,
            })
            .collect(),
    };
    Ok(ServerFrame::reply(
        frame.cmd,
        frame.flag,
        proto::encode_body(&resp),
    ))
}

fn buy_tool(
    ctx: &GameContext,
    session: &Arc<Session>,
    frame: &ClientFrame,
) -> Result<ServerFrame, GameError> {
    let req = proto::BuyToolRequest::decode(frame.data.clone())?;
    let tool = SkillKind::from_wire(req.tool)
        .ok_or_else(|| GameError::InvalidParam(format!("tool {}", req.tool)))?;
    let count = req.count.max(1);
    let cost = tool.price() * count as i64;
    ctx.wallet.debit(session.user_id, cost)?;
    let wallet = ctx.wallet.add_skill(session.user_id, tool as u8, count)?;
    let resp = proto::BuyToolResponse {
        balance: wallet.balance,
        skills: skills_wire(&wallet.skills),
    };
    Ok(ServerFrame::reply(
        frame.cmd,
        frame.flag,
        proto::encode_body(&resp),
    ))
}

fn tool_price(frame: &ClientFrame) -> Result<ServerFrame, GameError> {
    let resp = proto::ToolPriceResponse {
        prices: SkillKind::ALL
            .iter()
            .map(|s| proto::ToolPrice {
                tool: *s as u8 as i32,
                price: s.price(),
            })
            .collect(),
    };
    Ok(ServerFrame::reply(
        frame.cmd,
        frame.flag,
        proto::encode_body(&resp),
    ))
}

fn jackpot_history(ctx: &GameContext, frame: &ClientFrame) -> Result<ServerFrame, GameError> {
    let records = ctx.wallet.jackpot_history(GameId::Animal, 50)?;
    let resp = proto::JackpotHistoryResponse {
        records: records
            .into_iter()
            .map(|r| proto::JackpotRecord {
                user_id: r.user_id,
                nickname: r.nickname,
                amount: r.amount,
                at: r.at.timestamp(),
            })
            .collect(),
    };
    Ok(ServerFrame::reply(
        frame.cmd,
        frame.flag,
        proto::encode_body(&resp),
    ))
}

async fn fire_bullet(
    ctx: &GameContext,
    session: &Arc<Session>,
    frame: &ClientFrame,
) -> Result<ServerFrame, GameError> {
    let req = proto::FireBulletRequest::decode(frame.data.clone())?;
    if req.amount <= 0 {
        return Err(GameError::InvalidBet("bullet amount must be positive".into()));
    }
    let multiplier = req.multiplier.max(1);
    if multiplier > MAX_MULTIPLIER {
        return Err(GameError::InvalidBet(format!(
            "multiplier {} exceeds {}",
            multiplier, MAX_MULTIPLIER
        )));
    }
    // The fire debits the full stake; the matching hit credits any win.
    let wallet = ctx
        .wallet
        .debit(session.user_id, req.amount * multiplier as i64)?;
    let bullet = ctx.bullets.fire(session.user_id, req.amount, multiplier).await;
    let resp = proto::FireBulletResponse {
        bullet_id: bullet.id.to_string(),
        balance: wallet.balance,
    };
    Ok(ServerFrame::reply(
        frame.cmd,
        frame.flag,
        proto::encode_body(&resp),
    ))
}
