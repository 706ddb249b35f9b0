//! Jackpot trigger through a full bet: payout bounds, pool reset, durable
//! history, and the win pushes.

mod common;

use common::{build_ctx, connect, decode_ok, drain, request};
use menagerie::config::Config;
use menagerie::game::animal::room::{Entity, EntityState};
use menagerie::game::animal::types::AnimalKind;
use menagerie::net::session::Endpoint;
use menagerie::proto;
use menagerie::protocol::cmd;
use menagerie::router;
use menagerie::wallet::GameId;
use prost::Message;
use tokio::time::Instant;

const POOL: i64 = 10_000_000;

fn jackpot_config() -> Config {
    let mut config = Config::default();
    config.games.animal.jackpot.initial = 1_000_000;
    config.games.animal.jackpot.min_trigger = POOL;
    config.games.animal.jackpot.trigger_prob = 1.0;
    config
}

async fn plant_elephant(harness: &common::Harness, room_id: u32, id: u32) {
    let room = harness.ctx.rooms.get(room_id).await.expect("room");
    room.state.lock().await.entities.insert(
        id,
        Entity {
            id,
            kind: AnimalKind::Elephant,
            path_id: 9,
            progress: 0.5,
            progress_rate: 0.01,
            state: EntityState::Normal,
            freeze_until: None,
            lock_holder: None,
            hp: 1,
            odds_boost: 1.0,
            has_red_bag: false,
            spawned_at: Instant::now(),
        },
    );
}

#[tokio::test]
async fn elephant_kill_triggers_the_jackpot() {
    let harness = build_ctx(jackpot_config(), Some(POOL));
    let (session, mut rx) = connect(&harness, 1, Endpoint::Animal).await;

    let frame = request(
        cmd::ANIMAL_ENTER_ROOM,
        1,
        &proto::EnterRoomRequest { kind: 1 },
    );
    let resp: proto::EnterRoomResponse =
        decode_ok(&router::dispatch(&harness.ctx, &session, frame).await);
    assert_eq!(resp.jackpot_amount, POOL);

    plant_elephant(&harness, resp.room_id, 8001).await;
    {
        let room = harness.ctx.rooms.get(resp.room_id).await.unwrap();
        room.state.lock().await.one_blow.insert(session.user_id);
    }
    drain(&mut rx);

    let frame = request(
        cmd::ANIMAL_BET,
        2,
        &proto::BetRequest {
            animal_id: 8001,
            bullet_id: String::new(),
            bet_value: 100,
            multiplier: 1,
        },
    );
    let bet: proto::BetResponse =
        decode_ok(&router::dispatch(&harness.ctx, &session, frame).await);

    // Payout is a uniform share in [0.5, 1.0] of the pool.
    assert!(
        bet.jackpot_win >= POOL / 2 && bet.jackpot_win <= POOL,
        "jackpot win {} outside bounds",
        bet.jackpot_win
    );

    // Pool reset to residual plus a tenth of the initial seed, both in
    // memory and in the durable row.
    let expected_pool = POOL - bet.jackpot_win + 100_000;
    {
        let pool = harness.ctx.animal_jackpot.lock().unwrap();
        assert_eq!(pool.amount(), expected_pool);
        assert_eq!(pool.history().count(), 1);
    }
    let durable = harness
        .ctx
        .wallet
        .load_jackpot_pool(GameId::Animal, 0)
        .unwrap();
    assert_eq!(durable, expected_pool);

    // Exactly one durable trigger row, reported by the history listing.
    let frame = request(
        cmd::ANIMAL_JACKPOT_HISTORY,
        3,
        &proto::JackpotHistoryRequest {},
    );
    let history: proto::JackpotHistoryResponse =
        decode_ok(&router::dispatch(&harness.ctx, &session, frame).await);
    assert_eq!(history.records.len(), 1);
    assert_eq!(history.records[0].amount, bet.jackpot_win);
    assert_eq!(history.records[0].user_id, session.user_id);

    // The jackpot credits gold, not the cash balance.
    let wallet = harness.ctx.wallet.get_by_user_id(1).unwrap();
    assert_eq!(wallet.coins, bet.jackpot_win);
    assert_eq!(wallet.balance, 50_000 - 100 + bet.win);

    // The result row is marked as a jackpot round.
    let rows = harness.ctx.wallet.recent_results(1, 5).unwrap();
    assert!(rows[0].is_jackpot);

    // The winner's own queue saw the win and the residual-pool pushes.
    let frames = drain(&mut rx);
    let win_push = frames
        .iter()
        .find(|f| f.cmd == cmd::PUSH_JACKPOT_WIN)
        .expect("jackpot win push");
    let decoded = proto::JackpotWinPush::decode(win_push.data.clone()).unwrap();
    assert_eq!(decoded.amount, bet.jackpot_win);
    let amount_push = frames
        .iter()
        .find(|f| f.cmd == cmd::PUSH_JACKPOT_AMOUNT)
        .expect("pool amount push");
    let decoded = proto::JackpotAmountPush::decode(amount_push.data.clone()).unwrap();
    assert_eq!(decoded.amount, expected_pool);
}

#[tokio::test]
async fn pool_below_minimum_never_triggers() {
    let harness = build_ctx(jackpot_config(), Some(POOL - 1));
    let (session, _rx) = connect(&harness, 2, Endpoint::Animal).await;
    let frame = request(
        cmd::ANIMAL_ENTER_ROOM,
        1,
        &proto::EnterRoomRequest { kind: 1 },
    );
    let resp: proto::EnterRoomResponse =
        decode_ok(&router::dispatch(&harness.ctx, &session, frame).await);
    plant_elephant(&harness, resp.room_id, 8002).await;
    {
        let room = harness.ctx.rooms.get(resp.room_id).await.unwrap();
        room.state.lock().await.one_blow.insert(session.user_id);
    }

    let frame = request(
        cmd::ANIMAL_BET,
        2,
        &proto::BetRequest {
            animal_id: 8002,
            bullet_id: String::new(),
            bet_value: 100,
            multiplier: 1,
        },
    );
    let bet: proto::BetResponse =
        decode_ok(&router::dispatch(&harness.ctx, &session, frame).await);
    assert_eq!(bet.jackpot_win, 0);
    // The wager accumulated its share instead.
    let pool = harness.ctx.animal_jackpot.lock().unwrap();
    assert_eq!(pool.amount(), POOL - 1 + 1);
}

#[tokio::test]
async fn ordinary_kills_accumulate_without_triggering() {
    let harness = build_ctx(jackpot_config(), Some(POOL * 2));
    let (session, _rx) = connect(&harness, 3, Endpoint::Animal).await;
    let frame = request(
        cmd::ANIMAL_ENTER_ROOM,
        1,
        &proto::EnterRoomRequest { kind: 1 },
    );
    let resp: proto::EnterRoomResponse =
        decode_ok(&router::dispatch(&harness.ctx, &session, frame).await);

    // A turtle is never jackpot-eligible, even with the pool far over the
    // minimum and the trigger probability at one.
    let room = harness.ctx.rooms.get(resp.room_id).await.unwrap();
    room.state.lock().await.entities.insert(
        8003,
        Entity {
            id: 8003,
            kind: AnimalKind::Turtle,
            path_id: 1,
            progress: 0.2,
            progress_rate: 0.01,
            state: EntityState::Normal,
            freeze_until: None,
            lock_holder: None,
            hp: 1,
            odds_boost: 1.0,
            has_red_bag: false,
            spawned_at: Instant::now(),
        },
    );
    room.state.lock().await.one_blow.insert(session.user_id);

    let frame = request(
        cmd::ANIMAL_BET,
        2,
        &proto::BetRequest {
            animal_id: 8003,
            bullet_id: String::new(),
            bet_value: 100,
            multiplier: 1,
        },
    );
    let bet: proto::BetResponse =
        decode_ok(&router::dispatch(&harness.ctx, &session, frame).await);
    assert_eq!(bet.jackpot_win, 0);
    let pool = harness.ctx.animal_jackpot.lock().unwrap();
    assert_eq!(pool.amount(), POOL * 2 + 1);
}
