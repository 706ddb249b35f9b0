//! Fired bullets: up-front debit, single use, and the no-refund expiry
//! policy.

mod common;

use common::{build_ctx, connect, decode_ok, request};
use menagerie::config::Config;
use menagerie::game::animal::room::{Entity, EntityState};
use menagerie::game::animal::types::AnimalKind;
use menagerie::net::session::Endpoint;
use menagerie::proto;
use menagerie::protocol::cmd;
use menagerie::router;
use tokio::time::Instant;

const START_BALANCE: i64 = 50_000;

#[tokio::test]
async fn fire_debits_and_hit_credits() {
    let harness = build_ctx(Config::default(), None);
    let (session, _rx) = connect(&harness, 1, Endpoint::Animal).await;

    let frame = request(
        cmd::ANIMAL_ENTER_ROOM,
        1,
        &proto::EnterRoomRequest { kind: 1 },
    );
    let resp: proto::EnterRoomResponse =
        decode_ok(&router::dispatch(&harness.ctx, &session, frame).await);

    // Fire: the stake leaves the wallet immediately.
    let frame = request(
        cmd::ANIMAL_FIRE_BULLET,
        2,
        &proto::FireBulletRequest {
            amount: 100,
            multiplier: 2,
        },
    );
    let fired: proto::FireBulletResponse =
        decode_ok(&router::dispatch(&harness.ctx, &session, frame).await);
    assert_eq!(fired.balance, START_BALANCE - 200);
    assert!(!fired.bullet_id.is_empty());

    // Plant a target and force the hit.
    let room = harness.ctx.rooms.get(resp.room_id).await.unwrap();
    {
        let mut state = room.state.lock().await;
        state.entities.insert(
            7001,
            Entity {
                id: 7001,
                kind: AnimalKind::Horse,
                path_id: 1,
                progress: 0.3,
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
        state.one_blow.insert(session.user_id);
    }

    let frame = request(
        cmd::ANIMAL_BET,
        3,
        &proto::BetRequest {
            animal_id: 7001,
            bullet_id: fired.bullet_id.clone(),
            bet_value: 0,
            multiplier: 0,
        },
    );
    let bet: proto::BetResponse =
        decode_ok(&router::dispatch(&harness.ctx, &session, frame).await);
    // The bullet carried the stake: only the win moves the balance now.
    assert!(bet.win > 0);
    assert_eq!(bet.balance, START_BALANCE - 200 + bet.win);
    // Net position across fire and hit: win minus stake.
    assert_eq!(bet.balance - START_BALANCE, bet.win - 200);

    // A bullet is single use.
    let frame = request(
        cmd::ANIMAL_BET,
        4,
        &proto::BetRequest {
            animal_id: 7001,
            bullet_id: fired.bullet_id,
            bet_value: 0,
            multiplier: 0,
        },
    );
    let reply = router::dispatch(&harness.ctx, &session, frame).await;
    assert_ne!(reply.error_id, 0);
}

#[tokio::test]
async fn fire_with_insufficient_balance_fails() {
    let harness = build_ctx(Config::default(), None);
    let (session, _rx) = connect(&harness, 2, Endpoint::Animal).await;
    let frame = request(
        cmd::ANIMAL_FIRE_BULLET,
        1,
        &proto::FireBulletRequest {
            amount: START_BALANCE,
            multiplier: 2,
        },
    );
    let reply = router::dispatch(&harness.ctx, &session, frame).await;
    assert_eq!(reply.error_id, 1102);
    assert_eq!(
        harness.ctx.wallet.get_by_user_id(2).unwrap().balance,
        START_BALANCE
    );
}

#[tokio::test(start_paused = true)]
async fn expired_bullet_keeps_the_debit() {
    let harness = build_ctx(Config::default(), None);
    let (session, _rx) = connect(&harness, 3, Endpoint::Animal).await;
    let frame = request(
        cmd::ANIMAL_ENTER_ROOM,
        1,
        &proto::EnterRoomRequest { kind: 1 },
    );
    let resp: proto::EnterRoomResponse =
        decode_ok(&router::dispatch(&harness.ctx, &session, frame).await);

    let frame = request(
        cmd::ANIMAL_FIRE_BULLET,
        2,
        &proto::FireBulletRequest {
            amount: 100,
            multiplier: 1,
        },
    );
    let fired: proto::FireBulletResponse =
        decode_ok(&router::dispatch(&harness.ctx, &session, frame).await);

    tokio::time::advance(std::time::Duration::from_secs(31)).await;

    let frame = request(
        cmd::ANIMAL_BET,
        3,
        &proto::BetRequest {
            animal_id: resp.animals[0].id,
            bullet_id: fired.bullet_id,
            bet_value: 0,
            multiplier: 0,
        },
    );
    let reply = router::dispatch(&harness.ctx, &session, frame).await;
    assert_ne!(reply.error_id, 0, "expired bullet cannot be used");

    // The shot that never resolved keeps its debit.
    assert_eq!(
        harness.ctx.wallet.get_by_user_id(3).unwrap().balance,
        START_BALANCE - 100
    );
    // The sweep reclaims the handle.
    let reclaimed = harness.ctx.bullets.sweep().await;
    assert!(reclaimed.is_empty(), "take already removed the expired bullet");
}
