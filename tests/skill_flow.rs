//! Tool purchase, skill use, and the reward listings.

mod common;

use common::{build_ctx, connect, decode_ok, drain, request};
use menagerie::config::Config;
use menagerie::net::session::Endpoint;
use menagerie::proto;
use menagerie::protocol::cmd;
use menagerie::router;

const START_BALANCE: i64 = 50_000;

#[tokio::test]
async fn buy_and_use_ice_skill() {
    let harness = build_ctx(Config::default(), None);
    let (session, _rx) = connect(&harness, 1, Endpoint::Animal).await;
    let (spectator, mut spectator_rx) = connect(&harness, 2, Endpoint::Animal).await;

    let frame = request(
        cmd::ANIMAL_ENTER_ROOM,
        1,
        &proto::EnterRoomRequest { kind: 0 },
    );
    let resp: proto::EnterRoomResponse =
        decode_ok(&router::dispatch(&harness.ctx, &session, frame).await);
    let frame = request(
        cmd::ANIMAL_ENTER_ROOM,
        1,
        &proto::EnterRoomRequest { kind: 0 },
    );
    decode_ok::<proto::EnterRoomResponse>(
        &router::dispatch(&harness.ctx, &spectator, frame).await,
    );
    drain(&mut spectator_rx);

    // Price list names the ice skill.
    let frame = request(cmd::ANIMAL_TOOL_PRICE, 2, &proto::ToolPriceRequest {});
    let prices: proto::ToolPriceResponse =
        decode_ok(&router::dispatch(&harness.ctx, &session, frame).await);
    let ice = prices.prices.iter().find(|p| p.tool == 1).expect("ice price");

    // Buying debits the wallet and grows the inventory.
    let frame = request(
        cmd::ANIMAL_BUY_TOOL,
        3,
        &proto::BuyToolRequest { tool: 1, count: 2 },
    );
    let bought: proto::BuyToolResponse =
        decode_ok(&router::dispatch(&harness.ctx, &session, frame).await);
    assert_eq!(bought.balance, START_BALANCE - 2 * ice.price);
    assert_eq!(
        bought
            .skills
            .iter()
            .find(|s| s.skill == 1)
            .map(|s| s.count),
        Some(2)
    );

    // Using it freezes the room and tells the spectators.
    let frame = request(
        cmd::ANIMAL_USE_SKILL,
        4,
        &proto::UseSkillRequest {
            skill: 1,
            animal_id: 0,
        },
    );
    let used: proto::UseSkillResponse =
        decode_ok(&router::dispatch(&harness.ctx, &session, frame).await);
    assert!(used.ok);
    assert_eq!(used.remaining, 10);
    assert_eq!(used.count, 1);

    let room = harness.ctx.rooms.get(resp.room_id).await.unwrap();
    {
        let state = room.state.lock().await;
        assert!(state.frozen_until.is_some());
    }

    let frames = drain(&mut spectator_rx);
    assert!(frames.iter().any(|f| f.cmd == cmd::PUSH_SKILL_USED));
}

#[tokio::test]
async fn skill_without_charges_is_rejected() {
    let harness = build_ctx(Config::default(), None);
    let (session, _rx) = connect(&harness, 3, Endpoint::Animal).await;
    let frame = request(
        cmd::ANIMAL_ENTER_ROOM,
        1,
        &proto::EnterRoomRequest { kind: 0 },
    );
    decode_ok::<proto::EnterRoomResponse>(&router::dispatch(&harness.ctx, &session, frame).await);

    let frame = request(
        cmd::ANIMAL_USE_SKILL,
        2,
        &proto::UseSkillRequest {
            skill: 3,
            animal_id: 0,
        },
    );
    let reply = router::dispatch(&harness.ctx, &session, frame).await;
    assert_ne!(reply.error_id, 0);
}

#[tokio::test]
async fn wins_appear_in_recent_rewards() {
    let harness = build_ctx(Config::default(), None);
    let (session, _rx) = connect(&harness, 4, Endpoint::Animal).await;
    let frame = request(
        cmd::ANIMAL_ENTER_ROOM,
        1,
        &proto::EnterRoomRequest { kind: 0 },
    );
    let resp: proto::EnterRoomResponse =
        decode_ok(&router::dispatch(&harness.ctx, &session, frame).await);

    // Force a win so the feed has one entry.
    let room = harness.ctx.rooms.get(resp.room_id).await.unwrap();
    room.state.lock().await.one_blow.insert(session.user_id);
    let target = resp.animals[0].id;
    let frame = request(
        cmd::ANIMAL_BET,
        2,
        &proto::BetRequest {
            animal_id: target,
            bullet_id: String::new(),
            bet_value: 50,
            multiplier: 1,
        },
    );
    let bet: proto::BetResponse =
        decode_ok(&router::dispatch(&harness.ctx, &session, frame).await);

    let frame = request(
        cmd::ANIMAL_RECENT_REWARDS,
        3,
        &proto::RecentRewardsRequest {},
    );
    let rewards: proto::RecentRewardsResponse =
        decode_ok(&router::dispatch(&harness.ctx, &session, frame).await);
    if bet.win > 0 {
        assert_eq!(rewards.rewards[0].user_id, session.user_id);
        assert_eq!(rewards.rewards[0].win, bet.win);
    } else {
        // A bomber target pays nothing directly; the feed stays empty.
        assert!(rewards.rewards.is_empty());
    }
}
