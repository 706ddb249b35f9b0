//! Room-scoped broadcast fan-out.
//!
//! Encodes a push payload once, resolves the room's membership through the
//! session store, and enqueues the frame on every target's send queue. A full
//! queue is a soft drop (the client is lagging and will resync on its next
//! request); a closed queue marks a dead connection, which is reaped. No
//! ordering is guaranteed across rooms or between targets of one call.

use std::sync::Arc;

use bytes::Bytes;
use log::{debug, warn};
use prost::Message;
use uuid::Uuid;

use crate::net::session::SessionStore;
use crate::protocol::ServerFrame;

pub struct PushManager {
    sessions: Arc<SessionStore>,
}

impl PushManager {
    pub fn new(sessions: Arc<SessionStore>) -> Self {
        Self { sessions }
    }

    /// Push a typed payload to every member of a room.
    pub async fn push_room<M: Message>(&self, room_id: u32, cmd: u16, body: &M) {
        self.push_room_raw(room_id, cmd, crate::proto::encode_body(body), None, None)
            .await;
    }

    /// Push to every member except one (the actor already got a response).
    pub async fn push_room_except<M: Message>(
        &self,
        room_id: u32,
        cmd: u16,
        body: &M,
        except: Uuid,
    ) {
        self.push_room_raw(
            room_id,
            cmd,
            crate::proto::encode_body(body),
            None,
            Some(except),
        )
        .await;
    }

    /// Push to an explicit target subset of a room.
    pub async fn push_targets<M: Message>(
        &self,
        room_id: u32,
        cmd: u16,
        body: &M,
        targets: &[Uuid],
    ) {
        self.push_room_raw(
            room_id,
            cmd,
            crate::proto::encode_body(body),
            Some(targets),
            None,
        )
        .await;
    }

    async fn push_room_raw(
        &self,
        room_id: u32,
        cmd: u16,
        data: Bytes,
        targets: Option<&[Uuid]>,
        except: Option<Uuid>,
    ) {
        if room_id == 0 {
            return;
        }
        let frame = ServerFrame::push(cmd, data);
        let members = self.sessions.room_members(room_id).await;
        let mut dead = Vec::new();
        for member in members {
            if Some(member.id) == except {
                continue;
            }
            if let Some(list) = targets {
                if !list.contains(&member.id) {
                    continue;
                }
            }
            if member.is_closed() {
                dead.push(member.id);
                continue;
            }
            if member.try_send(frame.clone()).is_err() {
                // Queue full or receiver gone. Broadcast drops are soft.
                debug!(
                    "push {} to session {} dropped (queue full or closed)",
                    cmd, member.id
                );
            }
        }
        for id in dead {
            warn!("reaping dead session {} during push", id);
            if let Some(session) = self.sessions.remove(id).await {
                session.close();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::session::{Endpoint, Session};
    use crate::proto;
    use crate::protocol::cmd;

    #[tokio::test]
    async fn pushes_reach_only_room_members() {
        let sessions = Arc::new(SessionStore::new());
        let push = PushManager::new(sessions.clone());

        let (a, mut a_rx, _ad) = Session::new(1, "a".into(), Endpoint::Animal);
        let (b, mut b_rx, _bd) = Session::new(2, "b".into(), Endpoint::Animal);
        sessions.add(a.clone()).await;
        sessions.add(b.clone()).await;
        sessions.join_room(a.id, 3).await;
        sessions.join_room(b.id, 4).await;

        let body = proto::AnimalLeftPush { id: 17 };
        push.push_room(3, cmd::PUSH_ANIMAL_LEFT, &body).await;

        let frame = a_rx.recv().await.expect("member receives push");
        assert_eq!(frame.cmd, cmd::PUSH_ANIMAL_LEFT);
        assert_eq!(frame.flag, 0);
        assert_eq!(frame.error_id, 0);
        assert!(b_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn except_filter_skips_the_actor() {
        let sessions = Arc::new(SessionStore::new());
        let push = PushManager::new(sessions.clone());

        let (a, mut a_rx, _ad) = Session::new(1, "a".into(), Endpoint::Animal);
        let (b, mut b_rx, _bd) = Session::new(2, "b".into(), Endpoint::Animal);
        sessions.add(a.clone()).await;
        sessions.add(b.clone()).await;
        sessions.join_room(a.id, 9).await;
        sessions.join_room(b.id, 9).await;

        let body = proto::HitPush {
            role_id: 1,
            animal_id: 5,
        };
        push.push_room_except(9, cmd::PUSH_PLAYER_HIT, &body, a.id)
            .await;

        assert!(a_rx.try_recv().is_err());
        assert!(b_rx.recv().await.is_some());
    }

    #[tokio::test]
    async fn closed_sessions_are_reaped() {
        let sessions = Arc::new(SessionStore::new());
        let push = PushManager::new(sessions.clone());

        let (a, _a_rx, _ad) = Session::new(1, "a".into(), Endpoint::Animal);
        sessions.add(a.clone()).await;
        sessions.join_room(a.id, 2).await;
        a.close();

        let body = proto::AnimalLeftPush { id: 1 };
        push.push_room(2, cmd::PUSH_ANIMAL_LEFT, &body).await;
        assert!(sessions.get(a.id).await.is_none());
    }
}
