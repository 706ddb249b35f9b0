//! WebSocket transport: listener-side handshake and per-connection tasks.
//!
//! One endpoint per game surface (`/ws/animal`, `/ws/slot`, `/ws/game`),
//! selected by the upgrade request path. Player identity arrives in the
//! query string (`uid`, `name`); verifying tokens is the job of the external
//! auth surface in front of this server.

pub mod connection;
pub mod session;

use std::sync::Arc;

use log::{info, warn};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::handshake::server::{
    ErrorResponse, Request, Response,
};

use crate::game::GameContext;
use crate::net::connection::ConnTimeouts;
use crate::net::session::{Endpoint, Session};

/// Identity pulled out of the upgrade request.
#[derive(Debug, Clone)]
struct Hello {
    endpoint: Endpoint,
    user_id: u64,
    nickname: String,
}

fn parse_hello(req: &Request) -> Result<Hello, &'static str> {
    let path = req.uri().path();
    let endpoint = Endpoint::from_path(path).ok_or("unknown endpoint")?;
    let query = req.uri().query().unwrap_or("");
    let mut user_id = None;
    let mut nickname = None;
    for pair in query.split('&') {
        let mut kv = pair.splitn(2, '=');
        match (kv.next(), kv.next()) {
            (Some("uid"), Some(v)) => user_id = v.parse::<u64>().ok(),
            (Some("name"), Some(v)) => nickname = Some(v.to_string()),
            _ => {}
        }
    }
    let user_id = user_id.filter(|id| *id != 0).ok_or("missing uid")?;
    Ok(Hello {
        endpoint,
        user_id,
        nickname: nickname.unwrap_or_else(|| format!("player{}", user_id)),
    })
}

/// Upgrade one accepted TCP stream and run its connection to completion.
pub async fn serve_connection(stream: TcpStream, ctx: Arc<GameContext>) {
    let peer = stream
        .peer_addr()
        .map(|a| a.to_string())
        .unwrap_or_else(|_| "unknown".into());

    let mut hello: Option<Hello> = None;
    let callback = |req: &Request, resp: Response| match parse_hello(req) {
        Ok(parsed) => {
            hello = Some(parsed);
            Ok(resp)
        }
        Err(reason) => {
            let mut rejection = ErrorResponse::new(Some(reason.to_string()));
            *rejection.status_mut() = tokio_tungstenite::tungstenite::http::StatusCode::NOT_FOUND;
            Err(rejection)
        }
    };

    let ws = match tokio_tungstenite::accept_hdr_async(stream, callback).await {
        Ok(ws) => ws,
        Err(e) => {
            warn!("handshake with {} failed: {}", peer, e);
            return;
        }
    };
    let hello = hello.expect("callback ran on success");

    let config = ctx.config();
    let timeouts = ConnTimeouts {
        read: std::time::Duration::from_secs(config.server.read_timeout),
        write: std::time::Duration::from_secs(config.server.write_timeout),
    };

    // Player rows are created lazily on first contact.
    if let Err(e) = ctx.wallet.get_or_create_user(hello.user_id, &hello.nickname) {
        warn!("user bootstrap failed for {}: {}", hello.user_id, e);
        return;
    }

    let (session, outbound_rx, done_rx) =
        Session::new(hello.user_id, hello.nickname, hello.endpoint);
    session.touch();
    ctx.sessions.add(session.clone()).await;
    info!(
        "session {} opened by user {} from {} on {:?}",
        session.id, session.user_id, peer, session.endpoint
    );

    connection::run(ws, session, outbound_rx, done_rx, ctx, timeouts).await;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(uri: &str) -> Request {
        Request::builder().uri(uri).body(()).unwrap()
    }

    #[test]
    fn parses_endpoint_and_identity() {
        let hello = parse_hello(&request("/ws/animal?uid=42&name=ada")).unwrap();
        assert_eq!(hello.endpoint, Endpoint::Animal);
        assert_eq!(hello.user_id, 42);
        assert_eq!(hello.nickname, "ada");
    }

    #[test]
    fn nickname_defaults_from_uid() {
        let hello = parse_hello(&request("/ws/game?uid=7")).unwrap();
        assert_eq!(hello.endpoint, Endpoint::Game);
        assert_eq!(hello.nickname, "player7");
    }

    #[test]
    fn unknown_path_is_rejected() {
        assert!(parse_hello(&request("/ws/other?uid=7")).is_err());
    }

    #[test]
    fn missing_or_zero_uid_is_rejected() {
        assert!(parse_hello(&request("/ws/slot")).is_err());
        assert!(parse_hello(&request("/ws/slot?uid=0")).is_err());
        assert!(parse_hello(&request("/ws/slot?uid=abc")).is_err());
    }
}
