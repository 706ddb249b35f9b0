//! Binary frame codec for the WebSocket protocol.
//!
//! Two framings coexist on the live endpoints:
//!
//! Client to server, 9-byte header:
//!
//!   `DataSize(u16 BE) | DataStatus(u8) | Flag(u32 BE) | Cmd(u16 BE) | Data`
//!
//! Server to client, 11-byte header:
//!
//!   `ErrorID(u16 BE) | DataSize(u16 BE) | DataStatus(u8) | Flag(u32 BE) | Cmd(u16 BE) | Data`
//!
//! `DataSize` counts payload bytes only, excluding the header. `Flag` is an
//! opaque client correlation token echoed verbatim in the response; pushes
//! carry `Flag = 0`. `ErrorID = 0` means success.
//!
//! A legacy framing used on some endpoints prefixes
//! `Length(u32 BE) | MsgID(u16 BE) | Payload` where `Length` counts the
//! `MsgID` plus payload bytes.
//!
//! Payload bytes are opaque here; typed encode/decode happens per command id
//! at the handler boundary against the generated message types.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::errors::GameError;

pub mod cmd;

/// Client header length in bytes.
pub const CLIENT_HEADER_LEN: usize = 9;
/// Server header length in bytes.
pub const SERVER_HEADER_LEN: usize = 11;
/// Legacy header length in bytes.
pub const LEGACY_HEADER_LEN: usize = 6;

/// An inbound frame decoded from a binary WebSocket message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientFrame {
    pub status: u8,
    pub flag: u32,
    pub cmd: u16,
    pub data: Bytes,
}

/// An outbound frame about to be written as a binary WebSocket message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerFrame {
    pub error_id: u16,
    pub status: u8,
    pub flag: u32,
    pub cmd: u16,
    pub data: Bytes,
}

/// A frame in the legacy length-prefixed framing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegacyFrame {
    pub msg_id: u16,
    pub payload: Bytes,
}

impl ClientFrame {
    pub fn new(cmd: u16, flag: u32, data: Bytes) -> Self {
        Self {
            status: 0,
            flag,
            cmd,
            data,
        }
    }

    /// Decode one client frame from a complete WebSocket binary message.
    /// The declared `DataSize` must match the remaining bytes exactly.
    pub fn decode(mut buf: &[u8]) -> Result<Self, GameError> {
        if buf.len() < CLIENT_HEADER_LEN {
            return Err(GameError::MessageFormat(format!(
                "client frame too short: {} bytes",
                buf.len()
            )));
        }
        let data_size = buf.get_u16() as usize;
        let status = buf.get_u8();
        let flag = buf.get_u32();
        let cmd = buf.get_u16();
        if buf.remaining() != data_size {
            return Err(GameError::MessageFormat(format!(
                "declared size {} but {} payload bytes follow",
                data_size,
                buf.remaining()
            )));
        }
        Ok(Self {
            status,
            flag,
            cmd,
            data: Bytes::copy_from_slice(buf),
        })
    }

    pub fn encode(&self) -> Bytes {
        let mut out = BytesMut::with_capacity(CLIENT_HEADER_LEN + self.data.len());
        out.put_u16(self.data.len() as u16);
        out.put_u8(self.status);
        out.put_u32(self.flag);
        out.put_u16(self.cmd);
        out.extend_from_slice(&self.data);
        out.freeze()
    }
}

impl ServerFrame {
    /// A success frame answering `cmd` with the request's correlation flag.
    pub fn reply(cmd: u16, flag: u32, data: Bytes) -> Self {
        Self {
            error_id: 0,
            status: 0,
            flag,
            cmd,
            data,
        }
    }

    /// A push frame; pushes carry no correlation flag.
    pub fn push(cmd: u16, data: Bytes) -> Self {
        Self::reply(cmd, 0, data)
    }

    /// A failure frame answering `cmd`. The payload holds the textual cause.
    pub fn error(cmd: u16, flag: u32, error_id: u16, message: &str) -> Self {
        let body = crate::proto::ErrorBody {
            message: message.to_string(),
        };
        Self {
            error_id,
            status: 0,
            flag,
            cmd,
            data: crate::proto::encode_body(&body),
        }
    }

    pub fn encode(&self) -> Bytes {
        let mut out = BytesMut::with_capacity(SERVER_HEADER_LEN + self.data.len());
        out.put_u16(self.error_id);
        out.put_u16(self.data.len() as u16);
        out.put_u8(self.status);
        out.put_u32(self.flag);
        out.put_u16(self.cmd);
        out.extend_from_slice(&self.data);
        out.freeze()
    }

    pub fn decode(mut buf: &[u8]) -> Result<Self, GameError> {
        if buf.len() < SERVER_HEADER_LEN {
            return Err(GameError::MessageFormat(format!(
                "server frame too short: {} bytes",
                buf.len()
            )));
        }
        let error_id = buf.get_u16();
        let data_size = buf.get_u16() as usize;
        let status = buf.get_u8();
        let flag = buf.get_u32();
        let cmd = buf.get_u16();
        if buf.remaining() != data_size {
            return Err(GameError::MessageFormat(format!(
                "declared size {} but {} payload bytes follow",
                data_size,
                buf.remaining()
            )));
        }
        Ok(Self {
            error_id,
            status,
            flag,
            cmd,
            data: Bytes::copy_from_slice(buf),
        })
    }
}

impl LegacyFrame {
    pub fn new(msg_id: u16, payload: Bytes) -> Self {
        Self { msg_id, payload }
    }

    pub fn encode(&self) -> Bytes {
        let mut out = BytesMut::with_capacity(LEGACY_HEADER_LEN + self.payload.len());
        out.put_u32(2 + self.payload.len() as u32);
        out.put_u16(self.msg_id);
        out.extend_from_slice(&self.payload);
        out.freeze()
    }

    pub fn decode(mut buf: &[u8]) -> Result<Self, GameError> {
        if buf.len() < LEGACY_HEADER_LEN {
            return Err(GameError::MessageFormat(format!(
                "legacy frame too short: {} bytes",
                buf.len()
            )));
        }
        let length = buf.get_u32() as usize;
        if length < 2 || buf.remaining() != length {
            return Err(GameError::MessageFormat(format!(
                "legacy length {} does not match {} remaining bytes",
                length,
                buf.remaining()
            )));
        }
        let msg_id = buf.get_u16();
        Ok(Self {
            msg_id,
            payload: Bytes::copy_from_slice(buf),
        })
    }
}
