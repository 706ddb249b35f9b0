//! Incremental frame parser for the coin-acceptor serial link.
//!
//! Device frames on the wire are:
//!
//!   `0xAA | Len(u8) | Cmd(u8) | Payload(Len bytes) | CRC16(2 bytes BE)`
//!
//! The CRC (MODBUS polynomial) covers `Cmd` and `Payload`. The parser can be
//! fed arbitrary chunks and yields whole frames when available; on malformed
//! input it advances one byte and resynchronizes on the next start marker.

use bytes::{Buf, BytesMut};
use crc::{Crc, CRC_16_MODBUS};

const START: u8 = 0xAA;
/// Sane upper bound for a device payload.
const MAX_PAYLOAD: usize = 64;

pub const CRC16: Crc<u16> = Crc::<u16>::new(&CRC_16_MODBUS);

/// One validated device frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceFrame {
    pub cmd: u8,
    pub payload: Vec<u8>,
}

impl DeviceFrame {
    /// Encode with start marker and CRC, for probes and the mock device.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(5 + self.payload.len());
        out.push(START);
        out.push(self.payload.len() as u8);
        out.push(self.cmd);
        out.extend_from_slice(&self.payload);
        let mut digest = CRC16.digest();
        digest.update(&[self.cmd]);
        digest.update(&self.payload);
        out.extend_from_slice(&digest.finalize().to_be_bytes());
        out
    }
}

/// Incremental framer over a growing byte buffer.
pub struct DeviceFramer {
    buf: BytesMut,
}

impl Default for DeviceFramer {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceFramer {
    pub fn new() -> Self {
        Self {
            buf: BytesMut::with_capacity(256),
        }
    }

    pub fn push(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Attempt to extract the next complete frame. Returns None when more
    /// bytes are needed; skips garbage a byte at a time until a start marker
    /// with a valid CRC lines up.
    pub fn next_frame(&mut self) -> Option<DeviceFrame> {
        loop {
            // Seek the start marker.
            while !self.buf.is_empty() && self.buf[0] != START {
                self.buf.advance(1);
            }
            if self.buf.len() < 3 {
                return None;
            }
            let len = self.buf[1] as usize;
            if len > MAX_PAYLOAD {
                self.buf.advance(1);
                continue;
            }
            let total = 3 + len + 2;
            if self.buf.len() < total {
                return None;
            }
            let cmd = self.buf[2];
            let payload = &self.buf[3..3 + len];
            let mut digest = CRC16.digest();
            digest.update(&[cmd]);
            digest.update(payload);
            let expected = digest.finalize();
            let got = u16::from_be_bytes([self.buf[3 + len], self.buf[4 + len]]);
            if expected != got {
                // Corrupt frame; drop the marker and resync.
                self.buf.advance(1);
                continue;
            }
            let frame = DeviceFrame {
                cmd,
                payload: payload.to_vec(),
            };
            self.buf.advance(total);
            return Some(frame);
        }
    }
}
