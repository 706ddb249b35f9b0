//! Generated payload message types.
//!
//! build.rs compiles `protos/*.proto`; prost emits one file per package
//! (`menagerie.rs`). The include is wrapped in a submodule with broad allow()
//! attributes so unused portions of the payload API stay warning-free.

#[allow(dead_code, unused_imports, unused_variables, unused_mut, unused_macros)]
#[allow(clippy::all)]
#[allow(rustdoc::invalid_html_tags)]
mod inner {
    include!(concat!(env!("OUT_DIR"), "/menagerie.rs"));
}
pub use inner::*;

use bytes::{Bytes, BytesMut};
use prost::Message;

/// Encode a payload message into the opaque bytes a frame carries.
pub fn encode_body<M: Message>(body: &M) -> Bytes {
    let mut buf = BytesMut::with_capacity(body.encoded_len());
    body.encode(&mut buf).expect("BytesMut grows on demand");
    buf.freeze()
}
