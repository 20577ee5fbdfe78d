//! RTMP wire protocol pieces used by the relay
//!
//! Socket I/O and the handshake live outside this crate; these types turn
//! frames into bytes a transport can write and back.

pub mod chunk;
pub mod constants;
pub mod message;

pub use chunk::{ChunkDecoder, ChunkEncoder};
pub use message::RtmpMessage;
