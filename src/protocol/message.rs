//! RTMP media messages
//!
//! Only the message types that carry stream content are modelled here:
//! audio (8), video (9) and AMF0 data (18). Their payloads are FLV tag
//! bodies.

use bytes::Bytes;

use super::constants::*;

/// A complete (reassembled) RTMP message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RtmpMessage {
    /// Message type id
    pub type_id: u8,
    /// Message stream id
    pub stream_id: u32,
    /// Timestamp in milliseconds
    pub timestamp: u32,
    pub payload: Bytes,
}

impl RtmpMessage {
    pub fn new(type_id: u8, stream_id: u32, timestamp: u32, payload: Bytes) -> Self {
        Self {
            type_id,
            stream_id,
            timestamp,
            payload,
        }
    }

    /// Audio, video or AMF0 data
    pub fn is_media(&self) -> bool {
        matches!(self.type_id, MSG_AUDIO | MSG_VIDEO | MSG_DATA_AMF0)
    }

    /// Chunk stream id this message is sent on
    pub fn chunk_stream_id(&self) -> u32 {
        match self.type_id {
            MSG_AUDIO => CSID_AUDIO,
            MSG_VIDEO => CSID_VIDEO,
            // Protocol control messages go on csid 2
            MSG_SET_CHUNK_SIZE => 2,
            _ => CSID_DATA,
        }
    }
}
