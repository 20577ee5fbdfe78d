//! Frame <-> RTMP message conversion
//!
//! RTMP carries one timestamp per message, the decode timestamp. The
//! presentation offset of AVC/HEVC lives inside the video payload, so no
//! timing information is lost either way.

use crate::error::ConversionError;
use crate::media::metadata;
use crate::protocol::constants::{MSG_AUDIO, MSG_DATA_AMF0, MSG_VIDEO};
use crate::protocol::RtmpMessage;

use super::frame::{Frame, MediaType, StreamKey};

fn type_id(media_type: MediaType) -> u8 {
    match media_type {
        MediaType::Audio => MSG_AUDIO,
        MediaType::Video => MSG_VIDEO,
        MediaType::Metadata => MSG_DATA_AMF0,
    }
}

/// Message for a playing client: metadata goes out as plain `onMetaData`
pub fn to_rtmp(frame: &Frame, stream_id: u32) -> RtmpMessage {
    RtmpMessage::new(
        type_id(frame.media_type),
        stream_id,
        frame.dts,
        frame.payload.clone(),
    )
}

/// Message for pushing to another server: metadata is wrapped in
/// `@setDataFrame` as a publisher would send it
pub fn to_rtmp_relay(frame: &Frame, stream_id: u32) -> RtmpMessage {
    let payload = if frame.is_metadata() {
        metadata::ensure_wrapped(&frame.payload).bytes
    } else {
        frame.payload.clone()
    };
    RtmpMessage::new(type_id(frame.media_type), stream_id, frame.dts, payload)
}

/// Frame from a publisher's message; metadata is unwrapped
pub fn from_rtmp(stream_key: StreamKey, msg: &RtmpMessage) -> Result<Frame, ConversionError> {
    let media_type = match msg.type_id {
        MSG_AUDIO => MediaType::Audio,
        MSG_VIDEO => MediaType::Video,
        MSG_DATA_AMF0 => MediaType::Metadata,
        other => return Err(ConversionError::NotMedia(other)),
    };

    let payload = if media_type == MediaType::Metadata {
        metadata::ensure_unwrapped(&msg.payload).bytes
    } else {
        msg.payload.clone()
    };

    Ok(Frame::new(stream_key, media_type, msg.timestamp, payload))
}
