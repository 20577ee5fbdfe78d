//! Frame <-> FLV tag conversion
//!
//! Like RTMP, an FLV tag stores only the decode timestamp. Script tags carry
//! `onMetaData` without the `@setDataFrame` wrapper.

use crate::media::flv::FlvTag;
use crate::media::metadata;

use super::frame::{Frame, MediaType, StreamKey};

pub fn to_flv(frame: &Frame) -> FlvTag {
    FlvTag {
        tag_type: frame.media_type.tag_type(),
        timestamp: frame.dts,
        data: frame.payload.clone(),
    }
}

pub fn from_flv(stream_key: StreamKey, tag: &FlvTag) -> Frame {
    let media_type = MediaType::from_tag_type(tag.tag_type);
    let payload = if media_type == MediaType::Metadata {
        metadata::ensure_unwrapped(&tag.data).bytes
    } else {
        tag.data.clone()
    };
    Frame::new(stream_key, media_type, tag.timestamp, payload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::flv::FlvTagType;
    use bytes::Bytes;

    fn key() -> StreamKey {
        StreamKey::new("live", "flv")
    }

    #[test]
    fn test_tag_round_trip() {
        let tag = FlvTag::video(
            40,
            Bytes::from_static(&[0x27, 0x01, 0x00, 0x00, 0x00, 0, 0, 0, 1, 0x41]),
        );
        let frame = from_flv(key(), &tag);
        assert!(!frame.is_keyframe);
        assert_eq!(frame.pts, 40);
        assert_eq!(to_flv(&frame), tag);
    }

    #[test]
    fn test_script_tag_is_metadata() {
        let wrapped = metadata::ensure_wrapped(&metadata::build_metadata(640, 360, -1, 7));
        let tag = FlvTag::script(0, wrapped.bytes);
        let frame = from_flv(key(), &tag);
        assert!(frame.is_metadata());
        assert_eq!(frame.payload, metadata::build_metadata(640, 360, -1, 7));
        assert_eq!(to_flv(&frame).tag_type, FlvTagType::Script);
    }

    #[test]
    fn test_encoded_tag_decodes_to_same_frame() {
        let frame = Frame::audio(key(), 1234, Bytes::from_static(&[0xAF, 0x01, 0x21, 0x10]));
        let bytes = to_flv(&frame).encode().unwrap();
        let (tag, consumed) = FlvTag::decode(&bytes).unwrap();
        assert_eq!(consumed, bytes.len());
        assert_eq!(from_flv(key(), &tag), frame);
    }
}
