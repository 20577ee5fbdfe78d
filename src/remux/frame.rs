//! Protocol-neutral frame model
//!
//! Every ingest path produces [`Frame`]s and every output format is derived
//! from them. A frame is immutable once built and shared behind an `Arc`.

use bytes::Bytes;

use crate::media::flv::{FlvTag, FlvTagType};

/// Unique identifier for a stream (app + stream name)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StreamKey {
    /// Application name (e.g., "live")
    pub app: String,
    /// Stream name/key (e.g., "stream_key_123")
    pub name: String,
}

impl StreamKey {
    /// Create a new stream key
    pub fn new(app: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            app: app.into(),
            name: name.into(),
        }
    }
}

impl std::fmt::Display for StreamKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.app, self.name)
    }
}

/// Kind of payload a frame carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaType {
    Audio,
    Video,
    /// Stream description (`onMetaData`)
    Metadata,
}

impl MediaType {
    pub fn tag_type(&self) -> FlvTagType {
        match self {
            MediaType::Audio => FlvTagType::Audio,
            MediaType::Video => FlvTagType::Video,
            MediaType::Metadata => FlvTagType::Script,
        }
    }

    pub fn from_tag_type(tag_type: FlvTagType) -> Self {
        match tag_type {
            FlvTagType::Audio => MediaType::Audio,
            FlvTagType::Video => MediaType::Video,
            FlvTagType::Script => MediaType::Metadata,
        }
    }
}

/// A single unit of media
///
/// `payload` is an FLV tag body: audio and video keep their codec header
/// bytes, metadata is the unwrapped `onMetaData` record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub stream_key: StreamKey,
    pub media_type: MediaType,
    /// Decoder configuration (AVC/HEVC sequence header, AAC config)
    pub is_key_config: bool,
    /// Video key frame carrying picture data
    pub is_keyframe: bool,
    /// Presentation timestamp in milliseconds
    pub pts: u32,
    /// Decode timestamp in milliseconds
    pub dts: u32,
    pub payload: Bytes,
}

impl Frame {
    /// Build a frame from a tag body, deriving the flags and presentation time
    ///
    /// `pts = dts + composition time` for AVC/HEVC NALU packets (wrapping),
    /// `pts = dts` for everything else.
    pub fn new(stream_key: StreamKey, media_type: MediaType, dts: u32, payload: Bytes) -> Self {
        let tag = FlvTag {
            tag_type: media_type.tag_type(),
            timestamp: dts,
            data: payload,
        };
        let is_key_config = tag.is_sequence_header();
        let is_keyframe = tag.is_keyframe() && !is_key_config;
        let pts = dts.wrapping_add(tag.composition_time() as u32);

        Self {
            stream_key,
            media_type,
            is_key_config,
            is_keyframe,
            pts,
            dts,
            payload: tag.data,
        }
    }

    pub fn audio(stream_key: StreamKey, dts: u32, payload: Bytes) -> Self {
        Self::new(stream_key, MediaType::Audio, dts, payload)
    }

    pub fn video(stream_key: StreamKey, dts: u32, payload: Bytes) -> Self {
        Self::new(stream_key, MediaType::Video, dts, payload)
    }

    pub fn metadata(stream_key: StreamKey, dts: u32, payload: Bytes) -> Self {
        Self::new(stream_key, MediaType::Metadata, dts, payload)
    }

    pub fn is_audio(&self) -> bool {
        self.media_type == MediaType::Audio
    }

    pub fn is_video(&self) -> bool {
        self.media_type == MediaType::Video
    }

    pub fn is_metadata(&self) -> bool {
        self.media_type == MediaType::Metadata
    }

    /// FLV codec id from the first payload byte
    ///
    /// Sound format (high nibble) for audio, codec id (low nibble) for video.
    pub fn codec_id(&self) -> Option<u8> {
        let first = *self.payload.first()?;
        match self.media_type {
            MediaType::Audio => Some(first >> 4),
            MediaType::Video => Some(first & 0x0F),
            MediaType::Metadata => None,
        }
    }

    /// Payload size in bytes
    pub fn size(&self) -> usize {
        self.payload.len()
    }
}
