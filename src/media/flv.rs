//! FLV tag parsing and generation
//!
//! FLV (Flash Video) is the container format used by RTMP for audio/video data.
//! Each RTMP audio/video message is an FLV tag body without the tag header.
//! HTTP-FLV subscribers receive the full tag framing.
//!
//! FLV Tag Structure:
//! ```text
//! +--------+-------------+-----------+-------------+---------+-----------------+
//! | Type(1)| DataSize(3) | TS(3+1)   | StreamID(3) | Data(N) | PrevTagSize(4)  |
//! +--------+-------------+-----------+-------------+---------+-----------------+
//! ```
//!
//! RTMP Video Data:
//! ```text
//! +----------+----------+
//! | FrameType| CodecID  | CodecData...
//! | (4 bits) | (4 bits) |
//! +----------+----------+
//! ```
//!
//! RTMP Audio Data:
//! ```text
//! +----------+----------+----------+----------+
//! |SoundFormat|SoundRate|SoundSize |SoundType | AudioData...
//! | (4 bits)  | (2 bits)| (1 bit)  | (1 bit)  |
//! +----------+----------+----------+----------+
//! ```

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::MediaError;

/// Tag header length (type + size + timestamp + stream id)
pub const TAG_HEADER_SIZE: usize = 11;

/// Size of the trailing previous-tag-size field
pub const PREV_TAG_SIZE_LEN: usize = 4;

/// Largest body the 24-bit data size field can describe
pub const MAX_TAG_DATA_SIZE: usize = 0xFF_FFFF;

/// FLV file header with audio and video present, followed by PreviousTagSize0
pub const FLV_HEADER: [u8; 13] = [
    b'F', b'L', b'V', 0x01, 0x05, 0x00, 0x00, 0x00, 0x09, 0x00, 0x00, 0x00, 0x00,
];

/// FLV tag type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlvTagType {
    Audio,
    Video,
    Script,
}

impl FlvTagType {
    pub fn from_byte(b: u8) -> Option<Self> {
        match b & 0x1F {
            8 => Some(FlvTagType::Audio),
            9 => Some(FlvTagType::Video),
            18 => Some(FlvTagType::Script),
            _ => None,
        }
    }

    /// Tag type id, identical to the RTMP message type id
    pub fn as_byte(&self) -> u8 {
        match self {
            FlvTagType::Audio => 8,
            FlvTagType::Video => 9,
            FlvTagType::Script => 18,
        }
    }
}

/// Parsed FLV tag
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlvTag {
    /// Tag type
    pub tag_type: FlvTagType,
    /// Timestamp in milliseconds
    pub timestamp: u32,
    /// Raw tag data (including codec headers)
    pub data: Bytes,
}

/// Video frame type (upper 4 bits of first byte)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoFrameType {
    /// Keyframe (for AVC, a seekable frame)
    Keyframe = 1,
    /// Inter frame (for AVC, a non-seekable frame)
    InterFrame = 2,
    /// Disposable inter frame (H.263 only)
    DisposableInterFrame = 3,
    /// Generated keyframe (reserved for server use)
    GeneratedKeyframe = 4,
    /// Video info/command frame
    VideoInfoFrame = 5,
}

impl VideoFrameType {
    pub fn from_byte(b: u8) -> Option<Self> {
        match (b >> 4) & 0x0F {
            1 => Some(VideoFrameType::Keyframe),
            2 => Some(VideoFrameType::InterFrame),
            3 => Some(VideoFrameType::DisposableInterFrame),
            4 => Some(VideoFrameType::GeneratedKeyframe),
            5 => Some(VideoFrameType::VideoInfoFrame),
            _ => None,
        }
    }

    pub fn is_keyframe(&self) -> bool {
        matches!(
            self,
            VideoFrameType::Keyframe | VideoFrameType::GeneratedKeyframe
        )
    }
}

/// Video codec ID (lower 4 bits of first byte)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoCodec {
    /// Sorenson H.263
    SorensonH263 = 2,
    /// Screen video
    ScreenVideo = 3,
    /// VP6
    Vp6 = 4,
    /// VP6 with alpha
    Vp6Alpha = 5,
    /// Screen video v2
    ScreenVideoV2 = 6,
    /// AVC (H.264)
    Avc = 7,
    /// HEVC (H.265), codec id used by common FLV extensions
    Hevc = 12,
}

impl VideoCodec {
    pub fn from_byte(b: u8) -> Option<Self> {
        match b & 0x0F {
            2 => Some(VideoCodec::SorensonH263),
            3 => Some(VideoCodec::ScreenVideo),
            4 => Some(VideoCodec::Vp6),
            5 => Some(VideoCodec::Vp6Alpha),
            6 => Some(VideoCodec::ScreenVideoV2),
            7 => Some(VideoCodec::Avc),
            12 => Some(VideoCodec::Hevc),
            _ => None,
        }
    }

    /// Codecs whose packets carry a packet type byte and composition time
    pub fn has_packet_type(&self) -> bool {
        matches!(self, VideoCodec::Avc | VideoCodec::Hevc)
    }
}

/// Audio format (upper 4 bits of first byte)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioFormat {
    /// Linear PCM, platform endian
    LinearPcmPlatform = 0,
    /// ADPCM
    Adpcm = 1,
    /// MP3
    Mp3 = 2,
    /// Linear PCM, little endian
    LinearPcmLe = 3,
    /// Nellymoser 16kHz mono
    Nellymoser16kMono = 4,
    /// Nellymoser 8kHz mono
    Nellymoser8kMono = 5,
    /// Nellymoser
    Nellymoser = 6,
    /// G.711 A-law
    G711ALaw = 7,
    /// G.711 mu-law
    G711MuLaw = 8,
    /// AAC
    Aac = 10,
    /// Speex
    Speex = 11,
    /// MP3 8kHz
    Mp38k = 14,
    /// Device-specific sound
    DeviceSpecific = 15,
}

impl AudioFormat {
    pub fn from_byte(b: u8) -> Option<Self> {
        match (b >> 4) & 0x0F {
            0 => Some(AudioFormat::LinearPcmPlatform),
            1 => Some(AudioFormat::Adpcm),
            2 => Some(AudioFormat::Mp3),
            3 => Some(AudioFormat::LinearPcmLe),
            4 => Some(AudioFormat::Nellymoser16kMono),
            5 => Some(AudioFormat::Nellymoser8kMono),
            6 => Some(AudioFormat::Nellymoser),
            7 => Some(AudioFormat::G711ALaw),
            8 => Some(AudioFormat::G711MuLaw),
            10 => Some(AudioFormat::Aac),
            11 => Some(AudioFormat::Speex),
            14 => Some(AudioFormat::Mp38k),
            15 => Some(AudioFormat::DeviceSpecific),
            _ => None,
        }
    }
}

impl FlvTag {
    /// Create a new video tag
    pub fn video(timestamp: u32, data: Bytes) -> Self {
        Self {
            tag_type: FlvTagType::Video,
            timestamp,
            data,
        }
    }

    /// Create a new audio tag
    pub fn audio(timestamp: u32, data: Bytes) -> Self {
        Self {
            tag_type: FlvTagType::Audio,
            timestamp,
            data,
        }
    }

    /// Create a new script data tag
    pub fn script(timestamp: u32, data: Bytes) -> Self {
        Self {
            tag_type: FlvTagType::Script,
            timestamp,
            data,
        }
    }

    /// Check if this is a video tag
    pub fn is_video(&self) -> bool {
        self.tag_type == FlvTagType::Video
    }

    /// Check if this is an audio tag
    pub fn is_audio(&self) -> bool {
        self.tag_type == FlvTagType::Audio
    }

    /// For video tags, get the frame type
    pub fn video_frame_type(&self) -> Option<VideoFrameType> {
        if self.is_video() && !self.data.is_empty() {
            VideoFrameType::from_byte(self.data[0])
        } else {
            None
        }
    }

    /// For video tags, get the codec
    pub fn video_codec(&self) -> Option<VideoCodec> {
        if self.is_video() && !self.data.is_empty() {
            VideoCodec::from_byte(self.data[0])
        } else {
            None
        }
    }

    /// For audio tags, get the format
    pub fn audio_format(&self) -> Option<AudioFormat> {
        if self.is_audio() && !self.data.is_empty() {
            AudioFormat::from_byte(self.data[0])
        } else {
            None
        }
    }

    /// Check if this is a keyframe
    pub fn is_keyframe(&self) -> bool {
        self.video_frame_type()
            .map(|ft| ft.is_keyframe())
            .unwrap_or(false)
    }

    /// Check if this is an AVC or HEVC sequence header
    pub fn is_video_sequence_header(&self) -> bool {
        if self.is_video() && self.data.len() >= 2 {
            let has_packet_type = self
                .video_codec()
                .map(|c| c.has_packet_type())
                .unwrap_or(false);
            has_packet_type && self.data[1] == 0
        } else {
            false
        }
    }

    /// Check if this is an AAC sequence header
    pub fn is_aac_sequence_header(&self) -> bool {
        if self.is_audio() && self.data.len() >= 2 {
            let format = AudioFormat::from_byte(self.data[0]);
            format == Some(AudioFormat::Aac) && self.data[1] == 0
        } else {
            false
        }
    }

    /// Check if this tag carries decoder configuration
    pub fn is_sequence_header(&self) -> bool {
        self.is_video_sequence_header() || self.is_aac_sequence_header()
    }

    /// Composition time offset of an AVC/HEVC NALU packet, zero otherwise
    pub fn composition_time(&self) -> i32 {
        let is_nalu = self.is_video()
            && self.data.len() >= 5
            && self
                .video_codec()
                .map(|c| c.has_packet_type())
                .unwrap_or(false)
            && self.data[1] == 1;
        if !is_nalu {
            return 0;
        }
        read_i24(&self.data[2..5])
    }

    /// Get the size of the tag data
    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// Serialize with tag header and trailing previous-tag-size
    ///
    /// The body length field is 24 bits wide; larger bodies are rejected.
    pub fn encode(&self) -> Result<Bytes, MediaError> {
        let data_size = self.data.len();
        if data_size > MAX_TAG_DATA_SIZE {
            return Err(MediaError::FlvTagTooLarge(data_size));
        }
        let mut buf = BytesMut::with_capacity(TAG_HEADER_SIZE + data_size + PREV_TAG_SIZE_LEN);

        buf.put_u8(self.tag_type.as_byte());
        put_u24(&mut buf, data_size as u32);
        put_u24(&mut buf, self.timestamp & 0x00FF_FFFF);
        buf.put_u8((self.timestamp >> 24) as u8);
        put_u24(&mut buf, 0); // stream id, always 0
        buf.put_slice(&self.data);
        buf.put_u32((TAG_HEADER_SIZE + data_size) as u32);

        Ok(buf.freeze())
    }

    /// Parse one tag (header, body and previous-tag-size) from the front of `data`
    ///
    /// Returns the tag and the number of bytes consumed.
    pub fn decode(data: &[u8]) -> Result<(FlvTag, usize), MediaError> {
        if data.len() < TAG_HEADER_SIZE {
            return Err(MediaError::InvalidFlvTag);
        }
        let mut cur = data;

        let tag_type = FlvTagType::from_byte(cur.get_u8()).ok_or(MediaError::InvalidFlvTag)?;
        let data_size = get_u24(&mut cur) as usize;
        let ts_low = get_u24(&mut cur);
        let ts_ext = cur.get_u8() as u32;
        let _stream_id = get_u24(&mut cur);

        if cur.remaining() < data_size + PREV_TAG_SIZE_LEN {
            return Err(MediaError::InvalidFlvTag);
        }
        let body = Bytes::copy_from_slice(&cur[..data_size]);
        cur.advance(data_size);
        let _prev_tag_size = cur.get_u32();

        let tag = FlvTag {
            tag_type,
            timestamp: (ts_ext << 24) | ts_low,
            data: body,
        };
        Ok((tag, TAG_HEADER_SIZE + data_size + PREV_TAG_SIZE_LEN))
    }
}

/// Read a signed, big-endian 24-bit integer
pub fn read_i24(b: &[u8]) -> i32 {
    let v = ((b[0] as i32) << 16) | ((b[1] as i32) << 8) | (b[2] as i32);
    // Sign extend from 24 bits
    if v & 0x80_0000 != 0 {
        v | !0xFF_FFFF
    } else {
        v
    }
}

/// Write the low 24 bits of `v`, big-endian
pub fn put_u24(buf: &mut BytesMut, v: u32) {
    buf.put_u8((v >> 16) as u8);
    buf.put_u8((v >> 8) as u8);
    buf.put_u8(v as u8);
}

fn get_u24(buf: &mut &[u8]) -> u32 {
    let b0 = buf.get_u8() as u32;
    let b1 = buf.get_u8() as u32;
    let b2 = buf.get_u8() as u32;
    (b0 << 16) | (b1 << 8) | b2
}
