//! Frame <-> segment sample conversion
//!
//! Segment samples are what the MPEG-TS writer consumes: AVC in Annex-B with
//! 4-byte start codes, AAC as raw access units, explicit pts and dts. The FLV
//! codec header bytes are dropped and rebuilt on the way back:
//!
//! - video: frame type 1 for key frames and configuration, 2 otherwise;
//!   composition time = pts - dts
//! - audio: sound format 10 with the original rate/size/type bits
//!
//! AVC with 4-byte NAL unit lengths and AAC round-trip bit for bit.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::ConversionError;
use crate::media::aac::AacPacketType;
use crate::media::flv::{put_u24, AudioFormat, VideoCodec};
use crate::media::h264::{self, AvcPacketType};

use super::frame::{Frame, MediaType, StreamKey};

const TARGET: &str = "mpeg-ts";

/// Codec of a segment sample
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleCodec {
    /// H.264
    Avc,
    /// AAC; `sound_flags` keeps the low nibble of the FLV audio header
    Aac { sound_flags: u8 },
}

/// Media unit ready for segmenting
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentSample {
    pub media_type: MediaType,
    pub codec: SampleCodec,
    /// Payload is an AVCDecoderConfigurationRecord or AudioSpecificConfig
    pub is_config: bool,
    pub is_keyframe: bool,
    /// Presentation timestamp in milliseconds
    pub pts: u32,
    /// Decode timestamp in milliseconds
    pub dts: u32,
    pub payload: Bytes,
}

impl SegmentSample {
    pub fn is_video(&self) -> bool {
        self.media_type == MediaType::Video
    }

    pub fn is_audio(&self) -> bool {
        self.media_type == MediaType::Audio
    }
}

/// Convert a frame to a segment sample
///
/// Returns `Ok(None)` for frames that carry nothing to segment, such as an
/// AVC end-of-sequence marker.
pub fn to_sample(frame: &Frame) -> Result<Option<SegmentSample>, ConversionError> {
    match frame.media_type {
        MediaType::Video => video_to_sample(frame),
        MediaType::Audio => audio_to_sample(frame).map(Some),
        MediaType::Metadata => Err(ConversionError::UnsupportedMediaType(TARGET)),
    }
}

fn video_to_sample(frame: &Frame) -> Result<Option<SegmentSample>, ConversionError> {
    let data = &frame.payload;
    if data.is_empty() {
        return Err(ConversionError::Truncated);
    }
    if VideoCodec::from_byte(data[0]) != Some(VideoCodec::Avc) {
        return Err(ConversionError::UnsupportedCodec(TARGET));
    }
    if data.len() < 5 {
        return Err(ConversionError::Truncated);
    }

    let (is_config, payload) = match AvcPacketType::from_byte(data[1]) {
        Some(AvcPacketType::SequenceHeader) => (true, data.slice(5..)),
        Some(AvcPacketType::Nalu) => (false, h264::avcc_to_annexb(&data[5..])?),
        Some(AvcPacketType::EndOfSequence) => return Ok(None),
        None => return Err(ConversionError::UnsupportedMediaType(TARGET)),
    };

    Ok(Some(SegmentSample {
        media_type: MediaType::Video,
        codec: SampleCodec::Avc,
        is_config,
        is_keyframe: frame.is_keyframe,
        pts: frame.pts,
        dts: frame.dts,
        payload,
    }))
}

fn audio_to_sample(frame: &Frame) -> Result<SegmentSample, ConversionError> {
    let data = &frame.payload;
    if data.is_empty() {
        return Err(ConversionError::Truncated);
    }
    if AudioFormat::from_byte(data[0]) != Some(AudioFormat::Aac) {
        return Err(ConversionError::UnsupportedCodec(TARGET));
    }
    if data.len() < 2 {
        return Err(ConversionError::Truncated);
    }

    let is_config = match AacPacketType::from_byte(data[1]) {
        Some(AacPacketType::SequenceHeader) => true,
        Some(AacPacketType::Raw) => false,
        None => return Err(ConversionError::UnsupportedMediaType(TARGET)),
    };

    Ok(SegmentSample {
        media_type: MediaType::Audio,
        codec: SampleCodec::Aac {
            sound_flags: data[0] & 0x0F,
        },
        is_config,
        is_keyframe: false,
        pts: frame.pts,
        dts: frame.dts,
        payload: data.slice(2..),
    })
}

pub fn from_sample(
    stream_key: StreamKey,
    sample: &SegmentSample,
) -> Result<Frame, ConversionError> {
    let payload = match (sample.media_type, sample.codec) {
        (MediaType::Video, SampleCodec::Avc) => {
            let frame_type: u8 = if sample.is_config || sample.is_keyframe {
                1
            } else {
                2
            };
            let body = if sample.is_config {
                sample.payload.clone()
            } else {
                h264::annexb_to_avcc(&sample.payload)?
            };

            let mut buf = BytesMut::with_capacity(5 + body.len());
            buf.put_u8((frame_type << 4) | VideoCodec::Avc as u8);
            if sample.is_config {
                buf.put_u8(AvcPacketType::SequenceHeader as u8);
                put_u24(&mut buf, 0);
            } else {
                buf.put_u8(AvcPacketType::Nalu as u8);
                let cts = sample.pts.wrapping_sub(sample.dts) as i32;
                put_u24(&mut buf, cts as u32);
            }
            buf.put_slice(&body);
            buf.freeze()
        }
        (MediaType::Audio, SampleCodec::Aac { sound_flags }) => {
            let mut buf = BytesMut::with_capacity(2 + sample.payload.len());
            buf.put_u8(((AudioFormat::Aac as u8) << 4) | (sound_flags & 0x0F));
            buf.put_u8(if sample.is_config {
                AacPacketType::SequenceHeader as u8
            } else {
                AacPacketType::Raw as u8
            });
            buf.put_slice(&sample.payload);
            buf.freeze()
        }
        _ => return Err(ConversionError::UnsupportedMediaType("flv")),
    };

    Ok(Frame::new(stream_key, sample.media_type, sample.dts, payload))
}
