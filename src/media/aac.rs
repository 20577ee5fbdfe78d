//! AAC audio handling
//!
//! RTMP and FLV transport AAC as raw access units (no ADTS headers). The
//! AudioSpecificConfig from the sequence header is needed to rebuild ADTS
//! framing for MPEG-TS segments.
//!
//! AAC Audio Packet Structure:
//! ```text
//! +-----------+----------+----------+----------+---------+
//! |SoundFormat|SoundRate |SoundSize |SoundType | AACType | AACData
//! | (4 bits)  | (2 bits) | (1 bit)  | (1 bit)  | (1 byte)|
//! +-----------+----------+----------+----------+---------+
//! ```
//!
//! AACPacketType:
//! - 0: AAC sequence header (AudioSpecificConfig)
//! - 1: AAC raw frame data

use crate::error::MediaError;

/// ADTS header length without CRC
pub const ADTS_HEADER_LEN: usize = 7;

/// AAC packet type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AacPacketType {
    /// Sequence header (AudioSpecificConfig)
    SequenceHeader = 0,
    /// Raw AAC frame data
    Raw = 1,
}

impl AacPacketType {
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0 => Some(AacPacketType::SequenceHeader),
            1 => Some(AacPacketType::Raw),
            _ => None,
        }
    }
}

/// AudioSpecificConfig (from sequence header)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioSpecificConfig {
    /// Audio object type (2 = AAC LC)
    pub audio_object_type: u8,
    /// Sampling frequency index
    pub sampling_frequency_index: u8,
    /// Sampling frequency in Hz
    pub sampling_frequency: u32,
    /// Channel configuration (1=mono, 2=stereo, etc.)
    pub channel_configuration: u8,
    /// 960-sample frames instead of 1024
    pub frame_length_flag: bool,
}

impl AudioSpecificConfig {
    /// Standard sampling frequencies by index
    const SAMPLING_FREQUENCIES: [u32; 13] = [
        96000, 88200, 64000, 48000, 44100, 32000, 24000, 22050, 16000, 12000, 11025, 8000, 7350,
    ];

    /// Parse the bit-packed config record (sequence header body after the
    /// two FLV audio header bytes)
    pub fn parse(data: &[u8]) -> Result<Self, MediaError> {
        if data.len() < 2 {
            return Err(MediaError::InvalidAacPacket);
        }

        // audioObjectType: 5 bits, samplingFrequencyIndex: 4 bits,
        // channelConfiguration: 4 bits, then GASpecificConfig
        let b0 = data[0];
        let b1 = data[1];

        let audio_object_type = (b0 >> 3) & 0x1F;
        let sampling_frequency_index = ((b0 & 0x07) << 1) | ((b1 >> 7) & 0x01);

        // Explicit 24-bit frequencies cannot be signalled in ADTS
        let sampling_frequency = *Self::SAMPLING_FREQUENCIES
            .get(sampling_frequency_index as usize)
            .ok_or(MediaError::InvalidAacPacket)?;

        let channel_configuration = (b1 >> 3) & 0x0F;
        let frame_length_flag = (b1 & 0x04) != 0;

        Ok(AudioSpecificConfig {
            audio_object_type,
            sampling_frequency_index,
            sampling_frequency,
            channel_configuration,
            frame_length_flag,
        })
    }

    /// Get samples per frame
    pub fn samples_per_frame(&self) -> u32 {
        if self.frame_length_flag {
            960
        } else {
            1024
        }
    }

    /// Build the 7-byte ADTS header for a raw frame of `payload_len` bytes
    pub fn adts_header(&self, payload_len: usize) -> [u8; ADTS_HEADER_LEN] {
        // ADTS profile is object type - 1
        let profile = self.audio_object_type.saturating_sub(1);
        let freq_idx = self.sampling_frequency_index;
        let channels = self.channel_configuration;

        // 13-bit frame length includes the header
        let frame_len = (payload_len + ADTS_HEADER_LEN).min(0x1FFF);

        let mut header = [0u8; ADTS_HEADER_LEN];

        // Syncword (12 bits) + MPEG-4 + layer 0 + no CRC
        header[0] = 0xFF;
        header[1] = 0xF1;

        // Profile (2) + Freq (4) + Private (1) + Channels high bit (1)
        header[2] = ((profile & 0x03) << 6) | ((freq_idx & 0x0F) << 2) | ((channels >> 2) & 0x01);

        // Channels (2) + Original/Home/Copyright bits (4) + Length high (2)
        header[3] = ((channels & 0x03) << 6) | ((frame_len >> 11) & 0x03) as u8;

        header[4] = ((frame_len >> 3) & 0xFF) as u8;

        // Length low (3) + buffer fullness 0x7FF (VBR)
        header[5] = (((frame_len & 0x07) << 5) | 0x1F) as u8;
        header[6] = 0xFC;

        header
    }
}
