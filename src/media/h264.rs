//! H.264/AVC payload handling
//!
//! RTMP and FLV transport H.264 in AVCC format (length-prefixed NAL units).
//! MPEG-TS segments need Annex-B (start-code delimited) instead.
//!
//! AVC Video Packet Structure:
//! ```text
//! +----------+----------+-----------------+
//! |FrameType | CodecID  | AVCPacketType   | CompositionTime | Data
//! | (4 bits) | (4 bits) | (1 byte)        | (3 bytes, SI24) |
//! +----------+----------+-----------------+
//! ```
//!
//! AVCDecoderConfigurationRecord (sequence header):
//! ```text
//! configurationVersion (1) | AVCProfileIndication (1) | profile_compatibility (1)
//! | AVCLevelIndication (1) | lengthSizeMinusOne (1, lower 2 bits)
//! | numOfSPS (1, lower 5 bits) | { spsLength (2) | spsNALUnit }*
//! | numOfPPS (1) | { ppsLength (2) | ppsNALUnit }*
//! ```

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{ConversionError, MediaError};

/// Annex-B start code written in front of every NAL unit
pub const START_CODE: [u8; 4] = [0x00, 0x00, 0x00, 0x01];

/// Access unit delimiter NAL unit (primary_pic_type = any)
pub const AUD_NALU: [u8; 2] = [0x09, 0xF0];

/// AVC packet type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AvcPacketType {
    /// Sequence header (AVCDecoderConfigurationRecord)
    SequenceHeader = 0,
    /// NAL units
    Nalu = 1,
    /// End of sequence
    EndOfSequence = 2,
}

impl AvcPacketType {
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0 => Some(AvcPacketType::SequenceHeader),
            1 => Some(AvcPacketType::Nalu),
            2 => Some(AvcPacketType::EndOfSequence),
            _ => None,
        }
    }
}

/// NAL unit type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NaluType {
    /// Non-IDR slice
    Slice = 1,
    /// IDR slice (keyframe)
    Idr = 5,
    /// Supplemental enhancement information
    Sei = 6,
    /// Sequence parameter set
    Sps = 7,
    /// Picture parameter set
    Pps = 8,
    /// Access unit delimiter
    Aud = 9,
}

impl NaluType {
    pub fn from_byte(b: u8) -> Option<Self> {
        match b & 0x1F {
            1 => Some(NaluType::Slice),
            5 => Some(NaluType::Idr),
            6 => Some(NaluType::Sei),
            7 => Some(NaluType::Sps),
            8 => Some(NaluType::Pps),
            9 => Some(NaluType::Aud),
            _ => None,
        }
    }

    pub fn is_parameter_set(&self) -> bool {
        matches!(self, NaluType::Sps | NaluType::Pps)
    }
}

/// AVC decoder configuration (from sequence header)
#[derive(Debug, Clone)]
pub struct AvcConfig {
    /// AVC profile (66=Baseline, 77=Main, 100=High, etc.)
    pub profile: u8,
    /// AVC level (e.g., 31 = 3.1)
    pub level: u8,
    /// NALU length size (usually 4)
    pub nalu_length_size: u8,
    /// Sequence Parameter Sets
    pub sps: Vec<Bytes>,
    /// Picture Parameter Sets
    pub pps: Vec<Bytes>,
}

impl AvcConfig {
    /// Parse from AVCDecoderConfigurationRecord
    pub fn parse(data: &[u8]) -> Result<Self, MediaError> {
        if data.len() < 7 {
            return Err(MediaError::InvalidAvcPacket);
        }
        let mut data = data;

        let version = data.get_u8();
        if version != 1 {
            return Err(MediaError::InvalidAvcPacket);
        }

        let profile = data.get_u8();
        let _compatibility = data.get_u8();
        let level = data.get_u8();
        let nalu_length_size = (data.get_u8() & 0x03) + 1;

        let num_sps = (data.get_u8() & 0x1F) as usize;
        let sps = read_parameter_sets(&mut data, num_sps)?;

        if data.is_empty() {
            return Err(MediaError::InvalidAvcPacket);
        }
        let num_pps = data.get_u8() as usize;
        let pps = read_parameter_sets(&mut data, num_pps)?;

        Ok(AvcConfig {
            profile,
            level,
            nalu_length_size,
            sps,
            pps,
        })
    }

    /// SPS and PPS NAL units in Annex-B form, for in-band repetition on key frames
    pub fn annexb_parameter_sets(&self) -> Bytes {
        let mut out = BytesMut::new();
        for nalu in self.sps.iter().chain(self.pps.iter()) {
            out.put_slice(&START_CODE);
            out.put_slice(nalu);
        }
        out.freeze()
    }
}

fn read_parameter_sets(data: &mut &[u8], count: usize) -> Result<Vec<Bytes>, MediaError> {
    let mut sets = Vec::with_capacity(count);
    for _ in 0..count {
        if data.len() < 2 {
            return Err(MediaError::InvalidAvcPacket);
        }
        let len = data.get_u16() as usize;
        if data.len() < len {
            return Err(MediaError::InvalidAvcPacket);
        }
        sets.push(Bytes::copy_from_slice(&data[..len]));
        data.advance(len);
    }
    Ok(sets)
}

/// Iterator over NAL units in AVCC format
pub struct NaluIterator<'a> {
    data: &'a [u8],
    offset: usize,
    nalu_length_size: usize,
}

impl<'a> NaluIterator<'a> {
    pub fn new(data: &'a [u8], nalu_length_size: u8) -> Self {
        Self {
            data,
            offset: 0,
            nalu_length_size: nalu_length_size as usize,
        }
    }

    /// Whether the whole buffer was consumed by well-formed NAL units
    pub fn is_exhausted(&self) -> bool {
        self.offset == self.data.len()
    }
}

impl<'a> Iterator for NaluIterator<'a> {
    type Item = &'a [u8];

    fn next(&mut self) -> Option<Self::Item> {
        if self.offset + self.nalu_length_size > self.data.len() {
            return None;
        }

        // Read length (big-endian)
        let mut len: usize = 0;
        for i in 0..self.nalu_length_size {
            len = (len << 8) | (self.data[self.offset + i] as usize);
        }

        if self.offset + self.nalu_length_size + len > self.data.len() {
            return None;
        }
        self.offset += self.nalu_length_size;

        let nalu = &self.data[self.offset..self.offset + len];
        self.offset += len;
        Some(nalu)
    }
}

/// Convert 4-byte length-prefixed NAL units to Annex-B with 4-byte start codes
pub fn avcc_to_annexb(data: &[u8]) -> Result<Bytes, ConversionError> {
    let mut out = BytesMut::with_capacity(data.len());
    let mut iter = NaluIterator::new(data, 4);
    for nalu in iter.by_ref() {
        if nalu.is_empty() {
            return Err(ConversionError::MalformedNalu);
        }
        out.put_slice(&START_CODE);
        out.put_slice(nalu);
    }
    if !iter.is_exhausted() {
        return Err(ConversionError::MalformedNalu);
    }
    Ok(out.freeze())
}

/// Convert Annex-B (3- or 4-byte start codes) to 4-byte length-prefixed NAL units
pub fn annexb_to_avcc(data: &[u8]) -> Result<Bytes, ConversionError> {
    let mut out = BytesMut::with_capacity(data.len());
    for nalu in split_annexb(data)? {
        out.put_u32(nalu.len() as u32);
        out.put_slice(nalu);
    }
    Ok(out.freeze())
}

/// Split an Annex-B byte stream into NAL unit bodies
pub fn split_annexb(data: &[u8]) -> Result<Vec<&[u8]>, ConversionError> {
    let starts = start_code_positions(data);
    match starts.first() {
        Some(&(0, _)) => {}
        _ if data.is_empty() => return Ok(Vec::new()),
        _ => return Err(ConversionError::MalformedNalu),
    }

    let mut nalus = Vec::with_capacity(starts.len());
    for (i, &(pos, code_len)) in starts.iter().enumerate() {
        let begin = pos + code_len;
        let end = starts.get(i + 1).map(|&(next, _)| next).unwrap_or(data.len());
        if begin >= end {
            return Err(ConversionError::MalformedNalu);
        }
        nalus.push(&data[begin..end]);
    }
    Ok(nalus)
}

/// (offset, length) of every start code; a zero before `00 00 01` belongs to the code
fn start_code_positions(data: &[u8]) -> Vec<(usize, usize)> {
    let mut positions = Vec::new();
    let mut i = 0;
    while i + 3 <= data.len() {
        if data[i] == 0 && data[i + 1] == 0 && data[i + 2] == 1 {
            if i > 0 && data[i - 1] == 0 {
                positions.push((i - 1, 4));
            } else {
                positions.push((i, 3));
            }
            i += 3;
        } else {
            i += 1;
        }
    }
    positions
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nalu_type() {
        assert_eq!(NaluType::from_byte(0x65), Some(NaluType::Idr));
        assert_eq!(NaluType::from_byte(0x67), Some(NaluType::Sps));
        assert_eq!(NaluType::from_byte(0x68), Some(NaluType::Pps));
        assert_eq!(NaluType::from_byte(0x41), Some(NaluType::Slice));
        assert!(NaluType::Sps.is_parameter_set());
        assert!(!NaluType::Idr.is_parameter_set());
    }

    #[test]
    fn test_avc_packet_type() {
        assert_eq!(
            AvcPacketType::from_byte(0),
            Some(AvcPacketType::SequenceHeader)
        );
        assert_eq!(AvcPacketType::from_byte(1), Some(AvcPacketType::Nalu));
        assert_eq!(AvcPacketType::from_byte(3), None);
    }

    const CONFIG_RECORD: [u8; 18] = [
        0x01, // version
        0x64, // profile (High)
        0x00, // compatibility
        0x1F, // level 3.1
        0xFF, // nalu length size = 4
        0xE1, // 1 SPS
        0x00, 0x04, // SPS length
        0x67, 0x64, 0x00, 0x1F, // SPS data
        0x01, // 1 PPS
        0x00, 0x03, // PPS length
        0x68, 0xEF, 0x38, // PPS data
    ];

    #[test]
    fn test_avc_config_parse() {
        let config = AvcConfig::parse(&CONFIG_RECORD).unwrap();
        assert_eq!(config.profile, 100);
        assert_eq!(config.level, 31);
        assert_eq!(config.nalu_length_size, 4);
        assert_eq!(config.sps.len(), 1);
        assert_eq!(config.pps.len(), 1);
    }

    #[test]
    fn test_avc_config_truncated() {
        assert!(AvcConfig::parse(&CONFIG_RECORD[..10]).is_err());
        assert!(AvcConfig::parse(&[0x02, 0, 0, 0, 0, 0, 0]).is_err());
    }

    #[test]
    fn test_annexb_parameter_sets() {
        let config = AvcConfig::parse(&CONFIG_RECORD).unwrap();
        let ps = config.annexb_parameter_sets();
        assert_eq!(
            &ps[..],
            &[0, 0, 0, 1, 0x67, 0x64, 0x00, 0x1F, 0, 0, 0, 1, 0x68, 0xEF, 0x38]
        );
    }

    #[test]
    fn test_avcc_annexb_both_ways() {
        let avcc = [
            0x00, 0x00, 0x00, 0x02, 0x09, 0xF0, // AUD
            0x00, 0x00, 0x00, 0x03, 0x65, 0x88, 0x84, // IDR
        ];
        let annexb = avcc_to_annexb(&avcc).unwrap();
        assert_eq!(
            &annexb[..],
            &[0, 0, 0, 1, 0x09, 0xF0, 0, 0, 0, 1, 0x65, 0x88, 0x84]
        );
        assert_eq!(&annexb_to_avcc(&annexb).unwrap()[..], &avcc[..]);
    }

    #[test]
    fn test_annexb_three_byte_start_codes() {
        let annexb = [0, 0, 1, 0x67, 0x42, 0, 0, 1, 0x68, 0xCE];
        let nalus = split_annexb(&annexb).unwrap();
        assert_eq!(nalus, vec![&[0x67, 0x42][..], &[0x68, 0xCE][..]]);
    }

    #[test]
    fn test_malformed_framing() {
        // Length runs past the buffer
        assert_eq!(
            avcc_to_annexb(&[0, 0, 0, 9, 0x65]),
            Err(ConversionError::MalformedNalu)
        );
        // Annex-B without leading start code
        assert_eq!(
            annexb_to_avcc(&[0x65, 0, 0, 1, 0x41]),
            Err(ConversionError::MalformedNalu)
        );
        assert!(annexb_to_avcc(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_nalu_iterator() {
        let data = [0x00, 0x02, 0x65, 0x01, 0x00, 0x01, 0x41];
        let nalus: Vec<_> = NaluIterator::new(&data, 2).collect();
        assert_eq!(nalus, vec![&[0x65, 0x01][..], &[0x41][..]]);
    }
}
