//! RTMP chunk stream encoding and decoding
//!
//! Chunk Format:
//! ```text
//! +--------------+----------------+--------------------+------------+
//! | Basic Header | Message Header | Extended Timestamp | Chunk Data |
//! | (1-3 bytes)  | (0,3,7,11)     | (0 or 4 bytes)     | (variable) |
//! +--------------+----------------+--------------------+------------+
//! ```
//!
//! Message header by format:
//! - fmt 0: timestamp(3) length(3) type(1) stream id(4, little-endian)
//! - fmt 1: timestamp delta(3) length(3) type(1)
//! - fmt 2: timestamp delta(3)
//! - fmt 3: nothing, everything inherited
//!
//! Reference: RTMP Specification Section 5.3

use std::collections::HashMap;

use bytes::{Buf, BufMut, Bytes, BytesMut};

use super::constants::*;
use super::message::RtmpMessage;
use crate::error::ChunkError;

/// Splits messages into chunks
///
/// Every message starts with a fmt 0 chunk; continuations are fmt 3.
#[derive(Debug, Clone)]
pub struct ChunkEncoder {
    chunk_size: usize,
}

impl ChunkEncoder {
    pub fn new() -> Self {
        Self::with_chunk_size(RECOMMENDED_CHUNK_SIZE)
    }

    pub fn with_chunk_size(chunk_size: u32) -> Self {
        Self {
            chunk_size: chunk_size.clamp(1, MAX_CHUNK_SIZE) as usize,
        }
    }

    pub fn chunk_size(&self) -> u32 {
        self.chunk_size as u32
    }

    /// Set Chunk Size control message announcing this encoder's chunk size
    pub fn set_chunk_size_message(&self) -> RtmpMessage {
        let mut payload = BytesMut::with_capacity(4);
        payload.put_u32(self.chunk_size as u32 & 0x7FFF_FFFF);
        RtmpMessage::new(MSG_SET_CHUNK_SIZE, 0, 0, payload.freeze())
    }

    /// Encode a message into one or more chunks
    pub fn encode(&self, msg: &RtmpMessage) -> Bytes {
        let chunks = msg.payload.len().div_ceil(self.chunk_size).max(1);
        let mut buf = BytesMut::with_capacity(msg.payload.len() + chunks * 8 + 16);
        self.encode_into(msg, &mut buf);
        buf.freeze()
    }

    /// Encode a message, appending to `buf`
    pub fn encode_into(&self, msg: &RtmpMessage, buf: &mut BytesMut) {
        let csid = msg.chunk_stream_id();
        let extended = msg.timestamp >= EXTENDED_TIMESTAMP;

        write_basic_header(buf, 0, csid);
        put_u24(buf, msg.timestamp.min(EXTENDED_TIMESTAMP));
        put_u24(buf, msg.payload.len() as u32);
        buf.put_u8(msg.type_id);
        buf.put_u32_le(msg.stream_id);
        if extended {
            buf.put_u32(msg.timestamp);
        }

        let mut chunks = msg.payload.chunks(self.chunk_size);
        if let Some(first) = chunks.next() {
            buf.put_slice(first);
        }
        for chunk in chunks {
            write_basic_header(buf, 3, csid);
            // Continuations repeat the extended timestamp
            if extended {
                buf.put_u32(msg.timestamp);
            }
            buf.put_slice(chunk);
        }
    }
}

impl Default for ChunkEncoder {
    fn default() -> Self {
        Self::new()
    }
}

fn write_basic_header(buf: &mut BytesMut, fmt: u8, csid: u32) {
    let fmt = fmt << 6;
    if csid < 64 {
        buf.put_u8(fmt | csid as u8);
    } else if csid < 320 {
        buf.put_u8(fmt);
        buf.put_u8((csid - 64) as u8);
    } else {
        let id = csid - 64;
        buf.put_u8(fmt | 1);
        buf.put_u8((id & 0xFF) as u8);
        buf.put_u8((id >> 8) as u8);
    }
}

fn put_u24(buf: &mut BytesMut, v: u32) {
    buf.put_u8((v >> 16) as u8);
    buf.put_u8((v >> 8) as u8);
    buf.put_u8(v as u8);
}

fn get_u24(buf: &mut &[u8]) -> u32 {
    let b = [buf.get_u8(), buf.get_u8(), buf.get_u8()];
    ((b[0] as u32) << 16) | ((b[1] as u32) << 8) | b[2] as u32
}

/// Per chunk stream state inherited by fmt 1/2/3 headers
#[derive(Debug, Default)]
struct ChunkStream {
    timestamp: u32,
    delta: u32,
    length: u32,
    type_id: u8,
    stream_id: u32,
    extended: bool,
    payload: BytesMut,
}

/// Header fields of one chunk as read off the wire
struct ChunkHeader {
    fmt: u8,
    csid: u32,
    /// Absolute timestamp (fmt 0) or delta (fmt 1/2)
    timestamp: Option<u32>,
    length: Option<u32>,
    type_id: Option<u8>,
    stream_id: Option<u32>,
    extended: bool,
    /// Basic + message header + extended timestamp
    header_len: usize,
}

/// Reassembles chunks into messages
///
/// Feed raw bytes with [`ChunkDecoder::extend`] and pull complete messages
/// with [`ChunkDecoder::decode`]. A partial chunk leaves the decoder
/// untouched until the rest of it arrives.
#[derive(Debug)]
pub struct ChunkDecoder {
    buf: BytesMut,
    chunk_size: usize,
    streams: HashMap<u32, ChunkStream>,
}

impl ChunkDecoder {
    pub fn new() -> Self {
        Self {
            buf: BytesMut::with_capacity(4096),
            chunk_size: DEFAULT_CHUNK_SIZE as usize,
            streams: HashMap::new(),
        }
    }

    /// Append received bytes
    pub fn extend(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Use a chunk size announced out of band
    pub fn set_chunk_size(&mut self, size: u32) {
        self.chunk_size = size.clamp(1, MAX_CHUNK_SIZE) as usize;
    }

    pub fn chunk_size(&self) -> u32 {
        self.chunk_size as u32
    }

    /// Bytes received but not yet consumed
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Decode the next complete message, `None` when more bytes are needed
    ///
    /// Set Chunk Size messages update the decoder before being returned.
    pub fn decode(&mut self) -> Result<Option<RtmpMessage>, ChunkError> {
        loop {
            let header = match self.peek_header()? {
                Some(h) => h,
                None => return Ok(None),
            };

            let stream = self.streams.entry(header.csid).or_default();

            let length = header.length.unwrap_or(stream.length);
            if length > MAX_MESSAGE_SIZE {
                return Err(ChunkError::MessageTooLarge(length));
            }

            // A fmt 0/1/2 header always begins a new message
            let continuation = header.fmt == 3 && !stream.payload.is_empty();
            let already = if continuation { stream.payload.len() } else { 0 };
            let take = (length as usize - already).min(self.chunk_size);

            if self.buf.len() < header.header_len + take {
                return Ok(None);
            }

            // Commit header fields
            match header.fmt {
                0 => {
                    stream.timestamp = header.timestamp.unwrap_or(0);
                    stream.delta = 0;
                }
                1 | 2 => {
                    let delta = header.timestamp.unwrap_or(0);
                    stream.delta = delta;
                    stream.timestamp = stream.timestamp.wrapping_add(delta);
                }
                _ => {
                    if !continuation {
                        stream.timestamp = stream.timestamp.wrapping_add(stream.delta);
                    }
                }
            }
            stream.length = length;
            if let Some(type_id) = header.type_id {
                stream.type_id = type_id;
            }
            if let Some(stream_id) = header.stream_id {
                stream.stream_id = stream_id;
            }
            stream.extended = header.extended;
            if !continuation {
                stream.payload.clear();
            }

            self.buf.advance(header.header_len);
            let data = self.buf.split_to(take);
            stream.payload.extend_from_slice(&data);

            if stream.payload.len() < length as usize {
                continue;
            }

            let msg = RtmpMessage::new(
                stream.type_id,
                stream.stream_id,
                stream.timestamp,
                stream.payload.split().freeze(),
            );

            if msg.type_id == MSG_SET_CHUNK_SIZE && msg.payload.len() >= 4 {
                let size = (&msg.payload[..]).get_u32() & 0x7FFF_FFFF;
                self.set_chunk_size(size);
            }

            return Ok(Some(msg));
        }
    }

    /// Parse the next chunk header without consuming it
    fn peek_header(&self) -> Result<Option<ChunkHeader>, ChunkError> {
        let data = &self.buf[..];
        let Some(&first) = data.first() else {
            return Ok(None);
        };

        let fmt = first >> 6;
        let (csid, basic_len) = match first & 0x3F {
            0 => match data.get(1) {
                Some(&b) => (b as u32 + 64, 2),
                None => return Ok(None),
            },
            1 => match (data.get(1), data.get(2)) {
                (Some(&lo), Some(&hi)) => ((((hi as u32) << 8) | lo as u32) + 64, 3),
                _ => return Ok(None),
            },
            id => (id as u32, 1),
        };

        let message_len = match fmt {
            0 => 11,
            1 => 7,
            2 => 3,
            _ => 0,
        };
        if data.len() < basic_len + message_len {
            return Ok(None);
        }

        let previous = self.streams.get(&csid);
        if fmt != 0 && previous.is_none() {
            return Err(ChunkError::UnknownChunkStream(csid));
        }

        let mut cur = &data[basic_len..basic_len + message_len];
        let mut header = ChunkHeader {
            fmt,
            csid,
            timestamp: None,
            length: None,
            type_id: None,
            stream_id: None,
            extended: false,
            header_len: basic_len + message_len,
        };

        if fmt <= 2 {
            let ts = get_u24(&mut cur);
            header.extended = ts == EXTENDED_TIMESTAMP;
            header.timestamp = Some(ts);
        } else {
            header.extended = previous.map(|s| s.extended).unwrap_or(false);
        }
        if fmt <= 1 {
            header.length = Some(get_u24(&mut cur));
            header.type_id = Some(cur.get_u8());
        }
        if fmt == 0 {
            header.stream_id = Some(cur.get_u32_le());
        }

        if header.extended {
            let at = header.header_len;
            if data.len() < at + 4 {
                return Ok(None);
            }
            let ext = (&data[at..at + 4]).get_u32();
            if fmt <= 2 {
                header.timestamp = Some(ext);
            }
            header.header_len += 4;
        }

        Ok(Some(header))
    }
}

impl Default for ChunkDecoder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn video(timestamp: u32, len: usize) -> RtmpMessage {
        let payload: Vec<u8> = (0..len).map(|i| i as u8).collect();
        RtmpMessage::new(MSG_VIDEO, 1, timestamp, Bytes::from(payload))
    }

    fn decode_all(decoder: &mut ChunkDecoder) -> Vec<RtmpMessage> {
        let mut out = Vec::new();
        while let Some(msg) = decoder.decode().unwrap() {
            out.push(msg);
        }
        out
    }

    #[test]
    fn test_single_chunk_layout() {
        let encoder = ChunkEncoder::with_chunk_size(128);
        let msg = RtmpMessage::new(MSG_AUDIO, 1, 0x010203, Bytes::from_static(&[0xAF, 0x01]));
        let bytes = encoder.encode(&msg);
        assert_eq!(
            &bytes[..],
            &[
                0x04, // fmt 0, csid 4
                0x01, 0x02, 0x03, // timestamp
                0x00, 0x00, 0x02, // length
                0x08, // type
                0x01, 0x00, 0x00, 0x00, // stream id LE
                0xAF, 0x01
            ]
        );
    }

    #[test]
    fn test_multi_chunk_uses_fmt3() {
        let encoder = ChunkEncoder::with_chunk_size(128);
        let bytes = encoder.encode(&video(40, 300));
        // 12 header + 128 + 1 + 128 + 1 + 44
        assert_eq!(bytes.len(), 12 + 300 + 2);
        assert_eq!(bytes[12 + 128], 0xC6);
        assert_eq!(bytes[12 + 128 + 1 + 128], 0xC6);
    }

    #[test]
    fn test_encode_decode_across_chunk_boundaries() {
        let encoder = ChunkEncoder::with_chunk_size(100);
        let mut decoder = ChunkDecoder::new();
        decoder.set_chunk_size(100);

        let messages = vec![
            video(0, 250),
            RtmpMessage::new(MSG_AUDIO, 1, 23, Bytes::from_static(&[0xAF, 0x01, 0x21])),
            video(33, 100),
        ];
        let mut wire = BytesMut::new();
        for msg in &messages {
            encoder.encode_into(msg, &mut wire);
        }

        // Feed one byte at a time
        let mut decoded = Vec::new();
        for b in wire.iter() {
            decoder.extend(&[*b]);
            decoded.extend(decode_all(&mut decoder));
        }
        assert_eq!(decoded, messages);
        assert_eq!(decoder.buffered(), 0);
    }

    #[test]
    fn test_extended_timestamp() {
        let encoder = ChunkEncoder::with_chunk_size(128);
        let msg = video(0x0100_0000, 200);
        let bytes = encoder.encode(&msg);
        assert_eq!(&bytes[1..4], &[0xFF, 0xFF, 0xFF]);

        let mut decoder = ChunkDecoder::new();
        decoder.extend(&bytes);
        assert_eq!(decode_all(&mut decoder), vec![msg]);
    }

    #[test]
    fn test_fmt1_fmt2_deltas() {
        let mut wire = BytesMut::new();
        // fmt 0, csid 4, ts 100, len 1, audio, stream 1
        wire.put_slice(&[0x04, 0, 0, 100, 0, 0, 1, 8, 1, 0, 0, 0, 0xAA]);
        // fmt 1, delta 20, len 2, audio
        wire.put_slice(&[0x44, 0, 0, 20, 0, 0, 2, 8, 0xBB, 0xCC]);
        // fmt 2, delta 30
        wire.put_slice(&[0x84, 0, 0, 30, 0xDD, 0xEE]);
        // fmt 3, new message reuses delta 30
        wire.put_slice(&[0xC4, 0x11, 0x22]);

        let mut decoder = ChunkDecoder::new();
        decoder.extend(&wire);
        let msgs = decode_all(&mut decoder);
        let stamps: Vec<u32> = msgs.iter().map(|m| m.timestamp).collect();
        assert_eq!(stamps, vec![100, 120, 150, 180]);
        assert_eq!(&msgs[3].payload[..], &[0x11, 0x22]);
        assert!(msgs.iter().all(|m| m.stream_id == 1));
    }

    #[test]
    fn test_set_chunk_size_applies() {
        let big = ChunkEncoder::with_chunk_size(4096);
        let mut wire = BytesMut::new();
        big.encode_into(&big.set_chunk_size_message(), &mut wire);
        big.encode_into(&video(0, 1000), &mut wire);

        let mut decoder = ChunkDecoder::new();
        decoder.extend(&wire);
        let msgs = decode_all(&mut decoder);
        assert_eq!(decoder.chunk_size(), 4096);
        assert_eq!(msgs.len(), 2);
        assert_eq!(msgs[1].payload.len(), 1000);
    }

    #[test]
    fn test_unknown_chunk_stream() {
        let mut decoder = ChunkDecoder::new();
        decoder.extend(&[0xC7, 0x00]);
        assert_eq!(decoder.decode(), Err(ChunkError::UnknownChunkStream(7)));
    }

    #[test]
    fn test_message_too_large() {
        let mut decoder = ChunkDecoder::new();
        decoder.extend(&[0x04, 0, 0, 0, 0xFF, 0xFF, 0xFE, 9, 1, 0, 0, 0]);
        assert_eq!(
            decoder.decode(),
            Err(ChunkError::MessageTooLarge(0x00FF_FFFE))
        );
    }

    #[test]
    fn test_two_byte_basic_header() {
        let mut buf = BytesMut::new();
        write_basic_header(&mut buf, 0, 100);
        assert_eq!(&buf[..], &[0x00, 36]);

        let mut buf = BytesMut::new();
        write_basic_header(&mut buf, 3, 400);
        assert_eq!(&buf[..], &[0xC1, 0x50, 0x01]);
    }
}
