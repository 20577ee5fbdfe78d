//! MPEG-TS writer (ITU-T H.222.0)
//!
//! Just enough of a transport stream for HLS: one program with an H.264
//! and/or AAC elementary stream, PAT/PMT at the start of every segment, one
//! PES per access unit, PCR on the first packet of each PES on the PCR PID.
//!
//! ```text
//! +------+-----+-----+------------+----------------------+
//! | 0x47 | PUSI| PID | AFC | CC   | [adaptation] payload |
//! +------+-----+-----+------------+----------------------+
//!   sync   1b    13b    2b    4b        184 bytes total
//! ```

use bytes::{BufMut, Bytes, BytesMut};

/// Transport packet size
pub const TS_PACKET_SIZE: usize = 188;

const TS_PAYLOAD_SIZE: usize = TS_PACKET_SIZE - 4;
const SYNC_BYTE: u8 = 0x47;

pub const PID_PAT: u16 = 0x0000;
pub const PID_PMT: u16 = 0x1000;
pub const PID_VIDEO: u16 = 0x0100;
pub const PID_AUDIO: u16 = 0x0101;

pub const STREAM_TYPE_H264: u8 = 0x1B;
pub const STREAM_TYPE_AAC: u8 = 0x0F;

const STREAM_ID_VIDEO: u8 = 0xE0;
const STREAM_ID_AUDIO: u8 = 0xC0;

const TABLE_ID_PAT: u8 = 0x00;
const TABLE_ID_PMT: u8 = 0x02;
const PROGRAM_NUMBER: u16 = 1;

/// 90 kHz clock ticks per millisecond
pub const TICKS_PER_MS: u64 = 90;

const TIMESTAMP_MASK: u64 = (1 << 33) - 1;

/// CRC-32/MPEG-2 (poly 0x04C11DB7, init all ones, no reflection)
pub fn crc32_mpeg2(data: &[u8]) -> u32 {
    let mut crc = 0xFFFF_FFFFu32;
    for &byte in data {
        crc ^= (byte as u32) << 24;
        for _ in 0..8 {
            crc = if crc & 0x8000_0000 != 0 {
                (crc << 1) ^ 0x04C1_1DB7
            } else {
                crc << 1
            };
        }
    }
    crc
}

/// Writes transport packets into an internal buffer
#[derive(Debug)]
pub struct TsWriter {
    has_video: bool,
    has_audio: bool,
    cc_pat: u8,
    cc_pmt: u8,
    cc_video: u8,
    cc_audio: u8,
    buf: BytesMut,
}

impl TsWriter {
    pub fn new() -> Self {
        Self {
            has_video: false,
            has_audio: false,
            cc_pat: 0,
            cc_pmt: 0,
            cc_video: 0,
            cc_audio: 0,
            buf: BytesMut::new(),
        }
    }

    /// Elementary streams announced in the next PMT
    pub fn set_streams(&mut self, has_video: bool, has_audio: bool) {
        self.has_video = has_video;
        self.has_audio = has_audio;
    }

    /// Video carries the PCR when present
    pub fn pcr_pid(&self) -> u16 {
        if self.has_video || !self.has_audio {
            PID_VIDEO
        } else {
            PID_AUDIO
        }
    }

    /// Bytes written since the last `take`
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Hand out everything written so far
    pub fn take(&mut self) -> Bytes {
        self.buf.split().freeze()
    }

    /// Write PAT and PMT
    pub fn write_tables(&mut self) {
        let pat = self.pat_section();
        let cc = next_cc(&mut self.cc_pat);
        self.write_psi(PID_PAT, cc, &pat);

        let pmt = self.pmt_section();
        let cc = next_cc(&mut self.cc_pmt);
        self.write_psi(PID_PMT, cc, &pmt);
    }

    fn pat_section(&self) -> BytesMut {
        let mut section = BytesMut::with_capacity(16);
        section.put_u8(TABLE_ID_PAT);
        // syntax indicator + reserved, length counts from transport_stream_id to CRC
        section.put_u16(0xB000 | (5 + 4 + 4));
        section.put_u16(0x0001); // transport_stream_id
        section.put_u8(0xC1); // version 0, current_next
        section.put_u8(0x00); // section_number
        section.put_u8(0x00); // last_section_number
        section.put_u16(PROGRAM_NUMBER);
        section.put_u16(0xE000 | PID_PMT);
        let crc = crc32_mpeg2(&section);
        section.put_u32(crc);
        section
    }

    fn pmt_section(&self) -> BytesMut {
        let mut streams = Vec::with_capacity(2);
        if self.has_video {
            streams.push((STREAM_TYPE_H264, PID_VIDEO));
        }
        if self.has_audio {
            streams.push((STREAM_TYPE_AAC, PID_AUDIO));
        }

        let length = 9 + 5 * streams.len() as u16 + 4;
        let mut section = BytesMut::with_capacity(3 + length as usize);
        section.put_u8(TABLE_ID_PMT);
        section.put_u16(0xB000 | length);
        section.put_u16(PROGRAM_NUMBER);
        section.put_u8(0xC1);
        section.put_u8(0x00);
        section.put_u8(0x00);
        section.put_u16(0xE000 | self.pcr_pid());
        section.put_u16(0xF000); // program_info_length
        for (stream_type, pid) in streams {
            section.put_u8(stream_type);
            section.put_u16(0xE000 | pid);
            section.put_u16(0xF000); // ES_info_length
        }
        let crc = crc32_mpeg2(&section);
        section.put_u32(crc);
        section
    }

    fn write_psi(&mut self, pid: u16, cc: u8, section: &[u8]) {
        let start = self.buf.len();
        self.buf.put_u8(SYNC_BYTE);
        self.buf.put_u16(0x4000 | pid); // payload_unit_start
        self.buf.put_u8(0x10 | cc);
        self.buf.put_u8(0x00); // pointer_field
        self.buf.put_slice(section);
        let used = self.buf.len() - start;
        self.buf.put_bytes(0xFF, TS_PACKET_SIZE - used);
    }

    /// Write one H.264 access unit (Annex-B)
    pub fn write_video(&mut self, pts: u64, dts: u64, keyframe: bool, data: &[u8]) {
        let with_pcr = self.pcr_pid() == PID_VIDEO;
        let pes = pes_packet(STREAM_ID_VIDEO, pts, Some(dts), data);
        let mut cc = self.cc_video;
        self.write_pes(PID_VIDEO, &mut cc, &pes, keyframe, with_pcr.then_some(dts));
        self.cc_video = cc;
    }

    /// Write one ADTS framed AAC access unit
    pub fn write_audio(&mut self, pts: u64, data: &[u8]) {
        let with_pcr = self.pcr_pid() == PID_AUDIO;
        let pes = pes_packet(STREAM_ID_AUDIO, pts, None, data);
        let mut cc = self.cc_audio;
        // Every AAC frame is a random access point
        self.write_pes(PID_AUDIO, &mut cc, &pes, true, with_pcr.then_some(pts));
        self.cc_audio = cc;
    }

    fn write_pes(
        &mut self,
        pid: u16,
        cc: &mut u8,
        pes: &[u8],
        random_access: bool,
        pcr: Option<u64>,
    ) {
        let mut pos = 0;
        let mut first = true;

        while pos < pes.len() {
            // Adaptation field including its length byte
            let mut adaptation: Vec<u8> = Vec::new();
            if first && (random_access || pcr.is_some()) {
                let mut flags = 0u8;
                if random_access {
                    flags |= 0x40;
                }
                if pcr.is_some() {
                    flags |= 0x10;
                }
                adaptation.push(0);
                adaptation.push(flags);
                if let Some(pcr) = pcr {
                    adaptation.extend_from_slice(&encode_pcr(pcr));
                }
            }

            let remaining = pes.len() - pos;
            let room = TS_PAYLOAD_SIZE - adaptation.len();
            if remaining < room {
                let stuffing = room - remaining;
                if adaptation.is_empty() {
                    adaptation.push(0);
                    if stuffing > 1 {
                        adaptation.push(0x00);
                        adaptation.resize(stuffing, 0xFF);
                    }
                } else {
                    adaptation.resize(adaptation.len() + stuffing, 0xFF);
                }
            }
            let adaptation_len = adaptation.len();
            if let Some(len) = adaptation.first_mut() {
                *len = (adaptation_len - 1) as u8;
            }

            let take = TS_PAYLOAD_SIZE - adaptation.len();
            let pusi = if first { 0x4000 } else { 0 };
            let afc = if adaptation.is_empty() { 0x10 } else { 0x30 };

            self.buf.put_u8(SYNC_BYTE);
            self.buf.put_u16(pusi | pid);
            self.buf.put_u8(afc | next_cc(cc));
            self.buf.put_slice(&adaptation);
            self.buf.put_slice(&pes[pos..pos + take]);

            pos += take;
            first = false;
        }
    }
}

impl Default for TsWriter {
    fn default() -> Self {
        Self::new()
    }
}

/// Return the current counter and advance it
fn next_cc(cc: &mut u8) -> u8 {
    let current = *cc;
    *cc = (*cc + 1) & 0x0F;
    current
}

fn pes_packet(stream_id: u8, pts: u64, dts: Option<u64>, data: &[u8]) -> BytesMut {
    let dts = dts.filter(|&d| d != pts);
    let header_len: usize = if dts.is_some() { 10 } else { 5 };

    let mut pes = BytesMut::with_capacity(9 + header_len + data.len());
    pes.put_slice(&[0x00, 0x00, 0x01, stream_id]);

    // Unbounded (0) when the length does not fit, allowed for video only
    let packet_len = 3 + header_len + data.len();
    if packet_len > 0xFFFF || stream_id == STREAM_ID_VIDEO {
        pes.put_u16(0);
    } else {
        pes.put_u16(packet_len as u16);
    }

    pes.put_u8(0x80); // marker bits
    match dts {
        Some(dts) => {
            pes.put_u8(0xC0);
            pes.put_u8(header_len as u8);
            put_timestamp(&mut pes, 0x3, pts);
            put_timestamp(&mut pes, 0x1, dts);
        }
        None => {
            pes.put_u8(0x80);
            pes.put_u8(header_len as u8);
            put_timestamp(&mut pes, 0x2, pts);
        }
    }
    pes.put_slice(data);
    pes
}

/// 33-bit timestamp in the 5-byte PES layout
fn put_timestamp(buf: &mut BytesMut, prefix: u8, ts: u64) {
    let ts = ts & TIMESTAMP_MASK;
    buf.put_u8((prefix << 4) | ((((ts >> 30) & 0x07) as u8) << 1) | 0x01);
    buf.put_u16(((((ts >> 15) & 0x7FFF) << 1) | 0x01) as u16);
    buf.put_u16((((ts & 0x7FFF) << 1) | 0x01) as u16);
}

/// PCR base (33 bits), 6 reserved bits, extension 0
fn encode_pcr(base: u64) -> [u8; 6] {
    let base = base & TIMESTAMP_MASK;
    [
        (base >> 25) as u8,
        (base >> 17) as u8,
        (base >> 9) as u8,
        (base >> 1) as u8,
        (((base & 0x01) << 7) as u8) | 0x7E,
        0x00,
    ]
}
