//! RTMP protocol constants

/// Default chunk size before a Set Chunk Size message
pub const DEFAULT_CHUNK_SIZE: u32 = 128;

/// Chunk size we use for outbound media
pub const RECOMMENDED_CHUNK_SIZE: u32 = 4096;

/// Largest chunk size a peer may announce
pub const MAX_CHUNK_SIZE: u32 = 0x00FF_FFFF;

/// Upper bound on a reassembled message (protects against hostile lengths)
pub const MAX_MESSAGE_SIZE: u32 = 10 * 1024 * 1024;

/// Timestamp field value signalling a 4-byte extended timestamp
pub const EXTENDED_TIMESTAMP: u32 = 0x00FF_FFFF;

// Message type ids
pub const MSG_SET_CHUNK_SIZE: u8 = 1;
pub const MSG_AUDIO: u8 = 8;
pub const MSG_VIDEO: u8 = 9;
pub const MSG_DATA_AMF0: u8 = 18;

// Chunk stream ids used for outbound media
pub const CSID_AUDIO: u32 = 4;
pub const CSID_DATA: u32 = 5;
pub const CSID_VIDEO: u32 = 6;
