//! Error types
//!
//! Every failure in the relay core is local to one unit (a metadata record,
//! a frame conversion, a subscriber). None of these are fatal to the process.

use thiserror::Error;

use crate::registry::RegistryError;

/// Result alias using the crate error
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Top-level error
#[derive(Debug, Error)]
pub enum Error {
    #[error("amf: {0}")]
    Amf(#[from] AmfError),

    #[error("media: {0}")]
    Media(#[from] MediaError),

    #[error("conversion: {0}")]
    Conversion(#[from] ConversionError),

    #[error("chunk stream: {0}")]
    Chunk(#[from] ChunkError),

    #[error("registry: {0}")]
    Registry(#[from] RegistryError),

    #[error("config: {0}")]
    Config(#[from] ConfigError),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

/// Structured value (AMF0) encode or decode failure
///
/// A decoder that returns one of these has not consumed any input, and an
/// encoder has not written any output.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AmfError {
    #[error("unexpected end of buffer")]
    UnexpectedEof,

    #[error("length prefix {len} exceeds remaining {remaining} bytes")]
    LengthOverflow { len: usize, remaining: usize },

    #[error("unknown type marker 0x{0:02x}")]
    UnknownMarker(u8),

    #[error("expected {expected}, found marker 0x{found:02x}")]
    UnexpectedType { expected: &'static str, found: u8 },

    #[error("invalid utf-8 in string")]
    InvalidUtf8,

    #[error("invalid object end marker")]
    InvalidObjectEnd,

    #[error("nesting too deep")]
    NestingTooDeep,

    #[error("object key is empty")]
    EmptyKey,

    #[error("object key of {0} bytes exceeds 65535")]
    KeyTooLong(usize),
}

/// Codec record parsing failure
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MediaError {
    #[error("invalid AVC packet")]
    InvalidAvcPacket,

    #[error("invalid AAC packet")]
    InvalidAacPacket,

    #[error("invalid FLV tag")]
    InvalidFlvTag,

    #[error("FLV tag body of {0} bytes exceeds 16777215")]
    FlvTagTooLarge(usize),
}

/// A frame cannot be represented in the target wire format
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConversionError {
    #[error("media type not carried by {0}")]
    UnsupportedMediaType(&'static str),

    #[error("codec not supported by {0}")]
    UnsupportedCodec(&'static str),

    #[error("payload truncated")]
    Truncated,

    #[error("malformed NAL unit framing")]
    MalformedNalu,

    #[error("RTMP message type {0} does not carry media")]
    NotMedia(u8),

    #[error(transparent)]
    Media(#[from] MediaError),
}

/// Chunk stream decoding failure
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChunkError {
    #[error("continuation chunk for unknown chunk stream {0}")]
    UnknownChunkStream(u32),

    #[error("message length {0} exceeds limit")]
    MessageTooLarge(u32),
}

/// Invalid configuration value, reported to the layer that loads configuration
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("{0} must be greater than zero")]
    NonPositive(&'static str),
}
