//! Media handling
//!
//! This module provides:
//! - FLV tag parsing and generation
//! - H.264/AVC configuration parsing and AVCC/Annex-B conversion
//! - AAC configuration parsing and ADTS framing
//! - GOP buffering for late-joiner support
//! - `onMetaData` normalization and synthesis

pub mod aac;
pub mod flv;
pub mod gop;
pub mod h264;
pub mod metadata;

pub use aac::{AacPacketType, AudioSpecificConfig};
pub use flv::{FlvTag, FlvTagType, FLV_HEADER};
pub use gop::{BacklogStatus, GopBuffer};
pub use h264::{annexb_to_avcc, avcc_to_annexb, AvcConfig, AvcPacketType, NaluType};
pub use metadata::{build_metadata, ensure_unwrapped, ensure_wrapped, parse_metadata, Normalized};
