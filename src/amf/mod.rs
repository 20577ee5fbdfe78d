//! AMF0 structured values
//!
//! Stream metadata (`onMetaData`) is carried as AMF0. This module provides
//! the closed value type and a canonical encoder with a bounds-checked
//! decoder.

pub mod amf0;
pub mod value;

pub use amf0::{
    decode, decode_all, decode_object_or_array, decode_strict_array, decode_string, encode,
    encode_all, Amf0Decoder, Amf0Encoder,
};
pub use value::AmfValue;
