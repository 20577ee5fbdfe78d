//! AMF0 encoder and decoder
//!
//! Reference: AMF0 File Format Specification (amf0-file-format-specification.pdf)
//!
//! Type Markers handled here:
//! ```text
//! 0x00 - Number (IEEE 754 double, big-endian)
//! 0x01 - Boolean
//! 0x02 - String (UTF-8, 16-bit length prefix)
//! 0x03 - Object (key-value pairs until 0x000009)
//! 0x05 - Null
//! 0x06 - Undefined (decoded as Null)
//! 0x08 - ECMA Array (32-bit count hint, then pairs until 0x000009)
//! 0x0A - Strict Array (32-bit count, then values)
//! 0x0C - Long String (UTF-8, 32-bit length prefix)
//! ```
//!
//! Decoders work on a borrowed slice and report how many bytes they used.
//! On error nothing is consumed, so the caller never advances past a bad
//! value.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use super::value::AmfValue;
use crate::error::AmfError;

// AMF0 type markers
pub const MARKER_NUMBER: u8 = 0x00;
pub const MARKER_BOOLEAN: u8 = 0x01;
pub const MARKER_STRING: u8 = 0x02;
pub const MARKER_OBJECT: u8 = 0x03;
pub const MARKER_NULL: u8 = 0x05;
pub const MARKER_UNDEFINED: u8 = 0x06;
pub const MARKER_ECMA_ARRAY: u8 = 0x08;
pub const MARKER_OBJECT_END: u8 = 0x09;
pub const MARKER_STRICT_ARRAY: u8 = 0x0A;
pub const MARKER_LONG_STRING: u8 = 0x0C;

/// Maximum nesting depth for objects/arrays (prevent stack overflow)
const MAX_NESTING_DEPTH: usize = 64;

/// AMF0 decoder
pub struct Amf0Decoder {
    /// Tolerate a missing object end marker at end of buffer
    lenient: bool,
    /// Current nesting depth
    depth: usize,
}

impl Amf0Decoder {
    /// Create a strict decoder
    pub fn new() -> Self {
        Self {
            lenient: false,
            depth: 0,
        }
    }

    /// Create decoder with explicit lenient mode setting
    ///
    /// Some encoders (OBS among them) end the metadata object at the end of
    /// the message without writing `00 00 09`.
    pub fn with_lenient(lenient: bool) -> Self {
        Self { lenient, depth: 0 }
    }

    /// Decode a single value, returning it with the number of bytes consumed
    pub fn decode(&mut self, data: &[u8]) -> Result<(AmfValue, usize), AmfError> {
        let mut cur = data;
        self.depth = 0;
        let value = self.read_value(&mut cur)?;
        Ok((value, data.len() - cur.len()))
    }

    /// Decode all values until the buffer is exhausted
    pub fn decode_all(&mut self, data: &[u8]) -> Result<Vec<AmfValue>, AmfError> {
        let mut cur = data;
        let mut values = Vec::new();
        while cur.has_remaining() {
            self.depth = 0;
            values.push(self.read_value(&mut cur)?);
        }
        Ok(values)
    }

    fn read_value(&mut self, buf: &mut &[u8]) -> Result<AmfValue, AmfError> {
        if buf.is_empty() {
            return Err(AmfError::UnexpectedEof);
        }

        self.depth += 1;
        if self.depth > MAX_NESTING_DEPTH {
            return Err(AmfError::NestingTooDeep);
        }

        let marker = buf.get_u8();
        let result = match marker {
            MARKER_NUMBER => read_f64(buf).map(AmfValue::Number),
            MARKER_BOOLEAN => {
                if buf.is_empty() {
                    Err(AmfError::UnexpectedEof)
                } else {
                    Ok(AmfValue::Boolean(buf.get_u8() != 0))
                }
            }
            MARKER_STRING => read_utf8(buf).map(AmfValue::String),
            MARKER_LONG_STRING => read_utf8_long(buf).map(AmfValue::String),
            MARKER_OBJECT => self.read_pairs(buf).map(AmfValue::Object),
            MARKER_ECMA_ARRAY => {
                if buf.remaining() < 4 {
                    Err(AmfError::UnexpectedEof)
                } else {
                    // Count hint, not always accurate
                    let _count = buf.get_u32();
                    self.read_pairs(buf).map(AmfValue::Object)
                }
            }
            MARKER_STRICT_ARRAY => self.read_strict_array(buf).map(AmfValue::Array),
            MARKER_NULL | MARKER_UNDEFINED => Ok(AmfValue::Null),
            other => Err(AmfError::UnknownMarker(other)),
        };
        self.depth -= 1;
        result
    }

    fn read_pairs(&mut self, buf: &mut &[u8]) -> Result<Vec<(String, AmfValue)>, AmfError> {
        let mut pairs = Vec::new();

        loop {
            if buf.is_empty() && self.lenient {
                break;
            }

            let key = read_utf8(buf)?;

            if key.is_empty() {
                if buf.is_empty() {
                    if self.lenient {
                        break;
                    }
                    return Err(AmfError::UnexpectedEof);
                }
                if buf.get_u8() != MARKER_OBJECT_END {
                    return Err(AmfError::InvalidObjectEnd);
                }
                break;
            }

            let value = self.read_value(buf)?;
            pairs.push((key, value));
        }

        Ok(pairs)
    }

    fn read_strict_array(&mut self, buf: &mut &[u8]) -> Result<Vec<AmfValue>, AmfError> {
        if buf.remaining() < 4 {
            return Err(AmfError::UnexpectedEof);
        }

        let count = buf.get_u32() as usize;
        // Every element takes at least one byte
        if count > buf.remaining() {
            return Err(AmfError::LengthOverflow {
                len: count,
                remaining: buf.remaining(),
            });
        }

        let mut elements = Vec::with_capacity(count.min(1024));
        for _ in 0..count {
            elements.push(self.read_value(buf)?);
        }
        Ok(elements)
    }
}

impl Default for Amf0Decoder {
    fn default() -> Self {
        Self::new()
    }
}

fn read_f64(buf: &mut &[u8]) -> Result<f64, AmfError> {
    if buf.remaining() < 8 {
        return Err(AmfError::UnexpectedEof);
    }
    Ok(buf.get_f64())
}

/// Read UTF-8 string with 16-bit length prefix (no type marker)
fn read_utf8(buf: &mut &[u8]) -> Result<String, AmfError> {
    if buf.remaining() < 2 {
        return Err(AmfError::UnexpectedEof);
    }
    let len = buf.get_u16() as usize;
    read_utf8_body(buf, len)
}

/// Read UTF-8 string with 32-bit length prefix (no type marker)
fn read_utf8_long(buf: &mut &[u8]) -> Result<String, AmfError> {
    if buf.remaining() < 4 {
        return Err(AmfError::UnexpectedEof);
    }
    let len = buf.get_u32() as usize;
    read_utf8_body(buf, len)
}

fn read_utf8_body(buf: &mut &[u8], len: usize) -> Result<String, AmfError> {
    if buf.remaining() < len {
        return Err(AmfError::LengthOverflow {
            len,
            remaining: buf.remaining(),
        });
    }
    let s = std::str::from_utf8(&buf[..len])
        .map_err(|_| AmfError::InvalidUtf8)?
        .to_owned();
    buf.advance(len);
    Ok(s)
}

/// AMF0 encoder
///
/// Output is canonical: one value always produces the same bytes.
pub struct Amf0Encoder {
    buf: BytesMut,
}

impl Amf0Encoder {
    /// Create a new encoder
    pub fn new() -> Self {
        Self {
            buf: BytesMut::with_capacity(256),
        }
    }

    /// Create encoder with specific capacity
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(capacity),
        }
    }

    /// Get the encoded bytes and reset encoder
    pub fn finish(&mut self) -> Bytes {
        self.buf.split().freeze()
    }

    /// Get current encoded length
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Check if encoder is empty
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Encode a single AMF0 value
    ///
    /// Object keys must be non-empty (an empty key is the end marker) and
    /// fit a 16-bit length. Nothing is written when a key is rejected.
    pub fn encode(&mut self, value: &AmfValue) -> Result<(), AmfError> {
        check_keys(value)?;
        self.write_value(value);
        Ok(())
    }

    fn write_value(&mut self, value: &AmfValue) {
        match value {
            AmfValue::Null => {
                self.buf.put_u8(MARKER_NULL);
            }
            AmfValue::Boolean(b) => {
                self.buf.put_u8(MARKER_BOOLEAN);
                self.buf.put_u8(u8::from(*b));
            }
            AmfValue::Number(n) => {
                self.buf.put_u8(MARKER_NUMBER);
                self.buf.put_f64(*n);
            }
            AmfValue::String(s) => {
                if s.len() > 0xFFFF {
                    self.buf.put_u8(MARKER_LONG_STRING);
                    self.buf.put_u32(s.len() as u32);
                } else {
                    self.buf.put_u8(MARKER_STRING);
                    self.buf.put_u16(s.len() as u16);
                }
                self.buf.put_slice(s.as_bytes());
            }
            AmfValue::Object(pairs) => {
                self.buf.put_u8(MARKER_OBJECT);
                for (key, val) in pairs {
                    self.write_utf8(key);
                    self.write_value(val);
                }
                // Empty key + object end marker
                self.buf.put_u16(0);
                self.buf.put_u8(MARKER_OBJECT_END);
            }
            AmfValue::Array(elements) => {
                self.buf.put_u8(MARKER_STRICT_ARRAY);
                self.buf.put_u32(elements.len() as u32);
                for elem in elements {
                    self.write_value(elem);
                }
            }
        }
    }

    /// Encode multiple values
    ///
    /// All values are checked before any is written.
    pub fn encode_all(&mut self, values: &[AmfValue]) -> Result<(), AmfError> {
        values.iter().try_for_each(check_keys)?;
        for value in values {
            self.write_value(value);
        }
        Ok(())
    }

    /// Encode a string value (with type marker)
    pub fn encode_str(&mut self, s: &str) {
        self.write_value(&AmfValue::String(s.to_owned()));
    }

    /// Append already-encoded bytes verbatim
    pub fn put_raw(&mut self, raw: &[u8]) {
        self.buf.put_slice(raw);
    }

    /// Write an object key with its 16-bit length prefix (no type marker)
    fn write_utf8(&mut self, s: &str) {
        self.buf.put_u16(s.len() as u16);
        self.buf.put_slice(s.as_bytes());
    }
}

/// Reject object keys the wire format cannot carry
fn check_keys(value: &AmfValue) -> Result<(), AmfError> {
    match value {
        AmfValue::Object(pairs) => pairs.iter().try_for_each(|(key, val)| {
            if key.is_empty() {
                return Err(AmfError::EmptyKey);
            }
            if key.len() > 0xFFFF {
                return Err(AmfError::KeyTooLong(key.len()));
            }
            check_keys(val)
        }),
        AmfValue::Array(elements) => elements.iter().try_for_each(check_keys),
        _ => Ok(()),
    }
}

impl Default for Amf0Encoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Encode a single value
pub fn encode(value: &AmfValue) -> Result<Bytes, AmfError> {
    let mut encoder = Amf0Encoder::new();
    encoder.encode(value)?;
    Ok(encoder.finish())
}

/// Encode multiple values back to back
pub fn encode_all(values: &[AmfValue]) -> Result<Bytes, AmfError> {
    let mut encoder = Amf0Encoder::new();
    encoder.encode_all(values)?;
    Ok(encoder.finish())
}

/// Decode a single value, returning it with the number of bytes consumed
pub fn decode(data: &[u8]) -> Result<(AmfValue, usize), AmfError> {
    Amf0Decoder::new().decode(data)
}

/// Decode all values in the buffer
pub fn decode_all(data: &[u8]) -> Result<Vec<AmfValue>, AmfError> {
    Amf0Decoder::new().decode_all(data)
}

/// Decode a leading string value (0x02 or 0x0C)
pub fn decode_string(data: &[u8]) -> Result<(String, usize), AmfError> {
    let mut cur = data;
    if cur.is_empty() {
        return Err(AmfError::UnexpectedEof);
    }
    let s = match cur.get_u8() {
        MARKER_STRING => read_utf8(&mut cur)?,
        MARKER_LONG_STRING => read_utf8_long(&mut cur)?,
        found => {
            return Err(AmfError::UnexpectedType {
                expected: "string",
                found,
            })
        }
    };
    Ok((s, data.len() - cur.len()))
}

/// Decode a leading object (0x03) or ECMA array (0x08) into ordered pairs
pub fn decode_object_or_array(
    data: &[u8],
    lenient: bool,
) -> Result<(Vec<(String, AmfValue)>, usize), AmfError> {
    match data.first() {
        None => Err(AmfError::UnexpectedEof),
        Some(&MARKER_OBJECT) | Some(&MARKER_ECMA_ARRAY) => {
            let (value, consumed) = Amf0Decoder::with_lenient(lenient).decode(data)?;
            match value {
                AmfValue::Object(pairs) => Ok((pairs, consumed)),
                _ => Err(AmfError::UnexpectedType {
                    expected: "object",
                    found: data[0],
                }),
            }
        }
        Some(&found) => Err(AmfError::UnexpectedType {
            expected: "object",
            found,
        }),
    }
}

/// Decode a leading strict array (0x0A)
pub fn decode_strict_array(data: &[u8]) -> Result<(Vec<AmfValue>, usize), AmfError> {
    match data.first() {
        None => Err(AmfError::UnexpectedEof),
        Some(&MARKER_STRICT_ARRAY) => {
            let mut decoder = Amf0Decoder::new();
            let mut cur = &data[1..];
            let elements = decoder.read_strict_array(&mut cur)?;
            Ok((elements, data.len() - cur.len()))
        }
        Some(&found) => Err(AmfError::UnexpectedType {
            expected: "strict array",
            found,
        }),
    }
}
