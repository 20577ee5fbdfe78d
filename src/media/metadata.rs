//! Stream metadata (`onMetaData`) normalization
//!
//! The publish path sends metadata as `@setDataFrame` + `onMetaData` + object,
//! players expect `onMetaData` + object. These helpers add or strip the
//! wrapper and never fail the stream: on malformed input the original bytes
//! are passed through and the decode error is reported alongside.

use bytes::Bytes;

use crate::amf::{self, Amf0Encoder, AmfValue};
use crate::error::AmfError;

/// Wrapper string placed before the metadata record on the publish path
pub const METADATA_MARKER: &str = "@setDataFrame";

/// Name of the metadata record
pub const ON_METADATA: &str = "onMetaData";

/// Value of the `version` field in synthesized metadata
pub const METADATA_VERSION: &str = concat!("rtmp-relay ", env!("CARGO_PKG_VERSION"));

/// Sentinel for "unknown" in [`build_metadata`]
pub const UNSET: i32 = -1;

/// Result of a normalization pass
///
/// `bytes` is always safe to forward. `error` is set when the input could
/// not be decoded and was passed through unchanged.
#[derive(Debug, Clone, PartialEq)]
pub struct Normalized {
    pub bytes: Bytes,
    pub error: Option<AmfError>,
}

impl Normalized {
    fn ok(bytes: Bytes) -> Self {
        Self { bytes, error: None }
    }

    fn passthrough(raw: &[u8], error: AmfError) -> Self {
        tracing::warn!(error = %error, len = raw.len(), "metadata not normalized, forwarding as is");
        Self {
            bytes: Bytes::copy_from_slice(raw),
            error: Some(error),
        }
    }
}

/// Make sure the payload starts with `@setDataFrame`
pub fn ensure_wrapped(raw: &[u8]) -> Normalized {
    match amf::decode_string(raw) {
        Ok((name, _)) if name == METADATA_MARKER => Normalized::ok(Bytes::copy_from_slice(raw)),
        Ok(_) => {
            let mut encoder = Amf0Encoder::with_capacity(16 + raw.len());
            encoder.encode_str(METADATA_MARKER);
            encoder.put_raw(raw);
            Normalized::ok(encoder.finish())
        }
        Err(e) => Normalized::passthrough(raw, e),
    }
}

/// Make sure the payload does not start with `@setDataFrame`
///
/// Repeated wrappers are all removed.
pub fn ensure_unwrapped(raw: &[u8]) -> Normalized {
    let mut rest = raw;
    loop {
        match amf::decode_string(rest) {
            Ok((name, consumed)) if name == METADATA_MARKER => rest = &rest[consumed..],
            Ok(_) => return Normalized::ok(Bytes::copy_from_slice(rest)),
            // Nothing stripped yet: the input itself is malformed
            Err(e) if rest.len() == raw.len() => return Normalized::passthrough(raw, e),
            // Marker followed by something undecodable: still drop the marker
            Err(_) => return Normalized::ok(Bytes::copy_from_slice(rest)),
        }
    }
}

/// Build a fresh `onMetaData` record
///
/// Parameters equal to [`UNSET`] are left out. `version` is always last.
pub fn build_metadata(width: i32, height: i32, audio_codec_id: i32, video_codec_id: i32) -> Bytes {
    let mut pairs = Vec::with_capacity(5);
    for (key, value) in [
        ("width", width),
        ("height", height),
        ("audiocodecid", audio_codec_id),
        ("videocodecid", video_codec_id),
    ] {
        if value != UNSET {
            pairs.push((key.to_string(), AmfValue::from(value)));
        }
    }
    pairs.push(("version".to_string(), AmfValue::from(METADATA_VERSION)));

    let mut encoder = Amf0Encoder::new();
    encoder.encode_str(ON_METADATA);
    // Property names above are fixed and non-empty
    if let Err(e) = encoder.encode(&AmfValue::Object(pairs)) {
        tracing::warn!(error = %e, "metadata properties not encodable");
    }
    encoder.finish()
}

/// Read the metadata properties, with or without the wrapper
///
/// The object is read leniently since some encoders omit the end marker.
pub fn parse_metadata(raw: &[u8]) -> Result<Vec<(String, AmfValue)>, AmfError> {
    let mut pos = 0;
    let (name, consumed) = amf::decode_string(raw)?;
    pos += consumed;
    if name == METADATA_MARKER {
        let (_, consumed) = amf::decode_string(&raw[pos..])?;
        pos += consumed;
    }
    let (pairs, _) = amf::decode_object_or_array(&raw[pos..], true)?;
    Ok(pairs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;

    fn wrap_unchecked(unwrapped: &[u8]) -> Bytes {
        let mut buf = BytesMut::new();
        buf.extend_from_slice(&amf::encode(&AmfValue::from(METADATA_MARKER)).unwrap());
        buf.extend_from_slice(unwrapped);
        buf.freeze()
    }

    fn on_metadata() -> Bytes {
        amf::encode_all(&[
            AmfValue::from(ON_METADATA),
            AmfValue::Object(vec![("width".into(), AmfValue::Number(640.0))]),
        ])
        .unwrap()
    }

    #[test]
    fn test_wrap_then_unwrap() {
        let raw = on_metadata();
        let wrapped = ensure_wrapped(&raw);
        assert!(wrapped.error.is_none());
        assert_eq!(
            amf::decode_string(&wrapped.bytes).unwrap().0,
            METADATA_MARKER
        );
        assert_eq!(&wrapped.bytes[16..], &raw[..]);

        let unwrapped = ensure_unwrapped(&wrapped.bytes);
        assert_eq!(unwrapped.bytes, raw);
    }

    #[test]
    fn test_idempotent() {
        let raw = on_metadata();
        let once = ensure_wrapped(&raw).bytes;
        assert_eq!(ensure_wrapped(&once).bytes, once);

        let once = ensure_unwrapped(&raw).bytes;
        assert_eq!(ensure_unwrapped(&once).bytes, once);

        let doubled = wrap_unchecked(&wrap_unchecked(&raw));
        let once = ensure_unwrapped(&doubled).bytes;
        assert_eq!(once, raw);
        assert_eq!(ensure_unwrapped(&once).bytes, once);
    }

    #[test]
    fn test_malformed_passes_through() {
        let garbage = [0x00, 0x01, 0x02];
        let wrapped = ensure_wrapped(&garbage);
        assert_eq!(&wrapped.bytes[..], &garbage[..]);
        assert!(matches!(
            wrapped.error,
            Some(AmfError::UnexpectedType { expected: "string", found: 0x00 })
        ));

        let unwrapped = ensure_unwrapped(&garbage);
        assert_eq!(&unwrapped.bytes[..], &garbage[..]);
        assert!(unwrapped.error.is_some());

        assert!(ensure_wrapped(&[]).error.is_some());
    }

    #[test]
    fn test_truncated_name_passes_through() {
        // Length prefix cut short
        let truncated = [0x02, 0x00];
        let wrapped = ensure_wrapped(&truncated);
        assert_eq!(&wrapped.bytes[..], &truncated[..]);
        assert_eq!(wrapped.error, Some(AmfError::UnexpectedEof));

        let unwrapped = ensure_unwrapped(&truncated);
        assert_eq!(&unwrapped.bytes[..], &truncated[..]);
        assert_eq!(unwrapped.error, Some(AmfError::UnexpectedEof));

        // Length prefix larger than the body
        let short_body = [0x02, 0x00, 0x05, b'a'];
        let wrapped = ensure_wrapped(&short_body);
        assert_eq!(&wrapped.bytes[..], &short_body[..]);
        assert_eq!(
            wrapped.error,
            Some(AmfError::LengthOverflow { len: 5, remaining: 1 })
        );
    }

    #[test]
    fn test_build_metadata_only_version() {
        let bytes = build_metadata(UNSET, UNSET, UNSET, UNSET);
        let values = amf::decode_all(&bytes).unwrap();
        assert_eq!(values[0], AmfValue::from(ON_METADATA));
        assert_eq!(
            values[1],
            AmfValue::Object(vec![("version".into(), AmfValue::from(METADATA_VERSION))])
        );
    }

    #[test]
    fn test_build_metadata_field_order() {
        let pairs = parse_metadata(&build_metadata(1280, 720, 10, 7)).unwrap();
        let keys: Vec<&str> = pairs.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, ["width", "height", "audiocodecid", "videocodecid", "version"]);
        assert_eq!(pairs[0].1, AmfValue::Number(1280.0));
        assert_eq!(pairs[1].1, AmfValue::Number(720.0));
        assert_eq!(pairs[2].1, AmfValue::Number(10.0));
        assert_eq!(pairs[3].1, AmfValue::Number(7.0));
    }

    #[test]
    fn test_parse_metadata_wrapped_ecma_array() {
        let mut raw = BytesMut::new();
        raw.extend_from_slice(&amf::encode(&AmfValue::from(METADATA_MARKER)).unwrap());
        raw.extend_from_slice(&amf::encode(&AmfValue::from(ON_METADATA)).unwrap());
        raw.extend_from_slice(&[
            0x08, 0x00, 0x00, 0x00, 0x01, // ECMA array
            0x00, 0x06, b'h', b'e', b'i', b'g', b'h', b't', //
            0x00, 0x40, 0x86, 0x80, 0x00, 0x00, 0x00, 0x00, 0x00, // 720.0
        ]);
        let pairs = parse_metadata(&raw).unwrap();
        assert_eq!(pairs, vec![("height".to_string(), AmfValue::Number(720.0))]);
    }
}
