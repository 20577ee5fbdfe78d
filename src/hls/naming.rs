//! Segment and playlist naming
//!
//! The muxer never builds paths itself. It asks an injected strategy for
//! the identifier of each segment, so storage layout and URL schemes stay
//! outside the core.

use std::fmt::Debug;

use crate::remux::StreamKey;

/// Maps a stream and sequence number to external identifiers
pub trait NamingStrategy: Send + Sync + Debug {
    /// Identifier of one segment
    fn resolve(&self, key: &StreamKey, sequence: u64) -> String;

    /// Identifier of the stream's playlist
    fn playlist(&self, key: &StreamKey) -> String;
}

/// `{app}/{name}/{name}-{seq}.ts` and `{app}/{name}/playlist.m3u8`
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultNaming;

impl NamingStrategy for DefaultNaming {
    fn resolve(&self, key: &StreamKey, sequence: u64) -> String {
        format!("{}/{}/{}-{}.ts", key.app, key.name, key.name, sequence)
    }

    fn playlist(&self, key: &StreamKey) -> String {
        format!("{}/{}/playlist.m3u8", key.app, key.name)
    }
}
