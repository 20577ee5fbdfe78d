//! HLS segmentation
//!
//! A [`SegmentMuxer`] turns codec-neutral samples into MPEG-TS segments and
//! keeps a sliding [`Playlist`] of the most recent ones. [`HlsSink`] wires a
//! muxer to the registry as an ordinary subscriber.
//!
//! ```text
//! Publisher ──► StreamRegistry ──► HlsSink ──► SegmentMuxer ──► TsWriter
//!                                     │                │
//!                                     ▼                ▼
//!                                 HlsOutput  ◄──── Playlist
//! ```

pub mod config;
pub mod muxer;
pub mod naming;
pub mod playlist;
pub mod sink;
pub mod ts;

pub use config::HlsConfig;
pub use muxer::SegmentMuxer;
pub use naming::{DefaultNaming, NamingStrategy};
pub use playlist::{Playlist, Segment};
pub use sink::{HlsOutput, HlsSink};
pub use ts::TsWriter;
