//! Frame model and wire format converters
//!
//! One [`Frame`] type flows through the relay; each output protocol has a
//! pair of pure conversion functions to and from it.

pub mod flv;
pub mod frame;
pub mod rtmp;
pub mod sample;

pub use flv::{from_flv, to_flv};
pub use frame::{Frame, MediaType, StreamKey};
pub use rtmp::{from_rtmp, to_rtmp, to_rtmp_relay};
pub use sample::{from_sample, to_sample, SampleCodec, SegmentSample};
