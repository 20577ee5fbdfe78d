//! rtmp-relay: live media relay core
//!
//! This library provides the protocol-independent middle of a live
//! streaming server:
//! - AMF0 values and `onMetaData` normalization
//! - A single [`Frame`] model with converters to and from RTMP, FLV and
//!   segment samples
//! - A stream registry fanning one publisher out to many subscribers,
//!   with GOP backlog for late joiners
//! - HLS segmentation into MPEG-TS with a sliding playlist
//!
//! Sockets, the RTMP handshake and HTTP serving live in the embedding
//! application.
//!
//! # Example: fan out to an FLV subscriber
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use rtmp_relay::{OutPacket, OutputFormat, PacketSink, StreamKey, StreamRegistry};
//!
//! struct Discard;
//!
//! #[async_trait::async_trait]
//! impl PacketSink for Discard {
//!     async fn write(&mut self, _packet: OutPacket) -> std::io::Result<()> {
//!         Ok(())
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let registry = Arc::new(StreamRegistry::new());
//!     let key = StreamKey::new("live", "cam1");
//!
//!     let publisher = registry.publish(&key).await?;
//!     let viewer = registry.attach(&key, OutputFormat::Flv, Discard).await;
//!
//!     // feed publisher.send(frame) from the ingest connection
//!
//!     registry.detach(viewer).await;
//!     registry.unpublish(publisher).await;
//!     Ok(())
//! }
//! ```

pub mod amf;
pub mod clock;
pub mod error;
pub mod hls;
pub mod media;
pub mod protocol;
pub mod registry;
pub mod remux;

// Re-export main types for convenience
pub use clock::{Clock, ManualClock, SharedClock, TokioClock};
pub use error::{Error, Result};
pub use hls::{HlsConfig, HlsSink, SegmentMuxer};
pub use registry::{
    OutPacket, OutputFormat, PacketSink, PublisherHandle, RegistryConfig, StreamRegistry,
    SubscriberHandle,
};
pub use remux::{Frame, MediaType, StreamKey};
