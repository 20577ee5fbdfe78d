//! Stream registry for pub/sub routing
//!
//! The registry manages active streams and routes frames from publishers to
//! subscribers. Each stream key owns one [`Group`] behind a mutex; every
//! subscriber gets a bounded queue and its own consumer task.
//!
//! # Architecture
//!
//! ```text
//!                          Arc<StreamRegistry>
//!                     ┌─────────────────────────┐
//!                     │ streams: HashMap<Key,   │
//!                     │   Mutex<Group {         │
//!                     │     gop, metadata,      │
//!                     │     subscribers: slots, │
//!                     │   }>                    │
//!                     │ >                       │
//!                     └───────────┬─────────────┘
//!                                 │
//!         ┌───────────────────────┼───────────────────────┐
//!         │                       │                       │
//!         ▼                       ▼                       ▼
//!  [PublisherHandle]        [consumer task]         [consumer task]
//!     send(frame)           queue ──► sink          queue ──► sink
//!         │                       ▲                       ▲
//!         └──► convert once per format, try_send ─────────┘
//! ```
//!
//! # Zero-Copy Design
//!
//! Frames are shared as `Arc<Frame>` and payloads are `bytes::Bytes`, so a
//! converted packet is reference counted across every subscriber of the same
//! output format.
//!
//! # Backpressure
//!
//! Forwarding never waits on a subscriber. A full queue or a sink write that
//! exceeds `subscriber_write_timeout` detaches that subscriber only.

pub mod config;
pub mod error;
pub mod group;
pub mod publisher;
pub mod store;
pub mod subscriber;

pub use config::RegistryConfig;
pub use error::RegistryError;
pub use group::{FanoutReport, Group, GroupState, GroupStats};
pub use publisher::PublisherHandle;
pub use store::StreamRegistry;
pub use subscriber::{
    DetachReason, OutPacket, OutputFormat, PacketSink, SubscriberHandle, PLAY_STREAM_ID,
};
