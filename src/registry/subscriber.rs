//! Subscriber side of a group
//!
//! Each subscriber owns a bounded queue and one consumer task. The group
//! only keeps the enqueue half plus a cancellation token; the consumer task
//! drains the queue into an external [`PacketSink`].
//!
//! ```text
//!   Group::on_publisher_frame
//!        │ try_send (never blocks)
//!        ▼
//!   mpsc::Sender<OutPacket> ──► consumer task ──► PacketSink::write
//!                                   │               (under write timeout)
//!                                   └─► detach on timeout / sink error / cancel
//! ```

use std::sync::{Arc, Weak};
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::error::ConversionError;
use crate::media::flv::FLV_HEADER;
use crate::protocol::RtmpMessage;
use crate::remux::{self, Frame, MediaType, SegmentSample, StreamKey};

use super::store::StreamRegistry;

/// Message stream id used on RTMP output (the first stream a client creates)
pub const PLAY_STREAM_ID: u32 = 1;

/// Wire format negotiated by a subscriber
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputFormat {
    /// RTMP play: metadata as plain `onMetaData`
    Rtmp,
    /// RTMP push to another server: metadata wrapped in `@setDataFrame`
    RtmpRelay,
    /// HTTP-FLV: file header, then tags
    Flv,
    /// Segment samples for the MPEG-TS muxer
    Sample,
}

impl OutputFormat {
    pub(super) const COUNT: usize = 4;

    pub(super) fn index(&self) -> usize {
        match self {
            OutputFormat::Rtmp => 0,
            OutputFormat::RtmpRelay => 1,
            OutputFormat::Flv => 2,
            OutputFormat::Sample => 3,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            OutputFormat::Rtmp => "rtmp",
            OutputFormat::RtmpRelay => "rtmp-relay",
            OutputFormat::Flv => "flv",
            OutputFormat::Sample => "sample",
        }
    }

    /// Whether frames of this media type are sent in this format at all
    pub fn carries(&self, media_type: MediaType) -> bool {
        !(*self == OutputFormat::Sample && media_type == MediaType::Metadata)
    }

    /// Convert one frame to this format
    ///
    /// `Ok(None)` means the frame has nothing to deliver in this format.
    pub fn convert(&self, frame: &Frame) -> Result<Option<OutPacket>, ConversionError> {
        Ok(match self {
            OutputFormat::Rtmp => Some(OutPacket::Rtmp(remux::to_rtmp(frame, PLAY_STREAM_ID))),
            OutputFormat::RtmpRelay => {
                Some(OutPacket::Rtmp(remux::to_rtmp_relay(frame, PLAY_STREAM_ID)))
            }
            OutputFormat::Flv => Some(OutPacket::Flv(remux::to_flv(frame).encode()?)),
            OutputFormat::Sample => remux::to_sample(frame)?.map(OutPacket::Sample),
        })
    }

    /// Packets sent before anything else
    pub(super) fn preamble(&self) -> Option<OutPacket> {
        match self {
            OutputFormat::Flv => Some(OutPacket::Flv(Bytes::from_static(&FLV_HEADER))),
            _ => None,
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// One unit handed to a sink
///
/// Cheap to clone: payloads are reference counted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutPacket {
    /// RTMP message, to be chunked by the transport
    Rtmp(RtmpMessage),
    /// Encoded FLV bytes (file header or one tag with its previous tag size)
    Flv(Bytes),
    /// Segment sample
    Sample(SegmentSample),
}

/// External writer for one subscriber (socket, HTTP body, muxer)
#[async_trait::async_trait]
pub trait PacketSink: Send + 'static {
    /// Write one packet; an error detaches the subscriber
    async fn write(&mut self, packet: OutPacket) -> std::io::Result<()>;

    /// Called once after the subscriber is detached
    async fn close(&mut self) {}
}

/// Why a subscriber stopped receiving
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetachReason {
    /// Detached by its owner (explicit detach or handle dropped)
    Unsubscribed,
    /// Queue was full when a frame was forwarded
    QueueFull,
    /// A sink write did not finish within the write timeout
    WriteTimeout,
    /// The sink returned an error
    SinkClosed,
    /// A frame could not be represented in the subscriber's format
    ConversionFailed,
}

impl std::fmt::Display for DetachReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            DetachReason::Unsubscribed => "unsubscribed",
            DetachReason::QueueFull => "queue full",
            DetachReason::WriteTimeout => "write timeout",
            DetachReason::SinkClosed => "sink closed",
            DetachReason::ConversionFailed => "conversion failed",
        };
        f.write_str(s)
    }
}

type ReasonSender = Arc<watch::Sender<Option<DetachReason>>>;

/// Record the first reason only
fn set_reason(tx: &ReasonSender, reason: DetachReason) {
    tx.send_if_modified(|current| {
        if current.is_none() {
            *current = Some(reason);
            true
        } else {
            false
        }
    });
}

/// Group-side view of a subscriber
#[derive(Debug)]
pub(super) struct SubscriberSlot {
    pub format: OutputFormat,
    pub tx: mpsc::Sender<OutPacket>,
    pub cancel: CancellationToken,
    reason: ReasonSender,
    /// Packets enqueued, backlog included
    pub enqueued: u64,
}

impl SubscriberSlot {
    /// Enqueue without waiting
    ///
    /// Returns the detach reason when the packet could not be queued.
    pub fn offer(&mut self, packet: OutPacket) -> Result<(), DetachReason> {
        if self.cancel.is_cancelled() {
            return Err(self.reason().unwrap_or(DetachReason::Unsubscribed));
        }
        match self.tx.try_send(packet) {
            Ok(()) => {
                self.enqueued += 1;
                Ok(())
            }
            Err(mpsc::error::TrySendError::Full(_)) => Err(DetachReason::QueueFull),
            // Consumer already gone; it recorded its own reason
            Err(mpsc::error::TrySendError::Closed(_)) => {
                Err(self.reason().unwrap_or(DetachReason::SinkClosed))
            }
        }
    }

    /// Stop delivery immediately; queued packets are never written
    pub fn detach(&self, reason: DetachReason) {
        set_reason(&self.reason, reason);
        self.cancel.cancel();
    }

    fn reason(&self) -> Option<DetachReason> {
        *self.reason.borrow()
    }
}

/// Caller's handle to an attached subscriber
///
/// Dropping the handle detaches the subscriber.
#[derive(Debug)]
pub struct SubscriberHandle {
    pub(super) id: u64,
    pub(super) key: StreamKey,
    pub(super) format: OutputFormat,
    pub(super) backlog: crate::media::BacklogStatus,
    pub(super) cancel: CancellationToken,
    pub(super) reason: watch::Receiver<Option<DetachReason>>,
}

impl SubscriberHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn stream_key(&self) -> &StreamKey {
        &self.key
    }

    pub fn format(&self) -> OutputFormat {
        self.format
    }

    /// What the subscriber was primed with on attach
    pub fn backlog(&self) -> crate::media::BacklogStatus {
        self.backlog
    }

    pub fn is_detached(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Reason of the detach, once detached
    pub fn detach_reason(&self) -> Option<DetachReason> {
        *self.reason.borrow()
    }

    /// Wait until the subscriber is detached
    pub async fn closed(&self) -> DetachReason {
        let mut rx = self.reason.clone();
        let reason = match rx.wait_for(|r| r.is_some()).await {
            Ok(r) => *r,
            Err(_) => *self.reason.borrow(),
        };
        reason.unwrap_or(DetachReason::Unsubscribed)
    }
}

impl Drop for SubscriberHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Consumer half of a new subscriber
pub(super) struct SubscriberParts {
    pub rx: mpsc::Receiver<OutPacket>,
    pub cancel: CancellationToken,
    pub reason_tx: ReasonSender,
    pub reason_rx: watch::Receiver<Option<DetachReason>>,
}

impl SubscriberParts {
    /// Build the group slot and the matching consumer half
    pub fn new(format: OutputFormat, capacity: usize) -> (SubscriberSlot, Self) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let (reason_tx, reason_rx) = watch::channel(None);
        let reason_tx = Arc::new(reason_tx);
        let cancel = CancellationToken::new();

        let slot = SubscriberSlot {
            format,
            tx,
            cancel: cancel.clone(),
            reason: Arc::clone(&reason_tx),
            enqueued: 0,
        };
        let parts = Self {
            rx,
            cancel,
            reason_tx,
            reason_rx,
        };
        (slot, parts)
    }
}

/// Where a consumer reports its own detach
pub(super) struct ConsumerContext {
    pub id: u64,
    pub key: StreamKey,
    pub write_timeout: Duration,
    pub registry: Weak<StreamRegistry>,
    pub span: tracing::Span,
}

/// Spawn the consumer task draining `rx` into `sink`
pub(super) fn spawn_consumer<S: PacketSink>(
    sink: S,
    rx: mpsc::Receiver<OutPacket>,
    cancel: CancellationToken,
    reason_tx: ReasonSender,
    ctx: ConsumerContext,
) {
    let span = ctx.span.clone();
    tokio::spawn(consume(sink, rx, cancel, reason_tx, ctx).instrument(span));
}

async fn consume<S: PacketSink>(
    mut sink: S,
    mut rx: mpsc::Receiver<OutPacket>,
    cancel: CancellationToken,
    reason_tx: ReasonSender,
    ctx: ConsumerContext,
) {
    let mut written = 0u64;

    let reason = loop {
        let packet = tokio::select! {
            biased;
            _ = cancel.cancelled() => break DetachReason::Unsubscribed,
            packet = rx.recv() => match packet {
                Some(p) => p,
                // Group dropped the slot without cancelling
                None => break DetachReason::Unsubscribed,
            },
        };

        if cancel.is_cancelled() {
            break DetachReason::Unsubscribed;
        }

        match tokio::time::timeout(ctx.write_timeout, sink.write(packet)).await {
            Ok(Ok(())) => written += 1,
            Ok(Err(e)) => {
                tracing::warn!(subscriber = ctx.id, error = %e, "Sink write failed, detaching");
                break DetachReason::SinkClosed;
            }
            Err(_) => {
                tracing::warn!(
                    subscriber = ctx.id,
                    timeout_ms = ctx.write_timeout.as_millis() as u64,
                    "Sink write timed out, detaching"
                );
                break DetachReason::WriteTimeout;
            }
        }
    };

    set_reason(&reason_tx, reason);
    cancel.cancel();
    // Releases everything still queued
    drop(rx);
    sink.close().await;

    let reason = (*reason_tx.borrow()).unwrap_or(reason);
    tracing::debug!(subscriber = ctx.id, written, reason = %reason, "Consumer finished");

    if let Some(registry) = ctx.registry.upgrade() {
        registry.remove_subscriber(&ctx.key, ctx.id).await;
    }
}
