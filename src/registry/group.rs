//! Per-stream distribution group
//!
//! A group is the serialized core of one stream key: publisher identity,
//! subscriber set, backlog and metadata. The registry wraps every group in a
//! `tokio::sync::Mutex`, so the methods here are plain synchronous code that
//! never awaits.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::Span;

use crate::clock::SharedClock;
use crate::media::gop::{BacklogStatus, GopBuffer};
use crate::media::metadata::{self, UNSET};
use crate::remux::{Frame, StreamKey};

use super::config::RegistryConfig;
use super::subscriber::{DetachReason, OutPacket, OutputFormat, SubscriberParts, SubscriberSlot};

/// State of a group
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupState {
    /// No publisher
    Empty,
    /// A publisher is active
    Publishing,
}

/// Outcome of forwarding one frame
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FanoutReport {
    /// Subscribers the frame was queued for
    pub delivered: usize,
    /// Subscribers whose format does not carry this frame or has nothing to send for it
    pub skipped: usize,
    /// Subscribers detached while forwarding
    pub detached: usize,
}

/// Snapshot of a group for introspection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupStats {
    pub state: GroupState,
    pub publisher_id: Option<u64>,
    /// Time since the current publisher started
    pub publishing_for: Option<Duration>,
    pub subscriber_count: usize,
    pub gop_frame_count: usize,
    pub gop_size_bytes: usize,
    pub has_metadata: bool,
    /// Frames received from publishers over the group's lifetime
    pub frames_forwarded: u64,
    /// Subscribers detached by the group (saturation, conversion)
    pub subscribers_dropped: u64,
}

#[derive(Debug)]
struct PublisherSlot {
    id: u64,
    cancel: CancellationToken,
    since: Instant,
}

/// Serialized state of one stream
#[derive(Debug)]
pub struct Group {
    key: StreamKey,
    span: Span,
    clock: SharedClock,
    config: RegistryConfig,
    publisher: Option<PublisherSlot>,
    subscribers: HashMap<u64, SubscriberSlot>,
    gop: GopBuffer,
    /// Last `onMetaData` from the publisher, unwrapped
    metadata: Option<Arc<Frame>>,
    frames_forwarded: u64,
    subscribers_dropped: u64,
    /// Removed from the registry; new publishers and subscribers look up again
    retired: bool,
}

impl Group {
    pub fn new(key: StreamKey, config: RegistryConfig, clock: SharedClock, span: Span) -> Self {
        Self {
            gop: GopBuffer::with_max_bytes(config.max_gop_bytes),
            key,
            span,
            clock,
            config,
            publisher: None,
            subscribers: HashMap::new(),
            metadata: None,
            frames_forwarded: 0,
            subscribers_dropped: 0,
            retired: false,
        }
    }

    pub fn key(&self) -> &StreamKey {
        &self.key
    }

    pub fn span(&self) -> &Span {
        &self.span
    }

    pub fn state(&self) -> GroupState {
        if self.publisher.is_some() {
            GroupState::Publishing
        } else {
            GroupState::Empty
        }
    }

    pub fn has_publisher(&self) -> bool {
        self.publisher.is_some()
    }

    pub fn is_publisher(&self, id: u64) -> bool {
        self.publisher.as_ref().map(|p| p.id) == Some(id)
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// No publisher and no subscribers
    pub fn is_idle(&self) -> bool {
        self.publisher.is_none() && self.subscribers.is_empty()
    }

    pub(super) fn is_retired(&self) -> bool {
        self.retired
    }

    /// Mark the group as no longer reachable from the registry
    pub(super) fn retire(&mut self) {
        self.retired = true;
    }

    /// Install a publisher, replacing any current one
    ///
    /// A replaced publisher has its token cancelled and the backlog starts
    /// over. Returns the replaced publisher's id.
    pub fn set_publisher(&mut self, id: u64, cancel: CancellationToken) -> Option<u64> {
        let _span = self.span.clone().entered();

        let previous = self.publisher.take().map(|prev| {
            prev.cancel.cancel();
            tracing::info!(previous = prev.id, publisher = id, "Publisher preempted");
            prev.id
        });
        if previous.is_some() {
            self.reset_stream_state();
        }

        self.publisher = Some(PublisherSlot {
            id,
            cancel,
            since: self.clock.now(),
        });
        tracing::info!(
            publisher = id,
            subscribers = self.subscribers.len(),
            "Publisher registered"
        );

        previous
    }

    /// Remove the publisher if `id` is still the current one
    ///
    /// Backlog and metadata go with it; subscribers stay attached.
    pub fn clear_publisher(&mut self, id: u64) -> bool {
        let _span = self.span.clone().entered();

        if !self.is_publisher(id) {
            tracing::debug!(publisher = id, "Unpublish ignored, not the current publisher");
            return false;
        }
        if let Some(prev) = self.publisher.take() {
            prev.cancel.cancel();
            tracing::info!(
                publisher = id,
                subscribers = self.subscribers.len(),
                frames = self.frames_forwarded,
                "Publisher left"
            );
        }
        self.reset_stream_state();
        true
    }

    fn reset_stream_state(&mut self) {
        self.gop.clear();
        self.metadata = None;
    }

    /// Record a publisher frame and forward it to every subscriber
    ///
    /// Each output format is converted at most once per frame. A subscriber
    /// whose queue is full, or whose format cannot carry the frame, is
    /// detached without affecting the others.
    pub fn on_publisher_frame(&mut self, frame: Frame) -> FanoutReport {
        let _span = self.span.clone().entered();

        let frame = Arc::new(self.normalize(frame));
        self.frames_forwarded += 1;

        if frame.is_metadata() {
            self.metadata = Some(Arc::clone(&frame));
        } else {
            self.gop.on_frame(&frame);
        }

        let mut report = FanoutReport::default();
        let mut converted: [Option<Result<Option<OutPacket>, ()>>; OutputFormat::COUNT] =
            Default::default();
        let mut dropped = Vec::new();

        for (&id, slot) in self.subscribers.iter_mut() {
            if !slot.format.carries(frame.media_type) {
                report.skipped += 1;
                continue;
            }

            let format = slot.format;
            let packet = converted[format.index()].get_or_insert_with(|| {
                format.convert(&frame).map_err(|e| {
                    tracing::warn!(
                        format = %format,
                        media = ?frame.media_type,
                        dts = frame.dts,
                        error = %e,
                        "Frame not representable in output format"
                    );
                })
            });

            let result = match packet {
                Ok(Some(packet)) => slot.offer(packet.clone()),
                Ok(None) => {
                    report.skipped += 1;
                    continue;
                }
                Err(()) => Err(DetachReason::ConversionFailed),
            };
            match result {
                Ok(()) => report.delivered += 1,
                Err(reason) => dropped.push((id, reason)),
            }
        }

        for (id, reason) in dropped {
            if let Some(slot) = self.subscribers.remove(&id) {
                slot.detach(reason);
                self.subscribers_dropped += 1;
                report.detached += 1;
                tracing::warn!(
                    subscriber = id,
                    format = %slot.format,
                    reason = %reason,
                    remaining = self.subscribers.len(),
                    "Subscriber detached"
                );
            }
        }

        report
    }

    /// Keep metadata in its unwrapped form
    fn normalize(&self, frame: Frame) -> Frame {
        if !frame.is_metadata() {
            return frame;
        }
        let normalized = metadata::ensure_unwrapped(&frame.payload);
        if normalized.bytes == frame.payload {
            frame
        } else {
            Frame::metadata(frame.stream_key, frame.dts, normalized.bytes)
        }
    }

    /// Metadata to prime a subscriber with
    ///
    /// Falls back to a record built from the codec configuration when the
    /// publisher never sent one.
    fn priming_metadata(&self) -> Option<Arc<Frame>> {
        if let Some(meta) = &self.metadata {
            return Some(Arc::clone(meta));
        }
        if !self.config.synthesize_metadata {
            return None;
        }

        let audio = self.gop.audio_config();
        let video = self.gop.video_config();
        if audio.is_none() && video.is_none() {
            return None;
        }

        let codec_id = |f: Option<&Arc<Frame>>| {
            f.and_then(|f| f.codec_id()).map(i32::from).unwrap_or(UNSET)
        };
        let payload = metadata::build_metadata(UNSET, UNSET, codec_id(audio), codec_id(video));
        let dts = audio.or(video).map(|f| f.dts).unwrap_or(0);
        tracing::debug!("Synthesized metadata for late joiner");
        Some(Arc::new(Frame::metadata(self.key.clone(), dts, payload)))
    }

    /// Register a subscriber and queue its priming packets
    ///
    /// Priming is the format preamble, metadata, codec configuration and the
    /// current GOP, all queued before any live frame can be. The queue is
    /// sized so priming never counts against the live capacity.
    pub(super) fn add_subscriber(
        &mut self,
        id: u64,
        format: OutputFormat,
    ) -> (SubscriberParts, BacklogStatus) {
        let _span = self.span.clone().entered();

        let mut priming = Vec::new();
        priming.extend(self.priming_metadata());
        priming.extend(self.gop.snapshot());
        let backlog = self.gop.status();

        let preamble = format.preamble();
        let capacity = self.config.subscriber_queue_capacity
            + priming.len()
            + usize::from(preamble.is_some());
        let (mut slot, parts) = SubscriberParts::new(format, capacity);

        let mut failure = None;
        if let Some(packet) = preamble {
            failure = slot.offer(packet).err();
        }
        for frame in priming.iter().filter(|f| format.carries(f.media_type)) {
            if failure.is_some() {
                break;
            }
            failure = match format.convert(frame) {
                Ok(Some(packet)) => slot.offer(packet).err(),
                Ok(None) => None,
                Err(e) => {
                    tracing::warn!(format = %format, error = %e, "Backlog frame not representable");
                    Some(DetachReason::ConversionFailed)
                }
            };
        }

        if let Some(reason) = failure {
            slot.detach(reason);
            self.subscribers_dropped += 1;
            tracing::warn!(subscriber = id, format = %format, reason = %reason, "Subscriber detached during priming");
            return (parts, backlog);
        }

        tracing::info!(
            subscriber = id,
            format = %format,
            primed = slot.enqueued,
            backlog = ?backlog,
            subscribers = self.subscribers.len() + 1,
            "Subscriber attached"
        );

        self.subscribers.insert(id, slot);
        (parts, backlog)
    }

    /// Drop a subscriber; queued packets are released
    pub fn remove_subscriber(&mut self, id: u64) -> bool {
        let _span = self.span.clone().entered();

        match self.subscribers.remove(&id) {
            Some(slot) => {
                slot.detach(DetachReason::Unsubscribed);
                tracing::debug!(
                    subscriber = id,
                    remaining = self.subscribers.len(),
                    "Subscriber removed"
                );
                true
            }
            None => false,
        }
    }

    pub fn stats(&self) -> GroupStats {
        let now = self.clock.now();
        GroupStats {
            state: self.state(),
            publisher_id: self.publisher.as_ref().map(|p| p.id),
            publishing_for: self
                .publisher
                .as_ref()
                .map(|p| now.saturating_duration_since(p.since)),
            subscriber_count: self.subscribers.len(),
            gop_frame_count: self.gop.frame_count(),
            gop_size_bytes: self.gop.size(),
            has_metadata: self.metadata.is_some(),
            frames_forwarded: self.frames_forwarded,
            subscribers_dropped: self.subscribers_dropped,
        }
    }
}
