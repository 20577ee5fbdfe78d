//! Stream registry implementation
//!
//! The central registry that maps stream keys to groups and hands out
//! publisher and subscriber handles.
//!
//! Lock order is always map, then group. The map lock is held only for
//! lookup and removal; work on a group happens under that group's lock
//! alone, so a busy stream never stalls another. A group leaves the map and
//! is marked retired under both locks, and callers that find a retired group
//! look it up again.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tokio_util::sync::CancellationToken;

use crate::clock::{SharedClock, TokioClock};
use crate::remux::StreamKey;

use super::config::RegistryConfig;
use super::error::RegistryError;
use super::group::{Group, GroupStats};
use super::publisher::PublisherHandle;
use super::subscriber::{self, ConsumerContext, OutputFormat, PacketSink, SubscriberHandle};

/// Central registry for all active streams
#[derive(Debug)]
pub struct StreamRegistry {
    /// Map of stream key to group
    streams: RwLock<HashMap<StreamKey, Arc<Mutex<Group>>>>,

    /// Configuration
    config: RegistryConfig,

    clock: SharedClock,

    /// Publisher and subscriber ids share one sequence
    next_id: AtomicU64,
}

impl StreamRegistry {
    /// Create a new stream registry with default configuration
    pub fn new() -> Self {
        Self::with_config(RegistryConfig::default())
    }

    /// Create a new stream registry with custom configuration
    pub fn with_config(config: RegistryConfig) -> Self {
        Self::with_clock(config, Arc::new(TokioClock))
    }

    /// Create a new stream registry with a custom time source
    pub fn with_clock(config: RegistryConfig, clock: SharedClock) -> Self {
        Self {
            streams: RwLock::new(HashMap::new()),
            config,
            clock,
            next_id: AtomicU64::new(1),
        }
    }

    /// Get the registry configuration
    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    fn new_group(&self, key: &StreamKey) -> Arc<Mutex<Group>> {
        let span = tracing::info_span!("group", stream = %key);
        Arc::new(Mutex::new(Group::new(
            key.clone(),
            self.config.clone(),
            Arc::clone(&self.clock),
            span,
        )))
    }

    /// Look up the group for `key`, creating it if needed
    fn group_entry(
        &self,
        streams: &mut HashMap<StreamKey, Arc<Mutex<Group>>>,
        key: &StreamKey,
    ) -> Arc<Mutex<Group>> {
        if let Some(group) = streams.get(key) {
            return Arc::clone(group);
        }
        let group = self.new_group(key);
        streams.insert(key.clone(), Arc::clone(&group));
        tracing::info!(stream = %key, streams = streams.len(), "Stream created");
        group
    }

    /// Lock the live group for `key`, creating it if needed
    async fn lock_group(&self, key: &StreamKey) -> (Arc<Mutex<Group>>, OwnedMutexGuard<Group>) {
        loop {
            let group_arc = {
                let mut streams = self.streams.write().await;
                self.group_entry(&mut streams, key)
            };
            let group = Arc::clone(&group_arc).lock_owned().await;
            if !group.is_retired() {
                return (group_arc, group);
            }
            tracing::debug!(stream = %key, "Group retired during lookup, retrying");
        }
    }

    /// Drop `group_arc` from the map if it is still there and idle
    async fn remove_if_idle(&self, key: &StreamKey, group_arc: &Arc<Mutex<Group>>) {
        let mut streams = self.streams.write().await;
        let mut group = group_arc.lock().await;
        if group.is_retired() || !group.is_idle() {
            return;
        }
        if streams.get(key).is_some_and(|current| Arc::ptr_eq(current, group_arc)) {
            streams.remove(key);
            tracing::info!(stream = %key, streams = streams.len(), "Stream removed");
        }
        group.retire();
    }

    /// Register a publisher for a stream
    ///
    /// The group is created if needed. Returns `PublisherConflict` if the
    /// stream already has a publisher; that publisher is left untouched.
    pub async fn publish(&self, key: &StreamKey) -> Result<PublisherHandle, RegistryError> {
        let (group_arc, mut group) = self.lock_group(key).await;
        if group.has_publisher() {
            tracing::warn!(stream = %key, "Publish rejected, stream already has a publisher");
            return Err(RegistryError::PublisherConflict(key.clone()));
        }

        let id = self.next_id();
        let cancel = CancellationToken::new();
        group.set_publisher(id, cancel.clone());
        drop(group);

        Ok(PublisherHandle {
            id,
            key: key.clone(),
            group: group_arc,
            cancel,
        })
    }

    /// Register a publisher, forcibly detaching the current one
    ///
    /// The previous handle's token is cancelled and its later frames are
    /// rejected. Subscribers stay attached and continue with the new
    /// publisher's frames.
    pub async fn preempt_publish(&self, key: &StreamKey) -> PublisherHandle {
        let (group_arc, mut group) = self.lock_group(key).await;

        let id = self.next_id();
        let cancel = CancellationToken::new();
        group.set_publisher(id, cancel.clone());
        drop(group);

        PublisherHandle {
            id,
            key: key.clone(),
            group: group_arc,
            cancel,
        }
    }

    /// Unregister a publisher
    ///
    /// A handle that was already preempted is ignored. The group is removed
    /// when nothing else references it.
    pub async fn unpublish(&self, handle: PublisherHandle) {
        handle.cancel.cancel();

        let idle = {
            let mut group = handle.group.lock().await;
            group.clear_publisher(handle.id) && group.is_idle()
        };
        if idle {
            self.remove_if_idle(&handle.key, &handle.group).await;
        }
    }

    /// Attach a subscriber in the given output format
    ///
    /// Always succeeds. If the stream is live the subscriber is primed with
    /// metadata, codec configuration and the current GOP before any live
    /// frame; otherwise it waits for a publisher. The returned handle reports
    /// whether a backlog was available.
    pub async fn attach<S: PacketSink>(
        self: &Arc<Self>,
        key: &StreamKey,
        format: OutputFormat,
        sink: S,
    ) -> SubscriberHandle {
        let (group_arc, mut group) = self.lock_group(key).await;
        let id = self.next_id();
        let (parts, backlog) = group.add_subscriber(id, format);

        // Detached during priming: nothing was inserted
        let idle = group.is_idle();
        let span = tracing::debug_span!(parent: group.span(), "subscriber", id, format = %format);
        drop(group);
        if idle {
            self.remove_if_idle(key, &group_arc).await;
        }

        subscriber::spawn_consumer(
            sink,
            parts.rx,
            parts.cancel.clone(),
            parts.reason_tx,
            ConsumerContext {
                id,
                key: key.clone(),
                write_timeout: self.config.subscriber_write_timeout,
                registry: Arc::downgrade(self),
                span,
            },
        );

        SubscriberHandle {
            id,
            key: key.clone(),
            format,
            backlog,
            cancel: parts.cancel,
            reason: parts.reason_rx,
        }
    }

    /// Detach a subscriber immediately
    ///
    /// Nothing queued for it is written afterwards.
    pub async fn detach(&self, handle: SubscriberHandle) {
        self.remove_subscriber(&handle.key, handle.id).await;
    }

    /// Remove a subscriber from its group, dropping the group if idle
    pub(crate) async fn remove_subscriber(&self, key: &StreamKey, id: u64) -> bool {
        let Some(group_arc) = self.streams.read().await.get(key).cloned() else {
            return false;
        };

        let (removed, idle) = {
            let mut group = group_arc.lock().await;
            (group.remove_subscriber(id), group.is_idle())
        };
        if idle {
            self.remove_if_idle(key, &group_arc).await;
        }
        removed
    }

    /// Get stream statistics
    pub async fn stream_stats(&self, key: &StreamKey) -> Option<GroupStats> {
        let group_arc = self.streams.read().await.get(key).cloned()?;
        let group = group_arc.lock().await;
        Some(group.stats())
    }

    /// Check if a stream has an active publisher
    pub async fn has_publisher(&self, key: &StreamKey) -> bool {
        let Some(group_arc) = self.streams.read().await.get(key).cloned() else {
            return false;
        };
        let group = group_arc.lock().await;
        group.has_publisher()
    }

    /// Get total number of streams
    pub async fn stream_count(&self) -> usize {
        self.streams.read().await.len()
    }
}

impl Default for StreamRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use bytes::Bytes;
    use tokio::sync::mpsc;

    use super::*;
    use crate::media::flv::{FlvTag, FLV_HEADER};
    use crate::media::metadata;
    use crate::media::BacklogStatus;
    use crate::protocol::constants::{MSG_AUDIO, MSG_DATA_AMF0, MSG_VIDEO};
    use crate::registry::group::GroupState;
    use crate::registry::{DetachReason, OutPacket};
    use crate::remux::Frame;

    /// Forwards every packet to a channel
    struct ChannelSink(mpsc::UnboundedSender<OutPacket>);

    #[async_trait::async_trait]
    impl PacketSink for ChannelSink {
        async fn write(&mut self, packet: OutPacket) -> std::io::Result<()> {
            self.0
                .send(packet)
                .map_err(|_| std::io::Error::from(std::io::ErrorKind::BrokenPipe))
        }
    }

    /// Never completes a write
    struct StalledSink;

    #[async_trait::async_trait]
    impl PacketSink for StalledSink {
        async fn write(&mut self, _packet: OutPacket) -> std::io::Result<()> {
            std::future::pending().await
        }
    }

    fn channel_sink() -> (ChannelSink, mpsc::UnboundedReceiver<OutPacket>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (ChannelSink(tx), rx)
    }

    fn key() -> StreamKey {
        StreamKey::new("live", "test_stream")
    }

    fn video_config() -> Frame {
        Frame::video(
            key(),
            0,
            Bytes::from_static(&[
                0x17, 0x00, 0x00, 0x00, 0x00, 0x01, 0x64, 0x00, 0x1F, 0xFF, 0xE1, 0x00, 0x04,
                0x67, 0x64, 0x00, 0x1F, 0x01, 0x00, 0x03, 0x68, 0xEF, 0x38,
            ]),
        )
    }

    fn audio_config() -> Frame {
        Frame::audio(key(), 0, Bytes::from_static(&[0xAF, 0x00, 0x12, 0x10]))
    }

    fn keyframe(dts: u32) -> Frame {
        Frame::video(key(), dts, Bytes::from_static(&[0x17, 0x01, 0, 0, 0, 0, 0, 0, 1, 0x65]))
    }

    fn inter(dts: u32) -> Frame {
        Frame::video(key(), dts, Bytes::from_static(&[0x27, 0x01, 0, 0, 0, 0, 0, 0, 1, 0x41]))
    }

    fn audio(dts: u32) -> Frame {
        Frame::audio(key(), dts, Bytes::from_static(&[0xAF, 0x01, 0x21, 0x00]))
    }

    fn rtmp_timestamp(packet: &OutPacket) -> u32 {
        match packet {
            OutPacket::Rtmp(msg) => msg.timestamp,
            other => panic!("expected rtmp packet, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_publish_conflict() {
        let registry = StreamRegistry::new();

        let first = registry.publish(&key()).await.unwrap();
        assert!(registry.has_publisher(&key()).await);

        let result = registry.publish(&key()).await;
        assert!(matches!(result, Err(RegistryError::PublisherConflict(_))));

        // Original publisher unaffected
        assert!(!first.is_preempted());
        assert!(first.send(keyframe(0)).await.is_ok());
    }

    #[tokio::test]
    async fn test_unpublish_removes_idle_stream() {
        let registry = StreamRegistry::new();

        let publisher = registry.publish(&key()).await.unwrap();
        assert_eq!(registry.stream_count().await, 1);

        registry.unpublish(publisher).await;
        assert_eq!(registry.stream_count().await, 0);
        assert!(!registry.has_publisher(&key()).await);

        // Stream can be published again
        assert!(registry.publish(&key()).await.is_ok());
    }

    #[tokio::test]
    async fn test_late_joiner_gets_decodable_snapshot() {
        let registry = Arc::new(StreamRegistry::new());
        let publisher = registry.publish(&key()).await.unwrap();

        publisher.send(video_config()).await.unwrap();
        publisher.send(audio_config()).await.unwrap();
        publisher.send(inter(0)).await.unwrap();
        publisher.send(keyframe(40)).await.unwrap();
        publisher.send(audio(50)).await.unwrap();
        publisher.send(inter(80)).await.unwrap();

        let (sink, mut rx) = channel_sink();
        let handle = registry.attach(&key(), OutputFormat::Flv, sink).await;
        assert_eq!(handle.backlog(), BacklogStatus::Primed { frames: 3 });

        publisher.send(inter(120)).await.unwrap();

        let mut packets = Vec::new();
        for _ in 0..8 {
            match rx.recv().await.unwrap() {
                OutPacket::Flv(bytes) => packets.push(bytes),
                other => panic!("unexpected {:?}", other),
            }
        }
        assert_eq!(&packets[0][..], &FLV_HEADER[..]);

        let tags: Vec<FlvTag> = packets[1..]
            .iter()
            .map(|bytes| FlvTag::decode(bytes).unwrap().0)
            .collect();
        // Metadata, both configurations, then the GOP from its key frame
        assert_eq!(tags[0].tag_type.as_byte(), 18);
        assert!(tags[1].is_aac_sequence_header());
        assert!(tags[2].is_video_sequence_header());
        assert!(tags[3].is_keyframe());
        assert_eq!(tags[3].timestamp, 40);
        let timestamps: Vec<u32> = tags[3..].iter().map(|t| t.timestamp).collect();
        assert_eq!(timestamps, vec![40, 50, 80, 120]);
    }

    #[tokio::test]
    async fn test_synthesized_metadata_codec_ids() {
        let registry = Arc::new(StreamRegistry::new());
        let publisher = registry.publish(&key()).await.unwrap();
        publisher.send(video_config()).await.unwrap();
        publisher.send(audio_config()).await.unwrap();

        let (sink, mut rx) = channel_sink();
        let _handle = registry.attach(&key(), OutputFormat::Rtmp, sink).await;

        match rx.recv().await.unwrap() {
            OutPacket::Rtmp(msg) => {
                assert_eq!(msg.type_id, MSG_DATA_AMF0);
                assert_eq!(msg.payload, metadata::build_metadata(-1, -1, 10, 7));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_relay_format_wraps_metadata() {
        let registry = Arc::new(StreamRegistry::new());
        let publisher = registry.publish(&key()).await.unwrap();
        let raw = metadata::build_metadata(1280, 720, 10, 7);
        publisher.send(Frame::metadata(key(), 0, raw.clone())).await.unwrap();

        let (play_sink, mut play_rx) = channel_sink();
        let (relay_sink, mut relay_rx) = channel_sink();
        let _play = registry.attach(&key(), OutputFormat::Rtmp, play_sink).await;
        let _relay = registry.attach(&key(), OutputFormat::RtmpRelay, relay_sink).await;

        match play_rx.recv().await.unwrap() {
            OutPacket::Rtmp(msg) => assert_eq!(msg.payload, raw),
            other => panic!("unexpected {:?}", other),
        }
        match relay_rx.recv().await.unwrap() {
            OutPacket::Rtmp(msg) => {
                assert_eq!(msg.payload, metadata::ensure_wrapped(&raw).bytes)
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_attach_without_publisher() {
        let registry = Arc::new(StreamRegistry::new());

        let (sink, mut rx) = channel_sink();
        let handle = registry.attach(&key(), OutputFormat::Rtmp, sink).await;
        assert_eq!(handle.backlog(), BacklogStatus::Empty);
        assert_eq!(registry.stream_count().await, 1);
        assert!(rx.try_recv().is_err());

        let stats = registry.stream_stats(&key()).await.unwrap();
        assert_eq!(stats.state, GroupState::Empty);
        assert_eq!(stats.subscriber_count, 1);

        let publisher = registry.publish(&key()).await.unwrap();
        publisher.send(keyframe(0)).await.unwrap();
        assert_eq!(rtmp_timestamp(&rx.recv().await.unwrap()), 0);
    }

    #[tokio::test]
    async fn test_delivery_order_preserved() {
        let registry = Arc::new(StreamRegistry::new());
        let publisher = registry.publish(&key()).await.unwrap();

        let (sink, mut rx) = channel_sink();
        let _handle = registry.attach(&key(), OutputFormat::Rtmp, sink).await;

        let mut expected = Vec::new();
        for i in 0..50u32 {
            let frame = if i % 10 == 0 {
                keyframe(i * 20)
            } else if i % 2 == 0 {
                inter(i * 20)
            } else {
                audio(i * 20)
            };
            expected.push(frame.dts);
            publisher.send(frame).await.unwrap();
        }

        for dts in expected {
            assert_eq!(rtmp_timestamp(&rx.recv().await.unwrap()), dts);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_subscriber_detached_without_blocking_others() {
        let config = RegistryConfig::default().subscriber_write_timeout(Duration::from_secs(1));
        let registry = Arc::new(StreamRegistry::with_config(config));
        let publisher = registry.publish(&key()).await.unwrap();

        let stalled = registry.attach(&key(), OutputFormat::Rtmp, StalledSink).await;
        let (sink, mut rx) = channel_sink();
        let healthy = registry.attach(&key(), OutputFormat::Rtmp, sink).await;

        let start = tokio::time::Instant::now();
        for i in 0..20u32 {
            publisher.send(audio(i * 23)).await.unwrap();
        }
        for i in 0..20u32 {
            assert_eq!(rtmp_timestamp(&rx.recv().await.unwrap()), i * 23);
        }

        assert_eq!(stalled.closed().await, DetachReason::WriteTimeout);
        assert!(start.elapsed() >= Duration::from_secs(1));
        assert!(start.elapsed() < Duration::from_secs(2));
        assert!(!healthy.is_detached());

        // Live delivery continues for the healthy subscriber
        let report = publisher.send(audio(1000)).await.unwrap();
        assert_eq!(report.delivered, 1);
        assert_eq!(rtmp_timestamp(&rx.recv().await.unwrap()), 1000);
    }

    #[tokio::test]
    async fn test_full_queue_detaches_subscriber() {
        let config = RegistryConfig::default().subscriber_queue_capacity(2);
        let registry = Arc::new(StreamRegistry::with_config(config));
        let publisher = registry.publish(&key()).await.unwrap();

        let handle = registry.attach(&key(), OutputFormat::Rtmp, StalledSink).await;

        let mut detached = 0;
        for i in 0..5u32 {
            detached += publisher.send(audio(i * 23)).await.unwrap().detached;
        }
        assert_eq!(detached, 1);
        assert!(handle.is_detached());
        assert_eq!(handle.detach_reason(), Some(DetachReason::QueueFull));
        assert_eq!(handle.closed().await, DetachReason::QueueFull);

        let stats = registry.stream_stats(&key()).await.unwrap();
        assert_eq!(stats.subscriber_count, 0);
        assert_eq!(stats.subscribers_dropped, 1);
    }

    #[tokio::test]
    async fn test_preempt_publish() {
        let registry = Arc::new(StreamRegistry::new());
        let first = registry.publish(&key()).await.unwrap();

        let (sink, mut rx) = channel_sink();
        let subscriber = registry.attach(&key(), OutputFormat::Rtmp, sink).await;
        first.send(audio(0)).await.unwrap();

        let second = registry.preempt_publish(&key()).await;
        assert!(first.is_preempted());
        first.cancelled().await;
        assert_eq!(
            first.send(audio(23)).await,
            Err(RegistryError::PublisherMismatch(key()))
        );

        second.send(audio(1000)).await.unwrap();
        assert_eq!(rtmp_timestamp(&rx.recv().await.unwrap()), 0);
        assert_eq!(rtmp_timestamp(&rx.recv().await.unwrap()), 1000);
        assert!(!subscriber.is_detached());

        // Stale handle cannot tear down the new publisher
        registry.unpublish(first).await;
        assert!(registry.has_publisher(&key()).await);
    }

    #[tokio::test]
    async fn test_detach_is_immediate() {
        let registry = Arc::new(StreamRegistry::new());
        let publisher = registry.publish(&key()).await.unwrap();

        let (sink, mut rx) = channel_sink();
        let handle = registry.attach(&key(), OutputFormat::Rtmp, sink).await;
        registry.detach(handle).await;

        let report = publisher.send(audio(0)).await.unwrap();
        assert_eq!(report.delivered, 0);
        // Sink is released once the consumer exits
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_handle_removes_idle_stream() {
        let registry = Arc::new(StreamRegistry::new());
        let (sink, _rx) = channel_sink();
        let handle = registry.attach(&key(), OutputFormat::Flv, sink).await;
        assert_eq!(registry.stream_count().await, 1);

        drop(handle);
        tokio::time::timeout(Duration::from_secs(1), async {
            while registry.stream_count().await > 0 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_sink_error_detaches() {
        let registry = Arc::new(StreamRegistry::new());
        let publisher = registry.publish(&key()).await.unwrap();

        let (sink, rx) = channel_sink();
        drop(rx);
        let handle = registry.attach(&key(), OutputFormat::Rtmp, sink).await;
        publisher.send(audio(0)).await.unwrap();

        assert_eq!(handle.closed().await, DetachReason::SinkClosed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_busy_group_does_not_block_other_streams() {
        let registry = Arc::new(StreamRegistry::new());
        let busy = StreamKey::new("live", "busy");
        let _publisher = registry.publish(&busy).await.unwrap();

        let group = registry.streams.read().await.get(&busy).cloned().unwrap();
        let guard = group.lock().await;

        let waiting = tokio::spawn({
            let registry = Arc::clone(&registry);
            let busy = busy.clone();
            async move {
                let (sink, rx) = channel_sink();
                (registry.attach(&busy, OutputFormat::Rtmp, sink).await, rx)
            }
        });
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert!(!waiting.is_finished());

        // Attach is parked on the busy group without holding the map
        let other = tokio::time::timeout(Duration::from_secs(1), registry.publish(&key()))
            .await
            .expect("publish on another stream blocked")
            .unwrap();
        assert_eq!(registry.stream_count().await, 2);

        drop(guard);
        let (handle, _rx) = waiting.await.unwrap();
        assert!(!handle.is_detached());
        assert_eq!(registry.stream_stats(&busy).await.unwrap().subscriber_count, 1);
        registry.unpublish(other).await;
    }

    #[tokio::test]
    async fn test_attach_retries_after_group_retired() {
        let registry = Arc::new(StreamRegistry::new());
        let publisher = registry.publish(&key()).await.unwrap();
        let retiring = registry.streams.read().await.get(&key()).cloned().unwrap();

        let mut guard = retiring.lock().await;
        let waiting = tokio::spawn({
            let registry = Arc::clone(&registry);
            async move {
                let (sink, rx) = channel_sink();
                (registry.attach(&key(), OutputFormat::Flv, sink).await, rx)
            }
        });
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }

        // Removed while attach waits on the group lock
        guard.clear_publisher(publisher.id());
        registry.streams.write().await.remove(&key());
        guard.retire();
        drop(guard);

        let (handle, mut rx) = waiting.await.unwrap();
        assert!(!handle.is_detached());
        assert_eq!(rx.recv().await.unwrap(), OutPacket::Flv(Bytes::from_static(&FLV_HEADER)));
        let current = registry.streams.read().await.get(&key()).cloned().unwrap();
        assert!(!Arc::ptr_eq(&current, &retiring));
        assert_eq!(current.lock().await.subscriber_count(), 1);
        assert_eq!(retiring.lock().await.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_message_types_per_media() {
        let registry = Arc::new(StreamRegistry::new());
        let publisher = registry.publish(&key()).await.unwrap();
        let (sink, mut rx) = channel_sink();
        let _handle = registry.attach(&key(), OutputFormat::Rtmp, sink).await;

        publisher.send(keyframe(0)).await.unwrap();
        publisher.send(audio(0)).await.unwrap();

        let types: Vec<u8> = [rx.recv().await.unwrap(), rx.recv().await.unwrap()]
            .iter()
            .map(|p| match p {
                OutPacket::Rtmp(msg) => msg.type_id,
                _ => 0,
            })
            .collect();
        assert_eq!(types, vec![MSG_VIDEO, MSG_AUDIO]);
    }
}
