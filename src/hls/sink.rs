//! Registry subscriber that feeds a segment muxer
//!
//! Attach an [`HlsSink`] with [`OutputFormat::Sample`](crate::registry::OutputFormat)
//! and read finished segments and the rendered playlist from [`HlsOutput`].

use tokio::sync::{mpsc, watch};

use crate::registry::{OutPacket, PacketSink};

use super::muxer::SegmentMuxer;
use super::playlist::Segment;

/// Receiving side of an [`HlsSink`]
#[derive(Debug)]
pub struct HlsOutput {
    /// Segments in cut order
    pub segments: mpsc::Receiver<Segment>,
    /// Latest rendered playlist
    pub playlist: watch::Receiver<String>,
}

/// Packet sink driving a [`SegmentMuxer`]
#[derive(Debug)]
pub struct HlsSink {
    muxer: SegmentMuxer,
    segments: mpsc::Sender<Segment>,
    playlist: watch::Sender<String>,
}

impl HlsSink {
    /// Wrap a muxer; `capacity` bounds segments not yet taken from the output
    pub fn new(muxer: SegmentMuxer, capacity: usize) -> (Self, HlsOutput) {
        let (segments_tx, segments_rx) = mpsc::channel(capacity.max(1));
        let (playlist_tx, playlist_rx) = watch::channel(muxer.playlist().render_m3u8());
        let sink = Self {
            muxer,
            segments: segments_tx,
            playlist: playlist_tx,
        };
        let output = HlsOutput {
            segments: segments_rx,
            playlist: playlist_rx,
        };
        (sink, output)
    }

    async fn publish(&mut self, segment: Segment) -> std::io::Result<()> {
        self.playlist.send_replace(self.muxer.playlist().render_m3u8());
        self.segments
            .send(segment)
            .await
            .map_err(|_| std::io::Error::from(std::io::ErrorKind::BrokenPipe))
    }
}

#[async_trait::async_trait]
impl PacketSink for HlsSink {
    async fn write(&mut self, packet: OutPacket) -> std::io::Result<()> {
        let OutPacket::Sample(sample) = packet else {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "HLS sink expects segment samples",
            ));
        };

        match self.muxer.push(&sample) {
            Some(segment) => self.publish(segment).await,
            None => Ok(()),
        }
    }

    async fn close(&mut self) {
        let last = self.muxer.finish();
        match last {
            Some(segment) => {
                let sequence = segment.sequence;
                if let Err(e) = self.publish(segment).await {
                    tracing::warn!(
                        stream = %self.muxer.stream_key(),
                        sequence,
                        error = %e,
                        "Final segment not delivered"
                    );
                }
            }
            None => {
                self.playlist.send_replace(self.muxer.playlist().render_m3u8());
            }
        }
    }
}
