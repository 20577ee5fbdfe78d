//! Segment muxer
//!
//! Turns one stream's segment samples into MPEG-TS segments and keeps the
//! live playlist. Cuts happen only on a video key frame once the running
//! segment has reached the target duration, so no segment starts mid-GOP.
//! Audio-only streams cut on any audio sample instead.
//!
//! Duration is the sum of decode-time deltas of the track that drives the
//! cuts. A delta that goes backwards or jumps past the tolerance marks the
//! segment as discontinuous and counts as zero.

use std::sync::Arc;
use std::time::Instant;

use bytes::BytesMut;

use crate::clock::SharedClock;
use crate::media::aac::AudioSpecificConfig;
use crate::media::h264::{AvcConfig, AUD_NALU, START_CODE};
use crate::remux::{SegmentSample, StreamKey};

use super::config::HlsConfig;
use super::naming::NamingStrategy;
use super::playlist::{Playlist, Segment};
use super::ts::{TsWriter, TICKS_PER_MS};

/// Segment being filled
#[derive(Debug)]
struct OpenSegment {
    duration_ms: u64,
    discontinuity: bool,
    samples: usize,
}

/// Per-track timestamp tracking
#[derive(Debug, Default)]
struct TrackClock {
    last_dts: Option<u32>,
}

impl TrackClock {
    /// Advance to `dts`, returning the counted delta and whether it was a jump
    fn advance(&mut self, dts: u32, tolerance_ms: u64) -> (u64, bool) {
        let previous = self.last_dts.replace(dts);
        let Some(previous) = previous else {
            return (0, false);
        };
        let delta = dts.wrapping_sub(previous) as i32;
        if delta < 0 || delta as u64 > tolerance_ms {
            (0, true)
        } else {
            (delta as u64, false)
        }
    }
}

/// HLS segmenter for one stream
#[derive(Debug)]
pub struct SegmentMuxer {
    key: StreamKey,
    config: HlsConfig,
    naming: Arc<dyn NamingStrategy>,
    clock: SharedClock,
    playlist: Playlist,
    writer: TsWriter,
    avc: Option<AvcConfig>,
    aac: Option<AudioSpecificConfig>,
    video_clock: TrackClock,
    audio_clock: TrackClock,
    open: Option<OpenSegment>,
    /// Discontinuity seen while no segment was open
    pending_discontinuity: bool,
    created_at: Instant,
}

impl SegmentMuxer {
    pub fn new(
        key: StreamKey,
        config: HlsConfig,
        naming: Arc<dyn NamingStrategy>,
        clock: SharedClock,
    ) -> Self {
        let created_at = clock.now();
        Self {
            playlist: Playlist::new(config.window_size, config.target_ms()),
            key,
            config,
            naming,
            clock,
            writer: TsWriter::new(),
            avc: None,
            aac: None,
            video_clock: TrackClock::default(),
            audio_clock: TrackClock::default(),
            open: None,
            pending_discontinuity: false,
            created_at,
        }
    }

    pub fn stream_key(&self) -> &StreamKey {
        &self.key
    }

    pub fn playlist(&self) -> &Playlist {
        &self.playlist
    }

    /// Identifier of the playlist from the naming strategy
    pub fn playlist_uri(&self) -> String {
        self.naming.playlist(&self.key)
    }

    /// When the muxer was created
    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    /// Video configuration seen: cuts follow video key frames
    fn video_driven(&self) -> bool {
        self.avc.is_some()
    }

    /// Feed one sample; returns the segment it completed, if any
    pub fn push(&mut self, sample: &SegmentSample) -> Option<Segment> {
        if sample.is_config {
            self.on_config(sample);
            return None;
        }

        if sample.is_video() && self.avc.is_none() {
            tracing::debug!(stream = %self.key, dts = sample.dts, "Video before configuration, dropped");
            return None;
        }
        if sample.is_audio() && self.aac.is_none() {
            tracing::debug!(stream = %self.key, dts = sample.dts, "Audio before configuration, dropped");
            return None;
        }

        let drives_cuts = if self.video_driven() {
            sample.is_video()
        } else {
            sample.is_audio()
        };
        let boundary = drives_cuts && (sample.is_keyframe || !self.video_driven());

        let (delta, jumped) = if sample.is_video() {
            self.video_clock.advance(sample.dts, self.config.tolerance_ms())
        } else {
            self.audio_clock.advance(sample.dts, self.config.tolerance_ms())
        };
        if jumped {
            tracing::warn!(
                stream = %self.key,
                dts = sample.dts,
                media = ?sample.media_type,
                "Timestamp discontinuity"
            );
        }

        let mut finished = None;
        match self.open.as_mut() {
            Some(open) => {
                if drives_cuts {
                    open.duration_ms += delta;
                }
                if boundary && open.duration_ms >= self.config.target_ms() {
                    finished = self.cut();
                    self.open_segment();
                }
            }
            None => {
                // A segment must start at a key frame
                if !boundary {
                    self.pending_discontinuity |= jumped;
                    return None;
                }
                self.open_segment();
            }
        }

        if jumped {
            if let Some(open) = self.open.as_mut() {
                open.discontinuity = true;
            }
        }

        self.write_sample(sample);
        finished
    }

    fn on_config(&mut self, sample: &SegmentSample) {
        if sample.is_video() {
            match AvcConfig::parse(&sample.payload) {
                Ok(config) => {
                    tracing::debug!(
                        stream = %self.key,
                        profile = config.profile,
                        level = config.level,
                        "AVC configuration"
                    );
                    self.avc = Some(config);
                }
                Err(e) => tracing::warn!(stream = %self.key, error = %e, "Invalid AVC configuration"),
            }
        } else {
            match AudioSpecificConfig::parse(&sample.payload) {
                Ok(config) => {
                    tracing::debug!(
                        stream = %self.key,
                        sample_rate = config.sampling_frequency,
                        channels = config.channel_configuration,
                        "AAC configuration"
                    );
                    self.aac = Some(config);
                }
                Err(e) => tracing::warn!(stream = %self.key, error = %e, "Invalid AAC configuration"),
            }
        }
    }

    fn open_segment(&mut self) {
        self.writer.set_streams(self.avc.is_some(), self.aac.is_some());
        self.writer.write_tables();
        self.open = Some(OpenSegment {
            duration_ms: 0,
            discontinuity: std::mem::take(&mut self.pending_discontinuity),
            samples: 0,
        });
    }

    fn write_sample(&mut self, sample: &SegmentSample) {
        let pts = sample.pts as u64 * TICKS_PER_MS;
        let dts = sample.dts as u64 * TICKS_PER_MS;

        if sample.is_video() {
            let mut data = BytesMut::with_capacity(sample.payload.len() + 64);
            let starts_with_aud = sample.payload.get(START_CODE.len()).map(|b| b & 0x1F) == Some(9);
            if !starts_with_aud {
                data.extend_from_slice(&START_CODE);
                data.extend_from_slice(&AUD_NALU);
            }
            if sample.is_keyframe {
                if let Some(avc) = &self.avc {
                    data.extend_from_slice(&avc.annexb_parameter_sets());
                }
            }
            data.extend_from_slice(&sample.payload);
            self.writer.write_video(pts, dts, sample.is_keyframe, &data);
        } else if let Some(aac) = &self.aac {
            let header = aac.adts_header(sample.payload.len());
            let mut data = BytesMut::with_capacity(header.len() + sample.payload.len());
            data.extend_from_slice(&header);
            data.extend_from_slice(&sample.payload);
            self.writer.write_audio(pts, &data);
        }

        if let Some(open) = self.open.as_mut() {
            open.samples += 1;
        }
    }

    /// Close the open segment and append it to the playlist
    fn cut(&mut self) -> Option<Segment> {
        let open = self.open.take()?;
        if open.samples == 0 {
            self.writer.take();
            return None;
        }

        let sequence = self.playlist.next_sequence();
        let segment = Segment {
            sequence,
            duration_ms: open.duration_ms,
            payload: self.writer.take(),
            discontinuity: open.discontinuity,
            uri: self.naming.resolve(&self.key, sequence),
            created_at: self.clock.now(),
        };

        let evicted = self.playlist.push(segment.clone());
        tracing::info!(
            stream = %self.key,
            sequence,
            duration_ms = segment.duration_ms,
            bytes = segment.payload.len(),
            discontinuity = segment.discontinuity,
            evicted = evicted.map(|s| s.sequence),
            "Segment cut"
        );

        Some(segment)
    }

    /// Force out the last, possibly short, segment and end the playlist
    pub fn finish(&mut self) -> Option<Segment> {
        let last = self.cut();
        self.playlist.end();
        tracing::info!(
            stream = %self.key,
            segments = self.playlist.next_sequence(),
            "Segmenting finished"
        );
        last
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;
    use crate::clock::ManualClock;
    use crate::hls::naming::DefaultNaming;
    use crate::hls::ts::TS_PACKET_SIZE;
    use crate::remux::{MediaType, SampleCodec};

    fn key() -> StreamKey {
        StreamKey::new("live", "seg")
    }

    fn muxer(target_ms: u64) -> SegmentMuxer {
        let config = HlsConfig::default().target_duration(std::time::Duration::from_millis(target_ms));
        SegmentMuxer::new(key(), config, Arc::new(DefaultNaming), Arc::new(ManualClock::new()))
    }

    fn video(dts: u32, keyframe: bool, is_config: bool, payload: &'static [u8]) -> SegmentSample {
        SegmentSample {
            media_type: MediaType::Video,
            codec: SampleCodec::Avc,
            is_config,
            is_keyframe: keyframe,
            pts: dts,
            dts,
            payload: Bytes::from_static(payload),
        }
    }

    fn audio(dts: u32, is_config: bool, payload: &'static [u8]) -> SegmentSample {
        SegmentSample {
            media_type: MediaType::Audio,
            codec: SampleCodec::Aac { sound_flags: 0x0F },
            is_config,
            is_keyframe: false,
            pts: dts,
            dts,
            payload: Bytes::from_static(payload),
        }
    }

    const AVC_RECORD: &[u8] = &[
        0x01, 0x64, 0x00, 0x1F, 0xFF, 0xE1, 0x00, 0x04, 0x67, 0x64, 0x00, 0x1F, 0x01, 0x00, 0x03,
        0x68, 0xEF, 0x38,
    ];
    const IDR: &[u8] = &[0, 0, 0, 1, 0x65, 0x88, 0x84];
    const SLICE: &[u8] = &[0, 0, 0, 1, 0x41, 0x9A];

    fn video_muxer(target_ms: u64) -> SegmentMuxer {
        let mut muxer = muxer(target_ms);
        assert!(muxer.push(&video(0, false, true, AVC_RECORD)).is_none());
        muxer
    }

    #[test]
    fn test_cuts_on_keyframes_after_target() {
        let mut muxer = video_muxer(4000);
        let mut segments = Vec::new();

        for t in (0..8000).step_by(40) {
            let sample = if t % 2000 == 0 {
                video(t, true, false, IDR)
            } else {
                video(t, false, false, SLICE)
            };
            segments.extend(muxer.push(&sample));
        }
        segments.extend(muxer.finish());

        // Key frames at 0, 2000, 4000, 6000: cut at 4000, not at 2000
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].sequence, 0);
        assert_eq!(segments[0].duration_ms, 4000);
        assert_eq!(segments[0].uri, "live/seg/seg-0.ts");
        assert_eq!(segments[1].sequence, 1);
        assert_eq!(segments[1].duration_ms, 3960);
        assert!(muxer.playlist().is_ended());
        assert!(muxer.playlist().render_m3u8().ends_with("#EXT-X-ENDLIST\n"));
    }

    #[test]
    fn test_segment_payload_is_transport_stream() {
        let mut muxer = video_muxer(1000);
        muxer.push(&video(0, true, false, IDR));
        muxer.push(&video(500, false, false, SLICE));
        let segment = muxer.push(&video(1000, true, false, IDR)).unwrap();

        assert_eq!(segment.payload.len() % TS_PACKET_SIZE, 0);
        assert!(segment.payload.chunks(TS_PACKET_SIZE).all(|p| p[0] == 0x47));
        // PAT then PMT first
        assert_eq!(&segment.payload[1..3], &[0x40, 0x00]);
        assert_eq!(&segment.payload[TS_PACKET_SIZE + 1..TS_PACKET_SIZE + 3], &[0x50, 0x00]);
    }

    #[test]
    fn test_samples_before_first_keyframe_dropped() {
        let mut muxer = video_muxer(1000);
        assert!(muxer.push(&video(0, false, false, SLICE)).is_none());
        assert!(muxer.push(&video(40, false, false, SLICE)).is_none());
        assert!(muxer.finish().is_none());
        assert!(muxer.playlist().is_empty());
    }

    #[test]
    fn test_video_without_config_dropped() {
        let mut muxer = muxer(1000);
        assert!(muxer.push(&video(0, true, false, IDR)).is_none());
        assert!(muxer.finish().is_none());
    }

    #[test]
    fn test_discontinuity_marks_segment() {
        let mut muxer = video_muxer(1000);
        muxer.push(&video(0, true, false, IDR));
        muxer.push(&video(500, false, false, SLICE));
        let first = muxer.push(&video(1000, true, false, IDR)).unwrap();
        assert!(!first.discontinuity);

        // Jump far ahead, counted as zero
        muxer.push(&video(60_000, false, false, SLICE));
        muxer.push(&video(60_500, false, false, SLICE));
        let second = muxer.push(&video(61_000, true, false, IDR)).unwrap();
        assert!(second.discontinuity);
        assert_eq!(second.duration_ms, 1000);

        // Backwards timestamps are discontinuities too
        muxer.push(&video(100, false, false, SLICE));
        let third = muxer.finish().unwrap();
        assert!(third.discontinuity);
    }

    #[test]
    fn test_audio_only_cuts_on_audio() {
        let mut muxer = muxer(1000);
        muxer.push(&audio(0, true, &[0x12, 0x10]));

        let mut segments = Vec::new();
        for i in 0..100u32 {
            segments.extend(muxer.push(&audio(i * 23, false, &[0x21, 0x00, 0x03])));
        }
        assert!(!segments.is_empty());
        assert!(segments.iter().all(|s| s.duration_ms >= 1000));
        assert!(segments.iter().all(|s| s.duration_ms < 1000 + 23));
    }

    #[test]
    fn test_interleaved_audio_does_not_count_towards_duration() {
        let mut muxer = video_muxer(1000);
        muxer.push(&audio(0, true, &[0x12, 0x10]));

        muxer.push(&video(0, true, false, IDR));
        // Audio slightly behind video is not a discontinuity
        muxer.push(&audio(10, false, &[0x21]));
        muxer.push(&audio(33, false, &[0x21]));
        muxer.push(&video(500, false, false, SLICE));
        muxer.push(&audio(490, false, &[0x21]));
        let segment = muxer.push(&video(1000, true, false, IDR)).unwrap();

        assert_eq!(segment.duration_ms, 1000);
        assert!(!segment.discontinuity);
    }

    #[test]
    fn test_playlist_window() {
        let config = HlsConfig::default()
            .target_duration(std::time::Duration::from_millis(1000))
            .window_size(2);
        let mut muxer =
            SegmentMuxer::new(key(), config, Arc::new(DefaultNaming), Arc::new(ManualClock::new()));
        muxer.push(&video(0, false, true, AVC_RECORD));

        for i in 0..5u32 {
            muxer.push(&video(i * 1000, true, false, IDR));
        }
        let seqs: Vec<u64> = muxer.playlist().segments().map(|s| s.sequence).collect();
        assert_eq!(seqs, vec![2, 3]);
        assert_eq!(muxer.playlist_uri(), "live/seg/playlist.m3u8");
    }
}
