//! Live playlist window

use std::collections::VecDeque;
use std::fmt::Write as _;
use std::time::Instant;

use bytes::Bytes;

/// One finished MPEG-TS segment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    /// Media sequence number
    pub sequence: u64,
    /// Duration in milliseconds
    pub duration_ms: u64,
    /// MPEG-TS bytes
    pub payload: Bytes,
    /// Timestamps jumped inside this segment
    pub discontinuity: bool,
    /// Identifier from the naming strategy
    pub uri: String,
    /// When the segment was cut
    pub created_at: Instant,
}

/// Sliding window of the most recent segments
#[derive(Debug, Clone)]
pub struct Playlist {
    window: usize,
    segments: VecDeque<Segment>,
    next_sequence: u64,
    /// Fallback `#EXT-X-TARGETDURATION` while the window is empty
    target_duration_ms: u64,
    ended: bool,
}

impl Playlist {
    pub fn new(window: usize, target_duration_ms: u64) -> Self {
        Self {
            window: window.max(1),
            segments: VecDeque::with_capacity(window + 1),
            next_sequence: 0,
            target_duration_ms,
            ended: false,
        }
    }

    /// Sequence number the next pushed segment gets
    pub fn next_sequence(&self) -> u64 {
        self.next_sequence
    }

    /// Append a segment, assigning it the next sequence number
    ///
    /// Returns the evicted segment when the window overflows.
    pub fn push(&mut self, mut segment: Segment) -> Option<Segment> {
        segment.sequence = self.next_sequence;
        self.next_sequence += 1;
        self.segments.push_back(segment);

        if self.segments.len() > self.window {
            self.segments.pop_front()
        } else {
            None
        }
    }

    pub fn segments(&self) -> impl Iterator<Item = &Segment> {
        self.segments.iter()
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Mark the stream as finished (`#EXT-X-ENDLIST`)
    pub fn end(&mut self) {
        self.ended = true;
    }

    pub fn is_ended(&self) -> bool {
        self.ended
    }

    /// Render the playlist with each segment referenced by the last path
    /// component of its identifier
    pub fn render_m3u8(&self) -> String {
        self.render_m3u8_with(|segment| {
            segment
                .uri
                .rsplit('/')
                .next()
                .unwrap_or(segment.uri.as_str())
                .to_string()
        })
    }

    /// Render the playlist with a custom segment URL generator
    pub fn render_m3u8_with<F>(&self, mut segment_url: F) -> String
    where
        F: FnMut(&Segment) -> String,
    {
        let mut m3u8 = String::new();

        m3u8.push_str("#EXTM3U\n");
        m3u8.push_str("#EXT-X-VERSION:3\n");

        // Longest segment in whole seconds, rounded up
        let target = self
            .segments
            .iter()
            .map(|s| s.duration_ms)
            .max()
            .unwrap_or(self.target_duration_ms);
        let _ = writeln!(m3u8, "#EXT-X-TARGETDURATION:{}", target.div_ceil(1000));

        let first_seq = self.segments.front().map_or(self.next_sequence, |s| s.sequence);
        let _ = writeln!(m3u8, "#EXT-X-MEDIA-SEQUENCE:{first_seq}");

        for segment in &self.segments {
            if segment.discontinuity {
                m3u8.push_str("#EXT-X-DISCONTINUITY\n");
            }
            let seconds = segment.duration_ms as f64 / 1000.0;
            let _ = writeln!(m3u8, "#EXTINF:{seconds:.3},");
            m3u8.push_str(&segment_url(segment));
            m3u8.push('\n');
        }

        if self.ended {
            m3u8.push_str("#EXT-X-ENDLIST\n");
        }

        m3u8
    }
}
