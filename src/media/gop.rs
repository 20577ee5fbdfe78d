//! GOP (Group of Pictures) buffer for late-joiner support
//!
//! When a subscriber attaches to a running stream it needs:
//! 1. The decoder configuration (AAC AudioSpecificConfig, AVC/HEVC record)
//! 2. The most recent video key frame
//! 3. Every frame since that key frame, audio included
//!
//! This lets the decoder start immediately instead of waiting for the next
//! key frame.

use std::sync::Arc;

use crate::remux::Frame;

/// Default cap on buffered GOP bytes (4MB)
pub const DEFAULT_MAX_GOP_BYTES: usize = 4 * 1024 * 1024;

/// What a late joiner can be primed with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BacklogStatus {
    /// A GOP starting at a key frame is buffered
    Primed { frames: usize },
    /// No key frame seen yet; delivery starts with live frames
    Empty,
}

/// GOP buffer for late-joiner support
#[derive(Debug)]
pub struct GopBuffer {
    /// Maximum GOP size in bytes
    max_bytes: usize,
    /// Current GOP size in bytes
    current_bytes: usize,
    /// Latest audio configuration frame
    audio_config: Option<Arc<Frame>>,
    /// Latest video configuration frame
    video_config: Option<Arc<Frame>>,
    /// Frames since the last key frame, in arrival order
    frames: Vec<Arc<Frame>>,
    /// The current GOP started with a key frame and is still intact
    caching: bool,
}

impl GopBuffer {
    /// Create a new GOP buffer with the default byte cap
    pub fn new() -> Self {
        Self::with_max_bytes(DEFAULT_MAX_GOP_BYTES)
    }

    /// Create a new GOP buffer with a specific byte cap
    pub fn with_max_bytes(max_bytes: usize) -> Self {
        Self {
            max_bytes,
            current_bytes: 0,
            audio_config: None,
            video_config: None,
            frames: Vec::new(),
            caching: false,
        }
    }

    /// Account for one frame from the publisher
    ///
    /// Frames before the first key frame are not cached. When a GOP outgrows
    /// the byte cap it is dropped whole and caching resumes at the next key
    /// frame, so the buffer never holds a GOP without its key frame.
    pub fn on_frame(&mut self, frame: &Arc<Frame>) {
        if frame.is_metadata() {
            return;
        }

        if frame.is_key_config {
            if frame.is_audio() {
                self.audio_config = Some(Arc::clone(frame));
            } else {
                self.video_config = Some(Arc::clone(frame));
            }
            return;
        }

        if frame.is_keyframe {
            self.clear_frames();
            self.caching = true;
        }

        if !self.caching {
            return;
        }

        let size = frame.size();
        if self.current_bytes + size > self.max_bytes {
            self.clear_frames();
            return;
        }

        self.frames.push(Arc::clone(frame));
        self.current_bytes += size;
    }

    /// Configuration frames (audio, then video) followed by the current GOP
    pub fn snapshot(&self) -> Vec<Arc<Frame>> {
        let mut result = Vec::with_capacity(self.frames.len() + 2);
        result.extend(self.audio_config.iter().cloned());
        result.extend(self.video_config.iter().cloned());
        result.extend(self.frames.iter().cloned());
        result
    }

    pub fn status(&self) -> BacklogStatus {
        if self.frames.is_empty() {
            BacklogStatus::Empty
        } else {
            BacklogStatus::Primed {
                frames: self.frames.len(),
            }
        }
    }

    /// Clear the GOP but keep configuration frames
    pub fn clear_frames(&mut self) {
        self.frames.clear();
        self.current_bytes = 0;
        self.caching = false;
    }

    /// Clear everything including configuration frames
    pub fn clear(&mut self) {
        self.clear_frames();
        self.audio_config = None;
        self.video_config = None;
    }

    pub fn audio_config(&self) -> Option<&Arc<Frame>> {
        self.audio_config.as_ref()
    }

    pub fn video_config(&self) -> Option<&Arc<Frame>> {
        self.video_config.as_ref()
    }

    /// Get the number of buffered GOP frames
    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    /// Get the current GOP size in bytes
    pub fn size(&self) -> usize {
        self.current_bytes
    }

    /// Duration covered by the buffered GOP in milliseconds
    pub fn gop_duration(&self) -> Option<u32> {
        let first = self.frames.first()?.dts;
        let last = self.frames.last()?.dts;
        Some(last.wrapping_sub(first))
    }
}

impl Default for GopBuffer {
    fn default() -> Self {
        Self::new()
    }
}
