//! Segmenter configuration

use std::time::Duration;

use crate::error::ConfigError;

/// HLS segmenting configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HlsConfig {
    /// Minimum segment duration; cuts happen on the first key frame after it
    pub target_duration: Duration,

    /// Segments kept in the live playlist
    pub window_size: usize,

    /// Largest forward timestamp jump treated as continuous
    pub discontinuity_tolerance: Duration,
}

impl Default for HlsConfig {
    fn default() -> Self {
        Self {
            target_duration: Duration::from_millis(3000),
            window_size: 6,
            discontinuity_tolerance: Duration::from_millis(5000),
        }
    }
}

impl HlsConfig {
    /// Set target segment duration
    pub fn target_duration(mut self, duration: Duration) -> Self {
        self.target_duration = duration;
        self
    }

    /// Set playlist window size
    pub fn window_size(mut self, size: usize) -> Self {
        self.window_size = size;
        self
    }

    /// Set discontinuity tolerance
    pub fn discontinuity_tolerance(mut self, tolerance: Duration) -> Self {
        self.discontinuity_tolerance = tolerance;
        self
    }

    pub(crate) fn target_ms(&self) -> u64 {
        self.target_duration.as_millis() as u64
    }

    pub(crate) fn tolerance_ms(&self) -> u64 {
        self.discontinuity_tolerance.as_millis() as u64
    }

    /// Check values before handing the config to a muxer
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.target_duration.is_zero() {
            return Err(ConfigError::NonPositive("target_duration"));
        }
        if self.window_size == 0 {
            return Err(ConfigError::NonPositive("window_size"));
        }
        if self.discontinuity_tolerance.is_zero() {
            return Err(ConfigError::NonPositive("discontinuity_tolerance"));
        }
        Ok(())
    }
}
