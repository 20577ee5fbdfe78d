//! Registry configuration

use std::time::Duration;

use crate::error::ConfigError;
use crate::media::gop::DEFAULT_MAX_GOP_BYTES;

/// Distribution hub configuration
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Pending packets allowed per subscriber before it is detached
    pub subscriber_queue_capacity: usize,

    /// Longest a single sink write may take before the subscriber is detached
    pub subscriber_write_timeout: Duration,

    /// Maximum GOP buffer size in bytes
    pub max_gop_bytes: usize,

    /// Build `onMetaData` from the codec configuration when the publisher
    /// never sent one
    pub synthesize_metadata: bool,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            subscriber_queue_capacity: 1024,
            subscriber_write_timeout: Duration::from_secs(10),
            max_gop_bytes: DEFAULT_MAX_GOP_BYTES,
            synthesize_metadata: true,
        }
    }
}

impl RegistryConfig {
    /// Set per-subscriber queue capacity
    pub fn subscriber_queue_capacity(mut self, capacity: usize) -> Self {
        self.subscriber_queue_capacity = capacity;
        self
    }

    /// Set per-subscriber write timeout
    pub fn subscriber_write_timeout(mut self, timeout: Duration) -> Self {
        self.subscriber_write_timeout = timeout;
        self
    }

    /// Set GOP buffer byte cap
    pub fn max_gop_bytes(mut self, bytes: usize) -> Self {
        self.max_gop_bytes = bytes;
        self
    }

    /// Disable metadata synthesis
    pub fn disable_metadata_synthesis(mut self) -> Self {
        self.synthesize_metadata = false;
        self
    }

    /// Check values before handing the config to a registry
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.subscriber_queue_capacity == 0 {
            return Err(ConfigError::NonPositive("subscriber_queue_capacity"));
        }
        if self.subscriber_write_timeout.is_zero() {
            return Err(ConfigError::NonPositive("subscriber_write_timeout"));
        }
        if self.max_gop_bytes == 0 {
            return Err(ConfigError::NonPositive("max_gop_bytes"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RegistryConfig::default();

        assert_eq!(config.subscriber_queue_capacity, 1024);
        assert_eq!(config.subscriber_write_timeout, Duration::from_secs(10));
        assert_eq!(config.max_gop_bytes, 4 * 1024 * 1024);
        assert!(config.synthesize_metadata);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder() {
        let config = RegistryConfig::default()
            .subscriber_queue_capacity(16)
            .subscriber_write_timeout(Duration::from_millis(250))
            .max_gop_bytes(1024)
            .disable_metadata_synthesis();

        assert_eq!(config.subscriber_queue_capacity, 16);
        assert_eq!(config.subscriber_write_timeout, Duration::from_millis(250));
        assert_eq!(config.max_gop_bytes, 1024);
        assert!(!config.synthesize_metadata);
    }

    #[test]
    fn test_validate_rejects_zero() {
        let config = RegistryConfig::default().subscriber_queue_capacity(0);
        assert_eq!(
            config.validate(),
            Err(ConfigError::NonPositive("subscriber_queue_capacity"))
        );

        let config = RegistryConfig::default().subscriber_write_timeout(Duration::ZERO);
        assert!(config.validate().is_err());
    }
}
