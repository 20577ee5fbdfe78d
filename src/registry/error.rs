//! Registry error types

use thiserror::Error;

use crate::remux::StreamKey;

/// Error type for registry operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// Stream already has a publisher
    #[error("stream already has a publisher: {0}")]
    PublisherConflict(StreamKey),

    /// The handle is no longer the stream's publisher (preempted or unpublished)
    #[error("not the current publisher of {0}")]
    PublisherMismatch(StreamKey),
}
