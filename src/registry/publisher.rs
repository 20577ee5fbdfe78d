//! Publisher handle

use std::sync::Arc;

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::remux::{Frame, StreamKey};

use super::error::RegistryError;
use super::group::{FanoutReport, Group};

/// Right to push frames into one group
///
/// Obtained from [`StreamRegistry::publish`](super::StreamRegistry::publish)
/// or `preempt_publish`. Once another publisher takes over, or the handle is
/// unpublished, every `send` fails with `PublisherMismatch`.
#[derive(Debug)]
pub struct PublisherHandle {
    pub(super) id: u64,
    pub(super) key: StreamKey,
    pub(super) group: Arc<Mutex<Group>>,
    pub(super) cancel: CancellationToken,
}

impl PublisherHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn stream_key(&self) -> &StreamKey {
        &self.key
    }

    /// Forward one frame to the group
    pub async fn send(&self, frame: Frame) -> Result<FanoutReport, RegistryError> {
        if self.cancel.is_cancelled() {
            return Err(RegistryError::PublisherMismatch(self.key.clone()));
        }

        let mut group = self.group.lock().await;
        if !group.is_publisher(self.id) {
            return Err(RegistryError::PublisherMismatch(self.key.clone()));
        }
        Ok(group.on_publisher_frame(frame))
    }

    /// Another publisher took over, or this one was unpublished
    pub fn is_preempted(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Resolves once the handle can no longer publish
    pub async fn cancelled(&self) {
        self.cancel.cancelled().await
    }
}
