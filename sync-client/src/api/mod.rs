//! API client abstraction for syncview.
//!
//! The core never talks to the sync service directly. Everything that
//! crosses the process boundary goes through [`ApiClient`]:
//! - `commit_permissions()` sends one batch of local permission changes
//! - `fetch_metadata()` resolves metadata for shared entries
//!
//! The batch is the only serialized artifact of this layer; its wire shape
//! is owned by the implementation.
//!
//! # Example
//!
//! ```ignore
//! let api = MockApiClient::new();
//! api.insert_metadata(entry_id, EntryMetadata::default());
//! let metadata = api.fetch_metadata(&[entry_id]).await?;
//! ```

mod mock;

pub use mock::MockApiClient;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use syncview_types::{EntryId, EntryMetadata, PeerUid, PermissionSet};
use thiserror::Error;

/// API errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    /// Connection failed.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// Not connected to the service.
    #[error("not connected")]
    NotConnected,

    /// The service refused the request.
    #[error("request rejected: {0}")]
    Rejected(String),

    /// Request failed in transit.
    #[error("request failed: {0}")]
    RequestFailed(String),

    /// Request timeout.
    #[error("request timeout")]
    Timeout,
}

/// New local permissions for one peer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionUpdate {
    /// Peer the permissions apply to.
    pub peer: PeerUid,
    /// Full local permission set after the edit.
    pub permissions: PermissionSet,
}

/// All permission changes of one commit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionBatch {
    /// One update per peer, ordered by peer UID.
    pub updates: Vec<PermissionUpdate>,
}

impl PermissionBatch {
    /// Number of peers in the batch.
    pub fn len(&self) -> usize {
        self.updates.len()
    }

    /// Check if the batch carries no updates.
    pub fn is_empty(&self) -> bool {
        self.updates.is_empty()
    }

    /// Peers included in the batch.
    pub fn peers(&self) -> impl Iterator<Item = &PeerUid> {
        self.updates.iter().map(|u| &u.peer)
    }
}

/// Acknowledgement of a committed batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommitAck {
    /// Number of peer updates the service accepted.
    pub accepted: usize,
}

/// Metadata keyed by entry.
pub type MetadataMap = HashMap<EntryId, EntryMetadata>;

/// Client for the sync service API.
///
/// Implementations handle transport, authentication and wire format.
#[async_trait]
pub trait ApiClient: Send + Sync {
    /// Send a batch of permission changes.
    ///
    /// Either the whole batch is accepted or an error is returned.
    async fn commit_permissions(&self, batch: &PermissionBatch) -> Result<CommitAck, ApiError>;

    /// Fetch metadata for the given entries.
    ///
    /// Entries the service knows nothing about are absent from the result.
    async fn fetch_metadata(&self, ids: &[EntryId]) -> Result<MetadataMap, ApiError>;
}

#[async_trait]
impl<T: ApiClient + ?Sized> ApiClient for Arc<T> {
    async fn commit_permissions(&self, batch: &PermissionBatch) -> Result<CommitAck, ApiError> {
        (**self).commit_permissions(batch).await
    }

    async fn fetch_metadata(&self, ids: &[EntryId]) -> Result<MetadataMap, ApiError> {
        (**self).fetch_metadata(ids).await
    }
}
