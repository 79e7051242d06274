//! API client for running without a sync service.
//!
//! Metadata is served from the dataset file; commits are printed to stdout
//! as the JSON batch a real service would receive.

use async_trait::async_trait;
use std::io::Write;
use syncview_client::{ApiClient, ApiError, CommitAck, MetadataMap, PermissionBatch};
use syncview_types::EntryId;

/// [`ApiClient`] backed by local data.
#[derive(Debug, Default)]
pub struct LocalApiClient {
    metadata: MetadataMap,
}

impl LocalApiClient {
    /// Serve `metadata` to fetches.
    pub fn new(metadata: MetadataMap) -> Self {
        Self { metadata }
    }
}

#[async_trait]
impl ApiClient for LocalApiClient {
    async fn commit_permissions(&self, batch: &PermissionBatch) -> Result<CommitAck, ApiError> {
        let json = serde_json::to_string_pretty(batch)
            .map_err(|e| ApiError::RequestFailed(e.to_string()))?;
        let mut stdout = std::io::stdout().lock();
        writeln!(stdout, "{json}").map_err(|e| ApiError::RequestFailed(e.to_string()))?;
        Ok(CommitAck {
            accepted: batch.len(),
        })
    }

    async fn fetch_metadata(&self, ids: &[EntryId]) -> Result<MetadataMap, ApiError> {
        Ok(ids
            .iter()
            .filter_map(|id| self.metadata.get(id).map(|m| (*id, m.clone())))
            .collect())
    }
}
