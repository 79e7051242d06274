//! Mock API client for testing.
//!
//! Allows seeding metadata, scripting failures and delays, and capturing
//! committed batches for verification.

use super::{ApiClient, ApiError, CommitAck, MetadataMap, PermissionBatch};
use async_trait::async_trait;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use syncview_types::{EntryId, EntryMetadata};

/// Mock API client for testing.
///
/// Clones share state, so a test can keep one handle while the component
/// under test owns another.
#[derive(Debug, Default, Clone)]
pub struct MockApiClient {
    inner: Arc<Mutex<MockApiInner>>,
}

#[derive(Debug, Default)]
struct MockApiInner {
    metadata: MetadataMap,
    commits: Vec<PermissionBatch>,
    fetch_calls: usize,
    fail_next_commit: Option<ApiError>,
    fail_next_fetch: Option<ApiError>,
    fetch_delay: Option<Duration>,
    commit_delay: Option<Duration>,
}

impl MockApiClient {
    /// Create a new mock client.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MockApiInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make `fetch_metadata()` return `metadata` for `id`.
    pub fn insert_metadata(&self, id: EntryId, metadata: EntryMetadata) {
        self.lock().metadata.insert(id, metadata);
    }

    /// Get every batch that was committed successfully.
    pub fn committed_batches(&self) -> Vec<PermissionBatch> {
        self.lock().commits.clone()
    }

    /// Get the last batch that was committed successfully.
    pub fn last_commit(&self) -> Option<PermissionBatch> {
        self.lock().commits.last().cloned()
    }

    /// Number of `fetch_metadata()` calls so far.
    pub fn fetch_count(&self) -> usize {
        self.lock().fetch_calls
    }

    /// Cause the next `commit_permissions()` to fail with the given error.
    pub fn fail_next_commit(&self, error: ApiError) {
        self.lock().fail_next_commit = Some(error);
    }

    /// Cause the next `fetch_metadata()` to fail with the given error.
    pub fn fail_next_fetch(&self, error: ApiError) {
        self.lock().fail_next_fetch = Some(error);
    }

    /// Delay every `fetch_metadata()` by `delay`.
    pub fn set_fetch_delay(&self, delay: Duration) {
        self.lock().fetch_delay = Some(delay);
    }

    /// Delay every `commit_permissions()` by `delay`.
    pub fn set_commit_delay(&self, delay: Duration) {
        self.lock().commit_delay = Some(delay);
    }

    /// Clear all state (metadata, commits, scripted failures).
    pub fn reset(&self) {
        *self.lock() = MockApiInner::default();
    }
}

#[async_trait]
impl ApiClient for MockApiClient {
    async fn commit_permissions(&self, batch: &PermissionBatch) -> Result<CommitAck, ApiError> {
        let (delay, failure) = {
            let mut inner = self.lock();
            (inner.commit_delay, inner.fail_next_commit.take())
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        // Check for forced failure
        if let Some(error) = failure {
            return Err(error);
        }

        self.lock().commits.push(batch.clone());
        Ok(CommitAck {
            accepted: batch.len(),
        })
    }

    async fn fetch_metadata(&self, ids: &[EntryId]) -> Result<MetadataMap, ApiError> {
        let (delay, result) = {
            let mut inner = self.lock();
            inner.fetch_calls += 1;
            let result = match inner.fail_next_fetch.take() {
                Some(error) => Err(error),
                None => Ok(ids
                    .iter()
                    .filter_map(|id| inner.metadata.get(id).map(|m| (*id, m.clone())))
                    .collect()),
            };
            (inner.fetch_delay, result)
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        result
    }
}
