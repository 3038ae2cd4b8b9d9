//! Vector store abstraction layer.
//!
//! The pipeline writes through the [`VectorStore`] trait so the Qdrant backend
//! can be swapped for an in-memory store in tests. [`RetryingStore`] adds the
//! retry policy on top of any backend.

mod qdrant;

pub use qdrant::QdrantBackend;

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;

use crate::error::VectorStoreError;
use crate::models::Batch;
use crate::utils::{RetryPolicy, with_retry};

/// Collection information
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionInfo {
    pub points_count: u64,
}

#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Check if the vector store is reachable.
    async fn health_check(&self) -> Result<bool, VectorStoreError>;

    /// Returns None if the collection doesn't exist.
    async fn get_collection_info(&self) -> Result<Option<CollectionInfo>, VectorStoreError>;

    /// Create the collection for `dimension`-sized vectors if it doesn't exist.
    async fn ensure_collection(&self, dimension: usize) -> Result<(), VectorStoreError>;

    /// Insert or replace every point of `batch`, keyed by point id.
    async fn upsert_batch(&self, batch: &Batch) -> Result<(), VectorStoreError>;

    fn collection(&self) -> &str;
}

/// Store wrapped in a retry policy; a failed batch is resent whole.
pub struct RetryingStore<S> {
    inner: S,
    policy: RetryPolicy,
    retries: AtomicU64,
}

impl<S: VectorStore> RetryingStore<S> {
    pub fn new(inner: S, policy: RetryPolicy) -> Self {
        Self {
            inner,
            policy,
            retries: AtomicU64::new(0),
        }
    }

    /// Number of extra attempts made so far.
    pub fn retries(&self) -> u64 {
        self.retries.load(Ordering::Relaxed)
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    fn record_attempts(&self, attempts: u32) {
        self.retries
            .fetch_add(u64::from(attempts.saturating_sub(1)), Ordering::Relaxed);
    }
}

#[async_trait]
impl<S: VectorStore> VectorStore for RetryingStore<S> {
    async fn health_check(&self) -> Result<bool, VectorStoreError> {
        self.inner.health_check().await
    }

    async fn get_collection_info(&self) -> Result<Option<CollectionInfo>, VectorStoreError> {
        let outcome = with_retry(&self.policy, || self.inner.get_collection_info()).await;
        self.record_attempts(outcome.attempts());
        outcome.into_result()
    }

    async fn ensure_collection(&self, dimension: usize) -> Result<(), VectorStoreError> {
        let outcome = with_retry(&self.policy, || self.inner.ensure_collection(dimension)).await;
        self.record_attempts(outcome.attempts());
        outcome.into_result()
    }

    async fn upsert_batch(&self, batch: &Batch) -> Result<(), VectorStoreError> {
        let outcome = with_retry(&self.policy, || self.inner.upsert_batch(batch)).await;
        self.record_attempts(outcome.attempts());
        outcome.into_result()
    }

    fn collection(&self) -> &str {
        self.inner.collection()
    }
}
