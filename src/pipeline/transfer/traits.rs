//! Collaborator seams for the transfer orchestrator.
//!
//! All traits are `Send + Sync` so they can be shared across concurrent item
//! futures behind an `Arc`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{CallerContext, RecordMetadata, RecordStatus};

/// Failure reported by a storage sink, metadata registry, or deal store.
/// The caller decides which `TransferError` it becomes.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CollaboratorError {
    #[error("unreachable: {0}")]
    Network(String),

    #[error("rejected: {0}")]
    Rejected(String),
}

// ═══════════════════════════════════════════
// Traits
// ═══════════════════════════════════════════

/// Durable blob store addressed by path.
#[async_trait]
pub trait StorageSink: Send + Sync {
    async fn put(&self, path: &str, bytes: &[u8]) -> Result<(), CollaboratorError>;
}

/// Metadata registry for stored files and their batch owner.
#[async_trait]
pub trait RecordRegistry: Send + Sync {
    /// Create one record; returns its id.
    async fn create(&self, metadata: &RecordMetadata) -> Result<Uuid, CollaboratorError>;

    /// Update the status of the record owning a whole batch.
    async fn mark_batch(
        &self,
        batch_id: Uuid,
        caller: &CallerContext,
        status: RecordStatus,
    ) -> Result<(), CollaboratorError>;
}

// ── Mocks for testing ──────────────────────────────────────

/// In-memory sink recording every put. Can fail for chosen file names and
/// delay each call to expose concurrency.
#[derive(Default)]
pub struct MockStorageSink {
    failures: HashMap<String, CollaboratorError>,
    delay: Option<Duration>,
    puts: Mutex<Vec<(String, usize)>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MockStorageSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail any put whose path ends with `file_name`.
    pub fn failing_for(mut self, file_name: &str, error: CollaboratorError) -> Self {
        self.failures.insert(file_name.to_string(), error);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Paths written, in call order.
    pub fn paths(&self) -> Vec<String> {
        self.puts
            .lock()
            .map(|p| p.iter().map(|(path, _)| path.clone()).collect())
            .unwrap_or_default()
    }

    pub fn put_count(&self) -> usize {
        self.puts.lock().map(|p| p.len()).unwrap_or(0)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StorageSink for MockStorageSink {
    async fn put(&self, path: &str, bytes: &[u8]) -> Result<(), CollaboratorError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if let Some((_, err)) = self.failures.iter().find(|(name, _)| path.ends_with(name.as_str())) {
            return Err(err.clone());
        }
        if let Ok(mut puts) = self.puts.lock() {
            puts.push((path.to_string(), bytes.len()));
        }
        Ok(())
    }
}

/// In-memory registry. Can fail creation for chosen file names and fail the
/// batch-owner update.
#[derive(Default)]
pub struct MockRecordRegistry {
    failures: HashMap<String, CollaboratorError>,
    fail_mark: Option<CollaboratorError>,
    records: Mutex<Vec<RecordMetadata>>,
    marks: Mutex<Vec<(Uuid, RecordStatus)>>,
}

impl MockRecordRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_for(mut self, file_name: &str, error: CollaboratorError) -> Self {
        self.failures.insert(file_name.to_string(), error);
        self
    }

    pub fn failing_mark(mut self, error: CollaboratorError) -> Self {
        self.fail_mark = Some(error);
        self
    }

    pub fn records(&self) -> Vec<RecordMetadata> {
        self.records.lock().map(|r| r.clone()).unwrap_or_default()
    }

    pub fn marks(&self) -> Vec<(Uuid, RecordStatus)> {
        self.marks.lock().map(|m| m.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl RecordRegistry for MockRecordRegistry {
    async fn create(&self, metadata: &RecordMetadata) -> Result<Uuid, CollaboratorError> {
        if let Some(err) = self.failures.get(&metadata.file_name) {
            return Err(err.clone());
        }
        if let Ok(mut records) = self.records.lock() {
            records.push(metadata.clone());
        }
        Ok(Uuid::new_v4())
    }

    async fn mark_batch(
        &self,
        batch_id: Uuid,
        _caller: &CallerContext,
        status: RecordStatus,
    ) -> Result<(), CollaboratorError> {
        if let Some(err) = &self.fail_mark {
            return Err(err.clone());
        }
        if let Ok(mut marks) = self.marks.lock() {
            marks.push((batch_id, status));
        }
        Ok(())
    }
}
