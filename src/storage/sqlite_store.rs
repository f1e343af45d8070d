use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::Connection;
use tracing::debug;
use uuid::Uuid;

use super::DealStore;
use crate::db::{self, DatabaseError};
use crate::models::{CallerContext, RecordMetadata, RecordStatus, Snapshot};
use crate::pipeline::transfer::{CollaboratorError, RecordRegistry};

/// SQLite-backed record registry and deal store. Clones share one
/// connection.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    pub fn open(path: &Path) -> Result<Self, DatabaseError> {
        Ok(Self::from_connection(db::open_database(path)?))
    }

    pub fn open_in_memory() -> Result<Self, DatabaseError> {
        Ok(Self::from_connection(db::open_memory_database()?))
    }

    pub fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
        }
    }

    /// Run `f` against the shared connection.
    pub fn with_conn<T>(
        &self,
        f: impl FnOnce(&Connection) -> Result<T, DatabaseError>,
    ) -> Result<T, CollaboratorError> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| CollaboratorError::Rejected("database lock poisoned".into()))?;
        f(&conn).map_err(to_collaborator)
    }
}

fn to_collaborator(e: DatabaseError) -> CollaboratorError {
    CollaboratorError::Rejected(e.to_string())
}

#[async_trait]
impl RecordRegistry for SqliteStore {
    async fn create(&self, metadata: &RecordMetadata) -> Result<Uuid, CollaboratorError> {
        let id = Uuid::new_v4();
        self.with_conn(|conn| db::insert_record(conn, &id, metadata))?;
        debug!(record_id = %id, file = %metadata.file_name, "Registered record");
        Ok(id)
    }

    async fn mark_batch(
        &self,
        batch_id: Uuid,
        caller: &CallerContext,
        status: RecordStatus,
    ) -> Result<(), CollaboratorError> {
        // File records keep their own status; only the batch owner moves.
        self.with_conn(|conn| db::upsert_batch_status(conn, &batch_id, caller, status))
    }
}

#[async_trait]
impl DealStore for SqliteStore {
    async fn create_deal(
        &self,
        snapshot: &Snapshot,
        caller: &CallerContext,
    ) -> Result<Uuid, CollaboratorError> {
        let id = Uuid::new_v4();
        self.with_conn(|conn| db::insert_deal(conn, &id, snapshot, caller))?;
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DealQuality, SnapshotTags};

    fn metadata(batch_id: Uuid, name: &str) -> RecordMetadata {
        RecordMetadata {
            batch_id,
            caller_id: "founder-1".into(),
            referral_code: None,
            file_name: name.into(),
            media_type: "image/png".into(),
            size_bytes: 10,
            storage_path: format!("founder-1/{batch_id}/{name}"),
            status: RecordStatus::Pending,
        }
    }

    #[tokio::test]
    async fn marking_batch_leaves_file_records_pending() {
        let store = SqliteStore::open_in_memory().unwrap();
        let batch_id = Uuid::new_v4();
        let caller = CallerContext::new("founder-1");

        store.create(&metadata(batch_id, "a.png")).await.unwrap();
        store.create(&metadata(batch_id, "b.png")).await.unwrap();
        store
            .mark_batch(batch_id, &caller, RecordStatus::Processing)
            .await
            .unwrap();

        let (status, records) = store
            .with_conn(|conn| {
                Ok((
                    db::get_batch_status(conn, &batch_id)?,
                    db::get_records_for_batch(conn, &batch_id)?,
                ))
            })
            .unwrap();
        assert_eq!(status, Some(RecordStatus::Processing));
        assert_eq!(records.len(), 2);
        assert!(records
            .iter()
            .all(|r| r.metadata.status == RecordStatus::Pending));
    }

    #[tokio::test]
    async fn duplicate_storage_path_is_rejected() {
        let store = SqliteStore::open_in_memory().unwrap();
        let batch_id = Uuid::new_v4();
        store.create(&metadata(batch_id, "a.png")).await.unwrap();
        let err = store.create(&metadata(batch_id, "a.png")).await.unwrap_err();
        assert!(matches!(err, CollaboratorError::Rejected(_)));
    }

    #[tokio::test]
    async fn deal_store_persists_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::open(&dir.path().join("deckflow.db")).unwrap();
        let snapshot = Snapshot {
            company_name: "Acme".into(),
            tagline: "Robots".into(),
            deal_quality: DealQuality {
                score: 90,
                verdict: "Great".into(),
            },
            tags: SnapshotTags::default(),
            debrief: "Go.".into(),
            key_strengths: vec![],
            key_risks: vec![],
        };

        let id = store
            .create_deal(&snapshot, &CallerContext::new("founder-1"))
            .await
            .unwrap();
        let stored = store
            .with_conn(|conn| db::get_deal_snapshot(conn, &id))
            .unwrap();
        assert_eq!(stored, Some(snapshot));
    }
}
