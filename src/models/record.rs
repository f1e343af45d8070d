use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::RecordStatus;

/// What the transfer hands the metadata registry for each stored file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordMetadata {
    pub batch_id: Uuid,
    pub caller_id: String,
    pub referral_code: Option<String>,
    pub file_name: String,
    pub media_type: String,
    pub size_bytes: u64,
    pub storage_path: String,
    pub status: RecordStatus,
}

/// A registry row as read back from the database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRecord {
    pub id: Uuid,
    pub metadata: RecordMetadata,
    pub created_at: NaiveDateTime,
}
