use std::str::FromStr;

use chrono::NaiveDateTime;
use rusqlite::{params, Connection};
use uuid::Uuid;

use super::DatabaseError;
use crate::models::*;

// ═══════════════════════════════════════════
// Intake Record Repository
// ═══════════════════════════════════════════

pub fn insert_record(
    conn: &Connection,
    id: &Uuid,
    record: &RecordMetadata,
) -> Result<(), DatabaseError> {
    let size_bytes = i64::try_from(record.size_bytes).map_err(|_| {
        DatabaseError::ConstraintViolation(format!("size_bytes out of range: {}", record.size_bytes))
    })?;
    conn.execute(
        "INSERT INTO intake_records (id, batch_id, caller_id, referral_code, file_name,
         media_type, size_bytes, storage_path, status)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            id.to_string(),
            record.batch_id.to_string(),
            record.caller_id,
            record.referral_code,
            record.file_name,
            record.media_type,
            size_bytes,
            record.storage_path,
            record.status.as_str(),
        ],
    )?;
    Ok(())
}

/// Records of one batch, oldest first.
pub fn get_records_for_batch(
    conn: &Connection,
    batch_id: &Uuid,
) -> Result<Vec<StoredRecord>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, batch_id, caller_id, referral_code, file_name, media_type, size_bytes,
         storage_path, status, created_at
         FROM intake_records WHERE batch_id = ?1 ORDER BY created_at, rowid",
    )?;

    let rows = stmt.query_map(params![batch_id.to_string()], |row| {
        Ok(RecordRow {
            id: row.get::<_, String>(0)?,
            batch_id: row.get::<_, String>(1)?,
            caller_id: row.get::<_, String>(2)?,
            referral_code: row.get::<_, Option<String>>(3)?,
            file_name: row.get::<_, String>(4)?,
            media_type: row.get::<_, String>(5)?,
            size_bytes: row.get::<_, i64>(6)?,
            storage_path: row.get::<_, String>(7)?,
            status: row.get::<_, String>(8)?,
            created_at: row.get::<_, String>(9)?,
        })
    })?;

    let mut records = Vec::new();
    for row in rows {
        records.push(record_from_row(row?)?);
    }
    Ok(records)
}

struct RecordRow {
    id: String,
    batch_id: String,
    caller_id: String,
    referral_code: Option<String>,
    file_name: String,
    media_type: String,
    size_bytes: i64,
    storage_path: String,
    status: String,
    created_at: String,
}

fn record_from_row(row: RecordRow) -> Result<StoredRecord, DatabaseError> {
    Ok(StoredRecord {
        id: parse_uuid(&row.id)?,
        metadata: RecordMetadata {
            batch_id: parse_uuid(&row.batch_id)?,
            caller_id: row.caller_id,
            referral_code: row.referral_code,
            file_name: row.file_name,
            media_type: row.media_type,
            size_bytes: row.size_bytes.max(0) as u64,
            storage_path: row.storage_path,
            status: RecordStatus::from_str(&row.status)?,
        },
        created_at: parse_timestamp(&row.created_at),
    })
}

// ═══════════════════════════════════════════
// Intake Batch Repository
// ═══════════════════════════════════════════

/// Insert or update the owner row of a batch.
pub fn upsert_batch_status(
    conn: &Connection,
    batch_id: &Uuid,
    caller: &CallerContext,
    status: RecordStatus,
) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO intake_batches (id, caller_id, referral_code, status)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(id) DO UPDATE SET status = excluded.status, updated_at = datetime('now')",
        params![
            batch_id.to_string(),
            caller.caller_id,
            caller.referral_code,
            status.as_str(),
        ],
    )?;
    Ok(())
}

pub fn get_batch_status(
    conn: &Connection,
    batch_id: &Uuid,
) -> Result<Option<RecordStatus>, DatabaseError> {
    let result = conn.query_row(
        "SELECT status FROM intake_batches WHERE id = ?1",
        params![batch_id.to_string()],
        |row| row.get::<_, String>(0),
    );

    match result {
        Ok(status) => Ok(Some(RecordStatus::from_str(&status)?)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

// ═══════════════════════════════════════════
// Deal Repository
// ═══════════════════════════════════════════

pub fn insert_deal(
    conn: &Connection,
    id: &Uuid,
    snapshot: &Snapshot,
    caller: &CallerContext,
) -> Result<(), DatabaseError> {
    let snapshot_json = serde_json::to_string(snapshot)?;
    conn.execute(
        "INSERT INTO deals (id, caller_id, referral_code, company_name, score, snapshot_json)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            id.to_string(),
            caller.caller_id,
            caller.referral_code,
            snapshot.company_name,
            snapshot.deal_quality.score as i64,
            snapshot_json,
        ],
    )?;
    Ok(())
}

pub fn get_deal_snapshot(conn: &Connection, id: &Uuid) -> Result<Option<Snapshot>, DatabaseError> {
    let result = conn.query_row(
        "SELECT snapshot_json FROM deals WHERE id = ?1",
        params![id.to_string()],
        |row| row.get::<_, String>(0),
    );

    match result {
        Ok(json) => Ok(Some(serde_json::from_str(&json)?)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Deal ids created by one caller, newest first.
pub fn list_deals_for_caller(conn: &Connection, caller_id: &str) -> Result<Vec<Uuid>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id FROM deals WHERE caller_id = ?1 ORDER BY created_at DESC, rowid DESC",
    )?;
    let rows = stmt.query_map(params![caller_id], |row| row.get::<_, String>(0))?;

    let mut ids = Vec::new();
    for row in rows {
        ids.push(parse_uuid(&row?)?);
    }
    Ok(ids)
}

// ── Row helpers ──

fn parse_uuid(s: &str) -> Result<Uuid, DatabaseError> {
    Uuid::parse_str(s).map_err(|e| DatabaseError::ConstraintViolation(e.to_string()))
}

fn parse_timestamp(s: &str) -> NaiveDateTime {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S"))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::sqlite::open_memory_database;

    fn metadata(batch_id: Uuid, name: &str) -> RecordMetadata {
        RecordMetadata {
            batch_id,
            caller_id: "founder-1".into(),
            referral_code: Some("REF42".into()),
            file_name: name.into(),
            media_type: "application/pdf".into(),
            size_bytes: 1024,
            storage_path: format!("founder-1/{batch_id}/{name}"),
            status: RecordStatus::Pending,
        }
    }

    fn snapshot() -> Snapshot {
        Snapshot {
            company_name: "Acme".into(),
            tagline: "Robots".into(),
            deal_quality: DealQuality {
                score: 72,
                verdict: "Solid".into(),
            },
            tags: SnapshotTags::default(),
            debrief: "One.\n\nTwo.".into(),
            key_strengths: vec!["team".into()],
            key_risks: vec![],
        }
    }

    #[test]
    fn records_round_trip_in_insertion_order() {
        let conn = open_memory_database().unwrap();
        let batch_id = Uuid::new_v4();
        for name in ["a.pdf", "b.pdf"] {
            insert_record(&conn, &Uuid::new_v4(), &metadata(batch_id, name)).unwrap();
        }
        insert_record(&conn, &Uuid::new_v4(), &metadata(Uuid::new_v4(), "other.pdf")).unwrap();

        let records = get_records_for_batch(&conn, &batch_id).unwrap();
        let names: Vec<&str> = records.iter().map(|r| r.metadata.file_name.as_str()).collect();
        assert_eq!(names, vec!["a.pdf", "b.pdf"]);
        assert_eq!(records[0].metadata.referral_code.as_deref(), Some("REF42"));
        assert_eq!(records[0].metadata.status, RecordStatus::Pending);
    }

    #[test]
    fn storage_path_is_unique() {
        let conn = open_memory_database().unwrap();
        let batch_id = Uuid::new_v4();
        insert_record(&conn, &Uuid::new_v4(), &metadata(batch_id, "a.pdf")).unwrap();
        let err = insert_record(&conn, &Uuid::new_v4(), &metadata(batch_id, "a.pdf"));
        assert!(matches!(err, Err(DatabaseError::Sqlite(_))));
    }

    #[test]
    fn batch_status_upserts() {
        let conn = open_memory_database().unwrap();
        let batch_id = Uuid::new_v4();
        let caller = CallerContext::new("founder-1");
        assert_eq!(get_batch_status(&conn, &batch_id).unwrap(), None);

        upsert_batch_status(&conn, &batch_id, &caller, RecordStatus::Pending).unwrap();
        upsert_batch_status(&conn, &batch_id, &caller, RecordStatus::Processing).unwrap();
        assert_eq!(
            get_batch_status(&conn, &batch_id).unwrap(),
            Some(RecordStatus::Processing)
        );
    }

    #[test]
    fn batch_records_are_scoped_to_their_batch() {
        let conn = open_memory_database().unwrap();
        let batch_id = Uuid::new_v4();
        insert_record(&conn, &Uuid::new_v4(), &metadata(batch_id, "a.pdf")).unwrap();
        insert_record(&conn, &Uuid::new_v4(), &metadata(Uuid::new_v4(), "b.pdf")).unwrap();

        let records = get_records_for_batch(&conn, &batch_id).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].metadata.file_name, "a.pdf");
    }

    #[test]
    fn deal_snapshot_round_trips() {
        let conn = open_memory_database().unwrap();
        let id = Uuid::new_v4();
        let caller = CallerContext::new("founder-1");
        insert_deal(&conn, &id, &snapshot(), &caller).unwrap();

        assert_eq!(get_deal_snapshot(&conn, &id).unwrap(), Some(snapshot()));
        assert_eq!(get_deal_snapshot(&conn, &Uuid::new_v4()).unwrap(), None);
        assert_eq!(list_deals_for_caller(&conn, "founder-1").unwrap(), vec![id]);
        assert!(list_deals_for_caller(&conn, "someone-else").unwrap().is_empty());
    }
}
