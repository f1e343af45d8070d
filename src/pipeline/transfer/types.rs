use serde::Serialize;
use uuid::Uuid;

use super::{ItemSnapshot, TransferError};
use crate::models::{ItemStatus, SourceDocument};

// ═══════════════════════════════════════════
// Progress events
// ═══════════════════════════════════════════

/// Events emitted while a batch transfers. Observers get copies and cannot
/// touch batch state.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum TransferEvent {
    Started { batch_id: Uuid, total: usize },
    Item { item: ItemSnapshot },
    /// `percent = round(resolved / total * 100)`; never decreases.
    Progress { resolved: usize, total: usize, percent: u8 },
    Completed { persisted: usize, failed: usize },
}

/// Observer callback type used by `BatchTransfer::run`.
pub type TransferObserver<'a> = &'a (dyn Fn(TransferEvent) + Send + Sync);

pub fn aggregate_percent(resolved: usize, total: usize) -> u8 {
    if total == 0 {
        return 100;
    }
    ((resolved as f64 / total as f64) * 100.0).round().min(100.0) as u8
}

// ═══════════════════════════════════════════
// Outcome
// ═══════════════════════════════════════════

#[derive(Debug, Clone, Serialize)]
pub struct ItemOutcome {
    pub id: Uuid,
    pub name: String,
    pub status: ItemStatus,
    pub storage_path: String,
    pub record_id: Option<Uuid>,
    pub error: Option<TransferError>,
    #[serde(skip)]
    pub document: SourceDocument,
}

/// Result of the batch-owner status update after all items resolve.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum OwnerMark {
    Marked,
    Failed(String),
    /// Not attempted: the run was cancelled or past its deadline.
    Skipped(String),
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchOutcome {
    pub batch_id: Uuid,
    pub items: Vec<ItemOutcome>,
    pub owner: OwnerMark,
}

impl BatchOutcome {
    /// Items that ended Persisted.
    pub fn completed_count(&self) -> usize {
        self.count(ItemStatus::Persisted)
    }

    pub fn failed_count(&self) -> usize {
        self.count(ItemStatus::Failed)
    }

    pub fn total_count(&self) -> usize {
        self.items.len()
    }

    /// Documents to re-submit in a fresh batch. Nothing is retried in place.
    pub fn failed_documents(&self) -> Vec<SourceDocument> {
        self.items
            .iter()
            .filter(|item| item.status == ItemStatus::Failed)
            .map(|item| item.document.clone())
            .collect()
    }

    fn count(&self, status: ItemStatus) -> usize {
        self.items.iter().filter(|item| item.status == status).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percent_rounds_half_up() {
        assert_eq!(aggregate_percent(1, 3), 33);
        assert_eq!(aggregate_percent(2, 3), 67);
        assert_eq!(aggregate_percent(3, 3), 100);
        assert_eq!(aggregate_percent(1, 8), 13);
    }

    #[test]
    fn percent_of_empty_batch_is_complete() {
        assert_eq!(aggregate_percent(0, 0), 100);
    }

    #[test]
    fn percent_is_monotonic_in_resolved() {
        for total in 1..=15 {
            let series: Vec<u8> = (0..=total).map(|r| aggregate_percent(r, total)).collect();
            assert!(series.windows(2).all(|w| w[0] <= w[1]), "total={total}");
            assert_eq!(*series.last().unwrap(), 100);
        }
    }

    #[test]
    fn event_serializes_with_type_tag() {
        let json = serde_json::to_string(&TransferEvent::Progress {
            resolved: 1,
            total: 2,
            percent: 50,
        })
        .unwrap();
        assert!(json.contains("\"type\":\"Progress\""));
        assert!(json.contains("\"percent\":50"));
    }
}
