use serde::Serialize;
use uuid::Uuid;

use super::{InvalidTransition, TransferError};
use crate::models::{ItemStatus, SourceDocument};
use crate::pipeline::intake::{IntakePolicy, Rejection, Validator};

// ═══════════════════════════════════════════
// QueuedItem
// ═══════════════════════════════════════════

/// One file in a batch plus its transfer state. State changes only through
/// the transition methods, which enforce the item lifecycle.
#[derive(Debug, Clone)]
pub struct QueuedItem {
    id: Uuid,
    document: SourceDocument,
    status: ItemStatus,
    progress_percent: u8,
    failure: Option<TransferError>,
}

impl QueuedItem {
    pub fn new(document: SourceDocument) -> Self {
        Self {
            id: Uuid::new_v4(),
            document,
            status: ItemStatus::Pending,
            progress_percent: 0,
            failure: None,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn document(&self) -> &SourceDocument {
        &self.document
    }

    pub fn status(&self) -> ItemStatus {
        self.status
    }

    pub fn progress_percent(&self) -> u8 {
        self.progress_percent
    }

    pub fn failure(&self) -> Option<&TransferError> {
        self.failure.as_ref()
    }

    /// Present iff the item failed.
    pub fn error_message(&self) -> Option<String> {
        self.failure.as_ref().map(|e| e.to_string())
    }

    pub fn begin_transfer(&mut self) -> Result<(), InvalidTransition> {
        self.transition(ItemStatus::Transferring)?;
        self.progress_percent = 0;
        Ok(())
    }

    pub fn mark_persisted(&mut self) -> Result<(), InvalidTransition> {
        self.transition(ItemStatus::Persisted)?;
        self.progress_percent = 100;
        Ok(())
    }

    /// Progress keeps whatever value it had.
    pub fn mark_failed(&mut self, error: TransferError) -> Result<(), InvalidTransition> {
        self.transition(ItemStatus::Failed)?;
        self.failure = Some(error);
        Ok(())
    }

    fn transition(&mut self, next: ItemStatus) -> Result<(), InvalidTransition> {
        if !self.status.can_transition_to(next) {
            return Err(InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }

    pub fn snapshot(&self) -> ItemSnapshot {
        ItemSnapshot {
            id: self.id,
            name: self.document.name().to_string(),
            status: self.status,
            progress_percent: self.progress_percent,
            error: self.error_message(),
        }
    }
}

/// Read-only copy of an item's state, handed to observers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ItemSnapshot {
    pub id: Uuid,
    pub name: String,
    pub status: ItemStatus,
    pub progress_percent: u8,
    pub error: Option<String>,
}

// ═══════════════════════════════════════════
// Batch
// ═══════════════════════════════════════════

/// Ordered set of queued items. Additions go through the validator; the
/// transfer consumes the batch, so nothing can be added once it starts.
#[derive(Debug, Clone)]
pub struct Batch {
    id: Uuid,
    validator: Validator,
    items: Vec<QueuedItem>,
}

/// Result of offering several files at once.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SubmissionReport {
    pub accepted: Vec<Uuid>,
    pub rejected: Vec<Rejection>,
}

impl Batch {
    pub fn new(policy: IntakePolicy) -> Self {
        Self::with_id(Uuid::new_v4(), policy)
    }

    pub fn with_id(id: Uuid, policy: IntakePolicy) -> Self {
        Self {
            id,
            validator: Validator::new(policy),
            items: Vec::new(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn items(&self) -> &[QueuedItem] {
        &self.items
    }

    /// True if an item with the same (name, size) is already queued.
    pub fn contains(&self, identity: (&str, u64)) -> bool {
        self.items
            .iter()
            .any(|item| item.document.identity() == identity)
    }

    /// Validate and append one document.
    pub fn submit(&mut self, document: SourceDocument) -> Result<Uuid, Rejection> {
        if let Err(reason) = self.validator.validate(&document, self) {
            tracing::info!(
                batch_id = %self.id,
                file = %document.name(),
                reason = %reason,
                "Intake: candidate rejected"
            );
            return Err(Rejection {
                name: document.name().to_string(),
                reason,
            });
        }
        let item = QueuedItem::new(document);
        let id = item.id;
        self.items.push(item);
        Ok(id)
    }

    /// Validate and append each document in order. Rejections are collected
    /// and never stop the remaining candidates.
    pub fn submit_all<I>(&mut self, documents: I) -> SubmissionReport
    where
        I: IntoIterator<Item = SourceDocument>,
    {
        let mut report = SubmissionReport::default();
        for document in documents {
            match self.submit(document) {
                Ok(id) => report.accepted.push(id),
                Err(rejection) => report.rejected.push(rejection),
            }
        }
        report
    }

    pub(crate) fn into_parts(self) -> (Uuid, Vec<QueuedItem>) {
        (self.id, self.items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::cancel::Interruption;
    use crate::pipeline::intake::RejectionReason;

    fn doc(name: &str, size: usize) -> SourceDocument {
        SourceDocument::new(name, "application/pdf", vec![0u8; size])
    }

    #[test]
    fn happy_path_transitions() {
        let mut item = QueuedItem::new(doc("deck.pdf", 10));
        assert_eq!(item.status(), ItemStatus::Pending);
        item.begin_transfer().unwrap();
        assert_eq!(item.progress_percent(), 0);
        item.mark_persisted().unwrap();
        assert_eq!(item.status(), ItemStatus::Persisted);
        assert_eq!(item.progress_percent(), 100);
        assert_eq!(item.error_message(), None);
    }

    #[test]
    fn cannot_skip_transferring() {
        let mut item = QueuedItem::new(doc("deck.pdf", 10));
        let err = item.mark_persisted().unwrap_err();
        assert_eq!(err.from, ItemStatus::Pending);
        assert_eq!(err.to, ItemStatus::Persisted);
        assert_eq!(item.status(), ItemStatus::Pending);
    }

    #[test]
    fn terminal_states_are_final() {
        let mut item = QueuedItem::new(doc("deck.pdf", 10));
        item.begin_transfer().unwrap();
        item.mark_failed(TransferError::NetworkFailure("reset".into()))
            .unwrap();
        assert!(item.mark_persisted().is_err());
        assert!(item.begin_transfer().is_err());
        assert_eq!(item.status(), ItemStatus::Failed);
    }

    #[test]
    fn error_message_present_iff_failed() {
        let mut item = QueuedItem::new(doc("deck.pdf", 10));
        item.begin_transfer().unwrap();
        assert!(item.error_message().is_none());
        item.mark_failed(TransferError::Cancelled(Interruption::Cancelled))
            .unwrap();
        assert_eq!(
            item.error_message().as_deref(),
            Some("Transfer interrupted: cancelled")
        );
    }

    #[test]
    fn submit_all_keeps_order_and_collects_rejections() {
        let mut batch = Batch::new(IntakePolicy::batch());
        let report = batch.submit_all(vec![
            doc("a.pdf", 1),
            SourceDocument::new("b.gif", "image/gif", vec![0]),
            doc("c.pdf", 3),
            doc("a.pdf", 1),
        ]);
        assert_eq!(report.accepted.len(), 2);
        assert_eq!(report.rejected.len(), 2);
        assert!(matches!(
            report.rejected[0].reason,
            RejectionReason::UnsupportedType { .. }
        ));
        assert!(matches!(
            report.rejected[1].reason,
            RejectionReason::Duplicate { .. }
        ));
        let names: Vec<&str> = batch.items().iter().map(|i| i.document().name()).collect();
        assert_eq!(names, vec!["a.pdf", "c.pdf"]);
    }

    #[test]
    fn scenario_a_oversize_and_duplicate_are_rejected_in_order() {
        let mut batch = Batch::new(IntakePolicy::batch());
        let report = batch.submit_all(vec![
            doc("one.pdf", 1_000),
            doc("two.pdf", 2_000),
            doc("three.pdf", 3_000),
            SourceDocument::new("photo.png", "image/png", vec![0u8; 25 * 1024 * 1024]),
            doc("one.pdf", 1_000),
        ]);

        assert_eq!(report.accepted.len(), 3);
        assert_eq!(batch.len(), 3);
        let reasons: Vec<&RejectionReason> = report.rejected.iter().map(|r| &r.reason).collect();
        assert!(matches!(
            reasons.as_slice(),
            [
                RejectionReason::TooLarge { max_mb: 20, .. },
                RejectionReason::Duplicate { .. }
            ]
        ));
        let names: Vec<&str> = batch.items().iter().map(|i| i.document().name()).collect();
        assert_eq!(names, vec!["one.pdf", "two.pdf", "three.pdf"]);
    }

    #[test]
    fn batch_never_exceeds_policy() {
        let policy = IntakePolicy {
            max_file_bytes: 100,
            max_files: 3,
        };
        let mut batch = Batch::new(policy);
        let report = batch.submit_all((0..10).map(|i| doc(&format!("{i}.pdf"), 10)));
        assert_eq!(batch.len(), 3);
        assert_eq!(report.rejected.len(), 7);
        assert!(report
            .rejected
            .iter()
            .all(|r| r.reason == RejectionReason::TooMany { max_files: 3 }));
    }
}
