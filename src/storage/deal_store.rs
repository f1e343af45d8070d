use std::sync::Mutex;

use async_trait::async_trait;
use tracing::{info, warn};
use uuid::Uuid;

use crate::models::{CallerContext, Snapshot};
use crate::pipeline::transfer::CollaboratorError;

/// Downstream consumer of finished snapshots. One-way: the pipeline never
/// reads deals back.
#[async_trait]
pub trait DealStore: Send + Sync {
    async fn create_deal(
        &self,
        snapshot: &Snapshot,
        caller: &CallerContext,
    ) -> Result<Uuid, CollaboratorError>;
}

/// Hand a validated snapshot to the deal store, logging the result.
pub async fn hand_off(
    store: &dyn DealStore,
    snapshot: &Snapshot,
    caller: &CallerContext,
) -> Result<Uuid, CollaboratorError> {
    match store.create_deal(snapshot, caller).await {
        Ok(deal_id) => {
            info!(
                deal_id = %deal_id,
                caller = %caller.caller_id,
                company = %snapshot.company_name,
                "Deal handed off"
            );
            Ok(deal_id)
        }
        Err(e) => {
            warn!(caller = %caller.caller_id, error = %e, "Deal hand-off failed");
            Err(e)
        }
    }
}

// ── Mock for testing ──────────────────────────────────────

#[derive(Default)]
pub struct MockDealStore {
    failure: Option<CollaboratorError>,
    deals: Mutex<Vec<(Uuid, String, Snapshot)>>,
}

impl MockDealStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(error: CollaboratorError) -> Self {
        Self {
            failure: Some(error),
            ..Self::default()
        }
    }

    /// (deal id, caller id, snapshot) per created deal.
    pub fn deals(&self) -> Vec<(Uuid, String, Snapshot)> {
        self.deals.lock().map(|d| d.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl DealStore for MockDealStore {
    async fn create_deal(
        &self,
        snapshot: &Snapshot,
        caller: &CallerContext,
    ) -> Result<Uuid, CollaboratorError> {
        if let Some(error) = &self.failure {
            return Err(error.clone());
        }
        let id = Uuid::new_v4();
        if let Ok(mut deals) = self.deals.lock() {
            deals.push((id, caller.caller_id.clone(), snapshot.clone()));
        }
        Ok(id)
    }
}
