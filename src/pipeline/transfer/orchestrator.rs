//! Batch transfer orchestrator.
//!
//! Per item: Transferring → `sink.put` → `registry.create` → Persisted, or
//! Failed with a classified `TransferError`. One item failing never stops
//! the others. After every item resolves, the batch owner is marked
//! "processing".
//!
//! Items run through a single per-item future (`transfer_item`). With the
//! default concurrency of 1 they run strictly in insertion order; with
//! `with_concurrency(k)` up to `k` run at once. Either way, every state
//! change goes through one aggregator reading an mpsc channel, so item
//! writes never race and aggregate progress only moves forward.

use std::collections::HashSet;
use std::sync::Arc;

use futures_util::stream::{self, StreamExt};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use super::{
    aggregate_percent, Batch, BatchOutcome, ItemOutcome, OwnerMark, RecordRegistry, StorageSink,
    TransferError, TransferEvent, TransferObserver,
};
use crate::models::{CallerContext, RecordMetadata, RecordStatus, SourceDocument};
use crate::pipeline::cancel::CancelSignal;
use crate::pipeline::intake::sanitize_filename;

/// Work unit handed to `transfer_item`. Owns everything it needs so item
/// futures never borrow batch state.
struct TransferJob {
    index: usize,
    batch_id: Uuid,
    document: SourceDocument,
    storage_path: String,
}

enum ItemEvent {
    Started(usize),
    Resolved(usize, Result<Uuid, TransferError>),
}

pub struct BatchTransfer {
    sink: Arc<dyn StorageSink>,
    registry: Arc<dyn RecordRegistry>,
    concurrency: usize,
}

impl BatchTransfer {
    pub fn new(sink: Arc<dyn StorageSink>, registry: Arc<dyn RecordRegistry>) -> Self {
        Self {
            sink,
            registry,
            concurrency: 1,
        }
    }

    /// Allow up to `k` items in flight. `0` is treated as 1.
    pub fn with_concurrency(mut self, k: usize) -> Self {
        self.concurrency = k.max(1);
        self
    }

    /// Transfer every item in `batch`. Always returns an outcome in which
    /// each item is Persisted or Failed, including under cancellation.
    pub async fn run(
        &self,
        batch: Batch,
        caller: &CallerContext,
        signal: &CancelSignal,
        observer: Option<TransferObserver<'_>>,
    ) -> BatchOutcome {
        let (batch_id, mut items) = batch.into_parts();
        let total = items.len();

        info!(
            batch_id = %batch_id,
            caller = %caller.caller_id,
            total,
            concurrency = self.concurrency,
            "Transfer: starting batch"
        );
        emit(observer, TransferEvent::Started { batch_id, total });

        let names: Vec<&str> = items.iter().map(|item| item.document().name()).collect();
        let paths = storage_paths(&caller.caller_id, batch_id, &names);
        let jobs: Vec<TransferJob> = items
            .iter()
            .zip(paths.iter())
            .enumerate()
            .map(|(index, (item, path))| TransferJob {
                index,
                batch_id,
                document: item.document().clone(),
                storage_path: path.clone(),
            })
            .collect();

        let mut record_ids: Vec<Option<Uuid>> = vec![None; total];
        let (tx, mut rx) = mpsc::unbounded_channel::<ItemEvent>();
        let concurrency = self.concurrency;

        let producer = async move {
            stream::iter(jobs)
                .for_each_concurrent(concurrency, |job| {
                    let tx = tx.clone();
                    async move {
                        let _ = tx.send(ItemEvent::Started(job.index));
                        let result = self.transfer_item(&job, caller, signal).await;
                        let _ = tx.send(ItemEvent::Resolved(job.index, result));
                    }
                })
                .await;
        };

        let aggregator = async {
            let mut resolved = 0usize;
            while let Some(event) = rx.recv().await {
                match event {
                    ItemEvent::Started(index) => {
                        let item = &mut items[index];
                        if let Err(e) = item.begin_transfer() {
                            warn!(batch_id = %batch_id, item = %item.id(), error = %e, "Transfer: bad start transition");
                        }
                        emit(observer, TransferEvent::Item { item: item.snapshot() });
                    }
                    ItemEvent::Resolved(index, result) => {
                        let item = &mut items[index];
                        let applied = match result {
                            Ok(record_id) => {
                                record_ids[index] = Some(record_id);
                                item.mark_persisted()
                            }
                            Err(error) => {
                                warn!(
                                    batch_id = %batch_id,
                                    file = %item.document().name(),
                                    kind = error.kind(),
                                    error = %error,
                                    "Transfer: item failed"
                                );
                                item.mark_failed(error)
                            }
                        };
                        if let Err(e) = applied {
                            warn!(batch_id = %batch_id, item = %item.id(), error = %e, "Transfer: bad terminal transition");
                        }
                        emit(observer, TransferEvent::Item { item: item.snapshot() });

                        resolved += 1;
                        emit(
                            observer,
                            TransferEvent::Progress {
                                resolved,
                                total,
                                percent: aggregate_percent(resolved, total),
                            },
                        );
                    }
                }
            }
        };

        tokio::join!(producer, aggregator);

        let owner = self.mark_owner(batch_id, caller, signal).await;

        let outcome = BatchOutcome {
            batch_id,
            items: items
                .into_iter()
                .zip(paths)
                .zip(record_ids)
                .map(|((item, storage_path), record_id)| ItemOutcome {
                    id: item.id(),
                    name: item.document().name().to_string(),
                    status: item.status(),
                    storage_path,
                    record_id,
                    error: item.failure().cloned(),
                    document: item.document().clone(),
                })
                .collect(),
            owner,
        };

        info!(
            batch_id = %batch_id,
            persisted = outcome.completed_count(),
            failed = outcome.failed_count(),
            "Transfer: batch complete"
        );
        emit(
            observer,
            TransferEvent::Completed {
                persisted: outcome.completed_count(),
                failed: outcome.failed_count(),
            },
        );
        outcome
    }

    /// Store one file, then register it. Each await is guarded by `signal`.
    async fn transfer_item(
        &self,
        job: &TransferJob,
        caller: &CallerContext,
        signal: &CancelSignal,
    ) -> Result<Uuid, TransferError> {
        signal
            .guard(self.sink.put(&job.storage_path, job.document.content()))
            .await
            .map_err(TransferError::Cancelled)?
            .map_err(TransferError::from_sink)?;

        let metadata = RecordMetadata {
            batch_id: job.batch_id,
            caller_id: caller.caller_id.clone(),
            referral_code: caller.referral_code.clone(),
            file_name: job.document.name().to_string(),
            media_type: job.document.media_type().to_string(),
            size_bytes: job.document.size_bytes(),
            storage_path: job.storage_path.clone(),
            status: RecordStatus::Pending,
        };

        signal
            .guard(self.registry.create(&metadata))
            .await
            .map_err(TransferError::Cancelled)?
            .map_err(TransferError::from_registry)
    }

    async fn mark_owner(
        &self,
        batch_id: Uuid,
        caller: &CallerContext,
        signal: &CancelSignal,
    ) -> OwnerMark {
        let call = self
            .registry
            .mark_batch(batch_id, caller, RecordStatus::Processing);
        match signal.guard(call).await {
            Ok(Ok(())) => OwnerMark::Marked,
            Ok(Err(e)) => {
                warn!(batch_id = %batch_id, error = %e, "Transfer: could not mark batch owner");
                OwnerMark::Failed(e.to_string())
            }
            Err(interruption) => OwnerMark::Skipped(interruption.to_string()),
        }
    }
}

fn emit(observer: Option<TransferObserver<'_>>, event: TransferEvent) {
    if let Some(observer) = observer {
        observer(event);
    }
}

/// `{caller}/{batch}/{file}` for each name, in order. A sanitized name seen
/// again in the same batch gets `-2`, `-3`, ... before its extension.
pub fn storage_paths(caller_id: &str, batch_id: Uuid, names: &[&str]) -> Vec<String> {
    let caller = path_segment(caller_id);
    let mut used: HashSet<String> = HashSet::new();

    names
        .iter()
        .map(|name| {
            let base = sanitize_filename(name);
            let mut file = base.clone();
            let mut n = 1;
            while !used.insert(file.clone()) {
                n += 1;
                file = with_suffix(&base, n);
            }
            format!("{caller}/{batch_id}/{file}")
        })
        .collect()
}

fn path_segment(raw: &str) -> String {
    let clean: String = raw
        .trim()
        .chars()
        .map(|c| if matches!(c, '/' | '\\' | '\0') { '_' } else { c })
        .collect();
    if clean.is_empty() || clean == "." || clean == ".." {
        "anonymous".to_string()
    } else {
        clean
    }
}

fn with_suffix(file: &str, n: usize) -> String {
    match file.rfind('.') {
        Some(dot) if dot > 0 => format!("{}-{n}{}", &file[..dot], &file[dot..]),
        _ => format!("{file}-{n}"),
    }
}
