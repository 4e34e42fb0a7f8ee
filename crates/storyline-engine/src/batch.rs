//! Batch observers: terminal records, requeue notifications and batch
//! completion.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use storyline_model::{Counts, Lifecycle, SpecNode};
use tokio::sync::{watch, Mutex};
use tracing::debug;
use uuid::Uuid;

use crate::messaging::{EventAggregator, Message};
use crate::request::SpecExecutionRequest;
use crate::results::SpecResults;

/// Terminal outcome of one specification in a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchRecord {
    /// The queued execution that produced this record.
    pub run_id: Uuid,
    pub specification_id: String,
    pub name: String,
    pub lifecycle: Lifecycle,
    pub results: SpecResults,
    pub final_attempt: u32,
    pub recorded_at: DateTime<Utc>,
}

impl BatchRecord {
    pub fn new(request: &SpecExecutionRequest, results: &SpecResults) -> Self {
        Self {
            run_id: request.id,
            specification_id: request.specification.id.clone(),
            name: request.specification.name.clone(),
            lifecycle: request.specification.lifecycle,
            results: results.clone(),
            final_attempt: request.attempts,
            recorded_at: Utc::now(),
        }
    }

    pub fn was_successful(&self) -> bool {
        self.results.was_successful()
    }
}

/// Observer of a batch run.
///
/// `spec_requeued` fires for every non-terminal failure, `spec_handled`
/// exactly once per queued execution with its final results, and
/// `monitor_batch` resolves once every node has a record.
#[async_trait]
pub trait BatchObserver: Send + Sync {
    async fn spec_requeued(&self, request: &SpecExecutionRequest, results: &SpecResults);

    async fn spec_handled(&self, request: &SpecExecutionRequest, results: &SpecResults);

    /// Records for `nodes`, in node order.
    async fn monitor_batch(&self, nodes: Vec<SpecNode>) -> Vec<BatchRecord>;
}

#[async_trait]
impl<T: BatchObserver + ?Sized> BatchObserver for Arc<T> {
    async fn spec_requeued(&self, request: &SpecExecutionRequest, results: &SpecResults) {
        (**self).spec_requeued(request, results).await
    }

    async fn spec_handled(&self, request: &SpecExecutionRequest, results: &SpecResults) {
        (**self).spec_handled(request, results).await
    }

    async fn monitor_batch(&self, nodes: Vec<SpecNode>) -> Vec<BatchRecord> {
        (**self).monitor_batch(nodes).await
    }
}

#[derive(Default)]
struct RecorderState {
    records: HashMap<Uuid, BatchRecord>,
    latest: HashMap<String, Uuid>,
    counts: Counts,
    requeues: u32,
}

impl RecorderState {
    fn lookup(&self, node: &SpecNode) -> Option<&BatchRecord> {
        let run_id = match node.run_id {
            Some(run_id) => run_id,
            None => *self.latest.get(&node.id)?,
        };
        self.records.get(&run_id)
    }
}

/// Base batch observer: aggregates counts and keeps one record per queued
/// execution, so re-running a specification in a later batch records it
/// again. Later duplicates for the same execution are ignored.
pub struct BatchRecorder {
    state: Mutex<RecorderState>,
    changed: watch::Sender<usize>,
    bus: Option<EventAggregator>,
}

impl Default for BatchRecorder {
    fn default() -> Self {
        Self::new()
    }
}

impl BatchRecorder {
    pub fn new() -> Self {
        let (changed, _) = watch::channel(0);
        Self {
            state: Mutex::new(RecorderState::default()),
            changed,
            bus: None,
        }
    }

    /// Also publish `SpecRequeued` and `SpecHandled` messages on `bus`.
    pub fn with_messaging(mut self, bus: EventAggregator) -> Self {
        self.bus = Some(bus);
        self
    }

    /// Counts summed over every handled specification.
    pub async fn counts(&self) -> Counts {
        self.state.lock().await.counts
    }

    pub async fn requeues(&self) -> u32 {
        self.state.lock().await.requeues
    }

    /// Most recent record for `specification_id`.
    pub async fn record(&self, specification_id: &str) -> Option<BatchRecord> {
        let state = self.state.lock().await;
        let run_id = state.latest.get(specification_id)?;
        state.records.get(run_id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.state.lock().await.records.len()
    }
}

#[async_trait]
impl BatchObserver for BatchRecorder {
    async fn spec_requeued(&self, request: &SpecExecutionRequest, results: &SpecResults) {
        self.state.lock().await.requeues += 1;
        if let Some(bus) = &self.bus {
            bus.send(Message::SpecRequeued {
                id: request.specification.id.clone(),
                attempts: request.attempts,
                results: results.clone(),
            });
        }
    }

    async fn spec_handled(&self, request: &SpecExecutionRequest, results: &SpecResults) {
        let recorded = {
            let mut state = self.state.lock().await;
            if state.records.contains_key(&request.id) {
                false
            } else {
                state.counts.add(&results.counts);
                state.records.insert(request.id, BatchRecord::new(request, results));
                state
                    .latest
                    .insert(request.specification.id.clone(), request.id);
                true
            }
        };

        if !recorded {
            debug!(spec_id = %request.specification_id(), "duplicate terminal result ignored");
            return;
        }

        // SpecHandled must be on the bus before monitors wake.
        if let Some(bus) = &self.bus {
            bus.send(Message::SpecHandled {
                id: request.specification.id.clone(),
                results: results.clone(),
            });
        }
        self.changed.send_modify(|n| *n += 1);
    }

    async fn monitor_batch(&self, nodes: Vec<SpecNode>) -> Vec<BatchRecord> {
        let mut changed = self.changed.subscribe();
        loop {
            {
                let state = self.state.lock().await;
                let records: Option<Vec<BatchRecord>> =
                    nodes.iter().map(|n| state.lookup(n).cloned()).collect();
                if let Some(records) = records {
                    return records;
                }
            }
            if changed.changed().await.is_err() {
                return Vec::new();
            }
        }
    }
}
