//! Batch observer decoration for build-server reporting.

use std::sync::Arc;

use async_trait::async_trait;
use storyline_engine::{BatchObserver, BatchRecord, SpecExecutionRequest, SpecResults};
use storyline_model::SpecNode;
use tracing::info;

use crate::outcome::CiOutcome;
use crate::sink::CiSink;

/// Wraps another batch observer. Every call reaches `inner` first; terminal
/// results are then classified and pushed into the sink.
pub struct CiBatchObserver<O> {
    inner: O,
    sink: Arc<dyn CiSink>,
}

impl<O: BatchObserver> CiBatchObserver<O> {
    pub fn new(inner: O, sink: Arc<dyn CiSink>) -> Self {
        Self { inner, sink }
    }

    pub fn inner(&self) -> &O {
        &self.inner
    }
}

#[async_trait]
impl<O: BatchObserver> BatchObserver for CiBatchObserver<O> {
    async fn spec_requeued(&self, request: &SpecExecutionRequest, results: &SpecResults) {
        self.inner.spec_requeued(request, results).await;
        info!(
            spec = %request.specification.name,
            next_attempt = request.attempts + 1,
            "requeuing specification"
        );
    }

    async fn spec_handled(&self, request: &SpecExecutionRequest, results: &SpecResults) {
        self.inner.spec_handled(request, results).await;
        let spec = &request.specification;
        self.sink
            .report(CiOutcome::classify(&spec.name, spec.lifecycle, results));
    }

    async fn monitor_batch(&self, nodes: Vec<SpecNode>) -> Vec<BatchRecord> {
        self.inner.monitor_batch(nodes).await
    }
}

/// Decorator for `RemoteProxy::with_batch_decorator`.
pub fn ci_decorator(
    sink: Arc<dyn CiSink>,
) -> impl Fn(Arc<dyn BatchObserver>) -> Arc<dyn BatchObserver> + Send + Sync + 'static {
    move |inner: Arc<dyn BatchObserver>| -> Arc<dyn BatchObserver> {
        Arc::new(CiBatchObserver::new(inner, Arc::clone(&sink)))
    }
}
