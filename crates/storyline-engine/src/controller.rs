//! Controllers: translate host commands on the bus into engine calls.

use std::sync::Arc;

use async_trait::async_trait;
use storyline_model::{SpecNode, Specification};
use tracing::{debug, warn};

use crate::batch::BatchObserver;
use crate::engine::SpecificationEngine;
use crate::messaging::{EventAggregator, Message, MessageListener};
use crate::request::SpecExecutionRequest;
use crate::results::SpecResults;
use crate::runner::UserInterfaceObserver;

/// Interactive mode: runs specifications one command at a time.
pub struct EngineController {
    engine: Arc<SpecificationEngine>,
    observer: UserInterfaceObserver,
}

impl EngineController {
    pub fn new(engine: Arc<SpecificationEngine>, observer: UserInterfaceObserver) -> Self {
        Self { engine, observer }
    }

    async fn run_spec(&self, specification: Specification) {
        let id = specification.id.clone();
        let queued = match self.engine.prepare(specification.clone()).await {
            // SpecQueued must precede SpecExecutionStarted.
            Ok(request) => {
                self.observer.spec_queued(&request);
                self.engine.submit(request).await
            }
            Err(e) => Err(e),
        };

        if let Err(e) = queued {
            warn!(spec_id = %id, error = %e, "specification could not be queued");
            let request = SpecExecutionRequest::unplanned(specification);
            self.observer
                .spec_finished(&request, SpecResults::aborted(&id, 1, e.to_string()));
        }
    }
}

#[async_trait]
impl MessageListener for EngineController {
    async fn handle(&self, message: &Message) {
        match message {
            Message::RunSpec { specification } => self.run_spec(specification.clone()).await,
            Message::CancelAll => {
                if let Err(e) = self.engine.cancel_all().await {
                    debug!(error = %e, "cancel ignored");
                }
            }
            _ => {}
        }
    }
}

/// Batch mode: queues a whole batch and answers with every terminal record.
pub struct BatchController {
    engine: Arc<SpecificationEngine>,
    observer: Arc<dyn BatchObserver>,
    bus: EventAggregator,
}

impl BatchController {
    pub fn new(
        engine: Arc<SpecificationEngine>,
        observer: Arc<dyn BatchObserver>,
        bus: EventAggregator,
    ) -> Self {
        Self {
            engine,
            observer,
            bus,
        }
    }

    /// Each node is bound to the execution queued for it, so a batch that
    /// repeats an earlier one waits for its own results.
    async fn run_batch(&self, specifications: &[Specification]) {
        let mut nodes: Vec<SpecNode> = Vec::with_capacity(specifications.len());

        for specification in specifications {
            match self.engine.enqueue(specification.clone()).await {
                Ok(request) => nodes.push(request.node()),
                Err(e) => {
                    warn!(spec_id = %specification.id, error = %e, "specification could not be queued");
                    let request = SpecExecutionRequest::unplanned(specification.clone());
                    let results = SpecResults::aborted(&specification.id, 1, e.to_string());
                    nodes.push(request.node());
                    self.observer.spec_handled(&request, &results).await;
                }
            }
        }

        // Off the dispatcher: resolves once every node is handled.
        let observer = Arc::clone(&self.observer);
        let bus = self.bus.clone();
        tokio::spawn(async move {
            let records = observer.monitor_batch(nodes).await;
            bus.send(Message::BatchRunResponse { records });
        });
    }
}

#[async_trait]
impl MessageListener for BatchController {
    async fn handle(&self, message: &Message) {
        match message {
            Message::BatchRunRequest { specifications } => self.run_batch(specifications).await,
            Message::CancelAll => {
                if let Err(e) = self.engine.cancel_all().await {
                    debug!(error = %e, "cancel ignored");
                }
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::BatchRecorder;
    use crate::runner::{BatchRunner, RetryPolicy};
    use crate::stop_conditions::StopConditions;
    use crate::system::NulloSystem;
    use storyline_model::FixtureCatalog;
    use tokio::sync::mpsc;

    struct Forward(mpsc::UnboundedSender<Message>);

    #[async_trait]
    impl MessageListener for Forward {
        async fn handle(&self, message: &Message) {
            let _ = self.0.send(message.clone());
        }
    }

    #[tokio::test]
    async fn test_batch_request_answers_with_every_record() {
        let bus = EventAggregator::start();
        let recorder: Arc<dyn BatchObserver> = Arc::new(BatchRecorder::new());
        let runner = Arc::new(BatchRunner::new(
            Arc::clone(&recorder),
            RetryPolicy::new(StopConditions::default()),
        ));
        let engine = Arc::new(SpecificationEngine::new(
            Arc::new(NulloSystem),
            FixtureCatalog::new(),
            runner,
        ));
        engine.start(StopConditions::default()).await.unwrap();

        let (tx, mut rx) = mpsc::unbounded_channel();
        bus.subscribe(Arc::new(BatchController::new(
            Arc::clone(&engine),
            recorder,
            bus.clone(),
        )));
        bus.subscribe(Arc::new(Forward(tx)));

        bus.send(Message::BatchRunRequest {
            specifications: vec![Specification::new("a", "A"), Specification::new("b", "B")],
        });

        let records = loop {
            match rx.recv().await {
                Some(Message::BatchRunResponse { records }) => break records,
                Some(_) => continue,
                None => panic!("bus closed before the batch response"),
            }
        };
        let ids: Vec<&str> = records.iter().map(|r| r.specification_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        engine.shutdown().await;
    }
}
