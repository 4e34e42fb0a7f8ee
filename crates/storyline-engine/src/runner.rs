//! Runners: how each execution mode reacts to execution lifecycle events.
//!
//! - [`InstrumentedRunner`] (interactive) streams progress to the UI
//! - [`BatchRunner`] (batch) applies the retry policy and reports terminal
//!   results to a [`BatchObserver`]

use std::sync::Arc;

use async_trait::async_trait;
use storyline_model::StepResult;

use crate::batch::BatchObserver;
use crate::messaging::{EventAggregator, Message};
use crate::obs;
use crate::request::SpecExecutionRequest;
use crate::results::SpecResults;
use crate::stop_conditions::StopConditions;

/// What to do with a request after an execution finished.
#[derive(Debug)]
pub enum Completion {
    /// Run it again.
    Requeue(SpecExecutionRequest),
    Finished,
}

#[async_trait]
pub trait Runner: Send + Sync {
    async fn spec_started(&self, request: &SpecExecutionRequest);

    async fn step_completed(&self, request: &SpecExecutionRequest, result: &StepResult);

    /// An execution ended; decide between requeue and terminal reporting.
    async fn complete(&self, request: SpecExecutionRequest, results: SpecResults) -> Completion;

    /// The request will not run again; report `results` as terminal.
    async fn abort(&self, request: SpecExecutionRequest, results: SpecResults);
}

/// Bounded retry.
///
/// Attempts are one-based and the bound is inclusive: a failed execution is
/// requeued while `attempts < max_attempts`, so a specification runs at most
/// `max_attempts` times.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    stop: StopConditions,
}

impl RetryPolicy {
    pub fn new(stop: StopConditions) -> Self {
        Self { stop }
    }

    pub fn max_attempts_for(&self, request: &SpecExecutionRequest) -> u32 {
        self.stop.max_attempts_for(&request.specification)
    }

    pub fn should_requeue(&self, request: &SpecExecutionRequest, results: &SpecResults) -> bool {
        !results.was_successful() && request.attempts < self.max_attempts_for(request)
    }
}

impl From<&StopConditions> for RetryPolicy {
    fn from(stop: &StopConditions) -> Self {
        Self::new(stop.clone())
    }
}

pub struct BatchRunner {
    observer: Arc<dyn BatchObserver>,
    policy: RetryPolicy,
}

impl BatchRunner {
    pub fn new(observer: Arc<dyn BatchObserver>, policy: RetryPolicy) -> Self {
        Self { observer, policy }
    }
}

#[async_trait]
impl Runner for BatchRunner {
    async fn spec_started(&self, request: &SpecExecutionRequest) {
        obs::emit_spec_started(request.specification_id(), request.attempts);
    }

    async fn step_completed(&self, _request: &SpecExecutionRequest, _result: &StepResult) {}

    async fn complete(&self, request: SpecExecutionRequest, results: SpecResults) -> Completion {
        if self.policy.should_requeue(&request, &results) {
            obs::emit_spec_requeued(
                request.specification_id(),
                request.attempts,
                self.policy.max_attempts_for(&request),
            );
            self.observer.spec_requeued(&request, &results).await;
            return Completion::Requeue(request.requeued());
        }

        obs::emit_spec_handled(
            request.specification_id(),
            request.attempts,
            results.was_successful(),
        );
        self.observer.spec_handled(&request, &results).await;
        Completion::Finished
    }

    async fn abort(&self, request: SpecExecutionRequest, results: SpecResults) {
        obs::emit_spec_handled(request.specification_id(), request.attempts, false);
        self.observer.spec_handled(&request, &results).await;
    }
}

/// Interactive observer: turns lifecycle events into UI messages.
#[derive(Debug, Clone)]
pub struct UserInterfaceObserver {
    bus: EventAggregator,
}

impl UserInterfaceObserver {
    pub fn new(bus: EventAggregator) -> Self {
        Self { bus }
    }

    pub fn spec_queued(&self, request: &SpecExecutionRequest) {
        self.bus.send(Message::SpecQueued {
            id: request.specification.id.clone(),
            name: request.specification.name.clone(),
        });
    }

    pub fn spec_started(&self, request: &SpecExecutionRequest) {
        self.bus.send(Message::SpecExecutionStarted {
            id: request.specification.id.clone(),
            attempt: request.attempts,
        });
    }

    pub fn step_completed(&self, request: &SpecExecutionRequest, result: &StepResult) {
        self.bus.send(Message::StepProgress {
            id: request.specification.id.clone(),
            step: result.clone(),
        });
    }

    pub fn spec_finished(&self, request: &SpecExecutionRequest, results: SpecResults) {
        self.bus.send(Message::SpecExecutionCompleted {
            id: request.specification.id.clone(),
            results,
        });
    }
}

pub struct InstrumentedRunner {
    observer: UserInterfaceObserver,
}

impl InstrumentedRunner {
    pub fn new(observer: UserInterfaceObserver) -> Self {
        Self { observer }
    }
}

#[async_trait]
impl Runner for InstrumentedRunner {
    async fn spec_started(&self, request: &SpecExecutionRequest) {
        obs::emit_spec_started(request.specification_id(), request.attempts);
        self.observer.spec_started(request);
    }

    async fn step_completed(&self, request: &SpecExecutionRequest, result: &StepResult) {
        self.observer.step_completed(request, result);
    }

    async fn complete(&self, request: SpecExecutionRequest, results: SpecResults) -> Completion {
        self.observer.spec_finished(&request, results);
        Completion::Finished
    }

    async fn abort(&self, request: SpecExecutionRequest, results: SpecResults) {
        self.observer.spec_finished(&request, results);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::BatchRecorder;
    use storyline_model::{Counts, Specification};

    fn failed(attempts: u32) -> SpecResults {
        SpecResults {
            specification_id: "s1".into(),
            counts: Counts::new(0, 1, 0, 0),
            duration_ms: 0,
            attempts,
            steps: Vec::new(),
            reports: Vec::new(),
            aborted: false,
            error: None,
        }
    }

    #[test]
    fn test_retry_policy_bound_is_inclusive() {
        let policy = RetryPolicy::new(StopConditions {
            max_attempts: 3,
            ..Default::default()
        });
        let request = SpecExecutionRequest::unplanned(Specification::new("s1", "Spec"));
        assert!(policy.should_requeue(&request, &failed(1)));
        let request = request.requeued();
        assert!(policy.should_requeue(&request, &failed(2)));
        let request = request.requeued();
        assert!(!policy.should_requeue(&request, &failed(3)));
    }

    #[test]
    fn test_success_is_never_requeued() {
        let policy = RetryPolicy::new(StopConditions {
            max_attempts: 3,
            ..Default::default()
        });
        let request = SpecExecutionRequest::unplanned(Specification::new("s1", "Spec"));
        let mut ok = failed(1);
        ok.counts = Counts::new(1, 0, 0, 0);
        assert!(!policy.should_requeue(&request, &ok));
    }

    #[tokio::test]
    async fn test_batch_runner_requeue_then_handle() {
        let recorder = Arc::new(BatchRecorder::new());
        let runner = BatchRunner::new(
            recorder.clone(),
            RetryPolicy::new(StopConditions {
                max_attempts: 2,
                ..Default::default()
            }),
        );
        let request = SpecExecutionRequest::unplanned(Specification::new("s1", "Spec"));

        let request = match runner.complete(request, failed(1)).await {
            Completion::Requeue(request) => request,
            Completion::Finished => panic!("expected a requeue"),
        };
        assert_eq!(request.attempts, 2);
        assert!(matches!(
            runner.complete(request, failed(2)).await,
            Completion::Finished
        ));

        assert_eq!(recorder.requeues().await, 1);
        assert_eq!(recorder.record("s1").await.unwrap().final_attempt, 2);
    }
}
