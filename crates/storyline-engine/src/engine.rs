//! The specification engine.
//!
//! Owns the system under test and a single worker task that drains the
//! execution queue. Each step runs on a blocking task so user code cannot
//! stall the runtime; a panicking step becomes an exception and ends its
//! specification. Stop conditions bound startup, individual specifications
//! and the run as a whole. Once the run is halted, every request still
//! queued gets a terminal aborted result.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use storyline_model::{
    Counts, FixtureCatalog, FixtureLibrary, FixtureModel, Specification, StepResult, StepStatus,
};
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn, Instrument};

use crate::error::{EngineError, Result};
use crate::metrics::EngineMetrics;
use crate::obs;
use crate::request::SpecExecutionRequest;
use crate::results::SpecResults;
use crate::runner::{Completion, Runner};
use crate::stop_conditions::StopConditions;
use crate::system::SystemUnderTest;

/// Which runner/observer pair drives the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineMode {
    Interactive,
    Batch,
}

/// What a successful start produced.
#[derive(Debug, Clone)]
pub struct EngineStarted {
    pub system_name: String,
    pub fixtures: Vec<FixtureModel>,
}

enum WorkItem {
    Run(SpecExecutionRequest),
    CancelAll,
}

struct Running {
    library: Arc<FixtureLibrary>,
    queue: mpsc::UnboundedSender<WorkItem>,
    cancel: watch::Sender<bool>,
    worker: JoinHandle<()>,
}

enum EngineState {
    Idle,
    Running(Running),
    Stopped,
}

pub struct SpecificationEngine {
    system: Arc<dyn SystemUnderTest>,
    catalog: FixtureCatalog,
    runner: Arc<dyn Runner>,
    metrics: Arc<EngineMetrics>,
    state: Mutex<EngineState>,
}

impl SpecificationEngine {
    pub fn new(
        system: Arc<dyn SystemUnderTest>,
        catalog: FixtureCatalog,
        runner: Arc<dyn Runner>,
    ) -> Self {
        Self {
            system,
            catalog,
            runner,
            metrics: Arc::new(EngineMetrics::new()),
            state: Mutex::new(EngineState::Idle),
        }
    }

    pub fn system_name(&self) -> &str {
        self.system.name()
    }

    pub fn metrics(&self) -> &EngineMetrics {
        &self.metrics
    }

    /// Warm up the system, compile the fixture library and start the worker.
    pub async fn start(&self, stop: StopConditions) -> Result<EngineStarted> {
        let mut state = self.state.lock().await;
        if !matches!(*state, EngineState::Idle) {
            return Err(EngineError::AlreadyStarted);
        }

        let system = self.system.name().to_string();
        let warmup = self.system.warmup();
        let warmed = match stop.startup_timeout() {
            Some(limit) => tokio::time::timeout(limit, warmup).await.map_err(|_| {
                EngineError::StartupTimeout {
                    system: system.clone(),
                    limit_secs: limit.as_secs(),
                }
            })?,
            None => warmup.await,
        };
        warmed.map_err(|e| EngineError::Startup {
            system: system.clone(),
            reason: format!("{:#}", e),
        })?;

        let started = Instant::now();
        let library =
            Arc::new(FixtureLibrary::compile(&self.catalog, self.system.cell_handling()).await);
        obs::emit_fixtures_compiled(
            library.len(),
            library.invalid_count(),
            started.elapsed().as_millis() as u64,
        );

        let (queue, rx) = mpsc::unbounded_channel();
        let (cancel, cancel_rx) = watch::channel(false);
        let worker = Worker {
            system: Arc::clone(&self.system),
            runner: Arc::clone(&self.runner),
            metrics: Arc::clone(&self.metrics),
            stop,
            rx,
            cancel: cancel_rx,
            pending: VecDeque::new(),
            failures: 0,
            halted: None,
        };
        let worker = tokio::spawn(worker.run());

        let fixtures = library.models().values().cloned().collect();
        *state = EngineState::Running(Running {
            library,
            queue,
            cancel,
            worker,
        });

        info!(system = %system, "specification engine started");
        Ok(EngineStarted {
            system_name: system,
            fixtures,
        })
    }

    /// Plan `specification` against the fixture library and queue it.
    pub async fn enqueue(&self, specification: Specification) -> Result<SpecExecutionRequest> {
        let request = self.prepare(specification).await?;
        self.submit(request.clone()).await?;
        Ok(request)
    }

    /// Plan `specification` without queueing it.
    pub async fn prepare(&self, specification: Specification) -> Result<SpecExecutionRequest> {
        match &*self.state.lock().await {
            EngineState::Running(running) => {
                let plan = running.library.create_plan(&specification);
                Ok(SpecExecutionRequest::new(specification, plan))
            }
            _ => Err(EngineError::NotRunning),
        }
    }

    /// Queue a prepared request.
    pub async fn submit(&self, request: SpecExecutionRequest) -> Result<()> {
        let state = self.state.lock().await;
        let EngineState::Running(running) = &*state else {
            return Err(EngineError::NotRunning);
        };
        debug!(
            spec_id = %request.specification_id(),
            attempt = request.attempts,
            "specification queued"
        );
        running
            .queue
            .send(WorkItem::Run(request))
            .map_err(|_| EngineError::NotRunning)
    }

    /// Abort every queued request. The running one finishes normally.
    pub async fn cancel_all(&self) -> Result<()> {
        let state = self.state.lock().await;
        match &*state {
            EngineState::Running(running) => running
                .queue
                .send(WorkItem::CancelAll)
                .map_err(|_| EngineError::NotRunning),
            _ => Err(EngineError::NotRunning),
        }
    }

    pub async fn library(&self) -> Option<Arc<FixtureLibrary>> {
        match &*self.state.lock().await {
            EngineState::Running(running) => Some(Arc::clone(&running.library)),
            _ => None,
        }
    }

    pub async fn is_running(&self) -> bool {
        matches!(*self.state.lock().await, EngineState::Running(_))
    }

    /// Stop the worker and dispose the system. Idempotent, and safe after a
    /// failed start.
    pub async fn shutdown(&self) {
        let previous = {
            let mut state = self.state.lock().await;
            std::mem::replace(&mut *state, EngineState::Stopped)
        };

        match previous {
            EngineState::Stopped => return,
            EngineState::Idle => {}
            EngineState::Running(running) => {
                let _ = running.cancel.send(true);
                drop(running.queue);
                if let Err(e) = running.worker.await {
                    warn!(error = %e, "engine worker ended abnormally");
                }
            }
        }

        if let Err(e) = self.system.dispose().await {
            warn!(system = %self.system.name(), error = %e, "system dispose failed");
        }
        self.metrics.flush(self.system.name());
        info!(system = %self.system.name(), "specification engine stopped");
    }
}

struct Worker {
    system: Arc<dyn SystemUnderTest>,
    runner: Arc<dyn Runner>,
    metrics: Arc<EngineMetrics>,
    stop: StopConditions,
    rx: mpsc::UnboundedReceiver<WorkItem>,
    cancel: watch::Receiver<bool>,
    pending: VecDeque<SpecExecutionRequest>,
    failures: u32,
    /// Reason no new execution is issued any more.
    halted: Option<String>,
}

impl Worker {
    async fn run(mut self) {
        let mut closed = false;

        loop {
            if *self.cancel.borrow() {
                self.halt("engine stopped").await;
                break;
            }

            while let Ok(item) = self.rx.try_recv() {
                self.accept(item).await;
            }

            let Some(request) = self.pending.pop_front() else {
                if closed {
                    break;
                }
                tokio::select! {
                    item = self.rx.recv() => match item {
                        Some(item) => self.accept(item).await,
                        None => closed = true,
                    },
                    _ = self.cancel.changed() => {}
                }
                continue;
            };

            let span = obs::spec_span(request.specification_id(), request.attempts);
            let results = self.execute(&request).instrument(span).await;
            self.metrics.inc_executed();

            let failed = !results.was_successful();
            match self.runner.complete(request, results).await {
                Completion::Requeue(request) => {
                    self.metrics.inc_requeued();
                    self.pending.push_back(request);
                }
                Completion::Finished => {
                    if failed {
                        self.failures += 1;
                    }
                }
            }

            if self.halted.is_none() && self.stop.failures_exceeded(self.failures) {
                warn!(failures = self.failures, "maximum failures reached, halting run");
                self.halt("maximum failures reached").await;
            }
        }
    }

    async fn accept(&mut self, item: WorkItem) {
        match item {
            WorkItem::Run(request) => match self.halted.clone() {
                Some(reason) => self.abort(request, &reason).await,
                None => self.pending.push_back(request),
            },
            WorkItem::CancelAll => {
                let queued: Vec<_> = self.pending.drain(..).collect();
                for request in queued {
                    self.abort(request, "cancelled").await;
                }
            }
        }
    }

    /// Stop issuing executions and abort everything queued.
    async fn halt(&mut self, reason: &str) {
        self.halted = Some(reason.to_string());
        let queued: Vec<_> = self.pending.drain(..).collect();
        for request in queued {
            self.abort(request, reason).await;
        }
        while let Ok(item) = self.rx.try_recv() {
            self.accept(item).await;
        }
    }

    async fn abort(&self, request: SpecExecutionRequest, reason: &str) {
        self.metrics.inc_aborted();
        let results = SpecResults::aborted(request.specification_id(), request.attempts, reason);
        self.runner.abort(request, results).await;
    }

    async fn execute(&self, request: &SpecExecutionRequest) -> SpecResults {
        let started = Instant::now();
        let spec_id = request.specification_id().to_string();
        self.runner.spec_started(request).await;

        let mut counts = Counts::default();
        let mut steps: Vec<StepResult> = Vec::new();
        let mut aborted = false;
        let mut error = None;

        let mut context = match self.system.create_context(&request.specification) {
            Ok(context) => Some(context),
            Err(e) => {
                let message = format!("context could not be created: {:#}", e);
                warn!(spec_id = %spec_id, error = %message, "execution aborted");
                return SpecResults {
                    specification_id: spec_id,
                    counts: Counts::new(0, 0, 1, 0),
                    duration_ms: started.elapsed().as_millis() as u64,
                    attempts: request.attempts,
                    steps,
                    reports: Vec::new(),
                    aborted: true,
                    error: Some(message),
                };
            }
        };

        let deadline = self
            .stop
            .spec_timeout()
            .map(|limit| (tokio::time::Instant::now() + limit, limit));

        for plan in request.plan.steps.iter().cloned() {
            let Some(mut ctx) = context.take() else {
                break;
            };
            let step_id = plan.id().to_string();
            let attempt = request.attempts;
            let span_id = spec_id.clone();

            let handle = tokio::task::spawn_blocking(move || {
                let _span = obs::SpecSpan::enter(&span_id, attempt);
                let result = plan.execute(&mut ctx);
                (ctx, result)
            });

            let joined = match deadline {
                Some((at, limit)) => match tokio::time::timeout_at(at, handle).await {
                    Ok(joined) => joined,
                    Err(_) => {
                        let message =
                            format!("specification timed out after {}s", limit.as_secs());
                        let result = StepResult::new(
                            &step_id,
                            StepStatus::Error {
                                message: message.clone(),
                            },
                        );
                        self.record(request, &mut counts, &mut steps, result).await;
                        aborted = true;
                        error = Some(message);
                        break;
                    }
                },
                None => handle.await,
            };

            match joined {
                Ok((returned, result)) => {
                    context = Some(returned);
                    self.record(request, &mut counts, &mut steps, result).await;
                    if self.stop.should_break(&counts) {
                        debug!(spec_id = %spec_id, "break condition met");
                        break;
                    }
                }
                Err(e) => {
                    let message = if e.is_panic() {
                        panic_message(e.into_panic())
                    } else {
                        e.to_string()
                    };
                    let result = StepResult::new(
                        &step_id,
                        StepStatus::Error {
                            message: format!("step panicked: {}", message),
                        },
                    );
                    self.record(request, &mut counts, &mut steps, result).await;
                    aborted = true;
                    error = Some(format!("step '{}' panicked", step_id));
                    break;
                }
            }
        }

        let reports = context
            .as_mut()
            .map(|ctx| ctx.take_reports())
            .unwrap_or_default();

        SpecResults {
            specification_id: spec_id,
            counts,
            duration_ms: started.elapsed().as_millis() as u64,
            attempts: request.attempts,
            steps,
            reports,
            aborted,
            error,
        }
    }

    async fn record(
        &self,
        request: &SpecExecutionRequest,
        counts: &mut Counts,
        steps: &mut Vec<StepResult>,
        result: StepResult,
    ) {
        counts.tally(&result.status);
        self.runner.step_completed(request, &result).await;
        steps.push(result);
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
