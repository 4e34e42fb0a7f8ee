//! Batch retry policy and max-failure halting through a running engine.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use storyline_engine::{
    BatchObserver, BatchRecord, BatchRecorder, BatchRunner, NulloSystem, RetryPolicy,
    SpecExecutionRequest, SpecResults, SpecificationEngine, StopConditions,
};
use storyline_model::{
    Fixture, FixtureCandidate, FixtureCatalog, GrammarSet, Section, SpecNode, Specification, Step,
};
use tokio::sync::Mutex;

/// Fails its only step until it has been called `fail_until` times.
struct FlakyFixture {
    calls: Arc<AtomicU32>,
    fail_until: u32,
}

impl Fixture for FlakyFixture {
    fn key(&self) -> &str {
        "Flaky"
    }

    fn grammars(&self) -> anyhow::Result<GrammarSet> {
        let calls = Arc::clone(&self.calls);
        let fail_until = self.fail_until;
        Ok(GrammarSet::new().sentence("Attempt", "Attempt the flaky call", move |_, _| {
            let call = calls.fetch_add(1, Ordering::SeqCst) + 1;
            if call <= fail_until {
                anyhow::bail!("transient failure on call {}", call);
            }
            Ok(None)
        }))
    }
}

fn flaky_catalog(fail_until: u32) -> (FixtureCatalog, Arc<AtomicU32>) {
    let calls = Arc::new(AtomicU32::new(0));
    let shared = Arc::clone(&calls);
    let catalog = FixtureCatalog::new().with(FixtureCandidate::new("app::FlakyFixture", move || {
        Ok(Box::new(FlakyFixture {
            calls: Arc::clone(&shared),
            fail_until,
        }))
    }));
    (catalog, calls)
}

fn flaky_spec(id: &str) -> Specification {
    Specification::new(id, format!("Flaky {}", id))
        .section(Section::new("Flaky").step(Step::new("Attempt")))
}

async fn run_batch(
    catalog: FixtureCatalog,
    stop: StopConditions,
    observer: Arc<dyn BatchObserver>,
    specs: Vec<Specification>,
) -> Vec<BatchRecord> {
    let runner = Arc::new(BatchRunner::new(
        Arc::clone(&observer),
        RetryPolicy::from(&stop),
    ));
    let engine = SpecificationEngine::new(Arc::new(NulloSystem), catalog, runner);
    engine.start(stop).await.unwrap();

    let nodes: Vec<SpecNode> = specs.iter().map(Specification::node).collect();
    for spec in specs {
        engine.enqueue(spec).await.unwrap();
    }
    let records = observer.monitor_batch(nodes).await;
    engine.shutdown().await;
    records
}

#[tokio::test]
async fn test_transient_failures_are_retried_until_success() {
    let (catalog, calls) = flaky_catalog(2);
    let recorder = Arc::new(BatchRecorder::new());
    let stop = StopConditions {
        max_attempts: 3,
        ..Default::default()
    };

    let records = run_batch(catalog, stop, recorder.clone(), vec![flaky_spec("s1")]).await;

    assert_eq!(records.len(), 1);
    assert!(records[0].was_successful());
    assert_eq!(records[0].final_attempt, 3);
    assert_eq!(records[0].results.attempts, 3);
    assert_eq!(recorder.requeues().await, 2);
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_exhausted_attempts_report_the_last_failure() {
    let (catalog, calls) = flaky_catalog(u32::MAX);
    let recorder = Arc::new(BatchRecorder::new());
    let stop = StopConditions {
        max_attempts: 3,
        ..Default::default()
    };

    let records = run_batch(catalog, stop, recorder.clone(), vec![flaky_spec("s1")]).await;

    assert!(!records[0].was_successful());
    assert_eq!(records[0].final_attempt, 3);
    assert_eq!(records[0].results.counts.exceptions, 1);
    assert_eq!(recorder.requeues().await, 2);
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_specification_max_attempts_overrides_stop_conditions() {
    let (catalog, calls) = flaky_catalog(u32::MAX);
    let recorder = Arc::new(BatchRecorder::new());
    let stop = StopConditions {
        max_attempts: 5,
        ..Default::default()
    };

    let spec = flaky_spec("s1").with_max_attempts(1);
    let records = run_batch(catalog, stop, recorder.clone(), vec![spec]).await;

    assert_eq!(records[0].final_attempt, 1);
    assert_eq!(recorder.requeues().await, 0);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_max_failures_aborts_queued_specs_but_records_every_node() {
    let (catalog, calls) = flaky_catalog(u32::MAX);
    let recorder = Arc::new(BatchRecorder::new());
    let stop = StopConditions {
        max_failures: Some(1),
        ..Default::default()
    };

    let specs = vec![flaky_spec("a"), flaky_spec("b"), flaky_spec("c")];
    let records = run_batch(catalog, stop, recorder.clone(), specs).await;

    let ids: Vec<&str> = records.iter().map(|r| r.specification_id.as_str()).collect();
    assert_eq!(ids, vec!["a", "b", "c"]);
    assert!(!records[0].results.aborted);
    assert!(records[1].results.aborted);
    assert!(records[2].results.aborted);
    assert!(records.iter().all(|r| !r.was_successful()));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

/// Records the order of observer notifications.
#[derive(Default)]
struct Sequenced {
    inner: BatchRecorder,
    events: Mutex<Vec<String>>,
}

#[async_trait]
impl BatchObserver for Sequenced {
    async fn spec_requeued(&self, request: &SpecExecutionRequest, results: &SpecResults) {
        self.events
            .lock()
            .await
            .push(format!("requeued {}#{}", request.specification_id(), request.attempts));
        self.inner.spec_requeued(request, results).await;
    }

    async fn spec_handled(&self, request: &SpecExecutionRequest, results: &SpecResults) {
        self.events
            .lock()
            .await
            .push(format!("handled {}#{}", request.specification_id(), request.attempts));
        self.inner.spec_handled(request, results).await;
    }

    async fn monitor_batch(&self, nodes: Vec<SpecNode>) -> Vec<BatchRecord> {
        self.inner.monitor_batch(nodes).await
    }
}

#[tokio::test]
async fn test_requeues_are_observed_before_handled() {
    let (catalog, _) = flaky_catalog(1);
    let observer = Arc::new(Sequenced::default());
    let stop = StopConditions {
        max_attempts: 2,
        ..Default::default()
    };

    run_batch(catalog, stop, observer.clone(), vec![flaky_spec("s1")]).await;

    assert_eq!(
        *observer.events.lock().await,
        vec!["requeued s1#1".to_string(), "handled s1#2".to_string()]
    );
}
