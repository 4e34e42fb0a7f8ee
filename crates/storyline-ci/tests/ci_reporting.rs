//! CI reporting around batch observers and a full isolated batch run.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use storyline_ci::{ci_decorator, CiBatchObserver, CiGate, CiOutcome, CiSink, CollectingSink};
use storyline_engine::{
    BatchObserver, BatchRecord, BatchRecorder, EngineMode, Message, Project, RemoteListener,
    RemoteProxy, SpecExecutionRequest, SpecResults, SystemRegistry,
};
use storyline_model::{
    Fixture, FixtureCatalog, GrammarSet, Lifecycle, Section, SpecNode, Specification, Step,
};

type Log = Arc<Mutex<Vec<String>>>;

struct LoggingObserver {
    log: Log,
    inner: BatchRecorder,
}

#[async_trait]
impl BatchObserver for LoggingObserver {
    async fn spec_requeued(&self, request: &SpecExecutionRequest, results: &SpecResults) {
        self.log.lock().unwrap().push("inner requeued".into());
        self.inner.spec_requeued(request, results).await;
    }

    async fn spec_handled(&self, request: &SpecExecutionRequest, results: &SpecResults) {
        self.log.lock().unwrap().push("inner handled".into());
        self.inner.spec_handled(request, results).await;
    }

    async fn monitor_batch(&self, nodes: Vec<SpecNode>) -> Vec<BatchRecord> {
        self.inner.monitor_batch(nodes).await
    }
}

struct LoggingSink(Log);

impl CiSink for LoggingSink {
    fn report(&self, outcome: CiOutcome) {
        self.0.lock().unwrap().push(format!("sink {}", outcome.name()));
    }
}

#[tokio::test]
async fn test_inner_observer_is_called_before_the_sink() {
    let log: Log = Arc::default();
    let observer = CiBatchObserver::new(
        LoggingObserver {
            log: Arc::clone(&log),
            inner: BatchRecorder::new(),
        },
        Arc::new(LoggingSink(Arc::clone(&log))),
    );
    let request = SpecExecutionRequest::unplanned(Specification::new("s1", "Spec"));

    observer
        .spec_requeued(&request, &SpecResults::aborted("s1", 1, "flaky"))
        .await;
    observer
        .spec_handled(&request, &SpecResults::aborted("s1", 2, "flaky"))
        .await;

    assert_eq!(
        *log.lock().unwrap(),
        vec!["inner requeued", "inner handled", "sink Spec"]
    );
    assert_eq!(observer.inner().inner.len().await, 1);
}

#[derive(Default)]
struct CheckFixture;

impl Fixture for CheckFixture {
    fn key(&self) -> &str {
        "Check"
    }

    fn grammars(&self) -> anyhow::Result<GrammarSet> {
        Ok(GrammarSet::new()
            .sentence("Pass", "Pass", |_, _| Ok(None))
            .sentence("Fail", "Fail", |_, _| anyhow::bail!("assertion failed")))
    }
}

fn spec(id: &str, name: &str, lifecycle: Lifecycle, grammar: &str) -> Specification {
    Specification::new(id, name)
        .with_lifecycle(lifecycle)
        .section(Section::new("Check").step(Step::new(grammar)))
}

#[tokio::test]
async fn test_isolated_batch_reports_to_ci() {
    let sink = Arc::new(CollectingSink::new());
    let mut proxy = RemoteProxy::new(
        SystemRegistry::new(),
        FixtureCatalog::new().with_fixture::<CheckFixture>(),
    )
    .with_batch_decorator(ci_decorator(sink.clone()));
    let (listener, mut rx) = RemoteListener::channel();

    proxy
        .start(EngineMode::Batch, Project::default(), listener)
        .unwrap();

    let batch = Message::BatchRunRequest {
        specifications: vec![
            spec("a", "Passing regression", Lifecycle::Regression, "Pass"),
            spec("b", "Draft 'login'", Lifecycle::Acceptance, "Fail"),
            spec("c", "Broken checkout", Lifecycle::Regression, "Fail"),
        ],
    };
    proxy.send_message(&batch.to_json().unwrap()).unwrap();

    let records = loop {
        let json = tokio::time::timeout(Duration::from_secs(10), rx.recv())
            .await
            .unwrap()
            .unwrap();
        match Message::from_json(&json).unwrap() {
            Message::SystemRecycled(recycled) => assert!(recycled.success),
            Message::BatchRunResponse { records } => break records,
            _ => {}
        }
    };
    proxy.dispose();

    let outcomes = sink.outcomes();
    assert_eq!(outcomes.len(), 3);
    assert!(matches!(&outcomes[0], CiOutcome::Finished { name, .. } if name == "Passing regression"));
    assert!(matches!(&outcomes[1], CiOutcome::Ignored { name, message }
        if name == "Draft |'login|'" && message.starts_with("Acceptance test failed: ")));
    assert!(matches!(&outcomes[2], CiOutcome::Failed { name, .. } if name == "Broken checkout"));

    let verdict = CiGate::evaluate(&records);
    assert!(!verdict.passed);
    assert_eq!(verdict.violations, vec!["Broken checkout".to_string()]);
    assert_eq!(verdict.ignored, 1);
}
