//! The isolation boundary.
//!
//! [`RemoteProxy`] runs the engine on a dedicated OS thread with its own
//! tokio runtime. Only JSON strings cross: commands go in through an
//! unbounded channel, events come out through the host's [`RemoteListener`].
//! Every startup failure is reported as exactly one `SystemRecycled` message
//! with `success: false`; `start` itself only fails on misuse. A `Dispose`
//! that arrives while the system is still starting abandons the startup.

use std::sync::Arc;
use std::thread;

use storyline_model::FixtureCatalog;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::batch::{BatchObserver, BatchRecorder};
use crate::controller::{BatchController, EngineController};
use crate::engine::{EngineMode, EngineStarted, SpecificationEngine};
use crate::error::RemoteError;
use crate::messaging::{EventAggregator, Message, MessageListener, RemoteListener, SystemRecycled};
use crate::obs;
use crate::project::Project;
use crate::runner::{BatchRunner, InstrumentedRunner, RetryPolicy, Runner, UserInterfaceObserver};
use crate::system::{SystemCandidate, SystemRegistry, SystemUnderTest};
use crate::telemetry;

/// Wraps the base batch observer, e.g. to add CI reporting.
pub type BatchDecorator =
    Arc<dyn Fn(Arc<dyn BatchObserver>) -> Arc<dyn BatchObserver> + Send + Sync>;

enum Command {
    Message(String),
    Dispose,
}

enum ProxyState {
    Idle,
    Running {
        commands: mpsc::UnboundedSender<Command>,
        thread: thread::JoinHandle<()>,
    },
    Disposed,
}

/// Host-side handle to an isolated engine.
pub struct RemoteProxy {
    systems: SystemRegistry,
    catalog: FixtureCatalog,
    decorator: Option<BatchDecorator>,
    state: ProxyState,
}

impl RemoteProxy {
    pub fn new(systems: SystemRegistry, catalog: FixtureCatalog) -> Self {
        Self {
            systems,
            catalog,
            decorator: None,
            state: ProxyState::Idle,
        }
    }

    /// Decorate the batch observer used in [`EngineMode::Batch`].
    pub fn with_batch_decorator<F>(mut self, decorator: F) -> Self
    where
        F: Fn(Arc<dyn BatchObserver>) -> Arc<dyn BatchObserver> + Send + Sync + 'static,
    {
        self.decorator = Some(Arc::new(decorator));
        self
    }

    /// Start the isolated side. The outcome arrives on `listener` as a
    /// `SystemRecycled` message.
    pub fn start(
        &mut self,
        mode: EngineMode,
        project: Project,
        listener: RemoteListener,
    ) -> Result<(), RemoteError> {
        match self.state {
            ProxyState::Idle => {}
            ProxyState::Running { .. } => return Err(RemoteError::AlreadyStarted),
            ProxyState::Disposed => return Err(RemoteError::Disposed),
        }

        let (commands, rx) = mpsc::unbounded_channel();
        let isolated = Isolated {
            mode,
            project,
            systems: self.systems.clone(),
            catalog: self.catalog.clone(),
            decorator: self.decorator.clone(),
            listener,
        };

        let thread = thread::Builder::new()
            .name("storyline-engine".to_string())
            .spawn(move || isolated.run(rx))?;

        self.state = ProxyState::Running { commands, thread };
        Ok(())
    }

    /// Forward one serialized message. Malformed JSON is rejected here.
    pub fn send_message(&self, json: &str) -> Result<(), RemoteError> {
        Message::from_json(json)?;
        match &self.state {
            ProxyState::Idle => Err(RemoteError::NotStarted),
            ProxyState::Disposed => Err(RemoteError::Disposed),
            ProxyState::Running { commands, .. } => commands
                .send(Command::Message(json.to_string()))
                .map_err(|_| RemoteError::Disposed),
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(self.state, ProxyState::Running { .. })
    }

    /// Shut the engine down and wait for the isolated thread. Blocks the
    /// caller; idempotent.
    pub fn dispose(&mut self) {
        match std::mem::replace(&mut self.state, ProxyState::Disposed) {
            ProxyState::Running { commands, thread } => {
                let _ = commands.send(Command::Dispose);
                drop(commands);
                if thread.join().is_err() {
                    warn!("isolated engine thread panicked");
                }
                info!("remote engine disposed");
            }
            ProxyState::Idle | ProxyState::Disposed => {}
        }
    }
}

impl Drop for RemoteProxy {
    fn drop(&mut self) {
        self.dispose();
    }
}

/// Everything the isolated thread owns.
struct Isolated {
    mode: EngineMode,
    project: Project,
    systems: SystemRegistry,
    catalog: FixtureCatalog,
    decorator: Option<BatchDecorator>,
    listener: RemoteListener,
}

impl Isolated {
    fn run(self, commands: mpsc::UnboundedReceiver<Command>) {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .thread_name("storyline-worker")
            .build();

        match runtime {
            Ok(runtime) => {
                runtime.block_on(self.serve(commands));
                // Abandoned startup or step tasks must not hold up disposal.
                runtime.shutdown_background();
            }
            Err(e) => {
                let error = format!("runtime could not be built: {}", e);
                obs::emit_system_recycled(false, None, Some(&error));
                self.listener
                    .send(&Message::SystemRecycled(SystemRecycled::failed(error, None)));
            }
        }
    }

    async fn serve(self, mut commands: mpsc::UnboundedReceiver<Command>) {
        telemetry::init_for_project(&self.project);

        let bus = EventAggregator::start();
        bus.subscribe(Arc::new(self.listener.clone()));

        // Messages sent during startup are held until it resolves.
        let mut early = Vec::new();
        let launched = {
            let launch = self.launch(&bus);
            tokio::pin!(launch);
            loop {
                tokio::select! {
                    outcome = &mut launch => break Some(outcome),
                    command = commands.recv() => match command {
                        Some(Command::Message(json)) => early.push(json),
                        Some(Command::Dispose) | None => break None,
                    },
                }
            }
        };

        let (engine, disposed) = match launched {
            Some(Ok(engine)) => (Some(engine), false),
            Some(Err(recycled)) => {
                report_failure(&bus, recycled);
                (None, false)
            }
            None => {
                warn!("disposed while the system was starting");
                report_failure(
                    &bus,
                    SystemRecycled::failed(
                        "engine disposed before the system finished starting",
                        self.project.system_type_name.clone(),
                    ),
                );
                (None, true)
            }
        };

        if !disposed {
            for json in early {
                forward(&bus, &json);
            }
            while let Some(command) = commands.recv().await {
                match command {
                    Command::Message(json) => forward(&bus, &json),
                    Command::Dispose => break,
                }
            }
        }

        if let Some(engine) = engine {
            engine.shutdown().await;
        }
        bus.send(Message::EngineStopped);
        bus.flush().await;
        debug!("isolated side finished");
    }

    /// Resolve, build and start the engine, announcing success on `bus`.
    async fn launch(
        &self,
        bus: &EventAggregator,
    ) -> Result<Arc<SpecificationEngine>, SystemRecycled> {
        let fail = |error: String, name: Option<String>| SystemRecycled::failed(error, name);

        self.project
            .validate()
            .map_err(|e| fail(e.to_string(), self.project.system_type_name.clone()))?;

        let candidate = self
            .systems
            .determine_system_type(self.project.system_type_name.as_deref())
            .map_err(|e| fail(e.to_string(), None))?;
        let name = candidate.type_name.clone();

        // Spawned so a panicking factory or warmup is caught as a JoinError.
        let startup = tokio::spawn(start_engine(
            candidate,
            self.mode,
            self.project.clone(),
            self.catalog.clone(),
            self.decorator.clone(),
            bus.clone(),
        ));

        match startup.await {
            Ok(Ok((engine, started))) => {
                obs::emit_system_recycled(true, Some(&started.system_name), None);
                bus.send(Message::SystemRecycled(SystemRecycled::started(
                    started.system_name,
                    started.fixtures,
                )));
                Ok(engine)
            }
            Ok(Err(error)) => Err(fail(error, Some(name))),
            Err(e) => {
                let reason = if e.is_panic() {
                    panic_message(e.into_panic())
                } else {
                    e.to_string()
                };
                Err(fail(format!("system '{}' panicked: {}", name, reason), Some(name)))
            }
        }
    }
}

fn forward(bus: &EventAggregator, json: &str) {
    if let Err(e) = bus.send_json(json) {
        warn!(error = %e, "dropping malformed message");
    }
}

fn report_failure(bus: &EventAggregator, recycled: SystemRecycled) {
    obs::emit_system_recycled(
        false,
        recycled.system_name.as_deref(),
        recycled.error.as_deref(),
    );
    bus.send(Message::SystemRecycled(recycled));
}

async fn start_engine(
    candidate: SystemCandidate,
    mode: EngineMode,
    project: Project,
    catalog: FixtureCatalog,
    decorator: Option<BatchDecorator>,
    bus: EventAggregator,
) -> Result<(Arc<SpecificationEngine>, EngineStarted), String> {
    let system = candidate.instantiate().map_err(|e| e.to_string())?;
    let system: Arc<dyn SystemUnderTest> = Arc::from(system);
    let stop = project.effective_stop_conditions();

    let (engine, controller): (Arc<SpecificationEngine>, Arc<dyn MessageListener>) = match mode {
        EngineMode::Interactive => {
            let observer = UserInterfaceObserver::new(bus.clone());
            let runner: Arc<dyn Runner> = Arc::new(InstrumentedRunner::new(observer.clone()));
            let engine = Arc::new(SpecificationEngine::new(system, catalog, runner));
            let controller = Arc::new(EngineController::new(Arc::clone(&engine), observer));
            (engine, controller)
        }
        EngineMode::Batch => {
            let base: Arc<dyn BatchObserver> =
                Arc::new(BatchRecorder::new().with_messaging(bus.clone()));
            let observer = match &decorator {
                Some(decorate) => decorate(base),
                None => base,
            };
            let runner: Arc<dyn Runner> = Arc::new(BatchRunner::new(
                Arc::clone(&observer),
                RetryPolicy::from(&stop),
            ));
            let engine = Arc::new(SpecificationEngine::new(system, catalog, runner));
            let controller = Arc::new(BatchController::new(
                Arc::clone(&engine),
                observer,
                bus.clone(),
            ));
            (engine, controller)
        }
    };

    match engine.start(stop).await {
        Ok(started) => {
            bus.subscribe(controller);
            Ok((engine, started))
        }
        Err(e) => {
            engine.shutdown().await;
            Err(e.to_string())
        }
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
