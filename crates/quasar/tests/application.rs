//! Integration tests for application supervision: startup, the
//! environment hook, graceful exit cascades, the lifetime cap, and the
//! strategy matrix on child exits.

use async_trait::async_trait;
use parking_lot::Mutex;
use quasar::{
    ApplicationBehavior, ApplicationSpec, ApplicationStrategy, EnvValue, Node, NodeError,
    NodeMonitor, NodeOptions, Pid, Process, ProcessBehavior, Term,
};
use std::sync::{Arc, Once};
use std::time::Duration;
use tokio::time::{sleep, timeout};

fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .try_init();
    });
}

/// A child that idles until it receives an exit signal.
struct Idler;

#[async_trait]
impl ProcessBehavior for Idler {
    async fn run(&self, process: Process, _args: Vec<Term>) -> String {
        tokio::select! {
            signal = process.recv_exit() => match signal {
                Some(signal) => signal.reason.as_str(),
                None => "kill".to_string(),
            },
            _ = process.context().cancelled() => "kill".to_string(),
        }
    }
}

#[derive(Default)]
struct RecordingMonitor {
    events: Mutex<Vec<(Pid, String)>>,
}

impl RecordingMonitor {
    fn reason_of(&self, pid: Pid) -> Option<String> {
        self.events
            .lock()
            .iter()
            .find(|(p, _)| *p == pid)
            .map(|(_, reason)| reason.clone())
    }

    fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }
}

impl NodeMonitor for RecordingMonitor {
    fn process_terminated(&self, pid: Pid, reason: &str) {
        self.events.lock().push((pid, reason.to_string()));
    }
}

/// Test application: two idler children under a configurable strategy.
struct TestApp {
    strategy: ApplicationStrategy,
    children: usize,
    max_time: Option<Duration>,
    env_seen: Mutex<Option<EnvValue>>,
}

impl TestApp {
    fn new(strategy: ApplicationStrategy, children: usize) -> Self {
        Self {
            strategy,
            children,
            max_time: None,
            env_seen: Mutex::new(None),
        }
    }
}

impl ApplicationBehavior for TestApp {
    fn load(&self, _args: &[Term]) -> Result<ApplicationSpec, NodeError> {
        let mut spec = ApplicationSpec::new("test_app")
            .description("supervision test application")
            .version("0.1.0")
            .env("answer", EnvValue::Int(42))
            .strategy(self.strategy);
        if let Some(max_time) = self.max_time {
            spec = spec.max_time(max_time);
        }
        for _ in 0..self.children {
            spec = spec.child(Arc::new(Idler), vec![]);
        }
        Ok(spec)
    }

    fn start(&self, process: &Process, _args: &[Term]) {
        // The environment is applied before this hook runs.
        *self.env_seen.lock() = process.get_env("answer");
    }
}

struct Fixture {
    node: Node,
    monitor: Arc<RecordingMonitor>,
    app: Process,
    children: Vec<Pid>,
}

/// Starts a node and a two-child application under `strategy`.
async fn start_app(name: &str, strategy: ApplicationStrategy) -> (Fixture, Arc<TestApp>) {
    let monitor = Arc::new(RecordingMonitor::default());
    let node = Node::start(NodeOptions::new(name).monitor(monitor.clone()));
    let behavior = Arc::new(TestApp::new(strategy, 2));

    let app = node
        .application_start(behavior.clone(), vec![])
        .await
        .unwrap();

    // Readiness is signalled before the children start; wait for them.
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    let children: Vec<Pid> = loop {
        let children: Vec<Pid> = node
            .processes()
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.pid())
            .filter(|pid| *pid != app.pid())
            .collect();
        if children.len() == 2 {
            break children;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "children did not start"
        );
        sleep(Duration::from_millis(10)).await;
    };

    (
        Fixture {
            node,
            monitor,
            app,
            children,
        },
        behavior,
    )
}

fn exit_tuple(pid: Pid, reason: &str) -> Term {
    Term::Tuple(vec![
        Term::atom("EXIT"),
        Term::Pid(pid),
        Term::atom(reason),
    ])
}

/// Simulates the monitor subsystem reporting a child exit.
async fn report_exit(fixture: &Fixture, child: Pid, reason: &str) {
    fixture
        .node
        .route(child, fixture.app.pid(), exit_tuple(child, reason))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_application_start_applies_env_and_registers_name() {
    init_tracing();
    let (fixture, behavior) = start_app("app_env@localhost", ApplicationStrategy::Temporary).await;

    // load -> env -> start hook -> ready, in that order.
    assert_eq!(*behavior.env_seen.lock(), Some(EnvValue::Int(42)));
    assert_eq!(
        fixture.node.whereis("test_app").await.unwrap(),
        Some(fixture.app.pid())
    );

    fixture.node.stop();
    fixture.node.wait_stopped().await;
}

#[tokio::test]
async fn test_graceful_exit_stops_children_with_reason() {
    init_tracing();
    let (fixture, _) = start_app("app_grace@localhost", ApplicationStrategy::Permanent).await;

    let outsider = Pid::new(quasar::Atom::new("app_grace@localhost"), 1, 1, 1);
    fixture.app.exit(outsider, "maintenance");
    sleep(Duration::from_millis(100)).await;

    // Children are stopped from the application with the received
    // reason; the application itself exits with it too.
    for child in &fixture.children {
        assert_eq!(
            fixture.monitor.reason_of(*child),
            Some("maintenance".to_string()),
            "child {:?}",
            child
        );
    }
    assert_eq!(
        fixture.monitor.reason_of(fixture.app.pid()),
        Some("maintenance".to_string())
    );
    // A graceful stop does not take the node down.
    assert!(!fixture.node.context().is_cancelled());

    fixture.node.stop();
    fixture.node.wait_stopped().await;
}

#[tokio::test]
async fn test_permanent_child_exit_stops_node() {
    init_tracing();
    for reason in ["normal", "shutdown", "crash"] {
        let name = format!("app_perm_{}@localhost", reason);
        let (fixture, _) = start_app(&name, ApplicationStrategy::Permanent).await;

        report_exit(&fixture, fixture.children[0], reason).await;

        timeout(Duration::from_secs(1), fixture.node.context().cancelled())
            .await
            .expect("permanent strategy must stop the node");
        fixture.node.wait_stopped().await;
        sleep(Duration::from_millis(50)).await;

        // Everything is torn down, application included.
        assert!(fixture.monitor.reason_of(fixture.app.pid()).is_some());
        for child in &fixture.children {
            assert!(fixture.monitor.reason_of(*child).is_some());
        }
    }
}

#[tokio::test]
async fn test_transient_tolerates_normal_exits() {
    init_tracing();
    for reason in ["normal", "shutdown"] {
        let name = format!("app_trans_{}@localhost", reason);
        let (fixture, _) = start_app(&name, ApplicationStrategy::Transient).await;

        report_exit(&fixture, fixture.children[0], reason).await;
        sleep(Duration::from_millis(100)).await;

        // Still supervising: nothing stopped, node alive.
        assert!(!fixture.node.context().is_cancelled());
        assert!(fixture.monitor.is_empty());
        assert_eq!(fixture.node.processes().await.unwrap().len(), 3);

        fixture.node.stop();
        fixture.node.wait_stopped().await;
    }
}

#[tokio::test]
async fn test_transient_escalates_crashes() {
    init_tracing();
    let (fixture, _) = start_app("app_trans_crash@localhost", ApplicationStrategy::Transient).await;

    report_exit(&fixture, fixture.children[0], "crash").await;

    timeout(Duration::from_secs(1), fixture.node.context().cancelled())
        .await
        .expect("transient strategy must stop the node on abnormal exits");
    fixture.node.wait_stopped().await;
}

#[tokio::test]
async fn test_temporary_ignores_child_exits() {
    init_tracing();
    let (fixture, _) = start_app("app_temp@localhost", ApplicationStrategy::Temporary).await;

    report_exit(&fixture, fixture.children[0], "crash").await;
    sleep(Duration::from_millis(100)).await;

    // Reported, nothing else: siblings untouched, node alive.
    assert!(!fixture.node.context().is_cancelled());
    assert!(fixture.monitor.is_empty());
    assert_eq!(fixture.node.processes().await.unwrap().len(), 3);

    fixture.node.stop();
    fixture.node.wait_stopped().await;
}

#[tokio::test]
async fn test_lifetime_cap_exits_normal() {
    init_tracing();
    let monitor = Arc::new(RecordingMonitor::default());
    let node = Node::start(NodeOptions::new("app_life@localhost").monitor(monitor.clone()));

    let mut behavior = TestApp::new(ApplicationStrategy::Temporary, 0);
    behavior.max_time = Some(Duration::from_millis(50));
    let app = node
        .application_start(Arc::new(behavior), vec![])
        .await
        .unwrap();

    let deadline = Duration::from_secs(2);
    let start = tokio::time::Instant::now();
    loop {
        if monitor.reason_of(app.pid()) == Some("normal".to_string()) {
            break;
        }
        assert!(
            start.elapsed() < deadline,
            "application did not expire in time"
        );
        sleep(Duration::from_millis(20)).await;
    }

    // The cap ends the application, not the node.
    assert!(!node.context().is_cancelled());

    node.stop();
    node.wait_stopped().await;
}

#[tokio::test]
async fn test_unknown_mailbox_messages_are_ignored() {
    init_tracing();
    let (fixture, _) = start_app("app_noise@localhost", ApplicationStrategy::Permanent).await;

    let from = fixture.children[0];
    // Neither a tuple, nor the right arity, nor the right tag.
    for message in [
        Term::atom("noise"),
        Term::Tuple(vec![Term::atom("EXIT"), Term::Pid(from)]),
        Term::Tuple(vec![
            Term::atom("DOWN"),
            Term::Pid(from),
            Term::atom("crash"),
        ]),
    ] {
        fixture
            .node
            .route(from, fixture.app.pid(), message)
            .await
            .unwrap();
    }
    sleep(Duration::from_millis(100)).await;

    assert!(!fixture.node.context().is_cancelled());
    assert!(fixture.monitor.is_empty());

    fixture.node.stop();
    fixture.node.wait_stopped().await;
}
