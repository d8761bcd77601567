//! OTP-style applications: a supervised bundle of child processes.
//!
//! An application is an ordinary process whose loop starts a declared
//! set of children, watches for their `{'EXIT', Pid, Reason}` messages,
//! and applies one of three strategies:
//!
//! - [`Permanent`](ApplicationStrategy::Permanent): any child exit
//!   takes the whole node down.
//! - [`Transient`](ApplicationStrategy::Transient): normal exits are
//!   tolerated; abnormal ones take the node down.
//! - [`Temporary`](ApplicationStrategy::Temporary): exits are logged
//!   and siblings keep running.

use crate::error::NodeError;
use crate::process::{EnvValue, Process, ProcessBehavior};
use async_trait::async_trait;
use parking_lot::Mutex;
use quasar_etf::{atom, Pid, Term};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// What happens to the rest of the system when a child exits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ApplicationStrategy {
    /// A terminating child terminates everything: remaining children
    /// are stopped and the node shuts down.
    #[default]
    Permanent,
    /// A child terminating with `normal` or `shutdown` is reported and
    /// tolerated; any other reason escalates to node shutdown.
    Transient,
    /// Child terminations are reported; nothing else happens.
    Temporary,
}

impl fmt::Display for ApplicationStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApplicationStrategy::Permanent => write!(f, "permanent"),
            ApplicationStrategy::Transient => write!(f, "transient"),
            ApplicationStrategy::Temporary => write!(f, "temporary"),
        }
    }
}

/// One child in an application's supervision list.
pub struct ChildSpec {
    /// The behavior to run.
    pub behavior: Arc<dyn ProcessBehavior>,
    /// Arguments handed to the behavior's loop.
    pub args: Vec<Term>,
}

impl ChildSpec {
    /// Creates a child specification.
    pub fn new(behavior: Arc<dyn ProcessBehavior>, args: Vec<Term>) -> Self {
        Self { behavior, args }
    }
}

/// Declarative description of an application.
pub struct ApplicationSpec {
    /// Application name; the supervising process registers under it.
    pub name: String,
    /// Human-readable description.
    pub description: String,
    /// Version string.
    pub version: String,
    /// Lifetime cap. `None` means the application runs until stopped.
    pub max_time: Option<Duration>,
    /// Names of applications this one depends on.
    pub applications: Vec<String>,
    /// Environment applied to the supervising process at startup.
    pub environment: HashMap<String, EnvValue>,
    /// Children, started in declaration order.
    pub children: Vec<ChildSpec>,
    /// Reaction to child exits.
    pub strategy: ApplicationStrategy,
}

impl ApplicationSpec {
    /// Creates a specification with the given name and defaults.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            version: String::new(),
            max_time: None,
            applications: Vec::new(),
            environment: HashMap::new(),
            children: Vec::new(),
            strategy: ApplicationStrategy::default(),
        }
    }

    /// Sets the description.
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Sets the version.
    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// Caps the application lifetime; it exits `normal` when the time
    /// is up.
    pub fn max_time(mut self, max_time: Duration) -> Self {
        self.max_time = Some(max_time);
        self
    }

    /// Declares a dependency on another application.
    pub fn depends_on(mut self, application: impl Into<String>) -> Self {
        self.applications.push(application.into());
        self
    }

    /// Adds an environment entry.
    pub fn env(mut self, key: impl Into<String>, value: EnvValue) -> Self {
        self.environment.insert(key.into(), value);
        self
    }

    /// Appends a child.
    pub fn child(mut self, behavior: Arc<dyn ProcessBehavior>, args: Vec<Term>) -> Self {
        self.children.push(ChildSpec::new(behavior, args));
        self
    }

    /// Sets the restart strategy.
    pub fn strategy(mut self, strategy: ApplicationStrategy) -> Self {
        self.strategy = strategy;
        self
    }
}

/// User-facing application callbacks.
pub trait ApplicationBehavior: Send + Sync + 'static {
    /// Produces the application's specification from start arguments.
    fn load(&self, args: &[Term]) -> Result<ApplicationSpec, NodeError>;

    /// Non-blocking startup hook, called with the supervising process
    /// before any child starts. Registration-style side effects
    /// belong here.
    fn start(&self, process: &Process, args: &[Term]) {
        let _ = (process, args);
    }
}

/// The supervising process loop. Constructed by
/// [`Node::application_start`](crate::node::Node::application_start)
/// around a loaded specification.
pub(crate) struct Application {
    behavior: Arc<dyn ApplicationBehavior>,
    spec: Mutex<Option<ApplicationSpec>>,
}

impl Application {
    pub(crate) fn new(behavior: Arc<dyn ApplicationBehavior>, spec: ApplicationSpec) -> Self {
        Self {
            behavior,
            spec: Mutex::new(Some(spec)),
        }
    }
}

#[async_trait]
impl ProcessBehavior for Application {
    async fn run(&self, process: Process, args: Vec<Term>) -> String {
        let Some(spec) = self.spec.lock().take() else {
            // A spec is installed exactly once per start.
            return "failed".to_string();
        };

        for (key, value) in &spec.environment {
            process.set_env(key.clone(), value.clone());
        }
        self.behavior.start(&process, &args);
        process.notify_ready();

        let mut children: Vec<Process> = Vec::with_capacity(spec.children.len());
        for child in &spec.children {
            match process
                .spawn(None, child.behavior.clone(), child.args.clone())
                .await
            {
                Ok(started) => children.push(started),
                Err(error) => {
                    tracing::warn!(app = %spec.name, %error, "child start failed");
                    stop_children(&process, process.pid(), &children, "failed");
                    return "failed".to_string();
                }
            }
        }

        let lifetime = lifetime_timer(spec.max_time);
        tokio::pin!(lifetime);
        let mut lifetime_armed = true;

        loop {
            tokio::select! {
                signal = process.recv_exit() => {
                    let Some(signal) = signal else { return "kill".to_string() };
                    let reason = signal.reason.as_str();
                    stop_children(&process, signal.from, &children, &reason);
                    return reason;
                }

                _ = process.context().cancelled() => {
                    // Node is going down, or the application was killed.
                    return "kill".to_string();
                }

                _ = &mut lifetime, if lifetime_armed => {
                    lifetime_armed = false;
                    tracing::debug!(app = %spec.name, "lifetime expired");
                    process.exit(process.pid(), "normal");
                }

                envelope = process.recv() => {
                    let Some(envelope) = envelope else { return "kill".to_string() };
                    let Some((terminated, reason)) = exit_message(&envelope.message) else {
                        continue;
                    };

                    match spec.strategy {
                        ApplicationStrategy::Permanent => {
                            stop_children(&process, terminated, &children, &reason);
                            tracing::warn!(
                                app = %spec.name,
                                child = %terminated,
                                %reason,
                                "child exited under permanent strategy; stopping node"
                            );
                            node_stop(&process);
                            return "shutdown".to_string();
                        }

                        ApplicationStrategy::Transient => {
                            if reason == "normal" || reason == "shutdown" {
                                tracing::debug!(
                                    app = %spec.name,
                                    child = %terminated,
                                    %reason,
                                    "child exited normally under transient strategy"
                                );
                                continue;
                            }
                            stop_children(&process, terminated, &children, "normal");
                            tracing::warn!(
                                app = %spec.name,
                                child = %terminated,
                                %reason,
                                "child exited abnormally under transient strategy; stopping node"
                            );
                            node_stop(&process);
                            return reason;
                        }

                        ApplicationStrategy::Temporary => {
                            tracing::debug!(
                                app = %spec.name,
                                child = %terminated,
                                %reason,
                                "child exited under temporary strategy"
                            );
                        }
                    }
                }
            }
        }
    }
}

/// Parses a `{'EXIT', Pid, Reason}` mailbox message. Anything else is
/// ignored by the application loop.
fn exit_message(message: &Term) -> Option<(Pid, String)> {
    let elements = message.as_tuple()?;
    if elements.len() != 3 || elements[0].as_atom()? != atom!("EXIT") {
        return None;
    }
    let pid = elements[1].as_pid()?;
    let reason = elements[2].as_atom()?.as_str();
    Some((pid, reason))
}

/// Sends a graceful exit from the application to every child except
/// the one that initiated the cascade.
fn stop_children(process: &Process, skip: Pid, children: &[Process], reason: &str) {
    for child in children {
        if child.pid() != skip {
            child.exit(process.pid(), reason);
        }
    }
}

fn node_stop(process: &Process) {
    if let Some(node) = process.node() {
        node.stop();
    }
}

async fn lifetime_timer(max_time: Option<Duration>) {
    match max_time {
        Some(duration) => tokio::time::sleep(duration).await,
        None => std::future::pending().await,
    }
}
