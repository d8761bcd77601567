//! Node: the top-level handle bundling the registrar, the shutdown
//! context, and the collaborator seams.
//!
//! A [`Node`] owns a root cancellation token; every process context is
//! a child of it, so [`Node::stop`] winds the whole runtime down. The
//! distribution transport and the link/monitor bookkeeping live
//! outside this crate and plug in through [`PeerConnector`] and
//! [`NodeMonitor`].

use crate::application::{Application, ApplicationBehavior};
use crate::error::NodeError;
use crate::peer::Peer;
use crate::process::{Process, ProcessBehavior};
use crate::registrar::{Registrar, Request, SpawnOptions, REQUEST_CAPACITY};
use async_trait::async_trait;
use quasar_etf::{Atom, Pid, Term};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio_util::sync::CancellationToken;

/// Observer notified after a process is unregistered. The link and
/// monitor bookkeeping subsystem implements this to release its state.
pub trait NodeMonitor: Send + Sync + 'static {
    /// Called once per process termination, after the registrar has
    /// removed the table entries.
    fn process_terminated(&self, pid: Pid, reason: &str);
}

/// Default monitor: just logs terminations.
pub struct LogMonitor;

impl NodeMonitor for LogMonitor {
    fn process_terminated(&self, pid: Pid, reason: &str) {
        tracing::debug!(%pid, reason, "process terminated");
    }
}

/// Asynchronous peer bring-up, implemented by the distribution
/// transport. Invoked by the registrar whenever a route finds no
/// connected peer; a successful connect ends with
/// [`Node::register_peer`].
#[async_trait]
pub trait PeerConnector: Send + Sync + 'static {
    /// Establishes a connection to `peer` on behalf of `node`.
    async fn connect(&self, node: Node, peer: Atom);
}

/// Default connector for nodes without a transport: connects go
/// nowhere, so remote routes fall to the retry-then-drop path.
pub struct NoopConnector;

#[async_trait]
impl PeerConnector for NoopConnector {
    async fn connect(&self, _node: Node, peer: Atom) {
        tracing::warn!(%peer, "no transport configured; cannot connect");
    }
}

/// Options for starting a node.
pub struct NodeOptions {
    name: String,
    creation: u32,
    monitor: Arc<dyn NodeMonitor>,
    connector: Arc<dyn PeerConnector>,
}

impl NodeOptions {
    /// Creates options for a node with the given full name (e.g.
    /// `"demo@localhost"`).
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            creation: 1,
            monitor: Arc::new(LogMonitor),
            connector: Arc::new(NoopConnector),
        }
    }

    /// Sets the node incarnation marker embedded in allocated PIDs.
    pub fn creation(mut self, creation: u32) -> Self {
        self.creation = creation;
        self
    }

    /// Installs the process-termination observer.
    pub fn monitor(mut self, monitor: Arc<dyn NodeMonitor>) -> Self {
        self.monitor = monitor;
        self
    }

    /// Installs the peer bring-up collaborator.
    pub fn connector(mut self, connector: Arc<dyn PeerConnector>) -> Self {
        self.connector = connector;
        self
    }
}

/// State shared between the node handle, the registrar loop, and
/// process handles.
pub(crate) struct NodeShared {
    pub(crate) name: String,
    pub(crate) name_atom: Atom,
    pub(crate) creation: u32,
    pub(crate) token: CancellationToken,
    pub(crate) requests: mpsc::Sender<Request>,
    pub(crate) monitor: Arc<dyn NodeMonitor>,
    pub(crate) connector: Arc<dyn PeerConnector>,
    finished: watch::Sender<bool>,
}

impl NodeShared {
    /// Kicks off an asynchronous peer bring-up.
    pub(crate) fn connect(self: &Arc<Self>, peer: Atom) {
        let node = Node {
            shared: self.clone(),
        };
        let connector = self.connector.clone();
        tokio::spawn(async move {
            connector.connect(node, peer).await;
        });
    }

    /// Marks the registrar loop as finished.
    pub(crate) fn mark_finished(&self) {
        let _ = self.finished.send_replace(true);
    }
}

/// A message destination accepted by [`Node::route`].
#[derive(Debug, Clone)]
pub enum Target {
    /// Route by PID, local or remote.
    Pid(Pid),
    /// Route by locally registered name.
    Name(String),
    /// Route by `{name, node}` for a remote registered name.
    NameAtNode {
        /// The registered name on the remote node.
        name: String,
        /// The remote node's full name.
        node: String,
    },
}

impl From<Pid> for Target {
    fn from(pid: Pid) -> Self {
        Target::Pid(pid)
    }
}

impl From<&str> for Target {
    fn from(name: &str) -> Self {
        Target::Name(name.to_string())
    }
}

impl From<String> for Target {
    fn from(name: String) -> Self {
        Target::Name(name)
    }
}

// Registered names arrive off the wire as atoms; accept them directly
// and normalize.
impl From<Atom> for Target {
    fn from(name: Atom) -> Self {
        Target::Name(name.as_str())
    }
}

impl From<(&str, &str)> for Target {
    fn from((name, node): (&str, &str)) -> Self {
        Target::NameAtNode {
            name: name.to_string(),
            node: node.to_string(),
        }
    }
}

/// Handle to a running node.
#[derive(Clone)]
pub struct Node {
    shared: Arc<NodeShared>,
}

impl Node {
    /// Starts a node: brings up the registrar loop and returns the
    /// handle. Must be called within a tokio runtime.
    pub fn start(options: NodeOptions) -> Self {
        let (tx, rx) = mpsc::channel(REQUEST_CAPACITY);
        let (finished, _) = watch::channel(false);
        let shared = Arc::new(NodeShared {
            name_atom: Atom::new(&options.name),
            name: options.name,
            creation: options.creation,
            token: CancellationToken::new(),
            requests: tx.clone(),
            monitor: options.monitor,
            connector: options.connector,
            finished,
        });
        tracing::debug!(node = %shared.name, "starting node");

        tokio::spawn(Registrar::new(shared.clone(), tx, rx).run());

        Self { shared }
    }

    pub(crate) fn from_shared(shared: Arc<NodeShared>) -> Self {
        Self { shared }
    }

    /// The node's full name.
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// The node's name as an atom.
    pub fn name_atom(&self) -> Atom {
        self.shared.name_atom
    }

    /// The node incarnation marker.
    pub fn creation(&self) -> u32 {
        self.shared.creation
    }

    /// Spawns an anonymous process running `behavior`.
    pub async fn spawn(
        &self,
        behavior: Arc<dyn ProcessBehavior>,
        args: Vec<Term>,
    ) -> Result<Process, NodeError> {
        self.spawn_opts(None, behavior, args, SpawnOptions::default())
            .await
    }

    /// Spawns a process registered under `name`.
    pub async fn spawn_named(
        &self,
        name: impl Into<String>,
        behavior: Arc<dyn ProcessBehavior>,
        args: Vec<Term>,
    ) -> Result<Process, NodeError> {
        self.spawn_opts(Some(name.into()), behavior, args, SpawnOptions::default())
            .await
    }

    /// Spawns a process with explicit options.
    pub async fn spawn_opts(
        &self,
        name: Option<String>,
        behavior: Arc<dyn ProcessBehavior>,
        args: Vec<Term>,
        opts: SpawnOptions,
    ) -> Result<Process, NodeError> {
        let (reply, response) = oneshot::channel();
        self.request(Request::RegisterProcess {
            name,
            object: behavior,
            args,
            opts,
            reply,
        })
        .await?;
        response.await.map_err(|_| NodeError::RegistrarClosed)
    }

    /// Associates `name` with `pid`. A no-op if the name is taken.
    pub async fn register_name(&self, name: impl Into<String>, pid: Pid) -> Result<(), NodeError> {
        self.request(Request::RegisterName {
            name: name.into(),
            pid,
        })
        .await
    }

    /// Removes a name registration.
    pub async fn unregister_name(&self, name: impl Into<String>) -> Result<(), NodeError> {
        self.request(Request::UnregisterName(name.into())).await
    }

    /// Installs a peer's outbound channel. A no-op if the peer is
    /// already registered.
    pub async fn register_peer(&self, peer: Peer) -> Result<(), NodeError> {
        self.request(Request::RegisterPeer(peer)).await
    }

    /// Removes a peer entry, e.g. when its connection drops.
    pub async fn unregister_peer(&self, name: impl Into<String>) -> Result<(), NodeError> {
        self.request(Request::UnregisterPeer(name.into())).await
    }

    /// Routes a message. Delivery is best-effort: the error only
    /// reports that the registrar itself is gone.
    pub async fn route(
        &self,
        from: Pid,
        to: impl Into<Target>,
        message: Term,
    ) -> Result<(), NodeError> {
        let request = match to.into() {
            Target::Pid(pid) => Request::RouteByPid {
                from,
                to: pid,
                message,
                retries: 0,
            },
            Target::Name(name) => Request::RouteByName {
                from,
                name,
                message,
            },
            Target::NameAtNode { name, node } => Request::RouteByTuple {
                from,
                name,
                node,
                message,
                retries: 0,
            },
        };
        self.request(request).await
    }

    /// Looks up a registered name.
    pub async fn whereis(&self, name: impl Into<String>) -> Result<Option<Pid>, NodeError> {
        let (reply, response) = oneshot::channel();
        self.request(Request::WhereIs {
            name: name.into(),
            reply,
        })
        .await?;
        response.await.map_err(|_| NodeError::RegistrarClosed)
    }

    /// Snapshot of every live process.
    pub async fn processes(&self) -> Result<Vec<Process>, NodeError> {
        let (reply, response) = oneshot::channel();
        self.request(Request::Processes { reply }).await?;
        response.await.map_err(|_| NodeError::RegistrarClosed)
    }

    /// Kicks off an asynchronous connection to a peer node.
    pub fn connect(&self, peer: Atom) {
        self.shared.connect(peer);
    }

    /// Loads and starts an application: the behavior's specification
    /// is materialized, the supervising process is spawned under the
    /// application's name, and this call returns once it signals
    /// ready.
    pub async fn application_start(
        &self,
        behavior: Arc<dyn ApplicationBehavior>,
        args: Vec<Term>,
    ) -> Result<Process, NodeError> {
        let spec = behavior.load(&args)?;
        tracing::debug!(app = %spec.name, "starting application");
        let name = spec.name.clone();
        let app = Application::new(behavior, spec);
        let process = self
            .spawn_opts(Some(name), Arc::new(app), args, SpawnOptions::default())
            .await?;
        process.wait_ready().await;
        Ok(process)
    }

    /// Requests node-wide shutdown: cancels the root context, which
    /// stops every process and then the registrar loop.
    pub fn stop(&self) {
        tracing::debug!(node = %self.shared.name, "node stop requested");
        self.shared.token.cancel();
    }

    /// Returns once the registrar loop has wound down.
    pub async fn wait_stopped(&self) {
        let mut finished = self.shared.finished.subscribe();
        let _ = finished.wait_for(|done| *done).await;
    }

    /// The node's root cancellation token.
    pub fn context(&self) -> &CancellationToken {
        &self.shared.token
    }

    async fn request(&self, request: Request) -> Result<(), NodeError> {
        self.shared
            .requests
            .send(request)
            .await
            .map_err(|_| NodeError::RegistrarClosed)
    }
}
