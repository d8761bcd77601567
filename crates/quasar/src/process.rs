//! Addressable actors and their behaviors.
//!
//! A [`Process`] is a cheap-clone handle to one actor: its PID, its
//! bounded mailbox, a cancellation context scoped under the node, a
//! graceful-exit signal channel, and a small per-process environment.
//! The registrar exclusively owns the process tables; handles held
//! elsewhere observe the process but do not keep it registered.
//!
//! The code that actually runs inside a process implements
//! [`ProcessBehavior`]; the registrar spawns its `run` loop when the
//! process is registered and tears the process down with the returned
//! reason when the loop ends.

use crate::error::NodeError;
use crate::mailbox::{Envelope, Mailbox, MailboxSender};
use crate::node::{Node, NodeMonitor, NodeShared};
use crate::registrar::{Request, SpawnOptions};
use async_trait::async_trait;
use parking_lot::Mutex;
use quasar_etf::{Atom, Pid, Term};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::{mpsc, oneshot, watch, Mutex as AsyncMutex};
use tokio_util::sync::CancellationToken;

/// Mailbox capacity used when a spawn does not override it.
pub const DEFAULT_MAILBOX_CAPACITY: usize = 100;

/// Capacity of the graceful-exit signal channel. A second signal
/// arriving while one is pending is redundant and dropped.
const EXIT_SIGNAL_CAPACITY: usize = 1;

/// A value in a process's environment.
///
/// Applications use the environment to push configuration down to
/// their children.
#[derive(Debug, Clone, PartialEq)]
pub enum EnvValue {
    /// A string value.
    Str(String),
    /// An integer value.
    Int(i64),
    /// A floating point value.
    Float(f64),
    /// A boolean value.
    Bool(bool),
    /// A list of values.
    List(Vec<EnvValue>),
    /// A nested table.
    Map(HashMap<String, EnvValue>),
}

impl From<&str> for EnvValue {
    fn from(v: &str) -> Self {
        EnvValue::Str(v.to_string())
    }
}

impl From<String> for EnvValue {
    fn from(v: String) -> Self {
        EnvValue::Str(v)
    }
}

impl From<i64> for EnvValue {
    fn from(v: i64) -> Self {
        EnvValue::Int(v)
    }
}

impl From<bool> for EnvValue {
    fn from(v: bool) -> Self {
        EnvValue::Bool(v)
    }
}

/// A graceful-exit request delivered to a process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExitSignal {
    /// The process that initiated the exit.
    pub from: Pid,
    /// Why the process should stop.
    pub reason: Atom,
}

/// The code that runs inside a process.
///
/// `run` is the whole life of the process: when it returns, the
/// process is unregistered with the returned string as its exit
/// reason. Implementations should select over [`Process::recv`],
/// [`Process::recv_exit`], and the cancellation context so they wind
/// down promptly on node shutdown.
#[async_trait]
pub trait ProcessBehavior: Send + Sync + 'static {
    /// Runs the process loop to completion, returning the exit reason.
    async fn run(&self, process: Process, args: Vec<Term>) -> String;
}

pub(crate) struct ProcessInner {
    pid: Pid,
    name: Option<String>,
    mailbox: AsyncMutex<Mailbox>,
    /// Sending side; dropping it is what closes the mailbox.
    mailbox_tx: Mutex<Option<MailboxSender>>,
    exits: AsyncMutex<mpsc::Receiver<ExitSignal>>,
    exit_tx: Mutex<Option<mpsc::Sender<ExitSignal>>>,
    ready: watch::Sender<bool>,
    /// Cancelled when the process should stop running.
    context: CancellationToken,
    /// Cancelled by the registrar once the process is unregistered.
    closed: CancellationToken,
    env: Mutex<HashMap<String, EnvValue>>,
    requests: mpsc::Sender<Request>,
    monitor: Arc<dyn NodeMonitor>,
    node: Weak<NodeShared>,
    stopped: AtomicBool,
}

/// Handle to a running process.
#[derive(Clone)]
pub struct Process {
    inner: Arc<ProcessInner>,
}

impl Process {
    pub(crate) fn new(
        pid: Pid,
        name: Option<String>,
        mailbox_capacity: usize,
        context: CancellationToken,
        requests: mpsc::Sender<Request>,
        monitor: Arc<dyn NodeMonitor>,
        node: Weak<NodeShared>,
    ) -> Self {
        let (mailbox, mailbox_tx) = Mailbox::new(mailbox_capacity);
        let (exit_tx, exit_rx) = mpsc::channel(EXIT_SIGNAL_CAPACITY);
        let (ready, _) = watch::channel(false);
        Self {
            inner: Arc::new(ProcessInner {
                pid,
                name,
                mailbox: AsyncMutex::new(mailbox),
                mailbox_tx: Mutex::new(Some(mailbox_tx)),
                exits: AsyncMutex::new(exit_rx),
                exit_tx: Mutex::new(Some(exit_tx)),
                ready,
                context,
                closed: CancellationToken::new(),
                env: Mutex::new(HashMap::new()),
                requests,
                monitor,
                node,
                stopped: AtomicBool::new(false),
            }),
        }
    }

    /// This process's PID.
    pub fn pid(&self) -> Pid {
        self.inner.pid
    }

    /// The registered name, if the process was spawned with one.
    pub fn name(&self) -> Option<&str> {
        self.inner.name.as_deref()
    }

    /// The node this process belongs to, if it is still alive.
    pub fn node(&self) -> Option<Node> {
        self.inner.node.upgrade().map(Node::from_shared)
    }

    /// Cancellation context scoped under the node: fires on
    /// [`Process::stop`] and on node shutdown.
    pub fn context(&self) -> &CancellationToken {
        &self.inner.context
    }

    /// Enqueues a message into this process's own mailbox (used for
    /// scheduled self-sends). Waits while the mailbox is full.
    pub async fn send(&self, message: Term) -> Result<(), NodeError> {
        self.deliver(self.inner.pid, message).await
    }

    /// Enqueues a message from `from`. Waits while the mailbox is
    /// full; fails once the process is unregistered.
    pub(crate) async fn deliver(&self, from: Pid, message: Term) -> Result<(), NodeError> {
        let sender = self
            .inner
            .mailbox_tx
            .lock()
            .clone()
            .ok_or(NodeError::MailboxClosed)?;
        sender.send(Envelope::new(from, message)).await
    }

    /// Receives the next mailbox message. Returns `None` once the
    /// mailbox is closed and drained.
    pub async fn recv(&self) -> Option<Envelope> {
        self.inner.mailbox.lock().await.recv().await
    }

    /// Delivers a graceful-exit signal to this process.
    ///
    /// The signal surfaces on [`Process::recv_exit`]; a signal already
    /// pending makes this a no-op.
    pub fn exit(&self, from: Pid, reason: &str) {
        let sender = self.inner.exit_tx.lock().clone();
        if let Some(sender) = sender {
            let signal = ExitSignal {
                from,
                reason: Atom::new(reason),
            };
            if sender.try_send(signal).is_err() {
                tracing::debug!(pid = %self.inner.pid, "exit signal already pending");
            }
        }
    }

    /// Receives the next graceful-exit signal. Returns `None` once the
    /// process is unregistered.
    pub async fn recv_exit(&self) -> Option<ExitSignal> {
        self.inner.exits.lock().await.recv().await
    }

    /// Cooperative teardown: cancels the context, asks the registrar
    /// to unregister this process, and notifies the node monitor.
    ///
    /// Idempotent; the second and later calls do nothing.
    pub async fn stop(&self, reason: &str) {
        if self.inner.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        tracing::debug!(pid = %self.inner.pid, reason, "stopping process");
        self.inner.context.cancel();
        let _ = self
            .inner
            .requests
            .send(Request::UnregisterProcess(self.inner.pid))
            .await;
        self.inner.monitor.process_terminated(self.inner.pid, reason);
    }

    /// Synchronous teardown used by the registrar during node
    /// shutdown, when the request loop is about to exit and cannot
    /// serve an unregister request anymore.
    pub(crate) fn terminate_local(&self, reason: &str) {
        if self.inner.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        self.inner.context.cancel();
        self.close();
        self.inner.monitor.process_terminated(self.inner.pid, reason);
    }

    /// Closes the mailbox, exit, and ready channels. Called by the
    /// registrar after the table entries are removed, so no new
    /// deliveries can race the close.
    pub(crate) fn close(&self) {
        *self.inner.mailbox_tx.lock() = None;
        *self.inner.exit_tx.lock() = None;
        self.inner.closed.cancel();
    }

    /// Marks this process ready; wakes all [`Process::wait_ready`]
    /// callers.
    pub fn notify_ready(&self) {
        let _ = self.inner.ready.send_replace(true);
    }

    /// Waits for the process to signal readiness. Returns `false` if
    /// it was unregistered first.
    pub async fn wait_ready(&self) -> bool {
        let mut ready = self.inner.ready.subscribe();
        if *ready.borrow() {
            return true;
        }
        tokio::select! {
            result = ready.wait_for(|v| *v) => result.is_ok(),
            _ = self.inner.closed.cancelled() => false,
        }
    }

    /// Sets a key in the process environment.
    pub fn set_env(&self, key: impl Into<String>, value: EnvValue) {
        self.inner.env.lock().insert(key.into(), value);
    }

    /// Reads a key from the process environment.
    pub fn get_env(&self, key: &str) -> Option<EnvValue> {
        self.inner.env.lock().get(key).cloned()
    }

    /// Starts a child process through the registrar. This is the
    /// child-start helper applications use.
    pub async fn spawn(
        &self,
        name: Option<String>,
        behavior: Arc<dyn ProcessBehavior>,
        args: Vec<Term>,
    ) -> Result<Process, NodeError> {
        let (reply, response) = oneshot::channel();
        self.inner
            .requests
            .send(Request::RegisterProcess {
                name,
                object: behavior,
                args,
                opts: SpawnOptions::default(),
                reply,
            })
            .await
            .map_err(|_| NodeError::RegistrarClosed)?;
        response.await.map_err(|_| NodeError::RegistrarClosed)
    }
}

impl fmt::Debug for Process {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Process")
            .field("pid", &self.inner.pid)
            .field("name", &self.inner.name)
            .finish()
    }
}
