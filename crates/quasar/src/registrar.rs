//! The registrar: single-owner state machine for the node's tables.
//!
//! All mutations of the name, process, and peer tables happen inside
//! one serial loop that drains a single bounded request channel.
//! Nothing else ever touches the tables, so they need no locks;
//! callers send a [`Request`] and, where an answer is needed, read a
//! oneshot reply. This loop is the node's concurrency backbone: it
//! serializes PID allocation and per-destination message enqueues,
//! which is what gives senders per-link FIFO delivery.
//!
//! Routing is best-effort. Local messages to unknown PIDs are dropped;
//! remote messages with no connected peer are re-enqueued onto the
//! loop's own channel with a bumped retry counter while a connect is
//! kicked off, and are dropped after the retry budget is spent. The
//! channel's capacity keeps the self-enqueue from deadlocking the
//! loop.

use crate::node::NodeShared;
use crate::peer::{self, Peer};
use crate::process::{Process, ProcessBehavior, DEFAULT_MAILBOX_CAPACITY};
use quasar_etf::{Pid, Term};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

/// PID ids are allocated upward from here.
pub(crate) const START_PID: u32 = 1000;

/// Capacity of the registrar's request channel. Must exceed 1 so the
/// loop can re-enqueue route retries to itself without deadlocking.
pub(crate) const REQUEST_CAPACITY: usize = 100;

/// A route is dropped once its retry counter exceeds this, i.e. after
/// four total delivery attempts.
const ROUTE_MAX_RETRIES: u8 = 2;

/// Options for process registration.
#[derive(Debug, Clone)]
pub struct SpawnOptions {
    /// Capacity of the process's mailbox.
    pub mailbox_capacity: usize,
}

impl Default for SpawnOptions {
    fn default() -> Self {
        Self {
            mailbox_capacity: DEFAULT_MAILBOX_CAPACITY,
        }
    }
}

/// A request served by the registrar loop.
pub(crate) enum Request {
    RegisterProcess {
        name: Option<String>,
        object: Arc<dyn ProcessBehavior>,
        args: Vec<Term>,
        opts: SpawnOptions,
        reply: oneshot::Sender<Process>,
    },
    UnregisterProcess(Pid),
    RegisterName {
        name: String,
        pid: Pid,
    },
    UnregisterName(String),
    RegisterPeer(Peer),
    UnregisterPeer(String),
    RouteByPid {
        from: Pid,
        to: Pid,
        message: Term,
        retries: u8,
    },
    RouteByName {
        from: Pid,
        name: String,
        message: Term,
    },
    RouteByTuple {
        from: Pid,
        name: String,
        node: String,
        message: Term,
        retries: u8,
    },
    Processes {
        reply: oneshot::Sender<Vec<Process>>,
    },
    WhereIs {
        name: String,
        reply: oneshot::Sender<Option<Pid>>,
    },
}

pub(crate) struct Registrar {
    node: Arc<NodeShared>,
    /// Own sender, used to re-enqueue route retries.
    tx: mpsc::Sender<Request>,
    rx: mpsc::Receiver<Request>,
    next_pid: u32,
    creation: u32,
    names: HashMap<String, Pid>,
    processes: HashMap<Pid, Process>,
    peers: HashMap<String, Peer>,
}

impl Registrar {
    pub(crate) fn new(
        node: Arc<NodeShared>,
        tx: mpsc::Sender<Request>,
        rx: mpsc::Receiver<Request>,
    ) -> Self {
        let creation = node.creation;
        Self {
            node,
            tx,
            rx,
            next_pid: START_PID,
            creation,
            names: HashMap::new(),
            processes: HashMap::new(),
            peers: HashMap::new(),
        }
    }

    /// Runs the loop until node shutdown.
    pub(crate) async fn run(mut self) {
        loop {
            tokio::select! {
                _ = self.node.token.cancelled() => {
                    self.shutdown();
                    break;
                }
                request = self.rx.recv() => match request {
                    Some(request) => self.handle(request).await,
                    None => break,
                }
            }
        }
        self.node.mark_finished();
    }

    /// Stops every live process cooperatively, then clears the tables.
    fn shutdown(&mut self) {
        tracing::debug!(
            node = %self.node.name,
            processes = self.processes.len(),
            "finalizing registrar"
        );
        for (_, process) in self.processes.drain() {
            process.terminate_local("normal");
        }
        self.names.clear();
        self.peers.clear();
    }

    async fn handle(&mut self, request: Request) {
        match request {
            Request::RegisterProcess {
                name,
                object,
                args,
                opts,
                reply,
            } => {
                let pid = self.allocate_pid();
                let process = Process::new(
                    pid,
                    name.clone(),
                    opts.mailbox_capacity,
                    self.node.token.child_token(),
                    self.tx.clone(),
                    self.node.monitor.clone(),
                    Arc::downgrade(&self.node),
                );
                self.processes.insert(pid, process.clone());
                if let Some(name) = name {
                    self.names.insert(name, pid);
                }
                tracing::debug!(%pid, "registered process");

                // The behavior loop is the process; its return value is
                // the exit reason.
                let looped = process.clone();
                tokio::spawn(async move {
                    let reason = object.run(looped.clone(), args).await;
                    looped.stop(&reason).await;
                });

                let _ = reply.send(process);
            }

            Request::UnregisterProcess(pid) => {
                if let Some(process) = self.processes.remove(&pid) {
                    tracing::debug!(%pid, "unregistering process");
                    if let Some(name) = process.name() {
                        self.names.remove(name);
                    }
                    // Entries are gone before the channels close, so
                    // nothing can route into a closed mailbox.
                    process.close();
                }
            }

            Request::RegisterName { name, pid } => {
                tracing::debug!(%name, %pid, "registering name");
                self.names.entry(name).or_insert(pid);
            }

            Request::UnregisterName(name) => {
                tracing::debug!(%name, "unregistering name");
                self.names.remove(&name);
            }

            Request::RegisterPeer(peer) => {
                tracing::debug!(peer = peer.name(), "registering peer");
                self.peers.entry(peer.name().to_string()).or_insert(peer);
            }

            Request::UnregisterPeer(name) => {
                tracing::debug!(peer = %name, "unregistering peer");
                self.peers.remove(&name);
            }

            Request::RouteByPid {
                from,
                to,
                message,
                retries,
            } => self.route_by_pid(from, to, message, retries).await,

            Request::RouteByName {
                from,
                name,
                message,
            } => {
                if let Some(pid) = self.names.get(&name).copied() {
                    self.requeue(Request::RouteByPid {
                        from,
                        to: pid,
                        message,
                        retries: 0,
                    });
                }
                // Names are node-local: an unknown name cannot appear
                // by retrying, so the message is simply dropped.
            }

            Request::RouteByTuple {
                from,
                name,
                node,
                message,
                retries,
            } => self.route_by_tuple(from, name, node, message, retries).await,

            Request::Processes { reply } => {
                let _ = reply.send(self.processes.values().cloned().collect());
            }

            Request::WhereIs { name, reply } => {
                let _ = reply.send(self.names.get(&name).copied());
            }
        }
    }

    /// Allocates the next PID. Ids grow monotonically; on wrap-around
    /// the id space restarts and the creation counter is bumped so old
    /// and new PIDs stay distinguishable.
    fn allocate_pid(&mut self) -> Pid {
        if self.next_pid == u32::MAX {
            self.next_pid = START_PID;
            self.creation += 1;
            tracing::warn!(creation = self.creation, "pid space wrapped");
        }
        self.next_pid += 1;
        Pid::new(self.node.name_atom, self.next_pid, 1, self.creation)
    }

    async fn route_by_pid(&mut self, from: Pid, to: Pid, message: Term, retries: u8) {
        if retries > ROUTE_MAX_RETRIES {
            tracing::warn!(%to, "dropping message: retries exhausted");
            return;
        }

        if to.is_on(self.node.name_atom) {
            let Some(process) = self.processes.get(&to) else {
                tracing::debug!(%to, "dropping message for unknown local process");
                return;
            };
            // May park on a full mailbox; the loop serializes enqueues
            // per destination, which preserves sender order.
            if process.deliver(from, message).await.is_err() {
                tracing::debug!(%to, "dropping message: mailbox closed");
            }
            return;
        }

        let node_name = to.node().as_str();
        if let Some(remote) = self.peers.get(&node_name) {
            if remote.send(peer::send_frame(to, message)).await.is_err() {
                tracing::warn!(node = %node_name, "dropping message: peer channel closed");
            }
            return;
        }

        // No peer yet: schedule another attempt and bring the
        // connection up in the background.
        self.requeue(Request::RouteByPid {
            from,
            to,
            message,
            retries: retries + 1,
        });
        self.node.connect(to.node());
    }

    async fn route_by_tuple(
        &mut self,
        from: Pid,
        name: String,
        node: String,
        message: Term,
        retries: u8,
    ) {
        if retries > ROUTE_MAX_RETRIES {
            tracing::warn!(%name, %node, "dropping message: retries exhausted");
            return;
        }

        if node == self.node.name {
            self.requeue(Request::RouteByName {
                from,
                name,
                message,
            });
            return;
        }

        if let Some(remote) = self.peers.get(&node) {
            let frame = peer::reg_send_frame(from, &name, message);
            if remote.send(frame).await.is_err() {
                tracing::warn!(%node, "dropping message: peer channel closed");
            }
            return;
        }

        let target = quasar_etf::Atom::new(&node);
        self.requeue(Request::RouteByTuple {
            from,
            name,
            node,
            message,
            retries: retries + 1,
        });
        self.node.connect(target);
    }

    /// Puts a request back onto the loop's own channel. `try_send`
    /// keeps the loop from deadlocking on itself; overflow means the
    /// route budget is badly oversubscribed and the message is
    /// dropped.
    fn requeue(&self, request: Request) {
        if self.tx.try_send(request).is_err() {
            tracing::warn!("route queue full; dropping message");
        }
    }
}
