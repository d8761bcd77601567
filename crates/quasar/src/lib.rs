//! # quasar - a distributed actor runtime core
//!
//! quasar hosts lightweight, independently executing *processes*, each
//! owning a private bounded mailbox and identified by a cluster-wide
//! [`Pid`]. Processes communicate by asynchronous message passing,
//! addressed by PID, by locally registered name, or by `{name, node}`
//! for remote delivery.
//!
//! The pieces:
//!
//! - **Process** ([`process`]): an addressable actor with a mailbox, a
//!   cancellation context, a graceful-exit channel, and a per-process
//!   environment. Its code implements [`ProcessBehavior`].
//! - **Registrar** (internal, driven through [`Node`]): the
//!   single-owner loop that allocates PIDs, owns the name, process and
//!   peer tables, and routes messages with bounded retry toward
//!   not-yet-connected peers.
//! - **Application** ([`application`]): OTP-style supervision - a
//!   process that starts declared children and reacts to their exits
//!   with a permanent/transient/temporary strategy.
//! - **Peer** ([`peer`]): the outbound frame queue the registrar fills
//!   for the distribution transport to drain.
//!
//! Terms, PIDs, and the wire codec live in the sibling
//! [`quasar-etf`](quasar_etf) crate.
//!
//! # Example
//!
//! ```ignore
//! use quasar::{Node, NodeOptions};
//!
//! #[tokio::main]
//! async fn main() {
//!     let node = Node::start(NodeOptions::new("demo@localhost"));
//!     let process = node.spawn(my_behavior, vec![]).await.unwrap();
//!     node.route(process.pid(), "logger", Term::atom("hello")).await.unwrap();
//!     node.stop();
//!     node.wait_stopped().await;
//! }
//! ```

#![warn(missing_docs)]

pub mod application;
pub mod error;
pub mod mailbox;
pub mod node;
pub mod peer;
pub mod process;
pub(crate) mod registrar;

pub use application::{ApplicationBehavior, ApplicationSpec, ApplicationStrategy, ChildSpec};
pub use error::NodeError;
pub use mailbox::{Envelope, Mailbox, MailboxSender};
pub use node::{LogMonitor, Node, NodeMonitor, NodeOptions, NoopConnector, PeerConnector, Target};
pub use peer::{Peer, CTRL_REG_SEND, CTRL_SEND};
pub use process::{
    EnvValue, ExitSignal, Process, ProcessBehavior, DEFAULT_MAILBOX_CAPACITY,
};
pub use registrar::SpawnOptions;

// Re-export the term layer so downstream users need only one import.
pub use quasar_etf::{Atom, Pid, Term};

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::application::{
        ApplicationBehavior, ApplicationSpec, ApplicationStrategy, ChildSpec,
    };
    pub use crate::error::NodeError;
    pub use crate::node::{Node, NodeMonitor, NodeOptions, PeerConnector, Target};
    pub use crate::peer::Peer;
    pub use crate::process::{EnvValue, ExitSignal, Process, ProcessBehavior};
    pub use crate::registrar::SpawnOptions;
    pub use quasar_etf::{Atom, Pid, Term};
}
