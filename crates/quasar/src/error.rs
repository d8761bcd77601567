//! Runtime error types.

use thiserror::Error;

/// Errors surfaced by node-level operations.
///
/// Message routing is deliberately absent: delivery is best-effort and
/// failures are logged, never returned (see the registrar docs).
#[derive(Debug, Error)]
pub enum NodeError {
    /// The registrar loop is no longer running, so requests cannot be
    /// served. Happens after node shutdown.
    #[error("the registrar is not running")]
    RegistrarClosed,

    /// The target process's mailbox was closed before the message
    /// could be enqueued.
    #[error("mailbox is closed")]
    MailboxClosed,

    /// The peer's outbound frame channel was closed.
    #[error("peer channel is closed")]
    PeerClosed,

    /// An application behavior failed to produce its specification.
    #[error("application failed to load: {0}")]
    ApplicationLoad(String),
}
