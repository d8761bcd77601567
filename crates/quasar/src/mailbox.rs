//! Process mailbox for message delivery.
//!
//! Each process owns a mailbox that receives messages from other
//! processes. The mailbox is a *bounded* FIFO: senders park when it is
//! full, which is how the runtime applies back-pressure to fast
//! producers. Closing happens from the sending side - when the last
//! sender is dropped, receivers drain what is queued and then observe
//! end-of-stream.

use crate::error::NodeError;
use quasar_etf::{Pid, Term};
use tokio::sync::mpsc;

/// A message queued in a process mailbox: the sender's PID and the
/// payload term.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    /// Who sent the message.
    pub from: Pid,
    /// The message itself.
    pub message: Term,
}

impl Envelope {
    /// Creates a new envelope.
    pub fn new(from: Pid, message: Term) -> Self {
        Self { from, message }
    }
}

/// The receiving end of a process mailbox.
///
/// This is held by the owning process and used to receive messages.
pub struct Mailbox {
    rx: mpsc::Receiver<Envelope>,
}

impl Mailbox {
    /// Creates a bounded mailbox, returning the mailbox and its sender.
    pub fn new(capacity: usize) -> (Self, MailboxSender) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { rx }, MailboxSender { tx })
    }

    /// Receives the next message, waiting until one is available.
    ///
    /// Returns `None` once all senders are gone and the queue is
    /// drained.
    pub async fn recv(&mut self) -> Option<Envelope> {
        self.rx.recv().await
    }

    /// Tries to receive a message without waiting.
    pub fn try_recv(&mut self) -> Result<Envelope, mpsc::error::TryRecvError> {
        self.rx.try_recv()
    }

    /// Closes the receiving end, preventing further sends. Queued
    /// messages can still be received.
    pub fn close(&mut self) {
        self.rx.close()
    }
}

/// The sending end of a process mailbox.
///
/// Cheap to clone; the registrar hands these out for message delivery.
#[derive(Clone)]
pub struct MailboxSender {
    tx: mpsc::Sender<Envelope>,
}

impl MailboxSender {
    /// Sends a message, waiting while the mailbox is full.
    pub async fn send(&self, envelope: Envelope) -> Result<(), NodeError> {
        self.tx
            .send(envelope)
            .await
            .map_err(|_| NodeError::MailboxClosed)
    }

    /// Sends a message without waiting; fails when the mailbox is full
    /// or closed.
    pub fn try_send(&self, envelope: Envelope) -> Result<(), NodeError> {
        self.tx
            .try_send(envelope)
            .map_err(|_| NodeError::MailboxClosed)
    }

    /// Returns `true` if the mailbox can no longer accept messages.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quasar_etf::{atom, Atom};
    use std::time::Duration;

    fn pid(id: u32) -> Pid {
        Pid::new(atom!("test@localhost"), id, 1, 1)
    }

    #[tokio::test]
    async fn test_mailbox_send_recv_order() {
        let (mut mailbox, sender) = Mailbox::new(4);

        sender.send(Envelope::new(pid(1), Term::Int(1))).await.unwrap();
        sender.send(Envelope::new(pid(1), Term::Int(2))).await.unwrap();

        assert_eq!(mailbox.recv().await.unwrap().message, Term::Int(1));
        assert_eq!(mailbox.recv().await.unwrap().message, Term::Int(2));
    }

    #[tokio::test]
    async fn test_mailbox_try_recv() {
        let (mut mailbox, sender) = Mailbox::new(4);

        assert!(mailbox.try_recv().is_err());

        sender
            .send(Envelope::new(pid(1), Term::atom("hi")))
            .await
            .unwrap();
        assert_eq!(
            mailbox.try_recv().unwrap().message,
            Term::Atom(Atom::new("hi"))
        );
        assert!(mailbox.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_mailbox_bounded_backpressure() {
        let (mut mailbox, sender) = Mailbox::new(1);

        sender.send(Envelope::new(pid(1), Term::Int(1))).await.unwrap();

        // The second send must park until the first is consumed.
        let blocked = tokio::time::timeout(
            Duration::from_millis(50),
            sender.send(Envelope::new(pid(1), Term::Int(2))),
        )
        .await;
        assert!(blocked.is_err(), "send into a full mailbox should wait");

        assert_eq!(mailbox.recv().await.unwrap().message, Term::Int(1));
        sender.send(Envelope::new(pid(1), Term::Int(2))).await.unwrap();
        assert_eq!(mailbox.recv().await.unwrap().message, Term::Int(2));
    }

    #[tokio::test]
    async fn test_mailbox_end_of_stream_after_senders_drop() {
        let (mut mailbox, sender) = Mailbox::new(4);

        sender.send(Envelope::new(pid(1), Term::Int(1))).await.unwrap();
        drop(sender);

        // Queued messages drain, then the stream ends.
        assert_eq!(mailbox.recv().await.unwrap().message, Term::Int(1));
        assert!(mailbox.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_mailbox_close_rejects_senders() {
        let (mut mailbox, sender) = Mailbox::new(4);

        sender.send(Envelope::new(pid(1), Term::Int(1))).await.unwrap();
        mailbox.close();
        assert!(sender.is_closed());
        assert!(sender
            .send(Envelope::new(pid(1), Term::Int(2)))
            .await
            .is_err());

        // Pending messages survive the close.
        assert_eq!(mailbox.recv().await.unwrap().message, Term::Int(1));
        assert!(mailbox.recv().await.is_none());
    }
}
