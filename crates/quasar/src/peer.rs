//! Peer interface: the outbound side of a node-to-node connection.
//!
//! The registrar does not speak TCP itself; it pushes ready-made frames
//! into a [`Peer`]'s bounded channel and the distribution transport
//! drains the other end, serializes each term with the wire codec, and
//! ships it. A frame is a short list of terms: the control tuple
//! followed by the payload.

use crate::error::NodeError;
use quasar_etf::{Atom, Pid, Term};
use tokio::sync::mpsc;

/// Control-message tag for a PID-addressed send, per the Erlang
/// distribution protocol.
pub const CTRL_SEND: i64 = 2;

/// Control-message tag for a registered-name send.
pub const CTRL_REG_SEND: i64 = 6;

/// Handle to a connected remote node's outbound frame queue.
#[derive(Clone)]
pub struct Peer {
    name: String,
    tx: mpsc::Sender<Vec<Term>>,
}

impl Peer {
    /// Creates a peer handle and the receiving end its transport
    /// drains.
    pub fn channel(name: impl Into<String>, capacity: usize) -> (Self, mpsc::Receiver<Vec<Term>>) {
        let (tx, rx) = mpsc::channel(capacity);
        (
            Self {
                name: name.into(),
                tx,
            },
            rx,
        )
    }

    /// The remote node's full name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Queues a frame for transmission, waiting while the queue is
    /// full.
    pub async fn send(&self, frame: Vec<Term>) -> Result<(), NodeError> {
        self.tx.send(frame).await.map_err(|_| NodeError::PeerClosed)
    }
}

/// Builds the `{SEND, '', DestPid}` control frame for a PID-addressed
/// message.
pub fn send_frame(to: Pid, message: Term) -> Vec<Term> {
    vec![
        Term::Tuple(vec![
            Term::Int(CTRL_SEND),
            Term::Atom(Atom::empty()),
            Term::Pid(to),
        ]),
        message,
    ]
}

/// Builds the `{REG_SEND, FromPid, '', DestName}` control frame for a
/// name-addressed message.
pub fn reg_send_frame(from: Pid, name: &str, message: Term) -> Vec<Term> {
    vec![
        Term::Tuple(vec![
            Term::Int(CTRL_REG_SEND),
            Term::Pid(from),
            Term::Atom(Atom::empty()),
            Term::Atom(Atom::new(name)),
        ]),
        message,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use quasar_etf::atom;

    fn pid(id: u32) -> Pid {
        Pid::new(atom!("test@localhost"), id, 1, 1)
    }

    #[tokio::test]
    async fn test_peer_frames_flow_to_receiver() {
        let (peer, mut rx) = Peer::channel("remote@host", 8);
        assert_eq!(peer.name(), "remote@host");

        peer.send(send_frame(pid(1001), Term::atom("hello")))
            .await
            .unwrap();

        let frame = rx.recv().await.unwrap();
        assert_eq!(frame.len(), 2);
        assert_eq!(
            frame[0],
            Term::Tuple(vec![
                Term::Int(CTRL_SEND),
                Term::Atom(Atom::empty()),
                Term::Pid(pid(1001)),
            ])
        );
        assert_eq!(frame[1], Term::atom("hello"));
    }

    #[tokio::test]
    async fn test_peer_send_after_transport_gone() {
        let (peer, rx) = Peer::channel("remote@host", 8);
        drop(rx);
        assert!(peer.send(send_frame(pid(1), Term::Nil)).await.is_err());
    }

    #[test]
    fn test_reg_send_frame_shape() {
        let frame = reg_send_frame(pid(7), "logger", Term::Int(1));
        assert_eq!(
            frame[0],
            Term::Tuple(vec![
                Term::Int(CTRL_REG_SEND),
                Term::Pid(pid(7)),
                Term::Atom(Atom::empty()),
                Term::Atom(Atom::new("logger")),
            ])
        );
        assert_eq!(frame[1], Term::Int(1));
    }
}
