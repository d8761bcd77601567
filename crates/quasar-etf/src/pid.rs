//! Process identifier type.
//!
//! A [`Pid`] uniquely identifies a process within a cluster. It consists
//! of four components, matching the Erlang external-format PID layout:
//!
//! - **node**: the node the process lives on (an [`Atom`] for global
//!   uniqueness)
//! - **id**: the process identifier within that node
//! - **serial**: the allocation serial within the id space
//! - **creation**: distinguishes PIDs across node restarts
//!
//! The creation number prevents stale PIDs from accidentally matching new
//! processes after a node restart. The legacy wire encoding only carries
//! two significant bits of it; the modern encoding carries a full `u32`,
//! which is what this type stores.

use crate::atom::Atom;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A process identifier.
///
/// Every process has a unique `Pid` that can be used to send messages
/// and to address it across the cluster. Equality is field-wise.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Pid {
    /// Node identifier as an atom (e.g. "node1@localhost").
    node: Atom,
    /// Process identifier within the node.
    id: u32,
    /// Allocation serial.
    serial: u32,
    /// Creation number - distinguishes PIDs across node restarts.
    creation: u32,
}

impl Pid {
    /// Creates a `Pid` from its parts.
    pub fn new(node: Atom, id: u32, serial: u32, creation: u32) -> Self {
        Self {
            node,
            id,
            serial,
            creation,
        }
    }

    /// Returns the node atom.
    #[inline]
    pub fn node(&self) -> Atom {
        self.node
    }

    /// Returns the process identifier within the node.
    #[inline]
    pub const fn id(&self) -> u32 {
        self.id
    }

    /// Returns the allocation serial.
    #[inline]
    pub const fn serial(&self) -> u32 {
        self.serial
    }

    /// Returns the creation number.
    #[inline]
    pub const fn creation(&self) -> u32 {
        self.creation
    }

    /// Returns `true` if this PID belongs to the given node.
    #[inline]
    pub fn is_on(&self, node: Atom) -> bool {
        self.node == node
    }
}

impl fmt::Debug for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Pid<{}.{}.{}.{}>",
            self.node, self.id, self.serial, self.creation
        )
    }
}

impl fmt::Display for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{}.{}.{}>", self.node, self.id, self.serial)
    }
}
