//! Reference and port identifier types.
//!
//! A [`Ref`] is an opaque identity token scoped to a node: fresh
//! references compare unequal to every previously created one. A
//! [`Port`] identifies an I/O port on a node. Both carry the node
//! atom and a creation number, like [`Pid`](crate::pid::Pid).

use crate::atom::Atom;
use serde::{Deserialize, Serialize};
use std::fmt;

/// An opaque, node-scoped identity token.
///
/// The id is a short sequence of 32-bit words; the modern wire encoding
/// allows up to 5 of them. Equality is field-wise.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Ref {
    /// Node the reference was created on.
    node: Atom,
    /// Identity words.
    id: Vec<u32>,
    /// Creation number of the originating node incarnation.
    creation: u32,
}

impl Ref {
    /// Creates a reference from its parts.
    pub fn new(node: Atom, id: Vec<u32>, creation: u32) -> Self {
        Self { node, id, creation }
    }

    /// Returns the node atom.
    #[inline]
    pub fn node(&self) -> Atom {
        self.node
    }

    /// Returns the identity words.
    #[inline]
    pub fn id(&self) -> &[u32] {
        &self.id
    }

    /// Returns the creation number.
    #[inline]
    pub const fn creation(&self) -> u32 {
        self.creation
    }
}

impl fmt::Debug for Ref {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Ref<{}", self.node)?;
        for word in &self.id {
            write!(f, ".{}", word)?;
        }
        write!(f, ">")
    }
}

/// A port identifier.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Port {
    /// Node the port lives on.
    node: Atom,
    /// Port identifier within the node.
    id: u32,
    /// Creation number of the originating node incarnation.
    creation: u32,
}

impl Port {
    /// Creates a port from its parts.
    pub fn new(node: Atom, id: u32, creation: u32) -> Self {
        Self { node, id, creation }
    }

    /// Returns the node atom.
    #[inline]
    pub fn node(&self) -> Atom {
        self.node
    }

    /// Returns the port identifier within the node.
    #[inline]
    pub const fn id(&self) -> u32 {
        self.id
    }

    /// Returns the creation number.
    #[inline]
    pub const fn creation(&self) -> u32 {
        self.creation
    }
}

impl fmt::Debug for Port {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Port<{}.{}>", self.node, self.id)
    }
}
