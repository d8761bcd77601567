//! The term model.
//!
//! [`Term`] is a tagged sum over every value the wire format can carry.
//! Equality is structural per variant with two deliberate wrinkles:
//!
//! - Integers compare *numerically* across the inline [`Term::Int`] and
//!   arbitrary-precision [`Term::BigInt`] representations, so a value
//!   keeps its identity regardless of which encoding it arrived in.
//! - Floats compare by bit pattern. That makes `Term` a lawful `Eq` and
//!   `Hash` key (maps can contain maps), at the cost of distinguishing
//!   `0.0` from `-0.0`.
//!
//! [`Map`] preserves insertion order but compares as an unordered
//! key→value relation; keys are unique under term equality.

use crate::atom::Atom;
use crate::pid::Pid;
use crate::reference::{Port, Ref};
use num_bigint::BigInt;
use num_traits::ToPrimitive;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// A single value in the external term model.
#[derive(Debug, Clone)]
pub enum Term {
    /// Interned symbolic name.
    Atom(Atom),
    /// Integer that fits a machine word. Small integers, 32-bit
    /// integers, and downgraded bigs all normalize here.
    Int(i64),
    /// Arbitrary-precision integer, only for magnitudes at or beyond
    /// the downgrade bound.
    BigInt(Box<BigInt>),
    /// IEEE-754 double.
    Float(f64),
    /// Byte string (the `STRING_EXT` shorthand for a list of bytes).
    String(Vec<u8>),
    /// Arbitrary byte sequence.
    Binary(Vec<u8>),
    /// Byte sequence whose last byte carries only `bits` significant
    /// low-order bits.
    BitBinary {
        /// The payload, trailing bits normalized into the low end of
        /// the last byte.
        data: Vec<u8>,
        /// Significant bits in the final byte (1..=8).
        bits: u8,
    },
    /// The empty list.
    Nil,
    /// Proper list (nil-terminated on the wire).
    List(Vec<Term>),
    /// List whose tail is not the empty list.
    ImproperList {
        /// The leading elements.
        elements: Vec<Term>,
        /// The non-nil tail.
        tail: Box<Term>,
    },
    /// Fixed-length ordered sequence.
    Tuple(Vec<Term>),
    /// Term-to-term mapping.
    Map(Map),
    /// Process identifier.
    Pid(Pid),
    /// Opaque identity token.
    Ref(Ref),
    /// Port identifier.
    Port(Port),
    /// A fun. Decoded for transit, never invoked.
    Function(Box<Function>),
}

impl Term {
    /// Shorthand for an atom term.
    pub fn atom(name: &str) -> Self {
        Term::Atom(Atom::new(name))
    }

    /// Returns the atom if this term is one.
    pub fn as_atom(&self) -> Option<Atom> {
        match self {
            Term::Atom(a) => Some(*a),
            _ => None,
        }
    }

    /// Returns the integer value if this term holds one that fits i64.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Term::Int(v) => Some(*v),
            Term::BigInt(b) => b.to_i64(),
            _ => None,
        }
    }

    /// Returns the PID if this term is one.
    pub fn as_pid(&self) -> Option<Pid> {
        match self {
            Term::Pid(pid) => Some(*pid),
            _ => None,
        }
    }

    /// Returns the tuple elements if this term is a tuple.
    pub fn as_tuple(&self) -> Option<&[Term]> {
        match self {
            Term::Tuple(elements) => Some(elements),
            _ => None,
        }
    }
}

impl From<i64> for Term {
    fn from(v: i64) -> Self {
        Term::Int(v)
    }
}

impl From<Atom> for Term {
    fn from(a: Atom) -> Self {
        Term::Atom(a)
    }
}

impl From<Pid> for Term {
    fn from(pid: Pid) -> Self {
        Term::Pid(pid)
    }
}

impl PartialEq for Term {
    fn eq(&self, other: &Self) -> bool {
        use Term::*;
        match (self, other) {
            (Atom(a), Atom(b)) => a == b,
            (Int(a), Int(b)) => a == b,
            (BigInt(a), BigInt(b)) => a == b,
            (Int(a), BigInt(b)) | (BigInt(b), Int(a)) => b.to_i64() == Some(*a),
            (Float(a), Float(b)) => a.to_bits() == b.to_bits(),
            (String(a), String(b)) => a == b,
            (Binary(a), Binary(b)) => a == b,
            (
                BitBinary { data: a, bits: ab },
                BitBinary { data: b, bits: bb },
            ) => a == b && ab == bb,
            (Nil, Nil) => true,
            (List(a), List(b)) => a == b,
            (
                ImproperList {
                    elements: a,
                    tail: at,
                },
                ImproperList {
                    elements: b,
                    tail: bt,
                },
            ) => a == b && at == bt,
            (Tuple(a), Tuple(b)) => a == b,
            (Map(a), Map(b)) => a == b,
            (Pid(a), Pid(b)) => a == b,
            (Ref(a), Ref(b)) => a == b,
            (Port(a), Port(b)) => a == b,
            (Function(a), Function(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Term {}

impl Hash for Term {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            Term::Atom(a) => {
                state.write_u8(0);
                a.hash(state);
            }
            // Int and an i64-range BigInt are equal, so they must hash
            // alike: any big that fits i64 hashes through the Int path.
            Term::Int(v) => {
                state.write_u8(1);
                v.hash(state);
            }
            Term::BigInt(b) => match b.to_i64() {
                Some(v) => {
                    state.write_u8(1);
                    v.hash(state);
                }
                None => {
                    state.write_u8(2);
                    let (sign, bytes) = b.to_bytes_be();
                    (sign == num_bigint::Sign::Minus).hash(state);
                    bytes.hash(state);
                }
            },
            Term::Float(v) => {
                state.write_u8(3);
                v.to_bits().hash(state);
            }
            Term::String(bytes) => {
                state.write_u8(4);
                bytes.hash(state);
            }
            Term::Binary(bytes) => {
                state.write_u8(5);
                bytes.hash(state);
            }
            Term::BitBinary { data, bits } => {
                state.write_u8(6);
                data.hash(state);
                bits.hash(state);
            }
            Term::Nil => state.write_u8(7),
            Term::List(elements) => {
                state.write_u8(8);
                elements.hash(state);
            }
            Term::ImproperList { elements, tail } => {
                state.write_u8(9);
                elements.hash(state);
                tail.hash(state);
            }
            Term::Tuple(elements) => {
                state.write_u8(10);
                elements.hash(state);
            }
            Term::Map(map) => {
                state.write_u8(11);
                map.hash(state);
            }
            Term::Pid(pid) => {
                state.write_u8(12);
                pid.hash(state);
            }
            Term::Ref(r) => {
                state.write_u8(13);
                r.hash(state);
            }
            Term::Port(p) => {
                state.write_u8(14);
                p.hash(state);
            }
            Term::Function(f) => {
                state.write_u8(15);
                f.hash(state);
            }
        }
    }
}

/// A term-to-term mapping.
///
/// Entries keep their insertion order for encoding, but two maps are
/// equal whenever they contain the same key→value pairs in any order.
/// Keys are unique under term equality; inserting an existing key
/// replaces its value.
#[derive(Debug, Clone, Default)]
pub struct Map {
    entries: Vec<(Term, Term)>,
}

impl Map {
    /// Creates an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty map with room for `capacity` entries.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
        }
    }

    /// Inserts a key/value pair, replacing and returning the previous
    /// value if the key was present.
    pub fn insert(&mut self, key: Term, value: Term) -> Option<Term> {
        for (k, v) in &mut self.entries {
            if *k == key {
                return Some(std::mem::replace(v, value));
            }
        }
        self.entries.push((key, value));
        None
    }

    /// Looks up a value by key.
    pub fn get(&self, key: &Term) -> Option<&Term> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the map has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&Term, &Term)> {
        self.entries.iter().map(|(k, v)| (k, v))
    }
}

impl PartialEq for Map {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len()
            && self.iter().all(|(k, v)| other.get(k) == Some(v))
    }
}

impl Eq for Map {}

impl Hash for Map {
    fn hash<H: Hasher>(&self, state: &mut H) {
        // Order-independent: fold per-entry hashes commutatively so
        // insertion order cannot leak into the map's identity.
        let mut acc: u64 = 0;
        for (k, v) in &self.entries {
            let mut h = DefaultHasher::new();
            k.hash(&mut h);
            v.hash(&mut h);
            acc = acc.wrapping_add(h.finish());
        }
        state.write_usize(self.entries.len());
        state.write_u64(acc);
    }
}

impl FromIterator<(Term, Term)> for Map {
    fn from_iter<I: IntoIterator<Item = (Term, Term)>>(iter: I) -> Self {
        let mut map = Map::new();
        for (k, v) in iter {
            map.insert(k, v);
        }
        map
    }
}

/// A fun carried through the cluster.
///
/// The runtime decodes funs for transit but never invokes them.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Function {
    /// Number of arguments.
    pub arity: u8,
    /// MD5-style uniqueness fingerprint.
    pub unique: [u8; 16],
    /// Index into the originating module's fun table.
    pub index: u32,
    /// Pre-fingerprint index, kept for wire compatibility.
    pub old_index: u32,
    /// Pre-fingerprint uniqueness hash, kept for wire compatibility.
    pub old_unique: u32,
    /// Module the fun was defined in.
    pub module: Atom,
    /// Process that created the fun.
    pub pid: Pid,
    /// Captured free variables.
    pub free_vars: Vec<Term>,
}
