//! External Term Format decoder.
//!
//! The decoder is iterative: one loop consumes a tag byte per step and
//! an explicit frame stack (a box-linked list) holds partially built
//! containers. There are no recursive calls, so adversarially nested
//! input cannot exhaust the host stack, and throughput does not pay for
//! call frames on deep terms.
//!
//! Two stages per iteration:
//!
//! 1. *Scalar production* - leaf tags read their payload (every length
//!    is bounds-checked first) and yield a [`Term`] directly.
//! 2. *Composite construction* - container tags push a frame recording
//!    how many children remain; produced leaves are placed into the top
//!    frame, and a full frame finalizes into a term that is delivered
//!    to its parent in turn.
//!
//! Packets use strict framing: trailing bytes after the root term are
//! an error, and no partially decoded term is ever returned.

use crate::atom::Atom;
use crate::consts::*;
use crate::error::DecodeError;
use crate::pid::Pid;
use crate::reference::{Port, Ref};
use crate::term::{Function, Map, Term};
use num_bigint::{BigInt, Sign};
use num_traits::ToPrimitive;

/// Per-connection cache of previously transmitted atoms.
///
/// `ATOM_CACHE_REF` tags index into this table and resolve in O(1).
#[derive(Debug, Clone, Default)]
pub struct AtomCache {
    atoms: Vec<Atom>,
}

impl AtomCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an atom, returning its cache index.
    pub fn push(&mut self, atom: Atom) -> u8 {
        self.atoms.push(atom);
        (self.atoms.len() - 1) as u8
    }

    /// Resolves a cache reference.
    pub fn get(&self, index: u8) -> Option<Atom> {
        self.atoms.get(index as usize).copied()
    }

    /// Number of cached atoms.
    pub fn len(&self) -> usize {
        self.atoms.len()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.atoms.is_empty()
    }
}

impl From<Vec<Atom>> for AtomCache {
    fn from(atoms: Vec<Atom>) -> Self {
        Self { atoms }
    }
}

/// Byte cursor with explicit, error-typed bounds checks.
struct Input<'a> {
    data: &'a [u8],
}

impl<'a> Input<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data }
    }

    fn remaining(&self) -> usize {
        self.data.len()
    }

    fn take(&mut self, n: usize, err: DecodeError) -> Result<&'a [u8], DecodeError> {
        if self.data.len() < n {
            return Err(err);
        }
        let (head, rest) = self.data.split_at(n);
        self.data = rest;
        Ok(head)
    }

    fn u8(&mut self, err: DecodeError) -> Result<u8, DecodeError> {
        Ok(self.take(1, err)?[0])
    }

    fn u16(&mut self, err: DecodeError) -> Result<u16, DecodeError> {
        let b = self.take(2, err)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    fn u32(&mut self, err: DecodeError) -> Result<u32, DecodeError> {
        let b = self.take(4, err)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn u64(&mut self, err: DecodeError) -> Result<u64, DecodeError> {
        let b = self.take(8, err)?;
        let mut buf = [0u8; 8];
        buf.copy_from_slice(b);
        Ok(u64::from_be_bytes(buf))
    }
}

/// Side storage a frame needs between children.
enum Scratch {
    None,
    /// A map key waiting for its value.
    MapKey(Term),
    /// Reference id word count, read before the node atom.
    RefIdLen(u16),
}

/// The container being assembled by a frame.
enum Building {
    List(Vec<Term>),
    Tuple(Vec<Term>),
    Map(Map),
    /// PID/port/reference waiting for its node atom child.
    Identifier,
    Fun(Box<Function>),
    /// Identifier finished; holds the assembled term.
    Done(Term),
}

/// One level of the composite-construction stack.
struct Frame {
    parent: Option<Box<Frame>>,
    tag: u8,
    building: Building,
    /// Children placed so far.
    next: usize,
    /// Children expected in total.
    children: usize,
    scratch: Scratch,
}

impl Frame {
    fn boxed(
        parent: Option<Box<Frame>>,
        tag: u8,
        building: Building,
        children: usize,
        scratch: Scratch,
    ) -> Box<Frame> {
        Box::new(Frame {
            parent,
            tag,
            building,
            next: 0,
            children,
            scratch,
        })
    }
}

/// Decodes one term from `packet`.
///
/// `cache` resolves `ATOM_CACHE_REF` tags; pass `None` when the
/// transport negotiated no atom cache. The packet must contain exactly
/// one term - trailing bytes yield [`DecodeError::PacketLength`].
pub fn decode(packet: &[u8], cache: Option<&AtomCache>) -> Result<Term, DecodeError> {
    let mut input = Input::new(packet);
    let mut stack: Option<Box<Frame>> = None;

    loop {
        let tag = input.u8(DecodeError::Malformed)?;

        // Stage 1: scalar production. Container tags push a frame and
        // restart the loop to read their first child.
        let term = match tag {
            ATOM_EXT | ATOM_UTF8_EXT => {
                let err = DecodeError::Atom;
                let n = input.u16(err)? as usize;
                let bytes = input.take(n, err)?;
                Term::Atom(Atom::from_utf8(bytes).map_err(|_| err)?)
            }

            SMALL_ATOM_EXT | SMALL_ATOM_UTF8_EXT => {
                let err = DecodeError::SmallAtom;
                let n = input.u8(err)? as usize;
                let bytes = input.take(n, err)?;
                Term::Atom(Atom::from_utf8(bytes).map_err(|_| err)?)
            }

            ATOM_CACHE_REF => {
                let index = input.u8(DecodeError::CacheRef)?;
                let atom = cache
                    .and_then(|c| c.get(index))
                    .ok_or(DecodeError::CacheRef)?;
                Term::Atom(atom)
            }

            STRING_EXT => {
                let err = DecodeError::String;
                let n = input.u16(err)? as usize;
                Term::String(input.take(n, err)?.to_vec())
            }

            NEW_FLOAT_EXT => Term::Float(f64::from_bits(input.u64(DecodeError::Float)?)),

            SMALL_INTEGER_EXT => Term::Int(input.u8(DecodeError::SmallInteger)? as i64),

            INTEGER_EXT => Term::Int(input.u32(DecodeError::Integer)? as i32 as i64),

            SMALL_BIG_EXT => {
                let err = DecodeError::SmallBig;
                let header = input.take(2, err)?;
                let n = header[0] as usize;
                let negative = header[1] == 1;
                big_to_term(negative, input.take(n, err)?)
            }

            LARGE_BIG_EXT => {
                let err = DecodeError::LargeBig;
                // Anything this short was required to use the small
                // encoding.
                if input.remaining() < LARGE_BIG_MIN_BYTES {
                    return Err(err);
                }
                let n = input.u32(err)? as usize;
                let negative = input.u8(err)? == 1;
                big_to_term(negative, input.take(n, err)?)
            }

            BINARY_EXT => {
                let err = DecodeError::Binary;
                let n = input.u32(err)? as usize;
                Term::Binary(input.take(n, err)?.to_vec())
            }

            BIT_BINARY_EXT => {
                let err = DecodeError::BitBinary;
                let n = input.u32(err)? as usize;
                let bits = input.u8(err)?;
                let mut data = input.take(n, err)?.to_vec();
                if n == 0 {
                    if bits != 0 {
                        return Err(err);
                    }
                } else {
                    if bits == 0 || bits > 8 {
                        return Err(err);
                    }
                    let last = data.len() - 1;
                    // Normalize the partial byte into its low bits.
                    data[last] >>= 8 - bits;
                }
                Term::BitBinary { data, bits }
            }

            NIL_EXT => Term::Nil,

            LIST_EXT => {
                let n = input.u32(DecodeError::List)? as usize;
                if n == 0 {
                    // The empty list must be encoded as NIL_EXT.
                    return Err(DecodeError::List);
                }
                // n + 1 children: the elements plus the tail term.
                let cap = (n + 1).min(input.remaining());
                stack = Some(Frame::boxed(
                    stack.take(),
                    tag,
                    Building::List(Vec::with_capacity(cap)),
                    n + 1,
                    Scratch::None,
                ));
                continue;
            }

            SMALL_TUPLE_EXT | LARGE_TUPLE_EXT => {
                let n = if tag == SMALL_TUPLE_EXT {
                    input.u8(DecodeError::SmallTuple)? as usize
                } else {
                    input.u32(DecodeError::LargeTuple)? as usize
                };
                if n == 0 {
                    Term::Tuple(Vec::new())
                } else {
                    let cap = n.min(input.remaining());
                    stack = Some(Frame::boxed(
                        stack.take(),
                        tag,
                        Building::Tuple(Vec::with_capacity(cap)),
                        n,
                        Scratch::None,
                    ));
                    continue;
                }
            }

            MAP_EXT => {
                let n = input.u32(DecodeError::Map)? as usize;
                if n == 0 {
                    Term::Map(Map::new())
                } else {
                    let cap = n.min(input.remaining());
                    stack = Some(Frame::boxed(
                        stack.take(),
                        tag,
                        Building::Map(Map::with_capacity(cap)),
                        n * 2,
                        Scratch::None,
                    ));
                    continue;
                }
            }

            PID_EXT | NEW_PID_EXT | PORT_EXT | NEW_PORT_EXT => {
                stack = Some(Frame::boxed(
                    stack.take(),
                    tag,
                    Building::Identifier,
                    1,
                    Scratch::None,
                ));
                continue;
            }

            NEW_REFERENCE_EXT | NEWER_REFERENCE_EXT => {
                // The id word count comes before the node atom child.
                let len = input.u16(DecodeError::Ref)?;
                stack = Some(Frame::boxed(
                    stack.take(),
                    tag,
                    Building::Identifier,
                    1,
                    Scratch::RefIdLen(len),
                ));
                continue;
            }

            NEW_FUN_EXT => {
                let err = DecodeError::Fun;
                if input.remaining() < 32 {
                    return Err(err);
                }
                let _size = input.u32(err)?;
                let arity = input.u8(err)?;
                let mut unique = [0u8; 16];
                unique.copy_from_slice(input.take(16, err)?);
                let index = input.u32(err)?;
                let num_free = input.u32(err)? as usize;
                let fun = Function {
                    arity,
                    unique,
                    index,
                    old_index: 0,
                    old_unique: 0,
                    module: Atom::empty(),
                    pid: Pid::new(Atom::empty(), 0, 0, 0),
                    free_vars: Vec::with_capacity(num_free.min(input.remaining())),
                };
                // Module, old index, old unique, pid, then free vars.
                stack = Some(Frame::boxed(
                    stack.take(),
                    tag,
                    Building::Fun(Box::new(fun)),
                    4 + num_free,
                    Scratch::None,
                ));
                continue;
            }

            other => return Err(DecodeError::UnknownType(other)),
        };

        // Stage 2: deliver the term into the open frame; a filled frame
        // finalizes and is delivered to its parent in turn.
        let mut term = term;
        loop {
            let mut frame = match stack.take() {
                None => {
                    if input.remaining() != 0 {
                        return Err(DecodeError::PacketLength);
                    }
                    return Ok(term);
                }
                Some(frame) => frame,
            };

            place_child(&mut frame, term, &mut input)?;
            frame.next += 1;

            if frame.next < frame.children {
                stack = Some(frame);
                break;
            }

            let parent = frame.parent.take();
            term = finish_frame(*frame)?;
            stack = parent;
        }
    }
}

/// Places one decoded child into the top frame. Identifier frames also
/// pull their fixed-width trailer out of the byte stream here.
fn place_child(frame: &mut Frame, term: Term, input: &mut Input<'_>) -> Result<(), DecodeError> {
    match frame.tag {
        LIST_EXT => match &mut frame.building {
            Building::List(elements) => elements.push(term),
            _ => return Err(DecodeError::Internal),
        },

        SMALL_TUPLE_EXT | LARGE_TUPLE_EXT => match &mut frame.building {
            Building::Tuple(elements) => elements.push(term),
            _ => return Err(DecodeError::Internal),
        },

        MAP_EXT => match &mut frame.building {
            Building::Map(map) => {
                if frame.next % 2 == 0 {
                    frame.scratch = Scratch::MapKey(term);
                } else {
                    match std::mem::replace(&mut frame.scratch, Scratch::None) {
                        Scratch::MapKey(key) => {
                            map.insert(key, term);
                        }
                        _ => return Err(DecodeError::Internal),
                    }
                }
            }
            _ => return Err(DecodeError::Internal),
        },

        PID_EXT => {
            let node = term.as_atom().ok_or(DecodeError::Pid)?;
            let err = DecodeError::Pid;
            let id = input.u32(err)?;
            let serial = input.u32(err)?;
            // Only two bits of the legacy creation are significant.
            let creation = (input.u8(err)? & 3) as u32;
            frame.building = Building::Done(Term::Pid(Pid::new(node, id, serial, creation)));
        }

        NEW_PID_EXT => {
            let node = term.as_atom().ok_or(DecodeError::NewPid)?;
            let err = DecodeError::NewPid;
            let id = input.u32(err)?;
            let serial = input.u32(err)?;
            let creation = input.u32(err)?;
            frame.building = Building::Done(Term::Pid(Pid::new(node, id, serial, creation)));
        }

        PORT_EXT => {
            let node = term.as_atom().ok_or(DecodeError::Port)?;
            let err = DecodeError::Port;
            let id = input.u32(err)?;
            let creation = input.u8(err)? as u32;
            frame.building = Building::Done(Term::Port(Port::new(node, id, creation)));
        }

        NEW_PORT_EXT => {
            let node = term.as_atom().ok_or(DecodeError::NewPort)?;
            let err = DecodeError::NewPort;
            let id = input.u32(err)?;
            let creation = input.u32(err)?;
            frame.building = Building::Done(Term::Port(Port::new(node, id, creation)));
        }

        NEW_REFERENCE_EXT | NEWER_REFERENCE_EXT => {
            let err = DecodeError::Ref;
            let node = term.as_atom().ok_or(err)?;
            let len = match std::mem::replace(&mut frame.scratch, Scratch::None) {
                Scratch::RefIdLen(len) => len as usize,
                _ => return Err(DecodeError::Internal),
            };
            let creation = if frame.tag == NEW_REFERENCE_EXT {
                input.u8(err)? as u32
            } else {
                input.u32(err)?
            };
            let mut id = Vec::with_capacity(len);
            for _ in 0..len {
                id.push(input.u32(err)?);
            }
            frame.building = Building::Done(Term::Ref(Ref::new(node, id, creation)));
        }

        NEW_FUN_EXT => match &mut frame.building {
            Building::Fun(fun) => match frame.next {
                0 => fun.module = term.as_atom().ok_or(DecodeError::Fun)?,
                1 => fun.old_index = term.as_int().ok_or(DecodeError::Fun)? as u32,
                2 => fun.old_unique = term.as_int().ok_or(DecodeError::Fun)? as u32,
                3 => fun.pid = term.as_pid().ok_or(DecodeError::Fun)?,
                _ => fun.free_vars.push(term),
            },
            _ => return Err(DecodeError::Internal),
        },

        _ => return Err(DecodeError::Internal),
    }
    Ok(())
}

/// Turns a filled frame into its assembled term.
fn finish_frame(frame: Frame) -> Result<Term, DecodeError> {
    match frame.building {
        Building::List(mut elements) => {
            // The final child is the tail: a nil tail makes the list
            // proper and is dropped, anything else is retained.
            match elements.pop() {
                Some(Term::Nil) => Ok(Term::List(elements)),
                Some(tail) => Ok(Term::ImproperList {
                    elements,
                    tail: Box::new(tail),
                }),
                None => Err(DecodeError::Internal),
            }
        }
        Building::Tuple(elements) => Ok(Term::Tuple(elements)),
        Building::Map(map) => Ok(Term::Map(map)),
        Building::Fun(fun) => Ok(Term::Function(fun)),
        Building::Done(term) => Ok(term),
        Building::Identifier => Err(DecodeError::Internal),
    }
}

/// Builds an integer term from a little-endian magnitude and sign.
///
/// Magnitudes of up to 7 bytes are assembled as an `i64` without any
/// heap allocation; longer ones go through [`BigInt`] and are
/// downgraded back to `i64` when they fit inside `±2^60`.
fn big_to_term(negative: bool, bytes: &[u8]) -> Term {
    if bytes.len() < 8 {
        let mut le = [0u8; 8];
        le[..bytes.len()].copy_from_slice(bytes);
        let magnitude = u64::from_le_bytes(le) as i64;
        return Term::Int(if negative { -magnitude } else { magnitude });
    }

    let mut be = bytes.to_vec();
    be.reverse();
    let sign = if negative { Sign::Minus } else { Sign::Plus };
    let big = BigInt::from_bytes_be(sign, &be);

    match big.to_i64() {
        Some(v) if -INT_DOWNGRADE_BOUND < v && v < INT_DOWNGRADE_BOUND => Term::Int(v),
        _ => Term::BigInt(Box::new(big)),
    }
}
