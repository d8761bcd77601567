//! # quasar-etf - External Term Format codec and term model
//!
//! This crate holds the data layer of the quasar runtime: the in-memory
//! [`Term`] model with its identity rules, the interned [`Atom`] table,
//! the cluster-scoped identifier types ([`Pid`], [`Ref`], [`Port`]),
//! and the binary codec for the self-describing External Term Format
//! used on the wire between nodes.
//!
//! The decoder is strictly bounds-checked and fully iterative - see
//! [`decode`] - so untrusted peers cannot crash a node with truncated
//! or adversarially nested packets. The [`encode`] function is its
//! inverse and always picks the smallest encoding that fits a value.
//!
//! # Example
//!
//! ```
//! use quasar_etf::{decode, encode, Term};
//!
//! let term = Term::Tuple(vec![Term::atom("ok"), Term::Int(42)]);
//! let bytes = encode(&term);
//! assert_eq!(decode(&bytes, None).unwrap(), term);
//! ```

#![warn(missing_docs)]

pub mod atom;
pub mod consts;
pub mod decode;
pub mod encode;
pub mod error;
pub mod pid;
pub mod reference;
pub mod term;

pub use atom::Atom;
pub use decode::{decode, AtomCache};
pub use encode::encode;
pub use error::DecodeError;
pub use pid::Pid;
pub use reference::{Port, Ref};
pub use term::{Function, Map, Term};
