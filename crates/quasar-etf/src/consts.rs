//! External Term Format tag bytes and codec limits.
//!
//! Each encoded term starts with one of these tag bytes; the decoder
//! dispatches on them and the encoder picks the smallest encoding that
//! fits a value. Historical tags with modern replacements (old floats,
//! old references, export funs) are not part of the supported set.

/// Version byte preceding a term in distribution payloads. The codec
/// itself operates on the bytes after it; transports strip it.
pub const VERSION: u8 = 131;

/// IEEE-754 double, big-endian.
pub const NEW_FLOAT_EXT: u8 = 70;
/// Binary with a trailing partial byte.
pub const BIT_BINARY_EXT: u8 = 77;
/// Index into the per-connection atom cache.
pub const ATOM_CACHE_REF: u8 = 82;
/// PID with a 32-bit creation.
pub const NEW_PID_EXT: u8 = 88;
/// Port with a 32-bit creation.
pub const NEW_PORT_EXT: u8 = 89;
/// Reference with a 32-bit creation.
pub const NEWER_REFERENCE_EXT: u8 = 90;
/// Unsigned 8-bit integer.
pub const SMALL_INTEGER_EXT: u8 = 97;
/// Signed 32-bit integer.
pub const INTEGER_EXT: u8 = 98;
/// Atom, u16 length, Latin-1 era tag (decoded as UTF-8).
pub const ATOM_EXT: u8 = 100;
/// Port with an 8-bit creation.
pub const PORT_EXT: u8 = 102;
/// PID with an 8-bit creation (low 2 bits significant).
pub const PID_EXT: u8 = 103;
/// Tuple of up to 255 elements.
pub const SMALL_TUPLE_EXT: u8 = 104;
/// Tuple with a 32-bit arity.
pub const LARGE_TUPLE_EXT: u8 = 105;
/// The empty list.
pub const NIL_EXT: u8 = 106;
/// Byte string of up to 65535 bytes.
pub const STRING_EXT: u8 = 107;
/// List with an explicit tail term.
pub const LIST_EXT: u8 = 108;
/// Byte sequence with a 32-bit length.
pub const BINARY_EXT: u8 = 109;
/// Big integer with up to 255 magnitude bytes.
pub const SMALL_BIG_EXT: u8 = 110;
/// Big integer with a 32-bit magnitude length.
pub const LARGE_BIG_EXT: u8 = 111;
/// Fun with free variables.
pub const NEW_FUN_EXT: u8 = 112;
/// Reference with an 8-bit creation.
pub const NEW_REFERENCE_EXT: u8 = 114;
/// Atom, u8 length, Latin-1 era tag (decoded as UTF-8).
pub const SMALL_ATOM_EXT: u8 = 115;
/// Map with a 32-bit entry count.
pub const MAP_EXT: u8 = 116;
/// Atom, u16 length, UTF-8.
pub const ATOM_UTF8_EXT: u8 = 118;
/// Atom, u8 length, UTF-8.
pub const SMALL_ATOM_UTF8_EXT: u8 = 119;

/// Largest magnitude kept as an inline [`i64`](crate::term::Term::Int)
/// when decoding big integers: values strictly inside `±2^60` are
/// downgraded, everything else stays arbitrary-precision.
pub const INT_DOWNGRADE_BOUND: i64 = 1 << 60;

/// A [`LARGE_BIG_EXT`] term must have at least this much input left;
/// anything shorter was required to use the small encoding.
pub const LARGE_BIG_MIN_BYTES: usize = 256;
