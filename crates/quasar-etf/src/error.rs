//! Decoder error types.
//!
//! Every tag class has its own error variant so callers (and tests) can
//! tell exactly which structure a malformed packet died in. No partially
//! decoded term ever escapes alongside an error.

use thiserror::Error;

/// Failure while decoding an External Term Format packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// Truncated or invalid atom (u16-length encodings).
    #[error("malformed ETF: atom")]
    Atom,
    /// Truncated or invalid atom (u8-length encodings).
    #[error("malformed ETF: small atom")]
    SmallAtom,
    /// Truncated byte string.
    #[error("malformed ETF: string")]
    String,
    /// Atom cache reference without a usable cache slot.
    #[error("malformed ETF: atom cache ref")]
    CacheRef,
    /// Truncated float.
    #[error("malformed ETF: float")]
    Float,
    /// Truncated small integer.
    #[error("malformed ETF: small integer")]
    SmallInteger,
    /// Truncated 32-bit integer.
    #[error("malformed ETF: integer")]
    Integer,
    /// Truncated small big integer.
    #[error("malformed ETF: small big")]
    SmallBig,
    /// Truncated or under-length large big integer.
    #[error("malformed ETF: large big")]
    LargeBig,
    /// Truncated or zero-length list header.
    #[error("malformed ETF: list")]
    List,
    /// Truncated small tuple.
    #[error("malformed ETF: small tuple")]
    SmallTuple,
    /// Truncated large tuple.
    #[error("malformed ETF: large tuple")]
    LargeTuple,
    /// Truncated map.
    #[error("malformed ETF: map")]
    Map,
    /// Truncated binary.
    #[error("malformed ETF: binary")]
    Binary,
    /// Truncated or invalid bit binary.
    #[error("malformed ETF: bit binary")]
    BitBinary,
    /// Truncated or invalid legacy PID.
    #[error("malformed ETF: pid")]
    Pid,
    /// Truncated or invalid PID.
    #[error("malformed ETF: new pid")]
    NewPid,
    /// Truncated or invalid reference.
    #[error("malformed ETF: reference")]
    Ref,
    /// Truncated or invalid legacy port.
    #[error("malformed ETF: port")]
    Port,
    /// Truncated or invalid port.
    #[error("malformed ETF: new port")]
    NewPort,
    /// Truncated or invalid fun.
    #[error("malformed ETF: fun")]
    Fun,
    /// Tag byte outside the supported set.
    #[error("malformed ETF: unknown term tag {0}")]
    UnknownType(u8),
    /// Bytes left over after the root term (strict packet framing).
    #[error("malformed ETF: incorrect packet length")]
    PacketLength,
    /// Packet ended where a term tag was expected.
    #[error("malformed ETF")]
    Malformed,
    /// Decoder invariant violation; indicates a codec bug, not bad input.
    #[error("internal decoder error")]
    Internal,
}
