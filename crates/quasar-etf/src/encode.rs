//! External Term Format encoder.
//!
//! The inverse of [`decode`](crate::decode::decode): every value is
//! written in the smallest encoding that holds it, and identifier
//! types always use the modern tags (full 32-bit creation). Like the
//! decoder it walks terms with an explicit job stack, so deeply nested
//! values do not recurse.
//!
//! For any term the decoder can produce, `decode(&encode(t), None)`
//! returns a term equal to `t`.

use crate::consts::*;
use crate::pid::Pid;
use crate::term::{Function, Term};
use num_bigint::Sign;

/// One unit of pending encoding work.
enum Job<'a> {
    /// Encode a term.
    Term(&'a Term),
    /// Write the nil tail that closes a proper list.
    NilTail,
    /// Backfill a fun's size field, which counts every byte from the
    /// field itself to the end of the fun.
    PatchFunSize {
        /// Offset of the size field in the output.
        at: usize,
    },
}

/// Encodes one term, without the leading version byte (transports that
/// need `131` prepend it themselves).
pub fn encode(term: &Term) -> Vec<u8> {
    let mut buf = Vec::new();
    let mut jobs = vec![Job::Term(term)];

    while let Some(job) = jobs.pop() {
        match job {
            Job::NilTail => buf.push(NIL_EXT),

            Job::PatchFunSize { at } => {
                let size = (buf.len() - at) as u32;
                buf[at..at + 4].copy_from_slice(&size.to_be_bytes());
            }

            Job::Term(term) => match term {
                Term::Atom(atom) => write_atom(&mut buf, &atom.as_str()),

                Term::Int(v) => write_int(&mut buf, *v),

                Term::BigInt(big) => {
                    let (sign, bytes) = big.to_bytes_le();
                    write_big(&mut buf, sign == Sign::Minus, &bytes);
                }

                Term::Float(v) => {
                    buf.push(NEW_FLOAT_EXT);
                    buf.extend_from_slice(&v.to_bits().to_be_bytes());
                }

                Term::String(bytes) => {
                    if let Ok(n) = u16::try_from(bytes.len()) {
                        buf.push(STRING_EXT);
                        buf.extend_from_slice(&n.to_be_bytes());
                        buf.extend_from_slice(bytes);
                    } else {
                        // Too long for the string shorthand; fall back
                        // to the list-of-bytes form it abbreviates.
                        buf.push(LIST_EXT);
                        buf.extend_from_slice(&(bytes.len() as u32).to_be_bytes());
                        for b in bytes {
                            buf.push(SMALL_INTEGER_EXT);
                            buf.push(*b);
                        }
                        buf.push(NIL_EXT);
                    }
                }

                Term::Binary(bytes) => {
                    buf.push(BINARY_EXT);
                    buf.extend_from_slice(&(bytes.len() as u32).to_be_bytes());
                    buf.extend_from_slice(bytes);
                }

                Term::BitBinary { data, bits } => {
                    buf.push(BIT_BINARY_EXT);
                    buf.extend_from_slice(&(data.len() as u32).to_be_bytes());
                    buf.push(*bits);
                    buf.extend_from_slice(data);
                    // The partial byte travels in the high bits.
                    if !data.is_empty() && *bits >= 1 && *bits <= 8 {
                        let last = buf.len() - 1;
                        buf[last] <<= 8 - bits;
                    }
                }

                Term::Nil => buf.push(NIL_EXT),

                Term::List(elements) => {
                    buf.push(LIST_EXT);
                    buf.extend_from_slice(&(elements.len() as u32).to_be_bytes());
                    jobs.push(Job::NilTail);
                    for element in elements.iter().rev() {
                        jobs.push(Job::Term(element));
                    }
                }

                Term::ImproperList { elements, tail } => {
                    buf.push(LIST_EXT);
                    buf.extend_from_slice(&(elements.len() as u32).to_be_bytes());
                    jobs.push(Job::Term(tail));
                    for element in elements.iter().rev() {
                        jobs.push(Job::Term(element));
                    }
                }

                Term::Tuple(elements) => {
                    if let Ok(n) = u8::try_from(elements.len()) {
                        buf.push(SMALL_TUPLE_EXT);
                        buf.push(n);
                    } else {
                        buf.push(LARGE_TUPLE_EXT);
                        buf.extend_from_slice(&(elements.len() as u32).to_be_bytes());
                    }
                    for element in elements.iter().rev() {
                        jobs.push(Job::Term(element));
                    }
                }

                Term::Map(map) => {
                    buf.push(MAP_EXT);
                    buf.extend_from_slice(&(map.len() as u32).to_be_bytes());
                    // Key then value per entry, entries in insertion
                    // order once popped.
                    let entries: Vec<_> = map.iter().collect();
                    for (key, value) in entries.into_iter().rev() {
                        jobs.push(Job::Term(value));
                        jobs.push(Job::Term(key));
                    }
                }

                Term::Pid(pid) => write_pid(&mut buf, pid),

                Term::Ref(r) => {
                    buf.push(NEWER_REFERENCE_EXT);
                    buf.extend_from_slice(&(r.id().len() as u16).to_be_bytes());
                    write_atom(&mut buf, &r.node().as_str());
                    buf.extend_from_slice(&r.creation().to_be_bytes());
                    for word in r.id() {
                        buf.extend_from_slice(&word.to_be_bytes());
                    }
                }

                Term::Port(port) => {
                    buf.push(NEW_PORT_EXT);
                    write_atom(&mut buf, &port.node().as_str());
                    buf.extend_from_slice(&port.id().to_be_bytes());
                    buf.extend_from_slice(&port.creation().to_be_bytes());
                }

                Term::Function(fun) => write_fun(&mut buf, &mut jobs, fun),
            },
        }
    }

    buf
}

/// Writes an atom in the smallest UTF-8 encoding.
///
/// # Panics
///
/// Panics if the name exceeds 65535 bytes; the atom table never holds
/// names anywhere near the wire limit in practice.
fn write_atom(buf: &mut Vec<u8>, name: &str) {
    let bytes = name.as_bytes();
    if let Ok(n) = u8::try_from(bytes.len()) {
        buf.push(SMALL_ATOM_UTF8_EXT);
        buf.push(n);
    } else {
        let n = u16::try_from(bytes.len()).expect("atom name too long for the wire format");
        buf.push(ATOM_UTF8_EXT);
        buf.extend_from_slice(&n.to_be_bytes());
    }
    buf.extend_from_slice(bytes);
}

/// Writes an i64 in the smallest integer encoding.
fn write_int(buf: &mut Vec<u8>, v: i64) {
    if (0..=255).contains(&v) {
        buf.push(SMALL_INTEGER_EXT);
        buf.push(v as u8);
    } else if let Ok(v32) = i32::try_from(v) {
        buf.push(INTEGER_EXT);
        buf.extend_from_slice(&v32.to_be_bytes());
    } else {
        let magnitude = v.unsigned_abs().to_le_bytes();
        let used = 8 - magnitude.iter().rev().take_while(|b| **b == 0).count();
        write_big(buf, v < 0, &magnitude[..used]);
    }
}

/// Writes a big integer from its little-endian magnitude.
fn write_big(buf: &mut Vec<u8>, negative: bool, le_bytes: &[u8]) {
    if let Ok(n) = u8::try_from(le_bytes.len()) {
        buf.push(SMALL_BIG_EXT);
        buf.push(n);
    } else {
        buf.push(LARGE_BIG_EXT);
        buf.extend_from_slice(&(le_bytes.len() as u32).to_be_bytes());
    }
    buf.push(negative as u8);
    buf.extend_from_slice(le_bytes);
}

fn write_pid(buf: &mut Vec<u8>, pid: &Pid) {
    buf.push(NEW_PID_EXT);
    write_atom(buf, &pid.node().as_str());
    buf.extend_from_slice(&pid.id().to_be_bytes());
    buf.extend_from_slice(&pid.serial().to_be_bytes());
    buf.extend_from_slice(&pid.creation().to_be_bytes());
}

fn write_fun<'a>(buf: &mut Vec<u8>, jobs: &mut Vec<Job<'a>>, fun: &'a Function) {
    buf.push(NEW_FUN_EXT);
    let at = buf.len();
    buf.extend_from_slice(&[0; 4]); // size, patched afterwards
    buf.push(fun.arity);
    buf.extend_from_slice(&fun.unique);
    buf.extend_from_slice(&fun.index.to_be_bytes());
    buf.extend_from_slice(&(fun.free_vars.len() as u32).to_be_bytes());
    write_atom(buf, &fun.module.as_str());
    write_int(buf, fun.old_index as i64);
    write_int(buf, fun.old_unique as i64);
    write_pid(buf, &fun.pid);
    jobs.push(Job::PatchFunSize { at });
    for var in fun.free_vars.iter().rev() {
        jobs.push(Job::Term(var));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atom;
    use crate::atom::Atom;
    use crate::decode::decode;
    use crate::reference::{Port, Ref};
    use crate::term::Map;
    use num_bigint::BigInt;

    fn roundtrip(term: &Term) -> Term {
        decode(&encode(term), None).unwrap()
    }

    #[test]
    fn test_roundtrip_atoms() {
        for name in ["", "ok", "EXIT", "node@localhost", "✓✓✓"] {
            let term = Term::Atom(Atom::new(name));
            assert_eq!(roundtrip(&term), term);
        }
        // A name longer than one length byte forces the u16 encoding.
        let long = "a".repeat(300);
        let term = Term::Atom(Atom::new(&long));
        let bytes = encode(&term);
        assert_eq!(bytes[0], ATOM_UTF8_EXT);
        assert_eq!(roundtrip(&term), term);
    }

    #[test]
    fn test_integer_boundaries_pick_smallest_encoding() {
        let cases: &[(i64, u8)] = &[
            (0, SMALL_INTEGER_EXT),
            (1, SMALL_INTEGER_EXT),
            (255, SMALL_INTEGER_EXT),
            (-1, INTEGER_EXT),
            (256, INTEGER_EXT),
            (i32::MIN as i64, INTEGER_EXT),
            (i32::MAX as i64, INTEGER_EXT),
            (i32::MAX as i64 + 1, SMALL_BIG_EXT),
            (1 << 60, SMALL_BIG_EXT),
            ((1 << 60) + 1, SMALL_BIG_EXT),
            (-(1 << 60), SMALL_BIG_EXT),
        ];
        for (value, tag) in cases {
            let term = Term::Int(*value);
            let bytes = encode(&term);
            assert_eq!(bytes[0], *tag, "value {}", value);
            assert_eq!(roundtrip(&term), term, "value {}", value);
        }
    }

    #[test]
    fn test_roundtrip_floats() {
        for v in [0.0, -1.5, f64::MAX, f64::MIN_POSITIVE] {
            assert_eq!(roundtrip(&Term::Float(v)), Term::Float(v));
        }
    }

    #[test]
    fn test_roundtrip_lists() {
        let proper = Term::List(vec![Term::Int(1), Term::Int(2)]);
        assert_eq!(roundtrip(&proper), proper);

        let improper = Term::ImproperList {
            elements: vec![Term::Int(1), Term::Int(2)],
            tail: Box::new(Term::Int(3)),
        };
        assert_eq!(roundtrip(&improper), improper);

        assert_eq!(roundtrip(&Term::Nil), Term::Nil);
    }

    #[test]
    fn test_roundtrip_map_insertion_order_irrelevant() {
        let ab: Map = [
            (Term::atom("a"), Term::Int(1)),
            (Term::atom("b"), Term::Int(2)),
        ]
        .into_iter()
        .collect();
        let ba: Map = [
            (Term::atom("b"), Term::Int(2)),
            (Term::atom("a"), Term::Int(1)),
        ]
        .into_iter()
        .collect();

        assert_eq!(
            decode(&encode(&Term::Map(ab)), None).unwrap(),
            decode(&encode(&Term::Map(ba)), None).unwrap()
        );
    }

    #[test]
    fn test_roundtrip_binaries() {
        let binary = Term::Binary(vec![0, 1, 2, 255]);
        assert_eq!(roundtrip(&binary), binary);

        let bit = Term::BitBinary {
            data: vec![0xab, 0x0f],
            bits: 4,
        };
        assert_eq!(roundtrip(&bit), bit);

        let string = Term::String(b"hello world".to_vec());
        assert_eq!(roundtrip(&string), string);
    }

    #[test]
    fn test_oversized_string_falls_back_to_list() {
        let long = Term::String(vec![7u8; 70_000]);
        match roundtrip(&long) {
            Term::List(elements) => {
                assert_eq!(elements.len(), 70_000);
                assert_eq!(elements[0], Term::Int(7));
            }
            other => panic!("expected list fallback, got {:?}", other),
        }
    }

    #[test]
    fn test_roundtrip_identifiers() {
        let node = atom!("n@h");
        let pid = Term::Pid(Pid::new(node, 1001, 1, 9));
        assert_eq!(roundtrip(&pid), pid);

        let reference = Term::Ref(Ref::new(node, vec![1, 2, 3], 7));
        assert_eq!(roundtrip(&reference), reference);

        let port = Term::Port(Port::new(node, 4, 2));
        assert_eq!(roundtrip(&port), port);
    }

    #[test]
    fn test_roundtrip_fun() {
        let fun = Term::Function(Box::new(Function {
            arity: 1,
            unique: [7; 16],
            index: 3,
            old_index: 1,
            old_unique: 99,
            module: atom!("lists"),
            pid: Pid::new(atom!("n@h"), 1001, 1, 1),
            free_vars: vec![Term::Int(5), Term::atom("x")],
        }));
        assert_eq!(roundtrip(&fun), fun);
    }

    #[test]
    fn test_roundtrip_big_integers() {
        let huge = Term::BigInt(Box::new(BigInt::from(1u8) << 2040));
        assert_eq!(roundtrip(&huge), huge);

        let negative = Term::BigInt(Box::new(-(BigInt::from(1u8) << 300usize)));
        assert_eq!(roundtrip(&negative), negative);
    }

    #[test]
    fn test_roundtrip_kitchen_sink() {
        let map: Map = [
            (Term::atom("pid"), Term::Pid(Pid::new(atom!("n@h"), 1, 1, 1))),
            (
                Term::Tuple(vec![Term::Int(1), Term::Float(2.5)]),
                Term::List(vec![Term::Binary(vec![9])]),
            ),
        ]
        .into_iter()
        .collect();
        let term = Term::Tuple(vec![
            Term::atom("state"),
            Term::Map(map),
            Term::ImproperList {
                elements: vec![Term::Int(300)],
                tail: Box::new(Term::atom("tail")),
            },
        ]);
        assert_eq!(roundtrip(&term), term);
    }

    #[test]
    fn test_deep_term_encodes_iteratively() {
        // Deep enough to break naive recursion, shallow enough that
        // the final drop of the nested value stays within test-thread
        // stack limits.
        const DEPTH: usize = 8_000;
        let mut term = Term::Int(1);
        for _ in 0..DEPTH {
            term = Term::Tuple(vec![term]);
        }
        let mut decoded = roundtrip(&term);
        // Dismantle both iteratively instead of comparing wholesale.
        let mut original = term;
        for _ in 0..DEPTH {
            match (original, decoded) {
                (Term::Tuple(mut a), Term::Tuple(mut b)) => {
                    assert_eq!(a.len(), 1);
                    assert_eq!(b.len(), 1);
                    original = a.pop().unwrap();
                    decoded = b.pop().unwrap();
                }
                _ => panic!("expected nested tuples"),
            }
        }
        assert_eq!(original, Term::Int(1));
        assert_eq!(decoded, Term::Int(1));
    }
}
