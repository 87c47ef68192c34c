/******************************************************************************/
/*                                                                            */
/* SPDX-License-Identifier: MIT                                               */
/* Copyright (c) [2023] Serokell <hi@serokell.io>                             */
/*                                                                            */
/******************************************************************************/

//! Micheline serialization.

use std::mem::size_of;

use num_bigint::{BigInt, BigUint, Sign};
use num_traits::Zero;

use super::constants::*;
use crate::{
    ast::{annotations::Annotations, Micheline},
    lexer::{Annotation, Prim},
};

trait AppEncoder<'a>: IntoIterator<Item = &'a Micheline<'a>> + Sized {
    const NO_ANNOTS_TAG: u8;
    const WITH_ANNOTS_TAG: u8;
    fn encode(prim: &Prim, args: Self, annots: &Annotations, out: &mut Vec<u8>) {
        if annots.is_empty() {
            out.push(Self::NO_ANNOTS_TAG);
        } else {
            out.push(Self::WITH_ANNOTS_TAG);
        }
        out.push(prim.tag());
        for arg in args {
            encode_micheline(arg, out)
        }
        if !annots.is_empty() {
            annots.encode_bytes(out)
        }
    }
}

impl<'a> AppEncoder<'a> for [&'a Micheline<'a>; 0] {
    const NO_ANNOTS_TAG: u8 = APP_NO_ARGS_NO_ANNOTS_TAG;
    const WITH_ANNOTS_TAG: u8 = APP_NO_ARGS_WITH_ANNOTS_TAG;
}

impl<'a> AppEncoder<'a> for [&'a Micheline<'a>; 1] {
    const NO_ANNOTS_TAG: u8 = APP_ONE_ARG_NO_ANNOTS_TAG;
    const WITH_ANNOTS_TAG: u8 = APP_ONE_ARG_WITH_ANNOTS_TAG;
}

impl<'a> AppEncoder<'a> for [&'a Micheline<'a>; 2] {
    const NO_ANNOTS_TAG: u8 = APP_TWO_ARGS_NO_ANNOTS_TAG;
    const WITH_ANNOTS_TAG: u8 = APP_TWO_ARGS_WITH_ANNOTS_TAG;
}

impl<'a> AppEncoder<'a> for &'a [Micheline<'a>] {
    const NO_ANNOTS_TAG: u8 = APP_GENERIC;
    const WITH_ANNOTS_TAG: u8 = APP_GENERIC;
    fn encode(prim: &Prim, args: Self, annots: &Annotations, out: &mut Vec<u8>) {
        match args {
            [] => AppEncoder::encode(prim, [], annots, out),
            [arg] => AppEncoder::encode(prim, [arg], annots, out),
            [arg1, arg2] => AppEncoder::encode(prim, [arg1, arg2], annots, out),
            _ => {
                out.push(Self::WITH_ANNOTS_TAG);
                out.push(prim.tag());
                with_patchback_len(out, |out| {
                    for arg in args {
                        encode_micheline(arg, out)
                    }
                });
                // the generic form always carries the annotation block
                annots.encode_bytes(out)
            }
        }
    }
}

impl Annotation<'_> {
    pub fn encode_bytes(&self, out: &mut Vec<u8>) {
        match self {
            Annotation::Special(s) => out.extend_from_slice(s.as_bytes()),
            Annotation::Field(s) => {
                out.push(b'%');
                out.extend_from_slice(s.as_bytes());
            }
            Annotation::Variable(s) => {
                out.push(b'@');
                out.extend_from_slice(s.as_bytes());
            }
            Annotation::Type(s) => {
                out.push(b':');
                out.extend_from_slice(s.as_bytes());
            }
        }
    }
}

impl Annotations<'_> {
    pub fn encode_bytes(&self, out: &mut Vec<u8>) {
        with_patchback_len(out, |out| {
            // Add them space-separated
            let mut is_first = true;
            for ann in self.iter() {
                if !is_first {
                    out.push(b' ')
                }
                is_first = false;
                ann.encode_bytes(out);
            }
        })
    }
}

/// Length of some container, usually stored as fixed-length number.
type Len = u32;

/// Put length of something.
fn put_len(len: Len, out: &mut Vec<u8>) {
    out.extend_from_slice(&len.to_be_bytes())
}

/// Put bytestring (with its length).
fn put_bytes(bs: &[u8], out: &mut Vec<u8>) {
    out.push(BYTES_TAG);
    put_len(bs.len() as Len, out);
    out.extend_from_slice(bs)
}

/// Put a Michelson string.
fn put_string(s: &str, out: &mut Vec<u8>) {
    out.push(STRING_TAG);
    put_len(s.len() as Len, out);
    out.extend_from_slice(s.as_bytes())
}

/// Lowest `bits` bits of `n`.
fn low_bits(n: &BigUint, bits: u32) -> u8 {
    let lowest = n.iter_u32_digits().next().unwrap_or(0);
    (lowest & ((1u32 << bits) - 1)) as u8
}

/// Put an integer in the zarith encoding: little-endian groups of 7 bits with
/// the high bit marking continuation. The first group only holds 6 bits, the
/// remaining one is the sign.
fn put_int(n: &BigInt, out: &mut Vec<u8>) {
    out.push(NUMBER_TAG);
    let mut mag = n.magnitude().clone();
    let mut byte = low_bits(&mag, 6);
    if n.sign() == Sign::Minus {
        byte |= 0x40;
    }
    mag >>= 6u32;
    while !mag.is_zero() {
        out.push(byte | 0x80);
        byte = low_bits(&mag, 7);
        mag >>= 7u32;
    }
    out.push(byte);
}

fn with_patchback_len(out: &mut Vec<u8>, f: impl FnOnce(&mut Vec<u8>)) {
    put_len(0, out); // don't know the right length in advance
    let i = out.len();
    let len_place = (i - size_of::<Len>())..i; // to fill length later
    f(out);
    let len_of_written = (out.len() - i) as Len;
    out[len_place].copy_from_slice(&len_of_written.to_be_bytes())
}

/// Put a container.
fn put_seq<V>(list: &[V], out: &mut Vec<u8>, encoder: fn(&V, &mut Vec<u8>)) {
    out.push(SEQ_TAG);
    with_patchback_len(out, |out| {
        for val in list {
            encoder(val, out)
        }
    });
}

/// Recursive encoding function for [Micheline].
fn encode_micheline(mich: &Micheline, out: &mut Vec<u8>) {
    use Micheline::*;
    match mich {
        Int(i) => put_int(i, out),
        String(s) => put_string(s, out),
        Bytes(b) => put_bytes(b, out),
        Seq(s) => put_seq(s, out, encode_micheline),
        App(prim, args, anns) => AppEncoder::encode(prim, *args, anns, out),
    }
}

impl<'a> Micheline<'a> {
    /// Serialize a value generically, without the `0x05` tag.
    pub fn encode(&self) -> Vec<u8> {
        self.encode_starting_with(&[])
    }

    /// Serialize a value generically, prefixed with the `0x05` tag.
    pub fn encode_for_pack(&self) -> Vec<u8> {
        self.encode_starting_with(&[PACK_TAG])
    }

    /// Like [Micheline::encode], but allows specifying a prefix.
    fn encode_starting_with(&self, start_bytes: &[u8]) -> Vec<u8> {
        let mut out = Vec::from(start_bytes);
        encode_micheline(self, &mut out);
        out
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[track_caller]
    fn check<'a>(v: impl Into<Micheline<'a>>, hex_bytes: &str) {
        let hex_bytes: &str = hex_bytes
            .strip_prefix("0x")
            .expect("The `expected` argument must start from 0x");
        assert_eq!(
            v.into().encode(),
            hex::decode(hex_bytes).expect("Bad hex string in `expected` argument")
        );
    }

    // To figure out the expected bytes, use
    // octez-client convert data 'VALUE' from michelson to binary

    mod value {
        use super::*;
        use crate::ast::micheline::test_helpers::{app, seq};

        #[test]
        fn primitive_values() {
            check((), "0x030b");
            check(true, "0x030a");
            check(false, "0x0303");
        }

        #[test]
        fn numbers() {
            check(0, "0x0000");
            check(1, "0x0001");
            check(63, "0x003f");
            check(64, "0x008001");
            check(123456789, "0x0095b4de75");
            check(-1, "0x0041");
            check(-63, "0x007f");
            check(-64, "0x00c001");
            check(-987654321, "0x00f1a2f3ad07");
        }

        #[test]
        fn simple_nested() {
            check(app!(Pair[true, ""]), "0x0707030a0100000000");
            check(app!(Some[app!(Unit)]), "0x0509030b");
            check(app!(Elt[true, ()]), "0x0704030a030b");
            check(
                seq! { app!(DROP); app!(LAMBDA[app!(unit), app!(unit), seq!{}]) },
                "0x02000000150320093100000009036c036c020000000000000000",
            );
        }

        #[test]
        fn strings_and_bytes() {
            check("", "0x0100000000");
            check("abc", "0x0100000003616263");
            check(hex::decode("001234abff").unwrap(), "0x0a00000005001234abff");
            // length is a fixed-width number, not zarith
            let long = "x".repeat(1000);
            assert_eq!(&Micheline::from(long).encode()[..5], &[0x01, 0, 0, 0x03, 0xe8]);
        }

        #[test]
        fn lists() {
            check(seq! {}, "0x0200000000");
            check(seq! {true; false}, "0x0200000004030a0303");
            check(
                seq! {app!(Pair[3, 4]); app!(Pair[5, 6])},
                "0x020000000c070700030004070700050006",
            );
        }
    }

    mod annotations {
        use super::*;
        use crate::parser::test_helpers::*;

        #[test]
        fn trivial() {
            check(parse("(int %a)").unwrap(), "0x045b000000022561");
            check(parse("(int :a)").unwrap(), "0x045b000000023a61");
            check(
                parse("(int @abc123)").unwrap(),
                "0x045b0000000740616263313233",
            );
        }

        #[test]
        fn several_annotations() {
            check(
                parse("(int %a :b @c %d)").unwrap(),
                "0x045b0000000b2561203a62204063202564",
            );
        }

        #[test]
        fn generic_case() {
            check(
                parse("LAMBDA (int %a) (int :b) {}").unwrap(),
                "0x093100000015045b000000022561045b000000023a62020000000000000000",
            );
        }
    }
}
