/******************************************************************************/
/*                                                                            */
/* SPDX-License-Identifier: MIT                                               */
/* Copyright (c) [2023] Serokell <hi@serokell.io>                             */
/*                                                                            */
/******************************************************************************/

//! Reading the binary Micheline encoding back into an arena tree.

use bitvec::{order::Lsb0, vec::BitVec, view::BitView};
use num_bigint::{BigInt, Sign};
use smallvec::SmallVec;
use typed_arena::Arena;

use super::constants::*;
use crate::ast::annotations::{Annotations, NO_ANNS};
use crate::ast::Micheline;
use crate::lexer::{try_ann_from_str, Annotation, Prim};
use crate::parser::MAX_NESTING_DEPTH;

#[derive(PartialEq, Eq, Debug, Clone, Copy, thiserror::Error)]
pub enum DecodeError {
    #[error("trailing bytes after decoding the value")]
    TrailingBytes,
    #[error("PACK tag 0x05 not found")]
    BadMagicByte,
    #[error("expected more data, but got EOF")]
    UnexpectedEof,
    #[error("unknown tag: {0}")]
    UnknownTag(u8),
    #[error("forbidden character in string")]
    ForbiddenStringCharacter,
    #[error("unknown primitive tag: {0}")]
    UnknownPrim(u8),
    #[error("could not decode annotation")]
    BadAnnotation,
    #[error("expression nesting exceeds {0} levels")]
    NestingTooDeep(usize),
}

/// Argument counts of applications are at most 3 in practice, so argument
/// lists live on the stack.
type Args<'a> = SmallVec<[Micheline<'a>; 3]>;

impl<'a> Micheline<'a> {
    /// Decode a single encoded node taking up all of `bytes`, without the
    /// `0x05` prefix of packed data.
    pub fn decode_raw(
        arena: &'a Arena<Micheline<'a>>,
        bytes: &[u8],
    ) -> Result<Micheline<'a>, DecodeError> {
        let mut decoder = Decoder::new(arena, bytes);
        let node = decoder.node()?;
        decoder.finish()?;
        Ok(node)
    }

    /// Decode `PACK` output: the `0x05` tag followed by one encoded node.
    pub fn decode_packed(
        arena: &'a Arena<Micheline<'a>>,
        bytes: &[u8],
    ) -> Result<Micheline<'a>, DecodeError> {
        match bytes.split_first() {
            Some((&PACK_TAG, rest)) => Micheline::decode_raw(arena, rest),
            _ => Err(DecodeError::BadMagicByte),
        }
    }
}

/// Cursor over encoded bytes. Sequences and argument blocks are decoded by
/// a child decoder over their length-prefixed slice, sharing the depth.
struct Decoder<'a, 'b> {
    arena: &'a Arena<Micheline<'a>>,
    rest: &'b [u8],
    depth: usize,
}

impl<'a, 'b> Decoder<'a, 'b> {
    fn new(arena: &'a Arena<Micheline<'a>>, bytes: &'b [u8]) -> Self {
        Decoder {
            arena,
            rest: bytes,
            depth: 0,
        }
    }

    fn finish(&self) -> Result<(), DecodeError> {
        if self.rest.is_empty() {
            Ok(())
        } else {
            Err(DecodeError::TrailingBytes)
        }
    }

    fn enter(&mut self) -> Result<(), DecodeError> {
        self.depth += 1;
        if self.depth > MAX_NESTING_DEPTH {
            return Err(DecodeError::NestingTooDeep(MAX_NESTING_DEPTH));
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.depth -= 1;
    }

    fn byte(&mut self) -> Result<u8, DecodeError> {
        let (&b, rest) = self.rest.split_first().ok_or(DecodeError::UnexpectedEof)?;
        self.rest = rest;
        Ok(b)
    }

    fn take(&mut self, n: usize) -> Result<&'b [u8], DecodeError> {
        if self.rest.len() < n {
            return Err(DecodeError::UnexpectedEof);
        }
        let (taken, rest) = self.rest.split_at(n);
        self.rest = rest;
        Ok(taken)
    }

    /// A 4-byte big-endian length followed by that many bytes.
    fn length_prefixed(&mut self) -> Result<&'b [u8], DecodeError> {
        let len: [u8; 4] = self
            .take(4)?
            .try_into()
            .map_err(|_| DecodeError::UnexpectedEof)?;
        self.take(u32::from_be_bytes(len) as usize)
    }

    fn node(&mut self) -> Result<Micheline<'a>, DecodeError> {
        self.enter()?;
        let tag = self.byte()?;
        let node = match tag {
            NUMBER_TAG => self.int()?,
            STRING_TAG => Micheline::String(printable(self.length_prefixed()?)?.to_owned()),
            BYTES_TAG => Micheline::Bytes(self.length_prefixed()?.to_vec()),
            SEQ_TAG => {
                let items = self.block()?;
                Micheline::Seq(self.arena.alloc_extend(items))
            }
            APP_NO_ARGS_NO_ANNOTS_TAG..=APP_TWO_ARGS_WITH_ANNOTS_TAG => {
                // tags come in pairs: even without, odd with annotations
                let offset = tag - APP_NO_ARGS_NO_ANNOTS_TAG;
                self.app(Some((offset / 2) as usize), offset % 2 == 1)?
            }
            APP_GENERIC => self.app(None, true)?,
            other => return Err(DecodeError::UnknownTag(other)),
        };
        self.leave();
        Ok(node)
    }

    /// Elements of a length-prefixed block of nodes.
    fn block(&mut self) -> Result<Args<'a>, DecodeError> {
        let mut inner = Decoder {
            arena: self.arena,
            rest: self.length_prefixed()?,
            depth: self.depth,
        };
        let mut items = Args::new();
        while !inner.rest.is_empty() {
            items.push(inner.node()?);
        }
        Ok(items)
    }

    /// Zarith integer: the first byte holds a continuation bit, the sign bit
    /// and 6 bits of magnitude, the following ones a continuation bit and 7
    /// bits each, least significant group first.
    fn int(&mut self) -> Result<Micheline<'a>, DecodeError> {
        let mut magnitude: BitVec<u8, Lsb0> = BitVec::new();
        let first = self.byte()?;
        let first_bits = first.view_bits::<Lsb0>();
        let sign = if first_bits[6] { Sign::Minus } else { Sign::Plus };
        magnitude.extend_from_bitslice(&first_bits[..6]);
        let mut more = first_bits[7];
        while more {
            let b = self.byte()?;
            let bits = b.view_bits::<Lsb0>();
            magnitude.extend_from_bitslice(&bits[..7]);
            more = bits[7];
        }
        magnitude.set_uninitialized(false);
        Ok(Micheline::Int(BigInt::from_bytes_le(
            sign,
            &magnitude.into_vec(),
        )))
    }

    /// Application with `argc` inline arguments, or a length-prefixed
    /// argument block when `argc` is `None`.
    fn app(&mut self, argc: Option<usize>, annotated: bool) -> Result<Micheline<'a>, DecodeError> {
        let tag = self.byte()?;
        let prim = Prim::from_tag(tag).ok_or(DecodeError::UnknownPrim(tag))?;
        let args = match argc {
            Some(n) => (0..n).map(|_| self.node()).collect::<Result<Args, _>>()?,
            None => self.block()?,
        };
        let anns = if annotated {
            annotations(self.length_prefixed()?)?
        } else {
            NO_ANNS
        };
        Ok(Micheline::App(prim, self.arena.alloc_extend(args), anns))
    }
}

/// Strings are restricted to printable ASCII plus the escapable controls.
fn printable(bytes: &[u8]) -> Result<&str, DecodeError> {
    if !bytes
        .iter()
        .all(|c| matches!(c, b' '..=b'~' | b'\n' | b'\r' | b'\t' | 0x08))
    {
        return Err(DecodeError::ForbiddenStringCharacter);
    }
    std::str::from_utf8(bytes).map_err(|_| DecodeError::ForbiddenStringCharacter)
}

/// Space-separated annotations; an empty block means none.
fn annotations(bytes: &[u8]) -> Result<Annotations<'static>, DecodeError> {
    if bytes.is_empty() {
        return Ok(NO_ANNS);
    }
    let text = std::str::from_utf8(bytes).map_err(|_| DecodeError::BadAnnotation)?;
    text.split(' ')
        .map(|a| {
            try_ann_from_str(a)
                .map(Annotation::into_owned)
                .ok_or(DecodeError::BadAnnotation)
        })
        .collect()
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::ast::micheline::test_helpers::{app, seq};
    use crate::parser::test_helpers::parse;

    fn decode(hex_bytes: &str) -> Result<Micheline<'static>, DecodeError> {
        let bytes = hex::decode(hex_bytes.trim_start_matches("0x")).unwrap();
        let arena = Box::leak(Box::new(Arena::new()));
        Micheline::decode_raw(arena, &bytes)
    }

    #[track_caller]
    fn check<'a>(v: impl Into<Micheline<'a>>, hex_bytes: &str) {
        assert_eq!(decode(hex_bytes), Ok(v.into()), "{hex_bytes}");
    }

    #[test]
    fn scalars() {
        check((), "0x030b");
        check(true, "0x030a");
        check(false, "0x0303");
        check("", "0x0100000000");
        check("a\nb", "0x0100000003610a62");
        check(vec![0x00, 0x12, 0x34, 0xab, 0xff], "0x0a00000005001234abff");
    }

    #[test]
    fn zarith() {
        for (n, hex_bytes) in [
            (0, "0x0000"),
            (13, "0x000d"),
            (63, "0x003f"),
            (64, "0x008001"),
            (123456789, "0x0095b4de75"),
            (-1, "0x0041"),
            (-63, "0x007f"),
            (-64, "0x00c001"),
            (-987654321, "0x00f1a2f3ad07"),
        ] {
            check(n, hex_bytes);
        }
    }

    #[test]
    fn nested() {
        check(app!(Pair[true, ""]), "0x0707030a0100000000");
        check(app!(Some[app!(Unit)]), "0x0509030b");
        check(seq! {seq!{}; seq!{true}}, "0x020000000c02000000000200000002030a");
        check(
            seq! { app!(DROP); app!(LAMBDA[app!(unit), app!(unit), seq!{}]) },
            "0x02000000150320093100000009036c036c020000000000000000",
        );
        let mut long = vec![0x02, 0x00, 0x00, 0x07, 0xd0];
        long.extend([0x03, 0x0b].repeat(1000));
        check(
            Micheline::Seq(&vec![app!(Unit); 1000]),
            &hex::encode(long),
        );
    }

    #[test]
    fn annotated() {
        check(parse("(int %a)").unwrap(), "0x045b000000022561");
        check(parse("(int @abc123)").unwrap(), "0x045b0000000740616263313233");
        check(
            parse("(pair %a (int %b))").unwrap(),
            "0x0665045b000000022562000000022561",
        );
        check(
            parse("LAMBDA (int %a %b %c %d) int {}").unwrap(),
            "0x093100000018045b0000000b2561202562202563202564035b020000000000000000",
        );
    }

    #[test]
    fn malformed() {
        for (hex_bytes, err) in [
            ("0x030b00", DecodeError::TrailingBytes),
            ("0x", DecodeError::UnexpectedEof),
            ("0x03", DecodeError::UnexpectedEof),
            ("0x0080", DecodeError::UnexpectedEof),
            ("0x02000000", DecodeError::UnexpectedEof),
            ("0x0200000003030b", DecodeError::UnexpectedEof),
            ("0xff", DecodeError::UnknownTag(0xff)),
            ("0x039e", DecodeError::UnknownPrim(0x9e)),
            ("0x010000000100", DecodeError::ForbiddenStringCharacter),
            ("0x045b00000002257f", DecodeError::BadAnnotation),
            ("0x045b000000026161", DecodeError::BadAnnotation),
        ] {
            assert_eq!(decode(hex_bytes), Err(err), "{hex_bytes}");
        }
    }

    #[test]
    fn packed_prefix() {
        let arena = Arena::new();
        assert_eq!(
            Micheline::decode_packed(&arena, &[0x05, 0x03, 0x0b]),
            Ok(app!(Unit))
        );
        assert_eq!(
            Micheline::decode_packed(&arena, &[0x03, 0x0b]),
            Err(DecodeError::BadMagicByte)
        );
    }

    #[test]
    fn nesting_limit() {
        // `Some` wrapped MAX_NESTING_DEPTH times around `Unit` is the deepest
        // accepted value
        let wrapped = |n: usize| {
            let mut bytes = [0x05, 0x09].repeat(n);
            bytes.extend([0x03, 0x0b]);
            hex::encode(bytes)
        };
        assert!(decode(&wrapped(MAX_NESTING_DEPTH - 1)).is_ok());
        assert_eq!(
            decode(&wrapped(MAX_NESTING_DEPTH)),
            Err(DecodeError::NestingTooDeep(MAX_NESTING_DEPTH))
        );
        // sequences count as a level too
        let mut seqs = Vec::new();
        for _ in 0..MAX_NESTING_DEPTH {
            let len = (seqs.len() as u32).to_be_bytes();
            seqs = [&[0x02][..], &len[..], &seqs[..]].concat();
        }
        assert!(decode(&hex::encode(&seqs)).is_ok());
        let len = (seqs.len() as u32).to_be_bytes();
        let deeper = [&[0x02][..], &len[..], &seqs[..]].concat();
        assert_eq!(
            decode(&hex::encode(deeper)),
            Err(DecodeError::NestingTooDeep(MAX_NESTING_DEPTH))
        );
    }
}
