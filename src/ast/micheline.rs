/******************************************************************************/
/*                                                                            */
/* SPDX-License-Identifier: MIT                                               */
/* Copyright (c) [2023] Serokell <hi@serokell.io>                             */
/*                                                                            */
/******************************************************************************/

use num_bigint::{BigInt, BigUint};
use serde_json::{json, Value};
use typed_arena::Arena;

use super::annotations::{Annotations, NO_ANNS};
use crate::lexer::Prim;

/// Generic Micheline node. Children live in an arena; nodes are never mutated
/// after construction.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum Micheline<'a> {
    Int(BigInt),
    String(String),
    Bytes(Vec<u8>),
    /// Application of a Micheline primitive to some arguments with optional
    /// annotations. The primitive is the first field, arguments are the second
    /// field, annotations are the last field.
    App(Prim, &'a [Micheline<'a>], Annotations<'a>),
    Seq(&'a [Micheline<'a>]),
}

impl<'a> Micheline<'a> {
    pub fn prim0(prim: Prim) -> Self {
        Micheline::App(prim, &[], NO_ANNS)
    }

    pub fn prim1(arena: &'a Arena<Micheline<'a>>, prim: Prim, arg: Micheline<'a>) -> Self {
        Micheline::App(prim, arena.alloc_extend([arg]), NO_ANNS)
    }

    pub fn prim2(
        arena: &'a Arena<Micheline<'a>>,
        prim: Prim,
        arg1: Micheline<'a>,
        arg2: Micheline<'a>,
    ) -> Self {
        Micheline::App(prim, arena.alloc_extend([arg1, arg2]), NO_ANNS)
    }

    pub fn prim3(
        arena: &'a Arena<Micheline<'a>>,
        prim: Prim,
        arg1: Micheline<'a>,
        arg2: Micheline<'a>,
        arg3: Micheline<'a>,
    ) -> Self {
        Micheline::App(prim, arena.alloc_extend([arg1, arg2, arg3]), NO_ANNS)
    }

    /// Application with arbitrary arguments and annotations.
    pub fn app(
        arena: &'a Arena<Micheline<'a>>,
        prim: Prim,
        args: impl IntoIterator<Item = Micheline<'a>>,
        anns: Annotations<'a>,
    ) -> Self {
        Micheline::App(prim, arena.alloc_extend(args), anns)
    }

    pub fn seq(
        arena: &'a Arena<Micheline<'a>>,
        args: impl IntoIterator<Item = Micheline<'a>>,
    ) -> Self {
        Micheline::Seq(arena.alloc_extend(args))
    }

    /// Annotations of a primitive application, empty for anything else.
    pub fn annotations(&self) -> &Annotations<'a> {
        match self {
            Micheline::App(_, _, anns) => anns,
            _ => {
                static EMPTY: Annotations<'static> = NO_ANNS;
                &EMPTY
            }
        }
    }

    /// Copy of the node with annotations replaced. Only primitive
    /// applications carry annotations, other nodes are returned unchanged.
    pub fn with_annotations(&self, anns: Annotations<'a>) -> Self {
        match self {
            Micheline::App(prim, args, _) => Micheline::App(*prim, args, anns),
            other => other.clone(),
        }
    }

    /// Short human-readable description of the node kind, for error messages.
    pub fn kind_name(&self) -> String {
        match self {
            Micheline::Int(_) => "int literal".to_owned(),
            Micheline::String(_) => "string literal".to_owned(),
            Micheline::Bytes(_) => "bytes literal".to_owned(),
            Micheline::Seq(_) => "sequence".to_owned(),
            Micheline::App(prim, ..) => format!("primitive {prim}"),
        }
    }

    /// The protocol's JSON representation of the node.
    pub fn to_json(&self) -> Value {
        match self {
            Micheline::Int(i) => json!({ "int": i.to_string() }),
            Micheline::String(s) => json!({ "string": s }),
            Micheline::Bytes(b) => json!({ "bytes": hex::encode(b) }),
            Micheline::Seq(xs) => Value::Array(xs.iter().map(Micheline::to_json).collect()),
            Micheline::App(prim, args, anns) => {
                let mut obj = serde_json::Map::new();
                obj.insert("prim".to_owned(), Value::String(prim.to_string()));
                if !args.is_empty() {
                    obj.insert(
                        "args".to_owned(),
                        Value::Array(args.iter().map(Micheline::to_json).collect()),
                    );
                }
                if !anns.is_empty() {
                    obj.insert(
                        "annots".to_owned(),
                        Value::Array(anns.iter().map(|a| Value::String(a.to_string())).collect()),
                    );
                }
                Value::Object(obj)
            }
        }
    }
}

impl<'a> From<i128> for Micheline<'a> {
    fn from(x: i128) -> Self {
        Micheline::Int(x.into())
    }
}

impl<'a> From<BigInt> for Micheline<'a> {
    fn from(x: BigInt) -> Self {
        Micheline::Int(x)
    }
}

impl<'a> From<BigUint> for Micheline<'a> {
    fn from(x: BigUint) -> Self {
        Micheline::Int(x.into())
    }
}

impl<'a> From<String> for Micheline<'a> {
    fn from(x: String) -> Self {
        Micheline::String(x)
    }
}

impl<'a> From<Vec<u8>> for Micheline<'a> {
    fn from(x: Vec<u8>) -> Self {
        Micheline::Bytes(x)
    }
}

impl<'a> From<()> for Micheline<'a> {
    fn from(_: ()) -> Self {
        Micheline::prim0(Prim::Unit)
    }
}

impl<'a> From<bool> for Micheline<'a> {
    fn from(x: bool) -> Self {
        Micheline::prim0(if x { Prim::True } else { Prim::False })
    }
}

impl<'a> From<&str> for Micheline<'a> {
    fn from(s: &str) -> Self {
        Micheline::from(s.to_owned())
    }
}

/// Pattern synonym matching all type primitive applications. Useful for total
/// matches.
macro_rules! micheline_types {
    () => {
        Micheline::App(
            Prim::int
                | Prim::nat
                | Prim::bool
                | Prim::mutez
                | Prim::string
                | Prim::operation
                | Prim::unit
                | Prim::never
                | Prim::address
                | Prim::chain_id
                | Prim::pair
                | Prim::or
                | Prim::option
                | Prim::list
                | Prim::contract
                | Prim::map
                | Prim::bytes
                | Prim::bls12_381_g1
                | Prim::bls12_381_g2
                | Prim::bls12_381_fr
                | Prim::ticket
                | Prim::sapling_state
                | Prim::sapling_transaction
                | Prim::sapling_transaction_deprecated
                | Prim::chest
                | Prim::chest_key
                | Prim::key
                | Prim::key_hash
                | Prim::signature
                | Prim::lambda
                | Prim::timestamp
                | Prim::tx_rollup_l2_address
                | Prim::set
                | Prim::big_map,
            ..,
        )
    };
}

/// Pattern synonym matching all Micheline literals. Useful for total
/// matches.
macro_rules! micheline_literals {
    () => {
        Micheline::Int(..) | Micheline::String(..) | Micheline::Bytes(..)
    };
}

/// Pattern synonym matching all script section primitive applications.
macro_rules! micheline_fields {
    () => {
        Micheline::App(
            Prim::parameter | Prim::storage | Prim::code | Prim::view | Prim::constant,
            ..,
        )
    };
}

/// Pattern synonym matching all instruction primitive applications. Useful for
/// total matches.
macro_rules! micheline_instructions {
    () => {
        Micheline::App(
            Prim::PACK
                | Prim::UNPACK
                | Prim::BLAKE2B
                | Prim::SHA256
                | Prim::SHA512
                | Prim::ABS
                | Prim::ADD
                | Prim::AMOUNT
                | Prim::AND
                | Prim::BALANCE
                | Prim::CAR
                | Prim::CDR
                | Prim::CHECK_SIGNATURE
                | Prim::COMPARE
                | Prim::CONCAT
                | Prim::CONS
                | Prim::CREATE_ACCOUNT
                | Prim::CREATE_CONTRACT
                | Prim::IMPLICIT_ACCOUNT
                | Prim::DIP
                | Prim::DROP
                | Prim::DUP
                | Prim::EDIV
                | Prim::EMPTY_MAP
                | Prim::EMPTY_SET
                | Prim::EQ
                | Prim::EXEC
                | Prim::FAILWITH
                | Prim::GE
                | Prim::GET
                | Prim::GT
                | Prim::HASH_KEY
                | Prim::IF
                | Prim::IF_CONS
                | Prim::IF_LEFT
                | Prim::IF_NONE
                | Prim::INT
                | Prim::LAMBDA
                | Prim::LE
                | Prim::LEFT
                | Prim::LOOP
                | Prim::LSL
                | Prim::LSR
                | Prim::LT
                | Prim::MAP
                | Prim::MEM
                | Prim::MUL
                | Prim::NEG
                | Prim::NEQ
                | Prim::NIL
                | Prim::NONE
                | Prim::NOT
                | Prim::NOW
                | Prim::OR
                | Prim::PAIR
                | Prim::PUSH
                | Prim::RIGHT
                | Prim::SIZE
                | Prim::SOME
                | Prim::SOURCE
                | Prim::SENDER
                | Prim::SELF
                | Prim::STEPS_TO_QUOTA
                | Prim::SUB
                | Prim::SWAP
                | Prim::TRANSFER_TOKENS
                | Prim::SET_DELEGATE
                | Prim::UNIT
                | Prim::UPDATE
                | Prim::XOR
                | Prim::ITER
                | Prim::LOOP_LEFT
                | Prim::ADDRESS
                | Prim::CONTRACT
                | Prim::ISNAT
                | Prim::CAST
                | Prim::RENAME
                | Prim::SLICE
                | Prim::DIG
                | Prim::DUG
                | Prim::EMPTY_BIG_MAP
                | Prim::APPLY
                | Prim::CHAIN_ID
                | Prim::LEVEL
                | Prim::SELF_ADDRESS
                | Prim::NEVER
                | Prim::UNPAIR
                | Prim::VOTING_POWER
                | Prim::TOTAL_VOTING_POWER
                | Prim::KECCAK
                | Prim::SHA3
                | Prim::PAIRING_CHECK
                | Prim::SAPLING_EMPTY_STATE
                | Prim::SAPLING_VERIFY_UPDATE
                | Prim::TICKET_DEPRECATED
                | Prim::READ_TICKET
                | Prim::SPLIT_TICKET
                | Prim::JOIN_TICKETS
                | Prim::GET_AND_UPDATE
                | Prim::OPEN_CHEST
                | Prim::VIEW
                | Prim::SUB_MUTEZ
                | Prim::MIN_BLOCK_TIME
                | Prim::EMIT
                | Prim::LAMBDA_REC
                | Prim::TICKET
                | Prim::BYTES
                | Prim::NAT,
            ..,
        )
    };
}

/// Pattern synonym matching all value constructor primitive applications.
/// Useful for total matches.
macro_rules! micheline_values {
    () => {
        Micheline::App(
            Prim::True
                | Prim::False
                | Prim::Unit
                | Prim::None
                | Prim::Pair
                | Prim::Some
                | Prim::Elt
                | Prim::Left
                | Prim::Right
                | Prim::Lambda_rec
                | Prim::Ticket,
            ..,
        )
    };
}

pub(crate) use {micheline_fields, micheline_literals, micheline_types, micheline_values};

#[cfg(test)]
pub mod test_helpers {

    /// Helper to reduce syntactic noise when constructing Micheline applications in tests.
    ///
    /// See the test below for examples.
    macro_rules! app {
        ($prim:ident [$($args:expr),* $(,)*]) => {
            $crate::ast::micheline::Micheline::App(
                $crate::lexer::Prim::$prim, &[$($crate::ast::micheline::Micheline::from($args)),*],
                $crate::ast::annotations::NO_ANNS,
            )
        };
        ($prim:ident) => {
            $crate::ast::micheline::Micheline::App(
                $crate::lexer::Prim::$prim,
                &[],
                $crate::ast::annotations::NO_ANNS,
            )
        };
    }

    #[test]
    fn test_app() {
        use super::*;
        assert_eq!(app!(True), Micheline::App(Prim::True, &[], NO_ANNS));
        assert_eq!(
            app!(DUP[3]),
            Micheline::App(Prim::DUP, &[Micheline::Int(3.into())], NO_ANNS)
        );
        assert_eq!(
            app!(DIP[3, seq!{ app!(DROP) }]),
            Micheline::App(
                Prim::DIP,
                &[
                    Micheline::Int(3.into()),
                    Micheline::Seq(&[Micheline::App(Prim::DROP, &[], NO_ANNS)])
                ],
                NO_ANNS
            )
        );
    }

    /// Helper to reduce syntactic noise when constructing Micheline sequences in tests.
    macro_rules! seq {
        {$($elt:expr);* $(;)*} => {
            $crate::ast::micheline::Micheline::Seq(&[$($crate::ast::micheline::Micheline::from($elt)),*])
        }
    }

    #[test]
    fn test_seq() {
        use super::*;
        assert_eq!(seq! {}, Micheline::Seq(&[]));
        assert_eq!(
            seq! { app!(CAR); app!(DUP); },
            Micheline::Seq(&[
                Micheline::App(Prim::CAR, &[], NO_ANNS),
                Micheline::App(Prim::DUP, &[], NO_ANNS),
            ])
        );
    }

    pub(crate) use {app, seq};
}

#[cfg(test)]
mod tests {
    use super::test_helpers::*;
    use super::*;

    #[allow(dead_code)]
    /// Static test to check that `micheline_*` pattern synonyms cover all
    /// constructors except Seq.
    fn pattern_synonym_coverage(micheline: Micheline) {
        match micheline {
            micheline_fields!()
            | micheline_instructions!()
            | micheline_literals!()
            | micheline_types!()
            | micheline_values!()
            | Micheline::Seq(..) => (),
        }
    }

    #[test]
    fn json_export() {
        let arena = Arena::new();
        let anns = [crate::lexer::try_ann_from_str("%a").unwrap()].into();
        let node = Micheline::seq(
            &arena,
            [
                Micheline::app(&arena, Prim::PUSH, [app!(nat), 5.into()], anns),
                app!(DROP),
                Micheline::Bytes(vec![0xca, 0xfe]),
                "s".into(),
            ],
        );
        assert_eq!(
            node.to_json(),
            json!([
                {"prim": "PUSH", "args": [{"prim": "nat"}, {"int": "5"}], "annots": ["%a"]},
                {"prim": "DROP"},
                {"bytes": "cafe"},
                {"string": "s"}
            ])
        );
        assert_eq!(seq! {}.to_json(), json!([]));
    }
}
