/******************************************************************************/
/*                                                                            */
/* SPDX-License-Identifier: MIT                                               */
/* Copyright (c) [2023] Serokell <hi@serokell.io>                             */
/*                                                                            */
/******************************************************************************/

//! Structural validation of untyped Micheline.
//!
//! The checks here only look at the shape of a tree: argument counts, which
//! primitives may appear where, annotation placement, and which types may be
//! used in which positions. They don't need a stack, so they run before
//! typechecking and give errors pointing at the offending node.

use std::collections::HashSet;

use crate::ast::Micheline;
use crate::lexer::{Annotation, Prim};
use crate::parser::MAX_NESTING_DEPTH;
use crate::typechecker::type_props::TypeProperty;

/// Maximum length of a view name.
pub const MAX_VIEW_NAME_LEN: usize = 31;

#[derive(Debug, PartialEq, Eq, Clone, thiserror::Error)]
#[error("{rule}, in {node}")]
pub struct ValidationError {
    /// The offending node, as text.
    pub node: String,
    pub rule: Rule,
}

/// The violated rule.
#[derive(Debug, PartialEq, Eq, Clone, thiserror::Error)]
pub enum Rule {
    #[error("{prim} expects {expected} argument(s), got {got}")]
    ArgumentCount {
        prim: Prim,
        expected: &'static str,
        got: usize,
    },
    #[error("expected {expected}, got {got}")]
    Expected { expected: &'static str, got: String },
    #[error("unexpected annotation {0}")]
    UnexpectedAnnotation(String),
    #[error("at most {max} {kind} annotation(s) allowed")]
    TooManyAnnotations { kind: &'static str, max: usize },
    #[error("type is not {0}")]
    TypeProperty(TypeProperty),
    #[error("map or set literal mixes Elt entries with other data")]
    MixedElt,
    #[error("duplicate {0} section")]
    DuplicateSection(Prim),
    #[error("missing {0} section")]
    MissingSection(Prim),
    #[error("duplicate view name {0:?}")]
    DuplicateView(String),
    #[error("invalid view name {0:?}")]
    InvalidViewName(String),
    #[error("nesting exceeds {0} levels")]
    NestingTooDeep(usize),
}

fn fail<T>(node: &Micheline, rule: Rule) -> Result<T, ValidationError> {
    Err(ValidationError {
        node: node.to_string(),
        rule,
    })
}

fn expected<T>(node: &Micheline, what: &'static str) -> Result<T, ValidationError> {
    fail(
        node,
        Rule::Expected {
            expected: what,
            got: node.kind_name(),
        },
    )
}

/// Check that `ty` is a well-formed type.
pub fn assert_michelson_type(ty: &Micheline) -> Result<(), ValidationError> {
    Validator::default().ty(ty, false)
}

/// Check that `data` is a well-formed data expression. Lambdas are checked as
/// instruction sequences.
pub fn assert_michelson_data(data: &Micheline) -> Result<(), ValidationError> {
    Validator::default().data(data)
}

/// Check that `instr` is a well-formed instruction or instruction sequence.
pub fn assert_michelson_instruction(instr: &Micheline) -> Result<(), ValidationError> {
    Validator::default().instr(instr)
}

/// Check that `script` is a well-formed contract: a sequence with exactly one
/// each of `parameter`, `storage` and `code`, plus any number of uniquely
/// named `view`s.
pub fn assert_michelson_contract(script: &Micheline) -> Result<(), ValidationError> {
    Validator::default().contract(script)
}

/// Check that `ty` is a well-formed type with property `prop`.
pub fn assert_type_property(ty: &Micheline, prop: TypeProperty) -> Result<(), ValidationError> {
    let mut v = Validator::default();
    v.ty(ty, false)?;
    v.prop(ty, prop)
}

/// Check a view name: at most 31 characters from `[A-Za-z0-9_.%@]`.
pub fn assert_view_name(name: &str) -> Result<(), Rule> {
    let valid_char = |c: char| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '%' | '@');
    if name.is_empty() || name.len() > MAX_VIEW_NAME_LEN || !name.chars().all(valid_char) {
        return Err(Rule::InvalidViewName(name.to_owned()));
    }
    Ok(())
}

pub fn is_michelson_type(ty: &Micheline) -> bool {
    assert_michelson_type(ty).is_ok()
}

pub fn is_michelson_data(data: &Micheline) -> bool {
    assert_michelson_data(data).is_ok()
}

pub fn is_michelson_instruction(instr: &Micheline) -> bool {
    assert_michelson_instruction(instr).is_ok()
}

pub fn is_michelson_contract(script: &Micheline) -> bool {
    assert_michelson_contract(script).is_ok()
}

/// Expected shape of an instruction's arguments.
#[derive(Clone, Copy)]
enum Args {
    None,
    /// `DROP`, `DUP`, `PAIR`, ...: nothing or a natural number.
    OptNat,
    Nat,
    Ty,
    TyTy,
    /// `PUSH`
    TyData,
    Block,
    TwoBlocks,
    /// `DIP`: a block, optionally preceded by a natural number.
    Dip,
    /// `LAMBDA`, `LAMBDA_REC`
    Lambda,
    /// `CREATE_CONTRACT`
    Script,
    /// `VIEW`
    NameTy,
    /// `EMIT`: nothing or a type.
    OptTy,
}

fn instr_args(prim: Prim) -> Option<Args> {
    use Prim as P;
    Some(match prim {
        P::DROP | P::DUP | P::PAIR | P::UNPAIR | P::GET | P::UPDATE => Args::OptNat,
        P::DIG | P::DUG | P::SAPLING_EMPTY_STATE => Args::Nat,
        P::NONE
        | P::LEFT
        | P::RIGHT
        | P::NIL
        | P::EMPTY_SET
        | P::UNPACK
        | P::CAST
        | P::CONTRACT => Args::Ty,
        P::EMPTY_MAP | P::EMPTY_BIG_MAP => Args::TyTy,
        P::PUSH => Args::TyData,
        P::LOOP | P::LOOP_LEFT | P::MAP | P::ITER => Args::Block,
        P::IF | P::IF_NONE | P::IF_LEFT | P::IF_CONS => Args::TwoBlocks,
        P::DIP => Args::Dip,
        P::LAMBDA | P::LAMBDA_REC => Args::Lambda,
        P::CREATE_CONTRACT => Args::Script,
        P::VIEW => Args::NameTy,
        P::EMIT => Args::OptTy,
        P::PACK
        | P::BLAKE2B
        | P::SHA256
        | P::SHA512
        | P::ABS
        | P::ADD
        | P::AMOUNT
        | P::AND
        | P::BALANCE
        | P::CAR
        | P::CDR
        | P::CHECK_SIGNATURE
        | P::COMPARE
        | P::CONCAT
        | P::CONS
        | P::CREATE_ACCOUNT
        | P::IMPLICIT_ACCOUNT
        | P::EDIV
        | P::EQ
        | P::EXEC
        | P::FAILWITH
        | P::GE
        | P::GT
        | P::HASH_KEY
        | P::INT
        | P::LE
        | P::LSL
        | P::LSR
        | P::LT
        | P::MEM
        | P::MUL
        | P::NEG
        | P::NEQ
        | P::NOT
        | P::NOW
        | P::OR
        | P::SIZE
        | P::SOME
        | P::SOURCE
        | P::SENDER
        | P::SELF
        | P::STEPS_TO_QUOTA
        | P::SUB
        | P::SWAP
        | P::TRANSFER_TOKENS
        | P::SET_DELEGATE
        | P::UNIT
        | P::XOR
        | P::ADDRESS
        | P::ISNAT
        | P::RENAME
        | P::SLICE
        | P::APPLY
        | P::CHAIN_ID
        | P::LEVEL
        | P::SELF_ADDRESS
        | P::NEVER
        | P::VOTING_POWER
        | P::TOTAL_VOTING_POWER
        | P::KECCAK
        | P::SHA3
        | P::PAIRING_CHECK
        | P::SAPLING_VERIFY_UPDATE
        | P::TICKET_DEPRECATED
        | P::READ_TICKET
        | P::SPLIT_TICKET
        | P::JOIN_TICKETS
        | P::GET_AND_UPDATE
        | P::OPEN_CHEST
        | P::SUB_MUTEZ
        | P::MIN_BLOCK_TIME
        | P::TICKET
        | P::BYTES
        | P::NAT => Args::None,
        _ => return None,
    })
}

/// Type arities: `(minimum, maximum)` number of type arguments.
fn type_arity(prim: Prim) -> Option<(usize, usize)> {
    use Prim as P;
    Some(match prim {
        P::int
        | P::nat
        | P::bool
        | P::mutez
        | P::string
        | P::operation
        | P::unit
        | P::never
        | P::address
        | P::chain_id
        | P::bytes
        | P::bls12_381_g1
        | P::bls12_381_g2
        | P::bls12_381_fr
        | P::chest
        | P::chest_key
        | P::key
        | P::key_hash
        | P::signature
        | P::timestamp
        | P::tx_rollup_l2_address => (0, 0),
        P::option | P::list | P::set | P::contract | P::ticket => (1, 1),
        P::or | P::lambda | P::map | P::big_map => (2, 2),
        P::pair => (2, usize::MAX),
        // the argument is a memo size, not a type
        P::sapling_state | P::sapling_transaction | P::sapling_transaction_deprecated => (1, 1),
        _ => return None,
    })
}

#[derive(Default)]
struct Validator {
    depth: usize,
}

impl Validator {
    fn enter(&mut self, node: &Micheline) -> Result<(), ValidationError> {
        self.depth += 1;
        if self.depth > MAX_NESTING_DEPTH {
            return fail(node, Rule::NestingTooDeep(MAX_NESTING_DEPTH));
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.depth -= 1;
    }

    /// Validate a type. `field_pos` is set for positions where a field
    /// annotation is meaningful: components of `pair` and `or`, and the root
    /// of the parameter type.
    fn ty(&mut self, node: &Micheline, field_pos: bool) -> Result<(), ValidationError> {
        self.enter(node)?;
        let Micheline::App(prim, args, anns) = node else {
            return expected(node, "a type");
        };
        let Some((min, max)) = type_arity(*prim) else {
            return expected(node, "a type");
        };
        if args.len() < min || args.len() > max {
            let expected = match (min, max) {
                (0, 0) => "0",
                (1, 1) => "1",
                (2, 2) => "2",
                _ => "at least 2",
            };
            return fail(
                node,
                Rule::ArgumentCount {
                    prim: *prim,
                    expected,
                    got: args.len(),
                },
            );
        }
        let mut types = 0;
        let mut fields = 0;
        for ann in anns.iter() {
            match ann {
                Annotation::Type(_) => types += 1,
                Annotation::Field(_) if field_pos => fields += 1,
                _ => return fail(node, Rule::UnexpectedAnnotation(ann.to_string())),
            }
        }
        if types > 1 {
            return fail(node, Rule::TooManyAnnotations { kind: "type", max: 1 });
        }
        if fields > 1 {
            return fail(node, Rule::TooManyAnnotations { kind: "field", max: 1 });
        }
        match (prim, *args) {
            (
                Prim::sapling_state | Prim::sapling_transaction | Prim::sapling_transaction_deprecated,
                [size],
            ) => self.nat(size)?,
            (Prim::pair | Prim::or, args) => {
                for arg in args {
                    self.ty(arg, true)?;
                }
            }
            (Prim::set, [k]) => {
                self.ty(k, false)?;
                self.prop(k, TypeProperty::Comparable)?;
            }
            (Prim::map, [k, v]) => {
                self.ty(k, false)?;
                self.prop(k, TypeProperty::Comparable)?;
                self.ty(v, false)?;
            }
            (Prim::big_map, [k, v]) => {
                self.ty(k, false)?;
                self.prop(k, TypeProperty::Comparable)?;
                self.ty(v, false)?;
                self.prop(v, TypeProperty::BigMapValue)?;
            }
            (Prim::ticket, [t]) => {
                self.ty(t, false)?;
                self.prop(t, TypeProperty::Comparable)?;
            }
            (Prim::contract, [t]) => {
                self.ty(t, false)?;
                self.prop(t, TypeProperty::Passable)?;
            }
            (_, args) => {
                for arg in args {
                    self.ty(arg, false)?;
                }
            }
        }
        self.leave();
        Ok(())
    }

    /// Check a type property on an already validated type.
    fn prop(&mut self, node: &Micheline, prop: TypeProperty) -> Result<(), ValidationError> {
        use TypeProperty as TP;
        let Micheline::App(prim, args, _) = node else {
            return expected(node, "a type");
        };
        let holds = match prim {
            Prim::lambda => prop != TP::Comparable,
            Prim::operation => prop == TP::Duplicable,
            Prim::contract => matches!(prop, TP::Passable | TP::Packable | TP::Duplicable),
            Prim::big_map => matches!(prop, TP::Passable | TP::Storable | TP::Duplicable),
            Prim::ticket => matches!(prop, TP::Passable | TP::Storable | TP::BigMapValue),
            Prim::sapling_state => matches!(prop, TP::Passable | TP::Storable | TP::Duplicable),
            Prim::sapling_transaction
            | Prim::sapling_transaction_deprecated
            | Prim::bls12_381_g1
            | Prim::bls12_381_g2
            | Prim::bls12_381_fr
            | Prim::chest
            | Prim::chest_key
            | Prim::list
            | Prim::set
            | Prim::map => prop != TP::Comparable,
            _ => true,
        };
        if !holds {
            return fail(node, Rule::TypeProperty(prop));
        }
        // containers whose arguments must have the property too
        match prim {
            Prim::pair | Prim::or | Prim::option | Prim::list | Prim::big_map | Prim::ticket => {
                for arg in args.iter() {
                    self.prop(arg, prop)?;
                }
            }
            Prim::map => {
                if let [_, v] = args {
                    self.prop(v, prop)?;
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn nat(&self, node: &Micheline) -> Result<(), ValidationError> {
        match node {
            Micheline::Int(i) if i.sign() != num_bigint::Sign::Minus => Ok(()),
            _ => expected(node, "a natural number"),
        }
    }

    fn no_annotations(&self, node: &Micheline) -> Result<(), ValidationError> {
        match node.annotations().iter().next() {
            Some(ann) => fail(node, Rule::UnexpectedAnnotation(ann.to_string())),
            None => Ok(()),
        }
    }

    fn data(&mut self, node: &Micheline) -> Result<(), ValidationError> {
        self.enter(node)?;
        match node {
            Micheline::Int(_) | Micheline::String(_) | Micheline::Bytes(_) => {}
            Micheline::Seq(xs) => {
                let elts = xs
                    .iter()
                    .filter(|x| matches!(x, Micheline::App(Prim::Elt, ..)))
                    .count();
                if elts > 0 && elts < xs.len() {
                    return fail(node, Rule::MixedElt);
                }
                for x in xs.iter() {
                    match x {
                        Micheline::App(Prim::Elt, args, _) => {
                            self.no_annotations(x)?;
                            self.arg_count(x, args, 2, "2")?;
                            for arg in args.iter() {
                                self.data(arg)?;
                            }
                        }
                        Micheline::App(prim, ..) if instr_args(*prim).is_some() => self.instr(x)?,
                        _ => self.data(x)?,
                    }
                }
            }
            Micheline::App(prim, args, _) => {
                self.no_annotations(node)?;
                match prim {
                    Prim::Unit | Prim::True | Prim::False | Prim::None => {
                        self.arg_count(node, args, 0, "0")?
                    }
                    Prim::Left | Prim::Right | Prim::Some => self.arg_count(node, args, 1, "1")?,
                    Prim::Pair => {
                        if args.len() < 2 {
                            self.arg_count(node, args, 2, "at least 2")?;
                        }
                    }
                    Prim::Lambda_rec => {
                        self.arg_count(node, args, 1, "1")?;
                        if let [body] = args {
                            self.block(body)?;
                        }
                        self.leave();
                        return Ok(());
                    }
                    Prim::Ticket => {
                        self.arg_count(node, args, 4, "4")?;
                        if let [ticketer, ty, contents, amount] = args {
                            self.data(ticketer)?;
                            self.ty(ty, false)?;
                            self.data(contents)?;
                            self.data(amount)?;
                        }
                        self.leave();
                        return Ok(());
                    }
                    Prim::Elt => return fail(node, Rule::MixedElt),
                    _ => return expected(node, "a data expression"),
                }
                for arg in args.iter() {
                    self.data(arg)?;
                }
            }
        }
        self.leave();
        Ok(())
    }

    fn arg_count(
        &self,
        node: &Micheline,
        args: &[Micheline],
        n: usize,
        expected: &'static str,
    ) -> Result<(), ValidationError> {
        if args.len() != n {
            let Micheline::App(prim, ..) = node else {
                return Ok(());
            };
            return fail(
                node,
                Rule::ArgumentCount {
                    prim: *prim,
                    expected,
                    got: args.len(),
                },
            );
        }
        Ok(())
    }

    /// An instruction sequence in braces.
    fn block(&mut self, node: &Micheline) -> Result<(), ValidationError> {
        match node {
            Micheline::Seq(_) => self.instr(node),
            _ => expected(node, "an instruction sequence"),
        }
    }

    fn instr(&mut self, node: &Micheline) -> Result<(), ValidationError> {
        self.enter(node)?;
        let (prim, args, anns) = match node {
            Micheline::Seq(xs) => {
                for x in xs.iter() {
                    self.instr(x)?;
                }
                self.leave();
                return Ok(());
            }
            Micheline::App(prim, args, anns) => (*prim, *args, anns),
            _ => return expected(node, "an instruction"),
        };
        let Some(shape) = instr_args(prim) else {
            return expected(node, "an instruction");
        };
        let (vars, types, fields) = anns.iter().fold((0, 0, 0), |(v, t, f), ann| match ann {
            Annotation::Variable(_) => (v + 1, t, f),
            Annotation::Type(_) => (v, t + 1, f),
            Annotation::Field(_) => (v, t, f + 1),
            Annotation::Special(_) => (v, t, f),
        });
        for (kind, n, max) in [("variable", vars, 2), ("type", types, 1), ("field", fields, 2)] {
            if n > max {
                return fail(node, Rule::TooManyAnnotations { kind, max });
            }
        }
        let argc = |expected| {
            fail(
                node,
                Rule::ArgumentCount {
                    prim,
                    expected,
                    got: args.len(),
                },
            )
        };
        match (shape, args) {
            (Args::None, []) => {}
            (Args::None, _) => return argc("0"),
            (Args::OptNat, []) => {}
            (Args::OptNat | Args::Nat, [n]) => self.nat(n)?,
            (Args::OptNat, _) => return argc("0 or 1"),
            (Args::Nat, _) => return argc("1"),
            (Args::Ty, [t]) => self.ty(t, false)?,
            (Args::Ty, _) => return argc("1"),
            (Args::TyTy, [k, v]) => {
                self.ty(k, false)?;
                self.ty(v, false)?;
            }
            (Args::TyTy, _) => return argc("2"),
            (Args::TyData, [t, d]) => {
                self.ty(t, false)?;
                self.prop(t, TypeProperty::Pushable)?;
                self.data(d)?;
            }
            (Args::TyData, _) => return argc("2"),
            (Args::Block, [b]) => self.block(b)?,
            (Args::Block, _) => return argc("1"),
            (Args::TwoBlocks, [b1, b2]) => {
                self.block(b1)?;
                self.block(b2)?;
            }
            (Args::TwoBlocks, _) => return argc("2"),
            (Args::Dip, [b]) => self.block(b)?,
            (Args::Dip, [n, b]) => {
                self.nat(n)?;
                self.block(b)?;
            }
            (Args::Dip, _) => return argc("1 or 2"),
            (Args::Lambda, [a, r, b]) => {
                self.ty(a, false)?;
                self.ty(r, false)?;
                self.block(b)?;
            }
            (Args::Lambda, _) => return argc("3"),
            (Args::Script, [s]) => self.contract(s)?,
            (Args::Script, _) => return argc("1"),
            (Args::NameTy, [Micheline::String(name), t]) => {
                assert_view_name(name).or_else(|rule| fail(node, rule))?;
                self.ty(t, false)?;
            }
            (Args::NameTy, [name, _]) => return expected(name, "a view name"),
            (Args::NameTy, _) => return argc("2"),
            (Args::OptTy, []) => {}
            (Args::OptTy, [t]) => self.ty(t, false)?,
            (Args::OptTy, _) => return argc("0 or 1"),
        }
        match (prim, args) {
            (Prim::UNPACK, [t]) => self.prop(t, TypeProperty::Packable)?,
            (Prim::CONTRACT, [t]) => self.prop(t, TypeProperty::Passable)?,
            (Prim::EMPTY_SET, [k]) | (Prim::EMPTY_MAP, [k, _]) => {
                self.prop(k, TypeProperty::Comparable)?
            }
            (Prim::EMPTY_BIG_MAP, [k, v]) => {
                self.prop(k, TypeProperty::Comparable)?;
                self.prop(v, TypeProperty::BigMapValue)?
            }
            _ => {}
        }
        self.leave();
        Ok(())
    }

    fn contract(&mut self, node: &Micheline) -> Result<(), ValidationError> {
        self.enter(node)?;
        let sections = match node {
            Micheline::Seq([Micheline::Seq(inner)]) => *inner,
            Micheline::Seq(xs) => *xs,
            _ => return expected(node, "a contract script"),
        };
        let mut seen = HashSet::new();
        let mut views = HashSet::new();
        for section in sections {
            let Micheline::App(prim, args, _) = section else {
                return expected(section, "a script section");
            };
            self.no_annotations(section)?;
            match (prim, *args) {
                (Prim::parameter, [t]) => {
                    self.ty(t, true)?;
                    self.prop(t, TypeProperty::Passable)?;
                }
                (Prim::storage, [t]) => {
                    self.ty(t, false)?;
                    self.prop(t, TypeProperty::Storable)?;
                }
                (Prim::code, [b]) => self.block(b)?,
                (Prim::view, [name, arg, ret, b]) => {
                    let Micheline::String(name) = name else {
                        return expected(name, "a view name");
                    };
                    assert_view_name(name).or_else(|rule| fail(section, rule))?;
                    if !views.insert(name.as_str()) {
                        return fail(section, Rule::DuplicateView(name.clone()));
                    }
                    self.ty(arg, false)?;
                    self.ty(ret, false)?;
                    self.block(b)?;
                    continue;
                }
                (Prim::parameter | Prim::storage | Prim::code, _) => {
                    return fail(
                        section,
                        Rule::ArgumentCount {
                            prim: *prim,
                            expected: "1",
                            got: args.len(),
                        },
                    )
                }
                (Prim::view, _) => {
                    return fail(
                        section,
                        Rule::ArgumentCount {
                            prim: *prim,
                            expected: "4",
                            got: args.len(),
                        },
                    )
                }
                _ => return expected(section, "a script section"),
            }
            if !seen.insert(*prim) {
                return fail(section, Rule::DuplicateSection(*prim));
            }
        }
        for prim in [Prim::parameter, Prim::storage, Prim::code] {
            if !seen.contains(&prim) {
                return fail(node, Rule::MissingSection(prim));
            }
        }
        self.leave();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::NO_ANNS;
    use crate::parser::test_helpers::{parse, parse_contract_script};

    #[track_caller]
    fn check_rule(res: Result<(), ValidationError>, rule: Rule) {
        assert_eq!(res.map_err(|e| e.rule), Err(rule));
    }

    #[test]
    fn types() {
        assert!(is_michelson_type(&parse("pair int nat string").unwrap()));
        assert!(is_michelson_type(&parse("big_map (pair nat address) (lambda unit operation)").unwrap()));
        assert!(is_michelson_type(&parse("sapling_state 8").unwrap()));
        assert!(!is_michelson_type(&parse("DROP").unwrap()));
        assert!(!is_michelson_type(&parse("Unit").unwrap()));
        check_rule(
            assert_michelson_type(&parse("option int nat").unwrap()),
            Rule::ArgumentCount {
                prim: Prim::option,
                expected: "1",
                got: 2,
            },
        );
        check_rule(
            assert_michelson_type(&parse("pair int").unwrap()),
            Rule::ArgumentCount {
                prim: Prim::pair,
                expected: "at least 2",
                got: 1,
            },
        );
    }

    #[test]
    fn comparable_closure() {
        assert!(is_michelson_type(&parse("set (pair int (or string (option nat)))").unwrap()));
        check_rule(
            assert_michelson_type(&parse("set (list int)").unwrap()),
            Rule::TypeProperty(TypeProperty::Comparable),
        );
        check_rule(
            assert_michelson_type(&parse("map (pair int bls12_381_fr) nat").unwrap()),
            Rule::TypeProperty(TypeProperty::Comparable),
        );
        check_rule(
            assert_michelson_type(&parse("big_map int (big_map int int)").unwrap()),
            Rule::TypeProperty(TypeProperty::BigMapValue),
        );
        check_rule(
            assert_michelson_type(&parse("contract operation").unwrap()),
            Rule::TypeProperty(TypeProperty::Passable),
        );
    }

    #[test]
    fn type_subsets() {
        let prop = |ty, prop| assert_type_property(&parse(ty).unwrap(), prop).is_ok();
        assert!(prop("lambda operation (contract unit)", TypeProperty::Pushable));
        assert!(!prop("list operation", TypeProperty::Packable));
        assert!(!prop("option (contract int)", TypeProperty::Pushable));
        assert!(prop("option (contract int)", TypeProperty::Packable));
        assert!(!prop("pair int (contract int)", TypeProperty::Storable));
        assert!(!prop("ticket nat", TypeProperty::Duplicable));
        assert!(prop("big_map nat (ticket nat)", TypeProperty::Storable));
        assert!(!prop("big_map nat nat", TypeProperty::Packable));
        assert!(!prop("sapling_state 8", TypeProperty::Pushable));
        assert!(prop("never", TypeProperty::Comparable));
    }

    #[test]
    fn type_annotations() {
        assert!(is_michelson_type(&parse("pair (int %a :t) (nat %b)").unwrap()));
        check_rule(
            assert_michelson_type(&parse("int %a").unwrap()),
            Rule::UnexpectedAnnotation("%a".to_owned()),
        );
        check_rule(
            assert_michelson_type(&parse("pair (int @v) nat").unwrap()),
            Rule::UnexpectedAnnotation("@v".to_owned()),
        );
        check_rule(
            assert_michelson_type(&parse("int :a :b").unwrap()),
            Rule::TooManyAnnotations {
                kind: "type",
                max: 1,
            },
        );
        check_rule(
            assert_michelson_type(&parse("or (int %a %b) nat").unwrap()),
            Rule::TooManyAnnotations {
                kind: "field",
                max: 1,
            },
        );
    }

    #[test]
    fn data() {
        for ok in [
            "Pair 1 \"a\" 0x00",
            "{ Elt 1 2 ; Elt 2 3 }",
            "{ 1 ; 2 }",
            "Left (Some Unit)",
            "{ DROP ; PUSH int 1 }",
            "Lambda_rec { DROP }",
            "{}",
        ] {
            assert!(is_michelson_data(&parse(ok).unwrap()), "{ok}");
        }
        check_rule(
            assert_michelson_data(&parse("{ Elt 1 2 ; 3 }").unwrap()),
            Rule::MixedElt,
        );
        check_rule(
            assert_michelson_data(&parse("Some 1 2").unwrap()),
            Rule::ArgumentCount {
                prim: Prim::Some,
                expected: "1",
                got: 2,
            },
        );
        check_rule(
            assert_michelson_data(&parse("Unit @x").unwrap()),
            Rule::UnexpectedAnnotation("@x".to_owned()),
        );
        assert!(!is_michelson_data(&parse("int").unwrap()));
    }

    #[test]
    fn instructions() {
        for ok in [
            "{ DUP ; DUP 2 ; DIP 3 { DROP } ; DIP { SWAP } }",
            "PUSH (pair int nat) (Pair 1 2)",
            "LAMBDA int int { PUSH int 1 ; ADD }",
            "IF_LEFT { DROP } { DROP }",
            "VIEW \"get\" nat",
            "EMIT %ev",
            "EMIT %ev nat",
            "UNPAIR @a @b",
            "CREATE_CONTRACT { parameter unit ; storage unit ; code { CDR } }",
        ] {
            assert_eq!(assert_michelson_instruction(&parse(ok).unwrap()), Ok(()), "{ok}");
        }
        check_rule(
            assert_michelson_instruction(&parse("DIG").unwrap()),
            Rule::ArgumentCount {
                prim: Prim::DIG,
                expected: "1",
                got: 0,
            },
        );
        check_rule(
            assert_michelson_instruction(&parse("PUSH (contract unit) \"KT1\"").unwrap()),
            Rule::TypeProperty(TypeProperty::Pushable),
        );
        check_rule(
            assert_michelson_instruction(&parse("IF {} DROP").unwrap()),
            Rule::Expected {
                expected: "an instruction sequence",
                got: "primitive DROP".to_owned(),
            },
        );
        check_rule(
            assert_michelson_instruction(&parse("DUP -1").unwrap()),
            Rule::Expected {
                expected: "a natural number",
                got: "int literal".to_owned(),
            },
        );
        check_rule(
            assert_michelson_instruction(&parse("UNIT :a :b").unwrap()),
            Rule::TooManyAnnotations {
                kind: "type",
                max: 1,
            },
        );
        assert_eq!(
            assert_michelson_instruction(&parse("EMPTY_BIG_MAP nat (map nat string)").unwrap()),
            Ok(())
        );
        for bad_value in ["(big_map nat nat)", "operation", "(contract unit)"] {
            check_rule(
                assert_michelson_instruction(
                    &parse(&format!("EMPTY_BIG_MAP nat {bad_value}")).unwrap(),
                ),
                Rule::TypeProperty(TypeProperty::BigMapValue),
            );
        }
        check_rule(
            assert_michelson_instruction(&parse("EMPTY_BIG_MAP (list nat) nat").unwrap()),
            Rule::TypeProperty(TypeProperty::Comparable),
        );
        assert!(!is_michelson_instruction(&parse("Unit").unwrap()));
    }

    #[test]
    fn contracts() {
        let script = parse_contract_script(
            "parameter (or (int %inc) (unit %reset)); storage int; code { CDR; NIL operation; PAIR };
             view \"get\" unit int { CDR }; view \"get.2\" unit int { CDR }",
        )
        .unwrap();
        assert_eq!(assert_michelson_contract(&script), Ok(()));

        let script = parse_contract_script("parameter unit; storage unit").unwrap();
        check_rule(
            assert_michelson_contract(&script),
            Rule::MissingSection(Prim::code),
        );
        let script =
            parse_contract_script("parameter unit; parameter unit; storage unit; code {}").unwrap();
        check_rule(
            assert_michelson_contract(&script),
            Rule::DuplicateSection(Prim::parameter),
        );
        let script = parse_contract_script(
            "parameter unit; storage unit; code {}; view \"v\" unit unit {}; view \"v\" unit unit {}",
        )
        .unwrap();
        check_rule(
            assert_michelson_contract(&script),
            Rule::DuplicateView("v".to_owned()),
        );
        let script = parse_contract_script(
            "parameter unit; storage unit; code {}; view \"a-b\" unit unit {}",
        )
        .unwrap();
        check_rule(
            assert_michelson_contract(&script),
            Rule::InvalidViewName("a-b".to_owned()),
        );
        let script = parse_contract_script("parameter unit; storage operation; code {}").unwrap();
        check_rule(
            assert_michelson_contract(&script),
            Rule::TypeProperty(TypeProperty::Storable),
        );
    }

    #[test]
    fn view_names() {
        assert_eq!(assert_view_name("a_b.c%d@e"), Ok(()));
        assert!(assert_view_name(&"a".repeat(MAX_VIEW_NAME_LEN)).is_ok());
        assert!(assert_view_name(&"a".repeat(MAX_VIEW_NAME_LEN + 1)).is_err());
        assert!(assert_view_name("").is_err());
    }

    #[test]
    fn nesting_limit() {
        let mut ty = Micheline::prim0(Prim::int);
        for _ in 0..MAX_NESTING_DEPTH {
            ty = Micheline::App(Prim::option, Box::leak(Box::new([ty])), NO_ANNS);
        }
        check_rule(
            assert_michelson_type(&ty),
            Rule::NestingTooDeep(MAX_NESTING_DEPTH),
        );
        let Micheline::App(_, [shallower], _) = ty else {
            unreachable!()
        };
        assert!(is_michelson_type(shallower));
    }
}
