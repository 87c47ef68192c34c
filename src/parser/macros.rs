/******************************************************************************/
/*                                                                            */
/* SPDX-License-Identifier: MIT                                               */
/* Copyright (c) [2023] Serokell <hi@serokell.io>                             */
/*                                                                            */
/******************************************************************************/

//! Expansion of macros into core instructions.
//!
//! Expansions follow what `octez-client` produces, including its habit of
//! wrapping multi-instruction expansions in a sequence. Expansion is pure: the
//! result only depends on the macro name, arguments, annotations and the
//! protocol.

use std::borrow::Cow;
use std::str::FromStr;

use num_bigint::BigInt;
use num_traits::ToPrimitive;
use typed_arena::Arena;

use crate::ast::annotations::{Annotations, NO_ANNS};
use crate::ast::Micheline;
use crate::lexer::macros::Macro;
use crate::lexer::{Annotation, Prim, ANN_FIELD_VAR, ANN_VAR_PARENT_FIELD};
use crate::parser::MAX_NESTING_DEPTH;
use crate::protocol::Protocol;

#[derive(Debug, PartialEq, Eq, Clone, thiserror::Error)]
pub enum MacroError {
    #[error("unexpected number of arguments for macro {name}: expected {expected}, got {got}")]
    UnexpectedArgumentCount {
        name: String,
        expected: usize,
        got: usize,
    },
    #[error("unexpected annotation {ann} for macro {name}")]
    UnexpectedAnnotation { name: String, ann: String },
    #[error("too many {kind} annotations for macro {name}")]
    TooManyAnnotations { name: String, kind: &'static str },
    #[error("macro {name} expects {expected} as argument {index}")]
    InvalidArgument {
        name: String,
        index: usize,
        expected: &'static str,
    },
    #[error("malformed pattern in macro {0}")]
    InvalidPattern(String),
    #[error("expression nesting exceeds {0} levels")]
    NestingTooDeep(usize),
}

/// Expand a single application of `name`.
///
/// Returns `Ok(None)` when `name` is neither a macro nor a core instruction
/// form that needs rewriting for `protocol` (`CAR k`, `CDR k`, and before Edo
/// `DUP n` and `UNPAIR`).
pub fn expand_macro<'a>(
    arena: &'a Arena<Micheline<'a>>,
    name: &str,
    args: &'a [Micheline<'a>],
    anns: &Annotations<'a>,
    protocol: Protocol,
) -> Result<Option<Micheline<'a>>, MacroError> {
    let ex = Expander {
        arena,
        name,
        args,
        anns,
        protocol,
    };
    if let Ok(prim) = Prim::from_str(name) {
        return Ok(ex.expand_core(prim));
    }
    match Macro::recognize(name) {
        Some(m) => {
            tracing::debug!(macro_name = name, ?protocol, "expanding macro");
            ex.expand(m).map(Some)
        }
        None => Ok(None),
    }
}

/// Apply [expand_macro] to every application in the tree, bottom-up.
///
/// Parsed trees are already expanded; this is for trees built by other means
/// (decoded from binary, assembled by hand) and re-expands the
/// protocol-dependent core forms. Expanding twice is the same as expanding
/// once.
pub fn expand_macros<'a>(
    arena: &'a Arena<Micheline<'a>>,
    node: &Micheline<'a>,
    protocol: Protocol,
) -> Result<Micheline<'a>, MacroError> {
    fn go<'a>(
        arena: &'a Arena<Micheline<'a>>,
        node: &Micheline<'a>,
        protocol: Protocol,
        depth: usize,
    ) -> Result<Micheline<'a>, MacroError> {
        if depth > MAX_NESTING_DEPTH {
            return Err(MacroError::NestingTooDeep(MAX_NESTING_DEPTH));
        }
        let go_all = |xs: &[Micheline<'a>]| {
            xs.iter()
                .map(|x| go(arena, x, protocol, depth + 1))
                .collect::<Result<Vec<_>, _>>()
        };
        Ok(match node {
            Micheline::Seq(xs) => Micheline::Seq(arena.alloc_extend(go_all(xs)?)),
            Micheline::App(prim, args, anns) => {
                let args = arena.alloc_extend(go_all(args)?);
                match expand_macro(arena, prim.as_ref(), args, anns, protocol)? {
                    Some(expanded) => expanded,
                    None => Micheline::App(*prim, args, anns.clone()),
                }
            }
            lit => lit.clone(),
        })
    }
    go(arena, node, protocol, 0)
}

/// Shape of a `P[PAI]+R` or `UNP[PAI]+R` pattern: leaves are `A` on the left
/// and `I` on the right, nested pairs start with `P`.
#[derive(Debug, PartialEq, Eq)]
enum Comb {
    Leaf,
    Node(Box<Comb>, Box<Comb>),
}

impl Comb {
    fn parse(letters: &str) -> Option<Comb> {
        fn pair(it: &mut std::str::Bytes) -> Option<Comb> {
            let l = match it.next()? {
                b'A' => Comb::Leaf,
                b'P' => pair(it)?,
                _ => return None,
            };
            let r = match it.next()? {
                b'I' => Comb::Leaf,
                b'P' => pair(it)?,
                _ => return None,
            };
            Some(Comb::Node(Box::new(l), Box::new(r)))
        }
        let mut it = letters.bytes();
        let res = pair(&mut it)?;
        match it.next() {
            None => Some(res),
            Some(_) => None,
        }
    }

    fn leaves(&self) -> usize {
        match self {
            Comb::Leaf => 1,
            Comb::Node(l, r) => l.leaves() + r.leaves(),
        }
    }
}

struct Expander<'a, 'n> {
    arena: &'a Arena<Micheline<'a>>,
    name: &'n str,
    args: &'a [Micheline<'a>],
    anns: &'n Annotations<'a>,
    protocol: Protocol,
}

fn special<'a>(s: &'static str) -> Annotation<'a> {
    Annotation::Special(Cow::Borrowed(s))
}

fn empty_field<'a>() -> Annotation<'a> {
    Annotation::Field(Cow::Borrowed(""))
}

/// Field annotations for a `PAIR`/`UNPAIR` with the given children fields.
fn pair_fields<'a>(l: Option<Annotation<'a>>, r: Option<Annotation<'a>>) -> Annotations<'a> {
    match (l, r) {
        (None, None) => NO_ANNS,
        (Some(l), None) => [l].into(),
        (l, Some(r)) => [l.unwrap_or_else(empty_field), r].into(),
    }
}

impl<'a, 'n> Expander<'a, 'n> {
    fn seq(&self, xs: impl IntoIterator<Item = Micheline<'a>>) -> Micheline<'a> {
        Micheline::seq(self.arena, xs)
    }

    fn app(
        &self,
        prim: Prim,
        args: impl IntoIterator<Item = Micheline<'a>>,
        anns: Annotations<'a>,
    ) -> Micheline<'a> {
        Micheline::app(self.arena, prim, args, anns)
    }

    fn with_anns(&self, prim: Prim, anns: Annotations<'a>) -> Micheline<'a> {
        Micheline::App(prim, &[], anns)
    }

    fn arity(&self, expected: usize) -> Result<(), MacroError> {
        if self.args.len() != expected {
            return Err(MacroError::UnexpectedArgumentCount {
                name: self.name.to_owned(),
                expected,
                got: self.args.len(),
            });
        }
        Ok(())
    }

    fn seq_arg(&self, index: usize) -> Result<Micheline<'a>, MacroError> {
        match &self.args[index] {
            seq @ Micheline::Seq(_) => Ok(seq.clone()),
            _ => Err(MacroError::InvalidArgument {
                name: self.name.to_owned(),
                index,
                expected: "an instruction sequence",
            }),
        }
    }

    /// Check annotation counts. Special annotations are never accepted on
    /// macros.
    fn allow_anns(&self, var: usize, field: usize) -> Result<(), MacroError> {
        let too_many = |kind| MacroError::TooManyAnnotations {
            name: self.name.to_owned(),
            kind,
        };
        for ann in self.anns.iter() {
            if matches!(ann, Annotation::Special(_) | Annotation::Type(_))
                || (var == 0 && matches!(ann, Annotation::Variable(_)))
                || (field == 0 && matches!(ann, Annotation::Field(_)))
            {
                return Err(MacroError::UnexpectedAnnotation {
                    name: self.name.to_owned(),
                    ann: ann.to_string(),
                });
            }
        }
        if self.anns.vars().count() > var {
            return Err(too_many("variable"));
        }
        if self.anns.fields().count() > field {
            return Err(too_many("field"));
        }
        Ok(())
    }

    fn var_anns(&self) -> Annotations<'a> {
        self.anns
            .retain(|a| matches!(a, Annotation::Variable(_)))
            .into_iter()
            .collect()
    }

    fn field_ann(&self) -> Option<Annotation<'a>> {
        self.anns
            .iter()
            .find(|a| matches!(a, Annotation::Field(_)))
            .cloned()
    }

    /// `{ { UNIT ; FAILWITH } }`, the failing branch of assertions.
    fn fail_branch(&self) -> Micheline<'a> {
        let fail = self.seq([Micheline::prim0(Prim::UNIT), Micheline::prim0(Prim::FAILWITH)]);
        self.seq([fail])
    }

    /// `{ RENAME @var }` if there's a variable annotation, `{}` otherwise.
    fn rename_branch(&self) -> Micheline<'a> {
        let vars = self.var_anns();
        if vars.is_empty() {
            Micheline::Seq(&[])
        } else {
            self.seq([self.with_anns(Prim::RENAME, vars)])
        }
    }

    fn expand_core(&self, prim: Prim) -> Option<Micheline<'a>> {
        match (prim, self.args) {
            (Prim::CAR | Prim::CDR, [Micheline::Int(k)]) => {
                let k: BigInt = k * 2u32 + u32::from(prim == Prim::CAR);
                Some(self.app(Prim::GET, [Micheline::Int(k)], self.anns.clone()))
            }
            (Prim::DUP, [Micheline::Int(n)]) if !self.protocol.has_comb_instructions() => {
                n.to_usize().filter(|n| *n > 0).map(|n| self.expand_dup(n))
            }
            (Prim::UNPAIR, []) if !self.protocol.has_comb_instructions() && self.anns.is_empty() => {
                Some(self.seq(self.unpair_one(None, None)))
            }
            _ => None,
        }
    }

    fn expand_dup(&self, n: usize) -> Micheline<'a> {
        if self.protocol.has_comb_instructions() {
            self.app(Prim::DUP, [Micheline::Int(n.into())], self.anns.clone())
        } else if n == 1 {
            self.with_anns(Prim::DUP, self.anns.clone())
        } else {
            tracing::debug!(n, "expanding DUP n for a protocol without comb instructions");
            self.seq([
                Micheline::prim2(
                    self.arena,
                    Prim::DIP,
                    Micheline::Int((n - 1).into()),
                    self.seq([Micheline::prim0(Prim::DUP)]),
                ),
                self.app(Prim::DIG, [Micheline::Int(n.into())], self.anns.clone()),
            ])
        }
    }

    fn expand(&self, m: Macro) -> Result<Micheline<'a>, MacroError> {
        use Prim::{COMPARE, DIP, IF, IF_LEFT, IF_NONE};
        let compare = || Micheline::prim0(COMPARE);
        Ok(match m {
            Macro::CMP(op) => {
                self.arity(0)?;
                self.allow_anns(1, 0)?;
                self.seq([compare(), self.with_anns(op, self.var_anns())])
            }
            Macro::IF(op) => {
                self.arity(2)?;
                self.allow_anns(0, 0)?;
                self.seq([
                    Micheline::prim0(op),
                    Micheline::prim2(self.arena, IF, self.seq_arg(0)?, self.seq_arg(1)?),
                ])
            }
            Macro::IFCMP(op) => {
                self.arity(2)?;
                self.allow_anns(0, 0)?;
                self.seq([
                    compare(),
                    Micheline::prim0(op),
                    Micheline::prim2(self.arena, IF, self.seq_arg(0)?, self.seq_arg(1)?),
                ])
            }
            Macro::FAIL => {
                self.arity(0)?;
                self.allow_anns(0, 0)?;
                self.seq([Micheline::prim0(Prim::UNIT), Micheline::prim0(Prim::FAILWITH)])
            }
            Macro::ASSERT => {
                self.arity(0)?;
                self.allow_anns(0, 0)?;
                self.seq([Micheline::prim2(
                    self.arena,
                    IF,
                    Micheline::Seq(&[]),
                    self.fail_branch(),
                )])
            }
            Macro::ASSERT_OP(op) => {
                self.arity(0)?;
                self.allow_anns(0, 0)?;
                self.seq([
                    Micheline::prim0(op),
                    Micheline::prim2(self.arena, IF, Micheline::Seq(&[]), self.fail_branch()),
                ])
            }
            Macro::ASSERT_CMP(op) => {
                self.arity(0)?;
                self.allow_anns(0, 0)?;
                self.seq([
                    self.seq([compare(), Micheline::prim0(op)]),
                    Micheline::prim2(self.arena, IF, Micheline::Seq(&[]), self.fail_branch()),
                ])
            }
            Macro::ASSERT_NONE => {
                self.arity(0)?;
                self.allow_anns(0, 0)?;
                self.seq([Micheline::prim2(
                    self.arena,
                    IF_NONE,
                    Micheline::Seq(&[]),
                    self.fail_branch(),
                )])
            }
            Macro::ASSERT_SOME => {
                self.arity(0)?;
                self.allow_anns(1, 0)?;
                self.seq([Micheline::prim2(
                    self.arena,
                    IF_NONE,
                    self.fail_branch(),
                    self.rename_branch(),
                )])
            }
            Macro::ASSERT_LEFT => {
                self.arity(0)?;
                self.allow_anns(1, 0)?;
                self.seq([Micheline::prim2(
                    self.arena,
                    IF_LEFT,
                    self.rename_branch(),
                    self.fail_branch(),
                )])
            }
            Macro::ASSERT_RIGHT => {
                self.arity(0)?;
                self.allow_anns(1, 0)?;
                self.seq([Micheline::prim2(
                    self.arena,
                    IF_LEFT,
                    self.fail_branch(),
                    self.rename_branch(),
                )])
            }
            Macro::IF_SOME => {
                self.arity(2)?;
                self.allow_anns(0, 0)?;
                self.seq([self.app(
                    IF_NONE,
                    [self.seq_arg(1)?, self.seq_arg(0)?],
                    self.anns.clone(),
                )])
            }
            Macro::IF_RIGHT => {
                self.arity(2)?;
                self.allow_anns(0, 0)?;
                self.seq([self.app(
                    IF_LEFT,
                    [self.seq_arg(1)?, self.seq_arg(0)?],
                    self.anns.clone(),
                )])
            }
            // Do not wrap expansion of DII+P and DUU+P in a Seq to
            // match octez-client behavior.
            Macro::DIIP(n) => {
                self.arity(1)?;
                self.allow_anns(0, 0)?;
                Micheline::prim2(self.arena, DIP, Micheline::Int(n.into()), self.seq_arg(0)?)
            }
            Macro::DUUP(n) => {
                self.arity(0)?;
                self.allow_anns(1, 0)?;
                self.expand_dup(n)
            }
            Macro::CADR(path) => {
                self.arity(0)?;
                self.allow_anns(1, 1)?;
                let last = path.len() - 1;
                self.seq(path.bytes().enumerate().map(|(i, c)| {
                    let prim = if c == b'A' { Prim::CAR } else { Prim::CDR };
                    if i == last {
                        self.with_anns(prim, self.anns.clone())
                    } else {
                        Micheline::prim0(prim)
                    }
                }))
            }
            Macro::SET_CADR(path) => {
                self.arity(0)?;
                self.allow_anns(1, 1)?;
                self.seq(self.set_cadr(path.as_bytes(), self.var_anns()))
            }
            Macro::MAP_CADR(path) => {
                self.arity(1)?;
                self.allow_anns(1, 1)?;
                let code = self.seq_arg(0)?;
                self.seq(self.map_cadr(path.as_bytes(), &code, self.var_anns()))
            }
            Macro::PAPAIR(pattern) => {
                self.arity(0)?;
                let comb = self.comb(&pattern)?;
                let mut fields = self
                    .anns
                    .iter()
                    .filter(|a| matches!(a, Annotation::Field(_)))
                    .cloned();
                let mut ops = self.papair(&comb, &mut fields);
                // the variable annotation goes on the outermost PAIR
                if let Some(Micheline::App(Prim::PAIR, _, anns)) = ops.last_mut() {
                    anns.extend(self.var_anns());
                }
                self.seq(ops)
            }
            Macro::UNPAPAIR(pattern) => {
                self.arity(0)?;
                let comb = self.comb(&pattern)?;
                self.allow_anns(0, usize::MAX)?;
                let mut fields = self.anns.iter().cloned();
                self.seq(self.unpapair(&comb, &mut fields))
            }
        })
    }

    fn comb(&self, pattern: &str) -> Result<Comb, MacroError> {
        let comb =
            Comb::parse(pattern).ok_or_else(|| MacroError::InvalidPattern(self.name.to_owned()))?;
        if self.anns.fields().count() > comb.leaves() {
            return Err(MacroError::TooManyAnnotations {
                name: self.name.to_owned(),
                kind: "field",
            });
        }
        self.allow_anns(1, usize::MAX)?;
        Ok(comb)
    }

    fn papair(
        &self,
        comb: &Comb,
        fields: &mut impl Iterator<Item = Annotation<'a>>,
    ) -> Vec<Micheline<'a>> {
        let Comb::Node(l, r) = comb else {
            return Vec::new();
        };
        let mut out = Vec::new();
        let lf = match **l {
            Comb::Leaf => fields.next(),
            Comb::Node(..) => {
                out.extend(self.papair(l, fields));
                None
            }
        };
        let rf = match **r {
            Comb::Leaf => fields.next(),
            Comb::Node(..) => {
                let inner = self.papair(r, fields);
                out.push(Micheline::prim1(self.arena, Prim::DIP, self.seq(inner)));
                None
            }
        };
        out.push(self.with_anns(Prim::PAIR, pair_fields(lf, rf)));
        out
    }

    fn unpair_one(
        &self,
        lf: Option<Annotation<'a>>,
        rf: Option<Annotation<'a>>,
    ) -> Vec<Micheline<'a>> {
        if self.protocol.has_comb_instructions() {
            vec![self.with_anns(Prim::UNPAIR, pair_fields(lf, rf))]
        } else {
            let one = |f: Option<Annotation<'a>>| f.into_iter().collect::<Annotations>();
            vec![
                Micheline::prim0(Prim::DUP),
                self.with_anns(Prim::CAR, one(lf)),
                Micheline::prim1(
                    self.arena,
                    Prim::DIP,
                    self.seq([self.with_anns(Prim::CDR, one(rf))]),
                ),
            ]
        }
    }

    fn unpapair(
        &self,
        comb: &Comb,
        fields: &mut impl Iterator<Item = Annotation<'a>>,
    ) -> Vec<Micheline<'a>> {
        let Comb::Node(l, r) = comb else {
            return Vec::new();
        };
        let (l_ops, lf) = match **l {
            Comb::Leaf => (Vec::new(), fields.next()),
            Comb::Node(..) => (self.unpapair(l, fields), None),
        };
        let (r_ops, rf) = match **r {
            Comb::Leaf => (Vec::new(), fields.next()),
            Comb::Node(..) => (self.unpapair(r, fields), None),
        };
        let mut out = self.unpair_one(lf, rf);
        if !r_ops.is_empty() {
            out.push(Micheline::prim1(self.arena, Prim::DIP, self.seq(r_ops)));
        }
        out.extend(l_ops);
        out
    }

    /// Body of `SET_C[AD]+R`. Only the innermost step carries the field
    /// annotation, only the outermost one the variable annotation.
    fn set_cadr(&self, path: &[u8], var: Annotations<'a>) -> Vec<Micheline<'a>> {
        let parent_field = || -> Annotations<'a> { [special(ANN_VAR_PARENT_FIELD)].into() };
        let (access, other) = if path[0] == b'A' {
            (Prim::CAR, Prim::CDR)
        } else {
            (Prim::CDR, Prim::CAR)
        };
        if let [_] = path {
            let field = self.field_ann();
            let mut out = Vec::new();
            if let Some(f) = &field {
                out.push(Micheline::prim0(Prim::DUP));
                out.push(self.with_anns(access, [f.clone()].into()));
                out.push(Micheline::prim0(Prim::DROP));
            }
            out.push(self.with_anns(other, parent_field()));
            let field = field.unwrap_or_else(empty_field);
            let mut pair_anns: Annotations = if access == Prim::CAR {
                out.push(Micheline::prim0(Prim::SWAP));
                [field, special(ANN_FIELD_VAR)].into()
            } else {
                [special(ANN_FIELD_VAR), field].into()
            };
            pair_anns.extend(var);
            out.push(self.with_anns(Prim::PAIR, pair_anns));
            return out;
        }
        let mut inner = vec![self.with_anns(access, parent_field())];
        inner.push(self.seq(self.set_cadr(&path[1..], NO_ANNS)));
        self.descend(access, other, inner, var)
    }

    /// Body of `MAP_C[AD]+R`, same annotation rules as [Self::set_cadr].
    fn map_cadr(
        &self,
        path: &[u8],
        code: &Micheline<'a>,
        var: Annotations<'a>,
    ) -> Vec<Micheline<'a>> {
        let parent_field = || -> Annotations<'a> { [special(ANN_VAR_PARENT_FIELD)].into() };
        let (access, other) = if path[0] == b'A' {
            (Prim::CAR, Prim::CDR)
        } else {
            (Prim::CDR, Prim::CAR)
        };
        if let [_] = path {
            let field = self.field_ann();
            let mut access_anns = parent_field();
            access_anns.extend(field.clone());
            let field = field.unwrap_or_else(empty_field);
            let mut out = vec![Micheline::prim0(Prim::DUP)];
            let mut pair_anns: Annotations = if access == Prim::CAR {
                out.push(self.with_anns(other, parent_field()));
                out.push(Micheline::prim1(
                    self.arena,
                    Prim::DIP,
                    self.seq([self.with_anns(access, access_anns), code.clone()]),
                ));
                out.push(Micheline::prim0(Prim::SWAP));
                [field, special(ANN_FIELD_VAR)].into()
            } else {
                out.push(self.with_anns(access, access_anns));
                out.push(code.clone());
                out.push(Micheline::prim0(Prim::SWAP));
                out.push(self.with_anns(other, parent_field()));
                [special(ANN_FIELD_VAR), field].into()
            };
            pair_anns.extend(var);
            out.push(self.with_anns(Prim::PAIR, pair_anns));
            return out;
        }
        let mut inner = vec![self.with_anns(access, parent_field())];
        inner.push(self.seq(self.map_cadr(&path[1..], code, NO_ANNS)));
        self.descend(access, other, inner, var)
    }

    /// `DUP ; DIP { inner } ; <other> ; [SWAP] ; PAIR %@ %@`, rebuilding the
    /// pair after `inner` updated the `access` side.
    fn descend(
        &self,
        access: Prim,
        other: Prim,
        inner: Vec<Micheline<'a>>,
        var: Annotations<'a>,
    ) -> Vec<Micheline<'a>> {
        let mut out = vec![
            Micheline::prim0(Prim::DUP),
            Micheline::prim1(self.arena, Prim::DIP, self.seq(inner)),
            self.with_anns(other, [special(ANN_VAR_PARENT_FIELD)].into()),
        ];
        if access == Prim::CAR {
            out.push(Micheline::prim0(Prim::SWAP));
        }
        let mut pair_anns: Annotations = [special(ANN_FIELD_VAR), special(ANN_FIELD_VAR)].into();
        pair_anns.extend(var);
        out.push(self.with_anns(Prim::PAIR, pair_anns));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::test_helpers::*;

    #[test]
    fn test_macros() {
        // The tests below checks that the macro expands to the same sequence
        // of instruction as produced by the octez-client. The latter is also
        // provided as the expectation.
        assert_eq!(
            parse("{ ASSERT }").unwrap(),
            parse_core("{ { IF {} { { UNIT ; FAILWITH } } } }")
        );
        assert_eq!(
            parse("{ ASSERT_CMPEQ }").unwrap(),
            parse_core("{{ { COMPARE ; EQ } ; IF {} { { UNIT ; FAILWITH } } }}")
        );
        assert_eq!(
            parse("{ ASSERT_LE }").unwrap(),
            parse_core("{{ LE ; IF {} { { UNIT ; FAILWITH } } }}")
        );
        assert_eq!(
            parse("{ IF_SOME { UNIT } {} }").unwrap(),
            parse_core("{ { IF_NONE {} { UNIT } } }")
        );
        assert_eq!(
            parse("{ IF_RIGHT { UNIT } {} }").unwrap(),
            parse_core("{ { IF_LEFT {} { UNIT } } }")
        );
        assert_eq!(
            parse("{ IFCMPLE { UNIT } {} }").unwrap(),
            parse_core("{ { COMPARE ; LE ; IF { UNIT } {} } }")
        );
        assert_eq!(
            parse("{ IFGT { UNIT } {} }").unwrap(),
            parse_core("{ { GT ; IF { UNIT } {} } }")
        );
        assert_eq!(
            parse("{ CMPNEQ @ne }").unwrap(),
            parse_core("{ { COMPARE ; NEQ @ne } }")
        );
        assert_eq!(
            parse("{ FAIL }").unwrap(),
            parse_core("{ { UNIT ; FAILWITH } }")
        );
        assert_eq!(
            parse("{ DIIIP { UNIT } }").unwrap(),
            parse_core("{ DIP 3 { UNIT } }")
        );
        assert_eq!(parse("{ DUUUUP }").unwrap(), parse_core("{ DUP 4 }"));
    }

    #[test]
    fn assert_variants() {
        assert_eq!(
            parse("{ ASSERT_NONE }").unwrap(),
            parse_core("{ { IF_NONE {} { { UNIT ; FAILWITH } } } }")
        );
        assert_eq!(
            parse("{ ASSERT_SOME @x }").unwrap(),
            parse_core("{ { IF_NONE { { UNIT ; FAILWITH } } { RENAME @x } } }")
        );
        assert_eq!(
            parse("{ ASSERT_LEFT }").unwrap(),
            parse_core("{ { IF_LEFT {} { { UNIT ; FAILWITH } } } }")
        );
        assert_eq!(
            parse("{ ASSERT_RIGHT }").unwrap(),
            parse_core("{ { IF_LEFT { { UNIT ; FAILWITH } } {} } }")
        );
    }

    #[test]
    fn cadr() {
        assert_eq!(
            parse("{ CADDR @x }").unwrap(),
            parse_core("{ { CAR ; CDR ; CDR @x } }")
        );
        assert_eq!(parse("{ CAR 2 }").unwrap(), parse_core("{ GET 5 }"));
        assert_eq!(parse("{ CDR 2 }").unwrap(), parse_core("{ GET 4 }"));
        assert_eq!(parse("{ CDR 0 }").unwrap(), parse_core("{ GET 0 }"));
    }

    #[test]
    fn set_and_map_cadr() {
        assert_eq!(
            parse("{ SET_CAR }").unwrap(),
            parse_core("{ { CDR @%% ; SWAP ; PAIR % %@ } }")
        );
        assert_eq!(
            parse("{ SET_CDR %b }").unwrap(),
            parse_core("{ { DUP ; CDR %b ; DROP ; CAR @%% ; PAIR %@ %b } }")
        );
        assert_eq!(
            parse("{ SET_CADR }").unwrap(),
            parse_core(
                "{ { DUP ; DIP { CAR @%% ; { CAR @%% ; PAIR %@ % } } ; \
                 CDR @%% ; SWAP ; PAIR %@ %@ } }"
            )
        );
        assert_eq!(
            parse("{ MAP_CDR { INT } }").unwrap(),
            parse_core("{ { DUP ; CDR @%% ; { INT } ; SWAP ; CAR @%% ; PAIR %@ % } }")
        );
        assert_eq!(
            parse("{ MAP_CAR @v { INT } }").unwrap(),
            parse_core("{ { DUP ; CDR @%% ; DIP { CAR @%% ; { INT } } ; SWAP ; PAIR % %@ @v } }")
        );
        assert!(matches!(
            parse("{ SET_CAR %a %b }"),
            Err(crate::parser::ParserError::MacroError(
                MacroError::TooManyAnnotations { .. }
            ))
        ));
        assert_eq!(
            parse("{ CDAR @x %f }").unwrap(),
            parse_core("{ { CDR ; CAR @x %f } }")
        );
        for bad in [
            "{ CADR :t }",
            "{ CADR @%% }",
            "{ IF_SOME @x {} {} }",
            "{ IF_RIGHT %f {} {} }",
        ] {
            assert!(
                matches!(
                    parse(bad),
                    Err(crate::parser::ParserError::MacroError(
                        MacroError::UnexpectedAnnotation { .. }
                    ))
                ),
                "{bad}"
            );
        }
        assert!(matches!(
            parse("{ CADR @a @b }"),
            Err(crate::parser::ParserError::MacroError(
                MacroError::TooManyAnnotations { .. }
            ))
        ));
    }

    #[test]
    fn comb_macros() {
        assert_eq!(
            parse("{ PAPAIR }").unwrap(),
            parse_core("{ { DIP { PAIR } ; PAIR } }")
        );
        assert_eq!(
            parse("{ PPAIIR }").unwrap(),
            parse_core("{ { PAIR ; PAIR } }")
        );
        assert_eq!(
            parse("{ PAPPAIIR @p %a %b %c %d }").unwrap(),
            parse_core("{ { DIP { PAIR %b %c ; PAIR % %d } ; PAIR %a @p } }")
        );
        assert_eq!(
            parse("{ UNPAPAIR }").unwrap(),
            parse_core("{ { UNPAIR ; DIP { UNPAIR } } }")
        );
        assert_eq!(
            parse("{ UNPPAIIR }").unwrap(),
            parse_core("{ { UNPAIR ; UNPAIR } }")
        );
        assert!(matches!(
            parse("{ PAPIR }"),
            Err(crate::parser::ParserError::MacroError(
                MacroError::InvalidPattern(_)
            ))
        ));
        assert!(matches!(
            parse("{ PAPAIR %a %b %c %d }"),
            Err(crate::parser::ParserError::MacroError(
                MacroError::TooManyAnnotations { .. }
            ))
        ));
    }

    #[test]
    fn protocol_gating() {
        let old = |s| parse_with_protocol(s, Protocol::Delphi);
        assert_eq!(
            old("{ DUP 3 }").unwrap(),
            parse_core("{ { DIP 2 { DUP } ; DIG 3 } }")
        );
        assert_eq!(old("{ DUUP }").unwrap(), old("{ DUP 2 }").unwrap());
        assert_eq!(old("{ DUP 1 }").unwrap(), parse_core("{ DUP }"));
        assert_eq!(
            old("{ UNPAIR }").unwrap(),
            parse_core("{ { DUP ; CAR ; DIP { CDR } } }")
        );
        assert_eq!(
            old("{ UNPAPAIR }").unwrap(),
            parse_core("{ { DUP ; CAR ; DIP { CDR } ; DIP { DUP ; CAR ; DIP { CDR } } } }")
        );
        assert_eq!(parse("{ DUP 3 }").unwrap(), parse_core("{ DUP 3 }"));
    }

    #[test]
    fn argument_errors() {
        assert_eq!(
            parse("{ FAIL {} {} }").unwrap_err().to_string(),
            "unexpected number of arguments for macro FAIL: expected 0, got 2"
        );
        assert_eq!(
            parse("{ IFEQ 1 {} }").unwrap_err().to_string(),
            "macro IFEQ expects an instruction sequence as argument 0"
        );
        assert_eq!(
            parse("{ FAIL @x }").unwrap_err().to_string(),
            "unexpected annotation @x for macro FAIL"
        );
    }

    #[test]
    fn idempotence() {
        let arena = Arena::new();
        for src in [
            "{ PAPPAIIR ; CAR 1 ; ASSERT_CMPEQ ; SET_CADR ; UNPAPAIR }",
            "{ DIP { DUP 3 ; UNPAIR } ; IF_SOME { FAIL } {} }",
        ] {
            for protocol in [Protocol::Delphi, Protocol::LATEST] {
                let once = parse_with_protocol(src, protocol).unwrap();
                let twice = expand_macros(&arena, &once, protocol).unwrap();
                assert_eq!(once, twice);
            }
        }
        // already-core trees are unchanged
        let core = parse_core("{ DUP ; DIP 2 { DROP } ; GET 3 }");
        assert_eq!(expand_macros(&arena, &core, Protocol::LATEST).unwrap(), core);
    }
}
