/******************************************************************************/
/*                                                                            */
/* SPDX-License-Identifier: MIT                                               */
/* Copyright (c) [2023] Serokell <hi@serokell.io>                             */
/*                                                                            */
/******************************************************************************/

//! Type-directed conversion between the readable and the optimized forms of
//! data.
//!
//! The optimized form is the one `PACK` produces: chain literals become their
//! binary representation, timestamps become numbers and combs become nested
//! binary `Pair`s. The walk follows the type and the data in lock-step.
//! Without a type, or where the data doesn't have the shape the type
//! requires, the walk falls back to a generic traversal that leaves literals
//! alone but still optimizes the data of `PUSH` instructions, whose type is
//! known from the instruction itself.

use typed_arena::Arena;

use super::PackError;
use crate::ast::{
    timestamp::{format_timestamp, parse_timestamp},
    Address, Annotations, ByteReprTrait, ChainId, Key, KeyHash, Micheline, Signature, NO_ANNS,
};
use crate::lexer::Prim;

/// Which way the literals are converted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Optimize,
    Readable,
}

/// Convert data to its optimized form.
pub fn optimize<'a>(
    arena: &'a Arena<Micheline<'a>>,
    data: &Micheline<'a>,
    ty: Option<&Micheline>,
) -> Result<Micheline<'a>, PackError> {
    Walker {
        arena,
        dir: Direction::Optimize,
    }
    .walk(data, ty)
}

/// Convert optimized data back to the readable form.
pub fn unoptimize<'a>(
    arena: &'a Arena<Micheline<'a>>,
    data: &Micheline<'a>,
    ty: Option<&Micheline>,
) -> Result<Micheline<'a>, PackError> {
    Walker {
        arena,
        dir: Direction::Readable,
    }
    .walk(data, ty)
}

struct Walker<'a> {
    arena: &'a Arena<Micheline<'a>>,
    dir: Direction,
}

/// Right comb remainder of a pair type or value: the last argument when two
/// are left, the same primitive applied to the tail otherwise.
fn comb_rest<'a>(prim: Prim, args: &'a [Micheline<'a>]) -> Micheline<'a> {
    match args {
        [_, last] => last.clone(),
        [_, rest @ ..] => Micheline::App(prim, rest, NO_ANNS),
        [] => Micheline::App(prim, args, NO_ANNS),
    }
}

impl<'a> Walker<'a> {
    fn walk(&self, data: &Micheline<'a>, ty: Option<&Micheline>) -> Result<Micheline<'a>, PackError> {
        use Micheline as M;
        let Some(M::App(ty_prim, targs, _)) = ty else {
            return self.generic(data);
        };
        match (ty_prim, targs, data) {
            (Prim::address | Prim::contract, _, _) => self.literal::<Address>("address", data),
            (Prim::key, [], _) => self.literal::<Key>("key", data),
            (Prim::key_hash, [], _) => self.literal::<KeyHash>("key_hash", data),
            (Prim::signature, [], _) => self.literal::<Signature>("signature", data),
            (Prim::chain_id, [], _) => self.literal::<ChainId>("chain_id", data),
            (Prim::timestamp, [], _) => self.timestamp(data),
            (Prim::pair, [t1, _, ..], &M::App(Prim::Pair, args, ref anns)) if args.len() >= 2 => {
                let rest_ty = comb_rest(Prim::pair, targs);
                let first = self.walk(&args[0], Some(t1))?;
                let rest = self.walk(&comb_rest(Prim::Pair, args), Some(&rest_ty))?;
                Ok(M::App(
                    Prim::Pair,
                    self.arena.alloc_extend([first, rest]),
                    anns.clone(),
                ))
            }
            (Prim::pair, [t1, _, ..], &M::Seq(xs)) if xs.len() >= 2 => {
                let rest_ty = comb_rest(Prim::pair, targs);
                let first = self.walk(&xs[0], Some(t1))?;
                let rest = match xs {
                    [_, last] => last.clone(),
                    [_, tail @ ..] => M::Seq(tail),
                    [] => M::Seq(xs),
                };
                let rest = self.walk(&rest, Some(&rest_ty))?;
                Ok(M::prim2(self.arena, Prim::Pair, first, rest))
            }
            (Prim::or, [l, _], M::App(Prim::Left, [x], anns)) => self.wrap(Prim::Left, x, l, anns),
            (Prim::or, [_, r], M::App(Prim::Right, [x], anns)) => {
                self.wrap(Prim::Right, x, r, anns)
            }
            (Prim::option, [t], M::App(Prim::Some, [x], anns)) => {
                self.wrap(Prim::Some, x, t, anns)
            }
            (Prim::list | Prim::set, [t], M::Seq(xs)) => {
                let xs = xs
                    .iter()
                    .map(|x| self.walk(x, Some(t)))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(M::seq(self.arena, xs))
            }
            (Prim::map | Prim::big_map, [kt, vt], M::Seq(xs)) => {
                let xs = xs
                    .iter()
                    .map(|elt| match elt {
                        M::App(Prim::Elt, [k, v], anns) => Ok(M::App(
                            Prim::Elt,
                            self.arena
                                .alloc_extend([self.walk(k, Some(kt))?, self.walk(v, Some(vt))?]),
                            anns.clone(),
                        )),
                        other => self.generic(other),
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(M::seq(self.arena, xs))
            }
            _ => self.generic(data),
        }
    }

    fn wrap(
        &self,
        prim: Prim,
        x: &Micheline<'a>,
        ty: &Micheline,
        anns: &Annotations<'a>,
    ) -> Result<Micheline<'a>, PackError> {
        let x = self.walk(x, Some(ty))?;
        Ok(Micheline::App(prim, self.arena.alloc_extend([x]), anns.clone()))
    }

    /// Walk without type information. Only `PUSH` arguments get converted.
    fn generic(&self, data: &Micheline<'a>) -> Result<Micheline<'a>, PackError> {
        match data {
            Micheline::App(Prim::PUSH, [ty, value], anns) => {
                let value = self.walk(value, Some(ty))?;
                Ok(Micheline::App(
                    Prim::PUSH,
                    self.arena.alloc_extend([ty.clone(), value]),
                    anns.clone(),
                ))
            }
            Micheline::App(prim, args, anns) if !args.is_empty() => {
                let args = args
                    .iter()
                    .map(|x| self.generic(x))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Micheline::App(*prim, self.arena.alloc_extend(args), anns.clone()))
            }
            Micheline::Seq(xs) => {
                let xs = xs
                    .iter()
                    .map(|x| self.generic(x))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Micheline::seq(self.arena, xs))
            }
            other => Ok(other.clone()),
        }
    }

    fn literal<T: ByteReprTrait>(
        &self,
        ty: &'static str,
        data: &Micheline<'a>,
    ) -> Result<Micheline<'a>, PackError> {
        let invalid = |literal: String, reason: String| PackError::InvalidLiteral {
            ty,
            literal,
            reason,
        };
        match (self.dir, data) {
            (Direction::Optimize, Micheline::String(s)) => T::from_base58_check(s)
                .map(|v| Micheline::Bytes(v.to_bytes_vec()))
                .map_err(|e| invalid(s.clone(), e.to_string())),
            (Direction::Readable, Micheline::Bytes(b)) => T::from_bytes(b)
                .map(|v| Micheline::String(v.to_base58_check()))
                .map_err(|e| invalid(format!("0x{}", hex::encode(b)), e.to_string())),
            _ => Ok(data.clone()),
        }
    }

    fn timestamp(&self, data: &Micheline<'a>) -> Result<Micheline<'a>, PackError> {
        match (self.dir, data) {
            (Direction::Optimize, Micheline::String(s)) => parse_timestamp(s)
                .map(Micheline::Int)
                .ok_or_else(|| PackError::InvalidLiteral {
                    ty: "timestamp",
                    literal: s.clone(),
                    reason: "not an RFC 3339 date".to_owned(),
                }),
            (Direction::Readable, Micheline::Int(secs)) => Ok(format_timestamp(secs)
                .map(Micheline::String)
                .unwrap_or_else(|| data.clone())),
            _ => Ok(data.clone()),
        }
    }
}
