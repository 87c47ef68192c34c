/******************************************************************************/
/*                                                                            */
/* SPDX-License-Identifier: MIT                                               */
/* Copyright (c) [2023] Serokell <hi@serokell.io>                             */
/*                                                                            */
/******************************************************************************/

//! Michelson types as seen by the typechecker.

use std::fmt;

use crate::lexer::Prim;

/// Type annotations attached to a type or to a stack slot. `var` is only
/// meaningful for stack slots.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct TypeAnns {
    pub ty: Option<String>,
    pub field: Option<String>,
    pub var: Option<String>,
}

impl TypeAnns {
    pub fn is_empty(&self) -> bool {
        self.ty.is_none() && self.field.is_none() && self.var.is_none()
    }
}

/// Type structure. Components are annotated [Ty]s.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Type {
    Int,
    Nat,
    String,
    Bytes,
    Mutez,
    Bool,
    KeyHash,
    Timestamp,
    Address,
    Key,
    Unit,
    Signature,
    ChainId,
    Never,
    Operation,
    Bls12381G1,
    Bls12381G2,
    Bls12381Fr,
    Chest,
    ChestKey,
    TxRollupL2Address,
    SaplingState(u32),
    SaplingTransaction(u32),
    Option(Box<Ty>),
    List(Box<Ty>),
    Set(Box<Ty>),
    Contract(Box<Ty>),
    Ticket(Box<Ty>),
    Pair(Box<(Ty, Ty)>),
    Or(Box<(Ty, Ty)>),
    Map(Box<(Ty, Ty)>),
    BigMap(Box<(Ty, Ty)>),
    Lambda(Box<(Ty, Ty)>),
}

/// A type with its annotations.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Ty {
    pub t: Type,
    pub anns: TypeAnns,
}

impl From<Type> for Ty {
    fn from(t: Type) -> Self {
        Ty {
            t,
            anns: TypeAnns::default(),
        }
    }
}

impl Ty {
    pub fn with_var(mut self, var: Option<String>) -> Self {
        self.anns.var = var;
        self
    }

    pub fn with_field(mut self, field: Option<String>) -> Self {
        self.anns.field = field;
        self
    }

    pub fn with_type_ann(mut self, ty: Option<String>) -> Self {
        self.anns.ty = ty;
        self
    }

    /// Copy without any annotations, recursively.
    pub fn erase_anns(&self) -> Ty {
        let go = |x: &Ty| x.erase_anns();
        let go2 = |p: &(Ty, Ty)| Box::new((p.0.erase_anns(), p.1.erase_anns()));
        let t = match &self.t {
            Type::Option(x) => Type::Option(Box::new(go(x))),
            Type::List(x) => Type::List(Box::new(go(x))),
            Type::Set(x) => Type::Set(Box::new(go(x))),
            Type::Contract(x) => Type::Contract(Box::new(go(x))),
            Type::Ticket(x) => Type::Ticket(Box::new(go(x))),
            Type::Pair(p) => Type::Pair(go2(p)),
            Type::Or(p) => Type::Or(go2(p)),
            Type::Map(p) => Type::Map(go2(p)),
            Type::BigMap(p) => Type::BigMap(go2(p)),
            Type::Lambda(p) => Type::Lambda(go2(p)),
            t => t.clone(),
        };
        t.into()
    }
}

impl Type {
    pub fn new_pair(l: impl Into<Ty>, r: impl Into<Ty>) -> Self {
        Self::Pair(Box::new((l.into(), r.into())))
    }

    pub fn new_or(l: impl Into<Ty>, r: impl Into<Ty>) -> Self {
        Self::Or(Box::new((l.into(), r.into())))
    }

    pub fn new_map(k: impl Into<Ty>, v: impl Into<Ty>) -> Self {
        Self::Map(Box::new((k.into(), v.into())))
    }

    pub fn new_big_map(k: impl Into<Ty>, v: impl Into<Ty>) -> Self {
        Self::BigMap(Box::new((k.into(), v.into())))
    }

    pub fn new_lambda(arg: impl Into<Ty>, res: impl Into<Ty>) -> Self {
        Self::Lambda(Box::new((arg.into(), res.into())))
    }

    pub fn new_option(x: impl Into<Ty>) -> Self {
        Self::Option(Box::new(x.into()))
    }

    pub fn new_list(x: impl Into<Ty>) -> Self {
        Self::List(Box::new(x.into()))
    }

    pub fn new_set(x: impl Into<Ty>) -> Self {
        Self::Set(Box::new(x.into()))
    }

    pub fn new_contract(x: impl Into<Ty>) -> Self {
        Self::Contract(Box::new(x.into()))
    }

    pub fn new_ticket(x: impl Into<Ty>) -> Self {
        Self::Ticket(Box::new(x.into()))
    }

    /// The type primitive.
    pub fn prim(&self) -> Prim {
        match self {
            Type::Int => Prim::int,
            Type::Nat => Prim::nat,
            Type::String => Prim::string,
            Type::Bytes => Prim::bytes,
            Type::Mutez => Prim::mutez,
            Type::Bool => Prim::bool,
            Type::KeyHash => Prim::key_hash,
            Type::Timestamp => Prim::timestamp,
            Type::Address => Prim::address,
            Type::Key => Prim::key,
            Type::Unit => Prim::unit,
            Type::Signature => Prim::signature,
            Type::ChainId => Prim::chain_id,
            Type::Never => Prim::never,
            Type::Operation => Prim::operation,
            Type::Bls12381G1 => Prim::bls12_381_g1,
            Type::Bls12381G2 => Prim::bls12_381_g2,
            Type::Bls12381Fr => Prim::bls12_381_fr,
            Type::Chest => Prim::chest,
            Type::ChestKey => Prim::chest_key,
            Type::TxRollupL2Address => Prim::tx_rollup_l2_address,
            Type::SaplingState(_) => Prim::sapling_state,
            Type::SaplingTransaction(_) => Prim::sapling_transaction,
            Type::Option(_) => Prim::option,
            Type::List(_) => Prim::list,
            Type::Set(_) => Prim::set,
            Type::Contract(_) => Prim::contract,
            Type::Ticket(_) => Prim::ticket,
            Type::Pair(_) => Prim::pair,
            Type::Or(_) => Prim::or,
            Type::Map(_) => Prim::map,
            Type::BigMap(_) => Prim::big_map,
            Type::Lambda(_) => Prim::lambda,
        }
    }

    fn has_args(&self) -> bool {
        !matches!(self.args(), Args::None)
    }

    fn args(&self) -> Args<'_> {
        match self {
            Type::SaplingState(n) | Type::SaplingTransaction(n) => Args::Size(*n),
            Type::Option(x) | Type::List(x) | Type::Set(x) | Type::Contract(x) | Type::Ticket(x) => {
                Args::One(x)
            }
            Type::Pair(p) | Type::Or(p) | Type::Map(p) | Type::BigMap(p) | Type::Lambda(p) => {
                Args::Two(&p.0, &p.1)
            }
            _ => Args::None,
        }
    }
}

enum Args<'a> {
    None,
    Size(u32),
    One(&'a Ty),
    Two(&'a Ty, &'a Ty),
}

impl Ty {
    fn fmt_nested(&self, f: &mut fmt::Formatter<'_>, nested: bool) -> fmt::Result {
        let parens = nested && (self.t.has_args() || !self.anns.is_empty());
        if parens {
            write!(f, "(")?;
        }
        write!(f, "{}", self.t.prim())?;
        if let Some(t) = &self.anns.ty {
            write!(f, " :{t}")?;
        }
        if let Some(field) = &self.anns.field {
            write!(f, " %{field}")?;
        }
        if let Some(v) = &self.anns.var {
            write!(f, " @{v}")?;
        }
        match self.t.args() {
            Args::None => {}
            Args::Size(n) => write!(f, " {n}")?,
            Args::One(x) => {
                write!(f, " ")?;
                x.fmt_nested(f, true)?;
            }
            Args::Two(l, r) => {
                write!(f, " ")?;
                l.fmt_nested(f, true)?;
                write!(f, " ")?;
                r.fmt_nested(f, true)?;
            }
        }
        if parens {
            write!(f, ")")?;
        }
        Ok(())
    }
}

/// Michelson syntax, annotations included.
impl fmt::Display for Ty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_nested(f, false)
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        Ty::from(self.clone()).fmt(f)
    }
}
