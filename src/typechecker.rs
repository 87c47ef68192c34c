/******************************************************************************/
/*                                                                            */
/* SPDX-License-Identifier: MIT                                               */
/* Copyright (c) [2023] Serokell <hi@serokell.io>                             */
/*                                                                            */
/******************************************************************************/

//! Static type checking of Michelson instructions, data and whole contracts.
//!
//! Instructions are checked against a [TypeStack], producing either the
//! resulting stack or a failure (see [FailingTypeStack]). Variable
//! annotations on the resulting stack slots follow the usual conventions:
//! an explicit `@var` on the instruction wins, `CAR` and `CDR` otherwise
//! derive one from the field annotation of the component.

pub mod overloads;
pub mod type_props;

use num_bigint::{BigInt, Sign};
use num_traits::ToPrimitive;

use crate::ast::annotations::AnnotationError;
use crate::ast::micheline::{
    micheline_fields, micheline_literals, micheline_types, micheline_values,
};
use crate::ast::michelson_key_hash::KeyHash;
use crate::ast::timestamp::parse_timestamp;
use crate::ast::{
    Address, Annotations, ByteReprError, ByteReprTrait, ChainId, Entrypoint, Key, Micheline,
    Signature, Ty, Type, TypeAnns,
};
use crate::context::Ctx;
use crate::lexer::{Annotation, Prim, ANN_FIELD_VAR, ANN_VAR_FIELD};
use crate::protocol::Protocol;
use crate::stack::{tc_stk, FailingTypeStack, TypeStack};
use crate::validator::{self, ValidationError};

pub use type_props::TypeProperty;

#[derive(Debug, PartialEq, Eq, Clone, thiserror::Error)]
pub enum TcError {
    #[error("type stacks not equal: {0} != {1}, {2}")]
    StacksNotEqual(TypeStack, TypeStack, StacksNotEqualReason),
    #[error("type is not {0}: {1}")]
    InvalidTypeProperty(TypeProperty, Ty),
    #[error("FAILWITH instruction is not in tail position")]
    FailNotInTail,
    #[error(transparent)]
    TypesNotEqual(#[from] TypesNotEqual),
    #[error("DUP 0 is forbidden")]
    Dup0,
    #[error("{0} needs at least 2 components, got {1}")]
    InvalidCombSize(Prim, usize),
    #[error("value {0} is invalid for type {1}")]
    InvalidValueForType(String, Ty),
    #[error("value {0} is invalid element for container type {1}")]
    InvalidEltForMap(String, Ty),
    #[error("sequence elements must be in strictly ascending order for type {0}")]
    ElementsNotSorted(Ty),
    #[error("sequence elements must contain no duplicate keys for type {0}")]
    DuplicateElements(Ty),
    #[error("no matching overload for {instr} on stack {stack}{}", .reason.as_ref().map_or("".to_owned(), |x| format!(", reason: {}", x)))]
    NoMatchingOverload {
        instr: Prim,
        stack: TypeStack,
        reason: Option<NoMatchingOverloadReason>,
    },
    #[error("invalid value for type {0}: {1}")]
    ByteReprError(Ty, ByteReprError),
    #[error("invalid entrypoint: {0}")]
    EntrypointError(ByteReprError),
    #[error("SELF instruction is forbidden in this context")]
    SelfForbidden,
    #[error("no such entrypoint: {0}")]
    NoSuchEntrypoint(Entrypoint),
    #[error("unexpected syntax: {0}")]
    UnexpectedMicheline(String),
    #[error("duplicate top-level element: {0}")]
    DuplicateTopLevelElt(Prim),
    #[error("missing top-level element: {0}")]
    MissingTopLevelElt(Prim),
    #[error("expected a natural between 0 and 1023, but got {0}")]
    ExpectedU10(BigInt),
    #[error(transparent)]
    AnnotationError(#[from] AnnotationError),
    #[error("duplicate entrypoint: {0}")]
    DuplicateEntrypoint(Entrypoint),
    #[error("field annotation mismatch: expected %{expected}, got %{got}")]
    FieldAnnotationMismatch { expected: String, got: String },
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("{0} is forbidden in views")]
    ForbiddenInView(Prim),
    #[error("{instr} is not supported by protocol {protocol}")]
    UnsupportedInProtocol { instr: Prim, protocol: Protocol },
}

#[derive(Debug, PartialEq, Eq, Clone, thiserror::Error)]
pub enum NoMatchingOverloadReason {
    #[error("stack too short, expected {expected}")]
    StackTooShort { expected: usize },
    #[error(transparent)]
    TypesNotEqual(#[from] TypesNotEqual),
    #[error("expected pair 'a 'b, but got {0}")]
    ExpectedPair(Ty),
    #[error("expected option 'a, but got {0}")]
    ExpectedOption(Ty),
    #[error("expected list 'a, but got {0}")]
    ExpectedList(Ty),
    #[error("expected or 'a 'b, but got {0}")]
    ExpectedOr(Ty),
    #[error("type not comparable: {0}")]
    TypeNotComparable(Ty),
}

#[derive(Debug, PartialEq, Eq, Clone, thiserror::Error)]
pub enum StacksNotEqualReason {
    #[error(transparent)]
    TypesNotEqual(#[from] TypesNotEqual),
    #[error("lengths are different: {0} != {1}")]
    LengthsDiffer(usize, usize),
}

#[derive(Debug, PartialEq, Eq, Clone, thiserror::Error)]
#[error("types not equal: {0} != {1}")]
pub struct TypesNotEqual(pub Ty, pub Ty);

/// Entrypoints of a contract, in the order they appear in the parameter type.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Entrypoints(Vec<(Entrypoint, Ty)>);

impl Entrypoints {
    pub fn get(&self, ep: &Entrypoint) -> Option<&Ty> {
        self.0.iter().find(|(e, _)| e == ep).map(|(_, ty)| ty)
    }

    pub fn iter(&self) -> impl Iterator<Item = &(Entrypoint, Ty)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Signature of a view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewType {
    pub name: String,
    pub input: Ty,
    pub output: Ty,
}

/// Types of a checked contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractScript {
    pub parameter: Ty,
    pub storage: Ty,
    pub entrypoints: Entrypoints,
    pub views: Vec<ViewType>,
    /// Output of `code`: `[pair (list operation) storage]` or a failure.
    pub code_result: FailingTypeStack,
}

/// Matches a [Ty] by its structure, ignoring annotations.
macro_rules! t {
    ($p:pat) => {
        Ty { t: $p, .. }
    };
}

macro_rules! nothing_to_none {
    () => {
        Option::None
    };
    ($e:expr) => {
        Option::Some($e)
    };
}

macro_rules! unary_prims {
    () => {
        Prim::ABS
            | Prim::ISNAT
            | Prim::INT
            | Prim::NAT
            | Prim::BYTES
            | Prim::NEG
            | Prim::NOT
            | Prim::EQ
            | Prim::NEQ
            | Prim::LT
            | Prim::GT
            | Prim::LE
            | Prim::GE
            | Prim::BLAKE2B
            | Prim::SHA256
            | Prim::SHA512
            | Prim::KECCAK
            | Prim::SHA3
            | Prim::HASH_KEY
            | Prim::IMPLICIT_ACCOUNT
            | Prim::VOTING_POWER
            | Prim::ADDRESS
            | Prim::SIZE
            | Prim::PAIRING_CHECK
    };
}

macro_rules! binary_prims {
    () => {
        Prim::ADD
            | Prim::SUB
            | Prim::SUB_MUTEZ
            | Prim::MUL
            | Prim::EDIV
            | Prim::LSL
            | Prim::LSR
            | Prim::OR
            | Prim::AND
            | Prim::XOR
    };
}

macro_rules! nullary_prims {
    () => {
        Prim::UNIT
            | Prim::NOW
            | Prim::AMOUNT
            | Prim::BALANCE
            | Prim::SOURCE
            | Prim::SENDER
            | Prim::SELF_ADDRESS
            | Prim::CHAIN_ID
            | Prim::LEVEL
            | Prim::TOTAL_VOTING_POWER
            | Prim::MIN_BLOCK_TIME
    };
}

/// Parse a type. Type and field annotations are kept, empty ones are
/// dropped.
pub fn parse_ty(ty: &Micheline) -> Result<Ty, TcError> {
    use Micheline as M;
    use Prim as P;
    let M::App(prim, args, anns) = ty else {
        return Err(unexpected(ty));
    };
    let t = match (prim, *args) {
        (P::int, []) => Type::Int,
        (P::nat, []) => Type::Nat,
        (P::string, []) => Type::String,
        (P::bytes, []) => Type::Bytes,
        (P::mutez, []) => Type::Mutez,
        (P::bool, []) => Type::Bool,
        (P::key_hash, []) => Type::KeyHash,
        (P::timestamp, []) => Type::Timestamp,
        (P::address, []) => Type::Address,
        (P::key, []) => Type::Key,
        (P::unit, []) => Type::Unit,
        (P::signature, []) => Type::Signature,
        (P::chain_id, []) => Type::ChainId,
        (P::never, []) => Type::Never,
        (P::operation, []) => Type::Operation,
        (P::bls12_381_g1, []) => Type::Bls12381G1,
        (P::bls12_381_g2, []) => Type::Bls12381G2,
        (P::bls12_381_fr, []) => Type::Bls12381Fr,
        (P::chest, []) => Type::Chest,
        (P::chest_key, []) => Type::ChestKey,
        (P::tx_rollup_l2_address, []) => Type::TxRollupL2Address,
        (P::sapling_state, [M::Int(n)]) => Type::SaplingState(memo_size(n, ty)?),
        (P::sapling_transaction | P::sapling_transaction_deprecated, [M::Int(n)]) => {
            Type::SaplingTransaction(memo_size(n, ty)?)
        }
        (P::option, [x]) => Type::new_option(parse_ty(x)?),
        (P::list, [x]) => Type::new_list(parse_ty(x)?),
        (P::set, [k]) => {
            let k = parse_ty(k)?;
            k.ensure_prop(TypeProperty::Comparable)?;
            Type::new_set(k)
        }
        (P::contract, [x]) => {
            let x = parse_ty(x)?;
            x.ensure_prop(TypeProperty::Passable)?;
            Type::new_contract(x)
        }
        (P::ticket, [x]) => {
            let x = parse_ty(x)?;
            x.ensure_prop(TypeProperty::Comparable)?;
            Type::new_ticket(x)
        }
        (P::pair, [l, r, rest @ ..]) => parse_comb(l, r, rest)?,
        (P::or, [l, r]) => Type::new_or(parse_ty(l)?, parse_ty(r)?),
        (P::map, [k, v]) => {
            let k = parse_ty(k)?;
            k.ensure_prop(TypeProperty::Comparable)?;
            Type::new_map(k, parse_ty(v)?)
        }
        (P::big_map, [k, v]) => {
            let k = parse_ty(k)?;
            k.ensure_prop(TypeProperty::Comparable)?;
            let v = parse_ty(v)?;
            v.ensure_prop(TypeProperty::BigMapValue)?;
            Type::new_big_map(k, v)
        }
        (P::lambda, [a, r]) => Type::new_lambda(parse_ty(a)?, parse_ty(r)?),
        _ => return Err(unexpected(ty)),
    };
    let non_empty = |s: Option<&str>| s.filter(|s| !s.is_empty()).map(str::to_owned);
    Ok(Ty {
        t,
        anns: TypeAnns {
            ty: non_empty(anns.get_single_type_ann()?),
            field: non_empty(anns.get_single_field_ann()?),
            var: None,
        },
    })
}

fn parse_comb(l: &Micheline, r: &Micheline, rest: &[Micheline]) -> Result<Type, TcError> {
    Ok(match rest.split_first() {
        None => Type::new_pair(parse_ty(l)?, parse_ty(r)?),
        Some((next, rest)) => Type::new_pair(parse_ty(l)?, parse_comb(r, next, rest)?),
    })
}

fn memo_size(n: &BigInt, ty: &Micheline) -> Result<u32, TcError> {
    n.to_u32().ok_or_else(|| unexpected(ty))
}

fn unexpected(m: &Micheline) -> TcError {
    TcError::UnexpectedMicheline(m.to_string())
}

/// Collect the entrypoints of a parameter type: every node carrying a field
/// annotation, or-branches being explored depth first. Without an explicit
/// `%default`, the whole parameter is the default entrypoint.
pub fn contract_entrypoints(parameter: &Micheline) -> Result<Entrypoints, TcError> {
    let ty = parse_ty(parameter)?;
    ty.ensure_prop(TypeProperty::Passable)?;
    entrypoints_of(&ty)
}

fn entrypoints_of(parameter: &Ty) -> Result<Entrypoints, TcError> {
    fn go(ty: &Ty, eps: &mut Vec<(Entrypoint, Ty)>) -> Result<(), TcError> {
        if let Some(field) = &ty.anns.field {
            // overly long field annotations are allowed, they just don't
            // define an entrypoint
            if let Ok(ep) = Entrypoint::try_from(field.as_str()) {
                if eps.iter().any(|(e, _)| e == &ep) {
                    return Err(TcError::DuplicateEntrypoint(ep));
                }
                eps.push((ep, ty.clone().with_field(None)));
            }
        }
        if let Type::Or(p) = &ty.t {
            go(&p.0, eps)?;
            go(&p.1, eps)?;
        }
        Ok(())
    }
    let mut eps = Vec::new();
    go(parameter, &mut eps)?;
    if !eps.iter().any(|(e, _)| e.is_default()) {
        eps.insert(0, (Entrypoint::default(), parameter.clone().with_field(None)));
    }
    Ok(Entrypoints(eps))
}

/// Check `data` against the type `ty`, both given as Micheline. Returns the
/// parsed type.
#[tracing::instrument(skip_all, err)]
pub fn typecheck_data(data: &Micheline, ty: &Micheline, ctx: &Ctx) -> Result<Ty, TcError> {
    validator::assert_michelson_type(ty)?;
    validator::assert_michelson_data(data)?;
    let ty = parse_ty(ty)?;
    typecheck_value(data, &ty, ctx)?;
    Ok(ty)
}

/// Type of the stack after running `instr` on `stack`.
#[tracing::instrument(skip_all, fields(stack = %stack), err)]
pub fn function_type(
    instr: &Micheline,
    stack: TypeStack,
    ctx: &Ctx,
) -> Result<FailingTypeStack, TcError> {
    validator::assert_michelson_instruction(instr)?;
    let mut opt_stack = FailingTypeStack::Ok(stack);
    typecheck_instruction(instr, ctx, &mut opt_stack)?;
    Ok(opt_stack)
}

/// Check a whole contract: sections, entrypoints, code and views.
#[tracing::instrument(skip_all, fields(protocol = %ctx.protocol), err)]
pub fn typecheck_script(script: &Micheline, ctx: &Ctx) -> Result<ContractScript, TcError> {
    use Micheline as M;
    use Prim as P;
    validator::assert_michelson_contract(script)?;
    let sections = match script {
        M::Seq([M::Seq(inner)]) => *inner,
        M::Seq(sections) => *sections,
        _ => return Err(unexpected(script)),
    };
    let mut parameter = None;
    let mut storage = None;
    let mut code = None;
    let mut views = Vec::new();
    fn set_once<'a>(
        slot: &mut Option<&'a Micheline<'a>>,
        x: &'a Micheline<'a>,
        prim: Prim,
    ) -> Result<(), TcError> {
        if slot.replace(x).is_some() {
            return Err(TcError::DuplicateTopLevelElt(prim));
        }
        Ok(())
    }
    for section in sections {
        match section {
            M::App(P::parameter, [ty], _) => set_once(&mut parameter, ty, P::parameter)?,
            M::App(P::storage, [ty], _) => set_once(&mut storage, ty, P::storage)?,
            M::App(P::code, [body], _) => set_once(&mut code, body, P::code)?,
            M::App(P::view, [M::String(name), input, output, M::Seq(body)], _) => {
                views.push((name, input, output, *body))
            }
            _ => return Err(unexpected(section)),
        }
    }
    let parameter = parse_ty(parameter.ok_or(TcError::MissingTopLevelElt(P::parameter))?)?;
    parameter.ensure_prop(TypeProperty::Passable)?;
    let storage = parse_ty(storage.ok_or(TcError::MissingTopLevelElt(P::storage))?)?;
    storage.ensure_prop(TypeProperty::Storable)?;
    let code = match code.ok_or(TcError::MissingTopLevelElt(P::code))? {
        M::Seq(body) => *body,
        other => return Err(unexpected(other)),
    };
    let entrypoints = entrypoints_of(&parameter)?;

    let code_ctx = Ctx::for_contract(ctx.protocol, parameter.clone());
    let mut code_result = FailingTypeStack::Ok(tc_stk![Type::new_pair(
        parameter.clone(),
        storage.clone()
    )]);
    typecheck_block(code, &code_ctx, &mut code_result)?;
    ensure_stacks_eq(
        &tc_stk![Type::new_pair(
            Type::new_list(Type::Operation),
            storage.clone()
        )],
        &code_result,
    )?;

    if !views.is_empty() && !ctx.protocol.is_at_least(Protocol::Hangzhou) {
        return Err(TcError::UnsupportedInProtocol {
            instr: P::view,
            protocol: ctx.protocol,
        });
    }
    let view_ctx = code_ctx.view();
    let views = views
        .into_iter()
        .map(|(name, input, output, body)| {
            let input = parse_ty(input)?;
            let output = parse_ty(output)?;
            let mut res =
                FailingTypeStack::Ok(tc_stk![Type::new_pair(input.clone(), storage.clone())]);
            typecheck_block(body, &view_ctx, &mut res)?;
            ensure_stacks_eq(&tc_stk![output.clone()], &res)?;
            Ok(ViewType {
                name: name.clone(),
                input,
                output,
            })
        })
        .collect::<Result<Vec<_>, TcError>>()?;

    tracing::debug!(
        entrypoints = entrypoints.len(),
        views = views.len(),
        "contract typechecked"
    );
    Ok(ContractScript {
        parameter,
        storage,
        entrypoints,
        views,
        code_result,
    })
}

/// Check a contract, returning the type of its code's output.
pub fn assert_contract_valid(script: &Micheline, ctx: &Ctx) -> Result<FailingTypeStack, TcError> {
    typecheck_script(script, ctx).map(|s| s.code_result)
}

/// Typecheck a sequence of instructions. Nothing may follow a failing
/// instruction in the same sequence, unless the failure comes out of a
/// nested block or has type `never`.
fn typecheck(
    ast: &[Micheline],
    ctx: &Ctx,
    opt_stack: &mut FailingTypeStack,
) -> Result<(), TcError> {
    for i in ast {
        if let FailingTypeStack::Failed { ty, level } = opt_stack {
            if *level == 0 && ty.t != Type::Never {
                return Err(TcError::FailNotInTail);
            }
            break;
        }
        typecheck_instruction(i, ctx, opt_stack)?;
        tracing::trace!(instr = %i, stack = %opt_stack, "instruction typechecked");
    }
    Ok(())
}

/// Typecheck a nested block: a branch, a body or a bare sequence.
fn typecheck_block(
    ast: &[Micheline],
    ctx: &Ctx,
    opt_stack: &mut FailingTypeStack,
) -> Result<(), TcError> {
    typecheck(ast, ctx, opt_stack)?;
    opt_stack.leave_block();
    Ok(())
}

fn check_protocol(prim: Prim, protocol: Protocol) -> Result<(), TcError> {
    match overloads::min_protocol(prim) {
        Some(min) if protocol.is_at_least(min) => Ok(()),
        _ => Err(TcError::UnsupportedInProtocol {
            instr: prim,
            protocol,
        }),
    }
}

fn no_match(instr: Prim, stack: &TypeStack, reason: Option<NoMatchingOverloadReason>) -> TcError {
    TcError::NoMatchingOverload {
        instr,
        stack: stack.clone(),
        reason,
    }
}

/// Typecheck a single instruction. The stack must not be failed.
pub(crate) fn typecheck_instruction(
    i: &Micheline,
    ctx: &Ctx,
    opt_stack: &mut FailingTypeStack,
) -> Result<(), TcError> {
    use Micheline as M;
    use NoMatchingOverloadReason as R;
    use Prim as P;
    use Type as T;

    if let M::App(prim, ..) = i {
        check_protocol(*prim, ctx.protocol)?;
    }

    let stack = opt_stack.access_mut(TcError::FailNotInTail)?;

    // Error handling when stack isn't matched for an instruction. Two forms:
    // no_overload!(instr, len <n>) -- when stack is too short, where <n> is expected length
    // no_overload!(instr, <expr>) -- otherwise, where <expr> is Into<NoMatchingOverloadReason>,
    // and is optional.
    macro_rules! no_overload {
        ($instr:expr, len $expected_len:expr) => {
            return Err(no_match(
                $instr,
                stack,
                Option::Some(R::StackTooShort {
                    expected: $expected_len,
                }),
            ))
        };
        ($instr:expr$(, $reason:expr)?) => {
            return Err(no_match($instr, stack, nothing_to_none!($($reason.into())?)))
        };
    }

    macro_rules! forbidden_in_view {
        ($instr:expr) => {
            if ctx.in_view {
                return Err(TcError::ForbiddenInView($instr));
            }
        };
    }

    // Replace `n` top stack elements with a single one.
    macro_rules! replace_top {
        ($n:expr, $e:expr) => {{
            let res = $e;
            stack.drop_top($n);
            stack.push(res);
        }};
    }

    match (i, stack.as_slice()) {
        (
            micheline_types!() | micheline_literals!() | micheline_fields!() | micheline_values!(),
            _,
        ) => return Err(unexpected(i)),

        (M::Seq(nested), _) => typecheck_block(nested, ctx, opt_stack)?,

        (M::App(P::DROP, [], _), [.., _]) => stack.drop_top(1),
        (M::App(P::DROP, [], _), []) => no_overload!(P::DROP, len 1),
        (M::App(P::DROP, [M::Int(n)], _), _) => {
            let n = validate_u10(n)?;
            ensure_stack_len(P::DROP, stack, n)?;
            stack.drop_top(n);
        }

        (M::App(P::DUP, [], anns), [.., x]) => {
            x.ensure_prop(TypeProperty::Duplicable)?;
            let res = x.clone().with_var(var_ann(anns)?.or_else(|| x.anns.var.clone()));
            stack.push(res);
        }
        (M::App(P::DUP, [], _), []) => no_overload!(P::DUP, len 1),
        (M::App(P::DUP, [M::Int(n)], anns), _) => {
            if !ctx.protocol.has_comb_instructions() {
                return Err(TcError::UnsupportedInProtocol {
                    instr: P::DUP,
                    protocol: ctx.protocol,
                });
            }
            let n = validate_u10(n)?;
            if n == 0 {
                return Err(TcError::Dup0);
            }
            ensure_stack_len(P::DUP, stack, n)?;
            let x = &stack[n - 1];
            x.ensure_prop(TypeProperty::Duplicable)?;
            let res = x.clone().with_var(var_ann(anns)?.or_else(|| x.anns.var.clone()));
            stack.push(res);
        }

        (M::App(P::SWAP, [], _), [.., _, _]) => stack.swap(0, 1),
        (M::App(P::SWAP, [], _), [] | [_]) => no_overload!(P::SWAP, len 2),

        (M::App(P::DIG, [M::Int(n)], _), _) => {
            let n = validate_u10(n)?;
            ensure_stack_len(P::DIG, stack, n + 1)?;
            let x = stack.remove(n);
            stack.push(x);
        }
        (M::App(P::DUG, [M::Int(n)], _), _) => {
            let n = validate_u10(n)?;
            ensure_stack_len(P::DUG, stack, n + 1)?;
            let x = stack.remove(0);
            stack.insert(n, x);
        }

        (M::App(P::PUSH, [ty, v], anns), _) => {
            let ty = parse_ty(ty)?;
            ty.ensure_prop(TypeProperty::Pushable)?;
            typecheck_value(v, &ty, ctx)?;
            stack.push(annotate(ty, anns)?);
        }

        (M::App(prim @ nullary_prims!(), [], anns), _) => {
            let ty = overloads::nullary(*prim).ok_or_else(|| no_match(*prim, stack, None))?;
            stack.push(annotate(ty, anns)?);
        }

        (M::App(P::SET_DELEGATE, [], anns), [.., x]) => {
            forbidden_in_view!(P::SET_DELEGATE);
            let res = overloads::unary(P::SET_DELEGATE, ctx.protocol, &x.t)
                .ok_or_else(|| no_match(P::SET_DELEGATE, stack, None))?;
            replace_top!(1, annotate(res, anns)?);
        }
        (M::App(prim @ unary_prims!(), [], anns), [.., x]) => {
            let res = overloads::unary(*prim, ctx.protocol, &x.t)
                .ok_or_else(|| no_match(*prim, stack, None))?;
            replace_top!(1, annotate(res, anns)?);
        }
        (M::App(prim @ (unary_prims!() | P::SET_DELEGATE), [], _), []) => {
            no_overload!(*prim, len 1)
        }

        (M::App(prim @ binary_prims!(), [], anns), [.., second, top]) => {
            let res = overloads::binary(*prim, ctx.protocol, &top.t, &second.t)
                .ok_or_else(|| no_match(*prim, stack, None))?;
            replace_top!(2, annotate(res, anns)?);
        }
        (M::App(prim @ binary_prims!(), [], _), [] | [_]) => no_overload!(*prim, len 2),

        (M::App(P::COMPARE, [], anns), [.., r, l]) => {
            unify_ty(l, r).map_err(|e| no_match(P::COMPARE, stack, Some(e.into())))?;
            if !l.has_prop(TypeProperty::Comparable) {
                no_overload!(P::COMPARE, R::TypeNotComparable(l.clone()));
            }
            replace_top!(2, annotate(T::Int, anns)?);
        }
        (M::App(P::COMPARE, [], _), [] | [_]) => no_overload!(P::COMPARE, len 2),

        (M::App(P::CONCAT, [], anns), [.., t!(T::List(x))]) => match x.t {
            T::String | T::Bytes => replace_top!(1, annotate(x.t.clone(), anns)?),
            _ => no_overload!(P::CONCAT),
        },
        (M::App(P::CONCAT, [], anns), [.., r, l]) => match (&l.t, &r.t) {
            (T::String, T::String) | (T::Bytes, T::Bytes) => {
                replace_top!(2, annotate(l.t.clone(), anns)?)
            }
            _ => no_overload!(P::CONCAT),
        },
        (M::App(P::CONCAT, [], _), [] | [_]) => no_overload!(P::CONCAT, len 2),

        (
            M::App(P::SLICE, [], anns),
            [.., s @ t!(T::String | T::Bytes), t!(T::Nat), t!(T::Nat)],
        ) => replace_top!(3, annotate(T::new_option(s.t.clone()), anns)?),
        (M::App(P::SLICE, [], _), [] | [_] | [_, _]) => no_overload!(P::SLICE, len 3),

        (M::App(P::PACK, [], anns), [.., x]) => {
            x.ensure_prop(TypeProperty::Packable)?;
            replace_top!(1, annotate(T::Bytes, anns)?);
        }
        (M::App(P::UNPACK, [ty], anns), [.., t!(T::Bytes)]) => {
            let ty = parse_ty(ty)?;
            ty.ensure_prop(TypeProperty::Packable)?;
            replace_top!(1, annotate(T::new_option(ty), anns)?);
        }

        (M::App(prim @ (P::CAR | P::CDR), [], anns), [.., p @ t!(T::Pair(comps))]) => {
            let (comp, default) = if *prim == P::CAR {
                (&comps.0, "car")
            } else {
                (&comps.1, "cdr")
            };
            check_field_ann(anns.get_single_field_ann()?, comp)?;
            let var = component_var(
                var_ann(anns)?.as_deref(),
                has_special(anns, ANN_VAR_FIELD),
                p.anns.var.as_deref(),
                comp.anns.field.as_deref(),
                default,
            );
            replace_top!(1, comp.clone().with_field(None).with_var(var));
        }
        (M::App(prim @ (P::CAR | P::CDR), [], _), [.., x]) => {
            no_overload!(*prim, R::ExpectedPair(x.clone()))
        }
        (M::App(prim @ (P::CAR | P::CDR), [], _), []) => no_overload!(*prim, len 1),

        (M::App(P::PAIR, [], anns), [.., r, l]) => {
            let [lf, rf] = constructor_fields(anns, [Some(l), Some(r)]);
            let pair = T::new_pair(
                l.clone().with_var(None).with_field(lf.or_else(|| l.anns.field.clone())),
                r.clone().with_var(None).with_field(rf.or_else(|| r.anns.field.clone())),
            );
            replace_top!(2, annotate(pair, anns)?);
        }
        (M::App(P::PAIR, [], _), [] | [_]) => no_overload!(P::PAIR, len 2),
        (M::App(P::PAIR, [M::Int(n)], anns), _) => {
            let n = validate_u10(n)?;
            if n < 2 {
                return Err(TcError::InvalidCombSize(P::PAIR, n));
            }
            ensure_stack_len(P::PAIR, stack, n)?;
            let comps: Vec<Ty> = stack.iter().take(n).map(|x| x.clone().with_var(None)).collect();
            let comb = match comps.split_first() {
                Some((first, rest)) => right_comb(first, rest),
                None => no_overload!(P::PAIR, len n),
            };
            replace_top!(n, annotate(comb, anns)?);
        }

        (M::App(P::UNPAIR, [], anns), [.., p @ t!(T::Pair(comps))]) => {
            let vars: Vec<&str> = anns.vars().collect();
            let fields: Vec<&str> = anns.fields().collect();
            check_field_ann(fields.first().copied(), &comps.0)?;
            check_field_ann(fields.get(1).copied(), &comps.1)?;
            let parent = p.anns.var.as_deref();
            let l = comps.0.clone().with_field(None).with_var(component_var(
                vars.first().copied(),
                false,
                parent,
                comps.0.anns.field.as_deref(),
                "car",
            ));
            let r = comps.1.clone().with_field(None).with_var(component_var(
                vars.get(1).copied(),
                false,
                parent,
                comps.1.anns.field.as_deref(),
                "cdr",
            ));
            stack.drop_top(1);
            stack.push(r);
            stack.push(l);
        }
        (M::App(P::UNPAIR, [], _), [.., x]) => no_overload!(P::UNPAIR, R::ExpectedPair(x.clone())),
        (M::App(P::UNPAIR, [], _), []) => no_overload!(P::UNPAIR, len 1),
        (M::App(P::UNPAIR, [M::Int(n)], _), [.., top]) => {
            let n = validate_u10(n)?;
            if n < 2 {
                return Err(TcError::InvalidCombSize(P::UNPAIR, n));
            }
            let mut comps = Vec::with_capacity(n);
            let mut cur = top;
            for _ in 1..n {
                match &cur.t {
                    T::Pair(p) => {
                        comps.push(p.0.clone());
                        cur = &p.1;
                    }
                    _ => no_overload!(P::UNPAIR, R::ExpectedPair(cur.clone())),
                }
            }
            comps.push(cur.clone());
            stack.drop_top(1);
            for c in comps.into_iter().rev() {
                stack.push(c.with_field(None));
            }
        }
        (M::App(P::UNPAIR, [_], _), []) => no_overload!(P::UNPAIR, len 1),

        (M::App(P::GET, [M::Int(n)], anns), [.., top]) => {
            let n = validate_u10(n)?;
            let res = comb_get(top, n)
                .ok_or_else(|| no_match(P::GET, stack, Some(R::ExpectedPair(top.clone()))))?;
            replace_top!(1, res.with_field(None).with_var(var_ann(anns)?));
        }
        (M::App(P::UPDATE, [M::Int(n)], anns), [.., comb, v]) => {
            let n = validate_u10(n)?;
            let res = comb_update(comb, n, v.clone().with_var(None))
                .ok_or_else(|| no_match(P::UPDATE, stack, Some(R::ExpectedPair(comb.clone()))))?;
            replace_top!(2, annotate(res.with_var(None), anns)?);
        }
        (M::App(P::GET, [_], _), []) => no_overload!(P::GET, len 1),
        (M::App(P::UPDATE, [_], _), [] | [_]) => no_overload!(P::UPDATE, len 2),

        (M::App(P::SOME, [], anns), [.., x]) => {
            replace_top!(1, annotate(T::new_option(x.clone().with_var(None)), anns)?)
        }
        (M::App(P::SOME, [], _), []) => no_overload!(P::SOME, len 1),
        (M::App(P::NONE, [ty], anns), _) => stack.push(annotate(T::new_option(parse_ty(ty)?), anns)?),

        (M::App(P::LEFT, [ty], anns), [.., x]) => {
            let ty = parse_ty(ty)?;
            let [lf, rf] = constructor_fields(anns, [Some(x), None]);
            let or = T::new_or(
                x.clone().with_var(None).with_field(lf),
                ty.clone().with_field(rf.or(ty.anns.field.clone())),
            );
            replace_top!(1, annotate(or, anns)?);
        }
        (M::App(P::RIGHT, [ty], anns), [.., x]) => {
            let ty = parse_ty(ty)?;
            let [lf, rf] = constructor_fields(anns, [None, Some(x)]);
            let or = T::new_or(
                ty.clone().with_field(lf.or(ty.anns.field.clone())),
                x.clone().with_var(None).with_field(rf),
            );
            replace_top!(1, annotate(or, anns)?);
        }
        (M::App(prim @ (P::LEFT | P::RIGHT), [_], _), []) => no_overload!(*prim, len 1),

        (M::App(P::NIL, [ty], anns), _) => stack.push(annotate(T::new_list(parse_ty(ty)?), anns)?),
        (M::App(P::CONS, [], anns), [.., l @ t!(T::List(elt)), x]) => {
            let elt = unify_ty(x, elt).map_err(|e| no_match(P::CONS, stack, Some(e.into())))?;
            let res = annotate(T::new_list(elt.with_var(None)), anns)?.with_type_ann(
                anns.get_single_type_ann()?
                    .map(str::to_owned)
                    .or_else(|| l.anns.ty.clone()),
            );
            replace_top!(2, res);
        }
        (M::App(P::CONS, [], _), [.., l, _]) => no_overload!(P::CONS, R::ExpectedList(l.clone())),
        (M::App(P::CONS, [], _), [] | [_]) => no_overload!(P::CONS, len 2),

        (M::App(P::EMPTY_SET, [k], anns), _) => {
            let k = parse_ty(k)?;
            k.ensure_prop(TypeProperty::Comparable)?;
            stack.push(annotate(T::new_set(k), anns)?);
        }
        (M::App(P::EMPTY_MAP, [k, v], anns), _) => {
            let k = parse_ty(k)?;
            k.ensure_prop(TypeProperty::Comparable)?;
            stack.push(annotate(T::new_map(k, parse_ty(v)?), anns)?);
        }
        (M::App(P::EMPTY_BIG_MAP, [k, v], anns), _) => {
            let k = parse_ty(k)?;
            k.ensure_prop(TypeProperty::Comparable)?;
            let v = parse_ty(v)?;
            v.ensure_prop(TypeProperty::BigMapValue)?;
            stack.push(annotate(T::new_big_map(k, v), anns)?);
        }

        (M::App(P::MEM, [], anns), [.., c, k]) => {
            let key = key_type(c).ok_or_else(|| no_match(P::MEM, stack, None))?;
            unify_ty(k, key).map_err(|e| no_match(P::MEM, stack, Some(e.into())))?;
            replace_top!(2, annotate(T::Bool, anns)?);
        }
        (M::App(P::GET, [], anns), [.., t!(T::Map(kv) | T::BigMap(kv)), k]) => {
            unify_ty(k, &kv.0).map_err(|e| no_match(P::GET, stack, Some(e.into())))?;
            replace_top!(2, annotate(T::new_option(kv.1.clone()), anns)?);
        }
        (M::App(P::UPDATE, [], anns), [.., s @ t!(T::Set(elt)), t!(T::Bool), k]) => {
            unify_ty(k, elt).map_err(|e| no_match(P::UPDATE, stack, Some(e.into())))?;
            replace_top!(3, annotate(s.clone().with_var(None), anns)?);
        }
        (
            M::App(P::UPDATE, [], anns),
            [.., m @ t!(T::Map(kv) | T::BigMap(kv)), t!(T::Option(v)), k],
        ) => {
            unify_ty(k, &kv.0).map_err(|e| no_match(P::UPDATE, stack, Some(e.into())))?;
            unify_ty(v, &kv.1).map_err(|e| no_match(P::UPDATE, stack, Some(e.into())))?;
            replace_top!(3, annotate(m.clone().with_var(None), anns)?);
        }
        (
            M::App(P::GET_AND_UPDATE, [], anns),
            [.., t!(T::Map(kv) | T::BigMap(kv)), t!(T::Option(v)), k],
        ) => {
            unify_ty(k, &kv.0).map_err(|e| no_match(P::GET_AND_UPDATE, stack, Some(e.into())))?;
            unify_ty(v, &kv.1).map_err(|e| no_match(P::GET_AND_UPDATE, stack, Some(e.into())))?;
            let res = annotate(T::new_option(kv.1.clone()), anns)?;
            stack.drop_top(2);
            stack.push(res);
        }
        (M::App(prim @ (P::MEM | P::GET), [], _), [] | [_]) => no_overload!(*prim, len 2),
        (M::App(prim @ (P::UPDATE | P::GET_AND_UPDATE), [], _), [] | [_] | [_, _]) => {
            no_overload!(*prim, len 3)
        }

        (M::App(P::IF, [M::Seq(bt), M::Seq(bf)], _), [.., t!(T::Bool)]) => {
            stack.drop_top(1);
            let base = stack.clone();
            *opt_stack = typecheck_branches(ctx, (bt, base.clone()), (bf, base))?;
        }
        (M::App(P::IF_NONE, [M::Seq(bt), M::Seq(bf)], _), [.., t!(T::Option(x))]) => {
            let x = x.as_ref().clone();
            stack.drop_top(1);
            let base = stack.clone();
            let mut some = base.clone();
            some.push(x);
            *opt_stack = typecheck_branches(ctx, (bt, base), (bf, some))?;
        }
        (M::App(P::IF_LEFT, [M::Seq(bt), M::Seq(bf)], _), [.., t!(T::Or(p))]) => {
            let branch = |x: &Ty| x.clone().with_var(x.anns.field.clone()).with_field(None);
            let (l, r) = (branch(&p.0), branch(&p.1));
            stack.drop_top(1);
            let mut left = stack.clone();
            left.push(l);
            let mut right = stack.clone();
            right.push(r);
            *opt_stack = typecheck_branches(ctx, (bt, left), (bf, right))?;
        }
        (M::App(P::IF_CONS, [M::Seq(bt), M::Seq(bf)], _), [.., l @ t!(T::List(x))]) => {
            let x = x.as_ref().clone();
            let l = l.clone();
            stack.drop_top(1);
            let nil = stack.clone();
            let mut cons = stack.clone();
            cons.push(l);
            cons.push(x);
            *opt_stack = typecheck_branches(ctx, (bt, cons), (bf, nil))?;
        }
        (M::App(P::IF, [_, _], _), [.., x]) => no_overload!(P::IF, TypesNotEqual(T::Bool.into(), x.clone())),
        (M::App(P::IF_NONE, [_, _], _), [.., x]) => no_overload!(P::IF_NONE, R::ExpectedOption(x.clone())),
        (M::App(P::IF_LEFT, [_, _], _), [.., x]) => no_overload!(P::IF_LEFT, R::ExpectedOr(x.clone())),
        (M::App(P::IF_CONS, [_, _], _), [.., x]) => no_overload!(P::IF_CONS, R::ExpectedList(x.clone())),
        (M::App(prim @ (P::IF | P::IF_NONE | P::IF_LEFT | P::IF_CONS), [_, _], _), []) => {
            no_overload!(*prim, len 1)
        }

        (M::App(P::LOOP, [M::Seq(body)], _), [.., t!(T::Bool)]) => {
            stack.drop_top(1);
            let mut expected = stack.clone();
            expected.push(T::Bool.into());
            let mut res = FailingTypeStack::Ok(stack.clone());
            typecheck_block(body, ctx, &mut res)?;
            ensure_stacks_eq(&expected, &res)?;
        }
        (M::App(P::LOOP_LEFT, [M::Seq(body)], anns), [.., or @ t!(T::Or(p))]) => {
            let (a, b) = (p.0.clone(), p.1.clone());
            let or = or.clone().with_var(None);
            stack.drop_top(1);
            let mut expected = stack.clone();
            expected.push(or);
            let mut inner = stack.clone();
            inner.push(a.with_field(None));
            let mut res = FailingTypeStack::Ok(inner);
            typecheck_block(body, ctx, &mut res)?;
            ensure_stacks_eq(&expected, &res)?;
            stack.push(annotate(b.with_field(None), anns)?);
        }
        (M::App(P::LOOP, [_], _), [.., x]) => no_overload!(P::LOOP, TypesNotEqual(T::Bool.into(), x.clone())),
        (M::App(P::LOOP_LEFT, [_], _), [.., x]) => no_overload!(P::LOOP_LEFT, R::ExpectedOr(x.clone())),
        (M::App(prim @ (P::LOOP | P::LOOP_LEFT), [_], _), []) => no_overload!(*prim, len 1),

        (M::App(P::MAP, [M::Seq(body)], anns), [.., t!(T::List(x))]) => {
            let x = x.as_ref().clone();
            let b = typecheck_map_body(body, x, ctx, stack)?;
            stack.push(annotate(T::new_list(b), anns)?);
        }
        (M::App(P::MAP, [M::Seq(body)], anns), [.., t!(T::Option(x))]) => {
            let x = x.as_ref().clone();
            let b = typecheck_map_body(body, x, ctx, stack)?;
            stack.push(annotate(T::new_option(b), anns)?);
        }
        (M::App(P::MAP, [M::Seq(body)], anns), [.., t!(T::Map(kv))]) => {
            let k = kv.0.clone();
            let elt = T::new_pair(kv.0.clone(), kv.1.clone());
            let b = typecheck_map_body(body, elt.into(), ctx, stack)?;
            stack.push(annotate(T::new_map(k, b), anns)?);
        }
        (M::App(P::ITER, [M::Seq(body)], _), [.., t!(T::List(x) | T::Set(x))]) => {
            let x = x.as_ref().clone();
            typecheck_iter_body(body, x, ctx, stack)?;
        }
        (M::App(P::ITER, [M::Seq(body)], _), [.., t!(T::Map(kv))]) => {
            let elt = T::new_pair(kv.0.clone(), kv.1.clone());
            typecheck_iter_body(body, elt.into(), ctx, stack)?;
        }
        (M::App(prim @ (P::MAP | P::ITER), [_], _), [.., x]) => {
            no_overload!(*prim, R::ExpectedList(x.clone()))
        }
        (M::App(prim @ (P::MAP | P::ITER), [_], _), []) => no_overload!(*prim, len 1),

        (M::App(P::DIP, [M::Seq(body)], _), _) => typecheck_dip(1, body, ctx, opt_stack)?,
        (M::App(P::DIP, [M::Int(n), M::Seq(body)], _), _) => {
            let n = validate_u10(n)?;
            typecheck_dip(n, body, ctx, opt_stack)?
        }

        (M::App(P::FAILWITH, [], _), [.., x]) => {
            *opt_stack = FailingTypeStack::Failed {
                ty: x.clone().with_var(None),
                level: 0,
            }
        }
        (M::App(P::FAILWITH, [], _), []) => no_overload!(P::FAILWITH, len 1),
        (M::App(P::NEVER, [], _), [.., t!(T::Never)]) => {
            *opt_stack = FailingTypeStack::Failed {
                ty: T::Never.into(),
                level: 0,
            }
        }
        (M::App(P::NEVER, [], _), [.., x]) => {
            no_overload!(P::NEVER, TypesNotEqual(T::Never.into(), x.clone()))
        }
        (M::App(P::NEVER, [], _), []) => no_overload!(P::NEVER, len 1),

        (M::App(P::LAMBDA, [arg, ret, M::Seq(code)], anns), _) => {
            let (arg, ret) = (parse_ty(arg)?, parse_ty(ret)?);
            typecheck_lambda(code, &arg, &ret, false, ctx)?;
            stack.push(annotate(T::new_lambda(arg, ret), anns)?);
        }
        (M::App(P::LAMBDA_REC, [arg, ret, M::Seq(code)], anns), _) => {
            let (arg, ret) = (parse_ty(arg)?, parse_ty(ret)?);
            typecheck_lambda(code, &arg, &ret, true, ctx)?;
            stack.push(annotate(T::new_lambda(arg, ret), anns)?);
        }
        (M::App(P::EXEC, [], anns), [.., t!(T::Lambda(f)), x]) => {
            unify_ty(x, &f.0).map_err(|e| no_match(P::EXEC, stack, Some(e.into())))?;
            replace_top!(2, annotate(f.1.clone(), anns)?);
        }
        (M::App(P::APPLY, [], anns), [.., t!(T::Lambda(f)), x]) => {
            let T::Pair(arg) = &f.0.t else {
                no_overload!(P::APPLY, R::ExpectedPair(f.0.clone()))
            };
            unify_ty(x, &arg.0).map_err(|e| no_match(P::APPLY, stack, Some(e.into())))?;
            x.ensure_prop(TypeProperty::Packable)?;
            replace_top!(2, annotate(T::new_lambda(arg.1.clone(), f.1.clone()), anns)?);
        }
        (M::App(prim @ (P::EXEC | P::APPLY), [], _), [] | [_]) => no_overload!(*prim, len 2),

        (M::App(P::CAST, [ty], _), [.., x]) => {
            let ty = parse_ty(ty)?;
            if ty.erase_anns() != x.erase_anns() {
                no_overload!(P::CAST, TypesNotEqual(ty, x.clone()));
            }
            let var = x.anns.var.clone();
            replace_top!(1, ty.with_var(var));
        }
        (M::App(P::RENAME, [], anns), [.., x]) => {
            replace_top!(1, x.clone().with_var(var_ann(anns)?));
        }
        (M::App(prim @ (P::CAST | P::RENAME | P::PACK | P::UNPACK), ..), []) => {
            no_overload!(*prim, len 1)
        }

        (M::App(P::SELF, [], anns), _) => {
            let param = match &ctx.self_type {
                Some(param) if !ctx.in_lambda => param,
                _ => return Err(TcError::SelfForbidden),
            };
            let ep = parse_entrypoint(anns.get_single_field_ann()?)?;
            let eps = entrypoints_of(param)?;
            let ty = eps
                .get(&ep)
                .ok_or_else(|| TcError::NoSuchEntrypoint(ep.clone()))?;
            stack.push(annotate(T::new_contract(ty.clone()), anns)?);
        }
        (M::App(P::CONTRACT, [ty], anns), [.., t!(T::Address)]) => {
            let ty = parse_ty(ty)?;
            ty.ensure_prop(TypeProperty::Passable)?;
            parse_entrypoint(anns.get_single_field_ann()?)?;
            replace_top!(1, annotate(T::new_option(T::new_contract(ty)), anns)?);
        }
        (M::App(P::TRANSFER_TOKENS, [], anns), [.., t!(T::Contract(c)), t!(T::Mutez), p]) => {
            forbidden_in_view!(P::TRANSFER_TOKENS);
            unify_ty(p, c).map_err(|e| no_match(P::TRANSFER_TOKENS, stack, Some(e.into())))?;
            replace_top!(3, annotate(T::Operation, anns)?);
        }
        (M::App(P::TRANSFER_TOKENS, [], _), [] | [_] | [_, _]) => {
            no_overload!(P::TRANSFER_TOKENS, len 3)
        }
        (
            M::App(P::CREATE_CONTRACT, [script @ M::Seq(_)], anns),
            [.., storage, t!(T::Mutez), t!(T::Option(delegate))],
        ) if delegate.t == T::KeyHash => {
            forbidden_in_view!(P::CREATE_CONTRACT);
            let nested = typecheck_script(script, &Ctx::new(ctx.protocol))?;
            unify_ty(storage, &nested.storage)
                .map_err(|e| no_match(P::CREATE_CONTRACT, stack, Some(e.into())))?;
            let vars: Vec<&str> = anns.vars().collect();
            let op = Ty::from(T::Operation).with_var(vars.first().map(|v| v.to_string()));
            let addr = Ty::from(T::Address).with_var(vars.get(1).map(|v| v.to_string()));
            stack.drop_top(3);
            stack.push(addr);
            stack.push(op);
        }
        (M::App(P::CREATE_CONTRACT, [_], _), [] | [_] | [_, _]) => {
            no_overload!(P::CREATE_CONTRACT, len 3)
        }

        (
            M::App(P::CHECK_SIGNATURE, [], anns),
            [.., t!(T::Bytes), t!(T::Signature), t!(T::Key)],
        ) => replace_top!(3, annotate(T::Bool, anns)?),
        (M::App(P::CHECK_SIGNATURE, [], _), [] | [_] | [_, _]) => {
            no_overload!(P::CHECK_SIGNATURE, len 3)
        }

        (M::App(P::SAPLING_EMPTY_STATE, [M::Int(n)], anns), _) => {
            let n = n.to_u32().ok_or_else(|| unexpected(i))?;
            stack.push(annotate(T::SaplingState(n), anns)?);
        }
        (
            M::App(P::SAPLING_VERIFY_UPDATE, [], anns),
            [.., st @ t!(T::SaplingState(a)), t!(T::SaplingTransaction(b))],
        ) if a == b => {
            let st = st.clone().with_var(None);
            let res = if ctx.protocol.is_at_least(Protocol::Jakarta) {
                T::new_option(T::new_pair(T::Bytes, T::new_pair(T::Int, st)))
            } else {
                T::new_option(T::new_pair(T::Int, st))
            };
            replace_top!(2, annotate(res, anns)?);
        }

        (M::App(prim @ (P::TICKET | P::TICKET_DEPRECATED), [], anns), [.., t!(T::Nat), x]) => {
            if !x.has_prop(TypeProperty::Comparable) {
                no_overload!(*prim, R::TypeNotComparable(x.clone()));
            }
            let ticket = T::new_ticket(x.clone().with_var(None));
            let res = if *prim == P::TICKET && ctx.protocol.is_at_least(Protocol::Lima) {
                T::new_option(ticket)
            } else {
                ticket
            };
            replace_top!(2, annotate(res, anns)?);
        }
        (M::App(P::READ_TICKET, [], anns), [.., t!(T::Ticket(x))]) => {
            let res = T::new_pair(T::Address, T::new_pair(x.as_ref().clone(), T::Nat));
            stack.push(annotate(res, anns)?);
        }
        (
            M::App(P::SPLIT_TICKET, [], anns),
            [.., t!(T::Pair(amounts)), t @ t!(T::Ticket(_))],
        ) if amounts.0.t == T::Nat && amounts.1.t == T::Nat => {
            let t = t.clone().with_var(None);
            replace_top!(2, annotate(T::new_option(T::new_pair(t.clone(), t)), anns)?);
        }
        (M::App(P::JOIN_TICKETS, [], anns), [.., t!(T::Pair(p))])
            if matches!((&p.0.t, &p.1.t), (T::Ticket(_), T::Ticket(_))) =>
        {
            let t = unify_ty(&p.0, &p.1)
                .map_err(|e| no_match(P::JOIN_TICKETS, stack, Some(e.into())))?;
            replace_top!(1, annotate(T::new_option(t), anns)?);
        }
        (
            M::App(P::OPEN_CHEST, [], anns),
            [.., t!(T::Nat), t!(T::Chest), t!(T::ChestKey)],
        ) => {
            let res = if ctx.protocol.is_at_least(Protocol::Oxford) {
                T::new_option(T::Bytes)
            } else {
                T::new_or(T::Bytes, T::Bool)
            };
            replace_top!(3, annotate(res, anns)?);
        }
        (M::App(P::VIEW, [M::String(_), ty], anns), [.., t!(T::Address), _]) => {
            let ty = parse_ty(ty)?;
            replace_top!(2, annotate(T::new_option(ty), anns)?);
        }
        (M::App(P::EMIT, args, anns), [.., x]) if args.len() <= 1 => {
            forbidden_in_view!(P::EMIT);
            if let [ty] = args {
                let ty = parse_ty(ty)?;
                unify_ty(x, &ty).map_err(|e| no_match(P::EMIT, stack, Some(e.into())))?;
            }
            x.ensure_prop(TypeProperty::Packable)?;
            parse_entrypoint(anns.get_single_field_ann()?)?;
            replace_top!(1, Ty::from(T::Operation).with_var(var_ann(anns)?));
        }

        (M::App(prim, ..), _) => no_overload!(*prim),
    }
    Ok(())
}

/// Check `ty` is a comparable key type for a set, map or big_map.
fn key_type(container: &Ty) -> Option<&Ty> {
    match &container.t {
        Type::Set(k) => Some(k),
        Type::Map(kv) | Type::BigMap(kv) => Some(&kv.0),
        _ => None,
    }
}

fn right_comb(first: &Ty, rest: &[Ty]) -> Type {
    match rest.split_first() {
        None => first.t.clone(),
        Some((second, rest)) => Type::new_pair(first.clone(), comb_item(second, rest)),
    }
}

fn comb_item(first: &Ty, rest: &[Ty]) -> Ty {
    if rest.is_empty() {
        first.clone()
    } else {
        right_comb(first, rest).into()
    }
}

/// Type of the `n`-th node of a right comb, as accessed by `GET n`.
fn comb_get(ty: &Ty, n: usize) -> Option<Ty> {
    match (n, &ty.t) {
        (0, _) => Some(ty.clone()),
        (1, Type::Pair(p)) => Some(p.0.clone()),
        (_, Type::Pair(p)) => comb_get(&p.1, n - 2),
        _ => None,
    }
}

/// Type of a right comb after replacing its `n`-th node with `v`.
fn comb_update(ty: &Ty, n: usize, v: Ty) -> Option<Ty> {
    match (n, &ty.t) {
        (0, _) => Some(v),
        (1, Type::Pair(p)) => Some(Ty {
            t: Type::new_pair(v, p.1.clone()),
            anns: ty.anns.clone(),
        }),
        (_, Type::Pair(p)) => Some(Ty {
            t: Type::new_pair(p.0.clone(), comb_update(&p.1, n - 2, v)?),
            anns: ty.anns.clone(),
        }),
        _ => None,
    }
}

fn typecheck_branches(
    ctx: &Ctx,
    (bt, st): (&[Micheline], TypeStack),
    (bf, sf): (&[Micheline], TypeStack),
) -> Result<FailingTypeStack, TcError> {
    let mut t = FailingTypeStack::Ok(st);
    typecheck_block(bt, ctx, &mut t)?;
    let mut f = FailingTypeStack::Ok(sf);
    typecheck_block(bf, ctx, &mut f)?;
    unify_stacks(&mut t, f)?;
    Ok(t)
}

fn typecheck_dip(
    n: usize,
    body: &[Micheline],
    ctx: &Ctx,
    opt_stack: &mut FailingTypeStack,
) -> Result<(), TcError> {
    let stack = opt_stack.access_mut(TcError::FailNotInTail)?;
    ensure_stack_len(Prim::DIP, stack, n)?;
    let mut protected = stack.split_off(n);
    typecheck_block(body, ctx, opt_stack)?;
    opt_stack
        .access_mut(TcError::FailNotInTail)?
        .append(&mut protected);
    Ok(())
}

/// Run a `MAP` body over `elt`, with the mapped container on top of `stack`.
/// Leaves the stack without the container and returns the new element type.
fn typecheck_map_body(
    body: &[Micheline],
    elt: Ty,
    ctx: &Ctx,
    stack: &mut TypeStack,
) -> Result<Ty, TcError> {
    stack.drop_top(1);
    let mut inner = stack.clone();
    inner.push(elt.with_var(None));
    let mut res = FailingTypeStack::Ok(inner);
    typecheck_block(body, ctx, &mut res)?;
    let FailingTypeStack::Ok(mut out) = res else {
        return Err(TcError::FailNotInTail);
    };
    if out.len() != stack.len() + 1 {
        return Err(TcError::StacksNotEqual(
            stack.clone(),
            out.clone(),
            StacksNotEqualReason::LengthsDiffer(stack.len() + 1, out.len()),
        ));
    }
    let b = out.remove(0);
    *stack = unify_type_stacks(stack, &out)?;
    Ok(b.with_var(None).with_field(None))
}

fn typecheck_iter_body(
    body: &[Micheline],
    elt: Ty,
    ctx: &Ctx,
    stack: &mut TypeStack,
) -> Result<(), TcError> {
    stack.drop_top(1);
    let mut inner = stack.clone();
    inner.push(elt.with_var(None));
    let mut res = FailingTypeStack::Ok(inner);
    typecheck_block(body, ctx, &mut res)?;
    if let FailingTypeStack::Ok(out) = res {
        *stack = unify_type_stacks(stack, &out)?;
    }
    Ok(())
}

fn typecheck_lambda(
    code: &[Micheline],
    arg: &Ty,
    ret: &Ty,
    recursive: bool,
    ctx: &Ctx,
) -> Result<(), TcError> {
    let stack = if recursive {
        tc_stk![Type::new_lambda(arg.clone(), ret.clone()), arg.clone()]
    } else {
        tc_stk![arg.clone()]
    };
    let mut res = FailingTypeStack::Ok(stack);
    typecheck_block(code, &ctx.lambda(), &mut res)?;
    ensure_stacks_eq(&tc_stk![ret.clone()], &res)
}

/// Typecheck a value against a type.
pub(crate) fn typecheck_value(v: &Micheline, ty: &Ty, ctx: &Ctx) -> Result<(), TcError> {
    use Micheline as V;
    use Prim as P;
    use Type as T;
    let invalid = || TcError::InvalidValueForType(v.to_string(), ty.clone());
    let byte_repr = |e: ByteReprError| TcError::ByteReprError(ty.clone(), e);
    match (&ty.t, v) {
        (T::Int, V::Int(_)) => {}
        (T::Nat, V::Int(n)) if n.sign() != Sign::Minus => {}
        (T::Mutez, V::Int(n)) if n.sign() != Sign::Minus && n <= &BigInt::from(i64::MAX) => {}
        (T::String, V::String(_)) | (T::Bytes, V::Bytes(_)) => {}
        (T::Bool, V::App(P::True | P::False, [], _)) => {}
        (T::Unit, V::App(P::Unit, [], _)) => {}
        (T::Timestamp, V::Int(_)) => {}
        (T::Timestamp, V::String(s)) => {
            parse_timestamp(s).ok_or_else(invalid)?;
        }
        (T::Address | T::Contract(_), V::String(s)) => {
            Address::from_base58_check(s).map_err(byte_repr)?;
        }
        (T::Address | T::Contract(_), V::Bytes(b)) => {
            Address::from_bytes(b).map_err(byte_repr)?;
        }
        (T::Key, V::String(s)) => {
            Key::from_base58_check(s).map_err(byte_repr)?;
        }
        (T::Key, V::Bytes(b)) => {
            Key::from_bytes(b).map_err(byte_repr)?;
        }
        (T::KeyHash, V::String(s)) => {
            KeyHash::from_base58_check(s).map_err(byte_repr)?;
        }
        (T::KeyHash, V::Bytes(b)) => {
            KeyHash::from_bytes(b).map_err(byte_repr)?;
        }
        (T::Signature, V::String(s)) => {
            Signature::from_base58_check(s).map_err(byte_repr)?;
        }
        (T::Signature, V::Bytes(b)) => {
            Signature::from_bytes(b).map_err(byte_repr)?;
        }
        (T::ChainId, V::String(s)) => {
            ChainId::from_base58_check(s).map_err(byte_repr)?;
        }
        (T::ChainId, V::Bytes(b)) => {
            ChainId::from_bytes(b).map_err(byte_repr)?;
        }
        (T::TxRollupL2Address, V::String(s)) => {
            match KeyHash::from_base58_check(s).map_err(byte_repr)? {
                KeyHash::Tz4(_) => {}
                _ => return Err(invalid()),
            }
        }
        (T::TxRollupL2Address, V::Bytes(b)) if b.len() == 20 => {}
        (T::Option(_), V::App(P::None, [], _)) => {}
        (T::Option(x), V::App(P::Some, [v], _)) => typecheck_value(v, x, ctx)?,
        (T::Or(p), V::App(P::Left, [v], _)) => typecheck_value(v, &p.0, ctx)?,
        (T::Or(p), V::App(P::Right, [v], _)) => typecheck_value(v, &p.1, ctx)?,
        (T::Pair(p), V::App(P::Pair, args, _) | V::Seq(args)) if args.len() >= 2 => {
            typecheck_comb(args, p, ty, ctx)?
        }
        (T::List(x), V::Seq(vs)) => {
            for v in *vs {
                typecheck_value(v, x, ctx)?;
            }
        }
        (T::Set(x), V::Seq(vs)) => {
            let keys = vs
                .iter()
                .map(|v| {
                    typecheck_value(v, x, ctx)?;
                    comparable_key(v, x)
                })
                .collect::<Result<Vec<_>, TcError>>()?;
            validate_ordered(ty, &keys)?;
        }
        (T::Map(kv) | T::BigMap(kv), V::Seq(vs)) => {
            let keys = vs
                .iter()
                .map(|elt| match elt {
                    V::App(P::Elt, [k, v], _) => {
                        typecheck_value(k, &kv.0, ctx)?;
                        typecheck_value(v, &kv.1, ctx)?;
                        comparable_key(k, &kv.0)
                    }
                    _ => Err(TcError::InvalidEltForMap(elt.to_string(), ty.clone())),
                })
                .collect::<Result<Vec<_>, TcError>>()?;
            validate_ordered(ty, &keys)?;
        }
        (T::BigMap(_), V::Int(_)) => {}
        (T::Lambda(f), V::Seq(code)) => typecheck_lambda(code, &f.0, &f.1, false, ctx)?,
        (T::Lambda(f), V::App(P::Lambda_rec, [V::Seq(code)], _)) => {
            typecheck_lambda(code, &f.0, &f.1, true, ctx)?
        }
        (T::Ticket(x), V::App(P::Ticket, [ticketer, t, contents, amount], _)) => {
            typecheck_value(ticketer, &T::Address.into(), ctx)?;
            if parse_ty(t)?.erase_anns() != x.erase_anns() {
                return Err(invalid());
            }
            typecheck_value(contents, x, ctx)?;
            typecheck_value(amount, &T::Nat.into(), ctx)?;
        }
        (T::Bls12381Fr, V::Int(_)) => {}
        (T::Bls12381Fr, V::Bytes(b)) if b.len() <= 32 => {}
        (T::Bls12381G1, V::Bytes(b)) if b.len() == 96 => {}
        (T::Bls12381G2, V::Bytes(b)) if b.len() == 192 => {}
        (T::Chest | T::ChestKey | T::SaplingTransaction(_), V::Bytes(_)) => {}
        (T::SaplingState(_), V::Seq([]) | V::Int(_)) => {}
        _ => return Err(invalid()),
    }
    Ok(())
}

/// Typecheck the components of a pair value, given either as `Pair a b ...`
/// or as a sequence of at least two elements, against a right comb type.
fn typecheck_comb(args: &[Micheline], p: &(Ty, Ty), ty: &Ty, ctx: &Ctx) -> Result<(), TcError> {
    match args {
        [l, r] => {
            typecheck_value(l, &p.0, ctx)?;
            typecheck_value(r, &p.1, ctx)
        }
        [l, rest @ ..] => {
            typecheck_value(l, &p.0, ctx)?;
            match &p.1.t {
                Type::Pair(inner) => typecheck_comb(rest, inner, &p.1, ctx),
                _ => Err(TcError::InvalidValueForType(
                    Micheline::Seq(args).to_string(),
                    ty.clone(),
                )),
            }
        }
        _ => Err(TcError::InvalidValueForType(
            Micheline::Seq(args).to_string(),
            ty.clone(),
        )),
    }
}

/// Ordering key of a comparable value. Values of the same comparable type
/// compare the same way their keys do.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum CmpKey {
    Unit,
    Int(BigInt),
    Bytes(Vec<u8>),
    Pair(Box<CmpKey>, Box<CmpKey>),
    Left(Box<CmpKey>),
    Right(Box<CmpKey>),
    None,
    Some(Box<CmpKey>),
}

/// Build the ordering key of a value already checked against `ty`.
fn comparable_key(v: &Micheline, ty: &Ty) -> Result<CmpKey, TcError> {
    use CmpKey as K;
    use Micheline as V;
    use Prim as P;
    use Type as T;
    let invalid = || TcError::InvalidValueForType(v.to_string(), ty.clone());
    let byte_repr = |e: ByteReprError| TcError::ByteReprError(ty.clone(), e);
    fn binary<R: ByteReprTrait>(v: &Micheline) -> Result<Option<Vec<u8>>, ByteReprError> {
        Ok(match v {
            Micheline::String(s) => Some(R::from_base58_check(s)?.to_bytes_vec()),
            Micheline::Bytes(b) => Some(R::from_bytes(b)?.to_bytes_vec()),
            _ => None,
        })
    }
    let bin = |res: Result<Option<Vec<u8>>, ByteReprError>| -> Result<CmpKey, TcError> {
        res.map_err(byte_repr)?.map(K::Bytes).ok_or_else(invalid)
    };
    Ok(match (&ty.t, v) {
        (T::Unit, _) => K::Unit,
        (T::Int | T::Nat | T::Mutez | T::Timestamp, V::Int(n)) => K::Int(n.clone()),
        (T::Timestamp, V::String(s)) => K::Int(parse_timestamp(s).ok_or_else(invalid)?),
        (T::Bool, V::App(P::False, ..)) => K::Int(0.into()),
        (T::Bool, V::App(P::True, ..)) => K::Int(1.into()),
        (T::String, V::String(s)) => K::Bytes(s.as_bytes().to_vec()),
        (T::Bytes, V::Bytes(b)) => K::Bytes(b.clone()),
        (T::Address, _) => bin(binary::<Address>(v))?,
        (T::Key, _) => bin(binary::<Key>(v))?,
        (T::KeyHash, _) => bin(binary::<KeyHash>(v))?,
        (T::Signature, _) => bin(binary::<Signature>(v))?,
        (T::ChainId, _) => bin(binary::<ChainId>(v))?,
        (T::TxRollupL2Address, V::String(s)) => {
            K::Bytes(KeyHash::from_base58_check(s).map_err(byte_repr)?.to_bytes_vec())
        }
        (T::TxRollupL2Address, V::Bytes(b)) => K::Bytes(b.clone()),
        (T::Option(_), V::App(P::None, ..)) => K::None,
        (T::Option(x), V::App(P::Some, [v], _)) => K::Some(Box::new(comparable_key(v, x)?)),
        (T::Or(p), V::App(P::Left, [v], _)) => K::Left(Box::new(comparable_key(v, &p.0)?)),
        (T::Or(p), V::App(P::Right, [v], _)) => K::Right(Box::new(comparable_key(v, &p.1)?)),
        (T::Pair(p), V::App(P::Pair, args, _) | V::Seq(args)) => comb_key(args, p, ty)?,
        _ => return Err(invalid()),
    })
}

fn comb_key(args: &[Micheline], p: &(Ty, Ty), ty: &Ty) -> Result<CmpKey, TcError> {
    let (first, rest) = match args {
        [first, rest @ ..] if !rest.is_empty() => (first, rest),
        _ => {
            return Err(TcError::InvalidValueForType(
                Micheline::Seq(args).to_string(),
                ty.clone(),
            ))
        }
    };
    let l = comparable_key(first, &p.0)?;
    let r = match (rest, &p.1.t) {
        ([r], _) => comparable_key(r, &p.1)?,
        (rest, Type::Pair(inner)) => comb_key(rest, inner, &p.1)?,
        _ => {
            return Err(TcError::InvalidValueForType(
                Micheline::Seq(args).to_string(),
                ty.clone(),
            ))
        }
    };
    Ok(CmpKey::Pair(Box::new(l), Box::new(r)))
}

/// Ensures given keys are in strictly ascending order.
fn validate_ordered(container_t: &Ty, keys: &[CmpKey]) -> Result<(), TcError> {
    for w in keys.windows(2) {
        match w[0].cmp(&w[1]) {
            std::cmp::Ordering::Less => (),
            std::cmp::Ordering::Equal => {
                return Err(TcError::DuplicateElements(container_t.clone()))
            }
            std::cmp::Ordering::Greater => {
                return Err(TcError::ElementsNotSorted(container_t.clone()))
            }
        }
    }
    Ok(())
}

fn validate_u10(n: &BigInt) -> Result<usize, TcError> {
    match n.to_u16() {
        Some(res) if res < 1024 => Ok(res as usize),
        _ => Err(TcError::ExpectedU10(n.clone())),
    }
}

/// Ensures type stack is at least of the required length, otherwise returns
/// `Err(StackTooShort)`.
fn ensure_stack_len(instr: Prim, stack: &TypeStack, l: usize) -> Result<(), TcError> {
    if stack.len() >= l {
        Ok(())
    } else {
        Err(no_match(
            instr,
            stack,
            Some(NoMatchingOverloadReason::StackTooShort { expected: l }),
        ))
    }
}

fn parse_entrypoint(field: Option<&str>) -> Result<Entrypoint, TcError> {
    match field {
        Some(f) => Entrypoint::try_from(f).map_err(TcError::EntrypointError),
        None => Ok(Entrypoint::default()),
    }
}

fn var_ann(anns: &Annotations) -> Result<Option<String>, TcError> {
    Ok(anns.get_single_var_ann()?.map(str::to_owned))
}

fn has_special(anns: &Annotations, special: &str) -> bool {
    anns.iter()
        .any(|a| matches!(a, Annotation::Special(s) if s == special))
}

/// Put the variable and type annotations of an instruction on its result.
fn annotate(t: impl Into<Ty>, anns: &Annotations) -> Result<Ty, TcError> {
    let mut ty = t.into();
    if let Some(v) = anns.get_single_var_ann()? {
        ty.anns.var = Some(v.to_owned());
    }
    if let Some(t) = anns.get_single_type_ann()? {
        ty.anns.ty = Some(t.to_owned());
    }
    Ok(ty)
}

/// Variable annotation of a component taken out of a pair: the explicit one,
/// or one derived from the component's field annotation and the pair's
/// variable annotation.
fn component_var(
    explicit: Option<&str>,
    field_only: bool,
    parent: Option<&str>,
    field: Option<&str>,
    default: &str,
) -> Option<String> {
    if let Some(v) = explicit {
        return Some(v.to_owned());
    }
    if field_only {
        return field.map(str::to_owned);
    }
    let name = field.unwrap_or(default);
    Some(match parent {
        Some(p) => format!("{p}.{name}"),
        None => name.to_owned(),
    })
}

/// A field annotation on an accessor must agree with the component's own.
fn check_field_ann(expected: Option<&str>, comp: &Ty) -> Result<(), TcError> {
    match (expected, &comp.anns.field) {
        (Some(expected), Some(got)) if !expected.is_empty() && expected != got => {
            Err(TcError::FieldAnnotationMismatch {
                expected: expected.to_owned(),
                got: got.clone(),
            })
        }
        _ => Ok(()),
    }
}

/// Field annotations given by `PAIR`, `LEFT` or `RIGHT` to the two components
/// they build. `%@` takes the variable annotation of the corresponding stack
/// item.
fn constructor_fields(anns: &Annotations, items: [Option<&Ty>; 2]) -> [Option<String>; 2] {
    let mut out = [None, None];
    let mut idx = 0;
    for a in anns.iter() {
        if idx == out.len() {
            break;
        }
        out[idx] = match a {
            Annotation::Field(f) => (!f.is_empty()).then(|| f.to_string()),
            // only the last component of a `parent.field` variable names the field
            Annotation::Special(s) if s == ANN_FIELD_VAR => items[idx]
                .and_then(|x| x.anns.var.as_deref())
                .map(|v| v.rsplit_once('.').map_or(v, |(_, f)| f).to_owned()),
            _ => continue,
        };
        idx += 1;
    }
    out
}

/// Unify two types: the structures must be equal, type and field annotations
/// must agree where both are present. Variable annotations that differ are
/// dropped.
pub fn unify_ty(a: &Ty, b: &Ty) -> Result<Ty, TypesNotEqual> {
    merge_ty(a, b).ok_or_else(|| TypesNotEqual(a.clone(), b.clone()))
}

fn merge_ty(a: &Ty, b: &Ty) -> Option<Ty> {
    fn ann(x: &Option<String>, y: &Option<String>) -> Option<Option<String>> {
        match (x, y) {
            (Some(x), Some(y)) if x != y => None,
            _ => Some(x.clone().or_else(|| y.clone())),
        }
    }
    let anns = TypeAnns {
        ty: ann(&a.anns.ty, &b.anns.ty)?,
        field: ann(&a.anns.field, &b.anns.field)?,
        var: if a.anns.var == b.anns.var {
            a.anns.var.clone()
        } else {
            None
        },
    };
    fn one(x: &Ty, y: &Ty) -> Option<Box<Ty>> {
        merge_ty(x, y).map(Box::new)
    }
    fn two(p: &(Ty, Ty), q: &(Ty, Ty)) -> Option<Box<(Ty, Ty)>> {
        Some(Box::new((merge_ty(&p.0, &q.0)?, merge_ty(&p.1, &q.1)?)))
    }
    let t = match (&a.t, &b.t) {
        (Type::Option(x), Type::Option(y)) => Type::Option(one(x, y)?),
        (Type::List(x), Type::List(y)) => Type::List(one(x, y)?),
        (Type::Set(x), Type::Set(y)) => Type::Set(one(x, y)?),
        (Type::Contract(x), Type::Contract(y)) => Type::Contract(one(x, y)?),
        (Type::Ticket(x), Type::Ticket(y)) => Type::Ticket(one(x, y)?),
        (Type::Pair(p), Type::Pair(q)) => Type::Pair(two(p, q)?),
        (Type::Or(p), Type::Or(q)) => Type::Or(two(p, q)?),
        (Type::Map(p), Type::Map(q)) => Type::Map(two(p, q)?),
        (Type::BigMap(p), Type::BigMap(q)) => Type::BigMap(two(p, q)?),
        (Type::Lambda(p), Type::Lambda(q)) => Type::Lambda(two(p, q)?),
        (x, y) if x == y => x.clone(),
        _ => return None,
    };
    Some(Ty { t, anns })
}

fn unify_type_stacks(s1: &TypeStack, s2: &TypeStack) -> Result<TypeStack, TcError> {
    if s1.len() != s2.len() {
        return Err(TcError::StacksNotEqual(
            s1.clone(),
            s2.clone(),
            StacksNotEqualReason::LengthsDiffer(s1.len(), s2.len()),
        ));
    }
    s1.as_slice()
        .iter()
        .zip(s2.as_slice())
        .map(|(a, b)| {
            unify_ty(a, b)
                .map_err(|e| TcError::StacksNotEqual(s1.clone(), s2.clone(), e.into()))
        })
        .collect()
}

/// Tries to unify two stacks, putting the result in `dest`. Failed stacks
/// unify with anything. When both have failed, the failure closest to the
/// top level is kept.
fn unify_stacks(dest: &mut FailingTypeStack, aux: FailingTypeStack) -> Result<(), TcError> {
    use FailingTypeStack as F;
    *dest = match (std::mem::take(dest), aux) {
        (F::Ok(s1), F::Ok(s2)) => F::Ok(unify_type_stacks(&s1, &s2)?),
        (ok @ F::Ok(_), F::Failed { .. }) => ok,
        (F::Failed { .. }, ok @ F::Ok(_)) => ok,
        (f1 @ F::Failed { level: l1, .. }, f2 @ F::Failed { level: l2, .. }) => {
            if l2 < l1 {
                f2
            } else {
                f1
            }
        }
    };
    Ok(())
}

/// Check that `got` matches `expected`, failures being accepted.
fn ensure_stacks_eq(expected: &TypeStack, got: &FailingTypeStack) -> Result<(), TcError> {
    match got {
        FailingTypeStack::Ok(got) => unify_type_stacks(expected, got).map(|_| ()),
        FailingTypeStack::Failed { .. } => Ok(()),
    }
}

#[cfg(test)]
mod typecheck_tests {
    use super::*;
    use crate::ast::micheline::test_helpers::*;
    use crate::parser::test_helpers::*;

    fn var(ty: impl Into<Ty>, v: &str) -> Ty {
        ty.into().with_var(Some(v.to_owned()))
    }

    fn run(instr: &str, stack: TypeStack) -> Result<FailingTypeStack, TcError> {
        function_type(&parse(instr).unwrap(), stack, &Ctx::default())
    }

    fn run_ok(instr: &str, stack: TypeStack) -> TypeStack {
        match run(instr, stack).unwrap() {
            FailingTypeStack::Ok(stk) => stk,
            failed => panic!("unexpected failure: {failed}"),
        }
    }

    fn erased(stack: TypeStack) -> TypeStack {
        stack.as_slice().iter().map(Ty::erase_anns).collect()
    }

    #[test]
    fn car_derives_annotation() {
        assert_eq!(
            run_ok("CAR", tc_stk![Type::new_pair(Type::Int, Type::String)]),
            tc_stk![var(Type::Int, "car")]
        );
        assert_eq!(
            run("CAR", tc_stk![Type::Int]),
            Err(TcError::NoMatchingOverload {
                instr: Prim::CAR,
                stack: tc_stk![Type::Int],
                reason: Some(NoMatchingOverloadReason::ExpectedPair(Type::Int.into()))
            })
        );
        let field = |t: Type, f: &str| Ty::from(t).with_field(Some(f.to_owned()));
        let pair = var(
            Type::new_pair(field(Type::Int, "a"), field(Type::Nat, "b")),
            "p",
        );
        assert_eq!(run_ok("CDR", tc_stk![pair.clone()]), tc_stk![var(Type::Nat, "p.b")]);
        assert_eq!(run_ok("CAR @x", tc_stk![pair.clone()]), tc_stk![var(Type::Int, "x")]);
        assert_eq!(run_ok("CAR @%", tc_stk![pair.clone()]), tc_stk![var(Type::Int, "a")]);
        assert_eq!(
            run("CAR %b", tc_stk![pair]),
            Err(TcError::FieldAnnotationMismatch {
                expected: "b".to_owned(),
                got: "a".to_owned()
            })
        );
    }

    #[test]
    fn stack_manipulation() {
        let stk = tc_stk![Type::Unit, Type::Nat, Type::Int];
        assert_eq!(
            run_ok("DIG 2", stk.clone()),
            tc_stk![Type::Nat, Type::Int, Type::Unit]
        );
        assert_eq!(
            run_ok("DUG 2", stk.clone()),
            tc_stk![Type::Int, Type::Unit, Type::Nat]
        );
        assert_eq!(run_ok("DROP 2", stk.clone()), tc_stk![Type::Unit]);
        assert_eq!(
            run_ok("DUP 3", stk.clone()),
            tc_stk![Type::Unit, Type::Nat, Type::Int, Type::Unit]
        );
        assert_eq!(run("DUP 0", stk.clone()), Err(TcError::Dup0));
        assert_eq!(
            run("DROP 4", stk.clone()),
            Err(TcError::NoMatchingOverload {
                instr: Prim::DROP,
                stack: stk.clone(),
                reason: Some(NoMatchingOverloadReason::StackTooShort { expected: 4 })
            })
        );
        assert_eq!(
            run_ok("{ SWAP ; DIP { DROP } }", stk),
            tc_stk![Type::Unit, Type::Nat]
        );
        assert!(matches!(
            run("DUP", tc_stk![Type::new_ticket(Type::Unit)]),
            Err(TcError::InvalidTypeProperty(TypeProperty::Duplicable, _))
        ));
    }

    #[test]
    fn arithmetic_and_comparison() {
        assert_eq!(
            run_ok("ADD", tc_stk![Type::Int, Type::Nat]),
            tc_stk![Type::Int]
        );
        assert_eq!(
            run_ok("{ COMPARE ; EQ @same }", tc_stk![Type::String, Type::String]),
            tc_stk![var(Type::Bool, "same")]
        );
        assert!(matches!(
            run("COMPARE", tc_stk![Type::Int, Type::Nat]),
            Err(TcError::NoMatchingOverload {
                reason: Some(NoMatchingOverloadReason::TypesNotEqual(_)),
                ..
            })
        ));
        assert!(matches!(
            run("ADD", tc_stk![Type::Unit, Type::Int]),
            Err(TcError::NoMatchingOverload { instr: Prim::ADD, .. })
        ));
        let ctx = Ctx::new(Protocol::Hangzhou);
        assert!(matches!(
            function_type(&parse_core("SUB_MUTEZ"), tc_stk![Type::Mutez, Type::Mutez], &ctx),
            Err(TcError::UnsupportedInProtocol { instr: Prim::SUB_MUTEZ, .. })
        ));
    }

    #[test]
    fn failwith_must_be_in_tail_position() {
        assert_eq!(
            run("{ FAILWITH ; DROP }", tc_stk![Type::Int, Type::String]),
            Err(TcError::FailNotInTail)
        );
        assert!(run("{ DROP ; FAILWITH }", tc_stk![Type::Int, Type::String])
            .unwrap()
            .is_failed());
        // a failure coming out of a nested block ends checking of the sequence
        assert!(run(
            "{ IF { FAILWITH } { FAILWITH } ; DROP }",
            tc_stk![Type::Unit, Type::Bool]
        )
        .unwrap()
        .is_failed());
        assert_eq!(
            run("DIP { FAILWITH }", tc_stk![Type::Unit, Type::Unit]),
            Err(TcError::FailNotInTail)
        );
    }

    #[test]
    fn branches_unify() {
        assert_eq!(
            run_ok(
                "IF_NONE { PUSH int 0 } {}",
                tc_stk![Type::new_option(Type::Int)]
            ),
            tc_stk![Type::Int]
        );
        assert_eq!(
            run_ok("IF { FAILWITH } { DROP }", tc_stk![Type::Unit, Type::Bool]),
            tc_stk![]
        );
        assert!(matches!(
            run("IF_LEFT {} {}", tc_stk![Type::new_or(Type::Int, Type::Nat)]),
            Err(TcError::StacksNotEqual(..))
        ));
        assert_eq!(
            erased(run_ok(
                "IF_CONS { DIP { DROP } } { PUSH int 1 }",
                tc_stk![Type::new_list(Type::Int)]
            )),
            tc_stk![Type::Int]
        );
    }

    #[test]
    fn comb_macros_match_explicit_code() {
        let stk = |n: usize| -> TypeStack {
            (0..n)
                .map(|i| Ty::from(if i % 2 == 0 { Type::Int } else { Type::Nat }))
                .collect()
        };
        for (mac, core, n) in [
            ("PAPAIR", "{ DIP { PAIR } ; PAIR }", 3),
            ("PPAIIR", "{ PAIR ; PAIR }", 3),
            ("PAPPAIIR", "{ DIP { PAIR ; PAIR } ; PAIR }", 4),
            ("PAPAPAIR", "{ DIP { DIP { PAIR } ; PAIR } ; PAIR }", 4),
        ] {
            assert_eq!(
                erased(run_ok(mac, stk(n))),
                erased(run_ok(core, stk(n))),
                "{mac}"
            );
        }
        assert_eq!(
            erased(run_ok("PAIR 3", stk(3))),
            erased(run_ok("{ DIP { PAIR } ; PAIR }", stk(3)))
        );
        assert_eq!(
            erased(run_ok("{ PAIR 4 ; UNPAIR 4 }", stk(4))),
            erased(stk(4))
        );
    }

    #[test]
    fn comb_access() {
        let comb = Ty::from(Type::new_pair(
            Type::Int,
            Type::new_pair(Type::Nat, Type::String),
        ));
        assert_eq!(run_ok("GET 3", tc_stk![comb.clone()]), tc_stk![Type::Nat]);
        assert_eq!(run_ok("GET 4", tc_stk![comb.clone()]), tc_stk![Type::String]);
        assert_eq!(
            run_ok("UPDATE 4", tc_stk![comb.clone(), Type::Bytes]),
            tc_stk![Type::new_pair(
                Type::Int,
                Type::new_pair(Type::Nat, Type::Bytes)
            )]
        );
        assert!(matches!(
            run("GET 5", tc_stk![comb]),
            Err(TcError::NoMatchingOverload { instr: Prim::GET, .. })
        ));
    }

    #[test]
    fn collections() {
        let map = Type::new_map(Type::String, Type::Int);
        assert_eq!(
            run_ok("GET", tc_stk![map.clone(), Type::String]),
            tc_stk![Type::new_option(Type::Int)]
        );
        assert_eq!(
            run_ok("MAP { CDR }", tc_stk![map.clone()]),
            tc_stk![map.clone()]
        );
        assert_eq!(
            erased(run_ok("ITER { CDR ; DROP }", tc_stk![map.clone()])),
            tc_stk![]
        );
        assert_eq!(
            run_ok(
                "GET_AND_UPDATE",
                tc_stk![map.clone(), Type::new_option(Type::Int), Type::String]
            ),
            tc_stk![map, Type::new_option(Type::Int)]
        );
        assert_eq!(
            run_ok("{ NIL nat ; PUSH nat 1 ; CONS ; SIZE }", tc_stk![]),
            tc_stk![Type::Nat]
        );
        assert_eq!(
            run("MAP { FAILWITH }", tc_stk![Type::new_list(Type::Int)]),
            Err(TcError::FailNotInTail)
        );
    }

    #[test]
    fn lambdas() {
        assert_eq!(
            run_ok(
                "{ LAMBDA int int { PUSH int 1 ; ADD } ; PUSH int 2 ; EXEC }",
                tc_stk![]
            ),
            tc_stk![Type::Int]
        );
        assert_eq!(
            run_ok(
                "{ LAMBDA (pair int nat) unit { DROP ; UNIT } ; PUSH int 1 ; APPLY }",
                tc_stk![]
            ),
            tc_stk![Type::new_lambda(Type::Nat, Type::Unit)]
        );
        assert_eq!(
            run_ok("LAMBDA_REC nat nat { DIP { DROP } }", tc_stk![]),
            tc_stk![Type::new_lambda(Type::Nat, Type::Nat)]
        );
        assert!(matches!(
            run("LAMBDA int nat {}", tc_stk![]),
            Err(TcError::StacksNotEqual(..))
        ));
    }

    #[test]
    fn self_is_forbidden_in_lambdas() {
        let ctx = Ctx::for_contract(Protocol::LATEST, Type::Unit.into());
        assert_eq!(
            function_type(&parse("SELF").unwrap(), tc_stk![], &ctx).unwrap(),
            FailingTypeStack::Ok(tc_stk![Type::new_contract(Type::Unit)])
        );
        assert_eq!(
            function_type(
                &parse("LAMBDA unit unit { SELF ; DROP }").unwrap(),
                tc_stk![],
                &ctx
            ),
            Err(TcError::SelfForbidden)
        );
        assert_eq!(
            run("SELF", tc_stk![]),
            Err(TcError::SelfForbidden)
        );
    }

    #[test]
    fn typecheck_push_data() {
        assert_eq!(
            run_ok("PUSH (set int) { 1 ; 2 ; 3 }", tc_stk![]),
            tc_stk![Type::new_set(Type::Int)]
        );
        assert_eq!(
            run("PUSH (set int) { 2 ; 1 }", tc_stk![]),
            Err(TcError::ElementsNotSorted(Type::new_set(Type::Int).into()))
        );
        assert_eq!(
            run("PUSH (map string int) { Elt \"a\" 1 ; Elt \"a\" 2 }", tc_stk![]),
            Err(TcError::DuplicateElements(
                Type::new_map(Type::String, Type::Int).into()
            ))
        );
        assert!(run("PUSH nat -1", tc_stk![]).is_err());
        assert!(run("PUSH mutez 9223372036854775808", tc_stk![]).is_err());
        assert!(run(
            "PUSH (pair int nat string) { 1 ; 2 ; \"three\" }",
            tc_stk![]
        )
        .is_ok());
        assert!(run(
            "PUSH (set (or int nat)) { Left 5 ; Right 1 }",
            tc_stk![]
        )
        .is_ok());
        assert!(run("PUSH address \"tz1KqTpEZ7Yob7QbPE4Hy4Wo8fHG8LhKxZSx\"", tc_stk![]).is_ok());
        assert!(matches!(
            run("PUSH address \"tz1KqTpEZ7Yob7QbPE4Hy4Wo8fHG8LhKxZSy\"", tc_stk![]),
            Err(TcError::ByteReprError(..))
        ));
        assert!(matches!(
            run("PUSH (big_map int int) {}", tc_stk![]),
            Err(TcError::InvalidTypeProperty(TypeProperty::Pushable, _))
        ));
    }

    #[test]
    fn data_against_types() {
        let ctx = Ctx::default();
        let check = |data: &str, ty: &str| {
            typecheck_data(&parse(data).unwrap(), &parse(ty).unwrap(), &ctx)
        };
        assert!(check("\"2019-09-26T10:59:51Z\"", "timestamp").is_ok());
        assert!(check("\"yesterday\"", "timestamp").is_err());
        assert!(check("0", "big_map int int").is_ok());
        assert!(check("{ Elt 1 Unit }", "big_map int unit").is_ok());
        assert!(check("{ DROP ; PUSH int 1 }", "lambda unit int").is_ok());
        assert!(check("Lambda_rec { DROP 2 ; UNIT }", "lambda int unit").is_ok());
        assert!(matches!(
            check("{ 1 }", "map int int"),
            Err(TcError::Validation(_)) | Err(TcError::InvalidEltForMap(..))
        ));
        assert!(check("Unit", "never").is_err());
    }

    #[test]
    fn entrypoints_are_collected() {
        let param = parse("or (int %a) (or (nat %b) (unit %c))").unwrap();
        let eps = contract_entrypoints(&param).unwrap();
        let names: Vec<&str> = eps.iter().map(|(e, _)| e.as_str()).collect();
        assert_eq!(names, ["default", "a", "b", "c"]);
        assert_eq!(
            eps.get(&Entrypoint::try_from("b").unwrap()),
            Some(&Type::Nat.into())
        );
        let param = parse("or (int %default) (nat %b)").unwrap();
        assert_eq!(contract_entrypoints(&param).unwrap().len(), 2);
        let dup = parse("or (int %a) (nat %a)").unwrap();
        assert_eq!(
            contract_entrypoints(&dup),
            Err(TcError::DuplicateEntrypoint(Entrypoint::try_from("a").unwrap()))
        );
    }

    #[test]
    fn cadr_setters_keep_storage_fields() {
        let ctx = Ctx::default();
        let flat = "pair (nat %a) (int %b)";
        let nested = "pair (nat %a) (pair (int %b) (string %c))";
        for (param, storage, code) in [
            ("nat", flat, "UNPAIR ; SWAP ; SET_CAR"),
            ("nat", flat, "UNPAIR ; SWAP ; SET_CAR %a"),
            ("int", flat, "UNPAIR ; SWAP ; SET_CDR"),
            ("int", flat, "UNPAIR ; SWAP ; SET_CDR %b"),
            ("unit", flat, "CDR ; MAP_CAR { PUSH nat 1 ; ADD }"),
            ("unit", flat, "CDR ; MAP_CDR { PUSH int 1 ; ADD }"),
            ("unit", flat, "CDR @st ; MAP_CDR %b { PUSH int 1 ; ADD }"),
            ("int", nested, "UNPAIR ; SWAP ; SET_CDAR %b"),
            ("unit", nested, "CDR ; MAP_CDDR { PUSH string \"x\" ; CONCAT }"),
        ] {
            let src = format!(
                "parameter {param}; storage ({storage}); \
                 code {{ {code} ; NIL operation ; PAIR }}"
            );
            let script = parse_contract_script(&src).unwrap();
            assert!(typecheck_script(&script, &ctx).is_ok(), "{code}");
        }
    }

    #[test]
    fn field_from_dotted_var() {
        let stk = run_ok(
            "PAIR %@ %@",
            tc_stk![var(Type::Int, "st.b"), var(Type::Nat, "cdr.a")],
        );
        let Some(Type::Pair(p)) = stk.top().map(|t| &t.t) else {
            panic!("expected a pair")
        };
        assert_eq!(p.0.anns.field.as_deref(), Some("a"));
        assert_eq!(p.1.anns.field.as_deref(), Some("b"));
    }

    #[test]
    fn contract_scripts() {
        let ctx = Ctx::default();
        let script = parse_contract_script(
            "parameter (or (int %add) (unit %reset));
             storage int;
             code { UNPAIR ;
                    IF_LEFT { ADD } { DROP 2 ; PUSH int 0 } ;
                    NIL operation ;
                    PAIR }",
        )
        .unwrap();
        let res = typecheck_script(&script, &ctx).unwrap();
        assert_eq!(res.storage, Type::Int.into());
        assert_eq!(res.entrypoints.len(), 3);
        assert!(!res.code_result.is_failed());

        let bad = parse_contract_script("parameter unit; storage int; code { CDR }").unwrap();
        assert!(matches!(
            typecheck_script(&bad, &ctx),
            Err(TcError::StacksNotEqual(..))
        ));

        let failing =
            parse_contract_script("parameter unit; storage unit; code { FAILWITH }").unwrap();
        assert!(assert_contract_valid(&failing, &ctx).unwrap().is_failed());

        let self_ep = parse_contract_script(
            "parameter (or (nat %a) (int %b)); storage unit;
             code { DROP ; SELF %b ; DROP ; UNIT ; NIL operation ; PAIR }",
        )
        .unwrap();
        assert!(typecheck_script(&self_ep, &ctx).is_ok());
        let missing = parse_contract_script(
            "parameter (or (nat %a) (int %b)); storage unit;
             code { DROP ; SELF %c ; DROP ; UNIT ; NIL operation ; PAIR }",
        )
        .unwrap();
        assert!(matches!(
            typecheck_script(&missing, &ctx),
            Err(TcError::NoSuchEntrypoint(_))
        ));
    }

    #[test]
    fn views() {
        let ctx = Ctx::default();
        let script = parse_contract_script(
            "parameter unit; storage nat;
             code { CDR ; NIL operation ; PAIR };
             view \"get\" unit nat { CDR };
             view \"me\" unit address { DROP ; SELF ; ADDRESS }",
        )
        .unwrap();
        let res = typecheck_script(&script, &ctx).unwrap();
        assert_eq!(res.views.len(), 2);
        assert_eq!(res.views[0].output, Type::Nat.into());

        let emitting = parse_contract_script(
            "parameter unit; storage nat;
             code { CDR ; NIL operation ; PAIR };
             view \"bad\" unit operation {
               DROP ; PUSH mutez 0 ; NONE key_hash ; SET_DELEGATE ; DIP { DROP } }",
        )
        .unwrap();
        assert_eq!(
            typecheck_script(&emitting, &ctx),
            Err(TcError::ForbiddenInView(Prim::SET_DELEGATE))
        );
        let old = Ctx::new(Protocol::Granada);
        assert!(matches!(
            typecheck_script(&script, &old),
            Err(TcError::UnsupportedInProtocol { .. })
        ));
    }

    #[test]
    fn create_contract() {
        let ctx = Ctx::default();
        assert_eq!(
            erased(run_ok(
                "CREATE_CONTRACT { parameter unit ; storage int ; code { CDR ; NIL operation ; PAIR } }",
                tc_stk![Type::Int, Type::Mutez, Type::new_option(Type::KeyHash)]
            )),
            tc_stk![Type::Address, Type::Operation]
        );
        assert!(function_type(
            &parse("CREATE_CONTRACT { parameter unit ; storage int ; code { CDR ; NIL operation ; PAIR } }")
                .unwrap(),
            tc_stk![Type::Nat, Type::Mutez, Type::new_option(Type::KeyHash)],
            &ctx
        )
        .is_err());
    }

    #[test]
    fn protocol_dependent_results() {
        let stk = tc_stk![Type::Nat, Type::Unit];
        assert_eq!(
            function_type(&parse("TICKET").unwrap(), stk.clone(), &Ctx::new(Protocol::Kathmandu))
                .unwrap(),
            FailingTypeStack::Ok(tc_stk![Type::new_ticket(Type::Unit)])
        );
        assert_eq!(
            run_ok("TICKET", stk),
            tc_stk![Type::new_option(Type::new_ticket(Type::Unit))]
        );
        let chest = tc_stk![Type::Nat, Type::Chest, Type::ChestKey];
        assert_eq!(
            run_ok("OPEN_CHEST", chest.clone()),
            tc_stk![Type::new_option(Type::Bytes)]
        );
        assert_eq!(
            function_type(&parse("OPEN_CHEST").unwrap(), chest, &Ctx::new(Protocol::Nairobi))
                .unwrap(),
            FailingTypeStack::Ok(tc_stk![Type::new_or(Type::Bytes, Type::Bool)])
        );
    }

    #[test]
    fn unification_of_annotations() {
        let a = Ty::from(Type::Int).with_type_ann(Some("t".to_owned()));
        let b = Ty::from(Type::Int).with_var(Some("v".to_owned()));
        assert_eq!(
            unify_ty(&a, &b),
            Ok(Ty::from(Type::Int).with_type_ann(Some("t".to_owned())))
        );
        let c = Ty::from(Type::Int).with_type_ann(Some("u".to_owned()));
        assert!(unify_ty(&a, &c).is_err());
        assert!(unify_ty(&Type::Int.into(), &Type::Nat.into()).is_err());
    }

    #[test]
    fn unexpected_micheline_is_rejected() {
        let ctx = Ctx::default();
        let mut stk = FailingTypeStack::default();
        assert!(matches!(
            typecheck_instruction(&app!(Unit), &ctx, &mut stk),
            Err(TcError::UnexpectedMicheline(_))
        ));
        assert!(matches!(
            typecheck_instruction(&seq! { app!(UNIT); app!(DROP) }, &ctx, &mut stk),
            Ok(())
        ));
    }
}
