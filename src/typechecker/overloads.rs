/******************************************************************************/
/*                                                                            */
/* SPDX-License-Identifier: MIT                                               */
/* Copyright (c) [2023] Serokell <hi@serokell.io>                             */
/*                                                                            */
/******************************************************************************/

//! Overload tables for instructions whose result type only depends on the
//! types of their operands.

use crate::ast::Type;
use crate::lexer::Prim;
use crate::protocol::Protocol;

/// Result of an instruction taking no operands.
pub fn nullary(prim: Prim) -> Option<Type> {
    use Type as T;
    Some(match prim {
        Prim::UNIT => T::Unit,
        Prim::NOW => T::Timestamp,
        Prim::AMOUNT | Prim::BALANCE => T::Mutez,
        Prim::SOURCE | Prim::SENDER | Prim::SELF_ADDRESS => T::Address,
        Prim::CHAIN_ID => T::ChainId,
        Prim::LEVEL | Prim::TOTAL_VOTING_POWER | Prim::MIN_BLOCK_TIME => T::Nat,
        _ => return None,
    })
}

/// Result of a single-operand instruction.
pub fn unary(prim: Prim, protocol: Protocol, x: &Type) -> Option<Type> {
    use Type as T;
    let bytes_ops = protocol.is_at_least(Protocol::Mumbai);
    Some(match (prim, x) {
        (Prim::ABS, T::Int) => T::Nat,
        (Prim::ISNAT, T::Int) => T::new_option(T::Nat),
        (Prim::INT, T::Nat | T::Bls12381Fr) => T::Int,
        (Prim::INT, T::Bytes) if bytes_ops => T::Int,
        (Prim::NAT, T::Bytes) => T::Nat,
        (Prim::BYTES, T::Int | T::Nat) => T::Bytes,
        (Prim::NEG, T::Nat | T::Int) => T::Int,
        (Prim::NEG, T::Bls12381G1 | T::Bls12381G2 | T::Bls12381Fr) => x.clone(),
        (Prim::NOT, T::Bool) => T::Bool,
        (Prim::NOT, T::Nat | T::Int) => T::Int,
        (Prim::NOT, T::Bytes) if bytes_ops => T::Bytes,
        (Prim::EQ | Prim::NEQ | Prim::LT | Prim::GT | Prim::LE | Prim::GE, T::Int) => T::Bool,
        (Prim::BLAKE2B | Prim::SHA256 | Prim::SHA512 | Prim::KECCAK | Prim::SHA3, T::Bytes) => {
            T::Bytes
        }
        (Prim::HASH_KEY, T::Key) => T::KeyHash,
        (Prim::IMPLICIT_ACCOUNT, T::KeyHash) => T::new_contract(T::Unit),
        (Prim::VOTING_POWER, T::KeyHash) => T::Nat,
        (Prim::ADDRESS, T::Contract(_)) => T::Address,
        (Prim::SET_DELEGATE, T::Option(x)) if x.t == T::KeyHash => T::Operation,
        (Prim::SIZE, T::String | T::Bytes | T::List(_) | T::Set(_) | T::Map(_)) => T::Nat,
        (Prim::PAIRING_CHECK, T::List(x)) => match &x.t {
            T::Pair(p) if p.0.t == T::Bls12381G1 && p.1.t == T::Bls12381G2 => T::Bool,
            _ => return None,
        },
        _ => return None,
    })
}

/// Result of a two-operand arithmetic or bitwise instruction, `top` being the
/// top of the stack.
pub fn binary(prim: Prim, protocol: Protocol, top: &Type, second: &Type) -> Option<Type> {
    use Type as T;
    let bytes_ops = protocol.is_at_least(Protocol::Mumbai);
    let ediv = |q: Type, r: Type| T::new_option(T::new_pair(q, r));
    Some(match (prim, top, second) {
        (Prim::ADD, T::Nat, T::Nat) => T::Nat,
        (Prim::ADD, T::Nat | T::Int, T::Nat | T::Int) => T::Int,
        (Prim::ADD, T::Timestamp, T::Int) | (Prim::ADD, T::Int, T::Timestamp) => T::Timestamp,
        (Prim::ADD, T::Mutez, T::Mutez) => T::Mutez,
        (Prim::ADD, T::Bls12381G1, T::Bls12381G1)
        | (Prim::ADD, T::Bls12381G2, T::Bls12381G2)
        | (Prim::ADD, T::Bls12381Fr, T::Bls12381Fr) => top.clone(),

        (Prim::SUB, T::Nat | T::Int, T::Nat | T::Int) => T::Int,
        (Prim::SUB, T::Timestamp, T::Int) => T::Timestamp,
        (Prim::SUB, T::Timestamp, T::Timestamp) => T::Int,
        (Prim::SUB, T::Mutez, T::Mutez) if !protocol.is_at_least(Protocol::Ithaca) => T::Mutez,
        (Prim::SUB_MUTEZ, T::Mutez, T::Mutez) => T::new_option(T::Mutez),

        (Prim::MUL, T::Nat, T::Nat) => T::Nat,
        (Prim::MUL, T::Nat | T::Int, T::Nat | T::Int) => T::Int,
        (Prim::MUL, T::Mutez, T::Nat) | (Prim::MUL, T::Nat, T::Mutez) => T::Mutez,
        (Prim::MUL, T::Bls12381G1 | T::Bls12381G2 | T::Bls12381Fr, T::Bls12381Fr) => top.clone(),
        (Prim::MUL, T::Nat | T::Int, T::Bls12381Fr) | (Prim::MUL, T::Bls12381Fr, T::Nat | T::Int) => {
            T::Bls12381Fr
        }

        (Prim::EDIV, T::Nat, T::Nat) => ediv(T::Nat, T::Nat),
        (Prim::EDIV, T::Nat | T::Int, T::Nat | T::Int) => ediv(T::Int, T::Nat),
        (Prim::EDIV, T::Mutez, T::Nat) => ediv(T::Mutez, T::Mutez),
        (Prim::EDIV, T::Mutez, T::Mutez) => ediv(T::Nat, T::Mutez),

        (Prim::LSL | Prim::LSR, T::Nat, T::Nat) => T::Nat,
        (Prim::LSL | Prim::LSR, T::Bytes, T::Nat) if bytes_ops => T::Bytes,
        (Prim::OR | Prim::AND | Prim::XOR, T::Bool, T::Bool) => T::Bool,
        (Prim::OR | Prim::AND | Prim::XOR, T::Nat, T::Nat) => T::Nat,
        (Prim::AND, T::Int, T::Nat) => T::Nat,
        (Prim::OR | Prim::AND | Prim::XOR, T::Bytes, T::Bytes) if bytes_ops => T::Bytes,
        _ => return None,
    })
}

/// Earliest protocol supporting an instruction, [None] for instructions no
/// longer supported by any known protocol.
pub fn min_protocol(prim: Prim) -> Option<Protocol> {
    use Protocol as P;
    Some(match prim {
        Prim::CREATE_ACCOUNT | Prim::STEPS_TO_QUOTA => return None,
        Prim::GET_AND_UPDATE
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
        | Prim::TICKET
        | Prim::TICKET_DEPRECATED
        | Prim::READ_TICKET
        | Prim::SPLIT_TICKET
        | Prim::JOIN_TICKETS => P::Edo,
        Prim::OPEN_CHEST | Prim::VIEW => P::Hangzhou,
        Prim::SUB_MUTEZ => P::Ithaca,
        Prim::MIN_BLOCK_TIME => P::Jakarta,
        Prim::EMIT => P::Kathmandu,
        Prim::LAMBDA_REC => P::Lima,
        Prim::BYTES | Prim::NAT => P::Mumbai,
        _ => P::Babylon,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arithmetic_matrix() {
        use Type as T;
        let p = Protocol::LATEST;
        assert_eq!(binary(Prim::ADD, p, &T::Nat, &T::Int), Some(T::Int));
        assert_eq!(binary(Prim::ADD, p, &T::Int, &T::Timestamp), Some(T::Timestamp));
        assert_eq!(binary(Prim::SUB, p, &T::Timestamp, &T::Timestamp), Some(T::Int));
        assert_eq!(binary(Prim::SUB, p, &T::Mutez, &T::Mutez), None);
        assert_eq!(
            binary(Prim::SUB, Protocol::Hangzhou, &T::Mutez, &T::Mutez),
            Some(T::Mutez)
        );
        assert_eq!(
            binary(Prim::EDIV, p, &T::Mutez, &T::Nat),
            Some(T::new_option(T::new_pair(T::Mutez, T::Mutez)))
        );
        assert_eq!(binary(Prim::MUL, p, &T::Nat, &T::Mutez), Some(T::Mutez));
        assert_eq!(binary(Prim::MUL, p, &T::Mutez, &T::Mutez), None);
        assert_eq!(binary(Prim::AND, p, &T::Int, &T::Nat), Some(T::Nat));
        assert_eq!(binary(Prim::LSL, p, &T::Bytes, &T::Nat), Some(T::Bytes));
        assert_eq!(binary(Prim::LSL, Protocol::Lima, &T::Bytes, &T::Nat), None);
    }

    #[test]
    fn unary_ops() {
        use Type as T;
        let p = Protocol::LATEST;
        assert_eq!(unary(Prim::NOT, p, &T::Nat), Some(T::Int));
        assert_eq!(unary(Prim::ISNAT, p, &T::Int), Some(T::new_option(T::Nat)));
        assert_eq!(unary(Prim::SIZE, p, &T::new_set(T::Int)), Some(T::Nat));
        assert_eq!(unary(Prim::EQ, p, &T::Nat), None);
        assert_eq!(
            unary(
                Prim::PAIRING_CHECK,
                p,
                &T::new_list(T::new_pair(T::Bls12381G1, T::Bls12381G2))
            ),
            Some(T::Bool)
        );
        assert_eq!(nullary(Prim::NOW), Some(T::Timestamp));
        assert_eq!(min_protocol(Prim::EMIT), Some(Protocol::Kathmandu));
        assert_eq!(min_protocol(Prim::STEPS_TO_QUOTA), None);
    }
}
