/******************************************************************************/
/*                                                                            */
/* SPDX-License-Identifier: MIT                                               */
/* Copyright (c) [2023] Serokell <hi@serokell.io>                             */
/*                                                                            */
/******************************************************************************/

//! Ensure [TypeProperty] holds for a given [Ty].

use super::TcError;
use crate::ast::{Ty, Type};

/// Type properties, as described in
/// <https://tezos.gitlab.io/michelson-reference/#types>
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum TypeProperty {
    Comparable,
    Passable,
    Storable,
    Pushable,
    Packable,
    BigMapValue,
    Duplicable,
}

impl std::fmt::Display for TypeProperty {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TypeProperty::Comparable => "comparable",
            TypeProperty::Passable => "passable",
            TypeProperty::Storable => "storable",
            TypeProperty::Pushable => "pushable",
            TypeProperty::Packable => "packable",
            TypeProperty::BigMapValue => "allowed big_map value",
            TypeProperty::Duplicable => "duplicable",
        };
        write!(f, "{}", s)
    }
}

impl Ty {
    /// Ensure a given property `prop` holds for `self`. The function traverses
    /// the type, so worst-case complexity is O(n).
    ///
    /// If a property doesn't hold, returns [TcError::InvalidTypeProperty].
    pub fn ensure_prop(&self, prop: TypeProperty) -> Result<(), TcError> {
        use Type::*;
        let invalid_type_prop = || Err(TcError::InvalidTypeProperty(prop, self.clone()));
        match &self.t {
            Nat | Int | Bool | Mutez | String | Unit | Never | Address | ChainId | Bytes | Key
            | Signature | KeyHash | Timestamp | TxRollupL2Address => (),
            Ticket(x) => match prop {
                TypeProperty::Comparable
                | TypeProperty::Pushable
                | TypeProperty::Duplicable
                | TypeProperty::Packable => return invalid_type_prop(),
                TypeProperty::Passable | TypeProperty::Storable | TypeProperty::BigMapValue => {
                    x.ensure_prop(prop)?
                }
            },
            Bls12381Fr | Bls12381G1 | Bls12381G2 | Chest | ChestKey | SaplingTransaction(_) => {
                match prop {
                    TypeProperty::Comparable => return invalid_type_prop(),
                    TypeProperty::Passable
                    | TypeProperty::Storable
                    | TypeProperty::Pushable
                    | TypeProperty::Packable
                    | TypeProperty::BigMapValue
                    | TypeProperty::Duplicable => (),
                }
            }
            SaplingState(_) => match prop {
                TypeProperty::Comparable
                | TypeProperty::Pushable
                | TypeProperty::Packable
                | TypeProperty::BigMapValue => return invalid_type_prop(),
                TypeProperty::Passable | TypeProperty::Storable | TypeProperty::Duplicable => (),
            },
            Operation => match prop {
                TypeProperty::Comparable
                | TypeProperty::Passable
                | TypeProperty::Storable
                | TypeProperty::Pushable
                | TypeProperty::Packable
                | TypeProperty::BigMapValue => return invalid_type_prop(),
                TypeProperty::Duplicable => (),
            },
            Pair(p) | Or(p) => {
                p.0.ensure_prop(prop)?;
                p.1.ensure_prop(prop)?;
            }
            Option(x) => x.ensure_prop(prop)?,
            List(x) | Set(x) => match prop {
                TypeProperty::Comparable => return invalid_type_prop(),
                TypeProperty::Passable
                | TypeProperty::Storable
                | TypeProperty::Pushable
                | TypeProperty::Packable
                | TypeProperty::BigMapValue
                | TypeProperty::Duplicable => x.ensure_prop(prop)?,
            },
            Map(p) => match prop {
                TypeProperty::Comparable => return invalid_type_prop(),
                TypeProperty::Passable
                | TypeProperty::Storable
                | TypeProperty::Pushable
                | TypeProperty::Packable
                | TypeProperty::BigMapValue
                | TypeProperty::Duplicable => p.1.ensure_prop(prop)?,
            },
            BigMap(p) => match prop {
                TypeProperty::Comparable
                | TypeProperty::BigMapValue
                | TypeProperty::Packable
                | TypeProperty::Pushable => return invalid_type_prop(),
                TypeProperty::Passable | TypeProperty::Storable | TypeProperty::Duplicable => {
                    p.1.ensure_prop(prop)?
                }
            },
            Contract(_) => match prop {
                TypeProperty::Passable | TypeProperty::Packable | TypeProperty::Duplicable => (),
                TypeProperty::Comparable
                | TypeProperty::Storable
                | TypeProperty::Pushable
                | TypeProperty::BigMapValue => return invalid_type_prop(),
            },
            Lambda(_) => match prop {
                TypeProperty::Comparable => return invalid_type_prop(),
                TypeProperty::Passable
                | TypeProperty::Storable
                | TypeProperty::Pushable
                | TypeProperty::Packable
                | TypeProperty::BigMapValue
                | TypeProperty::Duplicable => (),
            },
        }
        Ok(())
    }

    /// Like [Self::ensure_prop], returning a boolean.
    pub fn has_prop(&self, prop: TypeProperty) -> bool {
        self.ensure_prop(prop).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn properties() {
        let ticket = Ty::from(Type::new_ticket(Type::Nat));
        assert!(!ticket.has_prop(TypeProperty::Duplicable));
        assert!(ticket.has_prop(TypeProperty::Storable));
        assert_eq!(
            Ty::from(Type::new_list(Type::Operation)).ensure_prop(TypeProperty::Packable),
            Err(TcError::InvalidTypeProperty(
                TypeProperty::Packable,
                Type::Operation.into()
            ))
        );
        let lambda = Ty::from(Type::new_lambda(Type::Operation, Type::Operation));
        assert!(lambda.has_prop(TypeProperty::Pushable));
        assert!(!lambda.has_prop(TypeProperty::Comparable));
        let comparable = Ty::from(Type::new_pair(
            Type::new_or(Type::Int, Type::Address),
            Type::new_option(Type::Never),
        ));
        assert!(comparable.has_prop(TypeProperty::Comparable));
        assert!(!Ty::from(Type::new_map(Type::Int, Type::new_contract(Type::Unit)))
            .has_prop(TypeProperty::Storable));
        assert!(!Ty::from(Type::SaplingState(8)).has_prop(TypeProperty::Pushable));
    }
}
