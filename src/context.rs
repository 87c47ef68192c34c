/******************************************************************************/
/*                                                                            */
/* SPDX-License-Identifier: MIT                                               */
/* Copyright (c) [2023] Serokell <hi@serokell.io>                             */
/*                                                                            */
/******************************************************************************/

//! The outer context required for typechecking Michelson.

use crate::ast::Ty;
use crate::protocol::Protocol;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Ctx {
    pub protocol: Protocol,
    /// Parameter type of the contract whose code is being checked. `SELF` is
    /// only allowed when it's set.
    pub self_type: Option<Ty>,
    /// Checking the code of a view: operations emitting instructions are
    /// forbidden.
    pub in_view: bool,
    /// Checking the body of a lambda: `SELF` is forbidden.
    pub in_lambda: bool,
}

impl Ctx {
    pub fn new(protocol: Protocol) -> Self {
        Ctx {
            protocol,
            ..Ctx::default()
        }
    }

    /// Context for the code of a contract with the given parameter type.
    pub fn for_contract(protocol: Protocol, parameter: Ty) -> Self {
        Ctx {
            protocol,
            self_type: Some(parameter),
            ..Ctx::default()
        }
    }

    /// Context for a lambda body nested in the current code. Lambdas may
    /// emit operations even when built by a view.
    pub fn lambda(&self) -> Self {
        Ctx {
            in_lambda: true,
            in_view: false,
            ..self.clone()
        }
    }

    /// Context for the body of a view of the current contract.
    pub fn view(&self) -> Self {
        Ctx {
            in_view: true,
            ..self.clone()
        }
    }
}
