/******************************************************************************/
/*                                                                            */
/* SPDX-License-Identifier: MIT                                               */
/* Copyright (c) [2023] Serokell <hi@serokell.io>                             */
/*                                                                            */
/******************************************************************************/

//! Registry of global constants, i.e. expressions referenced from scripts as
//! `constant "<expr hash>"`.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::ast::Micheline;
use crate::serializer::script_expr_hash;

/// Expressions are kept in their JSON form, so the registry is independent
/// of any parser arena.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GlobalConstants {
    constants: BTreeMap<String, Value>,
}

impl GlobalConstants {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an expression, returning its `expr...` hash.
    pub fn register(&mut self, expr: &Micheline) -> String {
        let hash = script_expr_hash(&expr.encode());
        tracing::debug!(%hash, "registering global constant");
        self.constants.insert(hash.clone(), expr.to_json());
        hash
    }

    /// Register an expression under a known hash. The hash is not verified.
    pub fn insert(&mut self, hash: impl Into<String>, expr: Value) {
        self.constants.insert(hash.into(), expr);
    }

    pub fn get(&self, hash: &str) -> Option<&Value> {
        self.constants.get(hash)
    }

    pub fn len(&self) -> usize {
        self.constants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.constants.is_empty()
    }
}
