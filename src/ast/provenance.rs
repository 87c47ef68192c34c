/******************************************************************************/
/*                                                                            */
/* SPDX-License-Identifier: MIT                                               */
/* Copyright (c) [2023] Serokell <hi@serokell.io>                             */
/*                                                                            */
/******************************************************************************/

//! Out-of-band metadata about parsed nodes: where a node came from in the
//! source text, and which macro or global constant produced it.
//!
//! Entries are keyed by [NodeId], the address of the node inside the parser
//! arena. Lookups only make sense for references pointing into that arena,
//! i.e. nodes reached by walking the tree returned alongside the table.

use std::collections::HashMap;

use super::annotations::Annotations;
use super::micheline::Micheline;
use crate::lexer::Span;

/// Stable identifier of an arena-resident node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

impl NodeId {
    pub fn of(node: &Micheline) -> Self {
        NodeId(node as *const Micheline as usize)
    }
}

/// Pre-expansion form of a node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Origin<'a> {
    /// The node is the expansion of a macro application.
    Macro {
        name: String,
        args: &'a [Micheline<'a>],
        annotations: Annotations<'a>,
    },
    /// The node is the inlined body of `constant "<hash>"`.
    GlobalConstant { hash: String },
}

#[derive(Debug, Default)]
pub struct Provenance<'a> {
    origins: HashMap<NodeId, Origin<'a>>,
    spans: HashMap<NodeId, Span>,
}

impl<'a> Provenance<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record(&mut self, node: &Micheline<'a>, origin: Option<Origin<'a>>, span: Span) {
        let id = NodeId::of(node);
        if let Some(origin) = origin {
            self.origins.insert(id, origin);
        }
        self.spans.insert(id, span);
    }

    pub fn origin(&self, node: &Micheline) -> Option<&Origin<'a>> {
        self.origins.get(&NodeId::of(node))
    }

    pub fn span(&self, node: &Micheline) -> Option<&Span> {
        self.spans.get(&NodeId::of(node))
    }

    pub fn expanded_count(&self) -> usize {
        self.origins.len()
    }
}
