/******************************************************************************/
/*                                                                            */
/* SPDX-License-Identifier: MIT                                               */
/* Copyright (c) [2023] Serokell <hi@serokell.io>                             */
/*                                                                            */
/******************************************************************************/

//! Micheline parser.
//!
//! Parsing happens in two steps. [syntax::RawParser] (or [json] for JSON
//! input) builds a raw tree with primitive names as written and source spans.
//! A single bottom-up rewrite then resolves primitive names, expands macros
//! and global constants, and allocates the result in the parser arena. The
//! pre-expansion form of rewritten nodes can be kept in a [Provenance] table.

pub mod global_constants;
pub mod json;
pub mod macros;
pub mod syntax;

use std::str::FromStr;

use serde_json::Value;
use typed_arena::Arena;

use crate::ast::{Micheline, Origin, Provenance};
use crate::lexer::{LexerError, Prim, Scanner, Span};
use crate::protocol::Protocol;
pub use global_constants::GlobalConstants;
use json::JsonParseError;
use macros::{expand_macro, MacroError};
use syntax::{Node, RawParser};

/// Maximum nesting of sequences and applications accepted by the parser, the
/// macro expander, the validator and the typechecker.
pub const MAX_NESTING_DEPTH: usize = 256;

#[derive(Debug, PartialEq, Eq, Clone, thiserror::Error)]
pub enum ParserError {
    #[error(transparent)]
    LexerError(#[from] LexerError),
    #[error("unexpected token {token} at position {position}")]
    UnexpectedToken { token: String, position: usize },
    #[error("unexpected end of input")]
    UnexpectedEof,
    #[error("expected a primitive name, but got {token} at position {position}")]
    ExpectedIdentifier { token: String, position: usize },
    #[error("unknown primitive {name} at position {position}")]
    UnknownPrim { name: String, position: usize },
    #[error("invalid annotation {annotation} at position {position}")]
    InvalidAnnotation { annotation: String, position: usize },
    #[error("expression nesting exceeds {0} levels")]
    NestingTooDeep(usize),
    #[error(transparent)]
    MacroError(#[from] MacroError),
    #[error(transparent)]
    JsonError(#[from] JsonParseError),
    #[error("unknown global constant {0}")]
    UnknownGlobalConstant(String),
    #[error("global constant reference must be a single string argument")]
    MalformedConstant,
    #[error("empty input")]
    EmptyInput,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParserOptions {
    pub protocol: Protocol,
    /// Expand macros and global constants. When unset, every primitive name
    /// must be a core primitive.
    pub expand_macros: bool,
    /// Registry used to inline `constant "<hash>"`. Without one, `constant`
    /// is left as is.
    pub global_constants: Option<GlobalConstants>,
    /// Scan comments as tokens. The parser skips them either way.
    pub surface_comments: bool,
}

impl Default for ParserOptions {
    fn default() -> Self {
        ParserOptions {
            protocol: Protocol::default(),
            expand_macros: true,
            global_constants: None,
            surface_comments: false,
        }
    }
}

pub struct Parser<'a> {
    pub arena: Arena<Micheline<'a>>,
    pub options: ParserOptions,
}

impl Default for Parser<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a> Parser<'a> {
    pub fn new() -> Self {
        Self::with_options(ParserOptions::default())
    }

    pub fn with_options(options: ParserOptions) -> Self {
        Parser {
            arena: Arena::new(),
            options,
        }
    }

    fn scanner<'s>(&self, src: &'s str) -> Scanner<'s> {
        Scanner::new(src).with_comments(self.options.surface_comments)
    }

    /// Parse a single expression, failing on empty input.
    pub fn parse(&'a self, src: &str) -> Result<Micheline<'a>, ParserError> {
        self.parse_expression(src)?.ok_or(ParserError::EmptyInput)
    }

    /// Parse a single expression: a literal, a sequence in braces, or a
    /// primitive application with or without parentheses. Empty input gives
    /// `None`.
    #[tracing::instrument(skip_all, fields(len = src.len()))]
    pub fn parse_expression(&'a self, src: &str) -> Result<Option<Micheline<'a>>, ParserError> {
        match RawParser::new(self.scanner(src)).top_expression()? {
            Some(node) => Ok(Some(self.rewriter(None).rewrite(&node)?.0)),
            None => Ok(None),
        }
    }

    /// Parse a script, i.e. a sequence of top-level expressions, braces
    /// optional. A document consisting of a single braced sequence is that
    /// sequence. Empty input gives `None`.
    #[tracing::instrument(skip_all, fields(len = src.len()))]
    pub fn parse_script(&'a self, src: &str) -> Result<Option<Micheline<'a>>, ParserError> {
        let mut items = RawParser::new(self.scanner(src)).top_sequence()?;
        let node = match items.len() {
            0 => return Ok(None),
            1 if matches!(items[0], Node::Seq(..)) => items.remove(0),
            _ => {
                let span = match (items.first(), items.last()) {
                    (Some(first), Some(last)) => first.span().start..last.span().end,
                    _ => 0..0,
                };
                Node::Seq(items, span)
            }
        };
        Ok(Some(self.rewriter(None).rewrite(&node)?.0))
    }

    /// Import the protocol JSON representation.
    #[tracing::instrument(skip_all)]
    pub fn parse_json(&'a self, value: &Value) -> Result<Micheline<'a>, ParserError> {
        let node = json::node_from_json(value)?;
        Ok(self.rewriter(None).rewrite(&node)?.0)
    }

    /// Like [Self::parse], additionally returning spans of all nodes and the
    /// pre-expansion form of macros and constants. The root node lives in the
    /// arena so it can be looked up in the table too.
    pub fn parse_with_provenance(
        &'a self,
        src: &str,
    ) -> Result<(&'a Micheline<'a>, Provenance<'a>), ParserError> {
        let node = RawParser::new(self.scanner(src))
            .top_expression()?
            .ok_or(ParserError::EmptyInput)?;
        let mut provenance = Provenance::new();
        let (res, origin) = self.rewriter(Some(&mut provenance)).rewrite(&node)?;
        let root = &*self.arena.alloc(res);
        provenance.record(root, origin, node.span());
        tracing::debug!(
            expanded = provenance.expanded_count(),
            "parsed with provenance"
        );
        Ok((root, provenance))
    }

    fn rewriter<'p>(&'a self, provenance: Option<&'p mut Provenance<'a>>) -> Rewriter<'a, 'p> {
        Rewriter {
            arena: &self.arena,
            options: &self.options,
            provenance,
            depth: 0,
            constant_span: None,
        }
    }
}

struct Rewriter<'a, 'p> {
    arena: &'a Arena<Micheline<'a>>,
    options: &'a ParserOptions,
    provenance: Option<&'p mut Provenance<'a>>,
    depth: usize,
    /// While inlining a global constant, every node gets the span of the
    /// `constant` application.
    constant_span: Option<Span>,
}

impl<'a> Rewriter<'a, '_> {
    fn span_of(&self, node: &Node) -> Span {
        self.constant_span.clone().unwrap_or_else(|| node.span())
    }

    fn children(&mut self, nodes: &[Node]) -> Result<&'a [Micheline<'a>], ParserError> {
        let mut res = Vec::with_capacity(nodes.len());
        let mut origins = Vec::with_capacity(nodes.len());
        for node in nodes {
            let (m, origin) = self.rewrite(node)?;
            res.push(m);
            origins.push(origin);
        }
        let res = self.arena.alloc_extend(res);
        if self.provenance.is_some() {
            let spans: Vec<_> = nodes.iter().map(|n| self.span_of(n)).collect();
            if let Some(provenance) = self.provenance.as_deref_mut() {
                for ((m, origin), span) in res.iter().zip(origins).zip(spans) {
                    provenance.record(m, origin, span);
                }
            }
        }
        Ok(res)
    }

    /// Rewrite a raw node, returning the result and its origin if it was
    /// produced by expansion.
    fn rewrite(&mut self, node: &Node) -> Result<(Micheline<'a>, Option<Origin<'a>>), ParserError> {
        self.depth += 1;
        if self.depth > MAX_NESTING_DEPTH {
            return Err(ParserError::NestingTooDeep(MAX_NESTING_DEPTH));
        }
        let res = match node {
            Node::Int(i, _) => (Micheline::Int(i.clone()), None),
            Node::String(s, _) => (Micheline::String(s.clone()), None),
            Node::Bytes(b, _) => (Micheline::Bytes(b.clone()), None),
            Node::Seq(xs, _) => (Micheline::Seq(self.children(xs)?), None),
            Node::App {
                name,
                args,
                anns,
                span,
            } => {
                let args = self.children(args)?;
                let anns = anns.clone().into_owned();
                self.resolve(name, args, anns, span)?
            }
        };
        self.depth -= 1;
        Ok(res)
    }

    fn resolve(
        &mut self,
        name: &str,
        args: &'a [Micheline<'a>],
        anns: crate::ast::Annotations<'a>,
        span: &Span,
    ) -> Result<(Micheline<'a>, Option<Origin<'a>>), ParserError> {
        let opts = self.options;
        if opts.expand_macros {
            if let (Ok(Prim::constant), Some(registry)) =
                (Prim::from_str(name), &opts.global_constants)
            {
                return self.inline_constant(registry, args, span);
            }
            if let Some(expanded) = expand_macro(self.arena, name, args, &anns, opts.protocol)? {
                let origin = Origin::Macro {
                    name: name.to_owned(),
                    args,
                    annotations: anns,
                };
                return Ok((expanded, Some(origin)));
            }
        }
        match Prim::from_str(name) {
            Ok(prim) => Ok((Micheline::App(prim, args, anns), None)),
            Err(_) => Err(ParserError::UnknownPrim {
                name: name.to_owned(),
                position: span.start,
            }),
        }
    }

    fn inline_constant(
        &mut self,
        registry: &GlobalConstants,
        args: &'a [Micheline<'a>],
        span: &Span,
    ) -> Result<(Micheline<'a>, Option<Origin<'a>>), ParserError> {
        let [Micheline::String(hash)] = args else {
            return Err(ParserError::MalformedConstant);
        };
        let value = registry
            .get(hash)
            .ok_or_else(|| ParserError::UnknownGlobalConstant(hash.clone()))?;
        tracing::debug!(%hash, "inlining global constant");
        let body = json::node_from_json(value)?;
        let outer = self.constant_span.replace(span.clone());
        let res = self.rewrite(&body);
        self.constant_span = outer;
        let (res, _) = res?;
        Ok((res, Some(Origin::GlobalConstant { hash: hash.clone() })))
    }
}

#[cfg(test)]
pub mod test_helpers {
    use super::*;

    fn leak(options: ParserOptions) -> &'static Parser<'static> {
        Box::leak(Box::new(Parser::with_options(options)))
    }

    pub fn parse(s: &str) -> Result<Micheline<'static>, ParserError> {
        leak(ParserOptions::default()).parse(s)
    }

    pub fn parse_with_protocol(
        s: &str,
        protocol: Protocol,
    ) -> Result<Micheline<'static>, ParserError> {
        leak(ParserOptions {
            protocol,
            ..ParserOptions::default()
        })
        .parse(s)
    }

    /// Parse without macro expansion, panicking on failure.
    pub fn parse_core(s: &str) -> Micheline<'static> {
        leak(ParserOptions {
            expand_macros: false,
            ..ParserOptions::default()
        })
        .parse(s)
        .unwrap()
    }

    pub fn parse_contract_script(s: &str) -> Result<Micheline<'static>, ParserError> {
        leak(ParserOptions::default())
            .parse_script(s)
            .map(|x| x.unwrap_or(Micheline::Seq(&[])))
    }
}
