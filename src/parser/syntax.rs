/******************************************************************************/
/*                                                                            */
/* SPDX-License-Identifier: MIT                                               */
/* Copyright (c) [2023] Serokell <hi@serokell.io>                             */
/*                                                                            */
/******************************************************************************/

//! Recursive descent over the token stream, producing a raw tree.
//!
//! The raw tree keeps primitive names as written (macros are not resolved
//! yet) and remembers the source span of every node. [super::Parser] turns it
//! into [crate::ast::Micheline] in a single bottom-up rewrite.

use std::iter::Peekable;

use num_bigint::BigInt;

use super::{ParserError, MAX_NESTING_DEPTH};
use crate::ast::annotations::Annotations;
use crate::lexer::{try_ann_from_str, Scanner, Span, Tok};

/// Unresolved syntax node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node<'s> {
    Int(BigInt, Span),
    String(String, Span),
    Bytes(Vec<u8>, Span),
    App {
        name: &'s str,
        args: Vec<Node<'s>>,
        anns: Annotations<'s>,
        span: Span,
    },
    Seq(Vec<Node<'s>>, Span),
}

impl Node<'_> {
    pub fn span(&self) -> Span {
        match self {
            Node::Int(_, span)
            | Node::String(_, span)
            | Node::Bytes(_, span)
            | Node::Seq(_, span)
            | Node::App { span, .. } => span.clone(),
        }
    }
}

fn is_annotation(ident: &str) -> bool {
    ident.starts_with(&['@', '%', ':'][..])
}

pub struct RawParser<'s> {
    tokens: Peekable<Scanner<'s>>,
    depth: usize,
    last_end: usize,
}

impl<'s> RawParser<'s> {
    pub fn new(scanner: Scanner<'s>) -> Self {
        RawParser {
            tokens: scanner.peekable(),
            depth: 0,
            last_end: 0,
        }
    }

    /// Drop surfaced comments ahead of the next meaningful token.
    fn skip_comments(&mut self) {
        while let Some(Ok((Tok::Comment(_), _))) = self.tokens.peek() {
            self.tokens.next();
        }
    }

    fn peek(&mut self) -> Result<Option<&Tok<'s>>, ParserError> {
        self.skip_comments();
        if let Some(Err(_)) = self.tokens.peek() {
            if let Some(Err(e)) = self.tokens.next() {
                return Err(e.into());
            }
        }
        Ok(self.tokens.peek().and_then(|r| r.as_ref().ok()).map(|(t, _)| t))
    }

    fn next(&mut self) -> Result<Option<(Tok<'s>, Span)>, ParserError> {
        self.skip_comments();
        match self.tokens.next().transpose()? {
            Some((tok, span)) => {
                self.last_end = span.end;
                Ok(Some((tok, span)))
            }
            None => Ok(None),
        }
    }

    fn expect(&mut self, expected: Tok<'static>) -> Result<Span, ParserError> {
        match self.next()? {
            Some((tok, span)) if tok == expected => Ok(span),
            Some((tok, span)) => Err(ParserError::UnexpectedToken {
                token: tok.to_string(),
                position: span.start,
            }),
            None => Err(ParserError::UnexpectedEof),
        }
    }

    fn enter(&mut self) -> Result<(), ParserError> {
        self.depth += 1;
        if self.depth > MAX_NESTING_DEPTH {
            return Err(ParserError::NestingTooDeep(MAX_NESTING_DEPTH));
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.depth -= 1;
    }

    /// A whole document holding a single expression. A bare primitive at the
    /// top level takes the following tokens as its arguments.
    pub fn top_expression(&mut self) -> Result<Option<Node<'s>>, ParserError> {
        if self.peek()?.is_none() {
            return Ok(None);
        }
        let node = self.element()?;
        self.end()?;
        Ok(Some(node))
    }

    /// A whole document holding a sequence, with or without the surrounding
    /// braces. Returns the elements.
    pub fn top_sequence(&mut self) -> Result<Vec<Node<'s>>, ParserError> {
        let items = self.items()?;
        self.end()?;
        Ok(items)
    }

    fn end(&mut self) -> Result<(), ParserError> {
        match self.next()? {
            None => Ok(()),
            Some((tok, span)) => Err(ParserError::UnexpectedToken {
                token: tok.to_string(),
                position: span.start,
            }),
        }
    }

    /// `e1 ; e2 ; ...` up to a closing brace or the end of input. A trailing
    /// semicolon is allowed.
    fn items(&mut self) -> Result<Vec<Node<'s>>, ParserError> {
        let mut items = Vec::new();
        loop {
            match self.peek()? {
                None | Some(Tok::RBrace) => break,
                Some(_) => items.push(self.element()?),
            }
            match self.peek()? {
                Some(Tok::Semi) => {
                    self.next()?;
                }
                _ => break,
            }
        }
        Ok(items)
    }

    /// Sequence element: like an argument, except a primitive takes arguments
    /// without needing parentheses.
    fn element(&mut self) -> Result<Node<'s>, ParserError> {
        match self.peek()? {
            Some(Tok::Ident(name)) if !is_annotation(name) => {
                let name = *name;
                let (_, span) = self.next()?.ok_or(ParserError::UnexpectedEof)?;
                self.application(name, span.start)
            }
            _ => self.argument(),
        }
    }

    fn argument(&mut self) -> Result<Node<'s>, ParserError> {
        let (tok, span) = self.next()?.ok_or(ParserError::UnexpectedEof)?;
        match tok {
            Tok::Number(n) => Ok(Node::Int(n, span)),
            Tok::String(s) => Ok(Node::String(s, span)),
            Tok::Bytes(b) => Ok(Node::Bytes(b, span)),
            Tok::Ident(name) if !is_annotation(name) => Ok(Node::App {
                name,
                args: Vec::new(),
                anns: Annotations::new(),
                span,
            }),
            Tok::LBrace => {
                self.enter()?;
                let items = self.items()?;
                let close = self.expect(Tok::RBrace)?;
                self.leave();
                Ok(Node::Seq(items, span.start..close.end))
            }
            Tok::LParen => {
                self.enter()?;
                let node = match self.next()? {
                    Some((Tok::Ident(name), inner)) if !is_annotation(name) => {
                        self.application(name, inner.start)?
                    }
                    Some((tok, inner)) => {
                        return Err(ParserError::ExpectedIdentifier {
                            token: tok.to_string(),
                            position: inner.start,
                        })
                    }
                    None => return Err(ParserError::UnexpectedEof),
                };
                self.expect(Tok::RParen)?;
                self.leave();
                Ok(node)
            }
            tok => Err(ParserError::UnexpectedToken {
                token: tok.to_string(),
                position: span.start,
            }),
        }
    }

    /// Arguments and annotations following a primitive name, in any order.
    fn application(&mut self, name: &'s str, start: usize) -> Result<Node<'s>, ParserError> {
        let mut args = Vec::new();
        let mut anns = Annotations::new();
        loop {
            match self.peek()? {
                Some(Tok::Ident(ann)) if is_annotation(ann) => {
                    let ann = *ann;
                    let (_, span) = self.next()?.ok_or(ParserError::UnexpectedEof)?;
                    anns.push(try_ann_from_str(ann).ok_or_else(|| {
                        ParserError::InvalidAnnotation {
                            annotation: ann.to_owned(),
                            position: span.start,
                        }
                    })?);
                }
                Some(
                    Tok::Ident(_)
                    | Tok::Number(_)
                    | Tok::String(_)
                    | Tok::Bytes(_)
                    | Tok::LBrace
                    | Tok::LParen,
                ) => args.push(self.argument()?),
                _ => break,
            }
        }
        Ok(Node::App {
            name,
            args,
            anns,
            span: start..self.last_end,
        })
    }
}
