/******************************************************************************/
/*                                                                            */
/* SPDX-License-Identifier: MIT                                               */
/* Copyright (c) [2023] Serokell <hi@serokell.io>                             */
/*                                                                            */
/******************************************************************************/

//! Rendering Micheline back to text.
//!
//! The output is accepted by [crate::parser::Parser]; parsing it gives back an
//! equal tree. With [FormatOptions::fold_macros] and a [Provenance] table,
//! expanded macros and inlined global constants are printed in their source
//! form instead.

use std::fmt::{self, Write};

use crate::ast::{Micheline, Origin, Provenance};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormatOptions {
    /// Indentation unit for nested sequence items. Only used when `newline`
    /// is non-empty.
    pub indent: String,
    /// Separator placed after `;` in sequences. Empty means compact output on
    /// a single line.
    pub newline: String,
    /// Print macros and global constants as written, when provenance is
    /// available.
    pub fold_macros: bool,
}

impl Default for FormatOptions {
    fn default() -> Self {
        FormatOptions {
            indent: String::new(),
            newline: String::new(),
            fold_macros: false,
        }
    }
}

impl FormatOptions {
    /// Multi-line output indented with `width` spaces per level.
    pub fn indented(width: usize) -> Self {
        FormatOptions {
            indent: " ".repeat(width),
            newline: "\n".to_owned(),
            fold_macros: false,
        }
    }

    fn is_compact(&self) -> bool {
        self.newline.is_empty()
    }
}

/// Render an expression.
pub fn emit_micheline(expr: &Micheline, options: &FormatOptions) -> String {
    let mut out = String::new();
    // writing to a String does not fail
    let _ = Emitter {
        options,
        provenance: None,
        out: &mut out,
    }
    .node(expr, 0, Position::Top);
    out
}

/// Render an expression, consulting `provenance` to fold macros and
/// constants back when [FormatOptions::fold_macros] is set. `expr` must be a
/// node of the tree `provenance` was recorded for.
pub fn emit_with_provenance(
    expr: &Micheline,
    provenance: &Provenance,
    options: &FormatOptions,
) -> String {
    let mut out = String::new();
    let _ = Emitter {
        options,
        provenance: Some(provenance),
        out: &mut out,
    }
    .node(expr, 0, Position::Top);
    out
}

/// Escape a string for a Micheline string literal, without the quotes.
pub fn escape_string(s: &str) -> String {
    let mut res = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '"' => res.push_str("\\\""),
            '\\' => res.push_str("\\\\"),
            '\n' => res.push_str("\\n"),
            '\r' => res.push_str("\\r"),
            '\t' => res.push_str("\\t"),
            '\x08' => res.push_str("\\b"),
            c => res.push(c),
        }
    }
    res
}

impl fmt::Display for Micheline<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&emit_micheline(self, &FormatOptions::default()))
    }
}

/// Where a node is printed. Applications with arguments or annotations need
/// parentheses only as arguments of another application.
#[derive(Clone, Copy, PartialEq, Eq)]
enum Position {
    Top,
    SeqItem,
    Arg,
}

struct Emitter<'o, 'p, 'w> {
    options: &'o FormatOptions,
    provenance: Option<&'p Provenance<'p>>,
    out: &'w mut String,
}

impl<'p> Emitter<'_, 'p, '_> {
    fn origin(&self, node: &Micheline) -> Option<&'p Origin<'p>> {
        if !self.options.fold_macros {
            return None;
        }
        let provenance: &'p Provenance<'p> = self.provenance?;
        provenance.origin(node)
    }

    fn node(&mut self, node: &Micheline, depth: usize, pos: Position) -> fmt::Result {
        if let Some(origin) = self.origin(node) {
            return match origin {
                Origin::Macro {
                    name,
                    args,
                    annotations,
                } => {
                    let anns = annotations.to_string();
                    self.application(name, &anns, args, depth, pos)
                }
                Origin::GlobalConstant { hash } => {
                    let arg = Micheline::String(hash.clone());
                    self.application("constant", "", std::slice::from_ref(&arg), depth, pos)
                }
            };
        }
        match node {
            Micheline::Int(i) => write!(self.out, "{i}"),
            Micheline::String(s) => write!(self.out, "\"{}\"", escape_string(s)),
            Micheline::Bytes(b) => write!(self.out, "0x{}", hex::encode(b)),
            Micheline::Seq(xs) => self.sequence(xs, depth),
            Micheline::App(prim, args, anns) => {
                let anns = anns.to_string();
                self.application(prim.as_ref(), &anns, args, depth, pos)
            }
        }
    }

    fn application(
        &mut self,
        name: &str,
        anns: &str,
        args: &[Micheline],
        depth: usize,
        pos: Position,
    ) -> fmt::Result {
        let parens = pos == Position::Arg && (!args.is_empty() || !anns.is_empty());
        if parens {
            self.out.push('(');
        }
        self.out.push_str(name);
        if !anns.is_empty() {
            write!(self.out, " {anns}")?;
        }
        for arg in args {
            self.out.push(' ');
            self.node(arg, depth, Position::Arg)?;
        }
        if parens {
            self.out.push(')');
        }
        Ok(())
    }

    fn sequence(&mut self, xs: &[Micheline], depth: usize) -> fmt::Result {
        if xs.is_empty() {
            self.out.push_str("{}");
            return Ok(());
        }
        self.out.push_str("{ ");
        for (i, x) in xs.iter().enumerate() {
            if i > 0 {
                self.out.push_str(" ;");
                if self.options.is_compact() {
                    self.out.push(' ');
                } else {
                    self.out.push_str(&self.options.newline);
                    for _ in 0..=depth {
                        self.out.push_str(&self.options.indent);
                    }
                }
            }
            self.node(x, depth + 1, Position::SeqItem)?;
        }
        self.out.push_str(" }");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::micheline::test_helpers::*;
    use crate::parser::test_helpers::parse;
    use crate::parser::Parser;

    #[track_caller]
    fn check(src: &str, expected: &str) {
        assert_eq!(
            emit_micheline(&parse(src).unwrap(), &FormatOptions::default()),
            expected
        );
    }

    #[test]
    fn compact() {
        check("Pair 1 2", "Pair 1 2");
        check("(Pair 1 (Pair 2 3))", "Pair 1 (Pair 2 3)");
        check("{}", "{}");
        check("{ DROP ; PUSH int -1 }", "{ DROP ; PUSH int -1 }");
        check("(pair (int %a) (nat :n))", "pair (int %a) (nat :n)");
        check("Some Unit", "Some Unit");
        check("0xAB01", "0xab01");
        check("{ UNIT @u }", "{ UNIT @u }");
    }

    #[test]
    fn strings_are_escaped() {
        check(r#""a\"b\\c\nd""#, r#""a\"b\\c\nd""#);
        assert_eq!(app!(Pair["x\ty", 1]).to_string(), r#"Pair "x\ty" 1"#);
    }

    #[test]
    fn indented() {
        let expr = parse("{ DROP ; IF { PUSH int 1 ; DROP } {} }").unwrap();
        assert_eq!(
            emit_micheline(&expr, &FormatOptions::indented(2)),
            "{ DROP ;\n  IF { PUSH int 1 ;\n    DROP } {} }"
        );
    }

    #[test]
    fn fold_macros() {
        let parser = Parser::new();
        let (root, provenance) = parser
            .parse_with_provenance("{ CMPEQ ; DIIP { DROP } ; UNIT }")
            .unwrap();
        let folded = FormatOptions {
            fold_macros: true,
            ..FormatOptions::default()
        };
        assert_eq!(
            emit_with_provenance(root, &provenance, &folded),
            "{ CMPEQ ; DIIP { DROP } ; UNIT }"
        );
        assert_eq!(
            emit_with_provenance(root, &provenance, &FormatOptions::default()),
            emit_micheline(root, &FormatOptions::default())
        );
        assert!(!emit_micheline(root, &FormatOptions::default()).contains("CMPEQ"));
    }

    #[test]
    fn seq_helper_renders() {
        assert_eq!(seq! {app!(DROP); app!(UNIT)}.to_string(), "{ DROP ; UNIT }");
    }
}
