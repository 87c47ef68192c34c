/******************************************************************************/
/*                                                                            */
/* SPDX-License-Identifier: MIT                                               */
/* Copyright (c) [2023] Serokell <hi@serokell.io>                             */
/*                                                                            */
/******************************************************************************/

//! Recognition of macro names. Expansion lives in [crate::parser::macros].

use std::str::FromStr;

use logos::*;

use super::errors::*;
use super::Prim;

/// Macro names and the data encoded in them. Comparison macros carry the
/// comparison instruction, path macros the `A`/`D` letters between `C` and
/// `R`, and comb macros the letters between the leading `P` and trailing `R`.
#[derive(Debug, Clone, PartialEq, Eq, Logos)]
#[allow(non_camel_case_types, clippy::upper_case_acronyms)]
#[logos(error = LexerError)]
pub enum Macro {
    #[regex("CMP(EQ|NEQ|LT|GT|LE|GE)", |lex| cmp_op(&lex.slice()[3..]))]
    CMP(Prim),
    #[regex("IF(EQ|NEQ|LT|GT|LE|GE)", |lex| cmp_op(&lex.slice()[2..]))]
    IF(Prim),
    #[regex("IFCMP(EQ|NEQ|LT|GT|LE|GE)", |lex| cmp_op(&lex.slice()[5..]))]
    IFCMP(Prim),
    #[token("FAIL")]
    FAIL,
    #[token("ASSERT")]
    ASSERT,
    #[regex("ASSERT_(EQ|NEQ|LT|GT|LE|GE)", |lex| cmp_op(&lex.slice()[7..]))]
    ASSERT_OP(Prim),
    #[regex("ASSERT_CMP(EQ|NEQ|LT|GT|LE|GE)", |lex| cmp_op(&lex.slice()[10..]))]
    ASSERT_CMP(Prim),
    #[token("ASSERT_NONE")]
    ASSERT_NONE,
    #[token("ASSERT_SOME")]
    ASSERT_SOME,
    #[token("ASSERT_LEFT")]
    ASSERT_LEFT,
    #[token("ASSERT_RIGHT")]
    ASSERT_RIGHT,
    #[token("IF_SOME")]
    IF_SOME,
    #[token("IF_RIGHT")]
    IF_RIGHT,
    #[regex("DII+P", |lex| lex.slice().len() - 2)]
    DIIP(usize),
    #[regex("DUU+P", |lex| lex.slice().len() - 2)]
    DUUP(usize),
    #[regex("C[AD]+R", |lex| inner(lex.slice(), 1))]
    CADR(String),
    #[regex("SET_C[AD]+R", |lex| inner(lex.slice(), 5))]
    SET_CADR(String),
    #[regex("MAP_C[AD]+R", |lex| inner(lex.slice(), 5))]
    MAP_CADR(String),
    #[regex("P[PAI]+R", |lex| inner(lex.slice(), 1))]
    PAPAIR(String),
    #[regex("UNP[PAI]+R", |lex| inner(lex.slice(), 3))]
    UNPAPAIR(String),
}

fn cmp_op(s: &str) -> Option<Prim> {
    Prim::from_str(s).ok()
}

fn inner(s: &str, prefix: usize) -> String {
    s[prefix..s.len() - 1].to_owned()
}

impl Macro {
    /// Recognize a macro name. The whole string must be a single macro token.
    pub fn recognize(name: &str) -> Option<Macro> {
        let mut lex = Macro::lexer(name);
        match lex.next() {
            Some(Ok(m)) if lex.span().end == name.len() => Some(m),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognize() {
        assert_eq!(Macro::recognize("CMPNEQ"), Some(Macro::CMP(Prim::NEQ)));
        assert_eq!(Macro::recognize("IFGE"), Some(Macro::IF(Prim::GE)));
        assert_eq!(
            Macro::recognize("ASSERT_CMPLT"),
            Some(Macro::ASSERT_CMP(Prim::LT))
        );
        assert_eq!(Macro::recognize("ASSERT_EQ"), Some(Macro::ASSERT_OP(Prim::EQ)));
        assert_eq!(Macro::recognize("DIIIP"), Some(Macro::DIIP(3)));
        assert_eq!(Macro::recognize("DUUP"), Some(Macro::DUUP(2)));
        assert_eq!(Macro::recognize("CADDR"), Some(Macro::CADR("ADD".to_owned())));
        assert_eq!(
            Macro::recognize("SET_CDAR"),
            Some(Macro::SET_CADR("DA".to_owned()))
        );
        assert_eq!(
            Macro::recognize("PAPPAIIR"),
            Some(Macro::PAPAIR("APPAII".to_owned()))
        );
        assert_eq!(
            Macro::recognize("UNPAPAIR"),
            Some(Macro::UNPAPAIR("APAI".to_owned()))
        );
        assert_eq!(Macro::recognize("CMPEQX"), None);
        assert_eq!(Macro::recognize("DROP"), None);
        assert_eq!(Macro::recognize("IF_NONE"), None);
    }
}
