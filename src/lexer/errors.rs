/******************************************************************************/
/*                                                                            */
/* SPDX-License-Identifier: MIT                                               */
/* Copyright (c) [2023] Serokell <hi@serokell.io>                             */
/*                                                                            */
/******************************************************************************/

//! Errors possible during the lexing stage.

/// Unknown primitive error
#[derive(Debug, PartialEq, Eq, Clone, thiserror::Error)]
#[error("unknown primitive: {0}")]
pub struct PrimError(pub String);

/// Errors possible during the lexing stage.
#[derive(Debug, PartialEq, Eq, Clone, thiserror::Error, Default)]
pub enum LexerError {
    /// Unrecognized token. Only produced by the raw token stream; the
    /// [super::Scanner] refines it into one of the positioned variants.
    #[error("unknown token")]
    #[default]
    UnknownToken,
    /// A character that can't start any token.
    #[error("invalid character {character:?} at position {position}")]
    InvalidCharacter { position: usize, character: char },
    /// String literal without the closing quote.
    #[error("unterminated string literal starting at position {0}")]
    UnterminatedString(usize),
    /// Block comment without the closing `*/`.
    #[error("unterminated comment starting at position {0}")]
    UnterminatedComment(usize),
    /// Byte literal with an odd number of hex digits.
    #[error("odd number of hex digits in byte literal {0}")]
    OddBytesLength(String),
    /// Parsing of a numeric literal failed.
    #[error("parsing of numeric literal {0} failed")]
    NumericLiteral(String),
    /// Found a forbidden character in a string literal.
    #[error("forbidden character found in string literal \"{0}\"")]
    ForbiddenCharacterIn(String),
    /// Found an undefined escape sequence in a string literal.
    #[error("undefined escape sequence: \"\\{0}\"")]
    UndefinedEscape(char),
    /// Unknown primitive.
    #[error(transparent)]
    PrimError(#[from] PrimError),
}
