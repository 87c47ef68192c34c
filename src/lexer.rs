/******************************************************************************/
/*                                                                            */
/* SPDX-License-Identifier: MIT                                               */
/* Copyright (c) [2023] Serokell <hi@serokell.io>                             */
/*                                                                            */
/******************************************************************************/

//! Micheline tokens, the primitive table and annotations.

pub mod errors;
pub mod macros;

use std::borrow::Cow;

use logos::Logos;
use num_bigint::BigInt;
use strum_macros::{AsRefStr, Display, EnumCount, EnumString};

pub use errors::*;

macro_rules! defprim {
    ($($prim:ident),* $(,)*) => {
        /// Michelson primitives.
        ///
        /// The discriminant of each variant is its binary tag, so the order of
        /// the variants is part of the wire format. New primitives are only
        /// ever appended.
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, EnumCount, EnumString,
            Display, AsRefStr,
        )]
        #[allow(non_camel_case_types, clippy::upper_case_acronyms)]
        #[repr(u8)]
        pub enum Prim {
            $($prim),*
        }
    };
}

defprim! {
    parameter,
    storage,
    code,
    False,
    Elt,
    Left,
    None,
    Pair,
    Right,
    Some,
    True,
    Unit,
    PACK,
    UNPACK,
    BLAKE2B,
    SHA256,
    SHA512,
    ABS,
    ADD,
    AMOUNT,
    AND,
    BALANCE,
    CAR,
    CDR,
    CHECK_SIGNATURE,
    COMPARE,
    CONCAT,
    CONS,
    CREATE_ACCOUNT,
    CREATE_CONTRACT,
    IMPLICIT_ACCOUNT,
    DIP,
    DROP,
    DUP,
    EDIV,
    EMPTY_MAP,
    EMPTY_SET,
    EQ,
    EXEC,
    FAILWITH,
    GE,
    GET,
    GT,
    HASH_KEY,
    IF,
    IF_CONS,
    IF_LEFT,
    IF_NONE,
    INT,
    LAMBDA,
    LE,
    LEFT,
    LOOP,
    LSL,
    LSR,
    LT,
    MAP,
    MEM,
    MUL,
    NEG,
    NEQ,
    NIL,
    NONE,
    NOT,
    NOW,
    OR,
    PAIR,
    PUSH,
    RIGHT,
    SIZE,
    SOME,
    SOURCE,
    SENDER,
    SELF,
    STEPS_TO_QUOTA,
    SUB,
    SWAP,
    TRANSFER_TOKENS,
    SET_DELEGATE,
    UNIT,
    UPDATE,
    XOR,
    ITER,
    LOOP_LEFT,
    ADDRESS,
    CONTRACT,
    ISNAT,
    CAST,
    RENAME,
    bool,
    contract,
    int,
    key,
    key_hash,
    lambda,
    list,
    map,
    big_map,
    nat,
    option,
    or,
    pair,
    set,
    signature,
    string,
    bytes,
    mutez,
    timestamp,
    unit,
    operation,
    address,
    SLICE,
    DIG,
    DUG,
    EMPTY_BIG_MAP,
    APPLY,
    chain_id,
    CHAIN_ID,
    LEVEL,
    SELF_ADDRESS,
    never,
    NEVER,
    UNPAIR,
    VOTING_POWER,
    TOTAL_VOTING_POWER,
    KECCAK,
    SHA3,
    PAIRING_CHECK,
    bls12_381_g1,
    bls12_381_g2,
    bls12_381_fr,
    sapling_state,
    sapling_transaction_deprecated,
    SAPLING_EMPTY_STATE,
    SAPLING_VERIFY_UPDATE,
    ticket,
    TICKET_DEPRECATED,
    READ_TICKET,
    SPLIT_TICKET,
    JOIN_TICKETS,
    GET_AND_UPDATE,
    chest,
    chest_key,
    OPEN_CHEST,
    VIEW,
    view,
    constant,
    SUB_MUTEZ,
    tx_rollup_l2_address,
    MIN_BLOCK_TIME,
    sapling_transaction,
    EMIT,
    Lambda_rec,
    LAMBDA_REC,
    TICKET,
    BYTES,
    NAT,
    Ticket,
}

impl Prim {
    /// Binary tag of the primitive.
    pub fn tag(self) -> u8 {
        self as u8
    }

    /// Inverse of [Prim::tag].
    pub fn from_tag(tag: u8) -> Option<Prim> {
        use strum::EnumCount;
        if (tag as usize) < Prim::COUNT {
            // SAFETY: Prim is repr(u8), and we checked it's within bounds.
            Some(unsafe { std::mem::transmute::<u8, Prim>(tag) })
        } else {
            None
        }
    }
}

/// A single annotation. The stored string excludes the leading sigil, except
/// for the special forms, which are stored verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Annotation<'a> {
    /// `@%`, `@%%` or `%@`.
    Special(Cow<'a, str>),
    Field(Cow<'a, str>),
    Variable(Cow<'a, str>),
    Type(Cow<'a, str>),
}

impl<'a> Annotation<'a> {
    pub fn into_owned(self) -> Annotation<'static> {
        match self {
            Annotation::Special(s) => Annotation::Special(Cow::Owned(s.into_owned())),
            Annotation::Field(s) => Annotation::Field(Cow::Owned(s.into_owned())),
            Annotation::Variable(s) => Annotation::Variable(Cow::Owned(s.into_owned())),
            Annotation::Type(s) => Annotation::Type(Cow::Owned(s.into_owned())),
        }
    }

    pub fn is_special(&self) -> bool {
        matches!(self, Annotation::Special(_))
    }
}

impl std::fmt::Display for Annotation<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Annotation::Special(s) => write!(f, "{s}"),
            Annotation::Field(s) => write!(f, "%{s}"),
            Annotation::Variable(s) => write!(f, "@{s}"),
            Annotation::Type(s) => write!(f, ":{s}"),
        }
    }
}

/// Special variable annotation requesting the field name as variable name.
pub const ANN_VAR_FIELD: &str = "@%";
/// Special variable annotation requesting `parent.field` as variable name.
pub const ANN_VAR_PARENT_FIELD: &str = "@%%";
/// Special field annotation requesting the variable name as field name.
pub const ANN_FIELD_VAR: &str = "%@";

fn is_ann_body(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        None => true,
        Some(c) if c == '_' || c.is_ascii_alphanumeric() => chars
            .all(|c| c == '_' || c == '.' || c == '%' || c == '@' || c.is_ascii_alphanumeric()),
        Some(_) => false,
    }
}

/// Parse an annotation from its textual form.
///
/// Accepts `@%|@%%|%@|[@:%]([_0-9a-zA-Z][_0-9a-zA-Z\.%@]*)?`.
pub fn try_ann_from_str(s: &str) -> Option<Annotation<'_>> {
    match s {
        ANN_VAR_FIELD | ANN_VAR_PARENT_FIELD | ANN_FIELD_VAR => {
            return Some(Annotation::Special(Cow::Borrowed(s)))
        }
        _ => {}
    }
    let body = &s.get(1..)?;
    if !is_ann_body(body) {
        return None;
    }
    let body = Cow::Borrowed(*body);
    match s.as_bytes()[0] {
        b'@' => Some(Annotation::Variable(body)),
        b'%' => Some(Annotation::Field(body)),
        b':' => Some(Annotation::Type(body)),
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Logos)]
#[logos(error = LexerError, skip r"[ \t\r\n\v\f]+")]
pub enum Tok<'a> {
    /// Primitive names, macro names and annotations.
    #[regex(r"[:@%_A-Za-z][@%_.A-Za-z0-9]*", |lex| lex.slice())]
    Ident(&'a str),

    #[regex("-?[0-9]+", lex_number)]
    Number(BigInt),

    #[regex(r#""(\\.|[^\\"])*""#, lex_string)]
    String(String),

    #[regex("0x[0-9a-fA-F]*", lex_bytes)]
    Bytes(Vec<u8>),

    #[regex(r"#[^\n]*", |lex| lex.slice())]
    #[regex(r"/\*([^*]|\*+[^*/])*\*+/", |lex| lex.slice())]
    Comment(&'a str),

    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,
    #[token(";")]
    Semi,
}

impl std::fmt::Display for Tok<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self {
            Tok::Ident(s) => write!(f, "{s}"),
            Tok::Number(n) => n.fmt(f),
            Tok::String(s) => write!(f, "{s:?}"),
            Tok::Bytes(b) => write!(f, "0x{}", hex::encode(b)),
            Tok::Comment(_) => write!(f, "<comment>"),
            Tok::LParen => write!(f, "("),
            Tok::RParen => write!(f, ")"),
            Tok::LBrace => write!(f, "{{"),
            Tok::RBrace => write!(f, "}}"),
            Tok::Semi => write!(f, ";"),
        }
    }
}

fn lex_number<'a>(lex: &mut logos::Lexer<'a, Tok<'a>>) -> Result<BigInt, LexerError> {
    lex.slice()
        .parse()
        .map_err(|_| LexerError::NumericLiteral(lex.slice().to_owned()))
}

fn lex_bytes<'a>(lex: &mut logos::Lexer<'a, Tok<'a>>) -> Result<Vec<u8>, LexerError> {
    let digits = &lex.slice()[2..];
    if digits.len() % 2 != 0 {
        return Err(LexerError::OddBytesLength(lex.slice().to_owned()));
    }
    hex::decode(digits).map_err(|_| LexerError::OddBytesLength(lex.slice().to_owned()))
}

/// Takes a string _with_ the surrounding quotes, strips the quotes, checks the
/// string is valid (i.e. contains only printable ASCII characters) and replaces
/// escapes with corresponding characters.
fn lex_string<'a>(lex: &mut logos::Lexer<'a, Tok<'a>>) -> Result<String, LexerError> {
    unescape_string(lex.slice())
}

pub(crate) fn unescape_string(quoted: &str) -> Result<String, LexerError> {
    let s = &quoted[1..quoted.len() - 1];

    if !s.chars().all(|c| matches!(c, ' '..='~')) {
        return Err(LexerError::ForbiddenCharacterIn(s.to_owned()));
    }

    let mut res = String::with_capacity(s.len());
    let unescape_char = |c| match c {
        'n' => Ok('\n'),
        'r' => Ok('\r'),
        't' => Ok('\t'),
        'b' => Ok('\x08'),
        '"' => Ok('"'),
        '\\' => Ok('\\'),
        _ => Err(LexerError::UndefinedEscape(c)),
    };

    let mut in_escape: bool = false;
    for c in s.chars() {
        if in_escape {
            res.push(unescape_char(c)?);
            in_escape = false;
        } else if c == '\\' {
            in_escape = true;
        } else {
            res.push(c);
        }
    }
    Ok(res)
}

/// Byte span of a token in the source text.
pub type Span = std::ops::Range<usize>;

/// Lazy token stream over a source string.
///
/// Whitespace is skipped, comments are dropped unless `surface_comments` is
/// set. Errors carry the source position.
pub struct Scanner<'a> {
    src: &'a str,
    tokens: logos::SpannedIter<'a, Tok<'a>>,
    surface_comments: bool,
}

impl<'a> Scanner<'a> {
    pub fn new(src: &'a str) -> Self {
        Scanner {
            src,
            tokens: Tok::lexer(src).spanned(),
            surface_comments: false,
        }
    }

    pub fn with_comments(mut self, surface_comments: bool) -> Self {
        self.surface_comments = surface_comments;
        self
    }

    fn refine_error(&self, err: LexerError, span: &Span) -> LexerError {
        if err != LexerError::UnknownToken {
            return err;
        }
        let rest = &self.src[span.start..];
        match rest.chars().next() {
            Some('"') => LexerError::UnterminatedString(span.start),
            Some('/') if rest.starts_with("/*") => LexerError::UnterminatedComment(span.start),
            Some(character) => LexerError::InvalidCharacter {
                position: span.start,
                character,
            },
            None => err,
        }
    }
}

impl<'a> Iterator for Scanner<'a> {
    type Item = Result<(Tok<'a>, Span), LexerError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let (res, span) = self.tokens.next()?;
            return Some(match res {
                Ok(Tok::Comment(_)) if !self.surface_comments => continue,
                Ok(tok) => Ok((tok, span)),
                Err(err) => Err(self.refine_error(err, &span)),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn toks(src: &str) -> Result<Vec<Tok<'_>>, LexerError> {
        Scanner::new(src).map(|r| r.map(|(t, _)| t)).collect()
    }

    #[test]
    fn prim_tags() {
        assert_eq!(Prim::parameter.tag(), 0);
        assert_eq!(Prim::Unit.tag(), 0x0b);
        assert_eq!(Prim::DROP.tag(), 0x20);
        assert_eq!(Prim::LAMBDA.tag(), 0x31);
        assert_eq!(Prim::int.tag(), 0x5b);
        assert_eq!(Prim::pair.tag(), 0x65);
        assert_eq!(Prim::unit.tag(), 0x6c);
        assert_eq!(Prim::address.tag(), 0x6e);
        assert_eq!(Prim::UNPAIR.tag(), 0x7a);
        assert_eq!(Prim::EMIT.tag(), 0x97);
        assert_eq!(Prim::Ticket.tag(), 0x9d);
        assert_eq!(Prim::from_tag(0x9d), Some(Prim::Ticket));
        assert_eq!(Prim::from_tag(0x9e), None);
    }

    #[test]
    fn prim_names() {
        assert_eq!(Prim::from_str("IF_NONE"), Ok(Prim::IF_NONE));
        assert_eq!(Prim::from_str("Lambda_rec"), Ok(Prim::Lambda_rec));
        assert!(Prim::from_str("PAPAIR").is_err());
        assert_eq!(Prim::bls12_381_fr.to_string(), "bls12_381_fr");
    }

    #[test]
    fn basic_tokens() {
        assert_eq!(
            toks("{ PUSH @x int -12 ; }").unwrap(),
            vec![
                Tok::LBrace,
                Tok::Ident("PUSH"),
                Tok::Ident("@x"),
                Tok::Ident("int"),
                Tok::Number((-12).into()),
                Tok::Semi,
                Tok::RBrace
            ]
        );
        assert_eq!(
            toks("0x00ff 0x").unwrap(),
            vec![Tok::Bytes(vec![0, 0xff]), Tok::Bytes(vec![])]
        );
    }

    #[test]
    fn comments() {
        assert_eq!(
            toks("UNIT # trailing\n/* block\n * comment */ DROP").unwrap(),
            vec![Tok::Ident("UNIT"), Tok::Ident("DROP")]
        );
        let surfaced: Vec<_> = Scanner::new("# hi\nUNIT")
            .with_comments(true)
            .map(|r| r.unwrap().0)
            .collect();
        assert_eq!(surfaced, vec![Tok::Comment("# hi"), Tok::Ident("UNIT")]);
    }

    #[test]
    fn unescape_string() {
        assert_eq!(toks(r#""bar""#), Ok(vec![Tok::String("bar".to_owned())]));
        assert_eq!(
            toks(r#""foo\nbar""#),
            Ok(vec![Tok::String("foo\nbar".to_owned())])
        );
        assert_eq!(
            toks(r#""foo\"bar\"""#),
            Ok(vec![Tok::String("foo\"bar\"".to_owned())])
        );
        assert_eq!(
            toks(r#""foo\\\\bar""#),
            Ok(vec![Tok::String("foo\\\\bar".to_owned())])
        );
        // unicode is not accepted
        assert_eq!(
            toks(r#""हिन्दी""#).unwrap_err().to_string(),
            "forbidden character found in string literal \"हिन्दी\""
        );
        assert_eq!(
            toks(r#""\a""#).unwrap_err().to_string(),
            "undefined escape sequence: \"\\a\""
        );
    }

    #[test]
    fn scan_errors() {
        assert_eq!(toks(r#"""#), Err(LexerError::UnterminatedString(0)));
        assert_eq!(toks(r#"UNIT "\""#), Err(LexerError::UnterminatedString(5)));
        assert_eq!(
            toks("UNIT $"),
            Err(LexerError::InvalidCharacter {
                position: 5,
                character: '$'
            })
        );
        assert_eq!(
            toks("0xabc"),
            Err(LexerError::OddBytesLength("0xabc".to_owned()))
        );
        assert_eq!(toks("/* open"), Err(LexerError::UnterminatedComment(0)));
    }

    #[test]
    fn annotations() {
        assert_eq!(
            try_ann_from_str("@%%"),
            Some(Annotation::Special("@%%".into()))
        );
        assert_eq!(
            try_ann_from_str("%foo.bar"),
            Some(Annotation::Field("foo.bar".into()))
        );
        assert_eq!(try_ann_from_str("%"), Some(Annotation::Field("".into())));
        assert_eq!(try_ann_from_str(":.x"), None);
        assert_eq!(try_ann_from_str("int"), None);
    }
}
