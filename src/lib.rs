/******************************************************************************/
/*                                                                            */
/* SPDX-License-Identifier: MIT                                               */
/* Copyright (c) [2023] Serokell <hi@serokell.io>                             */
/*                                                                            */
/******************************************************************************/
#![warn(clippy::redundant_clone)]

//! # Michelson toolchain
//!
//! Parsing, validation, binary encoding and static type checking of Michelson
//! scripts and data, without an interpreter.
//!
//! # Usage
//!
//! The general pipeline is: parse → validate → typecheck, with pack/unpack
//! and pretty-printing available on any parsed tree.
//!
//! [parser::Parser] reads Michelson source text (macros and, optionally,
//! global constants get expanded on the way) or the JSON representation used
//! by node RPCs. The result is an arena-allocated [ast::Micheline] tree; since
//! Micheline represents any part of a script, the other stages are split by
//! what the tree is expected to be:
//!
//! - [validator] checks structural well-formedness of types, data,
//!   instructions and contracts.
//! - [typechecker::typecheck_data], [typechecker::function_type] and
//!   [typechecker::typecheck_script] check values, instructions and whole
//!   contracts against the rules of a given [protocol::Protocol], carried by
//!   [context::Ctx].
//! - [serializer::pack_data] and [serializer::unpack_data] convert data to and
//!   from the binary format of `PACK`.
//! - [emitter::emit_micheline] prints a tree back to text.
//!
//! ```
//! use michelson_toolchain::context::Ctx;
//! use michelson_toolchain::parser::Parser;
//! use michelson_toolchain::typechecker::typecheck_script;
//! let script = r#"
//! parameter nat;
//! storage int;
//! code { CAR ; INT ; PUSH int 0 ; DUP 2 ; GT ;
//!        IF { DIP { PUSH int -1 ; ADD } ;
//!             PUSH int 1 ;
//!             DUP 3 ;
//!             GT ;
//!             LOOP { SWAP ; DUP 2 ; ADD ; DIP 2 { PUSH int -1 ; ADD } ; DUP 3 ; GT } ;
//!             DIP { DROP 2 } }
//!           { DIP { DROP } };
//!         NIL operation;
//!         PAIR }
//! "#;
//! let parser = Parser::new();
//! let contract = parser.parse_script(script).unwrap().unwrap();
//! let checked = typecheck_script(&contract, &Ctx::default()).unwrap();
//! assert_eq!(checked.storage.to_string(), "int");
//! ```

pub mod ast;
pub mod context;
pub mod emitter;
pub mod lexer;
pub mod parser;
pub mod protocol;
pub mod serializer;
pub mod stack;
pub mod tezos_id;
pub mod typechecker;
pub mod validator;
