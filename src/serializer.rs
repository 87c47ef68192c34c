/******************************************************************************/
/*                                                                            */
/* SPDX-License-Identifier: MIT                                               */
/* Copyright (c) [2023] Serokell <hi@serokell.io>                             */
/*                                                                            */
/******************************************************************************/

//! Serialization to and deserialization from bytes. Used for `PACK` and
//! `UNPACK` instructions respectively, but can be used for general-purpose
//! Michelson data serialization as well.
//!
//! The generic codec is defined as associated functions on
//! [crate::ast::Micheline] (`encode`, `encode_for_pack`, `decode_raw`,
//! `decode_packed`). The functions in this module add the type-directed
//! optimized forms on top, see [typed].

mod constants;
mod decode;
mod encode;
pub mod typed;

pub use decode::*;

use typed_arena::Arena;

use crate::ast::{Address, ByteReprError, ByteReprTrait, Key, KeyHash, Micheline};
use crate::tezos_id::{blake2b_digest, encode_tezos_id, TezosIdKind};

#[derive(Debug, PartialEq, Eq, Clone, thiserror::Error)]
pub enum PackError {
    #[error(transparent)]
    DecodeError(#[from] DecodeError),
    #[error("invalid {ty} literal {literal}: {reason}")]
    InvalidLiteral {
        ty: &'static str,
        literal: String,
        reason: String,
    },
    #[error("expected a bytes literal, but got {0}")]
    ExpectedBytes(String),
    #[error(transparent)]
    ByteReprError(#[from] ByteReprError),
}

/// `PACK` data. When `ty` is given, the data is converted to its optimized
/// form first, as the protocol does for the `PACK` instruction.
#[tracing::instrument(level = "debug", skip_all, err)]
pub fn pack_data(data: &Micheline, ty: Option<&Micheline>) -> Result<Vec<u8>, PackError> {
    let arena = Arena::new();
    let optimized = typed::optimize(&arena, data, ty)?;
    Ok(optimized.encode_for_pack())
}

/// Like [pack_data], rendered as a hex string without the `0x` prefix.
pub fn pack_data_hex(data: &Micheline, ty: Option<&Micheline>) -> Result<String, PackError> {
    pack_data(data, ty).map(hex::encode)
}

/// Like [pack_data], returning a bytes literal.
pub fn pack_data_bytes<'a>(
    data: &Micheline,
    ty: Option<&Micheline>,
) -> Result<Micheline<'a>, PackError> {
    pack_data(data, ty).map(Micheline::Bytes)
}

/// `UNPACK` bytes produced by [pack_data]. When `ty` is given, optimized
/// literals are converted back to their readable form.
#[tracing::instrument(level = "debug", skip_all, fields(len = bytes.len()), err)]
pub fn unpack_data<'a>(
    arena: &'a Arena<Micheline<'a>>,
    bytes: &[u8],
    ty: Option<&Micheline>,
) -> Result<Micheline<'a>, PackError> {
    let raw = Micheline::decode_packed(arena, bytes).map_err(|e| {
        tracing::debug!(error = %e, "could not decode packed data");
        e
    })?;
    typed::unoptimize(arena, &raw, ty)
}

/// Like [unpack_data], taking a bytes literal.
pub fn unpack_data_bytes<'a>(
    arena: &'a Arena<Micheline<'a>>,
    bytes: &Micheline,
    ty: Option<&Micheline>,
) -> Result<Micheline<'a>, PackError> {
    unpack_data(arena, as_bytes(bytes)?, ty)
}

/// Script expression hash of binary data, i.e. `expr...` base58check of its
/// blake2b-256 digest. Usually applied to the output of [pack_data].
pub fn script_expr_hash(bytes: &[u8]) -> String {
    let digest = blake2b_digest::<32>(bytes);
    // digest size always matches the kind
    encode_tezos_id(TezosIdKind::ScriptExprHash, &digest).unwrap_or_default()
}

/// Decode the binary form of an `address` held in a bytes literal.
pub fn decode_address_bytes(bytes: &Micheline) -> Result<Address, PackError> {
    Ok(Address::from_bytes(as_bytes(bytes)?)?)
}

/// Decode the binary form of a `key` held in a bytes literal.
pub fn decode_public_key_bytes(bytes: &Micheline) -> Result<Key, PackError> {
    Ok(Key::from_bytes(as_bytes(bytes)?)?)
}

/// Decode the binary form of a `key_hash` held in a bytes literal.
pub fn decode_public_key_hash_bytes(bytes: &Micheline) -> Result<KeyHash, PackError> {
    Ok(KeyHash::from_bytes(as_bytes(bytes)?)?)
}

fn as_bytes<'b>(node: &'b Micheline) -> Result<&'b [u8], PackError> {
    match node {
        Micheline::Bytes(b) => Ok(b),
        other => Err(PackError::ExpectedBytes(other.kind_name())),
    }
}
