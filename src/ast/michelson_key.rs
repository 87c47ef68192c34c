/******************************************************************************/
/*                                                                            */
/* SPDX-License-Identifier: MIT                                               */
/* Copyright (c) [2023] Serokell <hi@serokell.io>                             */
/*                                                                            */
/******************************************************************************/

//! Representation for typed Michelson `key` values.

use super::byte_repr_trait::{unknown_tag, ByteReprError, ByteReprTrait};
use super::michelson_key_hash::{KeyHash, HASH_SIZE};
use crate::tezos_id::{blake2b_digest, decode_tezos_id, encode_tezos_id, TezosIdKind};

/// Tezos public key. Corresponds to the `key` Michelson type. The contained
/// bytes are the raw key, without the tag.
#[derive(Debug, Clone, Eq, PartialOrd, Ord, PartialEq, Hash)]
pub enum Key {
    /// Ed25519 public key, 32 bytes.
    Ed25519(Vec<u8>),
    /// Secp256k1 public key, 33 bytes.
    Secp256k1(Vec<u8>),
    /// P256 public key, 33 bytes.
    P256(Vec<u8>),
    /// BLS public key, 48 bytes.
    Bls(Vec<u8>),
}

const KINDS: [TezosIdKind; 4] = [
    TezosIdKind::Ed25519PublicKey,
    TezosIdKind::Secp256k1PublicKey,
    TezosIdKind::P256PublicKey,
    TezosIdKind::Bls12381PublicKey,
];

impl Key {
    /// Smallest key size when represented as raw bytes, tag included.
    pub const MIN_BYTE_SIZE: usize = 33;

    fn tag(&self) -> u8 {
        match self {
            Key::Ed25519(_) => 0,
            Key::Secp256k1(_) => 1,
            Key::P256(_) => 2,
            Key::Bls(_) => 3,
        }
    }

    fn from_tag(tag: u8, key: Vec<u8>) -> Result<Self, ByteReprError> {
        let kind = *KINDS.get(tag as usize).ok_or_else(|| unknown_tag(tag))?;
        if key.len() != kind.payload_len() {
            return Err(ByteReprError::WrongFormat(format!(
                "{kind} must be {} bytes long, but it is {} bytes long",
                kind.payload_len(),
                key.len()
            )));
        }
        Ok(match tag {
            0 => Key::Ed25519(key),
            1 => Key::Secp256k1(key),
            2 => Key::P256(key),
            _ => Key::Bls(key),
        })
    }

    /// Construct a [KeyHash] from the key, i.e. the blake2b 160-bit hash of
    /// the raw key bytes.
    pub fn hash(&self) -> KeyHash {
        let h = blake2b_digest::<HASH_SIZE>(self.as_ref());
        match self {
            Key::Ed25519(_) => KeyHash::Tz1(h),
            Key::Secp256k1(_) => KeyHash::Tz2(h),
            Key::P256(_) => KeyHash::Tz3(h),
            Key::Bls(_) => KeyHash::Tz4(h),
        }
    }
}

impl AsRef<[u8]> for Key {
    fn as_ref(&self) -> &[u8] {
        match self {
            Key::Ed25519(k) | Key::Secp256k1(k) | Key::P256(k) | Key::Bls(k) => k,
        }
    }
}

impl ByteReprTrait for Key {
    fn from_base58_check(data: &str) -> Result<Self, ByteReprError> {
        let (kind, payload) = decode_tezos_id(data, &KINDS)?;
        let tag = KINDS.iter().position(|k| *k == kind).unwrap_or_default() as u8;
        Self::from_tag(tag, payload)
    }

    fn from_bytes(bytes: &[u8]) -> Result<Self, ByteReprError> {
        match bytes.split_first() {
            Some((tag, key)) if bytes.len() >= Self::MIN_BYTE_SIZE => {
                Self::from_tag(*tag, key.to_vec())
            }
            _ => Err(ByteReprError::WrongFormat(format!(
                "key must be at least {} bytes long, but it is {} bytes long",
                Self::MIN_BYTE_SIZE,
                bytes.len()
            ))),
        }
    }

    fn to_base58_check(&self) -> String {
        encode_tezos_id(KINDS[self.tag() as usize], self.as_ref()).unwrap_or_default()
    }

    fn to_bytes(&self, out: &mut Vec<u8>) {
        out.push(self.tag());
        out.extend_from_slice(self.as_ref());
    }
}

impl TryFrom<&[u8]> for Key {
    type Error = ByteReprError;
    fn try_from(value: &[u8]) -> Result<Self, Self::Error> {
        Self::from_bytes(value)
    }
}

impl TryFrom<&str> for Key {
    type Error = ByteReprError;
    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::from_base58_check(value)
    }
}
