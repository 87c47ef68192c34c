/******************************************************************************/
/*                                                                            */
/* SPDX-License-Identifier: MIT                                               */
/* Copyright (c) [2023] Serokell <hi@serokell.io>                             */
/*                                                                            */
/******************************************************************************/

//! Representation for typed Michelson `key_hash` values.

use super::byte_repr_trait::{check_size, unknown_tag, ByteReprError, ByteReprTrait};
use crate::tezos_id::{decode_tezos_id, encode_tezos_id, TezosIdKind};

/// Size of the hash in bytes. All key hashes are blake2b 160-bit hashes.
pub const HASH_SIZE: usize = 20;

/// Public key hash. Public key hashes are used to represent implicit Tezos
/// addresses.
#[derive(Debug, Clone, Eq, PartialOrd, Ord, PartialEq, Hash)]
pub enum KeyHash {
    /// A hash of a Ed25519 public key, `tz1...` in base58-check encoding.
    Tz1([u8; HASH_SIZE]),
    /// A hash of a SecP256k1 public key, `tz2...` in base58-check encoding.
    Tz2([u8; HASH_SIZE]),
    /// A hash of a P256 public key, `tz3...` in base58-check encoding.
    Tz3([u8; HASH_SIZE]),
    /// A hash of a BLS public key, `tz4...` in base58-check encoding.
    Tz4([u8; HASH_SIZE]),
}

const TAG_TZ1: u8 = 0;
const TAG_TZ2: u8 = 1;
const TAG_TZ3: u8 = 2;
const TAG_TZ4: u8 = 3;

const KINDS: [TezosIdKind; 4] = [
    TezosIdKind::Ed25519PublicKeyHash,
    TezosIdKind::Secp256k1PublicKeyHash,
    TezosIdKind::P256PublicKeyHash,
    TezosIdKind::Bls12381PublicKeyHash,
];

impl KeyHash {
    /// Size of the binary representation: a tag byte followed by the hash.
    pub const BYTE_SIZE: usize = HASH_SIZE + 1;

    fn tag(&self) -> u8 {
        match self {
            KeyHash::Tz1(_) => TAG_TZ1,
            KeyHash::Tz2(_) => TAG_TZ2,
            KeyHash::Tz3(_) => TAG_TZ3,
            KeyHash::Tz4(_) => TAG_TZ4,
        }
    }

    fn kind(&self) -> TezosIdKind {
        KINDS[self.tag() as usize]
    }

    fn from_tag(tag: u8, hash: [u8; HASH_SIZE]) -> Result<Self, ByteReprError> {
        Ok(match tag {
            TAG_TZ1 => KeyHash::Tz1(hash),
            TAG_TZ2 => KeyHash::Tz2(hash),
            TAG_TZ3 => KeyHash::Tz3(hash),
            TAG_TZ4 => KeyHash::Tz4(hash),
            t => return Err(unknown_tag(t)),
        })
    }
}

impl AsRef<[u8]> for KeyHash {
    fn as_ref(&self) -> &[u8] {
        match self {
            KeyHash::Tz1(h) | KeyHash::Tz2(h) | KeyHash::Tz3(h) | KeyHash::Tz4(h) => h,
        }
    }
}

pub(crate) fn hash_array(bytes: &[u8]) -> Result<[u8; HASH_SIZE], ByteReprError> {
    bytes
        .try_into()
        .map_err(|_| ByteReprError::WrongFormat(format!("hash must be {HASH_SIZE} bytes long")))
}

impl ByteReprTrait for KeyHash {
    fn from_base58_check(data: &str) -> Result<Self, ByteReprError> {
        let (kind, payload) = decode_tezos_id(data, &KINDS)?;
        let tag = KINDS.iter().position(|k| *k == kind).unwrap_or_default() as u8;
        Self::from_tag(tag, hash_array(&payload)?)
    }

    fn from_bytes(bytes: &[u8]) -> Result<Self, ByteReprError> {
        check_size(bytes, Self::BYTE_SIZE, "key_hash", "bytes")?;
        Self::from_tag(bytes[0], hash_array(&bytes[1..])?)
    }

    fn to_base58_check(&self) -> String {
        // the payload size always matches the kind
        encode_tezos_id(self.kind(), self.as_ref()).unwrap_or_default()
    }

    fn to_bytes(&self, out: &mut Vec<u8>) {
        out.push(self.tag());
        out.extend_from_slice(self.as_ref());
    }
}

impl TryFrom<&[u8]> for KeyHash {
    type Error = ByteReprError;
    fn try_from(value: &[u8]) -> Result<Self, Self::Error> {
        Self::from_bytes(value)
    }
}

impl TryFrom<&str> for KeyHash {
    type Error = ByteReprError;
    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::from_base58_check(value)
    }
}
