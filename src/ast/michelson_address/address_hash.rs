/******************************************************************************/
/*                                                                            */
/* SPDX-License-Identifier: MIT                                               */
/* Copyright (c) [2023] Serokell <hi@serokell.io>                             */
/*                                                                            */
/******************************************************************************/

use crate::ast::byte_repr_trait::{check_size, unknown_tag, ByteReprError, ByteReprTrait};
use crate::ast::michelson_key_hash::{hash_array, KeyHash, HASH_SIZE};
use crate::tezos_id::{decode_tezos_id, encode_tezos_id, TezosIdKind};

/// Address without the entrypoint: either an implicit account (a key hash) or
/// an originated one.
#[derive(Debug, Clone, Eq, PartialOrd, Ord, PartialEq, Hash)]
pub enum AddressHash {
    Implicit(KeyHash),
    /// `KT1...`
    Kt1([u8; HASH_SIZE]),
    /// `sr1...`
    Sr1([u8; HASH_SIZE]),
}

const TAG_IMPLICIT: u8 = 0;
const TAG_KT1: u8 = 1;
// 2 is txr1 addresses, which are deprecated
const TAG_SR1: u8 = 3;
const PADDING_ORIGINATED: u8 = 0;

impl AddressHash {
    // +2 for tags: implicit addresses use a 2-byte tag, KT1/sr1 add a zero
    // padding byte to the end
    pub const BYTE_SIZE: usize = HASH_SIZE + 2;

    pub fn is_implicit(&self) -> bool {
        matches!(self, AddressHash::Implicit(_))
    }
}

impl AsRef<[u8]> for AddressHash {
    fn as_ref(&self) -> &[u8] {
        match self {
            AddressHash::Implicit(h) => h.as_ref(),
            AddressHash::Kt1(h) | AddressHash::Sr1(h) => h,
        }
    }
}

impl From<KeyHash> for AddressHash {
    fn from(value: KeyHash) -> Self {
        AddressHash::Implicit(value)
    }
}

impl ByteReprTrait for AddressHash {
    fn from_base58_check(data: &str) -> Result<Self, ByteReprError> {
        if data.starts_with("tz") {
            return Ok(AddressHash::Implicit(KeyHash::from_base58_check(data)?));
        }
        let (kind, payload) = decode_tezos_id(
            data,
            &[TezosIdKind::ContractHash, TezosIdKind::SmartRollupHash],
        )?;
        let hash = hash_array(&payload)?;
        Ok(match kind {
            TezosIdKind::ContractHash => AddressHash::Kt1(hash),
            _ => AddressHash::Sr1(hash),
        })
    }

    fn to_base58_check(&self) -> String {
        match self {
            AddressHash::Implicit(h) => h.to_base58_check(),
            AddressHash::Kt1(h) => {
                encode_tezos_id(TezosIdKind::ContractHash, h).unwrap_or_default()
            }
            AddressHash::Sr1(h) => {
                encode_tezos_id(TezosIdKind::SmartRollupHash, h).unwrap_or_default()
            }
        }
    }

    fn from_bytes(bytes: &[u8]) -> Result<Self, ByteReprError> {
        check_size(bytes, Self::BYTE_SIZE, "address", "bytes")?;
        let validate_padding_byte = || match bytes[Self::BYTE_SIZE - 1] {
            PADDING_ORIGINATED => Ok(()),
            b => Err(ByteReprError::WrongFormat(format!(
                "address must be padded with byte 0x00, but it was padded with 0x{}",
                hex::encode([b])
            ))),
        };
        Ok(match bytes[0] {
            TAG_IMPLICIT => AddressHash::Implicit(KeyHash::from_bytes(&bytes[1..])?),
            TAG_KT1 => {
                validate_padding_byte()?;
                AddressHash::Kt1(hash_array(&bytes[1..Self::BYTE_SIZE - 1])?)
            }
            TAG_SR1 => {
                validate_padding_byte()?;
                AddressHash::Sr1(hash_array(&bytes[1..Self::BYTE_SIZE - 1])?)
            }
            t => return Err(unknown_tag(t)),
        })
    }

    fn to_bytes(&self, out: &mut Vec<u8>) {
        fn originated_account(out: &mut Vec<u8>, tag: u8, hash: &[u8]) {
            out.push(tag);
            out.extend_from_slice(hash);
            out.push(PADDING_ORIGINATED);
        }
        match self {
            AddressHash::Implicit(hash) => {
                out.push(TAG_IMPLICIT);
                hash.to_bytes(out);
            }
            AddressHash::Kt1(hash) => originated_account(out, TAG_KT1, hash),
            AddressHash::Sr1(hash) => originated_account(out, TAG_SR1, hash),
        }
    }
}
